pub mod model;
pub mod redact;
