use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    Fatal,
}

#[derive(Debug, Default)]
struct StopState {
    reason: Option<StopReason>,
}

/// Cooperative stop flag shared by the session manager and its workers.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<StopState>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.stop_with(StopReason::Requested);
    }

    /// A fatal stop is never downgraded by a later voluntary one.
    pub fn fail(&self) {
        self.stop_with(StopReason::Fatal);
    }

    pub fn reason(&self) -> Option<StopReason> {
        self.state().reason
    }

    pub fn is_stopped(&self) -> bool {
        self.reason().is_some()
    }

    pub fn is_fatal(&self) -> bool {
        self.reason() == Some(StopReason::Fatal)
    }

    /// Sleeps up to `timeout`, returning early with `true` once stopped.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (_, condvar) = &*self.inner;
        let guard = self.state();
        match condvar.wait_timeout_while(guard, timeout, |state| state.reason.is_none()) {
            Ok((state, _)) => state.reason.is_some(),
            Err(poisoned) => poisoned.into_inner().0.reason.is_some(),
        }
    }

    fn stop_with(&self, reason: StopReason) {
        let (_, condvar) = &*self.inner;
        {
            let mut state = self.state();
            if state.reason != Some(StopReason::Fatal) {
                state.reason = Some(reason);
            }
        }
        condvar.notify_all();
    }

    fn state(&self) -> MutexGuard<'_, StopState> {
        let (lock, _) = &*self.inner;
        lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
