use anyhow::{Context, Result};
use broker_ingest::broker::kafka::KafkaBroker;
use broker_ingest::connector::Connector;
use broker_ingest::report::error_hash;
use broker_ingest::shutdown::StopSignal;
use broker_ingest::sources::directory::FileDirectory;
use broker_ingest::sources::inline::load_inline_file;
use broker_ingest::sources::yaml::YamlSettingsFile;
use clap::Parser;
use ingest_core::model::Event;
use std::path::PathBuf;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "broker-ingest")]
#[command(about = "Consume a broker queue or topic and emit events as JSON lines")]
#[command(version)]
struct Cli {
    /// TOML file holding the inline connector settings.
    #[arg(long, env = "BROKER_INGEST_CONFIG")]
    config: PathBuf,

    /// Events buffered between the consumer workers and stdout.
    #[arg(long, env = "BROKER_INGEST_QUEUE_CAPACITY", default_value_t = 1024)]
    queue_capacity: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    let inline = load_inline_file(&cli.config).context("load connector config")?;
    let connector = Connector::register(&inline, &YamlSettingsFile, &FileDirectory)
        .context("register broker connector")?;

    let (event_tx, event_rx) = mpsc::channel::<Event>(cli.queue_capacity.max(1));
    let sink_handle = tokio::spawn(write_events(event_rx));

    let stop = StopSignal::new();
    let stop_on_signal = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            stop_on_signal.request_stop();
        }
    });

    let run_stop = stop.clone();
    let outcome =
        tokio::task::spawn_blocking(move || connector.run(&KafkaBroker, &event_tx, &run_stop))
            .await
            .context("join connector thread")?;

    // The sender was dropped with the connector, so the sink drains and exits.
    let written = sink_handle.await.context("join event sink")?;

    match outcome {
        Ok(summary) => {
            info!(pushed = summary.pushed, "broker-ingest finished");
            written
        }
        Err(failure) => {
            error!(error = %error_hash(&failure), "broker-ingest stopped on error");
            if let Err(sink_error) = written {
                warn!(error = %sink_error, "event sink failed");
            }
            Err(anyhow::Error::new(failure).context("run broker connector"))
        }
    }
}

async fn write_events(mut event_rx: mpsc::Receiver<Event>) -> Result<()> {
    let mut stdout = BufWriter::new(tokio::io::stdout());
    while let Some(event) = event_rx.recv().await {
        let mut line = serde_json::to_vec(&event).context("serialize event")?;
        line.push(b'\n');
        stdout.write_all(&line).await.context("write event")?;
        if event_rx.is_empty() {
            stdout.flush().await.context("flush events")?;
        }
    }
    stdout.flush().await.context("flush events")?;
    Ok(())
}

fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
