//! Flowlink demo entry point.
//!
//! This binary is the composition root for a single-process pipeline run:
//!
//! 1. **Parse configuration**: load a [`connector::ClientConfig`] from the JSON
//!    file named by `--config` or `FLOWLINK_CONFIG`, or fall back to a
//!    default Push client.
//! 2. **Wire observability**: configure `tracing-subscriber` with an env
//!    filter and a JSON layer on stderr. When `FLOWLINK_OTLP_ENDPOINT` is set,
//!    spans are also exported over OTLP.
//! 3. **Construct infrastructure**: boot a [`LocalRegistry`] and one
//!    [`LocalReceiver`] per receiver the client needs.
//! 4. **Drive the client**: fire `--messages N` triggers, print every message
//!    the forwarder received and the final client status on stdout, then stop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use connector::local::{LocalReceiver, LocalRegistry, ReceiverInbox};
use connector::{
    Capabilities, CapabilityError, ClientConfig, ClientState, ConnectionMode, DataflowCapability,
    DataflowClient, ForwardMessage, Mode, Payload, SlotState,
};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::TracerProvider;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const CONFIG_ENV: &str = "FLOWLINK_CONFIG";
const OTLP_ENDPOINT_ENV: &str = "FLOWLINK_OTLP_ENDPOINT";
const DEFAULT_MESSAGES: u32 = 3;

/// Upper bound on how long the demo waits for any single message.
const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

const USAGE: &str = "\
Usage: flowlink [--config <path>] [--messages <n>]

Options:
  --config <path>   JSON client configuration (default: $FLOWLINK_CONFIG)
  --messages <n>    number of triggers to fire (default: 3)
  -h, --help        print this help";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Some(args) = Args::parse(std::env::args().skip(1))? else {
        println!("{USAGE}");
        return Ok(());
    };

    let provider = init_observability()?;
    let outcome = run(args).await;

    if let Some(provider) = provider {
        if let Err(e) = provider.shutdown() {
            eprintln!("failed to flush traces: {e}");
        }
    }
    outcome
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
struct Args {
    config: Option<PathBuf>,
    messages: u32,
}

impl Args {
    /// Parses command-line arguments. Returns `None` when help was requested.
    fn parse(mut args: impl Iterator<Item = String>) -> anyhow::Result<Option<Self>> {
        let mut parsed = Args {
            config: None,
            messages: DEFAULT_MESSAGES,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let path = args.next().context("--config requires a path")?;
                    parsed.config = Some(PathBuf::from(path));
                }
                "--messages" => {
                    let value = args.next().context("--messages requires a count")?;
                    parsed.messages = value
                        .parse()
                        .with_context(|| format!("invalid message count `{value}`"))?;
                }
                "-h" | "--help" => return Ok(None),
                other => bail!("unknown argument `{other}`\n\n{USAGE}"),
            }
        }
        Ok(Some(parsed))
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<ClientConfig> {
    let path = path.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
    let Some(path) = path else {
        return Ok(ClientConfig::new(Mode::Push));
    };

    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    ClientConfig::from_json_str(&text)
        .with_context(|| format!("invalid config file {}", path.display()))
}

// ---------------------------------------------------------------------------
// Observability
// ---------------------------------------------------------------------------

/// Installs the global subscriber. Returns the OTLP provider, if one was
/// configured, so it can be flushed on exit.
fn init_observability() -> anyhow::Result<Option<TracerProvider>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr);

    let provider = match std::env::var(OTLP_ENDPOINT_ENV) {
        Ok(endpoint) => {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .build()
                .context("failed to build OTLP span exporter")?;
            Some(
                TracerProvider::builder()
                    .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
                    .build(),
            )
        }
        Err(_) => None,
    };
    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("flowlink")));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(provider)
}

// ---------------------------------------------------------------------------
// Demo capability
// ---------------------------------------------------------------------------

/// Produces `payload-1`, `payload-2`, ... and hands backward data to the
/// demo loop.
struct DemoCapability {
    capabilities: Capabilities,
    produced: u32,
    backward: mpsc::UnboundedSender<Payload>,
}

#[async_trait]
impl DataflowCapability for DemoCapability {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn push_message(&mut self) -> Result<Payload, CapabilityError> {
        Ok(self.next())
    }

    async fn pull_message(&mut self) -> Result<Payload, CapabilityError> {
        Ok(self.next())
    }

    async fn backward_message(&mut self, payload: Payload) -> Result<(), CapabilityError> {
        self.backward
            .send(payload)
            .map_err(|_| CapabilityError::Failed("demo loop has exited".into()))
    }
}

impl DemoCapability {
    fn next(&mut self) -> Payload {
        self.produced += 1;
        Payload::from(format!("payload-{}", self.produced))
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct Received {
    receiver: &'static str,
    kind: &'static str,
    payload: String,
}

impl Received {
    fn forwarded(message: &ForwardMessage) -> Self {
        let kind = match message {
            ForwardMessage::PushData(_) => "push_data",
            ForwardMessage::SendData(_) => "send_data",
        };
        Self {
            receiver: "forwarder",
            kind,
            payload: String::from_utf8_lossy(message.payload().as_bytes()).into_owned(),
        }
    }

    fn backward(payload: &Payload) -> Self {
        Self {
            receiver: "backwarder",
            kind: "backward_data",
            payload: String::from_utf8_lossy(payload.as_bytes()).into_owned(),
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(args.config)?;
    let settings = config.validate()?;

    let registry = Arc::new(LocalRegistry::new());
    let (forwarder, mut inbox) = LocalReceiver::new();
    registry.register(settings.forwarder.clone(), forwarder.clone());
    let backwarder = settings.backward_enabled.then(|| {
        let (receiver, _inbox) = LocalReceiver::new();
        registry.register(settings.backwarder.clone(), receiver.clone());
        receiver
    });

    let capabilities = match (settings.mode, settings.backward_enabled) {
        (Mode::Push, false) => Capabilities::push(),
        (Mode::Push, true) => Capabilities::push().with_backward(),
        (Mode::Pull, _) => Capabilities::pull(),
    };
    let (backward_tx, mut backward_rx) = mpsc::unbounded_channel();
    let capability = DemoCapability {
        capabilities,
        produced: 0,
        backward: backward_tx,
    };

    let client = DataflowClient::spawn(&config, registry, capability)?;
    let handle = client.handle();
    info!(client = %handle.id(), mode = %settings.mode, "Client started");

    if settings.connection_mode == ConnectionMode::Passive {
        warn!("Passive connection mode; no receiver will be contacted");
    } else {
        let forwarder_live = handle
            .wait_for(|s| s.forwarder.state == SlotState::Live)
            .await;
        if forwarder_live.is_err() {
            client.join().await?;
            bail!("client stopped before connecting");
        }
        if settings.mode == Mode::Pull {
            forwarder.signal_ready();
        }
        if handle.wait_for(|s| s.state == ClientState::Ready).await.is_err() {
            client.join().await?;
            bail!("client stopped before becoming ready");
        }

        for _ in 0..args.messages {
            match settings.mode {
                Mode::Push => handle.push()?,
                Mode::Pull => handle.pull()?,
            }
        }
        print_forwarded(&mut inbox, args.messages).await?;

        if let Some(backwarder) = &backwarder {
            backwarder.send_backward(Payload::from("ack"));
            let payload = tokio::time::timeout(RECEIVE_TIMEOUT, backward_rx.recv())
                .await
                .context("timed out waiting for backward data")?;
            if let Some(payload) = payload {
                println!("{}", serde_json::to_string(&Received::backward(&payload))?);
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&handle.status())?);
    handle.stop()?;
    client.join().await?;
    Ok(())
}

async fn print_forwarded(inbox: &mut ReceiverInbox, expected: u32) -> anyhow::Result<()> {
    for n in 1..=expected {
        let message = tokio::time::timeout(RECEIVE_TIMEOUT, inbox.recv())
            .await
            .with_context(|| format!("timed out waiting for message {n} of {expected}"))?
            .context("forwarder inbox closed")?;
        println!("{}", serde_json::to_string(&Received::forwarded(&message))?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<Option<Args>> {
        Args::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn defaults_without_arguments() {
        let args = parse(&[]).unwrap().unwrap();
        assert_eq!(args.config, None);
        assert_eq!(args.messages, DEFAULT_MESSAGES);
    }

    #[test]
    fn parses_config_and_message_count() {
        let args = parse(&["--messages", "7", "--config", "client.json"])
            .unwrap()
            .unwrap();
        assert_eq!(args.messages, 7);
        assert_eq!(args.config, Some(PathBuf::from("client.json")));
    }

    #[test]
    fn help_short_circuits() {
        assert!(parse(&["--messages", "2", "--help"]).unwrap().is_none());
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse(&["--messages", "many"]).is_err());
        assert!(parse(&["--config"]).is_err());
        assert!(parse(&["--verbose"]).is_err());
    }

    #[test]
    fn explicit_config_file_is_loaded() {
        let path = std::env::temp_dir().join(format!("flowlink-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "mode": "pull", "max_retry_count": "infinity" }"#).unwrap();

        let config = load_config(Some(path.clone())).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.mode, Mode::Pull);
        assert_eq!(config.max_retry_count, connector::RetryCount::Unlimited);
    }

    #[tokio::test(start_paused = true)]
    async fn push_run_completes() {
        let args = Args {
            config: None,
            messages: 2,
        };
        run(args).await.unwrap();
    }
}
