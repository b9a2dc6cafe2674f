use clap::Parser;
use dial_receiver::config::ServiceConfig;
use dial_receiver::{AppStatus, DialCallbacks, DialService, SessionId};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Friendly name shown to senders
    #[arg(short, long)]
    name: Option<String>,

    /// Model name in the device description
    #[arg(long)]
    model: Option<String>,

    /// Device UUID
    #[arg(long, conflicts_with = "fresh_uuid")]
    uuid: Option<String>,

    /// Generate a random device UUID for this run
    #[arg(long)]
    fresh_uuid: bool,

    /// DIAL application server port (0 = any)
    #[arg(short, long)]
    port: Option<u16>,

    /// Device description server port (0 = any)
    #[arg(long)]
    description_port: Option<u16>,

    /// Do not advertise wake-on-LAN
    #[arg(long)]
    no_wake: bool,

    /// Debug logging unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply(&self, config: &mut ServiceConfig) {
        if let Some(name) = &self.name {
            config.identity.friendly_name = name.clone();
        }
        if let Some(model) = &self.model {
            config.identity.model_name = model.clone();
        }
        if let Some(uuid) = &self.uuid {
            config.identity.uuid = uuid.clone();
        }
        if self.fresh_uuid {
            config.identity.uuid = uuid::Uuid::new_v4().to_string();
        }
        if let Some(port) = self.port {
            config.identity.http_port = Some(port);
        }
        if let Some(port) = self.description_port {
            config.description_port = port;
        }
        if self.no_wake {
            config.wake_on_lan.enabled = false;
        }
    }
}

/// Stand-in for a real player: remembers which sessions are running.
fn demo_callbacks() -> DialCallbacks {
    let sessions: Arc<Mutex<HashSet<SessionId>>> = Arc::new(Mutex::new(HashSet::new()));
    let (on_start, on_stop, on_status) = (sessions.clone(), sessions.clone(), sessions);

    DialCallbacks::new()
        .on_start(move |session, url| {
            tracing::info!("Session {} would open {}", session, url);
            on_start.lock().insert(session);
        })
        .on_hide(|session| tracing::info!("Session {} hidden", session))
        .on_stop(move |session| {
            if on_stop.lock().remove(&session) {
                tracing::info!("Session {} stopped", session);
            }
        })
        .on_status(move |session| {
            if on_status.lock().contains(&session) {
                AppStatus::running()
            } else {
                AppStatus::stopped()
            }
        })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    let fallback = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .init();

    tracing::info!("Starting dial-receiver v{}", env!("CARGO_PKG_VERSION"));

    // Load config, flags win over the file
    let mut config = ServiceConfig::load_or_default(args.config.as_deref())?;
    args.apply(&mut config);

    // Log every service event
    let service = Arc::new(DialService::new());
    let mut events = service.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => tracing::info!("event {}", json),
                    Err(e) => tracing::warn!("Unprintable event {:?}: {}", event, e),
                },
                Err(RecvError::Lagged(missed)) => tracing::warn!("Missed {} events", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Start the receiver
    service.init(config, demo_callbacks()).await?;
    let ports = service.start().await?;
    tracing::info!(
        "Advertising on SSDP port {}, description on {}, DIAL on {}",
        ports.ssdp,
        ports.description,
        ports.dial
    );

    // Wait for Ctrl-C
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    service.stop().await;
    service.uninit().await;
    Ok(())
}
