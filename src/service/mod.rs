//! The DIAL service controller.
//!
//! `DialService` owns every listener the receiver runs (SSDP responder, device
//! description server, DIAL application server) and moves through
//! Uninitialized -> Initialized -> Running. All of its state lives behind one
//! async mutex, so lifecycle calls from different tasks serialize.

mod callbacks;
mod events;

pub use callbacks::{
    DialCallbacks, SessionCallback, SharedCallbacks, StartCallback, StatusCallback,
};
pub use events::{DialEvent, EventSink};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::apps::{default_registry, DialDataStore, FileDataStore, MemoryDataStore};
use crate::config::ServiceConfig;
use crate::network::{LocalInterface, SsdpAdvertisement, SsdpResponder, Wakeup};
use crate::server::{self, DialState, HttpWorker};
use crate::{DialError, Result};

/// Ports the running service is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServicePorts {
    /// DIAL application server (`/apps/...`).
    pub dial: u16,
    /// Device description server (`/dd.xml`), the port SSDP advertises.
    pub description: u16,
    pub ssdp: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Uninitialized,
    Initialized,
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub state: ControllerState,
    pub friendly_name: Option<String>,
    pub local_ip: Option<Ipv4Addr>,
    pub ports: Option<ServicePorts>,
    pub started_at: Option<DateTime<Utc>>,
}

struct RunningService {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    ports: ServicePorts,
    interface: LocalInterface,
    started_at: DateTime<Utc>,
}

impl RunningService {
    async fn shutdown(self) {
        self.token.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("DIAL worker ended abnormally: {}", e);
            }
        }
    }
}

#[derive(Default)]
struct ServiceState {
    config: Option<ServiceConfig>,
    running: Option<RunningService>,
}

impl ServiceState {
    fn controller_state(&self) -> ControllerState {
        match (&self.config, &self.running) {
            (_, Some(_)) => ControllerState::Running,
            (Some(_), None) => ControllerState::Initialized,
            (None, None) => ControllerState::Uninitialized,
        }
    }
}

/// One DIAL receiver. Construct it once at application start and keep it for
/// the life of the process.
pub struct DialService {
    state: Mutex<ServiceState>,
    callbacks: SharedCallbacks,
    events: EventSink,
}

impl DialService {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServiceState::default()),
            callbacks: SharedCallbacks::new(),
            events: EventSink::default(),
        }
    }

    /// Captures identity and callbacks. A second call while initialized is a
    /// no-op: nothing is reconfigured until `uninit`.
    pub async fn init(&self, mut config: ServiceConfig, callbacks: DialCallbacks) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.config.is_some() {
            debug!("DIAL service already initialized");
            return Ok(());
        }

        config.identity = config.identity.validated()?;
        info!(
            "DIAL service initialized as '{}' ({})",
            config.identity.friendly_name, config.identity.uuid
        );

        self.callbacks.install(callbacks);
        state.config = Some(config);
        Ok(())
    }

    /// Binds every listener, then spawns one worker per listener. Nothing is
    /// left running when this fails.
    pub async fn start(&self) -> Result<ServicePorts> {
        let mut state = self.state.lock().await;
        if let Some(running) = &state.running {
            return Ok(running.ports);
        }
        let config = state.config.as_ref().ok_or(DialError::NotInitialized)?;

        let running = self.launch(config).await?;
        let ports = running.ports;
        info!(
            "DIAL service running on {} (dial {}, description {}, ssdp {})",
            running.interface.ip, ports.dial, ports.description, ports.ssdp
        );

        state.running = Some(running);
        self.events.publish(DialEvent::ServiceStarted { ports });
        Ok(ports)
    }

    async fn launch(&self, config: &ServiceConfig) -> Result<RunningService> {
        let interface = LocalInterface::resolve(&config.interface)?;
        let identity = &config.identity;

        // Bind both HTTP listeners first so their ports can be advertised
        let dial = HttpWorker::bind(
            "DIAL server",
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), identity.http_port.unwrap_or(0)),
        )
        .await?;
        let description = HttpWorker::bind(
            "Description server",
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.description_port),
        )
        .await?;

        let dial_port = dial.port()?;
        let description_port = description.port()?;

        // SSDP replies point at the description server
        let advertisement = SsdpAdvertisement {
            location: format!("http://{}:{}/dd.xml", interface.ip, description_port),
            uuid: identity.uuid.clone(),
            server: config.ssdp.server_token.clone(),
            wakeup: Wakeup::from_config(&config.wake_on_lan, interface.mac.as_deref()),
        };
        let ssdp = SsdpResponder::bind(&config.ssdp, &interface, &advertisement)?;
        let ssdp_port = ssdp.local_port()?;

        // Create app registry and routers
        let data: Arc<dyn DialDataStore> = match &config.data_dir {
            Some(dir) => Arc::new(FileDataStore::new(dir)?),
            None => Arc::new(MemoryDataStore::new()),
        };
        let registry = default_registry(self.callbacks.clone(), self.events.clone())?;

        let dial_router = server::dial::router(DialState::new(
            Arc::new(registry),
            data,
            IpAddr::V4(interface.ip),
            dial_port,
        ));
        let application_url = format!("http://{}:{}/apps/", interface.ip, dial_port);
        let description_router = server::description::router(identity, &application_url)?;

        // Run all three workers under one token
        let token = CancellationToken::new();
        let should_stop = token.clone();
        let tasks = vec![
            dial.spawn(dial_router, token.clone()),
            description.spawn(description_router, token.clone()),
            tokio::spawn(async move { ssdp.run(move || should_stop.is_cancelled()).await }),
        ];

        Ok(RunningService {
            token,
            tasks,
            ports: ServicePorts {
                dial: dial_port,
                description: description_port,
                ssdp: ssdp_port,
            },
            interface,
            started_at: Utc::now(),
        })
    }

    /// Cancels the workers and waits for all of them. Once this returns no
    /// callback is invoked and every port is free again.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        self.stop_locked(&mut state).await;
    }

    async fn stop_locked(&self, state: &mut ServiceState) {
        let Some(running) = state.running.take() else {
            return;
        };

        info!("Stopping DIAL service");
        running.shutdown().await;
        self.events.publish(DialEvent::ServiceStopped);
        info!("DIAL service stopped");
    }

    /// Stops if needed, then forgets the configuration and detaches the
    /// callbacks.
    pub async fn uninit(&self) {
        let mut state = self.state.lock().await;
        self.stop_locked(&mut state).await;

        if state.config.take().is_some() {
            self.callbacks.clear();
            info!("DIAL service uninitialized");
        }
    }

    /// Replaces the status callback of an initialized service.
    pub fn set_status_callback(&self, callback: Option<StatusCallback>) -> Result<()> {
        self.callbacks.set_status_callback(callback)
    }

    pub async fn status(&self) -> ServiceStatus {
        let state = self.state.lock().await;
        ServiceStatus {
            state: state.controller_state(),
            friendly_name: state
                .config
                .as_ref()
                .map(|config| config.identity.friendly_name.clone()),
            local_ip: state.running.as_ref().map(|running| running.interface.ip),
            ports: state.running.as_ref().map(|running| running.ports),
            started_at: state.running.as_ref().map(|running| running.started_at),
        }
    }

    pub async fn ports(&self) -> Option<ServicePorts> {
        self.state.lock().await.running.as_ref().map(|running| running.ports)
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running.is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DialEvent> {
        self.events.subscribe()
    }
}

impl Default for DialService {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DialService {
    fn drop(&mut self) {
        // Workers cannot be joined here; cancelling lets them wind down.
        if let Some(running) = &self.state.get_mut().running {
            running.token.cancel();
        }
    }
}
