use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use bmind_transport::{Transport, TransportError};

use crate::{Config, Control, Indicator, Subject, TaskHandle};

/// Name of the config entry every driver requires before `connect`
pub const CONFIG_BROKER_URL: &str = "BrokerUrl";

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Transport Error")]
    Transport(#[from] TransportError),
    #[error("Config {0} not found")]
    ConfigMissing(String),
    #[error("Indicator {0} not found")]
    IndicatorMissing(String),
    #[error("Operation invalid in driver state {0:?}")]
    InvalidState(DriverState),
    #[error("Snapshot serialize Error")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriverState {
    Uninitialized,
    Initialized,
    Connected,
    Running,
    Stopped,
}

/// Construction-time timing and eviction parameters, passed in by the
/// hosting application instead of living as package constants
#[derive(Debug, Clone, Copy)]
pub struct DriverTiming {
    /// Period of the heartbeat and sweep loops
    pub tick: Duration,
    /// Emit a liveness log line every Nth heartbeat tick
    pub liveness_decimation: u64,
    /// Age past which stored records are evicted by the sweep
    pub record_ttl: Duration,
}

impl Default for DriverTiming {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            liveness_decimation: 5,
            record_ttl: Duration::from_secs(10),
        }
    }
}

/// Lifecycle contract a driver exposes to the hosting application.
/// Lifecycle errors are fatal to bringing up that driver; the framework
/// never retries them
#[async_trait]
pub trait Driver: Send {
    async fn initialize(&mut self) -> Result<(), DriverError>;
    async fn connect(&mut self) -> Result<(), DriverError>;
    async fn start(&mut self) -> Result<(), DriverError>;
    async fn stop(&mut self) -> Result<(), DriverError>;

    fn set_config(&mut self, name: &str, value: &[u8]) -> Result<(), DriverError>;
    fn get_config(&self, name: &str) -> Result<Vec<u8>, DriverError>;

    /// Serialized view of driver identity and nested state for external
    /// inspection
    fn snapshot(&self) -> Result<serde_json::Value, DriverError>;
}

/// Shared driver state and lifecycle steps. Concrete drivers hold one of
/// these and delegate the steps they do not extend.
///
/// The entity collections are not lock-guarded: configuration is written
/// by a single caller before `start`, and must not be mutated while the
/// spawned tasks are running.
pub struct DriverCore {
    pub id: String,
    pub class_id: String,
    pub name: String,
    pub enabled: bool,
    pub hidden: bool,

    pub configs: Vec<Config>,
    pub indicators: Vec<Indicator>,
    pub controls: Vec<Control>,
    pub subjects: Vec<Subject>,

    state: DriverState,
    timing: DriverTiming,
    transport: Box<dyn Transport>,
    tasks: Vec<TaskHandle>,
}

impl DriverCore {
    pub fn new(name: &str, timing: DriverTiming, transport: Box<dyn Transport>) -> Self {
        Self {
            id: String::new(),
            class_id: String::new(),
            name: name.to_string(),
            enabled: false,
            hidden: false,
            configs: Vec::new(),
            indicators: Vec::new(),
            controls: Vec::new(),
            subjects: Vec::new(),
            state: DriverState::Uninitialized,
            timing,
            transport,
            tasks: Vec::new(),
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn timing(&self) -> DriverTiming {
        self.timing
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Assign a fresh identity and empty entity collections, seeded with
    /// the one config entry every driver needs
    pub fn initialize(&mut self, class_id: &str) -> Result<(), DriverError> {
        if matches!(self.state, DriverState::Running | DriverState::Stopped) {
            return Err(DriverError::InvalidState(self.state));
        }
        self.id = uuid::Uuid::new_v4().to_string();
        self.class_id = class_id.to_string();
        self.enabled = true;
        self.hidden = false;
        self.configs = vec![Config::new(&self.id, CONFIG_BROKER_URL)];
        self.indicators = Vec::new();
        self.controls = Vec::new();
        self.subjects = Vec::new();
        self.state = DriverState::Initialized;
        Ok(())
    }

    /// Bind the transport using the broker url config value. An unset
    /// value is reported the same as an absent entry
    pub async fn connect(&mut self) -> Result<(), DriverError> {
        if self.state != DriverState::Initialized {
            return Err(DriverError::InvalidState(self.state));
        }
        let url = self.get_config(CONFIG_BROKER_URL)?;
        if url.is_empty() {
            return Err(DriverError::ConfigMissing(CONFIG_BROKER_URL.to_string()));
        }
        let url = String::from_utf8_lossy(&url).to_string();
        self.transport.bind(&url).await?;
        self.state = DriverState::Connected;
        log::info!("driver {:} connected", self.id);
        Ok(())
    }

    /// Launch the heartbeat loop and mark the driver running
    pub fn start(&mut self) -> Result<(), DriverError> {
        if self.state != DriverState::Connected {
            return Err(DriverError::InvalidState(self.state));
        }
        self.spawn_heartbeat();
        self.state = DriverState::Running;
        Ok(())
    }

    /// Cancel every owned task, wait for all of them to exit, then close
    /// the transport. No task survives a returned `stop`; the state is
    /// terminal
    pub async fn stop(&mut self) -> Result<(), DriverError> {
        let tasks: Vec<TaskHandle> = self.tasks.drain(..).collect();
        for task in &tasks {
            task.cancel();
        }
        futures::future::join_all(tasks.into_iter().map(TaskHandle::join)).await;
        self.transport.disconnect().await?;
        self.state = DriverState::Stopped;
        log::info!("driver {:} stopped", self.id);
        Ok(())
    }

    /// Register a task whose shutdown is owned by this driver's `stop`
    pub fn spawn_task<F, Fut>(&mut self, f: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tasks.push(TaskHandle::spawn(f));
    }

    /// Periodic liveness loop: checks for cancellation every tick, logs
    /// on a decimated schedule
    fn spawn_heartbeat(&mut self) {
        let id = self.id.clone();
        let tick = self.timing.tick;
        let decimation = self.timing.liveness_decimation.max(1);
        self.spawn_task(move |cancel| async move {
            log::info!("driver {id:} heartbeat loop started");
            let mut timer = tokio::time::interval(tick);
            let mut ticks: u64 = 0;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        log::info!("driver {id:} heartbeat loop canceled");
                        break;
                    }
                    _ = timer.tick() => {
                        ticks += 1;
                        if ticks % decimation == 0 {
                            log::info!("driver {id:} is alive");
                        }
                    }
                }
            }
        });
    }

    pub fn set_config(&mut self, name: &str, value: &[u8]) -> Result<(), DriverError> {
        match self.configs.iter_mut().find(|c| c.name == name) {
            Some(config) => {
                config.value = value.to_vec();
                Ok(())
            }
            None => Err(DriverError::ConfigMissing(name.to_string())),
        }
    }

    pub fn get_config(&self, name: &str) -> Result<Vec<u8>, DriverError> {
        self.configs
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value.clone())
            .ok_or_else(|| DriverError::ConfigMissing(name.to_string()))
    }

    pub fn set_indicator(&mut self, name: &str, value: &[u8]) -> Result<(), DriverError> {
        match self.indicators.iter_mut().find(|i| i.name == name) {
            Some(indicator) => {
                indicator.value = value.to_vec();
                Ok(())
            }
            None => Err(DriverError::IndicatorMissing(name.to_string())),
        }
    }

    pub fn get_indicator(&self, name: &str) -> Result<Vec<u8>, DriverError> {
        self.indicators
            .iter()
            .find(|i| i.name == name)
            .map(|i| i.value.clone())
            .ok_or_else(|| DriverError::IndicatorMissing(name.to_string()))
    }

    pub fn snapshot(&self) -> Result<serde_json::Value, DriverError> {
        Ok(json!({
            "id": self.id,
            "classId": self.class_id,
            "name": self.name,
            "enabled": self.enabled,
            "hidden": self.hidden,
            "state": serde_json::to_value(self.state)?,
            "configs": serde_json::to_value(&self.configs)?,
            "indicators": serde_json::to_value(&self.indicators)?,
            "controls": serde_json::to_value(&self.controls)?,
            "subjects": serde_json::to_value(&self.subjects)?,
        }))
    }
}
