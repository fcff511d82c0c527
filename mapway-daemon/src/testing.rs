//! In-memory stand-ins for the store, control socket and subscription.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::control::{ControlEndpoint, MapCommand};
use crate::error::DaemonError;
use crate::events::EventSource;
use crate::store::RouteStore;

pub(crate) fn store_down() -> DaemonError {
    DaemonError::Redis(redis::RedisError::from((
        redis::ErrorKind::IoError,
        "connection refused",
    )))
}

#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
    fail_on: Arc<Mutex<Option<&'static str>>>,
    stall_on: Arc<Mutex<Option<&'static str>>>,
}

impl MemoryStore {
    pub(crate) fn with(entries: &[(&str, &str)]) -> Self {
        let store = Self::default();
        {
            let mut map = store.entries.lock().unwrap();
            for (k, v) in entries {
                map.insert(k.to_string(), v.to_string());
            }
        }
        store
    }

    pub(crate) fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries.lock().unwrap().clone()
    }

    /// Make `op` (`get`, `set`, `delete`, `get_all`) fail until cleared with `None`.
    pub(crate) fn fail_on(&self, op: Option<&'static str>) {
        *self.fail_on.lock().unwrap() = op;
    }

    /// Make `op` hang for an hour.
    pub(crate) fn stall_on(&self, op: Option<&'static str>) {
        *self.stall_on.lock().unwrap() = op;
    }

    async fn gate(&self, op: &'static str) -> Result<(), DaemonError> {
        let stall = *self.stall_on.lock().unwrap() == Some(op);
        if stall {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if *self.fail_on.lock().unwrap() == Some(op) {
            return Err(store_down());
        }
        Ok(())
    }
}

#[async_trait]
impl RouteStore for MemoryStore {
    async fn get(&mut self, key: &str) -> Result<Option<String>, DaemonError> {
        self.gate("get").await?;
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set(&mut self, key: &str, value: &str) -> Result<(), DaemonError> {
        self.gate("set").await?;
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&mut self, key: &str) -> Result<(), DaemonError> {
        self.gate("delete").await?;
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn get_all(&mut self) -> Result<BTreeMap<String, String>, DaemonError> {
        self.gate("get_all").await?;
        Ok(self.snapshot())
    }
}

/// Records every command line it is asked to send.
#[derive(Clone, Default)]
pub(crate) struct RecordingControl {
    sent: Arc<Mutex<Vec<String>>>,
    down: Arc<Mutex<bool>>,
}

impl RecordingControl {
    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn set_down(&self, down: bool) {
        *self.down.lock().unwrap() = down;
    }
}

#[async_trait]
impl ControlEndpoint for RecordingControl {
    async fn send(&mut self, command: &MapCommand) -> Result<(), DaemonError> {
        if *self.down.lock().unwrap() {
            return Err(DaemonError::ControlUnavailable {
                socket: "/var/run/haproxy.sock".into(),
                source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            });
        }
        self.sent.lock().unwrap().push(command.to_string());
        Ok(())
    }
}

/// Event source fed from a channel; a dropped sender reads as a broken subscription.
pub(crate) struct ChannelSource {
    rx: mpsc::Receiver<String>,
}

impl ChannelSource {
    pub(crate) fn new() -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(64);
        (tx, Self { rx })
    }
}

#[async_trait]
impl EventSource for ChannelSource {
    async fn next_payload(&mut self) -> Result<String, DaemonError> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| DaemonError::SubscriptionClosed {
                channel: "mappings_channel".to_string(),
            })
    }
}
