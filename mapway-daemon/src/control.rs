//! Load balancer control socket client.
//!
//! One connection per command: connect, write a single newline-terminated
//! line, close. No response is read.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

use crate::error::{io_err, DaemonError};

/// A runtime map mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapCommand {
    Add { map: String, key: String, value: String },
    Del { map: String, key: String },
}

impl MapCommand {
    pub fn add(map: &str, key: &str, value: &str) -> Self {
        Self::Add {
            map: map.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    pub fn del(map: &str, key: &str) -> Self {
        Self::Del {
            map: map.to_string(),
            key: key.to_string(),
        }
    }
}

impl fmt::Display for MapCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapCommand::Add { map, key, value } => write!(f, "add map {map} {key} {value}"),
            MapCommand::Del { map, key } => write!(f, "del map {map} {key}"),
        }
    }
}

/// Where map commands are delivered.
#[async_trait]
pub trait ControlEndpoint: Send {
    async fn send(&mut self, command: &MapCommand) -> Result<(), DaemonError>;
}

/// [`ControlEndpoint`] over the load balancer's Unix domain socket.
#[derive(Debug, Clone)]
pub struct ControlSocket {
    socket: PathBuf,
}

impl ControlSocket {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
        }
    }
}

#[async_trait]
impl ControlEndpoint for ControlSocket {
    async fn send(&mut self, command: &MapCommand) -> Result<(), DaemonError> {
        let mut stream =
            UnixStream::connect(&self.socket)
                .await
                .map_err(|source| DaemonError::ControlUnavailable {
                    socket: self.socket.clone(),
                    source,
                })?;

        let line = format!("{command}\n");
        stream
            .write_all(line.as_bytes())
            .await
            .map_err(|e| io_err(&self.socket, e))?;
        stream.flush().await.map_err(|e| io_err(&self.socket, e))?;
        // The peer may already have closed its end after reading the line.
        let _ = stream.shutdown().await;

        tracing::debug!(socket = %self.socket.display(), command = %command, "sent control command");
        Ok(())
    }
}
