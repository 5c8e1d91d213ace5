//! Connection and queue configuration.
//!
//! Configuration is resolved once at startup and threaded into the pool and
//! queue constructors; nothing here is global.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Unix socket tried when no explicit address is configured
pub const DEFAULT_SOCKET: &str = "/tmp/redis.sock";

/// Host used when only a port (or nothing at all) is configured
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Port used when only a host (or nothing at all) is configured
pub const DEFAULT_PORT: u16 = 6379;

/// Prefix of environment variables overriding file configuration
pub const ENV_PREFIX: &str = "REDIS_CALL";

/// Name of the queues-config entry that holds shared YAML anchors only
const TEMPLATES_ENTRY: &str = "templates";

/// Network location of a store server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Unix { path: PathBuf },
}

impl Endpoint {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::tcp(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Self::Unix { path } => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Connection parameters as they appear in configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Unix socket path; wins over host/port when set
    #[serde(default)]
    pub socket: Option<PathBuf>,

    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,
}

impl ConnectionConfig {
    /// Pick the endpoint to connect to.
    ///
    /// An explicit socket wins, then an explicit host or port (the missing
    /// half filled from defaults). With nothing configured the default socket
    /// is used if it exists, otherwise the default TCP address.
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint_with_default_socket(Path::new(DEFAULT_SOCKET))
    }

    fn endpoint_with_default_socket(&self, default_socket: &Path) -> Endpoint {
        if let Some(socket) = &self.socket {
            return Endpoint::unix(socket.clone());
        }

        if self.host.is_some() || self.port.is_some() {
            return Endpoint::tcp(
                self.host.clone().unwrap_or_else(|| DEFAULT_HOST.to_string()),
                self.port.unwrap_or(DEFAULT_PORT),
            );
        }

        if is_socket(default_socket) {
            Endpoint::unix(default_socket)
        } else {
            Endpoint::default()
        }
    }
}

#[cfg(unix)]
fn is_socket(path: &Path) -> bool {
    use std::os::unix::fs::FileTypeExt;
    std::fs::metadata(path)
        .map(|m| m.file_type().is_socket())
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_socket(_path: &Path) -> bool {
    false
}

/// Per-queue options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueOptions {
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    /// Application-defined action names; carried through untouched
    #[serde(default)]
    pub actions: Vec<String>,
}

impl QueueOptions {
    /// Endpoint for this queue, falling back to the shared connection settings
    pub fn endpoint(&self, fallback: &ConnectionConfig) -> Endpoint {
        if self.host.is_none() && self.port.is_none() {
            return fallback.endpoint();
        }
        Endpoint::tcp(
            self.host
                .clone()
                .or_else(|| fallback.host.clone())
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            self.port.or(fallback.port).unwrap_or(DEFAULT_PORT),
        )
    }
}

/// Resolved client configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub queues: BTreeMap<String, QueueOptions>,
}

impl ClientConfig {
    /// Load configuration from an optional file plus environment overrides.
    ///
    /// Sources, later overriding earlier:
    ///  1. `path`, if given (format inferred from the extension)
    ///  2. `REDIS_CALL__*` environment variables, `__` separating levels,
    ///     e.g. `REDIS_CALL__CONNECTION__PORT=6380`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let mut loaded: ClientConfig = settings.try_deserialize()?;
        loaded.queues.remove(TEMPLATES_ENTRY);
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject settings that cannot name a reachable endpoint
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.connection.port == Some(0) {
            return Err(ConfigurationError::Invalid {
                message: "connection.port must be non-zero".to_string(),
            });
        }
        for (name, options) in &self.queues {
            if name.is_empty() {
                return Err(ConfigurationError::Invalid {
                    message: "queue names must not be empty".to_string(),
                });
            }
            if options.port == Some(0) {
                return Err(ConfigurationError::Invalid {
                    message: format!("queues.{}.port must be non-zero", name),
                });
            }
        }
        Ok(())
    }

    /// Endpoint serving the given queue
    pub fn queue_endpoint(&self, queue: &str) -> Endpoint {
        match self.queues.get(queue) {
            Some(options) => options.endpoint(&self.connection),
            None => self.connection.endpoint(),
        }
    }

    /// Options for a queue that must be configured
    pub fn queue_options(&self, queue: &str) -> Result<&QueueOptions, ConfigurationError> {
        self.queues
            .get(queue)
            .ok_or_else(|| ConfigurationError::UnknownQueue {
                queue: queue.to_string(),
            })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
