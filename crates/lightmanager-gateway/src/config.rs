//! Startup and runtime configuration.
//!
//! [`StartupConfig`] is the bundle handed to the daemon at startup. It can be
//! loaded from YAML and is then overridden by command line flags:
//!
//! ```yaml
//! address: 0.0.0.0
//! port: 3456
//! housecode: "12341234"
//! pidfile: /var/run/lightmanager.pid
//! retry:
//!   attempts: 5
//!   delay_ms: 250
//!   timeout_ms: 250
//! limits:
//!   max_line_length: 1024
//!   max_commands_per_line: 500
//! ```
//!
//! [`RuntimeConfig`] is the process-wide state shared by every connection.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use lightmanager_protocol::{parse_fs20_code, Fs20Code};
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 3456;
/// Default PID file location.
pub const DEFAULT_PIDFILE: &str = "/var/run/lightmanager.pid";
/// Default maximum input line length in bytes.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024;
/// Default maximum number of commands in one input line.
pub const DEFAULT_MAX_COMMANDS: usize = 500;

// ============================================================================
// Startup configuration
// ============================================================================

/// Retry behaviour of the hardware transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Attempts per leg of an exchange.
    pub attempts: u32,
    /// Pause between attempts in milliseconds.
    pub delay_ms: u64,
    /// Per-transfer timeout in milliseconds.
    pub timeout_ms: u64,
}

impl RetryPolicy {
    /// Pause between attempts.
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Per-transfer timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 5,
            delay_ms: 250,
            timeout_ms: 250,
        }
    }
}

/// Input limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Limits {
    /// Longest accepted input line (bytes, without terminator).
    pub max_line_length: usize,
    /// Most commands accepted in one input line.
    pub max_commands_per_line: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            max_commands_per_line: DEFAULT_MAX_COMMANDS,
        }
    }
}

/// Parameters of the simulated device.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Temperature reported by the sensor, in degrees Celsius.
    pub temperature: f32,
    /// Hours the simulated clock shifts by on every set, like the real
    /// device's automatic summer time correction.
    pub hour_shift: i64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            temperature: 21.5,
            hour_shift: 0,
        }
    }
}

fn deserialize_housecode<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_fs20_code(&s).map_err(serde::de::Error::custom)
}

/// Everything the daemon needs at startup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StartupConfig {
    /// Listen address.
    pub address: IpAddr,
    /// Listen port.
    pub port: u16,
    /// Initial FS20 housecode.
    #[serde(deserialize_with = "deserialize_housecode")]
    pub housecode: u16,
    /// PID file written while the server runs.
    pub pidfile: PathBuf,
    /// Enable debug logging.
    pub debug: bool,
    /// Use the simulated device instead of USB hardware.
    pub simulate: bool,
    /// Transport retry policy.
    pub retry: RetryPolicy,
    /// Input limits.
    pub limits: Limits,
    /// Simulated device parameters.
    pub simulation: SimulationConfig,
    /// Prometheus listen address (only used with the `prometheus` feature).
    pub metrics_listen: Option<SocketAddr>,
}

impl Default for StartupConfig {
    fn default() -> Self {
        StartupConfig {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            housecode: 0x0000,
            pidfile: PathBuf::from(DEFAULT_PIDFILE),
            debug: false,
            simulate: false,
            retry: RetryPolicy::default(),
            limits: Limits::default(),
            simulation: SimulationConfig::default(),
            metrics_listen: None,
        }
    }
}

impl StartupConfig {
    /// Parse a YAML document.
    pub fn from_yaml(yaml: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: StartupConfig =
            serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml, path)
    }

    /// Check values serde cannot check.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.attempts == 0 {
            return Err(ConfigError::Invalid("retry.attempts must be at least 1".into()));
        }
        if self.limits.max_line_length == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_line_length must be at least 1".into(),
            ));
        }
        if self.limits.max_commands_per_line == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_commands_per_line must be at least 1".into(),
            ));
        }
        if !(0.0..=127.5).contains(&self.simulation.temperature) {
            return Err(ConfigError::Invalid(
                "simulation.temperature must be within 0.0-127.5".into(),
            ));
        }
        Ok(())
    }

    /// Socket address to listen on.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

// ============================================================================
// Runtime configuration
// ============================================================================

/// Process-wide state shared by all connections.
///
/// The housecode is the only value that changes after startup; writes are
/// immediately visible to every connection.
#[derive(Debug)]
pub struct RuntimeConfig {
    housecode: RwLock<u16>,
    limits: Limits,
}

impl RuntimeConfig {
    /// Create runtime state with the given initial housecode and limits.
    pub fn new(housecode: u16, limits: Limits) -> Self {
        RuntimeConfig {
            housecode: RwLock::new(housecode),
            limits,
        }
    }

    /// Create runtime state from the startup configuration.
    pub fn from_startup(config: &StartupConfig) -> Self {
        Self::new(config.housecode, config.limits)
    }

    /// Current FS20 housecode.
    pub fn housecode(&self) -> Fs20Code {
        Fs20Code(*self.housecode.read())
    }

    /// Replace the FS20 housecode.
    pub fn set_housecode(&self, housecode: Fs20Code) {
        *self.housecode.write() = housecode.value();
    }

    /// Input limits.
    pub fn limits(&self) -> Limits {
        self.limits
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new(0x0000, Limits::default())
    }
}
