//! Light Manager gateway
//!
//! A daemon that accepts a line oriented text protocol over TCP (and a
//! minimal HTTP variant on the same port) and turns each command into frames
//! for a single jbmedia Light Manager attached over USB.
//!
//! # Architecture
//!
//! ```text
//! TcpListener ──► connection task ──► session worker ──► HttpFrontEnd
//!                  (LineCodec)         (thread)              │
//!                                                           ▼
//!                                                     CommandEngine
//!                                                           │
//!                                                           ▼
//!                                                  HardwareTransport ──► DeviceIo
//! ```
//!
//! Every connection runs its commands on its own worker thread, so a slow
//! device exchange or a `WAIT` only stalls the issuing client. All device
//! traffic is serialized by the [`HardwareTransport`] lock, and the one piece
//! of shared mutable state (the FS20 housecode) lives in [`RuntimeConfig`].

pub mod clock;
pub mod clock_sync;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod help;
pub mod http;
pub mod line_codec;
pub mod output;
pub mod pidfile;
pub mod server;
pub mod session;
pub mod transport;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{Limits, RetryPolicy, RuntimeConfig, SimulationConfig, StartupConfig};
pub use device::{DeviceIo, SimulatedDevice};
pub use engine::{CommandEngine, Outcome};
pub use error::{CommandError, ConfigError, DeviceIoError, TransportError};
pub use http::{HttpError, HttpFrontEnd};
pub use output::{HtmlSink, OutputSink, PlainSink};
pub use pidfile::PidFile;
pub use server::{ConnectionRegistry, GatewayServer, ShutdownHandle};
pub use session::ClientSession;
pub use transport::HardwareTransport;

/// Program name reported by `VERSION`, `HELP` and the HTTP `Server` header.
pub const PROGRAM_NAME: &str = "Lightmanager";

/// Program version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
