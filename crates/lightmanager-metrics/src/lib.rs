//! Metrics for the Light Manager gateway.
//!
//! Every metric the gateway records is declared here as a [`Metric`] constant
//! so names, units and label keys live in one place. The crate re-exports
//! `metrics`; without an installed recorder all recording calls are no-ops.
//!
//! # Example
//!
//! ```rust,ignore
//! use lightmanager_metrics::{metric_defs, describe_metrics, CommandLabels};
//!
//! describe_metrics();
//!
//! let labels = CommandLabels::new("fs20", "ok");
//! metrics::counter!(metric_defs::COMMANDS.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;
#[cfg(feature = "prometheus")]
pub use metrics_exporter_prometheus;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
    /// A histogram for recording distributions.
    Histogram,
}

impl MetricKind {
    /// Returns the kind as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration with its metadata.
///
/// ```rust
/// use lightmanager_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const FRAMES: Metric = Metric::counter("lightmanager.example.frames")
///     .with_description("Frames seen")
///     .with_unit(Unit::Count)
///     .with_labels(&["family"]);
///
/// assert_eq!(FRAMES.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name.
    pub name: &'static str,
    /// The kind of metric.
    pub kind: MetricKind,
    /// Human-readable description.
    pub description: &'static str,
    /// The unit of measurement, if any.
    pub unit: Option<Unit>,
    /// Expected label keys.
    pub labels: &'static [&'static str],
}

impl Metric {
    /// Creates a new counter metric with the given name.
    pub const fn counter(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Counter,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new gauge metric with the given name.
    pub const fn gauge(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Gauge,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new histogram metric with the given name.
    pub const fn histogram(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Histogram,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Sets the description.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Sets the expected label keys.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }
}

/// All metric definitions for the gateway.
pub mod metric_defs {
    use super::{Metric, Unit};

    // ========================================================================
    // Commands
    // ========================================================================

    /// Commands executed, by family and result.
    ///
    /// Labels: family (fs20, uniroll, intertechno, scene, clock, temperature,
    /// housecode, session, system), result (ok, error)
    pub const COMMANDS: Metric = Metric::counter("lightmanager.commands")
        .with_description("Commands executed")
        .with_unit(Unit::Count)
        .with_labels(&["family", "result"]);

    /// Command lines rejected before execution (too long, too many commands).
    pub const LINES_REJECTED: Metric = Metric::counter("lightmanager.lines_rejected")
        .with_description("Input lines rejected before execution")
        .with_unit(Unit::Count)
        .with_labels(&["reason"]);

    // ========================================================================
    // USB transport
    // ========================================================================

    /// Individual frame transfer attempts.
    pub const USB_ATTEMPTS: Metric = Metric::counter("lightmanager.usb.attempts")
        .with_description("Frame transfer attempts")
        .with_unit(Unit::Count);

    /// Attempts that failed and were retried.
    pub const USB_RETRIES: Metric = Metric::counter("lightmanager.usb.retries")
        .with_description("Frame transfers retried after an error")
        .with_unit(Unit::Count);

    /// Sends that failed after exhausting all retries.
    pub const USB_FAILURES: Metric = Metric::counter("lightmanager.usb.failures")
        .with_description("Frame sends that exhausted all retries")
        .with_unit(Unit::Count);

    /// Time spent waiting for exclusive access to the device.
    pub const USB_LOCK_WAIT: Metric = Metric::histogram("lightmanager.usb.lock_wait_us")
        .with_description("Time spent waiting for the device lock in microseconds")
        .with_unit(Unit::Microseconds);

    // ========================================================================
    // Connections
    // ========================================================================

    /// Accepted client connections.
    pub const CONNECTIONS_ACCEPTED: Metric = Metric::counter("lightmanager.connections.accepted")
        .with_description("Client connections accepted")
        .with_unit(Unit::Count);

    /// Currently open client connections.
    pub const CONNECTIONS_ACTIVE: Metric = Metric::gauge("lightmanager.connections.active")
        .with_description("Client connections currently open")
        .with_unit(Unit::Count);

    /// HTTP requests answered, by status code.
    pub const HTTP_REQUESTS: Metric = Metric::counter("lightmanager.http.requests")
        .with_description("HTTP requests answered")
        .with_unit(Unit::Count)
        .with_labels(&["status"]);

    /// Returns a slice of all defined metrics.
    pub const ALL: &[&Metric] = &[
        // Commands
        &COMMANDS,
        &LINES_REJECTED,
        // USB transport
        &USB_ATTEMPTS,
        &USB_RETRIES,
        &USB_FAILURES,
        &USB_LOCK_WAIT,
        // Connections
        &CONNECTIONS_ACCEPTED,
        &CONNECTIONS_ACTIVE,
        &HTTP_REQUESTS,
    ];
}

/// Labels for [`metric_defs::COMMANDS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLabels {
    /// Command family.
    pub family: &'static str,
    /// `ok` or `error`.
    pub result: &'static str,
}

impl CommandLabels {
    /// Creates labels for one command outcome.
    pub fn new(family: &'static str, result: &'static str) -> Self {
        Self { family, result }
    }

    /// Creates labels from a success flag.
    pub fn from_outcome(family: &'static str, ok: bool) -> Self {
        Self::new(family, if ok { "ok" } else { "error" })
    }

    /// Converts the labels to the metrics crate label format.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![
            ("family", self.family.to_string()),
            ("result", self.result.to_string()),
        ]
    }
}

/// Describes all gateway metrics.
///
/// Call once at startup, after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

/// Install a Prometheus recorder serving `/metrics` on `addr`.
#[cfg(feature = "prometheus")]
pub fn install_prometheus(
    addr: std::net::SocketAddr,
) -> Result<(), metrics_exporter_prometheus::BuildError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    describe_metrics();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_labels() {
        let labels = CommandLabels::from_outcome("fs20", false).to_labels();
        assert_eq!(labels.len(), 2);
        assert!(labels.contains(&("family", "fs20".to_string())));
        assert!(labels.contains(&("result", "error".to_string())));
        assert_eq!(CommandLabels::from_outcome("scene", true).result, "ok");
    }

    #[test]
    fn test_metric_definitions() {
        assert_eq!(metric_defs::COMMANDS.name, "lightmanager.commands");
        assert_eq!(metric_defs::COMMANDS.labels, &["family", "result"]);
        assert_eq!(metric_defs::CONNECTIONS_ACTIVE.kind, MetricKind::Gauge);
        assert_eq!(metric_defs::USB_LOCK_WAIT.kind, MetricKind::Histogram);
        assert_eq!(metric_defs::USB_LOCK_WAIT.unit, Some(Unit::Microseconds));
    }

    #[test]
    fn test_all_metrics_unique() {
        let mut names: Vec<_> = metric_defs::ALL.iter().map(|m| m.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), metric_defs::ALL.len());
        assert!(names.iter().all(|n| n.starts_with("lightmanager.")));
    }

    #[test]
    fn test_describe_without_recorder() {
        describe_metrics();
    }
}
