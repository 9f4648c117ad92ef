//! Metrics for the r2 device router.
//!
//! Every metric the router, the transports and the mesh layer emit is declared
//! once in [`metric_defs`]. Call sites build their labels through
//! [`NodeLabels`] or [`transport_labels`] so the label keys match the table.
//!
//! ```rust
//! use r2_metrics::{metric_defs, NodeLabels};
//!
//! let labels = NodeLabels::new(3, "slave");
//! r2_metrics::metrics::counter!(metric_defs::ROUTER_REQUESTS.name, &labels.for_action("Ping"))
//!     .increment(1);
//! ```
//!
//! Without an installed recorder the `metrics` macros are no-ops. With the
//! `prometheus` feature, [`install_prometheus`] serves them over HTTP.

use std::fmt::Display;

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// How a metric is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

/// One row of the metric table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metric {
    pub name: &'static str,
    pub kind: MetricKind,
    pub unit: Unit,
    pub description: &'static str,
    /// Label keys every emission carries.
    pub labels: &'static [&'static str],
}

impl Metric {
    /// Register the description and unit with the installed recorder.
    pub fn describe(&self) {
        match self.kind {
            MetricKind::Counter => describe_counter!(self.name, self.unit, self.description),
            MetricKind::Gauge => describe_gauge!(self.name, self.unit, self.description),
            MetricKind::Histogram => describe_histogram!(self.name, self.unit, self.description),
        }
    }
}

macro_rules! metric_table {
    ($(
        $(#[$doc:meta])*
        $ident:ident = $kind:ident($name:literal, $unit:ident, [$($label:literal),*]) $description:literal;
    )*) => {
        $(
            $(#[$doc])*
            pub const $ident: Metric = Metric {
                name: $name,
                kind: MetricKind::$kind,
                unit: Unit::$unit,
                description: $description,
                labels: &[$($label),*],
            };
        )*

        /// Every metric in the table.
        pub const ALL: &[&Metric] = &[$(&$ident),*];
    };
}

/// All metric definitions.
pub mod metric_defs {
    use super::{Metric, MetricKind, Unit};

    metric_table! {
        // Router

        /// Requests handled by the dispatcher.
        ROUTER_REQUESTS = Counter("r2.router.requests", Count, ["node", "role", "action"])
            "Requests handled by the dispatcher";
        /// Error responses produced by the dispatcher, by error code.
        ROUTER_ERRORS = Counter("r2.router.errors", Count, ["node", "role", "code"])
            "Error responses produced by the dispatcher";
        /// Time spent executing a request, forwarding included.
        ROUTER_REQUEST_TIME = Histogram("r2.router.request_time_ms", Milliseconds, ["node", "role"])
            "Time spent executing a request";
        ROUTER_DEVICES = Gauge("r2.router.devices", Count, ["node", "role"])
            "Devices currently registered";

        // Transports

        TRANSPORT_FRAMES_RX = Counter("r2.transport.frames_rx", Count, ["transport"])
            "Complete frames received from a host transport";
        /// Timeouts, bad sizes and bad checksums.
        TRANSPORT_FRAME_ERRORS = Counter("r2.transport.frame_errors", Count, ["transport", "code"])
            "Frames rejected by a transport";

        // Mesh

        MESH_TX_MESSAGES = Counter("r2.mesh.tx_messages", Count, ["node", "role", "kind"])
            "Messages written to the mesh";
        MESH_RX_MESSAGES = Counter("r2.mesh.rx_messages", Count, ["node", "role", "kind"])
            "Messages read from the mesh";
        MESH_DUPLICATES = Counter("r2.mesh.duplicates", Count, ["node", "role"])
            "Responses discarded as duplicates";
        /// Forwarded requests that got no response before the read timeout.
        MESH_TIMEOUTS = Counter("r2.mesh.timeouts", Count, ["node", "role"])
            "Master reads that timed out";
        MESH_WRITE_RETRIES = Counter("r2.mesh.write_retries", Count, ["node", "role"])
            "Slave response writes that were retried";
        MESH_RENEWALS = Counter("r2.mesh.renewals", Count, ["node", "role"])
            "Slave address renewals";
        /// Send to matching response.
        MESH_ROUND_TRIP = Histogram("r2.mesh.round_trip_ms", Milliseconds, ["node", "role"])
            "Round trip of a forwarded request";

        // Sleep

        SLEEP_CYCLES = Counter("r2.sleep.cycles", Count, ["node", "role"])
            "Radio sleep cycles entered";
    }
}

/// Mesh message types as they appear in the `kind` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Message,
    Ping,
}

impl MessageKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            MessageKind::Message => "message",
            MessageKind::Ping => "ping",
        }
    }
}

/// Labels identifying the node a metric belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLabels {
    /// Node address.
    pub node: u8,
    /// Node role (standalone, master, slave).
    pub role: &'static str,
}

/// Label set in the form the `metrics` macros accept.
pub type Labels = Vec<(&'static str, String)>;

impl NodeLabels {
    pub fn new(node: u8, role: &'static str) -> Self {
        Self { node, role }
    }

    /// `node` and `role` only.
    pub fn base(&self) -> Labels {
        vec![("node", self.node.to_string()), ("role", self.role.to_string())]
    }

    /// Labels of a request counted per action.
    pub fn for_action(&self, action: impl Display) -> Labels {
        self.extended("action", action.to_string())
    }

    /// Labels of an error counted per error code.
    pub fn for_code(&self, code: impl Display) -> Labels {
        self.extended("code", code.to_string())
    }

    /// Labels of mesh traffic counted per message type.
    pub fn for_message(&self, kind: MessageKind) -> Labels {
        self.extended("kind", kind.as_str().to_string())
    }

    fn extended(&self, key: &'static str, value: String) -> Labels {
        let mut labels = self.base();
        labels.push((key, value));
        labels
    }
}

/// Labels of a host transport counter, with the error code when rejected.
pub fn transport_labels(transport: &'static str, code: Option<&dyn Display>) -> Labels {
    let mut labels = vec![("transport", transport.to_string())];
    if let Some(code) = code {
        labels.push(("code", code.to_string()));
    }
    labels
}

/// Registers the description of every metric.
///
/// Call once at startup, after the recorder is installed.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

/// Error returned when the Prometheus exporter can't start.
#[cfg(feature = "prometheus")]
pub use metrics_exporter_prometheus::BuildError as ExporterError;

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// The listener runs on the current Tokio runtime when there is one.
#[cfg(feature = "prometheus")]
pub fn install_prometheus(addr: std::net::SocketAddr) -> Result<(), ExporterError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_labels() {
        let labels = NodeLabels::new(3, "slave");
        assert_eq!(
            labels.base(),
            vec![("node", "3".to_string()), ("role", "slave".to_string())]
        );
        assert_eq!(labels.for_action("Ping")[2], ("action", "Ping".to_string()));
        assert_eq!(labels.for_code(7)[2], ("code", "7".to_string()));
        assert_eq!(
            labels.for_message(MessageKind::Ping)[2],
            ("kind", "ping".to_string())
        );
    }

    #[test]
    fn test_transport_labels() {
        assert_eq!(transport_labels("serial", None).len(), 1);
        let labels = transport_labels("i2c", Some(&"bad checksum"));
        assert_eq!(labels[1], ("code", "bad checksum".to_string()));
    }

    #[test]
    fn test_label_helpers_match_table() {
        let labels = NodeLabels::new(1, "master");
        let keys = |labels: Labels| labels.into_iter().map(|(k, _)| k).collect::<Vec<_>>();
        assert_eq!(keys(labels.for_action("Ping")), metric_defs::ROUTER_REQUESTS.labels);
        assert_eq!(keys(labels.for_code(1)), metric_defs::ROUTER_ERRORS.labels);
        assert_eq!(
            keys(labels.for_message(MessageKind::Message)),
            metric_defs::MESH_TX_MESSAGES.labels
        );
        assert_eq!(keys(labels.base()), metric_defs::MESH_TIMEOUTS.labels);
        assert_eq!(
            keys(transport_labels("serial", Some(&1))),
            metric_defs::TRANSPORT_FRAME_ERRORS.labels
        );
    }

    #[test]
    fn test_table() {
        assert_eq!(metric_defs::ROUTER_DEVICES.kind, MetricKind::Gauge);
        assert_eq!(metric_defs::MESH_ROUND_TRIP.unit, Unit::Milliseconds);
        assert_eq!(metric_defs::ALL.len(), 14);

        let mut names: Vec<_> = metric_defs::ALL.iter().map(|m| m.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), metric_defs::ALL.len());
    }

    #[test]
    fn test_describe_without_recorder() {
        describe_metrics();
    }
}
