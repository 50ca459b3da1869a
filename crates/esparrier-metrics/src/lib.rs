//! Metrics for the Esparrier control client.
//!
//! Every metric the client records is declared here as a [`Metric`] constant,
//! so names, units and label keys live in one place. Recording goes through
//! the `metrics` facade; without an installed recorder it is a no-op.
//!
//! # Example
//!
//! ```rust
//! use esparrier_metrics::{metric_defs, OperationLabels};
//!
//! let labels = OperationLabels::new("127.0.0.1:7777", "get_state");
//! metrics::counter!(metric_defs::OPERATIONS.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// Whether a metric counts, tracks a level, or records a distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

/// A declared metric. Recording sites use [`Metric::name`] with the
/// `metrics` macros and must pass exactly the label keys in [`Metric::labels`].
///
/// ```rust
/// use esparrier_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const RETRIES: Metric = Metric::counter(
///     "esparrier.example.retries",
///     Unit::Count,
///     &["device"],
///     "Retries",
/// );
///
/// assert_eq!(RETRIES.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    pub name: &'static str,
    pub kind: MetricKind,
    pub unit: Unit,
    pub labels: &'static [&'static str],
    pub description: &'static str,
}

impl Metric {
    pub const fn counter(
        name: &'static str,
        unit: Unit,
        labels: &'static [&'static str],
        description: &'static str,
    ) -> Self {
        Metric {
            name,
            kind: MetricKind::Counter,
            unit,
            labels,
            description,
        }
    }

    pub const fn gauge(
        name: &'static str,
        unit: Unit,
        labels: &'static [&'static str],
        description: &'static str,
    ) -> Self {
        Metric {
            name,
            kind: MetricKind::Gauge,
            unit,
            labels,
            description,
        }
    }

    pub const fn histogram(
        name: &'static str,
        unit: Unit,
        labels: &'static [&'static str],
        description: &'static str,
    ) -> Self {
        Metric {
            name,
            kind: MetricKind::Histogram,
            unit,
            labels,
            description,
        }
    }

    /// Register unit and description with the installed recorder.
    pub fn describe(&self) {
        let (name, unit, description) = (self.name, self.unit, self.description);
        match self.kind {
            MetricKind::Counter => describe_counter!(name, unit, description),
            MetricKind::Gauge => describe_gauge!(name, unit, description),
            MetricKind::Histogram => describe_histogram!(name, unit, description),
        }
    }
}

/// All metrics recorded by the client.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Labels on transport-level metrics.
    pub const DEVICE_LABELS: &[&str] = &["device"];
    /// Labels on per-operation metrics.
    pub const OPERATION_LABELS: &[&str] = &["device", "op"];

    // ========================================================================
    // Transport
    // ========================================================================

    /// Frames written to the transport.
    pub const FRAMES_SENT: Metric = Metric::counter(
        "esparrier.transport.frames_sent",
        Unit::Count,
        DEVICE_LABELS,
        "Frames written to the transport",
    );

    /// Frames read from the transport.
    pub const FRAMES_RECEIVED: Metric = Metric::counter(
        "esparrier.transport.frames_received",
        Unit::Count,
        DEVICE_LABELS,
        "Frames read from the transport",
    );

    /// Bytes written to the transport.
    pub const BYTES_SENT: Metric = Metric::counter(
        "esparrier.transport.bytes_sent",
        Unit::Bytes,
        DEVICE_LABELS,
        "Bytes written to the transport",
    );

    /// Bytes read from the transport.
    pub const BYTES_RECEIVED: Metric = Metric::counter(
        "esparrier.transport.bytes_received",
        Unit::Bytes,
        DEVICE_LABELS,
        "Bytes read from the transport",
    );

    // ========================================================================
    // Operations
    // ========================================================================

    /// Operations started.
    ///
    /// Labels: device, op
    pub const OPERATIONS: Metric = Metric::counter(
        "esparrier.session.operations",
        Unit::Count,
        OPERATION_LABELS,
        "Protocol operations started",
    );

    /// Operations that failed.
    ///
    /// Labels: device, op, kind (connectivity, protocol, device, validation)
    pub const OPERATION_ERRORS: Metric = Metric::counter(
        "esparrier.session.operation_errors",
        Unit::Count,
        &["device", "op", "kind"],
        "Protocol operations that failed, by error kind",
    );

    /// Wall time of completed operations.
    pub const OPERATION_DURATION: Metric = Metric::histogram(
        "esparrier.session.operation_duration_ms",
        Unit::Milliseconds,
        OPERATION_LABELS,
        "Wall time of protocol operations",
    );

    /// 64-byte blocks moved by config or firmware transfers.
    ///
    /// Labels: device, direction (read, write, ota)
    pub const BLOCKS_TRANSFERRED: Metric = Metric::counter(
        "esparrier.transfer.blocks",
        Unit::Count,
        &["device", "direction"],
        "Blocks moved by multi-block transfers",
    );

    /// Firmware update progress reported by the device.
    pub const OTA_PROGRESS: Metric = Metric::gauge(
        "esparrier.ota.progress_percent",
        Unit::Percent,
        DEVICE_LABELS,
        "Firmware update progress reported by the device",
    );

    /// Every declared metric.
    pub const ALL: &[&Metric] = &[
        &FRAMES_SENT,
        &FRAMES_RECEIVED,
        &BYTES_SENT,
        &BYTES_RECEIVED,
        &OPERATIONS,
        &OPERATION_ERRORS,
        &OPERATION_DURATION,
        &BLOCKS_TRANSFERRED,
        &OTA_PROGRESS,
    ];
}

/// Labels identifying one operation on one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationLabels {
    /// Device or transport identifier.
    pub device: String,
    /// Operation name.
    pub op: &'static str,
}

impl OperationLabels {
    /// Create labels for an operation.
    pub fn new(device: impl Into<String>, op: &'static str) -> Self {
        Self {
            device: device.into(),
            op,
        }
    }

    /// Label pairs for the `metrics` macros.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![("device", self.device.clone()), ("op", self.op.to_string())]
    }

    /// Label pairs with extra pairs appended.
    pub fn with(&self, extra: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.extend_from_slice(extra);
        labels
    }
}

/// Register descriptions for every metric. Call once after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}
