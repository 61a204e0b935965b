use serde::Serialize;

/// Prometheus metric type of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Value that can go up or down.
    Gauge,
    /// Monotonically increasing value.
    Counter,
}

impl MetricKind {
    /// Get the TYPE comment string for Prometheus exposition format.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single named, labeled metric value taken from an upstream response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    /// Full Prometheus metric name (e.g., "klipper_extruder_temperature").
    pub name: String,

    /// Help text written to the `# HELP` line.
    pub help: String,

    /// Metric type.
    pub kind: MetricKind,

    /// Label pairs in emission order (e.g., `("sensor", "chamber")`).
    pub labels: Vec<(String, String)>,

    /// The measured value.
    pub value: f64,
}

impl Sample {
    /// Create a new unlabeled sample.
    pub fn new(
        name: impl Into<String>,
        help: impl Into<String>,
        kind: MetricKind,
        value: f64,
    ) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            kind,
            labels: Vec::new(),
            value,
        }
    }

    /// Create a gauge sample.
    pub fn gauge(name: impl Into<String>, help: impl Into<String>, value: f64) -> Self {
        Self::new(name, help, MetricKind::Gauge, value)
    }

    /// Create a counter sample.
    pub fn counter(name: impl Into<String>, help: impl Into<String>, value: f64) -> Self {
        Self::new(name, help, MetricKind::Counter, value)
    }

    /// Add a label to this sample.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }

    /// Look up a label value by name.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}
