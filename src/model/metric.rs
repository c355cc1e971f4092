use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::MetricId;

/// The kind of quantity a metric measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// A monotonically increasing count of occurrences.
    Counter,
    /// A point-in-time reading.
    Gauge,
    /// A categorical label rather than a number.
    Dimension,
    /// A duration.
    Time,
    /// Derived from other metrics via a [`Formula`].
    Composite,
}

/// How raw event quantities for a metric are aggregated over a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationType {
    Sum,
    Max,
    Min,
    Avg,
    Last,
    Percentile,
}

/// The formula backing a [`MetricKind::Composite`] metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Formula {
    /// An arithmetic expression over `{var}` placeholders, each bound to a
    /// source metric name via `variables`.
    Arithmetic {
        expression: String,
        variables: HashMap<String, String>,
    },
    /// A named builtin function applied to its inputs.
    Function { name: String, args: FormulaArgs },
}

/// Arguments accepted by a named [`Formula::Function`].
///
/// `weighted_sum` is the only function defined at this time; unknown
/// function names are rejected at formula-evaluation time rather than here,
/// so that new function shapes can be added without touching this enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaArgs {
    /// Maps a source metric name to its weight.
    pub weights: HashMap<String, rust_decimal::Decimal>,
}

/// A catalog entry describing one measurable quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// The engine-assigned unique identifier.
    pub id: MetricId,
    /// The metric's unique name, referenced by price components and events.
    pub name: String,
    /// A human-readable name.
    pub display_name: String,
    /// The unit of measurement (e.g. "API calls", "GB").
    pub unit: String,
    /// What kind of quantity this metric measures.
    pub kind: MetricKind,
    /// How raw quantities are aggregated.
    pub aggregation: AggregationType,
    /// Required when `kind` is [`MetricKind::Composite`].
    pub formula: Option<Formula>,
    /// Free-form hints for a presentation layer.
    pub display_properties: HashMap<String, String>,
}

/// A reference to a metric by either its id or its unique name, as accepted
/// by registry lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricRef {
    Id(MetricId),
    Name(String),
}

impl From<MetricId> for MetricRef {
    fn from(id: MetricId) -> Self {
        MetricRef::Id(id)
    }
}

impl From<&str> for MetricRef {
    fn from(name: &str) -> Self {
        MetricRef::Name(name.to_string())
    }
}

impl From<String> for MetricRef {
    fn from(name: String) -> Self {
        MetricRef::Name(name)
    }
}

impl fmt::Display for MetricRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricRef::Id(id) => write!(f, "{id}"),
            MetricRef::Name(name) => write!(f, "{name}"),
        }
    }
}
