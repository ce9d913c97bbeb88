use strum::{
    EnumIter,
    EnumString,
    IntoEnumIterator,
};

/// What kind of producer a metric came from. The spec's tagged-variant
/// collapse of the original's separate counter/gauge/property/event
/// inheritance hierarchy: the wire schema (`metricType`, `dataType`,
/// `aggregations`, `carryOver`) already carries everything dispatch needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Property,
    Event,
}

/// The declared type of a metric's stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum DataType {
    Double,
    String,
    Boolean,
}

/// One aggregation flag. `bit()` is the position in the `Aggregations`
/// bitset; wire (de)serialization goes through `FromStr`/`Display` via the
/// `strum` derives below rather than hand-rolled string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, strum::Display, EnumIter)]
pub enum AggregationKind {
    #[strum(serialize = "MIN")]
    Min,
    #[strum(serialize = "MAX")]
    Max,
    #[strum(serialize = "SUM")]
    Sum,
    #[strum(serialize = "MEAN")]
    Mean,
    #[strum(serialize = "COUNT")]
    Count,
    #[strum(serialize = "TIME_TOTALS")]
    TimeTotals,
    #[strum(serialize = "TIME_PER_HOUR")]
    TimePerHour,
    #[strum(serialize = "LATEST_VALUE")]
    LatestValue,
}

impl AggregationKind {
    const fn bit(self) -> u16 {
        1 << (self as u16)
    }

    /// The suffix appended to the metric name for this aggregation's
    /// derived output (spec §4.5's table); `TimeTotals`/`TimePerHour` are
    /// per-observed-state and handled separately by the caller.
    pub const fn suffix(self) -> &'static str {
        match self {
            AggregationKind::Min => ".min",
            AggregationKind::Max => ".max",
            AggregationKind::Sum => ".sum",
            AggregationKind::Mean => ".mean",
            AggregationKind::Count => ".count",
            AggregationKind::LatestValue => ".latest",
            AggregationKind::TimeTotals => ".total_secs",
            AggregationKind::TimePerHour => ".secs/hour",
        }
    }
}

/// Orthogonal set of declared aggregations for one `(report_type,
/// event_name)` metric. Persisted as a plain integer column; unknown wire
/// strings are ignored rather than rejected (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Aggregations(u16);

impl Aggregations {
    pub const EMPTY: Self = Aggregations(0);

    pub fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn contains(self, kind: AggregationKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn insert(&mut self, kind: AggregationKind) {
        self.0 |= kind.bit();
    }

    /// Parse a list of wire strings (e.g. from the `aggregations` JSON
    /// array), silently dropping anything unrecognized.
    pub fn from_wire_strings<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::EMPTY;
        for value in values {
            if let Ok(kind) = value.as_ref().parse::<AggregationKind>() {
                set.insert(kind);
            }
        }
        set
    }

    pub fn iter(self) -> impl Iterator<Item = AggregationKind> {
        AggregationKind::iter().filter(move |kind| self.contains(*kind))
    }
}
