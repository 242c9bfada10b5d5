use serde::{Deserialize, Serialize};

/// The two kinds of metric this pipeline understands. Counters accumulate,
/// gauges overwrite — see `Repository::set_metric`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

impl std::str::FromStr for MetricKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counter" => Ok(MetricKind::Counter),
            "gauge" => Ok(MetricKind::Gauge),
            _ => Err(()),
        }
    }
}

/// A single metric record. Exactly one of `delta`/`value` is present, and it
/// must match `kind` — enforced at the repository boundary, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Metric {
    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            value: None,
        }
    }

    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
        }
    }

    /// A record is well-formed iff exactly one of delta/value is present and
    /// it matches `kind`.
    pub fn is_well_formed(&self) -> bool {
        match self.kind {
            MetricKind::Counter => self.delta.is_some() && self.value.is_none(),
            MetricKind::Gauge => self.value.is_some() && self.delta.is_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_is_well_formed() {
        assert!(Metric::counter("hits", 3).is_well_formed());
    }

    #[test]
    fn gauge_is_well_formed() {
        assert!(Metric::gauge("cpu", 0.5).is_well_formed());
    }

    #[test]
    fn counter_with_value_is_malformed() {
        let m = Metric {
            id: "hits".into(),
            kind: MetricKind::Counter,
            delta: None,
            value: Some(1.0),
        };
        assert!(!m.is_well_formed());
    }

    #[test]
    fn wire_shape_round_trips() {
        let m = Metric::counter("hits", 7);
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, r#"{"id":"hits","type":"counter","delta":7}"#);
        let back: Metric = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }
}
