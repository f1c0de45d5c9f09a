use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaugeThreshold {
    pub label: String,
    pub start: f64,
    pub end: f64,
    pub color: String,
}

impl GaugeThreshold {
    fn contains(&self, value: f64) -> bool {
        value >= self.start && value < self.end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaugeInputData {
    pub value: f64,
    pub max_value: f64,
    pub threshold: GaugeThreshold,
}

impl GaugeInputData {
    /// Share of the gauge arc the value covers, clamped to `0..=1`.
    pub fn fraction(&self) -> f64 {
        (self.value / self.max_value).clamp(0.0, 1.0)
    }
}

/// Resolves what a gauge should show, or `None` to render the empty ring.
pub fn gauge_input(
    value: Option<f64>,
    max_value: Option<f64>,
    thresholds: &[GaugeThreshold],
) -> Option<GaugeInputData> {
    let (value, max_value) = (value?, max_value?);
    if max_value <= 0.0 {
        return None;
    }

    thresholds
        .iter()
        .find(|threshold| threshold.contains(value))
        .map(|threshold| GaugeInputData {
            value,
            max_value,
            threshold: threshold.clone(),
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricHealth {
    Healthy,
    Warning,
    Critical,
    NotSpecified,
}

/// Single-value metric as shown by the metric display widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricAggregation {
    pub value: f64,
    pub health: MetricHealth,
    #[serde(default)]
    pub units: Option<String>,
}

impl MetricAggregation {
    /// Drops a blank unit so the display shows the bare number.
    pub fn normalize(self) -> Self {
        let units = self.units.filter(|u| !u.trim().is_empty());
        Self { units, ..self }
    }
}
