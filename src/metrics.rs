//! Water Quality Index scoring.
//!
//! Four parameters feed the index. Each is mapped to a 0-100 sub-score by a
//! fixed penalty curve, and the sub-scores are blended with fixed weights
//! renormalized over the parameters that are actually present. Absent and
//! NaN values are skipped; they never count as zero.

use serde::Serialize;

use crate::models::Reading;

// ---

const PH_WEIGHT: f64 = 0.25;
const TDS_WEIGHT: f64 = 0.20;
const TURBIDITY_WEIGHT: f64 = 0.15;
const DO_WEIGHT: f64 = 0.15;

/// pH band with no penalty.
pub const PH_SAFE_MIN: f64 = 6.5;
pub const PH_SAFE_MAX: f64 = 8.5;

/// Points lost per pH unit outside the safe band.
const PH_PENALTY_PER_UNIT: f64 = 30.0;
/// Points lost per ppm of TDS.
const TDS_PENALTY_PER_PPM: f64 = 0.1;
/// Points lost per NTU of turbidity.
const TURBIDITY_PENALTY_PER_NTU: f64 = 2.0;
/// Dissolved oxygen at or above this level scores 100.
const DO_FULL_SCORE_MG_L: f64 = 6.0;

/// The subset of a reading that contributes to the index.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WqiInputs {
    pub ph: Option<f64>,
    pub tds: Option<f64>,
    pub turbidity: Option<f64>,
    pub dissolved_oxygen: Option<f64>,
}

impl From<&Reading> for WqiInputs {
    fn from(r: &Reading) -> Self {
        WqiInputs {
            ph: r.ph,
            tds: r.tds,
            turbidity: r.turbidity,
            dissolved_oxygen: r.dissolved_oxygen,
        }
    }
}

impl WqiInputs {
    /// True when at least one parameter would contribute to the index.
    pub fn any_usable(&self) -> bool {
        [self.ph, self.tds, self.turbidity, self.dissolved_oxygen]
            .into_iter()
            .any(|v| usable(v).is_some())
    }
}

/// Treat NaN as absent. Every rule reads its inputs through this.
pub(crate) fn usable(value: Option<f64>) -> Option<f64> {
    value.filter(|v| !v.is_nan())
}

fn ph_score(ph: f64) -> f64 {
    let outside = if ph < PH_SAFE_MIN {
        PH_SAFE_MIN - ph
    } else if ph > PH_SAFE_MAX {
        ph - PH_SAFE_MAX
    } else {
        0.0
    };
    (100.0 - outside * PH_PENALTY_PER_UNIT).clamp(0.0, 100.0)
}

fn tds_score(tds: f64) -> f64 {
    (100.0 - tds * TDS_PENALTY_PER_PPM).clamp(0.0, 100.0)
}

fn turbidity_score(ntu: f64) -> f64 {
    (100.0 - ntu * TURBIDITY_PENALTY_PER_NTU).clamp(0.0, 100.0)
}

fn dissolved_oxygen_score(mg_l: f64) -> f64 {
    (mg_l / DO_FULL_SCORE_MG_L * 100.0).clamp(0.0, 100.0)
}

/// Compute the WQI for a possibly partial set of inputs.
///
/// Returns 0 when no parameter is usable, otherwise the weighted average of
/// the available sub-scores rounded to the nearest integer.
pub fn compute_wqi(inputs: &WqiInputs) -> f64 {
    // ---
    let parts = [
        (usable(inputs.ph).map(ph_score), PH_WEIGHT),
        (usable(inputs.tds).map(tds_score), TDS_WEIGHT),
        (usable(inputs.turbidity).map(turbidity_score), TURBIDITY_WEIGHT),
        (
            usable(inputs.dissolved_oxygen).map(dissolved_oxygen_score),
            DO_WEIGHT,
        ),
    ];

    let (weighted, total_weight) = parts
        .iter()
        .filter_map(|(score, weight)| score.map(|s| (s * weight, *weight)))
        .fold((0.0, 0.0), |(ws, tw), (s, w)| (ws + s, tw + w));

    if total_weight == 0.0 {
        return 0.0;
    }
    (weighted / total_weight).round()
}

/// Convenience wrapper over [`compute_wqi`] for a full reading.
pub fn reading_wqi(reading: &Reading) -> f64 {
    compute_wqi(&WqiInputs::from(reading))
}

/// Display label for a WQI score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WqiCategory {
    Excellent,
    Good,
    Fair,
    Poor,
    VeryPoor,
}

impl WqiCategory {
    pub fn from_score(wqi: f64) -> Self {
        match wqi {
            w if w >= 90.0 => WqiCategory::Excellent,
            w if w >= 70.0 => WqiCategory::Good,
            w if w >= 50.0 => WqiCategory::Fair,
            w if w >= 25.0 => WqiCategory::Poor,
            _ => WqiCategory::VeryPoor,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WqiCategory::Excellent => "Excellent",
            WqiCategory::Good => "Good",
            WqiCategory::Fair => "Fair",
            WqiCategory::Poor => "Poor",
            WqiCategory::VeryPoor => "Very Poor",
        }
    }
}
