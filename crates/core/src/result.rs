//! Calibration result payload.
//!
//! A successful task's `result` is an object wrapping the raw script
//! output and, when the script emitted its JSON block, a structured
//! [`ResultData`]. Every layer is decoded through [`crate::normalize`], so
//! missing or oddly-shaped fields degrade to `None` instead of failing the
//! whole task.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::normalize::{as_bool, as_f64, as_items, as_string, as_u64};

/// Top-level `result` of a terminal task.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CalibrationResult {
    /// Raw stdout of the calibration script.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
    /// Structured summary parsed from the script output, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_data: Option<ResultData>,
}

impl CalibrationResult {
    /// Decode any JSON value into a result.
    ///
    /// Objects are read field by field; a bare string is taken as raw
    /// output; anything else is kept as its JSON text.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self {
                output: field(map, "output").and_then(as_string),
                status: field(map, "status").and_then(as_string),
                log_file: field(map, "log_file").and_then(as_string),
                result_data: field(map, "result_data").and_then(ResultData::from_value),
            },
            Value::String(text) => Self {
                output: Some(text.clone()),
                ..Self::default()
            },
            Value::Null => Self::default(),
            other => Self {
                output: Some(other.to_string()),
                ..Self::default()
            },
        }
    }
}

impl<'de> Deserialize<'de> for CalibrationResult {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Ok(Self::from_value(&Value::deserialize(d)?))
    }
}

/// Structured output of a calibration run.
///
/// Exactly one of `top_causes` / `algorithms` is normally populated, but
/// neither is guaranteed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultData {
    pub metadata: Metadata,
    /// Single-algorithm ranking, in server order.
    pub top_causes: Vec<Cause>,
    /// Ensemble rankings keyed by algorithm, in server order.
    pub algorithms: Vec<AlgorithmResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
}

impl ResultData {
    /// Returns `None` when the value is not an object.
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        Some(Self {
            metadata: field(map, "metadata")
                .map(Metadata::from_value)
                .unwrap_or_default(),
            top_causes: field(map, "top_causes").map(causes).unwrap_or_default(),
            algorithms: field(map, "algorithms")
                .and_then(Value::as_object)
                .map(|algos| {
                    algos
                        .iter()
                        .map(|(name, entry)| AlgorithmResult::from_entry(name, entry))
                        .collect()
                })
                .unwrap_or_default(),
            summary: field(map, "summary").and_then(Summary::from_value),
        })
    }

    pub fn is_ensemble(&self) -> bool {
        !self.algorithms.is_empty()
    }
}

/// Run parameters echoed back by the calibration script.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metadata {
    pub mode: Option<String>,
    pub country: Option<String>,
    pub age_group: Option<String>,
    pub data_type: Option<String>,
    pub nsim: Option<u64>,
    pub n_deaths: Option<u64>,
}

impl Metadata {
    pub fn from_value(value: &Value) -> Self {
        let Some(map) = value.as_object() else {
            return Self::default();
        };
        Self {
            mode: field(map, "mode").and_then(as_string),
            country: field(map, "country").and_then(as_string),
            age_group: field(map, "age_group").and_then(as_string),
            data_type: field(map, "data_type").and_then(as_string),
            nsim: field(map, "nsim").and_then(as_u64),
            n_deaths: field(map, "n_deaths").and_then(as_u64),
        }
    }
}

/// One ranked cause. Rank is the position in its list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Cause {
    pub cause: Option<String>,
    /// Calibrated CSMF, a fraction in `[0, 1]`.
    pub calibrated_csmf: Option<f64>,
    /// Uncalibrated CSMF (single-algorithm mode only).
    pub uncalibrated_csmf: Option<f64>,
}

impl Cause {
    /// A non-object entry becomes an empty row so later ranks stay put.
    pub fn from_value(value: &Value) -> Self {
        let Some(map) = value.as_object() else {
            return Self::default();
        };
        Self {
            cause: field(map, "cause").and_then(as_string),
            calibrated_csmf: field(map, "calibrated_csmf").and_then(as_f64),
            uncalibrated_csmf: field(map, "uncalibrated_csmf").and_then(as_f64),
        }
    }
}

/// Ranking produced by one algorithm in an ensemble run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlgorithmResult {
    pub name: String,
    pub causes: Vec<Cause>,
}

impl AlgorithmResult {
    /// Accepts either a bare cause list or an object with `top_causes`.
    fn from_entry(name: &str, entry: &Value) -> Self {
        let causes = match entry {
            Value::Object(map) => field(map, "top_causes").map(causes).unwrap_or_default(),
            other => causes(other),
        };
        Self {
            name: name.to_string(),
            causes,
        }
    }
}

/// Aggregate counters reported alongside the ranking.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub total_causes: Option<u64>,
    pub total_algorithms: Option<u64>,
    pub calibration_applied: Option<bool>,
}

impl Summary {
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        Some(Self {
            total_causes: field(map, "total_causes").and_then(as_u64),
            total_algorithms: field(map, "total_algorithms").and_then(as_u64),
            calibration_applied: field(map, "calibration_applied").and_then(as_bool),
        })
    }
}

fn field<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|v| !v.is_null())
}

fn causes(value: &Value) -> Vec<Cause> {
    as_items(value).iter().map(Cause::from_value).collect()
}
