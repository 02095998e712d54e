//! Calibration submission payload and validation.
//!
//! Mirrors the body accepted by `POST /tasks/calibration`. Field-level
//! bounds are enforced with `validator`; mode-dependent requirements are
//! checked by [`CalibrationRequest::check`].

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;

/// Prepare data and calibrate (pipeline steps 1-5).
pub const MODE_FULL: &str = "full";
/// Calibrate already-prepared data (steps 4-5); needs `calib_data_path`.
pub const MODE_CALIBRATION_ONLY: &str = "calibration_only";
/// Blend several algorithms' outputs; needs at least one algorithm path.
pub const MODE_ENSEMBLE: &str = "ensemble";

/// All valid submission modes.
pub const VALID_MODES: &[&str] = &[MODE_FULL, MODE_CALIBRATION_ONLY, MODE_ENSEMBLE];

pub const DEFAULT_COUNTRY: &str = "Mozambique";
pub const DEFAULT_AGE_GROUP: &str = "neonate";
pub const DEFAULT_DATA_TYPE: &str = "WHO2016";
pub const DEFAULT_NSIM: u32 = 1000;

/// Age groups the calibration scripts understand.
pub const VALID_AGE_GROUPS: &[&str] = &["neonate", "child", "adult"];

/// Body of a calibration submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CalibrationRequest {
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calib_data_path: Option<String>,
    #[validate(length(min = 1))]
    pub country: String,
    pub age_group: String,
    #[validate(length(min = 1))]
    pub data_type: String,
    /// Number of InSilicoVA simulations.
    #[validate(range(min = 1))]
    pub nsim: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub eava_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insilicova_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interva_path: Option<String>,

    /// Misclassification-matrix prior type (`prior`, `fixed`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mmat_type: Option<String>,
    #[serde(rename = "nMCMC", skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub n_mcmc: Option<u32>,
    #[serde(rename = "nBurn", skip_serializing_if = "Option::is_none")]
    pub n_burn: Option<u32>,
    #[serde(rename = "nThin", skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub n_thin: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for CalibrationRequest {
    fn default() -> Self {
        Self {
            mode: MODE_FULL.into(),
            dataset_path: None,
            calib_data_path: None,
            country: DEFAULT_COUNTRY.into(),
            age_group: DEFAULT_AGE_GROUP.into(),
            data_type: DEFAULT_DATA_TYPE.into(),
            nsim: DEFAULT_NSIM,
            eava_path: None,
            insilicova_path: None,
            interva_path: None,
            mmat_type: None,
            n_mcmc: None,
            n_burn: None,
            n_thin: None,
            seed: None,
        }
    }
}

impl CalibrationRequest {
    /// Run field bounds and mode-specific checks.
    pub fn check(&self) -> Result<(), CoreError> {
        self.validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;
        validate_mode(&self.mode).map_err(CoreError::Validation)?;
        validate_age_group(&self.age_group).map_err(CoreError::Validation)?;

        if self.mode == MODE_CALIBRATION_ONLY && is_blank(&self.calib_data_path) {
            return Err(CoreError::Validation(
                "calib_data_path is required for calibration_only mode".into(),
            ));
        }
        if self.mode == MODE_ENSEMBLE
            && [&self.eava_path, &self.insilicova_path, &self.interva_path]
                .into_iter()
                .all(is_blank)
        {
            return Err(CoreError::Validation(
                "ensemble mode needs at least one of eava_path, insilicova_path, interva_path"
                    .into(),
            ));
        }
        Ok(())
    }
}

/// Validate that a mode string is one of [`VALID_MODES`].
pub fn validate_mode(mode: &str) -> Result<(), String> {
    if VALID_MODES.contains(&mode) {
        Ok(())
    } else {
        Err(format!(
            "Invalid mode '{mode}'. Must be one of: {}",
            VALID_MODES.join(", ")
        ))
    }
}

/// Validate that an age group is one of [`VALID_AGE_GROUPS`].
pub fn validate_age_group(age_group: &str) -> Result<(), String> {
    if VALID_AGE_GROUPS.contains(&age_group) {
        Ok(())
    } else {
        Err(format!(
            "Invalid age group '{age_group}'. Must be one of: {}",
            VALID_AGE_GROUPS.join(", ")
        ))
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |s| s.trim().is_empty())
}
