use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::align::{FillPolicy, Window};
use crate::derive::{FloorRule, OutlierMethod};
use crate::TsError;

/// Caller-tunable parameters for an analysis run.
///
/// Windows name the legs of a trip, `constants` carries unit-scale factors
/// (fuel density, emission factor, ...). Thresholds are kept here rather
/// than in code because they vary from one analysis to the next.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub windows: Vec<Window>,
    pub constants: BTreeMap<String, f64>,
    pub fill: FillPolicy,
    pub ratio_floor: f64,
    pub floor_rule: FloorRule,
    pub ratio_fallback: Option<f64>,
    pub outlier_method: OutlierMethod,
    pub outlier_threshold: f64,
    pub smooth_window: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            windows: Vec::new(),
            constants: BTreeMap::new(),
            fill: FillPolicy::ForwardFill,
            ratio_floor: 0.0,
            floor_rule: FloorRule::AtOrBelow,
            ratio_fallback: None,
            outlier_method: OutlierMethod::Zscore,
            outlier_threshold: 3.0,
            smooth_window: 5,
        }
    }
}

impl AnalysisConfig {
    pub fn from_json_str(data: &str) -> Result<Self, TsError> {
        let config: AnalysisConfig =
            serde_json::from_str(data).map_err(|e| TsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, TsError> {
        let data = fs::read_to_string(path)
            .map_err(|e| TsError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&data)
    }

    pub fn validate(&self) -> Result<(), TsError> {
        let mut names = HashSet::new();
        for window in &self.windows {
            window.validate()?;
            if !names.insert(window.name.as_str()) {
                return Err(TsError::InvalidParameter(format!(
                    "window {} defined twice",
                    window.name
                )));
            }
        }
        if self.smooth_window == 0 {
            return Err(TsError::InvalidParameter(
                "smooth_window must be at least 1".into(),
            ));
        }
        if self.outlier_threshold.is_nan() || self.outlier_threshold < 0.0 {
            return Err(TsError::InvalidParameter(
                "outlier_threshold must be non-negative".into(),
            ));
        }
        if !self.ratio_floor.is_finite() {
            return Err(TsError::InvalidParameter("ratio_floor must be finite".into()));
        }
        Ok(())
    }

    pub fn window(&self, name: &str) -> Result<&Window, TsError> {
        self.windows
            .iter()
            .find(|w| w.name == name)
            .ok_or_else(|| TsError::UnknownWindow(name.to_string()))
    }

    pub fn constant(&self, name: &str) -> Result<f64, TsError> {
        self.constants
            .get(name)
            .copied()
            .ok_or_else(|| TsError::UnknownConstant(name.to_string()))
    }

    /// SHA-256 of the serialized config, stamped on reports for provenance.
    pub fn fingerprint(&self) -> Result<String, TsError> {
        let bytes = serde_json::to_vec(self).map_err(|e| TsError::Config(e.to_string()))?;
        let digest = Sha256::digest(&bytes);
        let mut out = String::with_capacity(digest.len() * 2);
        for b in digest {
            use std::fmt::Write;
            let _ = write!(&mut out, "{:02x}", b);
        }
        Ok(out)
    }
}
