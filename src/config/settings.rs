use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::detector::DetectorConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub dpi: u32,
    pub raster: bool,
    pub parallel_workers: usize,
    pub cache_dir: PathBuf,
    /// 外部レイアウト座標に掛ける較正係数
    pub calibration: f64,
    /// 外部レイアウトが前提とする解像度
    pub external_source_dpi: f64,
    pub detector: DetectorConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            dpi: 96,
            raster: true,
            parallel_workers: 0,
            cache_dir: PathBuf::from(".cache"),
            calibration: 1.0,
            external_source_dpi: 72.0,
            detector: DetectorConfig::default(),
        }
    }
}

impl Settings {
    pub fn from_yaml(yaml: &str) -> crate::error::Result<Self> {
        let settings: Settings = serde_yml::from_str(yaml).map_err(|e| {
            crate::error::RegionError::config(format!("Failed to parse settings YAML: {e}"))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    fn validate(&self) -> crate::error::Result<()> {
        if self.dpi == 0 {
            return Err(crate::error::RegionError::config("dpi must be positive"));
        }
        if !(self.calibration.is_finite() && self.calibration > 0.0) {
            return Err(crate::error::RegionError::config(format!(
                "calibration must be a positive number, got {}",
                self.calibration
            )));
        }
        if !(self.external_source_dpi.is_finite() && self.external_source_dpi > 0.0) {
            return Err(crate::error::RegionError::config(
                "external_source_dpi must be positive",
            ));
        }
        if self.detector.raster.downsample == 0 {
            return Err(crate::error::RegionError::config(
                "detector.raster.downsample must be at least 1",
            ));
        }
        Ok(())
    }
}
