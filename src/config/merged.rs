use std::path::PathBuf;

use super::detector::DetectorConfig;
use super::job::Job;
use super::settings::Settings;

#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub dpi: u32,
    pub raster: bool,
    pub parallel_workers: usize,
    pub cache_dir: PathBuf,
    pub calibration: f64,
    pub external_source_dpi: f64,
    pub external_layout: Option<String>,
    pub debug_candidates: bool,
    pub detector: DetectorConfig,
}

impl MergedConfig {
    /// JobのOption値がSomeならJobの値を、NoneならSettingsの値を使用する。
    pub fn new(settings: &Settings, job: &Job) -> Self {
        MergedConfig {
            dpi: job.dpi.unwrap_or(settings.dpi),
            raster: job.raster.unwrap_or(settings.raster),
            parallel_workers: settings.parallel_workers,
            cache_dir: settings.cache_dir.clone(),
            calibration: settings.calibration,
            external_source_dpi: settings.external_source_dpi,
            external_layout: job.external_layout.clone(),
            debug_candidates: job.debug_candidates.unwrap_or(false),
            detector: settings.detector.clone(),
        }
    }

    /// コンテンツ単位 → ピクセルの倍率（72 DPI = 1）。
    pub fn render_scale(&self) -> f64 {
        self.dpi as f64 / 72.0
    }
}
