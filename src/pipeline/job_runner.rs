// Phase 8: ジョブ単位: PDF読込 -> 描画 -> 並列検出 -> JSON書き出し

use std::collections::BTreeMap;
use std::path::PathBuf;

use rayon::prelude::*;
use tracing::info;

use crate::cache::hash::CacheSettings;
use crate::cache::store::CacheStore;
use crate::config::detector::DetectorConfig;
use crate::detect::geometry::{RectCandidate, Region};
use crate::error::RegionError;
use crate::export::{
    ExternalLayout, ExternalProjection, project_external_blocks, write_candidates_json,
    write_regions_json,
};
use crate::pdf::reader::PdfReader;
use crate::pipeline::page_processor::{
    PageData, ProcessedPage, attach_render, lookup_cached, process_page,
};

/// 外部レイアウトの取り込み設定。
#[derive(Debug, Clone)]
pub struct ExternalLayoutConfig {
    pub path: PathBuf,
    pub source_dpi: f64,
    pub calibration: f64,
}

/// Configuration for a single job.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// 1-based page numbers. Empty means every page.
    pub pages: Vec<u32>,
    pub dpi: u32,
    pub raster: bool,
    pub detector: DetectorConfig,
    pub cache_dir: Option<PathBuf>,
    /// 0 = rayon default
    pub parallel_workers: usize,
    pub debug_candidates: bool,
    /// 指定時は検出を行わず外部レイアウトを射影する
    pub external_layout: Option<ExternalLayoutConfig>,
}

impl JobConfig {
    pub fn render_scale(&self) -> f64 {
        self.dpi as f64 / 72.0
    }

    /// 候補の書き出し先（`<output>.candidates.json`）。
    pub fn candidates_path(&self) -> PathBuf {
        self.output_path.with_extension("candidates.json")
    }
}

/// Result of processing a single job.
#[derive(Debug)]
pub struct JobResult {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub pages_processed: usize,
    pub regions_found: usize,
}

/// Run a single detection job through the 4-phase pipeline.
///
/// Phase A: Content stream decoding + cache lookup (sequential)
/// Phase B: Page rendering and text extraction (sequential, pdfium is single-threaded)
/// Phase C: Region detection (rayon parallel)
/// Phase D: JSON export (sequential)
pub fn run_job(config: &JobConfig) -> crate::error::Result<JobResult> {
    if config.dpi == 0 {
        return Err(RegionError::config("dpi must be positive"));
    }
    let reader = PdfReader::open(&config.input_path)?;
    let page_count = reader.page_count();

    let pages: Vec<u32> = if config.pages.is_empty() {
        (1..=page_count).collect()
    } else {
        config.pages.clone()
    };
    for &page in &pages {
        RegionError::check_page(page, page_count)?;
    }

    if let Some(external) = &config.external_layout {
        return run_external(config, external, &reader, &pages);
    }

    let cache_settings = CacheSettings {
        dpi: config.dpi,
        raster: config.raster,
        detector: config.detector.clone(),
    };
    let cache_store = config.cache_dir.as_ref().map(CacheStore::new);

    // --- Phase A: Content stream decoding (sequential) ---
    let mut processed: Vec<ProcessedPage> = Vec::new();
    let mut needs_detection: Vec<PageData> = Vec::new();
    for &page_number in &pages {
        let page = PageData::load(&reader, page_number, config.render_scale())?;
        if !config.debug_candidates
            && let Some(cached) =
                lookup_cached(&page, &cache_settings, cache_store.as_ref(), &config.input_path)?
        {
            processed.push(cached);
            continue;
        }
        needs_detection.push(page);
    }

    // --- Phase B: Rendering (sequential) ---
    attach_render(&mut needs_detection, &config.input_path, config.raster);

    // --- Phase C: Detection (rayon parallel) ---
    let detect_all = || -> Vec<crate::error::Result<ProcessedPage>> {
        needs_detection
            .par_iter()
            .map(|page| {
                process_page(
                    page,
                    &cache_settings,
                    cache_store.as_ref(),
                    &config.input_path,
                    config.debug_candidates,
                )
            })
            .collect()
    };
    let results = if config.parallel_workers > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel_workers)
            .build()
            .map_err(|e| RegionError::config(format!("failed to build thread pool: {e}")))?;
        pool.install(detect_all)
    } else {
        detect_all()
    };
    for result in results {
        processed.push(result?);
    }

    // Sort by page number for deterministic output
    processed.sort_by_key(|p| p.page_number);

    // --- Phase D: JSON export ---
    let mut regions: BTreeMap<u32, Vec<Region>> = BTreeMap::new();
    let mut candidates: BTreeMap<u32, Vec<RectCandidate>> = BTreeMap::new();
    for page in processed {
        if let Some(c) = page.candidates {
            candidates.insert(page.page_number, c);
        }
        regions.insert(page.page_number, page.regions);
    }
    write_regions_json(&config.output_path, &regions)?;
    if config.debug_candidates {
        write_candidates_json(&config.candidates_path(), &candidates)?;
    }

    let regions_found = regions.values().map(Vec::len).sum();
    info!(
        input = %config.input_path.display(),
        pages = regions.len(),
        regions = regions_found,
        "job finished"
    );
    Ok(JobResult {
        input_path: config.input_path.clone(),
        output_path: config.output_path.clone(),
        pages_processed: regions.len(),
        regions_found,
    })
}

/// 外部レイアウトをページピクセル空間に射影して書き出す（検出は行わない）。
fn run_external(
    config: &JobConfig,
    external: &ExternalLayoutConfig,
    reader: &PdfReader,
    pages: &[u32],
) -> crate::error::Result<JobResult> {
    let layout = ExternalLayout::from_file(&external.path)?;
    let projection = ExternalProjection::new(external.source_dpi, external.calibration);

    let mut regions: BTreeMap<u32, Vec<Region>> = BTreeMap::new();
    for &page_number in pages {
        let geometry = reader.page_geometry(page_number, config.render_scale())?;
        let projected = project_external_blocks(
            layout.blocks(page_number),
            &geometry,
            &projection,
            page_number,
        );
        regions.insert(page_number, projected);
    }
    write_regions_json(&config.output_path, &regions)?;

    let regions_found = regions.values().map(Vec::len).sum();
    info!(
        input = %config.input_path.display(),
        layout = %external.path.display(),
        regions = regions_found,
        "external layout projected"
    );
    Ok(JobResult {
        input_path: config.input_path.clone(),
        output_path: config.output_path.clone(),
        pages_processed: regions.len(),
        regions_found,
    })
}
