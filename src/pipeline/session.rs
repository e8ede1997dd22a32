// Phase 8: 対話的な検出セッション（ページ番号ごとの結果キャッシュ付き）

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::cache::hash::CacheSettings;
use crate::cache::memory::PageResultCache;
use crate::config::detector::DetectorConfig;
use crate::config::merged::MergedConfig;
use crate::detect::geometry::{RectCandidate, Region};
use crate::detect::{detect_candidates, detect_regions};
use crate::pdf::reader::PdfReader;
use crate::pipeline::page_processor::{PageData, attach_render};

/// セッションの検出設定。
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub dpi: u32,
    pub raster: bool,
    pub detector: DetectorConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dpi: 96,
            raster: true,
            detector: DetectorConfig::default(),
        }
    }
}

impl From<&MergedConfig> for SessionConfig {
    fn from(merged: &MergedConfig) -> Self {
        Self {
            dpi: merged.dpi,
            raster: merged.raster,
            detector: merged.detector.clone(),
        }
    }
}

/// 1文書に対する検出セッション。
///
/// ページを表示するたびに `detect_regions` を呼ぶ使い方を想定する。
/// ページ内容と設定が変わらない限り、2回目以降はキャッシュから同じ結果を返す。
pub struct DetectionSession {
    pdf_path: PathBuf,
    reader: PdfReader,
    settings: CacheSettings,
    cache: PageResultCache,
}

impl DetectionSession {
    pub fn open(pdf_path: impl AsRef<Path>, config: SessionConfig) -> crate::error::Result<Self> {
        if config.dpi == 0 {
            return Err(crate::error::RegionError::config("dpi must be positive"));
        }
        let pdf_path = pdf_path.as_ref().to_path_buf();
        let reader = PdfReader::open(&pdf_path)?;
        Ok(Self {
            pdf_path,
            reader,
            settings: CacheSettings {
                dpi: config.dpi,
                raster: config.raster,
                detector: config.detector,
            },
            cache: PageResultCache::new(),
        })
    }

    pub fn page_count(&self) -> u32 {
        self.reader.page_count()
    }

    fn render_scale(&self) -> f64 {
        self.settings.dpi as f64 / 72.0
    }

    /// ページ(1-indexed)の図・表領域を返す。
    ///
    /// 描画できなかったページの結果はキャッシュせず、次回も検出し直す。
    pub fn detect_regions(&mut self, page_number: u32) -> crate::error::Result<Vec<Region>> {
        let mut page = PageData::load(&self.reader, page_number, self.render_scale())?;
        let fingerprint = page.cache_key(&self.settings, &self.pdf_path)?;
        if let Some(regions) = self.cache.get(page_number, &fingerprint) {
            debug!(page = page_number, "session cache hit");
            return Ok(regions.to_vec());
        }

        attach_render(
            std::slice::from_mut(&mut page),
            &self.pdf_path,
            self.settings.raster,
        );
        let regions = detect_regions(&page.input(), &self.settings.detector);
        if page.rendered {
            self.cache.insert(page_number, fingerprint, regions.clone());
        }
        Ok(regions)
    }

    /// 結合前の生の候補（キャッシュしない）。
    pub fn debug_candidates(&self, page_number: u32) -> crate::error::Result<Vec<RectCandidate>> {
        let mut page = PageData::load(&self.reader, page_number, self.render_scale())?;
        attach_render(
            std::slice::from_mut(&mut page),
            &self.pdf_path,
            self.settings.raster,
        );
        Ok(detect_candidates(&page.input(), &self.settings.detector))
    }

    /// ページの結果を破棄し、次回の呼び出しで再検出させる。
    pub fn invalidate(&mut self, page_number: u32) {
        self.cache.invalidate(page_number);
    }

    pub fn cached_pages(&self) -> usize {
        self.cache.len()
    }
}
