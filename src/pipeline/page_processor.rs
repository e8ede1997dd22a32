// Phase 8: ページ単位処理: 命令列の復元 → キャッシュ確認 → 検出 → キャッシュ保存

use std::path::Path;

use tracing::{debug, warn};

use crate::cache::hash::{CacheSettings, compute_cache_key};
use crate::cache::store::CacheStore;
use crate::detect::geometry::{PageGeometry, RectCandidate, Region, TextRun};
use crate::detect::ink_mask::RasterPage;
use crate::detect::{PageInput, detect_candidates, detect_regions};
use crate::pdf::content_stream::{PageOp, decode_operations};
use crate::pdf::reader::PdfReader;

/// 検出に必要な1ページ分のデータ。
pub struct PageData {
    pub page_number: u32,
    pub geometry: PageGeometry,
    pub content: Vec<u8>,
    pub operations: Vec<PageOp>,
    pub text_runs: Vec<TextRun>,
    pub raster: Option<RasterPage>,
    /// 描画（テキスト抽出）に成功したか。false の結果はキャッシュしない。
    pub rendered: bool,
}

impl PageData {
    /// コンテンツストリームを読み、命令列に復元する（描画はまだ）。
    ///
    /// 復元に失敗したページは命令列を空にして続行する。
    pub fn load(
        reader: &PdfReader,
        page_number: u32,
        render_scale: f64,
    ) -> crate::error::Result<Self> {
        let geometry = reader.page_geometry(page_number, render_scale)?;
        let content = reader.page_content_stream(page_number)?;
        let xobjects = reader.page_xobjects(page_number)?;
        let operations = match decode_operations(&content, &xobjects) {
            Ok(ops) => ops,
            Err(e) => {
                warn!(page = page_number, "content stream not decodable: {e}");
                Vec::new()
            }
        };
        Ok(Self {
            page_number,
            geometry,
            content,
            operations,
            text_runs: Vec::new(),
            raster: None,
            rendered: false,
        })
    }

    pub fn input(&self) -> PageInput<'_> {
        PageInput {
            page_number: self.page_number,
            geometry: self.geometry,
            operations: &self.operations,
            text_runs: &self.text_runs,
            raster: self.raster.as_ref(),
        }
    }

    pub fn cache_key(
        &self,
        settings: &CacheSettings,
        pdf_path: &Path,
    ) -> crate::error::Result<String> {
        compute_cache_key(&self.content, settings, pdf_path, self.page_number)
    }
}

/// Single page processing result.
pub struct ProcessedPage {
    pub page_number: u32,
    pub regions: Vec<Region>,
    /// デバッグ出力を要求された場合のみ
    pub candidates: Option<Vec<RectCandidate>>,
    pub cache_key: String,
}

/// ディスクキャッシュに結果があれば返す。
pub fn lookup_cached(
    page: &PageData,
    cache_settings: &CacheSettings,
    cache_store: Option<&CacheStore>,
    pdf_path: &Path,
) -> crate::error::Result<Option<ProcessedPage>> {
    let Some(store) = cache_store else {
        return Ok(None);
    };
    let cache_key = page.cache_key(cache_settings, pdf_path)?;
    Ok(store.retrieve(&cache_key)?.map(|regions| {
        debug!(page = page.page_number, "cache hit");
        ProcessedPage {
            page_number: page.page_number,
            regions,
            candidates: None,
            cache_key,
        }
    }))
}

/// Process a single page: check cache, detect regions, store in cache.
pub fn process_page(
    page: &PageData,
    cache_settings: &CacheSettings,
    cache_store: Option<&CacheStore>,
    pdf_path: &Path,
    debug_candidates: bool,
) -> crate::error::Result<ProcessedPage> {
    let cache_key = page.cache_key(cache_settings, pdf_path)?;
    let detector = &cache_settings.detector;
    let input = page.input();

    let candidates = debug_candidates.then(|| detect_candidates(&input, detector));

    if let Some(store) = cache_store
        && let Some(regions) = store.retrieve(&cache_key)?
    {
        return Ok(ProcessedPage {
            page_number: page.page_number,
            regions,
            candidates,
            cache_key,
        });
    }

    let regions = detect_regions(&input, detector);

    // テキストなしの縮退結果を保存すると、描画できるようになっても再検出されない
    match cache_store {
        Some(store) if page.rendered => store.store(&cache_key, page.page_number, &regions)?,
        Some(_) => debug!(
            page = page.page_number,
            "not caching regions detected without render data"
        ),
        None => {}
    }

    Ok(ProcessedPage {
        page_number: page.page_number,
        regions,
        candidates,
        cache_key,
    })
}

/// 描画結果（テキストランとビットマップ）をページに付ける。
///
/// pdfium が使えない場合は警告を出し、テキストもビットマップもないまま続行する。
#[cfg(feature = "render")]
pub fn attach_render(pages: &mut [PageData], pdf_path: &Path, with_raster: bool) {
    use crate::render::pdfium::{RenderRequest, render_pages};

    let requests: Vec<RenderRequest> = pages
        .iter()
        .map(|p| RenderRequest {
            page_number: p.page_number,
            geometry: p.geometry,
        })
        .collect();
    match render_pages(pdf_path, &requests, with_raster) {
        Ok(rendered) => {
            for (page, result) in pages.iter_mut().zip(rendered) {
                page.text_runs = result.text_runs;
                page.raster = result.raster;
                page.rendered = true;
            }
        }
        Err(e) => warn!(
            path = %pdf_path.display(),
            "rendering unavailable, detecting without text or raster: {e}"
        ),
    }
}

#[cfg(not(feature = "render"))]
pub fn attach_render(pages: &mut [PageData], pdf_path: &Path, _with_raster: bool) {
    if !pages.is_empty() {
        debug!(
            path = %pdf_path.display(),
            "built without the render feature, detecting without text or raster"
        );
    }
}
