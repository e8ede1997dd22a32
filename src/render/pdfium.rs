// Phase 3: pdfium-render wrapper: page -> RGBA bitmap + text runs (in-memory only)

use std::path::{Path, PathBuf};

use pdfium_render::prelude::*;
use tracing::debug;

use crate::detect::geometry::{PageGeometry, Rect, TextRun};
use crate::detect::ink_mask::RasterPage;

/// 描画要求（1-indexed のページ番号とそのジオメトリ）。
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest {
    pub page_number: u32,
    pub geometry: PageGeometry,
}

/// 1ページ分の描画結果。
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub page_number: u32,
    pub text_runs: Vec<TextRun>,
    /// `with_raster` が false の場合は None
    pub raster: Option<RasterPage>,
}

/// Resolves the path to the pdfium shared library.
///
/// Search order:
/// 1. `PDFIUM_DYNAMIC_LIB_PATH` environment variable
/// 2. `vendor/pdfium/lib/` relative to the project root (for development)
fn resolve_pdfium_lib_path() -> crate::error::Result<PathBuf> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        let p = PathBuf::from(&path);
        if p.exists() {
            return Ok(p);
        }
        return Err(crate::error::RegionError::render(format!(
            "PDFIUM_DYNAMIC_LIB_PATH is set to '{}' but the path does not exist",
            path
        )));
    }

    if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
        let vendor_path = PathBuf::from(&manifest_dir).join("vendor/pdfium/lib");
        if vendor_path.exists() {
            return Ok(vendor_path);
        }
    }

    Err(crate::error::RegionError::render(
        "pdfium library not found: set PDFIUM_DYNAMIC_LIB_PATH or place libpdfium.so in vendor/pdfium/lib/",
    ))
}

/// Creates a new Pdfium instance by dynamically loading the shared library.
fn create_pdfium() -> crate::error::Result<Pdfium> {
    let lib_path = resolve_pdfium_lib_path()?;
    let lib_path_str = lib_path.to_str().ok_or_else(|| {
        crate::error::RegionError::render("pdfium library path contains non-UTF-8 characters")
    })?;
    let bindings =
        Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(lib_path_str))?;
    Ok(Pdfium::new(bindings))
}

/// Renders the requested pages and extracts their text runs.
///
/// pdfium is not thread-safe, so the library and the document are loaded once
/// and the pages are processed sequentially. Text runs are mapped into the
/// page-pixel space described by each request's geometry, and the bitmap is
/// rendered at exactly that size (pixel ratio 1).
///
/// # Errors
/// Returns `RegionError::RenderError` if the pdfium library cannot be
/// initialized, the PDF cannot be opened, a page number is out of range, or
/// rendering fails.
pub fn render_pages(
    pdf_path: &Path,
    requests: &[RenderRequest],
    with_raster: bool,
) -> crate::error::Result<Vec<RenderedPage>> {
    if requests.is_empty() {
        return Ok(Vec::new());
    }
    let pdfium = create_pdfium()?;
    let document = pdfium.load_pdf_from_file(pdf_path, None)?;

    let mut rendered = Vec::with_capacity(requests.len());
    for request in requests {
        let page_index = request
            .page_number
            .checked_sub(1)
            .and_then(|i| u16::try_from(i).ok())
            .ok_or_else(|| crate::error::RegionError::render("page index exceeds u16 range"))?;
        let page = document.pages().get(page_index)?;

        let text_runs = extract_text_runs(&page, &request.geometry)?;
        let raster = if with_raster {
            Some(render_bitmap(&page, &request.geometry)?)
        } else {
            None
        };
        debug!(
            page = request.page_number,
            runs = text_runs.len(),
            "rendered page"
        );
        rendered.push(RenderedPage {
            page_number: request.page_number,
            text_runs,
            raster,
        });
    }
    Ok(rendered)
}

fn render_bitmap(page: &PdfPage, geometry: &PageGeometry) -> crate::error::Result<RasterPage> {
    let width_px = geometry.pixel_width().round() as i32;
    let height_px = geometry.pixel_height().round() as i32;
    if width_px <= 0 || height_px <= 0 {
        return Err(crate::error::RegionError::render(
            "render size must be positive",
        ));
    }

    let config = PdfRenderConfig::new()
        .set_target_width(width_px)
        .set_target_height(height_px);

    let bitmap = page.render_with_config(&config)?;
    let image = bitmap.as_image().to_rgba8();
    Ok(RasterPage::new(image, 1.0))
}

/// テキストセグメントをページピクセル空間のテキストランに変換する。
fn extract_text_runs(
    page: &PdfPage,
    geometry: &PageGeometry,
) -> crate::error::Result<Vec<TextRun>> {
    let text = page.text()?;
    let mut runs = Vec::new();
    for segment in text.segments().iter() {
        let content = segment.text();
        if content.trim().is_empty() {
            continue;
        }
        let bounds = segment.bounds();
        let (left, top) = geometry.to_pixel(bounds.left().value as f64, bounds.top().value as f64);
        let (right, bottom) =
            geometry.to_pixel(bounds.right().value as f64, bounds.bottom().value as f64);
        let rect = Rect::from_edges(left, top, right, bottom);
        runs.push(TextRun {
            content,
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            font_size: rect.height,
        });
    }
    Ok(runs)
}
