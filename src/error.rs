use thiserror::Error;

/// 検出パイプライン全体のエラー。
///
/// 1ページの検出そのものはエラーを返さない（候補なしに縮退する）。
/// ここに来るのは入出力・設定・キャッシュ・描画の失敗のみ。
#[derive(Debug, Error)]
pub enum RegionError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("PDF read error: {0}")]
    PdfReadError(String),

    #[error("page {page} out of range (document has {page_count} pages)")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("Content stream error: {0}")]
    ContentStreamError(String),

    #[error("Render error: {0}")]
    RenderError(String),

    #[error("Raster error: {0}")]
    RasterError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("invalid cache key '{0}': expected 64 lowercase hex characters")]
    InvalidCacheKey(String),

    #[error("Export error: {0}")]
    ExportError(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

macro_rules! error_constructors {
    ($($method:ident => $variant:ident),* $(,)?) => {
        impl RegionError {
            $(
                pub fn $method(msg: impl Into<String>) -> Self {
                    Self::$variant(msg.into())
                }
            )*
        }
    };
}

error_constructors! {
    config => ConfigError,
    pdf_read => PdfReadError,
    content_stream => ContentStreamError,
    render => RenderError,
    raster => RasterError,
    cache => CacheError,
    export => ExportError,
}

impl RegionError {
    /// `page` が 1..=page_count に入っていなければエラー。
    pub fn check_page(page: u32, page_count: u32) -> Result<()> {
        if page < 1 || page > page_count {
            return Err(Self::PageOutOfRange { page, page_count });
        }
        Ok(())
    }
}

impl From<lopdf::Error> for RegionError {
    fn from(e: lopdf::Error) -> Self {
        Self::PdfReadError(e.to_string())
    }
}

impl From<serde_yml::Error> for RegionError {
    fn from(e: serde_yml::Error) -> Self {
        Self::ConfigError(e.to_string())
    }
}

#[cfg(feature = "render")]
impl From<pdfium_render::prelude::PdfiumError> for RegionError {
    fn from(e: pdfium_render::prelude::PdfiumError) -> Self {
        Self::RenderError(e.to_string())
    }
}

impl From<image::ImageError> for RegionError {
    fn from(e: image::ImageError) -> Self {
        Self::RasterError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RegionError>;
