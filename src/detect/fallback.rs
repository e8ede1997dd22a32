// Phase 5: キャプション直上の低テキスト密度帯から図領域を推定する

use tracing::debug;

use super::geometry::{
    CandidateSource, PageGeometry, Rect, RectCandidate, Region, RegionType, TextRun,
};
use super::layout::{ColumnLayout, TextLine, caption_kind};
use super::vector::text_cover_ratio;
use crate::config::detector::{CaptionConfig, FallbackConfig};

/// 図キャプションごとに、上方のテキストが疎な帯を図とみなして候補を作る。
///
/// 既存の領域と重なる位置には作らない。
pub fn caption_fallback_regions(
    lines: &[TextLine],
    text_runs: &[TextRun],
    layout: &ColumnLayout,
    geometry: &PageGeometry,
    existing: &[Region],
    config: &FallbackConfig,
    caption_config: &CaptionConfig,
) -> Vec<Region> {
    let page_w = geometry.pixel_width();
    let page_h = geometry.pixel_height();
    if config.bands == 0 || page_w <= 0.0 || page_h <= 0.0 {
        return Vec::new();
    }
    let origin = (geometry.container_offset_x, geometry.container_offset_y);
    let density = BandDensity::new(text_runs, origin.1, page_w, page_h, config);
    let text_rects: Vec<Rect> = text_runs.iter().map(TextRun::rect).collect();

    let mut regions = Vec::new();
    for caption in lines
        .iter()
        .filter(|l| caption_kind(&l.text) == Some(RegionType::Image))
    {
        let Some(rect) = fallback_rect(
            caption,
            lines,
            layout,
            &density,
            origin,
            page_w,
            page_h,
            config,
            caption_config,
        ) else {
            continue;
        };
        if existing
            .iter()
            .chain(regions.iter())
            .any(|r| r.position.intersection_area(&rect) > 0.0)
        {
            continue;
        }
        if text_cover_ratio(&rect, &text_rects) > config.max_text_cover
            || count_text_rows(&rect, text_runs, config.row_tolerance) >= config.max_rows
        {
            debug!(?rect, caption = %caption.text, "fallback rejected: text-heavy");
            continue;
        }
        regions.push(Region {
            id: String::new(),
            region_type: RegionType::Image,
            position: rect,
            label: String::new(),
            member_candidates: vec![RectCandidate::new(rect, CandidateSource::CaptionFallback)],
        });
    }
    regions
}

/// ページを水平帯に分けたテキスト被覆率。
struct BandDensity {
    ratios: Vec<f64>,
    band_height: f64,
}

impl BandDensity {
    fn new(
        runs: &[TextRun],
        origin_y: f64,
        page_w: f64,
        page_h: f64,
        config: &FallbackConfig,
    ) -> Self {
        let bands = config.bands;
        let band_height = page_h / bands as f64;
        let mut cover = vec![0.0; bands];
        for run in runs {
            let top = run.y - origin_y;
            let h = run.height.max(config.min_run_height);
            let first = band_index(top, band_height, bands);
            let last = band_index(top + h, band_height, bands);
            for slot in &mut cover[first..=last] {
                *slot += run.width.max(1.0) * h;
            }
        }
        let band_area = page_w * band_height;
        Self {
            ratios: cover.into_iter().map(|c| c / band_area).collect(),
            band_height,
        }
    }

    fn index_of(&self, y: f64) -> usize {
        band_index(y, self.band_height, self.ratios.len())
    }
}

fn band_index(y: f64, band_height: f64, bands: usize) -> usize {
    ((y / band_height).floor().max(0.0) as usize).min(bands - 1)
}

#[allow(clippy::too_many_arguments)]
fn fallback_rect(
    caption: &TextLine,
    lines: &[TextLine],
    layout: &ColumnLayout,
    density: &BandDensity,
    origin: (f64, f64),
    page_w: f64,
    page_h: f64,
    config: &FallbackConfig,
    caption_config: &CaptionConfig,
) -> Option<Rect> {
    let cap = Rect::new(
        caption.rect.x - origin.0,
        caption.rect.y - origin.1,
        caption.rect.width,
        caption.rect.height,
    );
    let band_h = density.band_height;
    let cap_band = density.index_of(cap.y);
    let search = (page_h * config.search_up_ratio / band_h).floor() as usize;
    let lowest = cap_band.saturating_sub(search);

    // キャプション直上から上へ、疎な帯の連続を探す
    let mut sparse: Option<(usize, usize)> = None;
    for band in (lowest..cap_band).rev() {
        let ratio = density.ratios[band];
        if ratio < config.sparse_band_ratio {
            sparse = Some(match sparse {
                Some((_, bottom)) => (band, bottom),
                None => (band, band),
            });
        } else if ratio > config.dense_band_ratio || sparse.is_some() {
            break;
        }
    }

    let (y_min, y_max) = match sparse {
        Some((top, bottom)) => (top as f64 * band_h, (bottom + 1) as f64 * band_h),
        None => {
            let h = (page_h * config.default_height_ratio).min(
                config
                    .min_default_height
                    .max(cap.width * config.height_per_caption_width),
            );
            let y_max = (cap.y - caption_config.caption_margin).max(0.0);
            ((y_max - h).max(0.0), y_max)
        }
    };
    let y_max = y_max.min(cap.y - caption_config.caption_margin);
    let mut height = y_max - y_min - config.caption_gap;
    if height < config.min_height {
        return None;
    }

    let (mut x, mut width) =
        horizontal_extent(&cap, lines, layout, origin, y_min, y_max, page_w, config);
    if width < config.min_width {
        let pad = (cap.width * config.caption_pad_ratio).min(config.caption_pad_max);
        x = (cap.x - pad).max(config.margin);
        width = (page_w - x - config.margin).min(cap.width + pad * 2.0);
    }
    if width < config.min_width {
        return None;
    }

    let max_height = (page_h * config.max_height_ratio)
        .min(cap.width.max(config.min_width) * config.height_per_caption_width);
    height = height.min(max_height).max(config.min_height);
    let top = (y_max - config.bottom_inset - height).max(y_min + config.top_inset);

    Some(Rect::new(x + origin.0, top + origin.1, width, height))
}

/// 段組またはブロック内の行から横方向の範囲を決める（ページ相対座標）。
#[allow(clippy::too_many_arguments)]
fn horizontal_extent(
    cap: &Rect,
    lines: &[TextLine],
    layout: &ColumnLayout,
    origin: (f64, f64),
    y_min: f64,
    y_max: f64,
    page_w: f64,
    config: &FallbackConfig,
) -> (f64, f64) {
    if let ColumnLayout::Double { .. } = layout {
        let absolute = Rect::new(cap.x + origin.0, cap.y + origin.1, cap.width, cap.height);
        if let Some(span) = layout
            .column_of(&absolute)
            .and_then(|c| layout.span(c))
        {
            let x = (span.0 - origin.0).max(config.margin);
            let width = (page_w - x - config.margin).min(span.1 - span.0);
            return (x, width);
        }
    }

    let first_row = y_min + config.extent_row_inset;
    let last_row = (y_min + config.extent_min_span).max(y_max.min(cap.y - config.caption_gap));
    let inside: Vec<Rect> = lines
        .iter()
        .map(|l| {
            Rect::new(
                l.rect.x - origin.0,
                l.rect.y - origin.1,
                l.rect.width,
                l.rect.height,
            )
        })
        .filter(|r| r.y >= first_row && r.y <= last_row)
        .collect();
    if inside.len() < 2 {
        return (0.0, 0.0);
    }
    let left = inside.iter().map(|r| r.x).fold(f64::INFINITY, f64::min);
    let right = inside.iter().map(|r| r.right()).fold(f64::NEG_INFINITY, f64::max);
    (left, right - left)
}

/// 矩形内のテキスト行数（y が `tolerance` 以内のランを同じ行とみなす）。
fn count_text_rows(rect: &Rect, runs: &[TextRun], tolerance: f64) -> usize {
    let mut ys: Vec<f64> = runs
        .iter()
        .filter(|r| r.rect().intersection_area(rect) > 0.0)
        .map(|r| r.y)
        .collect();
    ys.sort_by(f64::total_cmp);
    let mut rows = 0;
    let mut last: Option<f64> = None;
    for y in ys {
        if last.is_none_or(|prev| y - prev > tolerance) {
            rows += 1;
            last = Some(y);
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_text_rows_clusters_by_y() {
        let run = |y: f64| TextRun {
            content: "w".into(),
            x: 10.0,
            y,
            width: 50.0,
            height: 10.0,
            font_size: 10.0,
        };
        let runs = vec![run(10.0), run(12.0), run(40.0), run(70.0)];
        let rect = Rect::new(0.0, 0.0, 100.0, 100.0);
        assert_eq!(count_text_rows(&rect, &runs, 14.0), 3);
    }
}
