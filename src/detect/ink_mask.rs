// Phase 3: 描画済みビットマップからテキスト以外のインク塊を検出する

use image::{GrayImage, Luma, Rgba, RgbaImage};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::map::map_colors;
use imageproc::morphology::open;
use imageproc::region_labelling::{Connectivity, connected_components};
use tracing::debug;

use super::geometry::{CandidateSource, PageGeometry, Rect, RectCandidate, TextRun};
use crate::config::detector::RasterConfig;

/// 描画済みページ。
///
/// `pixel_ratio` はページピクセル1つあたりのバッファピクセル数。
/// バッファ原点はページの左上（コンテナオフセット位置）に一致する。
#[derive(Debug, Clone)]
pub struct RasterPage {
    pub image: RgbaImage,
    pub pixel_ratio: f64,
}

impl RasterPage {
    pub fn new(image: RgbaImage, pixel_ratio: f64) -> Self {
        Self { image, pixel_ratio }
    }
}

/// 連結成分（縮小後のグリッド座標、両端を含む）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InkComponent {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub pixel_count: usize,
}

/// 2値マスクの前景値。背景は0。
pub const INK: Luma<u8> = Luma([255]);

/// インクマスク経路の本体。
///
/// 不正なバッファ（サイズ0、倍率が非正）はエラーを返し、呼び出し側で
/// 「この経路からは候補なし」として扱う。
pub fn detect_ink_regions(
    raster: &RasterPage,
    text_runs: &[TextRun],
    geometry: &PageGeometry,
    config: &RasterConfig,
) -> crate::error::Result<Vec<RectCandidate>> {
    let ratio = raster.pixel_ratio;
    if !(ratio.is_finite() && ratio > 0.0) {
        return Err(crate::error::RegionError::raster(format!(
            "invalid pixel ratio {ratio}"
        )));
    }
    let (width, height) = raster.image.dimensions();
    if width == 0 || height == 0 {
        return Err(crate::error::RegionError::raster("empty raster buffer"));
    }
    if config.downsample == 0 {
        return Err(crate::error::RegionError::raster("downsample must be at least 1"));
    }

    let origin = (geometry.container_offset_x, geometry.container_offset_y);
    let mut work = raster.image.clone();
    for run in text_runs {
        let r = run.rect().inflate(config.text_padding, config.text_padding);
        let buffer_rect = Rect::new(
            (r.x - origin.0) * ratio,
            (r.y - origin.1) * ratio,
            r.width * ratio,
            r.height * ratio,
        );
        erase_rect(&mut work, &buffer_rect, config.feather);
    }

    let ink = ink_image(&work);
    let threshold = otsu_level(&ink).clamp(config.threshold_min, config.threshold_max);
    let binary = map_colors(&ink, |p: Luma<u8>| if p[0] > threshold { INK } else { Luma([0]) });

    let factor = config.downsample;
    let reduced = downsample_or(&binary, factor);
    if reduced.width() == 0 || reduced.height() == 0 {
        return Ok(Vec::new());
    }
    // 3×3 オープニング（収縮→膨張）
    let opened = open(&reduced, Norm::LInf, 1);
    let components = label_components(&opened);

    let mut candidates = Vec::new();
    for comp in &components {
        let buf_w = (comp.max_x - comp.min_x + 1) * factor;
        let buf_h = (comp.max_y - comp.min_y + 1) * factor;
        let min_px = config.min_component_px;
        if buf_w < min_px || buf_h < min_px {
            continue;
        }
        let w = buf_w as f64 / ratio;
        let h = buf_h as f64 / ratio;
        if w < config.min_size_css || h < config.min_size_css {
            continue;
        }
        let aspect = w / h;
        if aspect > config.max_aspect || aspect < 1.0 / config.max_aspect {
            continue;
        }
        let x = origin.0 + (comp.min_x * factor) as f64 / ratio;
        let y = origin.1 + (comp.min_y * factor) as f64 / ratio;
        candidates.push(RectCandidate::new(
            Rect::new(x, y, w, h),
            CandidateSource::InkMask,
        ));
    }

    debug!(
        threshold,
        components = components.len(),
        accepted = candidates.len(),
        "ink mask"
    );
    Ok(candidates)
}

/// 矩形内のアルファを消し、縁は `feather` ピクセルかけて減衰させる。
///
/// destination-out 合成: alpha' = alpha × (1 − coverage)
pub fn erase_rect(image: &mut RgbaImage, rect: &Rect, feather: f64) {
    let (width, height) = image.dimensions();
    let feather = feather.max(0.0);
    let x0 = (rect.x - feather).floor().max(0.0);
    let y0 = (rect.y - feather).floor().max(0.0);
    let x1 = (rect.right() + feather).ceil().min(width as f64);
    let y1 = (rect.bottom() + feather).ceil().min(height as f64);
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    for py in y0 as u32..y1 as u32 {
        let cy = py as f64 + 0.5;
        let dy = (rect.y - cy).max(cy - rect.bottom()).max(0.0);
        for px in x0 as u32..x1 as u32 {
            let cx = px as f64 + 0.5;
            let dx = (rect.x - cx).max(cx - rect.right()).max(0.0);
            let distance = dx.max(dy);
            let coverage = if distance <= 0.0 {
                1.0
            } else if feather > 0.0 {
                (1.0 - distance / feather).max(0.0)
            } else {
                0.0
            };
            if coverage <= 0.0 {
                continue;
            }
            let pixel = image.get_pixel_mut(px, py);
            let alpha = pixel.0[3] as f64 * (1.0 - coverage);
            pixel.0[3] = alpha.round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// 画素ごとのインク量（255 − 輝度、アルファで減衰）。透明画素はインク0。
pub fn ink_image(image: &RgbaImage) -> GrayImage {
    map_colors(image, |p: Rgba<u8>| {
        let [r, g, b, a] = p.0;
        let luma = 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
        Luma([((255.0 - luma) * a as f64 / 255.0).round().clamp(0.0, 255.0) as u8])
    })
}

/// factor×factor ブロックのOR縮小。端数は切り捨てる。
pub fn downsample_or(mask: &GrayImage, factor: u32) -> GrayImage {
    let factor = factor.max(1);
    GrayImage::from_fn(mask.width() / factor, mask.height() / factor, |x, y| {
        let hit = (0..factor).any(|dy| {
            (0..factor).any(|dx| mask.get_pixel(x * factor + dx, y * factor + dy)[0] > 0)
        });
        if hit { INK } else { Luma([0]) }
    })
}

/// 8近傍の連結成分ごとの外接矩形と画素数。上→左の順に並べる。
pub fn label_components(mask: &GrayImage) -> Vec<InkComponent> {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));

    let mut by_label: Vec<Option<InkComponent>> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0] as usize;
        if label == 0 {
            continue;
        }
        if by_label.len() <= label {
            by_label.resize(label + 1, None);
        }
        let comp = by_label[label].get_or_insert(InkComponent {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            pixel_count: 0,
        });
        comp.pixel_count += 1;
        comp.min_x = comp.min_x.min(x);
        comp.max_x = comp.max_x.max(x);
        comp.min_y = comp.min_y.min(y);
        comp.max_y = comp.max_y.max(y);
    }

    let mut components: Vec<InkComponent> = by_label.into_iter().flatten().collect();
    components.sort_by_key(|c| (c.min_y, c.min_x));
    components
}
