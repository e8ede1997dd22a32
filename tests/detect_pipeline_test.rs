// Phase 7: ページ単位の検出パイプライン（候補 → 結合 → フォールバック → 重複解消 → 採番）

use image::{Rgba, RgbaImage};
use pdf_regions::config::detector::DetectorConfig;
use pdf_regions::detect::geometry::{
    CandidateSource, PageGeometry, Rect, RegionType, TextRun,
};
use pdf_regions::detect::ink_mask::RasterPage;
use pdf_regions::detect::{PageInput, detect_candidates, detect_regions};
use pdf_regions::pdf::content_stream::{PageOp, PaintMode};

const PAGE_W: f64 = 600.0;
const PAGE_H: f64 = 800.0;

fn geometry() -> PageGeometry {
    PageGeometry::new(PAGE_W, PAGE_H, 1.0)
}

/// ページピクセル空間の矩形を塗る命令（y を反転してコンテンツ空間に戻す）。
fn filled_rect(x: f64, y: f64, width: f64, height: f64) -> Vec<PageOp> {
    vec![
        PageOp::Rectangle {
            x,
            y: PAGE_H - (y + height),
            width,
            height,
        },
        PageOp::Paint {
            mode: PaintMode::Fill,
            close: false,
        },
    ]
}

fn text_run(content: &str, x: f64, y: f64, width: f64, height: f64) -> TextRun {
    TextRun {
        content: content.to_string(),
        x,
        y,
        width,
        height,
        font_size: height,
    }
}

fn input<'a>(
    page_number: u32,
    operations: &'a [PageOp],
    text_runs: &'a [TextRun],
    raster: Option<&'a RasterPage>,
) -> PageInput<'a> {
    PageInput {
        page_number,
        geometry: geometry(),
        operations,
        text_runs,
        raster,
    }
}

// ============================================================
// 1. 基本
// ============================================================

#[test]
fn test_empty_page_has_no_regions() {
    let regions = detect_regions(&input(1, &[], &[], None), &DetectorConfig::default());
    assert!(regions.is_empty());
}

#[test]
fn test_vector_figure_with_caption() {
    let ops = filled_rect(100.0, 200.0, 300.0, 200.0);
    let runs = vec![text_run("Figure 1: Overview of the system", 100.0, 410.0, 250.0, 10.0)];

    let regions = detect_regions(&input(1, &ops, &runs, None), &DetectorConfig::default());

    assert_eq!(regions.len(), 1, "fallback must not duplicate a detected figure");
    let region = &regions[0];
    assert_eq!(region.id, "region_1_1");
    assert_eq!(region.label, "Figure 1");
    assert_eq!(region.region_type, RegionType::Image);
    assert_eq!(region.position, Rect::new(100.0, 200.0, 300.0, 200.0));
    assert!(region.has_structural_member());
}

#[test]
fn test_detection_is_deterministic() {
    let mut ops = filled_rect(50.0, 50.0, 200.0, 100.0);
    ops.extend(filled_rect(350.0, 50.0, 200.0, 100.0));
    ops.extend(filled_rect(50.0, 400.0, 200.0, 100.0));
    let runs = vec![text_run("Table 1: Scores", 50.0, 510.0, 120.0, 10.0)];
    let page = input(2, &ops, &runs, None);
    let config = DetectorConfig::default();

    let first = detect_regions(&page, &config);
    let second = detect_regions(&page, &config);
    assert_eq!(first, second);

    let ids: Vec<&str> = first.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["region_2_1", "region_2_2", "region_2_3"]);
    let labels: Vec<&str> = first.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, vec!["Figure 1", "Figure 2", "Table 1"]);
    assert_eq!(first[2].region_type, RegionType::Table);
}

#[test]
fn test_regions_stay_within_page_bounds() {
    let mut ops = filled_rect(700.0, 100.0, 100.0, 100.0);
    ops.extend(filled_rect(100.0, 100.0, 200.0, 150.0));
    let config = DetectorConfig::default();
    let page = input(1, &ops, &[], None);

    let candidates = detect_candidates(&page, &config);
    assert_eq!(candidates.len(), 1, "off-page rectangle is rejected");

    let bounds = geometry().pixel_bounds();
    for region in detect_regions(&page, &config) {
        assert!(region.position.width > 0.0 && region.position.height > 0.0);
        assert!(region.position.is_within(&bounds, config.bounds_tolerance));
    }
}

// ============================================================
// 2. キャプション起点のフォールバック
// ============================================================

#[test]
fn test_caption_without_graphics_yields_fallback() {
    let runs = vec![text_run("Figure 3: Architecture", 100.0, 500.0, 200.0, 12.0)];
    let config = DetectorConfig::default();

    let regions = detect_regions(&input(1, &[], &runs, None), &config);
    assert_eq!(regions.len(), 1);
    let region = &regions[0];
    assert!(region.is_fallback());
    assert_eq!(region.region_type, RegionType::Image);
    assert_eq!(region.label, "Figure 1");
    assert_eq!(region.position, Rect::new(70.0, 311.0, 260.0, 180.0));
    assert!(region.position.bottom() < 500.0, "fallback sits above its caption");

    let mut disabled = config.clone();
    disabled.fallback.enabled = false;
    assert!(detect_regions(&input(1, &[], &runs, None), &disabled).is_empty());
}

#[test]
fn test_table_caption_does_not_create_fallback() {
    let runs = vec![text_run("Table 4: Hyperparameters", 100.0, 500.0, 200.0, 12.0)];
    let regions = detect_regions(&input(1, &[], &runs, None), &DetectorConfig::default());
    assert!(regions.is_empty());
}

// ============================================================
// 3. ラスタ経路
// ============================================================

fn raster_with_block(x0: u32, y0: u32, x1: u32, y1: u32, ratio: f64) -> RasterPage {
    let mut image = RgbaImage::from_pixel(PAGE_W as u32, PAGE_H as u32, Rgba([255, 255, 255, 255]));
    for y in y0..y1 {
        for x in x0..x1 {
            image.put_pixel(x, y, Rgba([20, 20, 20, 255]));
        }
    }
    RasterPage::new(image, ratio)
}

#[test]
fn test_ink_only_figure_is_detected() {
    let raster = raster_with_block(100, 100, 200, 200, 1.0);
    let config = DetectorConfig::default();
    let page = input(1, &[], &[], Some(&raster));

    let candidates = detect_candidates(&page, &config);
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].source, CandidateSource::InkMask);

    let regions = detect_regions(&page, &config);
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].position, Rect::new(100.0, 100.0, 100.0, 100.0));
}

#[test]
fn test_invalid_raster_degrades_to_structural_only() {
    let raster = raster_with_block(100, 100, 200, 200, 0.0);
    let ops = filled_rect(300.0, 300.0, 150.0, 150.0);
    let config = DetectorConfig::default();

    let regions = detect_regions(&input(1, &ops, &[], Some(&raster)), &config);
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].position, Rect::new(300.0, 300.0, 150.0, 150.0));
}

#[test]
fn test_overlapping_vector_and_ink_merge_into_one() {
    let raster = raster_with_block(100, 100, 300, 250, 1.0);
    let ops = filled_rect(100.0, 100.0, 200.0, 150.0);
    let regions = detect_regions(
        &input(1, &ops, &[], Some(&raster)),
        &DetectorConfig::default(),
    );
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].member_candidates.len(), 2);
}
