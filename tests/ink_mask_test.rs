// Phase 3: インクマスク経路テスト

use image::{GrayImage, Rgba, RgbaImage};
use pdf_regions::config::detector::RasterConfig;
use pdf_regions::detect::geometry::{CandidateSource, PageGeometry, TextRun};
use pdf_regions::detect::ink_mask::{
    INK, RasterPage, detect_ink_regions, downsample_or, label_components,
};

/// 白地に黒ブロックを描いたバッファ。
fn page_with_blocks(width: u32, height: u32, blocks: &[(u32, u32, u32, u32)]) -> RgbaImage {
    let mut image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    for &(x0, y0, x1, y1) in blocks {
        for y in y0..y1 {
            for x in x0..x1 {
                image.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
    }
    image
}

fn text_run(x: f64, y: f64, width: f64, height: f64) -> TextRun {
    TextRun {
        content: "label".to_string(),
        x,
        y,
        width,
        height,
        font_size: height,
    }
}

#[test]
fn test_single_block_becomes_one_candidate() {
    let raster = RasterPage::new(page_with_blocks(200, 200, &[(50, 50, 90, 90)]), 1.0);
    let geometry = PageGeometry::new(200.0, 200.0, 1.0);
    let found =
        detect_ink_regions(&raster, &[], &geometry, &RasterConfig::default()).expect("ink");

    assert_eq!(found.len(), 1);
    let c = &found[0];
    assert_eq!(c.source, CandidateSource::InkMask);
    assert_eq!(c.position.x, 50.0);
    assert_eq!(c.position.y, 50.0);
    assert_eq!(c.position.width, 40.0);
    assert_eq!(c.position.height, 40.0);
}

#[test]
fn test_pixel_ratio_and_container_offset() {
    // バッファはページピクセルの2倍密度
    let raster = RasterPage::new(page_with_blocks(400, 400, &[(100, 100, 180, 180)]), 2.0);
    let mut geometry = PageGeometry::new(200.0, 200.0, 1.0);
    geometry.container_offset_x = 30.0;
    geometry.container_offset_y = 10.0;
    let found =
        detect_ink_regions(&raster, &[], &geometry, &RasterConfig::default()).expect("ink");

    assert_eq!(found.len(), 1);
    let c = &found[0].position;
    assert_eq!(c.x, 80.0);
    assert_eq!(c.y, 60.0);
    assert_eq!(c.width, 40.0);
    assert_eq!(c.height, 40.0);
}

#[test]
fn test_text_is_erased_before_thresholding() {
    let raster = RasterPage::new(page_with_blocks(200, 200, &[(50, 50, 90, 90)]), 1.0);
    let geometry = PageGeometry::new(200.0, 200.0, 1.0);
    let runs = vec![text_run(48.0, 48.0, 44.0, 44.0)];
    let found =
        detect_ink_regions(&raster, &runs, &geometry, &RasterConfig::default()).expect("ink");
    assert!(found.is_empty(), "ink under a text run should be ignored");
}

#[test]
fn test_small_and_elongated_components_are_rejected() {
    let blocks = [
        // 6x6: 最小サイズ未満
        (20, 20, 26, 26),
        // 180x10: 縦横比が大きすぎる
        (10, 150, 190, 160),
    ];
    let raster = RasterPage::new(page_with_blocks(200, 200, &blocks), 1.0);
    let geometry = PageGeometry::new(200.0, 200.0, 1.0);
    let found =
        detect_ink_regions(&raster, &[], &geometry, &RasterConfig::default()).expect("ink");
    assert!(found.is_empty());
}

#[test]
fn test_blank_page_has_no_candidates() {
    let raster = RasterPage::new(page_with_blocks(120, 80, &[]), 1.0);
    let geometry = PageGeometry::new(120.0, 80.0, 1.0);
    let found =
        detect_ink_regions(&raster, &[], &geometry, &RasterConfig::default()).expect("ink");
    assert!(found.is_empty());
}

#[test]
fn test_invalid_buffers_are_errors() {
    let geometry = PageGeometry::new(100.0, 100.0, 1.0);
    let config = RasterConfig::default();

    let zero_ratio = RasterPage::new(page_with_blocks(10, 10, &[]), 0.0);
    assert!(detect_ink_regions(&zero_ratio, &[], &geometry, &config).is_err());

    let empty = RasterPage::new(RgbaImage::new(0, 0), 1.0);
    assert!(detect_ink_regions(&empty, &[], &geometry, &config).is_err());
}

#[test]
fn test_label_components_eight_connected() {
    let mut mask = GrayImage::new(6, 6);
    // 斜めにつながる2画素と離れた1画素
    mask.put_pixel(1, 1, INK);
    mask.put_pixel(2, 2, INK);
    mask.put_pixel(5, 5, INK);
    let components = label_components(&mask);
    assert_eq!(components.len(), 2);
    assert_eq!(components[0].pixel_count, 2);
    assert_eq!((components[0].min_x, components[0].max_x), (1, 2));
}

#[test]
fn test_downsample_or_keeps_any_hit() {
    let mut mask = GrayImage::new(4, 4);
    mask.put_pixel(3, 3, INK);
    let reduced = downsample_or(&mask, 2);
    assert_eq!(reduced.dimensions(), (2, 2));
    assert_eq!(reduced.get_pixel(1, 1)[0], 255);
    assert_eq!(reduced.get_pixel(0, 0)[0], 0);
}

#[test]
fn test_block_touching_page_edge_is_kept() {
    // 左上端に接する塊も収縮で消えない
    let raster = RasterPage::new(page_with_blocks(200, 200, &[(0, 0, 40, 40)]), 1.0);
    let geometry = PageGeometry::new(200.0, 200.0, 1.0);
    let found =
        detect_ink_regions(&raster, &[], &geometry, &RasterConfig::default()).expect("ink");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].position.x, 0.0);
    assert_eq!(found[0].position.width, 40.0);
}
