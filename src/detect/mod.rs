//! 図・表領域の検出エンジン。
//!
//! 1ページ分の入力（命令列・テキストラン・描画済みビットマップ・ジオメトリ）から
//! `Region` の一覧を作る純粋関数の集まり。状態は呼び出しをまたいで持たない。

pub mod dedup;
pub mod fallback;
pub mod geometry;
pub mod image_paint;
pub mod ink_mask;
pub mod layout;
pub mod merge;
pub mod replay;
pub mod vector;

use tracing::{debug, warn};

use crate::config::detector::DetectorConfig;
use crate::pdf::content_stream::PageOp;
use geometry::{PageGeometry, RectCandidate, Region, TextRun};
use ink_mask::RasterPage;

/// 検出の入力（1ページ分）。
#[derive(Debug, Clone, Copy)]
pub struct PageInput<'a> {
    pub page_number: u32,
    pub geometry: PageGeometry,
    pub operations: &'a [PageOp],
    pub text_runs: &'a [TextRun],
    /// ラスタ経路を使わない場合は None
    pub raster: Option<&'a RasterPage>,
}

/// 結合前の生の候補（デバッグ・調整用）。
///
/// ページ範囲（許容量込み）から外れた候補は捨てる。
pub fn detect_candidates(input: &PageInput<'_>, config: &DetectorConfig) -> Vec<RectCandidate> {
    let structural = replay::replay_operations(
        input.operations,
        &input.geometry,
        input.text_runs,
        config,
    );
    debug!(
        page = input.page_number,
        vector = structural.vector.len(),
        image = structural.image.len(),
        "structural candidates"
    );

    let ink = match input.raster {
        Some(raster) => match ink_mask::detect_ink_regions(
            raster,
            input.text_runs,
            &input.geometry,
            &config.raster,
        ) {
            Ok(found) => found,
            Err(e) => {
                warn!(page = input.page_number, "ink mask skipped: {e}");
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    let bounds = input.geometry.pixel_bounds();
    structural
        .into_vec()
        .into_iter()
        .chain(ink)
        .filter(|c| {
            c.position.width > 0.0
                && c.position.height > 0.0
                && c.position.is_within(&bounds, config.bounds_tolerance)
        })
        .collect()
}

/// ページの図・表領域を検出する。
///
/// 同じ入力に対しては常に同じ結果（順序・id・ラベルを含む）を返す。
pub fn detect_regions(input: &PageInput<'_>, config: &DetectorConfig) -> Vec<Region> {
    let candidates = detect_candidates(input, config);

    let geometry = &input.geometry;
    let lines = layout::group_lines(input.text_runs, &config.caption);
    let column_layout = layout::infer_column_layout(
        input.text_runs,
        geometry.container_offset_x,
        geometry.pixel_width(),
        &config.merge,
    );

    let mut regions = merge::merge_candidates(
        &candidates,
        &lines,
        input.text_runs,
        &column_layout,
        geometry,
        config,
    );

    if config.fallback.enabled {
        let fallback = fallback::caption_fallback_regions(
            &lines,
            input.text_runs,
            &column_layout,
            geometry,
            &regions,
            &config.fallback,
            &config.caption,
        );
        regions.extend(fallback);
    }

    let bounds = geometry.pixel_bounds();
    regions.retain(|r| {
        r.position.width > 0.0
            && r.position.height > 0.0
            && r.position.is_within(&bounds, config.bounds_tolerance)
    });

    let mut regions = dedup::deduplicate(regions, &config.dedup);
    dedup::renumber(&mut regions, input.page_number);
    debug!(
        page = input.page_number,
        candidates = candidates.len(),
        regions = regions.len(),
        "detected regions"
    );
    regions
}
