// Phase 6: 重複解消と読み順での採番

use std::cmp::Ordering;
use std::collections::HashMap;

use super::geometry::{Region, RegionType};
use crate::config::detector::DedupConfig;

/// 重なった領域の組から一方だけを残す。
///
/// 構造的な領域はフォールバック領域より優先し、同格なら面積の大きい方を残す。
/// 優先順に並べてから、残した領域と重ならないものだけを採るので、
/// 結果は入力順に依存しない。
pub fn deduplicate(mut regions: Vec<Region>, config: &DedupConfig) -> Vec<Region> {
    regions.sort_by(priority_order);
    let mut kept: Vec<Region> = Vec::with_capacity(regions.len());
    for region in regions {
        if kept.iter().all(|k| !overlaps(k, &region, config)) {
            kept.push(region);
        }
    }
    kept
}

fn overlaps(a: &Region, b: &Region, config: &DedupConfig) -> bool {
    a.position.iou(&b.position) > config.iou_threshold
        || a.position.containment(&b.position) > config.containment_threshold
}

/// 残すべき順: 構造的 → フォールバック、面積の降順。同点は位置で決める。
fn priority_order(a: &Region, b: &Region) -> Ordering {
    a.is_fallback()
        .cmp(&b.is_fallback())
        .then(b.position.area().total_cmp(&a.position.area()))
        .then(a.position.y.total_cmp(&b.position.y))
        .then(a.position.x.total_cmp(&b.position.x))
        .then(a.position.width.total_cmp(&b.position.width))
}

/// 上から下、左から右の順に並べ、id とラベル（種別ごとの連番）を振り直す。
pub fn renumber(regions: &mut [Region], page_number: u32) {
    regions.sort_by(|a, b| {
        a.position
            .y
            .total_cmp(&b.position.y)
            .then(a.position.x.total_cmp(&b.position.x))
    });
    let mut counters: HashMap<RegionType, usize> = HashMap::new();
    for (idx, region) in regions.iter_mut().enumerate() {
        let n = counters.entry(region.region_type).or_insert(0);
        *n += 1;
        region.id = format!("region_{page_number}_{}", idx + 1);
        region.label = format!("{} {}", region.region_type.label_prefix(), n);
    }
}
