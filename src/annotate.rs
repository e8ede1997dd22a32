// Phase 9: 領域のヒットテスト（クリック位置・範囲選択との対応付け）

use crate::detect::geometry::{Rect, Region};

/// 範囲選択を領域に対応付けるときの既定の最小IoU。
pub const DEFAULT_MIN_SELECTION_IOU: f64 = 0.01;

/// 点を含む領域を返す。入れ子の場合は最も小さい領域。
pub fn region_at(regions: &[Region], x: f64, y: f64) -> Option<&Region> {
    regions
        .iter()
        .filter(|r| r.position.contains_point(x, y))
        .min_by(|a, b| a.position.area().total_cmp(&b.position.area()))
}

/// 選択矩形と最もIoUが高い領域を返す（`min_iou` 以下は対応なし）。
pub fn match_selection<'a>(
    regions: &'a [Region],
    selection: &Rect,
    min_iou: f64,
) -> Option<&'a Region> {
    regions
        .iter()
        .map(|r| (r, r.position.iou(selection)))
        .filter(|(_, iou)| *iou > min_iou)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(r, _)| r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::geometry::RegionType;

    fn region(id: &str, rect: Rect) -> Region {
        Region {
            id: id.to_string(),
            region_type: RegionType::Image,
            position: rect,
            label: String::new(),
            member_candidates: Vec::new(),
        }
    }

    #[test]
    fn test_region_at_prefers_innermost() {
        let regions = vec![
            region("outer", Rect::new(0.0, 0.0, 200.0, 200.0)),
            region("inner", Rect::new(50.0, 50.0, 40.0, 40.0)),
        ];
        assert_eq!(region_at(&regions, 60.0, 60.0).map(|r| r.id.as_str()), Some("inner"));
        assert_eq!(region_at(&regions, 10.0, 10.0).map(|r| r.id.as_str()), Some("outer"));
        assert!(region_at(&regions, 500.0, 500.0).is_none());
    }

    #[test]
    fn test_match_selection_picks_best_iou() {
        let regions = vec![
            region("a", Rect::new(0.0, 0.0, 100.0, 100.0)),
            region("b", Rect::new(80.0, 0.0, 100.0, 100.0)),
        ];
        let selection = Rect::new(90.0, 0.0, 100.0, 100.0);
        let hit = match_selection(&regions, &selection, DEFAULT_MIN_SELECTION_IOU);
        assert_eq!(hit.map(|r| r.id.as_str()), Some("b"));
        let far = Rect::new(1000.0, 1000.0, 10.0, 10.0);
        assert!(match_selection(&regions, &far, DEFAULT_MIN_SELECTION_IOU).is_none());
    }
}
