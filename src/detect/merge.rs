// Phase 5: 候補の結合とキャプション・ラベル・見出しによる境界調整

use tracing::debug;

use super::geometry::{
    CandidateSource, PageGeometry, Rect, RectCandidate, Region, RegionType, TextRun,
};
use super::layout::{
    ColumnLayout, TextLine, caption_kind, is_formula_text, is_header_line, is_label_line,
    is_prose_line, span_overlap,
};
use crate::config::detector::{CaptionConfig, DetectorConfig, MergeConfig};

/// 結合途中の候補グループ。
#[derive(Debug, Clone, PartialEq)]
pub struct MergeGroup {
    pub rect: Rect,
    pub members: Vec<RectCandidate>,
}

impl MergeGroup {
    pub fn from_candidate(candidate: RectCandidate) -> Self {
        Self {
            rect: candidate.position,
            members: vec![candidate],
        }
    }

    fn absorb(&mut self, other: MergeGroup) {
        self.rect = self.rect.union(&other.rect);
        self.members.extend(other.members);
    }

    fn members_bottom(&self) -> f64 {
        self.members
            .iter()
            .map(|m| m.position.bottom())
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

/// 候補を結合し、境界を調整した領域を返す（idとラベルは未設定）。
///
/// キャプション由来のフォールバック候補は結合に参加しない。
pub fn merge_candidates(
    candidates: &[RectCandidate],
    lines: &[TextLine],
    text_runs: &[TextRun],
    layout: &ColumnLayout,
    geometry: &PageGeometry,
    config: &DetectorConfig,
) -> Vec<Region> {
    let mut sorted: Vec<RectCandidate> = candidates
        .iter()
        .filter(|c| c.source != CandidateSource::CaptionFallback)
        .cloned()
        .collect();
    sorted.sort_by(|a, b| {
        a.position
            .y
            .total_cmp(&b.position.y)
            .then(a.position.x.total_cmp(&b.position.x))
    });

    let mut columns: [Vec<MergeGroup>; 2] = [Vec::new(), Vec::new()];
    for candidate in sorted {
        let column = layout.column_of(&candidate.position).unwrap_or(0);
        columns[column].push(MergeGroup::from_candidate(candidate));
    }

    let page_height = geometry.pixel_height();
    let mut regions = Vec::new();
    for groups in columns {
        for group in merge_groups(groups, &config.merge) {
            let Some((rect, region_type)) =
                refine_group(&group, lines, page_height, &config.caption)
            else {
                continue;
            };
            let rect = snap_to_column(rect, lines, layout, page_height, &config.merge);

            let region = Region {
                id: String::new(),
                region_type,
                position: rect,
                label: String::new(),
                member_candidates: group.members,
            };
            if is_formula_region(&region, text_runs, &config.merge) {
                debug!(?rect, "group rejected: formula");
                continue;
            }
            regions.push(region);
        }
    }
    regions
}

/// 結合判定: IoU が閾値超え、または一方向に近接し直交方向に十分重なる。
pub fn should_merge(a: &Rect, b: &Rect, config: &MergeConfig) -> bool {
    if a.iou(b) > config.iou_threshold {
        return true;
    }
    let near = |sa: f64, sb: f64| (config.near_gap_ratio * sa.min(sb)).min(config.near_gap_max);

    let min_h = a.height.min(b.height);
    let side_by_side = a.gap_x(b) < near(a.width, b.width)
        && min_h > 0.0
        && a.overlap_y(b) / min_h >= config.orthogonal_overlap;

    let min_w = a.width.min(b.width);
    let stacked = a.gap_y(b) < near(a.height, b.height)
        && min_w > 0.0
        && a.overlap_x(b) / min_w >= config.orthogonal_overlap;

    side_by_side || stacked
}

/// 変化がなくなるまで（最大 `max_passes` 回）貪欲に結合する。
pub fn merge_groups(mut groups: Vec<MergeGroup>, config: &MergeConfig) -> Vec<MergeGroup> {
    for _ in 0..config.max_passes.max(1) {
        let mut changed = false;
        let mut merged: Vec<MergeGroup> = Vec::with_capacity(groups.len());
        for group in groups {
            match merged
                .iter_mut()
                .find(|m| should_merge(&m.rect, &group.rect, config))
            {
                Some(target) => {
                    target.absorb(group);
                    changed = true;
                }
                None => merged.push(group),
            }
        }
        groups = merged;
        if !changed {
            break;
        }
    }
    groups
}

/// キャプション・本文・ラベル・見出しでグループの上下端を調整し、種別を決める。
///
/// 調整後の高さが `min_height` を下回る場合は調整をやめる。
pub fn refine_group(
    group: &MergeGroup,
    lines: &[TextLine],
    page_height: f64,
    config: &CaptionConfig,
) -> Option<(Rect, RegionType)> {
    let mut rect = group.rect;
    if rect.width <= 0.0 || rect.height <= 0.0 {
        return None;
    }
    let members_bottom = group.members_bottom();
    let search_limit = rect.bottom() + config.search_below_ratio * page_height;

    // 下端に最も近いキャプション行（グループの下半分より下）
    let caption = lines
        .iter()
        .filter(|l| caption_kind(&l.text).is_some())
        .filter(|l| l.rect.y >= rect.center_y() && l.rect.y <= search_limit)
        .filter(|l| l.rect.overlap_x(&rect) > 0.0)
        .min_by(|a, b| {
            (a.rect.y - rect.bottom())
                .abs()
                .total_cmp(&(b.rect.y - rect.bottom()).abs())
        });

    let below = |l: &&TextLine| {
        l.rect.y >= members_bottom - config.label_member_slack && l.rect.y <= search_limit
    };
    let prose = if caption.is_none() {
        lines
            .iter()
            .filter(below)
            .filter(|l| is_prose_line(&l.text, config))
            .filter(|l| {
                l.rect.overlap_x(&rect) >= l.rect.width.min(rect.width) * config.label_min_overlap
            })
            .min_by(|a, b| a.rect.y.total_cmp(&b.rect.y))
    } else {
        None
    };

    let ceiling = caption
        .map(|c| c.rect.y - config.caption_margin)
        .or(prose.map(|p| p.rect.y - config.prose_margin));
    let label_bottom = label_chain_bottom(lines, &rect, members_bottom, ceiling, config);

    let mut bottom = rect.bottom();
    if let Some(limit) = ceiling {
        bottom = bottom.min(limit);
    }
    if let Some(label) = label_bottom {
        bottom = bottom.max(label);
    }
    if bottom - rect.y >= config.min_height {
        rect.height = bottom - rect.y;
    }

    rect = trim_header(rect, lines, config);

    let region_type = caption
        .and_then(|c| caption_kind(&c.text))
        .or_else(|| table_heading(lines, &rect, config))
        .unwrap_or(RegionType::Image);
    Some((rect, region_type))
}

/// メンバーの直下から連続するラベル行の下端。
fn label_chain_bottom(
    lines: &[TextLine],
    rect: &Rect,
    members_bottom: f64,
    ceiling: Option<f64>,
    config: &CaptionConfig,
) -> Option<f64> {
    let mut labels: Vec<&TextLine> = lines
        .iter()
        .filter(|l| l.rect.y >= members_bottom - config.label_member_slack)
        .filter(|l| ceiling.is_none_or(|c| l.rect.bottom() <= c))
        .filter(|l| l.rect.overlap_x(rect) >= rect.width * config.label_min_overlap)
        .filter(|l| caption_kind(&l.text).is_none() && !is_prose_line(&l.text, config))
        .filter(|l| is_label_line(&l.text, config))
        .collect();
    labels.sort_by(|a, b| a.rect.y.total_cmp(&b.rect.y));

    let max_gap = config.line_tolerance * 2.0;
    let mut cursor = members_bottom;
    let mut found = None;
    for label in labels {
        if label.rect.y - cursor > max_gap {
            break;
        }
        cursor = cursor.max(label.rect.bottom());
        found = Some(cursor);
    }
    found
}

/// 上端をまたぐ段見出しがあれば、その下まで上端を下げる（小さな調整のみ）。
fn trim_header(rect: Rect, lines: &[TextLine], config: &CaptionConfig) -> Rect {
    let header = lines
        .iter()
        .filter(|l| l.rect.y <= rect.y + config.header_straddle && l.rect.bottom() > rect.y)
        .filter(|l| l.rect.overlap_x(&rect) > 0.0)
        .filter(|l| is_header_line(&l.text, config))
        .max_by(|a, b| a.rect.bottom().total_cmp(&b.rect.bottom()));
    let Some(header) = header else {
        return rect;
    };

    let delta = header.rect.bottom() + config.header_straddle - rect.y;
    let max_trim = (rect.height * config.header_max_trim_ratio).min(config.header_max_trim);
    if delta > 0.0 && delta <= max_trim && rect.height - delta >= config.min_height {
        Rect::new(rect.x, rect.y + delta, rect.width, rect.height - delta)
    } else {
        rect
    }
}

/// 上端の直上にある "Table N" 見出し。
fn table_heading(lines: &[TextLine], rect: &Rect, config: &CaptionConfig) -> Option<RegionType> {
    lines
        .iter()
        .filter(|l| {
            l.rect.bottom() >= rect.y - config.table_heading_gap
                && l.rect.y <= rect.y + config.line_tolerance
                && l.rect.overlap_x(rect) > 0.0
        })
        .find_map(|l| caption_kind(&l.text).filter(|k| *k == RegionType::Table))
}

/// 2段組で、直下のテキストが属する段に幅を揃える。
pub fn snap_to_column(
    rect: Rect,
    lines: &[TextLine],
    layout: &ColumnLayout,
    page_height: f64,
    config: &MergeConfig,
) -> Rect {
    let ColumnLayout::Double { left, right, .. } = *layout else {
        return rect;
    };
    let window = rect.bottom() + config.column_snap_below_ratio * page_height;
    let below: Vec<&TextLine> = lines
        .iter()
        .filter(|l| l.rect.y >= rect.bottom() && l.rect.y <= window)
        .collect();
    if below.is_empty() {
        return rect;
    }

    let left_ov: f64 = below.iter().map(|l| span_overlap(&l.rect, left)).sum();
    let right_ov: f64 = below.iter().map(|l| span_overlap(&l.rect, right)).sum();
    let span = if left_ov > right_ov {
        left
    } else if right_ov > left_ov {
        right
    } else {
        return rect;
    };

    let col_w = span.1 - span.0;
    let inset = config.column_snap_inset;
    if col_w <= inset * 2.0 {
        return rect;
    }
    let center = rect.center_x();
    if center < span.0 || center > span.1 || rect.width >= col_w * config.column_snap_width_ratio {
        return rect;
    }
    let target_x = span.0 + inset;
    if (target_x - rect.x).abs() > col_w * config.column_snap_max_shift_ratio {
        return rect;
    }
    Rect::new(target_x, rect.y, col_w - inset * 2.0, rect.height)
}

/// 中身が数式記号だけで、ベクター/画像の裏付けがない領域か。
fn is_formula_region(region: &Region, text_runs: &[TextRun], config: &MergeConfig) -> bool {
    if region.has_structural_member() {
        return false;
    }
    let text: Vec<&str> = text_runs
        .iter()
        .filter(|r| {
            let area = r.rect().area();
            area > 0.0
                && r.rect().intersection_area(&region.position)
                    >= area * config.formula_run_overlap
        })
        .map(|r| r.content.as_str())
        .collect();
    !text.is_empty() && is_formula_text(&text.join(" "), config)
}
