// Phase 4: テキスト行のグルーピング・段組判定・行の分類

use std::sync::LazyLock;

use regex::Regex;

use super::geometry::{Rect, RegionType, TextRun};
use crate::config::detector::{CaptionConfig, MergeConfig};

static FIGURE_CAPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(figure|fig\.?|图表|图)\s*[:：]?\s*\d+").expect("valid regex")
});

static TABLE_CAPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(table|tab\.?|表)\s*[:：]?\s*\d+").expect("valid regex")
});

/// 見出し判定から除外する図表の接頭辞（番号なしも含む）。
static CAPTION_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(figure|fig\.|table|图|表)").expect("valid regex"));

/// 行末の式番号 "(12)"
static EQUATION_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*\d+\s*\)\s*$").expect("valid regex"));

const MATH_SYMBOLS: &[char] = &[
    '=', '∑', '∫', '∏', '√', '≤', '≥', '≈', '≠', '±', '×', '÷', '∂', '∞', '∈', '→', '^', '_',
];

/// 同じベースラインに並ぶテキストランの集まり。
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub text: String,
    pub rect: Rect,
}

/// テキストランを行にまとめる。
///
/// 上端のy差が `line_tolerance` 以内のランを同じ行とし、行内はx順に連結する。
/// 結果は上から下の順。
pub fn group_lines(runs: &[TextRun], config: &CaptionConfig) -> Vec<TextLine> {
    let tolerance = config.line_tolerance;
    let mut sorted: Vec<&TextRun> = runs
        .iter()
        .filter(|r| !r.content.trim().is_empty())
        .collect();
    sorted.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));

    let mut groups: Vec<Vec<&TextRun>> = Vec::new();
    for run in sorted {
        match groups.last_mut() {
            Some(group) if (mean_top(group) - run.y).abs() <= tolerance => group.push(run),
            _ => groups.push(vec![run]),
        }
    }

    groups
        .into_iter()
        .map(|mut group| {
            group.sort_by(|a, b| a.x.total_cmp(&b.x));
            let mut text = String::new();
            let mut rect = group[0].rect();
            let mut prev_right: Option<f64> = None;
            for run in &group {
                if let Some(right) = prev_right {
                    let gap = run.x - right;
                    let needs_space = !text.ends_with(char::is_whitespace)
                        && !run.content.starts_with(char::is_whitespace)
                        && gap > config.word_gap_ratio * run.height.max(1.0);
                    if needs_space {
                        text.push(' ');
                    }
                }
                text.push_str(&run.content);
                rect = rect.union(&run.rect());
                prev_right = Some(run.x + run.width);
            }
            TextLine {
                text: text.trim().to_string(),
                rect,
            }
        })
        .collect()
}

fn mean_top(group: &[&TextRun]) -> f64 {
    group.iter().map(|r| r.y).sum::<f64>() / group.len() as f64
}

/// ページの段組。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnLayout {
    Single,
    /// 2段組。`left`/`right` は各段の (左端, 右端)。
    Double {
        boundary_x: f64,
        left: (f64, f64),
        right: (f64, f64),
    },
}

impl ColumnLayout {
    /// 矩形が属する段（0=左, 1=右）。2段組でなければ None。
    ///
    /// 重なりが大きい方を選び、同じなら左。
    pub fn column_of(&self, rect: &Rect) -> Option<usize> {
        match *self {
            ColumnLayout::Single => None,
            ColumnLayout::Double { left, right, .. } => {
                let ov_left = span_overlap(rect, left);
                let ov_right = span_overlap(rect, right);
                if ov_left == 0.0 && ov_right == 0.0 {
                    Some(if rect.center_x() <= self.boundary().unwrap_or(0.0) {
                        0
                    } else {
                        1
                    })
                } else if ov_right > ov_left {
                    Some(1)
                } else {
                    Some(0)
                }
            }
        }
    }

    pub fn span(&self, column: usize) -> Option<(f64, f64)> {
        match *self {
            ColumnLayout::Single => None,
            ColumnLayout::Double { left, right, .. } => {
                Some(if column == 0 { left } else { right })
            }
        }
    }

    pub fn boundary(&self) -> Option<f64> {
        match *self {
            ColumnLayout::Single => None,
            ColumnLayout::Double { boundary_x, .. } => Some(boundary_x),
        }
    }
}

/// 矩形とx区間の重なり幅。
pub fn span_overlap(rect: &Rect, span: (f64, f64)) -> f64 {
    (rect.right().min(span.1) - rect.x.max(span.0)).max(0.0)
}

/// テキストランの左端分布から段組を推定する。
///
/// 左端をソートして最大の隙間を探し、その隙間がページ幅の一定割合以上で
/// 両側に十分な数のランがあれば2段組とする。
pub fn infer_column_layout(
    runs: &[TextRun],
    page_left: f64,
    page_width: f64,
    config: &MergeConfig,
) -> ColumnLayout {
    if runs.len() < config.layout_min_runs || page_width <= 0.0 {
        return ColumnLayout::Single;
    }
    let mut xs: Vec<f64> = runs.iter().map(|r| r.x).collect();
    xs.sort_by(f64::total_cmp);

    let mut best_gap = 0.0;
    let mut split = 0;
    for i in 1..xs.len() {
        let gap = xs[i] - xs[i - 1];
        if gap > best_gap {
            best_gap = gap;
            split = i;
        }
    }
    if best_gap < config.layout_min_gap_ratio * page_width {
        return ColumnLayout::Single;
    }

    let min_side = (runs.len() as f64 * config.layout_min_side_share).ceil() as usize;
    let left_count = split;
    let right_count = xs.len() - split;
    if left_count < min_side || right_count < min_side {
        return ColumnLayout::Single;
    }

    let boundary_x = xs[split - 1] + best_gap / 2.0;
    let right_start = xs[split];
    let left_end = runs
        .iter()
        .filter(|r| r.x < right_start)
        .map(|r| r.x + r.width)
        .fold(f64::NEG_INFINITY, f64::max)
        .min(right_start);
    let right_end = runs
        .iter()
        .filter(|r| r.x >= right_start)
        .map(|r| r.x + r.width)
        .fold(f64::NEG_INFINITY, f64::max);

    ColumnLayout::Double {
        boundary_x,
        left: (xs[0].max(page_left), left_end),
        right: (right_start, right_end.min(page_left + page_width)),
    }
}

/// 行が図表キャプションの接頭辞（"Figure 3" など）で始まるか。
///
/// 部分一致ではなく行頭一致のみ（本文中の "as shown in Figure 3" は除外）。
pub fn caption_kind(text: &str) -> Option<RegionType> {
    if FIGURE_CAPTION.is_match(text) {
        Some(RegionType::Image)
    } else if TABLE_CAPTION.is_match(text) {
        Some(RegionType::Table)
    } else {
        None
    }
}

/// 図中のパネルラベル（"(a)", "Input", "Ground Truth" など）らしい短い行か。
pub fn is_label_line(text: &str, config: &CaptionConfig) -> bool {
    let text = text.trim();
    if text.is_empty() || text.chars().count() > config.label_max_chars {
        return false;
    }
    if text.ends_with(['.', ':', ';']) {
        return false;
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || words.len() > config.label_max_words {
        return false;
    }
    let good = words
        .iter()
        .filter(|w| {
            w.chars().count() <= config.label_max_word_chars
                && w.chars().any(|c| c.is_ascii_alphabetic())
        })
        .count();
    let needed = ((words.len() as f64 * config.label_min_word_share).ceil() as usize).max(1);
    good >= needed
}

/// 本文の段落らしい長い行か。
pub fn is_prose_line(text: &str, config: &CaptionConfig) -> bool {
    text.chars().count() >= config.prose_min_chars
        && text.split_whitespace().count() >= config.prose_min_words
}

/// 段の見出しらしい行か（英字主体で短く、図表キャプションではない）。
pub fn is_header_line(text: &str, config: &CaptionConfig) -> bool {
    if CAPTION_PREFIX.is_match(text) {
        return false;
    }
    let letters = text.chars().filter(|c| c.is_ascii_alphabetic()).count();
    let digits = text.chars().filter(|c| c.is_ascii_digit()).count();
    letters >= config.header_min_letters
        && letters > digits
        && text.split_whitespace().count() <= config.header_max_words
}

/// 数式記号の統計。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MathStats {
    pub symbols: usize,
    pub letters: usize,
    pub has_equation: bool,
}

pub fn math_stats(text: &str) -> MathStats {
    let symbols = text.chars().filter(|c| MATH_SYMBOLS.contains(c)).count();
    let letters = text.chars().filter(|c| c.is_alphabetic()).count();
    let has_equation = text.contains(['=', '∑', '∫']) || EQUATION_NUMBER.is_match(text);
    MathStats {
        symbols,
        letters,
        has_equation,
    }
}

/// 数式記号が密な行か。
pub fn is_formula_text(text: &str, config: &MergeConfig) -> bool {
    let stats = math_stats(text);
    stats.symbols >= config.formula_min_symbols
        && stats.symbols as f64 > stats.letters as f64 * config.formula_symbol_ratio
        && stats.has_equation
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(content: &str, x: f64, y: f64, w: f64) -> TextRun {
        TextRun {
            content: content.to_string(),
            x,
            y,
            width: w,
            height: 10.0,
            font_size: 10.0,
        }
    }

    #[test]
    fn test_caption_prefix_only() {
        assert_eq!(caption_kind("Figure 3. Model architecture."), Some(RegionType::Image));
        assert_eq!(caption_kind("Fig. 12: Results"), Some(RegionType::Image));
        assert_eq!(caption_kind("Table 2 Accuracy"), Some(RegionType::Table));
        assert_eq!(caption_kind("as shown in Figure 3"), None);
    }

    #[test]
    fn test_label_line_heuristics() {
        let cfg = CaptionConfig::default();
        assert!(is_label_line("Ground Truth", &cfg));
        assert!(is_label_line("(a) Input", &cfg));
        assert!(!is_label_line("This sentence ends with a period.", &cfg));
        assert!(!is_label_line("12 34", &cfg));
    }

    #[test]
    fn test_label_word_limits_follow_config() {
        let mut cfg = CaptionConfig::default();
        assert!(is_label_line("Segmentation", &cfg));
        cfg.label_max_word_chars = 8;
        assert!(!is_label_line("Segmentation", &cfg));
    }

    #[test]
    fn test_group_lines_joins_runs_on_same_baseline() {
        let runs = vec![run("World", 60.0, 101.0, 40.0), run("Hello", 10.0, 100.0, 40.0)];
        let lines = group_lines(&runs, &CaptionConfig::default());
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "Hello World");
    }

    #[test]
    fn test_formula_detection() {
        let cfg = MergeConfig::default();
        assert!(is_formula_text("y = ∑ x_i (3)", &cfg));
        assert!(!is_formula_text("Overview of the proposed system", &cfg));
    }
}
