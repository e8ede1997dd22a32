// Phase 1: 検出パイプライン共通のデータモデル

use serde::{Deserialize, Serialize};

/// ページピクセル空間の軸平行矩形（左上原点）。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// 2点の min/max から矩形を作る。
    pub fn from_edges(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            x: left.min(right),
            y: top.min(bottom),
            width: (right - left).abs(),
            height: (bottom - top).abs(),
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }

    pub fn center_y(&self) -> f64 {
        self.y + self.height / 2.0
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// x方向の重なり幅（重ならなければ0）。
    pub fn overlap_x(&self, other: &Rect) -> f64 {
        (self.right().min(other.right()) - self.x.max(other.x)).max(0.0)
    }

    /// y方向の重なり高さ（重ならなければ0）。
    pub fn overlap_y(&self, other: &Rect) -> f64 {
        (self.bottom().min(other.bottom()) - self.y.max(other.y)).max(0.0)
    }

    /// x方向の隙間（重なっていれば0）。
    pub fn gap_x(&self, other: &Rect) -> f64 {
        (self.x.max(other.x) - self.right().min(other.right())).max(0.0)
    }

    /// y方向の隙間（重なっていれば0）。
    pub fn gap_y(&self, other: &Rect) -> f64 {
        (self.y.max(other.y) - self.bottom().min(other.bottom())).max(0.0)
    }

    pub fn intersection_area(&self, other: &Rect) -> f64 {
        self.overlap_x(other) * self.overlap_y(other)
    }

    /// Intersection-over-union. 面積0同士は0を返す。
    pub fn iou(&self, other: &Rect) -> f64 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union > 0.0 { inter / union } else { 0.0 }
    }

    /// 小さい方の面積に対する交差面積の比（包含度）。
    pub fn containment(&self, other: &Rect) -> f64 {
        let smaller = self.area().min(other.area());
        if smaller > 0.0 {
            self.intersection_area(other) / smaller
        } else {
            0.0
        }
    }

    /// 両方を含む最小の矩形。
    pub fn union(&self, other: &Rect) -> Rect {
        Rect::from_edges(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    pub fn inflate(&self, dx: f64, dy: f64) -> Rect {
        Rect {
            x: self.x - dx,
            y: self.y - dy,
            width: self.width + dx * 2.0,
            height: self.height + dy * 2.0,
        }
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.right() && y >= self.y && y <= self.bottom()
    }

    /// `bounds` を `tolerance` だけ膨らませた範囲に完全に収まるか。
    pub fn is_within(&self, bounds: &Rect, tolerance: f64) -> bool {
        self.x >= bounds.x - tolerance
            && self.y >= bounds.y - tolerance
            && self.right() <= bounds.right() + tolerance
            && self.bottom() <= bounds.bottom() + tolerance
    }
}

/// ページ単位で不変のジオメトリ情報。
///
/// コンテンツ空間（PDFユーザー空間、y上向き）からページピクセル空間
/// （左上原点、y下向き）への変換に必要な値を保持する。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    /// 可視領域（CropBox）の幅（コンテンツ単位）
    pub page_width: f64,
    /// 可視領域（CropBox）の高さ（コンテンツ単位）
    pub page_height: f64,
    /// MediaBox原点からCropBox原点までのずれ
    pub crop_offset_x: f64,
    pub crop_offset_y: f64,
    /// コンテンツ単位 → ピクセルの倍率
    pub render_scale: f64,
    /// コンテナ内でのページ描画位置（ピクセル）
    pub container_offset_x: f64,
    pub container_offset_y: f64,
}

impl PageGeometry {
    /// クロップなし・オフセットなしのジオメトリ。
    pub fn new(page_width: f64, page_height: f64, render_scale: f64) -> Self {
        Self {
            page_width,
            page_height,
            crop_offset_x: 0.0,
            crop_offset_y: 0.0,
            render_scale,
            container_offset_x: 0.0,
            container_offset_y: 0.0,
        }
    }

    /// コンテンツ空間（CTM適用済み）の点をページピクセル空間に写す。
    ///
    /// クロップ補正 → y軸反転 → スケール → コンテナオフセットの順に適用する。
    pub fn to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let cx = x - self.crop_offset_x;
        let cy = y - self.crop_offset_y;
        (
            self.container_offset_x + cx * self.render_scale,
            self.container_offset_y + (self.page_height - cy) * self.render_scale,
        )
    }

    /// ページ全体が占めるピクセル矩形。
    pub fn pixel_bounds(&self) -> Rect {
        Rect::new(
            self.container_offset_x,
            self.container_offset_y,
            self.page_width * self.render_scale,
            self.page_height * self.render_scale,
        )
    }

    pub fn pixel_width(&self) -> f64 {
        self.page_width * self.render_scale
    }

    pub fn pixel_height(&self) -> f64 {
        self.page_height * self.render_scale
    }
}

/// テキストランの位置とサイズ（ページピクセル空間、左上原点）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub content: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub font_size: f64,
}

impl TextRun {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width.max(0.0), self.height.max(0.0))
    }
}

/// 候補矩形の出所。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandidateSource {
    VectorPath,
    ImagePaint,
    InkMask,
    CaptionFallback,
}

impl CandidateSource {
    /// コンテンツストリーム由来（ベクター/画像）か。
    pub fn is_structural(self) -> bool {
        matches!(self, CandidateSource::VectorPath | CandidateSource::ImagePaint)
    }
}

/// fill color の状態。却下ヒューリスティックにのみ使う。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "space", content = "value", rename_all = "lowercase")]
pub enum FillDescriptor {
    Gray(f64),
    Rgb(f64, f64, f64),
    Cmyk(f64, f64, f64, f64),
}

impl FillDescriptor {
    pub fn default_black() -> Self {
        FillDescriptor::Gray(0.0)
    }

    /// 白（背景と見分けがつかない塗り）か。
    pub fn is_white(&self) -> bool {
        const WHITE_EPS: f64 = 0.01;
        match *self {
            FillDescriptor::Gray(g) => g >= 1.0 - WHITE_EPS,
            FillDescriptor::Rgb(r, g, b) => {
                r >= 1.0 - WHITE_EPS && g >= 1.0 - WHITE_EPS && b >= 1.0 - WHITE_EPS
            }
            FillDescriptor::Cmyk(c, m, y, k) => {
                c <= WHITE_EPS && m <= WHITE_EPS && y <= WHITE_EPS && k <= WHITE_EPS
            }
        }
    }
}

/// 1回の検出パス内でのみ生存する生の候補矩形。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RectCandidate {
    pub position: Rect,
    pub source: CandidateSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<FillDescriptor>,
}

impl RectCandidate {
    pub fn new(position: Rect, source: CandidateSource) -> Self {
        Self {
            position,
            source,
            fill: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionType {
    Image,
    Table,
}

impl RegionType {
    /// ラベルの接頭辞。
    pub fn label_prefix(self) -> &'static str {
        match self {
            RegionType::Image => "Figure",
            RegionType::Table => "Table",
        }
    }
}

/// 最終出力単位。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    #[serde(rename = "type")]
    pub region_type: RegionType,
    pub position: Rect,
    pub label: String,
    #[serde(default)]
    pub member_candidates: Vec<RectCandidate>,
}

impl Region {
    /// キャプションからの推定のみで作られた領域か。
    pub fn is_fallback(&self) -> bool {
        !self.member_candidates.is_empty()
            && self
                .member_candidates
                .iter()
                .all(|m| m.source == CandidateSource::CaptionFallback)
    }

    /// ベクター/画像由来のメンバーを持つか。
    pub fn has_structural_member(&self) -> bool {
        self.member_candidates
            .iter()
            .any(|m| m.source.is_structural())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-9);
        let b = Rect::new(20.0, 0.0, 10.0, 10.0);
        assert_eq!(a.iou(&b), 0.0);
        assert_eq!(a.gap_x(&b), 10.0);
    }

    #[test]
    fn test_to_pixel_flips_y_and_applies_crop() {
        let mut geometry = PageGeometry::new(100.0, 200.0, 2.0);
        geometry.crop_offset_x = 10.0;
        geometry.crop_offset_y = 20.0;
        let (px, py) = geometry.to_pixel(10.0, 20.0);
        assert_eq!(px, 0.0);
        assert_eq!(py, 400.0);
    }

    #[test]
    fn test_white_fill_detection() {
        assert!(FillDescriptor::Gray(1.0).is_white());
        assert!(FillDescriptor::Cmyk(0.0, 0.0, 0.0, 0.0).is_white());
        assert!(!FillDescriptor::Rgb(1.0, 0.0, 0.0).is_white());
    }
}
