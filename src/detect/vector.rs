// Phase 2: パス構築命令から軸平行矩形を抽出する

use tracing::debug;

use super::geometry::{
    CandidateSource, FillDescriptor, PageGeometry, Rect, RectCandidate, TextRun,
};
use crate::config::detector::VectorConfig;
use crate::pdf::content_stream::{PaintMode, TransformState};

/// パス構築命令を受け取り、塗り/線描で確定した矩形を候補にする。
///
/// 矩形と判定されたサブパスはいったん保留し、次のペイント命令で評価する。
/// クリップやペイントなしの終了では保留分を捨てる。
pub struct VectorPathRectExtractor<'a> {
    config: &'a VectorConfig,
    geometry: &'a PageGeometry,
    text_rects: Vec<Rect>,
    /// 現在のサブパス（CTM適用済みのコンテンツ空間）
    subpath: Vec<(f64, f64)>,
    /// 矩形と判定済みでペイント待ちのもの（ページピクセル空間）
    pending: Vec<Rect>,
    /// `m` で打ち切られた開いたサブパスのうち矩形になるもの。塗りでのみ閉じる。
    open_pending: Vec<Rect>,
    accepted: Vec<RectCandidate>,
}

impl<'a> VectorPathRectExtractor<'a> {
    pub fn new(
        config: &'a VectorConfig,
        geometry: &'a PageGeometry,
        text_runs: &[TextRun],
    ) -> Self {
        Self {
            config,
            geometry,
            text_rects: text_runs.iter().map(TextRun::rect).collect(),
            subpath: Vec::new(),
            pending: Vec::new(),
            open_pending: Vec::new(),
            accepted: Vec::new(),
        }
    }

    /// 新しいサブパスを始める。直前の開いたサブパスも塗りでは暗黙に閉じるので残しておく。
    pub fn move_to(&mut self, transform: &TransformState, x: f64, y: f64) {
        self.end_open_subpath();
        self.subpath.push(transform.apply(x, y));
    }

    pub fn line_to(&mut self, transform: &TransformState, x: f64, y: f64) {
        self.subpath.push(transform.apply(x, y));
    }

    /// `re` は閉じた4点のサブパスとして即座に判定する。
    pub fn rectangle(&mut self, transform: &TransformState, x: f64, y: f64, w: f64, h: f64) {
        self.end_open_subpath();
        for (px, py) in [(x, y), (x + w, y), (x + w, y + h), (x, y + h)] {
            self.subpath.push(transform.apply(px, py));
        }
        self.close_path();
    }

    pub fn close_path(&mut self) {
        if let Some(rect) = self.subpath_rect() {
            self.pending.push(rect);
        }
        self.subpath.clear();
    }

    fn end_open_subpath(&mut self) {
        if let Some(rect) = self.subpath_rect() {
            self.open_pending.push(rect);
        }
        self.subpath.clear();
    }

    /// ペイント命令。保留中の矩形をすべて評価する。
    ///
    /// fill は開いたサブパスを暗黙に閉じる。
    pub fn paint(&mut self, mode: PaintMode, close: bool, fill: &FillDescriptor) {
        if close || (mode.fills() && self.subpath.len() >= 4) {
            self.close_path();
        }
        self.subpath.clear();

        // 打ち切られた開いたサブパスは塗りのときだけ閉じて評価する
        let mut pending = std::mem::take(&mut self.open_pending);
        if !mode.fills() {
            pending.clear();
        }
        pending.append(&mut self.pending);
        for rect in pending {
            if let Some(candidate) = self.evaluate(rect, mode, fill) {
                self.accepted.push(candidate);
            }
        }
    }

    /// `W`/`W*`/`n`：何も出力せずに保留分を捨てる。
    pub fn discard(&mut self) {
        self.pending.clear();
        self.open_pending.clear();
        self.subpath.clear();
    }

    pub fn finish(self) -> Vec<RectCandidate> {
        self.accepted
    }

    fn subpath_rect(&self) -> Option<Rect> {
        if self.subpath.len() < 4 {
            return None;
        }
        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for &(x, y) in &self.subpath {
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }

        let eps = self.config.axis_epsilon;
        let axis_aligned = self.subpath.iter().all(|&(x, y)| {
            ((x - min_x).abs() <= eps || (x - max_x).abs() <= eps)
                && ((y - min_y).abs() <= eps || (y - max_y).abs() <= eps)
        });
        if !axis_aligned || max_x - min_x <= eps || max_y - min_y <= eps {
            return None;
        }

        let (left, top) = self.geometry.to_pixel(min_x, max_y);
        let (right, bottom) = self.geometry.to_pixel(max_x, min_y);
        Some(Rect::from_edges(left, top, right, bottom))
    }

    fn evaluate(
        &self,
        rect: Rect,
        mode: PaintMode,
        fill: &FillDescriptor,
    ) -> Option<RectCandidate> {
        let cfg = self.config;
        if rect.width < cfg.min_side || rect.height < cfg.min_side {
            return None;
        }
        let aspect = (rect.width / rect.height).max(rect.height / rect.width);
        if aspect > cfg.max_aspect {
            return None;
        }

        let cover = text_cover_ratio(&rect, &self.text_rects);
        let limit = if mode.fills() {
            cfg.fill_text_cover_max
        } else {
            cfg.stroke_text_cover_max
        };
        if cover > limit {
            debug!(cover, limit, "vector rect rejected: text coverage");
            return None;
        }

        let page_area = self.geometry.pixel_width() * self.geometry.pixel_height();
        if mode.fills() && fill.is_white() && rect.area() >= cfg.background_page_ratio * page_area {
            debug!("vector rect rejected: white page background");
            return None;
        }

        if self
            .accepted
            .iter()
            .any(|c| c.position.iou(&rect) > cfg.duplicate_iou)
        {
            return None;
        }

        let mut candidate = RectCandidate::new(rect, CandidateSource::VectorPath);
        candidate.fill = Some(fill.clone());
        Some(candidate)
    }
}

/// テキスト矩形が覆う面積の割合（重複は加算、1で打ち切り）。
pub fn text_cover_ratio(rect: &Rect, text_rects: &[Rect]) -> f64 {
    let area = rect.area();
    if area <= 0.0 {
        return 0.0;
    }
    let covered: f64 = text_rects.iter().map(|t| rect.intersection_area(t)).sum();
    (covered / area).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_cover_ratio_partial() {
        let rect = Rect::new(0.0, 0.0, 100.0, 100.0);
        let texts = [Rect::new(0.0, 0.0, 100.0, 25.0)];
        assert!((text_cover_ratio(&rect, &texts) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_non_rectangular_subpath_is_ignored() {
        let config = VectorConfig::default();
        let geometry = PageGeometry::new(600.0, 800.0, 1.0);
        let mut ex = VectorPathRectExtractor::new(&config, &geometry, &[]);
        let t = TransformState::new();
        ex.move_to(&t, 0.0, 0.0);
        ex.line_to(&t, 100.0, 0.0);
        ex.line_to(&t, 150.0, 80.0);
        ex.line_to(&t, 0.0, 80.0);
        ex.paint(PaintMode::Fill, true, &FillDescriptor::default_black());
        assert!(ex.finish().is_empty());
    }

    #[test]
    fn test_open_subpath_is_stroked_without_closing() {
        let config = VectorConfig::default();
        let geometry = PageGeometry::new(600.0, 800.0, 1.0);
        let mut ex = VectorPathRectExtractor::new(&config, &geometry, &[]);
        let t = TransformState::new();
        for x0 in [50.0, 300.0] {
            ex.move_to(&t, x0, 100.0);
            ex.line_to(&t, x0 + 200.0, 100.0);
            ex.line_to(&t, x0 + 200.0, 300.0);
            ex.line_to(&t, x0, 300.0);
        }
        // 開いたまま線描すると3辺しか描かれない
        ex.paint(PaintMode::Stroke, false, &FillDescriptor::default_black());
        assert!(ex.finish().is_empty());
    }
}
