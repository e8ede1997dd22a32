// Phase 2: 画像・Form XObject の描画位置を候補にする

use tracing::debug;

use super::geometry::{CandidateSource, PageGeometry, Rect, RectCandidate};
use crate::config::detector::ImagePaintConfig;
use crate::pdf::content_stream::{Matrix, TransformState};

pub struct ImagePaintExtractor<'a> {
    config: &'a ImagePaintConfig,
    geometry: &'a PageGeometry,
    accepted: Vec<RectCandidate>,
}

impl<'a> ImagePaintExtractor<'a> {
    pub fn new(config: &'a ImagePaintConfig, geometry: &'a PageGeometry) -> Self {
        Self {
            config,
            geometry,
            accepted: Vec::new(),
        }
    }

    /// 画像は単位正方形をCTMで写した領域に描かれる。
    pub fn paint_image(&mut self, transform: &TransformState) {
        let corners = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        let points = corners.map(|(x, y)| transform.apply(x, y));
        self.accept_quad(points);
    }

    /// Form XObjectは /BBox を /Matrix → CTM の順に写す。
    pub fn paint_form(&mut self, transform: &TransformState, bbox: [f64; 4], matrix: &Matrix) {
        let combined = matrix.multiply(transform.current());
        let [x0, y0, x1, y1] = bbox;
        let points = [(x0, y0), (x1, y0), (x1, y1), (x0, y1)].map(|(x, y)| combined.apply(x, y));
        self.accept_quad(points);
    }

    pub fn finish(self) -> Vec<RectCandidate> {
        self.accepted
    }

    fn accept_quad(&mut self, points: [(f64, f64); 4]) {
        let pixels = points.map(|(x, y)| self.geometry.to_pixel(x, y));
        let left = pixels.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
        let right = pixels.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
        let top = pixels.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
        let bottom = pixels.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
        if !(left.is_finite() && right.is_finite() && top.is_finite() && bottom.is_finite()) {
            return;
        }
        let rect = Rect::from_edges(left, top, right, bottom);

        let cfg = self.config;
        if rect.width < cfg.min_side || rect.height < cfg.min_side {
            return;
        }
        let bounds = self.geometry.pixel_bounds();
        let margin = cfg.outside_margin;
        if rect.x < bounds.x - margin
            || rect.y < bounds.y - margin
            || rect.right() > bounds.right() + margin
            || rect.bottom() > bounds.bottom() + margin
        {
            debug!(?rect, "image paint rejected: outside page");
            return;
        }

        let pad = cfg
            .max_padding
            .min(rect.width * cfg.padding_ratio)
            .min(rect.height * cfg.padding_ratio);
        self.accepted.push(RectCandidate::new(
            rect.inflate(pad, pad),
            CandidateSource::ImagePaint,
        ));
    }
}
