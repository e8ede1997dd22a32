// Phase 2: 命令列を1回畳み込み、ベクター/画像の両抽出器に配る

use super::geometry::{FillDescriptor, PageGeometry, RectCandidate, TextRun};
use super::image_paint::ImagePaintExtractor;
use super::vector::VectorPathRectExtractor;
use crate::config::detector::DetectorConfig;
use crate::pdf::content_stream::{PageOp, TransformState};

/// コンテンツストリーム由来の候補。
#[derive(Debug, Clone, Default)]
pub struct StructuralCandidates {
    pub vector: Vec<RectCandidate>,
    pub image: Vec<RectCandidate>,
}

impl StructuralCandidates {
    pub fn into_vec(self) -> Vec<RectCandidate> {
        let mut all = self.vector;
        all.extend(self.image);
        all
    }
}

/// 再生中の状態。命令列の畳み込みの外には出ない。
struct ReplayState<'a> {
    transform: TransformState,
    fill: FillDescriptor,
    fill_stack: Vec<FillDescriptor>,
    vector: VectorPathRectExtractor<'a>,
    images: ImagePaintExtractor<'a>,
}

impl<'a> ReplayState<'a> {
    fn step(mut self, op: &PageOp) -> Self {
        match op {
            PageOp::Save => {
                self.transform.push();
                self.fill_stack.push(self.fill.clone());
            }
            PageOp::Restore => {
                self.transform.pop();
                if let Some(fill) = self.fill_stack.pop() {
                    self.fill = fill;
                }
            }
            PageOp::Transform(m) => self.transform.compose(m),
            PageOp::SetTransform(m) => self.transform.replace(*m),
            PageOp::MoveTo(x, y) => self.vector.move_to(&self.transform, *x, *y),
            PageOp::LineTo(x, y) | PageOp::CurveTo(x, y) => {
                self.vector.line_to(&self.transform, *x, *y)
            }
            PageOp::Rectangle {
                x,
                y,
                width,
                height,
            } => self
                .vector
                .rectangle(&self.transform, *x, *y, *width, *height),
            PageOp::ClosePath => self.vector.close_path(),
            PageOp::Paint { mode, close } => self.vector.paint(*mode, *close, &self.fill),
            PageOp::Clip | PageOp::EndPath => self.vector.discard(),
            PageOp::PaintImage | PageOp::PaintInlineImage => {
                self.images.paint_image(&self.transform)
            }
            PageOp::PaintForm { bbox, matrix } => {
                self.images.paint_form(&self.transform, *bbox, matrix)
            }
            PageOp::SetFill(fill) => self.fill = fill.clone(),
        }
        self
    }
}

/// 命令列を再生して構造的候補を集める。
pub fn replay_operations(
    ops: &[PageOp],
    geometry: &PageGeometry,
    text_runs: &[TextRun],
    config: &DetectorConfig,
) -> StructuralCandidates {
    let initial = ReplayState {
        transform: TransformState::new(),
        fill: FillDescriptor::default_black(),
        fill_stack: Vec::new(),
        vector: VectorPathRectExtractor::new(&config.vector, geometry, text_runs),
        images: ImagePaintExtractor::new(&config.image, geometry),
    };
    let state = ops.iter().fold(initial, ReplayState::step);
    StructuralCandidates {
        vector: state.vector.finish(),
        image: state.images.finish(),
    }
}
