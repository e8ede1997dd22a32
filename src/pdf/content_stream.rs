// Phase 2: コンテンツストリーム解析: lopdf Operation → PageOp 命令列 + CTM追跡

use std::collections::HashMap;

use lopdf::content::Content;
use tracing::debug;

use crate::detect::geometry::FillDescriptor;

/// 6要素アフィン変換行列 [a, b, c, d, e, f]
/// PDF仕様: [ a b 0 ]
///          [ c d 0 ]
///          [ e f 1 ]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Matrix {
    /// 単位行列を返す。
    pub fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: 0.0,
            f: 0.0,
        }
    }

    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// self * other (行列の右乗算)
    pub fn multiply(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    /// 点 (x, y) を変換する。
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// 6個の数値オペランドから行列を作る。
    fn from_operands(operands: &[lopdf::Object]) -> crate::error::Result<Matrix> {
        let vals = numeric_operands(operands, 6)?;
        Ok(Matrix::new(
            vals[0], vals[1], vals[2], vals[3], vals[4], vals[5],
        ))
    }
}

/// グラフィックス状態スタック上のCTM（CoordinateTransformTracker）。
///
/// q/Q で push/pop、cm で合成、setTransform 相当で置換する。
/// ページ1枚の命令列を再生する間だけ生存する。
#[derive(Debug, Clone)]
pub struct TransformState {
    current: Matrix,
    stack: Vec<Matrix>,
}

impl Default for TransformState {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformState {
    pub fn new() -> Self {
        Self {
            current: Matrix::identity(),
            stack: Vec::new(),
        }
    }

    pub fn current(&self) -> &Matrix {
        &self.current
    }

    /// 保存済み状態の数。
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// q: 現在のCTMを保存する。
    pub fn push(&mut self) {
        self.stack.push(self.current);
    }

    /// Q: 直前に保存したCTMを復元する。空スタックでは何もしない。
    pub fn pop(&mut self) {
        if let Some(saved) = self.stack.pop() {
            self.current = saved;
        }
    }

    /// cm: CTM' = m × CTM
    pub fn compose(&mut self, m: &Matrix) {
        self.current = m.multiply(&self.current);
    }

    pub fn replace(&mut self, m: Matrix) {
        self.current = m;
    }

    /// コンテンツ空間の点を現在のCTMで変換する。
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        self.current.apply(x, y)
    }
}

/// 塗りの種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintMode {
    Fill,
    Stroke,
    FillStroke,
}

impl PaintMode {
    /// fill を含むか（テキスト被覆閾値の選択に使う）。
    pub fn fills(self) -> bool {
        matches!(self, PaintMode::Fill | PaintMode::FillStroke)
    }
}

/// ページ上のXObjectの種別。
#[derive(Debug, Clone, PartialEq)]
pub enum XObjectKind {
    Image,
    /// /BBox [x0 y0 x1 y1] と /Matrix を持つForm XObject
    Form { bbox: [f64; 4], matrix: Matrix },
}

/// 検出に必要な命令だけを残したページ命令列の1要素。
#[derive(Debug, Clone, PartialEq)]
pub enum PageOp {
    Save,
    Restore,
    Transform(Matrix),
    /// CTMの置換（PDFには無いが、ホスト由来の命令列で使われる）
    SetTransform(Matrix),
    MoveTo(f64, f64),
    LineTo(f64, f64),
    /// 曲線は終点への直線として扱う
    CurveTo(f64, f64),
    Rectangle {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    ClosePath,
    Paint {
        mode: PaintMode,
        close: bool,
    },
    Clip,
    EndPath,
    PaintImage,
    PaintInlineImage,
    PaintForm {
        bbox: [f64; 4],
        matrix: Matrix,
    },
    SetFill(FillDescriptor),
}

/// コンテンツストリームを解析し、検出用の命令列に変換する。
///
/// オペランドが不正な命令はスキップして続行する（ページ全体は失敗させない）。
/// `xobjects` は Do オペレータの名前解決に使う。未知の名前は画像として扱う。
pub fn decode_operations(
    content_bytes: &[u8],
    xobjects: &HashMap<String, XObjectKind>,
) -> crate::error::Result<Vec<PageOp>> {
    // 空バイト列の場合、lopdfのパーサがエラーを返す可能性があるため特別扱い
    if content_bytes.is_empty() {
        return Ok(Vec::new());
    }

    let content = Content::decode(content_bytes)
        .map_err(|e| crate::error::RegionError::content_stream(e.to_string()))?;

    let mut ops = Vec::with_capacity(content.operations.len());
    let mut skipped = 0usize;
    for op in &content.operations {
        match to_page_op(op, xobjects) {
            Ok(Some(page_op)) => ops.push(page_op),
            Ok(None) => {}
            Err(e) => {
                skipped += 1;
                debug!(operator = %op.operator, error = %e, "skipping malformed operator");
            }
        }
    }
    if skipped > 0 {
        debug!(skipped, "content stream decoded with skipped operators");
    }

    Ok(ops)
}

/// lopdf の Operation を PageOp に変換する。検出に関係しない命令は `None`。
fn to_page_op(
    op: &lopdf::content::Operation,
    xobjects: &HashMap<String, XObjectKind>,
) -> crate::error::Result<Option<PageOp>> {
    let operands = op.operands.as_slice();
    let page_op = match op.operator.as_str() {
        "q" => PageOp::Save,
        "Q" => PageOp::Restore,
        "cm" => PageOp::Transform(Matrix::from_operands(operands)?),
        "m" => {
            let v = numeric_operands(operands, 2)?;
            PageOp::MoveTo(v[0], v[1])
        }
        "l" => {
            let v = numeric_operands(operands, 2)?;
            PageOp::LineTo(v[0], v[1])
        }
        "c" => {
            let v = numeric_operands(operands, 6)?;
            PageOp::CurveTo(v[4], v[5])
        }
        "v" | "y" => {
            let v = numeric_operands(operands, 4)?;
            PageOp::CurveTo(v[2], v[3])
        }
        "re" => {
            let v = numeric_operands(operands, 4)?;
            PageOp::Rectangle {
                x: v[0],
                y: v[1],
                width: v[2],
                height: v[3],
            }
        }
        "h" => PageOp::ClosePath,
        "f" | "F" | "f*" => PageOp::Paint {
            mode: PaintMode::Fill,
            close: false,
        },
        "B" | "B*" => PageOp::Paint {
            mode: PaintMode::FillStroke,
            close: false,
        },
        "b" | "b*" => PageOp::Paint {
            mode: PaintMode::FillStroke,
            close: true,
        },
        "S" => PageOp::Paint {
            mode: PaintMode::Stroke,
            close: false,
        },
        "s" => PageOp::Paint {
            mode: PaintMode::Stroke,
            close: true,
        },
        "W" | "W*" => PageOp::Clip,
        "n" => PageOp::EndPath,
        "Do" => {
            let name_bytes = operands
                .first()
                .ok_or_else(|| crate::error::RegionError::content_stream("Do without operand"))?
                .as_name()
                .map_err(|e| crate::error::RegionError::content_stream(e.to_string()))?;
            let name = String::from_utf8_lossy(name_bytes);
            match xobjects.get(name.as_ref()) {
                Some(XObjectKind::Form { bbox, matrix }) => PageOp::PaintForm {
                    bbox: *bbox,
                    matrix: *matrix,
                },
                _ => PageOp::PaintImage,
            }
        }
        "BI" => PageOp::PaintInlineImage,
        "g" => {
            let v = numeric_operands(operands, 1)?;
            PageOp::SetFill(FillDescriptor::Gray(v[0]))
        }
        "rg" => {
            let v = numeric_operands(operands, 3)?;
            PageOp::SetFill(FillDescriptor::Rgb(v[0], v[1], v[2]))
        }
        "k" => {
            let v = numeric_operands(operands, 4)?;
            PageOp::SetFill(FillDescriptor::Cmyk(v[0], v[1], v[2], v[3]))
        }
        "sc" | "scn" => {
            // パターン名付きの scn は色として扱わない
            let vals: Vec<f64> = operands
                .iter()
                .map(operand_to_f64)
                .collect::<Result<Vec<_>, _>>()?;
            match vals.as_slice() {
                [g] => PageOp::SetFill(FillDescriptor::Gray(*g)),
                [r, g, b] => PageOp::SetFill(FillDescriptor::Rgb(*r, *g, *b)),
                [c, m, y, k] => PageOp::SetFill(FillDescriptor::Cmyk(*c, *m, *y, *k)),
                _ => return Ok(None),
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(page_op))
}

/// lopdfのObjectから数値をf64として取得する。
pub fn operand_to_f64(obj: &lopdf::Object) -> crate::error::Result<f64> {
    match obj {
        lopdf::Object::Integer(i) => Ok(*i as f64),
        lopdf::Object::Real(r) => Ok(*r as f64),
        _ => Err(crate::error::RegionError::content_stream(format!(
            "expected numeric operand, got {:?}",
            obj
        ))),
    }
}

/// 先頭からちょうど `count` 個の数値オペランドを取り出す。
fn numeric_operands(operands: &[lopdf::Object], count: usize) -> crate::error::Result<Vec<f64>> {
    if operands.len() != count {
        return Err(crate::error::RegionError::content_stream(format!(
            "expected {count} operands, got {}",
            operands.len()
        )));
    }
    operands.iter().map(operand_to_f64).collect()
}
