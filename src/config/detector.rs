// 検出ステージごとの閾値。長さはすべてページピクセル単位。

use serde::{Deserialize, Serialize};

/// 検出パイプライン全体の閾値設定。
///
/// YAMLでは一部のキーだけを上書きでき、残りは既定値になる。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub vector: VectorConfig,
    pub image: ImagePaintConfig,
    pub raster: RasterConfig,
    pub merge: MergeConfig,
    pub caption: CaptionConfig,
    pub fallback: FallbackConfig,
    pub dedup: DedupConfig,
    /// 最終領域がページ外にはみ出してよい量（画像パディングの上限と同じ）
    pub bounds_tolerance: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            vector: VectorConfig::default(),
            image: ImagePaintConfig::default(),
            raster: RasterConfig::default(),
            merge: MergeConfig::default(),
            caption: CaptionConfig::default(),
            fallback: FallbackConfig::default(),
            dedup: DedupConfig::default(),
            bounds_tolerance: 15.0,
        }
    }
}

/// ベクターパス矩形の却下条件。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub min_side: f64,
    pub max_aspect: f64,
    /// fill時に許容するテキスト被覆率
    pub fill_text_cover_max: f64,
    /// stroke時に許容するテキスト被覆率
    pub stroke_text_cover_max: f64,
    pub duplicate_iou: f64,
    /// 軸平行判定の許容誤差（コンテンツ単位）
    pub axis_epsilon: f64,
    /// 白塗り矩形をページ背景とみなす面積比
    pub background_page_ratio: f64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        VectorConfig {
            min_side: 30.0,
            max_aspect: 20.0,
            fill_text_cover_max: 0.35,
            stroke_text_cover_max: 0.25,
            duplicate_iou: 0.7,
            axis_epsilon: 1e-3,
            background_page_ratio: 0.5,
        }
    }
}

/// 画像描画命令由来の候補の却下条件。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagePaintConfig {
    pub min_side: f64,
    /// ページ外にこれ以上はみ出したら退化した変換とみなす
    pub outside_margin: f64,
    pub max_padding: f64,
    pub padding_ratio: f64,
}

impl Default for ImagePaintConfig {
    fn default() -> Self {
        ImagePaintConfig {
            min_side: 15.0,
            outside_margin: 100.0,
            max_padding: 15.0,
            padding_ratio: 0.08,
        }
    }
}

/// インクマスク（ラスタ）経路のパラメータ。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterConfig {
    /// テキスト矩形を消去するときの膨張量（CSSピクセル）
    pub text_padding: f64,
    /// 消去矩形の縁のぼかし幅（バッファピクセル）
    pub feather: f64,
    pub threshold_min: u8,
    pub threshold_max: u8,
    pub downsample: u32,
    /// バッファピクセルでの最小成分サイズ
    pub min_component_px: u32,
    /// CSSピクセルでの最小成分サイズ
    pub min_size_css: f64,
    pub max_aspect: f64,
}

impl Default for RasterConfig {
    fn default() -> Self {
        RasterConfig {
            text_padding: 3.0,
            feather: 1.0,
            threshold_min: 16,
            threshold_max: 220,
            downsample: 2,
            min_component_px: 8,
            min_size_css: 12.0,
            max_aspect: 12.0,
        }
    }
}

/// 候補の結合・段組判定のパラメータ。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub iou_threshold: f64,
    /// 隣接とみなす隙間: min(near_gap_max, near_gap_ratio × 小さい方の寸法)
    pub near_gap_ratio: f64,
    pub near_gap_max: f64,
    /// 直交方向の重なり比（小さい方の寸法に対する比）
    pub orthogonal_overlap: f64,
    pub max_passes: usize,
    pub layout_min_runs: usize,
    pub layout_min_gap_ratio: f64,
    pub layout_min_side_share: f64,
    pub column_snap_below_ratio: f64,
    pub column_snap_width_ratio: f64,
    pub column_snap_inset: f64,
    /// スナップで左端を動かしてよい最大量（列幅に対する比）
    pub column_snap_max_shift_ratio: f64,
    pub formula_min_symbols: usize,
    pub formula_symbol_ratio: f64,
    /// 領域内のテキストとして数えるランの面積比
    pub formula_run_overlap: f64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        MergeConfig {
            iou_threshold: 0.12,
            near_gap_ratio: 0.5,
            near_gap_max: 28.0,
            orthogonal_overlap: 0.6,
            max_passes: 8,
            layout_min_runs: 20,
            layout_min_gap_ratio: 0.12,
            layout_min_side_share: 0.25,
            column_snap_below_ratio: 0.18,
            column_snap_width_ratio: 1.4,
            column_snap_inset: 6.0,
            column_snap_max_shift_ratio: 0.5,
            formula_min_symbols: 2,
            formula_symbol_ratio: 0.12,
            formula_run_overlap: 0.5,
        }
    }
}

/// キャプション・ラベル・見出しの処理パラメータ。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    /// テキストランを同じ行とみなすy差
    pub line_tolerance: f64,
    /// 行内でランの間に空白を補う隙間（ランの高さに対する比）
    pub word_gap_ratio: f64,
    /// 領域下端からキャプションを探す距離（ページ高さ比）
    pub search_below_ratio: f64,
    pub caption_margin: f64,
    pub prose_margin: f64,
    pub prose_min_chars: usize,
    pub prose_min_words: usize,
    pub label_max_chars: usize,
    pub label_max_words: usize,
    /// ラベルの単語として数える最大文字数
    pub label_max_word_chars: usize,
    /// ラベルとみなすために必要な、英字を含む短い単語の割合
    pub label_min_word_share: f64,
    pub label_min_overlap: f64,
    pub label_member_slack: f64,
    /// 見出しとみなす行の上端は領域上端からこの距離以内（それより下は図内ラベル）
    pub header_straddle: f64,
    pub header_max_words: usize,
    pub header_max_trim_ratio: f64,
    pub header_max_trim: f64,
    pub header_min_letters: usize,
    /// 領域の上に "Table N" 見出しを探す距離
    pub table_heading_gap: f64,
    pub min_height: f64,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        CaptionConfig {
            line_tolerance: 8.0,
            word_gap_ratio: 0.25,
            search_below_ratio: 0.25,
            caption_margin: 6.0,
            prose_margin: 8.0,
            prose_min_chars: 35,
            prose_min_words: 5,
            label_max_chars: 40,
            label_max_words: 8,
            label_max_word_chars: 14,
            label_min_word_share: 0.7,
            label_min_overlap: 0.3,
            label_member_slack: 6.0,
            header_straddle: 2.0,
            header_max_words: 12,
            header_max_trim_ratio: 0.18,
            header_max_trim: 28.0,
            header_min_letters: 3,
            table_heading_gap: 40.0,
            min_height: 12.0,
        }
    }
}

/// キャプション起点のフォールバック候補のパラメータ。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub enabled: bool,
    pub bands: usize,
    pub search_up_ratio: f64,
    pub sparse_band_ratio: f64,
    pub dense_band_ratio: f64,
    pub default_height_ratio: f64,
    pub min_default_height: f64,
    pub max_height_ratio: f64,
    pub min_height: f64,
    pub min_width: f64,
    pub margin: f64,
    pub max_text_cover: f64,
    pub max_rows: usize,
    pub row_tolerance: f64,
    /// 帯の被覆率を数えるときのランの最小高さ
    pub min_run_height: f64,
    /// 候補下端とキャプション上端の間隔
    pub caption_gap: f64,
    /// 候補上端を疎な帯の上端から下げる量
    pub top_inset: f64,
    /// 候補下端を疎な帯の下端から上げる量
    pub bottom_inset: f64,
    /// 高さの上限をキャプション幅に対する比でも抑える
    pub height_per_caption_width: f64,
    /// 横幅が決まらないときにキャプションの左右へ足す余白: min(pad_max, pad_ratio × 幅)
    pub caption_pad_ratio: f64,
    pub caption_pad_max: f64,
    /// 横幅を決める行は疎な帯の上端からこの距離以降に始まるもの
    pub extent_row_inset: f64,
    /// 横幅を決める行を探す最小の縦範囲
    pub extent_min_span: f64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        FallbackConfig {
            enabled: true,
            bands: 32,
            search_up_ratio: 0.45,
            sparse_band_ratio: 0.18,
            dense_band_ratio: 0.35,
            default_height_ratio: 0.28,
            min_default_height: 120.0,
            max_height_ratio: 0.55,
            min_height: 60.0,
            min_width: 60.0,
            margin: 20.0,
            max_text_cover: 0.35,
            max_rows: 12,
            row_tolerance: 14.0,
            min_run_height: 10.0,
            caption_gap: 8.0,
            top_inset: 5.0,
            bottom_inset: 3.0,
            height_per_caption_width: 0.9,
            caption_pad_ratio: 0.15,
            caption_pad_max: 40.0,
            extent_row_inset: 4.0,
            extent_min_span: 20.0,
        }
    }
}

/// 最終的な重複解消の閾値。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub iou_threshold: f64,
    pub containment_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        DedupConfig {
            iou_threshold: 0.5,
            containment_threshold: 0.7,
        }
    }
}
