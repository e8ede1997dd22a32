// Phase 7: SHA-256（コンテンツストリーム + 検出設定）
//
// Computes a cache key from a page's content stream bytes and the settings
// that influence detection. The key is a SHA-256 hash encoded as a lowercase
// hexadecimal string.

use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::detector::DetectorConfig;

/// 検出結果に影響する設定パラメータ。
///
/// キャッシュキー計算時にハッシュに含める設定値のみを保持する。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheSettings {
    pub dpi: u32,
    pub raster: bool,
    pub detector: DetectorConfig,
}

/// 設定を正規化JSON形式に変換する（キーはアルファベット順で固定）。
///
/// `serde_json::Value` のオブジェクトはキー順に並ぶので、構造体のフィールド順に
/// 依存しない。
fn settings_to_canonical_json(settings: &CacheSettings) -> crate::error::Result<String> {
    let value = serde_json::to_value(settings)?;
    Ok(serde_json::to_string(&value)?)
}

/// コンテンツストリームと設定からキャッシュキー（SHA-256ハッシュ）を計算する。
///
/// ハッシュ入力: `pdf_path || page_number || content_stream || settings_canonical_json`
/// PDFパスとページ番号を含めることで、異なるPDF間のキー衝突を防止する。
pub fn compute_cache_key(
    content_stream: &[u8],
    settings: &CacheSettings,
    pdf_path: &Path,
    page_number: u32,
) -> crate::error::Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(pdf_path.as_os_str().as_encoded_bytes());
    hasher.update(page_number.to_le_bytes());
    hasher.update(content_stream);

    let settings_json = settings_to_canonical_json(settings)?;
    hasher.update(settings_json.as_bytes());

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_json_is_sorted_by_key() {
        let settings = CacheSettings {
            dpi: 96,
            raster: true,
            detector: DetectorConfig::default(),
        };

        let json = settings_to_canonical_json(&settings).unwrap();

        assert!(json.starts_with("{\"detector\":{\"bounds_tolerance\":15.0,\"caption\":{"));
        assert!(json.ends_with(",\"dpi\":96,\"raster\":true}"));
    }

    #[test]
    fn test_settings_json_reflects_threshold_change() {
        let mut detector = DetectorConfig::default();
        detector.merge.iou_threshold = 0.3;
        let a = CacheSettings {
            dpi: 96,
            raster: true,
            detector: DetectorConfig::default(),
        };
        let b = CacheSettings {
            dpi: 96,
            raster: true,
            detector,
        };
        assert_ne!(
            settings_to_canonical_json(&a).unwrap(),
            settings_to_canonical_json(&b).unwrap()
        );
    }
}
