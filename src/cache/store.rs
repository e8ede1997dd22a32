// Phase 7: ファイルシステムキャッシュ: hash → 検出済み領域
//
// Stores and retrieves a page's regions on disk, keyed by SHA-256 hash.
// Entries: regions.json, metadata.json

use std::fs;
use std::path::{Path, PathBuf};

use crate::detect::geometry::Region;
use crate::error::RegionError;

/// キャッシュエントリの必須ファイル。
const CACHE_FILES: &[&str] = &["regions.json", "metadata.json"];

/// ファイルシステムベースのキャッシュストア。
///
/// `<cache_dir>/<hex_hash>/` 以下に領域一覧を格納する。
pub struct CacheStore {
    cache_dir: PathBuf,
}

/// metadata.json に保存するエントリのメタデータ。
#[derive(serde::Serialize, serde::Deserialize)]
struct CacheMetadata {
    cache_key: String,
    page_number: u32,
    region_count: usize,
}

fn cache_io(e: std::io::Error) -> RegionError {
    RegionError::cache(e.to_string())
}

/// キャッシュキーが有効な SHA-256 hex 文字列であることを検証する。
///
/// 有効なキーは正確に64文字の小文字16進数([0-9a-f])である必要がある。
/// パストラバーサルや不正なディレクトリアクセスを防止する。
fn validate_cache_key(key: &str) -> crate::error::Result<()> {
    if key.len() == 64 && key.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        Ok(())
    } else {
        Err(RegionError::InvalidCacheKey(key.to_string()))
    }
}

impl CacheStore {
    /// 指定されたディレクトリをキャッシュルートとして新しい CacheStore を作成する。
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
        }
    }

    /// キャッシュキーからディレクトリパスを計算する。
    fn key_dir(&self, key: &str) -> crate::error::Result<PathBuf> {
        validate_cache_key(key)?;
        Ok(self.cache_dir.join(key))
    }

    /// ページの領域一覧をキャッシュに保存する。
    ///
    /// キャッシュディレクトリが存在しない場合は自動的に作成する。
    /// 書き込みはアトミック: 一時ディレクトリにファイルを書き込み、
    /// 最後にrenameで最終パスに移動する。
    pub fn store(
        &self,
        key: &str,
        page_number: u32,
        regions: &[Region],
    ) -> crate::error::Result<()> {
        let dir = self.key_dir(key)?;
        let tmp_dir = dir.with_extension("tmp");

        if tmp_dir.exists() {
            let _ = fs::remove_dir_all(&tmp_dir);
        }
        fs::create_dir_all(&tmp_dir).map_err(cache_io)?;

        let regions_json = serde_json::to_string(regions)?;
        fs::write(tmp_dir.join("regions.json"), regions_json.as_bytes()).map_err(cache_io)?;

        let metadata = CacheMetadata {
            cache_key: key.to_string(),
            page_number,
            region_count: regions.len(),
        };
        let metadata_json = serde_json::to_string(&metadata)?;
        fs::write(tmp_dir.join("metadata.json"), metadata_json.as_bytes()).map_err(cache_io)?;

        if dir.exists() {
            let _ = fs::remove_dir_all(&dir);
        }

        fs::rename(&tmp_dir, &dir).map_err(cache_io)?;

        Ok(())
    }

    /// キャッシュから領域一覧を取得する。キャッシュミスの場合は None を返す。
    pub fn retrieve(&self, key: &str) -> crate::error::Result<Option<Vec<Region>>> {
        let dir = self.key_dir(key)?;
        if !dir.exists() {
            return Ok(None);
        }

        let metadata_str = fs::read_to_string(dir.join("metadata.json")).map_err(cache_io)?;
        let metadata: CacheMetadata = serde_json::from_str(&metadata_str)?;

        if metadata.cache_key != key {
            return Err(RegionError::cache(format!(
                "cache key mismatch: expected '{}', found '{}'",
                key, metadata.cache_key
            )));
        }

        let regions_str = fs::read_to_string(dir.join("regions.json")).map_err(cache_io)?;
        let regions: Vec<Region> = serde_json::from_str(&regions_str)?;
        if regions.len() != metadata.region_count {
            return Err(RegionError::cache(format!(
                "cache entry '{}' is truncated: expected {} regions, found {}",
                key,
                metadata.region_count,
                regions.len()
            )));
        }
        Ok(Some(regions))
    }

    /// キャッシュキーが存在するか確認する。
    pub fn contains(&self, key: &str) -> bool {
        match self.key_dir(key) {
            Ok(dir) => CACHE_FILES.iter().all(|f| dir.join(f).exists()),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_cache_key_rejects_uppercase_hex() {
        let uppercase_key = "a".repeat(58) + "ABCDEF";
        assert_eq!(uppercase_key.len(), 64);
        assert!(validate_cache_key(&uppercase_key).is_err());
    }

    #[test]
    fn test_validate_cache_key_accepts_lowercase_hex() {
        let lowercase_key = "a".repeat(64);
        assert!(validate_cache_key(&lowercase_key).is_ok());
    }

    #[test]
    fn test_validate_cache_key_rejects_wrong_length() {
        let short_key = "a".repeat(63);
        assert!(validate_cache_key(&short_key).is_err());
    }
}
