// Phase 7: ページ番号をキーとするメモリ内の検出結果キャッシュ

use std::collections::HashMap;

use crate::detect::geometry::Region;

#[derive(Debug, Clone)]
struct CachedPage {
    fingerprint: String,
    regions: Vec<Region>,
}

/// セッション中の検出結果キャッシュ。
///
/// ページごとに1件だけ保持し、再検出は前の結果を上書きする。
/// 取得時にページ状態の指紋（キャッシュキー）が一致しなければミスとする。
#[derive(Debug, Clone, Default)]
pub struct PageResultCache {
    entries: HashMap<u32, CachedPage>,
}

impl PageResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, page_number: u32, fingerprint: &str) -> Option<&[Region]> {
        self.entries
            .get(&page_number)
            .filter(|entry| entry.fingerprint == fingerprint)
            .map(|entry| entry.regions.as_slice())
    }

    pub fn insert(&mut self, page_number: u32, fingerprint: String, regions: Vec<Region>) {
        self.entries.insert(
            page_number,
            CachedPage {
                fingerprint,
                regions,
            },
        );
    }

    pub fn invalidate(&mut self, page_number: u32) {
        self.entries.remove(&page_number);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
