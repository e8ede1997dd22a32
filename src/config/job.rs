use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JobFile {
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub input: String,
    pub output: String,
    /// 省略時は全ページ
    #[serde(default, deserialize_with = "deserialize_optional_pages")]
    pub pages: Option<Vec<u32>>,
    pub dpi: Option<u32>,
    pub raster: Option<bool>,
    /// 外部レイアウトモデルの出力JSON（指定時は検出をバイパス）
    pub external_layout: Option<String>,
    pub debug_candidates: Option<bool>,
}

impl Job {
    /// 対象ページ(1-based)を返す。`pages` 省略時は 1..=page_count。
    pub fn resolve_pages(&self, page_count: u32) -> crate::error::Result<Vec<u32>> {
        match &self.pages {
            None => Ok((1..=page_count).collect()),
            Some(pages) => {
                for &page in pages {
                    crate::error::RegionError::check_page(page, page_count)?;
                }
                Ok(pages.clone())
            }
        }
    }
}

/// ページ範囲文字列をパースしてページ番号のベクタに変換する。
///
/// 形式:
/// - 単一ページ: `"5"`
/// - 範囲: `"5-10"` (5, 6, 7, 8, 9, 10)
/// - 混合（カンマ区切り）: `"1, 3, 5-10, 15"`
///
/// 結果はソート済み・重複なし。
pub fn parse_page_range(s: &str) -> crate::error::Result<Vec<u32>> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(crate::error::RegionError::config(
            "Page range cannot be empty",
        ));
    }

    let mut pages = Vec::new();

    for part in trimmed.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((start_str, end_str)) = part.split_once('-') {
            let start = parse_page_number(start_str)?;
            let end = parse_page_number(end_str)?;

            if start > end {
                return Err(crate::error::RegionError::config(format!(
                    "Invalid page range: start ({start}) > end ({end})"
                )));
            }

            pages.extend(start..=end);
        } else {
            pages.push(parse_page_number(part)?);
        }
    }

    if pages.is_empty() {
        return Err(crate::error::RegionError::config(
            "Page range resolved to empty set",
        ));
    }

    pages.sort_unstable();
    pages.dedup();
    Ok(pages)
}

fn parse_page_number(s: &str) -> crate::error::Result<u32> {
    s.trim()
        .parse()
        .map_err(|_| crate::error::RegionError::config(format!("Invalid page number: '{s}'")))
}

/// serdeのdeserialize_withで使用するページ範囲デシリアライザ
fn deserialize_optional_pages<'de, D>(deserializer: D) -> Result<Option<Vec<u32>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<serde_yml::Value>::deserialize(deserializer)?;
    match raw {
        None | Some(serde_yml::Value::Null) => Ok(None),
        Some(serde_yml::Value::String(s)) => parse_page_range(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(serde_yml::Value::Number(n)) => {
            let page = n
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| serde::de::Error::custom(format!("Invalid page number: {n}")))?;
            parse_page_range(&page.to_string())
                .map(Some)
                .map_err(serde::de::Error::custom)
        }
        Some(other) => Err(serde::de::Error::custom(format!(
            "pages must be a string like \"1, 3-5\", got {other:?}"
        ))),
    }
}
