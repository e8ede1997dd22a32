// Phase 9: JSON書き出しと外部レイアウトの取り込み

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::detect::dedup::renumber;
use crate::detect::geometry::{PageGeometry, Rect, RectCandidate, Region, RegionType};

/// 書き出し用の領域レコード。座標は小数2桁に丸める。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub region_type: RegionType,
    pub position: Rect,
    pub label: String,
}

impl From<&Region> for RegionRecord {
    fn from(region: &Region) -> Self {
        Self {
            id: region.id.clone(),
            region_type: region.region_type,
            position: round_rect(&region.position),
            label: region.label.clone(),
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round_rect(rect: &Rect) -> Rect {
    Rect::new(
        round2(rect.x),
        round2(rect.y),
        round2(rect.width),
        round2(rect.height),
    )
}

/// ページ番号 → レコード配列 のJSON文字列を作る。
///
/// 整数キーは文字列として書き出されるが、順序はページ番号順のまま。
pub fn regions_to_json(pages: &BTreeMap<u32, Vec<Region>>) -> crate::error::Result<String> {
    let records: BTreeMap<u32, Vec<RegionRecord>> = pages
        .iter()
        .map(|(page, regions)| (*page, regions.iter().map(RegionRecord::from).collect()))
        .collect();
    Ok(serde_json::to_string_pretty(&records)?)
}

pub fn write_regions_json(
    path: &Path,
    pages: &BTreeMap<u32, Vec<Region>>,
) -> crate::error::Result<()> {
    let json = regions_to_json(pages)?;
    fs::write(path, json)?;
    debug!(path = %path.display(), pages = pages.len(), "wrote region export");
    Ok(())
}

/// 結合前の候補をページごとに書き出す（調整用）。
pub fn write_candidates_json(
    path: &Path,
    pages: &BTreeMap<u32, Vec<RectCandidate>>,
) -> crate::error::Result<()> {
    fs::write(path, serde_json::to_string_pretty(pages)?)?;
    Ok(())
}

/// 外部レイアウトモデルが出力する1ブロック。
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExternalBlock {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub block_type: String,
    /// [x1, y1, x2, y2]（モデル側の座標、左上原点）
    pub bbox: [f64; 4],
    #[serde(default)]
    pub score: Option<f64>,
}

/// ページ番号 → ブロック一覧。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExternalLayout {
    pub blocks_by_page: HashMap<u32, Vec<ExternalBlock>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExternalLayoutFile {
    Wrapped {
        #[serde(rename = "blocksByPage")]
        blocks_by_page: HashMap<String, Vec<ExternalBlock>>,
    },
    Bare(HashMap<String, Vec<ExternalBlock>>),
}

impl ExternalLayout {
    /// `{"blocksByPage": {...}}` または ページ番号をキーとする素のオブジェクトを読む。
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        let file: ExternalLayoutFile = serde_json::from_str(json).map_err(|e| {
            crate::error::RegionError::export(format!("Failed to parse external layout: {e}"))
        })?;
        let raw = match file {
            ExternalLayoutFile::Wrapped { blocks_by_page } => blocks_by_page,
            ExternalLayoutFile::Bare(map) => map,
        };
        let mut blocks_by_page = HashMap::new();
        for (key, blocks) in raw {
            let page: u32 = key.trim().parse().map_err(|_| {
                crate::error::RegionError::export(format!(
                    "external layout page key must be a number, got '{key}'"
                ))
            })?;
            blocks_by_page.insert(page, blocks);
        }
        Ok(Self { blocks_by_page })
    }

    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn blocks(&self, page_number: u32) -> &[ExternalBlock] {
        self.blocks_by_page
            .get(&page_number)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// 外部座標 → ページピクセル空間への射影パラメータ。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExternalProjection {
    /// 外部座標1単位あたりのコンテンツ単位の逆数（source_dpi / 72）
    pub source_scale: f64,
    /// 一律の較正係数
    pub calibration: f64,
}

impl ExternalProjection {
    pub fn new(source_dpi: f64, calibration: f64) -> Self {
        Self {
            source_scale: source_dpi / 72.0,
            calibration,
        }
    }
}

/// ブロック種別を領域種別に対応付ける。対象外の種別は None。
pub fn external_region_type(block_type: &str) -> Option<RegionType> {
    match block_type.trim().to_ascii_lowercase().as_str() {
        "table" => Some(RegionType::Table),
        "figure" | "image" | "graphic" => Some(RegionType::Image),
        _ => None,
    }
}

/// 外部ブロックをページピクセル空間の領域に射影し、読み順で採番する。
pub fn project_external_blocks(
    blocks: &[ExternalBlock],
    geometry: &PageGeometry,
    projection: &ExternalProjection,
    page_number: u32,
) -> Vec<Region> {
    let factor = geometry.render_scale * projection.calibration / projection.source_scale;
    let mut regions: Vec<Region> = blocks
        .iter()
        .filter_map(|block| {
            let region_type = external_region_type(&block.block_type)?;
            let [x1, y1, x2, y2] = block.bbox;
            let rect = Rect::from_edges(
                geometry.container_offset_x + x1 * factor,
                geometry.container_offset_y + y1 * factor,
                geometry.container_offset_x + x2 * factor,
                geometry.container_offset_y + y2 * factor,
            );
            (rect.width > 0.0 && rect.height > 0.0).then(|| Region {
                id: String::new(),
                region_type,
                position: rect,
                label: String::new(),
                member_candidates: Vec::new(),
            })
        })
        .collect();
    renumber(&mut regions, page_number);
    regions
}
