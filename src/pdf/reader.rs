use std::collections::HashMap;
use std::path::Path;

use lopdf::Document;

use super::content_stream::{Matrix, XObjectKind, operand_to_f64};
use crate::detect::geometry::PageGeometry;

pub struct PdfReader {
    doc: Document,
}

impl PdfReader {
    /// PDFファイルを開いてPdfReaderを作成する。
    pub fn open(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let doc = Document::load(path)?;
        Ok(Self { doc })
    }

    /// メモリ上のPDFからPdfReaderを作成する。
    pub fn from_bytes(bytes: &[u8]) -> crate::error::Result<Self> {
        let doc = Document::load_mem(bytes)?;
        Ok(Self { doc })
    }

    /// ページ数を返す。
    pub fn page_count(&self) -> u32 {
        self.doc.get_pages().len() as u32
    }

    /// ページ辞書から継承可能な属性を探す（Parent をたどる）。
    fn inherited_attribute(
        &self,
        dict: &lopdf::Dictionary,
        key: &[u8],
    ) -> crate::error::Result<Option<lopdf::Object>> {
        if let Ok(obj) = dict.get(key) {
            return Ok(Some(obj.clone()));
        }
        if let Ok(lopdf::Object::Reference(parent_id)) = dict.get(b"Parent") {
            let parent_dict = self.doc.get_dictionary(*parent_id)?;
            return self.inherited_attribute(parent_dict, key);
        }
        Ok(None)
    }

    /// [x0 y0 x1 y1] 形式の矩形を正規化して返す。
    fn read_box(&self, obj: &lopdf::Object, name: &str) -> crate::error::Result<[f64; 4]> {
        let obj = match obj {
            lopdf::Object::Reference(id) => self.doc.get_object(*id)?,
            other => other,
        };
        let arr = obj.as_array()?;
        if arr.len() < 4 {
            return Err(crate::error::RegionError::pdf_read(format!("Invalid {name}")));
        }
        let x0 = operand_to_f64(&arr[0])?;
        let y0 = operand_to_f64(&arr[1])?;
        let x1 = operand_to_f64(&arr[2])?;
        let y1 = operand_to_f64(&arr[3])?;
        Ok([x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)])
    }

    /// 指定ページ(1-indexed)の可視領域ジオメトリを返す。
    ///
    /// CropBox（無ければMediaBox）の大きさをページ寸法とし、その左下隅を
    /// コンテンツ座標からのクロップオフセットとする。
    pub fn page_geometry(
        &self,
        page_num: u32,
        render_scale: f64,
    ) -> crate::error::Result<PageGeometry> {
        let page_id = self.get_page_id(page_num)?;
        let page_dict = self.doc.get_dictionary(page_id)?;

        let media_box = self
            .inherited_attribute(page_dict, b"MediaBox")?
            .ok_or_else(|| crate::error::RegionError::pdf_read("MediaBox not found"))?;
        let media = self.read_box(&media_box, "MediaBox")?;
        let visible = match self.inherited_attribute(page_dict, b"CropBox")? {
            Some(crop_box) => {
                let crop = self.read_box(&crop_box, "CropBox")?;
                // MediaBox との共通部分が実際に表示される
                [
                    crop[0].max(media[0]),
                    crop[1].max(media[1]),
                    crop[2].min(media[2]),
                    crop[3].min(media[3]),
                ]
            }
            None => media,
        };

        let width = visible[2] - visible[0];
        let height = visible[3] - visible[1];
        if width <= 0.0 || height <= 0.0 {
            return Err(crate::error::RegionError::pdf_read(
                "Invalid page box: non-positive page dimensions",
            ));
        }

        // 一般的なPDFの上限 (14,400 pt ≈ 200 in)
        const PDF_MAX_DIMENSION_PT: f64 = 14_400.0;
        if width > PDF_MAX_DIMENSION_PT || height > PDF_MAX_DIMENSION_PT {
            return Err(crate::error::RegionError::pdf_read(
                "Invalid page box: page dimensions exceed PDF limits",
            ));
        }

        let mut geometry = PageGeometry::new(width, height, render_scale);
        geometry.crop_offset_x = visible[0];
        geometry.crop_offset_y = visible[1];
        Ok(geometry)
    }

    /// 指定ページ(1-indexed)のコンテンツストリームをバイト列として返す。
    /// 複数のContentストリームがある場合は結合して返す。
    pub fn page_content_stream(&self, page_num: u32) -> crate::error::Result<Vec<u8>> {
        let page_id = self.get_page_id(page_num)?;
        Ok(self.doc.get_page_content(page_id)?)
    }

    /// 指定ページ(1-indexed)のXObjectリソースを名前→種別で返す。
    ///
    /// Image と Form のみを対象とし、それ以外（PSなど）は含めない。
    pub fn page_xobjects(
        &self,
        page_num: u32,
    ) -> crate::error::Result<HashMap<String, XObjectKind>> {
        let page_id = self.get_page_id(page_num)?;
        let (resource_dict, resource_ids) = self.doc.get_page_resources(page_id)?;

        let mut kinds = HashMap::new();

        // ページ辞書に直接埋め込まれたResources
        if let Some(dict) = resource_dict {
            self.for_each_xobject(dict, |name, kind| {
                kinds.insert(name, kind);
            })?;
        }

        // 参照されているResources（親ページツリーから継承されたものも含む）
        for res_id in resource_ids {
            let dict = self.doc.get_dictionary(res_id)?;
            self.for_each_xobject(dict, |name, kind| {
                kinds.entry(name).or_insert(kind);
            })?;
        }

        Ok(kinds)
    }

    /// リソース辞書のXObjectエントリを列挙し、種別ごとにコールバックを呼ぶ。
    fn for_each_xobject<F>(&self, dict: &lopdf::Dictionary, mut f: F) -> crate::error::Result<()>
    where
        F: FnMut(String, XObjectKind),
    {
        let xobject_entry = match dict.get(b"XObject") {
            Ok(entry) => entry,
            Err(_) => return Ok(()), // XObjectエントリがない場合は何もしない
        };

        let xobject_dict = match xobject_entry {
            lopdf::Object::Dictionary(d) => d,
            lopdf::Object::Reference(id) => {
                self.doc.get_object(*id).and_then(lopdf::Object::as_dict)?
            }
            _ => return Ok(()),
        };

        for (name_bytes, value) in xobject_dict.iter() {
            let stream = match value {
                lopdf::Object::Reference(id) => match self
                    .doc
                    .get_object(*id)
                    .and_then(lopdf::Object::as_stream)
                {
                    Ok(s) => s,
                    Err(_) => continue,
                },
                lopdf::Object::Stream(s) => s,
                _ => continue,
            };

            let Ok(subtype) = stream.dict.get(b"Subtype").and_then(lopdf::Object::as_name) else {
                continue;
            };
            let kind = match subtype {
                b"Image" => XObjectKind::Image,
                b"Form" => self.form_kind(&stream.dict)?,
                _ => continue,
            };
            f(String::from_utf8_lossy(name_bytes).into_owned(), kind);
        }

        Ok(())
    }

    /// Form XObject の /BBox と /Matrix（省略時は単位行列）。
    fn form_kind(&self, dict: &lopdf::Dictionary) -> crate::error::Result<XObjectKind> {
        let bbox = match dict.get(b"BBox") {
            Ok(obj) => self.read_box(obj, "BBox")?,
            Err(_) => [0.0, 0.0, 1.0, 1.0],
        };
        let matrix = match dict.get(b"Matrix").and_then(lopdf::Object::as_array) {
            Ok(arr) if arr.len() == 6 => {
                let v = arr
                    .iter()
                    .map(operand_to_f64)
                    .collect::<crate::error::Result<Vec<f64>>>()?;
                Matrix::new(v[0], v[1], v[2], v[3], v[4], v[5])
            }
            _ => Matrix::identity(),
        };
        Ok(XObjectKind::Form { bbox, matrix })
    }

    /// ページ番号(1-indexed)からObjectIdを取得する。
    fn get_page_id(&self, page_num: u32) -> crate::error::Result<lopdf::ObjectId> {
        let pages = self.doc.get_pages();
        pages
            .get(&page_num)
            .copied()
            .ok_or(crate::error::RegionError::PageOutOfRange {
                page: page_num,
                page_count: pages.len() as u32,
            })
    }
}
