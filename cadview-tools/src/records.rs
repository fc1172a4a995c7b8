//! 工具输出的 JSON 记录。

use std::collections::BTreeMap;
use std::path::PathBuf;

use cadview_core::geometry::BoundingBox;
use cadview_engine::bounds::DrawingExtent;
use cadview_engine::inspect::{LayerStats, RegionContents, TextItem};
use cadview_engine::spatial::Region;
use serde::Serialize;

use crate::errors::ToolError;

/// 1000 个图纸单位为 1 米。
pub const UNITS_PER_METER: f64 = 1000.0;

/// 按小数位四舍五入。
pub fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

/// 统一的工具回复：成功时展开记录字段，失败时只带错误信息。
#[derive(Debug, Serialize)]
pub struct ToolReply<T> {
    pub success: bool,
    #[serde(flatten)]
    pub body: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ToolReply<T> {
    pub fn from_result(result: Result<T, ToolError>) -> Self {
        match result {
            Ok(body) => Self {
                success: true,
                body: Some(body),
                error: None,
            },
            Err(err) => Self {
                success: false,
                body: None,
                error: Some(err.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundsSummary {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub width: f64,
    pub height: f64,
    pub width_m: f64,
    pub height_m: f64,
}

impl BoundsSummary {
    pub fn from_bounds(bounds: &BoundingBox) -> Self {
        Self {
            min_x: round_to(bounds.min_x(), 2),
            max_x: round_to(bounds.max_x(), 2),
            min_y: round_to(bounds.min_y(), 2),
            max_y: round_to(bounds.max_y(), 2),
            width: round_to(bounds.width(), 2),
            height: round_to(bounds.height(), 2),
            width_m: round_to(bounds.width() / UNITS_PER_METER, 2),
            height_m: round_to(bounds.height() / UNITS_PER_METER, 2),
        }
    }

    /// 取整后的范围作为渲染区域。
    pub fn region(&self) -> Region {
        Region::new(self.min_x, self.min_y, self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundsRecord {
    pub bounds: BoundsSummary,
    pub raw_entity_count: usize,
    pub used_entity_count: usize,
}

impl From<&DrawingExtent> for BoundsRecord {
    fn from(extent: &DrawingExtent) -> Self {
        Self {
            bounds: BoundsSummary::from_bounds(&extent.bounds),
            raw_entity_count: extent.raw_entity_count,
            used_entity_count: extent.used_entity_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderRecord {
    pub image_path: PathBuf,
    pub actual_bbox: Region,
    /// 每个图纸单位对应的像素数，保留 6 位小数。
    pub scale: f64,
    pub output_size: [u32; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionInfo {
    pub bbox: Region,
    pub area_m2: f64,
    pub scale: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySummary {
    pub total_count: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_layer: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyContent {
    pub texts: Vec<TextItem>,
    pub text_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectRecord {
    pub image_path: PathBuf,
    pub image_base64: Option<String>,
    pub region_info: RegionInfo,
    pub entity_summary: EntitySummary,
    pub key_content: KeyContent,
}

impl InspectRecord {
    pub fn new(render: RenderRecord, contents: RegionContents, image_base64: Option<String>) -> Self {
        let region = render.actual_bbox;
        Self {
            image_path: render.image_path,
            image_base64,
            region_info: RegionInfo {
                bbox: region,
                area_m2: round_to(region.area_m2(), 2),
                scale: render.scale,
            },
            entity_summary: EntitySummary {
                total_count: contents.total_count,
                by_type: contents.by_type,
                by_layer: contents.by_layer,
            },
            key_content: KeyContent {
                texts: contents.texts,
                text_count: contents.text_count,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileMetadata {
    pub dxf_version: Option<String>,
    pub file_size: u64,
    pub units: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundsQuality {
    pub raw_entity_count: usize,
    pub used_entity_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataRecord {
    pub filename: String,
    pub file_path: PathBuf,
    pub metadata: FileMetadata,
    /// 无可渲染实体时为 `null`。
    pub bounds: Option<BoundsSummary>,
    pub layers: BTreeMap<String, LayerStats>,
    pub entity_count: usize,
    pub layer_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds_source: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds_quality: Option<BoundsQuality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rounding_keeps_requested_digits() {
        assert_eq!(round_to(1234.5678, 2), 1234.57);
        assert_eq!(round_to(0.1234567, 6), 0.123457);
        assert_eq!(round_to(-2.345, 1), -2.3);
    }

    #[test]
    fn bounds_summary_reports_meters() {
        let summary = BoundsSummary::from_bounds(&BoundingBox::new(0.0, 0.0, 12340.0, 6789.0));
        assert_eq!(summary.width, 12340.0);
        assert_eq!(summary.width_m, 12.34);
        assert_eq!(summary.height_m, 6.79);
    }

    #[test]
    fn failed_reply_carries_only_the_error() {
        let reply: ToolReply<BoundsRecord> = ToolReply::from_result(Err(ToolError::Engine(
            cadview_engine::EngineError::NoRenderableEntities,
        )));
        let value = serde_json::to_value(&reply).expect("序列化失败");
        assert_eq!(
            value,
            json!({"success": false, "error": "drawing has no renderable entities"})
        );
    }

    #[test]
    fn successful_reply_flattens_the_record() {
        let record = BoundsRecord {
            bounds: BoundsSummary::from_bounds(&BoundingBox::new(0.0, 0.0, 10.0, 20.0)),
            raw_entity_count: 3,
            used_entity_count: 3,
        };
        let value = serde_json::to_value(ToolReply::from_result(Ok(record))).expect("序列化失败");
        assert_eq!(value["success"], json!(true));
        assert_eq!(value["bounds"]["max_y"], json!(20.0));
        assert_eq!(value["raw_entity_count"], json!(3));
        assert!(value.get("error").is_none());
    }
}
