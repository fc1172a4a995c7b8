//! 不经渲染的结构化查询：区域实体统计、实体提取与图层概览。

use std::borrow::Borrow;
use std::collections::{BTreeMap, HashSet};

use cadview_core::document::Entity;
use cadview_core::geometry::{BoundingBox, Point2};
use serde::Serialize;

use crate::resolver::{bbox_of, resolve_text};
use crate::spatial::{LayerFilter, Region, intersects};

#[inline]
fn xy(point: Point2) -> [f64; 2] {
    [point.x(), point.y()]
}

/// 区域内的文字条目。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextItem {
    pub text: String,
    pub position: [f64; 2],
    pub height: Option<f64>,
    pub layer: String,
}

/// 与区域相交的实体统计。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegionContents {
    pub total_count: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_layer: BTreeMap<String, usize>,
    /// 最多 `max_texts` 条。
    pub texts: Vec<TextItem>,
    /// 区域内全部文字的数量，不受截断影响。
    pub text_count: usize,
}

/// 统计与区域相交的实体（应传入已展开块参照的实体流）。
pub fn inspect_region<I>(entities: I, region: &BoundingBox, max_texts: usize) -> RegionContents
where
    I: IntoIterator,
    I::Item: Borrow<Entity>,
{
    let mut contents = RegionContents::default();
    for item in entities {
        let entity = item.borrow();
        if !intersects(bbox_of(entity).as_ref(), region) {
            continue;
        }
        contents.total_count += 1;
        *contents
            .by_type
            .entry(entity.dxf_type().to_string())
            .or_default() += 1;
        *contents
            .by_layer
            .entry(entity.layer_name().to_string())
            .or_default() += 1;

        if let Some(text) = resolve_text(entity) {
            contents.text_count += 1;
            if contents.texts.len() < max_texts {
                contents.texts.push(TextItem {
                    text: text.content,
                    position: xy(text.insert),
                    height: text.raw_height,
                    layer: entity.layer_name().to_string(),
                });
            }
        }
    }
    contents
}

/// 实体提取条件。类型名不区分大小写，图层名区分大小写。
#[derive(Debug, Clone, Default)]
pub struct EntityQuery {
    types: Option<HashSet<String>>,
    layers: LayerFilter,
    region: Option<Region>,
}

impl EntityQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let types: HashSet<String> = types
            .into_iter()
            .map(|name| name.as_ref().to_ascii_uppercase())
            .collect();
        self.types = (!types.is_empty()).then_some(types);
        self
    }

    pub fn with_layers(mut self, layers: LayerFilter) -> Self {
        self.layers = layers;
        self
    }

    /// 只保留与区域相交的实体。区域在提取前由调用方校验。
    pub fn within(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    #[inline]
    pub fn region(&self) -> Option<&Region> {
        self.region.as_ref()
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        if let Some(types) = &self.types {
            if !types.contains(&entity.dxf_type().to_ascii_uppercase()) {
                return false;
            }
        }
        if !self.layers.accepts(entity.layer_name()) {
            return false;
        }
        match &self.region {
            Some(region) => intersects(bbox_of(entity).as_ref(), &region.to_bounds()),
            None => true,
        }
    }
}

/// 按实体类型附带的几何信息。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntityDetail {
    Line {
        start: [f64; 2],
        end: [f64; 2],
    },
    Circle {
        center: [f64; 2],
        radius: f64,
    },
    Text {
        text: String,
        position: [f64; 2],
        height: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRecord {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub layer: String,
    pub color: Option<i16>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub detail: Option<EntityDetail>,
}

impl EntityRecord {
    pub fn from_entity(entity: &Entity) -> Self {
        let detail = match entity {
            Entity::Line(line) => Some(EntityDetail::Line {
                start: xy(line.start),
                end: xy(line.end),
            }),
            Entity::Circle(circle) => Some(EntityDetail::Circle {
                center: xy(circle.center),
                radius: circle.radius,
            }),
            Entity::Text(_) | Entity::MText(_) => {
                resolve_text(entity).map(|text| EntityDetail::Text {
                    text: text.content,
                    position: xy(text.insert),
                    height: text.raw_height,
                })
            }
            _ => None,
        };
        Self {
            entity_type: entity.dxf_type().to_string(),
            layer: entity.layer_name().to_string(),
            color: entity.color(),
            detail,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractionResult {
    /// 前 `limit` 条记录。
    pub entities: Vec<EntityRecord>,
    pub total_count: usize,
    pub entity_count: BTreeMap<String, usize>,
}

/// 按条件提取实体记录，计数覆盖全部匹配实体。
pub fn extract_entities<I>(entities: I, query: &EntityQuery, limit: usize) -> ExtractionResult
where
    I: IntoIterator,
    I::Item: Borrow<Entity>,
{
    let mut result = ExtractionResult::default();
    for item in entities {
        let entity = item.borrow();
        if !query.matches(entity) {
            continue;
        }
        result.total_count += 1;
        *result
            .entity_count
            .entry(entity.dxf_type().to_string())
            .or_default() += 1;
        if result.entities.len() < limit {
            result.entities.push(EntityRecord::from_entity(entity));
        }
    }
    result
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LayerStats {
    pub entity_count: usize,
    pub entity_types: BTreeMap<String, usize>,
}

/// 按图层统计实体数量与类型分布（不展开块参照）。
pub fn summarize_layers<'a, I>(entities: I) -> BTreeMap<String, LayerStats>
where
    I: IntoIterator<Item = &'a Entity>,
{
    let mut layers: BTreeMap<String, LayerStats> = BTreeMap::new();
    for entity in entities {
        let stats = layers.entry(entity.layer_name().to_string()).or_default();
        stats.entity_count += 1;
        *stats
            .entity_types
            .entry(entity.dxf_type().to_string())
            .or_default() += 1;
    }
    layers
}
