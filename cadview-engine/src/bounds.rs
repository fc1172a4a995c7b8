//! 稳健的绘图范围计算：合并实体包围盒，并以 IQR 剔除离群实体。

use std::borrow::Borrow;

use cadview_core::document::Entity;
use cadview_core::geometry::{BoundingBox, Point2};
use serde::Serialize;
use tracing::debug;

use crate::errors::EngineError;
use crate::resolver::bbox_of;
use crate::spatial::LayerFilter;

/// 少于该数量的包围盒不做离群过滤。
pub const OUTLIER_MIN_SAMPLES: usize = 20;
const IQR_FLOOR: f64 = 1.0;
const IQR_MULTIPLIER: f64 = 4.0;
const MIN_KEPT: usize = 10;
const MIN_KEPT_RATIO: f64 = 0.2;

/// 单次请求计算出的绘图范围，不做缓存。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DrawingExtent {
    pub bounds: BoundingBox,
    pub raw_entity_count: usize,
    pub used_entity_count: usize,
}

/// 计算可渲染实体的稳健范围。
///
/// `entities` 应已展开块参照（参见 `Drawing::entities_with_virtual`），
/// 块参照本身与未支持实体会被跳过。
pub fn compute_bounds<I>(entities: I, layers: &LayerFilter) -> Result<DrawingExtent, EngineError>
where
    I: IntoIterator,
    I::Item: Borrow<Entity>,
{
    let boxes = collect_boxes(entities, layers);
    if boxes.is_empty() {
        return Err(EngineError::NoRenderableEntities);
    }
    let filtered = filter_outlier_boxes(&boxes);
    let bounds = merge_boxes(&filtered).ok_or(EngineError::NoRenderableEntities)?;
    debug!(
        raw = boxes.len(),
        used = filtered.len(),
        "计算绘图范围"
    );
    Ok(DrawingExtent {
        bounds,
        raw_entity_count: boxes.len(),
        used_entity_count: filtered.len(),
    })
}

/// 收集可渲染实体的包围盒，无法解析的实体直接跳过。
pub fn collect_boxes<I>(entities: I, layers: &LayerFilter) -> Vec<BoundingBox>
where
    I: IntoIterator,
    I::Item: Borrow<Entity>,
{
    entities
        .into_iter()
        .filter_map(|item| {
            let entity = item.borrow();
            if !entity.kind().is_renderable() || !layers.accepts(entity.layer_name()) {
                return None;
            }
            bbox_of(entity)
        })
        .collect()
}

/// 基于中心点四分位距剔除离群包围盒。
///
/// 保留数量少于 `max(10, 20%)` 时视为过滤失效，返回全部包围盒。
pub fn filter_outlier_boxes(boxes: &[BoundingBox]) -> Vec<BoundingBox> {
    if boxes.len() < OUTLIER_MIN_SAMPLES {
        return boxes.to_vec();
    }

    let centers: Vec<Point2> = boxes.iter().map(BoundingBox::center).collect();
    let (min_x, max_x) = fence(centers.iter().map(|center| center.x()));
    let (min_y, max_y) = fence(centers.iter().map(|center| center.y()));

    let filtered: Vec<BoundingBox> = boxes
        .iter()
        .zip(&centers)
        .filter(|(_, center)| {
            (min_x..=max_x).contains(&center.x()) && (min_y..=max_y).contains(&center.y())
        })
        .map(|(bounds, _)| *bounds)
        .collect();

    let required = MIN_KEPT.max((boxes.len() as f64 * MIN_KEPT_RATIO) as usize);
    if filtered.len() < required {
        debug!(
            kept = filtered.len(),
            required,
            "离群过滤保留过少，改用全部实体"
        );
        return boxes.to_vec();
    }
    filtered
}

fn fence(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let mut sorted: Vec<f64> = values.collect();
    sorted.sort_by(f64::total_cmp);
    let q1 = quantile(&sorted, 0.25);
    let q3 = quantile(&sorted, 0.75);
    let iqr = (q3 - q1).max(IQR_FLOOR);
    (q1 - IQR_MULTIPLIER * iqr, q3 + IQR_MULTIPLIER * iqr)
}

/// 已排序序列的线性插值分位数。空序列返回 0。
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    let (Some(first), Some(last)) = (sorted.first(), sorted.last()) else {
        return 0.0;
    };
    if q <= 0.0 {
        return *first;
    }
    if q >= 1.0 {
        return *last;
    }
    let position = (sorted.len() - 1) as f64 * q;
    let low = position.floor() as usize;
    let high = (low + 1).min(sorted.len() - 1);
    let fraction = position - low as f64;
    sorted[low] * (1.0 - fraction) + sorted[high] * fraction
}

/// 分量取最小/最大值合并包围盒。
pub fn merge_boxes(boxes: &[BoundingBox]) -> Option<BoundingBox> {
    let mut merged = BoundingBox::empty();
    for bounds in boxes {
        merged.include_bounds(bounds);
    }
    (!merged.is_empty()).then_some(merged)
}
