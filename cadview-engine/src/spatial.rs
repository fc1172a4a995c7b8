use std::collections::HashSet;

use cadview_core::geometry::BoundingBox;
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// 共享的空间相交判定：无边界框的实体永远不相交，边界接触视为相交。
#[inline]
pub fn intersects(entity_bounds: Option<&BoundingBox>, query: &BoundingBox) -> bool {
    entity_bounds.is_some_and(|bounds| bounds.intersects(query))
}

/// 调用方描述的世界坐标矩形：左下角 + 宽高。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Region {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_bounds(bounds: &BoundingBox) -> Self {
        Self::new(bounds.min_x(), bounds.min_y(), bounds.width(), bounds.height())
    }

    /// 宽高必须为正的有限值。
    pub fn validate(&self) -> Result<(), EngineError> {
        let finite = self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite();
        if !finite || self.width <= 0.0 || self.height <= 0.0 {
            return Err(EngineError::InvalidRegion {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn to_bounds(&self) -> BoundingBox {
        BoundingBox::from_rect(self.x, self.y, self.width, self.height)
    }

    /// 面积（平方米），1000 个图纸单位为 1 米。
    #[inline]
    pub fn area_m2(&self) -> f64 {
        self.width * self.height / 1_000_000.0
    }
}

/// 图层过滤器。未指定图层（或指定空列表）时接受所有图层，名称区分大小写。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerFilter {
    layers: Option<HashSet<String>>,
}

impl LayerFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only<I, S>(layers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let layers: HashSet<String> = layers.into_iter().map(Into::into).collect();
        if layers.is_empty() {
            Self::all()
        } else {
            Self {
                layers: Some(layers),
            }
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.layers.is_some()
    }

    #[inline]
    pub fn accepts(&self, layer: &str) -> bool {
        self.layers
            .as_ref()
            .is_none_or(|layers| layers.contains(layer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_bounds_never_intersect() {
        let queries = [
            BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            BoundingBox::new(-1e9, -1e9, 1e9, 1e9),
            BoundingBox::new(5.0, 5.0, 5.0, 5.0),
        ];
        for query in &queries {
            assert!(!intersects(None, query));
        }
    }

    #[test]
    fn touching_edges_are_inclusive() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(10.0, 2.0, 12.0, 4.0);
        assert!(intersects(Some(&a), &b));
        let corner = BoundingBox::new(10.0, 10.0, 11.0, 11.0);
        assert!(intersects(Some(&a), &corner));
        let apart = BoundingBox::new(10.5, 0.0, 12.0, 4.0);
        assert!(!intersects(Some(&a), &apart));
    }

    #[test]
    fn region_validation_rejects_degenerate_sizes() {
        assert!(Region::new(0.0, 0.0, 10.0, 5.0).validate().is_ok());
        assert_eq!(
            Region::new(0.0, 0.0, 0.0, 5.0).validate(),
            Err(EngineError::InvalidRegion {
                width: 0.0,
                height: 5.0
            })
        );
        assert!(Region::new(0.0, 0.0, 10.0, -1.0).validate().is_err());
        assert!(Region::new(0.0, 0.0, f64::NAN, 1.0).validate().is_err());
    }

    #[test]
    fn empty_layer_list_accepts_everything() {
        let filter = LayerFilter::only(Vec::<String>::new());
        assert!(!filter.is_active());
        assert!(filter.accepts("WALL"));

        let filter = LayerFilter::only(["WALL"]);
        assert!(filter.accepts("WALL"));
        assert!(!filter.accepts("wall"));
    }
}
