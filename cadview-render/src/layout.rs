//! 世界坐标到像素的映射、输出尺寸与字号计算。

use cadview_core::geometry::Point2;
use cadview_engine::spatial::Region;

pub const MIN_FONT_PX: f64 = 1.0;
pub const MAX_FONT_PX: f64 = 18.0;
/// 非概览缩放下的最小字号。
pub const DETAIL_MIN_FONT_PX: f64 = 2.5;
/// 像素比例低于该值视为概览图。
pub const OVERVIEW_SCALE_THRESHOLD: f64 = 0.02;
const TEXT_FONT_SCALE: f64 = 0.75;

/// 计算实际输出像素尺寸。
///
/// 保持比例时取能放进 `requested` 的最大等比尺寸，否则直接使用 `requested`；
/// 两个轴都不小于 1。
pub fn fit_output_size(region: &Region, requested: (u32, u32), maintain_aspect: bool) -> (u32, u32) {
    let max_width = requested.0.max(1);
    let max_height = requested.1.max(1);
    if !maintain_aspect {
        return (max_width, max_height);
    }
    let scale = (max_width as f64 / region.width).min(max_height as f64 / region.height);
    let fit = |world: f64, limit: u32| -> u32 {
        let pixels = (world * scale).round();
        if pixels.is_finite() {
            (pixels as u32).clamp(1, limit)
        } else {
            limit
        }
    };
    (fit(region.width, max_width), fit(region.height, max_height))
}

/// 文字像素字号：`字高 × 像素比例 × 0.75`，夹在下限与 18px 之间。
pub fn font_size_px(char_height: f64, pixel_scale: f64) -> f64 {
    let floor = if pixel_scale < OVERVIEW_SCALE_THRESHOLD {
        MIN_FONT_PX
    } else {
        DETAIL_MIN_FONT_PX
    };
    (char_height * pixel_scale * TEXT_FONT_SCALE).clamp(floor, MAX_FONT_PX)
}

/// 世界坐标 → 像素坐标。像素原点在左上角，y 轴向下。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    min_x: f64,
    max_y: f64,
    scale_x: f64,
    scale_y: f64,
}

impl ViewTransform {
    pub fn new(region: &Region, pixel_size: (u32, u32)) -> Self {
        Self {
            min_x: region.x,
            max_y: region.y + region.height,
            scale_x: pixel_size.0 as f64 / region.width,
            scale_y: pixel_size.1 as f64 / region.height,
        }
    }

    /// 水平方向每个世界单位的像素数。
    #[inline]
    pub fn pixel_scale(&self) -> f64 {
        self.scale_x
    }

    #[inline]
    pub fn scale_y(&self) -> f64 {
        self.scale_y
    }

    #[inline]
    pub fn to_pixel(&self, point: Point2) -> (f64, f64) {
        (
            (point.x() - self.min_x) * self.scale_x,
            (self.max_y - point.y()) * self.scale_y,
        )
    }
}
