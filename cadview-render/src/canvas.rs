//! tiny-skia 光栅画布，负责几何图元的描边。

use std::f64::consts::TAU;

use cadview_core::document::{Arc, Circle, Line, Polyline};
use cadview_core::geometry::Point2;
use thiserror::Error;
use tiny_skia::{Color, LineCap, Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};

use crate::errors::RenderError;
use crate::layout::ViewTransform;
use crate::palette::Rgb;

/// 0.6pt 线宽在 100 DPI 下的像素宽度。
pub const STROKE_WIDTH_PX: f32 = 0.6 * 100.0 / 72.0;
/// 圆弧采样时单段弦长（像素）的目标值。
const ARC_SEGMENT_PX: f64 = 2.0;
const MAX_ARC_SEGMENTS: usize = 720;
const ANGLE_EPSILON: f64 = 1e-9;

/// 单个实体的绘制失败，由调用方计数后跳过。
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DrawError {
    #[error("geometry has non-finite pixel coordinates")]
    NonFinite,
    #[error("geometry collapses to an empty path")]
    Degenerate,
}

pub struct Canvas {
    pixmap: Pixmap,
}

impl Canvas {
    /// 分配白底画布。
    pub fn new(width: u32, height: u32) -> Result<Self, RenderError> {
        let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
            RenderError::Backend(format!("cannot allocate {width}x{height} canvas"))
        })?;
        pixmap.fill(Color::WHITE);
        Ok(Self { pixmap })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn draw_line(&mut self, line: &Line, view: &ViewTransform, color: Rgb) -> Result<(), DrawError> {
        let mut builder = PathBuilder::new();
        let (x1, y1) = pixel(view, line.start)?;
        let (x2, y2) = pixel(view, line.end)?;
        builder.move_to(x1, y1);
        builder.line_to(x2, y2);
        self.stroke(builder, color)
    }

    pub fn draw_circle(
        &mut self,
        circle: &Circle,
        view: &ViewTransform,
        color: Rgb,
    ) -> Result<(), DrawError> {
        let (cx, cy) = view.to_pixel(circle.center);
        let rx = circle.radius.abs() * view.pixel_scale();
        let ry = circle.radius.abs() * view.scale_y();
        let rect = Rect::from_ltrb(
            to_f32(cx - rx)?,
            to_f32(cy - ry)?,
            to_f32(cx + rx)?,
            to_f32(cy + ry)?,
        )
        .ok_or(DrawError::Degenerate)?;
        let path = PathBuilder::from_oval(rect).ok_or(DrawError::Degenerate)?;
        self.stroke_path(&path, color);
        Ok(())
    }

    /// 从起始角逆时针扫到终止角；起止角相同时不绘制，相差整圈时画整圆。
    pub fn draw_arc(&mut self, arc: &Arc, view: &ViewTransform, color: Rgb) -> Result<(), DrawError> {
        let delta = arc.end_angle - arc.start_angle;
        let mut sweep = delta.rem_euclid(TAU);
        if !sweep.is_finite() {
            return Err(DrawError::NonFinite);
        }
        if delta == 0.0 {
            return Ok(());
        }
        if sweep < ANGLE_EPSILON || TAU - sweep < ANGLE_EPSILON {
            sweep = TAU;
        }
        let radius_px = arc.radius.abs() * view.pixel_scale().max(view.scale_y());
        let segments = ((radius_px * sweep / ARC_SEGMENT_PX).ceil() as usize).clamp(4, MAX_ARC_SEGMENTS);

        let mut builder = PathBuilder::new();
        for step in 0..=segments {
            let angle = arc.start_angle + sweep * step as f64 / segments as f64;
            let point = Point2::new(
                arc.center.x() + arc.radius * angle.cos(),
                arc.center.y() + arc.radius * angle.sin(),
            );
            let (x, y) = pixel(view, point)?;
            if step == 0 {
                builder.move_to(x, y);
            } else {
                builder.line_to(x, y);
            }
        }
        self.stroke(builder, color)
    }

    /// 顶点之间以直线相连；闭合且顶点多于两个时回到起点。
    pub fn draw_polyline(
        &mut self,
        polyline: &Polyline,
        view: &ViewTransform,
        color: Rgb,
    ) -> Result<(), DrawError> {
        let mut vertices = polyline.vertices.iter();
        let Some(first) = vertices.next() else {
            return Err(DrawError::Degenerate);
        };
        let mut builder = PathBuilder::new();
        let (x, y) = pixel(view, first.position)?;
        builder.move_to(x, y);
        for vertex in vertices {
            let (x, y) = pixel(view, vertex.position)?;
            builder.line_to(x, y);
        }
        if polyline.is_closed && polyline.vertices.len() > 2 {
            builder.close();
        }
        self.stroke(builder, color)
    }

    fn stroke(&mut self, builder: PathBuilder, color: Rgb) -> Result<(), DrawError> {
        let path = builder.finish().ok_or(DrawError::Degenerate)?;
        self.stroke_path(&path, color);
        Ok(())
    }

    fn stroke_path(&mut self, path: &tiny_skia::Path, color: Rgb) {
        let mut paint = Paint::default();
        paint.set_color_rgba8(color.r, color.g, color.b, 255);
        paint.anti_alias = true;
        let stroke = Stroke {
            width: STROKE_WIDTH_PX,
            line_cap: LineCap::Round,
            ..Stroke::default()
        };
        self.pixmap
            .stroke_path(path, &paint, &stroke, Transform::identity(), None);
    }

    pub(crate) fn pixmap_mut(&mut self) -> &mut Pixmap {
        &mut self.pixmap
    }

    pub fn encode_png(&self) -> Result<Vec<u8>, RenderError> {
        self.pixmap
            .encode_png()
            .map_err(|err| RenderError::Backend(format!("png encoding failed: {err}")))
    }
}

fn to_f32(value: f64) -> Result<f32, DrawError> {
    let narrowed = value as f32;
    if narrowed.is_finite() {
        Ok(narrowed)
    } else {
        Err(DrawError::NonFinite)
    }
}

fn pixel(view: &ViewTransform, point: Point2) -> Result<(f32, f32), DrawError> {
    let (x, y) = view.to_pixel(point);
    Ok((to_f32(x)?, to_f32(y)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadview_core::document::PolylineVertex;
    use cadview_engine::spatial::Region;

    fn view() -> ViewTransform {
        ViewTransform::new(&Region::new(0.0, 0.0, 100.0, 100.0), (100, 100))
    }

    fn inked(canvas: &Canvas) -> usize {
        canvas
            .pixmap
            .pixels()
            .iter()
            .filter(|pixel| pixel.red() < 200 || pixel.green() < 200 || pixel.blue() < 200)
            .count()
    }

    #[test]
    fn line_leaves_ink() {
        let mut canvas = Canvas::new(100, 100).expect("画布应分配成功");
        let line = Line {
            start: Point2::new(10.0, 50.0),
            end: Point2::new(90.0, 50.0),
            layer: "0".to_string(),
            color: None,
        };
        canvas.draw_line(&line, &view(), Rgb::BLACK).expect("直线应绘制成功");
        assert!(inked(&canvas) >= 70);
    }

    #[test]
    fn zero_sweep_arc_draws_nothing() {
        let mut canvas = Canvas::new(100, 100).expect("画布应分配成功");
        let arc = Arc {
            center: Point2::new(50.0, 50.0),
            radius: 20.0,
            start_angle: 1.0,
            end_angle: 1.0,
            layer: "0".to_string(),
            color: None,
        };
        canvas.draw_arc(&arc, &view(), Rgb::BLACK).expect("空圆弧不算失败");
        assert_eq!(inked(&canvas), 0);
    }

    #[test]
    fn full_turn_arc_is_drawn_as_circle() {
        let mut canvas = Canvas::new(100, 100).expect("画布应分配成功");
        let arc = Arc {
            center: Point2::new(50.0, 50.0),
            radius: 40.0,
            start_angle: 0.0_f64.to_radians(),
            end_angle: 360.0_f64.to_radians(),
            layer: "0".to_string(),
            color: None,
        };
        canvas.draw_arc(&arc, &view(), Rgb::BLACK).expect("整圈圆弧应绘制成功");
        // 周长约 251 像素
        assert!(inked(&canvas) > 200, "inked = {}", inked(&canvas));

        let mut negative = Canvas::new(100, 100).expect("画布应分配成功");
        let arc = Arc {
            start_angle: -std::f64::consts::PI,
            end_angle: std::f64::consts::PI,
            ..arc
        };
        negative.draw_arc(&arc, &view(), Rgb::BLACK).expect("整圈圆弧应绘制成功");
        assert!(inked(&negative) > 200);
    }

    #[test]
    fn empty_polyline_and_nan_circle_fail() {
        let mut canvas = Canvas::new(100, 100).expect("画布应分配成功");
        let polyline = Polyline {
            vertices: Vec::new(),
            is_closed: true,
            layer: "0".to_string(),
            color: None,
        };
        assert_eq!(
            canvas.draw_polyline(&polyline, &view(), Rgb::BLACK),
            Err(DrawError::Degenerate)
        );
        let circle = Circle {
            center: Point2::new(f64::NAN, 0.0),
            radius: 1.0,
            layer: "0".to_string(),
            color: None,
        };
        assert!(canvas.draw_circle(&circle, &view(), Rgb::BLACK).is_err());
    }

    #[test]
    fn closed_polyline_is_stroked() {
        let mut canvas = Canvas::new(100, 100).expect("画布应分配成功");
        let polyline = Polyline {
            vertices: vec![
                PolylineVertex::new(Point2::new(10.0, 10.0)),
                PolylineVertex::new(Point2::new(90.0, 10.0)),
                PolylineVertex::new(Point2::new(90.0, 90.0)),
            ],
            is_closed: true,
            layer: "0".to_string(),
            color: None,
        };
        canvas
            .draw_polyline(&polyline, &view(), Rgb::BLACK)
            .expect("多段线应绘制成功");
        assert!(inked(&canvas) > 200);
    }
}
