//! 实体几何解析：包围盒与文字视觉宽度估算。

use cadview_core::document::{Entity, PolylineVertex};
use cadview_core::geometry::{BoundingBox, Point2};
use cadview_core::text::{clean_mtext, clean_text};

/// 缺少字高时的默认值（图纸单位）。
pub const DEFAULT_TEXT_HEIGHT: f64 = 100.0;
pub const MIN_TEXT_HEIGHT: f64 = 1.0;

const CHAR_WIDTH_FACTOR: f64 = 0.6;
const MAX_VISUAL_CHARS: usize = 64;
const MAX_WIDTH_FACTOR: f64 = 80.0;

/// 文字的锚定方式：单行文字锚定基线，多行文字锚定顶部。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAnchor {
    Baseline,
    Top,
}

/// 解码后的可显示文字。
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedText {
    pub content: String,
    pub insert: Point2,
    /// 规整后的字高，始终 >= [`MIN_TEXT_HEIGHT`]。
    pub height: f64,
    /// 实体上记录的原始字高。
    pub raw_height: Option<f64>,
    /// 旋转角（弧度）。
    pub rotation: f64,
    pub anchor: TextAnchor,
}

impl ResolvedText {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.content.lines()
    }
}

/// 规整字高：缺失或非有限值取默认值，且不小于 1。
#[inline]
pub fn text_height(height: Option<f64>) -> f64 {
    match height {
        Some(value) if value.is_finite() => value.max(MIN_TEXT_HEIGHT),
        _ => DEFAULT_TEXT_HEIGHT,
    }
}

/// 按字符数与字高估算文字宽度，上限为 80 倍字高。
pub fn estimate_text_width(text: &str, height: f64) -> f64 {
    let visual_chars = text.chars().count().clamp(1, MAX_VISUAL_CHARS) as f64;
    (height * visual_chars * CHAR_WIDTH_FACTOR)
        .max(height)
        .min(height * MAX_WIDTH_FACTOR)
}

/// 文字实体解码为可显示文本；非文字实体返回 None。
pub fn resolve_text(entity: &Entity) -> Option<ResolvedText> {
    match entity {
        Entity::Text(text) => Some(ResolvedText {
            content: clean_text(&text.content),
            insert: text.insert,
            height: text_height(text.height),
            raw_height: text.height,
            rotation: text.rotation,
            anchor: TextAnchor::Baseline,
        }),
        Entity::MText(mtext) => Some(ResolvedText {
            content: clean_mtext(&mtext.content),
            insert: mtext.insert,
            height: text_height(mtext.height),
            raw_height: mtext.height,
            rotation: mtext.rotation,
            anchor: TextAnchor::Top,
        }),
        _ => None,
    }
}

/// 计算实体的轴对齐包围盒。
///
/// 圆弧按整圆处理；文字从插入点向右上方延伸，不考虑旋转。
/// 块参照、未支持实体以及含非有限坐标的实体返回 None。
pub fn bbox_of(entity: &Entity) -> Option<BoundingBox> {
    let bounds = match entity {
        Entity::Line(line) => BoundingBox::from_points(line.start, line.end),
        Entity::Circle(circle) => circle_bounds(circle.center, circle.radius),
        Entity::Arc(arc) => circle_bounds(arc.center, arc.radius),
        Entity::LwPolyline(polyline) | Entity::Polyline(polyline) => {
            vertex_bounds(&polyline.vertices)?
        }
        Entity::Text(_) | Entity::MText(_) => {
            let text = resolve_text(entity)?;
            text_bounds(&text)
        }
        Entity::Insert(_) | Entity::Other(_) => return None,
    };
    bounds.is_finite().then_some(bounds)
}

fn circle_bounds(center: Point2, radius: f64) -> BoundingBox {
    BoundingBox::new(
        center.x() - radius,
        center.y() - radius,
        center.x() + radius,
        center.y() + radius,
    )
}

fn vertex_bounds(vertices: &[PolylineVertex]) -> Option<BoundingBox> {
    if vertices.is_empty() {
        return None;
    }
    let mut bounds = BoundingBox::empty();
    for vertex in vertices {
        bounds.include_point(vertex.position);
    }
    Some(bounds)
}

fn text_bounds(text: &ResolvedText) -> BoundingBox {
    let width = estimate_text_width(&text.content, text.height);
    BoundingBox::from_rect(text.insert.x(), text.insert.y(), width, text.height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadview_core::document::{Drawing, Insert, MText, OtherEntity, Polyline};
    use cadview_core::geometry::Vector2;

    fn single(drawing: &Drawing) -> &Entity {
        drawing.entities().next().expect("绘图中应至少有一个实体")
    }

    #[test]
    fn line_and_circle_bounds() {
        let mut drawing = Drawing::new();
        drawing.add_line(Point2::new(10.0, 5.0), Point2::new(-2.0, 8.0), "0");
        let bounds = bbox_of(single(&drawing)).expect("直线应有包围盒");
        assert_eq!(bounds, BoundingBox::new(-2.0, 5.0, 10.0, 8.0));

        let mut drawing = Drawing::new();
        drawing.add_arc(Point2::new(0.0, 0.0), 3.0, 0.0, 0.5, "0");
        let bounds = bbox_of(single(&drawing)).expect("圆弧应有包围盒");
        assert_eq!(bounds, BoundingBox::new(-3.0, -3.0, 3.0, 3.0));
    }

    #[test]
    fn empty_polyline_has_no_bounds() {
        let entity = Entity::Polyline(Polyline {
            vertices: Vec::new(),
            is_closed: false,
            layer: "0".to_string(),
            color: None,
        });
        assert!(bbox_of(&entity).is_none());
    }

    #[test]
    fn text_width_estimate_is_clamped() {
        assert_eq!(estimate_text_width("", 10.0), 10.0);
        assert_eq!(estimate_text_width("A", 10.0), 10.0);
        assert_eq!(estimate_text_width("ABCD", 10.0), 24.0);
        let long = "x".repeat(500);
        assert!((estimate_text_width(&long, 10.0) - 384.0).abs() < 1e-9);
    }

    #[test]
    fn text_bounds_use_default_height_when_missing() {
        let entity = Entity::MText(MText {
            insert: Point2::new(100.0, 200.0),
            content: "{\\H2.5;AB}".to_string(),
            height: None,
            rotation: 0.0,
            layer: "TEXT".to_string(),
            color: None,
        });
        let bounds = bbox_of(&entity).expect("文字应有包围盒");
        assert_eq!(bounds, BoundingBox::new(100.0, 200.0, 220.0, 300.0));
    }

    #[test]
    fn tiny_text_height_is_floored() {
        assert_eq!(text_height(Some(0.2)), MIN_TEXT_HEIGHT);
        assert_eq!(text_height(Some(f64::NAN)), DEFAULT_TEXT_HEIGHT);
        assert_eq!(text_height(Some(350.0)), 350.0);
    }

    #[test]
    fn non_finite_geometry_is_skipped() {
        let mut drawing = Drawing::new();
        drawing.add_circle(Point2::new(f64::NAN, 0.0), 1.0, "0");
        assert!(bbox_of(single(&drawing)).is_none());
    }

    #[test]
    fn inserts_and_unsupported_entities_have_no_bounds() {
        let insert = Entity::Insert(Insert {
            block_name: "B".to_string(),
            insert: Point2::new(0.0, 0.0),
            scale: Vector2::new(1.0, 1.0),
            rotation: 0.0,
            layer: "0".to_string(),
            color: None,
        });
        let other = Entity::Other(OtherEntity {
            dxf_type: "HATCH".to_string(),
            layer: "0".to_string(),
            color: None,
        });
        assert!(bbox_of(&insert).is_none());
        assert!(bbox_of(&other).is_none());
    }

    #[test]
    fn resolved_text_is_decoded_and_trimmed() {
        let mut drawing = Drawing::new();
        drawing.add_text(Point2::new(0.0, 0.0), " \\U+5BA2\\U+5385\0 ", 250.0, 0.0, "TEXT");
        let text = resolve_text(single(&drawing)).expect("应解析出文字");
        assert_eq!(text.content, "客厅");
        assert_eq!(text.anchor, TextAnchor::Baseline);
        assert_eq!(text.raw_height, Some(250.0));
    }
}
