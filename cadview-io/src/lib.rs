use std::path::{Path, PathBuf};

use cadview_core::{
    document::{
        Arc, BlockDefinition, Circle, COLOR_BY_BLOCK, COLOR_BY_LAYER, DEFAULT_LAYER, Drawing,
        DrawingMetadata, Entity, Insert, Line, MText, OtherEntity, Polyline, PolylineVertex, Text,
    },
    geometry::{Point2, Vector2},
};
use dxf::entities::EntityType;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("file not found: {0:?}")]
    NotFound(PathBuf),
    #[error("failed to parse DXF file {path:?}: {message}")]
    ParseError { path: PathBuf, message: String },
}

pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<Drawing, IoError>;
}

/// 基于 `dxf` crate 的读取适配层，只做模型转换，不自行解析 DXF。
#[derive(Debug, Default, Clone, Copy)]
pub struct DxfFacade;

impl DxfFacade {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentLoader for DxfFacade {
    fn load(&self, path: &Path) -> Result<Drawing, IoError> {
        if !path.is_file() {
            return Err(IoError::NotFound(path.to_path_buf()));
        }
        let source = dxf::Drawing::load_file(path).map_err(|err| IoError::ParseError {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        let drawing = convert_drawing(&source);
        info!(
            path = %path.display(),
            entities = drawing.entities().count(),
            blocks = drawing.blocks().count(),
            "已加载 DXF 图纸"
        );
        Ok(drawing)
    }
}

/// 将 `dxf::Drawing` 转换为只读图纸模型。图纸空间实体不进入模型空间。
pub fn convert_drawing(source: &dxf::Drawing) -> Drawing {
    let mut drawing = Drawing::new();
    drawing.set_metadata(DrawingMetadata {
        dxf_version: Some(format!("{:?}", source.header.version)),
        units: Some(format!("{:?}", source.header.default_drawing_units)),
    });

    for block in source.blocks() {
        let definition = BlockDefinition::new(
            block.name.clone(),
            Point2::new(block.base_point.x, block.base_point.y),
        )
        .with_entities(block.entities.iter().map(convert_entity));
        drawing.add_block(definition);
    }

    let mut paper_space = 0usize;
    for entity in source.entities() {
        if entity.common.is_in_paper_space {
            paper_space += 1;
            continue;
        }
        drawing.push(convert_entity(entity));
    }
    if paper_space > 0 {
        debug!(count = paper_space, "跳过图纸空间实体");
    }
    drawing
}

fn layer_of(entity: &dxf::entities::Entity) -> String {
    if entity.common.layer.is_empty() {
        DEFAULT_LAYER.to_string()
    } else {
        entity.common.layer.clone()
    }
}

/// ACI 颜色：随层记为 256，随块记为 0。
fn color_of(entity: &dxf::entities::Entity) -> Option<i16> {
    let color = &entity.common.color;
    if color.is_by_layer() {
        Some(COLOR_BY_LAYER)
    } else if color.is_by_block() {
        Some(COLOR_BY_BLOCK)
    } else {
        color.index().map(i16::from)
    }
}

#[inline]
fn point(location: &dxf::Point) -> Point2 {
    Point2::new(location.x, location.y)
}

/// 转换单个实体。角度统一由度转为弧度，不支持的类型保留类型名。
pub fn convert_entity(entity: &dxf::entities::Entity) -> Entity {
    let layer = layer_of(entity);
    let color = color_of(entity);
    match &entity.specific {
        EntityType::Line(line) => Entity::Line(Line {
            start: point(&line.p1),
            end: point(&line.p2),
            layer,
            color,
        }),
        EntityType::Circle(circle) => Entity::Circle(Circle {
            center: point(&circle.center),
            radius: circle.radius,
            layer,
            color,
        }),
        EntityType::Arc(arc) => Entity::Arc(Arc {
            center: point(&arc.center),
            radius: arc.radius,
            start_angle: arc.start_angle.to_radians(),
            end_angle: arc.end_angle.to_radians(),
            layer,
            color,
        }),
        EntityType::LwPolyline(lwpoly) => Entity::LwPolyline(Polyline {
            vertices: lwpoly
                .vertices
                .iter()
                .map(|vertex| PolylineVertex::with_bulge(Point2::new(vertex.x, vertex.y), vertex.bulge))
                .collect(),
            is_closed: lwpoly.is_closed(),
            layer,
            color,
        }),
        EntityType::Polyline(poly) => Entity::Polyline(Polyline {
            vertices: poly
                .vertices()
                .map(|vertex| PolylineVertex::with_bulge(point(&vertex.location), vertex.bulge))
                .collect(),
            is_closed: poly.is_closed(),
            layer,
            color,
        }),
        EntityType::Text(text) => Entity::Text(Text {
            insert: point(&text.location),
            content: text.value.clone(),
            height: Some(text.text_height),
            rotation: text.rotation.to_radians(),
            layer,
            color,
        }),
        EntityType::MText(mtext) => {
            // 长文本被拆分在多个组码 3 中，组码 1 为最后一段
            let mut content = mtext.extended_text.concat();
            content.push_str(&mtext.text);
            let direction = &mtext.x_axis_direction;
            let rotation = if mtext.rotation_angle == 0.0 && (direction.x != 0.0 || direction.y != 0.0) {
                direction.y.atan2(direction.x)
            } else {
                mtext.rotation_angle.to_radians()
            };
            Entity::MText(MText {
                insert: point(&mtext.insertion_point),
                content,
                height: Some(mtext.initial_text_height),
                rotation,
                layer,
                color,
            })
        }
        EntityType::Insert(insert) => Entity::Insert(Insert {
            block_name: insert.name.clone(),
            insert: point(&insert.location),
            scale: Vector2::new(insert.x_scale_factor, insert.y_scale_factor),
            rotation: insert.rotation.to_radians(),
            layer,
            color,
        }),
        other => Entity::Other(OtherEntity {
            dxf_type: unsupported_type_name(other),
            layer,
            color,
        }),
    }
}

fn unsupported_type_name(specific: &EntityType) -> String {
    match specific {
        EntityType::ModelPoint(_) => "POINT".to_string(),
        EntityType::Ellipse(_) => "ELLIPSE".to_string(),
        EntityType::Spline(_) => "SPLINE".to_string(),
        EntityType::Leader(_) => "LEADER".to_string(),
        EntityType::RotatedDimension(_)
        | EntityType::RadialDimension(_)
        | EntityType::DiameterDimension(_) => "DIMENSION".to_string(),
        other => {
            // 其余类型取枚举变体名
            let debug = format!("{other:?}");
            debug
                .split(|ch: char| !ch.is_ascii_alphanumeric())
                .next()
                .unwrap_or_default()
                .to_ascii_uppercase()
        }
    }
}
