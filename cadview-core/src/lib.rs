pub mod geometry {
    use glam::{DAffine2, DVec2};
    use serde::{Deserialize, Serialize};

    /// 二维点，内部以 `glam::DVec2` 表示，保持与 DXF 双精度坐标一致。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn is_finite(self) -> bool {
            self.0.is_finite()
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 二维向量，用于块参照缩放系数等。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Vector2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    /// 轴对齐边界框（世界坐标），始终满足 `min <= max`。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct BoundingBox {
        min: Point2,
        max: Point2,
    }

    impl BoundingBox {
        /// 由四个分量构造，自动规整分量顺序。
        pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
            Self {
                min: Point2::new(min_x.min(max_x), min_y.min(max_y)),
                max: Point2::new(min_x.max(max_x), min_y.max(max_y)),
            }
        }

        #[inline]
        pub fn from_points(a: Point2, b: Point2) -> Self {
            Self::new(a.x(), a.y(), b.x(), b.y())
        }

        /// 以左下角与宽高描述的矩形。
        #[inline]
        pub fn from_rect(x: f64, y: f64, width: f64, height: f64) -> Self {
            Self::new(x, y, x + width, y + height)
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn is_finite(&self) -> bool {
            self.min.is_finite() && self.max.is_finite()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        #[inline]
        pub fn min_x(&self) -> f64 {
            self.min.x()
        }

        #[inline]
        pub fn min_y(&self) -> f64 {
            self.min.y()
        }

        #[inline]
        pub fn max_x(&self) -> f64 {
            self.max.x()
        }

        #[inline]
        pub fn max_y(&self) -> f64 {
            self.max.y()
        }

        #[inline]
        pub fn width(&self) -> f64 {
            self.max.x() - self.min.x()
        }

        #[inline]
        pub fn height(&self) -> f64 {
            self.max.y() - self.min.y()
        }

        pub fn include_point(&mut self, point: Point2) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            self.min = Point2::from_vec(self.min.as_vec2().min(point.as_vec2()));
            self.max = Point2::from_vec(self.max.as_vec2().max(point.as_vec2()));
        }

        pub fn include_bounds(&mut self, other: &BoundingBox) {
            if other.is_empty() {
                return;
            }
            self.include_point(other.min);
            self.include_point(other.max);
        }

        #[inline]
        pub fn center(&self) -> Point2 {
            debug_assert!(!self.is_empty());
            Point2::from_vec((self.min.as_vec2() + self.max.as_vec2()) * 0.5)
        }

        /// 标准 AABB 相交判定，边界接触视为相交。
        #[inline]
        pub fn intersects(&self, other: &BoundingBox) -> bool {
            !(self.max_x() < other.min_x()
                || self.min_x() > other.max_x()
                || self.max_y() < other.min_y()
                || self.min_y() > other.max_y())
        }

        #[inline]
        pub fn contains(&self, other: &BoundingBox) -> bool {
            self.min_x() <= other.min_x()
                && self.min_y() <= other.min_y()
                && self.max_x() >= other.max_x()
                && self.max_y() >= other.max_y()
        }
    }

    /// 二维仿射变换，封装块参照的放置矩阵。
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct Transform2(DAffine2);

    impl Transform2 {
        pub const IDENTITY: Self = Self(DAffine2::IDENTITY);

        /// 块参照放置：基点移到原点，随后缩放、旋转（弧度），最后移动到插入点。
        pub fn placement(insert: Point2, scale: Vector2, rotation: f64, base_point: Point2) -> Self {
            let local = DAffine2::from_scale_angle_translation(
                scale.as_vec2(),
                rotation,
                insert.as_vec2(),
            );
            Self(local * DAffine2::from_translation(-base_point.as_vec2()))
        }

        /// 先应用 `inner`，再应用自身。
        #[inline]
        pub fn then(&self, inner: &Transform2) -> Transform2 {
            Self(self.0 * inner.0)
        }

        #[inline]
        pub fn apply(&self, point: Point2) -> Point2 {
            Point2::from_vec(self.0.transform_point2(point.as_vec2()))
        }

        #[inline]
        pub fn x_scale(&self) -> f64 {
            self.0.matrix2.x_axis.length()
        }

        #[inline]
        pub fn y_scale(&self) -> f64 {
            self.0.matrix2.y_axis.length()
        }

        /// X 轴方向的旋转角（弧度）。
        #[inline]
        pub fn rotation(&self) -> f64 {
            let axis = self.0.matrix2.x_axis;
            axis.y.atan2(axis.x)
        }

        #[inline]
        pub fn is_mirrored(&self) -> bool {
            self.0.matrix2.determinant() < 0.0
        }

        /// 保角变换（等比缩放、无剪切）时返回缩放系数，否则返回 None。
        pub fn uniform_scale(&self) -> Option<f64> {
            let x_axis = self.0.matrix2.x_axis;
            let y_axis = self.0.matrix2.y_axis;
            let sx = x_axis.length();
            let sy = y_axis.length();
            let tolerance = 1e-9 * sx.max(sy).max(1.0);
            if (sx - sy).abs() <= tolerance && x_axis.dot(y_axis).abs() <= tolerance * sx.max(sy) {
                Some(sx)
            } else {
                None
            }
        }
    }

    impl Default for Transform2 {
        fn default() -> Self {
            Self::IDENTITY
        }
    }
}

pub mod document {
    use std::borrow::Cow;
    use std::collections::HashMap;

    use serde::{Deserialize, Serialize};
    use thiserror::Error;
    use tracing::debug;

    use crate::geometry::{Point2, Transform2, Vector2};

    pub const DEFAULT_LAYER: &str = "0";
    /// ACI 颜色值：随块。
    pub const COLOR_BY_BLOCK: i16 = 0;
    /// ACI 颜色值：随层。
    pub const COLOR_BY_LAYER: i16 = 256;
    /// 块参照嵌套展开的最大层数。
    pub const MAX_INSERT_DEPTH: usize = 16;

    /// 实体类别判别值。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub enum EntityKind {
        Line,
        Circle,
        Arc,
        LwPolyline,
        Polyline,
        Text,
        MText,
        Insert,
        Other,
    }

    impl EntityKind {
        /// 可直接绘制的类别；块参照需先展开，其它类别不支持。
        #[inline]
        pub fn is_renderable(self) -> bool {
            !matches!(self, EntityKind::Insert | EntityKind::Other)
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Line {
        pub start: Point2,
        pub end: Point2,
        pub layer: String,
        pub color: Option<i16>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Circle {
        pub center: Point2,
        pub radius: f64,
        pub layer: String,
        pub color: Option<i16>,
    }

    /// 圆弧实体，角度以弧度储存，沿数学正方向从起始角扫到终止角。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Arc {
        pub center: Point2,
        pub radius: f64,
        pub start_angle: f64,
        pub end_angle: f64,
        pub layer: String,
        pub color: Option<i16>,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct PolylineVertex {
        pub position: Point2,
        pub bulge: f64,
    }

    impl PolylineVertex {
        #[inline]
        pub fn new(position: Point2) -> Self {
            Self {
                position,
                bulge: 0.0,
            }
        }

        #[inline]
        pub fn with_bulge(position: Point2, bulge: f64) -> Self {
            Self { position, bulge }
        }
    }

    /// LWPOLYLINE 与 POLYLINE 共用的顶点序列。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Polyline {
        pub vertices: Vec<PolylineVertex>,
        pub is_closed: bool,
        pub layer: String,
        pub color: Option<i16>,
    }

    /// 单行文字。`height` 缺失时由解析层按默认字高处理；旋转角为弧度。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Text {
        pub insert: Point2,
        pub content: String,
        pub height: Option<f64>,
        pub rotation: f64,
        pub layer: String,
        pub color: Option<i16>,
    }

    /// 多行文字，`content` 保留原始格式码。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct MText {
        pub insert: Point2,
        pub content: String,
        pub height: Option<f64>,
        pub rotation: f64,
        pub layer: String,
        pub color: Option<i16>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Insert {
        pub block_name: String,
        pub insert: Point2,
        pub scale: Vector2,
        pub rotation: f64,
        pub layer: String,
        pub color: Option<i16>,
    }

    impl Insert {
        #[inline]
        pub fn placement(&self, base_point: Point2) -> Transform2 {
            Transform2::placement(self.insert, self.scale, self.rotation, base_point)
        }
    }

    /// 不支持的实体，仅保留类型名与公共属性，便于统计。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct OtherEntity {
        pub dxf_type: String,
        pub layer: String,
        pub color: Option<i16>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub enum Entity {
        Line(Line),
        Circle(Circle),
        Arc(Arc),
        LwPolyline(Polyline),
        Polyline(Polyline),
        Text(Text),
        MText(MText),
        Insert(Insert),
        Other(OtherEntity),
    }

    impl Entity {
        #[inline]
        pub fn kind(&self) -> EntityKind {
            match self {
                Entity::Line(_) => EntityKind::Line,
                Entity::Circle(_) => EntityKind::Circle,
                Entity::Arc(_) => EntityKind::Arc,
                Entity::LwPolyline(_) => EntityKind::LwPolyline,
                Entity::Polyline(_) => EntityKind::Polyline,
                Entity::Text(_) => EntityKind::Text,
                Entity::MText(_) => EntityKind::MText,
                Entity::Insert(_) => EntityKind::Insert,
                Entity::Other(_) => EntityKind::Other,
            }
        }

        /// DXF 类型名，例如 `LINE`、`MTEXT`。
        pub fn dxf_type(&self) -> &str {
            match self {
                Entity::Line(_) => "LINE",
                Entity::Circle(_) => "CIRCLE",
                Entity::Arc(_) => "ARC",
                Entity::LwPolyline(_) => "LWPOLYLINE",
                Entity::Polyline(_) => "POLYLINE",
                Entity::Text(_) => "TEXT",
                Entity::MText(_) => "MTEXT",
                Entity::Insert(_) => "INSERT",
                Entity::Other(other) => &other.dxf_type,
            }
        }

        #[inline]
        pub fn layer_name(&self) -> &str {
            match self {
                Entity::Line(line) => &line.layer,
                Entity::Circle(circle) => &circle.layer,
                Entity::Arc(arc) => &arc.layer,
                Entity::LwPolyline(polyline) | Entity::Polyline(polyline) => &polyline.layer,
                Entity::Text(text) => &text.layer,
                Entity::MText(mtext) => &mtext.layer,
                Entity::Insert(insert) => &insert.layer,
                Entity::Other(other) => &other.layer,
            }
        }

        #[inline]
        pub fn color(&self) -> Option<i16> {
            match self {
                Entity::Line(line) => line.color,
                Entity::Circle(circle) => circle.color,
                Entity::Arc(arc) => arc.color,
                Entity::LwPolyline(polyline) | Entity::Polyline(polyline) => polyline.color,
                Entity::Text(text) => text.color,
                Entity::MText(mtext) => mtext.color,
                Entity::Insert(insert) => insert.color,
                Entity::Other(other) => other.color,
            }
        }

        fn properties_mut(&mut self) -> (&mut String, &mut Option<i16>) {
            match self {
                Entity::Line(line) => (&mut line.layer, &mut line.color),
                Entity::Circle(circle) => (&mut circle.layer, &mut circle.color),
                Entity::Arc(arc) => (&mut arc.layer, &mut arc.color),
                Entity::LwPolyline(polyline) | Entity::Polyline(polyline) => {
                    (&mut polyline.layer, &mut polyline.color)
                }
                Entity::Text(text) => (&mut text.layer, &mut text.color),
                Entity::MText(mtext) => (&mut mtext.layer, &mut mtext.color),
                Entity::Insert(insert) => (&mut insert.layer, &mut insert.color),
                Entity::Other(other) => (&mut other.layer, &mut other.color),
            }
        }

        /// 块内 0 层实体继承块参照图层，随块颜色继承块参照颜色。
        fn inherit_block_properties(&mut self, layer: &str, color: Option<i16>) {
            let (own_layer, own_color) = self.properties_mut();
            if own_layer.as_str() == DEFAULT_LAYER {
                *own_layer = layer.to_string();
            }
            if *own_color == Some(COLOR_BY_BLOCK) {
                *own_color = color;
            }
        }

        /// 将实体变换到新坐标系，生成虚拟实体。
        ///
        /// 非等比缩放下的圆和圆弧在 DXF 中会变成椭圆，这里不支持椭圆，
        /// 因此退化为 `ELLIPSE` 类型的 [`OtherEntity`]。
        pub fn transformed(&self, transform: &Transform2) -> Entity {
            match self {
                Entity::Line(line) => Entity::Line(Line {
                    start: transform.apply(line.start),
                    end: transform.apply(line.end),
                    ..line.clone()
                }),
                Entity::Circle(circle) => match transform.uniform_scale() {
                    Some(scale) => Entity::Circle(Circle {
                        center: transform.apply(circle.center),
                        radius: circle.radius * scale,
                        ..circle.clone()
                    }),
                    None => Entity::Other(OtherEntity {
                        dxf_type: "ELLIPSE".to_string(),
                        layer: circle.layer.clone(),
                        color: circle.color,
                    }),
                },
                Entity::Arc(arc) => match transform.uniform_scale() {
                    Some(scale) => {
                        let rotation = transform.rotation();
                        // 镜像时角度取反且扫掠方向反转，交换起止角保持逆时针约定。
                        let (start_angle, end_angle) = if transform.is_mirrored() {
                            (rotation - arc.end_angle, rotation - arc.start_angle)
                        } else {
                            (arc.start_angle + rotation, arc.end_angle + rotation)
                        };
                        Entity::Arc(Arc {
                            center: transform.apply(arc.center),
                            radius: arc.radius * scale,
                            start_angle,
                            end_angle,
                            ..arc.clone()
                        })
                    }
                    None => Entity::Other(OtherEntity {
                        dxf_type: "ELLIPSE".to_string(),
                        layer: arc.layer.clone(),
                        color: arc.color,
                    }),
                },
                Entity::LwPolyline(polyline) => {
                    Entity::LwPolyline(transform_polyline(polyline, transform))
                }
                Entity::Polyline(polyline) => {
                    Entity::Polyline(transform_polyline(polyline, transform))
                }
                Entity::Text(text) => Entity::Text(Text {
                    insert: transform.apply(text.insert),
                    height: text.height.map(|height| height * transform.y_scale()),
                    rotation: text.rotation + transform.rotation(),
                    ..text.clone()
                }),
                Entity::MText(mtext) => Entity::MText(MText {
                    insert: transform.apply(mtext.insert),
                    height: mtext.height.map(|height| height * transform.y_scale()),
                    rotation: mtext.rotation + transform.rotation(),
                    ..mtext.clone()
                }),
                Entity::Insert(insert) => {
                    let mirror = if transform.is_mirrored() { -1.0 } else { 1.0 };
                    Entity::Insert(Insert {
                        insert: transform.apply(insert.insert),
                        scale: Vector2::new(
                            insert.scale.x() * transform.x_scale(),
                            insert.scale.y() * transform.y_scale() * mirror,
                        ),
                        rotation: insert.rotation + transform.rotation(),
                        ..insert.clone()
                    })
                }
                Entity::Other(other) => Entity::Other(other.clone()),
            }
        }
    }

    fn transform_polyline(polyline: &Polyline, transform: &Transform2) -> Polyline {
        let bulge_sign = if transform.is_mirrored() { -1.0 } else { 1.0 };
        Polyline {
            vertices: polyline
                .vertices
                .iter()
                .map(|vertex| {
                    PolylineVertex::with_bulge(
                        transform.apply(vertex.position),
                        vertex.bulge * bulge_sign,
                    )
                })
                .collect(),
            ..polyline.clone()
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct BlockDefinition {
        pub name: String,
        pub base_point: Point2,
        pub entities: Vec<Entity>,
    }

    impl BlockDefinition {
        pub fn new(name: impl Into<String>, base_point: Point2) -> Self {
            Self {
                name: name.into(),
                base_point,
                entities: Vec::new(),
            }
        }

        pub fn with_entities(mut self, entities: impl IntoIterator<Item = Entity>) -> Self {
            self.entities.extend(entities);
            self
        }
    }

    /// 文件级元数据，来自 DXF 头段。
    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    pub struct DrawingMetadata {
        pub dxf_version: Option<String>,
        pub units: Option<String>,
    }

    #[derive(Debug, Error, Clone, PartialEq)]
    pub enum ExpandError {
        #[error("block definition {0:?} not found")]
        MissingBlock(String),
        #[error("block {0:?} references itself")]
        CyclicReference(String),
        #[error("block {name:?} exceeds nesting limit of {limit}")]
        DepthExceeded { name: String, limit: usize },
    }

    /// 只读图纸：模型空间实体 + 块定义表。块名大小写不敏感。
    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    pub struct Drawing {
        entities: Vec<Entity>,
        blocks: HashMap<String, BlockDefinition>,
        #[serde(default)]
        metadata: DrawingMetadata,
    }

    impl Drawing {
        pub fn new() -> Self {
            Self::default()
        }

        #[inline]
        pub fn push(&mut self, entity: Entity) {
            self.entities.push(entity);
        }

        pub fn add_line(&mut self, start: Point2, end: Point2, layer: impl Into<String>) {
            self.push(Entity::Line(Line {
                start,
                end,
                layer: layer.into(),
                color: None,
            }));
        }

        pub fn add_circle(&mut self, center: Point2, radius: f64, layer: impl Into<String>) {
            self.push(Entity::Circle(Circle {
                center,
                radius,
                layer: layer.into(),
                color: None,
            }));
        }

        pub fn add_arc(
            &mut self,
            center: Point2,
            radius: f64,
            start_angle: f64,
            end_angle: f64,
            layer: impl Into<String>,
        ) {
            self.push(Entity::Arc(Arc {
                center,
                radius,
                start_angle,
                end_angle,
                layer: layer.into(),
                color: None,
            }));
        }

        pub fn add_polyline<I>(&mut self, vertices: I, is_closed: bool, layer: impl Into<String>)
        where
            I: IntoIterator<Item = Point2>,
        {
            self.push(Entity::LwPolyline(Polyline {
                vertices: vertices.into_iter().map(PolylineVertex::new).collect(),
                is_closed,
                layer: layer.into(),
                color: None,
            }));
        }

        pub fn add_text(
            &mut self,
            insert: Point2,
            content: impl Into<String>,
            height: f64,
            rotation: f64,
            layer: impl Into<String>,
        ) {
            self.push(Entity::Text(Text {
                insert,
                content: content.into(),
                height: Some(height),
                rotation,
                layer: layer.into(),
                color: None,
            }));
        }

        pub fn add_mtext(
            &mut self,
            insert: Point2,
            content: impl Into<String>,
            height: f64,
            layer: impl Into<String>,
        ) {
            self.push(Entity::MText(MText {
                insert,
                content: content.into(),
                height: Some(height),
                rotation: 0.0,
                layer: layer.into(),
                color: None,
            }));
        }

        pub fn add_insert(
            &mut self,
            block_name: impl Into<String>,
            insert: Point2,
            scale: Vector2,
            rotation: f64,
            layer: impl Into<String>,
        ) {
            self.push(Entity::Insert(Insert {
                block_name: block_name.into(),
                insert,
                scale,
                rotation,
                layer: layer.into(),
                color: None,
            }));
        }

        pub fn add_block(&mut self, definition: BlockDefinition) {
            self.blocks.insert(block_key(&definition.name), definition);
        }

        pub fn block(&self, name: &str) -> Option<&BlockDefinition> {
            self.blocks.get(&block_key(name))
        }

        pub fn blocks(&self) -> impl Iterator<Item = &BlockDefinition> {
            self.blocks.values()
        }

        /// 模型空间实体（块参照未展开）。
        pub fn entities(&self) -> impl Iterator<Item = &Entity> {
            self.entities.iter()
        }

        #[inline]
        pub fn metadata(&self) -> &DrawingMetadata {
            &self.metadata
        }

        pub fn set_metadata(&mut self, metadata: DrawingMetadata) {
            self.metadata = metadata;
        }

        /// 遍历模型空间，块参照先产出展开后的虚拟实体，再产出自身。
        ///
        /// 展开失败的块参照只产出自身，不会中断遍历。
        pub fn entities_with_virtual(&self) -> impl Iterator<Item = Cow<'_, Entity>> + '_ {
            self.entities.iter().flat_map(move |entity| {
                let expanded = match entity {
                    Entity::Insert(insert) => self.virtual_entities(insert),
                    _ => Vec::new(),
                };
                expanded
                    .into_iter()
                    .map(Cow::Owned)
                    .chain(std::iter::once(Cow::Borrowed(entity)))
            })
        }

        /// 与 [`Drawing::expand_insert`] 相同，但吞掉错误。
        pub fn virtual_entities(&self, insert: &Insert) -> Vec<Entity> {
            match self.expand_insert(insert) {
                Ok(entities) => entities,
                Err(err) => {
                    debug!(block = %insert.block_name, error = %err, "块参照无法展开，按原样保留");
                    Vec::new()
                }
            }
        }

        /// 按块参照的变换展开块定义，嵌套块参照递归展开。
        ///
        /// 嵌套层级超过 [`MAX_INSERT_DEPTH`] 或出现循环引用时，该层停止展开，
        /// 只保留嵌套块参照本身。
        pub fn expand_insert(&self, insert: &Insert) -> Result<Vec<Entity>, ExpandError> {
            let block = self
                .block(&insert.block_name)
                .ok_or_else(|| ExpandError::MissingBlock(insert.block_name.clone()))?;
            let placement = insert.placement(block.base_point);
            let mut chain = vec![block_key(&block.name)];
            let mut expanded = Vec::with_capacity(block.entities.len());
            self.expand_block(
                block,
                &placement,
                (&insert.layer, insert.color),
                &mut chain,
                &mut expanded,
            );
            Ok(expanded)
        }

        fn expand_block(
            &self,
            block: &BlockDefinition,
            placement: &Transform2,
            owner: (&str, Option<i16>),
            chain: &mut Vec<String>,
            out: &mut Vec<Entity>,
        ) {
            for child in &block.entities {
                let mut virtual_entity = child.transformed(placement);
                virtual_entity.inherit_block_properties(owner.0, owner.1);
                if let Entity::Insert(nested) = child {
                    match self.nested_block(nested, chain) {
                        Ok(nested_block) => {
                            let nested_placement =
                                placement.then(&nested.placement(nested_block.base_point));
                            let nested_owner =
                                (virtual_entity.layer_name().to_string(), virtual_entity.color());
                            chain.push(block_key(&nested_block.name));
                            self.expand_block(
                                nested_block,
                                &nested_placement,
                                (&nested_owner.0, nested_owner.1),
                                chain,
                                out,
                            );
                            chain.pop();
                        }
                        Err(err) => {
                            debug!(
                                block = %nested.block_name,
                                depth = chain.len(),
                                error = %err,
                                "停止展开嵌套块参照"
                            );
                        }
                    }
                }
                out.push(virtual_entity);
            }
        }

        fn nested_block(
            &self,
            nested: &Insert,
            chain: &[String],
        ) -> Result<&BlockDefinition, ExpandError> {
            let key = block_key(&nested.block_name);
            if chain.contains(&key) {
                return Err(ExpandError::CyclicReference(nested.block_name.clone()));
            }
            if chain.len() >= MAX_INSERT_DEPTH {
                return Err(ExpandError::DepthExceeded {
                    name: nested.block_name.clone(),
                    limit: MAX_INSERT_DEPTH,
                });
            }
            self.block(&nested.block_name)
                .ok_or_else(|| ExpandError::MissingBlock(nested.block_name.clone()))
        }
    }

    #[inline]
    fn block_key(name: &str) -> String {
        name.to_ascii_uppercase()
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::f64::consts::{FRAC_PI_2, PI};

        fn square_block(name: &str) -> BlockDefinition {
            BlockDefinition::new(name, Point2::new(0.0, 0.0)).with_entities([
                Entity::Line(Line {
                    start: Point2::new(0.0, 0.0),
                    end: Point2::new(10.0, 0.0),
                    layer: DEFAULT_LAYER.to_string(),
                    color: Some(COLOR_BY_BLOCK),
                }),
                Entity::Circle(Circle {
                    center: Point2::new(5.0, 5.0),
                    radius: 2.0,
                    layer: "FIXED".to_string(),
                    color: Some(3),
                }),
            ])
        }

        fn insert_of(name: &str, at: Point2, scale: Vector2, rotation: f64) -> Insert {
            Insert {
                block_name: name.to_string(),
                insert: at,
                scale,
                rotation,
                layer: "DOORS".to_string(),
                color: Some(1),
            }
        }

        #[test]
        fn expand_insert_applies_placement_and_inherits_properties() {
            let mut drawing = Drawing::new();
            drawing.add_block(square_block("Door"));
            let insert = insert_of("DOOR", Point2::new(100.0, 50.0), Vector2::new(2.0, 2.0), FRAC_PI_2);

            let expanded = drawing.expand_insert(&insert).expect("block should expand");
            assert_eq!(expanded.len(), 2);

            match &expanded[0] {
                Entity::Line(line) => {
                    assert!((line.start.x() - 100.0).abs() < 1e-9);
                    assert!((line.start.y() - 50.0).abs() < 1e-9);
                    assert!((line.end.x() - 100.0).abs() < 1e-9);
                    assert!((line.end.y() - 70.0).abs() < 1e-9);
                    assert_eq!(line.layer, "DOORS");
                    assert_eq!(line.color, Some(1));
                }
                other => panic!("expected line, got {other:?}"),
            }
            match &expanded[1] {
                Entity::Circle(circle) => {
                    assert!((circle.radius - 4.0).abs() < 1e-9);
                    assert!((circle.center.x() - 90.0).abs() < 1e-9);
                    assert!((circle.center.y() - 60.0).abs() < 1e-9);
                    assert_eq!(circle.layer, "FIXED");
                    assert_eq!(circle.color, Some(3));
                }
                other => panic!("expected circle, got {other:?}"),
            }
        }

        #[test]
        fn base_point_is_moved_to_insert_point() {
            let mut drawing = Drawing::new();
            drawing.add_block(
                BlockDefinition::new("B", Point2::new(5.0, 5.0)).with_entities([Entity::Line(
                    Line {
                        start: Point2::new(5.0, 5.0),
                        end: Point2::new(6.0, 5.0),
                        layer: "L".to_string(),
                        color: None,
                    },
                )]),
            );
            let insert = insert_of("B", Point2::new(0.0, 0.0), Vector2::new(1.0, 1.0), 0.0);
            let expanded = drawing.expand_insert(&insert).unwrap();
            match &expanded[0] {
                Entity::Line(line) => {
                    assert!(line.start.x().abs() < 1e-9);
                    assert!(line.start.y().abs() < 1e-9);
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        #[test]
        fn non_uniform_scale_turns_circles_into_unsupported_ellipses() {
            let mut drawing = Drawing::new();
            drawing.add_block(square_block("Door"));
            let insert = insert_of("Door", Point2::new(0.0, 0.0), Vector2::new(1.0, 3.0), 0.0);
            let expanded = drawing.expand_insert(&insert).unwrap();
            assert_eq!(expanded[1].kind(), EntityKind::Other);
            assert_eq!(expanded[1].dxf_type(), "ELLIPSE");
            assert!(!expanded[1].kind().is_renderable());
        }

        #[test]
        fn mirrored_arc_keeps_counter_clockwise_sweep() {
            let arc = Entity::Arc(Arc {
                center: Point2::new(0.0, 0.0),
                radius: 1.0,
                start_angle: 0.0,
                end_angle: FRAC_PI_2,
                layer: "0".to_string(),
                color: None,
            });
            let mirror = Transform2::placement(
                Point2::new(0.0, 0.0),
                Vector2::new(-1.0, 1.0),
                0.0,
                Point2::new(0.0, 0.0),
            );
            match arc.transformed(&mirror) {
                Entity::Arc(mirrored) => {
                    // 第一象限的圆弧镜像到第二象限：90° → 180°
                    let start = mirrored.start_angle.rem_euclid(2.0 * PI);
                    let end = mirrored.end_angle.rem_euclid(2.0 * PI);
                    assert!((start - FRAC_PI_2).abs() < 1e-9, "start = {start}");
                    assert!((end - PI).abs() < 1e-9, "end = {end}");
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        #[test]
        fn nested_inserts_expand_recursively() {
            let mut drawing = Drawing::new();
            drawing.add_block(square_block("Leaf"));
            drawing.add_block(
                BlockDefinition::new("Parent", Point2::new(0.0, 0.0)).with_entities([
                    Entity::Insert(insert_of(
                        "Leaf",
                        Point2::new(10.0, 0.0),
                        Vector2::new(1.0, 1.0),
                        0.0,
                    )),
                ]),
            );
            let insert = insert_of("Parent", Point2::new(0.0, 100.0), Vector2::new(1.0, 1.0), 0.0);
            let expanded = drawing.expand_insert(&insert).unwrap();
            // 叶子块两个实体 + 嵌套块参照本身
            assert_eq!(expanded.len(), 3);
            assert_eq!(expanded[2].kind(), EntityKind::Insert);
            match &expanded[0] {
                Entity::Line(line) => {
                    assert!((line.start.x() - 10.0).abs() < 1e-9);
                    assert!((line.start.y() - 100.0).abs() < 1e-9);
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        #[test]
        fn self_referencing_block_stops_expanding() {
            let mut drawing = Drawing::new();
            drawing.add_block(
                BlockDefinition::new("Loop", Point2::new(0.0, 0.0)).with_entities([
                    Entity::Line(Line {
                        start: Point2::new(0.0, 0.0),
                        end: Point2::new(1.0, 1.0),
                        layer: "0".to_string(),
                        color: None,
                    }),
                    Entity::Insert(insert_of(
                        "loop",
                        Point2::new(1.0, 1.0),
                        Vector2::new(1.0, 1.0),
                        0.0,
                    )),
                ]),
            );
            let insert = insert_of("Loop", Point2::new(0.0, 0.0), Vector2::new(1.0, 1.0), 0.0);
            let expanded = drawing.expand_insert(&insert).unwrap();
            assert_eq!(expanded.len(), 2);
            assert_eq!(expanded[1].kind(), EntityKind::Insert);
        }

        #[test]
        fn deep_nesting_is_capped() {
            let mut drawing = Drawing::new();
            let depth = MAX_INSERT_DEPTH + 4;
            for level in 0..depth {
                let mut block = BlockDefinition::new(format!("L{level}"), Point2::new(0.0, 0.0))
                    .with_entities([Entity::Line(Line {
                        start: Point2::new(0.0, 0.0),
                        end: Point2::new(1.0, 0.0),
                        layer: "0".to_string(),
                        color: None,
                    })]);
                if level + 1 < depth {
                    block.entities.push(Entity::Insert(insert_of(
                        &format!("L{}", level + 1),
                        Point2::new(1.0, 0.0),
                        Vector2::new(1.0, 1.0),
                        0.0,
                    )));
                }
                drawing.add_block(block);
            }
            let insert = insert_of("L0", Point2::new(0.0, 0.0), Vector2::new(1.0, 1.0), 0.0);
            let expanded = drawing.expand_insert(&insert).unwrap();
            let lines = expanded
                .iter()
                .filter(|entity| entity.kind() == EntityKind::Line)
                .count();
            assert_eq!(lines, MAX_INSERT_DEPTH);
        }

        #[test]
        fn walk_yields_virtual_entities_before_insert() {
            let mut drawing = Drawing::new();
            drawing.add_block(square_block("Door"));
            drawing.add_line(Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), "0");
            drawing.add_insert("Door", Point2::new(0.0, 0.0), Vector2::new(1.0, 1.0), 0.0, "A");
            drawing.add_insert("Missing", Point2::new(0.0, 0.0), Vector2::new(1.0, 1.0), 0.0, "A");

            let kinds: Vec<EntityKind> = drawing
                .entities_with_virtual()
                .map(|entity| entity.kind())
                .collect();
            assert_eq!(
                kinds,
                vec![
                    EntityKind::Line,
                    EntityKind::Line,
                    EntityKind::Circle,
                    EntityKind::Insert,
                    EntityKind::Insert,
                ]
            );
        }

        #[test]
        fn missing_block_is_reported() {
            let drawing = Drawing::new();
            let insert = insert_of("Nope", Point2::new(0.0, 0.0), Vector2::new(1.0, 1.0), 0.0);
            let err = drawing.expand_insert(&insert).unwrap_err();
            assert_eq!(err, ExpandError::MissingBlock("Nope".to_string()));
        }
    }
}

pub mod text {
    //! DXF 文字解码：MTEXT 格式码、`\U+XXXX` 统一码转义、`\M+nXXXX` 多字节转义以及 `%%` 特殊符号。

    use encoding_rs::{BIG5, EUC_KR, Encoding, GBK, SHIFT_JIS};

    /// 解码文字中的转义编码。无法识别的序列按原文保留。
    pub fn decode_cad_text(raw: &str) -> String {
        if !raw.contains('\\') {
            return raw.to_string();
        }
        let mut result = String::with_capacity(raw.len());
        let mut rest = raw;
        while let Some(pos) = rest.find('\\') {
            result.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            match decode_unicode_escape(tail).or_else(|| decode_mif_escape(tail)) {
                Some((decoded, consumed)) => {
                    result.push_str(&decoded);
                    rest = &tail[consumed..];
                }
                None => {
                    result.push('\\');
                    rest = &tail[1..];
                }
            }
        }
        result.push_str(rest);
        result
    }

    fn hex_digits(raw: &str, len: usize) -> Option<&str> {
        let digits = raw.get(..len)?;
        digits
            .bytes()
            .all(|byte| byte.is_ascii_hexdigit())
            .then_some(digits)
    }

    fn decode_unicode_escape(tail: &str) -> Option<(String, usize)> {
        let body = tail
            .strip_prefix("\\U+")
            .or_else(|| tail.strip_prefix("\\u+"))?;
        let digits = hex_digits(body, 4)?;
        let code = u32::from_str_radix(digits, 16).ok()?;
        let ch = char::from_u32(code)?;
        Some((ch.to_string(), 7))
    }

    fn mif_encoding(code_page: &str) -> Option<&'static Encoding> {
        match code_page {
            "1" => Some(SHIFT_JIS),
            "2" => Some(BIG5),
            "3" => Some(EUC_KR),
            "5" => Some(GBK),
            _ => None,
        }
    }

    fn decode_mif_escape(tail: &str) -> Option<(String, usize)> {
        let body = tail
            .strip_prefix("\\M+")
            .or_else(|| tail.strip_prefix("\\m+"))?;
        let encoding = mif_encoding(body.get(..1)?)?;
        let digits = hex_digits(body.get(1..)?, 4)?;
        let value = u16::from_str_radix(digits, 16).ok()?;
        let bytes = value.to_be_bytes();
        let bytes: &[u8] = if bytes[0] == 0 { &bytes[1..] } else { &bytes };
        let decoded = encoding.decode_without_bom_handling_and_without_replacement(bytes)?;
        Some((decoded.into_owned(), 8))
    }

    /// 替换 `%%c`、`%%d`、`%%p`、`%%%` 特殊符号。
    pub fn replace_special_codes(raw: &str) -> String {
        if !raw.contains("%%") {
            return raw.to_string();
        }
        let mut result = String::with_capacity(raw.len());
        let mut rest = raw;
        while let Some(pos) = rest.find("%%") {
            result.push_str(&rest[..pos]);
            let tail = &rest[pos + 2..];
            let mut chars = tail.chars();
            let replacement = match chars.next() {
                Some('c') | Some('C') => Some('Ø'),
                Some('d') | Some('D') => Some('°'),
                Some('p') | Some('P') => Some('±'),
                Some('%') => Some('%'),
                _ => None,
            };
            match replacement {
                Some(symbol) => {
                    result.push(symbol);
                    rest = chars.as_str();
                }
                None => {
                    result.push_str("%%");
                    rest = tail;
                }
            }
        }
        result.push_str(rest);
        result
    }

    /// 去除 MTEXT 内联格式码，保留纯文本。`\U+`/`\M+` 转义在同一遍扫描中解码，
    /// 因此 `\\U+4E2D` 得到字面的 `\U+4E2D`。
    pub fn plain_mtext(raw: &str) -> String {
        let mut result = String::with_capacity(raw.len());
        let mut chars = raw.char_indices().peekable();
        while let Some((pos, ch)) = chars.next() {
            match ch {
                '{' | '}' => {}
                '^' => match chars.peek().map(|&(_, next)| next) {
                    Some('J') => {
                        chars.next();
                        result.push('\n');
                    }
                    Some('I') => {
                        chars.next();
                        result.push('\t');
                    }
                    Some(' ') => {
                        chars.next();
                        result.push('^');
                    }
                    _ => result.push('^'),
                },
                '\\' => {
                    let tail = &raw[pos..];
                    if let Some((decoded, consumed)) =
                        decode_unicode_escape(tail).or_else(|| decode_mif_escape(tail))
                    {
                        result.push_str(&decoded);
                        // 转义序列全为 ASCII，字节数即字符数
                        for _ in 1..consumed {
                            chars.next();
                        }
                        continue;
                    }
                    match chars.next().map(|(_, next)| next) {
                        Some('P') | Some('N') => result.push('\n'),
                        Some('~') => result.push(' '),
                        Some(literal @ ('\\' | '{' | '}')) => result.push(literal),
                        Some('S') => {
                            // 堆叠分数：`\S1^2;` → `1/2`
                            for (_, next) in chars.by_ref() {
                                match next {
                                    ';' => break,
                                    '^' | '#' | '/' => result.push('/'),
                                    other => result.push(other),
                                }
                            }
                        }
                        Some('A' | 'C' | 'c' | 'F' | 'f' | 'H' | 'h' | 'Q' | 'T' | 'W' | 'p') => {
                            for (_, next) in chars.by_ref() {
                                if next == ';' {
                                    break;
                                }
                            }
                        }
                        Some('L' | 'l' | 'O' | 'o' | 'K' | 'k') => {}
                        Some(other) => {
                            result.push('\\');
                            result.push(other);
                        }
                        None => result.push('\\'),
                    }
                }
                other => result.push(other),
            }
        }
        result
    }

    fn finish(decoded: String) -> String {
        decoded.replace('\0', "").trim().to_string()
    }

    /// 单行文字的展示文本：特殊符号、转义解码，去掉 NUL 并裁剪空白。
    pub fn clean_text(raw: &str) -> String {
        finish(decode_cad_text(&replace_special_codes(raw)))
    }

    /// 多行文字的展示文本：去格式码并解码转义后替换特殊符号，结果不再二次解码。
    pub fn clean_mtext(raw: &str) -> String {
        finish(replace_special_codes(&plain_mtext(raw)))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn unicode_escapes_are_decoded() {
            assert_eq!(decode_cad_text("\\U+4E2D\\U+6587"), "中文");
            assert_eq!(decode_cad_text("门\\U+7A97"), "门窗");
        }

        #[test]
        fn mif_escapes_are_decoded_with_code_page() {
            // GBK 0xD6D0 = “中”
            assert_eq!(decode_cad_text("\\M+5D6D0"), "中");
        }

        #[test]
        fn malformed_escapes_fall_back_to_raw_text() {
            assert_eq!(decode_cad_text("C:\\Users"), "C:\\Users");
            assert_eq!(decode_cad_text("\\U+ZZZZ"), "\\U+ZZZZ");
            assert_eq!(decode_cad_text("\\U++123"), "\\U++123");
            assert_eq!(decode_cad_text("\\M+9ABCD"), "\\M+9ABCD");
            assert_eq!(decode_cad_text("trailing\\"), "trailing\\");
        }

        #[test]
        fn mtext_formatting_is_stripped() {
            assert_eq!(plain_mtext("Line1\\PLine2"), "Line1\nLine2");
            assert_eq!(
                plain_mtext("{\\fSimSun|b0|i0|c134;\\H2.5;客厅}"),
                "客厅"
            );
            assert_eq!(plain_mtext("\\S1^2;"), "1/2");
            assert_eq!(plain_mtext("a\\~b\\\\c"), "a b\\c");
            assert_eq!(plain_mtext("\\LUnder\\l"), "Under");
            assert_eq!(plain_mtext("\\U+4E2D"), "中");
        }

        #[test]
        fn escaped_backslash_keeps_unicode_escape_literal() {
            assert_eq!(plain_mtext("\\\\U+4E2D"), "\\U+4E2D");
            assert_eq!(clean_mtext("\\\\U+4E2D"), "\\U+4E2D");
            assert_eq!(clean_mtext("\\\\M+5D6D0"), "\\M+5D6D0");
            assert_eq!(clean_mtext("{\\H2.5;\\U+4E2D\\M+5D6D0}"), "中中");
            assert_eq!(clean_mtext("D\\\\\\U+4E2D"), "D\\中");
        }

        #[test]
        fn clean_text_handles_special_codes_and_nul() {
            assert_eq!(clean_text("  %%c100\0 "), "Ø100");
            assert_eq!(clean_text("45%%d"), "45°");
            assert_eq!(clean_text("%%p5"), "±5");
            assert_eq!(clean_text("50%%"), "50%%");
            assert_eq!(clean_mtext("{\\C1;\\U+5899}\\P"), "墙");
        }
    }
}
