use std::borrow::Borrow;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use cadview_config::RenderConfig;
use cadview_core::document::{Drawing, Entity};
use cadview_engine::errors::EngineError;
use cadview_engine::resolver::{bbox_of, resolve_text};
use cadview_engine::spatial::{LayerFilter, Region, intersects};
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::canvas::{Canvas, DrawError};
use crate::errors::RenderError;
use crate::fonts::FontSelection;
use crate::layout::{ViewTransform, fit_output_size, font_size_px};
use crate::palette::{ColorMode, Rgb};
use crate::text_layer::{TextRun, draw_text_layer};

#[derive(Debug, Clone, PartialEq)]
pub struct RendererOptions {
    /// 未指定输出路径时图片写入的目录。
    pub output_dir: PathBuf,
    pub font_candidates: Vec<String>,
}

impl From<&RenderConfig> for RendererOptions {
    fn from(config: &RenderConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            font_candidates: config.font_candidates.clone(),
        }
    }
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self::from(&RenderConfig::default())
    }
}

/// 一次区域渲染请求。
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub region: Region,
    /// 请求的像素尺寸（宽, 高）。
    pub output_size: (u32, u32),
    pub layers: LayerFilter,
    pub color_mode: ColorMode,
    pub maintain_aspect_ratio: bool,
    pub output_path: Option<PathBuf>,
}

impl RenderRequest {
    pub fn new(region: Region, output_size: (u32, u32)) -> Self {
        Self {
            region,
            output_size,
            layers: LayerFilter::all(),
            color_mode: ColorMode::ByLayer,
            maintain_aspect_ratio: true,
            output_path: None,
        }
    }

    pub fn with_layers(mut self, layers: LayerFilter) -> Self {
        self.layers = layers;
        self
    }

    pub fn with_color_mode(mut self, color_mode: ColorMode) -> Self {
        self.color_mode = color_mode;
        self
    }

    pub fn with_aspect_ratio(mut self, maintain: bool) -> Self {
        self.maintain_aspect_ratio = maintain;
        self
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderResult {
    pub image_path: PathBuf,
    pub actual_region: Region,
    /// 水平方向每个世界单位的像素数。
    pub pixel_scale: f64,
    pub output_size: (u32, u32),
    pub drawn_entities: usize,
    pub skipped_entities: usize,
}

/// 区域渲染器。字体在第一次需要绘制文字时加载并缓存在实例中。
#[derive(Debug)]
pub struct RegionRenderer {
    options: RendererOptions,
    fonts: OnceCell<FontSelection>,
}

impl RegionRenderer {
    pub fn new(options: RendererOptions) -> Self {
        Self {
            options,
            fonts: OnceCell::new(),
        }
    }

    /// 使用预先准备好的字体，不再探测系统字体。
    pub fn with_fonts(options: RendererOptions, fonts: FontSelection) -> Self {
        Self {
            options,
            fonts: OnceCell::with_value(fonts),
        }
    }

    pub fn fonts(&self) -> &FontSelection {
        self.fonts
            .get_or_init(|| FontSelection::load_system(&self.options.font_candidates))
    }

    /// 渲染整张图纸（块参照展开）的指定区域。
    pub fn render_drawing(
        &self,
        drawing: &Drawing,
        request: &RenderRequest,
    ) -> Result<RenderResult, RenderError> {
        self.render_region(drawing.entities_with_virtual(), request)
    }

    /// 将实体流中与区域相交的实体绘制为 PNG。
    pub fn render_region<I>(&self, entities: I, request: &RenderRequest) -> Result<RenderResult, RenderError>
    where
        I: IntoIterator,
        I::Item: Borrow<Entity>,
    {
        let region = request.region;
        region.validate().map_err(|err| match err {
            EngineError::InvalidRegion { width, height } => {
                RenderError::InvalidRegion { width, height }
            }
            other => RenderError::Backend(other.to_string()),
        })?;

        let pixel_size = fit_output_size(&region, request.output_size, request.maintain_aspect_ratio);
        let view = ViewTransform::new(&region, pixel_size);
        let query = region.to_bounds();
        let mut canvas = Canvas::new(pixel_size.0, pixel_size.1)?;

        let mut runs = Vec::new();
        let mut drawn = 0usize;
        let mut skipped = 0usize;
        for item in entities {
            let entity = item.borrow();
            if !entity.kind().is_renderable() || !request.layers.accepts(entity.layer_name()) {
                continue;
            }
            if !intersects(bbox_of(entity).as_ref(), &query) {
                continue;
            }
            let color = request.color_mode.color_for(entity.layer_name());
            let outcome = match entity {
                Entity::Line(line) => canvas.draw_line(line, &view, color),
                Entity::Circle(circle) => canvas.draw_circle(circle, &view, color),
                Entity::Arc(arc) => canvas.draw_arc(arc, &view, color),
                Entity::LwPolyline(polyline) | Entity::Polyline(polyline) => {
                    canvas.draw_polyline(polyline, &view, color)
                }
                Entity::Text(_) | Entity::MText(_) => {
                    collect_text_run(entity, &view, color).map(|run| runs.extend(run))
                }
                Entity::Insert(_) | Entity::Other(_) => continue,
            };
            match outcome {
                Ok(()) => drawn += 1,
                Err(err) => {
                    skipped += 1;
                    debug!(
                        entity = entity.dxf_type(),
                        layer = entity.layer_name(),
                        error = %err,
                        "跳过无法绘制的实体"
                    );
                }
            }
        }

        if !runs.is_empty() {
            let fonts = self.fonts();
            if fonts.has_fonts() {
                draw_text_layer(&mut canvas, &runs, fonts)?;
            } else {
                warn!(texts = runs.len(), "没有可用字体，跳过文字绘制");
            }
        }

        let image_path = request
            .output_path
            .clone()
            .unwrap_or_else(|| self.default_output_path(&region));
        let png = canvas.encode_png()?;
        drop(canvas);
        write_atomically(&image_path, &png)?;

        info!(
            path = %image_path.display(),
            width = pixel_size.0,
            height = pixel_size.1,
            drawn,
            skipped,
            "区域渲染完成"
        );
        Ok(RenderResult {
            image_path,
            actual_region: region,
            pixel_scale: view.pixel_scale(),
            output_size: pixel_size,
            drawn_entities: drawn,
            skipped_entities: skipped,
        })
    }

    /// `<output_dir>/region_{x}_{y}_{w}_{h}.png`，数值向零取整。
    pub fn default_output_path(&self, region: &Region) -> PathBuf {
        self.options.output_dir.join(format!(
            "region_{}_{}_{}_{}.png",
            region.x as i64, region.y as i64, region.width as i64, region.height as i64
        ))
    }
}

impl Default for RegionRenderer {
    fn default() -> Self {
        Self::new(RendererOptions::default())
    }
}

/// 文字换算成像素坐标；空文字不产生任何内容。
fn collect_text_run(
    entity: &Entity,
    view: &ViewTransform,
    color: Rgb,
) -> Result<Option<TextRun>, DrawError> {
    let Some(text) = resolve_text(entity) else {
        return Ok(None);
    };
    if text.is_empty() {
        return Ok(None);
    }
    let (x, y) = view.to_pixel(text.insert);
    if !x.is_finite() || !y.is_finite() || !text.rotation.is_finite() {
        return Err(DrawError::NonFinite);
    }
    Ok(Some(TextRun {
        x,
        y,
        font_px: font_size_px(text.height, view.pixel_scale()),
        rotation: text.rotation,
        anchor: text.anchor,
        color,
        lines: text.lines().map(str::to_string).collect(),
    }))
}

/// 先写临时文件再原子替换，失败时不会留下残缺图片。
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), RenderError> {
    let write_error = |source: std::io::Error| RenderError::Write {
        path: path.to_path_buf(),
        source,
    };
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(write_error)?;
    let mut staging = tempfile::NamedTempFile::new_in(&parent).map_err(write_error)?;
    staging.write_all(bytes).map_err(write_error)?;
    staging.flush().map_err(write_error)?;
    staging.persist(path).map_err(|err| write_error(err.error))?;
    Ok(())
}
