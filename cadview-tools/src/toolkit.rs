use std::path::Path;

use cadview_config::AppConfig;
use cadview_engine::bounds::compute_bounds;
use cadview_engine::inspect::{EntityQuery, ExtractionResult, extract_entities, inspect_region, summarize_layers};
use cadview_engine::spatial::{LayerFilter, Region};
use cadview_render::{ColorMode, RegionRenderer, RenderRequest, RenderResult, RendererOptions};
use tracing::{debug, info, warn};

use crate::errors::ToolError;
use crate::loader::{LoadedDrawing, load_dxf};
use crate::preview::encode_preview_base64;
use crate::records::{
    BoundsQuality, BoundsRecord, BoundsSummary, FileMetadata, InspectRecord, MetadataRecord,
    RenderRecord, round_to,
};

/// 概览范围的来源说明。
pub const BOUNDS_SOURCE: &str = "renderable_entities";

/// 区域检查参数。
#[derive(Debug, Clone, PartialEq)]
pub struct InspectParams {
    pub region: Region,
    /// 正方形输出边长，缺省取配置中的宽度。
    pub output_size: Option<u32>,
    pub include_preview: bool,
}

impl InspectParams {
    pub fn new(region: Region) -> Self {
        Self {
            region,
            output_size: None,
            include_preview: false,
        }
    }
}

/// 面向技能调用的工具集合。每次调用都重新读取图纸。
#[derive(Debug)]
pub struct CadToolkit {
    config: AppConfig,
    renderer: RegionRenderer,
}

impl CadToolkit {
    pub fn new(config: AppConfig) -> Self {
        let renderer = RegionRenderer::new(RendererOptions::from(&config.render));
        Self { config, renderer }
    }

    /// 使用外部构造的渲染器（例如预置字体）。
    pub fn with_renderer(config: AppConfig, renderer: RegionRenderer) -> Self {
        Self { config, renderer }
    }

    /// 以配置中的尺寸与着色方式构造渲染请求。
    pub fn render_request(&self, region: Region) -> RenderRequest {
        let render = &self.config.render;
        let color_mode = if render.color_by_layer {
            ColorMode::ByLayer
        } else {
            ColorMode::Monochrome
        };
        RenderRequest::new(region, (render.output_width, render.output_height))
            .with_color_mode(color_mode)
            .with_aspect_ratio(render.maintain_aspect_ratio)
    }

    /// 计算可渲染实体的稳健范围。
    pub fn bounds(&self, path: &Path, layers: &LayerFilter) -> Result<BoundsRecord, ToolError> {
        let loaded = load_dxf(path)?;
        let extent = compute_bounds(loaded.drawing.entities_with_virtual(), layers)?;
        Ok(BoundsRecord::from(&extent))
    }

    /// 将指定区域渲染为 PNG。
    pub fn render(&self, path: &Path, request: &RenderRequest) -> Result<RenderRecord, ToolError> {
        let loaded = load_dxf(path)?;
        self.render_loaded(&loaded, request)
    }

    fn render_loaded(&self, loaded: &LoadedDrawing, request: &RenderRequest) -> Result<RenderRecord, ToolError> {
        let result = self.renderer.render_drawing(&loaded.drawing, request)?;
        Ok(render_record(result))
    }

    /// 渲染区域并统计区域内的实体与文字。
    pub fn inspect(&self, path: &Path, params: &InspectParams) -> Result<InspectRecord, ToolError> {
        params.region.validate()?;
        let loaded = load_dxf(path)?;
        let side = params.output_size.unwrap_or(self.config.render.output_width);
        let request = RenderRequest::new(params.region, (side, side));
        let render = self.render_loaded(&loaded, &request)?;

        let image_base64 = if params.include_preview {
            let inspect = &self.config.inspect;
            encode_preview_base64(&render.image_path, inspect.preview_max_side, inspect.preview_quality)
        } else {
            None
        };

        let contents = inspect_region(
            loaded.drawing.entities_with_virtual(),
            &params.region.to_bounds(),
            self.config.inspect.max_texts,
        );
        debug!(
            total = contents.total_count,
            texts = contents.text_count,
            "区域检查完成"
        );
        Ok(InspectRecord::new(render, contents, image_base64))
    }

    /// 按类型、图层与区域提取实体记录。`limit` 缺省取配置值。
    pub fn extract(
        &self,
        path: &Path,
        query: &EntityQuery,
        limit: Option<usize>,
    ) -> Result<ExtractionResult, ToolError> {
        if let Some(region) = query.region() {
            region.validate()?;
        }
        let loaded = load_dxf(path)?;
        let limit = limit.unwrap_or(self.config.inspect.max_entities);
        Ok(extract_entities(loaded.drawing.entities_with_virtual(), query, limit))
    }

    /// 图纸概览：文件信息、图层统计、稳健范围与缩略图。
    pub fn metadata(&self, path: &Path) -> Result<MetadataRecord, ToolError> {
        let loaded = load_dxf(path)?;
        let drawing = &loaded.drawing;
        let layers = summarize_layers(drawing.entities());
        let entity_count = drawing.entities().count();

        let extent = match compute_bounds(drawing.entities_with_virtual(), &LayerFilter::all()) {
            Ok(extent) => Some(extent),
            Err(err) => {
                debug!(error = %err, "图纸没有可用范围");
                None
            }
        };
        let bounds = extent.as_ref().map(|extent| BoundsSummary::from_bounds(&extent.bounds));

        let thumbnail = bounds.and_then(|summary| {
            let side = self.config.render.thumbnail_size;
            let request = RenderRequest::new(summary.region(), (side, side));
            match self.render_loaded(&loaded, &request) {
                Ok(record) => Some(record.image_path),
                Err(err) => {
                    warn!(path = %loaded.path.display(), error = %err, "生成缩略图失败");
                    None
                }
            }
        });

        let metadata = drawing.metadata();
        let record = MetadataRecord {
            filename: loaded.file_name(),
            file_path: loaded.path.clone(),
            metadata: FileMetadata {
                dxf_version: metadata.dxf_version.clone(),
                file_size: loaded.file_size()?,
                units: metadata.units.clone(),
            },
            bounds,
            layer_count: layers.len(),
            layers,
            entity_count,
            bounds_source: extent.map(|_| BOUNDS_SOURCE),
            bounds_quality: extent.map(|extent| BoundsQuality {
                raw_entity_count: extent.raw_entity_count,
                used_entity_count: extent.used_entity_count,
            }),
            thumbnail,
        };
        info!(
            path = %loaded.path.display(),
            entities = record.entity_count,
            layers = record.layer_count,
            "图纸概览完成"
        );
        Ok(record)
    }
}

fn render_record(result: RenderResult) -> RenderRecord {
    RenderRecord {
        image_path: result.image_path,
        actual_bbox: result.actual_region,
        scale: round_to(result.pixel_scale, 6),
        output_size: [result.output_size.0, result.output_size.1],
    }
}
