use std::fs;
use std::path::{Path, PathBuf};

use cadview_config::AppConfig;
use cadview_core::document::Drawing;
use cadview_io::{DocumentLoader, DxfFacade};
use tracing::{info, warn};

use crate::errors::ToolError;

/// 加载后的图纸与来源信息。
#[derive(Debug)]
pub struct LoadedDrawing {
    pub drawing: Drawing,
    pub path: PathBuf,
}

impl LoadedDrawing {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn file_size(&self) -> Result<u64, ToolError> {
        fs::metadata(&self.path)
            .map(|meta| meta.len())
            .map_err(|source| ToolError::FileInfo {
                path: self.path.clone(),
                source,
            })
    }
}

/// 每次请求重新读取 DXF，不做跨请求缓存。
pub fn load_drawing(loader: &impl DocumentLoader, path: &Path) -> Result<LoadedDrawing, ToolError> {
    let drawing = loader.load(path)?;
    info!(path = %path.display(), "图纸加载完成");
    Ok(LoadedDrawing {
        drawing,
        path: path.to_path_buf(),
    })
}

/// 使用默认 DXF 读取器加载。
pub fn load_dxf(path: &Path) -> Result<LoadedDrawing, ToolError> {
    load_drawing(&DxfFacade::new(), path)
}

/// 读取配置：显式路径优先，否则自动发现；失败时回退到默认配置。
pub fn load_app_config(override_path: Option<&Path>) -> AppConfig {
    let loaded = match override_path {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::discover(),
    };
    match loaded {
        Ok(cfg) => cfg,
        Err(err) => {
            warn!(error = %err, "读取配置失败，使用默认配置");
            AppConfig::default()
        }
    }
}
