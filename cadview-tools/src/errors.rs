use std::path::PathBuf;

use cadview_engine::EngineError;
use cadview_io::IoError;
use cadview_render::RenderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("加载图纸失败: {0}")]
    Load(#[from] IoError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("渲染失败: {0}")]
    Render(#[from] RenderError),
    #[error("读取文件信息 {path:?} 失败: {source}")]
    FileInfo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
