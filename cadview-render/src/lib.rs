pub mod canvas;
pub mod fonts;
pub mod layout;
pub mod palette;
pub mod renderer;
mod text_layer;

pub mod errors {
    use std::path::PathBuf;

    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum RenderError {
        #[error("invalid region size: width={width}, height={height}")]
        InvalidRegion { width: f64, height: f64 },
        #[error("render backend failure: {0}")]
        Backend(String),
        #[error("failed to write image {path}: {source}")]
        Write {
            path: PathBuf,
            #[source]
            source: std::io::Error,
        },
    }
}

pub use errors::RenderError;
pub use fonts::FontSelection;
pub use palette::{ColorMode, Rgb, layer_color};
pub use renderer::{RegionRenderer, RenderRequest, RenderResult, RendererOptions};
