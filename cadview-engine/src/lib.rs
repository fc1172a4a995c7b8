pub mod bounds;
pub mod inspect;
pub mod resolver;
pub mod spatial;

pub mod errors {
    use thiserror::Error;

    #[derive(Debug, Error, Clone, PartialEq)]
    pub enum EngineError {
        #[error("drawing has no renderable entities")]
        NoRenderableEntities,
        #[error("invalid region size: width={width}, height={height}")]
        InvalidRegion { width: f64, height: f64 },
    }
}

pub use bounds::{DrawingExtent, compute_bounds};
pub use errors::EngineError;
pub use inspect::{EntityQuery, extract_entities, inspect_region, summarize_layers};
pub use resolver::{bbox_of, resolve_text};
pub use spatial::{LayerFilter, Region, intersects};
