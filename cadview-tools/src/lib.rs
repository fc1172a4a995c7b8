pub mod errors;
pub mod loader;
pub mod preview;
pub mod records;
pub mod toolkit;

pub use errors::ToolError;
pub use loader::{LoadedDrawing, load_app_config, load_drawing, load_dxf};
pub use records::{
    BoundsRecord, BoundsSummary, InspectRecord, MetadataRecord, RenderRecord, ToolReply,
};
pub use toolkit::{CadToolkit, InspectParams};
