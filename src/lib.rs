//! Raster editing core: layered RGBA documents, brush/move/crop/selection
//! engines with undo history, CPU filters with an optional accelerator hook,
//! a `.pcore` project codec and a background-synced pixel backend.

pub mod backend;
pub mod canvas;
pub mod cli;
pub mod components;
pub mod compositor;
pub mod error;
pub mod geometry;
pub mod gpu;
pub mod io;
pub mod logger;
pub mod ops;
pub mod project;
pub mod selection;
pub mod settings;

pub use canvas::{Document, Layer, LayerId, LayerUpdate, PixelSurface};
pub use error::{EditorError, EditorResult};
pub use project::{EditorSession, Modifiers};
