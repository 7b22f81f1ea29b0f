//! Polar-to-Cartesian rasterizer and the GPU-ready buffers it feeds.

pub mod buffer;
pub mod grid;
pub mod rasterize;

pub use buffer::{BufferId, RasterBuffer, RasterTile, RasterVertex};
pub use grid::{GridCache, RangeLayout, SweepGeometry};
pub use rasterize::{rasterize, GateQuad, RasterGeometry, Rasterizer};
