//! Weather radar sweep pipeline and tile renderer.
//!
//! Raw sweep records flow through [`radar`] (decode), [`raster`]
//! (polar-to-Cartesian geometry) and [`color`] (palettes) into GPU-ready
//! buffers published to the [`sweep_cache`]. The [`render`] module draws
//! whatever is current, using the view produced by [`camera`].

pub mod camera;
pub mod color;
pub mod data;
pub mod diagnostics;
pub mod geo;
pub mod pipeline;
pub mod radar;
pub mod raster;
pub mod render;
pub mod state;
pub mod sweep_cache;
