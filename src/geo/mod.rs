//! Map geometry: Web Mercator projection and overlay layers.

pub mod layer;
pub mod projection;
mod renderer;

pub use layer::{OverlayError, OverlayKind, OverlayLayer, OverlayLine, OverlaySet};
pub use projection::{lon_lat_to_world, world_to_lon_lat, WorldBounds};
pub use renderer::paint_overlays;
