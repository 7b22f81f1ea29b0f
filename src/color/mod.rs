//! Color Table Mapper: per-product threshold palettes.

pub mod pal_file;
pub mod palettes;
pub mod table;

pub use pal_file::load_color_table;
pub use table::{
    colorize, ColorStop, ColorTable, ColorTableError, ColorTableSet, RANGE_FOLDED_COLOR,
};
