//! Radar sweep records: product table, data model and the moment decoder.

pub mod decode;
pub mod product;
pub mod synthetic;
pub mod types;

pub use decode::{decode, decode_for, peek_header, DecodeError};
pub use product::{Calibration, ProductType};
pub use types::{DecodedMoment, Gate, RadarSweep, RadialRecord, SiteId, SweepHeader, SweepKey};
