//! Type definitions for decoded radar sweeps.
//!
//! A [`RadarSweep`] is produced by the decoder, handed to the rasterizer
//! and then dropped; only the rasterized buffer outlives it.

use super::product::ProductType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Four-letter radar site identifier (e.g., "KLSX").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SiteId(String);

impl SiteId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Fixed four-byte representation used in sweep headers.
    pub fn to_header_bytes(&self) -> [u8; 4] {
        let mut out = [b' '; 4];
        for (dst, src) in out.iter_mut().zip(self.0.bytes()) {
            *dst = src;
        }
        out
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SiteId {
    fn from(value: &str) -> Self {
        SiteId::new(value)
    }
}

/// Identifies one live sweep stream: a site and the product shown for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SweepKey {
    pub site: SiteId,
    pub product: ProductType,
}

impl SweepKey {
    pub fn new(site: impl Into<SiteId>, product: ProductType) -> Self {
        Self {
            site: site.into(),
            product,
        }
    }
}

impl fmt::Display for SweepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.site, self.product)
    }
}

/// A decoded moment value for a single gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecodedMoment {
    /// Physical value in the product's units.
    Value(f32),
    /// Below the product's minimum threshold, or no return at all.
    NoData,
    /// Return range exceeded the unambiguous range.
    RangeFolded,
}

impl DecodedMoment {
    pub fn value(&self) -> Option<f32> {
        match self {
            DecodedMoment::Value(v) => Some(*v),
            _ => None,
        }
    }
}

/// A single range gate along a radial.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gate {
    /// Range from the antenna to the gate center, in metres.
    pub range_m: f32,
    /// Radial extent of the gate, in metres.
    pub range_spacing_m: f32,
    /// Primary moment.
    pub moment: DecodedMoment,
    /// Secondary moment (e.g. spectrum width), when the record carries one.
    pub second: Option<DecodedMoment>,
}

/// One azimuthal slice of a sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct RadialRecord {
    /// Azimuth of the radial center in degrees clockwise from north.
    pub azimuth_deg: f32,
    /// Angular width of the radial in degrees.
    pub azimuth_spacing_deg: f32,
    pub gates: Vec<Gate>,
}

impl RadialRecord {
    pub fn gate_count(&self) -> usize {
        self.gates.len()
    }

    /// Range to the center of the first gate in metres.
    pub fn first_gate_m(&self) -> Option<f32> {
        self.gates.first().map(|g| g.range_m)
    }

    /// Gate spacing in metres (taken from the first gate).
    pub fn gate_spacing_m(&self) -> Option<f32> {
        self.gates.first().map(|g| g.range_spacing_m)
    }
}

/// Sweep-level metadata from the record header.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepHeader {
    pub site: SiteId,
    pub product: ProductType,
    pub scan_time: DateTime<Utc>,
    pub elevation_deg: f32,
    /// Site latitude in degrees.
    pub latitude: f64,
    /// Site longitude in degrees.
    pub longitude: f64,
    /// Physical value range representable by the record's codes.
    pub value_range: (f32, f32),
}

impl SweepHeader {
    pub fn key(&self) -> SweepKey {
        SweepKey::new(self.site.clone(), self.product)
    }
}

/// A fully decoded sweep. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RadarSweep {
    pub header: SweepHeader,
    pub radials: Vec<RadialRecord>,
}

impl RadarSweep {
    pub fn key(&self) -> SweepKey {
        self.header.key()
    }

    pub fn radial_count(&self) -> usize {
        self.radials.len()
    }

    /// Total number of gates across all radials.
    pub fn gate_count(&self) -> usize {
        self.radials.iter().map(RadialRecord::gate_count).sum()
    }
}
