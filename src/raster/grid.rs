//! Polar grid geometry.
//!
//! A sweep's gate quads are bounded by *edge columns*: geodesic rays from the
//! site along a fixed azimuth, sampled at every gate boundary (ring). Two
//! adjacent radials reference the same column for their shared edge, so the
//! vertices on either side of the seam are computed once and are bitwise
//! identical.
//!
//! Columns depend only on the site location, the radial azimuths/spacings and
//! the range layout, which rarely change between sweeps of the same site.
//! [`GridCache`] keeps recently built geometries keyed on exactly those inputs.

use crate::geo::projection::lon_lat_to_world;
use crate::radar::types::RadialRecord;
use geo_types::Coord;
use geographiclib_rs::{DirectGeodesic, Geodesic};
use glam::DVec2;
use rayon::prelude::*;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Azimuths and spacings are keyed at 0.01 degree resolution.
pub const AZIMUTH_STEPS_PER_DEG: f64 = 100.0;

/// Widest angular span drawn as a single straight-edged quad.
pub const MAX_SEGMENT_DEG: f64 = 1.0;

/// Default number of geometries kept by [`GridCache`].
pub const DEFAULT_GRID_CACHE_CAPACITY: usize = 8;

/// Range sampling of a radial: where its gates start, how far apart they
/// are, and how many there are.
#[derive(Debug, Clone, Copy)]
pub struct RangeLayout {
    pub first_gate_m: f32,
    pub gate_spacing_m: f32,
    pub gate_count: u16,
}

impl RangeLayout {
    pub fn of(radial: &RadialRecord) -> Self {
        Self {
            first_gate_m: radial.first_gate_m().unwrap_or(0.0),
            gate_spacing_m: radial.gate_spacing_m().unwrap_or(0.0),
            gate_count: radial.gate_count().min(u16::MAX as usize) as u16,
        }
    }

    /// Number of gate boundaries (one more than the gate count).
    pub fn ring_count(&self) -> usize {
        if self.gate_count == 0 {
            0
        } else {
            self.gate_count as usize + 1
        }
    }

    /// Range of boundary `ring` in metres. Ring `k` is the inner edge of
    /// gate `k`; gate centers sit halfway between consecutive rings.
    pub fn ring_radius(&self, ring: usize) -> f64 {
        let first = self.first_gate_m as f64;
        let spacing = self.gate_spacing_m as f64;
        (first - spacing / 2.0 + ring as f64 * spacing).max(0.0)
    }

    fn bits(&self) -> (u32, u32, u16) {
        (
            self.first_gate_m.to_bits(),
            self.gate_spacing_m.to_bits(),
            self.gate_count,
        )
    }
}

impl PartialEq for RangeLayout {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for RangeLayout {}

impl Hash for RangeLayout {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

/// One radial's slot in a geometry key, in quantized units.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RadialSlot {
    azimuth_q: i32,
    spacing_q: i32,
    layout: RangeLayout,
}

impl RadialSlot {
    fn azimuth_deg(&self) -> f64 {
        self.azimuth_q as f64 / AZIMUTH_STEPS_PER_DEG
    }

    fn spacing_deg(&self) -> f64 {
        self.spacing_q as f64 / AZIMUTH_STEPS_PER_DEG
    }
}

/// Everything a sweep geometry depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeometryKey {
    origin_bits: (u64, u64),
    slots: Vec<RadialSlot>,
}

impl GeometryKey {
    /// Builds a key for radials already sorted by azimuth.
    pub fn new(origin: Coord<f64>, sorted: &[&RadialRecord]) -> Self {
        let quantize = |deg: f32| (deg as f64 * AZIMUTH_STEPS_PER_DEG).round() as i32;
        Self {
            origin_bits: (origin.x.to_bits(), origin.y.to_bits()),
            slots: sorted
                .iter()
                .map(|r| RadialSlot {
                    azimuth_q: quantize(r.azimuth_deg),
                    spacing_q: quantize(r.azimuth_spacing_deg).max(1),
                    layout: RangeLayout::of(r),
                })
                .collect(),
        }
    }

    pub fn origin(&self) -> Coord<f64> {
        Coord {
            x: f64::from_bits(self.origin_bits.0),
            y: f64::from_bits(self.origin_bits.1),
        }
    }

    pub fn radial_count(&self) -> usize {
        self.slots.len()
    }
}

/// A geodesic ray from the site, sampled at one range layout's rings.
#[derive(Debug, Clone)]
pub struct EdgeColumn {
    pub azimuth_deg: f64,
    /// World-space position of each ring boundary, innermost first.
    pub points: Vec<DVec2>,
}

/// The columns bounding one radial, left (counter-clockwise) to right.
///
/// Empty for radials without gates.
#[derive(Debug, Clone)]
pub struct RadialGeometry {
    pub columns: Vec<u32>,
    pub layout: RangeLayout,
}

impl RadialGeometry {
    /// Number of angular segments the radial is drawn with.
    pub fn segments(&self) -> usize {
        self.columns.len().saturating_sub(1)
    }
}

/// Gate boundary geometry for a whole sweep, in azimuth order.
#[derive(Debug, Clone)]
pub struct SweepGeometry {
    pub origin: Coord<f64>,
    pub origin_world: DVec2,
    pub columns: Vec<EdgeColumn>,
    pub radials: Vec<RadialGeometry>,
}

impl SweepGeometry {
    /// Computes the geometry described by `key`.
    pub fn build(key: &GeometryKey) -> Self {
        let origin = key.origin();
        let slots: Vec<(f64, f64)> = key
            .slots
            .iter()
            .map(|s| (s.azimuth_deg(), s.spacing_deg()))
            .collect();
        let edges = radial_edges(&slots);

        let mut column_index: HashMap<(u64, RangeLayout), u32> = HashMap::new();
        let mut column_specs: Vec<(f64, RangeLayout)> = Vec::new();
        let mut radials = Vec::with_capacity(key.slots.len());

        for (slot, &(left, right)) in key.slots.iter().zip(&edges) {
            let layout = slot.layout;
            if layout.gate_count == 0 {
                radials.push(RadialGeometry {
                    columns: Vec::new(),
                    layout,
                });
                continue;
            }

            let mut width = (right - left).rem_euclid(360.0);
            if width == 0.0 {
                width = 360.0;
            }
            let segments = (width / MAX_SEGMENT_DEG).ceil().max(1.0) as usize;

            let mut columns = Vec::with_capacity(segments + 1);
            for j in 0..=segments {
                let azimuth = match j {
                    0 => left,
                    j if j == segments => right,
                    j => left + width * j as f64 / segments as f64,
                };
                let id = azimuth.rem_euclid(360.0).to_bits();
                let index = *column_index.entry((id, layout)).or_insert_with(|| {
                    column_specs.push((azimuth, layout));
                    (column_specs.len() - 1) as u32
                });
                columns.push(index);
            }
            radials.push(RadialGeometry { columns, layout });
        }

        let geodesic = Geodesic::wgs84();
        let columns = column_specs
            .par_iter()
            .map(|&(azimuth, layout)| EdgeColumn {
                azimuth_deg: azimuth,
                points: (0..layout.ring_count())
                    .map(|ring| {
                        project(&geodesic, origin, azimuth, layout.ring_radius(ring))
                    })
                    .collect(),
            })
            .collect();

        Self {
            origin,
            origin_world: lon_lat_to_world(origin),
            columns,
            radials,
        }
    }

    /// World position of boundary `ring` on `column`.
    #[inline]
    pub fn vertex(&self, column: u32, ring: usize) -> DVec2 {
        self.columns[column as usize].points[ring]
    }
}

/// Geographic position at `range_m` along `azimuth_deg` from `origin`.
pub fn destination(
    geodesic: &Geodesic,
    origin: Coord<f64>,
    azimuth_deg: f64,
    range_m: f64,
) -> Coord<f64> {
    let (lat, lon): (f64, f64) = geodesic.direct(origin.y, origin.x, azimuth_deg, range_m);
    Coord { x: lon, y: lat }
}

fn project(geodesic: &Geodesic, origin: Coord<f64>, azimuth_deg: f64, range_m: f64) -> DVec2 {
    lon_lat_to_world(destination(geodesic, origin, azimuth_deg, range_m))
}

/// Computes the (left, right) edge azimuth of each radial.
///
/// `radials` holds (center azimuth, spacing) pairs sorted by azimuth. Two
/// neighbours whose center gap is within half the narrower spacing of the
/// expected gap are contiguous: they share one edge, placed so each keeps
/// its share of the gap. Otherwise each radial keeps its own half-width and
/// the gap stays empty. The last radial neighbours the first across north.
pub fn radial_edges(radials: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let n = radials.len();
    let mut left = vec![0.0; n];
    let mut right = vec![0.0; n];

    for i in 0..n {
        let next = (i + 1) % n;
        let (az_a, sp_a) = radials[i];
        let (az_b, sp_b) = radials[next];
        let gap = if next == i {
            360.0
        } else {
            (az_b - az_a).rem_euclid(360.0)
        };
        let expected = (sp_a + sp_b) / 2.0;
        if (gap - expected).abs() <= sp_a.min(sp_b) / 2.0 {
            let edge = az_a + gap * sp_a / (sp_a + sp_b);
            right[i] = edge;
            left[next] = edge;
        } else {
            right[i] = az_a + sp_a / 2.0;
            left[next] = az_b - sp_b / 2.0;
        }
    }

    left.into_iter().zip(right).collect()
}

/// Bounded FIFO cache of sweep geometries, shared by all workers.
pub struct GridCache {
    entries: Mutex<VecDeque<(GeometryKey, Arc<SweepGeometry>)>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for GridCache {
    fn default() -> Self {
        Self::new(DEFAULT_GRID_CACHE_CAPACITY)
    }
}

impl GridCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the cached geometry for `key`, building it on a miss.
    ///
    /// The build runs outside the lock; two workers missing on the same key
    /// at once both build it and the second insert is dropped.
    pub fn get_or_build(&self, key: GeometryKey) -> Arc<SweepGeometry> {
        if let Some(geometry) = self.lookup(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return geometry;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let geometry = Arc::new(SweepGeometry::build(&key));
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if !entries.iter().any(|(k, _)| *k == key) {
            if entries.len() >= self.capacity {
                entries.pop_front();
            }
            log::debug!(
                "GridCache: built geometry for {} radials ({} cached)",
                key.radial_count(),
                entries.len() + 1
            );
            entries.push_back((key, geometry.clone()));
        }
        geometry
    }

    fn lookup(&self, key: &GeometryKey) -> Option<Arc<SweepGeometry>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, geometry)| geometry.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (hits, misses) since creation.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}
