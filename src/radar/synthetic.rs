//! Synthetic sweep records.
//!
//! [`SweepBuilder`] encodes sweeps in the same record format the decoder
//! reads. It backs the decoder tests and the demo data source, which
//! fabricates a slowly moving storm for whichever site is selected.

use super::decode::{FLAG_SECOND_MOMENT, MAGIC};
use super::product::{reserved_folded_code, Calibration, ProductType};
use super::types::SiteId;
use chrono::{DateTime, Utc};

/// One radial to encode.
#[derive(Debug, Clone)]
pub struct RadialSpec {
    pub azimuth_deg: f32,
    pub spacing_deg: f32,
    pub first_gate_m: f32,
    pub gate_spacing_m: f32,
    pub codes: Vec<u16>,
    pub second_codes: Option<Vec<u16>>,
}

impl RadialSpec {
    pub fn new(
        azimuth_deg: f32,
        spacing_deg: f32,
        first_gate_m: f32,
        gate_spacing_m: f32,
        codes: Vec<u16>,
    ) -> Self {
        Self {
            azimuth_deg,
            spacing_deg,
            first_gate_m,
            gate_spacing_m,
            codes,
            second_codes: None,
        }
    }

    /// Attaches second-moment codes. Must match the primary gate count.
    pub fn with_second(mut self, codes: Vec<u16>) -> Self {
        self.second_codes = Some(codes);
        self
    }
}

/// Builds an encoded sweep record.
#[derive(Debug, Clone)]
pub struct SweepBuilder {
    site: SiteId,
    product: ProductType,
    version: u16,
    scan_time: DateTime<Utc>,
    elevation_deg: f32,
    latitude: f64,
    longitude: f64,
    calibration: Calibration,
    second_calibration: Option<Calibration>,
    gate_bytes: u8,
    radials: Vec<RadialSpec>,
}

impl SweepBuilder {
    pub fn new(site: impl Into<SiteId>, product: ProductType) -> Self {
        Self {
            site: site.into(),
            product,
            version: 1,
            scan_time: DateTime::<Utc>::UNIX_EPOCH,
            elevation_deg: 0.5,
            latitude: 38.6989,
            longitude: -90.6828,
            calibration: product
                .default_calibration()
                .unwrap_or(Calibration::new(1.0, 0.0, 0)),
            second_calibration: None,
            gate_bytes: product.default_gate_bytes(),
            radials: Vec::new(),
        }
    }

    pub fn calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn location(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = latitude;
        self.longitude = longitude;
        self
    }

    pub fn scan_time(mut self, scan_time: DateTime<Utc>) -> Self {
        self.scan_time = scan_time;
        self
    }

    pub fn elevation(mut self, elevation_deg: f32) -> Self {
        self.elevation_deg = elevation_deg;
        self
    }

    pub fn gate_bytes(mut self, gate_bytes: u8) -> Self {
        self.gate_bytes = gate_bytes;
        self
    }

    pub fn version(mut self, version: u16) -> Self {
        self.version = version;
        self
    }

    /// Enables the second moment block; forces a version 2 record.
    pub fn second_moment(mut self, calibration: Calibration) -> Self {
        self.second_calibration = Some(calibration);
        self.version = self.version.max(2);
        self
    }

    pub fn radial(mut self, radial: RadialSpec) -> Self {
        self.radials.push(radial);
        self
    }

    pub fn radials(mut self, radials: impl IntoIterator<Item = RadialSpec>) -> Self {
        self.radials.extend(radials);
        self
    }

    /// Encodes the record.
    pub fn encode(&self) -> Vec<u8> {
        let gate_total: usize = self.radials.iter().map(|r| r.codes.len()).sum();
        let mut out = Vec::with_capacity(64 + self.radials.len() * 18 + gate_total * 4);

        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(&self.site.to_header_bytes());
        out.extend_from_slice(&self.product.code().to_be_bytes());
        out.extend_from_slice(&self.scan_time.timestamp_millis().to_be_bytes());
        out.extend_from_slice(&((self.elevation_deg * 10.0).round() as i16).to_be_bytes());
        out.extend_from_slice(&((self.latitude * 1.0e6).round() as i32).to_be_bytes());
        out.extend_from_slice(&((self.longitude * 1.0e6).round() as i32).to_be_bytes());
        out.extend_from_slice(&self.calibration.scale.to_be_bytes());
        out.extend_from_slice(&self.calibration.offset.to_be_bytes());
        out.extend_from_slice(&self.calibration.min_code.to_be_bytes());
        out.push(self.gate_bytes);
        out.push(if self.second_calibration.is_some() {
            FLAG_SECOND_MOMENT
        } else {
            0
        });
        out.extend_from_slice(&(self.radials.len() as u16).to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes());

        if let Some(second) = &self.second_calibration {
            out.extend_from_slice(&second.scale.to_be_bytes());
            out.extend_from_slice(&second.offset.to_be_bytes());
        }

        for radial in &self.radials {
            out.extend_from_slice(&radial.azimuth_deg.to_be_bytes());
            out.extend_from_slice(&radial.spacing_deg.to_be_bytes());
            out.extend_from_slice(&radial.first_gate_m.to_be_bytes());
            out.extend_from_slice(&radial.gate_spacing_m.to_be_bytes());
            out.extend_from_slice(&(radial.codes.len() as u16).to_be_bytes());
            self.push_codes(&mut out, &radial.codes);
            if self.second_calibration.is_some() {
                let empty = vec![0; radial.codes.len()];
                let second = radial.second_codes.as_ref().unwrap_or(&empty);
                self.push_codes(&mut out, second);
            }
        }

        out
    }

    fn push_codes(&self, out: &mut Vec<u8>, codes: &[u16]) {
        for &code in codes {
            if self.gate_bytes == 1 {
                out.push(code.min(u8::MAX as u16) as u8);
            } else {
                out.extend_from_slice(&code.to_be_bytes());
            }
        }
    }
}

/// A convective cell in the demo scene, positioned relative to the site.
#[derive(Debug, Clone, Copy)]
struct Cell {
    /// Bearing from the site at phase zero, degrees.
    bearing_deg: f32,
    /// Distance from the site at phase zero, metres.
    range_m: f32,
    /// Radius of the cell core, metres.
    radius_m: f32,
    peak_dbz: f32,
}

const DEMO_CELLS: [Cell; 4] = [
    Cell { bearing_deg: 235.0, range_m: 95_000.0, radius_m: 18_000.0, peak_dbz: 62.0 },
    Cell { bearing_deg: 250.0, range_m: 140_000.0, radius_m: 30_000.0, peak_dbz: 48.0 },
    Cell { bearing_deg: 300.0, range_m: 60_000.0, radius_m: 12_000.0, peak_dbz: 55.0 },
    Cell { bearing_deg: 200.0, range_m: 180_000.0, radius_m: 45_000.0, peak_dbz: 38.0 },
];

/// Storm motion in metres per phase unit, eastward and northward.
const STORM_MOTION: (f32, f32) = (9_000.0, 4_000.0);

/// Generates a storm-like sweep for the demo data source.
///
/// `phase` advances the storm along its track; successive calls with
/// increasing phase produce an animation.
pub fn demo_sweep(
    site: &SiteId,
    product: ProductType,
    latitude: f64,
    longitude: f64,
    scan_time: DateTime<Utc>,
    phase: f32,
) -> Vec<u8> {
    const RADIALS: usize = 360;
    const FIRST_GATE_M: f32 = 2_125.0;
    const GATE_SPACING_M: f32 = 1_000.0;

    let calibration = product
        .default_calibration()
        .unwrap_or(Calibration::new(1.0, 0.0, 0));
    let gate_bytes = product.default_gate_bytes();
    let gates = (product.max_range_km() * 1000.0 / GATE_SPACING_M as f64) as usize;
    let folded = reserved_folded_code(gate_bytes);
    let max_code = folded.saturating_sub(1);

    let radials = (0..RADIALS).map(|i| {
        let azimuth = i as f32 + 0.5;
        let (sin_az, cos_az) = azimuth.to_radians().sin_cos();
        let codes = (0..gates)
            .map(|g| {
                let range = FIRST_GATE_M + g as f32 * GATE_SPACING_M;
                let (x, y) = (range * sin_az, range * cos_az);
                let dbz = scene_reflectivity(x, y, phase);
                if dbz < 5.0 {
                    return 0;
                }
                // Second-trip echo beyond the unambiguous range of the velocity scan
                if product == ProductType::Velocity && range > 230_000.0 && noise(i, g) > 0.6 {
                    return folded;
                }
                let value = product_value(product, x, y, azimuth, dbz, noise(i, g));
                calibration.quantize(value).clamp(calibration.min_code, max_code)
            })
            .collect();
        RadialSpec::new(azimuth, 1.0, FIRST_GATE_M, GATE_SPACING_M, codes)
    });

    SweepBuilder::new(site.clone(), product)
        .location(latitude, longitude)
        .scan_time(scan_time)
        .calibration(calibration)
        .gate_bytes(gate_bytes)
        .radials(radials)
        .encode()
}

fn scene_reflectivity(x: f32, y: f32, phase: f32) -> f32 {
    DEMO_CELLS
        .iter()
        .map(|cell| {
            let (s, c) = cell.bearing_deg.to_radians().sin_cos();
            let cx = cell.range_m * s + STORM_MOTION.0 * phase;
            let cy = cell.range_m * c + STORM_MOTION.1 * phase;
            let d2 = ((x - cx).powi(2) + (y - cy).powi(2)) / cell.radius_m.powi(2);
            cell.peak_dbz * (-d2).exp()
        })
        .fold(0.0, f32::max)
}

fn product_value(product: ProductType, x: f32, y: f32, azimuth: f32, dbz: f32, jitter: f32) -> f32 {
    match product {
        ProductType::Reflectivity => dbz + (jitter - 0.5) * 4.0,
        ProductType::Velocity => {
            // Uniform south-westerly flow projected onto the beam, plus a
            // rotation couplet near the strongest cell
            let (s, c) = azimuth.to_radians().sin_cos();
            let flow = 18.0 * s + 12.0 * c;
            let core = &DEMO_CELLS[0];
            let (cs, cc) = core.bearing_deg.to_radians().sin_cos();
            let dx = x - core.range_m * cs;
            let dy = y - core.range_m * cc;
            let d = (dx * dx + dy * dy).sqrt().max(1.0);
            let swirl = 30.0 * (-d / 8_000.0).exp() * (dx * c - dy * s) / d;
            flow + swirl + (jitter - 0.5) * 2.0
        }
        ProductType::SpectrumWidth => 1.0 + dbz / 10.0 + jitter * 2.0,
        ProductType::DifferentialReflectivity => (dbz - 20.0) / 12.0 + (jitter - 0.5),
        ProductType::CorrelationCoefficient => 0.99 - (dbz / 70.0).powi(3) * 0.15 - jitter * 0.02,
        ProductType::DifferentialPhase => 20.0 + dbz * 1.5 + jitter * 5.0,
        ProductType::Unknown(_) => dbz,
    }
}

/// Deterministic per-gate jitter in [0, 1).
fn noise(radial: usize, gate: usize) -> f32 {
    let mut h = (radial as u32).wrapping_mul(0x9E37_79B9) ^ (gate as u32).wrapping_mul(0x85EB_CA6B);
    h ^= h >> 15;
    h = h.wrapping_mul(0x2C1B_3C6D);
    h ^= h >> 12;
    (h & 0xFFFF) as f32 / 65_536.0
}
