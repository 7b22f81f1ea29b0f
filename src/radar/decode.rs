//! Moment decoder for raw sweep records.
//!
//! Parses the big-endian sweep record format into a [`RadarSweep`],
//! converting each raw gate code into a physical value with the record's
//! calibration. Decoding is a pure transform over a byte slice, so distinct
//! sweeps can be decoded concurrently from any number of threads.

use super::product::{reserved_folded_code, Calibration, ProductType};
use super::types::{DecodedMoment, Gate, RadarSweep, RadialRecord, SiteId, SweepHeader};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Record magic at offset zero.
pub const MAGIC: [u8; 4] = *b"RSWP";
/// Size of the fixed header in bytes.
pub const HEADER_LEN: usize = 48;
/// Size of the version 2 second-moment calibration extension.
pub const SECOND_CALIBRATION_LEN: usize = 8;
/// Size of the fixed per-radial header in bytes.
pub const RADIAL_HEADER_LEN: usize = 18;
/// Header flag: each radial carries a second moment block.
pub const FLAG_SECOND_MOMENT: u8 = 0b0000_0001;

const SUPPORTED_VERSIONS: [u16; 2] = [1, 2];

/// Errors raised while decoding a sweep record.
///
/// All variants are recoverable: the sweep is dropped and whatever was
/// displayed before stays on screen.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("unsupported record version {0}")]
    UnsupportedVersion(u16),

    #[error("truncated data: needed {needed} bytes, only {available} available")]
    TruncatedData { needed: usize, available: usize },

    #[error("invalid radial {index}: {reason}")]
    InvalidRadial { index: usize, reason: String },

    #[error("record is for {found}, expected {expected}")]
    MetadataMismatch { expected: String, found: String },
}

/// Header fields needed to walk the radial section.
#[derive(Debug, Clone)]
struct RecordLayout {
    header: SweepHeader,
    calibration: Calibration,
    second_calibration: Option<Calibration>,
    gate_bytes: u8,
    radial_count: usize,
}

/// Bounds-checked big-endian cursor.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::TruncatedData {
                needed: self.pos + n,
                available: self.data.len(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn i16(&mut self) -> Result<i16, DecodeError> {
        Ok(i16::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    fn f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_be_bytes(self.array()?))
    }
}

/// Decodes a complete sweep record.
pub fn decode(raw: &[u8]) -> Result<RadarSweep, DecodeError> {
    let mut reader = Reader::new(raw);
    let layout = read_header(&mut reader)?;

    // Every radial needs at least its fixed header; reject impossible counts
    // before allocating anything.
    let minimum = layout.radial_count * RADIAL_HEADER_LEN;
    if reader.remaining() < minimum {
        return Err(DecodeError::TruncatedData {
            needed: reader.pos + minimum,
            available: raw.len(),
        });
    }

    let mut radials = Vec::with_capacity(layout.radial_count);
    for index in 0..layout.radial_count {
        radials.push(read_radial(&mut reader, &layout, index)?);
    }

    if reader.remaining() > 0 {
        log::debug!(
            "Ignoring {} trailing bytes after {} radials",
            reader.remaining(),
            layout.radial_count
        );
    }

    Ok(RadarSweep {
        header: layout.header,
        radials,
    })
}

/// Decodes a record and checks it against the metadata it was delivered with.
pub fn decode_for(
    raw: &[u8],
    site: &SiteId,
    product: ProductType,
) -> Result<RadarSweep, DecodeError> {
    let header = peek_header(raw)?;
    if &header.site != site || header.product != product {
        return Err(DecodeError::MetadataMismatch {
            expected: format!("{}/{}", site, product),
            found: format!("{}/{}", header.site, header.product),
        });
    }
    decode(raw)
}

/// Parses only the header, leaving the radial section untouched.
pub fn peek_header(raw: &[u8]) -> Result<SweepHeader, DecodeError> {
    let mut reader = Reader::new(raw);
    Ok(read_header(&mut reader)?.header)
}

fn read_header(reader: &mut Reader<'_>) -> Result<RecordLayout, DecodeError> {
    if reader.remaining() < MAGIC.len() || reader.data[..MAGIC.len()] != MAGIC {
        return Err(DecodeError::MalformedHeader("missing record magic".into()));
    }
    if reader.remaining() < HEADER_LEN {
        return Err(DecodeError::MalformedHeader(format!(
            "header needs {} bytes, record has {}",
            HEADER_LEN,
            reader.remaining()
        )));
    }

    let _magic: [u8; 4] = reader.array()?;
    let version = reader.u16()?;
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(DecodeError::UnsupportedVersion(version));
    }

    let site_bytes: [u8; 4] = reader.array()?;
    let site = std::str::from_utf8(&site_bytes)
        .map_err(|_| DecodeError::MalformedHeader("site id is not ASCII".into()))?;
    if site.trim().is_empty() {
        return Err(DecodeError::MalformedHeader("empty site id".into()));
    }
    let site = SiteId::new(site);

    let product = ProductType::from_code(reader.u16()?);
    let scan_time_ms = reader.i64()?;
    let elevation_tenths = reader.i16()?;
    let latitude = reader.i32()? as f64 / 1.0e6;
    let longitude = reader.i32()? as f64 / 1.0e6;
    let scale = reader.f32()?;
    let offset = reader.f32()?;
    let min_code = reader.u16()?;
    let gate_bytes = reader.u8()?;
    let flags = reader.u8()?;
    let radial_count = reader.u16()? as usize;
    let _reserved = reader.u32()?;

    let scan_time = DateTime::<Utc>::from_timestamp_millis(scan_time_ms).ok_or_else(|| {
        DecodeError::MalformedHeader(format!("scan time {} out of range", scan_time_ms))
    })?;
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(DecodeError::MalformedHeader(format!(
            "site location ({}, {}) out of range",
            latitude, longitude
        )));
    }
    if gate_bytes != 1 && gate_bytes != 2 {
        return Err(DecodeError::MalformedHeader(format!(
            "gate word must be 1 or 2 bytes, got {}",
            gate_bytes
        )));
    }

    let calibration = resolve_calibration(product, scale, offset, min_code)?;

    let has_second = flags & FLAG_SECOND_MOMENT != 0;
    let second_calibration = match (version, has_second) {
        (_, false) => None,
        (1, true) => {
            return Err(DecodeError::MalformedHeader(
                "second moment requires record version 2".into(),
            ))
        }
        (_, true) => {
            let second_scale = reader.f32()?;
            let second_offset = reader.f32()?;
            if !second_scale.is_finite() || !second_offset.is_finite() || second_scale == 0.0 {
                return Err(DecodeError::MalformedHeader(
                    "invalid second moment calibration".into(),
                ));
            }
            Some(Calibration::new(second_scale, second_offset, min_code))
        }
    };

    Ok(RecordLayout {
        header: SweepHeader {
            site,
            product,
            scan_time,
            elevation_deg: elevation_tenths as f32 / 10.0,
            latitude,
            longitude,
            value_range: calibration.value_range(gate_bytes),
        },
        calibration,
        second_calibration,
        gate_bytes,
        radial_count,
    })
}

fn resolve_calibration(
    product: ProductType,
    scale: f32,
    offset: f32,
    min_code: u16,
) -> Result<Calibration, DecodeError> {
    if !scale.is_finite() || !offset.is_finite() {
        return Err(DecodeError::MalformedHeader(
            "calibration is not finite".into(),
        ));
    }
    if scale != 0.0 {
        return Ok(Calibration::new(scale, offset, min_code));
    }
    product.default_calibration().ok_or_else(|| {
        DecodeError::MalformedHeader(format!(
            "record has no calibration and product {} has no default",
            product
        ))
    })
}

fn read_radial(
    reader: &mut Reader<'_>,
    layout: &RecordLayout,
    index: usize,
) -> Result<RadialRecord, DecodeError> {
    let azimuth = reader.f32()?;
    let spacing = reader.f32()?;
    let first_gate_m = reader.f32()?;
    let gate_spacing_m = reader.f32()?;
    let gate_count = reader.u16()? as usize;

    let invalid = |reason: String| DecodeError::InvalidRadial { index, reason };
    if !azimuth.is_finite() {
        return Err(invalid("azimuth is not finite".into()));
    }
    if !spacing.is_finite() || spacing <= 0.0 || spacing > 360.0 {
        return Err(invalid(format!("azimuth spacing {} outside (0, 360]", spacing)));
    }
    if !first_gate_m.is_finite() || first_gate_m < 0.0 {
        return Err(invalid(format!("first gate range {} is invalid", first_gate_m)));
    }
    if gate_count > 0 && (!gate_spacing_m.is_finite() || gate_spacing_m <= 0.0) {
        return Err(invalid(format!("gate spacing {} is invalid", gate_spacing_m)));
    }

    let word = layout.gate_bytes as usize;
    let codes = reader.take(gate_count * word)?;
    let second_codes = match layout.second_calibration {
        Some(_) => Some(reader.take(gate_count * word)?),
        None => None,
    };

    let folded = reserved_folded_code(layout.gate_bytes);
    let gates = (0..gate_count)
        .map(|g| {
            let code = read_code(codes, g, word);
            let second = match (second_codes, &layout.second_calibration) {
                (Some(raw), Some(cal)) => Some(decode_code(read_code(raw, g, word), cal, folded)),
                _ => None,
            };
            Gate {
                range_m: first_gate_m + g as f32 * gate_spacing_m,
                range_spacing_m: gate_spacing_m,
                moment: decode_code(code, &layout.calibration, folded),
                second,
            }
        })
        .collect();

    Ok(RadialRecord {
        azimuth_deg: azimuth.rem_euclid(360.0),
        azimuth_spacing_deg: spacing,
        gates,
    })
}

#[inline]
fn read_code(raw: &[u8], gate: usize, word: usize) -> u16 {
    if word == 1 {
        raw[gate] as u16
    } else {
        u16::from_be_bytes([raw[gate * 2], raw[gate * 2 + 1]])
    }
}

/// Converts one raw code into a decoded moment.
#[inline]
pub fn decode_code(code: u16, calibration: &Calibration, folded_code: u16) -> DecodedMoment {
    if code == folded_code {
        DecodedMoment::RangeFolded
    } else if code < calibration.min_code {
        DecodedMoment::NoData
    } else {
        DecodedMoment::Value(calibration.apply(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radar::synthetic::{RadialSpec, SweepBuilder};

    fn scenario_sweep() -> SweepBuilder {
        let mut builder = SweepBuilder::new("KLSX", ProductType::Reflectivity)
            .calibration(Calibration::new(0.5, 0.0, 0))
            .location(38.6989, -90.6828);
        for i in 0..10 {
            let codes = vec![0, 10, 20, 30, 40];
            builder = builder.radial(RadialSpec::new(i as f32 * 36.0, 36.0, 2125.0, 250.0, codes));
        }
        builder
    }

    #[test]
    fn test_decode_scenario_values() {
        let bytes = scenario_sweep().encode();
        let sweep = decode(&bytes).unwrap();

        assert_eq!(sweep.radial_count(), 10);
        for radial in &sweep.radials {
            let values: Vec<f32> = radial.gates.iter().filter_map(|g| g.moment.value()).collect();
            assert_eq!(values, vec![0.0, 5.0, 10.0, 15.0, 20.0]);
        }
    }

    #[test]
    fn test_counts_match_header() {
        let builder = SweepBuilder::new("KDMX", ProductType::Velocity)
            .radial(RadialSpec::new(0.0, 1.0, 2125.0, 250.0, vec![5; 12]))
            .radial(RadialSpec::new(1.0, 1.0, 2125.0, 250.0, vec![]))
            .radial(RadialSpec::new(2.0, 1.0, 2125.0, 250.0, vec![7; 3]));
        let sweep = decode(&builder.encode()).unwrap();

        let counts: Vec<usize> = sweep.radials.iter().map(|r| r.gate_count()).collect();
        assert_eq!(counts, vec![12, 0, 3]);
        assert_eq!(sweep.gate_count(), 15);
    }

    #[test]
    fn test_reserved_codes() {
        let builder = SweepBuilder::new("KTLX", ProductType::Reflectivity)
            .calibration(Calibration::new(0.5, 66.0, 2))
            .radial(RadialSpec::new(0.0, 1.0, 2125.0, 250.0, vec![0, 1, 2, 255, 106]));
        let sweep = decode(&builder.encode()).unwrap();
        let moments: Vec<DecodedMoment> = sweep.radials[0].gates.iter().map(|g| g.moment).collect();

        assert_eq!(
            moments,
            vec![
                DecodedMoment::NoData,
                DecodedMoment::NoData,
                DecodedMoment::Value(-32.0),
                DecodedMoment::RangeFolded,
                DecodedMoment::Value(20.0),
            ]
        );
    }

    #[test]
    fn test_quantized_value_reproduced() {
        let cal = ProductType::Velocity.default_calibration().unwrap();
        let value = -17.3_f32;
        let builder = SweepBuilder::new("KFWS", ProductType::Velocity)
            .radial(RadialSpec::new(90.0, 1.0, 2125.0, 250.0, vec![cal.quantize(value)]));
        let sweep = decode(&builder.encode()).unwrap();
        let decoded = sweep.radials[0].gates[0].moment.value().unwrap();

        assert!((decoded - value).abs() <= cal.scale / 2.0 + f32::EPSILON);
    }

    #[test]
    fn test_two_byte_gates_and_second_moment() {
        let builder = SweepBuilder::new("KLOT", ProductType::DifferentialPhase)
            .gate_bytes(2)
            .second_moment(Calibration::new(0.5, 129.0, 2))
            .radial(
                RadialSpec::new(45.0, 0.5, 2125.0, 250.0, vec![300, 65535])
                    .with_second(vec![139, 0]),
            );
        let sweep = decode(&builder.encode()).unwrap();
        let gates = &sweep.radials[0].gates;

        assert!(matches!(gates[0].moment, DecodedMoment::Value(_)));
        assert_eq!(gates[1].moment, DecodedMoment::RangeFolded);
        assert_eq!(gates[0].second, Some(DecodedMoment::Value(5.0)));
        assert_eq!(gates[1].second, Some(DecodedMoment::NoData));
    }

    #[test]
    fn test_gate_ranges() {
        let sweep = decode(&scenario_sweep().encode()).unwrap();
        let ranges: Vec<f32> = sweep.radials[0].gates.iter().map(|g| g.range_m).collect();
        assert_eq!(ranges, vec![2125.0, 2375.0, 2625.0, 2875.0, 3125.0]);
    }

    #[test]
    fn test_missing_magic() {
        let mut bytes = scenario_sweep().encode();
        bytes[0] = b'X';
        assert!(matches!(decode(&bytes), Err(DecodeError::MalformedHeader(_))));
        assert!(matches!(decode(&[]), Err(DecodeError::MalformedHeader(_))));
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = scenario_sweep().encode();
        bytes[4..6].copy_from_slice(&7u16.to_be_bytes());
        assert_eq!(decode(&bytes), Err(DecodeError::UnsupportedVersion(7)));
    }

    #[test]
    fn test_truncated_gates() {
        let bytes = scenario_sweep().encode();
        let cut = &bytes[..bytes.len() - 3];
        assert!(matches!(decode(cut), Err(DecodeError::TruncatedData { .. })));
    }

    #[test]
    fn test_declared_radials_exceed_data() {
        let mut bytes = scenario_sweep().encode();
        bytes[42..44].copy_from_slice(&5000u16.to_be_bytes());
        match decode(&bytes) {
            Err(DecodeError::TruncatedData { needed, available }) => {
                assert!(needed > available);
                assert_eq!(available, bytes.len());
            }
            other => panic!("expected truncation, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_spacing_rejected() {
        let builder = SweepBuilder::new("KLSX", ProductType::Reflectivity)
            .radial(RadialSpec::new(0.0, 0.0, 2125.0, 250.0, vec![10]));
        assert!(matches!(
            decode(&builder.encode()),
            Err(DecodeError::InvalidRadial { index: 0, .. })
        ));
    }

    #[test]
    fn test_metadata_mismatch() {
        let bytes = scenario_sweep().encode();
        let err = decode_for(&bytes, &SiteId::new("KDMX"), ProductType::Reflectivity).unwrap_err();
        assert!(matches!(err, DecodeError::MetadataMismatch { .. }));
        assert!(decode_for(&bytes, &SiteId::new("KLSX"), ProductType::Reflectivity).is_ok());
    }

    #[test]
    fn test_default_calibration_used_when_scale_zero() {
        let builder = SweepBuilder::new("KLSX", ProductType::Reflectivity)
            .calibration(Calibration::new(0.0, 0.0, 0))
            .radial(RadialSpec::new(0.0, 1.0, 2125.0, 250.0, vec![66]));
        let sweep = decode(&builder.encode()).unwrap();
        assert_eq!(sweep.radials[0].gates[0].moment, DecodedMoment::Value(0.0));

        let unknown = SweepBuilder::new("KLSX", ProductType::Unknown(77))
            .calibration(Calibration::new(0.0, 0.0, 0));
        assert!(matches!(
            decode(&unknown.encode()),
            Err(DecodeError::MalformedHeader(_))
        ));
    }
}
