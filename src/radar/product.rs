//! Radar product identification and per-product calibration.
//!
//! Products are a tagged enumeration rather than a type hierarchy: the
//! decoder, color mapper and renderer all look up product behavior through
//! tables keyed by [`ProductType`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A radar product (moment) carried by a sweep record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ProductType {
    Reflectivity,
    Velocity,
    SpectrumWidth,
    DifferentialReflectivity,
    CorrelationCoefficient,
    DifferentialPhase,
    /// A product code with no entry in the product table.
    Unknown(u16),
}

/// Linear calibration converting raw gate codes into physical values.
///
/// `physical = (code - offset) * scale`. Codes below `min_code` carry no
/// data; the all-ones code of the gate word is reserved for range folding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub scale: f32,
    pub offset: f32,
    pub min_code: u16,
}

impl Calibration {
    pub const fn new(scale: f32, offset: f32, min_code: u16) -> Self {
        Self {
            scale,
            offset,
            min_code,
        }
    }

    /// Converts a raw code into a physical value, ignoring reserved codes.
    #[inline]
    pub fn apply(&self, code: u16) -> f32 {
        (code as f32 - self.offset) * self.scale
    }

    /// Inverse of [`Calibration::apply`], rounded to the nearest code.
    pub fn quantize(&self, value: f32) -> u16 {
        let code = (value / self.scale + self.offset).round();
        code.clamp(0.0, u16::MAX as f32) as u16
    }

    /// Physical value range representable by `gate_bytes`-wide codes.
    pub fn value_range(&self, gate_bytes: u8) -> (f32, f32) {
        let top = reserved_folded_code(gate_bytes).saturating_sub(1);
        let a = self.apply(self.min_code);
        let b = self.apply(top);
        (a.min(b), a.max(b))
    }
}

/// The all-ones code of a gate word, reserved to flag range folding.
#[inline]
pub fn reserved_folded_code(gate_bytes: u8) -> u16 {
    if gate_bytes == 1 {
        u8::MAX as u16
    } else {
        u16::MAX
    }
}

impl ProductType {
    /// Every product with a table entry.
    pub fn all() -> &'static [ProductType] {
        &[
            ProductType::Reflectivity,
            ProductType::Velocity,
            ProductType::SpectrumWidth,
            ProductType::DifferentialReflectivity,
            ProductType::CorrelationCoefficient,
            ProductType::DifferentialPhase,
        ]
    }

    /// Maps a product code from a sweep header.
    pub fn from_code(code: u16) -> Self {
        match code {
            94 => ProductType::Reflectivity,
            99 => ProductType::Velocity,
            30 => ProductType::SpectrumWidth,
            159 => ProductType::DifferentialReflectivity,
            161 => ProductType::CorrelationCoefficient,
            163 => ProductType::DifferentialPhase,
            other => ProductType::Unknown(other),
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            ProductType::Reflectivity => 94,
            ProductType::Velocity => 99,
            ProductType::SpectrumWidth => 30,
            ProductType::DifferentialReflectivity => 159,
            ProductType::CorrelationCoefficient => 161,
            ProductType::DifferentialPhase => 163,
            ProductType::Unknown(code) => *code,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ProductType::Unknown(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProductType::Reflectivity => "Reflectivity",
            ProductType::Velocity => "Velocity",
            ProductType::SpectrumWidth => "Spectrum Width",
            ProductType::DifferentialReflectivity => "Differential Reflectivity",
            ProductType::CorrelationCoefficient => "Correlation Coefficient",
            ProductType::DifferentialPhase => "Differential Phase",
            ProductType::Unknown(_) => "Unknown Product",
        }
    }

    /// Short mnemonic used in settings files and palette headers.
    pub fn short_name(&self) -> String {
        match self {
            ProductType::Reflectivity => "REF".to_string(),
            ProductType::Velocity => "VEL".to_string(),
            ProductType::SpectrumWidth => "SW".to_string(),
            ProductType::DifferentialReflectivity => "ZDR".to_string(),
            ProductType::CorrelationCoefficient => "CC".to_string(),
            ProductType::DifferentialPhase => "PHI".to_string(),
            ProductType::Unknown(code) => format!("P{}", code),
        }
    }

    pub fn units(&self) -> &'static str {
        match self {
            ProductType::Reflectivity => "dBZ",
            ProductType::Velocity | ProductType::SpectrumWidth => "m/s",
            ProductType::DifferentialReflectivity => "dB",
            ProductType::CorrelationCoefficient => "",
            ProductType::DifferentialPhase => "deg",
            ProductType::Unknown(_) => "",
        }
    }

    /// Default calibration used when a header does not carry its own.
    ///
    /// Scale/offset pairs follow the WSR-88D Level II moment encodings,
    /// re-expressed as `(code - offset) * scale`.
    pub fn default_calibration(&self) -> Option<Calibration> {
        match self {
            ProductType::Reflectivity => Some(Calibration::new(0.5, 66.0, 2)),
            ProductType::Velocity => Some(Calibration::new(0.5, 129.0, 2)),
            ProductType::SpectrumWidth => Some(Calibration::new(0.5, 129.0, 2)),
            ProductType::DifferentialReflectivity => Some(Calibration::new(0.0625, 128.0, 2)),
            ProductType::CorrelationCoefficient => Some(Calibration::new(1.0 / 300.0, -60.5, 2)),
            ProductType::DifferentialPhase => Some(Calibration::new(1.0 / 2.8361, 2.0, 2)),
            ProductType::Unknown(_) => None,
        }
    }

    /// Default gate word width for the product.
    pub fn default_gate_bytes(&self) -> u8 {
        match self {
            ProductType::DifferentialPhase => 2,
            _ => 1,
        }
    }

    /// Nominal maximum display range in kilometres.
    pub fn max_range_km(&self) -> f64 {
        match self {
            ProductType::Reflectivity => 460.0,
            _ => 300.0,
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_name())
    }
}

impl FromStr for ProductType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let product = match upper.as_str() {
            "REF" | "BR" | "REFLECTIVITY" => ProductType::Reflectivity,
            "VEL" | "BV" | "VELOCITY" => ProductType::Velocity,
            "SW" | "SPECTRUMWIDTH" => ProductType::SpectrumWidth,
            "ZDR" => ProductType::DifferentialReflectivity,
            "CC" | "RHO" => ProductType::CorrelationCoefficient,
            "PHI" | "KDP" => ProductType::DifferentialPhase,
            other => match other.strip_prefix('P').and_then(|c| c.parse::<u16>().ok()) {
                Some(code) => ProductType::from_code(code),
                None => return Err(format!("unrecognized product '{}'", s)),
            },
        };
        Ok(product)
    }
}

impl From<ProductType> for String {
    fn from(product: ProductType) -> Self {
        product.short_name()
    }
}

impl TryFrom<String> for ProductType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
