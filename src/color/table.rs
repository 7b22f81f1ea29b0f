//! Threshold color tables.
//!
//! A [`ColorTable`] is an ordered list of breakpoints; a value falls in the
//! bucket of the last breakpoint not greater than it. Tables are validated
//! on construction, so lookups never fail.

use crate::radar::{DecodedMoment, ProductType};
use eframe::egui::Color32;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Fixed color for range-folded gates.
pub const RANGE_FOLDED_COLOR: Color32 = Color32::from_rgb(119, 0, 125);

/// Errors raised while building or selecting a color table.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ColorTableError {
    #[error("no color table for product {0}")]
    UnknownProduct(ProductType),

    #[error("color table has no breakpoints")]
    EmptyTable,

    #[error("breakpoint {index} does not increase over the previous threshold")]
    NonIncreasingThreshold { index: usize },

    #[error("palette line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("color table I/O error: {0}")]
    Io(String),
}

/// One breakpoint. Values in `[threshold, next threshold)` take `color`,
/// blended towards `end` when a gradient end is given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorStop {
    pub threshold: f32,
    pub color: Color32,
    pub end: Option<Color32>,
}

impl ColorStop {
    pub fn new(threshold: f32, color: Color32) -> Self {
        Self {
            threshold,
            color,
            end: None,
        }
    }

    pub fn gradient(threshold: f32, color: Color32, end: Color32) -> Self {
        Self {
            threshold,
            color,
            end: Some(end),
        }
    }
}

/// A validated color table for one product.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorTable {
    product: ProductType,
    units: String,
    stops: Vec<ColorStop>,
    /// Color for values strictly below the first threshold
    below_min: Color32,
    /// Color for gates without data
    no_data: Color32,
    /// Color for range-folded gates
    range_folded: Color32,
}

impl ColorTable {
    /// Builds a table, rejecting empty lists and thresholds that are not
    /// strictly increasing.
    pub fn new(product: ProductType, stops: Vec<ColorStop>) -> Result<Self, ColorTableError> {
        if stops.is_empty() {
            return Err(ColorTableError::EmptyTable);
        }
        if let Some(index) = stops.iter().position(|s| !s.threshold.is_finite()) {
            return Err(ColorTableError::NonIncreasingThreshold { index });
        }
        for (index, pair) in stops.windows(2).enumerate() {
            if pair[1].threshold <= pair[0].threshold {
                return Err(ColorTableError::NonIncreasingThreshold { index: index + 1 });
            }
        }

        Ok(Self {
            product,
            units: product.units().to_string(),
            stops,
            below_min: Color32::TRANSPARENT,
            no_data: Color32::TRANSPARENT,
            range_folded: RANGE_FOLDED_COLOR,
        })
    }

    /// Gray ramp spanning `range`, used when a product has no table.
    pub fn neutral(product: ProductType, range: (f32, f32)) -> Self {
        const STEPS: usize = 8;
        let (lo, hi) = if range.0.is_finite() && range.1.is_finite() && range.1 > range.0 {
            range
        } else {
            (0.0, 1.0)
        };
        let step = (hi - lo) / STEPS as f32;
        let stops = (0..STEPS)
            .map(|i| {
                let level = 70 + (i * 160 / (STEPS - 1)) as u8;
                ColorStop::new(lo + step * i as f32, Color32::from_gray(level))
            })
            .collect();

        Self {
            product,
            units: product.units().to_string(),
            stops,
            below_min: Color32::TRANSPARENT,
            no_data: Color32::TRANSPARENT,
            range_folded: RANGE_FOLDED_COLOR,
        }
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = units.into();
        self
    }

    pub fn with_below_min(mut self, color: Color32) -> Self {
        self.below_min = color;
        self
    }

    pub fn with_no_data(mut self, color: Color32) -> Self {
        self.no_data = color;
        self
    }

    pub fn with_range_folded(mut self, color: Color32) -> Self {
        self.range_folded = color;
        self
    }

    pub fn product(&self) -> ProductType {
        self.product
    }

    pub fn units(&self) -> &str {
        &self.units
    }

    pub fn stops(&self) -> &[ColorStop] {
        &self.stops
    }

    pub fn below_min(&self) -> Color32 {
        self.below_min
    }

    pub fn range_folded(&self) -> Color32 {
        self.range_folded
    }

    /// Value range covered by the breakpoints.
    pub fn span(&self) -> (f32, f32) {
        let first = self.stops[0].threshold;
        let last = self.stops[self.stops.len() - 1].threshold;
        (first, last)
    }

    /// Bucket holding `value`, or `None` below the first threshold.
    #[inline]
    pub fn bucket_index(&self, value: f32) -> Option<usize> {
        let above = self.stops.partition_point(|s| s.threshold <= value);
        above.checked_sub(1)
    }

    /// Color for a physical value.
    pub fn color_for_value(&self, value: f32) -> Color32 {
        if value.is_nan() {
            return self.no_data;
        }
        let Some(index) = self.bucket_index(value) else {
            return self.below_min;
        };
        let stop = &self.stops[index];
        match (stop.end, self.stops.get(index + 1)) {
            (Some(end), Some(next)) => {
                let t = (value - stop.threshold) / (next.threshold - stop.threshold);
                lerp_color(stop.color, end, t.clamp(0.0, 1.0))
            }
            _ => stop.color,
        }
    }

    /// Color for a decoded moment, mapping sentinels to their fixed colors.
    #[inline]
    pub fn colorize(&self, moment: DecodedMoment) -> Color32 {
        match moment {
            DecodedMoment::Value(v) => self.color_for_value(v),
            DecodedMoment::NoData => self.no_data,
            DecodedMoment::RangeFolded => self.range_folded,
        }
    }
}

/// Maps a decoded moment to a color through `table`.
#[inline]
pub fn colorize(value: DecodedMoment, table: &ColorTable) -> Color32 {
    table.colorize(value)
}

fn lerp_color(a: Color32, b: Color32, t: f32) -> Color32 {
    let mix = |x: u8, y: u8| (x as f32 + (y as f32 - x as f32) * t).round() as u8;
    let [ar, ag, ab, aa] = a.to_srgba_unmultiplied();
    let [br, bg, bb, ba] = b.to_srgba_unmultiplied();
    Color32::from_rgba_unmultiplied(mix(ar, br), mix(ag, bg), mix(ab, bb), mix(aa, ba))
}

/// Color tables keyed by product.
#[derive(Debug, Clone, Default)]
pub struct ColorTableSet {
    tables: HashMap<ProductType, Arc<ColorTable>>,
}

impl ColorTableSet {
    /// Empty set; every lookup fails until tables are inserted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set holding the built-in palette of every known product.
    pub fn builtin() -> Self {
        let mut set = Self::new();
        for product in ProductType::all() {
            if let Some(table) = super::palettes::builtin(*product) {
                set.insert(table);
            }
        }
        set
    }

    /// Adds or replaces the table for its product.
    pub fn insert(&mut self, table: ColorTable) {
        self.tables.insert(table.product(), Arc::new(table));
    }

    /// Selects the table for `product`.
    pub fn table_for(&self, product: ProductType) -> Result<Arc<ColorTable>, ColorTableError> {
        self.tables
            .get(&product)
            .cloned()
            .ok_or(ColorTableError::UnknownProduct(product))
    }

    pub fn contains(&self, product: ProductType) -> bool {
        self.tables.contains_key(&product)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> ColorTable {
        ColorTable::new(
            ProductType::Reflectivity,
            vec![
                ColorStop::new(5.0, Color32::from_rgb(0, 236, 236)),
                ColorStop::new(20.0, Color32::from_rgb(0, 255, 0)),
                ColorStop::new(40.0, Color32::from_rgb(255, 255, 0)),
                ColorStop::new(60.0, Color32::from_rgb(255, 0, 255)),
            ],
        )
        .unwrap()
        .with_below_min(Color32::from_gray(10))
    }

    #[test]
    fn test_rejects_non_increasing() {
        let err = ColorTable::new(
            ProductType::Velocity,
            vec![
                ColorStop::new(0.0, Color32::RED),
                ColorStop::new(0.0, Color32::GREEN),
            ],
        )
        .unwrap_err();
        assert_eq!(err, ColorTableError::NonIncreasingThreshold { index: 1 });
        assert_eq!(
            ColorTable::new(ProductType::Velocity, vec![]).unwrap_err(),
            ColorTableError::EmptyTable
        );
    }

    #[test]
    fn test_bucket_boundaries() {
        let table = ramp();
        assert_eq!(table.bucket_index(4.99), None);
        assert_eq!(table.bucket_index(5.0), Some(0));
        assert_eq!(table.bucket_index(19.99), Some(0));
        assert_eq!(table.bucket_index(20.0), Some(1));
        assert_eq!(table.bucket_index(1000.0), Some(3));
    }

    #[test]
    fn test_bucket_index_is_monotonic() {
        let table = ramp();
        let mut previous = 0;
        let mut v = 5.0;
        while v < 80.0 {
            let index = table.bucket_index(v).unwrap();
            assert!(index >= previous);
            previous = index;
            v += 0.37;
        }
    }

    #[test]
    fn test_sentinel_colors() {
        let table = ramp();
        assert_eq!(table.colorize(DecodedMoment::NoData), Color32::TRANSPARENT);
        assert_eq!(table.colorize(DecodedMoment::RangeFolded), RANGE_FOLDED_COLOR);
        assert_eq!(colorize(DecodedMoment::Value(0.0), &table), Color32::from_gray(10));
        assert_eq!(table.colorize(DecodedMoment::Value(f32::NAN)), Color32::TRANSPARENT);
        assert_eq!(
            table.colorize(DecodedMoment::Value(45.0)),
            Color32::from_rgb(255, 255, 0)
        );
    }

    #[test]
    fn test_gradient_stop_interpolates() {
        let table = ColorTable::new(
            ProductType::Velocity,
            vec![
                ColorStop::gradient(0.0, Color32::from_rgb(0, 0, 0), Color32::from_rgb(200, 0, 0)),
                ColorStop::new(10.0, Color32::WHITE),
            ],
        )
        .unwrap();
        assert_eq!(table.color_for_value(5.0), Color32::from_rgb(100, 0, 0));
        assert_eq!(table.color_for_value(10.0), Color32::WHITE);
    }

    #[test]
    fn test_unknown_product_is_an_error() {
        let set = ColorTableSet::builtin();
        assert_eq!(
            set.table_for(ProductType::Unknown(42)).unwrap_err(),
            ColorTableError::UnknownProduct(ProductType::Unknown(42))
        );
        for product in ProductType::all() {
            assert!(set.table_for(*product).is_ok());
        }
    }

    #[test]
    fn test_neutral_table_spans_range() {
        let table = ColorTable::neutral(ProductType::Unknown(9), (-10.0, 70.0));
        assert_eq!(table.span(), (-10.0, 60.0));
        assert_eq!(table.colorize(DecodedMoment::Value(-20.0)), Color32::TRANSPARENT);
        assert_ne!(table.colorize(DecodedMoment::Value(0.0)), Color32::TRANSPARENT);
    }
}
