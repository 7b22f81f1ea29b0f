//! Color table files.
//!
//! Two formats are accepted:
//!
//! - GR-style `.pal` text: `Product:`, `Units:`, `Scale:`, `Offset:`,
//!   `Color:`, `Color4:`, `RF:` and `ND:` lines; `;` and `#` start comments.
//!   A `Color:` line may carry a second RGB triple, making a gradient.
//!   Palette values are in display units; `Scale`/`Offset` convert them back
//!   with `product = (palette - offset) / scale`.
//! - JSON tables deserialized with `serde`.

use super::table::{ColorStop, ColorTable, ColorTableError};
use crate::radar::ProductType;
use eframe::egui::Color32;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// JSON representation of a color table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorTableFile {
    pub product: ProductType,
    #[serde(default)]
    pub units: Option<String>,
    pub stops: Vec<ColorStopFile>,
    #[serde(default)]
    pub below_min: Option<Vec<u8>>,
    #[serde(default)]
    pub no_data: Option<Vec<u8>>,
    #[serde(default)]
    pub range_folded: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorStopFile {
    pub value: f32,
    /// RGB or RGBA
    pub color: Vec<u8>,
    #[serde(default)]
    pub end: Option<Vec<u8>>,
}

/// Loads a `.pal` or `.json` color table from disk.
pub fn load_color_table(
    path: &Path,
    product: Option<ProductType>,
) -> Result<ColorTable, ColorTableError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ColorTableError::Io(format!("{}: {}", path.display(), e)))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let table = if is_json {
        parse_json(&text)?
    } else {
        parse_pal(&text, product)?
    };
    log::info!(
        "Loaded {} color table from {} ({} breakpoints)",
        table.product(),
        path.display(),
        table.stops().len()
    );
    Ok(table)
}

/// Parses a JSON color table.
pub fn parse_json(text: &str) -> Result<ColorTable, ColorTableError> {
    let file: ColorTableFile = serde_json::from_str(text).map_err(|e| ColorTableError::Parse {
        line: e.line(),
        message: e.to_string(),
    })?;

    let color = |bytes: &[u8]| -> Result<Color32, ColorTableError> {
        match *bytes {
            [r, g, b] => Ok(Color32::from_rgb(r, g, b)),
            [r, g, b, a] => Ok(Color32::from_rgba_unmultiplied(r, g, b, a)),
            _ => Err(ColorTableError::Parse {
                line: 0,
                message: format!("color must have 3 or 4 components, got {}", bytes.len()),
            }),
        }
    };

    let stops = file
        .stops
        .iter()
        .map(|s| {
            let start = color(&s.color)?;
            Ok(match &s.end {
                Some(end) => ColorStop::gradient(s.value, start, color(end)?),
                None => ColorStop::new(s.value, start),
            })
        })
        .collect::<Result<Vec<_>, ColorTableError>>()?;

    let mut table = ColorTable::new(file.product, stops)?;
    if let Some(units) = file.units {
        table = table.with_units(units);
    }
    if let Some(c) = &file.below_min {
        table = table.with_below_min(color(c)?);
    }
    if let Some(c) = &file.no_data {
        table = table.with_no_data(color(c)?);
    }
    if let Some(c) = &file.range_folded {
        table = table.with_range_folded(color(c)?);
    }
    Ok(table)
}

/// Parses GR-style palette text.
///
/// `product` is used when the text has no `Product:` line.
pub fn parse_pal(text: &str, product: Option<ProductType>) -> Result<ColorTable, ColorTableError> {
    let mut product = product;
    let mut units: Option<String> = None;
    let mut scale = 1.0f32;
    let mut offset = 0.0f32;
    let mut range_folded: Option<Color32> = None;
    let mut no_data: Option<Color32> = None;
    // (palette value, color, gradient end)
    let mut raw: Vec<(f32, Color32, Option<Color32>)> = Vec::new();

    for (i, line) in text.lines().enumerate() {
        let line_no = i + 1;
        let content = line.split([';', '#']).next().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }
        let Some((key, value)) = content.split_once(':') else {
            return Err(parse_error(line_no, format!("expected 'Key: value', got '{}'", content)));
        };
        let value = value.trim();

        match key.trim().to_ascii_lowercase().as_str() {
            "product" => {
                product = Some(value.parse().map_err(|e: String| parse_error(line_no, e))?);
            }
            "units" => units = Some(value.to_string()),
            "scale" => {
                scale = parse_number(value, line_no)?;
                if scale == 0.0 {
                    return Err(parse_error(line_no, "scale must be non-zero".into()));
                }
            }
            "offset" => offset = parse_number(value, line_no)?,
            "color" => {
                let n = numbers(value, line_no)?;
                let entry = match n.as_slice() {
                    [v, r, g, b] => (*v, rgb(*r, *g, *b, line_no)?, None),
                    [v, r, g, b, r2, g2, b2] => (
                        *v,
                        rgb(*r, *g, *b, line_no)?,
                        Some(rgb(*r2, *g2, *b2, line_no)?),
                    ),
                    _ => return Err(parse_error(line_no, "Color needs 4 or 7 numbers".into())),
                };
                raw.push(entry);
            }
            "color4" => {
                let n = numbers(value, line_no)?;
                let entry = match n.as_slice() {
                    [v, r, g, b, a] => (*v, rgba(*r, *g, *b, *a, line_no)?, None),
                    [v, r, g, b, a, r2, g2, b2, a2] => (
                        *v,
                        rgba(*r, *g, *b, *a, line_no)?,
                        Some(rgba(*r2, *g2, *b2, *a2, line_no)?),
                    ),
                    _ => return Err(parse_error(line_no, "Color4 needs 5 or 9 numbers".into())),
                };
                raw.push(entry);
            }
            "rf" => {
                let n = numbers(value, line_no)?;
                range_folded = Some(color_from(&n, line_no)?);
            }
            "nd" => {
                let n = numbers(value, line_no)?;
                no_data = Some(color_from(&n, line_no)?);
            }
            // Step, decimals and other display hints carry no color information
            other => log::debug!("Ignoring palette key '{}' on line {}", other, line_no),
        }
    }

    let product = product.ok_or_else(|| parse_error(0, "palette names no product".into()))?;
    let stops = raw
        .into_iter()
        .map(|(value, color, end)| {
            let threshold = (value - offset) / scale;
            match end {
                Some(end) => ColorStop::gradient(threshold, color, end),
                None => ColorStop::new(threshold, color),
            }
        })
        .collect();

    let mut table = ColorTable::new(product, stops)?;
    if let Some(units) = units {
        table = table.with_units(units);
    }
    if let Some(c) = range_folded {
        table = table.with_range_folded(c);
    }
    if let Some(c) = no_data {
        table = table.with_no_data(c);
    }
    Ok(table)
}

fn parse_error(line: usize, message: String) -> ColorTableError {
    ColorTableError::Parse { line, message }
}

fn parse_number(value: &str, line: usize) -> Result<f32, ColorTableError> {
    value
        .parse::<f32>()
        .map_err(|e| parse_error(line, format!("'{}': {}", value, e)))
}

fn numbers(value: &str, line: usize) -> Result<Vec<f32>, ColorTableError> {
    value
        .split_whitespace()
        .map(|token| parse_number(token, line))
        .collect()
}

fn channel(v: f32, line: usize) -> Result<u8, ColorTableError> {
    if (0.0..=255.0).contains(&v) {
        Ok(v.round() as u8)
    } else {
        Err(parse_error(line, format!("color channel {} out of range", v)))
    }
}

fn rgb(r: f32, g: f32, b: f32, line: usize) -> Result<Color32, ColorTableError> {
    Ok(Color32::from_rgb(
        channel(r, line)?,
        channel(g, line)?,
        channel(b, line)?,
    ))
}

fn rgba(r: f32, g: f32, b: f32, a: f32, line: usize) -> Result<Color32, ColorTableError> {
    Ok(Color32::from_rgba_unmultiplied(
        channel(r, line)?,
        channel(g, line)?,
        channel(b, line)?,
        channel(a, line)?,
    ))
}

fn color_from(n: &[f32], line: usize) -> Result<Color32, ColorTableError> {
    match *n {
        [r, g, b] => rgb(r, g, b, line),
        [r, g, b, a] => rgba(r, g, b, a, line),
        _ => Err(parse_error(line, "expected 3 or 4 color components".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radar::DecodedMoment;
    use std::io::Write;

    const VELOCITY_PAL: &str = "\
; knots palette
Product: BV
Units: KTS
Scale: 1.9426
Offset: 0
Step: 10

RF: 119 0 125
Color: -120 2 252 2
Color: -10 124 151 123 152 119 119
Color: 10 137 0 0
Color4: 120 255 0 0 255
";

    #[test]
    fn test_parse_pal_velocity() {
        let table = parse_pal(VELOCITY_PAL, None).unwrap();
        assert_eq!(table.product(), ProductType::Velocity);
        assert_eq!(table.units(), "KTS");
        assert_eq!(table.stops().len(), 4);
        // Thresholds are converted back into m/s
        assert!((table.stops()[2].threshold - 10.0 / 1.9426).abs() < 1e-4);
        assert_eq!(
            table.colorize(DecodedMoment::Value(10.0)),
            Color32::from_rgb(137, 0, 0)
        );
        assert!(table.stops()[1].end.is_some());
    }

    #[test]
    fn test_parse_pal_needs_product() {
        let text = "Color: 5 0 236 236\n";
        assert!(matches!(
            parse_pal(text, None),
            Err(ColorTableError::Parse { .. })
        ));
        let table = parse_pal(text, Some(ProductType::Reflectivity)).unwrap();
        assert_eq!(table.product(), ProductType::Reflectivity);
    }

    #[test]
    fn test_parse_pal_rejects_bad_lines() {
        let err = parse_pal("Product: BR\nColor: 5 0 300 0\n", None).unwrap_err();
        assert!(matches!(err, ColorTableError::Parse { line: 2, .. }));

        let err = parse_pal("Product: BR\nColor: 20 0 0 0\nColor: 10 0 0 0\n", None).unwrap_err();
        assert_eq!(err, ColorTableError::NonIncreasingThreshold { index: 1 });
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{
            "product": "CC",
            "stops": [
                {"value": 0.2, "color": [20, 0, 50]},
                {"value": 0.9, "color": [255, 165, 0, 200]}
            ],
            "range_folded": [0, 0, 0, 255]
        }"#;
        let table = parse_json(json).unwrap();
        assert_eq!(table.product(), ProductType::CorrelationCoefficient);
        assert_eq!(table.range_folded(), Color32::BLACK);
        assert_eq!(
            table.colorize(DecodedMoment::Value(0.5)),
            Color32::from_rgb(20, 0, 50)
        );
    }

    #[test]
    fn test_load_from_disk() {
        let mut file = tempfile::Builder::new().suffix(".pal").tempfile().unwrap();
        file.write_all(VELOCITY_PAL.as_bytes()).unwrap();
        let table = load_color_table(file.path(), None).unwrap();
        assert_eq!(table.product(), ProductType::Velocity);

        let missing = load_color_table(Path::new("/nonexistent/palette.pal"), None);
        assert!(matches!(missing, Err(ColorTableError::Io(_))));
    }
}
