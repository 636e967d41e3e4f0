/// Dimension Negotiator
/// Validates the geometry measured by the rendering surface and, for surfaces
/// that cannot measure glyphs, estimates one from font metrics.

use crate::error::{BridgeError, Result};
use crate::models::Geometry;
use serde_json::Value;

/// Parse and validate a `cli-dimensions` payload.
///
/// All of `cols`, `rows`, `width` and `height` must be present positive integers.
/// The payload may arrive as an object or as a JSON string wrapping one.
pub fn parse_geometry(payload: &Value) -> Result<Geometry> {
    let parsed;
    let object = match payload {
        Value::String(raw) => {
            parsed = serde_json::from_str::<Value>(raw)
                .map_err(|e| BridgeError::MalformedGeometry(format!("not JSON: {}", e)))?;
            &parsed
        }
        other => other,
    };

    if !object.is_object() {
        return Err(BridgeError::MalformedGeometry(format!("expected an object, got {}", object)));
    }

    let cols = positive_field(object, "cols", u16::MAX as u64)?;
    let rows = positive_field(object, "rows", u16::MAX as u64)?;
    let width = positive_field(object, "width", u32::MAX as u64)?;
    let height = positive_field(object, "height", u32::MAX as u64)?;

    Ok(Geometry {
        cols: cols as u16,
        rows: rows as u16,
        width: width as u32,
        height: height as u32,
    })
}

fn positive_field(object: &Value, name: &str, max: u64) -> Result<u64> {
    let value = object
        .get(name)
        .ok_or_else(|| BridgeError::MalformedGeometry(format!("missing `{}`", name)))?;

    match value.as_u64() {
        Some(n) if n > 0 && n <= max => Ok(n),
        _ => Err(BridgeError::MalformedGeometry(format!(
            "`{}` must be a positive integer, got {}",
            name, value
        ))),
    }
}

/// Font metrics the surface renders with
#[derive(Debug, Clone, PartialEq)]
pub struct FontMetrics {
    pub font_family: String,
    pub font_size: u16,
    pub line_height: f32,
    pub letter_spacing: f32,
}

impl FontMetrics {
    /// Approximate cell size in pixels for a monospace face
    pub fn cell_size(&self) -> (f32, f32) {
        let size = self.font_size as f32;
        let width = size * 3.0 / 5.0 + self.letter_spacing;
        let height = (size * self.line_height).ceil();
        (width.max(1.0), height.max(1.0))
    }
}

/// Estimate the grid that fits a surface of the given pixel size
pub fn compute_geometry(surface_width: u32, surface_height: u32, metrics: &FontMetrics) -> Result<Geometry> {
    let (cell_width, cell_height) = metrics.cell_size();
    let cols = (surface_width as f32 / cell_width).floor() as u32;
    let rows = (surface_height as f32 / cell_height).floor() as u32;

    if cols == 0 || rows == 0 {
        return Err(BridgeError::MalformedGeometry(format!(
            "surface {}x{} px is too small for {}px {}",
            surface_width, surface_height, metrics.font_size, metrics.font_family
        )));
    }

    let cols = cols.min(u16::MAX as u32) as u16;
    let rows = rows.min(u16::MAX as u32) as u16;

    Ok(Geometry {
        cols,
        rows,
        width: (cols as f32 * cell_width).round() as u32,
        height: (rows as f32 * cell_height).round() as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metrics(font_size: u16) -> FontMetrics {
        FontMetrics {
            font_family: "monospace".to_string(),
            font_size,
            line_height: 1.0,
            letter_spacing: 0.0,
        }
    }

    #[test]
    fn accepts_object_payload() {
        let geometry = parse_geometry(&json!({ "cols": 120, "rows": 40, "width": 960, "height": 720 })).unwrap();
        assert_eq!(geometry, Geometry { cols: 120, rows: 40, width: 960, height: 720 });
    }

    #[test]
    fn accepts_stringified_payload() {
        let payload = json!("{\"width\":800,\"height\":600,\"rows\":30,\"cols\":100}");
        let geometry = parse_geometry(&payload).unwrap();
        assert_eq!(geometry.cols, 100);
        assert_eq!(geometry.rows, 30);
    }

    #[test]
    fn rejects_zero_missing_and_fractional_fields() {
        let zero = json!({ "cols": 0, "rows": 40, "width": 960, "height": 720 });
        assert!(matches!(parse_geometry(&zero), Err(BridgeError::MalformedGeometry(_))));

        let missing = json!({ "cols": 120, "rows": 40, "width": 960 });
        assert!(matches!(parse_geometry(&missing), Err(BridgeError::MalformedGeometry(_))));

        let fractional = json!({ "cols": 120.5, "rows": 40, "width": 960, "height": 720 });
        assert!(parse_geometry(&fractional).is_err());

        let negative = json!({ "cols": 120, "rows": -1, "width": 960, "height": 720 });
        assert!(parse_geometry(&negative).is_err());
    }

    #[test]
    fn rejects_non_object_payloads() {
        assert!(parse_geometry(&json!(42)).is_err());
        assert!(parse_geometry(&json!("not json")).is_err());
        assert!(parse_geometry(&json!({ "cols": 70000, "rows": 1, "width": 1, "height": 1 })).is_err());
    }

    #[test]
    fn computes_grid_from_surface_pixels() {
        // 10px font: cells are 6x10
        let geometry = compute_geometry(960, 720, &metrics(10)).unwrap();
        assert_eq!(geometry.cols, 160);
        assert_eq!(geometry.rows, 72);
        assert_eq!(geometry.width, 960);
        assert_eq!(geometry.height, 720);
    }

    #[test]
    fn tiny_surface_is_rejected() {
        assert!(compute_geometry(3, 3, &metrics(16)).is_err());
    }
}
