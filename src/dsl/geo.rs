//! Geo query parsers.

use serde_json::Value;

use crate::error::{GalenaError, Result};
use crate::index::query::GeoPoint;
use crate::index::IndexQuery;

/// Accepts `{lat, lon}`, `"lat,lon"`, or GeoJSON-style `[lon, lat]`.
fn parse_point(value: &Value) -> Result<GeoPoint> {
    match value {
        Value::Object(map) => {
            let lat = map
                .get("lat")
                .and_then(Value::as_f64)
                .ok_or_else(|| GalenaError::parsing("point is missing lat"))?;
            let lon = map
                .get("lon")
                .and_then(Value::as_f64)
                .ok_or_else(|| GalenaError::parsing("point is missing lon"))?;
            Ok(GeoPoint { lat, lon })
        }
        Value::String(s) => {
            let (lat, lon) = s
                .split_once(',')
                .ok_or_else(|| GalenaError::parsing(format!("point [{s}] is not lat,lon")))?;
            Ok(GeoPoint {
                lat: lat
                    .trim()
                    .parse()
                    .map_err(|_| GalenaError::parsing(format!("point [{s}] is not lat,lon")))?,
                lon: lon
                    .trim()
                    .parse()
                    .map_err(|_| GalenaError::parsing(format!("point [{s}] is not lat,lon")))?,
            })
        }
        Value::Array(items) if items.len() == 2 => {
            let lon = items[0]
                .as_f64()
                .ok_or_else(|| GalenaError::parsing("point array must be [lon, lat]"))?;
            let lat = items[1]
                .as_f64()
                .ok_or_else(|| GalenaError::parsing("point array must be [lon, lat]"))?;
            Ok(GeoPoint { lat, lon })
        }
        other => Err(GalenaError::parsing(format!(
            "point doesn't support value {other}"
        ))),
    }
}

/// The one non-option key of a geo clause body names the field.
fn geo_field<'v>(body: &'v Value, options: &[&str]) -> Result<(&'v String, &'v Value)> {
    let Value::Object(map) = body else {
        return Err(GalenaError::parsing("expected an object"));
    };
    let mut fields = map.iter().filter(|(k, _)| !options.contains(&k.as_str()));
    let first = fields
        .next()
        .ok_or_else(|| GalenaError::parsing("is missing field"))?;
    if fields.next().is_some() {
        return Err(GalenaError::parsing("supports only one field per clause"));
    }
    Ok(first)
}

pub fn bounding_box_query(body: &Value) -> Result<IndexQuery> {
    let (field, spec) = geo_field(body, &["validation_method", "ignore_unmapped", "boost"])?;
    let top_left = spec
        .get("top_left")
        .ok_or_else(|| GalenaError::parsing("[geo_bounding_box] is missing top_left"))
        .and_then(parse_point)?;
    let bottom_right = spec
        .get("bottom_right")
        .ok_or_else(|| GalenaError::parsing("[geo_bounding_box] is missing bottom_right"))
        .and_then(parse_point)?;

    Ok(IndexQuery::GeoBoundingBox {
        field: field.clone(),
        top_left,
        bottom_right,
    })
}

pub fn distance_query(body: &Value) -> Result<IndexQuery> {
    let distance = body
        .get("distance")
        .and_then(Value::as_str)
        .ok_or_else(|| GalenaError::parsing("[geo_distance] is missing distance"))?;
    let distance_meters = parse_distance(distance)?;
    let (field, center) = geo_field(body, &["distance", "distance_type", "boost"])?;

    Ok(IndexQuery::GeoDistance {
        field: field.clone(),
        center: parse_point(center)?,
        distance_meters,
    })
}

pub fn polygon_query(body: &Value) -> Result<IndexQuery> {
    let (field, spec) = geo_field(body, &["validation_method", "boost"])?;
    let points = spec
        .get("points")
        .and_then(Value::as_array)
        .ok_or_else(|| GalenaError::parsing("[geo_polygon] is missing points"))?
        .iter()
        .map(parse_point)
        .collect::<Result<Vec<_>>>()?;

    Ok(IndexQuery::GeoPolygon {
        field: field.clone(),
        points,
    })
}

/// `geo_shape` supports envelope shapes (mapped to a bounding box) and
/// points.
pub fn shape_query(body: &Value) -> Result<IndexQuery> {
    let (field, spec) = geo_field(body, &["relation", "ignore_unmapped", "boost"])?;
    let shape = spec
        .get("shape")
        .ok_or_else(|| GalenaError::parsing("[geo_shape] is missing shape"))?;
    let shape_type = shape
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_lowercase();
    let coordinates = shape
        .get("coordinates")
        .ok_or_else(|| GalenaError::parsing("[geo_shape] is missing coordinates"))?;

    match shape_type.as_str() {
        "envelope" => {
            let corners = coordinates
                .as_array()
                .filter(|a| a.len() == 2)
                .ok_or_else(|| {
                    GalenaError::parsing("[geo_shape] envelope expects two corner points")
                })?;
            Ok(IndexQuery::GeoBoundingBox {
                field: field.clone(),
                top_left: parse_point(&corners[0])?,
                bottom_right: parse_point(&corners[1])?,
            })
        }
        "point" => {
            let point = parse_point(coordinates)?;
            Ok(IndexQuery::GeoBoundingBox {
                field: field.clone(),
                top_left: point,
                bottom_right: point,
            })
        }
        other => Err(GalenaError::parsing(format!(
            "[geo_shape] doesn't support shape [{other}]"
        ))),
    }
}

/// Parse `"10km"`-style distances into meters.
fn parse_distance(raw: &str) -> Result<f64> {
    let raw = raw.trim().to_lowercase();
    let (number, unit): (String, String) = raw
        .chars()
        .partition(|c| c.is_ascii_digit() || *c == '.' || *c == '-');
    let value: f64 = number
        .parse()
        .map_err(|_| GalenaError::parsing(format!("[geo_distance] distance [{raw}] is invalid")))?;

    let factor = match unit.trim() {
        "" | "m" => 1.0,
        "km" => 1000.0,
        "mi" | "miles" => 1609.344,
        "yd" => 0.9144,
        "ft" => 0.3048,
        other => {
            return Err(GalenaError::parsing(format!(
                "[geo_distance] unit [{other}] is not supported"
            )));
        }
    };
    Ok(value * factor)
}
