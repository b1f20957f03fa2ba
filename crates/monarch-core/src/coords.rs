//! Coordinate parsing for the catalog's free-text `"lat,long"` location field.
//!
//! The catalog reports an observation's position as a single string such as
//! `"38.8977,-77.0365"`. A [`Coordinates`] value is only produced when that
//! string is well-formed; anything else leaves both latitude and longitude
//! absent rather than storing half a position.
//!
//! # Accepted form
//!
//! - exactly two comma-separated parts
//! - each part a finite decimal number (surrounding whitespace ignored)
//! - latitude within [-90, 90], longitude within [-180, 180]

use serde::{Deserialize, Serialize};

/// A validated latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Parse a `"lat,long"` string into [`Coordinates`].
///
/// Returns `None` for empty input, a missing comma, more than two parts,
/// non-numeric parts, non-finite values, or out-of-range degrees.
pub fn parse_coordinates(text: &str) -> Option<Coordinates> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let (lat, long) = text.split_once(',')?;
    // A second comma means the field is not a plain pair.
    if long.contains(',') {
        return None;
    }

    let latitude = parse_degrees(lat)?;
    let longitude = parse_degrees(long)?;

    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return None;
    }

    Some(Coordinates {
        latitude,
        longitude,
    })
}

fn parse_degrees(part: &str) -> Option<f64> {
    let value: f64 = part.trim().parse().ok()?;
    value.is_finite().then_some(value)
}
