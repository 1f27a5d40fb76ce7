//! Encoded polyline codec (signed deltas, 5-bit chunks, 1e-5 degrees).

use crate::domain::model::{Coordinate, POLYLINE_PRECISION};
use crate::utils::error::{Result, TrackerError};

const CHUNK_BITS: u32 = 5;
const CHUNK_MASK: i64 = 0x1f;
const CONTINUATION: i64 = 0x20;
const ASCII_OFFSET: u8 = 63;
const MAX_SHIFT: u32 = 60;

fn to_e5(value: f64) -> i64 {
    (value * POLYLINE_PRECISION).round() as i64
}

fn write_value(delta: i64, out: &mut String) {
    let mut value = delta << 1;
    if delta < 0 {
        value = !value;
    }
    while value >= CONTINUATION {
        out.push(((CONTINUATION | (value & CHUNK_MASK)) as u8 + ASCII_OFFSET) as char);
        value >>= CHUNK_BITS;
    }
    out.push((value as u8 + ASCII_OFFSET) as char);
}

fn read_value(bytes: &[u8], index: &mut usize) -> Result<i64> {
    let start = *index;
    let mut result: i64 = 0;
    let mut shift: u32 = 0;

    loop {
        let Some(&byte) = bytes.get(*index) else {
            return Err(TrackerError::MalformedEncoding {
                position: start,
                reason: "value is truncated".to_string(),
            });
        };
        if !(ASCII_OFFSET..=ASCII_OFFSET + 63).contains(&byte) {
            return Err(TrackerError::MalformedEncoding {
                position: *index,
                reason: format!("byte 0x{:02x} is outside the polyline alphabet", byte),
            });
        }
        if shift > MAX_SHIFT {
            return Err(TrackerError::MalformedEncoding {
                position: start,
                reason: "value overflows 64 bits".to_string(),
            });
        }

        let chunk = (byte - ASCII_OFFSET) as i64;
        *index += 1;
        result |= (chunk & CHUNK_MASK) << shift;
        shift += CHUNK_BITS;

        if chunk < CONTINUATION {
            break;
        }
    }

    Ok(if result & 1 != 0 {
        !(result >> 1)
    } else {
        result >> 1
    })
}

/// Encodes `path`. Every coordinate is first rounded to 1e-5 degrees; that
/// rounding is the only lossy step.
pub fn encode(path: &[Coordinate]) -> String {
    let mut out = String::with_capacity(path.len() * 8);
    let (mut prev_lat, mut prev_lng) = (0i64, 0i64);

    for coordinate in path.iter().map(Coordinate::quantized) {
        let lat = to_e5(coordinate.latitude);
        let lng = to_e5(coordinate.longitude);
        write_value(lat - prev_lat, &mut out);
        write_value(lng - prev_lng, &mut out);
        prev_lat = lat;
        prev_lng = lng;
    }

    out
}

/// Decodes an encoded polyline. Any malformed byte fails the whole decode;
/// a partially decoded path is never returned.
pub fn decode(encoded: &str) -> Result<Vec<Coordinate>> {
    let bytes = encoded.trim().as_bytes();
    let mut index = 0;
    let (mut lat, mut lng) = (0i64, 0i64);
    let mut points = Vec::new();

    while index < bytes.len() {
        lat = lat.saturating_add(read_value(bytes, &mut index)?);
        if index >= bytes.len() {
            return Err(TrackerError::MalformedEncoding {
                position: index,
                reason: "latitude without longitude".to_string(),
            });
        }
        lng = lng.saturating_add(read_value(bytes, &mut index)?);

        let coordinate = Coordinate::new(
            lat as f64 / POLYLINE_PRECISION,
            lng as f64 / POLYLINE_PRECISION,
        )
        .map_err(|e| TrackerError::MalformedEncoding {
            position: index,
            reason: e.to_string(),
        })?;
        points.push(coordinate);
    }

    Ok(points)
}
