//! Delta-compressed coordinate path codec.
//!
//! Coordinates are scaled to 1e5 precision, delta-encoded against the
//! previous point, zig-zag signed and emitted as base-63-offset varints of
//! 5-bit groups (top bit of each group is the continuation flag).

use thiserror::Error;

use crate::geo::Coordinate;

const PRECISION: f64 = 1e5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolylineError {
    #[error("polyline truncated at byte {0}")]
    Truncated(usize),
    #[error("invalid polyline byte {byte:#04x} at offset {offset}")]
    InvalidByte { byte: u8, offset: usize },
    #[error("unterminated varint at offset {0}")]
    Unterminated(usize),
}

pub fn decode(encoded: &str) -> Result<Vec<Coordinate>, PolylineError> {
    let bytes = encoded.as_bytes();
    let mut coords = Vec::new();
    let mut offset = 0usize;
    let mut lat = 0i64;
    let mut lng = 0i64;

    while offset < bytes.len() {
        let (d_lat, next) = decode_value(bytes, offset)?;
        let (d_lng, next) = decode_value(bytes, next)?;
        lat += d_lat;
        lng += d_lng;
        offset = next;
        coords.push(Coordinate::new(lat as f64 / PRECISION, lng as f64 / PRECISION));
    }

    Ok(coords)
}

pub fn encode(coords: &[Coordinate]) -> String {
    let mut out = String::with_capacity(coords.len() * 8);
    let mut prev_lat = 0i64;
    let mut prev_lng = 0i64;

    for coord in coords {
        let lat = (coord.lat * PRECISION).round() as i64;
        let lng = (coord.lng * PRECISION).round() as i64;
        encode_value(lat - prev_lat, &mut out);
        encode_value(lng - prev_lng, &mut out);
        prev_lat = lat;
        prev_lng = lng;
    }

    out
}

fn decode_value(bytes: &[u8], mut offset: usize) -> Result<(i64, usize), PolylineError> {
    let mut accumulated = 0i64;
    let mut shift = 0u32;

    loop {
        let byte = match bytes.get(offset) {
            Some(byte) => *byte,
            None => return Err(PolylineError::Truncated(offset)),
        };
        if byte < 63 {
            return Err(PolylineError::InvalidByte { byte, offset });
        }
        // A 1e5-scaled delta fits well within i64; a run of continuation
        // bits past that is malformed input, not a bigger number.
        if shift >= 64 {
            return Err(PolylineError::Unterminated(offset));
        }
        let group = (byte - 63) as i64;
        accumulated |= (group & 0x1f) << shift;
        shift += 5;
        offset += 1;
        if group & 0x20 == 0 {
            break;
        }
    }

    // Low bit carries the sign; restore via one's-complement inversion.
    let delta = if accumulated & 1 != 0 {
        !(accumulated >> 1)
    } else {
        accumulated >> 1
    };
    Ok((delta, offset))
}

fn encode_value(delta: i64, out: &mut String) {
    let mut value = if delta < 0 { !(delta << 1) } else { delta << 1 };
    while value >= 0x20 {
        out.push((((value & 0x1f) | 0x20) as u8 + 63) as char);
        value >>= 5;
    }
    out.push((value as u8 + 63) as char);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_coords() -> Vec<Coordinate> {
        vec![
            Coordinate::new(38.5, -120.2),
            Coordinate::new(40.7, -120.95),
            Coordinate::new(43.252, -126.453),
        ]
    }

    #[test]
    fn decodes_reference_fixture() {
        let coords = decode("_p~iF~ps|U_ulLnnqC_mqNvxq`@").unwrap();
        assert_eq!(coords, fixture_coords());
    }

    #[test]
    fn encodes_reference_fixture() {
        assert_eq!(encode(&fixture_coords()), "_p~iF~ps|U_ulLnnqC_mqNvxq`@");
    }

    #[test]
    fn round_trips_at_precision() {
        let coords = vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(-0.00001, 0.00001),
            Coordinate::new(16.05441, 108.20217),
            Coordinate::new(-33.86882, 151.20929),
            Coordinate::new(89.99999, -179.99999),
        ];
        assert_eq!(decode(&encode(&coords)).unwrap(), coords);
    }

    #[test]
    fn empty_input_is_empty_path() {
        assert_eq!(decode("").unwrap(), Vec::new());
        assert_eq!(encode(&[]), "");
    }

    #[test]
    fn truncated_input_is_an_error() {
        // Continuation bit set on the final byte.
        assert_eq!(decode("_p~iF~ps|U_"), Err(PolylineError::Truncated(11)));
    }

    #[test]
    fn unterminated_continuation_run_is_an_error() {
        // Every byte keeps the continuation bit set, so the varint never
        // terminates no matter how long the input runs.
        let endless = "~".repeat(16);
        assert!(matches!(
            decode(&endless),
            Err(PolylineError::Unterminated(_))
        ));
    }

    #[test]
    fn rejects_bytes_below_offset() {
        assert!(matches!(
            decode("_p~iF ps|U"),
            Err(PolylineError::InvalidByte { byte: b' ', .. })
        ));
    }
}
