use super::fields::{parse_float_prefix, parse_int_prefix};

/// Convert a `DDDMM.mmmm` coordinate and hemisphere letter to decimal degrees.
///
/// The degree/minute boundary is taken as two characters before the decimal
/// point, so `3116.7845` is 31° 16.7845' and `12122.7845` is 121° 22.7845'.
/// Values whose minutes are not exactly two integer digits are misread; devices
/// speaking this protocol always send zero-padded minutes.
///
/// `S` and `W` give negative values. A missing or empty coordinate or
/// hemisphere yields `0.0`.
pub fn decode(coord: Option<&str>, hemisphere: Option<&str>) -> f64 {
    let (Some(coord), Some(hemisphere)) = (
        coord.filter(|c| !c.is_empty()),
        hemisphere.filter(|h| !h.is_empty()),
    ) else {
        return 0.0;
    };

    // Without a decimal point the whole string is treated as DDDMM.
    let dot = coord.find('.').unwrap_or(coord.len());
    let split = dot.saturating_sub(2);
    let (degree_part, minute_part) = match (coord.get(..split), coord.get(split..)) {
        (Some(d), Some(m)) => (d, m),
        _ => return 0.0,
    };

    let degrees = parse_int_prefix(degree_part) as f64;
    let minutes = parse_float_prefix(minute_part);
    let value = degrees + minutes / 60.0;

    match hemisphere {
        "S" | "W" => -value,
        _ => value,
    }
}
