//! Lenient field readers shared by the coordinate and payload decoders.
//!
//! Devices pad numbers (`045.5`), append units, or leave fields empty. Every
//! reader here takes the longest leading numeric prefix and falls back to zero
//! when there is none, so a bad field never fails a decode.

/// Text of field `index`, or `"Unknown"` when the device did not send it.
pub(crate) fn text_or_unknown(fields: &[String], index: usize) -> String {
    fields
        .get(index)
        .cloned()
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Float value of field `index`, `0.0` when absent or unparseable.
pub(crate) fn float_or_zero(fields: &[String], index: usize) -> f64 {
    fields.get(index).map_or(0.0, |s| parse_float_prefix(s))
}

/// Integer value of field `index`, `0` when absent or unparseable.
pub(crate) fn int_or_zero(fields: &[String], index: usize) -> i64 {
    fields.get(index).map_or(0, |s| parse_int_prefix(s))
}

/// Parse the leading decimal number of `text` (`"12.5km"` -> `12.5`).
pub(crate) fn parse_float_prefix(text: &str) -> f64 {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let mut end = sign_len(bytes);
    let int_digits = digit_run(&bytes[end..]);
    end += int_digits;

    let mut frac_digits = 0;
    if bytes.get(end) == Some(&b'.') {
        frac_digits = digit_run(&bytes[end + 1..]);
        if int_digits > 0 || frac_digits > 0 {
            end += 1 + frac_digits;
        }
    }
    if int_digits == 0 && frac_digits == 0 {
        return 0.0;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let exp_sign = sign_len(&bytes[end + 1..]);
        let exp_digits = digit_run(&bytes[end + 1 + exp_sign..]);
        if exp_digits > 0 {
            end += 1 + exp_sign + exp_digits;
        }
    }

    text[..end].parse().unwrap_or(0.0)
}

/// Parse the leading integer of `text` (`"12.9"` -> `12`).
pub(crate) fn parse_int_prefix(text: &str) -> i64 {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let sign = sign_len(bytes);
    let digits = digit_run(&bytes[sign..]);
    if digits == 0 {
        return 0;
    }
    text[..sign + digits].parse().unwrap_or(0)
}

fn sign_len(bytes: &[u8]) -> usize {
    usize::from(matches!(bytes.first(), Some(b'+' | b'-')))
}

fn digit_run(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}
