/// Compute the frame checksum over `text`.
///
/// Sums the numeric code of every character, keeps the low 16 bits and renders
/// the result as four uppercase hex digits (zero padded).
///
/// Frames are ASCII. Non-ASCII text is summed by Unicode scalar value, which
/// differs from UTF-16 code unit sums for characters outside the BMP.
pub fn compute(text: &str) -> String {
    let sum = text
        .chars()
        .fold(0u32, |acc, c| acc.wrapping_add(c as u32))
        & 0xFFFF;
    format!("{:04X}", sum)
}
