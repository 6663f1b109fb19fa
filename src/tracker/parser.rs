use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use super::checksum;
use super::commands;

/// First byte of every frame
pub const FRAME_START: u8 = b'(';
/// Last byte of every frame
pub const FRAME_END: u8 = b')';

const IMEI_LENGTH: usize = 15;

/// Reasons a frame cannot be turned into a [`Packet`].
///
/// None of these end the session; the frame is reported and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("frame is not enclosed in '(' and ')'")]
    MissingDelimiters,
    #[error("expected at least 3 comma separated parts, found {found}")]
    InsufficientFields { found: usize },
    #[error("IMEI '{imei}' is not 15 digits")]
    InvalidImei { imei: String },
}

impl ParseError {
    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ParseError::MissingDelimiters => "missing_delimiters",
            ParseError::InsufficientFields { .. } => "insufficient_fields",
            ParseError::InvalidImei { .. } => "invalid_imei",
        }
    }
}

/// One parsed frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Packet {
    /// 15 digit device identifier
    pub imei: String,
    /// Four character command code, e.g. `BP02`
    pub command: String,
    /// Display name from the command table, `"Unknown"` for unregistered codes
    pub command_name: String,
    /// Raw tokens between the command and the checksum
    pub fields: Vec<String>,
    /// Checksum as sent by the device
    pub checksum: String,
    /// Checksum computed over the received content
    pub computed_checksum: String,
    /// Whether the received checksum matches the computed one
    pub valid: bool,
    /// When the frame was parsed
    pub timestamp: DateTime<Utc>,
}

/// Parse one complete frame such as `(123456789012345,BP00,04A6)`.
///
/// A checksum mismatch is not an error: the packet is returned with
/// `valid == false` and callers decide what to do with it.
pub fn parse_packet(frame: &str) -> Result<Packet, ParseError> {
    let content = frame
        .strip_prefix(FRAME_START as char)
        .and_then(|rest| rest.strip_suffix(FRAME_END as char))
        .ok_or(ParseError::MissingDelimiters)?;

    let parts: Vec<&str> = content.split(',').collect();
    if parts.len() < 3 {
        return Err(ParseError::InsufficientFields { found: parts.len() });
    }

    let imei = parts[0];
    if !is_valid_imei(imei) {
        return Err(ParseError::InvalidImei {
            imei: imei.to_string(),
        });
    }

    let command = parts[1];
    let received_checksum = parts[parts.len() - 1];
    let fields = parts[2..parts.len() - 1]
        .iter()
        .map(|s| s.to_string())
        .collect();

    // At least three parts means there is a final comma
    let signed_len = content.rfind(',').unwrap_or(content.len());
    let computed_checksum = checksum::compute(&content[..signed_len]);
    let valid = computed_checksum == received_checksum;

    Ok(Packet {
        imei: imei.to_string(),
        command: command.to_string(),
        command_name: commands::display_name(command).to_string(),
        fields,
        checksum: received_checksum.to_string(),
        computed_checksum,
        valid,
        timestamp: Utc::now(),
    })
}

/// Exactly 15 ASCII digits
pub fn is_valid_imei(imei: &str) -> bool {
    imei.len() == IMEI_LENGTH && imei.bytes().all(|b| b.is_ascii_digit())
}

/// Build a frame with a correct checksum from its parts
pub fn build_frame(imei: &str, command: &str, fields: &[&str]) -> String {
    let mut content = format!("{imei},{command}");
    for field in fields {
        content.push(',');
        content.push_str(field);
    }
    let checksum = checksum::compute(&content);
    format!("({content},{checksum})")
}

/// Acknowledgment frame sent back for every parsed packet
pub fn ack_frame(imei: &str) -> String {
    format!("({imei},BR00,OK)")
}

#[cfg(test)]
mod tests {
    use super::*;

    const IMEI: &str = "123456789012345";

    #[test]
    fn test_parse_heartbeat() {
        let frame = format!("({IMEI},BP00,{})", checksum::compute("123456789012345,BP00"));
        let packet = parse_packet(&frame).unwrap();

        assert_eq!(packet.imei, IMEI);
        assert_eq!(packet.command, "BP00");
        assert_eq!(packet.command_name, "Heartbeat");
        assert!(packet.fields.is_empty());
        assert!(packet.valid);
        assert_eq!(packet.checksum, packet.computed_checksum);
    }

    #[test]
    fn test_built_frames_are_valid() {
        let frame = build_frame(IMEI, "BP20", &["8421", "312.5", "6.2"]);
        let packet = parse_packet(&frame).unwrap();

        assert!(packet.valid);
        assert_eq!(packet.command_name, "Step Count");
        assert_eq!(packet.fields, vec!["8421", "312.5", "6.2"]);
    }

    #[test]
    fn test_fields_exclude_imei_command_and_checksum() {
        let frame = build_frame(IMEI, "BP03", &["SOS", "", "x"]);
        let packet = parse_packet(&frame).unwrap();
        let total_parts = frame.trim_matches(['(', ')']).split(',').count();
        assert_eq!(packet.fields.len(), total_parts - 3);
        assert_eq!(packet.fields[1], "");
    }

    #[test]
    fn test_checksum_mismatch_is_not_an_error() {
        let packet = parse_packet(&format!("({IMEI},BP00,FFFF)")).unwrap();
        assert!(!packet.valid);
        assert_eq!(packet.checksum, "FFFF");
        assert_ne!(packet.computed_checksum, "FFFF");
    }

    #[test]
    fn test_checksum_compare_is_case_sensitive() {
        let frame = (0..100)
            .map(|n| build_frame(IMEI, "BP22", &[&n.to_string()]))
            .find(|f| f.chars().rev().skip(1).take(4).any(|c| c.is_ascii_uppercase()))
            .expect("some checksum contains a hex letter");
        let (content, checksum_and_end) = frame.split_at(frame.len() - 5);
        let packet = parse_packet(&format!("{content}{}", checksum_and_end.to_lowercase())).unwrap();
        assert!(!packet.valid);
        assert_eq!(packet.computed_checksum.to_lowercase(), packet.checksum);
    }

    #[test]
    fn test_missing_delimiters() {
        assert_eq!(
            parse_packet("123456789012345,BP00,ABCD)"),
            Err(ParseError::MissingDelimiters)
        );
        assert_eq!(
            parse_packet("(123456789012345,BP00,ABCD"),
            Err(ParseError::MissingDelimiters)
        );
        assert_eq!(parse_packet("("), Err(ParseError::MissingDelimiters));
        assert_eq!(parse_packet(""), Err(ParseError::MissingDelimiters));
    }

    #[test]
    fn test_insufficient_fields() {
        assert_eq!(
            parse_packet("(123456789012345,BP00)"),
            Err(ParseError::InsufficientFields { found: 2 })
        );
        assert_eq!(
            parse_packet("()"),
            Err(ParseError::InsufficientFields { found: 1 })
        );
    }

    #[test]
    fn test_invalid_imei() {
        for imei in ["12345678901234", "1234567890123456", "12345678901234X", ""] {
            let frame = format!("({imei},BP00,0000)");
            assert_eq!(
                parse_packet(&frame),
                Err(ParseError::InvalidImei {
                    imei: imei.to_string()
                }),
                "{imei} should be rejected"
            );
        }
    }

    #[test]
    fn test_imei_validation() {
        assert!(is_valid_imei("000000000000000"));
        assert!(!is_valid_imei("12345678901234５"));
        assert!(!is_valid_imei(" 23456789012345"));
    }

    #[test]
    fn test_unknown_command() {
        let packet = parse_packet(&build_frame(IMEI, "ZZ99", &["1"])).unwrap();
        assert_eq!(packet.command_name, "Unknown");
        assert!(packet.valid);
    }

    #[test]
    fn test_ack_frame() {
        assert_eq!(ack_frame(IMEI), "(123456789012345,BR00,OK)");
    }

    #[test]
    fn test_error_kind_labels() {
        assert_eq!(ParseError::MissingDelimiters.kind(), "missing_delimiters");
        assert_eq!(
            ParseError::InsufficientFields { found: 1 }.kind(),
            "insufficient_fields"
        );
    }
}
