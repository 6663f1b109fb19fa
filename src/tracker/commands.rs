//! Command table and per-command payload decoders.
//!
//! The table is built once and only ever read. Every registered command maps
//! to a [`CommandKind`], and [`CommandDescriptor::decode`] matches on it
//! exhaustively, so a new kind cannot be added without a decoder.

use chrono::{SecondsFormat, Utc};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;

use super::coordinate;
use super::fields::{float_or_zero, int_or_zero, text_or_unknown};

/// Display name reported for codes missing from the table
pub const UNKNOWN_COMMAND_NAME: &str = "Unknown";

/// Minimum field count for a fully decoded position report
const POSITION_MIN_FIELDS: usize = 10;

/// Decoder selected for a registered command code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Heartbeat,
    Login,
    Position,
    Alarm,
    GpsInfo,
    LbsInfo,
    StepCount,
    HeartRate,
}

/// One entry of the command table
#[derive(Debug, Clone, Copy)]
pub struct CommandDescriptor {
    pub code: &'static str,
    pub display_name: &'static str,
    pub kind: CommandKind,
}

static COMMANDS: [CommandDescriptor; 8] = [
    CommandDescriptor {
        code: "BP00",
        display_name: "Heartbeat",
        kind: CommandKind::Heartbeat,
    },
    CommandDescriptor {
        code: "BP01",
        display_name: "Login",
        kind: CommandKind::Login,
    },
    CommandDescriptor {
        code: "BP02",
        display_name: "Position Report",
        kind: CommandKind::Position,
    },
    CommandDescriptor {
        code: "BP03",
        display_name: "Alarm",
        kind: CommandKind::Alarm,
    },
    CommandDescriptor {
        code: "BP10",
        display_name: "GPS Info",
        kind: CommandKind::GpsInfo,
    },
    CommandDescriptor {
        code: "BP11",
        display_name: "LBS Info",
        kind: CommandKind::LbsInfo,
    },
    CommandDescriptor {
        code: "BP20",
        display_name: "Step Count",
        kind: CommandKind::StepCount,
    },
    CommandDescriptor {
        code: "BP22",
        display_name: "Heart Rate",
        kind: CommandKind::HeartRate,
    },
];

static BY_CODE: Lazy<HashMap<&'static str, &'static CommandDescriptor>> =
    Lazy::new(|| COMMANDS.iter().map(|c| (c.code, c)).collect());

/// Look up a command code; `None` flags an unregistered code
pub fn lookup(code: &str) -> Option<&'static CommandDescriptor> {
    BY_CODE.get(code).copied()
}

/// Display name for a code, `"Unknown"` when unregistered
pub fn display_name(code: &str) -> &'static str {
    lookup(code).map_or(UNKNOWN_COMMAND_NAME, |c| c.display_name)
}

/// All registered commands in code order
pub fn supported_commands() -> &'static [CommandDescriptor] {
    &COMMANDS
}

/// Decode the fields of `code`. Unregistered codes fall back to the raw fields.
pub fn decode(code: &str, fields: &[String]) -> TypedPayload {
    match lookup(code) {
        Some(descriptor) => descriptor.decode(fields),
        None => TypedPayload::raw(fields),
    }
}

impl CommandDescriptor {
    pub fn decode(&self, fields: &[String]) -> TypedPayload {
        match self.kind {
            CommandKind::Heartbeat => TypedPayload::raw(fields),
            CommandKind::Login => TypedPayload::Login(LoginInfo {
                device_type: text_or_unknown(fields, 0),
                firmware_version: text_or_unknown(fields, 1),
                protocol: text_or_unknown(fields, 2),
            }),
            CommandKind::Position => decode_position(fields),
            CommandKind::Alarm => TypedPayload::AlarmReport(AlarmReport {
                alarm_type: text_or_unknown(fields, 0),
                datetime: fields.get(1).cloned(),
                location: fields.get(2..).map(<[String]>::to_vec).unwrap_or_default(),
            }),
            CommandKind::GpsInfo => TypedPayload::GpsInfo(GpsInfo {
                satellite_count: int_or_zero(fields, 0),
                signal_strength: int_or_zero(fields, 1),
                accuracy: float_or_zero(fields, 2),
            }),
            CommandKind::LbsInfo => TypedPayload::LbsInfo(LbsInfo {
                mcc: text_or_unknown(fields, 0),
                mnc: text_or_unknown(fields, 1),
                lac: text_or_unknown(fields, 2),
                cell_id: text_or_unknown(fields, 3),
                signal_strength: int_or_zero(fields, 4),
            }),
            CommandKind::StepCount => TypedPayload::StepCount(StepCount {
                step_count: int_or_zero(fields, 0),
                calories: float_or_zero(fields, 1),
                distance: float_or_zero(fields, 2),
            }),
            CommandKind::HeartRate => TypedPayload::HeartRate(HeartRate {
                heart_rate: int_or_zero(fields, 0),
                measure_time: fields.get(1).cloned().unwrap_or_else(|| {
                    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
                }),
            }),
        }
    }
}

fn decode_position(fields: &[String]) -> TypedPayload {
    if fields.len() < POSITION_MIN_FIELDS {
        return TypedPayload::raw(fields);
    }

    let field = |i: usize| fields.get(i).map(String::as_str);
    TypedPayload::PositionReport(PositionReport {
        datetime: fields[0].clone(),
        gps_fix: if fields[1] == "A" {
            GpsFix::Valid
        } else {
            GpsFix::Invalid
        },
        latitude: coordinate::decode(field(2), field(3)),
        longitude: coordinate::decode(field(4), field(5)),
        speed: float_or_zero(fields, 6),
        course: float_or_zero(fields, 7),
        altitude: float_or_zero(fields, 8),
        satellites: int_or_zero(fields, 9),
        hdop: float_or_zero(fields, 10),
    })
}

/// Decoded command payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum TypedPayload {
    Login(LoginInfo),
    PositionReport(PositionReport),
    AlarmReport(AlarmReport),
    GpsInfo(GpsInfo),
    LbsInfo(LbsInfo),
    StepCount(StepCount),
    HeartRate(HeartRate),
    RawFallback(RawData),
}

impl TypedPayload {
    fn raw(fields: &[String]) -> Self {
        TypedPayload::RawFallback(RawData {
            raw_data: fields.to_vec(),
        })
    }

    /// Short name of the payload variant, used as a metrics label
    pub fn kind_name(&self) -> &'static str {
        match self {
            TypedPayload::Login(_) => "login",
            TypedPayload::PositionReport(_) => "position_report",
            TypedPayload::AlarmReport(_) => "alarm_report",
            TypedPayload::GpsInfo(_) => "gps_info",
            TypedPayload::LbsInfo(_) => "lbs_info",
            TypedPayload::StepCount(_) => "step_count",
            TypedPayload::HeartRate(_) => "heart_rate",
            TypedPayload::RawFallback(_) => "raw",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginInfo {
    pub device_type: String,
    pub firmware_version: String,
    pub protocol: String,
}

/// Whether the device reported a GPS fix (`A`) for this position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GpsFix {
    Valid,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionReport {
    pub datetime: String,
    pub gps_fix: GpsFix,
    /// Decimal degrees, negative south of the equator
    pub latitude: f64,
    /// Decimal degrees, negative west of Greenwich
    pub longitude: f64,
    pub speed: f64,
    pub course: f64,
    pub altitude: f64,
    pub satellites: i64,
    pub hdop: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmReport {
    pub alarm_type: String,
    pub datetime: Option<String>,
    /// Remaining fields, passed through untouched
    pub location: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GpsInfo {
    pub satellite_count: i64,
    pub signal_strength: i64,
    pub accuracy: f64,
}

/// Cell tower (location based service) details
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LbsInfo {
    pub mcc: String,
    pub mnc: String,
    pub lac: String,
    pub cell_id: String,
    pub signal_strength: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepCount {
    pub step_count: i64,
    pub calories: f64,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartRate {
    pub heart_rate: i64,
    pub measure_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawData {
    pub raw_data: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_registry_lookup() {
        assert_eq!(display_name("BP00"), "Heartbeat");
        assert_eq!(display_name("BP02"), "Position Report");
        assert_eq!(display_name("ZZ99"), UNKNOWN_COMMAND_NAME);
        assert!(lookup("ZZ99").is_none());
        assert_eq!(lookup("BP22").map(|c| c.kind), Some(CommandKind::HeartRate));
    }

    #[test]
    fn test_supported_commands_are_unique_and_ordered() {
        let codes: Vec<_> = supported_commands().iter().map(|c| c.code).collect();
        let mut sorted = codes.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(codes, sorted);
        assert!(codes.iter().all(|c| c.len() == 4));
    }

    #[test]
    fn test_decode_login() {
        let payload = decode("BP01", &fields(&["WATCH", "V1.2"]));
        assert_eq!(
            payload,
            TypedPayload::Login(LoginInfo {
                device_type: "WATCH".to_string(),
                firmware_version: "V1.2".to_string(),
                protocol: "Unknown".to_string(),
            })
        );
    }

    #[test]
    fn test_decode_position() {
        let payload = decode(
            "BP02",
            &fields(&[
                "250101120000",
                "A",
                "3116.7845",
                "N",
                "12122.7845",
                "E",
                "045.5",
                "180",
                "150",
                "12",
                "0.8",
            ]),
        );

        let TypedPayload::PositionReport(position) = payload else {
            panic!("expected a position report, got {payload:?}");
        };
        assert_eq!(position.datetime, "250101120000");
        assert_eq!(position.gps_fix, GpsFix::Valid);
        assert!((position.latitude - (31.0 + 16.7845 / 60.0)).abs() < 1e-6);
        assert!((position.longitude - (121.0 + 22.7845 / 60.0)).abs() < 1e-6);
        assert_eq!(position.speed, 45.5);
        assert_eq!(position.course, 180.0);
        assert_eq!(position.altitude, 150.0);
        assert_eq!(position.satellites, 12);
        assert_eq!(position.hdop, 0.8);
    }

    #[test]
    fn test_decode_position_without_hdop_and_bad_numbers() {
        let payload = decode(
            "BP02",
            &fields(&[
                "250101120000",
                "V",
                "3352.0000",
                "S",
                "15112.0000",
                "E",
                "fast",
                "",
                "n/a",
                "x",
            ]),
        );

        let TypedPayload::PositionReport(position) = payload else {
            panic!("expected a position report, got {payload:?}");
        };
        assert_eq!(position.gps_fix, GpsFix::Invalid);
        assert!(position.latitude < 0.0);
        assert_eq!(position.speed, 0.0);
        assert_eq!(position.course, 0.0);
        assert_eq!(position.altitude, 0.0);
        assert_eq!(position.satellites, 0);
        assert_eq!(position.hdop, 0.0);
    }

    #[test]
    fn test_short_position_falls_back_to_raw() {
        let raw = fields(&["250101120000", "A", "3116.7845"]);
        assert_eq!(
            decode("BP02", &raw),
            TypedPayload::RawFallback(RawData { raw_data: raw })
        );
    }

    #[test]
    fn test_decode_alarm() {
        let payload = decode("BP03", &fields(&["SOS", "250101120000", "3116.7845", "N"]));
        assert_eq!(
            payload,
            TypedPayload::AlarmReport(AlarmReport {
                alarm_type: "SOS".to_string(),
                datetime: Some("250101120000".to_string()),
                location: fields(&["3116.7845", "N"]),
            })
        );

        let TypedPayload::AlarmReport(empty) = decode("BP03", &[]) else {
            panic!("expected an alarm report");
        };
        assert_eq!(empty.alarm_type, "Unknown");
        assert_eq!(empty.datetime, None);
        assert!(empty.location.is_empty());
    }

    #[test]
    fn test_decode_gps_and_lbs_info() {
        assert_eq!(
            decode("BP10", &fields(&["9", "-70", "3.5m"])),
            TypedPayload::GpsInfo(GpsInfo {
                satellite_count: 9,
                signal_strength: -70,
                accuracy: 3.5,
            })
        );
        assert_eq!(
            decode("BP11", &fields(&["460", "00"])),
            TypedPayload::LbsInfo(LbsInfo {
                mcc: "460".to_string(),
                mnc: "00".to_string(),
                lac: "Unknown".to_string(),
                cell_id: "Unknown".to_string(),
                signal_strength: 0,
            })
        );
    }

    #[test]
    fn test_decode_step_count() {
        assert_eq!(
            decode("BP20", &fields(&["8421", "312.5", "6.2"])),
            TypedPayload::StepCount(StepCount {
                step_count: 8421,
                calories: 312.5,
                distance: 6.2,
            })
        );
    }

    #[test]
    fn test_decode_heart_rate() {
        assert_eq!(
            decode("BP22", &fields(&["72", "250101120000"])),
            TypedPayload::HeartRate(HeartRate {
                heart_rate: 72,
                measure_time: "250101120000".to_string(),
            })
        );

        let TypedPayload::HeartRate(now) = decode("BP22", &fields(&["abc"])) else {
            panic!("expected a heart rate");
        };
        assert_eq!(now.heart_rate, 0);
        assert!(chrono::DateTime::parse_from_rfc3339(&now.measure_time).is_ok());
    }

    #[test]
    fn test_heartbeat_and_unknown_fall_back_to_raw() {
        assert_eq!(decode("BP00", &[]).kind_name(), "raw");
        let raw = fields(&["a", "b"]);
        assert_eq!(
            decode("ZZ99", &raw),
            TypedPayload::RawFallback(RawData { raw_data: raw })
        );
    }

    #[test]
    fn test_payload_serializes_with_type_tag() {
        let json = serde_json::to_value(decode("BP20", &fields(&["10", "1", "2"]))).unwrap();
        assert_eq!(json["type"], "StepCount");
        assert_eq!(json["stepCount"], 10);
    }
}
