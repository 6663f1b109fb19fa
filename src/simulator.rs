//! Device simulator for manual end-to-end checks against a running gateway.
//!
//! Logs in, then cycles through position, heart rate, step count and GPS info
//! frames with jittered values. With `split_frames` each frame is written in
//! two segments so the gateway's reassembly path is exercised.

use anyhow::{Context, Result};
use chrono::Utc;
use rand::RngExt;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::tracker::{ack_frame, build_frame, parser::is_valid_imei};

const ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the device simulator
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub host: String,
    pub port: u16,
    pub imei: String,
    /// Frames to send after the login frame
    pub count: u32,
    pub interval: Duration,
    pub split_frames: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8888,
            imei: "868000000000001".to_string(),
            count: 10,
            interval: Duration::from_secs(1),
            split_frames: false,
        }
    }
}

/// What the simulator saw during a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatorReport {
    pub frames_sent: u32,
    pub acks_received: u32,
}

/// Base position the simulated device wanders around (degrees-minutes)
struct Track {
    lat_minutes: f64,
    lon_minutes: f64,
    steps: i64,
}

impl Track {
    fn new() -> Self {
        Self {
            lat_minutes: 31.0 * 60.0 + 16.7845,
            lon_minutes: 121.0 * 60.0 + 22.7845,
            steps: 0,
        }
    }
}

/// Format minutes-of-arc as `D..DMM.mmmm`
fn degrees_minutes(total_minutes: f64) -> String {
    let degrees = (total_minutes / 60.0).floor();
    let minutes = total_minutes - degrees * 60.0;
    format!("{}{:07.4}", degrees as i64, minutes)
}

/// Build the `index`th frame of a simulated session
fn next_frame(imei: &str, index: u32, track: &mut Track, rng: &mut impl RngExt) -> String {
    let now = Utc::now().format("%y%m%d%H%M%S").to_string();

    match index % 4 {
        0 => {
            track.lat_minutes += rng.random_range(-0.05..0.05);
            track.lon_minutes += rng.random_range(-0.05..0.05);
            let lat = degrees_minutes(track.lat_minutes);
            let lon = degrees_minutes(track.lon_minutes);
            let speed = format!("{:05.1}", rng.random_range(0.0..60.0));
            let course = rng.random_range(0..360).to_string();
            let altitude = rng.random_range(5..200).to_string();
            let satellites = rng.random_range(4..14).to_string();
            let hdop = format!("{:.1}", rng.random_range(0.5..2.5));
            build_frame(
                imei,
                "BP02",
                &[
                    &now,
                    "A",
                    &lat,
                    "N",
                    &lon,
                    "E",
                    &speed,
                    &course,
                    &altitude,
                    &satellites,
                    &hdop,
                ],
            )
        }
        1 => {
            let heart_rate = rng.random_range(55..110).to_string();
            build_frame(imei, "BP22", &[&heart_rate, &now])
        }
        2 => {
            track.steps += rng.random_range(10..200);
            let steps = track.steps.to_string();
            let calories = format!("{:.1}", track.steps as f64 * 0.04);
            let distance = format!("{:.2}", track.steps as f64 * 0.0007);
            build_frame(imei, "BP20", &[&steps, &calories, &distance])
        }
        _ => {
            let satellites = rng.random_range(4..14).to_string();
            let signal = rng.random_range(-110..-60).to_string();
            let accuracy = format!("{:.1}", rng.random_range(2.0..15.0));
            build_frame(imei, "BP10", &[&satellites, &signal, &accuracy])
        }
    }
}

/// Connect to a gateway and send a login followed by `config.count` frames
pub async fn run_simulator(config: &SimulatorConfig) -> Result<SimulatorReport> {
    if !is_valid_imei(&config.imei) {
        anyhow::bail!("IMEI '{}' is not 15 digits", config.imei);
    }

    let addr = format!("{}:{}", config.host, config.port);
    let mut stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("Failed to connect to gateway at {}", addr))?;
    info!("Simulating device {} against {}", config.imei, addr);

    let expected_ack = ack_frame(&config.imei);
    let mut report = SimulatorReport::default();
    let frames = {
        let mut track = Track::new();
        let mut rng = rand::rng();
        let login = build_frame(&config.imei, "BP01", &["SIMWATCH", "V1.0.0", "1"]);
        std::iter::once(login)
            .chain((0..config.count).map(|i| next_frame(&config.imei, i, &mut track, &mut rng)))
            .collect::<Vec<_>>()
    };

    for (i, frame) in frames.iter().enumerate() {
        if i > 0 && !config.interval.is_zero() {
            sleep(config.interval).await;
        }

        send_frame(&mut stream, frame, config.split_frames).await?;
        report.frames_sent += 1;
        debug!("Sent {}", frame);

        match read_ack(&mut stream, expected_ack.len()).await? {
            Some(ack) if ack == expected_ack => report.acks_received += 1,
            Some(ack) => warn!("Unexpected reply from gateway: {}", ack),
            None => warn!("No acknowledgment within {:?}", ACK_TIMEOUT),
        }
    }

    info!(
        "Simulation finished: {} frames sent, {} acknowledged",
        report.frames_sent, report.acks_received
    );
    Ok(report)
}

async fn send_frame(stream: &mut TcpStream, frame: &str, split: bool) -> Result<()> {
    if split {
        let (head, tail) = frame.split_at(frame.len() / 2);
        stream.write_all(head.as_bytes()).await?;
        stream.flush().await?;
        sleep(Duration::from_millis(20)).await;
        stream.write_all(tail.as_bytes()).await?;
    } else {
        stream.write_all(frame.as_bytes()).await?;
    }
    stream.flush().await.context("Failed to send frame")
}

async fn read_ack(stream: &mut TcpStream, len: usize) -> Result<Option<String>> {
    let mut buffer = vec![0u8; len];
    match timeout(ACK_TIMEOUT, stream.read_exact(&mut buffer)).await {
        Ok(Ok(_)) => Ok(Some(String::from_utf8_lossy(&buffer).into_owned())),
        Ok(Err(e)) => Err(e).context("Gateway closed the connection"),
        Err(_) => Ok(None),
    }
}
