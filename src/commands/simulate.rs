use anyhow::Result;
use std::time::Duration;
use tracker_gateway::simulator::{SimulatorConfig, run_simulator};

pub async fn handle_simulate(
    host: String,
    port: u16,
    imei: String,
    count: u32,
    interval_ms: u64,
    split: bool,
) -> Result<()> {
    let config = SimulatorConfig {
        host,
        port,
        imei,
        count,
        interval: Duration::from_millis(interval_ms),
        split_frames: split,
    };

    let report = run_simulator(&config).await?;
    if report.acks_received < report.frames_sent {
        anyhow::bail!(
            "Only {} of {} frames were acknowledged",
            report.acks_received,
            report.frames_sent
        );
    }
    Ok(())
}
