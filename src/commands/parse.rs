use anyhow::{Context, Result};
use serde_json::json;

/// Decode one frame and print the packet and payload as pretty JSON
pub fn handle_parse(frame: &str) -> Result<()> {
    let (packet, payload) = tracker_gateway::decode_frame(frame.trim())
        .with_context(|| format!("Failed to parse frame {:?}", frame))?;

    let output = json!({ "packet": packet, "payload": payload });
    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("Failed to serialize packet")?
    );
    Ok(())
}
