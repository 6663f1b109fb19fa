use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::{Duration, Instant};

/// Install the Prometheus recorder.
/// Returns a handle that renders metrics for scraping
pub fn init_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

/// Initialize gateway metrics to zero/default values
/// This ensures metrics always appear in Prometheus queries even if no events have occurred
pub fn initialize_gateway_metrics() {
    // Connection metrics
    metrics::counter!("tracker.connection.accepted_total").absolute(0);
    metrics::counter!("tracker.connection.closed_total").absolute(0);
    metrics::counter!("tracker.connection.accept_error_total").absolute(0);
    metrics::counter!("tracker.connection.read_error_total").absolute(0);
    metrics::gauge!("tracker.connection.active").set(0.0);

    // Framing metrics
    metrics::counter!("tracker.bytes.received_total").absolute(0);
    metrics::counter!("tracker.framer.frames_total").absolute(0);
    metrics::counter!("tracker.framer.discarded_bytes_total").absolute(0);
    metrics::counter!("tracker.framer.evicted_bytes_total").absolute(0);

    // Packet metrics
    metrics::counter!("tracker.packets.parsed_total").absolute(0);
    metrics::counter!("tracker.packets.invalid_checksum_total").absolute(0);
    metrics::counter!("tracker.packets.unknown_command_total").absolute(0);
    for kind in ["missing_delimiters", "insufficient_fields", "invalid_imei"] {
        metrics::counter!("tracker.parse_errors_total", "kind" => kind).absolute(0);
    }

    // Acknowledgment metrics
    metrics::counter!("tracker.acks.sent_total").absolute(0);
    metrics::counter!("tracker.acks.write_error_total").absolute(0);
}

/// Background task to update process metrics
/// Updates uptime and memory usage metrics every 5 seconds
pub async fn process_metrics_task() {
    let start_time = Instant::now();

    loop {
        metrics::gauge!("process.uptime.seconds").set(start_time.elapsed().as_secs() as f64);
        metrics::gauge!("process.is_up").set(1.0);

        // Resident memory from procfs (Linux-specific)
        #[cfg(target_os = "linux")]
        {
            if let Ok(status) = std::fs::read_to_string("/proc/self/status")
                && let Some(bytes) = parse_vm_rss_bytes(&status)
            {
                metrics::gauge!("process.memory.bytes").set(bytes);
            }
        }

        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}

/// Extract the `VmRSS` line of `/proc/self/status`, in bytes
fn parse_vm_rss_bytes(status: &str) -> Option<f64> {
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<f64>().ok())
        .map(|kb| kb * 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vm_rss() {
        let status = "Name:\tgateway\nVmPeak:\t  9000 kB\nVmRSS:\t  1200 kB\nThreads:\t4\n";
        assert_eq!(parse_vm_rss_bytes(status), Some(1200.0 * 1024.0));
        assert_eq!(parse_vm_rss_bytes("Name:\tgateway\n"), None);
    }
}
