use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;

use super::result::PingResult;
use crate::stats;

// Per-reply round-trip token. Covers `time=12.3 ms` (Unix) as well as
// `time=12ms` and `time<1ms` (Windows).
static RTT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"time[=<]\s*([0-9]+\.?[0-9]*)").expect("rtt regex"));

// "Packets: Sent = 4, Received = 4, Lost = 0 (0% loss)"
static WINDOWS_SUMMARY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Sent = (\d+), Received = (\d+), Lost = (\d+)").expect("summary regex"));

// "4 packets transmitted, 4 received, 0% packet loss"
static UNIX_SUMMARY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+) packets transmitted, (\d+) (?:packets )?received, ([0-9]+(?:\.[0-9]+)?)% packet loss")
        .expect("summary regex")
});

/// Pings `host` with the platform utility, `count` packets and a per-packet
/// timeout. The whole invocation is bounded by `count * timeout + 5s`; hitting
/// that bound, or failing to invoke the utility at all, yields a 100%-loss
/// result rather than an error.
pub async fn ping(host: &str, count: u32, timeout_ms: u64) -> PingResult {
    let mut cmd = Command::new("ping");
    if cfg!(windows) {
        cmd.arg("-n").arg(count.to_string());
        cmd.arg("-w").arg(timeout_ms.to_string());
    } else {
        // -W takes whole seconds
        let timeout_secs = std::cmp::max(1, timeout_ms / 1000);
        cmd.arg("-c").arg(count.to_string());
        cmd.arg("-W").arg(timeout_secs.to_string());
    }
    cmd.arg(host);

    let overall = Duration::from_millis(count as u64 * timeout_ms + 5_000);
    let output = match tokio::time::timeout(overall, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            log::debug!("ping {host}: failed to invoke ping utility: {err}");
            return PingResult::unreachable(count);
        }
        Err(_) => {
            log::debug!("ping {host}: utility did not finish within {overall:?}");
            return PingResult::unreachable(count);
        }
    };

    // A lossy run exits non-zero but still prints the summary; parse stdout
    // regardless of the exit status.
    let text = String::from_utf8_lossy(&output.stdout);
    parse_output(&text, count)
}

fn parse_output(out: &str, count: u32) -> PingResult {
    let mut rtts = Vec::new();
    for line in out.lines() {
        if let Some(caps) = RTT_RE.captures(line) {
            if let Ok(ms) = caps[1].parse::<f64>() {
                rtts.push(ms);
            }
        }
    }

    let mut sent = count;
    let mut received = 0;
    let mut loss_percent = 100.0;
    if let Some(caps) = WINDOWS_SUMMARY_RE.captures(out) {
        sent = caps[1].parse().unwrap_or(count);
        received = caps[2].parse().unwrap_or(0);
        let lost: u32 = caps[3].parse().unwrap_or(sent);
        loss_percent = if sent > 0 {
            lost as f64 / sent as f64 * 100.0
        } else {
            100.0
        };
    } else if let Some(caps) = UNIX_SUMMARY_RE.captures(out) {
        sent = caps[1].parse().unwrap_or(count);
        received = caps[2].parse().unwrap_or(0);
        loss_percent = caps[3].parse().unwrap_or(100.0);
    }

    let stats = stats::summarize(&rtts);
    PingResult {
        sent,
        received,
        loss_percent,
        rtts,
        stats,
    }
}
