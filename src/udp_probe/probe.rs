use std::time::Duration;

use rand::Rng;
use tokio::net::UdpSocket;
use tokio::time::Instant;

use super::result::UdpResult;
use crate::stats;

const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Sends one random-payload datagram of `packet_size` bytes every `interval`
/// until `duration` elapses. With `expect_echo` set, each send waits up to one
/// second for a reply and records its round-trip time; a receive timeout is a
/// per-packet loss, not an error.
pub async fn udp_simulate(
    host: &str,
    port: u16,
    duration: Duration,
    packet_size: usize,
    interval: Duration,
    expect_echo: bool,
) -> UdpResult {
    let socket = match UdpSocket::bind("0.0.0.0:0").await {
        Ok(socket) => socket,
        Err(err) => {
            log::debug!("udp {host}:{port}: failed to open socket: {err}");
            return UdpResult::unavailable();
        }
    };
    if let Err(err) = socket.connect((host, port)).await {
        log::debug!("udp {host}:{port}: target did not resolve: {err}");
        return UdpResult::unavailable();
    }

    let mut payload = vec![0u8; packet_size];
    rand::thread_rng().fill(&mut payload[..]);

    let deadline = Instant::now() + duration;
    let mut sent = 0;
    let mut received = 0;
    let mut rtts = Vec::new();
    let mut reply_buf = [0u8; 2048];

    while Instant::now() < deadline {
        let start = Instant::now();
        match socket.send(&payload).await {
            Ok(_) => {
                sent += 1;
                if expect_echo {
                    match tokio::time::timeout(RECV_TIMEOUT, socket.recv(&mut reply_buf)).await {
                        Ok(Ok(_)) => {
                            received += 1;
                            rtts.push(start.elapsed().as_secs_f64() * 1000.0);
                        }
                        Ok(Err(err)) => {
                            log::trace!("udp {host}:{port}: recv failed: {err}");
                        }
                        Err(_) => {} // reply never came; plain packet loss
                    }
                }
            }
            Err(err) => {
                log::trace!("udp {host}:{port}: send failed: {err}");
            }
        }
        tokio::time::sleep(interval).await;
    }

    let duration_secs = duration.as_secs_f64();
    let pps = if duration_secs > 0.0 {
        sent as f64 / duration_secs
    } else {
        0.0
    };
    let stats = stats::summarize(&rtts);
    UdpResult {
        sent,
        received,
        loss_percent: stats::loss_percent(sent, received),
        rtts,
        pps,
        stats,
    }
}
