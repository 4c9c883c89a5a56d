use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::Instant;

use super::result::TcpResult;
use crate::stats;

// Spacing between attempts so the probe does not flood the target.
const ATTEMPT_DELAY: Duration = Duration::from_millis(50);

/// Performs `attempts` sequential connection attempts against `host:port`,
/// each bounded by `timeout`. Attempts run one at a time so self-induced
/// contention does not skew the measured latencies. Successful connects are
/// closed immediately; their wall-clock time is recorded in milliseconds.
pub async fn repeated_connect(host: &str, port: u16, attempts: u32, timeout: Duration) -> TcpResult {
    let mut successes = 0;
    let mut rtts = Vec::new();

    for _ in 0..attempts {
        let start = Instant::now();
        match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => {
                successes += 1;
                rtts.push(start.elapsed().as_secs_f64() * 1000.0);
                drop(stream);
            }
            Ok(Err(err)) => {
                log::trace!("tcp {host}:{port}: connect failed: {err}");
            }
            Err(_) => {
                log::trace!("tcp {host}:{port}: connect timed out after {timeout:?}");
            }
        }
        tokio::time::sleep(ATTEMPT_DELAY).await;
    }

    let stats = stats::summarize(&rtts);
    TcpResult {
        attempts,
        successes,
        loss_percent: stats::loss_percent(attempts, successes),
        rtts,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn accepting_listener() -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
        });
        (addr, task)
    }

    #[tokio::test]
    async fn zero_attempts_is_full_loss() {
        let result = repeated_connect("127.0.0.1", 9, 0, Duration::from_millis(100)).await;
        assert_eq!(result.attempts, 0);
        assert_eq!(result.successes, 0);
        assert_eq!(result.loss_percent, 100.0);
        assert!(result.stats.is_none());
        assert!(!result.reachable());
    }

    #[tokio::test]
    async fn all_attempts_succeed_against_local_listener() {
        let (addr, server) = accepting_listener().await;
        let result =
            repeated_connect("127.0.0.1", addr.port(), 3, Duration::from_secs(1)).await;
        server.abort();

        assert_eq!(result.attempts, 3);
        assert_eq!(result.successes, 3);
        assert_eq!(result.loss_percent, 0.0);
        assert_eq!(result.rtts.len(), 3);
        assert!(result.reachable());

        let stats = result.stats.expect("latency samples recorded");
        let mean = result.rtts.iter().sum::<f64>() / result.rtts.len() as f64;
        assert!((stats.avg - mean).abs() < 1e-9);
    }

    #[tokio::test]
    async fn refused_connections_count_as_loss() {
        // Bind then drop to find a port nothing is listening on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            listener.local_addr().expect("local addr").port()
        };
        let result = repeated_connect("127.0.0.1", port, 2, Duration::from_millis(500)).await;
        assert_eq!(result.successes, 0);
        assert_eq!(result.loss_percent, 100.0);
        assert!(result.rtts.is_empty());
        assert!(result.stats.is_none());
        assert!(!result.reachable());
    }
}
