use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::future::join_all;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::result::SpeedResult;

// Minimum span of one bandwidth measurement window.
const WINDOW: Duration = Duration::from_millis(500);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// Running totals shared by one node's download workers only.
#[derive(Default)]
struct Accumulator {
    total_bytes: u64,
    peak_bps: f64,
}

/// Streams `url` from `concurrency` independent workers until each stream
/// ends or `duration` elapses, and reports total bytes, average and peak
/// bandwidth. Each worker gets its own HTTP client, routed through `proxy`
/// when one is given. A worker whose connection or read fails just stops,
/// keeping whatever bytes it already counted.
pub async fn download_throughput(
    url: &str,
    proxy: Option<&str>,
    duration: Duration,
    concurrency: u32,
) -> SpeedResult {
    let deadline = Instant::now() + duration;
    let acc = Arc::new(Mutex::new(Accumulator::default()));

    let workers: Vec<_> = (0..concurrency.max(1))
        .map(|_| {
            tokio::spawn(download_worker(
                url.to_string(),
                proxy.map(str::to_string),
                deadline,
                Arc::clone(&acc),
            ))
        })
        .collect();
    for joined in join_all(workers).await {
        if let Err(err) = joined {
            log::debug!("speed worker aborted: {err}");
        }
    }

    let acc = acc.lock().await;
    let duration_secs = duration.as_secs_f64();
    let avg_bps = if duration_secs > 0.0 {
        acc.total_bytes as f64 / duration_secs
    } else {
        0.0
    };
    SpeedResult {
        total_bytes: acc.total_bytes,
        duration: duration_secs,
        avg_bps,
        peak_bps: acc.peak_bps,
    }
}

async fn download_worker(
    url: String,
    proxy: Option<String>,
    deadline: Instant,
    acc: Arc<Mutex<Accumulator>>,
) {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .danger_accept_invalid_certs(true);
    if let Some(proxy_url) = &proxy {
        match reqwest::Proxy::all(proxy_url) {
            Ok(proxy) => builder = builder.proxy(proxy),
            Err(err) => {
                log::warn!("speed: invalid proxy url {proxy_url}: {err}");
                return;
            }
        }
    }
    let client = match builder.build() {
        Ok(client) => client,
        Err(err) => {
            log::warn!("speed: failed to build http client: {err}");
            return;
        }
    };

    let now = Instant::now();
    if now >= deadline {
        return;
    }
    let response = match tokio::time::timeout(deadline - now, client.get(&url).send()).await {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => {
            log::debug!("speed: request to {url} failed: {err}");
            return;
        }
        Err(_) => {
            log::debug!("speed: request to {url} still pending at the deadline");
            return;
        }
    };
    let mut stream = response.bytes_stream();

    let mut window_start = Instant::now();
    let mut window_bytes: u64 = 0;
    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let chunk = match tokio::time::timeout(deadline - now, stream.next()).await {
            Ok(Some(Ok(chunk))) => chunk,
            Ok(Some(Err(err))) => {
                log::debug!("speed: read from {url} failed: {err}");
                break;
            }
            Ok(None) => break,
            Err(_) => break,
        };
        window_bytes += chunk.len() as u64;

        let now = Instant::now();
        let elapsed = now.duration_since(window_start);
        if elapsed >= WINDOW {
            let bandwidth = window_bytes as f64 / elapsed.as_secs_f64();
            let mut acc = acc.lock().await;
            acc.total_bytes += window_bytes;
            if bandwidth > acc.peak_bps {
                acc.peak_bps = bandwidth;
            }
            drop(acc);
            window_start = now;
            window_bytes = 0;
        }
    }

    // leftover partial window still counts toward the total
    if window_bytes > 0 {
        let mut acc = acc.lock().await;
        acc.total_bytes += window_bytes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    // Minimal HTTP/1.1 fixture: serves `chunks` pieces of `chunk_len` bytes,
    // pacing them so the transfer spans several measurement windows.
    async fn paced_http_server(
        chunk_len: usize,
        chunks: usize,
        pace: Duration,
    ) -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let task = tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    loop {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) if buf[..n].windows(4).any(|w| w == b"\r\n\r\n") => break,
                            Ok(_) => continue,
                        }
                    }
                    let total = chunk_len * chunks;
                    let header = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {total}\r\nConnection: close\r\n\r\n"
                    );
                    if stream.write_all(header.as_bytes()).await.is_err() {
                        return;
                    }
                    let body = vec![0x61u8; chunk_len];
                    for _ in 0..chunks {
                        if stream.write_all(&body).await.is_err() {
                            return;
                        }
                        let _ = stream.flush().await;
                        tokio::time::sleep(pace).await;
                    }
                });
            }
        });
        (addr, task)
    }

    #[tokio::test]
    async fn measures_paced_download() {
        let chunk_len = 32 * 1024;
        let chunks = 8;
        let (addr, server) = paced_http_server(chunk_len, chunks, Duration::from_millis(150)).await;
        let url = format!("http://{addr}/payload");

        let duration = Duration::from_secs(4);
        let result = download_throughput(&url, None, duration, 1).await;
        server.abort();

        let expected_total = (chunk_len * chunks) as u64;
        assert_eq!(result.total_bytes, expected_total);
        assert_eq!(result.duration, 4.0);
        assert!((result.avg_bps - expected_total as f64 / 4.0).abs() < 1e-6);
        // the stream was active for well under the configured duration, so
        // windowed bandwidth must exceed the configured-duration average
        assert!(result.peak_bps >= result.avg_bps);
    }

    #[tokio::test]
    async fn failed_connection_yields_empty_result() {
        // Bind then drop to get a port with no listener.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            listener.local_addr().expect("local addr").port()
        };
        let url = format!("http://127.0.0.1:{port}/payload");
        let result = download_throughput(&url, None, Duration::from_secs(1), 2).await;
        assert_eq!(result.total_bytes, 0);
        assert_eq!(result.avg_bps, 0.0);
        assert_eq!(result.peak_bps, 0.0);
    }

    #[tokio::test]
    async fn concurrent_workers_fold_into_one_total() {
        let chunk_len = 16 * 1024;
        let chunks = 4;
        let (addr, server) = paced_http_server(chunk_len, chunks, Duration::from_millis(100)).await;
        let url = format!("http://{addr}/payload");

        let result = download_throughput(&url, None, Duration::from_secs(3), 3).await;
        server.abort();

        // each worker downloads the whole payload once
        assert_eq!(result.total_bytes, (chunk_len * chunks * 3) as u64);
    }
}
