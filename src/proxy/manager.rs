use std::process::Stdio;
use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::time::{Instant, sleep, timeout};

use crate::node::{NodeDescriptor, Transport};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const STOP_GRACE: Duration = Duration::from_secs(2);
const KILL_WAIT: Duration = Duration::from_secs(1);

/// A proxy client process running on loopback for the lifetime of one node's
/// probe sequence. Owns the child process, its two inbound ports and the
/// temporary directory holding its configuration; all three are released by
/// [`ProxyHandle::stop`] or, as a last resort, on drop.
pub struct ProxyHandle {
    child: Option<Child>,
    dir: Option<TempDir>,
    socks_port: u16,
    http_port: u16,
}

impl ProxyHandle {
    pub fn socks_url(&self) -> String {
        format!("socks5h://127.0.0.1:{}", self.socks_port)
    }

    pub fn http_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.http_port)
    }

    /// Terminates the child and removes the config directory. Safe to call
    /// more than once; every step is best-effort and never propagates.
    pub async fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            terminate(&mut child).await;
        }
        if let Some(dir) = self.dir.take() {
            if let Err(err) = dir.close() {
                log::debug!("proxy: temp dir cleanup failed: {err}");
            }
        }
    }
}

impl Drop for ProxyHandle {
    fn drop(&mut self) {
        // stop() was skipped; force-kill so no child outlives the handle.
        // TempDir removes the config directory on its own drop.
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
    }
}

/// Starts the proxy binary for `node` and waits until its SOCKS inbound
/// accepts connections. Returns `None` for protocols the proxy cannot carry,
/// and for any startup failure. Failed attempts kill the child and remove the
/// config directory before returning, so nothing leaks out of them.
pub async fn start(
    node: &NodeDescriptor,
    binary: &str,
    startup_timeout: Duration,
) -> Option<ProxyHandle> {
    let outbound = outbound(node)?;

    let (socks_port, http_port) = free_port_pair()?;
    let dir = match tempfile::Builder::new().prefix("nodecheck-proxy-").tempdir() {
        Ok(dir) => dir,
        Err(err) => {
            log::warn!("proxy: failed to create temp dir: {err}");
            return None;
        }
    };

    let config = client_config(socks_port, http_port, outbound);
    let config_path = dir.path().join("config.json");
    let rendered = match serde_json::to_vec(&config) {
        Ok(bytes) => bytes,
        Err(err) => {
            log::warn!("proxy: failed to render config: {err}");
            return None; // dir dropped here, removing it
        }
    };
    if let Err(err) = std::fs::write(&config_path, rendered) {
        log::warn!("proxy: failed to write {}: {err}", config_path.display());
        return None;
    }

    let mut child = match Command::new(binary)
        .arg("-config")
        .arg(&config_path)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            log::warn!("proxy: failed to launch {binary}: {err}");
            return None;
        }
    };

    // Poll the SOCKS inbound until the process is ready to accept.
    let started = Instant::now();
    loop {
        if started.elapsed() >= startup_timeout {
            log::debug!(
                "proxy for {}: not accepting after {startup_timeout:?}, giving up",
                node.label()
            );
            terminate(&mut child).await;
            return None; // dir dropped here, removing it
        }
        if TcpStream::connect(("127.0.0.1", socks_port)).await.is_ok() {
            break;
        }
        sleep(POLL_INTERVAL).await;
    }

    Some(ProxyHandle {
        child: Some(child),
        dir: Some(dir),
        socks_port,
        http_port,
    })
}

/// Minimal single-outbound client document for protocols the proxy binary
/// supports. Anything else is not routable and yields `None`.
fn outbound(node: &NodeDescriptor) -> Option<Value> {
    let host = node.host.as_deref()?;
    let port = node.port?;
    match &node.transport {
        Transport::Vmess { user_id, .. } => {
            let id = user_id.as_deref()?;
            Some(json!({
                "protocol": "vmess",
                "settings": {
                    "vnext": [{
                        "address": host,
                        "port": port,
                        "users": [{"id": id}]
                    }]
                }
            }))
        }
        Transport::Vless { user_id, .. } => {
            let id = user_id.as_deref()?;
            Some(json!({
                "protocol": "vless",
                "settings": {
                    "vnext": [{
                        "address": host,
                        "port": port,
                        "users": [{"id": id, "flow": ""}]
                    }]
                }
            }))
        }
        Transport::Trojan { .. } | Transport::Shadowsocks { .. } | Transport::Unknown => None,
    }
}

fn client_config(socks_port: u16, http_port: u16, outbound: Value) -> Value {
    json!({
        "log": {"access": "", "error": "", "loglevel": "warning"},
        "inbounds": [
            {
                "listen": "127.0.0.1",
                "port": socks_port,
                "protocol": "socks",
                "settings": {"udp": true}
            },
            {
                "listen": "127.0.0.1",
                "port": http_port,
                "protocol": "http",
                "settings": {}
            }
        ],
        "outbounds": [
            outbound,
            {"protocol": "freedom", "settings": {}}
        ]
    })
}

// Two OS-assigned ephemeral loopback ports. Both listeners are held until
// both ports are known, so the pair is guaranteed distinct.
fn free_port_pair() -> Option<(u16, u16)> {
    fn bind_ephemeral() -> Option<std::net::TcpListener> {
        match std::net::TcpListener::bind(("127.0.0.1", 0)) {
            Ok(listener) => Some(listener),
            Err(err) => {
                log::warn!("proxy: failed to allocate ephemeral port: {err}");
                None
            }
        }
    }

    let first = bind_ephemeral()?;
    let second = bind_ephemeral()?;
    let ports = (
        first.local_addr().ok()?.port(),
        second.local_addr().ok()?.port(),
    );
    Some(ports)
}

// Graceful termination with a short grace period, then a forceful kill.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            if timeout(STOP_GRACE, child.wait()).await.is_ok() {
                return;
            }
        }
    }
    if let Err(err) = child.kill().await {
        log::debug!("proxy: kill failed (already gone?): {err}");
    }
    let _ = timeout(KILL_WAIT, child.wait()).await;
}
