use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::Semaphore;

use super::{Observer, ProbeKind, ProgressEvent};
use crate::config::ProbeSettings;
use crate::node::{NodeDescriptor, NodeResult};
use crate::{ping_probe, proxy, speed_probe, tcp_probe, udp_probe};

/// Runs the probe battery over `nodes` on a worker pool bounded by
/// `settings.workers`. Every node yields exactly one [`NodeResult`]; a task
/// that dies mid-sequence is replaced by an empty result for its node and
/// never disturbs the others.
pub async fn run(
    nodes: Vec<NodeDescriptor>,
    settings: Arc<ProbeSettings>,
    observer: Option<Observer>,
) -> Vec<NodeResult> {
    let semaphore = Arc::new(Semaphore::new(settings.workers.max(1)));

    let mut fallbacks = Vec::with_capacity(nodes.len());
    let mut tasks = Vec::with_capacity(nodes.len());
    for (index, node) in nodes.into_iter().enumerate() {
        fallbacks.push(node.clone());
        let semaphore = Arc::clone(&semaphore);
        let settings = Arc::clone(&settings);
        let observer = observer.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            probe_node(index, node, &settings, observer.as_deref()).await
        }));
    }

    let mut results = Vec::with_capacity(fallbacks.len());
    for (joined, fallback) in join_all(tasks).await.into_iter().zip(fallbacks) {
        match joined {
            Ok(result) => results.push(result),
            Err(err) => {
                log::warn!("probe task for {} died: {err}", fallback.label());
                results.push(NodeResult::empty(fallback));
            }
        }
    }
    results
}

// One node's strictly sequential probe sequence:
// proxy? -> ping -> tcp -> speed -> udp -> proxy release.
async fn probe_node(
    index: usize,
    node: NodeDescriptor,
    settings: &ProbeSettings,
    observer: Option<&(dyn Fn(ProgressEvent) + Send + Sync)>,
) -> NodeResult {
    let emit = |event: ProgressEvent| {
        if let Some(observer) = observer {
            observer(event);
        }
    };
    emit(ProgressEvent::NodeStarted {
        index,
        label: node.label(),
    });

    let mut proxy_handle = if settings.proxy.enabled {
        proxy::start(
            &node,
            &settings.proxy.binary,
            Duration::from_secs(settings.proxy.startup_timeout_secs),
        )
        .await
    } else {
        None
    };
    let proxy_http = proxy_handle.as_ref().map(|handle| handle.http_url());

    let ping = match node.host.as_deref() {
        Some(host) => {
            let result =
                ping_probe::ping(host, settings.ping.count, settings.ping.timeout_ms).await;
            emit(ProgressEvent::ProbeFinished {
                index,
                probe: ProbeKind::Ping,
            });
            Some(result)
        }
        None => None,
    };

    let tcp = match (node.host.as_deref(), node.port) {
        (Some(host), Some(port)) => {
            let result = tcp_probe::repeated_connect(
                host,
                port,
                settings.tcp.attempts,
                Duration::from_secs(settings.tcp.timeout_secs),
            )
            .await;
            emit(ProgressEvent::ProbeFinished {
                index,
                probe: ProbeKind::Tcp,
            });
            Some(result)
        }
        _ => None,
    };
    let reachable = tcp.as_ref().is_some_and(|tcp| tcp.reachable());

    let speed = if settings.speed.enabled {
        let result = speed_probe::download_throughput(
            &settings.speed.url,
            proxy_http.as_deref(),
            Duration::from_secs(settings.speed.duration_secs),
            settings.speed.concurrency,
        )
        .await;
        emit(ProgressEvent::ProbeFinished {
            index,
            probe: ProbeKind::Speed,
        });
        Some(result)
    } else {
        None
    };

    let game = if settings.udp.enabled {
        match settings.udp.target_parts() {
            Some((host, port)) => {
                let result = udp_probe::udp_simulate(
                    &host,
                    port,
                    Duration::from_secs(settings.udp.duration_secs),
                    settings.udp.packet_size,
                    Duration::from_millis(settings.udp.interval_ms),
                    settings.udp.expect_echo,
                )
                .await;
                emit(ProgressEvent::ProbeFinished {
                    index,
                    probe: ProbeKind::Udp,
                });
                Some(result)
            }
            None => None,
        }
    } else {
        None
    };

    if let Some(handle) = proxy_handle.as_mut() {
        handle.stop().await;
    }

    emit(ProgressEvent::NodeFinished { index, reachable });

    NodeResult {
        node,
        ping,
        tcp,
        reachable,
        speed,
        game,
    }
}
