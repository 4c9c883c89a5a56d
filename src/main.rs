use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

pub mod config;
pub mod node;
pub mod orchestrator;
pub mod ping_probe;
pub mod proxy;
pub mod speed_probe;
pub mod stats;
pub mod subscription;
pub mod tcp_probe;
pub mod udp_probe;

use config::app_config::{SubscriptionSource, load_config};
use node::NodeResult;
use orchestrator::{Observer, ProgressEvent};

fn to_fixed_width(input: &str, width: usize) -> String {
    use unicode_truncate::UnicodeTruncateStr;

    let (truncated, _) = input.unicode_truncate(width);
    format!("{:<width$}", truncated, width = width)
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    if let Err(err) = run().await {
        log::error!("{err}");
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let app = load_config()?;

    let text = match &app.subscription {
        SubscriptionSource::Url(url) => {
            println!("Fetching {url}...");
            subscription::fetch_text(url, Duration::from_secs(15)).await?
        }
        SubscriptionSource::File(path) => std::fs::read_to_string(path)?,
    };

    let nodes = subscription::gather_nodes(&text);
    println!("Found {} nodes", nodes.len());
    if nodes.is_empty() {
        return Err("subscription contained no recognizable node links".into());
    }

    let name_width = nodes
        .iter()
        .map(|node| node.label().chars().count())
        .max()
        .unwrap_or(10)
        .clamp(10, 40);

    let total = nodes.len();
    let observer: Observer = Arc::new(move |event| {
        if let ProgressEvent::NodeFinished { index, reachable } = event {
            log::info!(
                "[{}/{total}] node finished, reachable={reachable}",
                index + 1
            );
        }
    });

    let results = orchestrator::run(nodes, Arc::new(app.settings), Some(observer)).await;

    let report = serde_json::json!({
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "nodes": results,
    });
    std::fs::write(&app.output, serde_json::to_vec_pretty(&report)?)?;
    println!("Wrote results to {}", app.output.display());

    for result in &results {
        println!("{}", summary_line(result, name_width));
    }
    Ok(())
}

fn summary_line(result: &NodeResult, name_width: usize) -> String {
    let name = to_fixed_width(&result.node.label(), name_width);
    let host = to_fixed_width(result.node.host.as_deref().unwrap_or("-"), 20);
    let port = result
        .node
        .port
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".to_string());
    let state = if result.reachable { "OK" } else { "DOWN" };

    let (loss, ratio, p95) = match &result.tcp {
        Some(tcp) => (
            format!("{:.1}%", tcp.loss_percent),
            format!("{}/{}", tcp.successes, tcp.attempts),
            tcp.stats
                .map(|s| format!("{:.1} ms", s.p95))
                .unwrap_or_else(|| "-".to_string()),
        ),
        None => ("-".to_string(), "-".to_string(), "-".to_string()),
    };
    let ping_loss = result
        .ping
        .as_ref()
        .map(|ping| format!("{:.0}%", ping.loss_percent))
        .unwrap_or_else(|| "-".to_string());
    let speed = result
        .speed
        .map(|speed| format!("{:.2} MB/s", speed.avg_bps / 1024.0 / 1024.0))
        .unwrap_or_else(|| "-".to_string());
    let pps = result
        .game
        .as_ref()
        .map(|game| format!("{:.1}", game.pps))
        .unwrap_or_else(|| "-".to_string());

    format!(
        "{name} {host} {port:6} {state:6} loss:{loss:7} tcp:{ratio:8} p95:{p95:10} ping:{ping_loss:5} speed:{speed:11} pps:{pps}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeDescriptor, Transport};

    #[test]
    fn fixed_width_pads_and_truncates() {
        assert_eq!(to_fixed_width("ab", 4), "ab  ");
        assert_eq!(to_fixed_width("abcdef", 4), "abcd");
    }

    #[test]
    fn summary_line_handles_empty_results() {
        let result = NodeResult::empty(NodeDescriptor::undecoded(Transport::Unknown, "x://y"));
        let line = summary_line(&result, 10);
        assert!(line.contains("DOWN"));
        assert!(line.contains("loss:-"));
        assert!(line.contains("speed:-"));
    }
}
