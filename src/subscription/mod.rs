pub mod links;

use std::error::Error;
use std::time::Duration;

use crate::node::NodeDescriptor;

/// Fetches subscription text over HTTP. Providers routinely serve these
/// endpoints with self-signed or mismatched certificates, so verification is
/// off, matching the probing clients.
pub async fn fetch_text(url: &str, timeout: Duration) -> Result<String, Box<dyn Error>> {
    let client = reqwest::Client::builder()
        .timeout(timeout.max(Duration::from_secs(15)))
        .danger_accept_invalid_certs(true)
        .build()?;
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.text().await?)
}

/// Extracts node descriptors from subscription text: scan for proxy links
/// directly, and when none are present try treating the whole document as a
/// base64-encoded subscription. Undecodable links become `unknown`
/// descriptors; an empty result is valid output, not an error.
pub fn gather_nodes(text: &str) -> Vec<NodeDescriptor> {
    let mut found = links::find_links(text);
    if found.is_empty() {
        if let Some(decoded) = try_base64_document(text) {
            found = links::find_links(&decoded);
        }
    }
    found.iter().map(|link| links::parse_link(link)).collect()
}

// Whole-document base64 fallback: providers often serve the link list as one
// base64 blob. Accept it only if the decoded text actually contains links.
fn try_base64_document(text: &str) -> Option<String> {
    let compact: String = text.split_whitespace().collect();
    let bytes = links::decode_base64(&compact)?;
    let decoded = String::from_utf8_lossy(&bytes).into_owned();
    if links::find_links(&decoded).is_empty() {
        None
    } else {
        Some(decoded)
    }
}
