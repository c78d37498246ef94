//! Relay credential types and URL filtering

use serde::{Deserialize, Serialize};
use url::Url;

/// Short-lived relay credentials handed to the loss-probe client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnCredentials {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}

/// Keep only UDP-transport relay URLs (`turn:` scheme with
/// `?transport=udp`). TCP and TLS relay variants are excluded: only UDP
/// loss characteristics are relevant to the probe.
pub fn filter_udp_relay_urls(urls: &[String]) -> Vec<String> {
    urls.iter()
        .filter(|raw| is_udp_relay_url(raw))
        .cloned()
        .collect()
}

fn is_udp_relay_url(raw: &str) -> bool {
    let Ok(url) = Url::parse(raw) else {
        return false;
    };
    url.scheme() == "turn"
        && url
            .query_pairs()
            .any(|(key, value)| key == "transport" && value == "udp")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_udp_turn_urls_survive() {
        let urls = vec![
            "turn:host:3478?transport=udp".to_string(),
            "turn:host:3478?transport=tcp".to_string(),
            "turns:host:5349?transport=udp".to_string(),
        ];
        assert_eq!(
            filter_udp_relay_urls(&urls),
            vec!["turn:host:3478?transport=udp".to_string()]
        );
    }

    #[test]
    fn missing_transport_parameter_is_excluded() {
        let urls = vec!["turn:host:3478".to_string()];
        assert!(filter_udp_relay_urls(&urls).is_empty());
    }

    #[test]
    fn unparsable_urls_are_excluded() {
        let urls = vec!["not a url".to_string()];
        assert!(filter_udp_relay_urls(&urls).is_empty());
    }
}
