//! Shared outbound HTTP client.

use crate::config::HttpClientConfig;
use crate::error::RelayResult;
use reqwest::Client;

const USER_AGENT: &str = concat!("push-relay/", env!("CARGO_PKG_VERSION"));

/// Build the client every delivery task shares.
///
/// Proxy settings come from the environment (`HTTP_PROXY`, `HTTPS_PROXY`,
/// `NO_PROXY`), which reqwest honours by default.
pub fn build_client(config: &HttpClientConfig) -> RelayResult<Client> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(config.dial_timeout())
        .tcp_keepalive(config.keep_alive())
        .pool_idle_timeout(config.idle_conn_timeout())
        .pool_max_idle_per_host(config.pool_max_idle_per_host())
        .timeout(config.request_timeout())
        .build()?;
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_client_with_defaults() {
        assert!(build_client(&HttpClientConfig::default()).is_ok());
    }

    #[test]
    fn test_pool_size_capped_by_total() {
        let config = HttpClientConfig {
            max_idle_conns: 4,
            max_idle_conns_per_host: 16,
            ..Default::default()
        };
        assert_eq!(config.pool_max_idle_per_host(), 4);
        assert!(build_client(&config).is_ok());
    }

    #[test]
    fn test_zero_total_means_per_host_only() {
        let config = HttpClientConfig {
            max_idle_conns: 0,
            max_idle_conns_per_host: 3,
            ..Default::default()
        };
        assert_eq!(config.pool_max_idle_per_host(), 3);
    }
}
