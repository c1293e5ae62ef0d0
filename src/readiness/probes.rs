//! Network probes
//!
//! Every individual test (TCP connect, proxied request) runs under its own
//! timeout. Groups of tests fan out with bounded concurrency, so a whole
//! tier takes about as long as its slowest single timeout.

use crate::config::{Config, ProxyConfig, ReadinessConfig};
use crate::readiness::Readiness;
use crate::url::NetworkType;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{redirect::Policy, Client, Proxy, StatusCode};
use std::fmt::Display;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;

/// Produces a readiness verdict for a network
///
/// Implementations convert every failure into a verdict; they never error.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, network: NetworkType) -> Readiness;
}

/// Checks that `address` (`host:port`) accepts a TCP connection in time
pub async fn tcp_probe(address: &str, timeout: Duration) -> io::Result<()> {
    match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("no answer within {:?}", timeout),
        )),
    }
}

/// Runs `test` against every target, at most `concurrency` at a time, and
/// returns how many passed within `per_test_timeout`
pub async fn bounded_probe<I, F, Fut, E>(
    targets: I,
    concurrency: usize,
    per_test_timeout: Duration,
    test: F,
) -> usize
where
    I: IntoIterator,
    I::Item: Display,
    F: Fn(I::Item) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    stream::iter(targets)
        .map(|target| {
            let label = target.to_string();
            let attempt = test(target);
            async move {
                match tokio::time::timeout(per_test_timeout, attempt).await {
                    Ok(Ok(())) => true,
                    Ok(Err(e)) => {
                        tracing::debug!(target = %label, "Probe failed: {}", e);
                        false
                    }
                    Err(_) => {
                        tracing::debug!(target = %label, "Probe timed out");
                        false
                    }
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .filter(|passed| futures::future::ready(*passed))
        .count()
        .await
}

/// Probes the configured Tor and I2P proxies
pub struct ProxyProber {
    proxy: ProxyConfig,
    user_agent: String,
    per_test_timeout: Duration,
    concurrency: usize,
}

impl ProxyProber {
    pub fn new(proxy: ProxyConfig, user_agent: String, readiness: &ReadinessConfig) -> Self {
        Self {
            proxy,
            user_agent,
            per_test_timeout: Duration::from_secs(readiness.per_test_timeout_secs),
            concurrency: readiness.probe_concurrency,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.proxy.clone(),
            config.user_agent.header_value(),
            &config.readiness,
        )
    }

    /// One client per probe, routed through `proxy_url`, never following redirects
    fn proxied_client(&self, proxy_url: &str) -> Result<Client, reqwest::Error> {
        Client::builder()
            .user_agent(self.user_agent.as_str())
            .timeout(self.per_test_timeout)
            .connect_timeout(self.per_test_timeout)
            .redirect(Policy::none())
            .proxy(Proxy::all(proxy_url)?)
            .build()
    }

    async fn probe_tor(&self) -> Readiness {
        let tor = &self.proxy.tor;
        let address = tor.address();

        if let Err(e) = tcp_probe(&address, self.per_test_timeout).await {
            return Readiness::error(
                NetworkType::Tor,
                format!("SOCKS port {} unreachable: {}", address, e),
            );
        }

        let client = match self.proxied_client(&tor.proxy_url()) {
            Ok(client) => client,
            Err(e) => {
                return Readiness::warning(
                    NetworkType::Tor,
                    format!("port reachable, network check unverified: {}", e),
                )
            }
        };

        match client.get(&tor.check_url).send().await {
            Ok(response) if response.status().is_success() => Readiness::ready(
                NetworkType::Tor,
                format!("routed request to {} succeeded", tor.check_url),
            ),
            Ok(response) => Readiness::warning(
                NetworkType::Tor,
                format!(
                    "port reachable, network check returned {}",
                    response.status()
                ),
            ),
            Err(e) => Readiness::warning(
                NetworkType::Tor,
                format!("port reachable, network check unverified: {}", e),
            ),
        }
    }

    async fn probe_i2p(&self) -> Readiness {
        let i2p = &self.proxy.i2p;
        let address = i2p.address();

        if let Err(e) = tcp_probe(&address, self.per_test_timeout).await {
            return Readiness::error(
                NetworkType::I2p,
                format!("HTTP proxy {} unreachable: {}", address, e),
            );
        }

        let client = match self.proxied_client(&i2p.proxy_url()) {
            Ok(client) => client,
            Err(e) => {
                return Readiness::warning(
                    NetworkType::I2p,
                    format!("proxy reachable, could not route test requests: {}", e),
                )
            }
        };

        let external_ok = bounded_probe(
            i2p.test_sites.iter(),
            self.concurrency,
            self.per_test_timeout,
            |site| {
                let client = client.clone();
                async move { site_answers(&client, site).await }
            },
        )
        .await;

        // An empty internal proxy list disables the third tier
        let active_proxies = if i2p.internal_proxies.is_empty() {
            None
        } else {
            let timeout = self.per_test_timeout;
            Some(
                bounded_probe(
                    i2p.internal_proxies.iter(),
                    self.concurrency,
                    timeout,
                    |proxy| async move { tcp_probe(proxy, timeout).await },
                )
                .await,
            )
        };

        let proxies_ok = active_proxies.map_or(true, |n| n >= i2p.min_active_proxies);
        let mut detail = format!(
            "{}/{} test sites answered",
            external_ok,
            i2p.test_sites.len()
        );
        if let Some(active) = active_proxies {
            detail.push_str(&format!(
                ", {}/{} internal proxies active (need {})",
                active,
                i2p.internal_proxies.len(),
                i2p.min_active_proxies
            ));
        }

        let readiness = if external_ok >= 1 && proxies_ok {
            Readiness::ready(NetworkType::I2p, detail)
        } else if external_ok == 0 {
            Readiness::warning(NetworkType::I2p, format!("no test site reachable: {}", detail))
        } else {
            Readiness::warning(NetworkType::I2p, format!("too few internal proxies: {}", detail))
        };
        readiness.with_counts(active_proxies.unwrap_or(0), external_ok)
    }
}

/// 2xx and 3xx prove routing; so does 429, which only a live site sends
async fn site_answers(client: &Client, site: &str) -> Result<(), String> {
    let response = client.get(site).send().await.map_err(|e| e.to_string())?;
    let status = response.status();
    if status.is_success() || status.is_redirection() || status == StatusCode::TOO_MANY_REQUESTS
    {
        Ok(())
    } else {
        Err(format!("status {}", status))
    }
}

#[async_trait]
impl Prober for ProxyProber {
    async fn probe(&self, network: NetworkType) -> Readiness {
        match network {
            NetworkType::Clearnet => Readiness::ready(NetworkType::Clearnet, "direct connection"),
            NetworkType::Tor => self.probe_tor().await,
            NetworkType::I2p => self.probe_i2p().await,
        }
    }
}
