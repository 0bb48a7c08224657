//! Network reachability checks.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::debug;
use url::Url;

/// Reports whether the remote service can currently be reached.
pub trait Connectivity: Send + Sync {
  /// True only if the device is connected *and* the internet is reachable.
  /// Any failure while checking counts as offline.
  fn is_online(&self) -> impl Future<Output = bool> + Send;
}

/// Probes the API host: "connected" means the host name resolves,
/// "reachable" means a HEAD request gets any HTTP response.
#[derive(Clone)]
pub struct ProbeConnectivity {
  client: Client,
  target: Url,
}

impl ProbeConnectivity {
  pub fn new(target: Url, timeout: Duration) -> color_eyre::Result<Self> {
    let client = Client::builder()
      .timeout(timeout)
      .connect_timeout(timeout)
      .build()?;
    Ok(Self { client, target })
  }

  async fn is_connected(&self) -> bool {
    let Some(host) = self.target.host_str() else {
      return false;
    };
    let port = self.target.port_or_known_default().unwrap_or(443);

    match tokio::net::lookup_host((host, port)).await {
      Ok(mut addrs) => addrs.next().is_some(),
      Err(e) => {
        debug!(host, error = %e, "Host lookup failed");
        false
      }
    }
  }

  async fn is_reachable(&self) -> bool {
    match self.client.head(self.target.clone()).send().await {
      Ok(_) => true,
      Err(e) => {
        debug!(target = %self.target, error = %e, "Reachability probe failed");
        false
      }
    }
  }
}

impl Connectivity for ProbeConnectivity {
  async fn is_online(&self) -> bool {
    self.is_connected().await && self.is_reachable().await
  }
}

/// Connectivity with a fixed answer that can be flipped at runtime.
/// Backs `--offline` and the tests.
#[derive(Clone, Debug)]
pub struct StaticConnectivity {
  online: Arc<AtomicBool>,
}

impl StaticConnectivity {
  pub fn new(online: bool) -> Self {
    Self {
      online: Arc::new(AtomicBool::new(online)),
    }
  }

  #[cfg(test)]
  pub fn set_online(&self, online: bool) {
    self.online.store(online, Ordering::SeqCst);
  }
}

impl Connectivity for StaticConnectivity {
  async fn is_online(&self) -> bool {
    self.online.load(Ordering::SeqCst)
  }
}

/// Either probe the network or answer from a fixed flag.
#[derive(Clone)]
pub enum AnyConnectivity {
  Probe(ProbeConnectivity),
  Static(StaticConnectivity),
}

impl Connectivity for AnyConnectivity {
  async fn is_online(&self) -> bool {
    match self {
      AnyConnectivity::Probe(probe) => probe.is_online().await,
      AnyConnectivity::Static(fixed) => fixed.is_online().await,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use wiremock::matchers::method;
  use wiremock::{Mock, MockServer, ResponseTemplate};

  #[tokio::test]
  async fn test_static_connectivity_toggles() {
    let oracle = StaticConnectivity::new(false);
    assert!(!oracle.is_online().await);

    let shared = oracle.clone();
    shared.set_online(true);
    assert!(oracle.is_online().await);
  }

  #[tokio::test]
  async fn test_probe_reachable_on_any_status() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
      .respond_with(ResponseTemplate::new(404))
      .mount(&server)
      .await;

    let target = Url::parse(&server.uri()).unwrap();
    let probe = ProbeConnectivity::new(target, Duration::from_secs(2)).unwrap();
    assert!(probe.is_online().await);
  }

  #[tokio::test]
  async fn test_probe_unreachable_is_offline() {
    // Bind then drop a listener so the port is very likely closed
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let target = Url::parse(&format!("http://127.0.0.1:{}/api", port)).unwrap();
    let probe = ProbeConnectivity::new(target, Duration::from_millis(500)).unwrap();
    assert!(!probe.is_online().await);
  }

  #[tokio::test]
  async fn test_probe_without_host_is_offline() {
    let target = Url::parse("file:///tmp/nowhere").unwrap();
    let probe = ProbeConnectivity::new(target, Duration::from_millis(200)).unwrap();
    assert!(!probe.is_online().await);
  }
}
