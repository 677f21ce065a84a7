//! Liveness probes routed through a chain.

use crate::chain::{Chain, Network};
use crate::types::{ProbeError, ProbeOutcome};
use async_trait::async_trait;
use hyper::body::{Body, Incoming};
use hyper::client::conn::http1;
use hyper::header::{CONNECTION, HOST, HeaderValue, USER_AGENT};
use hyper::{Method, Request, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

const PROBE_USER_AGENT: &str = concat!("chainhealth/", env!("CARGO_PKG_VERSION"));

/// Performs one bounded liveness check of a chain.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Check `chain`, giving up once `timeout` has elapsed.
    async fn probe(&self, chain: &dyn Chain, timeout: Duration) -> ProbeOutcome;
}

/// Probes a chain with a single `GET` against a 204 oracle.
///
/// The request never touches a direct network path: the TCP stream comes
/// from [`Chain::dial`] and HTTP/1.1 is spoken over it in place.
#[derive(Debug, Clone)]
pub struct HttpProber {
    url: Uri,
    /// `host:port` handed to the chain
    address: String,
    host: HeaderValue,
    path: Uri,
}

impl HttpProber {
    /// Build a prober for an `http://` oracle URL.
    pub fn new(url: &str) -> common::Result<Self> {
        let uri: Uri = url
            .parse()
            .map_err(|e| common::Error::probe(format!("invalid probe url {url}: {e}")))?;

        match uri.scheme_str() {
            Some("http") => {}
            Some(other) => {
                return Err(common::Error::probe(format!(
                    "unsupported probe url scheme {other}, only http is supported"
                )));
            }
            None => {
                return Err(common::Error::probe(format!(
                    "probe url {url} must be absolute"
                )));
            }
        }

        let host = uri
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| common::Error::probe(format!("probe url {url} has no host")))?;
        let port = uri.port_u16().unwrap_or(80);
        let address = format!("{host}:{port}");

        let host_header = match uri.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let host = HeaderValue::from_str(&host_header)
            .map_err(|e| common::Error::probe(format!("invalid probe host {host_header}: {e}")))?;

        let path = match (uri.path(), uri.query()) {
            ("", Some(query)) => format!("/?{query}"),
            ("", None) => "/".to_string(),
            (path, Some(query)) => format!("{path}?{query}"),
            (path, None) => path.to_string(),
        };
        let path = path
            .parse::<Uri>()
            .map_err(|e| common::Error::probe(format!("invalid probe path {path}: {e}")))?;

        Ok(Self {
            url: uri,
            address,
            host,
            path,
        })
    }

    /// Oracle URL
    pub fn url(&self) -> &Uri {
        &self.url
    }

    /// `host:port` the chain is asked to reach
    pub fn address(&self) -> &str {
        &self.address
    }

    fn request(&self) -> Request<String> {
        let mut request = Request::new(String::new());
        *request.method_mut() = Method::GET;
        *request.uri_mut() = self.path.clone();

        let headers = request.headers_mut();
        headers.insert(HOST, self.host.clone());
        headers.insert(USER_AGENT, HeaderValue::from_static(PROBE_USER_AGENT));
        headers.insert(CONNECTION, HeaderValue::from_static("close"));
        request
    }

    async fn exchange(&self, chain: &dyn Chain) -> ProbeOutcome {
        let stream = chain
            .dial(Network::Tcp, &self.address)
            .await
            .map_err(ProbeError::Dial)?;

        let (mut sender, connection) = http1::handshake::<_, String>(TokioIo::new(stream)).await?;
        let request = self.request();

        // The connection future resolves once the sender is dropped, so both
        // halves finish together and nothing outlives the probe.
        let exchange = async move {
            let response = sender.send_request(request).await?;
            let status = response.status();
            drain(response.into_body()).await?;
            Ok::<_, hyper::Error>(status)
        };
        let (status, closed) = tokio::join!(exchange, connection);
        let status = status?;

        if let Err(e) = closed {
            debug!(address = %self.address, error = %e, "Probe connection closed with error");
        }

        if status == StatusCode::NO_CONTENT {
            Ok(())
        } else {
            Err(ProbeError::UnexpectedStatus(status.as_u16()))
        }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, chain: &dyn Chain, budget: Duration) -> ProbeOutcome {
        match timeout(budget, self.exchange(chain)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProbeError::Timeout(budget)),
        }
    }
}

/// Read the body to the end so the connection shuts down cleanly.
async fn drain(body: Incoming) -> Result<(), hyper::Error> {
    let mut body = std::pin::pin!(body);
    while let Some(frame) = std::future::poll_fn(|cx| body.as_mut().poll_frame(cx)).await {
        frame?;
    }
    Ok(())
}
