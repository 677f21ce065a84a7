//! Forwarding chains built from HTTP CONNECT proxies.

use crate::config::ChainSettings;
use async_trait::async_trait;
use chainhealth::{AtomicMarker, BoxConnection, Chain, FailureMarker, Network};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Upper bound on a proxy's CONNECT response head
const MAX_RESPONSE_HEAD: usize = 8 * 1024;

/// A named route that tunnels through each hop in turn with `CONNECT`.
///
/// With no hops the chain dials the target directly.
pub struct ConnectChain {
    name: String,
    hops: Vec<String>,
    marker: Option<Arc<AtomicMarker>>,
}

impl ConnectChain {
    pub fn new(name: impl Into<String>, hops: Vec<String>, mark_failures: bool) -> Self {
        Self {
            name: name.into(),
            hops,
            marker: mark_failures.then(|| Arc::new(AtomicMarker::new())),
        }
    }

    pub fn from_settings(settings: &ChainSettings) -> Self {
        Self::new(
            settings.name.clone(),
            settings.hops.clone(),
            settings.mark_failures,
        )
    }

    pub fn hops(&self) -> &[String] {
        &self.hops
    }

    /// Concrete marker, for readers that want `last_marked`
    pub fn failure_marker(&self) -> Option<&Arc<AtomicMarker>> {
        self.marker.as_ref()
    }
}

#[async_trait]
impl Chain for ConnectChain {
    async fn dial(&self, network: Network, address: &str) -> io::Result<BoxConnection> {
        if network != Network::Tcp {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("chain {} only carries tcp, not {network}", self.name),
            ));
        }

        let Some((first, rest)) = self.hops.split_first() else {
            return Ok(Box::new(TcpStream::connect(address).await?));
        };

        let mut stream = TcpStream::connect(first.as_str()).await?;
        stream.set_nodelay(true)?;

        let targets = rest.iter().map(String::as_str).chain(std::iter::once(address));
        for target in targets {
            connect_through(&mut stream, target).await?;
            debug!(chain = %self.name, target, "Tunnel established");
        }

        Ok(Box::new(stream))
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn marker(&self) -> Option<Arc<dyn FailureMarker>> {
        self.marker
            .clone()
            .map(|marker| marker as Arc<dyn FailureMarker>)
    }
}

/// Ask the proxy at the far end of `stream` to open a tunnel to `target`.
///
/// On success the stream carries raw bytes to `target`. The response head is
/// read one byte at a time so no tunneled bytes are consumed.
pub async fn connect_through<S>(stream: &mut S, target: &str) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;
    stream.flush().await?;

    let head = read_response_head(stream).await?;
    let status_line = head.lines().next().unwrap_or_default();

    match parse_status(status_line) {
        Some(code) if (200..300).contains(&code) => Ok(()),
        Some(_) => Err(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            format!("proxy refused CONNECT {target}: {status_line}"),
        )),
        None => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("malformed proxy response: {status_line:?}"),
        )),
    }
}

async fn read_response_head<S>(stream: &mut S) -> io::Result<String>
where
    S: AsyncRead + Unpin,
{
    let mut head = Vec::with_capacity(128);
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_RESPONSE_HEAD {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "proxy response head too large",
            ));
        }
        head.push(stream.read_u8().await?);
    }

    String::from_utf8(head)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "proxy response is not utf-8"))
}

/// `HTTP/1.1 200 Connection established` -> 200
fn parse_status(line: &str) -> Option<u16> {
    let mut parts = line.split_whitespace();
    let version = parts.next()?;
    if !version.starts_with("HTTP/1.") {
        return None;
    }
    parts.next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("HTTP/1.1 200 Connection established"), Some(200));
        assert_eq!(parse_status("HTTP/1.0 407 Proxy Authentication Required"), Some(407));
        assert_eq!(parse_status("HTTP/1.1 204"), Some(204));
        assert_eq!(parse_status("SSH-2.0-OpenSSH"), None);
        assert_eq!(parse_status(""), None);
    }

    #[tokio::test]
    async fn test_connect_accepted() {
        let mut mock = Builder::new()
            .write(b"CONNECT cp.cloudflare.com:80 HTTP/1.1\r\nHost: cp.cloudflare.com:80\r\n\r\n")
            .read(b"HTTP/1.1 200 Connection established\r\nProxy-Agent: test\r\n\r\n")
            .build();

        connect_through(&mut mock, "cp.cloudflare.com:80").await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_leaves_tunneled_bytes_unread() {
        let mut mock = Builder::new()
            .write(b"CONNECT a:1 HTTP/1.1\r\nHost: a:1\r\n\r\n")
            .read(b"HTTP/1.1 200 OK\r\n\r\nHTTP/1.1 204")
            .build();

        connect_through(&mut mock, "a:1").await.unwrap();

        let mut rest = [0u8; 12];
        mock.read_exact(&mut rest).await.unwrap();
        assert_eq!(&rest, b"HTTP/1.1 204");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let mut mock = Builder::new()
            .write(b"CONNECT a:1 HTTP/1.1\r\nHost: a:1\r\n\r\n")
            .read(b"HTTP/1.1 403 Forbidden\r\n\r\n")
            .build();

        let err = connect_through(&mut mock, "a:1").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
        assert!(err.to_string().contains("403"));
    }

    #[tokio::test]
    async fn test_connect_closed_mid_head() {
        let mut mock = Builder::new()
            .write(b"CONNECT a:1 HTTP/1.1\r\nHost: a:1\r\n\r\n")
            .read(b"HTTP/1.1 200 OK\r\n")
            .build();

        let err = connect_through(&mut mock, "a:1").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_connect_garbage_reply() {
        let mut mock = Builder::new()
            .write(b"CONNECT a:1 HTTP/1.1\r\nHost: a:1\r\n\r\n")
            .read(b"SSH-2.0-OpenSSH_9.6\r\n\r\n")
            .build();

        let err = connect_through(&mut mock, "a:1").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_udp_is_unsupported() {
        let chain = ConnectChain::new("udp", vec!["127.0.0.1:1".to_string()], true);

        let err = match chain.dial(Network::Udp, "example.com:53").await {
            Err(e) => e,
            Ok(_) => panic!("udp dial should fail"),
        };
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[test]
    fn test_marker_follows_settings() {
        let marked = ConnectChain::new("a", Vec::new(), true);
        assert!(marked.marker().is_some());
        assert!(marked.failure_marker().is_some());

        let unmarked = ConnectChain::new("b", Vec::new(), false);
        assert!(unmarked.marker().is_none());
        assert_eq!(unmarked.name(), Some("b"));
    }

    #[test]
    fn test_marker_is_shared() {
        let chain = ConnectChain::new("a", Vec::new(), true);
        chain.marker().unwrap().mark();
        assert_eq!(chain.failure_marker().unwrap().count(), 1);
    }
}
