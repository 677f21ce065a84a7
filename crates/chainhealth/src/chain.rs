//! Chain capabilities consumed by the health core.

use crate::marker::FailureMarker;
use async_trait::async_trait;
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::RwLock;

/// Name logged for chains that do not expose one.
pub const ANONYMOUS_CHAIN: &str = "-";

/// Transport requested from a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Tcp,
    Udp,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Tcp => write!(f, "tcp"),
            Network::Udp => write!(f, "udp"),
        }
    }
}

/// A byte stream established through a chain.
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> Connection for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Boxed connection handed out by [`Chain::dial`].
pub type BoxConnection = Box<dyn Connection>;

/// A forwarding route owned by the routing subsystem.
#[async_trait]
pub trait Chain: Send + Sync {
    /// Open a connection to `address` with every byte routed through this chain.
    ///
    /// Dropping the returned future abandons the dial.
    async fn dial(&self, network: Network, address: &str) -> io::Result<BoxConnection>;

    /// Display name, if the chain has one.
    fn name(&self) -> Option<&str> {
        None
    }

    /// Failure marker attached to this chain, if any.
    fn marker(&self) -> Option<Arc<dyn FailureMarker>> {
        None
    }
}

/// Name used when logging about `chain`.
pub fn display_name(chain: &dyn Chain) -> &str {
    chain.name().unwrap_or(ANONYMOUS_CHAIN)
}

/// Ordered set of chains monitored together.
///
/// Cheap to clone; clones share membership.
#[derive(Clone, Default)]
pub struct ChainSet {
    chains: Arc<RwLock<Vec<Arc<dyn Chain>>>>,
}

impl ChainSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set from existing chains, keeping their order
    pub fn from_chains(chains: impl IntoIterator<Item = Arc<dyn Chain>>) -> Self {
        Self {
            chains: Arc::new(RwLock::new(chains.into_iter().collect())),
        }
    }

    /// Append a chain
    pub async fn add(&self, chain: Arc<dyn Chain>) {
        self.chains.write().await.push(chain);
    }

    /// Remove every chain with the given name. Returns whether any was removed.
    pub async fn remove(&self, name: &str) -> bool {
        let mut chains = self.chains.write().await;
        let before = chains.len();
        chains.retain(|chain| chain.name() != Some(name));
        chains.len() != before
    }

    /// Copy of the current membership.
    ///
    /// Later additions and removals do not affect the returned list.
    pub async fn snapshot(&self) -> Vec<Arc<dyn Chain>> {
        self.chains.read().await.clone()
    }

    /// Number of chains
    pub async fn len(&self) -> usize {
        self.chains.read().await.len()
    }

    /// Whether the set is empty
    pub async fn is_empty(&self) -> bool {
        self.chains.read().await.is_empty()
    }
}
