use std::net::SocketAddr;
use std::sync::RwLock;

/// A known peer, identified by its listen address
#[derive(Clone)]
pub struct Node {
    addr: String,
}

impl Node {
    fn new(addr: String) -> Node {
        Node { addr }
    }

    pub fn get_addr(&self) -> String {
        self.addr.clone()
    }

    pub fn parse_socket_addr(&self) -> Option<SocketAddr> {
        self.addr.parse().ok()
    }
}

/// Thread-safe peer registry. Addresses are deduplicated on insert and
/// evicted when a peer stops responding.
pub struct Nodes {
    inner: RwLock<Vec<Node>>,
}

impl Default for Nodes {
    fn default() -> Self {
        Self::new()
    }
}

impl Nodes {
    pub fn new() -> Nodes {
        Nodes {
            inner: RwLock::new(vec![]),
        }
    }

    pub fn add_node(&self, addr: String) {
        let mut inner = self
            .inner
            .write()
            .expect("Failed to acquire write lock on nodes - this should never happen");
        if !inner.iter().any(|x| x.get_addr().eq(addr.as_str())) {
            inner.push(Node::new(addr));
        }
    }

    pub fn evict_node(&self, addr: &str) {
        let mut inner = self
            .inner
            .write()
            .expect("Failed to acquire write lock on nodes - this should never happen");
        if let Some(idx) = inner.iter().position(|x| x.get_addr().eq(addr)) {
            inner.remove(idx);
        }
    }

    pub fn node_is_known(&self, addr: &str) -> bool {
        let inner = self
            .inner
            .read()
            .expect("Failed to acquire read lock on nodes - this should never happen");
        inner.iter().any(|x| x.get_addr().eq(addr))
    }

    pub fn get_nodes(&self) -> Vec<Node> {
        self.inner
            .read()
            .expect("Failed to acquire read lock on nodes - this should never happen")
            .to_vec()
    }

    pub fn get_addrs(&self) -> Vec<String> {
        self.get_nodes().iter().map(|n| n.get_addr()).collect()
    }

    /// Every known peer except the one a message came from
    pub fn broadcast_targets(&self, exclude: &str) -> Vec<String> {
        self.get_nodes()
            .iter()
            .map(|n| n.get_addr())
            .filter(|addr| addr != exclude)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .expect("Failed to acquire read lock on nodes - this should never happen")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner
            .read()
            .expect("Failed to acquire read lock on nodes - this should never happen")
            .is_empty()
    }
}
