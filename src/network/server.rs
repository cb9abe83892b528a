use crate::config::GLOBAL_CONFIG;
use crate::core::{Block, Blockchain, Transaction};
use crate::error::{BlockchainError, Result};
use crate::network::GLOBAL_NODES;
use crate::storage::GLOBAL_MEMORY_POOL;
use crate::wallet::{validate_address, Keyring};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Deserializer;
use std::io::{BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

const NODE_VERSION: usize = 1;
const TCP_WRITE_TIMEOUT: u64 = 5000;

/// Wire messages: gossip between nodes plus client RPC requests, all
/// JSON-framed over TCP.
#[derive(Debug, Serialize, Deserialize)]
pub enum Package {
    Version {
        addr_from: String,
        version: usize,
        best_height: u64,
    },
    Block {
        addr_from: String,
        block: Vec<u8>,
    },
    Tx {
        addr_from: String,
        transaction: Vec<u8>,
    },
    GetInfo,
    GetBlock {
        height: u64,
    },
    SendTx {
        to: String,
        value: f64,
        data: String,
    },
    SendSignedTx {
        public_key: Vec<u8>,
        signature: Vec<u8>,
        to: String,
        value: f64,
        nonce: u64,
        timestamp: i64,
        data: String,
    },
    NewAddress,
}

/// RPC replies. Gossip messages get no reply.
#[derive(Debug, Serialize, Deserialize)]
pub enum Response {
    Info {
        node_id: String,
        height: u64,
        head_hash: String,
        address: String,
        balance: f64,
        peers: Vec<String>,
    },
    Block {
        block: Option<Vec<u8>>,
    },
    TxAccepted {
        id: String,
    },
    Address {
        address: String,
    },
    Error {
        kind: String,
        message: String,
    },
}

/// Failure category exposed to RPC clients
fn error_kind(e: &BlockchainError) -> &'static str {
    match e {
        BlockchainError::Transaction(_)
        | BlockchainError::InvalidAddress(_)
        | BlockchainError::InvalidBlock(_)
        | BlockchainError::InvalidHeight
        | BlockchainError::InvalidHash
        | BlockchainError::NotEnoughBalance
        | BlockchainError::AlreadyHasPendingTx => "validation",
        BlockchainError::Database(_)
        | BlockchainError::Io(_)
        | BlockchainError::Serialization(_)
        | BlockchainError::BlockNotFound
        | BlockchainError::CheckBalanceFailed(_)
        | BlockchainError::ExchangeNotOnline => "storage",
        _ => "internal",
    }
}

fn error_response(e: &BlockchainError) -> Response {
    Response::Error {
        kind: error_kind(e).to_string(),
        message: e.to_string(),
    }
}

/// Node server: accepts gossip from peers and RPC from clients on the same
/// listener. A winning foreign block cancels the local mining search
/// through the shared flag.
pub struct Server {
    blockchain: Blockchain,
    keyring: Arc<RwLock<Keyring>>,
    mining_cancel: Arc<AtomicBool>,
}

impl Server {
    pub fn new(
        blockchain: Blockchain,
        keyring: Arc<RwLock<Keyring>>,
        mining_cancel: Arc<AtomicBool>,
    ) -> Server {
        Server {
            blockchain,
            keyring,
            mining_cancel,
        }
    }

    pub fn run(&self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .map_err(|e| BlockchainError::Network(format!("Failed to bind to {addr}: {e}")))?;
        info!("Server listening on {addr}");

        // announce ourselves to the configured peers
        for peer in &GLOBAL_CONFIG.node.peers {
            GLOBAL_NODES.add_node(peer.clone());
            if let Err(e) = send_version(peer, self.blockchain.get_height()) {
                warn!("Could not reach configured peer {peer}: {e}");
            }
        }

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let peer_addr = match stream.peer_addr() {
                        Ok(addr) => addr,
                        Err(e) => {
                            error!("Failed to get peer address: {e}");
                            continue;
                        }
                    };

                    let blockchain = self.blockchain.clone();
                    let keyring = Arc::clone(&self.keyring);
                    let mining_cancel = Arc::clone(&self.mining_cancel);
                    thread::spawn(move || {
                        if let Err(e) = Self::handle_connection(
                            blockchain,
                            keyring,
                            mining_cancel,
                            stream,
                            peer_addr,
                        ) {
                            error!("Error handling connection from {peer_addr}: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {e}");
                }
            }
        }

        Ok(())
    }

    fn handle_connection(
        blockchain: Blockchain,
        keyring: Arc<RwLock<Keyring>>,
        mining_cancel: Arc<AtomicBool>,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<()> {
        stream
            .set_read_timeout(Some(Duration::from_secs(60)))
            .map_err(|e| BlockchainError::Network(format!("Failed to set read timeout: {e}")))?;

        let reader = BufReader::new(&stream);
        let pkg_reader = Deserializer::from_reader(reader).into_iter::<Package>();

        for pkg in pkg_reader {
            let pkg = pkg.map_err(|e| {
                BlockchainError::Network(format!("Failed to deserialize package: {e}"))
            })?;
            debug!("Received request from {peer_addr}: {pkg:?}");

            let response =
                Self::process_package(&blockchain, &keyring, &mining_cancel, pkg);
            if let Some(response) = response {
                serde_json::to_writer(&stream, &response).map_err(|e| {
                    BlockchainError::Network(format!("Failed to send response: {e}"))
                })?;
                (&stream)
                    .flush()
                    .map_err(|e| BlockchainError::Network(format!("Failed to flush: {e}")))?;
            }
        }

        let _ = stream.shutdown(Shutdown::Both);
        Ok(())
    }

    /// Dispatch one message. Gossip returns no response; RPC always
    /// returns one, with failures folded into `Response::Error`.
    fn process_package(
        blockchain: &Blockchain,
        keyring: &Arc<RwLock<Keyring>>,
        mining_cancel: &Arc<AtomicBool>,
        pkg: Package,
    ) -> Option<Response> {
        match pkg {
            Package::Version {
                addr_from,
                version: _,
                best_height,
            } => {
                Self::handle_version(blockchain, addr_from, best_height);
                None
            }
            Package::Block { addr_from, block } => {
                if let Err(e) =
                    Self::handle_block(blockchain, mining_cancel, &addr_from, &block)
                {
                    error!("Error handling block from {addr_from}: {e}");
                }
                None
            }
            Package::Tx {
                addr_from,
                transaction,
            } => {
                if let Err(e) = Self::handle_tx(&addr_from, &transaction) {
                    error!("Error handling transaction from {addr_from}: {e}");
                }
                None
            }
            Package::GetInfo => Some(Self::handle_get_info(blockchain, keyring)),
            Package::GetBlock { height } => Some(Self::handle_get_block(blockchain, height)),
            Package::SendTx { to, value, data } => Some(
                Self::handle_send_tx(blockchain, keyring, &to, value, &data)
                    .unwrap_or_else(|e| error_response(&e)),
            ),
            Package::SendSignedTx {
                public_key,
                signature,
                to,
                value,
                nonce,
                timestamp,
                data,
            } => Some(
                Self::handle_send_signed_tx(
                    &public_key,
                    &signature,
                    &to,
                    value,
                    nonce,
                    timestamp,
                    &data,
                )
                .unwrap_or_else(|e| error_response(&e)),
            ),
            Package::NewAddress => Some(
                Self::handle_new_address(keyring).unwrap_or_else(|e| error_response(&e)),
            ),
        }
    }

    /// A peer announced its height; pull the blocks we are missing, or
    /// tell it ours when we are ahead.
    fn handle_version(blockchain: &Blockchain, addr_from: String, best_height: u64) {
        GLOBAL_NODES.add_node(addr_from.clone());
        let local_height = blockchain.get_height();

        if local_height < best_height {
            if let Err(e) = Self::catch_up(blockchain, &addr_from, local_height, best_height) {
                error!("Catch-up with {addr_from} failed: {e}");
            }
        } else if local_height > best_height {
            if let Err(e) = send_version(&addr_from, local_height) {
                warn!("Could not answer version message from {addr_from}: {e}");
            }
        }
    }

    /// Request each missing height from a peer and append it
    fn catch_up(
        blockchain: &Blockchain,
        addr: &str,
        local_height: u64,
        best_height: u64,
    ) -> Result<()> {
        for height in (local_height + 1)..=best_height {
            let response = request(addr, Package::GetBlock { height })?;
            match response {
                Response::Block { block: Some(bytes) } => {
                    let block = Block::deserialize(&bytes)?;
                    blockchain.add_block(&block)?;
                }
                Response::Block { block: None } => {
                    return Err(BlockchainError::BlockNotFound);
                }
                Response::Error { kind, message } => {
                    return Err(BlockchainError::Network(format!(
                        "Peer refused block at height {height}: {kind}: {message}"
                    )));
                }
                other => {
                    return Err(BlockchainError::Network(format!(
                        "Unexpected response during catch-up: {other:?}"
                    )));
                }
            }
        }
        info!("Caught up to height {best_height} from {addr}");
        Ok(())
    }

    fn handle_block(
        blockchain: &Blockchain,
        mining_cancel: &Arc<AtomicBool>,
        addr_from: &str,
        block_data: &[u8],
    ) -> Result<()> {
        let block = Block::deserialize(block_data)?;
        match blockchain.add_block(&block)? {
            Some(address) => {
                info!(
                    "Accepted block at height {} from {addr_from} ({address})",
                    block.get_height()
                );
                // the candidate being mined is now stale
                mining_cancel.store(true, Ordering::Relaxed);
                GLOBAL_MEMORY_POOL.remove_transactions(block.get_transactions());
                broadcast_block(addr_from, &block);
            }
            None => {
                warn!(
                    "Ledger rejected block at height {} from {addr_from}",
                    block.get_height()
                );
            }
        }
        Ok(())
    }

    fn handle_tx(addr_from: &str, transaction_data: &[u8]) -> Result<()> {
        let tx = Transaction::deserialize(transaction_data)?;
        tx.validate()?;
        match GLOBAL_MEMORY_POOL.set_transaction(tx.clone()) {
            Ok(()) => {
                broadcast_tx(addr_from, &tx);
                Ok(())
            }
            Err(BlockchainError::AlreadyHasPendingTx) => {
                debug!("Sender {} already has a pending transaction", tx.get_from());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn handle_get_info(blockchain: &Blockchain, keyring: &Arc<RwLock<Keyring>>) -> Response {
        let head = blockchain.get_head();
        let head_hash = match head.get_hash() {
            Ok(hash) => hash.encode(),
            Err(e) => return error_response(&e),
        };
        let (address, balance) = match keyring.read() {
            Ok(keyring) => {
                let address = keyring.active_address().to_string();
                match blockchain.get_ledger().get_balance(&address) {
                    Ok(balance) => (address, balance),
                    Err(e) => return error_response(&e),
                }
            }
            Err(_) => {
                return error_response(&BlockchainError::Wallet(
                    "Failed to acquire read lock on keyring".to_string(),
                ))
            }
        };

        Response::Info {
            node_id: GLOBAL_CONFIG.node.id.clone(),
            height: head.get_height(),
            head_hash,
            address,
            balance,
            peers: GLOBAL_NODES.get_addrs(),
        }
    }

    fn handle_get_block(blockchain: &Blockchain, height: u64) -> Response {
        match blockchain.get_block(height) {
            Ok(Some(block)) => match block.serialize() {
                Ok(bytes) => Response::Block { block: Some(bytes) },
                Err(e) => error_response(&e),
            },
            Ok(None) => Response::Block { block: None },
            Err(e) => error_response(&e),
        }
    }

    /// Build, sign, and submit a transfer from the node's active wallet
    fn handle_send_tx(
        blockchain: &Blockchain,
        keyring: &Arc<RwLock<Keyring>>,
        to: &str,
        value: f64,
        data: &str,
    ) -> Result<Response> {
        if !validate_address(to) {
            return Err(BlockchainError::InvalidAddress(format!(
                "Invalid destination address: {to}"
            )));
        }

        let keyring = keyring.read().map_err(|_| {
            BlockchainError::Wallet("Failed to acquire read lock on keyring".to_string())
        })?;
        let wallet = keyring
            .active_wallet()
            .ok_or_else(|| BlockchainError::Wallet("No active wallet".to_string()))?;

        let from = wallet.get_address();
        let nonce = blockchain.get_ledger().get_nonce(&from)? + 1;
        let mut tx = Transaction::new(wallet.get_public_key(), to, value, nonce, data)?;
        tx.sign(wallet.get_pkcs8())?;
        tx.validate()?;

        GLOBAL_MEMORY_POOL.set_transaction(tx.clone())?;
        broadcast_tx("", &tx);
        Ok(Response::TxAccepted {
            id: tx.get_id().encode(),
        })
    }

    /// Submit a transaction signed by an external wallet
    fn handle_send_signed_tx(
        public_key: &[u8],
        signature: &[u8],
        to: &str,
        value: f64,
        nonce: u64,
        timestamp: i64,
        data: &str,
    ) -> Result<Response> {
        if !validate_address(to) {
            return Err(BlockchainError::InvalidAddress(format!(
                "Invalid destination address: {to}"
            )));
        }

        let tx =
            Transaction::from_signed_parts(public_key, signature, to, value, nonce, timestamp, data)?;
        tx.validate()?;

        GLOBAL_MEMORY_POOL.set_transaction(tx.clone())?;
        broadcast_tx("", &tx);
        Ok(Response::TxAccepted {
            id: tx.get_id().encode(),
        })
    }

    fn handle_new_address(keyring: &Arc<RwLock<Keyring>>) -> Result<Response> {
        let mut keyring = keyring.write().map_err(|_| {
            BlockchainError::Wallet("Failed to acquire write lock on keyring".to_string())
        })?;
        let address = keyring.new_address()?;
        info!("Rotated active address to {address}");
        Ok(Response::Address { address })
    }
}

/// Announce our best height to a peer
pub fn send_version(addr: &str, best_height: u64) -> Result<()> {
    let pkg = Package::Version {
        addr_from: GLOBAL_CONFIG.node.listen_addr.clone(),
        version: NODE_VERSION,
        best_height,
    };
    send_data(addr, pkg)
}

pub fn send_block(addr: &str, block: &Block) -> Result<()> {
    let pkg = Package::Block {
        addr_from: GLOBAL_CONFIG.node.listen_addr.clone(),
        block: block.serialize()?,
    };
    send_data(addr, pkg)
}

pub fn send_tx(addr: &str, tx: &Transaction) -> Result<()> {
    let pkg = Package::Tx {
        addr_from: GLOBAL_CONFIG.node.listen_addr.clone(),
        transaction: tx.serialize()?,
    };
    send_data(addr, pkg)
}

/// Relay a block to every known peer except its origin; unreachable peers
/// are evicted.
pub fn broadcast_block(exclude: &str, block: &Block) {
    for addr in GLOBAL_NODES.broadcast_targets(exclude) {
        if let Err(e) = send_block(&addr, block) {
            warn!("Evicting unreachable peer {addr}: {e}");
            GLOBAL_NODES.evict_node(&addr);
        }
    }
}

pub fn broadcast_tx(exclude: &str, tx: &Transaction) {
    for addr in GLOBAL_NODES.broadcast_targets(exclude) {
        if let Err(e) = send_tx(&addr, tx) {
            warn!("Evicting unreachable peer {addr}: {e}");
            GLOBAL_NODES.evict_node(&addr);
        }
    }
}

fn connect(addr: &str) -> Result<TcpStream> {
    let socket_addr = addr
        .parse::<SocketAddr>()
        .map_err(|e| BlockchainError::Network(format!("Invalid address {addr}: {e}")))?;
    let stream = TcpStream::connect_timeout(&socket_addr, Duration::from_millis(TCP_WRITE_TIMEOUT))
        .map_err(|e| BlockchainError::Network(format!("Failed to connect to {addr}: {e}")))?;
    stream
        .set_write_timeout(Some(Duration::from_millis(TCP_WRITE_TIMEOUT)))
        .map_err(|e| BlockchainError::Network(format!("Failed to set write timeout: {e}")))?;
    Ok(stream)
}

/// Fire-and-forget gossip send
fn send_data(addr: &str, pkg: Package) -> Result<()> {
    debug!("Sending package to {addr}: {pkg:?}");
    let mut stream = connect(addr)?;
    serde_json::to_writer(&stream, &pkg)
        .map_err(|e| BlockchainError::Network(format!("Failed to send data: {e}")))?;
    let _ = stream.flush();
    Ok(())
}

/// RPC round trip: send one package and wait for its response
pub fn request(addr: &str, pkg: Package) -> Result<Response> {
    let mut stream = connect(addr)?;
    stream
        .set_read_timeout(Some(Duration::from_secs(60)))
        .map_err(|e| BlockchainError::Network(format!("Failed to set read timeout: {e}")))?;

    serde_json::to_writer(&stream, &pkg)
        .map_err(|e| BlockchainError::Network(format!("Failed to send request: {e}")))?;
    stream
        .flush()
        .map_err(|e| BlockchainError::Network(format!("Failed to flush: {e}")))?;
    let _ = stream.shutdown(Shutdown::Write);

    let reader = BufReader::new(&stream);
    let mut responses = Deserializer::from_reader(reader).into_iter::<Response>();
    match responses.next() {
        Some(Ok(response)) => Ok(response),
        Some(Err(e)) => Err(BlockchainError::Network(format!(
            "Failed to deserialize response: {e}"
        ))),
        None => Err(BlockchainError::Network(format!(
            "Connection to {addr} closed without a response"
        ))),
    }
}
