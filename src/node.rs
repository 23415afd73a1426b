//! Gossip node: accepts, deduplicates and floods transactions and blocks, and mines
//! its pending block once enough transactions have accumulated.
//!
//! All mutable node state sits behind one lock that is only held for in-memory
//! updates. Floods snapshot their targets and payload under the lock, release it,
//! and then deliver to every neighbor on independent tasks.

use crate::blockchain::{validate_block, Block, Blockchain};
use crate::config::Config;
use crate::crypto::HexHash;
use crate::error::ChainError;
use crate::miner::Miner;
use crate::network::{encode_frame, read_frame, send_frame, Envelope, Message};
use crate::registry::{Registration, Registry};
use crate::transaction::Transaction;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Pending block is empty.
    Idle,
    /// Pending block holds transactions but mining has not started.
    Accumulating,
    /// Proof-of-work is running on a snapshot of the pending block.
    Mining,
    /// Deliveries are in flight.
    Broadcasting,
}

/// What a node did with an inbound block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockDisposition {
    /// Valid and relayed; `extended_ledger` is false when it did not link to the local tail.
    Accepted { extended_ledger: bool },
    /// Already relayed or already in the ledger; dropped.
    Replayed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeStats {
    pub transactions_accepted: u64,
    pub duplicates_dropped: u64,
    pub blocks_mined: u64,
    pub blocks_relayed: u64,
    pub invalid_blocks: u64,
    pub rounds_lost: u64,
}

#[derive(Debug)]
struct MiningRound {
    prev_hash: HexHash,
    abort: Arc<AtomicBool>,
}

#[derive(Debug)]
struct NodeInner {
    neighbors: Vec<String>,
    pending: Block,
    /// `prev_block_hash` of the last block this node relayed.
    last_relayed_prev: Option<HexHash>,
    /// Hashes of every block this node has relayed or mined.
    relayed: HashSet<HexHash>,
    ledger: Blockchain,
    mining: Option<MiningRound>,
    stats: NodeStats,
}

impl NodeInner {
    fn tip_hash(&self) -> HexHash {
        self.ledger.tip_hash().unwrap_or_default().to_string()
    }

    fn is_known(&self, tx: &Transaction) -> bool {
        self.pending.contains(tx) || self.ledger.contains_transaction(tx)
    }

    /// Starts a fresh pending block on the current tip, keeping anything `block` did not commit.
    fn reset_pending(&mut self, block: &Block) {
        let remaining: Vec<Transaction> = self
            .pending
            .transactions
            .iter()
            .filter(|tx| !block.contains(tx))
            .cloned()
            .collect();
        self.pending = Block::new(self.tip_hash(), remaining);
    }

    fn targets(&self, exclude: Option<&str>) -> Vec<String> {
        self.neighbors
            .iter()
            .filter(|n| Some(n.as_str()) != exclude)
            .cloned()
            .collect()
    }
}

pub struct Node {
    id: u64,
    port: u16,
    address: String,
    config: Config,
    miner: Miner,
    inner: Mutex<NodeInner>,
    in_flight: AtomicUsize,
}

impl Node {
    /// Creates a node for `registration` with a fixed random neighbor set drawn from
    /// the addresses `registry` currently knows.
    pub fn join(
        registration: Registration,
        registry: &Registry,
        genesis: &Block,
        config: &Config,
    ) -> Result<Arc<Self>, ChainError> {
        config.validate()?;
        let miner = Miner::new(config.miner.difficulty)?;
        let neighbors = registry.select_neighbors(&registration.address, config.gossip.max_neighbors);

        let ledger = Blockchain::with_genesis(genesis.clone());
        let pending = Block::new(genesis.current_block_hash.clone(), Vec::new());

        info!(
            "Node {}: joined at {} with neighbors {:?}",
            registration.id, registration.address, neighbors
        );

        Ok(Arc::new(Self {
            id: registration.id,
            port: registration.port,
            address: registration.address,
            config: config.clone(),
            miner,
            inner: Mutex::new(NodeInner {
                neighbors,
                pending,
                last_relayed_prev: None,
                relayed: HashSet::new(),
                ledger,
                mining: None,
                stats: NodeStats::default(),
            }),
            in_flight: AtomicUsize::new(0),
        }))
    }

    /// Registers with `registry` and joins in one step.
    pub fn register(registry: &Registry, genesis: &Block, config: &Config) -> Result<Arc<Self>, ChainError> {
        Self::join(registry.allocate()?, registry, genesis, config)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn neighbors(&self) -> Vec<String> {
        self.inner.lock().neighbors.clone()
    }

    pub fn pending_block(&self) -> Block {
        self.inner.lock().pending.clone()
    }

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.inner.lock().pending.transactions.clone()
    }

    pub fn ledger(&self) -> Blockchain {
        self.inner.lock().ledger.clone()
    }

    pub fn stats(&self) -> NodeStats {
        self.inner.lock().stats.clone()
    }

    pub fn state(&self) -> NodeState {
        let inner = self.inner.lock();
        if inner.mining.is_some() {
            NodeState::Mining
        } else if self.in_flight.load(Ordering::SeqCst) > 0 {
            NodeState::Broadcasting
        } else if inner.pending.is_empty() {
            NodeState::Idle
        } else {
            NodeState::Accumulating
        }
    }

    /// Binds the listener and serves inbound connections on a background task.
    pub async fn start(self: &Arc<Self>) -> Result<(SocketAddr, JoinHandle<()>), ChainError> {
        let listener = TcpListener::bind(self.address.as_str()).await.map_err(|e| {
            ChainError::ConnectionError(format!("Node {}: failed to listen on {}: {}", self.id, self.address, e))
        })?;
        let local = listener.local_addr()?;
        info!("Node {}: listening on {}", self.id, local);

        let node = Arc::clone(self);
        let handle = tokio::spawn(async move { node.accept_loop(listener).await });
        Ok((local, handle))
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!("Node {}: accepted connection from {}", self.id, peer);
                    let node = Arc::clone(&self);
                    tokio::spawn(async move { node.handle_connection(stream).await });
                }
                Err(e) => {
                    warn!("Node {}: error accepting connection: {}", self.id, e);
                }
            }
        }
    }

    async fn handle_connection(self: Arc<Self>, mut stream: TcpStream) {
        let read_timeout = self.config.gossip.read_timeout();
        let max_frame = self.config.gossip.max_frame_bytes;

        loop {
            match timeout(read_timeout, read_frame(&mut stream, max_frame)).await {
                Err(_) => {
                    debug!("Node {}: connection idle for {:?}, closing", self.id, read_timeout);
                    return;
                }
                Ok(Ok(None)) => return,
                Ok(Ok(Some(envelope))) => self.dispatch(envelope),
                Ok(Err(e)) if e.is_recoverable() => {
                    warn!("Node {}: dropping undecodable message: {}", self.id, e);
                }
                Ok(Err(e)) => {
                    warn!("Node {}: closing connection: {}", self.id, e);
                    return;
                }
            }
        }
    }

    fn dispatch(self: &Arc<Self>, envelope: Envelope) {
        let sender = envelope.sender.as_deref();
        match envelope.message {
            Message::Transactions(batch) => {
                self.receive_transactions(batch, sender);
            }
            Message::Block(block) => {
                if let Err(e) = self.receive_block(block, sender) {
                    debug!("Node {}: inbound block rejected: {}", self.id, e);
                }
            }
        }
    }

    /// Injects a locally originated batch, as a client submitting to this node would.
    pub fn submit_transactions(self: &Arc<Self>, batch: Vec<Transaction>) -> usize {
        self.receive_transactions(batch, None)
    }

    /// Adds the transactions this node has not seen to its pending block and floods
    /// only those. Returns how many were new.
    pub fn receive_transactions(self: &Arc<Self>, batch: Vec<Transaction>, from: Option<&str>) -> usize {
        let (novel, targets) = {
            let mut inner = self.inner.lock();
            let mut novel: Vec<Transaction> = Vec::with_capacity(batch.len());
            for tx in batch {
                if inner.is_known(&tx) || novel.contains(&tx) {
                    debug!("Node {}: dropping duplicate transaction {:?}", self.id, tx.data());
                    inner.stats.duplicates_dropped += 1;
                    continue;
                }
                novel.push(tx);
            }
            if novel.is_empty() {
                return 0;
            }

            let pending = &mut inner.pending;
            pending.transactions.extend(novel.iter().cloned());
            pending.merkle_root = Block::commitment(&pending.transactions);
            pending.seal();
            inner.stats.transactions_accepted += novel.len() as u64;

            (novel, inner.targets(from))
        };

        let count = novel.len();
        debug!("Node {}: accepted {} new transaction(s)", self.id, count);
        self.broadcast(Message::Transactions(novel), targets);

        if self.config.miner.auto_mine {
            self.mine_if_ready();
        }
        count
    }

    /// Validates an inbound block and, unless it is a replay, relays it to every
    /// neighbor except the one it came from.
    pub fn receive_block(self: &Arc<Self>, block: Block, from: Option<&str>) -> Result<BlockDisposition, ChainError> {
        let (targets, extended_ledger) = {
            let mut inner = self.inner.lock();

            let replay = inner.last_relayed_prev.as_deref() == Some(block.prev_block_hash.as_str())
                || inner.relayed.contains(&block.current_block_hash)
                || inner.ledger.contains_block(&block.current_block_hash);
            if replay {
                debug!("Node {}: ignoring already relayed block {}", self.id, block.current_block_hash);
                return Ok(BlockDisposition::Replayed);
            }

            if let Err(e) = validate_block(&block) {
                warn!("Node {}: block is invalid, dropping: {}", self.id, e);
                inner.stats.invalid_blocks += 1;
                return Err(e);
            }

            inner.last_relayed_prev = Some(block.prev_block_hash.clone());
            inner.relayed.insert(block.current_block_hash.clone());
            if let Some(round) = &inner.mining {
                if round.prev_hash == block.prev_block_hash {
                    round.abort.store(true, Ordering::Relaxed);
                }
            }

            let extended = match inner.ledger.try_add_block(block.clone()) {
                Ok(()) => {
                    inner.reset_pending(&block);
                    true
                }
                Err(e) => {
                    debug!("Node {}: block does not extend local chain: {}", self.id, e);
                    false
                }
            };
            inner.stats.blocks_relayed += 1;
            (inner.targets(from), extended)
        };

        info!("Node {}: block {} is valid, relaying", self.id, block.current_block_hash);
        self.broadcast(Message::Block(block), targets);
        Ok(BlockDisposition::Accepted { extended_ledger })
    }

    fn mine_if_ready(self: &Arc<Self>) {
        let ready = {
            let inner = self.inner.lock();
            inner.mining.is_none() && inner.pending.len() >= self.config.miner.tx_threshold
        };
        if ready {
            self.mine();
        }
    }

    /// Mines a snapshot of the pending block on a blocking worker. The result is
    /// flooded only if no valid block for the same round arrived in the meantime.
    ///
    /// Returns `None` if there is nothing to mine or a round is already running.
    pub fn mine(self: &Arc<Self>) -> Option<JoinHandle<Option<Block>>> {
        let (candidate, abort) = {
            let mut inner = self.inner.lock();
            if inner.mining.is_some() || inner.pending.is_empty() {
                return None;
            }
            let prev_hash = inner.tip_hash();
            let candidate = Block::new(prev_hash.clone(), inner.pending.transactions.clone());
            let abort = Arc::new(AtomicBool::new(false));
            inner.mining = Some(MiningRound {
                prev_hash,
                abort: Arc::clone(&abort),
            });
            (candidate, abort)
        };

        info!(
            "Node {}: mining block with {} transaction(s) at difficulty {}",
            self.id,
            candidate.len(),
            self.miner.difficulty()
        );

        let node = Arc::clone(self);
        let miner = self.miner;
        Some(tokio::spawn(async move {
            let flag = Arc::clone(&abort);
            let outcome = tokio::task::spawn_blocking(move || miner.mine_until(candidate, &flag)).await;
            let published = match outcome {
                Ok(Some(block)) => node.publish_mined(block, &abort),
                Ok(None) => {
                    node.end_round(true);
                    None
                }
                Err(e) => {
                    error!("Node {}: mining task failed: {}", node.id, e);
                    node.end_round(false);
                    None
                }
            };
            if node.config.miner.auto_mine {
                node.mine_if_ready();
            }
            published
        }))
    }

    fn end_round(&self, lost: bool) {
        let mut inner = self.inner.lock();
        inner.mining = None;
        if lost {
            inner.stats.rounds_lost += 1;
            info!("Node {}: another node won this round, mining stopped", self.id);
        }
    }

    fn publish_mined(self: &Arc<Self>, block: Block, abort: &AtomicBool) -> Option<Block> {
        let targets = {
            let mut inner = self.inner.lock();
            inner.mining = None;

            let stale = inner.ledger.tip_hash() != Some(block.prev_block_hash.as_str());
            if abort.load(Ordering::Relaxed) || stale {
                inner.stats.rounds_lost += 1;
                info!("Node {}: discarding mined block, round already decided", self.id);
                return None;
            }
            if let Err(e) = inner.ledger.try_add_block(block.clone()) {
                error!("Node {}: mined block rejected by own ledger: {}", self.id, e);
                return None;
            }

            inner.last_relayed_prev = Some(block.prev_block_hash.clone());
            inner.relayed.insert(block.current_block_hash.clone());
            inner.reset_pending(&block);
            inner.stats.blocks_mined += 1;
            inner.targets(None)
        };

        info!(
            "Node {}: first to mine block {} (nonce {}), broadcasting",
            self.id, block.current_block_hash, block.nonce
        );
        self.broadcast(Message::Block(block.clone()), targets);
        Some(block)
    }

    /// Sends `message` to each target on its own task. Deliveries are fire-and-forget:
    /// failures are logged and that neighbor is skipped for this round.
    pub fn broadcast(self: &Arc<Self>, message: Message, targets: Vec<String>) -> Vec<JoinHandle<()>> {
        let kind = message.kind();
        let frame: Arc<[u8]> = match encode_frame(&Envelope::new(Some(self.address.clone()), message)) {
            Ok(frame) => frame.into(),
            Err(e) => {
                error!("Node {}: failed to encode {} message: {}", self.id, kind, e);
                return Vec::new();
            }
        };

        targets
            .into_iter()
            .map(|neighbor| {
                self.in_flight.fetch_add(1, Ordering::SeqCst);
                let node = Arc::clone(self);
                let frame = Arc::clone(&frame);
                tokio::spawn(async move {
                    debug!("Node {}: broadcasting {} to neighbor {}", node.id, kind, neighbor);
                    if let Err(e) = send_frame(&neighbor, &frame, &node.config.gossip).await {
                        warn!("Node {}: could not deliver {} to {}: {}", node.id, kind, neighbor, e);
                    }
                    node.in_flight.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect()
    }
}
