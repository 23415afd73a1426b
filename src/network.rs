//! Wire protocol for gossip between nodes.
//!
//! Every frame is `[len: u32 BE][json envelope]`. The envelope's message carries an
//! explicit `kind` tag (`TRANSACTIONS` or `BLOCK`) ahead of its `body`, so receivers
//! never guess the format:
//!
//! ```text
//! {"sender":"127.0.0.1:6004","message":{"kind":"TRANSACTIONS","body":["1500USD Sent"]}}
//! ```
//!
//! Delivery is one dial per send, best-effort and unacknowledged.

use crate::blockchain::Block;
use crate::config::GossipConfig;
use crate::error::ChainError;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

const LEN_PREFIX: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    Transactions(Vec<Transaction>),
    Block(Block),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Transactions(_) => "TRANSACTIONS",
            Message::Block(_) => "BLOCK",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Listen address of the node that forwarded this message, if any.
    #[serde(default)]
    pub sender: Option<String>,
    pub message: Message,
}

impl Envelope {
    pub fn new(sender: Option<String>, message: Message) -> Self {
        Self { sender, message }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("frame of {0} bytes exceeds limit of {1}")]
    TooLarge(usize, usize),
    #[error("empty frame")]
    Empty,
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl FrameError {
    /// Whether the stream is still aligned on a frame boundary after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FrameError::Malformed(_))
    }
}

impl From<FrameError> for ChainError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(e) => ChainError::ConnectionError(e.to_string()),
            FrameError::Timeout(d) => ChainError::ConnectionError(format!("timed out after {:?}", d)),
            other => ChainError::DecodeError(other.to_string()),
        }
    }
}

/// Serializes `envelope` into a length-prefixed frame.
pub fn encode_frame(envelope: &Envelope) -> Result<Vec<u8>, FrameError> {
    let body = serde_json::to_vec(envelope)?;
    let len = u32::try_from(body.len()).map_err(|_| FrameError::TooLarge(body.len(), u32::MAX as usize))?;

    let mut frame = Vec::with_capacity(LEN_PREFIX + body.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

pub fn decode_body(body: &[u8]) -> Result<Envelope, FrameError> {
    Ok(serde_json::from_slice(body)?)
}

/// Reads one frame. Returns `Ok(None)` on a clean end of stream between frames.
pub async fn read_frame<R>(reader: &mut R, max_frame_bytes: usize) -> Result<Option<Envelope>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; LEN_PREFIX];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Err(FrameError::Empty);
    }
    if len > max_frame_bytes {
        return Err(FrameError::TooLarge(len, max_frame_bytes));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    decode_body(&body).map(Some)
}

pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Dials `address` and delivers one pre-encoded frame, bounded by the configured timeouts.
pub async fn send_frame(address: &str, frame: &[u8], config: &GossipConfig) -> Result<(), ChainError> {
    if !config.send_delay().is_zero() {
        sleep(config.send_delay()).await;
    }

    let connect_timeout = config.connect_timeout();
    let mut stream = match timeout(connect_timeout, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            return Err(ChainError::ConnectionError(format!(
                "failed to connect to {}: {}",
                address, e
            )))
        }
        Err(_) => return Err(FrameError::Timeout(connect_timeout).into()),
    };

    let write_timeout = config.read_timeout();
    match timeout(write_timeout, write_frame(&mut stream, frame)).await {
        Ok(result) => result?,
        Err(_) => return Err(FrameError::Timeout(write_timeout).into()),
    }

    let _ = stream.shutdown().await;
    Ok(())
}
