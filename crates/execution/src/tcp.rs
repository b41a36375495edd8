//! Multi-process cluster over TCP.
//!
//! Frames are newline-delimited JSON (see [`crate::message`]). The
//! coordinator accepts a fixed number of worker connections and numbers the
//! workers in accept order; one reader task per connection forwards decoded
//! frames into a shared inbox.
//!
//! Lines are read as raw bytes, so a frame that is not UTF-8 surfaces as
//! [`TransportError::Decode`] and the stream stays usable.

use crate::message::{decode_bytes, encode};
use crate::{CoordinatorLink, Message, Result, TransportError, WorkerLink};
use async_trait::async_trait;
use salesman_core::WorkerId;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

async fn write_frame(writer: &mut BufWriter<OwnedWriteHalf>, message: &Message) -> Result<()> {
    let line = encode(message)?;
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Read the next non-blank line and decode it. EOF is [`TransportError::Closed`].
async fn read_frame(reader: &mut BufReader<OwnedReadHalf>, line: &mut Vec<u8>) -> Result<Message> {
    loop {
        line.clear();
        if reader.read_until(b'\n', line).await? == 0 {
            return Err(TransportError::Closed);
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        return decode_bytes(line);
    }
}

/// Coordinator end of a TCP cluster.
pub struct TcpCoordinator {
    writers: Vec<BufWriter<OwnedWriteHalf>>,
    inbox: UnboundedReceiver<(WorkerId, Message)>,
    readers: Vec<JoinHandle<()>>,
}

impl TcpCoordinator {
    /// Accept exactly `workers` connections on `listener`.
    pub async fn accept(listener: &TcpListener, workers: usize) -> Result<Self> {
        let (inbox_tx, inbox_rx) = unbounded_channel();
        let mut writers = Vec::with_capacity(workers);
        let mut readers = Vec::with_capacity(workers);

        while writers.len() < workers {
            let (stream, peer) = listener.accept().await?;
            stream.set_nodelay(true)?;
            let id = WorkerId(writers.len());
            info!("Accepted {} from {} ({}/{})", id, peer, writers.len() + 1, workers);

            let (reader, writer) = stream.into_split();
            writers.push(BufWriter::new(writer));
            readers.push(tokio::spawn(forward_frames(id, reader, inbox_tx.clone())));
        }

        Ok(Self {
            writers,
            inbox: inbox_rx,
            readers,
        })
    }
}

/// Decode frames from one worker into the shared inbox until the socket
/// closes. Unreadable lines are logged and skipped.
async fn forward_frames(
    id: WorkerId,
    reader: OwnedReadHalf,
    inbox: UnboundedSender<(WorkerId, Message)>,
) {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        match read_frame(&mut reader, &mut line).await {
            Ok(message) => {
                if inbox.send((id, message)).is_err() {
                    break;
                }
            }
            Err(TransportError::Decode(e)) => warn!("Dropping frame from {}: {}", id, e),
            Err(TransportError::Closed) => {
                warn!("{} disconnected", id);
                break;
            }
            Err(e) => {
                error!("Read from {} failed: {}", id, e);
                break;
            }
        }
    }
}

impl Drop for TcpCoordinator {
    fn drop(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
    }
}

#[async_trait]
impl CoordinatorLink for TcpCoordinator {
    fn worker_count(&self) -> usize {
        self.writers.len()
    }

    async fn send(&mut self, worker: WorkerId, message: Message) -> Result<()> {
        let writer = self
            .writers
            .get_mut(worker.index())
            .ok_or(TransportError::UnknownWorker(worker))?;
        write_frame(writer, &message).await
    }

    async fn recv(&mut self) -> Result<(WorkerId, Message)> {
        self.inbox.recv().await.ok_or(TransportError::Closed)
    }
}

/// Worker end of a TCP cluster.
pub struct TcpWorker {
    reader: BufReader<OwnedReadHalf>,
    line: Vec<u8>,
    writer: BufWriter<OwnedWriteHalf>,
}

impl TcpWorker {
    /// Connect to a coordinator.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            line: Vec::new(),
            writer: BufWriter::new(writer),
        })
    }

    /// Connect, retrying while the coordinator is not listening yet.
    pub async fn connect_with_retry(addr: &str, attempts: usize, delay: Duration) -> Result<Self> {
        let mut attempt = 1;
        loop {
            match Self::connect(addr).await {
                Ok(worker) => return Ok(worker),
                Err(e) if attempt < attempts => {
                    debug!("Connect to {} failed (attempt {}/{}): {}", addr, attempt, attempts, e);
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl WorkerLink for TcpWorker {
    async fn send(&mut self, message: Message) -> Result<()> {
        write_frame(&mut self.writer, &message).await
    }

    async fn recv(&mut self) -> Result<Message> {
        read_frame(&mut self.reader, &mut self.line).await
    }
}
