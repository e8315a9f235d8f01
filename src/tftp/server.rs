extern crate pretty_bytes;

use std::io;
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_std::io::{Read, ReadExt};
use async_std::net::{ToSocketAddrs, UdpSocket};
use async_std::task::{self, JoinHandle};
use pretty_bytes::converter::convert;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::tftp::shared::block::{next_block, FIRST_BLOCK};
use crate::tftp::shared::data_channel::{is_timeout, DataChannel};
use crate::tftp::shared::data_packet::encode_block;
use crate::tftp::shared::err_packet::ErrorPacket;
use crate::tftp::shared::{parse_udp_packet, TFTPPacket, MAX_DATAGRAM, STRIDE_SIZE};
use crate::tftp::store::SourceStore;

/// Default idle timeout while waiting for an ACK.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
/// Default number of times a block is sent before the transfer is dropped.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// How long to wait for the ACK of each transmission.
    pub timeout: Duration,
    /// Transmissions of one block before giving up on the client.
    pub max_attempts: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// How a worker's transfer ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// The datagram wasn't a read request; nothing was sent back.
    Ignored,
    /// The requested file couldn't be opened; one ERROR was sent back.
    Rejected(String),
    /// Every block was acknowledged.
    Completed { bytes: usize, blocks: usize },
    /// Block `blk` went unacknowledged for every attempt.
    Abandoned { blk: u8 },
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("transport failure: {0}")]
    Transport(#[source] io::Error),
    #[error("failed to read the requested file: {0}")]
    Source(#[source] io::Error),
}

/// Serves one inbound datagram.
///
/// * `request` - The raw datagram as the dispatcher received it.
/// * `client` - Where it came from; every reply goes there.
/// * `local_ip` - Address the worker's own socket binds to.
pub async fn serve_request<S>(
    request: &[u8],
    client: SocketAddr,
    local_ip: IpAddr,
    store: &S,
    config: &ServerConfig,
) -> Result<WorkerOutcome, WorkerError>
where
    S: SourceStore + ?Sized,
{
    let rrq = match parse_udp_packet(request) {
        Ok(TFTPPacket::RRQ(rrq)) => rrq,
        Ok(other) => {
            debug!(%client, "not a read request: {}", other);
            return Ok(WorkerOutcome::Ignored);
        }
        Err(e) => {
            debug!(%client, "malformed request: {}", e);
            return Ok(WorkerOutcome::Ignored);
        }
    };

    let file_name = rrq.filename_lossy().into_owned();
    info!(%client, file = %file_name, "read request");

    let channel = DataChannel::bind(SocketAddr::new(local_ip, 0), config.timeout)
        .await
        .map_err(WorkerError::Transport)?;

    let source = match store.open(&file_name).await {
        Ok(source) => source,
        Err(e) => {
            let packet = if e.kind() == ErrorKind::NotFound {
                ErrorPacket::file_not_found(&file_name)
            } else {
                ErrorPacket::new(&format!("{}: {}", file_name, e))
            };
            let msg = packet.message_lossy().into_owned();
            channel
                .send_packet(TFTPPacket::ERR(packet), client)
                .await
                .map_err(WorkerError::Transport)?;
            return Ok(WorkerOutcome::Rejected(msg));
        }
    };

    let mut transfer = Transfer {
        channel,
        client,
        max_attempts: config.max_attempts,
    };
    transfer.run(source).await
}

/// The send side of one transfer: one block in flight at a time.
struct Transfer {
    channel: DataChannel,
    client: SocketAddr,
    max_attempts: u32,
}

impl Transfer {
    async fn run<R>(&mut self, mut source: R) -> Result<WorkerOutcome, WorkerError>
    where
        R: Read + Unpin,
    {
        let mut buf = [0; STRIDE_SIZE];
        let mut blk = FIRST_BLOCK;
        let mut bytes = 0;
        let mut blocks = 0;

        loop {
            let size = read_chunk(&mut source, &mut buf)
                .await
                .map_err(WorkerError::Source)?;
            let packet = encode_block(blk, &buf[..size]);

            if !self.send_until_acked(blk, &packet).await? {
                warn!(client = %self.client, "block {} never acknowledged, giving up", blk);
                return Ok(WorkerOutcome::Abandoned { blk });
            }

            bytes += size;
            blocks += 1;

            if size < STRIDE_SIZE {
                info!(client = %self.client, blocks, "sent {}", convert(bytes as f64));
                return Ok(WorkerOutcome::Completed { bytes, blocks });
            }

            blk = next_block(blk);
        }
    }

    /// Sends `packet` until the client acknowledges `blk`.
    ///
    /// Every transmission counts as one attempt. Anything other than the
    /// matching ACK from the client, including silence, triggers the next
    /// one. Returns false once all attempts are spent.
    async fn send_until_acked(&mut self, blk: u8, packet: &[u8]) -> Result<bool, WorkerError> {
        let mut attempts = 0;

        while attempts < self.max_attempts {
            self.channel
                .send_bytes(packet, self.client)
                .await
                .map_err(WorkerError::Transport)?;
            attempts += 1;

            match self.channel.recv_packet().await {
                Ok((Ok(TFTPPacket::ACK(ack)), from)) if ack.blk() == blk && from == self.client => {
                    return Ok(true);
                }
                Ok((packet, from)) => {
                    debug!(%from, attempts, "expected ACK [{}], got {:?}", blk, packet);
                }
                Err(e) if is_timeout(&e) => {
                    debug!(attempts, "timed out waiting for ACK [{}]", blk);
                }
                Err(e) => return Err(WorkerError::Transport(e)),
            }
        }

        Ok(false)
    }
}

/// Reads until `buf` is full or the source is exhausted.
///
/// Only the last chunk of a transfer may be short, so a single short read
/// from the source is not enough to stop.
async fn read_chunk<R>(source: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: Read + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Owns the listening socket and hands every datagram to a new worker.
pub struct TFTPServer<S> {
    socket: UdpSocket,
    store: Arc<S>,
    config: ServerConfig,
}

impl<S> TFTPServer<S>
where
    S: SourceStore + Send + Sync + 'static,
    S::Source: 'static,
{
    /// Binds the listening socket; port 0 picks any free port.
    pub async fn bind<A: ToSocketAddrs>(addr: A, store: S, config: ServerConfig) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(TFTPServer {
            socket,
            store: Arc::new(store),
            config,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receives datagrams forever, one worker task per datagram.
    ///
    /// Only returns if the listening socket fails.
    pub async fn run(self) -> io::Result<()> {
        let local_ip = self.local_addr()?.ip();
        info!("listening on {}", self.local_addr()?);

        loop {
            let mut buf = vec![0; MAX_DATAGRAM];
            let (count, client) = self.socket.recv_from(&mut buf).await?;
            buf.truncate(count);

            let store = Arc::clone(&self.store);
            let config = self.config.clone();
            task::spawn(async move {
                match serve_request(&buf, client, local_ip, store.as_ref(), &config).await {
                    Ok(WorkerOutcome::Ignored) => {}
                    Ok(WorkerOutcome::Rejected(msg)) => info!(%client, "rejected: {}", msg),
                    Ok(outcome) => debug!(%client, "worker finished: {:?}", outcome),
                    Err(e) => warn!(%client, "worker failed: {}", e),
                }
            });
        }
    }

    /// Starts [`run`](Self::run) on its own task.
    pub fn spawn(self) -> io::Result<ServerHandle> {
        let local_addr = self.local_addr()?;
        let task = task::spawn(self.run());
        Ok(ServerHandle { local_addr, task })
    }
}

/// A running dispatcher.
pub struct ServerHandle {
    local_addr: SocketAddr,
    task: JoinHandle<io::Result<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting requests. Transfers already in flight finish on
    /// their own.
    pub async fn shutdown(self) {
        self.task.cancel().await;
    }

    /// Waits for the dispatcher to stop, which only a socket failure does.
    pub async fn join(self) -> io::Result<()> {
        self.task.await
    }
}
