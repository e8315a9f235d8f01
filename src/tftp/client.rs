extern crate pretty_bytes;

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use async_std::io::{Write, WriteExt};
use pretty_bytes::converter::convert;
use thiserror::Error;
use tracing::{debug, info};

use crate::tftp::shared::ack_packet::AckPacket;
use crate::tftp::shared::block::{next_block, prev_block, FIRST_BLOCK};
use crate::tftp::shared::data_channel::{is_timeout, DataChannel};
use crate::tftp::shared::request_packet::ReadRequestPacket;
use crate::tftp::shared::TFTPPacket;

/// Default idle timeout while waiting for the next DATA block.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(6);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long to wait for each DATA block before abandoning the download.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no reply from the server within {0:?}")]
    Timeout(Duration),
    #[error("transport failure: {0}")]
    Transport(#[source] io::Error),
    #[error("failed to write received data: {0}")]
    Sink(#[source] io::Error),
    #[error("server error: {0}")]
    Remote(String),
}

/// What a finished download looks like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    /// Bytes written to the sink.
    pub bytes: usize,
    /// Distinct blocks accepted.
    pub blocks: usize,
    /// ACK packets sent, including re-acknowledgements of duplicates.
    pub acks_sent: usize,
    /// Endpoint the data came from.
    pub server: SocketAddr,
}

/// State of a single download against one server.
struct TFTPClient {
    channel: DataChannel,
    // Where the next ACK goes; replaced by the source of every DATA block.
    server: SocketAddr,
    expected: u8,
    bytes: usize,
    blocks: usize,
    acks_sent: usize,
}

impl TFTPClient {
    async fn connect(server: SocketAddr, config: &ClientConfig) -> Result<Self, ClientError> {
        let channel = DataChannel::bind(unspecified_for(server), config.timeout)
            .await
            .map_err(ClientError::Transport)?;

        Ok(TFTPClient {
            channel,
            server,
            expected: FIRST_BLOCK,
            bytes: 0,
            blocks: 0,
            acks_sent: 0,
        })
    }

    /// Sends the RRQ. It is never retransmitted; if it is lost the first
    /// receive times out and the download is over.
    async fn request(&self, filename: &str) -> Result<(), ClientError> {
        let rrq = TFTPPacket::RRQ(ReadRequestPacket::new(filename));
        self.channel
            .send_packet(rrq, self.server)
            .await
            .map_err(ClientError::Transport)
    }

    /// Runs the receive/acknowledge loop until the last block arrives.
    async fn receive<W>(&mut self, sink: &mut W) -> Result<(), ClientError>
    where
        W: Write + Unpin + ?Sized,
    {
        loop {
            let (packet, from) = self.channel.recv_packet().await.map_err(|e| {
                if is_timeout(&e) {
                    ClientError::Timeout(self.channel.timeout())
                } else {
                    ClientError::Transport(e)
                }
            })?;

            let dp = match packet {
                Ok(TFTPPacket::DATA(dp)) => dp,
                Ok(TFTPPacket::ERR(err)) => {
                    return Err(ClientError::Remote(err.message_lossy().into_owned()))
                }
                Ok(other) => {
                    debug!(%from, "ignoring unexpected {}", other);
                    continue;
                }
                Err(e) => {
                    debug!(%from, "ignoring malformed datagram: {}", e);
                    continue;
                }
            };

            self.server = from;
            let blk = dp.blk();

            if blk != self.expected {
                if blk == prev_block(self.expected) {
                    debug!("server resent block {}, our ACK was lost", blk);
                } else {
                    debug!("out of order block {}, expected {}", blk, self.expected);
                }
                self.ack(blk).await?;
                continue;
            }

            let last = dp.is_last();
            let data = dp.data();
            sink.write_all(&data).await.map_err(ClientError::Sink)?;
            self.bytes += data.len();
            self.blocks += 1;
            self.ack(blk).await?;

            if last {
                return Ok(());
            }

            self.expected = next_block(self.expected);
        }
    }

    async fn ack(&mut self, blk: u8) -> Result<(), ClientError> {
        self.channel
            .send_packet(TFTPPacket::ACK(AckPacket::new(blk)), self.server)
            .await
            .map_err(ClientError::Transport)?;
        self.acks_sent += 1;
        Ok(())
    }

    fn summary(&self) -> TransferSummary {
        TransferSummary {
            bytes: self.bytes,
            blocks: self.blocks,
            acks_sent: self.acks_sent,
            server: self.server,
        }
    }
}

/// Downloads `filename` from `server` into `sink`.
///
/// On success every block has been written to `sink` in order and the
/// sink is flushed. On failure `sink` holds whatever arrived before the
/// download stopped.
pub async fn download<W>(
    server: SocketAddr,
    filename: &str,
    sink: &mut W,
    config: &ClientConfig,
) -> Result<TransferSummary, ClientError>
where
    W: Write + Unpin + ?Sized,
{
    let mut client = TFTPClient::connect(server, config).await?;
    info!(%server, filename, "requesting");

    client.request(filename).await?;
    client.receive(sink).await?;
    sink.flush().await.map_err(ClientError::Sink)?;

    let summary = client.summary();
    info!(
        server = %summary.server,
        blocks = summary.blocks,
        "{} transferred successfully",
        convert(summary.bytes as f64)
    );
    Ok(summary)
}

/// The wildcard address of `server`'s family, on an ephemeral port.
fn unspecified_for(server: SocketAddr) -> SocketAddr {
    let ip = match server.ip() {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    SocketAddr::new(ip, 0)
}
