use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_std::net::{ToSocketAddrs, UdpSocket};
use tracing::trace;

use crate::tftp::shared::{
    parse_udp_packet, Serializable, TFTPPacket, TFTPParseError, MAX_DATAGRAM,
};

/// One end of a transfer: a UDP socket of its own plus the idle timeout
/// applied to every receive.
///
/// Both the downloading client and each server worker own exactly one
/// channel for the lifetime of a transfer; it is closed when dropped.
pub struct DataChannel {
    sock: UdpSocket,
    timeout: Duration,
}

impl DataChannel {
    /// Binds a fresh socket for a transfer.
    ///
    /// * `addr` - Local address to bind; port 0 picks an ephemeral port.
    /// * `timeout` - How long a single receive may wait before giving up.
    pub async fn bind<A: ToSocketAddrs>(addr: A, timeout: Duration) -> io::Result<Self> {
        let sock = UdpSocket::bind(addr).await?;
        Ok(DataChannel { sock, timeout })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.sock.local_addr()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Serializes `packet` and sends it to `to`.
    pub async fn send_packet(&self, packet: TFTPPacket, to: SocketAddr) -> io::Result<()> {
        trace!(%to, "-> {}", packet);
        self.send_bytes(&packet.serialize(), to).await
    }

    /// Sends already serialized packet bytes, used for retransmissions.
    pub async fn send_bytes(&self, bytes: &[u8], to: SocketAddr) -> io::Result<()> {
        self.sock.send_to(bytes, to).await?;
        Ok(())
    }

    /// Waits for the next datagram and decodes it.
    ///
    /// The outer error is the transport's: a socket failure, or
    /// `ErrorKind::TimedOut` when nothing arrived within the idle timeout.
    /// The inner result is the decoder's verdict on what did arrive.
    pub async fn recv_packet(
        &self,
    ) -> io::Result<(Result<TFTPPacket, TFTPParseError>, SocketAddr)> {
        let mut buf = [0; MAX_DATAGRAM];
        let (count, from) =
            async_std::io::timeout(self.timeout, self.sock.recv_from(&mut buf)).await?;

        let packet = parse_udp_packet(&buf[..count]);
        match &packet {
            Ok(p) => trace!(%from, "<- {}", p),
            Err(e) => trace!(%from, "<- undecodable datagram: {}", e),
        }

        Ok((packet, from))
    }
}

/// True when `err` is the idle timeout of [`DataChannel::recv_packet`]
/// rather than a socket failure.
pub fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}
