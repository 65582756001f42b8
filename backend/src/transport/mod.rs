// Simulator transport channels.

use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use relay_core::address::ChannelAddress;
use relay_core::burst::{InputBurst, OutputBurst};

use crate::constants::{MAX_DATAGRAM_LEN, SUBSCRIBE_BYTE, SUBSCRIBE_INTERVAL_SECS};
use crate::net::resolve_channel;
use crate::relay::SimulatorLink;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("unsupported channel scheme {0:?}")]
    UnsupportedScheme(String),
    #[error("could not resolve {0}")]
    Unresolved(ChannelAddress),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode message: {0}")]
    Encode(serde_json::Error),
    #[error("failed to decode burst: {0}")]
    Decode(serde_json::Error),
    #[error("message of {0} bytes exceeds the datagram limit")]
    TooLarge(usize),
}

async fn connect_socket(address: &ChannelAddress) -> Result<UdpSocket, TransportError> {
    if address.scheme != "udp" {
        return Err(TransportError::UnsupportedScheme(address.scheme.clone()));
    }
    let target = resolve_channel(address)
        .await?
        .ok_or_else(|| TransportError::Unresolved(address.clone()))?;
    let local = match target {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(target).await?;
    Ok(socket)
}

/// Relay to simulator direction. Each send is a single datagram; a datagram
/// the kernel cannot take right now is dropped and superseded by the next burst.
pub struct OutboundChannel {
    socket: UdpSocket,
    address: ChannelAddress,
}

impl OutboundChannel {
    pub async fn connect(address: ChannelAddress) -> Result<Self, TransportError> {
        let socket = connect_socket(&address).await?;
        info!(%address, local_addr = %socket.local_addr()?, "outbound channel ready");
        Ok(Self { socket, address })
    }

    pub fn address(&self) -> &ChannelAddress {
        &self.address
    }

    pub fn send<T: Serialize>(&self, message: &T) -> Result<usize, TransportError> {
        let bytes = serde_json::to_vec(message).map_err(TransportError::Encode)?;
        if bytes.len() > MAX_DATAGRAM_LEN {
            return Err(TransportError::TooLarge(bytes.len()));
        }
        Ok(self.socket.try_send(&bytes)?)
    }
}

/// Simulator to relay direction. The simulator pushes bursts to whoever last
/// sent it a subscribe datagram, so the channel re-announces itself periodically.
pub struct InboundChannel {
    socket: UdpSocket,
    address: ChannelAddress,
    buf: Vec<u8>,
    last_subscribe: Option<Instant>,
}

impl InboundChannel {
    pub async fn subscribe(address: ChannelAddress) -> Result<Self, TransportError> {
        let socket = connect_socket(&address).await?;
        info!(%address, local_addr = %socket.local_addr()?, "inbound channel subscribed");
        let mut channel = Self {
            socket,
            address,
            buf: vec![0u8; MAX_DATAGRAM_LEN],
            last_subscribe: None,
        };
        channel.keep_alive();
        Ok(channel)
    }

    pub fn address(&self) -> &ChannelAddress {
        &self.address
    }

    pub fn keep_alive(&mut self) {
        let due = match self.last_subscribe {
            Some(last) => last.elapsed() >= Duration::from_secs(SUBSCRIBE_INTERVAL_SECS),
            None => true,
        };
        if !due {
            return;
        }
        if let Err(err) = self.socket.try_send(&[SUBSCRIBE_BYTE]) {
            debug!(?err, address = %self.address, "subscribe datagram not sent");
        }
        self.last_subscribe = Some(Instant::now());
    }

    /// Drains everything queued and decodes only the newest datagram.
    pub fn receive(&mut self) -> Result<Option<OutputBurst>, TransportError> {
        let mut newest_len = None;
        let mut drained = 0usize;
        loop {
            match self.socket.try_recv(&mut self.buf) {
                Ok(len) => {
                    newest_len = Some(len);
                    drained += 1;
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => {
                    if newest_len.is_none() {
                        return Err(err.into());
                    }
                    break;
                }
            }
        }

        let Some(len) = newest_len else {
            return Ok(None);
        };
        if drained > 1 {
            debug!(dropped = drained - 1, "conflated stale output bursts");
        }
        let burst = serde_json::from_slice(&self.buf[..len]).map_err(TransportError::Decode)?;
        Ok(Some(burst))
    }
}

pub struct ChannelPair {
    outbound: OutboundChannel,
    inbound: InboundChannel,
}

impl ChannelPair {
    pub async fn open(
        outbound: ChannelAddress,
        inbound: ChannelAddress,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            outbound: OutboundChannel::connect(outbound).await?,
            inbound: InboundChannel::subscribe(inbound).await?,
        })
    }

    pub fn outbound_address(&self) -> &ChannelAddress {
        self.outbound.address()
    }

    pub fn inbound_address(&self) -> &ChannelAddress {
        self.inbound.address()
    }

    /// Sends an arbitrary message on the outbound channel, e.g. capabilities.
    pub fn publish<T: Serialize>(&self, message: &T) -> Result<usize, TransportError> {
        self.outbound.send(message)
    }

    /// Replaces the inbound subscription. The old subscription stays in place
    /// if the replacement cannot be built.
    pub async fn rebuild_inbound(&mut self, port: Option<u16>) -> Result<(), TransportError> {
        let address = match port {
            Some(port) => self.inbound.address().with_port(port),
            None => self.inbound.address().clone(),
        };
        self.inbound = InboundChannel::subscribe(address).await?;
        Ok(())
    }
}

impl SimulatorLink for ChannelPair {
    fn receive(&mut self) -> Option<OutputBurst> {
        self.inbound.keep_alive();
        match self.inbound.receive() {
            Ok(burst) => burst,
            Err(err) => {
                warn!(%err, address = %self.inbound.address(), "inbound receive failed");
                None
            }
        }
    }

    fn send(&mut self, burst: &InputBurst) {
        if let Err(err) = self.outbound.send(burst) {
            warn!(%err, counter = burst.counter, "input burst dropped");
        }
    }

    async fn resubscribe(&mut self, port: Option<u16>) {
        if let Err(err) = self.rebuild_inbound(port).await {
            warn!(%err, "inbound rebuild failed; keeping previous subscription");
        }
    }
}
