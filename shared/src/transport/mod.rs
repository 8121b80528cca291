use std::net::SocketAddr;

use thiserror::Error;

use wirecast_codec::{ByteWriter, MTU_SIZE_BYTES};

pub mod loopback;

/// Default port for datagram transports.
pub const DEFAULT_UDP_PORT: u16 = 7777;
/// Default port for websocket transports.
pub const DEFAULT_WEBSOCKET_PORT: u16 = 7778;

/// Payload capacity granted to a single frame on the fragmenting
/// pipeline, which reassembles past the datagram MTU.
pub const FRAGMENTED_CAPACITY_BYTES: usize = 64 * 1024;

/// Identifies one live transport-level connection within a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportConn(u64);

impl TransportConn {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// The named send pipelines every driver provides. Send calls pick one by
/// this identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportPipeline {
    Unreliable = 0,
    Reliable = 1,
    UnreliableSequenced = 2,
    Fragmented = 3,
}

impl TransportPipeline {
    /// Capacity of the writer a driver hands out for this pipeline.
    pub fn writer_capacity(self) -> usize {
        match self {
            TransportPipeline::Unreliable
            | TransportPipeline::Reliable
            | TransportPipeline::UnreliableSequenced => MTU_SIZE_BYTES,
            TransportPipeline::Fragmented => FRAGMENTED_CAPACITY_BYTES,
        }
    }
}

/// One event drained from a driver for one connection.
#[derive(Debug)]
pub enum TransportEvent {
    /// The connection finished establishing (client side).
    Connect,
    /// A complete frame arrived.
    Data(Vec<u8>),
    /// The remote end went away.
    Disconnect,
    /// Nothing left this tick.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("failed to bind to {addr}")]
    BindFailed { addr: SocketAddr },

    #[error("failed to connect to {addr}")]
    ConnectFailed { addr: SocketAddr },

    #[error("connection is closed")]
    ConnectionClosed,

    #[error("failed to send payload")]
    SendFailed,
}

/// The opaque transport contract the engine drives. A driver owns its
/// sockets and per-connection queues; the engine never blocks on it.
/// `schedule_update` runs one non-blocking cycle and every other call is
/// queue-backed.
pub trait TransportDriver: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Port used when the engine config does not pin one.
    fn default_port(&self) -> u16;

    /// Server side: bind and start accepting.
    fn listen(&mut self, addr: SocketAddr) -> Result<(), TransportError>;

    /// Client side: dial the given endpoint.
    fn connect(&mut self, addr: SocketAddr) -> Result<TransportConn, TransportError>;

    /// Server side: next fully established connection, if any.
    fn accept(&mut self) -> Option<TransportConn>;

    /// Acquire a writer for an outgoing frame. `None` when the connection
    /// is unknown or closed. Dropping the writer aborts the send; the
    /// driver allocates nothing until `end_send`.
    fn begin_send(
        &mut self,
        pipeline: TransportPipeline,
        conn: &TransportConn,
    ) -> Option<ByteWriter>;

    /// Hand a finalized frame to the transport.
    fn end_send(
        &mut self,
        conn: &TransportConn,
        pipeline: TransportPipeline,
        payload: Vec<u8>,
    ) -> Result<(), TransportError>;

    /// Next queued event for the connection.
    fn pop_event(&mut self, conn: &TransportConn) -> TransportEvent;

    fn disconnect(&mut self, conn: &TransportConn);

    fn is_open(&self, conn: &TransportConn) -> bool;

    /// Drive one transport cycle. Must not block.
    fn schedule_update(&mut self);
}
