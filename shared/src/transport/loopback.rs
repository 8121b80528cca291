//! In-memory transport used by tests and local demos: a server half that
//! accepts links opened through its connector, and either a raw peer (to
//! speak the wire format directly) or a client driver on the other end.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use smol::channel::{unbounded, Receiver, Sender, TryRecvError};

use wirecast_codec::ByteWriter;

use super::{
    TransportConn, TransportDriver, TransportError, TransportEvent, TransportPipeline,
    DEFAULT_UDP_PORT,
};

struct PeerHalves {
    to_client: Sender<Vec<u8>>,
    from_client: Receiver<Vec<u8>>,
    open: Arc<AtomicBool>,
}

/// One raw endpoint of an in-memory link. Tests use this to push byte
/// frames at a server without standing up a full client engine.
pub struct LoopbackPeer {
    to_peer: Sender<Vec<u8>>,
    from_peer: Receiver<Vec<u8>>,
    open: Arc<AtomicBool>,
}

impl LoopbackPeer {
    pub fn send(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::ConnectionClosed);
        }
        self.to_peer
            .try_send(payload)
            .map_err(|_| TransportError::SendFailed)
    }

    pub fn try_recv(&self) -> Option<Vec<u8>> {
        self.from_peer.try_recv().ok()
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

/// Mints new links to a `LoopbackServer`. Cloneable so many clients can
/// dial the same server.
#[derive(Clone)]
pub struct LoopbackConnector {
    connect_tx: Sender<PeerHalves>,
}

impl LoopbackConnector {
    /// Opens a raw link; the server half surfaces it on its next
    /// `accept`.
    pub fn open(&self) -> LoopbackPeer {
        let (to_server, from_client) = unbounded();
        let (to_client, from_server) = unbounded();
        let open = Arc::new(AtomicBool::new(true));

        let _ = self.connect_tx.try_send(PeerHalves {
            to_client,
            from_client,
            open: open.clone(),
        });

        LoopbackPeer {
            to_peer: to_server,
            from_peer: from_server,
            open,
        }
    }
}

struct ServerEnd {
    to_client: Sender<Vec<u8>>,
    from_client: Receiver<Vec<u8>>,
    open: Arc<AtomicBool>,
    close_announced: bool,
}

/// Server half of the loopback transport.
pub struct LoopbackServer {
    pending_tx: Sender<PeerHalves>,
    pending_rx: Receiver<PeerHalves>,
    conns: HashMap<u64, ServerEnd>,
    next_conn_id: u64,
    listening: bool,
    refuse_bind: bool,
}

impl LoopbackServer {
    pub fn new() -> Self {
        let (pending_tx, pending_rx) = unbounded();
        Self {
            pending_tx,
            pending_rx,
            conns: HashMap::new(),
            next_conn_id: 1,
            listening: false,
            refuse_bind: false,
        }
    }

    pub fn connector(&self) -> LoopbackConnector {
        LoopbackConnector {
            connect_tx: self.pending_tx.clone(),
        }
    }

    /// Makes the next `listen` call fail, to exercise bind-failure
    /// handling.
    pub fn refuse_bind(&mut self) {
        self.refuse_bind = true;
    }
}

impl Default for LoopbackServer {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportDriver for LoopbackServer {
    fn name(&self) -> &'static str {
        "loopback"
    }

    fn default_port(&self) -> u16 {
        DEFAULT_UDP_PORT
    }

    fn listen(&mut self, addr: SocketAddr) -> Result<(), TransportError> {
        if self.refuse_bind {
            return Err(TransportError::BindFailed { addr });
        }
        self.listening = true;
        Ok(())
    }

    fn connect(&mut self, addr: SocketAddr) -> Result<TransportConn, TransportError> {
        Err(TransportError::ConnectFailed { addr })
    }

    fn accept(&mut self) -> Option<TransportConn> {
        if !self.listening {
            return None;
        }
        let halves = self.pending_rx.try_recv().ok()?;
        let id = self.next_conn_id;
        self.next_conn_id += 1;
        self.conns.insert(
            id,
            ServerEnd {
                to_client: halves.to_client,
                from_client: halves.from_client,
                open: halves.open,
                close_announced: false,
            },
        );
        Some(TransportConn::new(id))
    }

    fn begin_send(
        &mut self,
        pipeline: TransportPipeline,
        conn: &TransportConn,
    ) -> Option<ByteWriter> {
        let end = self.conns.get(&conn.id())?;
        if !end.open.load(Ordering::Acquire) {
            return None;
        }
        Some(ByteWriter::with_capacity(pipeline.writer_capacity()))
    }

    fn end_send(
        &mut self,
        conn: &TransportConn,
        _pipeline: TransportPipeline,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        let end = self
            .conns
            .get(&conn.id())
            .ok_or(TransportError::ConnectionClosed)?;
        if !end.open.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed);
        }
        end.to_client
            .try_send(payload)
            .map_err(|_| TransportError::SendFailed)
    }

    fn pop_event(&mut self, conn: &TransportConn) -> TransportEvent {
        let Some(end) = self.conns.get_mut(&conn.id()) else {
            return TransportEvent::Empty;
        };
        match end.from_client.try_recv() {
            Ok(payload) => TransportEvent::Data(payload),
            Err(TryRecvError::Empty) => {
                if !end.open.load(Ordering::Acquire) && !end.close_announced {
                    end.close_announced = true;
                    TransportEvent::Disconnect
                } else {
                    TransportEvent::Empty
                }
            }
            Err(TryRecvError::Closed) => {
                if end.close_announced {
                    TransportEvent::Empty
                } else {
                    end.close_announced = true;
                    TransportEvent::Disconnect
                }
            }
        }
    }

    fn disconnect(&mut self, conn: &TransportConn) {
        if let Some(end) = self.conns.remove(&conn.id()) {
            end.open.store(false, Ordering::Release);
        }
    }

    fn is_open(&self, conn: &TransportConn) -> bool {
        self.conns
            .get(&conn.id())
            .map(|end| end.open.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    fn schedule_update(&mut self) {
        // channels deliver immediately; nothing to pump
    }
}

/// Client half of the loopback transport, driving a single link minted
/// from a server's connector.
pub struct LoopbackClient {
    connector: LoopbackConnector,
    peer: Option<LoopbackPeer>,
    conn: Option<TransportConn>,
    connect_queued: bool,
    close_announced: bool,
}

impl LoopbackClient {
    pub fn new(connector: LoopbackConnector) -> Self {
        Self {
            connector,
            peer: None,
            conn: None,
            connect_queued: false,
            close_announced: false,
        }
    }
}

impl TransportDriver for LoopbackClient {
    fn name(&self) -> &'static str {
        "loopback"
    }

    fn default_port(&self) -> u16 {
        DEFAULT_UDP_PORT
    }

    fn listen(&mut self, addr: SocketAddr) -> Result<(), TransportError> {
        Err(TransportError::BindFailed { addr })
    }

    fn connect(&mut self, addr: SocketAddr) -> Result<TransportConn, TransportError> {
        if self.peer.is_some() {
            return Err(TransportError::ConnectFailed { addr });
        }
        let conn = TransportConn::new(1);
        self.peer = Some(self.connector.open());
        self.conn = Some(conn);
        self.connect_queued = true;
        self.close_announced = false;
        Ok(conn)
    }

    fn accept(&mut self) -> Option<TransportConn> {
        None
    }

    fn begin_send(
        &mut self,
        pipeline: TransportPipeline,
        conn: &TransportConn,
    ) -> Option<ByteWriter> {
        let peer = self.peer.as_ref()?;
        if self.conn != Some(*conn) || !peer.is_open() {
            return None;
        }
        Some(ByteWriter::with_capacity(pipeline.writer_capacity()))
    }

    fn end_send(
        &mut self,
        conn: &TransportConn,
        _pipeline: TransportPipeline,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        if self.conn != Some(*conn) {
            return Err(TransportError::ConnectionClosed);
        }
        let peer = self.peer.as_ref().ok_or(TransportError::ConnectionClosed)?;
        peer.send(payload)
    }

    fn pop_event(&mut self, conn: &TransportConn) -> TransportEvent {
        if self.conn != Some(*conn) {
            return TransportEvent::Empty;
        }
        if self.connect_queued {
            self.connect_queued = false;
            return TransportEvent::Connect;
        }
        let Some(peer) = self.peer.as_ref() else {
            return TransportEvent::Empty;
        };
        match peer.from_peer.try_recv() {
            Ok(payload) => TransportEvent::Data(payload),
            Err(TryRecvError::Empty) => {
                if !peer.is_open() && !self.close_announced {
                    self.close_announced = true;
                    TransportEvent::Disconnect
                } else {
                    TransportEvent::Empty
                }
            }
            Err(TryRecvError::Closed) => {
                if self.close_announced {
                    TransportEvent::Empty
                } else {
                    self.close_announced = true;
                    TransportEvent::Disconnect
                }
            }
        }
    }

    fn disconnect(&mut self, conn: &TransportConn) {
        if self.conn == Some(*conn) {
            if let Some(peer) = self.peer.take() {
                peer.close();
            }
            self.conn = None;
        }
    }

    fn is_open(&self, conn: &TransportConn) -> bool {
        self.conn == Some(*conn)
            && self
                .peer
                .as_ref()
                .map(|peer| peer.is_open())
                .unwrap_or(false)
    }

    fn schedule_update(&mut self) {
        // channels deliver immediately; nothing to pump
    }
}
