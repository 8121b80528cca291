use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    time::Instant,
};

use log::{info, warn};

use wirecast_shared::{
    commit_frame, commit_multicast_one, open_frame, open_multicast, process_frame,
    transport::{TransportConn, TransportDriver, TransportEvent, TransportPipeline},
    CodecRegistry, ConnectionDirectory, ConnectionUid, Dispatcher, MessageKey, Metadata,
    MulticastHandle, MulticastTargets, ReceiveOutcome, ReceivePipeline, SendAbort, SendHandle,
    SendPipeline, WarningCode,
};

use crate::{
    config::ServerConfig, error::ServerError, events::ServerEvents, tracker::TrackerMap,
    uid_allocator::UidAllocator,
};

/// Engine start refuses more drivers than this.
pub const MAX_TRANSPORT_DRIVERS: usize = 4;

struct ConnectionEntry {
    uid: ConnectionUid,
    driver_index: usize,
    conn: TransportConn,
    last_heard: Instant,
    last_sent: Instant,
}

/// The server side of the message engine. Owns the transport drivers, the
/// connection list and directory, the identifier allocator and expiration
/// trackers, the dispatcher and the two server-side pipelines
/// (client-to-server receive, server-to-client send).
///
/// `tick` must be called regularly by the host scheduler; it drains
/// transport events, admits new connections up to the configured cap and
/// routes data frames through the receiver. Taking `&mut self` makes the
/// at-most-one-concurrent-tick invariant structural.
pub struct Server {
    config: ServerConfig,
    drivers: Vec<Box<dyn TransportDriver>>,
    dispatcher: Dispatcher,
    directory: ConnectionDirectory,
    receive_pipeline: ReceivePipeline,
    send_pipeline: SendPipeline,
    connections: Vec<ConnectionEntry>,
    trackers: TrackerMap,
    uid_allocator: UidAllocator,
    events: ServerEvents,
    disconnect_hook: Option<Box<dyn FnMut(ConnectionUid) + Send>>,
    pending_disconnects: Vec<ConnectionUid>,
    epoch: u64,
    running: bool,
}

impl Server {
    /// Create a new Server
    pub fn new(config: ServerConfig) -> Self {
        let dispatcher = Dispatcher::new(config.side, CodecRegistry::default());
        Self {
            config,
            drivers: Vec::new(),
            dispatcher,
            directory: ConnectionDirectory::new(),
            receive_pipeline: ReceivePipeline::new(),
            send_pipeline: SendPipeline::new(),
            connections: Vec::new(),
            trackers: TrackerMap::new(),
            uid_allocator: UidAllocator::new(),
            events: ServerEvents::new(),
            disconnect_hook: None,
            pending_disconnects: Vec::new(),
            epoch: 0,
            running: false,
        }
    }

    /// Binds the given drivers and starts accepting connections. On any
    /// failure every resource allocated so far is released.
    pub fn start(&mut self, drivers: Vec<Box<dyn TransportDriver>>) -> Result<(), ServerError> {
        if self.running {
            return Err(ServerError::AlreadyStarted);
        }
        if self.config.max_players == 0 {
            return Err(ServerError::ZeroMaxPlayers);
        }
        let count = drivers.len();
        if count == 0 || count > MAX_TRANSPORT_DRIVERS {
            return Err(ServerError::DriverCountOutOfRange {
                count,
                max: MAX_TRANSPORT_DRIVERS,
            });
        }

        let mut bound: Vec<Box<dyn TransportDriver>> = Vec::new();
        for mut driver in drivers {
            let addr = self.bind_addr(driver.default_port());
            match driver.listen(addr) {
                Ok(()) => bound.push(driver),
                Err(error) => {
                    warn!(
                        "[{}] {} driver failed to bind {}: {}",
                        WarningCode::BindFailed,
                        driver.name(),
                        addr,
                        error
                    );
                    if self.config.stop_on_bind_failure {
                        return Err(ServerError::Transport(error));
                    }
                }
            }
        }
        if bound.is_empty() {
            return Err(ServerError::NoDriversBound);
        }

        info!("server listening with {} transport driver(s)", bound.len());
        self.drivers = bound;
        self.running = true;
        Ok(())
    }

    /// Disconnects everything and releases the drivers.
    pub fn stop(&mut self) -> Result<(), ServerError> {
        if !self.running {
            return Err(ServerError::NotStarted);
        }
        let connections = std::mem::take(&mut self.connections);
        for entry in &connections {
            if let Some(driver) = self.drivers.get_mut(entry.driver_index) {
                driver.disconnect(&entry.conn);
            }
            self.directory.remove(entry.uid);
        }
        self.drivers.clear();
        self.trackers.clear();
        self.pending_disconnects.clear();
        self.running = false;
        info!("server stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn bind_addr(&self, default_port: u16) -> SocketAddr {
        let port = self.config.port.unwrap_or(default_port);
        let ip = if self.config.use_ipv4 {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        };
        SocketAddr::new(ip, port)
    }

    // Registration surfaces

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    /// The client-to-server receive pipeline.
    pub fn receive_pipeline_mut(&mut self) -> &mut ReceivePipeline {
        &mut self.receive_pipeline
    }

    /// The server-to-client send pipeline.
    pub fn send_pipeline_mut(&mut self) -> &mut SendPipeline {
        &mut self.send_pipeline
    }

    pub fn directory(&self) -> &ConnectionDirectory {
        &self.directory
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connection_uids(&self) -> Vec<ConnectionUid> {
        self.connections.iter().map(|entry| entry.uid).collect()
    }

    // Events

    pub fn on_client_connected<F>(&mut self, callback: F)
    where
        F: FnMut(ConnectionUid) + Send + 'static,
    {
        self.events.on_connected(callback);
    }

    pub fn on_client_disconnected<F>(&mut self, callback: F)
    where
        F: FnMut(ConnectionUid) + Send + 'static,
    {
        self.events.on_disconnected(callback);
    }

    /// Optional hook invoked once per disconnect, before the connection
    /// record is removed.
    pub fn set_disconnect_hook<F>(&mut self, hook: F)
    where
        F: FnMut(ConnectionUid) + Send + 'static,
    {
        self.disconnect_hook = Some(Box::new(hook));
    }

    // Tick

    /// Runs one engine cycle. Must be called exactly once per host
    /// scheduler invocation.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }
        // any send handle still open from the previous tick is now stale
        self.epoch += 1;
        self.flush_pending_disconnects();

        for driver in &mut self.drivers {
            driver.schedule_update();
        }

        self.remove_dead_connections();
        self.accept_connections();
        self.drain_events();
        self.send_heartbeats();

        if self.trackers.sweep_due() {
            self.sweep_trackers();
        }
        self.flush_pending_disconnects();
    }

    /// Queues a disconnect; honored within the current tick or at the
    /// start of the next one.
    pub fn disconnect(&mut self, uid: ConnectionUid) {
        if !self.pending_disconnects.contains(&uid) {
            self.pending_disconnects.push(uid);
        }
    }

    // Sending

    /// Opens a two-phase send to one connection. The returned handle's
    /// writer is positioned for payload; finish with `commit`. `None`
    /// when the target is unknown, the writer could not be prepared, or a
    /// send-pipeline step discarded or disconnected the message.
    pub fn begin_send(
        &mut self,
        uid: ConnectionUid,
        key: MessageKey,
        pipeline: TransportPipeline,
        metadata: Metadata,
    ) -> Option<SendHandle> {
        if !self.running {
            return None;
        }
        let entry = self.connections.iter().find(|entry| entry.uid == uid)?;
        let (driver_index, conn) = (entry.driver_index, entry.conn);
        match open_frame(
            self.drivers[driver_index].as_mut(),
            driver_index,
            conn,
            uid,
            key,
            pipeline,
            metadata,
            &mut self.send_pipeline,
            self.epoch,
        ) {
            Ok(handle) => Some(handle),
            Err(SendAbort::Disconnected) => {
                self.disconnect(uid);
                None
            }
            Err(_) => None,
        }
    }

    /// Seals and transmits a handle opened with `begin_send`.
    pub fn commit(&mut self, handle: SendHandle) -> bool {
        let driver_index = handle.driver_index();
        let uid = handle.uid();
        let Some(driver) = self.drivers.get_mut(driver_index) else {
            return false;
        };
        let sent = commit_frame(driver.as_mut(), handle, self.epoch);
        if sent {
            self.mark_sent(uid);
        }
        sent
    }

    /// Opens a multicast to an explicit recipient set; the caller fills
    /// the template writer once.
    pub fn begin_multicast(
        &mut self,
        uids: Vec<ConnectionUid>,
        key: MessageKey,
        pipeline: TransportPipeline,
        metadata: Metadata,
    ) -> MulticastHandle {
        open_multicast(
            MulticastTargets::Explicit(uids),
            key,
            pipeline,
            metadata,
            self.epoch,
        )
    }

    /// Multicast over whatever connections exist at commit time.
    pub fn broadcast(
        &mut self,
        key: MessageKey,
        pipeline: TransportPipeline,
        metadata: Metadata,
    ) -> MulticastHandle {
        open_multicast(
            MulticastTargets::AllConnections,
            key,
            pipeline,
            metadata,
            self.epoch,
        )
    }

    /// Re-frames the template per recipient, running the send pipeline
    /// for each; recipients that fail any step are skipped. Returns the
    /// number of successful sends.
    pub fn commit_multicast(&mut self, handle: MulticastHandle) -> usize {
        if handle.epoch() != self.epoch {
            warn!(
                "[{}] multicast handle outlived its tick, aborting",
                WarningCode::StaleSendHandle
            );
            return 0;
        }
        let recipients: Vec<ConnectionUid> = match handle.targets() {
            MulticastTargets::Explicit(uids) => uids.clone(),
            MulticastTargets::AllConnections => self.connection_uids(),
        };

        let mut delivered = 0;
        for uid in recipients {
            let Some(entry) = self.connections.iter().find(|entry| entry.uid == uid) else {
                continue;
            };
            let (driver_index, conn) = (entry.driver_index, entry.conn);
            match commit_multicast_one(
                self.drivers[driver_index].as_mut(),
                conn,
                uid,
                handle.key(),
                handle.pipeline(),
                handle.metadata(),
                handle.template_bytes(),
                &mut self.send_pipeline,
            ) {
                Ok(()) => {
                    delivered += 1;
                    self.mark_sent(uid);
                }
                Err(SendAbort::Disconnected) => self.disconnect(uid),
                Err(_) => {}
            }
        }
        delivered
    }

    fn mark_sent(&mut self, uid: ConnectionUid) {
        if let Some(entry) = self.connections.iter_mut().find(|entry| entry.uid == uid) {
            entry.last_sent = Instant::now();
        }
    }

    // Private tick stages

    fn remove_dead_connections(&mut self) {
        for index in (0..self.connections.len()).rev() {
            let (uid, driver_index, conn, last_heard) = {
                let entry = &self.connections[index];
                (entry.uid, entry.driver_index, entry.conn, entry.last_heard)
            };
            let open = self
                .drivers
                .get(driver_index)
                .map(|driver| driver.is_open(&conn))
                .unwrap_or(false);
            if !open {
                self.drop_connection(index, false);
            } else if last_heard.elapsed() > self.config.connection.disconnection_timeout {
                warn!(
                    "[{}] connection {} timed out",
                    WarningCode::ConnectionTimedOut,
                    uid
                );
                self.drop_connection(index, true);
            }
        }
    }

    fn accept_connections(&mut self) {
        for driver_index in 0..self.drivers.len() {
            while let Some(conn) = self.drivers[driver_index].accept() {
                if self.connections.len() >= self.config.max_players {
                    warn!(
                        "[{}] connection cap {} reached, disconnecting new connection",
                        WarningCode::ConnectionCapExceeded,
                        self.config.max_players
                    );
                    self.drivers[driver_index].disconnect(&conn);
                    continue;
                }
                let uid = self.uid_allocator.allocate();
                let now = Instant::now();
                self.connections.push(ConnectionEntry {
                    uid,
                    driver_index,
                    conn,
                    last_heard: now,
                    last_sent: now,
                });
                self.trackers.track_connected(uid, conn);
                self.directory.register(uid, 0, Some(conn));
                info!(
                    "client {} connected via {}",
                    uid,
                    self.drivers[driver_index].name()
                );
                self.events.emit_connected(uid);
            }
        }
    }

    fn drain_events(&mut self) {
        let mut index = 0;
        while index < self.connections.len() {
            let (uid, driver_index, conn) = {
                let entry = &self.connections[index];
                (entry.uid, entry.driver_index, entry.conn)
            };
            let mut disconnect = false;
            let mut transport_closed = false;
            loop {
                match self.drivers[driver_index].pop_event(&conn) {
                    TransportEvent::Empty => break,
                    TransportEvent::Connect => {
                        // server connections complete at accept
                    }
                    TransportEvent::Data(payload) => {
                        self.connections[index].last_heard = Instant::now();
                        let outcome = process_frame(
                            uid,
                            &payload,
                            &mut self.receive_pipeline,
                            &mut self.dispatcher,
                            &self.directory,
                        );
                        if outcome == ReceiveOutcome::Disconnect {
                            disconnect = true;
                            break;
                        }
                    }
                    TransportEvent::Disconnect => {
                        disconnect = true;
                        transport_closed = true;
                        break;
                    }
                }
            }
            if disconnect {
                self.drop_connection(index, !transport_closed);
            } else {
                index += 1;
            }
        }
    }

    fn send_heartbeats(&mut self) {
        let interval = self.config.connection.heartbeat_interval;
        for index in 0..self.connections.len() {
            let (driver_index, conn, last_sent) = {
                let entry = &self.connections[index];
                (entry.driver_index, entry.conn, entry.last_sent)
            };
            if last_sent.elapsed() < interval {
                continue;
            }
            // an empty payload is below the preamble size, a pure keepalive
            let result = self.drivers[driver_index].end_send(
                &conn,
                TransportPipeline::Unreliable,
                Vec::new(),
            );
            if result.is_ok() {
                self.connections[index].last_sent = Instant::now();
            }
        }
    }

    fn sweep_trackers(&mut self) {
        for (uid, conn) in self.trackers.sweep() {
            let Some(conn) = conn else {
                continue;
            };
            // expired while the transport link is somehow still alive
            let position = self
                .connections
                .iter()
                .position(|entry| entry.uid == uid && entry.conn == conn);
            if let Some(index) = position {
                self.drop_connection(index, true);
            }
        }
    }

    fn flush_pending_disconnects(&mut self) {
        while let Some(uid) = self.pending_disconnects.pop() {
            let position = self.connections.iter().position(|entry| entry.uid == uid);
            if let Some(index) = position {
                self.drop_connection(index, true);
            }
        }
    }

    fn drop_connection(&mut self, index: usize, close_transport: bool) {
        let entry = self.connections.remove(index);
        if close_transport {
            if let Some(driver) = self.drivers.get_mut(entry.driver_index) {
                driver.disconnect(&entry.conn);
            }
        }
        if let Some(hook) = self.disconnect_hook.as_mut() {
            hook(entry.uid);
        }
        self.trackers.mark_disconnected(entry.uid);
        info!("client {} disconnected", entry.uid);
        self.events.emit_disconnected(entry.uid);
        self.directory.remove(entry.uid);
    }
}
