use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    time::Instant,
};

use log::{info, warn};

use wirecast_shared::{
    commit_frame, open_frame, process_frame,
    transport::{TransportConn, TransportDriver, TransportEvent, TransportPipeline},
    CodecRegistry, ConnectionDirectory, Dispatcher, MessageKey, Metadata, ReceiveOutcome,
    ReceivePipeline, SendAbort, SendHandle, SendPipeline, WarningCode, SELF_UID,
};

use crate::{config::ClientConfig, error::ClientError};

type Callback = Box<dyn FnMut() + Send>;

/// The client side of the message engine. Holds one transport driver and
/// one connection to a server, the local directory with the "self" record
/// under UID 0, and the two client-side pipelines (server-to-client
/// receive, client-to-server send).
pub struct Client {
    config: ClientConfig,
    driver: Option<Box<dyn TransportDriver>>,
    conn: Option<TransportConn>,
    dispatcher: Dispatcher,
    directory: ConnectionDirectory,
    receive_pipeline: ReceivePipeline,
    send_pipeline: SendPipeline,
    on_connect: Vec<Callback>,
    on_disconnect: Vec<Callback>,
    disconnect_hook: Option<Callback>,
    pending_disconnect: bool,
    connected: bool,
    last_heard: Instant,
    last_sent: Instant,
    epoch: u64,
}

impl Client {
    /// Create a new Client
    pub fn new(config: ClientConfig) -> Self {
        let dispatcher = Dispatcher::new(config.side, CodecRegistry::default());
        Self {
            config,
            driver: None,
            conn: None,
            dispatcher,
            directory: ConnectionDirectory::new(),
            receive_pipeline: ReceivePipeline::new(),
            send_pipeline: SendPipeline::new(),
            on_connect: Vec::new(),
            on_disconnect: Vec::new(),
            disconnect_hook: None,
            pending_disconnect: false,
            connected: false,
            last_heard: Instant::now(),
            last_sent: Instant::now(),
            epoch: 0,
        }
    }

    /// Dials the server through the given driver at the configured
    /// address. Connection completion surfaces as the connect event on a
    /// later tick.
    pub fn connect(&mut self, mut driver: Box<dyn TransportDriver>) -> Result<(), ClientError> {
        if self.driver.is_some() {
            return Err(ClientError::AlreadyConnected);
        }
        let addr = self.server_addr(driver.default_port());
        let conn = driver.connect(addr)?;
        info!("connecting to {} via {}", addr, driver.name());
        self.driver = Some(driver);
        self.conn = Some(conn);
        self.connected = false;
        self.pending_disconnect = false;
        self.last_heard = Instant::now();
        self.last_sent = Instant::now();
        Ok(())
    }

    /// Tears the connection down immediately.
    pub fn disconnect(&mut self) -> Result<(), ClientError> {
        if self.driver.is_none() {
            return Err(ClientError::NotConnected);
        }
        self.cleanup(true);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn server_addr(&self, default_port: u16) -> SocketAddr {
        let port = self.config.port.unwrap_or(default_port);
        let ip = if self.config.use_ipv4 {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            IpAddr::V6(Ipv6Addr::LOCALHOST)
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

    /// The server-to-client receive pipeline.
    pub fn receive_pipeline_mut(&mut self) -> &mut ReceivePipeline {
        &mut self.receive_pipeline
    }

    /// The client-to-server send pipeline.
    pub fn send_pipeline_mut(&mut self) -> &mut SendPipeline {
        &mut self.send_pipeline
    }

    pub fn directory(&self) -> &ConnectionDirectory {
        &self.directory
    }

    // Events

    pub fn on_connect<F>(&mut self, callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.on_connect.push(Box::new(callback));
    }

    pub fn on_disconnect<F>(&mut self, callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.on_disconnect.push(Box::new(callback));
    }

    /// Optional hook invoked once per disconnect, before the self record
    /// is removed.
    pub fn set_disconnect_hook<F>(&mut self, hook: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.disconnect_hook = Some(Box::new(hook));
    }

    // Tick

    /// Runs one engine cycle; call once per host scheduler invocation.
    pub fn tick(&mut self) {
        let Some(conn) = self.conn else {
            return;
        };
        self.epoch += 1;
        if self.pending_disconnect {
            self.cleanup(true);
            return;
        }
        if let Some(driver) = self.driver.as_mut() {
            driver.schedule_update();
        }

        if self.connected
            && self.last_heard.elapsed() > self.config.connection.disconnection_timeout
        {
            warn!(
                "[{}] server went silent, disconnecting",
                WarningCode::ConnectionTimedOut
            );
            self.cleanup(true);
            return;
        }

        loop {
            let Some(driver) = self.driver.as_mut() else {
                return;
            };
            match driver.pop_event(&conn) {
                TransportEvent::Empty => break,
                TransportEvent::Connect => {
                    self.connected = true;
                    self.last_heard = Instant::now();
                    self.directory.register_self(0);
                    info!("connected to server");
                    for callback in &mut self.on_connect {
                        callback();
                    }
                }
                TransportEvent::Data(payload) => {
                    self.last_heard = Instant::now();
                    let outcome = process_frame(
                        SELF_UID,
                        &payload,
                        &mut self.receive_pipeline,
                        &mut self.dispatcher,
                        &self.directory,
                    );
                    if outcome == ReceiveOutcome::Disconnect {
                        self.cleanup(true);
                        return;
                    }
                }
                TransportEvent::Disconnect => {
                    self.cleanup(false);
                    return;
                }
            }
        }

        self.send_heartbeat(conn);
    }

    // Sending

    /// Opens a two-phase send to the server; finish with `commit`.
    pub fn begin_send(
        &mut self,
        key: MessageKey,
        pipeline: TransportPipeline,
        metadata: Metadata,
    ) -> Option<SendHandle> {
        let conn = self.conn?;
        let driver = self.driver.as_mut()?;
        match open_frame(
            driver.as_mut(),
            0,
            conn,
            SELF_UID,
            key,
            pipeline,
            metadata,
            &mut self.send_pipeline,
            self.epoch,
        ) {
            Ok(handle) => Some(handle),
            Err(SendAbort::Disconnected) => {
                self.pending_disconnect = true;
                None
            }
            Err(_) => None,
        }
    }

    /// Seals and transmits a handle opened with `begin_send`.
    pub fn commit(&mut self, handle: SendHandle) -> bool {
        let Some(driver) = self.driver.as_mut() else {
            return false;
        };
        let sent = commit_frame(driver.as_mut(), handle, self.epoch);
        if sent {
            self.last_sent = Instant::now();
        }
        sent
    }

    fn send_heartbeat(&mut self, conn: TransportConn) {
        if !self.connected
            || self.last_sent.elapsed() < self.config.connection.heartbeat_interval
        {
            return;
        }
        let Some(driver) = self.driver.as_mut() else {
            return;
        };
        if driver
            .end_send(&conn, TransportPipeline::Unreliable, Vec::new())
            .is_ok()
        {
            self.last_sent = Instant::now();
        }
    }

    fn cleanup(&mut self, close_transport: bool) {
        if close_transport {
            if let (Some(driver), Some(conn)) = (self.driver.as_mut(), self.conn) {
                driver.disconnect(&conn);
            }
        }
        if let Some(hook) = self.disconnect_hook.as_mut() {
            hook();
        }
        self.directory.remove(SELF_UID);
        self.driver = None;
        self.conn = None;
        self.pending_disconnect = false;
        let was_connected = self.connected;
        self.connected = false;
        if was_connected {
            info!("disconnected from server");
            for callback in &mut self.on_disconnect {
                callback();
            }
        }
    }
}
