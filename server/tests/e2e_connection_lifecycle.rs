//! Accept cap, identifier allocation, disconnect events and engine
//! start/stop error codes.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use wirecast_server::{Server, ServerConfig, ServerError, MAX_TRANSPORT_DRIVERS};
use wirecast_shared::transport::{
    loopback::{LoopbackConnector, LoopbackServer},
    TransportDriver,
};

fn start_server(config: ServerConfig) -> (Server, LoopbackConnector) {
    let mut server = Server::new(config);
    let driver = LoopbackServer::new();
    let connector = driver.connector();
    server.start(vec![Box::new(driver)]).unwrap();
    (server, connector)
}

#[test]
fn connections_beyond_max_players_are_rejected() {
    let config = ServerConfig {
        max_players: 2,
        ..ServerConfig::default()
    };
    let (mut server, connector) = start_server(config);

    let connected = Arc::new(Mutex::new(Vec::new()));
    let sink = connected.clone();
    server.on_client_connected(move |uid| sink.lock().unwrap().push(uid));

    let first = connector.open();
    let second = connector.open();
    let third = connector.open();
    server.tick();

    assert_eq!(*connected.lock().unwrap(), vec![1u64, 2]);
    assert_eq!(server.connection_count(), 2);
    assert!(first.is_open());
    assert!(second.is_open());
    assert!(!third.is_open());
}

#[test]
fn uids_stay_monotonic_across_disconnects() {
    let (mut server, connector) = start_server(ServerConfig::default());

    let connected = Arc::new(Mutex::new(Vec::new()));
    let sink = connected.clone();
    server.on_client_connected(move |uid| sink.lock().unwrap().push(uid));

    let first = connector.open();
    let _second = connector.open();
    server.tick();

    first.close();
    server.tick();
    assert_eq!(server.connection_count(), 1);

    let _third = connector.open();
    server.tick();

    let seen = connected.lock().unwrap().clone();
    assert_eq!(seen, vec![1u64, 2, 3]);
    assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn peer_close_emits_disconnect_after_hook() {
    let (mut server, connector) = start_server(ServerConfig::default());

    let order = Arc::new(Mutex::new(Vec::new()));
    let sink = order.clone();
    server.set_disconnect_hook(move |uid| sink.lock().unwrap().push(("hook", uid)));
    let sink = order.clone();
    server.on_client_disconnected(move |uid| sink.lock().unwrap().push(("event", uid)));

    let peer = connector.open();
    server.tick();
    assert!(server.directory().contains(1));

    peer.close();
    server.tick();

    assert_eq!(
        *order.lock().unwrap(),
        vec![("hook", 1u64), ("event", 1u64)]
    );
    assert!(!server.directory().contains(1));
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn silent_connections_time_out() {
    let mut config = ServerConfig::default();
    config.connection.disconnection_timeout = Duration::ZERO;
    let (mut server, connector) = start_server(config);

    let peer = connector.open();
    server.tick();
    assert_eq!(server.connection_count(), 1);

    server.tick();
    assert_eq!(server.connection_count(), 0);
    assert!(!peer.is_open());
}

#[test]
fn idle_connections_receive_heartbeats() {
    let mut config = ServerConfig::default();
    config.connection.heartbeat_interval = Duration::ZERO;
    let (mut server, connector) = start_server(config);

    let peer = connector.open();
    server.tick();

    // the keepalive is an empty payload, below the frame preamble size
    assert_eq!(peer.try_recv(), Some(Vec::new()));
}

#[test]
fn start_validates_configuration() {
    let config = ServerConfig {
        max_players: 0,
        ..ServerConfig::default()
    };
    let mut server = Server::new(config);
    let result = server.start(vec![Box::new(LoopbackServer::new())]);
    assert_eq!(result, Err(ServerError::ZeroMaxPlayers));

    let mut server = Server::new(ServerConfig::default());
    assert_eq!(
        server.start(Vec::new()),
        Err(ServerError::DriverCountOutOfRange {
            count: 0,
            max: MAX_TRANSPORT_DRIVERS,
        })
    );

    let too_many: Vec<Box<dyn TransportDriver>> = (0..MAX_TRANSPORT_DRIVERS + 1)
        .map(|_| Box::new(LoopbackServer::new()) as Box<dyn TransportDriver>)
        .collect();
    assert_eq!(
        server.start(too_many),
        Err(ServerError::DriverCountOutOfRange {
            count: MAX_TRANSPORT_DRIVERS + 1,
            max: MAX_TRANSPORT_DRIVERS,
        })
    );
}

#[test]
fn double_start_is_rejected() {
    let (mut server, _connector) = start_server(ServerConfig::default());
    let result = server.start(vec![Box::new(LoopbackServer::new())]);
    assert_eq!(result, Err(ServerError::AlreadyStarted));
}

#[test]
fn bind_failure_policy_is_honored() {
    // lenient: the server starts on the drivers that bound
    let mut server = Server::new(ServerConfig::default());
    let mut refusing = LoopbackServer::new();
    refusing.refuse_bind();
    let working = LoopbackServer::new();
    let connector = working.connector();
    server
        .start(vec![Box::new(refusing), Box::new(working)])
        .unwrap();
    let _peer = connector.open();
    server.tick();
    assert_eq!(server.connection_count(), 1);

    // strict: any bind failure aborts start
    let mut server = Server::new(ServerConfig {
        stop_on_bind_failure: true,
        ..ServerConfig::default()
    });
    let mut refusing = LoopbackServer::new();
    refusing.refuse_bind();
    let result = server.start(vec![Box::new(refusing), Box::new(LoopbackServer::new())]);
    assert!(matches!(result, Err(ServerError::Transport(_))));
    assert!(!server.is_running());

    // every driver failing leaves nothing bound
    let mut server = Server::new(ServerConfig::default());
    let mut refusing = LoopbackServer::new();
    refusing.refuse_bind();
    assert_eq!(
        server.start(vec![Box::new(refusing)]),
        Err(ServerError::NoDriversBound)
    );
}

#[test]
fn stop_releases_connections_and_rejects_double_stop() {
    let (mut server, connector) = start_server(ServerConfig::default());

    let peer = connector.open();
    server.tick();
    assert_eq!(server.connection_count(), 1);

    server.stop().unwrap();
    assert!(!server.is_running());
    assert_eq!(server.connection_count(), 0);
    assert!(!server.directory().contains(1));
    assert!(!peer.is_open());

    assert_eq!(server.stop(), Err(ServerError::NotStarted));
}
