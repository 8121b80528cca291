//! End-to-end receive paths: raw frames pushed over the loopback
//! transport, through accept, pipelines and dispatch.

use std::sync::{Arc, Mutex};

use wirecast_server::{Server, ServerConfig};
use wirecast_shared::{
    transport::loopback::{LoopbackConnector, LoopbackServer},
    HandlerOptions, Uid,
};

fn start_server(config: ServerConfig) -> (Server, LoopbackConnector) {
    let mut server = Server::new(config);
    let driver = LoopbackServer::new();
    let connector = driver.connector();
    server.start(vec![Box::new(driver)]).unwrap();
    (server, connector)
}

#[test]
fn default_frame_invokes_typed_handler_exactly_once() {
    let (mut server, connector) = start_server(ServerConfig::default());

    let hits = Arc::new(Mutex::new(Vec::new()));
    let sink = hits.clone();
    server
        .dispatcher_mut()
        .register_data_typed(
            0x0042,
            HandlerOptions::default(),
            move |uid: Uid, value: i32| {
                sink.lock().unwrap().push((uid.0, value));
            },
        )
        .unwrap()
        .unwrap();

    let peer = connector.open();
    server.tick();
    assert_eq!(server.connection_count(), 1);

    // metadata=Default, key=0x0042, int 13, total length 11
    peer.send(vec![
        0x00, 0x42, 0x00, 0x0D, 0x00, 0x00, 0x00, 0x0B, 0x00, 0x00, 0x00,
    ])
    .unwrap();
    server.tick();

    assert_eq!(*hits.lock().unwrap(), vec![(1u64, 13)]);
}

#[test]
fn event_frame_with_payload_is_dropped_without_disconnect() {
    let (mut server, connector) = start_server(ServerConfig::default());

    let hits = Arc::new(Mutex::new(0u32));
    let sink = hits.clone();
    server
        .dispatcher_mut()
        .register_event(0x0001, HandlerOptions::default(), move |_, _| {
            *sink.lock().unwrap() += 1;
        })
        .unwrap();

    let peer = connector.open();
    server.tick();

    // metadata=Event, key=0x0001, one stray payload byte, total length 8
    peer.send(vec![0x80, 0x01, 0x00, 0xFF, 0x08, 0x00, 0x00, 0x00])
        .unwrap();
    server.tick();

    assert_eq!(*hits.lock().unwrap(), 0);
    assert_eq!(server.connection_count(), 1);
    assert!(peer.is_open());
}

#[test]
fn well_formed_event_frame_dispatches() {
    let (mut server, connector) = start_server(ServerConfig::default());

    let hits = Arc::new(Mutex::new(Vec::new()));
    let sink = hits.clone();
    server
        .dispatcher_mut()
        .register_event(0x0001, HandlerOptions::default(), move |uid, _| {
            sink.lock().unwrap().push(uid);
        })
        .unwrap();

    let peer = connector.open();
    server.tick();
    peer.send(vec![0x80, 0x01, 0x00, 0x07, 0x00, 0x00, 0x00])
        .unwrap();
    server.tick();

    assert_eq!(*hits.lock().unwrap(), vec![1u64]);
}

#[test]
fn permission_gate_blocks_message_but_keeps_connection() {
    let (mut server, connector) = start_server(ServerConfig::default());

    let hits = Arc::new(Mutex::new(0u32));
    let sink = hits.clone();
    server
        .dispatcher_mut()
        .register_data(
            0x0005,
            HandlerOptions {
                required_flags: 0x0001,
                ..HandlerOptions::default()
            },
            move |_, _, _| {
                *sink.lock().unwrap() += 1;
            },
        )
        .unwrap();

    let peer = connector.open();
    server.tick();

    // valid default frame for key 0x0005 with a u8 payload
    peer.send(vec![0x00, 0x05, 0x00, 0x2A, 0x08, 0x00, 0x00, 0x00])
        .unwrap();
    server.tick();

    assert_eq!(*hits.lock().unwrap(), 0);
    assert_eq!(server.connection_count(), 1);
    assert!(peer.is_open());

    // granting the bit lets the same frame through
    server.directory().flags(1).unwrap().set_bit(0);
    peer.send(vec![0x00, 0x05, 0x00, 0x2A, 0x08, 0x00, 0x00, 0x00])
        .unwrap();
    server.tick();
    assert_eq!(*hits.lock().unwrap(), 1);
}

#[test]
fn receive_pipeline_disconnect_drops_the_connection_mid_drain() {
    let (mut server, connector) = start_server(ServerConfig::default());

    let hits = Arc::new(Mutex::new(0u32));
    let sink = hits.clone();
    server
        .dispatcher_mut()
        .register_data(0x0009, HandlerOptions::default(), move |_, _, _| {
            *sink.lock().unwrap() += 1;
        })
        .unwrap();
    server.receive_pipeline_mut().add_step(|params| {
        if params.metadata.flag(0) {
            wirecast_shared::StepResult::DisconnectClient
        } else {
            wirecast_shared::StepResult::Success
        }
    });

    let peer = connector.open();
    server.tick();

    // first frame trips the pipeline; the second must never be processed
    peer.send(vec![0x01, 0x09, 0x00, 0x07, 0x00, 0x00, 0x00])
        .unwrap();
    peer.send(vec![0x00, 0x09, 0x00, 0x07, 0x00, 0x00, 0x00])
        .unwrap();
    server.tick();

    assert_eq!(*hits.lock().unwrap(), 0);
    assert_eq!(server.connection_count(), 0);
    assert!(!peer.is_open());
}

#[test]
fn keepalive_frames_are_ignored() {
    let (mut server, connector) = start_server(ServerConfig::default());

    let peer = connector.open();
    server.tick();

    peer.send(Vec::new()).unwrap();
    peer.send(vec![0x00]).unwrap();
    server.tick();

    assert_eq!(server.connection_count(), 1);
}
