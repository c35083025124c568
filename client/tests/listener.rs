use std::net::{SocketAddr, UdpSocket};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use hlds_client::protocol::event::{Event, EventKind};
use hlds_client::{Engine, Error, GoldSrcServer, LogListener, Server};

const LINE: &[u8] = b"L 01/01/2010 - 01:01:01: \"Joe<15><STEAM_0:1:23456><Blue>\" entered the game\n";

fn recv_event(rx: &mpsc::Receiver<Event>) -> Event {
    rx.recv_timeout(Duration::from_secs(5)).expect("event")
}

#[test]
fn dispatches_by_source_endpoint() {
    let peer_a = UdpSocket::bind("127.0.0.1:0").unwrap();
    let peer_b = UdpSocket::bind("127.0.0.1:0").unwrap();
    let peer_c = UdpSocket::bind("127.0.0.1:0").unwrap();

    let server_a = Server::new(Engine::GoldSrc, peer_a.local_addr().unwrap());
    let server_b = Server::new(Engine::Source, peer_b.local_addr().unwrap());
    let (tx_a, rx_a) = mpsc::channel();
    let (tx_b, rx_b) = mpsc::channel();
    server_a.set_event_handler(move |event: Event| tx_a.send(event).unwrap());
    server_b.set_event_handler(move |event: Event| tx_b.send(event).unwrap());

    let listener = LogListener::new();
    listener.add_server(&server_a).unwrap();
    listener.add_server(&server_b).unwrap();
    listener.listen("127.0.0.1:0".parse().unwrap()).unwrap();
    let target = listener.local_addr().unwrap();

    peer_a.send_to(LINE, target).unwrap();
    let event = recv_event(&rx_a);
    assert_eq!(event.code(), "051");
    match event.kind {
        EventKind::EnteredGame { player } => assert_eq!(player.nick, "Joe"),
        other => panic!("wrong kind: {other:?}"),
    }
    // only the matching server sees the datagram
    assert_eq!(
        rx_b.recv_timeout(Duration::from_millis(200)),
        Err(RecvTimeoutError::Timeout)
    );

    // an unregistered source is dropped
    peer_c.send_to(LINE, target).unwrap();
    peer_b.send_to(LINE, target).unwrap();
    let event = recv_event(&rx_b);
    assert_eq!(event.code(), "051");
}

#[test]
fn listen_twice_is_rejected() {
    let listener = LogListener::new();
    listener.listen("127.0.0.1:0".parse().unwrap()).unwrap();
    assert!(matches!(
        listener.listen("127.0.0.1:0".parse().unwrap()),
        Err(Error::AlreadyListening)
    ));
}

#[test]
fn stop_allows_a_new_listen() {
    let listener = LogListener::new();
    listener.listen("127.0.0.1:0".parse().unwrap()).unwrap();
    assert!(listener.local_addr().is_some());
    listener.stop();
    assert!(listener.local_addr().is_none());
    listener.listen("127.0.0.1:0".parse().unwrap()).unwrap();
}

#[test]
fn remove_disposed_server_is_an_error() {
    let server = Server::new(Engine::GoldSrc, "127.0.0.1:27015".parse().unwrap());
    let listener = LogListener::new();
    listener.add_server(&server).unwrap();
    server.dispose();
    assert!(matches!(listener.remove_server(&server), Err(Error::Disposed)));
    // removal by endpoint still works
    assert!(listener.remove_endpoint(server.addr()));
}

#[test]
fn unknown_event_reaches_the_error_channel() {
    let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
    let server = Server::new(Engine::GoldSrc, peer.local_addr().unwrap());
    let (tx, rx) = mpsc::channel::<(SocketAddr, Error)>();

    let listener = LogListener::new();
    listener.add_server(&server).unwrap();
    listener.set_error_handler(move |from, error| tx.send((from, error)).unwrap());
    listener.listen("127.0.0.1:0".parse().unwrap()).unwrap();
    let target = listener.local_addr().unwrap();

    peer.send_to(b"L 01/01/2010 - 01:01:01: gibberish payload\n", target)
        .unwrap();
    let (from, error) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(from, peer.local_addr().unwrap());
    assert!(matches!(error, Error::UnknownEvent(_)));

    // the reader is still alive afterwards
    let (tx_ev, rx_ev) = mpsc::channel();
    server.set_event_handler(move |event: Event| tx_ev.send(event).unwrap());
    peer.send_to(LINE, target).unwrap();
    assert_eq!(recv_event(&rx_ev).code(), "051");
}

#[test]
fn per_server_log_receiver() {
    let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
    let goldsrc = GoldSrcServer::new(peer.local_addr().unwrap());
    let (tx, rx) = mpsc::channel();
    goldsrc.set_event_handler(move |event: Event| tx.send(event).unwrap());

    Server::start_log_listener(goldsrc.server(), "127.0.0.1:0".parse().unwrap()).unwrap();
    let target = goldsrc.log_listener_addr().unwrap();
    assert!(matches!(
        Server::start_log_listener(goldsrc.server(), "127.0.0.1:0".parse().unwrap()),
        Err(Error::AlreadyListening)
    ));

    peer.send_to(LINE, target).unwrap();
    assert_eq!(recv_event(&rx).code(), "051");

    goldsrc.stop_log_listener();
    assert!(goldsrc.log_listener_addr().is_none());
}
