use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc::{self, Sender};
use std::thread;

use hlds_client::protocol::rcon::{Packet, PacketKind};
use hlds_client::{Error, SourceServer};

const PASSWORD: &str = "secret";

fn read_packet(stream: &mut TcpStream) -> Option<Packet> {
    let mut head = [0; 4];
    stream.read_exact(&mut head).ok()?;
    let size = i32::from_le_bytes(head) as usize;
    let mut payload = vec![0; size];
    stream.read_exact(&mut payload).ok()?;
    Packet::decode_payload(&payload).ok()
}

/// Fake Source RCON server. Reports the id of every received packet on
/// `ids` so tests can check monotonicity.
fn spawn_rcon_server(ids: Option<Sender<i32>>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            while let Some(packet) = read_packet(&mut stream) {
                if let Some(ids) = &ids {
                    let _ = ids.send(packet.id);
                }
                match packet.kind {
                    PacketKind::Auth => {
                        // empty response value first, then the verdict
                        let ok = packet.body == PASSWORD;
                        let id = if ok { packet.id } else { -1 };
                        stream
                            .write_all(&Packet::response(packet.id, "").encode())
                            .unwrap();
                        let verdict = Packet {
                            id,
                            kind: PacketKind::ExecOrAuthResponse,
                            body: String::new(),
                        };
                        stream.write_all(&verdict.encode()).unwrap();
                        if !ok {
                            return;
                        }
                    }
                    PacketKind::ExecOrAuthResponse if packet.body.is_empty() => {
                        // the flush sentinel: echo an empty response
                        stream
                            .write_all(&Packet::response(packet.id, "").encode())
                            .unwrap();
                    }
                    PacketKind::ExecOrAuthResponse => {
                        let replies: Vec<String> = if packet.body == "big" {
                            vec!["part one, ".into(), "part two, ".into(), "part three".into()]
                        } else {
                            vec![format!("ran {}", packet.body)]
                        };
                        for body in replies {
                            stream
                                .write_all(&Packet::response(packet.id, &body).encode())
                                .unwrap();
                        }
                    }
                    PacketKind::ResponseValue => {}
                }
            }
        }
    });
    addr
}

fn connect(addr: SocketAddr) -> SourceServer {
    let server = SourceServer::new(addr);
    server.set_timeout(2000).unwrap();
    server.set_password(PASSWORD);
    server
}

#[test]
fn auth_success() {
    let server = connect(spawn_rcon_server(None));
    assert!(!server.is_connected());
    assert!(server.connect_rcon().unwrap());
    assert!(server.is_connected());
}

#[test]
fn auth_failure() {
    let server = connect(spawn_rcon_server(None));
    server.set_password("wrong");
    assert!(matches!(server.connect_rcon(), Err(Error::BadRconPassword)));
    assert!(!server.is_connected());
}

#[test]
fn connect_twice_is_rejected() {
    let server = connect(spawn_rcon_server(None));
    server.connect_rcon().unwrap();
    assert!(matches!(server.connect_rcon(), Err(Error::AlreadyConnected)));
}

#[test]
fn query_single_packet() {
    let server = connect(spawn_rcon_server(None));
    server.connect_rcon().unwrap();
    assert_eq!(server.query_rcon("say hi").unwrap(), "ran say hi");
}

#[test]
fn query_collects_multi_packet_reply() {
    let server = connect(spawn_rcon_server(None));
    server.connect_rcon().unwrap();
    assert_eq!(
        server.query_rcon("big").unwrap(),
        "part one, part two, part three"
    );
    // the session survives for the next command
    assert_eq!(server.query_rcon("status").unwrap(), "ran status");
}

#[test]
fn packet_ids_are_monotonic() {
    let (tx, rx) = mpsc::channel();
    let server = connect(spawn_rcon_server(Some(tx)));
    server.connect_rcon().unwrap();
    server.query_rcon("a").unwrap();
    server.query_rcon("b").unwrap();
    drop(server);

    let mut last = -1;
    // auth + two commands with their flush sentinels
    for _ in 0..5 {
        let id = rx.recv().unwrap();
        assert!(id > last, "id {id} not above {last}");
        last = id;
    }
}

#[test]
fn not_connected() {
    let server = connect(spawn_rcon_server(None));
    assert!(matches!(server.query_rcon("x"), Err(Error::NotConnected)));

    server.connect_rcon().unwrap();
    server.disconnect_rcon().unwrap();
    assert!(!server.is_connected());
    assert!(matches!(server.query_rcon("x"), Err(Error::NotConnected)));

    // idempotent
    server.disconnect_rcon().unwrap();
}

#[test]
fn dispose_tears_the_session_down() {
    let server = connect(spawn_rcon_server(None));
    server.connect_rcon().unwrap();
    server.dispose();
    assert!(!server.is_connected());
    assert!(matches!(server.query_rcon("x"), Err(Error::Disposed)));
    assert!(matches!(server.connect_rcon(), Err(Error::Disposed)));
}
