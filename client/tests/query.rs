use std::net::{SocketAddr, UdpSocket};
use std::thread;

use hlds_client::protocol::a2s;
use hlds_client::protocol::info::ServerInfo;
use hlds_client::{Error, GoldSrcServer, SourceServer};

/// Spawns a fake server that answers every datagram with the replies
/// the responder produces for it.
fn spawn_udp<F>(mut responder: F) -> SocketAddr
where
    F: FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
{
    let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
    let addr = sock.local_addr().unwrap();
    thread::spawn(move || {
        let mut buf = [0; 4096];
        while let Ok((n, from)) = sock.recv_from(&mut buf) {
            for reply in responder(&buf[..n]) {
                sock.send_to(&reply, from).unwrap();
            }
        }
    });
    addr
}

fn source_info_reply() -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(b"\xff\xff\xff\xff\x49\x2f");
    buf.extend_from_slice(b"Fortress\0de_dust2\0cstrike\0Counter-Strike\0");
    buf.extend_from_slice(&240i16.to_le_bytes());
    buf.extend_from_slice(&[12, 32, 2]);
    buf.extend_from_slice(b"dl\x00\x01");
    buf.extend_from_slice(b"1.37.1.1\0");
    buf
}

fn goldsrc_info_reply() -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(b"\xff\xff\xff\xff\x6d");
    buf.extend_from_slice(b"10.0.0.1:27015\0HLDM\0crossfire\0valve\0Half-Life\0");
    buf.extend_from_slice(&[3, 16, 47]);
    buf.extend_from_slice(b"dl\x00\x00");
    buf.extend_from_slice(&[1, 0]);
    buf
}

#[test]
fn get_info_source() {
    let addr = spawn_udp(|req| {
        assert_eq!(req, a2s::GetInfo::REQUEST);
        vec![source_info_reply()]
    });
    let server = SourceServer::new(addr);
    match server.get_info().unwrap() {
        ServerInfo::Source(info) => {
            assert_eq!(info.name, "Fortress");
            assert_eq!(info.app_id, 240);
            assert_eq!(info.players, 12);
        }
        other => panic!("wrong variant: {other:?}"),
    }
}

#[test]
fn get_info_goldsrc() {
    let addr = spawn_udp(|req| {
        assert_eq!(req, a2s::GetInfo::REQUEST);
        vec![goldsrc_info_reply()]
    });
    let server = GoldSrcServer::new(addr);
    match server.get_info().unwrap() {
        ServerInfo::GoldSrc(info) => {
            assert_eq!(info.name, "HLDM");
            assert_eq!(info.address, "10.0.0.1:27015");
            assert!(info.secure);
        }
        other => panic!("wrong variant: {other:?}"),
    }
}

#[test]
fn split_reply_orangebox() {
    // the full reply split into two fragments, sent out of order
    let full = source_info_reply();
    let split = full.len() / 2;
    let fragment = |index: u8, payload: &[u8]| {
        let mut buf = b"\xfe\xff\xff\xff\x09\x00\x00\x00".to_vec();
        buf.push(2);
        buf.push(index);
        buf.extend_from_slice(&1248i16.to_le_bytes());
        buf.extend_from_slice(payload);
        buf
    };
    let second = fragment(1, &full[split..]);
    let first = fragment(0, &full[..split]);
    let addr = spawn_udp(move |_| vec![second.clone(), first.clone()]);

    let server = SourceServer::new(addr);
    let info = server.get_info().unwrap();
    assert_eq!(info.name(), "Fortress");
}

#[test]
fn split_reply_goldsrc() {
    let full = goldsrc_info_reply();
    let split = full.len() / 2;
    let fragment = |index: u8, payload: &[u8]| {
        let mut buf = b"\xfe\xff\xff\xff\x07\x00\x00\x00".to_vec();
        buf.push(2 | (index << 4));
        buf.extend_from_slice(payload);
        buf
    };
    let first = fragment(0, &full[..split]);
    let second = fragment(1, &full[split..]);
    let addr = spawn_udp(move |_| vec![first.clone(), second.clone()]);

    let server = GoldSrcServer::new(addr);
    let info = server.get_info().unwrap();
    assert_eq!(info.name(), "HLDM");
}

#[test]
fn players_after_challenge() {
    let addr = spawn_udp(|req| {
        if req == a2s::GetChallenge::REQUEST {
            return vec![b"\xff\xff\xff\xff\x41\x2c\x21\x16\x0b".to_vec()];
        }
        assert_eq!(req, b"\xff\xff\xff\xff\x55\x2c\x21\x16\x0b");
        vec![b"\xff\xff\xff\xff\x44\x01\x00Joe\0\x05\x00\x00\x00\x00\x00\xf0\x41".to_vec()]
    });
    let server = GoldSrcServer::new(addr);
    let players = server.get_players().unwrap();
    assert_eq!(players.len(), 1);
    assert_eq!(players[0].name, "Joe");
    assert_eq!(players[0].kills, 5);
}

#[test]
fn rules_after_challenge() {
    let addr = spawn_udp(|req| {
        if req == a2s::GetChallenge::REQUEST {
            return vec![b"\xff\xff\xff\xff\x41\x01\x00\x00\x00".to_vec()];
        }
        assert_eq!(req, b"\xff\xff\xff\xff\x56\x01\x00\x00\x00");
        vec![b"\xff\xff\xff\xff\x45\x01\x00sv_gravity\0800\0".to_vec()]
    });
    let server = SourceServer::new(addr);
    let rules = server.get_rules().unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].name, "sv_gravity");
    assert_eq!(rules[0].value, "800");
}

#[test]
fn empty_challenge_fails_queries() {
    let addr = spawn_udp(|_| vec![b"\xff\xff\xff\xff\x41\xff\xff\xff\xff".to_vec()]);
    let server = GoldSrcServer::new(addr);
    assert!(matches!(
        server.get_players(),
        Err(Error::BadQueryChallenge)
    ));
    assert!(matches!(server.get_rules(), Err(Error::BadQueryChallenge)));
}

#[test]
fn unknown_header() {
    let addr = spawn_udp(|_| vec![b"\xde\xad\xbe\xef rest".to_vec()]);
    let server = GoldSrcServer::new(addr);
    match server.get_info() {
        Err(Error::UnknownHeader(header)) => assert_eq!(header, [0xde, 0xad, 0xbe, 0xef]),
        other => panic!("expected UnknownHeader, got {other:?}"),
    }
}

#[test]
fn ping() {
    let addr = spawn_udp(|req| {
        assert_eq!(req, a2s::Ping::REQUEST);
        vec![b"\xff\xff\xff\xff\x6a\x00".to_vec()]
    });
    let server = SourceServer::new(addr);
    assert!(server.ping().unwrap());
}

#[test]
fn ping_timeout_reads_false() {
    // a bound socket that never answers
    let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
    let server = GoldSrcServer::new(silent.local_addr().unwrap());
    server.set_timeout(200).unwrap();
    assert!(!server.ping().unwrap());
}

#[test]
fn timeout_range() {
    let server = GoldSrcServer::new("127.0.0.1:27015".parse().unwrap());
    assert!(server.set_timeout(0).is_ok());
    assert!(server.set_timeout(-1).is_ok());
    assert!(matches!(
        server.set_timeout(-2),
        Err(Error::TimeoutOutOfRange(-2))
    ));
}

#[test]
fn disposed_handle_rejects_operations() {
    let addr = spawn_udp(|_| vec![source_info_reply()]);
    let server = SourceServer::new(addr);
    assert!(server.get_info().is_ok());

    server.dispose();
    assert!(server.is_disposed());
    assert!(matches!(server.ping(), Err(Error::Disposed)));
    assert!(matches!(server.get_info(), Err(Error::Disposed)));
    assert!(matches!(server.query_rcon("status"), Err(Error::Disposed)));
    assert!(matches!(server.process_log(b"x"), Err(Error::Disposed)));
}
