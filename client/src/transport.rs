// SPDX-License-Identifier: GPL-3.0-only

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use log::trace;

use hlds_protocol::a2s::{self, SplitFragment};
use hlds_protocol::types::Str;
use hlds_protocol::Error as ProtocolError;

use crate::Error;

/// Largest datagram a game server sends.
pub(crate) const MAX_DATAGRAM: usize = 4096;

/// Which split-packet header a server uses. Chosen by engine kind,
/// never auto-detected.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum SplitDialect {
    /// 9-byte header, counts packed into nibbles.
    GoldSrc,
    /// 12-byte header, whole bytes for total and index.
    OrangeBox,
}

impl SplitDialect {
    fn fragment<'a>(&self, src: &'a [u8]) -> Result<SplitFragment<'a>, Error> {
        match self {
            Self::GoldSrc => SplitFragment::goldsrc(src).map_err(Error::from),
            Self::OrangeBox => SplitFragment::orangebox(src).map_err(Error::from),
        }
    }
}

fn bind_for(addr: &SocketAddr) -> Result<UdpSocket, Error> {
    let local: SocketAddr = match addr {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    Ok(UdpSocket::bind(local)?)
}

/// Sends one datagram and does not wait for a reply.
pub(crate) fn send(addr: SocketAddr, request: &[u8]) -> Result<(), Error> {
    let sock = bind_for(&addr)?;
    sock.connect(addr)?;
    trace!("{addr}: send {}", Str(request));
    sock.send(request)?;
    Ok(())
}

/// Sends one request datagram and collects the complete reply.
///
/// The transient socket is connected, so datagrams from other peers are
/// filtered by the OS. The first reply datagram decides everything:
/// `FF FF FF FF` is returned as-is, `FE FF FF FF` starts split
/// reassembly on the same socket, anything else is an error carrying
/// the offending header.
pub(crate) fn query(
    addr: SocketAddr,
    request: &[u8],
    timeout: Option<Duration>,
    dialect: SplitDialect,
) -> Result<Vec<u8>, Error> {
    let sock = bind_for(&addr)?;
    sock.set_read_timeout(timeout)?;
    sock.connect(addr)?;
    trace!("{addr}: send {}", Str(request));
    sock.send(request)?;

    let mut buf = [0; MAX_DATAGRAM];
    let n = recv(&sock, &mut buf)?;
    trace!("{addr}: recv {}", Str(&buf[..n]));
    if n < 4 {
        return Err(Error::Format(ProtocolError::InvalidPacket));
    }
    let header: [u8; 4] = buf[..4].try_into().unwrap();
    if header == a2s::SINGLE_PACKET {
        Ok(buf[..n].to_vec())
    } else if header == a2s::SPLIT_PACKET {
        reassemble(&sock, &buf[..n], dialect)
    } else {
        Err(Error::UnknownHeader(header))
    }
}

fn recv(sock: &UdpSocket, buf: &mut [u8]) -> Result<usize, Error> {
    sock.recv(buf).map_err(Error::from_recv)
}

/// Reads split fragments until the group is complete and concatenates
/// their payloads in index order, headers stripped.
fn reassemble(sock: &UdpSocket, first: &[u8], dialect: SplitDialect) -> Result<Vec<u8>, Error> {
    let fragment = dialect.fragment(first)?;
    let group = fragment.id;
    let total = fragment.total as usize;
    if total == 0 {
        return Ok(Vec::new());
    }

    let mut parts: Vec<Option<Vec<u8>>> = vec![None; total];
    let mut missing = total;
    let mut buf = [0; MAX_DATAGRAM];

    store(&mut parts, &mut missing, &fragment)?;
    while missing > 0 {
        let n = recv(sock, &mut buf)?;
        trace!("split fragment: {}", Str(&buf[..n]));
        let fragment = dialect.fragment(&buf[..n])?;
        if fragment.id != group || fragment.total as usize != total {
            return Err(Error::Format(ProtocolError::InvalidPacket));
        }
        store(&mut parts, &mut missing, &fragment)?;
    }

    let mut out = Vec::new();
    for part in parts {
        out.extend_from_slice(&part.expect("all fragments received"));
    }
    Ok(out)
}

/// Files a fragment into its slot; duplicates are ignored.
fn store(
    parts: &mut [Option<Vec<u8>>],
    missing: &mut usize,
    fragment: &SplitFragment,
) -> Result<(), Error> {
    let slot = parts
        .get_mut(fragment.index as usize)
        .ok_or(ProtocolError::InvalidPacket)?;
    if slot.is_none() {
        *slot = Some(fragment.payload.to_vec());
        *missing -= 1;
    }
    Ok(())
}
