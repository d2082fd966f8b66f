//! Server wrapper over real sockets

mod common;

use std::io::{Read, Write};
use std::net::Shutdown;
use std::thread;
use std::time::Duration;

use conn_tease::conn::{Conn, Mode};
use conn_tease::{Server, TeaseError};

use common::tcp_pair;

#[test]
fn test_detectors_see_the_same_prefix() {
    let (mut peer, accepted) = tcp_pair();
    peer.write_all(b"PING\r\nrest of the stream").unwrap();
    peer.shutdown(Shutdown::Write).unwrap();

    let server = Server::new(accepted);

    let mut first = [0u8; 2];
    (&server).read_exact(&mut first).unwrap();
    server.replay().unwrap();

    let mut second = [0u8; 6];
    (&server).read_exact(&mut second).unwrap();
    assert_eq!(&second[..2], &first);
    assert_eq!(&second, b"PING\r\n");

    server.pipe().unwrap();
    let mut rest = String::new();
    (&server).read_to_string(&mut rest).unwrap();
    assert_eq!(rest, "rest of the stream");
}

#[test]
fn test_reply_is_sent_on_pipe() {
    let (mut peer, accepted) = tcp_pair();
    peer.write_all(b"HELLO").unwrap();

    let server = Server::new(accepted);
    let mut hello = [0u8; 5];
    (&server).read_exact(&mut hello).unwrap();
    (&server).write_all(b"WELCOME").unwrap();

    // Nothing reaches the peer before the pipe.
    peer.set_read_timeout(Some(Duration::from_millis(50))).unwrap();
    let mut probe = [0u8; 1];
    assert!(peer.read(&mut probe).is_err());

    server.pipe().unwrap();
    peer.set_read_timeout(None).unwrap();
    let mut reply = [0u8; 7];
    peer.read_exact(&mut reply).unwrap();
    assert_eq!(&reply, b"WELCOME");
}

#[test]
fn test_oversized_sniff_closes_connection() {
    let (mut peer, accepted) = tcp_pair();
    peer.write_all(&[b'x'; 64]).unwrap();

    let server = Server::with_max_buffer(accepted, 16);
    let mut buf = [0u8; 32];
    let err = (&server).read(&mut buf).unwrap_err();
    assert!(matches!(
        TeaseError::from_io(&err),
        Some(TeaseError::BufferExceeded { limit: 16 })
    ));
    assert_eq!(server.mode(), Mode::Faulted(conn_tease::conn::Fault::BufferExceeded));

    // The peer sees the connection go away.
    let mut rest = Vec::new();
    let _ = peer.read_to_end(&mut rest);
    assert!(rest.is_empty());
}

#[test]
fn test_piped_server_is_full_duplex() {
    let (mut peer, accepted) = tcp_pair();
    let mut peer_reader = peer.try_clone().unwrap();
    let server = Server::new(accepted);
    server.pipe().unwrap();

    thread::scope(|scope| {
        let shared = &server;
        let outbound = scope.spawn(move || {
            let mut writer = shared;
            for i in 0..100 {
                writer.write_all(format!("{:03}", i).as_bytes()).unwrap();
            }
        });
        let inbound = scope.spawn(move || {
            let mut reader = shared;
            let mut got = String::new();
            reader.read_to_string(&mut got).unwrap();
            got
        });

        peer.write_all(b"client data").unwrap();
        peer.shutdown(Shutdown::Write).unwrap();

        let mut from_server = vec![0u8; 300];
        peer_reader.read_exact(&mut from_server).unwrap();
        assert!(from_server.starts_with(b"000001002"));
        assert!(from_server.ends_with(b"099"));

        outbound.join().unwrap();
        assert_eq!(inbound.join().unwrap(), "client data");
    });

    Conn::close(&server).unwrap();
}

#[test]
fn test_close_before_pipe_keeps_socket() {
    let (mut peer, accepted) = tcp_pair();
    peer.write_all(b"abc").unwrap();

    let server = Server::new(accepted);
    Conn::close(&server).unwrap();
    assert!(matches!(server.pipe(), Err(TeaseError::ClosedBeforePipe)));

    server.replay().unwrap();
    server.pipe().unwrap();
    let mut buf = [0u8; 3];
    (&server).read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"abc");

    Conn::close(&server).unwrap();
    let mut rest = Vec::new();
    peer.read_to_end(&mut rest).unwrap();
    assert!(rest.is_empty());
}

#[test]
fn test_addresses_pass_through() {
    let (peer, accepted) = tcp_pair();
    let server = Server::new(accepted);
    assert_eq!(Conn::peer_addr(&server).unwrap(), peer.local_addr().unwrap());
    assert_eq!(Conn::local_addr(&server).unwrap(), peer.peer_addr().unwrap());

    server.set_read_timeout(Some(Duration::from_millis(20))).unwrap();
    let err = (&server).read(&mut [0u8; 1]).unwrap_err();
    assert!(matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    ));
    // Timeouts are not faults.
    assert_eq!(server.mode(), Mode::Detecting);
}
