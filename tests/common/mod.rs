//! Shared helpers for integration tests

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};

/// A connected loopback pair: (dialed, accepted)
pub fn tcp_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let dialed = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (accepted, _) = listener.accept().unwrap();
    (dialed, accepted)
}

/// A backend that accepts one connection, reads until the client shuts its
/// write side, answers `reply` and closes. Joins to the bytes it received.
pub fn one_shot_backend(reply: &'static [u8]) -> (SocketAddr, JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut received = Vec::new();
        stream.read_to_end(&mut received).unwrap();
        stream.write_all(reply).unwrap();
        received
    });
    (addr, handle)
}

/// A TLS record header followed by the start of a ClientHello
pub const CLIENT_HELLO: [u8; 11] = [
    0x16, 0x03, 0x01, 0x00, 0x31, // record header
    0x01, 0x00, 0x00, 0x2d, 0x03, 0x03, // handshake header
];
