//! Exercises the blocking, single-PDU read path used while negotiating a
//! connection, over a real loopback TCP socket.

use std::io::Write as _;
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use rdp_transport::{Transport, TransportErrorKind, TransportSettings};

fn accept_one(listener: &TcpListener) -> TcpStream {
    let (stream, _) = listener.accept().expect("accept");
    stream
}

#[test]
fn read_one_assembles_a_whole_tpkt_pdu_delivered_in_one_write() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();

    let pdu = [0x03, 0x00, 0x00, 0x07, 0xAA, 0xBB, 0xCC];
    let peer = thread::spawn(move || {
        let mut stream = accept_one(&listener);
        stream.write_all(&pdu).expect("write");
        thread::sleep(Duration::from_millis(200));
    });

    let settings = TransportSettings::default();
    let mut transport = Transport::connect_tcp(&settings, "127.0.0.1", port).expect("connect");

    let received = transport.read_one().expect("read_one");
    assert_eq!(&received[..], &pdu[..]);

    peer.join().unwrap();
}

#[test]
fn read_one_assembles_a_tpkt_pdu_delivered_byte_by_byte() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();

    let pdu = [0x03, 0x00, 0x00, 0x06, 0x01, 0x02];
    let peer = thread::spawn(move || {
        let mut stream = accept_one(&listener);
        for byte in pdu {
            stream.write_all(&[byte]).expect("write one byte");
            thread::sleep(Duration::from_millis(10));
        }
        thread::sleep(Duration::from_millis(100));
    });

    let settings = TransportSettings::default();
    let mut transport = Transport::connect_tcp(&settings, "127.0.0.1", port).expect("connect");

    let received = transport.read_one().expect("read_one");
    assert_eq!(&received[..], &pdu[..]);

    peer.join().unwrap();
}

#[test]
fn read_one_assembles_a_ts_request_with_extended_length_encoding() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();

    // 30 81 05 <5 bytes of payload>: one length octet, total length 5 + 3 = 8.
    let pdu = [0x30, 0x81, 0x05, 0x10, 0x11, 0x12, 0x13, 0x14];
    let peer = thread::spawn(move || {
        let mut stream = accept_one(&listener);
        stream.write_all(&pdu).expect("write");
        thread::sleep(Duration::from_millis(200));
    });

    let settings = TransportSettings::default();
    let mut transport = Transport::connect_tcp(&settings, "127.0.0.1", port).expect("connect");

    let received = transport.read_one().expect("read_one");
    assert_eq!(&received[..], &pdu[..]);

    peer.join().unwrap();
}

#[test]
fn get_read_fds_reports_the_active_sockets_descriptor() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();

    let peer = thread::spawn(move || {
        let stream = accept_one(&listener);
        thread::sleep(Duration::from_millis(100));
        drop(stream);
    });

    let settings = TransportSettings::default();
    let transport = Transport::connect_tcp(&settings, "127.0.0.1", port).expect("connect");

    assert!(transport.get_read_fds().is_some());

    peer.join().unwrap();
}

#[test]
fn read_one_reports_a_protocol_error_on_unsupported_length_encoding() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();

    // 30 83: three length octets, which find_size refuses to support.
    let garbage = [0x30, 0x83, 0x01, 0x00, 0x00];
    let peer = thread::spawn(move || {
        let mut stream = accept_one(&listener);
        stream.write_all(&garbage).expect("write");
        thread::sleep(Duration::from_millis(200));
    });

    let settings = TransportSettings::default();
    let mut transport = Transport::connect_tcp(&settings, "127.0.0.1", port).expect("connect");

    let error = transport.read_one().expect_err("expected a protocol error");
    assert!(matches!(error.kind(), TransportErrorKind::Protocol(_)));

    peer.join().unwrap();
}
