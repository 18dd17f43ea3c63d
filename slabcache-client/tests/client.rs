use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use slabcache_client::{ClientConfig, KVClient, StoreResponse};

/// Spins up a bare-bones ASCII-protocol stub server on a background
/// thread: reads one request line (plus payload, for storage verbs)
/// per expected command and hands it to `handler` to produce a reply.
fn spawn_server(expected_commands: usize, handler: fn(usize, String, Option<Vec<u8>>, &mut TcpStream)) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let mut reader = BufReader::new(stream.try_clone().expect("clone"));
        for idx in 0..expected_commands {
            let line = read_line(&mut reader);
            let mut tokens = line.split(' ');
            let verb = tokens.next().unwrap_or_default();
            let payload = if matches!(verb, "set" | "add" | "replace" | "append" | "prepend" | "cas") {
                let bytes: usize = tokens.clone().nth(3).and_then(|t| t.parse().ok()).unwrap_or(0);
                let mut data = vec![0u8; bytes];
                reader.read_exact(&mut data).expect("read payload");
                let mut crlf = [0u8; 2];
                reader.read_exact(&mut crlf).expect("read crlf");
                Some(data)
            } else {
                None
            };
            handler(idx, line, payload, &mut stream);
        }
    });

    addr
}

fn read_line(reader: &mut BufReader<TcpStream>) -> String {
    let mut buf = Vec::new();
    reader.read_until(b'\n', &mut buf).expect("read line");
    assert!(buf.ends_with(b"\r\n"));
    buf.truncate(buf.len() - 2);
    String::from_utf8(buf).expect("utf8 line")
}

fn write_line(stream: &mut TcpStream, text: &str) {
    stream.write_all(text.as_bytes()).unwrap();
    stream.write_all(b"\r\n").unwrap();
    stream.flush().unwrap();
}

fn client_for(addr: String) -> KVClient {
    KVClient::with_config(ClientConfig { addr, ..ClientConfig::default() }).expect("client")
}

#[test]
fn set_then_get_round_trip() {
    let addr = spawn_server(2, |idx, line, payload, stream| {
        if idx == 0 {
            assert_eq!(line, "set key 0 0 5");
            assert_eq!(payload.unwrap(), b"value");
            write_line(stream, "STORED");
        } else {
            assert_eq!(line, "get key");
            write_line(stream, "VALUE key 0 5");
            stream.write_all(b"value\r\n").unwrap();
            write_line(stream, "END");
        }
    });

    let mut client = client_for(addr);
    assert_eq!(client.set(b"key", b"value", 0, 0).unwrap(), StoreResponse::Stored);
    let got = client.get(b"key").unwrap().unwrap();
    assert_eq!(got.value, b"value");
    assert_eq!(got.flags, 0);
}

#[test]
fn get_miss_returns_none() {
    let addr = spawn_server(1, |_, line, _, stream| {
        assert_eq!(line, "get missing");
        write_line(stream, "END");
    });

    let mut client = client_for(addr);
    assert!(client.get(b"missing").unwrap().is_none());
}

#[test]
fn delete_and_touch() {
    let addr = spawn_server(2, |idx, line, _, stream| {
        if idx == 0 {
            assert_eq!(line, "delete key");
            write_line(stream, "DELETED");
        } else {
            assert_eq!(line, "touch key 100");
            write_line(stream, "NOT_FOUND");
        }
    });

    let mut client = client_for(addr);
    assert!(client.delete(b"key").unwrap());
    assert!(!client.touch(b"key", 100).unwrap());
}

#[test]
fn incr_reports_new_value() {
    let addr = spawn_server(1, |_, line, _, stream| {
        assert_eq!(line, "incr counter 5");
        write_line(stream, "15");
    });

    let mut client = client_for(addr);
    assert_eq!(client.incr(b"counter", 5).unwrap(), Some(15));
}

#[test]
fn server_error_is_surfaced_as_client_error_variant() {
    let addr = spawn_server(1, |_, _line, _, stream| {
        write_line(stream, "SERVER_ERROR out of memory");
    });

    let mut client = client_for(addr);
    let err = client.set(b"k", b"v", 0, 0).unwrap_err();
    assert!(err.to_string().contains("out of memory"));
}
