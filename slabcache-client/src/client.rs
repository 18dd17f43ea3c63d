//! Blocking client API: one TCP connection, one in-flight request at a
//! time. Mirrors the shape of a pooled facade (`ClientConfig` in,
//! typed results out) without the pool, since nothing here serves
//! concurrent callers.

use std::fmt;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug)]
pub enum ClientError {
    Io(std::io::Error),
    Protocol(String),
    Server { message: String },
    ClientError { message: String },
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Io(err) => write!(f, "io error: {err}"),
            ClientError::Protocol(msg) => write!(f, "protocol error: {msg}"),
            ClientError::Server { message } => write!(f, "server error: {message}"),
            ClientError::ClientError { message } => write!(f, "client error: {message}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Io(err)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub addr: String,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            addr: "127.0.0.1:11211".to_string(),
            read_timeout: Some(Duration::from_secs(5)),
            write_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// Outcome of a storage command (`set`/`add`/`replace`/`append`/`prepend`/`cas`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreResponse {
    Stored,
    NotStored,
    Exists,
    NotFound,
}

/// A single `VALUE` line's payload, as returned by `get`/`gets`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetResponse {
    pub flags: u16,
    pub value: Vec<u8>,
    pub cas_unique: Option<u64>,
}

pub struct KVClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl KVClient {
    pub fn connect(addr: impl ToSocketAddrs) -> ClientResult<Self> {
        Self::with_config(ClientConfig {
            addr: String::new(),
            ..ClientConfig::default()
        }
        .with_addr(addr)?)
    }

    pub fn with_config(config: ClientConfig) -> ClientResult<Self> {
        let stream = TcpStream::connect(&config.addr)?;
        stream.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;
        let writer = stream.try_clone()?;
        Ok(KVClient { reader: BufReader::new(stream), writer })
    }

    pub fn set(&mut self, key: &[u8], value: &[u8], flags: u16, exptime: u32) -> ClientResult<StoreResponse> {
        self.store_command("set", key, value, flags, exptime, None)
    }

    pub fn add(&mut self, key: &[u8], value: &[u8], flags: u16, exptime: u32) -> ClientResult<StoreResponse> {
        self.store_command("add", key, value, flags, exptime, None)
    }

    pub fn replace(&mut self, key: &[u8], value: &[u8], flags: u16, exptime: u32) -> ClientResult<StoreResponse> {
        self.store_command("replace", key, value, flags, exptime, None)
    }

    pub fn append(&mut self, key: &[u8], value: &[u8]) -> ClientResult<StoreResponse> {
        self.store_command("append", key, value, 0, 0, None)
    }

    pub fn prepend(&mut self, key: &[u8], value: &[u8]) -> ClientResult<StoreResponse> {
        self.store_command("prepend", key, value, 0, 0, None)
    }

    pub fn cas(&mut self, key: &[u8], value: &[u8], flags: u16, exptime: u32, cas_unique: u64) -> ClientResult<StoreResponse> {
        self.store_command("cas", key, value, flags, exptime, Some(cas_unique))
    }

    fn store_command(&mut self, verb: &str, key: &[u8], value: &[u8], flags: u16, exptime: u32, cas_unique: Option<u64>) -> ClientResult<StoreResponse> {
        let mut line = format!("{verb} {} {flags} {exptime} {}", String::from_utf8_lossy(key), value.len());
        if let Some(cas) = cas_unique {
            line.push_str(&format!(" {cas}"));
        }
        line.push_str("\r\n");
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(value)?;
        self.writer.write_all(b"\r\n")?;
        self.writer.flush()?;

        match self.read_line()?.as_str() {
            "STORED" => Ok(StoreResponse::Stored),
            "NOT_STORED" => Ok(StoreResponse::NotStored),
            "EXISTS" => Ok(StoreResponse::Exists),
            "NOT_FOUND" => Ok(StoreResponse::NotFound),
            other => Err(self.classify_error(other)),
        }
    }

    pub fn get(&mut self, key: &[u8]) -> ClientResult<Option<GetResponse>> {
        let mut results = self.get_many(std::slice::from_ref(&key.to_vec()), false)?;
        Ok(results.pop())
    }

    pub fn gets(&mut self, key: &[u8]) -> ClientResult<Option<GetResponse>> {
        let mut results = self.get_many(std::slice::from_ref(&key.to_vec()), true)?;
        Ok(results.pop())
    }

    fn get_many(&mut self, keys: &[Vec<u8>], with_cas: bool) -> ClientResult<Vec<GetResponse>> {
        let verb = if with_cas { "gets" } else { "get" };
        let joined = keys.iter().map(|k| String::from_utf8_lossy(k).into_owned()).collect::<Vec<_>>().join(" ");
        self.writer.write_all(format!("{verb} {joined}\r\n").as_bytes())?;
        self.writer.flush()?;

        let mut out = Vec::new();
        loop {
            let line = self.read_line()?;
            if line == "END" {
                return Ok(out);
            }
            let mut tokens = line.split(' ');
            if tokens.next() != Some("VALUE") {
                return Err(self.classify_error(&line));
            }
            let _key = tokens.next().ok_or_else(|| ClientError::Protocol("missing key in VALUE line".into()))?;
            let flags: u16 = tokens
                .next()
                .ok_or_else(|| ClientError::Protocol("missing flags in VALUE line".into()))?
                .parse()
                .map_err(|_| ClientError::Protocol("invalid flags in VALUE line".into()))?;
            let len: usize = tokens
                .next()
                .ok_or_else(|| ClientError::Protocol("missing length in VALUE line".into()))?
                .parse()
                .map_err(|_| ClientError::Protocol("invalid length in VALUE line".into()))?;
            let cas_unique = tokens.next().map(|t| t.parse()).transpose().map_err(|_| ClientError::Protocol("invalid cas_unique".into()))?;

            let mut value = vec![0u8; len];
            self.reader.read_exact(&mut value)?;
            let mut crlf = [0u8; 2];
            self.reader.read_exact(&mut crlf)?;
            out.push(GetResponse { flags, value, cas_unique });
        }
    }

    pub fn delete(&mut self, key: &[u8]) -> ClientResult<bool> {
        self.writer.write_all(format!("delete {}\r\n", String::from_utf8_lossy(key)).as_bytes())?;
        self.writer.flush()?;
        match self.read_line()?.as_str() {
            "DELETED" => Ok(true),
            "NOT_FOUND" => Ok(false),
            other => Err(self.classify_error(other)),
        }
    }

    pub fn touch(&mut self, key: &[u8], exptime: u32) -> ClientResult<bool> {
        self.writer.write_all(format!("touch {} {exptime}\r\n", String::from_utf8_lossy(key)).as_bytes())?;
        self.writer.flush()?;
        match self.read_line()?.as_str() {
            "TOUCHED" => Ok(true),
            "NOT_FOUND" => Ok(false),
            other => Err(self.classify_error(other)),
        }
    }

    pub fn incr(&mut self, key: &[u8], delta: u64) -> ClientResult<Option<u64>> {
        self.arithmetic("incr", key, delta)
    }

    pub fn decr(&mut self, key: &[u8], delta: u64) -> ClientResult<Option<u64>> {
        self.arithmetic("decr", key, delta)
    }

    fn arithmetic(&mut self, verb: &str, key: &[u8], delta: u64) -> ClientResult<Option<u64>> {
        self.writer.write_all(format!("{verb} {} {delta}\r\n", String::from_utf8_lossy(key)).as_bytes())?;
        self.writer.flush()?;
        let line = self.read_line()?;
        if line == "NOT_FOUND" {
            return Ok(None);
        }
        line.parse().map(Some).map_err(|_| ClientError::Protocol(format!("expected integer reply, got {line}")))
    }

    pub fn flush_all(&mut self) -> ClientResult<()> {
        self.writer.write_all(b"flush_all\r\n")?;
        self.writer.flush()?;
        match self.read_line()?.as_str() {
            "OK" => Ok(()),
            other => Err(self.classify_error(other)),
        }
    }

    pub fn version(&mut self) -> ClientResult<String> {
        self.writer.write_all(b"version\r\n")?;
        self.writer.flush()?;
        let line = self.read_line()?;
        line.strip_prefix("VERSION ").map(str::to_string).ok_or_else(|| ClientError::Protocol(format!("unexpected version reply: {line}")))
    }

    pub fn stats(&mut self) -> ClientResult<Vec<(String, String)>> {
        self.writer.write_all(b"stats\r\n")?;
        self.writer.flush()?;
        let mut out = Vec::new();
        loop {
            let line = self.read_line()?;
            if line == "END" {
                return Ok(out);
            }
            let mut parts = line.splitn(3, ' ');
            if parts.next() != Some("STAT") {
                return Err(self.classify_error(&line));
            }
            let name = parts.next().ok_or_else(|| ClientError::Protocol("missing stat name".into()))?;
            let value = parts.next().ok_or_else(|| ClientError::Protocol("missing stat value".into()))?;
            out.push((name.to_string(), value.to_string()));
        }
    }

    fn read_line(&mut self) -> ClientResult<String> {
        let mut buf = Vec::new();
        let bytes = self.reader.read_until(b'\n', &mut buf)?;
        if bytes == 0 {
            return Err(ClientError::Io(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "connection closed")));
        }
        if buf.len() < 2 || &buf[buf.len() - 2..] != b"\r\n" {
            return Err(ClientError::Protocol("line not terminated with CRLF".into()));
        }
        buf.truncate(buf.len() - 2);
        String::from_utf8(buf).map_err(|_| ClientError::Protocol("non-UTF8 reply line".into()))
    }

    fn classify_error(&self, line: &str) -> ClientError {
        if let Some(msg) = line.strip_prefix("CLIENT_ERROR ") {
            ClientError::ClientError { message: msg.to_string() }
        } else if let Some(msg) = line.strip_prefix("SERVER_ERROR ") {
            ClientError::Server { message: msg.to_string() }
        } else if line == "ERROR" {
            ClientError::Protocol("unknown command".into())
        } else {
            ClientError::Protocol(format!("unexpected reply: {line}"))
        }
    }
}

impl ClientConfig {
    fn with_addr(mut self, addr: impl ToSocketAddrs) -> ClientResult<Self> {
        let resolved = addr.to_socket_addrs()?.next().ok_or_else(|| ClientError::Protocol("address did not resolve".into()))?;
        self.addr = resolved.to_string();
        Ok(self)
    }
}
