//! ASCII wire protocol (spec §6.1), reproducing the memcached text
//! protocol: CRLF-terminated, space-separated command lines, with a
//! raw `<bytes>\r\n` payload trailing storage commands.
//!
//! The parser never talks to the cache: it turns buffered bytes into a
//! [`Command`] value or a [`ProtocolError`], leaving the engine call
//! and reply serialization to the caller. A [`ProtocolError::Incomplete`]
//! means "not enough bytes yet" — the caller must leave the buffer
//! untouched and wait for more to arrive from the socket.

use bytes::{Buf, BytesMut};

use slabcache_common::error::ProtocolError;

/// One parsed request line (plus payload, for storage commands).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get { keys: Vec<Vec<u8>>, with_cas: bool },
    Store { kind: StoreKind, key: Vec<u8>, flags: u16, exptime: u32, value: Vec<u8>, cas_unique: Option<u64>, noreply: bool },
    Delete { key: Vec<u8>, noreply: bool },
    Arithmetic { increment: bool, key: Vec<u8>, delta: u64, noreply: bool },
    Touch { key: Vec<u8>, exptime: u32, noreply: bool },
    FlushAll { noreply: bool },
    Stats,
    Version,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Set,
    Add,
    Replace,
    Append,
    Prepend,
    Cas,
}

const MAX_KEY_LEN: usize = 250;

/// Finds and consumes one command (and its payload, if any) from
/// `buf`. Returns `Ok(None)` only via [`ProtocolError::Incomplete`] —
/// modeled as an error rather than an `Option` because the caller
/// needs to distinguish "come back later" from every other failure,
/// which does produce a wire reply.
pub fn parse(buf: &mut BytesMut) -> Result<Command, ProtocolError> {
    let header_end = find_crlf(buf).ok_or(ProtocolError::Incomplete)?;
    let header = &buf[..header_end];
    let mut tokens = header.split(|&b| b == b' ').filter(|t| !t.is_empty());

    let cmd_name = tokens.next().ok_or(ProtocolError::Broken)?.to_vec();
    let args: Vec<&[u8]> = tokens.collect();

    let command = match cmd_name.as_slice() {
        b"get" => parse_retrieval(&args, false)?,
        b"gets" => parse_retrieval(&args, true)?,
        b"set" | b"add" | b"replace" | b"append" | b"prepend" | b"cas" => {
            let kind = match cmd_name.as_slice() {
                b"set" => StoreKind::Set,
                b"add" => StoreKind::Add,
                b"replace" => StoreKind::Replace,
                b"append" => StoreKind::Append,
                b"prepend" => StoreKind::Prepend,
                b"cas" => StoreKind::Cas,
                _ => unreachable!(),
            };
            // Extract everything into owned values now, while `args`
            // still (immutably) borrows `buf` — `finish_storage` needs
            // `buf` mutably to slice out the payload, so no borrow of
            // `buf` may survive past this point.
            let header = parse_storage_header(kind, &args)?;
            return finish_storage(buf, header_end, kind, header);
        }
        b"delete" => parse_delete(&args)?,
        b"incr" => parse_arithmetic(&args, true)?,
        b"decr" => parse_arithmetic(&args, false)?,
        b"touch" => parse_touch(&args)?,
        b"flush_all" => parse_flush_all(&args)?,
        b"stats" => Command::Stats,
        b"version" => Command::Version,
        b"quit" => Command::Quit,
        _ => return Err(ProtocolError::Broken),
    };

    buf.advance(header_end + 2);
    Ok(command)
}

fn parse_retrieval(args: &[&[u8]], with_cas: bool) -> Result<Command, ProtocolError> {
    if args.is_empty() {
        return Err(ProtocolError::ClientError("wrong number of arguments".into()));
    }
    let mut keys = Vec::with_capacity(args.len());
    for key in args {
        validate_key(key)?;
        keys.push(key.to_vec());
    }
    Ok(Command::Get { keys, with_cas })
}

/// Everything a storage command's header line carries, fully owned so
/// it can outlive the slice of `buf` it was parsed from.
struct StorageHeader {
    key: Vec<u8>,
    flags: u16,
    exptime: u32,
    bytes: usize,
    cas_unique: Option<u64>,
    noreply: bool,
}

/// Parses the header tokens of a storage command. Takes no borrow of
/// `buf` itself — only of the already-collected `args`, which is what
/// lets the caller drop that borrow before mutating `buf`.
fn parse_storage_header(kind: StoreKind, args: &[&[u8]]) -> Result<StorageHeader, ProtocolError> {
    let min_args = if kind == StoreKind::Cas { 5 } else { 4 };
    if args.len() < min_args {
        return Err(ProtocolError::ClientError("wrong number of arguments".into()));
    }
    let key = args[0];
    validate_key(key)?;
    let flags = parse_u16(args[1])?;
    let exptime = parse_u32(args[2])?;
    let bytes = parse_u32(args[3])? as usize;

    let mut next = 4;
    let cas_unique = if kind == StoreKind::Cas {
        let v = parse_u64(args[4])?;
        next = 5;
        Some(v)
    } else {
        None
    };
    let noreply = parse_noreply(&args[next..])?;

    Ok(StorageHeader { key: key.to_vec(), flags, exptime, bytes, cas_unique, noreply })
}

/// Storage commands carry a payload after the header, so this is the
/// one parse path that needs to inspect bytes past `header_end` and
/// can report `Incomplete` a second time once the header itself is
/// known to be complete. Takes an already-parsed, owned `header` so it
/// can hold `buf` mutably without fighting a borrow rooted in the
/// header line.
fn finish_storage(buf: &mut BytesMut, header_end: usize, kind: StoreKind, header: StorageHeader) -> Result<Command, ProtocolError> {
    let payload_start = header_end + 2;
    let payload_end = payload_start + header.bytes;
    if buf.len() < payload_end + 2 {
        return Err(ProtocolError::Incomplete);
    }
    if &buf[payload_end..payload_end + 2] != b"\r\n" {
        return Err(ProtocolError::ClientError("bad data chunk".into()));
    }
    let value = buf[payload_start..payload_end].to_vec();

    let command = Command::Store {
        kind,
        key: header.key,
        flags: header.flags,
        exptime: header.exptime,
        value,
        cas_unique: header.cas_unique,
        noreply: header.noreply,
    };
    buf.advance(payload_end + 2);
    Ok(command)
}

fn parse_delete(args: &[&[u8]]) -> Result<Command, ProtocolError> {
    if args.is_empty() {
        return Err(ProtocolError::ClientError("wrong number of arguments".into()));
    }
    validate_key(args[0])?;
    let noreply = parse_noreply(&args[1..])?;
    Ok(Command::Delete { key: args[0].to_vec(), noreply })
}

fn parse_arithmetic(args: &[&[u8]], increment: bool) -> Result<Command, ProtocolError> {
    if args.len() < 2 {
        return Err(ProtocolError::ClientError("wrong number of arguments".into()));
    }
    validate_key(args[0])?;
    let delta = parse_u64(args[1])?;
    let noreply = parse_noreply(&args[2..])?;
    Ok(Command::Arithmetic { increment, key: args[0].to_vec(), delta, noreply })
}

fn parse_touch(args: &[&[u8]]) -> Result<Command, ProtocolError> {
    if args.len() < 2 {
        return Err(ProtocolError::ClientError("wrong number of arguments".into()));
    }
    validate_key(args[0])?;
    let exptime = parse_u32(args[1])?;
    let noreply = parse_noreply(&args[2..])?;
    Ok(Command::Touch { key: args[0].to_vec(), exptime, noreply })
}

fn parse_flush_all(args: &[&[u8]]) -> Result<Command, ProtocolError> {
    let noreply = parse_noreply(args)?;
    Ok(Command::FlushAll { noreply })
}

fn parse_noreply(rest: &[&[u8]]) -> Result<bool, ProtocolError> {
    match rest {
        [] => Ok(false),
        [b"noreply"] => Ok(true),
        _ => Err(ProtocolError::ClientError("noreply expected".into())),
    }
}

fn validate_key(key: &[u8]) -> Result<(), ProtocolError> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(ProtocolError::ClientError("bad key length".into()));
    }
    if key.iter().any(|&b| b <= b' ' || b == 0x7f) {
        return Err(ProtocolError::ClientError("key contains control or whitespace byte".into()));
    }
    Ok(())
}

fn parse_u16(token: &[u8]) -> Result<u16, ProtocolError> {
    parse_ascii_u64(token)?.try_into().map_err(|_| ProtocolError::ClientError("invalid flags".into()))
}

fn parse_u32(token: &[u8]) -> Result<u32, ProtocolError> {
    parse_ascii_u64(token)?.try_into().map_err(|_| ProtocolError::ClientError("invalid numeric argument".into()))
}

fn parse_u64(token: &[u8]) -> Result<u64, ProtocolError> {
    parse_ascii_u64(token)
}

fn parse_ascii_u64(token: &[u8]) -> Result<u64, ProtocolError> {
    if token.is_empty() {
        return Err(ProtocolError::ClientError("invalid numeric argument".into()));
    }
    let text = std::str::from_utf8(token).map_err(|_| ProtocolError::ClientError("invalid numeric argument".into()))?;
    text.parse().map_err(|_| ProtocolError::ClientError("invalid numeric argument".into()))
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_get_with_multiple_keys() {
        let mut buf = BytesMut::from(&b"get foo bar\r\n"[..]);
        let cmd = parse(&mut buf).unwrap();
        assert_eq!(cmd, Command::Get { keys: vec![b"foo".to_vec(), b"bar".to_vec()], with_cas: false });
        assert!(buf.is_empty());
    }

    #[test]
    fn incomplete_header_is_reported_and_buffer_untouched() {
        let mut buf = BytesMut::from(&b"get foo"[..]);
        assert_eq!(parse(&mut buf), Err(ProtocolError::Incomplete));
        assert_eq!(&buf[..], b"get foo");
    }

    #[test]
    fn storage_command_waits_for_full_payload() {
        let mut buf = BytesMut::from(&b"set k 0 0 5\r\nab"[..]);
        assert_eq!(parse(&mut buf), Err(ProtocolError::Incomplete));
        buf.extend_from_slice(b"cde\r\n");
        let cmd = parse(&mut buf).unwrap();
        assert_eq!(
            cmd,
            Command::Store {
                kind: StoreKind::Set,
                key: b"k".to_vec(),
                flags: 0,
                exptime: 0,
                value: b"abcde".to_vec(),
                cas_unique: None,
                noreply: false,
            }
        );
    }

    #[test]
    fn cas_requires_cas_unique_token() {
        let mut buf = BytesMut::from(&b"cas k 0 0 1 42\r\nx\r\n"[..]);
        let cmd = parse(&mut buf).unwrap();
        assert_eq!(
            cmd,
            Command::Store {
                kind: StoreKind::Cas,
                key: b"k".to_vec(),
                flags: 0,
                exptime: 0,
                value: b"x".to_vec(),
                cas_unique: Some(42),
                noreply: false,
            }
        );
    }

    #[test]
    fn noreply_is_recognized_on_delete() {
        let mut buf = BytesMut::from(&b"delete k noreply\r\n"[..]);
        let cmd = parse(&mut buf).unwrap();
        assert_eq!(cmd, Command::Delete { key: b"k".to_vec(), noreply: true });
    }

    #[test]
    fn unknown_command_is_broken() {
        let mut buf = BytesMut::from(&b"bogus\r\n"[..]);
        assert_eq!(parse(&mut buf), Err(ProtocolError::Broken));
    }

    #[test]
    fn missing_data_chunk_crlf_is_client_error() {
        let mut buf = BytesMut::from(&b"set k 0 0 3\r\nabcXX"[..]);
        assert!(matches!(parse(&mut buf), Err(ProtocolError::ClientError(_))));
    }

    #[test]
    fn oversized_key_is_rejected() {
        let long_key = vec![b'k'; 300];
        let mut buf = BytesMut::from(format!("delete {}\r\n", String::from_utf8(long_key).unwrap()).as_bytes());
        assert!(matches!(parse(&mut buf), Err(ProtocolError::ClientError(_))));
    }

    #[test]
    fn quit_and_version_and_stats_take_no_args() {
        let mut buf = BytesMut::from(&b"quit\r\n"[..]);
        assert_eq!(parse(&mut buf).unwrap(), Command::Quit);
        let mut buf = BytesMut::from(&b"version\r\n"[..]);
        assert_eq!(parse(&mut buf).unwrap(), Command::Version);
        let mut buf = BytesMut::from(&b"stats\r\n"[..]);
        assert_eq!(parse(&mut buf).unwrap(), Command::Stats);
    }
}
