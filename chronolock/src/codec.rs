//! The default frame wire format.
//!
//! A frame is self-delimiting, so any number of frames can be concatenated
//! on one stream and the decoder recovers the boundaries on its own:
//!
//! ```text
//! varint round_number
//! varint chain_hash_len || chain_hash
//! U (48 bytes) || V (32 bytes) || W (32 bytes)
//! varint payload_len || payload
//! ```
//!
//! With armor enabled, each binary frame is wrapped in a printable
//! base64 block between BEGIN/END markers.

use crate::errors::{CodecError, Error};
use crate::ibe::G1_SIZE;
use crate::{Decoded, Decoder, Encoder, Frame, Metadata, WrappedDek, CHUNK_SIZE, DEK_SIZE};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::io::{self, Read, Write};

const BEGIN_MARK: &str = "-----BEGIN TIMELOCK CHUNK-----";
const END_MARK: &str = "-----END TIMELOCK CHUNK-----";
const ARMOR_COLUMNS: usize = 64;

const MAX_CHAIN_HASH: usize = 128;
const MAX_PAYLOAD: usize = CHUNK_SIZE + 1024;

/// Encoder and decoder for the binary and armored frame forms.
pub struct FrameCodec;

impl Encoder for FrameCodec {
    fn encode<W: Write>(&self, dst: &mut W, frame: &Frame, armor: bool) -> Result<(), Error> {
        let body = write_frame(frame)?;
        if !armor {
            dst.write_all(&body)?;
            return Ok(());
        }

        writeln!(dst, "{BEGIN_MARK}")?;
        let encoded = BASE64.encode(&body);
        for line in encoded.as_bytes().chunks(ARMOR_COLUMNS) {
            dst.write_all(line)?;
            dst.write_all(b"\n")?;
        }
        writeln!(dst, "{END_MARK}")?;
        Ok(())
    }
}

impl Decoder for FrameCodec {
    fn decode<R: Read>(&self, src: &mut R, armor: bool) -> Result<Decoded, Error> {
        if armor {
            read_armored(src)
        } else {
            read_frame(src)
        }
    }
}

fn write_frame(frame: &Frame) -> Result<Vec<u8>, Error> {
    check_len("U", &frame.dek.u, G1_SIZE)?;
    check_len("V", &frame.dek.v, DEK_SIZE)?;
    check_len("W", &frame.dek.w, DEK_SIZE)?;
    let hash = frame.metadata.chain_hash.as_bytes();
    if hash.len() > MAX_CHAIN_HASH {
        return Err(CodecError::TooLarge {
            field: "chain hash",
            len: hash.len(),
        }
        .into());
    }
    if frame.payload.len() > MAX_PAYLOAD {
        return Err(CodecError::TooLarge {
            field: "payload",
            len: frame.payload.len(),
        }
        .into());
    }

    let mut out = Vec::with_capacity(
        20 + hash.len() + G1_SIZE + 2 * DEK_SIZE + frame.payload.len(),
    );
    let mut buffer = unsigned_varint::encode::u64_buffer();
    out.extend_from_slice(unsigned_varint::encode::u64(
        frame.metadata.round_number,
        &mut buffer,
    ));
    out.extend_from_slice(unsigned_varint::encode::u64(hash.len() as u64, &mut buffer));
    out.extend_from_slice(hash);
    out.extend_from_slice(&frame.dek.u);
    out.extend_from_slice(&frame.dek.v);
    out.extend_from_slice(&frame.dek.w);
    out.extend_from_slice(unsigned_varint::encode::u64(
        frame.payload.len() as u64,
        &mut buffer,
    ));
    out.extend_from_slice(&frame.payload);
    Ok(out)
}

fn check_len(field: &'static str, bytes: &[u8], expected: usize) -> Result<(), CodecError> {
    if bytes.len() != expected {
        return Err(CodecError::InvalidLength {
            field,
            expected,
            got: bytes.len(),
        });
    }
    Ok(())
}

fn read_frame<R: Read>(src: &mut R) -> Result<Decoded, Error> {
    // End of input before the first byte of a frame is a clean end of the
    // stream; anywhere later it is a truncated frame.
    let round_number = match read_varint(src)? {
        None => return Ok(Decoded::End),
        Some(value) => value,
    };

    let hash_len = must_varint(src)? as usize;
    if hash_len > MAX_CHAIN_HASH {
        return Err(CodecError::TooLarge {
            field: "chain hash",
            len: hash_len,
        }
        .into());
    }
    let mut hash = vec![0u8; hash_len];
    read_bytes(src, &mut hash)?;
    let chain_hash = String::from_utf8(hash).map_err(|_| CodecError::InvalidChainHash)?;

    let mut u = vec![0u8; G1_SIZE];
    read_bytes(src, &mut u)?;
    let mut v = vec![0u8; DEK_SIZE];
    read_bytes(src, &mut v)?;
    let mut w = vec![0u8; DEK_SIZE];
    read_bytes(src, &mut w)?;

    let payload_len = must_varint(src)? as usize;
    if payload_len > MAX_PAYLOAD {
        return Err(CodecError::TooLarge {
            field: "payload",
            len: payload_len,
        }
        .into());
    }
    let mut payload = vec![0u8; payload_len];
    read_bytes(src, &mut payload)?;

    Ok(Decoded::Frame(Frame {
        metadata: Metadata {
            round_number,
            chain_hash,
        },
        dek: WrappedDek { u, v, w },
        payload,
    }))
}

fn read_armored<R: Read>(src: &mut R) -> Result<Decoded, Error> {
    let begin = loop {
        match read_line(src)? {
            None => return Ok(Decoded::End),
            Some(line) if line.trim().is_empty() => continue,
            Some(line) => break line,
        }
    };
    if begin.trim() != BEGIN_MARK {
        return Err(CodecError::Armor("missing begin marker").into());
    }

    let mut encoded = String::new();
    loop {
        match read_line(src)? {
            None => return Err(CodecError::UnexpectedEnd.into()),
            Some(line) => {
                let line = line.trim();
                if line == END_MARK {
                    break;
                }
                encoded.push_str(line);
            }
        }
    }

    let body = BASE64
        .decode(encoded.as_bytes())
        .map_err(|_| CodecError::Armor("invalid base64"))?;
    let mut cursor: &[u8] = &body;
    match read_frame(&mut cursor)? {
        Decoded::Frame(frame) if cursor.is_empty() => Ok(Decoded::Frame(frame)),
        Decoded::Frame(_) => Err(CodecError::Armor("trailing bytes in block").into()),
        Decoded::End => Err(CodecError::UnexpectedEnd.into()),
    }
}

// Reads a varint, returning None on end of input before the first byte.
fn read_varint<R: Read>(src: &mut R) -> Result<Option<u64>, Error> {
    let mut buf = [0u8; 10];
    for i in 0..buf.len() {
        let mut byte = [0u8; 1];
        match read_one(src, &mut byte)? {
            0 if i == 0 => return Ok(None),
            0 => return Err(CodecError::UnexpectedEnd.into()),
            _ => {}
        }
        buf[i] = byte[0];
        if byte[0] & 0x80 == 0 {
            let (value, _) = unsigned_varint::decode::u64(&buf[..=i])
                .map_err(|_| CodecError::InvalidVarint)?;
            return Ok(Some(value));
        }
    }
    Err(CodecError::InvalidVarint.into())
}

// A varint that must be present: end of input here means a truncated frame.
fn must_varint<R: Read>(src: &mut R) -> Result<u64, Error> {
    read_varint(src)?.ok_or_else(|| CodecError::UnexpectedEnd.into())
}

fn read_one<R: Read>(src: &mut R, byte: &mut [u8; 1]) -> Result<usize, Error> {
    loop {
        match src.read(byte) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
}

fn read_bytes<R: Read>(src: &mut R, buf: &mut [u8]) -> Result<(), Error> {
    src.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => CodecError::UnexpectedEnd.into(),
        _ => Error::Io(e),
    })
}

// Reads one line without buffering past the newline, so the stream position
// stays exact for the next frame. None on end of input before any byte.
fn read_line<R: Read>(src: &mut R) -> Result<Option<String>, Error> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        if read_one(src, &mut byte)? == 0 {
            if line.is_empty() {
                return Ok(None);
            }
            break;
        }
        if byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
    }
    let mut line = String::from_utf8(line).map_err(|_| CodecError::Armor("line is not UTF-8"))?;
    if line.ends_with('\r') {
        line.pop();
    }
    Ok(Some(line))
}
