//! Zig-zag variable-length `long` encoding.
//!
//! Every integer in the container framing (map counts, string lengths, block
//! record counts and payload sizes) and in the primitive datum encoding is a
//! zig-zag varint: 7 data bits per byte, high bit set on all but the last byte.
//! A 64-bit value needs at most 10 bytes.
//!
//! Two decoders are provided: [`get_long`] over in-memory buffers (`bytes::Buf`)
//! for decoded block payloads, and [`read_long`] over `std::io::Read` for the
//! header and block framing read straight from the input.

use std::io::{self, Read};

use bytes::{Buf, BufMut};

/// Longest valid encoding of a 64-bit varint.
pub const MAX_VARINT_LEN: usize = 10;

#[inline]
fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[inline]
fn unzigzag(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Append `value` as a zig-zag varint.
pub fn put_long(buf: &mut impl BufMut, value: i64) {
    let mut n = zigzag(value);
    loop {
        let byte = (n & 0x7F) as u8;
        n >>= 7;
        if n == 0 {
            buf.put_u8(byte);
            break;
        }
        buf.put_u8(byte | 0x80);
    }
}

/// Encoded length of `value` in bytes.
pub fn long_len(value: i64) -> usize {
    let mut n = zigzag(value);
    let mut len = 1;
    while n >= 0x80 {
        n >>= 7;
        len += 1;
    }
    len
}

fn overlong() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "varint longer than 10 bytes")
}

/// Decode a zig-zag varint from an in-memory buffer.
///
/// Fails with `UnexpectedEof` if the buffer ends mid-varint and `InvalidData`
/// if the encoding exceeds [`MAX_VARINT_LEN`].
pub fn get_long(buf: &mut impl Buf) -> io::Result<i64> {
    let mut value: u64 = 0;
    for i in 0..MAX_VARINT_LEN {
        if !buf.has_remaining() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "buffer ended inside a varint",
            ));
        }
        let byte = buf.get_u8();
        value |= ((byte & 0x7F) as u64) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(unzigzag(value));
        }
    }
    Err(overlong())
}

/// Decode a zig-zag varint from a byte stream.
pub fn read_long<R: Read + ?Sized>(reader: &mut R) -> io::Result<i64> {
    let mut value: u64 = 0;
    let mut byte = [0u8; 1];
    for i in 0..MAX_VARINT_LEN {
        reader.read_exact(&mut byte)?;
        value |= ((byte[0] & 0x7F) as u64) << (7 * i);
        if byte[0] & 0x80 == 0 {
            return Ok(unzigzag(value));
        }
    }
    Err(overlong())
}

/// Append a length-prefixed byte string.
pub fn put_bytes(buf: &mut impl BufMut, data: &[u8]) {
    put_long(buf, data.len() as i64);
    buf.put_slice(data);
}

fn checked_len(len: i64, available: Option<usize>) -> io::Result<usize> {
    if len < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("negative length {len}"),
        ));
    }
    let len = len as usize;
    if let Some(available) = available {
        if len > available {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("length {len} exceeds {available} remaining bytes"),
            ));
        }
    }
    Ok(len)
}

/// Decode a length-prefixed byte string from an in-memory buffer, returning a
/// slice borrowed from it.
pub fn get_bytes<'a>(buf: &mut &'a [u8]) -> io::Result<&'a [u8]> {
    let len = get_long(buf)?;
    let len = checked_len(len, Some(buf.len()))?;
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head)
}

/// Decode a length-prefixed byte string from a byte stream.
pub fn read_bytes<R: Read + ?Sized>(reader: &mut R) -> io::Result<Vec<u8>> {
    let len = checked_len(read_long(reader)?, None)?;
    let mut data = Vec::new();
    reader.take(len as u64).read_to_end(&mut data)?;
    if data.len() != len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("expected {len} bytes, got {}", data.len()),
        ));
    }
    Ok(data)
}
