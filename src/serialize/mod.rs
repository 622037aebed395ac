//! Serialization library for communicating with the datapath.
//!
//! Every message is one frame: a fixed 8-byte header followed by a fixed-layout body.
//! All integers are little-endian.
//!
//! ```text
//! -------------------------------------------
//! | Msg Type | Len (B) | Socket ID | Body ... |
//! | (2 B)    | (2 B)   | (4 B)     |          |
//! -------------------------------------------
//! ```
//!
//! `Len` counts the whole frame, header included, so a reader can find the next
//! frame without understanding the body.

use crate::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};

#[cfg(test)]
#[macro_use]
mod test;

pub mod create;
pub mod cwnd;
pub mod drop;
pub mod measure;
pub mod other;
pub mod rate;
pub mod teardown;

pub const HDR_LENGTH: u16 = 8;

/// Largest frame the backend receive buffer will hold.
pub const MAX_MSG_LEN: usize = 1024;

pub fn u16_to_u8s(buf: &mut [u8], num: u16) {
    LittleEndian::write_u16(buf, num);
}

pub fn u32_to_u8s(buf: &mut [u8], num: u32) {
    LittleEndian::write_u32(buf, num);
}

pub fn u64_to_u8s(buf: &mut [u8], num: u64) {
    LittleEndian::write_u64(buf, num);
}

pub fn u16_from_u8s(buf: &[u8]) -> u16 {
    LittleEndian::read_u16(buf)
}

pub fn u32_from_u8s(buf: &[u8]) -> u32 {
    LittleEndian::read_u32(buf)
}

pub fn u64_from_u8s(buf: &[u8]) -> u64 {
    LittleEndian::read_u64(buf)
}

fn serialize_header(w: &mut Vec<u8>, typ: u16, len: u16, sid: u32) {
    let mut buf = [0u8; 4];
    u16_to_u8s(&mut buf[..2], typ);
    w.extend_from_slice(&buf[..2]);
    u16_to_u8s(&mut buf[..2], len);
    w.extend_from_slice(&buf[..2]);
    u32_to_u8s(&mut buf, sid);
    w.extend_from_slice(&buf);
}

fn deserialize_header(buf: &[u8]) -> Result<(u16, u16, u32)> {
    if buf.len() < HDR_LENGTH as usize {
        return Err(Error::MalformedFrame(format!(
            "header needs {} bytes, got {}",
            HDR_LENGTH,
            buf.len()
        )));
    }

    Ok((
        u16_from_u8s(&buf[0..2]),
        u16_from_u8s(&buf[2..4]),
        u32_from_u8s(&buf[4..8]),
    ))
}

/// A frame whose header has been parsed but whose body has not.
#[derive(Clone, Copy, Debug)]
pub struct RawMsg<'a> {
    pub typ: u16,
    pub len: u16,
    pub sid: u32,
    bytes: &'a [u8],
}

impl<'a> RawMsg<'a> {
    /// The frame body, header excluded.
    pub fn get_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Fail unless the frame is exactly `len` bytes long.
    pub fn expect_len(&self, len: u16) -> Result<()> {
        if self.len != len {
            return Err(Error::MalformedFrame(format!(
                "message type {} must be {} bytes, got {}",
                self.typ, len, self.len
            )));
        }

        Ok(())
    }

    /// Read the `idx`th u32 of the body.
    pub fn get_u32(&self, idx: usize) -> Result<u32> {
        let start = idx * 4;
        self.bytes
            .get(start..start + 4)
            .map(u32_from_u8s)
            .ok_or_else(|| Error::MalformedFrame(format!("no u32 at body offset {}", start)))
    }

    /// Read a u64 starting at byte `offset` of the body.
    pub fn get_u64_at(&self, offset: usize) -> Result<u64> {
        self.bytes
            .get(offset..offset + 8)
            .map(u64_from_u8s)
            .ok_or_else(|| Error::MalformedFrame(format!("no u64 at body offset {}", offset)))
    }
}

/// Message kinds implement this to be written to and read from frames.
pub trait AsRawMsg {
    fn get_hdr(&self) -> (u16, u16, u32);
    fn get_u32s(&self, _w: &mut Vec<u8>) {}
    fn get_bytes(&self, _w: &mut Vec<u8>) {}

    fn from_raw_msg(msg: RawMsg) -> Result<Self>
    where
        Self: std::marker::Sized;
}

/// Encode a message into one frame. Encoding never fails.
pub fn serialize<T: AsRawMsg>(m: &T) -> Vec<u8> {
    let (typ, len, sid) = m.get_hdr();
    let mut msg = Vec::with_capacity(len as usize);
    serialize_header(&mut msg, typ, len, sid);
    m.get_u32s(&mut msg);
    m.get_bytes(&mut msg);
    msg
}

/// The set of messages which travel over the IPC channel.
#[derive(Clone, Debug, PartialEq)]
pub enum Msg {
    Cr(create::Msg),
    Ms(measure::Msg),
    Dr(drop::Msg),
    Td(teardown::Msg),
    Cw(cwnd::Msg),
    Rt(rate::Msg),
    Other(other::Msg),
}

impl Msg {
    fn from_raw_msg(m: RawMsg) -> Result<Msg> {
        match m.typ {
            create::CREATE => Ok(Msg::Cr(create::Msg::from_raw_msg(m)?)),
            measure::MEASURE => Ok(Msg::Ms(measure::Msg::from_raw_msg(m)?)),
            drop::DROP => Ok(Msg::Dr(drop::Msg::from_raw_msg(m)?)),
            teardown::TEARDOWN => Ok(Msg::Td(teardown::Msg::from_raw_msg(m)?)),
            cwnd::SET_WINDOW => Ok(Msg::Cw(cwnd::Msg::from_raw_msg(m)?)),
            rate::SET_RATE => Ok(Msg::Rt(rate::Msg::from_raw_msg(m)?)),
            _ => Ok(Msg::Other(other::Msg::from_raw_msg(m)?)),
        }
    }

    /// Parse the frame at the start of `buf`.
    /// Returns the message and the number of bytes the frame occupied.
    pub fn from_buf(buf: &[u8]) -> Result<(Msg, usize)> {
        let (typ, len, sid) = deserialize_header(buf)?;
        let frame_len = len as usize;
        if frame_len < HDR_LENGTH as usize {
            return Err(Error::MalformedFrame(format!(
                "length field {} shorter than header",
                len
            )));
        }

        if frame_len > buf.len() {
            return Err(Error::MalformedFrame(format!(
                "truncated frame: length field {}, {} bytes available",
                len,
                buf.len()
            )));
        }

        let raw = RawMsg {
            typ,
            len,
            sid,
            bytes: &buf[HDR_LENGTH as usize..frame_len],
        };

        Ok((Msg::from_raw_msg(raw)?, frame_len))
    }

    /// Encode this message into one frame.
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Msg::Cr(m) => serialize(m),
            Msg::Ms(m) => serialize(m),
            Msg::Dr(m) => serialize(m),
            Msg::Td(m) => serialize(m),
            Msg::Cw(m) => serialize(m),
            Msg::Rt(m) => serialize(m),
            Msg::Other(m) => serialize(m),
        }
    }

    /// The flow this message is about.
    pub fn sid(&self) -> u32 {
        match self {
            Msg::Cr(m) => m.sid,
            Msg::Ms(m) => m.sid,
            Msg::Dr(m) => m.sid,
            Msg::Td(m) => m.sid,
            Msg::Cw(m) => m.sid,
            Msg::Rt(m) => m.sid,
            Msg::Other(m) => m.sid,
        }
    }
}
