//! A message of a kind this runtime does not understand. Kept whole so it can be
//! logged, counted, or forwarded unchanged.

use super::{AsRawMsg, RawMsg, HDR_LENGTH, MAX_MSG_LEN};
use crate::{Error, Result};

#[derive(Clone, Debug, PartialEq)]
pub struct Msg {
    pub typ: u16,
    pub len: u16,
    pub sid: u32,
    bytes: Vec<u8>,
}

impl Msg {
    /// Fails if the frame would not fit in a receive buffer.
    pub fn new(typ: u16, sid: u32, bytes: Vec<u8>) -> Result<Self> {
        let len = usize::from(HDR_LENGTH) + bytes.len();
        if len > MAX_MSG_LEN {
            return Err(Error::MalformedFrame(format!(
                "message body of {} bytes does not fit in a frame",
                bytes.len()
            )));
        }

        Ok(Msg {
            typ,
            len: len as u16,
            sid,
            bytes,
        })
    }

    pub fn get_raw_bytes(&self) -> &[u8] {
        &self.bytes[..]
    }
}

impl AsRawMsg for Msg {
    fn get_hdr(&self) -> (u16, u16, u32) {
        (self.typ, self.len, self.sid)
    }

    fn get_bytes(&self, w: &mut Vec<u8>) {
        w.extend_from_slice(&self.bytes);
    }

    fn from_raw_msg(msg: RawMsg) -> Result<Self> {
        Ok(Msg {
            typ: msg.typ,
            len: msg.len,
            sid: msg.sid,
            bytes: msg.get_bytes().to_vec(),
        })
    }
}
