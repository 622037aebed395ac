//! The datapath sends a Drop message when it detects a congestion event between reports.

use super::{u32_to_u8s, AsRawMsg, RawMsg, HDR_LENGTH};
use crate::{Error, Result};

pub(crate) const DROP: u16 = 2;
const DROP_LEN: u16 = HDR_LENGTH + 2 * 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropEvent {
    Timeout,
    DupAck,
    Ecn,
}

impl DropEvent {
    fn code(self) -> u32 {
        match self {
            DropEvent::Timeout => 1,
            DropEvent::DupAck => 2,
            DropEvent::Ecn => 3,
        }
    }

    fn from_code(code: u32) -> Result<Self> {
        match code {
            1 => Ok(DropEvent::Timeout),
            2 => Ok(DropEvent::DupAck),
            3 => Ok(DropEvent::Ecn),
            x => Err(Error::MalformedFrame(format!("unknown drop event {}", x))),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Msg {
    pub sid: u32,
    pub event: DropEvent,
    pub lost: u32,
}

impl AsRawMsg for Msg {
    fn get_hdr(&self) -> (u16, u16, u32) {
        (DROP, DROP_LEN, self.sid)
    }

    fn get_u32s(&self, w: &mut Vec<u8>) {
        let mut buf = [0u8; 4];
        u32_to_u8s(&mut buf, self.event.code());
        w.extend_from_slice(&buf[..]);
        u32_to_u8s(&mut buf, self.lost);
        w.extend_from_slice(&buf[..]);
    }

    fn from_raw_msg(msg: RawMsg) -> Result<Self> {
        msg.expect_len(DROP_LEN)?;
        Ok(Msg {
            sid: msg.sid,
            event: DropEvent::from_code(msg.get_u32(0)?)?,
            lost: msg.get_u32(1)?,
        })
    }
}
