//! CCP sends this message to install a new congestion window in the datapath.

use super::{u32_to_u8s, AsRawMsg, RawMsg, HDR_LENGTH};
use crate::Result;

pub(crate) const SET_WINDOW: u16 = 4;
const SET_WINDOW_LEN: u16 = HDR_LENGTH + 4;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Msg {
    pub sid: u32,
    /// bytes
    pub cwnd: u32,
}

impl AsRawMsg for Msg {
    fn get_hdr(&self) -> (u16, u16, u32) {
        (SET_WINDOW, SET_WINDOW_LEN, self.sid)
    }

    fn get_u32s(&self, w: &mut Vec<u8>) {
        let mut buf = [0u8; 4];
        u32_to_u8s(&mut buf, self.cwnd);
        w.extend_from_slice(&buf[..]);
    }

    fn from_raw_msg(msg: RawMsg) -> Result<Self> {
        msg.expect_len(SET_WINDOW_LEN)?;
        Ok(Msg {
            sid: msg.sid,
            cwnd: msg.get_u32(0)?,
        })
    }
}
