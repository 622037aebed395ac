//! CCP sends this message to set the flow's pacing rate in the datapath.

use super::{u64_to_u8s, AsRawMsg, RawMsg, HDR_LENGTH};
use crate::Result;

pub(crate) const SET_RATE: u16 = 5;
const SET_RATE_LEN: u16 = HDR_LENGTH + 8;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Msg {
    pub sid: u32,
    /// bytes per second
    pub rate: u64,
}

impl AsRawMsg for Msg {
    fn get_hdr(&self) -> (u16, u16, u32) {
        (SET_RATE, SET_RATE_LEN, self.sid)
    }

    fn get_bytes(&self, w: &mut Vec<u8>) {
        let mut buf = [0u8; 8];
        u64_to_u8s(&mut buf, self.rate);
        w.extend_from_slice(&buf[..]);
    }

    fn from_raw_msg(msg: RawMsg) -> Result<Self> {
        msg.expect_len(SET_RATE_LEN)?;
        Ok(Msg {
            sid: msg.sid,
            rate: msg.get_u64_at(0)?,
        })
    }
}

#[cfg(test)]
mod tests {
    check_msg!(
        test_set_rate_1,
        super::Msg,
        super::Msg {
            sid: 42,
            rate: 12_500_000_000,
        },
        crate::serialize::Msg::Rt(rt),
        rt
    );
}
