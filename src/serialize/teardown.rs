//! Message sent from datapath to CCP when a flow ends.

use super::{AsRawMsg, RawMsg, HDR_LENGTH};
use crate::Result;

pub(crate) const TEARDOWN: u16 = 3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Msg {
    pub sid: u32,
}

impl AsRawMsg for Msg {
    fn get_hdr(&self) -> (u16, u16, u32) {
        (TEARDOWN, HDR_LENGTH, self.sid)
    }

    fn from_raw_msg(msg: RawMsg) -> Result<Self> {
        msg.expect_len(HDR_LENGTH)?;
        Ok(Msg { sid: msg.sid })
    }
}

#[cfg(test)]
mod tests {
    check_msg!(
        test_teardown_1,
        super::Msg,
        super::Msg { sid: 77 },
        crate::serialize::Msg::Td(td),
        td
    );
}
