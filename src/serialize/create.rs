//! Message sent from datapath to CCP when a new flow starts.

use super::{u32_to_u8s, AsRawMsg, RawMsg, HDR_LENGTH};
use crate::Result;

pub(crate) const CREATE: u16 = 0;
const CREATE_LEN: u16 = HDR_LENGTH + 6 * 4;

#[derive(Clone, Debug, PartialEq)]
pub struct Msg {
    pub sid: u32,
    pub init_cwnd: u32,
    pub mss: u32,
    pub src_ip: u32,
    pub src_port: u32,
    pub dst_ip: u32,
    pub dst_port: u32,
}

impl AsRawMsg for Msg {
    fn get_hdr(&self) -> (u16, u16, u32) {
        (CREATE, CREATE_LEN, self.sid)
    }

    fn get_u32s(&self, w: &mut Vec<u8>) {
        let mut buf = [0u8; 4];
        for x in &[
            self.init_cwnd,
            self.mss,
            self.src_ip,
            self.src_port,
            self.dst_ip,
            self.dst_port,
        ] {
            u32_to_u8s(&mut buf, *x);
            w.extend_from_slice(&buf[..]);
        }
    }

    fn from_raw_msg(msg: RawMsg) -> Result<Self> {
        msg.expect_len(CREATE_LEN)?;
        Ok(Msg {
            sid: msg.sid,
            init_cwnd: msg.get_u32(0)?,
            mss: msg.get_u32(1)?,
            src_ip: msg.get_u32(2)?,
            src_port: msg.get_u32(3)?,
            dst_ip: msg.get_u32(4)?,
            dst_port: msg.get_u32(5)?,
        })
    }
}
