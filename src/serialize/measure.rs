//! The datapath sends a Measurement message with a snapshot of the flow's
//! congestion signals since the previous report.

use super::{u32_to_u8s, AsRawMsg, RawMsg, HDR_LENGTH};
use crate::{Error, Result};

pub(crate) const MEASURE: u16 = 1;
const MEASURE_LEN: u16 = HDR_LENGTH + 6 * 4;

#[derive(Clone, Debug, PartialEq)]
pub struct Msg {
    pub sid: u32,
    /// bytes newly acked in order
    pub acked: u32,
    /// packets acked out of order
    pub sacked: u32,
    pub loss: u32,
    /// microseconds
    pub rtt: u32,
    /// packets
    pub inflight: u32,
    // This is a bool, but it is kept a u32 on the wire so the body stays 4-byte aligned.
    pub was_timeout: bool,
}

impl AsRawMsg for Msg {
    fn get_hdr(&self) -> (u16, u16, u32) {
        (MEASURE, MEASURE_LEN, self.sid)
    }

    fn get_u32s(&self, w: &mut Vec<u8>) {
        let mut buf = [0u8; 4];
        for x in &[
            self.acked,
            self.sacked,
            self.loss,
            self.rtt,
            self.inflight,
            u32::from(self.was_timeout),
        ] {
            u32_to_u8s(&mut buf, *x);
            w.extend_from_slice(&buf[..]);
        }
    }

    fn from_raw_msg(msg: RawMsg) -> Result<Self> {
        msg.expect_len(MEASURE_LEN)?;
        Ok(Msg {
            sid: msg.sid,
            acked: msg.get_u32(0)?,
            sacked: msg.get_u32(1)?,
            loss: msg.get_u32(2)?,
            rtt: msg.get_u32(3)?,
            inflight: msg.get_u32(4)?,
            was_timeout: match msg.get_u32(5)? {
                0 => false,
                1 => true,
                x => {
                    return Err(Error::MalformedFrame(format!(
                        "timeout flag must be 0 or 1, got {}",
                        x
                    )))
                }
            },
        })
    }
}

#[cfg(test)]
mod tests {
    macro_rules! check_measure_msg {
        ($id: ident, $sid:expr, $acked:expr, $loss:expr, $timeout:expr) => {
            check_msg!(
                $id,
                super::Msg,
                super::Msg {
                    sid: $sid,
                    acked: $acked,
                    sacked: 0,
                    loss: $loss,
                    rtt: 10_000,
                    inflight: 10,
                    was_timeout: $timeout,
                },
                crate::serialize::Msg::Ms(mes),
                mes
            );
        };
    }

    check_measure_msg!(test_measure_1, 15, 1448 * 2, 0, false);
    check_measure_msg!(test_measure_2, 256, 0, 3, false);
    check_measure_msg!(test_measure_3, 32, 0, 0, true);

    #[test]
    fn bad_timeout_word_is_rejected() {
        let m = super::Msg {
            sid: 3,
            acked: 0,
            sacked: 0,
            loss: 0,
            rtt: 0,
            inflight: 0,
            was_timeout: false,
        };
        let mut buf = crate::serialize::serialize(&m);
        let end = buf.len();
        crate::serialize::u32_to_u8s(&mut buf[end - 4..], 7);
        match crate::serialize::Msg::from_buf(&buf[..]) {
            Err(crate::Error::MalformedFrame(_)) => (),
            x => panic!("expected malformed frame, got {:?}", x),
        }
    }
}
