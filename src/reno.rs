//! TCP Reno's congestion avoidance, as a `GenericCongAvoidAlg`.
//!
//! Slow start and timeout handling live in the runtime; Reno only supplies
//! additive increase and multiplicative decrease.

use crate::{GenericCongAvoidAlg, GenericCongAvoidFlow, Measurements};

#[derive(Clone, Copy, Debug, Default)]
pub struct Reno;

impl GenericCongAvoidAlg for Reno {
    type Flow = RenoFlow;

    fn name(&self) -> &str {
        "reno"
    }

    fn new_flow(&self, init_cwnd: u32, mss: u32) -> Self::Flow {
        RenoFlow {
            mss,
            init_cwnd,
            cwnd: init_cwnd,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenoFlow {
    mss: u32,
    init_cwnd: u32,
    cwnd: u32,
}

impl GenericCongAvoidFlow for RenoFlow {
    fn curr_cwnd(&self) -> u32 {
        self.cwnd
    }

    fn set_cwnd(&mut self, cwnd: u32) {
        self.cwnd = cwnd;
    }

    fn increase(&mut self, m: &Measurements) {
        // increase cwnd by 1 / cwnd per packet
        let delta = f64::from(self.mss) * (f64::from(m.acked) / f64::from(self.cwnd.max(1)));
        self.cwnd = self.cwnd.saturating_add(delta as u32);
    }

    fn reduction(&mut self, _m: &Measurements) {
        self.cwnd /= 2;
        if self.cwnd <= self.init_cwnd {
            self.cwnd = self.init_cwnd;
        }
    }

    fn reset(&mut self) {
        self.cwnd = self.init_cwnd;
    }
}

#[cfg(test)]
mod tests {
    use super::Reno;
    use crate::{validate, GenericCongAvoidAlg, GenericCongAvoidFlow, Measurements};

    fn acked(acked: u32) -> Measurements {
        Measurements {
            acked,
            ..Default::default()
        }
    }

    #[test]
    fn conforms() {
        validate(&Reno).expect("reno implements the interface");
    }

    #[test]
    fn one_mss_per_window() {
        let mut f = Reno.new_flow(14480, 1448);
        f.increase(&acked(14480));
        assert_eq!(f.curr_cwnd(), 14480 + 1448);
    }

    #[test]
    fn halves_down_to_init() {
        let mut f = Reno.new_flow(10_000, 1000);
        f.set_cwnd(40_000);
        f.reduction(&Measurements::default());
        assert_eq!(f.curr_cwnd(), 20_000);
        f.reduction(&Measurements::default());
        assert_eq!(f.curr_cwnd(), 10_000);
        f.reduction(&Measurements::default());
        assert_eq!(f.curr_cwnd(), 10_000);
    }

    #[test]
    fn reset_restores_init() {
        let mut f = Reno.new_flow(10_000, 1000);
        f.increase(&acked(100_000));
        assert!(f.curr_cwnd() > 10_000);
        f.reset();
        assert_eq!(f.curr_cwnd(), 10_000);
    }

    #[test]
    fn zero_window_does_not_divide_by_zero() {
        let mut f = Reno.new_flow(0, 1000);
        f.increase(&acked(1000));
        assert_eq!(f.curr_cwnd(), 1_000_000);
    }
}
