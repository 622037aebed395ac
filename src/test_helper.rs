use crate::{GenericCongAvoidAlg, GenericCongAvoidFlow, Measurements};

/// A flow which grows by exactly the acked bytes, halves on loss, and counts
/// every call it receives.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CountingFlow {
    pub init_cwnd: u32,
    pub mss: u32,
    pub cwnd: u32,
    pub rate: Option<u64>,
    pub increases: usize,
    pub reductions: usize,
    pub resets: usize,
    pub last_measurement: Option<Measurements>,
}

impl CountingFlow {
    pub fn new(init_cwnd: u32, mss: u32) -> Self {
        CountingFlow {
            init_cwnd,
            mss,
            cwnd: init_cwnd,
            ..Default::default()
        }
    }
}

impl GenericCongAvoidFlow for CountingFlow {
    fn curr_cwnd(&self) -> u32 {
        self.cwnd
    }

    fn set_cwnd(&mut self, cwnd: u32) {
        self.cwnd = cwnd;
    }

    fn increase(&mut self, m: &Measurements) {
        self.increases += 1;
        self.last_measurement = Some(*m);
        self.cwnd = self.cwnd.saturating_add(m.acked);
    }

    fn reduction(&mut self, m: &Measurements) {
        self.reductions += 1;
        self.last_measurement = Some(*m);
        self.cwnd /= 2;
    }

    fn reset(&mut self) {
        self.resets += 1;
        self.cwnd = self.init_cwnd;
    }

    fn curr_rate(&self) -> Option<u64> {
        self.rate
    }
}

/// Creates `CountingFlow`s, optionally with a fixed pacing rate.
#[derive(Clone, Debug, Default)]
pub struct CountingAlg {
    pub rate: Option<u64>,
}

impl GenericCongAvoidAlg for CountingAlg {
    type Flow = CountingFlow;

    fn name(&self) -> &str {
        "counting"
    }

    fn new_flow(&self, init_cwnd: u32, mss: u32) -> Self::Flow {
        CountingFlow {
            rate: self.rate,
            ..CountingFlow::new(init_cwnd, mss)
        }
    }
}
