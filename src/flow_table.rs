//! Live flows, keyed by the datapath's socket id.
//!
//! The table is owned by exactly one runtime loop, so it takes no locks.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Instant;

use crate::{Error, GenericCongAvoidFlow, Result, DEFAULT_SS_THRESH};

/// Everything the runtime tracks about one flow.
#[derive(Debug)]
pub struct FlowState<F> {
    flow: F,
    pub sid: u32,
    pub init_cwnd: u32,
    pub mss: u32,
    pub created: Instant,
    /// When the last measurement for this flow arrived.
    pub last_report: Option<Instant>,
    /// Slow start threshold, when the runtime drives slow start.
    pub ss_thresh: u32,
    /// Latest RTT sample in microseconds.
    pub rtt: u32,
    /// Lost and sacked packets not yet made up by acks.
    pub loss_deficit: u32,
    pub last_reduction: Option<Instant>,
    last_cwnd: Option<u32>,
    last_rate: Option<u64>,
}

impl<F: GenericCongAvoidFlow> FlowState<F> {
    pub fn flow(&self) -> &F {
        &self.flow
    }

    pub fn flow_mut(&mut self) -> &mut F {
        &mut self.flow
    }

    /// The window to send to the datapath, if it differs from the last one sent.
    /// Records it as sent.
    pub fn cwnd_update(&mut self) -> Option<u32> {
        let cwnd = self.flow.curr_cwnd();
        if self.last_cwnd == Some(cwnd) {
            return None;
        }

        self.last_cwnd = Some(cwnd);
        Some(cwnd)
    }

    /// As `cwnd_update`, for algorithms which report a rate.
    pub fn rate_update(&mut self) -> Option<u64> {
        let rate = self.flow.curr_rate()?;
        if self.last_rate == Some(rate) {
            return None;
        }

        self.last_rate = Some(rate);
        Some(rate)
    }

    pub fn last_cwnd(&self) -> Option<u32> {
        self.last_cwnd
    }
}

/// Map from flow id to `FlowState`.
#[derive(Debug)]
pub struct FlowTable<F> {
    flows: HashMap<u32, FlowState<F>>,
}

impl<F> Default for FlowTable<F> {
    fn default() -> Self {
        FlowTable {
            flows: HashMap::new(),
        }
    }
}

impl<F: GenericCongAvoidFlow> FlowTable<F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new flow built by `factory`.
    ///
    /// If `sid` is already live this fails with `DuplicateFlow`, the existing
    /// state is untouched, and `factory` is not called.
    pub fn create<G>(
        &mut self,
        sid: u32,
        init_cwnd: u32,
        mss: u32,
        factory: G,
    ) -> Result<&mut FlowState<F>>
    where
        G: FnOnce(u32, u32) -> F,
    {
        match self.flows.entry(sid) {
            Entry::Occupied(_) => Err(Error::DuplicateFlow(sid)),
            Entry::Vacant(v) => Ok(v.insert(FlowState {
                flow: factory(init_cwnd, mss),
                sid,
                init_cwnd,
                mss,
                created: Instant::now(),
                last_report: None,
                ss_thresh: DEFAULT_SS_THRESH,
                rtt: 0,
                loss_deficit: 0,
                last_reduction: None,
                last_cwnd: None,
                last_rate: None,
            })),
        }
    }

    pub fn lookup(&self, sid: u32) -> Option<&FlowState<F>> {
        self.flows.get(&sid)
    }

    pub fn lookup_mut(&mut self, sid: u32) -> Option<&mut FlowState<F>> {
        self.flows.get_mut(&sid)
    }

    /// Remove a flow. Removing an unknown flow is not an error.
    pub fn remove(&mut self, sid: u32) -> Option<FlowState<F>> {
        self.flows.remove(&sid)
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Drop every flow without calling into the algorithm.
    pub fn clear(&mut self) {
        self.flows.clear()
    }
}
