//! A runtime for generic congestion-avoidance algorithms in the Congestion Control Plane.
//!
//! The datapath (a kernel module, or any other packet-sending fast path) reports
//! per-flow measurements to this process over an IPC channel. The runtime hands
//! each report to a user algorithm, reads back the algorithm's congestion window
//! (and optionally its rate), and sends changed values back to the datapath.
//!
//! An algorithm is two objects:
//! 1. A [`GenericCongAvoidAlg`], the factory, which is asked for one flow instance per
//!    new connection.
//! 2. A [`GenericCongAvoidFlow`], the per-connection state machine, which is told
//!    about acks, losses, and timeouts.
//!
//! Before any traffic is processed, the algorithm's declared surface is checked
//! against the required interface (see [`interface`]). Statically typed algorithms
//! always pass; boxed plugins ([`dynamic::BoxedAlg`]) carry whatever surface they
//! declare and are rejected with an error naming the offending method.
//!
//! # Example
//!
//! ```rust,no_run
//! use generic_cong_avoid::{Config, GenericCongAvoidAlg, GenericCongAvoidFlow, Measurements};
//!
//! struct Aimd;
//! struct AimdFlow {
//!     init_cwnd: u32,
//!     mss: u32,
//!     cwnd: u32,
//! }
//!
//! impl GenericCongAvoidAlg for Aimd {
//!     type Flow = AimdFlow;
//!
//!     fn name(&self) -> &str {
//!         "aimd"
//!     }
//!
//!     fn new_flow(&self, init_cwnd: u32, mss: u32) -> Self::Flow {
//!         AimdFlow { init_cwnd, mss, cwnd: init_cwnd }
//!     }
//! }
//!
//! impl GenericCongAvoidFlow for AimdFlow {
//!     fn curr_cwnd(&self) -> u32 {
//!         self.cwnd
//!     }
//!     fn set_cwnd(&mut self, cwnd: u32) {
//!         self.cwnd = cwnd;
//!     }
//!     fn increase(&mut self, m: &Measurements) {
//!         self.cwnd += self.mss * m.acked / self.cwnd.max(1);
//!     }
//!     fn reduction(&mut self, _m: &Measurements) {
//!         self.cwnd = (self.cwnd / 2).max(self.mss);
//!     }
//!     fn reset(&mut self) {
//!         self.cwnd = self.init_cwnd;
//!     }
//! }
//!
//! fn main() {
//!     generic_cong_avoid::start("unix", Aimd, Config::default()).unwrap();
//! }
//! ```

pub mod algs;
pub mod config;
pub mod dynamic;
pub mod errors;
pub mod flow_table;
pub mod interface;
pub mod ipc;
pub mod reno;
pub mod run;
pub mod serialize;
#[cfg(test)]
pub mod test_helper;

pub use crate::config::{Config, DEFAULT_SS_THRESH};
pub use crate::errors::{Error, InterfaceError, Result};
pub use crate::run::{
    CCPHandle, DiagnosticSink, Dispatch, RunBuilder, Runtime, RuntimeStats, TracingSink,
};

use crate::interface::ClassSpec;
use crate::ipc::{BackendBuilder, Blocking};
use crate::serialize::{cwnd, measure, rate};
use tracing::info;

/// One report's worth of congestion signals for a single flow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Measurements {
    /// Bytes newly acknowledged in order.
    pub acked: u32,
    /// Whether the datapath saw a retransmission timeout.
    pub was_timeout: bool,
    /// Packets acknowledged out of order.
    pub sacked: u32,
    /// Lost packets (or bytes, as the datapath reports them).
    pub loss: u32,
    /// Round-trip time sample in microseconds.
    pub rtt: u32,
    /// Packets in flight.
    pub inflight: u32,
}

impl From<&measure::Msg> for Measurements {
    fn from(m: &measure::Msg) -> Self {
        Measurements {
            acked: m.acked,
            was_timeout: m.was_timeout,
            sacked: m.sacked,
            loss: m.loss,
            rtt: m.rtt,
            inflight: m.inflight,
        }
    }
}

/// What the datapath told us about a flow when it was created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatapathInfo {
    pub sock_id: u32,
    pub init_cwnd: u32,
    pub mss: u32,
    pub src_ip: u32,
    pub src_port: u32,
    pub dst_ip: u32,
    pub dst_port: u32,
}

/// An update the runtime sends back to the datapath.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlInstruction {
    /// Congestion window, in bytes.
    SetWindow { flow_id: u32, cwnd: u32 },
    /// Pacing rate, in bytes per second.
    SetRate { flow_id: u32, rate: u64 },
}

impl ControlInstruction {
    pub fn flow_id(&self) -> u32 {
        match *self {
            ControlInstruction::SetWindow { flow_id, .. }
            | ControlInstruction::SetRate { flow_id, .. } => flow_id,
        }
    }

    /// Encode as a wire frame.
    pub fn serialize(&self) -> Vec<u8> {
        match *self {
            ControlInstruction::SetWindow { flow_id, cwnd } => {
                serialize::serialize(&cwnd::Msg { sid: flow_id, cwnd })
            }
            ControlInstruction::SetRate { flow_id, rate } => {
                serialize::serialize(&rate::Msg { sid: flow_id, rate })
            }
        }
    }
}

/// The algorithm factory. The runtime holds exactly one.
pub trait GenericCongAvoidAlg {
    type Flow: GenericCongAvoidFlow;

    /// Name used in logs and in interface errors.
    fn name(&self) -> &str;

    /// Create the state for a newly started flow.
    fn new_flow(&self, init_cwnd: u32, mss: u32) -> Self::Flow;

    /// The surface this algorithm declares. Checked against
    /// [`interface::ALG_BASE`] before the runtime starts.
    fn class_spec(&self) -> ClassSpec {
        ClassSpec::conforming(self.name(), &interface::ALG_BASE)
    }

    /// The surface of the flows this algorithm creates, if it declares one.
    /// Only a declared flow class is checked, against [`interface::FLOW_BASE`].
    fn flow_class_spec(&self) -> Option<ClassSpec> {
        None
    }
}

/// Per-flow congestion control state.
///
/// The runtime calls these synchronously from its single loop thread; a slow call
/// stalls every flow on that loop.
pub trait GenericCongAvoidFlow {
    /// Current congestion window in bytes. Must not change state.
    fn curr_cwnd(&self) -> u32;

    /// Overwrite the congestion window.
    fn set_cwnd(&mut self, cwnd: u32);

    /// Grow the window in response to newly acked data.
    fn increase(&mut self, m: &Measurements);

    /// Shrink the window in response to loss.
    fn reduction(&mut self, m: &Measurements);

    /// Return to the state `new_flow` produced.
    fn reset(&mut self);

    /// Pacing rate in bytes per second, for algorithms which control rate.
    fn curr_rate(&self) -> Option<u64> {
        None
    }
}

impl<F: GenericCongAvoidFlow + ?Sized> GenericCongAvoidFlow for Box<F> {
    fn curr_cwnd(&self) -> u32 {
        (**self).curr_cwnd()
    }

    fn set_cwnd(&mut self, cwnd: u32) {
        (**self).set_cwnd(cwnd)
    }

    fn increase(&mut self, m: &Measurements) {
        (**self).increase(m)
    }

    fn reduction(&mut self, m: &Measurements) {
        (**self).reduction(m)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn curr_rate(&self) -> Option<u64> {
        (**self).curr_rate()
    }
}

/// Check `alg` against the required interfaces.
///
/// This runs once, at registration. The flow class is only checked if the
/// algorithm declares one.
pub fn validate<A: GenericCongAvoidAlg>(alg: &A) -> Result<()> {
    interface::assert_implements(&alg.class_spec(), &interface::ALG_BASE)?;
    if let Some(flow_class) = alg.flow_class_spec() {
        interface::assert_implements(&flow_class, &interface::FLOW_BASE)?;
    }

    Ok(())
}

/// Validate `alg`, open the requested IPC mechanism, and run the execution loop
/// on the calling thread.
///
/// `ipc` is one of the names accepted by [`algs::ipc_valid`]. Returns when the
/// IPC channel closes, or with an error if validation or IPC setup fails.
pub fn start<A: GenericCongAvoidAlg>(ipc: &str, alg: A, cfg: Config) -> Result<RuntimeStats> {
    validate(&alg)?;
    algs::ipc_valid(ipc.to_owned()).map_err(Error::Config)?;
    info!(ipc, algorithm = alg.name(), debug = cfg.debug, "starting CCP");

    match ipc {
        "unix" => {
            let sk = ipc::unix::Socket::<Blocking>::new(ipc::unix::CCP_SOCK, ipc::unix::DP_SOCK)?;
            RunBuilder::new(BackendBuilder { sock: sk }, alg)
                .config(cfg)
                .run()
        }
        #[cfg(target_os = "linux")]
        "netlink" => {
            let sk = ipc::netlink::Socket::<Blocking>::new()?;
            RunBuilder::new(BackendBuilder { sock: sk }, alg)
                .config(cfg)
                .run()
        }
        #[cfg(target_os = "linux")]
        "char" => {
            let sk = ipc::kp::Socket::<Blocking>::new()?;
            RunBuilder::new(BackendBuilder { sock: sk }, alg)
                .config(cfg)
                .run()
        }
        x => Err(Error::Config(format!("unknown ipc mechanism {:?}", x))),
    }
}

#[cfg(test)]
mod test;
