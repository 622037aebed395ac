//! Utilities to start a CCP processing worker.

use crate::flow_table::{FlowState, FlowTable};
use crate::ipc::{BackendBuilder, Ipc};
use crate::serialize::drop::DropEvent;
use crate::serialize::Msg;
use crate::{
    validate, Config, ControlInstruction, DatapathInfo, Error, GenericCongAvoidAlg,
    GenericCongAvoidFlow, Measurements, Result,
};
use std::sync::{atomic, Arc};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Counters kept by one execution loop, returned when it exits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    pub messages: u64,
    pub flows_created: u64,
    pub flows_removed: u64,
    pub duplicate_creates: u64,
    /// Measurements, drops, and teardowns for flows which are not live.
    pub unknown_flow: u64,
    /// Frames of a kind the datapath should not send.
    pub protocol_errors: u64,
    /// Runs of bytes skipped because they did not parse.
    pub malformed_frames: u64,
    pub instructions_sent: u64,
    pub send_errors: u64,
}

/// One thing the runtime did to a flow. Reported to the `DiagnosticSink` in debug mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    NewFlow { sid: u32, init_cwnd: u32, mss: u32 },
    Increase { sid: u32, acked: u32 },
    Reduction { sid: u32, loss: u32 },
    Reset { sid: u32 },
    /// The runtime overwrote the window itself (slow start, timeout, or the floor).
    SetCwnd { sid: u32, cwnd: u32 },
    Teardown { sid: u32 },
    Emit(ControlInstruction),
}

/// Receives every `Dispatch` when debug mode is on. Must not affect control decisions.
pub trait DiagnosticSink {
    fn record(&mut self, event: &Dispatch);
}

/// The default sink: every event becomes a `tracing` debug event.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&mut self, event: &Dispatch) {
        debug!(?event, "dispatch");
    }
}

/// The single-threaded core of the execution loop: the algorithm, the flows it
/// has created, and the rules for turning datapath messages into calls on them.
///
/// `Runtime` does no IO. `handle_msg` reports the instructions to send through
/// a callback.
pub struct Runtime<A: GenericCongAvoidAlg> {
    alg: A,
    cfg: Config,
    flows: FlowTable<A::Flow>,
    stats: RuntimeStats,
    sink: Box<dyn DiagnosticSink + Send>,
}

impl<A: GenericCongAvoidAlg> std::fmt::Debug for Runtime<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("alg", &self.alg.name())
            .field("cfg", &self.cfg)
            .field("flows", &self.flows.len())
            .field("stats", &self.stats)
            .finish()
    }
}

// Sink calls go through this so a disabled debug mode costs one branch.
macro_rules! diag {
    ($debug:expr, $sink:expr, $ev:expr) => {
        if $debug {
            $sink.record(&$ev);
        }
    };
}

impl<A: GenericCongAvoidAlg> Runtime<A> {
    /// Validate `alg` and build an empty runtime around it.
    pub fn new(alg: A, cfg: Config) -> Result<Self> {
        validate(&alg)?;
        Ok(Runtime {
            alg,
            cfg,
            flows: FlowTable::new(),
            stats: RuntimeStats::default(),
            sink: Box::new(TracingSink),
        })
    }

    /// Replace the default `TracingSink`.
    pub fn with_sink<S: DiagnosticSink + Send + 'static>(self, sink: S) -> Self {
        Runtime {
            sink: Box::new(sink),
            ..self
        }
    }

    pub fn stats(&self) -> RuntimeStats {
        self.stats
    }

    pub fn flows(&self) -> &FlowTable<A::Flow> {
        &self.flows
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Apply one datapath message. Instructions to send are passed to `emit` in order.
    ///
    /// Errors are per-message (`DuplicateFlow`, `UnknownFlow`, `MalformedFrame`)
    /// and leave the runtime usable; they are also counted in `stats()`.
    pub fn handle_msg<E>(&mut self, msg: Msg, emit: &mut E) -> Result<()>
    where
        E: FnMut(ControlInstruction),
    {
        self.stats.messages += 1;
        match msg {
            Msg::Cr(c) => self.new_flow(
                DatapathInfo {
                    sock_id: c.sid,
                    init_cwnd: c.init_cwnd,
                    mss: c.mss,
                    src_ip: c.src_ip,
                    src_port: c.src_port,
                    dst_ip: c.dst_ip,
                    dst_port: c.dst_port,
                },
                emit,
            ),
            Msg::Ms(m) => {
                let ms = Measurements::from(&m);
                self.on_measurement(m.sid, ms, emit)
            }
            Msg::Dr(d) => self.on_drop(d.sid, d.event, d.lost, emit),
            Msg::Td(t) => {
                if self.flows.remove(t.sid).is_some() {
                    self.stats.flows_removed += 1;
                    diag!(self.cfg.debug, self.sink, Dispatch::Teardown { sid: t.sid });
                    debug!(sid = t.sid, flows = self.flows.len(), "flow closed");
                    Ok(())
                } else {
                    self.stats.unknown_flow += 1;
                    Err(Error::UnknownFlow(t.sid))
                }
            }
            Msg::Cw(m) => self.outbound_only("set window", m.sid),
            Msg::Rt(m) => self.outbound_only("set rate", m.sid),
            Msg::Other(m) => {
                self.stats.protocol_errors += 1;
                debug!(size = m.len, msg_type = m.typ, sid = m.sid, "got unknown message");
                Err(Error::MalformedFrame(format!("unknown message type {}", m.typ)))
            }
        }
    }

    /// Drop every flow without calling into the algorithm.
    pub fn clear(&mut self) {
        let n = self.flows.len() as u64;
        self.flows.clear();
        self.stats.flows_removed += n;
    }

    fn outbound_only(&mut self, kind: &str, sid: u32) -> Result<()> {
        self.stats.protocol_errors += 1;
        warn!(sid, kind, "datapath sent a message only ccp should send");
        Err(Error::MalformedFrame(format!(
            "unexpected {} message for flow {}",
            kind, sid
        )))
    }

    fn new_flow<E>(&mut self, info: DatapathInfo, emit: &mut E) -> Result<()>
    where
        E: FnMut(ControlInstruction),
    {
        let init_cwnd = if self.cfg.init_cwnd != 0 {
            self.cfg.init_cwnd
        } else {
            info.init_cwnd
        };

        let alg = &self.alg;
        let st = match self
            .flows
            .create(info.sock_id, init_cwnd, info.mss, |w, m| alg.new_flow(w, m))
        {
            Ok(st) => st,
            Err(e) => {
                self.stats.duplicate_creates += 1;
                warn!(sid = info.sock_id, "create for live flow, ignoring");
                return Err(e);
            }
        };

        st.ss_thresh = self.cfg.ss_thresh;
        self.stats.flows_created += 1;
        debug!(
            sid        = info.sock_id,
            init_cwnd  = init_cwnd,
            mss        = info.mss,
            src_ip     = info.src_ip,
            src_port   = info.src_port,
            dst_ip     = info.dst_ip,
            dst_port   = info.dst_port,
            alg        = alg.name(),
            "creating new flow"
        );
        diag!(
            self.cfg.debug,
            self.sink,
            Dispatch::NewFlow {
                sid: info.sock_id,
                init_cwnd,
                mss: info.mss,
            }
        );

        if init_cwnd == info.init_cwnd {
            // no override to push; the first report sends the window
            return Ok(());
        }

        Self::emit_updates(st, &self.cfg, &mut self.sink, &mut self.stats, emit);
        Ok(())
    }

    fn on_measurement<E>(&mut self, sid: u32, ms: Measurements, emit: &mut E) -> Result<()>
    where
        E: FnMut(ControlInstruction),
    {
        let cfg = &self.cfg;
        let sink = &mut self.sink;
        let st = match self.flows.lookup_mut(sid) {
            Some(st) => st,
            None => {
                self.stats.unknown_flow += 1;
                debug!(sid, "measurement for unknown flow");
                return Err(Error::UnknownFlow(sid));
            }
        };

        st.last_report = Some(Instant::now());
        st.rtt = ms.rtt;
        if ms.was_timeout {
            Self::handle_timeout(st, cfg, sink);
        } else if ms.loss > 0 {
            Self::handle_reduction(st, &ms, cfg, sink);
        } else {
            if cfg.deficit_timeout.is_some() {
                st.loss_deficit = st.loss_deficit.saturating_sub(ms.acked / st.mss.max(1));
            }

            let mut ms = ms;
            if cfg.slow_start {
                ms.acked = Self::slow_start_increase(st, ms.acked, cfg, sink);
            }

            // increase the cwnd corresponding to new in-order cumulative ACKs
            if !cfg.slow_start || ms.acked > 0 {
                st.flow_mut().increase(&ms);
                diag!(cfg.debug, sink, Dispatch::Increase { sid, acked: ms.acked });
            }
        }

        debug!(
            sid,
            acked = ms.acked,
            loss = ms.loss,
            rtt = ms.rtt,
            inflight = ms.inflight,
            cwnd = st.flow().curr_cwnd(),
            ss_thresh = st.ss_thresh,
            "got measurement"
        );

        Self::emit_updates(st, cfg, sink, &mut self.stats, emit);
        Ok(())
    }

    fn on_drop<E>(&mut self, sid: u32, event: DropEvent, lost: u32, emit: &mut E) -> Result<()>
    where
        E: FnMut(ControlInstruction),
    {
        let cfg = &self.cfg;
        let sink = &mut self.sink;
        let st = match self.flows.lookup_mut(sid) {
            Some(st) => st,
            None => {
                self.stats.unknown_flow += 1;
                debug!(sid, ?event, "drop for unknown flow");
                return Err(Error::UnknownFlow(sid));
            }
        };

        debug!(sid, ?event, lost, "got drop");
        match event {
            DropEvent::Timeout => Self::handle_timeout(st, cfg, sink),
            DropEvent::DupAck | DropEvent::Ecn => {
                let ms = Measurements {
                    loss: lost,
                    ..Default::default()
                };
                Self::handle_reduction(st, &ms, cfg, sink);
            }
        }

        Self::emit_updates(st, cfg, sink, &mut self.stats, emit);
        Ok(())
    }

    fn handle_timeout(
        st: &mut FlowState<A::Flow>,
        cfg: &Config,
        sink: &mut Box<dyn DiagnosticSink + Send>,
    ) {
        st.ss_thresh = (st.ss_thresh / 2).max(st.init_cwnd);
        st.loss_deficit = 0;
        st.flow_mut().reset();
        diag!(cfg.debug, sink, Dispatch::Reset { sid: st.sid });
        let init_cwnd = st.init_cwnd;
        if st.flow().curr_cwnd() != init_cwnd {
            st.flow_mut().set_cwnd(init_cwnd);
            diag!(
                cfg.debug,
                sink,
                Dispatch::SetCwnd {
                    sid: st.sid,
                    cwnd: init_cwnd,
                }
            );
        }

        warn!(
            sid = st.sid,
            curr_cwnd_pkts = st.init_cwnd / st.mss.max(1),
            ss_thresh = st.ss_thresh,
            "timeout"
        );
    }

    fn handle_reduction(
        st: &mut FlowState<A::Flow>,
        ms: &Measurements,
        cfg: &Config,
        sink: &mut Box<dyn DiagnosticSink + Send>,
    ) {
        if let Some(rtts) = cfg.deficit_timeout {
            let window = Duration::from_micros(u64::from(rtts) * u64::from(st.rtt));
            let expired = rtts > 0 && st.last_reduction.map_or(false, |t| t.elapsed() > window);
            if expired {
                st.loss_deficit = 0;
            }

            let in_reduction = st.loss_deficit > 0;
            st.loss_deficit = st
                .loss_deficit
                .saturating_add(ms.loss)
                .saturating_add(ms.sacked);
            if in_reduction {
                debug!(sid = st.sid, deficit = st.loss_deficit, "in cwnd reduction");
                return;
            }
        }

        st.flow_mut().reduction(ms);
        st.last_reduction = Some(Instant::now());
        st.ss_thresh = st.flow().curr_cwnd();
        diag!(
            cfg.debug,
            sink,
            Dispatch::Reduction {
                sid: st.sid,
                loss: ms.loss,
            }
        );
    }

    // Grow the window by up to `acked` bytes while below ss_thresh.
    // Returns the acked bytes left over for the algorithm.
    fn slow_start_increase(
        st: &mut FlowState<A::Flow>,
        acked: u32,
        cfg: &Config,
        sink: &mut Box<dyn DiagnosticSink + Send>,
    ) -> u32 {
        let curr_cwnd = st.flow().curr_cwnd();
        if curr_cwnd >= st.ss_thresh {
            return acked;
        }

        let room = st.ss_thresh - curr_cwnd;
        let (cwnd, rest) = if acked > room {
            (st.ss_thresh, acked - room)
        } else if cfg.use_compensation {
            // overshoot to make up for growth missed between reports
            let delta = f64::from(acked) / std::f64::consts::LN_2;
            (curr_cwnd.saturating_add(delta as u32), 0)
        } else {
            (curr_cwnd + acked, 0)
        };

        st.flow_mut().set_cwnd(cwnd);
        diag!(cfg.debug, sink, Dispatch::SetCwnd { sid: st.sid, cwnd });
        rest
    }

    // Apply the window floor, then emit whatever changed since the last report.
    fn emit_updates<E>(
        st: &mut FlowState<A::Flow>,
        cfg: &Config,
        sink: &mut Box<dyn DiagnosticSink + Send>,
        stats: &mut RuntimeStats,
        emit: &mut E,
    ) where
        E: FnMut(ControlInstruction),
    {
        let floor = cfg.cwnd_floor(st.mss);
        if st.flow().curr_cwnd() < floor {
            st.flow_mut().set_cwnd(floor);
            diag!(cfg.debug, sink, Dispatch::SetCwnd { sid: st.sid, cwnd: floor });
        }

        if let Some(cwnd) = st.cwnd_update() {
            let ins = ControlInstruction::SetWindow { flow_id: st.sid, cwnd };
            diag!(cfg.debug, sink, Dispatch::Emit(ins));
            stats.instructions_sent += 1;
            emit(ins);
        }

        if let Some(rate) = st.rate_update() {
            let ins = ControlInstruction::SetRate { flow_id: st.sid, rate };
            diag!(cfg.debug, sink, Dispatch::Emit(ins));
            stats.instructions_sent += 1;
            emit(ins);
        }
    }
}

/// A handle to manage running instances of the CCP execution loop.
#[derive(Debug)]
pub struct CCPHandle {
    pub continue_listening: Arc<atomic::AtomicBool>,
    pub join_handle: thread::JoinHandle<Result<RuntimeStats>>,
}

impl CCPHandle {
    /// Instruct the execution loop to exit.
    pub fn kill(&self) {
        self.continue_listening.store(false, atomic::Ordering::SeqCst);
    }

    /// Collect the result of the thread running the CCP execution loop
    /// once it exits.
    pub fn wait(self) -> Result<RuntimeStats> {
        match self.join_handle.join() {
            Ok(r) => r,
            Err(_) => Err(Error::Ipc(String::from("call to run_inner panicked"))),
        }
    }
}

/// Main execution loop of CCP.
/// `run` blocks until one of:
/// 1. The IPC channel is closed.
/// 2. The stop handle is cleared (see `CCPHandle::kill`).
/// 3. The IPC socket fails.
///
/// Callers construct a `BackendBuilder` for their IPC mechanism and pass it in
/// with the algorithm.
///
/// # Example
///
/// ```rust,no_run
/// use generic_cong_avoid::ipc::{unix, BackendBuilder, Blocking};
/// use generic_cong_avoid::reno::Reno;
/// use generic_cong_avoid::{Config, RunBuilder};
///
/// let sk = unix::Socket::<Blocking>::new(unix::CCP_SOCK, unix::DP_SOCK).expect("ipc initialization");
/// let handle = RunBuilder::new(BackendBuilder { sock: sk }, Reno::default())
///     .config(Config::default().init_cwnd(14480))
///     .spawn_thread()
///     .run()
///     .expect("spawn");
/// handle.kill();
/// let stats = handle.wait().expect("clean exit");
/// println!("{:?}", stats);
/// ```
pub struct RunBuilder<I: Ipc, A: GenericCongAvoidAlg, Spawnness> {
    backend_builder: BackendBuilder<I>,
    alg: A,
    cfg: Config,
    sink: Option<Box<dyn DiagnosticSink + Send>>,
    stop_handle: Option<Arc<atomic::AtomicBool>>,
    _phantom: std::marker::PhantomData<Spawnness>,
}

pub struct Spawn;
pub struct NoSpawn;

impl<I: Ipc, A: GenericCongAvoidAlg> RunBuilder<I, A, NoSpawn> {
    pub fn new(backend_builder: BackendBuilder<I>, alg: A) -> Self {
        Self {
            backend_builder,
            alg,
            cfg: Config::default(),
            sink: None,
            stop_handle: None,
            _phantom: Default::default(),
        }
    }

    /// Spawn a thread which will perform the CCP execution loop. `run` then
    /// returns a `CCPHandle`, which the caller can use to cause the execution
    /// loop to stop.
    pub fn spawn_thread(self) -> RunBuilder<I, A, Spawn> {
        RunBuilder {
            backend_builder: self.backend_builder,
            alg: self.alg,
            cfg: self.cfg,
            sink: self.sink,
            stop_handle: self.stop_handle,
            _phantom: Default::default(),
        }
    }

    pub fn run(self) -> Result<RuntimeStats> {
        let (h, bb, rt) = self.into_parts()?;
        run_inner(h, bb, rt)
    }
}

impl<I: Ipc, A: GenericCongAvoidAlg, S> RunBuilder<I, A, S> {
    pub fn config(self, cfg: Config) -> Self {
        Self { cfg, ..self }
    }

    /// Where debug-mode events go. Defaults to `TracingSink`.
    pub fn with_sink<D: DiagnosticSink + Send + 'static>(self, sink: D) -> Self {
        Self {
            sink: Some(Box::new(sink)),
            ..self
        }
    }

    /// Pass an `AtomicBool` stop handle. Storing `false` stops the loop.
    pub fn with_stop_handle(self, handle: Arc<atomic::AtomicBool>) -> Self {
        Self {
            stop_handle: Some(handle),
            ..self
        }
    }

    fn into_parts(self) -> Result<(Arc<atomic::AtomicBool>, BackendBuilder<I>, Runtime<A>)> {
        let mut rt = Runtime::new(self.alg, self.cfg)?;
        if let Some(sink) = self.sink {
            rt.sink = sink;
        }

        let h = self
            .stop_handle
            .unwrap_or_else(|| Arc::new(atomic::AtomicBool::new(true)));
        Ok((h, self.backend_builder, rt))
    }
}

impl<I, A> RunBuilder<I, A, Spawn>
where
    I: Ipc,
    A: GenericCongAvoidAlg + Send + 'static,
    A::Flow: Send,
{
    /// Validation happens before the thread is spawned, so an interface error
    /// is returned here rather than from `CCPHandle::wait`.
    pub fn run(self) -> Result<CCPHandle> {
        let (stop_signal, bb, rt) = self.into_parts()?;
        Ok(CCPHandle {
            continue_listening: stop_signal.clone(),
            join_handle: thread::spawn(move || run_inner(stop_signal, bb, rt)),
        })
    }
}

/// Start one independent execution loop per backend. The loops share only the
/// stop flag, so `kill` on any returned handle stops all of them.
pub fn spawn_sharded<I, A>(
    builders: Vec<BackendBuilder<I>>,
    alg: A,
    cfg: Config,
) -> Result<Vec<CCPHandle>>
where
    I: Ipc,
    A: GenericCongAvoidAlg + Clone + Send + 'static,
    A::Flow: Send,
{
    validate(&alg)?;
    let stop = Arc::new(atomic::AtomicBool::new(true));
    builders
        .into_iter()
        .map(|bb| {
            RunBuilder::new(bb, alg.clone())
                .config(cfg.clone())
                .with_stop_handle(Arc::clone(&stop))
                .spawn_thread()
                .run()
        })
        .collect()
}

// Main execution inner loop of ccp.
// Blocks until the backend stops yielding messages, then reports why:
// a requested stop or a closed channel is a clean exit, anything else an error.
fn run_inner<I, A>(
    continue_listening: Arc<atomic::AtomicBool>,
    backend_builder: BackendBuilder<I>,
    mut rt: Runtime<A>,
) -> Result<RuntimeStats>
where
    I: Ipc,
    A: GenericCongAvoidAlg,
{
    let mut b = backend_builder.build(continue_listening);
    let sender = b.sender();
    info!(ipc = %I::name(), alg = rt.alg.name(), "starting CCP");

    let mut send_errors = 0u64;
    while let Some(msg) = b.next() {
        let mut emit = |ins: ControlInstruction| {
            if let Err(e) = sender.send_msg(&ins.serialize()) {
                send_errors += 1;
                warn!(sid = ins.flow_id(), err = %e, "failed to send instruction");
            }
        };

        if let Err(e) = rt.handle_msg(msg, &mut emit) {
            if e.is_fatal() {
                return Err(e);
            }

            debug!(err = %e, "dropped message");
        }
    }

    let flows = rt.flows.len();
    rt.clear();
    let mut stats = rt.stats();
    stats.send_errors = send_errors;
    stats.instructions_sent -= send_errors;
    stats.malformed_frames = b.malformed_frames();

    match b.take_error() {
        None => {
            info!(?stats, flows, "ccp shutting down");
            Ok(stats)
        }
        Some(Error::ChannelClosed) => {
            info!(?stats, flows, "ipc channel closed, ccp shutting down");
            Ok(stats)
        }
        Some(e) => Err(e),
    }
}
