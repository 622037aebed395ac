//! Runtime configuration. Built once, before `start`, and never mutated afterwards.

pub const DEFAULT_SS_THRESH: u32 = 0x7fff_ffff;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Surface every dispatched call and emitted instruction to the diagnostic sink.
    pub debug: bool,
    /// Initial congestion window in bytes. 0 uses the datapath's value.
    pub init_cwnd: u32,
    /// Let the runtime grow the window by acked bytes until `ss_thresh` before
    /// handing the remainder to the algorithm's `increase`.
    pub slow_start: bool,
    /// Slow start threshold in bytes.
    pub ss_thresh: u32,
    /// During slow start, grow by `acked / ln 2` instead of `acked` to make up for
    /// the delay between datapath reports.
    pub use_compensation: bool,
    /// Count lost and sacked packets as a deficit and allow one reduction per
    /// deficit. `Some(n)` also clears the deficit `n` RTTs after the last
    /// reduction; `Some(0)` never clears it early. `None` reduces on every loss.
    pub deficit_timeout: Option<u32>,
    /// The window is never left below this many segments.
    pub min_cwnd_segments: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            debug: false,
            init_cwnd: 0,
            slow_start: false,
            ss_thresh: DEFAULT_SS_THRESH,
            use_compensation: false,
            deficit_timeout: None,
            min_cwnd_segments: 1,
        }
    }
}

impl Config {
    pub fn debug(self, debug: bool) -> Self {
        Config { debug, ..self }
    }

    pub fn init_cwnd(self, init_cwnd: u32) -> Self {
        Config { init_cwnd, ..self }
    }

    /// Enable runtime slow start up to `ss_thresh` bytes.
    pub fn slow_start(self, ss_thresh: u32) -> Self {
        Config {
            slow_start: true,
            ss_thresh,
            ..self
        }
    }

    pub fn use_compensation(self, use_compensation: bool) -> Self {
        Config {
            use_compensation,
            ..self
        }
    }

    /// Gate reductions on the loss deficit, clearing it after `rtts` round trips.
    pub fn deficit_timeout(self, rtts: u32) -> Self {
        Config {
            deficit_timeout: Some(rtts),
            ..self
        }
    }

    pub fn min_cwnd_segments(self, min_cwnd_segments: u32) -> Self {
        Config {
            min_cwnd_segments,
            ..self
        }
    }

    /// The smallest window, in bytes, for a flow with the given MSS.
    pub fn cwnd_floor(&self, mss: u32) -> u32 {
        self.min_cwnd_segments.saturating_mul(mss)
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, DEFAULT_SS_THRESH};

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert!(!cfg.debug);
        assert!(!cfg.slow_start);
        assert_eq!(cfg.init_cwnd, 0);
        assert_eq!(cfg.ss_thresh, DEFAULT_SS_THRESH);
        assert!(!cfg.use_compensation);
        assert_eq!(cfg.deficit_timeout, None);
        assert_eq!(cfg.cwnd_floor(1448), 1448);
    }

    #[test]
    fn builder() {
        let cfg = Config::default()
            .debug(true)
            .init_cwnd(14480)
            .slow_start(100_000)
            .use_compensation(true)
            .deficit_timeout(2)
            .min_cwnd_segments(2);
        assert!(cfg.debug);
        assert!(cfg.slow_start);
        assert_eq!(cfg.init_cwnd, 14480);
        assert_eq!(cfg.ss_thresh, 100_000);
        assert!(cfg.use_compensation);
        assert_eq!(cfg.deficit_timeout, Some(2));
        assert_eq!(cfg.cwnd_floor(1000), 2000);
        assert_eq!(cfg.cwnd_floor(u32::MAX), u32::MAX);
    }
}
