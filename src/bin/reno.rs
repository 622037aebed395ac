use generic_cong_avoid::reno::Reno;
use tracing::{info, warn};

fn main() {
    let (cfg, ipc) = match generic_cong_avoid::algs::make_args("CCP Reno", std::env::args_os()) {
        Ok(parsed) => parsed,
        Err(e) => e.exit(),
    };

    generic_cong_avoid::algs::init_logging(cfg.debug);
    info!(
        algorithm = "Reno",
        ipc = %ipc,
        init_cwnd = cfg.init_cwnd,
        ss_thresh = cfg.ss_thresh,
        slow_start = cfg.slow_start,
        "starting CCP"
    );

    match generic_cong_avoid::start(ipc.as_str(), Reno, cfg) {
        Ok(stats) => info!(?stats, "exited"),
        Err(e) => {
            warn!(err = %e, "ccp exited with error");
            std::process::exit(1);
        }
    }
}
