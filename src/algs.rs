//! Helper methods for making algorithm binaries.

use crate::{Config, DEFAULT_SS_THRESH};
use clap::Arg;

/// Install a `tracing-subscriber` fmt subscriber at `info`, or `debug` if `debug` is set.
///
/// Does nothing if a global subscriber is already installed.
pub fn init_logging(debug: bool) {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
}

// Must take a String so that clap::Args::validator will be happy
#[allow(clippy::needless_pass_by_value)]
#[cfg(target_os = "linux")]
/// Platform-dependent validator for ipc mechanisms.
pub fn ipc_valid(v: String) -> std::result::Result<(), String> {
    match v.as_str() {
        "netlink" | "unix" | "char" => Ok(()),
        _ => Err(format!("ipc must be one of (netlink|unix|char): {:?}", v)),
    }
}

// Must take a String so that clap::Args::validator will be happy
#[allow(clippy::needless_pass_by_value)]
#[cfg(not(target_os = "linux"))]
/// Platform-dependent validator for ipc mechanisms.
pub fn ipc_valid(v: String) -> std::result::Result<(), String> {
    match v.as_str() {
        "unix" => Ok(()),
        _ => Err(format!("ipc must be one of (unix): {:?}", v)),
    }
}

#[allow(clippy::needless_pass_by_value)]
fn u32_valid(v: String) -> std::result::Result<(), String> {
    v.parse::<u32>()
        .map(|_| ())
        .map_err(|e| format!("{:?}: {}", v, e))
}

/// Parse the standard command line for an algorithm binary.
/// Returns the configuration and the name of the IPC mechanism.
pub fn make_args<I, T>(name: &str, args: I) -> std::result::Result<(Config, String), clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let ss_thresh_default = format!("{}", DEFAULT_SS_THRESH);
    let matches = clap::App::new(name)
        .version(env!("CARGO_PKG_VERSION"))
        .about("CCP implementation of a congestion avoidance algorithm")
        .arg(
            Arg::with_name("ipc")
                .long("ipc")
                .help("Sets the type of ipc to use: (netlink|unix|char)")
                .default_value("unix")
                .validator(ipc_valid),
        )
        .arg(
            Arg::with_name("init_cwnd")
                .long("init_cwnd")
                .help("Sets the initial congestion window, in bytes. Setting 0 will use datapath default.")
                .default_value("0")
                .validator(u32_valid),
        )
        .arg(
            Arg::with_name("ss_thresh")
                .long("ss_thresh")
                .help("Sets the slow start threshold, in bytes")
                .default_value(&ss_thresh_default)
                .validator(u32_valid),
        )
        .arg(
            Arg::with_name("slow_start")
                .long("slow_start")
                .help("Grow the window by acked bytes until ss_thresh before congestion avoidance"),
        )
        .arg(
            Arg::with_name("compensate_update")
                .long("compensate_update")
                .help("Scale the congestion window update during slow start to compensate for reporting delay"),
        )
        .arg(
            Arg::with_name("deficit_timeout")
                .long("deficit_timeout")
                .takes_value(true)
                .validator(u32_valid)
                .help("Allow one window reduction per loss deficit, clearing the deficit after this many RTTs. \
                       0 never clears it early. Without this flag every loss reduces the window."),
        )
        .arg(
            Arg::with_name("debug")
                .long("debug")
                .help("Log every algorithm call and every instruction sent to the datapath"),
        )
        .get_matches_from_safe(args)?;

    // the validators have already checked these
    let number = |key: &str| -> std::result::Result<u32, clap::Error> {
        matches
            .value_of(key)
            .unwrap_or_default()
            .parse()
            .map_err(|e| clap::Error::with_description(&format!("{}: {}", key, e), clap::ErrorKind::InvalidValue))
    };

    let mut cfg = Config::default()
        .debug(matches.is_present("debug"))
        .init_cwnd(number("init_cwnd")?)
        .use_compensation(matches.is_present("compensate_update"));
    if matches.is_present("deficit_timeout") {
        cfg = cfg.deficit_timeout(number("deficit_timeout")?);
    }

    let ss_thresh = number("ss_thresh")?;
    cfg = if matches.is_present("slow_start") {
        cfg.slow_start(ss_thresh)
    } else {
        Config { ss_thresh, ..cfg }
    };

    Ok((cfg, String::from(matches.value_of("ipc").unwrap_or("unix"))))
}

#[cfg(test)]
mod tests {
    use super::{ipc_valid, make_args};
    use crate::{Config, DEFAULT_SS_THRESH};

    #[test]
    fn ipc_names() {
        assert!(ipc_valid(String::from("unix")).is_ok());
        assert!(ipc_valid(String::from("carrier-pigeon")).is_err());
    }

    #[test]
    fn defaults() {
        let (cfg, ipc) = make_args("test", vec!["gca"]).expect("parse");
        assert_eq!(ipc, "unix");
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.ss_thresh, DEFAULT_SS_THRESH);
    }

    #[test]
    fn all_flags() {
        let (cfg, _) = make_args(
            "test",
            vec![
                "gca",
                "--init_cwnd",
                "14480",
                "--ss_thresh",
                "100000",
                "--slow_start",
                "--compensate_update",
                "--deficit_timeout",
                "2",
                "--debug",
            ],
        )
        .expect("parse");
        assert_eq!(
            cfg,
            Config::default()
                .debug(true)
                .init_cwnd(14480)
                .slow_start(100_000)
                .use_compensation(true)
                .deficit_timeout(2)
        );
    }

    #[test]
    fn bad_number() {
        assert!(make_args("test", vec!["gca", "--init_cwnd", "lots"]).is_err());
    }
}
