use env_logger::{Builder, Env, Target};
use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

/// Engine start reference; log lines are stamped with the monotonic offset
/// from it.
static STARTED: OnceLock<Instant> = OnceLock::new();

const LOG_FILTER_VAR: &str = "PUSHTOHOLD_LOG";

/// Initialize logging for the shell hosting the engine.
///
/// The filter comes from `PUSHTOHOLD_LOG` (default `info`; set it to
/// `debug` to watch individual samples and watcher events). Each line
/// carries the seconds since engine startup on a monotonic clock, which is
/// what makes press-to-capture latency readable straight off a log: the
/// press line and the "recording started" line are on the same timescale
/// as the slow-start threshold.
pub fn init() {
    let started = *STARTED.get_or_init(Instant::now);

    Builder::from_env(Env::new().filter_or(LOG_FILTER_VAR, "info"))
        .target(Target::Stdout)
        .format(move |buf, record| {
            writeln!(
                buf,
                "[{:>10.3}s] {:<5} {} {}",
                started.elapsed().as_secs_f64(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
