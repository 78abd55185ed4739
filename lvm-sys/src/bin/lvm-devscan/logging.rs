// SPDX-License-Identifier: GPL-3.0-only

use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const LOG_PREFIX: &str = "lvm-devscan.log";

/// Log to stderr, and to a daily-rolling file under `log_dir` when given.
///
/// The returned guard must be held until exit or buffered file output is lost.
pub(crate) fn init(verbose: bool, log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let default_directive = if verbose {
        "lvm_sys=debug,warn"
    } else {
        "lvm_sys=info,warn"
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir).map_err(|e| {
                anyhow::anyhow!("create log directory failed: {} ({e})", dir.display())
            })?;
            let appender = tracing_appender::rolling::daily(dir, LOG_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}
