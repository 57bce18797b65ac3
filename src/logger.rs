use std::io::{IsTerminal, stdout};

use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub fn init_logging(verbose: bool) {
    let level = default_level(verbose, cfg!(debug_assertions));

    let (filter, from_env) = match EnvFilter::try_from_default_env() {
        Ok(f) => (f, true),
        Err(_) => (EnvFilter::new(level), false),
    };

    // Under a service manager the output goes to the journal,
    // which has its own timestamps and no use for colors
    let interactive = stdout().is_terminal();
    let fmt_layer = fmt::layer().with_ansi(interactive);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .init();

    if !from_env {
        info!("\"RUST_LOG\" variable not set, defaulting to {level}");
    }
}

// Level used when RUST_LOG is not set
fn default_level(verbose: bool, debug_build: bool) -> &'static str {
    if debug_build {
        "trace"
    } else if verbose {
        "debug"
    } else {
        "info"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_builds_log_everything() {
        assert_eq!(default_level(false, true), "trace");
        assert_eq!(default_level(true, true), "trace");
        assert_eq!(default_level(true, false), "debug");
        assert_eq!(default_level(false, false), "info");
    }
}
