use std::io::IsTerminal;

use tracing_subscriber::EnvFilter;

/// Log to stderr. Output redirection swaps fd 2 later, so lines follow it into the log file.
pub fn init(filter: &str) {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .try_init();
}
