//! Diagnostic tracing, compiled in only with the `diagnostics` feature.

/// Installs the terminal logger when diagnostics are enabled.
pub fn init() {
    if cfg!(feature = "diagnostics") {
        install(default_level());
    }
}

/// Logger for unit tests. Safe to call more than once.
#[cfg(test)]
pub fn init_for_tests() {
    install(log::LevelFilter::Debug);
}

fn default_level() -> log::LevelFilter {
    if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    }
}

fn install(level: log::LevelFilter) {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Another test may already have set the global logger.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
