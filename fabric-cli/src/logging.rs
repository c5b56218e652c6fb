//! Terminal logger setup, following `replictl`'s logging module but built on the modern
//! `slog-term` drain directly rather than a hand-rolled level filter.
use slog::Drain;
use slog::Logger;

pub fn configure(level: slog::Level) -> Logger {
    let decorator = slog_term::TermDecorator::new().stdout().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog::LevelFilter::new(drain, level).fuse();
    let drain = std::sync::Mutex::new(drain).fuse();
    Logger::root(drain, slog::o!("app" => "fabric-cli"))
}
