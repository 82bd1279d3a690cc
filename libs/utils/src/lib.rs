use std::env;
use tracing_subscriber::EnvFilter;

/// Build the default filter, every crate of the relay at `level`,
/// the HTTP stack one step quieter unless debugging.
pub fn log_filter(level: &str, crates: &[&str]) -> String {
    let mut directives: Vec<String> = crates.iter().map(|c| format!("{c}={level}")).collect();
    let http = if level.eq_ignore_ascii_case("debug") || level.eq_ignore_ascii_case("trace") {
        level
    } else {
        "warn"
    };
    directives.push(format!("tower_http={http}"));
    directives.join(",")
}

/// `RUST_LOG` wins over `env_filter` when it is set
pub fn set_log(env_filter: String) {
    let _ = env::var("RUST_LOG").is_err_and(|_| {
        env::set_var("RUST_LOG", env_filter);
        true
    });
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(true)
        .init();
}
