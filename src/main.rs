use clap::Parser;
use tracing::{debug, error, info, warn};

#[derive(Parser)]
#[command(version)]
struct Args {
    /// Set config file path
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let cfg = match relayman::config::Config::parse(args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("config error: {:#}", e);
            std::process::exit(1);
        }
    };

    utils::set_log(utils::log_filter(
        &cfg.log.level,
        &["liverelay", "relayman"],
    ));

    warn!("set log level : {}", cfg.log.level);
    debug!("config : {:?}", cfg);

    let listener = match tokio::net::TcpListener::bind(cfg.http.listen).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("bind {} error: {}", cfg.http.listen, e);
            std::process::exit(1);
        }
    };

    relayman::serve(cfg, listener, shutdown_signal()).await;
    info!("Server shutdown");
}

async fn shutdown_signal() {
    let str = signal::wait_for_stop_signal().await;
    debug!("Received signal: {}", str);
}
