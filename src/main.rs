//! Program entry point: parse input, validate, bind and serve.

use tokio::net::TcpListener;

use http_splitter::config::cli;
use http_splitter::lifecycle::signals;
use http_splitter::observability::logging;
use http_splitter::{Shutdown, SplitterConfig, SplitterServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    // Logging comes up before the full parse so parse warnings land.
    let mut log_flags = cli::peek_log_flags(&args);
    if log_flags.is_empty() {
        log_flags = SplitterConfig::default().log_flags;
    }
    logging::init(&log_flags);

    let config = cli::parse_args(args);

    tracing::info!(
        port = %config.port,
        production = %config.production,
        staging = %config.staging,
        morf_uri = config.morf_uri,
        morf_header = config.morf_header,
        morf_uri_base = %config.morf_uri_base,
        "program input"
    );

    // Profiling stays an external concern; the knobs are accepted so
    // existing config files keep parsing.
    if !config.cpu_profile_filename.is_empty() {
        tracing::warn!(path = %config.cpu_profile_filename, "CPU profiling is handled externally, option ignored");
    }
    if !config.heap_profile_filename.is_empty() {
        tracing::warn!(path = %config.heap_profile_filename, "heap profiling is handled externally, option ignored");
    }

    let server = match SplitterServer::new(&config) {
        Ok(server) => server,
        Err(error) => {
            tracing::error!(%error, "startup failed");
            return Err(error.into());
        }
    };

    let listener = TcpListener::bind(config.bind_address()).await?;
    tracing::info!(address = %listener.local_addr()?, "listening for connections");

    let shutdown = Shutdown::new();
    tokio::spawn(signals::shutdown_on_signal(shutdown.clone()));

    tracing::info!("http-splitter started");
    server.run(listener, &shutdown).await?;

    tracing::info!("program stopped");
    Ok(())
}
