//! Read-only dashboard over a `voxseg` log directory.
//!
//! Run with:
//!   cargo run --bin board -- --logdir runs
//! Then open http://127.0.0.1:6006
//!
//! Served by a synchronous tiny_http server, one thread per request.

mod form;
mod render;
mod routes;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tiny_http::Server;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "board")]
#[command(about = "Browse scalar and image logs written by voxseg")]
#[command(version)]
struct Args {
    /// Directory holding one sub-directory per training run
    #[arg(short = 'l', long, default_value = "runs")]
    logdir: PathBuf,

    /// Address to listen on
    #[arg(short = 'a', long, default_value = "127.0.0.1:6006")]
    addr: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let server = match Server::http(&args.addr) {
        Ok(server) => server,
        Err(e) => {
            error!(addr = %args.addr, "failed to bind HTTP server: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!(addr = %args.addr, logdir = %args.logdir.display(), "board listening");

    let logdir = Arc::new(args.logdir);
    for request in server.incoming_requests() {
        let logdir = Arc::clone(&logdir);
        std::thread::spawn(move || routes::dispatch(request, &logdir));
    }
    ExitCode::SUCCESS
}
