//! Code supporting the `server run` sub command.

pub mod rest;

use std::sync::Arc;

use actix_web::web::Data;
use clap::Parser;
use tracing::info;

use crate::store::Store;

/// Data shared between the actix handlers.
pub struct WebServerData {
    /// Read-only handle to the store.
    pub store: Arc<Store>,
    /// Maximum number of concurrent pairwise computations per fan-out.
    pub pairwise_concurrency: usize,
}

/// Command line arguments for `server run` sub command.
#[derive(Parser, Debug)]
#[command(author, version, about = "Run the query services REST server", long_about = None)]
pub struct Args {
    /// Path to the RocksDB store to serve from.
    #[arg(long, env = "STORE_PATH", required = true)]
    pub path_db: String,
    /// IP to listen on.
    #[arg(long, env = "HTTP_HOST", default_value = "127.0.0.1")]
    pub listen_host: String,
    /// Port to listen on.
    #[arg(long, env = "HTTP_PORT", default_value_t = 8080)]
    pub listen_port: u16,
    /// Maximum number of concurrent pairwise computations per macro
    /// synteny fan-out.
    #[arg(long, env = "PAIRWISE_CONCURRENCY", default_value_t = 8)]
    pub pairwise_concurrency: usize,
}

/// Main entry point for `server run` sub command.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    info!("args_common = {:?}", &args_common);
    info!("args = {:?}", &args);

    info!("opening store at {}", args.path_db);
    let store = Store::open_read_only(&args.path_db)?;
    store.check_schema_version()?;

    let data = Data::new(WebServerData {
        store: Arc::new(store),
        pairwise_concurrency: args.pairwise_concurrency,
    });

    info!("launching server at http://{}:{}", args.listen_host, args.listen_port);
    rest::main(args, data)?;

    info!("All done. Have a nice day!");
    Ok(())
}
