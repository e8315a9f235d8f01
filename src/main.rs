use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use minitftp::tftp::client::{download, ClientConfig};
use minitftp::tftp::server::{ServerConfig, TFTPServer};
use minitftp::tftp::store::DirStore;

/// This doc string acts as a help message when the user runs '--help'
/// as do all doc strings on fields
#[derive(Parser, Debug)]
#[command(version, about)]
struct Opts {
    #[command(subcommand)]
    subcmd: SubCommand,
}

#[derive(Subcommand, Debug)]
enum SubCommand {
    /// act as a client and download one file.
    Client(ClientOperations),
    /// act as a server.
    Server(ServerArgs),
}

#[derive(Args, Debug)]
struct ServerArgs {
    /// IP for the server to use.
    #[arg(short = 'a', long = "address", default_value = "0.0.0.0")]
    address: String,
    /// UDP port that the server will listen on, 0 picks any free port.
    #[arg(short = 'p', long = "port", default_value_t = 0)]
    port: u16,
    /// Directory the served files are read from.
    #[arg(short = 'r', long = "root", default_value = ".")]
    root: PathBuf,
    /// How long to wait for each ACK, in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 1000)]
    timeout_ms: u64,
    /// Transmissions of a block before giving up on a client.
    #[arg(long = "max-attempts", default_value_t = 5)]
    max_attempts: u32,
}

#[derive(Args, Debug)]
struct ClientOperations {
    /// name of the file to be downloaded.
    filename: String,
    /// Server address
    #[arg(short = 'a', long = "address", default_value = "127.0.0.1")]
    address: String,
    /// Server port
    #[arg(short = 'p', long = "port", default_value_t = 69)]
    port: u16,
    /// Where to write the file, defaults to "rx-<filename>".
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,
    /// How long to wait for each block, in seconds.
    #[arg(long = "timeout-secs", default_value_t = 6)]
    timeout_secs: u64,
}

fn resolve(address: &str, port: u16) -> Result<SocketAddr> {
    (address, port)
        .to_socket_addrs()
        .with_context(|| format!("failed to resolve {}:{}", address, port))?
        .next()
        .ok_or_else(|| anyhow!("no address found for {}", address))
}

/// Where a download lands: the explicit output, or "rx-<filename>".
fn output_path(filename: &str, output: Option<PathBuf>) -> PathBuf {
    match output {
        Some(path) => path,
        None => PathBuf::from(format!("rx-{}", filename)),
    }
}

async fn run_client(args: ClientOperations) -> Result<()> {
    let server = resolve(&args.address, args.port)?;
    let filename = args.filename;
    let output = output_path(&filename, args.output);
    info!("[DOWNLOAD] FILE: ({}) SERVER: {} -> {}", filename, server, output.display());

    let mut sink = async_std::fs::File::create(&output)
        .await
        .with_context(|| format!("failed to create {}", output.display()))?;
    let config = ClientConfig {
        timeout: Duration::from_secs(args.timeout_secs),
    };
    download(server, &filename, &mut sink, &config)
        .await
        .with_context(|| format!("failed to download {} from {}", filename, server))?;
    Ok(())
}

async fn run_server(args: ServerArgs) -> Result<()> {
    let bind = resolve(&args.address, args.port)?;
    let store = DirStore::new(args.root);
    let config = ServerConfig {
        timeout: Duration::from_millis(args.timeout_ms),
        max_attempts: args.max_attempts,
    };

    info!("serving files from {}", store.root().display());
    let server = TFTPServer::bind(bind, store, config)
        .await
        .with_context(|| format!("failed to bind {}", bind))?
        .spawn()
        .context("failed to start the dispatcher")?;
    info!(port = server.local_addr().port(), "TFTP server listening");

    server.join().await.context("listening socket failed")?;
    Ok(())
}

#[async_std::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let opts: Opts = Opts::parse();
    let result = match opts.subcmd {
        SubCommand::Client(client_args) => run_client(client_args).await,
        SubCommand::Server(server_args) => run_server(server_args).await,
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
