//! Entry point for `handshake-echo`.
//!
//! `server` listens and echoes; `client` connects and feeds stdin lines
//! through the session.  Protocol work lives in the library.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::io::BufReader;

use handshake_echo::config::{DEFAULT_BACKLOG, DEFAULT_BUFSIZE, DEFAULT_MAX_CLIENTS};
use handshake_echo::{ClientConfig, RetryPolicy, Server, ServerConfig, Session};

/// Three-way handshake and confirmed echo delivery over TCP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Run the echo server.
    Server {
        /// Local address to listen on.
        #[arg(short, long, default_value = "0.0.0.0:8888")]
        bind: SocketAddr,
        /// Listen backlog.
        #[arg(long, default_value_t = DEFAULT_BACKLOG)]
        backlog: u32,
        /// Maximum concurrent clients; extra connections are rejected.
        #[arg(long, default_value_t = DEFAULT_MAX_CLIENTS)]
        max_clients: usize,
        #[command(flatten)]
        timing: Timing,
    },
    /// Connect to a server and echo lines read from stdin.
    Client {
        /// Remote server address.
        #[arg(short, long, default_value = "127.0.0.1:8888")]
        server: SocketAddr,
        /// Data slot size to propose during the handshake.
        #[arg(long, default_value_t = DEFAULT_BUFSIZE)]
        bufsize: u16,
        #[command(flatten)]
        timing: Timing,
    },
}

#[derive(Args)]
struct Timing {
    /// Delay before each retransmission, in milliseconds.
    #[arg(long, default_value_t = 5000)]
    retry_delay_ms: u64,
    /// Give up on a silent peer after this many milliseconds (default: wait forever).
    #[arg(long)]
    read_timeout_ms: Option<u64>,
}

impl Timing {
    fn retry(&self) -> RetryPolicy {
        RetryPolicy::with_delay(Duration::from_millis(self.retry_delay_ms))
    }

    fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Server {
            bind,
            backlog,
            max_clients,
            timing,
        } => {
            let config = ServerConfig {
                bind,
                backlog,
                max_clients,
                retry: timing.retry(),
                read_timeout: timing.read_timeout(),
                ..ServerConfig::default()
            };
            let server = Server::bind(config)
                .await
                .with_context(|| format!("failed to listen on {bind}"))?;
            log::info!("*** waiting for connections on {} ***", server.local_addr()?);

            server
                .run_until(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        log::error!("failed to install Ctrl-C handler: {e}");
                        std::future::pending::<()>().await;
                    }
                })
                .await
                .context("accept loop failed")?;
        }
        Mode::Client {
            server,
            bufsize,
            timing,
        } => {
            let config = ClientConfig {
                server,
                bufsize,
                retry: timing.retry(),
                read_timeout: timing.read_timeout(),
            };
            let mut session = Session::connect(&config)
                .await
                .with_context(|| format!("could not establish a connection with {server}"))?;
            log::info!("Starting client session with {server}");

            let stdin = BufReader::new(tokio::io::stdin());
            let mut stdout = tokio::io::stdout();
            session
                .run(stdin, &mut stdout)
                .await
                .context("session terminated")?;
            session.close().await?;
        }
    }

    Ok(())
}
