//! # Diffusive CLI Entry Point
//!
//! Main binary for diffusive peers. Starts a peer, or talks to a running one.
//!
//! ## Usage
//!
//! ```bash
//! # Start a peer from a configuration file
//! diffusive serve -c peer.toml
//!
//! # Start a local-only peer on another port
//! diffusive serve -b 0.0.0.0:9000
//!
//! # List the diffusers a peer hosts (outputs raw JSON)
//! diffusive diffusers http://127.0.0.1:8182
//!
//! # Download code bytes
//! diffusive fetch-class http://127.0.0.1:8182/classpath demo.Greeter -o Greeter.class
//! ```
//!
//! ## URL Format
//!
//! All URLs must include the `http://` or `https://` prefix.

use anyhow::Result;
use argh::FromArgs;
use std::net::SocketAddr;
use std::path::PathBuf;

use diffusive_cli::{fetch, serve};
use diffusive_core::code_source::DEFAULT_HOPS;

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// Diffusive - load-aware diffusion of method invocations across peers
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
///
/// - **Serve**: Run a peer
/// - **Diffusers**: List the diffusers of a running peer
/// - **FetchClass**: Download code bytes from a classpath
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Diffusers(DiffusersArgs),
    FetchClass(FetchClassArgs),
}

/// Arguments for starting a peer.
///
/// # Example
///
/// ```bash
/// diffusive serve -c peer.toml -b 0.0.0.0:8182 --advertised-uri http://10.0.0.4:8182
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// start a diffusive peer
struct ServeArgs {
    /// path to the TOML configuration file
    ///
    /// Every setting has a default; without a file the peer is local-only.
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// address to bind the peer's HTTP server to, overriding the file
    #[argh(option, short = 'b')]
    bind: Option<SocketAddr>,

    /// base URI other peers reach this one at, overriding the file
    ///
    /// Must include the http:// or https:// prefix.
    #[argh(option, long = "advertised-uri")]
    advertised_uri: Option<String>,
}

/// Arguments for listing diffusers.
#[derive(FromArgs)]
#[argh(subcommand, name = "diffusers")]
/// list the diffusers hosted by a peer
struct DiffusersArgs {
    /// base URI of the peer (e.g., http://127.0.0.1:8182)
    #[argh(positional)]
    peer: String,
}

/// Arguments for downloading code bytes.
///
/// Writes the raw bytes to stdout unless an output file is given.
#[derive(FromArgs)]
#[argh(subcommand, name = "fetch-class")]
/// download code bytes from a classpath
struct FetchClassArgs {
    /// classpath URI (e.g., http://127.0.0.1:8182/classpath)
    #[argh(positional)]
    class_path: String,

    /// fully-qualified name of the code (e.g., demo.Greeter)
    #[argh(positional)]
    class_name: String,

    /// file to write the bytes to
    #[argh(option, short = 'o')]
    output: Option<PathBuf>,

    /// how many peers the request may be forwarded through
    #[argh(option, default = "DEFAULT_HOPS")]
    hops: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Only serve logs; the other commands keep stdout clean for piping.
    if matches!(cli.command, Commands::Serve(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Serve(args) => {
            let config = serve::resolve_config(args.config.as_deref(), args.bind, args.advertised_uri)?;
            tracing::info!("Starting diffusive peer on {}", config.bind);

            let (listener, config) = serve::bind(config).await?;
            serve::run_serve(listener, config, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for ctrl-c: {}", e);
                    std::future::pending::<()>().await;
                }
                tracing::info!("Shutting down");
            })
            .await
        }
        Commands::Diffusers(args) => {
            println!("{}", fetch::list_diffusers(&args.peer).await?);
            Ok(())
        }
        Commands::FetchClass(args) => {
            let bytes = fetch::fetch_class(&args.class_path, &args.class_name, args.hops).await?;
            fetch::write_output(&bytes, args.output.as_deref())
        }
    }
}
