//! The `docgate` binary.

use std::path::PathBuf;

use docgate_config::{ConfigLoader, GatewayConfig};
use docgate_server::{Gateway, Server, ServerError};
use tracing::{error, info};

/// Command-line arguments.
struct Args {
    /// Path to the configuration file.
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => match args.next() {
                    Some(path) => config = Some(PathBuf::from(path)),
                    None => {
                        eprintln!("--config requires a path");
                        std::process::exit(1);
                    }
                },
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("docgate {}", env!("CARGO_PKG_VERSION"));
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        Self { config }
    }
}

fn print_help() {
    println!(
        r"docgate - REST and GraphQL gateway for document stores

USAGE:
    docgate [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    Any setting can be overridden with DOCGATE__<SECTION>__<KEY>, e.g.
    DOCGATE__SERVER__HTTP_ADDR=0.0.0.0:9000
    DOCGATE__LOGGING__LEVEL=debug
    A .env file in the working directory is loaded first.

EXAMPLES:
    docgate --config /etc/docgate/docgate.toml
"
    );
}

fn load_config(path: Option<&PathBuf>) -> Result<GatewayConfig, ServerError> {
    let mut loader = ConfigLoader::new().with_dotenv().with_defaults();
    if let Some(path) = path {
        loader = loader.with_file(path)?;
    }
    Ok(loader.with_env_prefix("DOCGATE").load()?)
}

async fn run(args: Args) -> Result<(), ServerError> {
    let config = load_config(args.config.as_ref())?;
    docgate_telemetry::init_telemetry(&config)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?args.config,
        addr = %config.server.http_addr,
        "Starting docgate"
    );

    let gateway = Gateway::new(config)?;
    Server::new(gateway).run().await
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        // Logging may not be initialized yet.
        eprintln!("docgate: {e}");
        error!(error = %e, "docgate failed");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[graphql]\nenabled = false\n\n[ping]\nmount = \"/health\"\nmessage = \"up\""
        )
        .unwrap();

        let config = load_config(Some(&file.path().to_path_buf())).unwrap();
        assert!(!config.graphql.enabled);
        assert_eq!(config.ping.message, "up");

        let gateway = Gateway::new(config).unwrap();
        let prefixes: Vec<_> = gateway.mounts().iter().map(|mount| mount.prefix().to_string()).collect();
        assert_eq!(prefixes, ["/health", "/"]);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config(Some(&PathBuf::from("/nonexistent/docgate.toml")));
        assert!(matches!(result, Err(ServerError::Config(_))));
    }
}
