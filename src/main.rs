//! dmcc - DMCC sample client
//!
//! Opens a TLS session to an AES server and runs CSTA XML requests over it.

mod config;
mod messages;
mod session;

use clap::{Parser, Subcommand};
use colored::Colorize;
use config::Config;
use dmcc_client::Client;
use dmcc_protocol::InvokeId;
use session::Exchange;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dmcc")]
#[command(about = "Sample DMCC client: CSTA XML over TLS")]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, env = "DMCC_CONFIG")]
    config: Option<PathBuf>,

    /// AES server host
    #[arg(long)]
    host: Option<String>,

    /// AES server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Name checked against the server certificate (defaults to host)
    #[arg(long)]
    server_name: Option<String>,

    /// CA certificate (PEM) used instead of the built-in roots
    #[arg(long)]
    ca_cert: Option<PathBuf>,

    /// Client certificate (PEM) for mutual TLS
    #[arg(long, requires = "client_key")]
    client_cert: Option<PathBuf>,

    /// Client private key (PEM) for mutual TLS
    #[arg(long, requires = "client_cert")]
    client_key: Option<PathBuf>,

    /// Seconds to wait for each response
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Debug logging (prints request and response bodies)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sample session (default)
    Session {
        /// Switch connection name
        #[arg(long)]
        switch_conn_name: Option<String>,

        /// Switch name or IP address
        #[arg(long)]
        switch_name: Option<String>,

        /// Station extension
        #[arg(short, long)]
        extension: Option<String>,

        /// StartApplicationSession XML template
        #[arg(long)]
        template: Option<PathBuf>,
    },

    /// Send one XML request and print its response
    Send {
        /// Four-byte invoke id
        #[arg(short, long, default_value = "0001")]
        id: InvokeId,

        /// File holding the request body
        #[arg(short, long)]
        file: PathBuf,
    },
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(ref host) = self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(ref name) = self.server_name {
            config.server.server_name = Some(name.clone());
        }
        if let Some(ref path) = self.ca_cert {
            config.tls.ca_cert = Some(path.clone());
        }
        if let Some(ref path) = self.client_cert {
            config.tls.client_cert = Some(path.clone());
        }
        if let Some(ref path) = self.client_key {
            config.tls.client_key = Some(path.clone());
        }
        if let Some(secs) = self.timeout {
            config.session.response_timeout_secs = secs;
        }

        if let Some(Commands::Session {
            switch_conn_name,
            switch_name,
            extension,
            template,
        }) = &self.command
        {
            if let Some(v) = switch_conn_name {
                config.switch.switch_conn_name = v.clone();
            }
            if let Some(v) = switch_name {
                config.switch.switch_name = v.clone();
            }
            if let Some(v) = extension {
                config.switch.extension = v.clone();
            }
            if let Some(v) = template {
                config.session.app_session_template = v.clone();
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_thread_names(true)
        .init();

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(c) => {
            if let Some(ref path) = cli.config {
                tracing::info!("Loaded config from {}", path.display());
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };
    cli.apply(&mut config);

    if let Err(e) = config.validate() {
        tracing::error!("Configuration error: {}", e);
        return Err(e.into());
    }

    tracing::info!("Starting dmcc client");
    tracing::info!("  Server: {}:{}", config.server.host, config.server.port);
    match config.tls.ca_cert {
        Some(ref path) => tracing::info!("  CA: {}", path.display()),
        None => tracing::info!("  CA: built-in web PKI roots"),
    }
    if config.tls.client_cert.is_some() {
        tracing::info!("  mTLS: enabled");
    }

    let client = Client::open(config.connection_config())
        .await
        .map_err(|e| {
            eprintln!("{}: {}", "Connection failed".red(), e);
            e
        })?;

    let result = match cli.command {
        Some(Commands::Send { id, ref file }) => {
            send_file(&client, id, file, config.session.response_timeout()).await
        }
        Some(Commands::Session { .. }) | None => session::run(&client, &config)
            .await
            .map(|exchanges| exchanges.iter().for_each(print_exchange)),
    };

    if let Err(e) = client.shutdown().await {
        tracing::warn!("Shutdown error: {}", e);
    }

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red(), e);
        return Err(e.into());
    }
    Ok(())
}

async fn send_file(
    client: &Client,
    id: InvokeId,
    file: &std::path::Path,
    timeout: std::time::Duration,
) -> Result<(), session::SessionError> {
    let payload = messages::load_template(file)
        .map_err(|e| session::SessionError::Template(file.to_path_buf(), e))?;
    let exchange = session::exchange(client, "Request", id, &payload, timeout).await?;
    print_exchange(&exchange);
    Ok(())
}

fn print_exchange(exchange: &Exchange) {
    match exchange.response {
        Some(ref body) => {
            println!(
                "{} {} [{}]",
                "OK".green(),
                exchange.name.cyan(),
                exchange.invoke_id
            );
            println!("{}", body);
        }
        None => println!(
            "{} {} [{}]",
            "NO RESPONSE".yellow(),
            exchange.name.cyan(),
            exchange.invoke_id
        ),
    }
}
