//! byond-topic: query and listen to BYOND world-topic servers
//!
//! Usage:
//!   byond-topic status                       # Server status summary
//!   byond-topic query whoIs                  # Any topic verb
//!   byond-topic query adminmsg -p msg=hi --auth
//!   byond-topic identify <uuid>              # Resolve an account identifier
//!   byond-topic listen                       # Receive pushes from the server
//!   byond-topic poll                         # Periodic status lines

mod settings;

use anyhow::{Context, Result};
use async_trait::async_trait;
use byond_topic_client::{HealthPoller, PollerExit, QueryClient, TopicSink};
use byond_topic_core::{ProtocolVersion, TopicError, TopicRequest};
use byond_topic_listener::{EventListener, LogSink, NotificationSink, RoundEvent};
use clap::{Parser, Subcommand};
use settings::Settings;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(
    name = "byond-topic",
    about = "Query and listen to BYOND world-topic servers"
)]
struct Cli {
    /// Path to settings file
    #[arg(short, long, default_value = "byond-topic.toml")]
    config: PathBuf,

    /// Override the game server host
    #[arg(long)]
    host: Option<String>,

    /// Override the game server topic port
    #[arg(long)]
    port: Option<u16>,

    /// Use the JSON topic format instead of the configured one
    #[arg(long, conflicts_with = "legacy")]
    modern: bool,

    /// Use the query-string topic format instead of the configured one
    #[arg(long)]
    legacy: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the server status
    Status,
    /// Send an arbitrary topic query
    Query {
        /// Topic verb, e.g. whoIs or getAdmins
        verb: String,
        /// Extra parameters as name=value or bare flags
        #[arg(short, long = "param")]
        params: Vec<String>,
        /// Attach the comms key
        #[arg(long)]
        auth: bool,
    },
    /// Resolve an in-game account identifier to a ckey
    Identify { uuid: String },
    /// Listen for pushes from the game server
    Listen {
        /// Override the listen port
        #[arg(long)]
        listen_port: Option<u16>,
        /// Print events as JSON lines instead of logging them
        #[arg(long)]
        json: bool,
    },
    /// Poll the server status on a timer
    Poll,
}

/// Prints each event as a JSON line on stdout
struct JsonSink;

#[async_trait]
impl NotificationSink for JsonSink {
    async fn dispatch(&self, event: RoundEvent) -> byond_topic_core::Result<()> {
        println!("{}", serde_json::to_string(&event)?);
        Ok(())
    }
}

/// Logs status lines in place of a chat topic
struct LogTopicSink;

#[async_trait]
impl TopicSink for LogTopicSink {
    async fn update_topic(&self, line: String) -> byond_topic_core::Result<()> {
        info!("Topic: {}", line);
        Ok(())
    }

    async fn report_fatal(&self, message: String) {
        error!("{}", message);
    }
}

/// Turn a topic failure into an operator-facing message
fn explain(err: TopicError) -> anyhow::Error {
    if err.is_protocol_mismatch() {
        anyhow::anyhow!(
            "{}. The server may expect the other topic format; try --modern or --legacy.",
            err
        )
    } else if err.is_offline() {
        anyhow::anyhow!("Game server appears to be offline: {}", err)
    } else {
        err.into()
    }
}

fn build_request(verb: String, params: Vec<String>, auth: bool) -> TopicRequest {
    let mut request = TopicRequest::new(verb);
    if auth {
        request = request.authenticated();
    }
    for param in params {
        request = match param.split_once('=') {
            Some((name, value)) => request.param(name, value),
            None => request.flag(param),
        };
    }
    request
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("byond_topic=info,byond_topic_client=info,byond_topic_listener=info")
    });
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let mut settings = Settings::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    if let Some(host) = cli.host {
        settings.server.host = host;
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if cli.modern {
        settings.server.protocol = ProtocolVersion::Modern;
    } else if cli.legacy {
        settings.server.protocol = ProtocolVersion::Legacy;
    }

    match cli.command {
        Commands::Status => {
            let client = QueryClient::new(settings.server);
            let status = client.status().await.map_err(explain)?;
            println!("{}", status.topic_line());
            if let Some(version) = &status.version {
                println!("Version: {}", version);
            }
            if let Some(mode) = &status.mode {
                println!("Mode: {}", mode);
            }
        }
        Commands::Query { verb, params, auth } => {
            let client = QueryClient::new(settings.server);
            let request = build_request(verb, params, auth);
            let response = client.query(&request).await.map_err(explain)?;
            for (key, value) in response.iter() {
                println!("{}={}", key, value);
            }
        }
        Commands::Identify { uuid } => {
            let client = QueryClient::new(settings.server);
            match client.identify_uuid(&uuid).await.map_err(explain)? {
                Some(ckey) => println!("{}", ckey),
                None => anyhow::bail!("Identifier {} is not known to the server", uuid),
            }
        }
        Commands::Listen { listen_port, json } => {
            if let Some(port) = listen_port {
                settings.listener.port = port;
            }
            let sink: Arc<dyn NotificationSink> = if json {
                Arc::new(JsonSink)
            } else {
                Arc::new(LogSink)
            };

            let handle = EventListener::new(settings.listener, sink).start().await?;
            info!(
                "Waiting for pushes on {} (Ctrl-C to stop)",
                handle.local_addr()
            );

            tokio::signal::ctrl_c().await?;
            handle.stop().await;
        }
        Commands::Poll => {
            settings.server.validate()?;
            let client = Arc::new(QueryClient::new(settings.server));
            let mut handle =
                HealthPoller::new(client, Arc::new(LogTopicSink), settings.poller).spawn();

            let exit = tokio::select! {
                exit = handle.wait() => exit,
                _ = tokio::signal::ctrl_c() => handle.stop().await,
            };

            match exit {
                PollerExit::Stopped => {}
                PollerExit::Disabled {
                    failures,
                    last_error,
                } => anyhow::bail!(
                    "Polling disabled after {} failures (last: {})",
                    failures,
                    last_error
                ),
                PollerExit::Crashed(reason) => anyhow::bail!("Status poller crashed: {}", reason),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request() {
        let request = build_request(
            "adminmsg".into(),
            vec!["msg=hello".into(), "sender=bot".into(), "urgent".into()],
            true,
        );

        assert_eq!(request.query(), "adminmsg");
        assert!(request.is_authenticated());
        assert_eq!(
            request.params(),
            &[
                ("msg".to_string(), Some("hello".to_string())),
                ("sender".to_string(), Some("bot".to_string())),
                ("urgent".to_string(), None),
            ]
        );
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["byond-topic", "--modern", "query", "whoIs", "-p", "a=1"])
            .unwrap();
        assert!(cli.modern);
        match cli.command {
            Commands::Query { verb, params, auth } => {
                assert_eq!(verb, "whoIs");
                assert_eq!(params, vec!["a=1"]);
                assert!(!auth);
            }
            _ => panic!("Wrong command"),
        }
    }

    #[test]
    fn test_explain_mismatch_suggests_toggle() {
        let err = explain(TopicError::ProtocolMismatch("no data".into()));
        assert!(err.to_string().contains("--modern or --legacy"));
    }
}
