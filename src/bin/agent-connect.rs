//! `agent-connect` — interactive client for a deployed agent runtime.
//!
//! Authenticates once with OAuth2 client credentials, then relays each
//! stdin line to the chosen agent as one invocation.
//!
//! # Usage
//!
//! ```text
//! agent-connect --agent <monitor|websearch|host> [--config <path>]
//!
//! Flags:
//!   --agent, -a <name>    target agent (required)
//!   --config, -f <path>   config file (default: config/default.toml)
//!   --help, -h            print this help
//! ```
//!
//! Runtime ids and credential provider names come from the parameter store
//! (`/{agent}agent/agentcore/runtime-id`, `/{agent}agent/agentcore/provider-name`);
//! client credentials from `OAUTH_CLIENT_ID` / `OAUTH_CLIENT_SECRET`.

use std::io::Write as _;
use std::process;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use a2a_relay::config::{self, PeerConfig};
use a2a_relay::error::AppError;
use a2a_relay::identity::TokenProvider;
use a2a_relay::identity::client_credentials::ClientCredentialsExchange;
use a2a_relay::logger::{self, LogSettings};
use a2a_relay::params::{JsonFileParams, ParameterStore};
use a2a_relay::subsystems::peers::{PeerClient, resolve_target};

const TIMEOUT_SECONDS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Monitor,
    Websearch,
    Host,
}

impl Target {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "monitor" => Some(Self::Monitor),
            "websearch" => Some(Self::Websearch),
            "host" => Some(Self::Host),
            _ => None,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Self::Monitor => "monitoragent",
            Self::Websearch => "websearchagent",
            Self::Host => "hostagent",
        }
    }

    fn peer_config(self) -> PeerConfig {
        let prefix = self.prefix();
        PeerConfig {
            name: prefix.to_string(),
            description: String::new(),
            runtime_id_param: format!("/{prefix}/agentcore/runtime-id"),
            provider_name_param: format!("/{prefix}/agentcore/provider-name"),
        }
    }
}

// ── CLI arg parsing ────────────────────────────────────────────────────────

struct Args {
    agent: Option<String>,
    config_path: Option<String>,
}

fn parse_args() -> Args {
    let mut agent = None;
    let mut config_path = None;
    let mut iter = std::env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--agent" | "-a" => agent = iter.next(),
            "--config" | "-f" => config_path = iter.next(),
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            other => {
                eprintln!("error: unexpected argument '{other}'");
                process::exit(1);
            }
        }
    }

    Args { agent, config_path }
}

fn print_help() {
    eprintln!("usage: agent-connect --agent <monitor|websearch|host> [--config <path>]");
    eprintln!();
    eprintln!("flags:");
    eprintln!("  --agent,  -a <name>   target agent");
    eprintln!("  --config, -f <path>   config file (default: config/default.toml)");
    eprintln!("  --help,   -h          print this help");
    eprintln!();
    eprintln!("type a message and press enter; 'q' or 'quit' exits");
}

// ── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let args = parse_args();

    let target = match args.agent.as_deref().and_then(Target::parse) {
        Some(t) => t,
        None => {
            eprintln!("error: --agent must be one of monitor, websearch, host");
            eprintln!("  run 'agent-connect --help' for usage");
            process::exit(1);
        }
    };

    if let Err(e) = run(target, args.config_path.as_deref()).await {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

async fn run(target: Target, config_path: Option<&str>) -> Result<(), AppError> {
    let config = config::load(config_path)?;
    logger::init(&LogSettings::stderr("warn"))?;

    let oauth = config
        .oauth_client
        .clone()
        .ok_or_else(|| AppError::Config("missing OAUTH_CLIENT_ID / OAUTH_CLIENT_SECRET".into()))?;
    let params: Arc<dyn ParameterStore> = Arc::new(JsonFileParams::open(&config.params.path)?);

    let resolved = resolve_target(&config.peers, &target.peer_config(), params.as_ref())?;
    let exchange = ClientCredentialsExchange::new(oauth, params.clone(), config.identity.timeout_seconds)?;
    let tokens = Arc::new(TokenProvider::new(Arc::new(exchange), None));

    let session_id = Uuid::new_v4().to_string();
    let client = PeerClient::new(resolved, tokens, &session_id, TIMEOUT_SECONDS)?;

    // Authenticate up front so credential problems surface before the prompt.
    let card_name = match target {
        Target::Host => {
            client.warm_token().await?;
            None
        }
        Target::Monitor | Target::Websearch => {
            let card = client.card().await?;
            let pretty = serde_json::to_string_pretty(card)
                .map_err(|e| AppError::Internal(format!("card serialisation: {e}")))?;
            println!("{pretty}");
            Some(card.name.clone())
        }
    };

    println!("session: {session_id}");
    println!(
        "connected to {} — type 'q' or 'quit' to exit",
        card_name.as_deref().unwrap_or(target.prefix())
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> ");
        let _ = std::io::stdout().flush();

        let Some(line) = lines.next_line().await? else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "q" || line == "quit" {
            break;
        }

        match target {
            Target::Host => {
                let res = client
                    .invoke_stream(line, |fragment| {
                        print!("{fragment}");
                        let _ = std::io::stdout().flush();
                    })
                    .await;
                println!();
                if let Err(e) = res {
                    eprintln!("error: {e}");
                }
            }
            Target::Monitor | Target::Websearch => match client.send_message(line).await {
                Ok(text) => println!("{text}"),
                Err(e) => eprintln!("error: {e}"),
            },
        }
    }

    println!("bye");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_map_to_parameter_paths() {
        let cfg = Target::parse("websearch").unwrap().peer_config();
        assert_eq!(cfg.runtime_id_param, "/websearchagent/agentcore/runtime-id");
        assert_eq!(cfg.provider_name_param, "/websearchagent/agentcore/provider-name");
        assert!(Target::parse("other").is_none());
    }
}
