//! The `gavel` binary: gateway server, chain verifier, key generator,
//! and operator client commands.

mod client;
mod keygen;
mod serve;
mod verify;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use client::GatewayClient;

/// Gavel governance control plane.
#[derive(Parser)]
#[command(name = "gavel", version, about = "Gavel governance control plane")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the governance gateway
    Serve {
        /// Port to listen on
        #[arg(long, default_value_t = 8000)]
        port: u16,
        /// Path to the identities allowlist document
        #[arg(long, default_value = "identities.json")]
        identities: PathBuf,
        /// Append-only ledger file (omit for an in-memory ledger)
        #[arg(long)]
        ledger: Option<PathBuf>,
        /// TLS certificate path (requires the `tls` feature)
        #[arg(long)]
        tls_cert: Option<PathBuf>,
        /// TLS private key path (requires the `tls` feature)
        #[arg(long)]
        tls_key: Option<PathBuf>,
    },

    /// Independently re-verify a ledger file's hash chain
    VerifyChain {
        /// Path to the ledger JSONL file
        ledger: PathBuf,
        /// Only print the summary line
        #[arg(long)]
        quiet: bool,
    },

    /// Generate an operator API key and identities snippet
    Keygen {
        /// Actor id the key is for
        #[arg(default_value = "human:operator")]
        actor_id: String,
    },

    /// Submit a proposal to a running gateway
    Propose {
        /// Gateway base URL
        #[arg(long, default_value = "http://localhost:8000")]
        gateway: String,
        /// Proposing actor id
        #[arg(long)]
        actor: String,
        /// Action category (bash, file_write, ...)
        #[arg(long)]
        action_type: String,
        /// The command or payload to evaluate
        content: String,
        /// Thread this proposal into an existing chain
        #[arg(long)]
        chain: Option<String>,
    },

    /// Approve an escalated proposal (requires an operator key)
    Approve {
        #[arg(long, default_value = "http://localhost:8000")]
        gateway: String,
        /// Operator bearer token
        #[arg(long, env = "GAVEL_API_KEY")]
        token: String,
        intent_event_id: String,
        policy_event_id: String,
    },

    /// Deny an escalated proposal (requires an operator key)
    Deny {
        #[arg(long, default_value = "http://localhost:8000")]
        gateway: String,
        /// Operator bearer token
        #[arg(long, env = "GAVEL_API_KEY")]
        token: String,
        intent_event_id: String,
        policy_event_id: String,
        /// Reason recorded on the denial event
        #[arg(long, default_value = "")]
        reason: String,
    },

    /// Execute an approved proposal in the blast box
    Execute {
        #[arg(long, default_value = "http://localhost:8000")]
        gateway: String,
        /// The intent event id returned by propose
        proposal_id: String,
    },

    /// Show escalation counts by derived state
    Escalations {
        #[arg(long, default_value = "http://localhost:8000")]
        gateway: String,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            identities,
            ledger,
            tls_cert,
            tls_key,
        } => {
            let rt = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");
            if let Err(e) =
                rt.block_on(serve::start_server(port, identities, ledger, tls_cert, tls_key))
            {
                eprintln!("Server error: {}", e);
                process::exit(1);
            }
        }

        Commands::VerifyChain { ledger, quiet } => {
            process::exit(verify::run(&ledger, quiet));
        }

        Commands::Keygen { actor_id } => keygen::run(&actor_id),

        Commands::Propose {
            gateway,
            actor,
            action_type,
            content,
            chain,
        } => {
            let client = GatewayClient::new(&gateway);
            finish(client.propose(&actor, &action_type, &content, chain.as_deref()));
        }

        Commands::Approve {
            gateway,
            token,
            intent_event_id,
            policy_event_id,
        } => {
            let client = GatewayClient::new(&gateway);
            finish(client.approve(&token, &intent_event_id, &policy_event_id));
        }

        Commands::Deny {
            gateway,
            token,
            intent_event_id,
            policy_event_id,
            reason,
        } => {
            let client = GatewayClient::new(&gateway);
            finish(client.deny(&token, &intent_event_id, &policy_event_id, &reason));
        }

        Commands::Execute {
            gateway,
            proposal_id,
        } => {
            let client = GatewayClient::new(&gateway);
            finish(client.execute(&proposal_id));
        }

        Commands::Escalations { gateway } => {
            let client = GatewayClient::new(&gateway);
            finish(client.escalations());
        }
    }
}

/// Print a client result and exit non-zero on transport failure.
fn finish(result: Result<(u16, serde_json::Value), client::ClientError>) {
    match result {
        Ok((status, body)) => client::print_response(status, &body),
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}
