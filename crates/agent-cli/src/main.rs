//! run-agent
//!
//! Runs the client-facing assistant once on a prompt and prints its answer.
//! Logs go to stderr; the answer alone goes to stdout.

use std::process::ExitCode;
use std::time::Duration;

use agent_core::{AgentError, ErrorKind, RunConfig, Runner};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_PROMPT: &str = "Hello, clientId is ABC123";

/// Run the client-facing assistant on a prompt.
#[derive(Parser, Debug)]
#[command(name = "run-agent", version, about)]
struct Cli {
    /// Prompt to send to the agent
    #[arg(default_value = DEFAULT_PROMPT)]
    prompt: String,

    /// Model name, overriding the provider default
    #[arg(long)]
    model: Option<String>,

    /// Maximum model turns per run
    #[arg(long, default_value_t = 10)]
    max_turns: usize,

    /// Maximum agent-as-tool nesting depth
    #[arg(long, default_value_t = 4)]
    max_depth: usize,

    /// Bound on the whole run, in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
}

impl Cli {
    fn run_config(&self) -> RunConfig {
        let mut config = RunConfig::default()
            .max_turns(self.max_turns)
            .max_depth(self.max_depth);
        if let Some(secs) = self.timeout_secs {
            config = config.timeout(Duration::from_secs(secs));
        }
        if let Some(model) = &self.model {
            config = config.model(model.clone());
        }
        config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(&cli).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error[{}]: {e}", e.kind());
            if let Some(rejection) = e.rejection() {
                eprintln!("  guardrail output: {}", rejection.output_info);
            }
            exit_code(&e)
        }
    }
}

async fn run(cli: &Cli) -> agent_core::Result<String> {
    let provider = agent_runtime::global_provider()?;
    let runner = Runner::with_config(provider, cli.run_config());

    tracing::info!("> Running agent with prompt: {}", cli.prompt);

    let result = client_assist::open_agent(&runner, &cli.prompt).await?;
    Ok(result.final_text())
}

fn exit_code(error: &AgentError) -> ExitCode {
    match error.kind() {
        ErrorKind::GuardrailRejected => ExitCode::from(2),
        ErrorKind::ModelBackendError => ExitCode::from(3),
        ErrorKind::ConfigurationError => ExitCode::from(4),
        _ => ExitCode::FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["run-agent"]).unwrap();
        assert_eq!(cli.prompt, DEFAULT_PROMPT);

        let config = cli.run_config();
        assert_eq!(config.max_turns, 10);
        assert_eq!(config.max_depth, 4);
        assert!(config.timeout.is_none());
        assert!(config.model.is_none());
    }

    #[test]
    fn test_flags_override_limits() {
        let cli = Cli::try_parse_from([
            "run-agent",
            "Hi there",
            "--model",
            "openai/gpt-4o",
            "--max-turns",
            "3",
            "--timeout-secs",
            "30",
        ])
        .unwrap();

        let config = cli.run_config();
        assert_eq!(cli.prompt, "Hi there");
        assert_eq!(config.max_turns, 3);
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.model.as_deref(), Some("openai/gpt-4o"));
    }

    #[test]
    fn test_exit_codes() {
        let rejected = AgentError::guardrail_rejected("g", serde_json::Value::Null, Vec::new());
        assert_eq!(exit_code(&rejected), ExitCode::from(2));
        assert_eq!(exit_code(&AgentError::RateLimited("429".into())), ExitCode::from(3));
        assert_eq!(exit_code(&AgentError::Config("no key".into())), ExitCode::from(4));
        assert_eq!(exit_code(&AgentError::MaxTurnsExceeded(10)), ExitCode::FAILURE);
    }
}
