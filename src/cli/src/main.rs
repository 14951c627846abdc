use anyhow::{Context, Result};
use application::{Collaborators, ExecutionOutcome, Session, SessionOptions};
use clap::Parser;
use colored::Colorize;
use domain::events::EventSink;
use domain::services::{AutoApprove, ConfirmationGate};
use infrastructure::history::{history_path, load_recent_commands};
use infrastructure::{
    Config, OpenAiClient, OutputMode, Prompts, ShellExecutor, SystemContext, ToolRegistry,
};
use presentation::cli::command_line;
use presentation::{spawn_abort_listener, Cli, Renderer, TerminalConfirmation, ZSH_INIT_SCRIPT};
use shared::AbortSignal;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const EXIT_ERROR: i32 = 1;
const EXIT_ABORTED: i32 = 130;

fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_code(outcome: ExecutionOutcome) -> i32 {
    match outcome {
        ExecutionOutcome::Completed | ExecutionOutcome::NothingToRun | ExecutionOutcome::Declined => 0,
        ExecutionOutcome::Aborted => EXIT_ABORTED,
        ExecutionOutcome::RecoveryStopped | ExecutionOutcome::RecoveryExhausted => EXIT_ERROR,
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    if let Some(attempts) = cli.max_recovery {
        config.max_recovery_attempts = attempts;
    }
    if cli.no_history {
        config.history.disabled = true;
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<i32> {
    let prompt = cli.prompt_text();
    let config = load_config(&cli)?;
    let prompts = Prompts::load(config.prompts_dir.as_deref()).context("failed to load prompts")?;
    let model = OpenAiClient::new(&config).context("failed to create the model client")?;
    let history = history_path()
        .map(|path| load_recent_commands(&path, &config.history))
        .unwrap_or_default();

    let abort = AbortSignal::new();
    let (events, receiver) = EventSink::channel();
    let renderer = Renderer::new(cli.output_target(), cli.yes).spawn(receiver);
    let listener = spawn_abort_listener(abort.clone());

    let output = if config.capture_output {
        OutputMode::Capture
    } else {
        OutputMode::Terminal
    };
    let executor = ShellExecutor::from_current_dir(config.shell.clone())
        .context("cannot determine the working directory")?
        .with_output(output)
        .with_events(events.clone());

    let gate: Arc<dyn ConfirmationGate> = if cli.yes {
        Arc::new(AutoApprove)
    } else {
        Arc::new(TerminalConfirmation::new(events.clone()))
    };

    let mut session = Session::new(
        Collaborators {
            model: Arc::new(model),
            tools: Arc::new(ToolRegistry::new(config.max_tool_output_bytes)),
            runner: Box::new(executor),
            gate,
        },
        prompts,
        SessionOptions {
            max_tool_rounds: config.max_tool_rounds,
            max_recovery_attempts: config.max_recovery_attempts,
            host_context: Some(SystemContext::gather().to_context_string()),
            history,
        },
        events,
        abort,
    );

    let result = if cli.print {
        session.plan(&prompt).await.map(|planned| match planned {
            None => EXIT_ABORTED,
            Some(commands) => match command_line(&commands) {
                Some(line) => {
                    println!("{}", line);
                    0
                }
                None => {
                    eprintln!("{}", "No valid commands returned.".red());
                    EXIT_ERROR
                }
            },
        })
    } else {
        session.run(&prompt).await.map(|outcome| {
            tracing::debug!(%outcome, "run finished");
            exit_code(outcome)
        })
    };

    drop(session);
    let _ = renderer.await;
    listener.abort();

    result.map_err(anyhow::Error::from)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if cli.zsh_init {
        println!("{}", ZSH_INIT_SCRIPT);
        return;
    }
    init_logging(&cli);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "shai:".red().bold(), e);
            EXIT_ERROR
        }
    };
    std::process::exit(code);
}
