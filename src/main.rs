use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use catcall::command::Dispatcher;
use catcall::config::{Config, DEFAULT_CONFIG_FILE};
use catcall::context::StaticContext;
use catcall::envelope::validate;
use catcall::executor::{DryRunExecutor, PageExecutor, ProcessExecutor};
use catcall::interpreter::LlmInterpreter;
use catcall::llm::{LlmBackend, OpenAiCompatBackend};
use catcall::session::{SessionEvent, TranscriptEvent, VoiceSession};
use catcall::state::WakeSession;
use catcall::summarize::LlmTextService;
use catcall::wake::{Sensitivity, find_wake, strip_after_wake};
use catcall::{repl, ui};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "catcall", about = "Voice commands for the browser, behind a wake phrase")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Config file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Wake sensitivity: strict, default or loose (overrides config)
    #[arg(long, global = true)]
    sensitivity: Option<Sensitivity>,

    /// Text treated as the current selection
    #[arg(long, global = true)]
    selection: Option<String>,

    /// Text treated as the current page
    #[arg(long, global = true)]
    page_text: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Read recognizer results from stdin and run commands (default)
    Listen,
    /// Show the wake match and trailing command for a transcript
    Check {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Show the envelope produced for raw interpreter output
    Validate { raw: String },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

async fn async_main(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(sensitivity) = cli.sensitivity {
        config.wake.sensitivity = sensitivity;
    }

    match cli.command {
        Some(Command::Check { text }) => check(&config, &text.join(" ")),
        Some(Command::Validate { raw }) => {
            let envelope = validate(&raw);
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            Ok(())
        }
        Some(Command::Listen) | None => listen(config, cli.selection, cli.page_text).await,
    }
}

fn check(config: &Config, text: &str) -> anyhow::Result<()> {
    let phrases = config.wake.phrase_set()?;
    let sensitivity = config.wake.sensitivity;

    match find_wake(text, &phrases, sensitivity) {
        Some(found) => {
            println!(
                "wake: \"{}\" at {} ({} chars)",
                found.matched_variant, found.start_index, found.span_len
            );
            let rest = strip_after_wake(text, &phrases, sensitivity).unwrap_or_default();
            if rest.is_empty() {
                println!("command: (none, would arm)");
            } else {
                println!("command: {rest}");
            }
        }
        None => println!("no wake phrase (sensitivity {sensitivity})"),
    }
    Ok(())
}

async fn listen(
    config: Config,
    selection: Option<String>,
    page_text: Option<String>,
) -> anyhow::Result<()> {
    let llm_config = &config.interpreter;
    let backend: Arc<dyn LlmBackend> = Arc::new(
        OpenAiCompatBackend::new(
            llm_config.base_url.clone(),
            llm_config.model.clone(),
            llm_config.api_key.clone(),
            llm_config.timeout(),
        )?
        .with_sampling(llm_config.temperature, llm_config.max_tokens),
    );
    info!(base_url = %llm_config.base_url, model = %llm_config.model, "interpreter configured");

    let executor: Arc<dyn PageExecutor> = match &config.executor.command {
        Some(program) => Arc::new(ProcessExecutor::spawn(
            program,
            &config.executor.args,
            config.executor.timeout(),
        )?),
        None => {
            info!("no executor configured, page commands are dry runs");
            Arc::new(DryRunExecutor)
        }
    };

    let dispatcher = Dispatcher::new(
        executor,
        Arc::new(LlmTextService::new(backend.clone(), config.text.ctx_size)),
        Arc::new(StaticContext::new(selection, page_text)),
    )
    .with_confirmation_policy(config.dispatch.confirmation);

    let wake = WakeSession::new(config.wake.phrase_set()?, config.wake.sensitivity)
        .with_arm_timeout(config.wake.timeout());
    println!(
        "Listening for \"{}\" (locale {}, sensitivity {})...\n",
        wake.phrases().canonical(),
        config.wake.locale,
        config.wake.sensitivity
    );

    let (transcript_tx, transcript_rx) = flume::unbounded::<TranscriptEvent>();
    let (event_tx, event_rx) = flume::unbounded::<SessionEvent>();

    let session = VoiceSession::new(
        wake,
        Arc::new(LlmInterpreter::new(backend)),
        dispatcher,
        event_tx,
    );
    let session_handle = tokio::spawn(session.run(transcript_rx));

    let render_handle = tokio::spawn(async move {
        while let Ok(event) = event_rx.recv_async().await {
            ui::render(&event);
        }
    });

    repl::read_stdin(transcript_tx).await?;

    let final_state = session_handle.await?;
    render_handle.await?;
    info!(state = %final_state, "input closed");
    Ok(())
}
