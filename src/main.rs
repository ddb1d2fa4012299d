use std::error::Error;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use llm_textcat_rs::logging::{init_logging, LoggingConfig};
use llm_textcat_rs::{config_schema, run_pipeline, PipelineError, RunRequest};
use tracing::debug;

/// Classify a piece of text with a hosted language model, zero-shot or few-shot.
#[derive(Debug, Parser)]
#[command(name = "run_pipeline", version, about)]
struct Cli {
    /// Text to classify
    #[arg(required_unless_present = "print_config_schema")]
    input_text: Option<String>,

    /// Pipeline config file (.json, .yaml or .yml)
    #[arg(required_unless_present = "print_config_schema")]
    config_path: Option<PathBuf>,

    /// Labeled examples for few-shot prompts (.jsonl, .json, .yaml or .yml)
    examples_path: Option<PathBuf>,

    /// Print the assembled prompt instead of calling the endpoint
    #[arg(long)]
    dry_run: bool,

    /// Print the JSON Schema of the config file and exit
    #[arg(long, exclusive = true)]
    print_config_schema: bool,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&LoggingConfig::from_verbosity(cli.verbose));

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            debug!(error = ?e, "pipeline failed");
            eprintln!("error: {}", describe(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), PipelineError> {
    if cli.print_config_schema {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", config_schema()?)?;
        return Ok(());
    }
    let (Some(input_text), Some(config_path)) = (cli.input_text, cli.config_path) else {
        return Err(PipelineError::Configuration(String::from(
            "input text and config path are required",
        )));
    };
    let request = RunRequest {
        input_text,
        config_path,
        examples_path: cli.examples_path,
        dry_run: cli.dry_run,
    };
    let mut stdout = std::io::stdout().lock();
    run_pipeline(&request, |key| std::env::var(key).ok(), &mut stdout).await?;
    Ok(())
}

/// The error followed by its chain of causes.
fn describe(error: &PipelineError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let _ = write!(message, ": {cause}");
        source = cause.source();
    }
    message
}
