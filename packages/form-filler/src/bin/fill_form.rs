//! Fill a form from a source document.
//!
//! Prints the filled field → answer map as JSON on stdout. Blank answers are
//! printed as empty strings. When synthesis output could not be structured,
//! the raw model text is printed instead and the exit code is 2.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use form_filler::{
    parsers::TextFileParser, CancellationToken, DocumentRef, FillOutcome, FillRequest,
    FormFiller, Settings,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "fill_form")]
#[command(about = "Fill a form's fields from a source document")]
struct Cli {
    /// Source document the answers come from
    source: PathBuf,

    /// Form whose fields should be filled
    form: PathBuf,

    /// Identity of the source document (names its persisted index)
    #[arg(long, default_value = "default")]
    identity: String,

    /// Rebuild the index even if a persisted one exists
    #[arg(long)]
    no_reuse: bool,

    /// Restrict retrieval to these identities (repeatable)
    #[arg(long = "filter-id")]
    filter_ids: Vec<String>,

    /// Run deadline in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Root directory for persisted indexes
    #[arg(long)]
    storage_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,form_filler=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let settings = Settings::from_env().context("Failed to load settings")?;
    let ai = Arc::new(settings.openai().context("OpenAI credentials are required")?);

    let mut config = settings.fill_config();
    if let Some(dir) = cli.storage_dir {
        config = config.with_storage_dir(dir);
    }
    if let Some(secs) = cli.timeout_secs {
        config = config.with_run_timeout(Duration::from_secs(secs));
    }

    let filler = FormFiller::new(Arc::new(TextFileParser::new()), ai.clone(), ai, config);

    let mut request = FillRequest::new(DocumentRef::new(cli.source, cli.identity), cli.form)
        .with_reuse_index(!cli.no_reuse);
    if !cli.filter_ids.is_empty() {
        request = request.with_filter_identities(cli.filter_ids);
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling run");
            on_interrupt.cancel();
        }
    });

    let outcome = filler
        .process_with_cancel(request, cancel)
        .await
        .context("Form filling failed")?;

    match outcome {
        FillOutcome::Filled(form) => {
            let json = serde_json::to_string_pretty(&form).context("Failed to render answers")?;
            println!("{}", json);
        }
        FillOutcome::Unstructured { raw } => {
            tracing::warn!("Synthesis output was not structured, printing raw text");
            println!("{}", raw);
            std::process::exit(2);
        }
    }

    Ok(())
}
