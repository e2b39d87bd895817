use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use lambda_runtime::{Error, LambdaEvent, service_fn};
use s3untar::config::{self, ExtractorConfig};
use s3untar::s3::S3Client;
use s3untar::{ArchiveRef, ExtractionReport, Extractor, S3Event};
use serde_json::Value;
use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span};

#[derive(Parser)]
#[command(name = "s3untar", version, about = "Fan tar archives in S3 out into objects")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve Lambda invocations (the default)
    Serve,
    /// Extract a single archive now and print the report
    Run {
        #[arg(long)]
        bucket: String,
        #[arg(long)]
        key: String,
        /// Override FANOUT_WORKERS
        #[arg(long)]
        workers: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Installed first so the configuration reads below are logged
    s3untar::log::init(config::pretty_print_from_env());
    let config = ExtractorConfig::from_env().context("invalid configuration")?;
    debug!(?config, "loaded configuration");

    let storage = Arc::new(S3Client::new(&config.storage).await);
    info!(region = storage.region(), workers = config.workers, "s3 client ready");
    let extractor = Extractor::from_config(storage, &config);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
            let extractor = extractor.clone();
            async move { handle_event(&extractor, event).await }
        }))
        .await
        .map_err(|e| anyhow!("lambda runtime failed: {e}")),
        Command::Run {
            bucket,
            key,
            workers,
        } => {
            let extractor = match workers {
                Some(workers) => extractor.with_workers(workers),
                None => extractor,
            };
            let report = extractor.run(&ArchiveRef::new(bucket, key)).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

async fn handle_event(
    extractor: &Extractor,
    event: LambdaEvent<Value>,
) -> Result<ExtractionReport, Error> {
    let span = info_span!("invocation", request_id = %event.context.request_id);
    let archive = S3Event::from_value(event.payload)?.archive_ref()?;

    let report = extractor.run(&archive).instrument(span).await?;
    Ok(report)
}
