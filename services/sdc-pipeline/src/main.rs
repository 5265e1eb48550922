use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use clap::{Parser, Subcommand};
use sdc_pipeline::alert::is_file_manifest;
use sdc_pipeline::keys::file_name_of;
use sdc_pipeline::{
    derive_key, AlertType, Config, ConfigError, EventLedger, LambdaInvoker, LedgerTarget, Notifier,
    ObjectGateway, PipelineAction, PipelineEvent, Placement, Reporter, Reprocessor, S3ObjectStore,
    ScienceFileMetadata, SlackClient, SwxsocFilenameParser, TimestreamSink,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Science data file placement and notification
#[derive(Debug, Parser)]
#[command(name = "sdc-pipeline", version, about)]
struct Cli {
    /// Compute and log everything, move and post nothing
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the storage key derived for a filename
    Key { filename: String },
    /// Download an object into the staging directory
    Fetch {
        #[arg(long)]
        bucket: String,
        #[arg(long)]
        key: String,
    },
    /// Upload a staged file under its derived key
    Push {
        #[arg(long)]
        bucket: String,
        #[arg(long)]
        file: String,
    },
    /// Move an incoming object into its instrument bucket
    Sort {
        #[arg(long)]
        key: String,
        /// Copy instead of move
        #[arg(long)]
        keep_source: bool,
    },
    /// Post a pipeline event for a file
    Notify {
        #[arg(long)]
        path: String,
        #[arg(long)]
        alert: Option<AlertType>,
    },
    /// Ask the processing function to process an object again
    Reprocess {
        #[arg(long)]
        bucket: String,
        #[arg(long)]
        key: String,
    },
}

/// Everything one invocation needs, built once from configuration
struct Pipeline {
    config: Config,
    parser: Arc<SwxsocFilenameParser>,
    placement: Placement,
    reporter: Reporter,
    reprocessor: Reprocessor,
}

impl Pipeline {
    async fn new(config: Config, dry_run: bool) -> Result<Self> {
        let parser = Arc::new(SwxsocFilenameParser::new(config.mission.mission_name.clone()));

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.s3.region.clone()))
            .load()
            .await;

        let store = Arc::new(S3ObjectStore::new(&sdk_config, &config.s3));
        let gateway = Arc::new(ObjectGateway::new(store, config.s3.staging_dir.clone()));
        let placement = Placement::new(gateway, config.transfer_context(), config.s3.key_layout);

        let ledger = if !config.ledger.enabled_for(dry_run) {
            info!(dry_run, "Event ledger disabled");
            None
        } else {
            let sink = TimestreamSink::new(&sdk_config)
                .await
                .context("Failed to initialize Timestream sink")?;
            let target = LedgerTarget::for_mission(
                Some(config.mission.mission_name.as_str()),
                config.mission.environment,
            );
            Some(EventLedger::new(Arc::new(sink), target))
        };

        let notifier = match (&config.slack.token, &config.slack.channel) {
            (Some(token), Some(channel)) => {
                let chat = Arc::new(SlackClient::new(token.clone(), config.slack.api_url.clone()));
                Some(Notifier::new(
                    chat,
                    parser.clone(),
                    channel.clone(),
                    config.retry_policy(),
                ))
            }
            _ => {
                info!("Slack token or channel not configured, notifications disabled");
                None
            }
        };

        let reprocessor = Reprocessor::new(
            Arc::new(LambdaInvoker::new(&sdk_config)),
            config.mission.environment,
        );

        Ok(Self {
            config,
            parser,
            placement,
            reporter: Reporter::new(ledger, notifier),
            reprocessor,
        })
    }

    fn notifier(&self) -> Result<&Notifier> {
        self.reporter
            .notifier()
            .ok_or(ConfigError::MissingRequired("slack.token and slack.channel"))
            .map_err(Into::into)
    }

    async fn fetch(&self, bucket: &str, key: &str, dry_run: bool) -> Result<()> {
        let path = self
            .placement
            .acquire(bucket, key, file_name_of(key), dry_run)
            .await
            .with_context(|| format!("Failed to fetch s3://{bucket}/{key}"))?;

        if let Some(path) = path {
            println!("{}", path.display());
        }
        Ok(())
    }

    async fn push(&self, bucket: &str, file: &str, dry_run: bool) -> Result<()> {
        let key = self
            .placement
            .place(self.parser.as_ref(), bucket, file, dry_run)
            .await
            .with_context(|| format!("Failed to place {file} in {bucket}"))?;

        println!("{key}");

        if self.placement.transfers(dry_run) {
            let event = PipelineEvent::new(PipelineAction::Upload, key.as_path())
                .with_destination_bucket(bucket);
            self.reporter
                .transfer_completed(&event, None)
                .await
                .with_context(|| {
                    format!("Uploaded {file} to s3://{bucket}/{key} but reporting UPLOAD failed")
                })?;
        }
        Ok(())
    }

    async fn sort(&self, key: &str, keep_source: bool, dry_run: bool) -> Result<()> {
        let metadata = ScienceFileMetadata::read(self.parser.as_ref(), file_name_of(key))
            .with_context(|| format!("Failed to read metadata for {key}"))?;
        let instrument = metadata
            .instrument
            .with_context(|| format!("No instrument in filename {key}"))?;

        let source_bucket = self.config.mission.incoming_bucket();
        let dest_bucket = self.config.mission.instrument_bucket(&instrument)?;

        let new_key = self
            .placement
            .sort(
                self.parser.as_ref(),
                &source_bucket,
                &dest_bucket,
                key,
                keep_source,
                dry_run,
            )
            .await
            .with_context(|| format!("Failed to sort s3://{source_bucket}/{key}"))?;

        println!("{dest_bucket}/{new_key}");

        if self.placement.transfers(dry_run) {
            let action = if keep_source {
                PipelineAction::Copy
            } else {
                PipelineAction::Move
            };
            let event = PipelineEvent::new(action, key)
                .with_new_file_key(new_key.as_path())
                .with_source_bucket(&source_bucket)
                .with_destination_bucket(&dest_bucket);
            let new_path = new_key.as_path();
            self.reporter
                .transfer_completed(&event, Some((new_path.as_str(), AlertType::Sorted)))
                .await
                .with_context(|| {
                    format!(
                        "Sorted s3://{source_bucket}/{key} to s3://{dest_bucket}/{new_key} \
                         but reporting {} failed",
                        action.as_str()
                    )
                })?;
        }
        Ok(())
    }

    async fn notify(&self, path: &str, alert: Option<AlertType>, dry_run: bool) -> Result<()> {
        let notifier = self.notifier()?;

        if dry_run {
            info!(path, alert = ?alert, channel = notifier.channel(), "Dry Run - Nothing will be posted");
            return Ok(());
        }

        if is_file_manifest(path) {
            notifier
                .post_manifest(path)
                .await
                .with_context(|| format!("Failed to post manifest {path}"))?;
        } else {
            notifier
                .notify_pipeline_event(path, alert)
                .await
                .with_context(|| format!("Failed to notify event for {path}"))?;
        }
        Ok(())
    }

    async fn reprocess(&self, bucket: &str, key: &str, dry_run: bool) -> Result<()> {
        if dry_run {
            info!(bucket, key, "Dry Run - No reprocessing will be requested");
            return Ok(());
        }

        self.reprocessor
            .request(bucket, key)
            .await
            .with_context(|| format!("Failed to request reprocessing of s3://{bucket}/{key}"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        mission = %config.mission.mission_name,
        dry_run = cli.dry_run,
        "Starting SDC pipeline"
    );

    if let Command::Key { ref filename } = cli.command {
        let parser = SwxsocFilenameParser::new(config.mission.mission_name.clone());
        let key = derive_key(&parser, filename, config.s3.key_layout)
            .with_context(|| format!("Failed to derive key for {filename}"))?;
        println!("{key}");
        return Ok(());
    }

    let pipeline = Pipeline::new(config, cli.dry_run).await?;

    match cli.command {
        Command::Key { .. } => Ok(()),
        Command::Fetch { bucket, key } => pipeline.fetch(&bucket, &key, cli.dry_run).await,
        Command::Push { bucket, file } => pipeline.push(&bucket, &file, cli.dry_run).await,
        Command::Sort { key, keep_source } => pipeline.sort(&key, keep_source, cli.dry_run).await,
        Command::Notify { path, alert } => pipeline.notify(&path, alert, cli.dry_run).await,
        Command::Reprocess { bucket, key } => pipeline.reprocess(&bucket, &key, cli.dry_run).await,
    }
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}
