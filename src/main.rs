use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use canary_commit::storage::{StorageType, UploadContext};
use canary_commit::{
    AccessCondition, Address, CommitConfig, CommitError, CommitPipeline, DossierId,
    EncryptedArtifact, Result, TraceBuilder,
};

#[derive(Parser)]
#[command(name = "canary-commit")]
#[command(about = "Commit encrypted artifacts to content-addressed storage with fallback")]
#[command(version)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "CANARY_COMMIT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe every configured backend
    Health,
    /// Commit a ciphertext file and print its trace record
    Commit {
        /// Ciphertext produced by the encryption layer
        ciphertext: PathBuf,
        #[arg(long)]
        capsule_uri: String,
        #[arg(long)]
        dossier_id: String,
        #[arg(long)]
        user_address: String,
        /// Check-in interval, e.g. "30 days"
        #[arg(long)]
        duration: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Name recorded for the plaintext file (defaults to the ciphertext file name)
        #[arg(long)]
        file_name: Option<String>,
        /// Commit to this backend only, with no fallback
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,
    },
    /// Fetch a committed payload by its URI
    Retrieve {
        payload_uri: String,
        #[arg(short, long)]
        out: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Primary,
    Pinning,
    Codex,
}

impl From<BackendArg> for StorageType {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Primary => StorageType::PrimaryNetwork,
            BackendArg::Pinning => StorageType::PinningService,
            BackendArg::Codex => StorageType::DistributedFs,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => CommitConfig::load(path)?,
        None => CommitConfig::default(),
    };
    config.apply_env_overrides();

    let pipeline = CommitPipeline::from_config(&config)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Commands::Health => {
            let mut any_healthy = false;
            for health in pipeline.health().await {
                any_healthy |= health.healthy;
                let status = if health.healthy { "ok" } else { "unavailable" };
                println!("{:<10} {:<16} {status}", health.backend, health.storage_type);
            }
            if !any_healthy {
                return Err(CommitError::NoBackendAvailable { attempts: vec![] });
            }
        }
        Commands::Commit {
            ciphertext,
            capsule_uri,
            dossier_id,
            user_address,
            duration,
            description,
            file_name,
            backend,
        } => {
            let data = tokio::fs::read(&ciphertext).await?;
            let original_file_name = file_name.unwrap_or_else(|| {
                ciphertext
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });

            let artifact = EncryptedArtifact {
                ciphertext: data,
                original_file_name,
                description,
                capsule_uri,
                condition: AccessCondition::no_activity(
                    dossier_id.parse::<DossierId>()?,
                    user_address.parse::<Address>()?,
                    duration,
                ),
            };

            let ctx = UploadContext::new(cancel).with_progress(Arc::new(|sent: u64, total: u64| {
                tracing::debug!(sent, total, "Upload progress");
            }));

            let result = match backend {
                Some(backend) => pipeline.commit_to(artifact, backend.into(), &ctx).await?,
                None => pipeline.commit(artifact, &ctx).await?,
            };

            let trace = TraceBuilder::new(config.trace.clone()).build(&result);
            println!("{}", trace.to_json()?);
        }
        Commands::Retrieve { payload_uri, out } => {
            let retrieved = pipeline.retrieve(&payload_uri, &cancel).await?;
            tokio::fs::write(&out, &retrieved.data).await?;
            info!(
                source = %retrieved.source,
                tier = %retrieved.tier,
                bytes = retrieved.data.len(),
                out = %out.display(),
                "Payload written"
            );
        }
    }

    Ok(())
}
