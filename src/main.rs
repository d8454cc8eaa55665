use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use clap::{Parser, Subcommand, ValueHint};
use futures::Stream;
use iocraft::prelude::*;
use reqwest::Method;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use url::Url;

use sliceput::{
    FailurePolicy, HttpAdapter, LargeFileUploadTask, RequestAdapter, SectionReader, UploadRequest,
    UploadResult, UploadSession, UploadTaskOptions,
};

use crate::ui::{ErrorMessage, ProgressBar, SuccessMessage};

mod config;
mod ui;

const FILE_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Parser)]
#[command(name = "sliceput")]
#[command(version)]
#[command(about = "Upload large files to resumable upload sessions in bounded slices")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct SessionArgs {
    /// URL of an existing upload session
    #[arg(short = 'u', long, value_hint = ValueHint::Url)]
    session_url: Option<Url>,
    /// JSON file holding the session payload returned when it was created
    #[arg(short = 'f', long, value_hint = ValueHint::FilePath, conflicts_with = "session_url")]
    session_file: Option<PathBuf>,
}

#[derive(clap::Args)]
struct TransferArgs {
    /// File to upload
    #[arg(value_hint = ValueHint::FilePath)]
    file: PathBuf,
    #[command(flatten)]
    session: SessionArgs,
    /// Maximum slice size in bytes (default 320 KiB)
    #[arg(short, long)]
    slice_size: Option<u64>,
    /// Skip slices that exhaust their retry budget instead of failing
    #[arg(long)]
    best_effort: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file to an upload session
    Upload {
        #[command(flatten)]
        args: TransferArgs,
    },
    /// Refresh the session state, then upload what the server still expects
    Resume {
        #[command(flatten)]
        args: TransferArgs,
    },
    /// Print the session's expiration and still-expected ranges
    Status {
        #[arg(value_hint = ValueHint::Url)]
        session_url: Url,
    },
    /// Cancel the session server-side
    Cancel {
        #[arg(value_hint = ValueHint::Url)]
        session_url: Url,
    },
    /// Store a bearer token in the OS keyring
    SetToken { token: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::SetToken { token } => config::set_token_keyring(token),
        Commands::Upload { args } => run_transfer(args, false).await,
        Commands::Resume { args } => run_transfer(args, true).await,
        Commands::Status { session_url } => print_status(session_url).await,
        Commands::Cancel { session_url } => cancel_session(session_url).await,
    }
}

/// Exposes a file as a one-shot chunk stream, the only access pattern the
/// upload engine's reader needs.
fn file_stream(path: &Path) -> Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>> {
    let path = path.to_path_buf();
    Box::pin(async_stream::try_stream! {
        let mut file = tokio::fs::File::open(&path).await?;
        let mut buf = vec![0u8; FILE_CHUNK_SIZE];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            yield Bytes::copy_from_slice(&buf[..n]);
        }
    })
}

fn load_session(args: &SessionArgs) -> Result<UploadSession> {
    if let Some(path) = &args.session_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session file {}", path.display()))?;
        Ok(serde_json::from_str(&text).context("Session file is not a valid session payload")?)
    } else if let Some(url) = &args.session_url {
        // A bare URL means a fresh session: everything is still expected.
        Ok(UploadSession {
            upload_url: Some(url.to_string()),
            expiration_date_time: None,
            next_expected_ranges: Some(vec!["0-".into()]),
        })
    } else {
        bail!("either --session-url or --session-file is required")
    }
}

async fn run_transfer(args: TransferArgs, resume: bool) -> Result<()> {
    let config = config::read_config()?;
    let total_length = std::fs::metadata(&args.file)
        .with_context(|| format!("Failed to stat {}", args.file.display()))?
        .len();
    let session = load_session(&args.session)?;
    let reader = SectionReader::new(file_stream(&args.file));

    let options = UploadTaskOptions {
        max_slice_size: args.slice_size.or(config.slice_size).unwrap_or(0),
        failure_policy: if args.best_effort {
            FailurePolicy::BestEffort
        } else {
            FailurePolicy::FailFast
        },
        ..UploadTaskOptions::default()
    };

    let adapter = HttpAdapter::new(config.bearer_token);
    let mut task = LargeFileUploadTask::<serde_json::Value, _, _>::new(
        adapter,
        session,
        reader,
        total_length,
        options,
    )?;

    let (tx, rx) = watch::channel(0.0f32);
    let transfer = async {
        let progress = |end: u64| {
            let percent = ((end + 1) as f32 / total_length as f32) * 100.0;
            let _ = tx.send(percent);
        };
        if resume {
            task.resume_with_progress(progress).await
        } else {
            task.upload_with_progress(progress).await
        }
    };

    let title = format!("Uploading {}", args.file.display());
    let mut progress_bar = element!(ProgressBar(title: title, progress: Some(rx)));

    let result = tokio::select! {
        result = transfer => result,
        _ = progress_bar.render_loop() => {
            unreachable!("render_loop should not terminate")
        }
    };

    match result {
        Ok(UploadResult::Item(item)) => {
            element!(SuccessMessage(message: "Upload complete".to_string())).print();
            println!("{}", serde_json::to_string_pretty(&item)?);
            Ok(())
        }
        Ok(UploadResult::Redirect(location)) => {
            element!(SuccessMessage(message: format!("Upload complete: {location}"))).print();
            Ok(())
        }
        Err(err) => {
            element!(ErrorMessage(message: format!("Upload failed: {err}"))).print();
            std::process::exit(1);
        }
    }
}

async fn print_status(session_url: Url) -> Result<()> {
    let config = config::read_config()?;
    let adapter = HttpAdapter::new(config.bearer_token);

    let response = adapter
        .send(UploadRequest::new(Method::GET, session_url))
        .await?;
    let Some(body) = response.body else {
        bail!("Server returned an empty session payload");
    };
    let session: UploadSession = serde_json::from_value(body)?;

    match session.expiration_date_time {
        Some(expiration) => println!("Expires: {expiration}"),
        None => println!("Expires: unknown"),
    }
    match session.next_expected_ranges {
        Some(ranges) if !ranges.is_empty() => {
            println!("Still expected:");
            for range in ranges {
                println!("  {range}");
            }
        }
        _ => println!("Still expected: nothing"),
    }
    Ok(())
}

async fn cancel_session(session_url: Url) -> Result<()> {
    let config = config::read_config()?;
    let adapter = HttpAdapter::new(config.bearer_token);

    adapter
        .send_no_content(UploadRequest::new(Method::DELETE, session_url))
        .await?;
    element!(SuccessMessage(message: "Upload session cancelled".to_string())).print();
    Ok(())
}
