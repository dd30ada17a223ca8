use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use gemini_uploader_core::{
    APP_NAME, AbortRegistry, EventSink, HttpTransport, TransferReport, TransferState, UploadEvent,
    Uploader, config_path, load_config, load_manifest, logging,
};
use serde::Serialize;
use tracing::info;

#[derive(Parser)]
#[command(name = "gemini-uploader")]
#[command(about = "Upload local files to single-shot upload URLs", long_about = None)]
struct Cli {
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    Upload {
        #[arg(long)]
        manifest: PathBuf,
    },
    Config {
        #[command(subcommand)]
        cmd: ConfigCmd,
    },
}

#[derive(Subcommand)]
enum ConfigCmd {
    Show,
}

#[derive(Debug, Serialize)]
struct CliError {
    code: &'static str,
    message: String,
    details: serde_json::Value,
    retryable: bool,
}

impl CliError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: serde_json::json!({}),
            retryable: false,
        }
    }

    fn retryable(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: serde_json::json!({}),
            retryable: true,
        }
    }
}

impl From<gemini_uploader_core::Error> for CliError {
    fn from(e: gemini_uploader_core::Error) -> Self {
        use gemini_uploader_core::Error;
        match e {
            Error::InvalidConfig { .. } => CliError::new("config.invalid", e.to_string()),
            Error::Io(_) => CliError::new("io.failed", e.to_string()),
            Error::Network { .. } => CliError::retryable("network.failed", e.to_string()),
            Error::InvalidResponse { .. } => CliError::new("response.invalid", e.to_string()),
        }
    }
}

struct NdjsonEventSink;

impl EventSink for NdjsonEventSink {
    fn dispatch(&self, event: UploadEvent) {
        let mut line = serde_json::json!({ "type": "upload.event" });
        if let (Some(obj), Ok(serde_json::Value::Object(fields))) =
            (line.as_object_mut(), serde_json::to_value(&event))
        {
            obj.extend(fields);
        }
        println!("{line}");
    }
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchSummary {
    total: usize,
    completed: usize,
    failed: usize,
    aborted: usize,
}

impl BatchSummary {
    /// `submitted` is the number of entries handed to the uploader; an entry
    /// without a report never counts as completed.
    fn from_reports(submitted: usize, reports: &[TransferReport]) -> Self {
        let mut summary = BatchSummary {
            total: submitted.max(reports.len()),
            ..BatchSummary::default()
        };
        for r in reports {
            match r.state {
                TransferState::Completed => summary.completed += 1,
                TransferState::Failed => summary.failed += 1,
                TransferState::Aborted => summary.aborted += 1,
                TransferState::Pending | TransferState::InFlight => {}
            }
        }
        summary
    }

    fn all_completed(&self) -> bool {
        self.completed == self.total
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.json_logs);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            emit_error(&e);
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32, CliError> {
    let config_file = cli
        .config
        .or_else(|| {
            std::env::var("GEMINI_UPLOADER_CONFIG")
                .ok()
                .map(PathBuf::from)
        })
        .unwrap_or_else(|| config_path(&default_config_dir()));

    match cli.cmd {
        Command::Upload { manifest } => upload_run(&config_file, &manifest).await,
        Command::Config { cmd } => match cmd {
            ConfigCmd::Show => {
                let config = load_config(&config_file)?;
                let text = serde_json::to_string_pretty(&config)
                    .map_err(|e| CliError::new("config.encode_failed", e.to_string()))?;
                println!("{text}");
                Ok(0)
            }
        },
    }
}

async fn upload_run(config_file: &Path, manifest: &Path) -> Result<i32, CliError> {
    let config = load_config(config_file)?;
    let entries = load_manifest(manifest)?;
    if entries.is_empty() {
        return Err(CliError::new("manifest.empty", "manifest lists no entries"));
    }

    let transport = Arc::new(HttpTransport::new(&config)?);
    let uploader = Uploader::new(transport, Arc::new(NdjsonEventSink));
    let registry = Arc::new(AbortRegistry::new());

    let submitted = entries.len();
    let batch = uploader.run(entries, registry.hook());

    let teardown = {
        let registry = registry.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let aborted = registry.abort_all();
                info!(event = "upload.batch.abort", aborted, "upload.batch.abort");
            }
        })
    };

    let reports = batch.join().await;
    teardown.abort();

    let summary = BatchSummary::from_reports(submitted, &reports);
    info!(
        event = "upload.batch.finish",
        total = summary.total,
        completed = summary.completed,
        failed = summary.failed,
        aborted = summary.aborted,
        "upload.batch.finish"
    );

    let mut line = serde_json::json!({ "type": "batch.finish" });
    if let (Some(obj), Ok(serde_json::Value::Object(fields))) =
        (line.as_object_mut(), serde_json::to_value(&summary))
    {
        obj.extend(fields);
    }
    println!("{line}");

    Ok(if summary.all_completed() { 0 } else { 1 })
}

fn default_config_dir() -> PathBuf {
    if let Ok(v) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(v).join(APP_NAME);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".config").join(APP_NAME)
}

fn emit_error(e: &CliError) {
    let json = serde_json::to_string(e).unwrap_or_else(|_| "{\"code\":\"unknown\",\"message\":\"json encode failed\",\"details\":{},\"retryable\":false}".to_string());
    let _ = writeln!(std::io::stderr(), "{json}");
}
