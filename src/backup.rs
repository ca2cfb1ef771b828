//! Daily offsite backup scheduler.
//!
//! A single background task that sleeps until the next local midnight, zips
//! the data directory and the uploaded-asset directory into one bundle,
//! posts the bundle to the backup chat as a document, deletes the local
//! bundle and goes back to sleep. Failures are logged and never terminate
//! the loop; the task itself is cancellable for clean shutdown and exposes
//! its next run time and last outcome.

use std::fs;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::BackupError;

/// Fallback wait when the next-midnight computation cannot produce a valid
/// local timestamp (e.g. a DST gap exactly at midnight).
const FALLBACK_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Seconds until the next local midnight, always positive and at most 24h.
pub fn duration_until_next_midnight(now: DateTime<Local>) -> Duration {
    let next = now
        .date_naive()
        .succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|naive| Local.from_local_datetime(&naive).earliest());
    match next {
        Some(next) => (next - now).to_std().unwrap_or(FALLBACK_WAIT),
        None => FALLBACK_WAIT,
    }
}

// ---------------------------------------------------------------------------
// Archive bundle
// ---------------------------------------------------------------------------

/// Zip every file under the given directories into `dest`, each entry
/// prefixed with its source directory name. Missing directories are skipped
/// with a warning. Returns the bundle size in bytes.
pub fn create_archive(sources: &[PathBuf], dest: &Path) -> Result<u64, BackupError> {
    let file = fs::File::create(dest)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for source in sources {
        if !source.is_dir() {
            warn!(dir = %source.display(), "backup source directory missing, skipping");
            continue;
        }
        let prefix = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "data".to_string());
        add_dir_recursive(&mut zip, source, &prefix, options)?;
    }

    zip.finish()?;
    Ok(fs::metadata(dest)?.len())
}

fn add_dir_recursive<W: Write + Seek>(
    zip: &mut zip::ZipWriter<W>,
    dir: &Path,
    prefix: &str,
    options: zip::write::SimpleFileOptions,
) -> Result<(), BackupError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        let entry_name = format!("{prefix}/{name}");
        if path.is_dir() {
            add_dir_recursive(zip, &path, &entry_name, options)?;
        } else {
            zip.start_file(&entry_name, options)?;
            let mut file = fs::File::open(&path)?;
            std::io::copy(&mut file, zip)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Observability snapshot of the scheduler.
#[derive(Debug, Clone, Default)]
pub struct BackupStatus {
    pub next_run_at: Option<DateTime<Local>>,
    pub last_run_at: Option<DateTime<Local>>,
    /// Error text of the last run, `None` when it succeeded (or never ran).
    pub last_error: Option<String>,
}

pub struct BackupScheduler {
    client: Client,
    send_url: String,
    chat_id: String,
    data_dir: PathBuf,
    uploads_dir: PathBuf,
    /// Where the temporary bundle is written before upload.
    bundle_dir: PathBuf,
    status: Mutex<BackupStatus>,
}

impl BackupScheduler {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.backup_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            send_url: format!(
                "{}/bot{}/sendDocument",
                config.telegram.api_base, config.telegram.bot_token
            ),
            chat_id: config.telegram.backup_chat_id.clone(),
            data_dir: config.data_dir.clone(),
            uploads_dir: config.uploads_dir.clone(),
            bundle_dir: std::env::temp_dir(),
            status: Mutex::new(BackupStatus::default()),
        })
    }

    pub fn status(&self) -> BackupStatus {
        self.status
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Start the background loop. Runs until the token is cancelled.
    pub fn spawn(self: &std::sync::Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let scheduler = std::sync::Arc::clone(self);
        tokio::spawn(async move { scheduler.run(cancel).await })
    }

    async fn run(&self, cancel: CancellationToken) {
        loop {
            let wait = duration_until_next_midnight(Local::now());
            {
                let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
                status.next_run_at =
                    chrono::Duration::from_std(wait).ok().map(|d| Local::now() + d);
            }
            info!(wait_secs = wait.as_secs(), "next backup scheduled");

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("backup scheduler stopping");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            info!("daily backup starting");
            let result = self.run_once().await;
            let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
            status.last_run_at = Some(Local::now());
            match result {
                Ok(()) => {
                    status.last_error = None;
                    info!("daily backup uploaded");
                }
                Err(e) => {
                    status.last_error = Some(e.to_string());
                    error!(error = %e, "daily backup failed, will retry tomorrow");
                }
            }
        }
    }

    /// One archive-and-upload cycle. The local bundle is always deleted,
    /// whether or not the upload succeeded.
    pub async fn run_once(&self) -> Result<(), BackupError> {
        let timestamp = Local::now().format("%Y-%m-%d_%H-%M").to_string();
        let bundle = self.bundle_dir.join(format!("backup_{timestamp}.zip"));

        let result = self.archive_and_upload(&bundle).await;
        if bundle.exists() {
            let _ = fs::remove_file(&bundle);
        }
        result
    }

    async fn archive_and_upload(&self, bundle: &Path) -> Result<(), BackupError> {
        // The archive runs after, not during, the store's save operations
        // and holds none of the request-path locks, so the snapshot it takes
        // is consistent enough for a daily backup.
        let sources = vec![self.data_dir.clone(), self.uploads_dir.clone()];
        let size_bytes = create_archive(&sources, bundle)?;
        let size_mb = size_bytes as f64 / (1024.0 * 1024.0);
        info!(bundle = %bundle.display(), size_mb = format!("{size_mb:.2}"), "backup bundle created");

        let caption = format!(
            "📅 Daily backup\n🕐 {}\n📦 {size_mb:.2} MB",
            Local::now().format("%d.%m.%Y %H:%M")
        );
        let file_name = bundle
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "backup.zip".to_string());
        // Streamed so a grown database never has to fit in memory twice.
        let file = tokio::fs::File::open(bundle).await?;
        let document =
            Part::stream(reqwest::Body::wrap_stream(ReaderStream::new(file))).file_name(file_name);

        let form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", caption)
            .part("document", document);

        let response = self.client.post(&self.send_url).multipart(form).send().await?;
        let status = response.status();
        if status.as_u16() != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(BackupError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
