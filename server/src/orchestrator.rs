use rip_remote::{parse_search_results, DownloadError, Rip, SearchError};
use ripweb_protocol::{DisplayItem, DownloadForm, MediaType};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
#[allow(unused_imports)]
use tracing::{debug, info, warn};

/// Files rip writes and we read back. One of each kind is live at any time.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub track_results: PathBuf,
    pub album_results: PathBuf,
    pub download_log: PathBuf,
}

impl ArtifactPaths {
    pub fn results_for(&self, media_type: MediaType) -> &Path {
        match media_type {
            MediaType::Track => &self.track_results,
            MediaType::Album => &self.album_results,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub media_type: MediaType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub item_id: String,
    pub media_type: MediaType,
}

impl DownloadRequest {
    pub fn from_form(form: &DownloadForm) -> Result<DownloadRequest, OperationError> {
        let item_id = match form.item_id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => return Err(OperationError::Validation),
        };
        let media_type = form
            .item_type
            .as_deref()
            .and_then(|t| t.parse::<MediaType>().ok())
            .ok_or(OperationError::Validation)?;
        Ok(DownloadRequest {
            item_id: item_id.to_string(),
            media_type,
        })
    }
}

fn stderr_or_hint(stderr: &str) -> &str {
    if stderr.is_empty() {
        "Unknown error. Check if 'rip' is installed and accessible."
    } else {
        stderr
    }
}

// Display of every variant is the status line shown to the user.
#[derive(Error, Debug)]
pub enum OperationError {
    #[error("Error: Could not delete old search data ({}). Please check file permissions. Details: {source}", .path.display())]
    FileDeletion { path: PathBuf, source: io::Error },
    #[error("Error: Could not delete old download log. Details: {0}")]
    LogDeletion(io::Error),
    #[error("Error executing rip search command:\n{}", stderr_or_hint(.stderr))]
    SearchInvocation { stderr: String },
    #[error("Error during download ({media_type} ID: {item_id}):\n{log}")]
    DownloadInvocation {
        media_type: MediaType,
        item_id: String,
        log: String,
    },
    #[error("Error: '{}' not found after rip search completed.", .path.display())]
    MissingOutput { path: PathBuf },
    #[error("Error: Invalid JSON format in '{}': {source}", .path.display())]
    MalformedOutput {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Error: Invalid item ID or type provided for download.")]
    Validation,
    #[error("Error: rip did not finish within {} seconds.", .0.as_secs())]
    Timeout(Duration),
    #[error("An unexpected error occurred while {context}: {detail}")]
    Unexpected { context: String, detail: String },
}

#[derive(Debug)]
pub enum OperationOutcome {
    Found {
        items: Vec<DisplayItem>,
    },
    Downloaded {
        media_type: MediaType,
        item_id: String,
        log: String,
    },
    Failure(OperationError),
}

impl OperationOutcome {
    /// Text for the status area of the page. A successful search has nothing to say, the list is
    /// the answer.
    pub fn status_message(&self) -> Option<String> {
        match self {
            OperationOutcome::Found { .. } => None,
            OperationOutcome::Downloaded {
                media_type,
                item_id,
                log,
            } => Some(format!(
                "Download initiated for {} ID: {}\nLog:\n{}",
                media_type, item_id, log
            )),
            OperationOutcome::Failure(error) => Some(error.to_string()),
        }
    }
}

// Orchestrator runs one search or download from start to finish: clear the stale artifact, run
// rip, read back what it left.
//
// Operations of the same kind are serialized on a lock per artifact file. Without that, two tabs
// searching albums at once would delete each other's results mid-read.
pub struct Orchestrator {
    rip: Rip,
    paths: ArtifactPaths,
    track_results_lock: Mutex<()>,
    album_results_lock: Mutex<()>,
    download_log_lock: Mutex<()>,
}

impl Orchestrator {
    pub fn new(rip: Rip, paths: ArtifactPaths) -> Self {
        Self {
            rip,
            paths,
            track_results_lock: Mutex::new(()),
            album_results_lock: Mutex::new(()),
            download_log_lock: Mutex::new(()),
        }
    }

    fn results_lock(&self, media_type: MediaType) -> &Mutex<()> {
        match media_type {
            MediaType::Track => &self.track_results_lock,
            MediaType::Album => &self.album_results_lock,
        }
    }

    pub async fn search(&self, request: &SearchRequest) -> OperationOutcome {
        match self.try_search(request).await {
            Ok(items) => {
                info!(
                    media_type = %request.media_type,
                    count = items.len(),
                    "search finished"
                );
                OperationOutcome::Found { items }
            }
            Err(error) => {
                warn!(media_type = %request.media_type, %error, "search failed");
                OperationOutcome::Failure(error)
            }
        }
    }

    async fn try_search(
        &self,
        request: &SearchRequest,
    ) -> Result<Vec<DisplayItem>, OperationError> {
        let path = self.paths.results_for(request.media_type);
        let _guard = self.results_lock(request.media_type).lock().await;

        remove_stale(path)
            .await
            .map_err(|source| OperationError::FileDeletion {
                path: path.to_path_buf(),
                source,
            })?;

        self.rip
            .search(request.media_type, &request.query, path)
            .await
            .map_err(|error| match error {
                SearchError::ExitStatus { stderr, .. } => {
                    OperationError::SearchInvocation { stderr }
                }
                SearchError::Spawn(error) => OperationError::SearchInvocation {
                    stderr: format!("starting {}: {}", self.rip.program().display(), error),
                },
                SearchError::Timeout(limit) => OperationError::Timeout(limit),
            })?;

        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(OperationError::MissingOutput {
                    path: path.to_path_buf(),
                })
            }
            Err(error) => {
                return Err(OperationError::Unexpected {
                    context: format!("reading or parsing '{}'", path.display()),
                    detail: error.to_string(),
                })
            }
        };
        let json: serde_json::Value =
            serde_json::from_slice(&content).map_err(|source| OperationError::MalformedOutput {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(parse_search_results(&json))
    }

    /// Validate a posted form, then download.
    pub async fn download_form(&self, form: &DownloadForm) -> OperationOutcome {
        match DownloadRequest::from_form(form) {
            Ok(request) => self.download(&request).await,
            Err(error) => {
                warn!(?form, %error, "rejecting download");
                OperationOutcome::Failure(error)
            }
        }
    }

    pub async fn download(&self, request: &DownloadRequest) -> OperationOutcome {
        match self.try_download(request).await {
            Ok(log) => {
                info!(
                    media_type = %request.media_type,
                    item_id = %request.item_id,
                    "download finished"
                );
                OperationOutcome::Downloaded {
                    media_type: request.media_type,
                    item_id: request.item_id.clone(),
                    log,
                }
            }
            Err(error) => {
                warn!(
                    media_type = %request.media_type,
                    item_id = %request.item_id,
                    %error,
                    "download failed"
                );
                OperationOutcome::Failure(error)
            }
        }
    }

    async fn try_download(&self, request: &DownloadRequest) -> Result<String, OperationError> {
        if request.item_id.is_empty() {
            return Err(OperationError::Validation);
        }
        let path = &self.paths.download_log;
        let _guard = self.download_log_lock.lock().await;

        remove_stale(path).await.map_err(OperationError::LogDeletion)?;

        let unexpected = |detail: String| OperationError::Unexpected {
            context: format!(
                "trying to download {} {}",
                request.media_type, request.item_id
            ),
            detail,
        };

        let status = self
            .rip
            .download(request.media_type, &request.item_id, path)
            .await
            .map_err(|error| match error {
                DownloadError::Timeout(limit) => OperationError::Timeout(limit),
                other => unexpected(other.to_string()),
            })?;

        // rip is free to print anything, don't trust it to be UTF-8
        let log = tokio::fs::read(path)
            .await
            .map_err(|error| unexpected(error.to_string()))?;
        let log = String::from_utf8_lossy(&log).into_owned();

        if !status.success() {
            return Err(OperationError::DownloadInvocation {
                media_type: request.media_type,
                item_id: request.item_id.clone(),
                log,
            });
        }
        Ok(log)
    }
}

async fn remove_stale(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(?path, "deleted stale file");
            Ok(())
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error),
    }
}
