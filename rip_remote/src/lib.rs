use derive_builder::Builder;
use ripweb_protocol::MediaType;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process;
#[allow(unused_imports)]
use tracing::{debug, info, warn};

mod results;
pub use self::results::*;

// Rip runs the external ripping tool in a subprocess, one invocation per call.
//
// Arguments always go in as an argument vector. Nothing here ever passes through a shell, so
// user-supplied queries and ids can contain quotes, semicolons and friends.
#[derive(Builder, Debug, Clone)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct Rip {
    #[builder(setter(into), default = "PathBuf::from(\"rip\")")]
    program: PathBuf,

    /// Passed before the subcommand, for running rip through a wrapper such as an interpreter.
    #[builder(default)]
    leading_args: Vec<String>,

    #[builder(setter(into), default = "\"qobuz\".to_string()")]
    provider: String,

    /// No limit when unset; a hung rip then hangs the caller too.
    #[builder(default)]
    timeout: Option<Duration>,
}

impl RipBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(provider) = &self.provider {
            if provider.is_empty() {
                return Err("provider must not be empty".to_string());
            }
        }
        if let Some(Some(timeout)) = &self.timeout {
            if timeout.is_zero() {
                return Err("timeout must be positive".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("starting rip: {0}")]
    Spawn(io::Error),
    #[error("rip exited with error: {status}")]
    ExitStatus { status: ExitStatus, stderr: String },
    #[error("rip did not finish within {} seconds", .0.as_secs())]
    Timeout(Duration),
}

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("creating log file: {0}")]
    LogFile(io::Error),
    #[error("starting rip: {0}")]
    Spawn(io::Error),
    #[error("waiting for rip: {0}")]
    Wait(io::Error),
    #[error("rip did not finish within {} seconds", .0.as_secs())]
    Timeout(Duration),
}

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("starting rip: {0}")]
    Spawn(io::Error),
    #[error("rip exited with error: {0}")]
    ExitStatus(ExitStatus),
    #[error("rip did not finish within {} seconds", .0.as_secs())]
    Timeout(Duration),
}

impl Rip {
    pub fn builder() -> RipBuilder {
        RipBuilder::default()
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn command(&self) -> process::Command {
        let mut command = process::Command::new(&self.program);
        command
            .args(&self.leading_args)
            .stdin(Stdio::null())
            // a timed out future drops the child, take the process down with it
            .kill_on_drop(true);
        command
    }

    async fn bounded<F: Future>(&self, fut: F) -> Result<F::Output, Duration> {
        match self.timeout {
            None => Ok(fut.await),
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| limit),
        }
    }

    /// Search the catalog, rip writes the results as a JSON array into `output_file`.
    ///
    /// Only the exit status is checked here. Whether `output_file` exists afterwards is up to the
    /// caller.
    pub async fn search(
        &self,
        media_type: MediaType,
        query: &str,
        output_file: &Path,
    ) -> Result<(), SearchError> {
        let mut command = self.command();
        command
            .arg("search")
            .arg("--output-file")
            .arg(output_file)
            .arg(&self.provider)
            .arg(media_type.as_str())
            // queries starting with a dash are still queries
            .arg("--")
            .arg(query)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        info!(
            program = ?self.program,
            provider = %self.provider,
            %media_type,
            query,
            output_file = ?output_file,
            "running rip search"
        );

        let output = self
            .bounded(command.output())
            .await
            .map_err(SearchError::Timeout)?
            .map_err(SearchError::Spawn)?;
        debug!(
            status = %output.status,
            stdout_len = output.stdout.len(),
            stderr_len = output.stderr.len(),
            "rip search exited"
        );
        if !output.status.success() {
            return Err(SearchError::ExitStatus {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }

    /// Download one item by id, with rip's stdout and stderr both going to `log_file`.
    ///
    /// `log_file` is truncated first. A non-zero exit is not an error here: the log is worth
    /// showing either way, so the status is handed back for the caller to judge.
    pub async fn download(
        &self,
        media_type: MediaType,
        item_id: &str,
        log_file: &Path,
    ) -> Result<ExitStatus, DownloadError> {
        let log = tokio::fs::File::create(log_file)
            .await
            .map_err(DownloadError::LogFile)?
            .into_std()
            .await;
        // two handles on one open file share the offset, so interleaving is preserved
        let log_for_stderr = log.try_clone().map_err(DownloadError::LogFile)?;

        let mut command = self.command();
        command
            .arg("id")
            .arg(&self.provider)
            .arg(media_type.as_str())
            .arg("--")
            .arg(item_id)
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_for_stderr));
        info!(
            program = ?self.program,
            provider = %self.provider,
            %media_type,
            item_id,
            log_file = ?log_file,
            "running rip id"
        );

        let mut child = command.spawn().map_err(DownloadError::Spawn)?;
        let status = self
            .bounded(child.wait())
            .await
            .map_err(DownloadError::Timeout)?
            .map_err(DownloadError::Wait)?;
        debug!(%status, "rip id exited");
        Ok(status)
    }

    /// Ask rip for its version. Handy as a startup check that the program is runnable at all.
    pub async fn version(&self) -> Result<String, ProbeError> {
        let mut command = self.command();
        command
            .arg("--version")
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        let output = self
            .bounded(command.output())
            .await
            .map_err(ProbeError::Timeout)?
            .map_err(ProbeError::Spawn)?;
        if !output.status.success() {
            return Err(ProbeError::ExitStatus(output.status));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
