//! Background parse jobs for uploaded workbooks.
//!
//! An upload is first staged under `<root>/temp-files/`, then parsed on a worker
//! thread. The caller keeps a [`ParseJob`] handle to poll or wait for the report.

use std::fs;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{error, info};

use crate::app::{App, Report};
use crate::config::ParserConfig;
use crate::error::SortlyError;
use crate::fetch::MediaFetcher;
use crate::progress::ProgressSink;

/// Writes uploaded bytes into the staging directory and returns the staged path.
/// Only the final component of `file_name` is kept.
pub fn stage_upload(
    config: &ParserConfig,
    file_name: &str,
    bytes: &[u8],
) -> Result<Utf8PathBuf, SortlyError> {
    let base_name = Utf8Path::new(&file_name.replace('\\', "/"))
        .file_name()
        .map(str::to_string)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| SortlyError::InvalidConfig(format!("invalid upload name {file_name:?}")))?;

    let staging = config.staging_dir();
    fs::create_dir_all(staging.as_std_path())
        .map_err(|err| SortlyError::Filesystem(format!("create {staging}: {err}")))?;
    let path = staging.join(base_name);
    fs::write(path.as_std_path(), bytes)
        .map_err(|err| SortlyError::Filesystem(format!("write {path}: {err}")))?;
    info!(%path, size = bytes.len(), "upload staged");
    Ok(path)
}

#[derive(Debug, Clone)]
pub enum JobStatus {
    Running,
    Finished(Report),
    Failed(String),
}

pub struct ParseJob {
    input: Utf8PathBuf,
    status: Arc<Mutex<JobStatus>>,
    handle: JoinHandle<Result<Report, SortlyError>>,
}

impl ParseJob {
    pub fn spawn<F: MediaFetcher + 'static>(
        app: App<F>,
        config: ParserConfig,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<Self, SortlyError> {
        let input = config
            .file_path
            .clone()
            .ok_or_else(|| SortlyError::InvalidConfig("no input file given".to_string()))?;
        let status = Arc::new(Mutex::new(JobStatus::Running));
        let shared = Arc::clone(&status);
        let handle = thread::spawn(move || {
            let result = app.run(&config, sink.as_ref());
            let next = match &result {
                Ok(report) => JobStatus::Finished(report.clone()),
                Err(err) => {
                    error!("parse job failed: {err}");
                    JobStatus::Failed(err.to_string())
                }
            };
            match shared.lock() {
                Ok(mut guard) => *guard = next,
                Err(poisoned) => *poisoned.into_inner() = next,
            }
            result
        });
        Ok(Self {
            input,
            status,
            handle,
        })
    }

    pub fn input(&self) -> &Utf8Path {
        &self.input
    }

    pub fn status(&self) -> JobStatus {
        match self.status.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn wait(self) -> Result<Report, SortlyError> {
        self.handle
            .join()
            .map_err(|_| SortlyError::JobFailed("worker thread panicked".to_string()))?
    }
}
