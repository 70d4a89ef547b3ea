use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SortlyError {
    #[error("failed to open input workbook {path}: {reason}")]
    #[diagnostic(help("check that --file points to an .xlsx Sortly export"))]
    InputOpen { path: String, reason: String },

    #[error("malformed row {row}: {reason}")]
    MalformedRow { row: u32, reason: String },

    #[error("row {row}: ancestor folder \"{ancestor}\" does not exist yet")]
    DanglingAncestor { row: u32, ancestor: String },

    #[error("row {row}: item \"{name}\" has no parent folder")]
    TopLevelItem { row: u32, name: String },

    #[error("row {row}: \"{name}\" cannot be used as a file or folder name")]
    #[diagnostic(help("names must not contain path separators or be `.` or `..`"))]
    UnsafeName { row: u32, name: String },

    #[error("row {row}: folder name \"{name}\" is already used elsewhere in the catalog")]
    DuplicateFolderName { row: u32, name: String },

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("download failed: {0}")]
    DownloadHttp(String),

    #[error("download returned status {status} for {url}")]
    DownloadStatus { status: u16, url: String },

    #[error("failed to persist output workbook {path}: {reason}")]
    PersistFailure { path: String, reason: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid port: {0}")]
    #[diagnostic(help("use a number between 10 and 65535 without a leading zero"))]
    InvalidPort(String),

    #[error("parse job failed: {0}")]
    JobFailed(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
