use std::io::Read;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::SortlyError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// An open response body.
pub struct MediaBody {
    pub content_length: Option<u64>,
    pub reader: Box<dyn Read + Send>,
}

pub trait MediaFetcher: Send + Sync {
    /// Issues a single GET. No retries.
    fn open(&self, url: &str) -> Result<MediaBody, SortlyError>;
}

#[derive(Clone)]
pub struct HttpMediaFetcher {
    client: Client,
}

impl HttpMediaFetcher {
    pub fn new(timeout: Duration) -> Result<Self, SortlyError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("sortly-parser/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SortlyError::DownloadHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| SortlyError::DownloadHttp(err.to_string()))?;
        Ok(Self { client })
    }
}

impl MediaFetcher for HttpMediaFetcher {
    fn open(&self, url: &str) -> Result<MediaBody, SortlyError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| SortlyError::DownloadHttp(err.to_string()))?;
        if !response.status().is_success() {
            return Err(SortlyError::DownloadStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(MediaBody {
            content_length: response.content_length(),
            reader: Box::new(response),
        })
    }
}
