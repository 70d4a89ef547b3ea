use std::fs::{self, File};
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

use camino::Utf8Path;
use tracing::{debug, warn};

use crate::config::ParserConfig;
use crate::domain::{CellCoordinate, Folder, Forest, Item, MaterializationOutcome, SlotStatus};
use crate::error::SortlyError;
use crate::fetch::MediaFetcher;
use crate::naming::{NamingScheme, SlotNamer};
use crate::progress::{ProgressEvent, ProgressSink};

/// Downloads every referenced photo into a directory tree mirroring the forest.
pub struct Materializer<'a, F: MediaFetcher + ?Sized> {
    fetcher: &'a F,
    root_folder: &'a Utf8Path,
    root_links: &'a str,
    naming: NamingScheme,
    started: AtomicUsize,
}

impl<'a, F: MediaFetcher + ?Sized> Materializer<'a, F> {
    pub fn new(fetcher: &'a F, config: &'a ParserConfig) -> Self {
        Self {
            fetcher,
            root_folder: &config.root_folder,
            root_links: &config.root_links,
            naming: config.naming,
            started: AtomicUsize::new(0),
        }
    }

    /// Visits folders in pre-order; within a folder its own photos come first, then its items.
    pub fn materialize(
        &self,
        forest: &Forest,
        sink: &dyn ProgressSink,
    ) -> Vec<MaterializationOutcome> {
        let total = forest.image_count();
        let mut outcomes = Vec::with_capacity(total);
        for id in forest.preorder() {
            let folder = forest.folder(id);
            let entries = folder.self_item.iter().chain(folder.items.iter());
            for item in entries {
                self.materialize_item(folder, item, total, sink, &mut outcomes);
            }
        }
        outcomes
    }

    fn materialize_item(
        &self,
        folder: &Folder,
        item: &Item,
        total: usize,
        sink: &dyn ProgressSink,
        outcomes: &mut Vec<MaterializationOutcome>,
    ) {
        if item.photo_urls.is_empty() {
            return;
        }

        let namer = SlotNamer::new(self.naming, &item.name);
        let directory = self.root_folder.join(&folder.path);
        let storage_error = match fs::create_dir_all(directory.as_std_path()) {
            Ok(()) => None,
            Err(err) => {
                warn!(row = item.source_row, %directory, "cannot create directory: {err}");
                Some(format!("create directory {directory}: {err}"))
            }
        };

        for (index, url) in item.photo_urls.iter().enumerate() {
            let slot = index + 1;
            let file_name = namer.file_name(slot, url);
            let local_path = directory.join(&file_name);
            let result = match &storage_error {
                Some(reason) => Err(SortlyError::StorageUnavailable(reason.clone())),
                None => self.materialize_slot(url, &local_path, &file_name, total, sink),
            };
            let (status, failure) = match result {
                Ok(status) => (status, None),
                Err(err) => {
                    warn!(row = item.source_row, slot, url = %url, "photo not materialized: {err}");
                    (SlotStatus::Failed, Some(err.to_string()))
                }
            };
            outcomes.push(MaterializationOutcome {
                cell: CellCoordinate::photo_slot(slot, item.source_row),
                url: url.clone(),
                local_path: local_path.to_string(),
                public_link: format!("{}{}{}", self.root_links, folder.path, file_name),
                status,
                failure,
            });
        }
    }

    fn materialize_slot(
        &self,
        url: &str,
        local_path: &Utf8Path,
        file_name: &str,
        total: usize,
        sink: &dyn ProgressSink,
    ) -> Result<SlotStatus, SortlyError> {
        let exists = local_path
            .as_std_path()
            .try_exists()
            .map_err(|err| SortlyError::StorageUnavailable(format!("check {local_path}: {err}")))?;
        if exists {
            debug!(%local_path, "already present");
            return Ok(SlotStatus::AlreadyPresent);
        }

        let ordinal = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self.download(url, local_path, file_name, ordinal, total, sink);
        sink.event(ProgressEvent::DownloadFinished { ok: result.is_ok() });
        result.map(|_| SlotStatus::Downloaded)
    }

    fn download(
        &self,
        url: &str,
        local_path: &Utf8Path,
        file_name: &str,
        ordinal: usize,
        total: usize,
        sink: &dyn ProgressSink,
    ) -> Result<u64, SortlyError> {
        let mut body = self.fetcher.open(url)?;
        sink.event(ProgressEvent::DownloadStarted {
            ordinal,
            total,
            file_name: file_name.to_string(),
            content_length: body.content_length,
        });

        let file = File::create(local_path.as_std_path())
            .map_err(|err| SortlyError::StorageUnavailable(format!("create {local_path}: {err}")))?;
        let mut writer = ProgressWriter {
            inner: file,
            sink,
            write_failed: false,
        };
        match io::copy(&mut body.reader, &mut writer) {
            Ok(bytes) => Ok(bytes),
            Err(err) => {
                // A truncated file would pass the existence check on the next run.
                let _ = fs::remove_file(local_path.as_std_path());
                if writer.write_failed {
                    Err(SortlyError::StorageUnavailable(format!(
                        "write {local_path}: {err}"
                    )))
                } else {
                    Err(SortlyError::DownloadHttp(format!(
                        "transfer of {url} interrupted: {err}"
                    )))
                }
            }
        }
    }
}

/// Forwards bytes to the target file and remembers whether the file side failed,
/// so storage errors are not reported as transfer errors.
struct ProgressWriter<'a, W: Write> {
    inner: W,
    sink: &'a dyn ProgressSink,
    write_failed: bool,
}

impl<W: Write> Write for ProgressWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf).inspect_err(|_| self.write_failed = true)?;
        self.sink.event(ProgressEvent::Bytes(written as u64));
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().inspect_err(|_| self.write_failed = true)
    }
}
