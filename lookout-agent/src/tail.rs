//! Incremental reader for the game's console log.
//!
//! `LogWatcher` reports when the log changes and `LogTail` reads whatever
//! was appended since the last read.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::Result;

/// File system change notifications for the console log.
pub struct LogWatcher {
    path: PathBuf,
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    /// Notifications stop when this is dropped
    _watcher: RecommendedWatcher,
}

impl LogWatcher {
    /// Watches the log's directory, so a log created after startup is still seen.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (sender, events) = mpsc::unbounded_channel::<notify::Result<Event>>();

        let mut watcher = notify::recommended_watcher(move |result| {
            if sender.send(result).is_err() {
                debug!("console log watcher receiver dropped");
            }
        })?;

        let directory = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        watcher.watch(directory, RecursiveMode::NonRecursive)?;

        Ok(Self {
            path,
            events,
            _watcher: watcher,
        })
    }

    /// Wait until the log is created or written to. `None` once the watcher has shut down.
    pub async fn changed(&mut self) -> Option<()> {
        while let Some(result) = self.events.recv().await {
            match result {
                Ok(event) if self.is_relevant(&event) => return Some(()),
                Ok(_) => {}
                Err(err) => warn!(error = %err, "console log watcher error"),
            }
        }
        None
    }

    fn is_relevant(&self, event: &Event) -> bool {
        if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
            return false;
        }
        let Some(file_name) = self.path.file_name() else {
            return false;
        };
        event
            .paths
            .iter()
            .any(|path| path == &self.path || path.file_name() == Some(file_name))
    }
}

pub struct LogTail {
    path: PathBuf,
    offset: u64,
    /// Trailing bytes of a line the game hasn't finished writing
    partial: Vec<u8>,
}

impl LogTail {
    /// Start tailing from the current end of the file, so old sessions aren't replayed.
    pub async fn open_at_end(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let offset = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => 0,
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            offset,
            partial: Vec::new(),
        })
    }

    /// Complete lines appended since the last call.
    pub async fn read_new_lines(&mut self) -> Result<Vec<String>> {
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        // The game truncates the log when it restarts
        let len = file.metadata().await?.len();
        if len < self.offset {
            self.offset = 0;
            self.partial.clear();
        }

        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut buf = std::mem::take(&mut self.partial);
        let read = file.read_to_end(&mut buf).await?;
        self.offset = self.offset.saturating_add(read as u64);

        let Some(last_newline) = buf.iter().rposition(|&b| b == b'\n') else {
            self.partial = buf;
            return Ok(Vec::new());
        };
        self.partial = buf.split_off(last_newline + 1);

        Ok(String::from_utf8_lossy(&buf)
            .lines()
            .map(|line| line.trim_end_matches('\r').to_string())
            .filter(|line| !line.is_empty())
            .collect())
    }
}
