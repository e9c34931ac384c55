//! FileDispatcher - appends Dispatches to daily JSON-lines files

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use contracts::{DeliveryCallback, Dispatch, Dispatcher, Disposable};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, instrument};

/// Configuration for FileDispatcher
#[derive(Debug, Clone)]
pub struct FileDispatcherConfig {
    /// Base output directory
    pub base_path: PathBuf,
}

impl FileDispatcherConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let base_path = params
            .get("base_path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output"));

        Self { base_path }
    }
}

/// Dispatcher that writes each batch to `<base_path>/<name>-<YYYY-MM-DD>.jsonl`
///
/// A batch is acknowledged only once every line of it has been written and flushed;
/// a failed write releases it for the next drain.
pub struct FileDispatcher {
    name: String,
    dispatch_limit: usize,
    config: FileDispatcherConfig,
}

impl FileDispatcher {
    /// Create a new FileDispatcher
    pub fn new(
        name: impl Into<String>,
        dispatch_limit: usize,
        config: FileDispatcherConfig,
    ) -> std::io::Result<Self> {
        // Create base directory if it doesn't exist
        std::fs::create_dir_all(&config.base_path)?;

        Ok(Self {
            name: name.into(),
            dispatch_limit: dispatch_limit.max(1),
            config,
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        dispatch_limit: usize,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        Self::new(name, dispatch_limit, FileDispatcherConfig::from_params(params))
    }

    /// File the current day's Dispatches go to
    pub fn current_file(&self) -> PathBuf {
        let day = chrono::Utc::now().format("%Y-%m-%d");
        self.config
            .base_path
            .join(format!("{}-{}.jsonl", self.name, day))
    }
}

async fn append_lines(path: &Path, batch: &[Dispatch]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut buffer = Vec::new();
    for dispatch in batch {
        serde_json::to_writer(&mut buffer, dispatch)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        buffer.push(b'\n');
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(&buffer).await?;
    file.flush().await
}

impl Dispatcher for FileDispatcher {
    fn id(&self) -> &str {
        &self.name
    }

    fn dispatch_limit(&self) -> usize {
        self.dispatch_limit
    }

    #[instrument(
        name = "file_dispatcher_dispatch",
        skip(self, batch, callback),
        fields(dispatcher = %self.name, size = batch.len())
    )]
    fn dispatch(&self, batch: Vec<Dispatch>, callback: DeliveryCallback) -> Disposable {
        let path = self.current_file();
        let name = self.name.clone();

        let task = tokio::spawn(async move {
            match append_lines(&path, &batch).await {
                Ok(()) => {
                    debug!(dispatcher = %name, path = %path.display(), count = batch.len(), "Written");
                    callback.delivered(batch);
                }
                Err(e) => {
                    error!(dispatcher = %name, path = %path.display(), error = %e, "Write failed");
                    callback.failed(batch);
                }
            }
        });
        Disposable::from_task(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Payload;
    use serde_json::json;

    fn dispatch(id: &str, event: &str) -> Dispatch {
        let mut payload = Payload::new();
        payload.insert("event_name".into(), json!(event));
        Dispatch::new(id, 1_700_000_000_000, payload)
    }

    #[test]
    fn test_file_config_defaults() {
        let config = FileDispatcherConfig::from_params(&HashMap::new());
        assert_eq!(config.base_path, PathBuf::from("./output"));
    }

    #[tokio::test]
    async fn test_file_dispatcher_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let params = HashMap::from([(
            "base_path".to_string(),
            dir.path().to_string_lossy().to_string(),
        )]);
        let dispatcher = FileDispatcher::from_params("archive", 10, &params).unwrap();

        let (callback, mut rx) = DeliveryCallback::channel(1);
        dispatcher.dispatch(vec![dispatch("a", "open"), dispatch("b", "close")], callback);
        let report = rx.recv().await.unwrap();
        assert_eq!(report.delivered.len(), 2);

        let (callback, mut rx) = DeliveryCallback::channel(2);
        dispatcher.dispatch(vec![dispatch("c", "open")], callback);
        rx.recv().await.unwrap();

        let contents = std::fs::read_to_string(dispatcher.current_file()).unwrap();
        let lines: Vec<Dispatch> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].id, "b");
        assert_eq!(lines[2].event_name(), Some("open"));
    }

    #[tokio::test]
    async fn test_file_dispatcher_releases_batch_on_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = FileDispatcherConfig {
            base_path: dir.path().to_path_buf(),
        };
        let dispatcher = FileDispatcher::new("archive", 10, config).unwrap();
        // A directory where the day's file should be makes the open fail
        std::fs::create_dir_all(dispatcher.current_file()).unwrap();

        let (callback, mut rx) = DeliveryCallback::channel(1);
        dispatcher.dispatch(vec![dispatch("a", "open")], callback);

        let report = rx.recv().await.unwrap();
        assert!(report.delivered.is_empty());
        assert_eq!(report.failed[0].id, "a");
    }
}
