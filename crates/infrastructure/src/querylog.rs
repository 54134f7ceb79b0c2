use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use warden_dns_application::ports::QueryLogSink;
use warden_dns_domain::QueryLogRecord;

const QUEUE_CAPACITY: usize = 4096;

/// Append-only JSONL query log writer.
///
/// `log` enqueues without blocking; when the writer falls behind, records
/// are dropped rather than stalling the data plane.
pub struct QueryLogWriter {
    tx: Option<mpsc::Sender<QueryLogRecord>>,
}

impl QueryLogWriter {
    pub fn start(path: PathBuf, enabled: bool, shutdown: CancellationToken) -> Self {
        if !enabled {
            return Self { tx: None };
        }
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(writer_loop(path, rx, shutdown));
        Self { tx: Some(tx) }
    }

    /// A writer that swallows everything, for tests.
    pub fn disabled() -> Self {
        Self { tx: None }
    }
}

async fn writer_loop(
    path: PathBuf,
    mut rx: mpsc::Receiver<QueryLogRecord>,
    shutdown: CancellationToken,
) {
    if let Some(parent) = path.parent() {
        let _ = tokio::fs::create_dir_all(parent).await;
    }
    let mut file = match OpenOptions::new().create(true).append(true).open(&path).await {
        Ok(f) => f,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Query log disabled: cannot open file");
            return;
        }
    };

    loop {
        let record = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Query log writer: shutting down");
                let _ = file.flush().await;
                return;
            }
            item = rx.recv() => match item {
                Some(r) => r,
                None => return,
            },
        };

        match serde_json::to_vec(&record) {
            Ok(mut line) => {
                line.push(b'\n');
                if let Err(e) = file.write_all(&line).await {
                    warn!(error = %e, "Query log write failed");
                }
            }
            Err(e) => warn!(error = %e, "Query log record serialization failed"),
        }
    }
}

impl QueryLogSink for QueryLogWriter {
    fn log(&self, record: QueryLogRecord) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(record);
        }
    }
}
