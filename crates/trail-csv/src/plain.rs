//! Append-only CSV writer without tamper evidence.
//!
//! Used when security is disabled: same quoting discipline as the secure
//! writer, no MAC or signature columns.

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use trail_chain::codec;
use trail_events::{AuditError, Event, TopicSchema};

#[derive(Debug)]
pub(crate) struct PlainCsvWriter {
    path: PathBuf,
    schema: TopicSchema,
    file: Mutex<Option<File>>,
}

impl PlainCsvWriter {
    pub(crate) fn open(path: impl Into<PathBuf>, schema: TopicSchema) -> Result<Self, AuditError> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| AuditError::io(&path, err))?;
        Ok(Self {
            path,
            schema,
            file: Mutex::new(Some(file)),
        })
    }

    pub(crate) async fn write_header(&self) -> Result<(), AuditError> {
        let header: Vec<String> = self.schema.fields().to_vec();
        self.append(&header).await
    }

    pub(crate) async fn write(&self, event: &Event) -> Result<(), AuditError> {
        let cells = codec::canonicalize(event, &self.schema);
        self.append(&cells).await
    }

    pub(crate) async fn flush(&self) -> Result<(), AuditError> {
        let mut guard = self.file.lock().await;
        if let Some(file) = guard.as_mut() {
            file.flush()
                .and_then(|()| file.sync_data())
                .map_err(|err| AuditError::io(&self.path, err))?;
        }
        Ok(())
    }

    pub(crate) async fn close(&self) -> Result<(), AuditError> {
        let mut guard = self.file.lock().await;
        if let Some(file) = guard.take() {
            file.sync_all().map_err(|err| AuditError::io(&self.path, err))?;
        }
        Ok(())
    }

    async fn append(&self, cells: &[String]) -> Result<(), AuditError> {
        let bytes = codec::format_row(cells)?;
        let mut guard = self.file.lock().await;
        let file = guard.as_mut().ok_or_else(|| {
            AuditError::Internal(format!("writer for {} is closed", self.path.display()))
        })?;
        file.write_all(&bytes)
            .and_then(|()| file.flush())
            .and_then(|()| file.sync_data())
            .map_err(|err| AuditError::io(&self.path, err))
    }
}

pub(crate) fn is_fresh(path: &Path) -> Result<bool, AuditError> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(meta.len() == 0),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(err) => Err(AuditError::io(path, err)),
    }
}
