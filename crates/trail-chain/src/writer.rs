//! The secure CSV writer: MAC-chained data rows and scheduled signature
//! rows behind a single exclusive lock.

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use trail_events::{AlgorithmsConfig, AuditError, Event, SecurityConfig, TopicSchema};

use crate::codec;
use crate::keystore::{KeyStore, CURRENT_KEY_ALIAS, CURRENT_SIGNATURE_ALIAS, INITIAL_KEY_ALIAS, SIGNATURE_ALIAS};
use crate::mac::{MacAlgorithm, MacEngine};
use crate::signer::{RowSigner, SignatureAlgorithm};

/// Construction-time knobs for one secure writer.
#[derive(Debug, Clone)]
pub struct SecureWriterOptions {
    pub signature_interval: Duration,
    pub mac_algorithm: MacAlgorithm,
    pub signature_algorithm: SignatureAlgorithm,
}

impl SecureWriterOptions {
    /// Resolves the configured algorithm names, rejecting unknown ones.
    pub fn from_config(
        security: &SecurityConfig,
        algorithms: &AlgorithmsConfig,
    ) -> Result<Self, AuditError> {
        Ok(Self {
            signature_interval: security.signature_interval(),
            mac_algorithm: MacAlgorithm::from_name(&algorithms.mac)?,
            signature_algorithm: SignatureAlgorithm::from_name(&algorithms.signature)?,
        })
    }
}

/// Appends MAC-chained rows to one topic log and periodically seals them
/// with a signature row.
///
/// All mutations (data writes, the scheduled signature, close) contend
/// for the single state lock, so rows appear in lock-acquisition order
/// and a signature row seals exactly the rows appended before it. The
/// lock hands out permits in FIFO order, so the signature task cannot
/// starve under a steady stream of writes.
#[derive(Clone)]
pub struct SecureCsvWriter {
    shared: Arc<WriterShared>,
}

struct WriterShared {
    path: PathBuf,
    signature_interval: Duration,
    state: Mutex<WriterState>,
}

struct WriterState {
    file: Option<File>,
    keystore: KeyStore,
    schema: TopicSchema,
    engine: MacEngine,
    signer: RowSigner,
    last_mac: Option<String>,
    last_signature: Vec<u8>,
    signature_task: Option<JoinHandle<()>>,
    signature_armed: bool,
    fresh: bool,
    closed: bool,
}

impl SecureCsvWriter {
    /// Opens (or creates) the log at `path` and binds its chain state.
    ///
    /// A fresh log starts its chain from `InitialKey` and copies it to
    /// `CurrentKey`; an existing log resumes from `CurrentKey` and
    /// `CurrentSignature`, recovering the last MAC cell from the file.
    pub fn open(
        path: impl Into<PathBuf>,
        schema: TopicSchema,
        mut keystore: KeyStore,
        options: SecureWriterOptions,
    ) -> Result<Self, AuditError> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| AuditError::io(&path, err))?;
        let fresh = file
            .metadata()
            .map_err(|err| AuditError::io(&path, err))?
            .len()
            == 0;

        let signer = RowSigner::new(
            options.signature_algorithm,
            keystore.read_private(SIGNATURE_ALIAS)?,
        );

        let (secret, last_signature, last_mac) = if fresh {
            let secret = keystore.read_secret(INITIAL_KEY_ALIAS)?;
            keystore.write_secret(CURRENT_KEY_ALIAS, &secret)?;
            (secret, Vec::new(), None)
        } else {
            let secret = keystore.read_secret(CURRENT_KEY_ALIAS)?;
            let last_signature = if keystore.contains(CURRENT_SIGNATURE_ALIAS) {
                keystore.read_secret(CURRENT_SIGNATURE_ALIAS)?
            } else {
                Vec::new()
            };
            let last_mac = recover_last_mac(&path, schema.fields().len())?;
            (secret, last_signature, last_mac)
        };

        debug!(path = %path.display(), topic = %schema.name(), fresh, "secure writer opened");

        let state = WriterState {
            file: Some(file),
            keystore,
            engine: MacEngine::new(options.mac_algorithm, secret),
            signer,
            schema,
            last_mac,
            last_signature,
            signature_task: None,
            signature_armed: false,
            fresh,
            closed: false,
        };

        Ok(Self {
            shared: Arc::new(WriterShared {
                path,
                signature_interval: options.signature_interval,
                state: Mutex::new(state),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Emits the header row: schema fields plus `HMAC` and `SIGNATURE`.
    /// Valid once, on a freshly created file.
    pub async fn write_header(&self) -> Result<(), AuditError> {
        let mut state = self.shared.state.lock().await;
        state.ensure_open(&self.shared.path)?;
        if !state.fresh {
            return Err(AuditError::Internal(format!(
                "log {} already carries a header",
                self.shared.path.display()
            )));
        }
        let header = codec::secure_header(&state.schema);
        if let Err(err) = state.append_row(&self.shared.path, &header) {
            state.poison();
            return Err(err);
        }
        state.fresh = false;
        Ok(())
    }

    /// Appends one data row with a fresh MAC cell and advances the chain.
    ///
    /// An I/O or key-store failure here is fatal to the writer: the chain
    /// state does not advance and the file handle is dropped so a
    /// divergent log cannot grow.
    pub async fn write(&self, event: &Event) -> Result<(), AuditError> {
        let mut state = self.shared.state.lock().await;
        state.ensure_open(&self.shared.path)?;

        let cells = codec::canonicalize(event, &state.schema);
        let (mac, next_secret) = state.engine.mac(&cells)?;
        let mac_b64 = STANDARD.encode(&mac);

        let mut row = cells;
        row.push(mac_b64.clone());
        row.push(String::new());

        if let Err(err) = state.append_row(&self.shared.path, &row) {
            state.poison();
            return Err(err);
        }
        if let Err(err) = state.keystore.write_secret(CURRENT_KEY_ALIAS, &next_secret) {
            state.poison();
            return Err(err);
        }
        state.engine.commit(next_secret);
        state.last_mac = Some(mac_b64);

        self.arm_signature(&mut state);
        Ok(())
    }

    /// Forces pending file I/O to disk.
    pub async fn flush(&self) -> Result<(), AuditError> {
        let mut state = self.shared.state.lock().await;
        if let Some(file) = state.file.as_mut() {
            file.flush()
                .and_then(|()| file.sync_data())
                .map_err(|err| AuditError::io(&self.shared.path, err))?;
        }
        Ok(())
    }

    /// Cancels any pending signature task, emitting its signature row
    /// inline when the cancel won the race, then closes the file.
    /// Idempotent: a second close emits nothing.
    pub async fn close(&self) -> Result<(), AuditError> {
        let mut state = self.shared.state.lock().await;
        if state.closed {
            return Ok(());
        }
        if let Some(task) = state.signature_task.take() {
            task.abort();
        }
        let result = if state.signature_armed {
            state.signature_armed = false;
            state.write_signature(&self.shared.path)
        } else {
            Ok(())
        };
        state.closed = true;
        if let Some(file) = state.file.take() {
            if let Err(err) = file.sync_all() {
                return result.and(Err(AuditError::io(&self.shared.path, err)));
            }
        }
        debug!(path = %self.shared.path.display(), "secure writer closed");
        result
    }

    /// Arms the signature timer unless one is already pending, so bursts
    /// of writes yield one signature per interval.
    fn arm_signature(&self, state: &mut WriterState) {
        if state.signature_armed || state.closed {
            return;
        }
        state.signature_armed = true;
        let shared = Arc::downgrade(&self.shared);
        let interval = self.shared.signature_interval;
        state.signature_task = Some(tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let mut state = shared.state.lock().await;
            if !state.signature_armed || state.closed {
                return;
            }
            state.signature_armed = false;
            if let Err(err) = state.write_signature(&shared.path) {
                warn!(
                    path = %shared.path.display(),
                    error = %err,
                    "scheduled signature row failed, writer closed"
                );
            }
        }));
    }
}

impl WriterState {
    fn ensure_open(&self, path: &Path) -> Result<(), AuditError> {
        if self.closed || self.file.is_none() {
            return Err(AuditError::Internal(format!(
                "secure writer for {} is closed",
                path.display()
            )));
        }
        Ok(())
    }

    fn append_row(&mut self, path: &Path, cells: &[String]) -> Result<(), AuditError> {
        let bytes = codec::format_row(cells)?;
        let file = self.file.as_mut().ok_or_else(|| {
            AuditError::Internal(format!("secure writer for {} is closed", path.display()))
        })?;
        file.write_all(&bytes)
            .and_then(|()| file.flush())
            .and_then(|()| file.sync_data())
            .map_err(|err| AuditError::io(path, err))
    }

    /// Appends a signature row binding the chain so far and persists the
    /// new signature. Poisons the writer on any failure.
    fn write_signature(&mut self, path: &Path) -> Result<(), AuditError> {
        let last_mac = self.last_mac.clone().unwrap_or_default();
        let signature = self.signer.sign(&self.last_signature, &last_mac);
        let row = codec::signature_row(self.schema.fields().len(), &STANDARD.encode(&signature));

        if let Err(err) = self.append_row(path, &row) {
            self.poison();
            return Err(err);
        }
        if let Err(err) = self
            .keystore
            .write_secret(CURRENT_SIGNATURE_ALIAS, &signature)
        {
            self.poison();
            return Err(err);
        }
        self.last_signature = signature;
        Ok(())
    }

    fn poison(&mut self) {
        self.file = None;
        self.closed = true;
        if let Some(task) = self.signature_task.take() {
            task.abort();
        }
    }
}

/// Recovers the most recent MAC cell from an existing log so a restarted
/// writer can sign the resumed chain.
fn recover_last_mac(path: &Path, schema_width: usize) -> Result<Option<String>, AuditError> {
    let mut reader = codec::RowReader::open(path)?;
    let mut last_mac = None;
    let mut first = true;
    while let Some(row) = reader.next_row()? {
        if first {
            first = false;
            continue;
        }
        if row.len() != schema_width + 2 {
            continue;
        }
        let signature_cell = &row[schema_width + 1];
        if signature_cell.is_empty() && !row[schema_width].is_empty() {
            last_mac = Some(row[schema_width].clone());
        }
    }
    Ok(last_mac)
}
