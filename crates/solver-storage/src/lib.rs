//! Checkpoint Store (SPEC_FULL.md §4.B): durable per-chain scan progress.
//!
//! A single JSON document maps chain name to `{chainId, lastIndexedBlock,
//! lastUpdated}`. Writes go through a temp-file-then-rename dance in the same
//! directory as the target file, serialized by a process-wide mutex so concurrent
//! writers (there is normally only one, the Manager) never interleave. Reads retry
//! a few times with a short backoff to tolerate observing a rename mid-flight.

use serde_json;
use solver_types::{ChainCheckpoint, ChainId, Checkpoint};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum CheckpointError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
	#[error("checkpoint file unreadable after {0} retries: {1}")]
	Unreadable(u32, String),
}

const READ_RETRIES: u32 = 3;
const READ_RETRY_BACKOFF: Duration = Duration::from_millis(25);

/// File-backed, mutex-serialized checkpoint document.
pub struct CheckpointStore {
	path: PathBuf,
	write_lock: Mutex<()>,
}

impl CheckpointStore {
	/// Opens (without yet reading) the checkpoint document at `path`.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		CheckpointStore {
			path: path.into(),
			write_lock: Mutex::new(()),
		}
	}

	/// Loads the full checkpoint document, retrying on transient parse failures
	/// (a concurrent writer observed mid-rename). Returns an empty `Checkpoint` if
	/// the file does not exist yet — the caller seeds per-chain defaults from config.
	pub async fn get(&self) -> Result<Checkpoint, CheckpointError> {
		let mut last_err = None;
		for attempt in 0..=READ_RETRIES {
			match self.try_read().await {
				Ok(cp) => return Ok(cp),
				Err(e) => {
					last_err = Some(e);
					if attempt < READ_RETRIES {
						tokio::time::sleep(READ_RETRY_BACKOFF).await;
					}
				}
			}
		}
		Err(CheckpointError::Unreadable(
			READ_RETRIES,
			last_err.map(|e| e.to_string()).unwrap_or_default(),
		))
	}

	async fn try_read(&self) -> Result<Checkpoint, CheckpointError> {
		match tokio::fs::read(&self.path).await {
			Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Checkpoint::default()),
			Err(e) => Err(CheckpointError::Io(e)),
		}
	}

	/// Returns one chain's checkpoint, or `None` if it has never been written.
	pub async fn get_chain(&self, chain_id: ChainId) -> Result<Option<ChainCheckpoint>, CheckpointError> {
		Ok(self.get().await?.get(chain_id).copied())
	}

	/// Upserts one chain's checkpoint and persists the whole document atomically.
	pub async fn update(&self, cp: ChainCheckpoint) -> Result<(), CheckpointError> {
		let _guard = self.write_lock.lock().await;
		let mut doc = self.try_read().await.unwrap_or_default();
		doc.upsert(cp);
		self.write_atomic(&doc).await
	}

	/// Upserts several chains' checkpoints as a single atomic write, so a crash
	/// never leaves one chain's advance unpersisted while another's lands.
	pub async fn update_batch(&self, entries: Vec<ChainCheckpoint>) -> Result<(), CheckpointError> {
		let _guard = self.write_lock.lock().await;
		let mut doc = self.try_read().await.unwrap_or_default();
		for cp in entries {
			doc.upsert(cp);
		}
		self.write_atomic(&doc).await
	}

	async fn write_atomic(&self, doc: &Checkpoint) -> Result<(), CheckpointError> {
		if let Some(parent) = self.path.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}
		let tmp_path = Self::temp_path(&self.path);
		let bytes = serde_json::to_vec_pretty(doc)?;

		let tmp_path_for_sync = tmp_path.clone();
		let bytes_for_sync = bytes.clone();
		tokio::task::spawn_blocking(move || -> std::io::Result<()> {
			use std::io::Write;
			let mut f = std::fs::OpenOptions::new()
				.create(true)
				.write(true)
				.truncate(true)
				.open(&tmp_path_for_sync)?;
			f.write_all(&bytes_for_sync)?;
			f.sync_all()?;
			Ok(())
		})
		.await
		.map_err(|e| CheckpointError::Io(std::io::Error::other(e.to_string())))??;

		tokio::fs::rename(&tmp_path, &self.path).await?;
		Ok(())
	}

	fn temp_path(path: &Path) -> PathBuf {
		let file_name = path
			.file_name()
			.map(|n| format!(".{}.tmp", n.to_string_lossy()))
			.unwrap_or_else(|| ".checkpoint.tmp".to_string());
		match path.parent() {
			Some(parent) => parent.join(file_name),
			None => PathBuf::from(file_name),
		}
	}
}

pub fn now_unix() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("system clock before unix epoch")
		.as_secs()
}
