//! File hashing: the unit of work behind the `parexec` binary.

use anyhow::{Context, Result};
use blake3::Hasher;
use log::debug;
use memmap2::Mmap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use super::helper::TaskHelper;
use crate::types::{Cancelled, Task, TaskFailure, Timeout};
use crate::utils::config::HashingConsts;

/// Hash a file with blake3. Uses memory-mapped I/O for files above threshold, chunked reading
/// otherwise. Stops early with an error when the running unit of work is cancelled.
pub fn hash_file(path: &Path) -> Result<[u8; 32]> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let size = file.metadata()?.len();
    let mut hasher = Hasher::new();

    if size > HashingConsts::HASH_MMAP_THRESHOLD {
        // Blake3 already uses SIMD internally
        let mmap = unsafe { Mmap::map(&file)? };
        hasher.update(&mmap);
    } else {
        let mut reader =
            std::io::BufReader::with_capacity(HashingConsts::HASH_READ_CHUNK_SIZE, file);
        let mut buffer = vec![0u8; HashingConsts::HASH_READ_CHUNK_SIZE];
        loop {
            if crate::interrupted() {
                anyhow::bail!("hashing of {} cancelled", path.display());
            }
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
    }

    Ok(*hasher.finalize().as_bytes())
}

/// A file and its blake3 digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileDigest {
    pub path: PathBuf,
    pub hash: [u8; 32],
}

impl FileDigest {
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.hash).to_hex().to_string()
    }
}

impl fmt::Display for FileDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}  {}", self.to_hex(), self.path.display())
    }
}

/// Task helper hashing one file per operand. Recovery yields `None`; the caller learns which
/// file failed from the batch bookkeeping.
#[derive(Clone, Copy, Debug, Default)]
pub struct HashHelper;

impl TaskHelper<PathBuf, Option<FileDigest>> for HashHelper {
    fn new_task(&self, operand: &PathBuf) -> Result<Task<Option<FileDigest>>> {
        let path = operand.clone();
        Ok(Box::new(move || {
            let hash = hash_file(&path)?;
            Ok(Some(FileDigest { path, hash }))
        }))
    }

    fn on_execution_failure(
        &self,
        cause: &TaskFailure,
        operand: Option<&PathBuf>,
    ) -> Option<FileDigest> {
        debug!("No digest for {:?}: {}", operand, cause);
        None
    }

    fn on_cancelled(&self, _cause: &Cancelled, _operand: &PathBuf) -> Option<FileDigest> {
        None
    }

    fn on_timeout(&self, _cause: &Timeout, _operand: Option<&PathBuf>) -> Option<FileDigest> {
        None
    }
}
