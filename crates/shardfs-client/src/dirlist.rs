//! Batched directory enumeration.
//!
//! Listing runs a two-phase protocol over a descriptor the enumerator opens
//! and closes itself: one native call fetches up to [`BATCH_SIZE`] raw
//! entries (inode id + name), a second bulk-resolves their attributes by id.
//! Resolved records are matched back to names by inode id, not position:
//! the resolve call may legitimately return fewer records than asked for
//! when an entry is deleted between the two phases, and such entries are
//! dropped from the result rather than failing the listing. The result is
//! not a snapshot: a directory mutating concurrently with enumeration may
//! be seen partially.

use crate::attr::FileStat;
use crate::binding::{NativeBinding, RawDirent, StatRecord};
use crate::error::{Result, StorageError};
use crate::flags::O_RDONLY;
use crate::path::PathToken;
use crate::status::{self, STATUS_NOT_FOUND};
use std::collections::HashMap;
use std::sync::Arc;

pub const BATCH_SIZE: usize = 100;

// Directory descriptors are opened read-only with this mode, matching the
// facade's default for non-creating opens.
const DIR_OPEN_MODE: u32 = 0o644;

/// Closes the enumeration descriptor on every exit path.
struct FdGuard<'a> {
    binding: &'a Arc<dyn NativeBinding>,
    client_id: i64,
    fd: i32,
}

impl Drop for FdGuard<'_> {
    fn drop(&mut self) {
        self.binding.close(self.client_id, self.fd);
    }
}

pub struct DirEnumerator {
    binding: Arc<dyn NativeBinding>,
    client_id: i64,
}

impl DirEnumerator {
    pub(crate) fn new(binding: Arc<dyn NativeBinding>, client_id: i64) -> Self {
        Self { binding, client_id }
    }

    /// Enumerate and resolve every entry of `path`, accumulating across
    /// batches until the directory reports no more raw entries.
    pub fn list(&self, path: &PathToken) -> Result<Vec<FileStat>> {
        let fd = self
            .binding
            .open(self.client_id, path.as_str(), O_RDONLY, DIR_OPEN_MODE, 0, 0);
        if fd < 0 {
            return Err(status::translate("opendir", path.as_str(), fd as i64));
        }
        let _guard = FdGuard {
            binding: &self.binding,
            client_id: self.client_id,
            fd,
        };

        let mut entries = Vec::new();
        loop {
            let raw = self.next_batch(fd, path, &mut entries)?;
            if raw == 0 {
                break;
            }
        }
        tracing::debug!("Listed {}: {} entries", path, entries.len());
        Ok(entries)
    }

    /// One enumerate+resolve round. Returns the raw entry count, which
    /// drives the loop: zero means the directory is exhausted.
    fn next_batch(&self, fd: i32, path: &PathToken, acc: &mut Vec<FileStat>) -> Result<usize> {
        let mut dents = vec![RawDirent::default(); BATCH_SIZE];
        let count = self.binding.readdir(self.client_id, fd, &mut dents);
        if count as i64 == STATUS_NOT_FOUND {
            return Err(StorageError::NotFound {
                path: path.as_str().to_string(),
            });
        }
        if count < 0 {
            return Err(StorageError::Remote {
                op: "readdir".to_string(),
                path: path.as_str().to_string(),
                code: count as i64,
            });
        }
        if count == 0 {
            return Ok(0);
        }
        let count = count as usize;

        let mut inos = Vec::with_capacity(count);
        let mut names: HashMap<u64, String> = HashMap::with_capacity(count);
        for dent in &dents[..count] {
            inos.push(dent.ino);
            names.insert(dent.ino, dent.name_string());
        }

        let mut records = vec![StatRecord::default(); count];
        let resolved = self
            .binding
            .batch_get_attrs(self.client_id, fd, &inos, &mut records);
        if resolved < 0 {
            return Err(StorageError::Remote {
                op: "batch_get_attrs".to_string(),
                path: path.as_str().to_string(),
                code: resolved as i64,
            });
        }

        for record in &records[..resolved as usize] {
            // Matched by inode id: entries deleted between the two phases
            // are simply absent here and stay out of the result.
            if let Some(name) = names.get(&record.ino) {
                acc.push(FileStat::from_record(name.clone(), record));
            }
        }
        Ok(count)
    }
}
