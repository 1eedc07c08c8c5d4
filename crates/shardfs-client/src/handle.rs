//! Open-file handles.
//!
//! A handle pairs a native descriptor with client-tracked position and size.
//! The native read/write calls are positioned at the handle's current
//! position, so all I/O on one handle must be serialized; `&mut self`
//! enforces the single-owner contract at compile time. The size field is a
//! best-effort cache of the remote length and may lag after external
//! mutation.

use crate::binding::NativeBinding;
use crate::error::{Result, StorageError};
use crate::status;
use std::sync::Arc;

pub struct FileHandle {
    binding: Arc<dyn NativeBinding>,
    client_id: i64,
    fd: i32,
    position: u64,
    size: u64,
    closed: bool,
}

impl std::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandle")
            .field("client_id", &self.client_id)
            .field("fd", &self.fd)
            .field("position", &self.position)
            .field("size", &self.size)
            .field("closed", &self.closed)
            .finish()
    }
}

impl FileHandle {
    pub(crate) fn new(
        binding: Arc<dyn NativeBinding>,
        client_id: i64,
        fd: i32,
        size: u64,
        position: u64,
    ) -> Self {
        Self {
            binding,
            client_id,
            fd,
            position,
            size,
            closed: false,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Cached remote length. A hint only: writes through other handles are
    /// not reflected here.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(StorageError::InvalidArgument {
                msg: format!("descriptor {} is closed", self.fd),
            });
        }
        Ok(())
    }

    fn check_range(buf_len: usize, offset: usize, len: usize) -> Result<usize> {
        let end = offset
            .checked_add(len)
            .ok_or_else(|| StorageError::InvalidArgument {
                msg: format!("buffer range overflows: offset {offset} len {len}"),
            })?;
        if end > buf_len {
            return Err(StorageError::InvalidArgument {
                msg: format!("buffer range {offset}..{end} exceeds buffer of {buf_len}"),
            });
        }
        Ok(end)
    }

    /// Write `len` bytes of `buf` starting at `offset`, at the current
    /// position. Advances the position by the bytes written and grows the
    /// cached size if the position moved past it.
    pub fn write(&mut self, buf: &[u8], offset: usize, len: usize) -> Result<usize> {
        self.ensure_open()?;
        let end = Self::check_range(buf.len(), offset, len)?;
        let n = self
            .binding
            .write(self.client_id, self.fd, &buf[offset..end], self.position);
        if n < 0 {
            return Err(status::translate("write", &format!("fd {}", self.fd), n));
        }
        self.position += n as u64;
        if self.position > self.size {
            self.size = self.position;
        }
        Ok(n as usize)
    }

    /// Read up to `len` bytes into `buf[offset..]` from the current
    /// position. `Ok(0)` signals end of stream and leaves the position
    /// unchanged.
    pub fn read(&mut self, buf: &mut [u8], offset: usize, len: usize) -> Result<usize> {
        self.ensure_open()?;
        let end = Self::check_range(buf.len(), offset, len)?;
        let n = self
            .binding
            .read(self.client_id, self.fd, &mut buf[offset..end], self.position);
        if n < 0 {
            return Err(status::translate("read", &format!("fd {}", self.fd), n));
        }
        if n > 0 {
            self.position += n as u64;
        }
        Ok(n as usize)
    }

    /// Reposition the handle. No native call is made; the next read or
    /// write is anchored at the new position.
    pub fn seek(&mut self, position: u64) -> Result<()> {
        self.ensure_open()?;
        self.position = position;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        let st = self.binding.flush(self.client_id, self.fd);
        status::check("flush", &format!("fd {}", self.fd), st as i64)
    }

    /// Flush, then release the native descriptor. Idempotent: a second call
    /// performs no native call. The descriptor is released even if the
    /// flush fails, and the flush failure is the error reported.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let st = self.binding.flush(self.client_id, self.fd);
        self.binding.close(self.client_id, self.fd);
        tracing::debug!("Closed file handle: fd={}", self.fd);
        status::check("flush", &format!("fd {}", self.fd), st as i64)
    }

    /// Positioned write at an explicit file offset, independent of the
    /// handle position. Not provided by the native layer.
    pub fn pwrite(&mut self, _buf: &[u8], _offset: usize, _len: usize, _file_offset: u64) -> Result<usize> {
        Err(StorageError::Unsupported {
            op: "pwrite".to_string(),
        })
    }

    /// Positioned read at an explicit file offset. Not provided by the
    /// native layer.
    pub fn pread(&mut self, _buf: &mut [u8], _offset: usize, _len: usize, _file_offset: u64) -> Result<usize> {
        Err(StorageError::Unsupported {
            op: "pread".to_string(),
        })
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if !self.closed {
            tracing::warn!("File handle dropped without close: fd={}", self.fd);
            self.binding.close(self.client_id, self.fd);
            self.closed = true;
        }
    }
}
