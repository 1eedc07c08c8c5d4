//! Native SDK binding.
//!
//! The cluster is reached through a native client library loaded at runtime.
//! [`NativeBinding`] is the abstract surface the rest of the crate talks to;
//! [`SdkBinding`] is the dlopen-backed implementation. An in-memory
//! implementation for tests lives in [`crate::membind`].

use crate::error::{Result, StorageError};
use libloading::Library;
use std::ffi::CString;
use std::os::raw::{c_char, c_void};
use std::path::Path;

/// Attribute record exchanged with the native layer.
///
/// Field order mirrors the SDK's C struct; times are seconds plus a
/// sub-second nanosecond remainder.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct StatRecord {
    pub ino: u64,
    pub size: u64,
    pub blocks: u64,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
    pub atime_nsec: u32,
    pub mtime_nsec: u32,
    pub ctime_nsec: u32,
    pub mode: u32,
    pub nlink: u32,
    pub blk_size: u32,
    pub uid: u32,
    pub gid: u32,
}

/// Raw directory entry as returned by the native `readdir` call.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawDirent {
    pub ino: u64,
    pub name: [u8; 256],
    pub d_type: u8,
    pub name_len: u32,
}

impl Default for RawDirent {
    fn default() -> Self {
        Self {
            ino: 0,
            name: [0; 256],
            d_type: 0,
            name_len: 0,
        }
    }
}

impl RawDirent {
    /// Entry name decoded from the fixed-size buffer. Invalid UTF-8 bytes
    /// are replaced rather than failing the whole batch.
    pub fn name_string(&self) -> String {
        let len = (self.name_len as usize).min(self.name.len());
        String::from_utf8_lossy(&self.name[..len]).into_owned()
    }
}

/// Go-style slice header the SDK expects for out-parameter arrays.
#[repr(C)]
struct SliceHeader {
    data: *mut c_void,
    len: i64,
    cap: i64,
}

/// The native call surface.
///
/// Every method maps to one SDK call and reports the SDK's raw integer
/// result; translation into typed errors happens in the callers, via
/// [`crate::status`]. Implementations must be safe to share across threads:
/// the session id is read-only once created, and the SDK serializes
/// internally.
pub trait NativeBinding: Send + Sync {
    fn new_client(&self) -> i64;
    fn set_client(&self, id: i64, key: &str, value: &str) -> i32;
    fn start_client(&self, id: i64) -> i32;
    fn chdir(&self, id: i64, path: &str) -> i32;
    /// Returns a descriptor (>= 0) or a negative status.
    fn open(&self, id: i64, path: &str, flags: i32, mode: u32, uid: u32, gid: u32) -> i32;
    fn close(&self, id: i64, fd: i32);
    fn flush(&self, id: i64, fd: i32) -> i32;
    /// Returns bytes read (0 at end of file) or a negative status.
    fn read(&self, id: i64, fd: i32, buf: &mut [u8], offset: u64) -> i64;
    /// Returns bytes written or a negative status.
    fn write(&self, id: i64, fd: i32, buf: &[u8], offset: u64) -> i64;
    fn file_size(&self, id: i64, fd: i32) -> i64;
    fn mkdirs(&self, id: i64, path: &str, mode: u32, uid: u32, gid: u32) -> i32;
    fn rmdir(&self, id: i64, path: &str, recursive: bool) -> i32;
    fn unlink(&self, id: i64, path: &str) -> i32;
    fn rename(&self, id: i64, from: &str, to: &str) -> i32;
    fn getattr(&self, id: i64, path: &str, out: &mut StatRecord) -> i32;
    fn setattr(&self, id: i64, path: &str, record: &StatRecord, mask: u32) -> i32;
    /// Fills `out` with up to `out.len()` entries; returns the count filled
    /// (0 when the directory is exhausted) or a negative status. Successive
    /// calls on the same descriptor continue where the previous one stopped.
    fn readdir(&self, id: i64, fd: i32, out: &mut [RawDirent]) -> i32;
    /// Bulk attribute resolve for the given inode ids. May fill fewer
    /// records than requested; returns the count filled or a negative status.
    fn batch_get_attrs(&self, id: i64, fd: i32, inos: &[u64], out: &mut [StatRecord]) -> i32;
    fn close_client(&self, id: i64);
}

type NewClientFn = unsafe extern "C" fn() -> i64;
type SetClientFn = unsafe extern "C" fn(i64, *const c_char, *const c_char) -> i32;
type StartClientFn = unsafe extern "C" fn(i64) -> i32;
type ChdirFn = unsafe extern "C" fn(i64, *const c_char) -> i32;
type OpenFn = unsafe extern "C" fn(i64, *const c_char, i32, u32, u32, u32) -> i32;
type CloseFn = unsafe extern "C" fn(i64, i32);
type FlushFn = unsafe extern "C" fn(i64, i32) -> i32;
type ReadFn = unsafe extern "C" fn(i64, i32, *mut u8, i64, i64) -> i64;
type WriteFn = unsafe extern "C" fn(i64, i32, *const u8, i64, i64) -> i64;
type FileSizeFn = unsafe extern "C" fn(i64, i32) -> i64;
type MkdirsFn = unsafe extern "C" fn(i64, *const c_char, u32, u32, u32) -> i32;
type RmdirFn = unsafe extern "C" fn(i64, *const c_char, u8) -> i32;
type UnlinkFn = unsafe extern "C" fn(i64, *const c_char) -> i32;
type RenameFn = unsafe extern "C" fn(i64, *const c_char, *const c_char) -> i32;
type GetattrFn = unsafe extern "C" fn(i64, *const c_char, *mut StatRecord) -> i32;
type SetattrFn = unsafe extern "C" fn(i64, *const c_char, *const StatRecord, u32) -> i32;
type ReaddirFn = unsafe extern "C" fn(i64, i32, SliceHeader, i32) -> i32;
type BatchGetFn = unsafe extern "C" fn(i64, i32, *const u64, SliceHeader, i32) -> i32;

/// Dynamic-library-backed binding.
///
/// All symbols are resolved once at load time; the [`Library`] is kept for
/// the binding's lifetime so the function pointers stay valid.
#[derive(Debug)]
pub struct SdkBinding {
    _lib: Library,
    new_client: NewClientFn,
    set_client: SetClientFn,
    start_client: StartClientFn,
    chdir: ChdirFn,
    open: OpenFn,
    close: CloseFn,
    flush: FlushFn,
    read: ReadFn,
    write: WriteFn,
    file_size: FileSizeFn,
    mkdirs: MkdirsFn,
    rmdir: RmdirFn,
    unlink: UnlinkFn,
    rename: RenameFn,
    getattr: GetattrFn,
    setattr: SetattrFn,
    readdir: ReaddirFn,
    batch_get_inodes: BatchGetFn,
    close_client: CloseClientFn,
}

type CloseClientFn = unsafe extern "C" fn(i64);

impl SdkBinding {
    /// Load the native SDK from `library_path` and resolve its symbols.
    pub fn load(library_path: &str) -> Result<Self> {
        if library_path.trim().is_empty() {
            return Err(StorageError::NullArgument {
                msg: "native SDK library path is empty".to_string(),
            });
        }
        if !Path::new(library_path).exists() {
            return Err(StorageError::MissingLibrary {
                path: library_path.to_string(),
            });
        }

        let lib = unsafe { Library::new(library_path) }.map_err(|e| {
            StorageError::MissingLibrary {
                path: format!("{library_path}: {e}"),
            }
        })?;

        macro_rules! sym {
            ($name:literal, $ty:ty) => {
                unsafe {
                    *lib.get::<$ty>($name).map_err(|e| StorageError::MissingLibrary {
                        path: format!(
                            "{library_path}: symbol {}: {e}",
                            String::from_utf8_lossy(&$name[..$name.len() - 1])
                        ),
                    })?
                }
            };
        }

        // Resolved into locals first: each Symbol borrows `lib`, and the
        // borrow must end before `lib` moves into the struct.
        let new_client = sym!(b"sfs_new_client\0", NewClientFn);
        let set_client = sym!(b"sfs_set_client\0", SetClientFn);
        let start_client = sym!(b"sfs_start_client\0", StartClientFn);
        let chdir = sym!(b"sfs_chdir\0", ChdirFn);
        let open = sym!(b"sfs_open\0", OpenFn);
        let close = sym!(b"sfs_close\0", CloseFn);
        let flush = sym!(b"sfs_flush\0", FlushFn);
        let read = sym!(b"sfs_read\0", ReadFn);
        let write = sym!(b"sfs_write\0", WriteFn);
        let file_size = sym!(b"sfs_file_size\0", FileSizeFn);
        let mkdirs = sym!(b"sfs_mkdirs\0", MkdirsFn);
        let rmdir = sym!(b"sfs_rmdir\0", RmdirFn);
        let unlink = sym!(b"sfs_unlink\0", UnlinkFn);
        let rename = sym!(b"sfs_rename\0", RenameFn);
        let getattr = sym!(b"sfs_getattr\0", GetattrFn);
        let setattr = sym!(b"sfs_setattr_by_path\0", SetattrFn);
        let readdir = sym!(b"sfs_readdir\0", ReaddirFn);
        let batch_get_inodes = sym!(b"sfs_batch_get_inodes\0", BatchGetFn);
        let close_client = sym!(b"sfs_close_client\0", CloseClientFn);

        tracing::debug!("Loaded native SDK from {library_path}");
        Ok(Self {
            _lib: lib,
            new_client,
            set_client,
            start_client,
            chdir,
            open,
            close,
            flush,
            read,
            write,
            file_size,
            mkdirs,
            rmdir,
            unlink,
            rename,
            getattr,
            setattr,
            readdir,
            batch_get_inodes,
            close_client,
        })
    }
}

// Paths are validated before reaching the binding, but an interior NUL can
// only be rejected here where the CString conversion happens.
fn c_path(path: &str) -> std::result::Result<CString, i32> {
    CString::new(path).map_err(|_| crate::status::STATUS_INVALID as i32)
}

impl NativeBinding for SdkBinding {
    fn new_client(&self) -> i64 {
        unsafe { (self.new_client)() }
    }

    fn set_client(&self, id: i64, key: &str, value: &str) -> i32 {
        let key = match c_path(key) {
            Ok(k) => k,
            Err(code) => return code,
        };
        let value = match c_path(value) {
            Ok(v) => v,
            Err(code) => return code,
        };
        unsafe { (self.set_client)(id, key.as_ptr(), value.as_ptr()) }
    }

    fn start_client(&self, id: i64) -> i32 {
        unsafe { (self.start_client)(id) }
    }

    fn chdir(&self, id: i64, path: &str) -> i32 {
        match c_path(path) {
            Ok(p) => unsafe { (self.chdir)(id, p.as_ptr()) },
            Err(code) => code,
        }
    }

    fn open(&self, id: i64, path: &str, flags: i32, mode: u32, uid: u32, gid: u32) -> i32 {
        match c_path(path) {
            Ok(p) => unsafe { (self.open)(id, p.as_ptr(), flags, mode, uid, gid) },
            Err(code) => code,
        }
    }

    fn close(&self, id: i64, fd: i32) {
        unsafe { (self.close)(id, fd) }
    }

    fn flush(&self, id: i64, fd: i32) -> i32 {
        unsafe { (self.flush)(id, fd) }
    }

    fn read(&self, id: i64, fd: i32, buf: &mut [u8], offset: u64) -> i64 {
        unsafe { (self.read)(id, fd, buf.as_mut_ptr(), buf.len() as i64, offset as i64) }
    }

    fn write(&self, id: i64, fd: i32, buf: &[u8], offset: u64) -> i64 {
        unsafe { (self.write)(id, fd, buf.as_ptr(), buf.len() as i64, offset as i64) }
    }

    fn file_size(&self, id: i64, fd: i32) -> i64 {
        unsafe { (self.file_size)(id, fd) }
    }

    fn mkdirs(&self, id: i64, path: &str, mode: u32, uid: u32, gid: u32) -> i32 {
        match c_path(path) {
            Ok(p) => unsafe { (self.mkdirs)(id, p.as_ptr(), mode, uid, gid) },
            Err(code) => code,
        }
    }

    fn rmdir(&self, id: i64, path: &str, recursive: bool) -> i32 {
        match c_path(path) {
            Ok(p) => unsafe { (self.rmdir)(id, p.as_ptr(), recursive as u8) },
            Err(code) => code,
        }
    }

    fn unlink(&self, id: i64, path: &str) -> i32 {
        match c_path(path) {
            Ok(p) => unsafe { (self.unlink)(id, p.as_ptr()) },
            Err(code) => code,
        }
    }

    fn rename(&self, id: i64, from: &str, to: &str) -> i32 {
        let from = match c_path(from) {
            Ok(p) => p,
            Err(code) => return code,
        };
        let to = match c_path(to) {
            Ok(p) => p,
            Err(code) => return code,
        };
        unsafe { (self.rename)(id, from.as_ptr(), to.as_ptr()) }
    }

    fn getattr(&self, id: i64, path: &str, out: &mut StatRecord) -> i32 {
        match c_path(path) {
            Ok(p) => unsafe { (self.getattr)(id, p.as_ptr(), out as *mut StatRecord) },
            Err(code) => code,
        }
    }

    fn setattr(&self, id: i64, path: &str, record: &StatRecord, mask: u32) -> i32 {
        match c_path(path) {
            Ok(p) => unsafe { (self.setattr)(id, p.as_ptr(), record as *const StatRecord, mask) },
            Err(code) => code,
        }
    }

    fn readdir(&self, id: i64, fd: i32, out: &mut [RawDirent]) -> i32 {
        let slice = SliceHeader {
            data: out.as_mut_ptr() as *mut c_void,
            len: out.len() as i64,
            cap: out.len() as i64,
        };
        unsafe { (self.readdir)(id, fd, slice, out.len() as i32) }
    }

    fn batch_get_attrs(&self, id: i64, fd: i32, inos: &[u64], out: &mut [StatRecord]) -> i32 {
        let slice = SliceHeader {
            data: out.as_mut_ptr() as *mut c_void,
            len: out.len() as i64,
            cap: out.len() as i64,
        };
        unsafe { (self.batch_get_inodes)(id, fd, inos.as_ptr(), slice, inos.len() as i32) }
    }

    fn close_client(&self, id: i64) {
        unsafe { (self.close_client)(id) }
    }
}
