//! Storage facade.
//!
//! [`FileStorage`] is the capability set callers program against;
//! [`RemoteStorage`] is the implementation bound to a native session.
//! Every operation validates its paths locally, crosses the boundary at
//! most once per native call, and translates the raw status exactly once.

use crate::attr::{FileStat, SetAttrRequest};
use crate::binding::{NativeBinding, StatRecord};
use crate::dirlist::DirEnumerator;
use crate::error::{Result, StorageError};
use crate::flags::OpenFlags;
use crate::handle::FileHandle;
use crate::idmap::IdentityResolver;
use crate::path::normalize;
use crate::status::{self, STATUS_EXISTS, STATUS_NOT_FOUND, STATUS_OK};
use std::collections::HashMap;
use std::sync::Arc;

const DEFAULT_BLOCK_SIZE: u64 = 128 * 1024 * 1024;
const DEFAULT_REPLICA_NUMBER: u32 = 3;

pub trait FileStorage {
    fn open(&self, path: &str, flags: OpenFlags, mode: u32, uid: u32, gid: u32)
        -> Result<FileHandle>;
    /// Create a directory and any missing parents. Succeeds if the path
    /// already exists.
    fn mkdirs(&self, path: &str, mode: u32, uid: u32, gid: u32) -> Result<()>;
    fn truncate(&self, path: &str, new_length: i64) -> Result<()>;
    fn rmdir(&self, path: &str, recursive: bool) -> Result<()>;
    fn unlink(&self, path: &str) -> Result<()>;
    fn rename(&self, from: &str, to: &str) -> Result<()>;
    /// `Ok(None)` when the path does not exist; errors are reserved for
    /// lookups that actually failed.
    fn stat(&self, path: &str) -> Result<Option<FileStat>>;
    fn list(&self, path: &str) -> Result<Vec<FileStat>>;
    fn chmod(&self, path: &str, mode: u32) -> Result<()>;
    fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<()>;
    fn chown_names(&self, path: &str, user: &str, group: &str) -> Result<()>;
    /// Times in nanoseconds; non-positive values leave the field untouched.
    fn set_times(&self, path: &str, mtime_nanos: i64, atime_nanos: i64) -> Result<()>;
    fn set_xattr(&self, path: &str, name: &str, value: &[u8]) -> Result<()>;
    fn get_xattr(&self, path: &str, name: &str) -> Result<Vec<u8>>;
    fn get_xattrs(&self, path: &str, names: &[String]) -> Result<HashMap<String, Vec<u8>>>;
    fn list_xattr(&self, path: &str) -> Result<Vec<String>>;
    fn remove_xattr(&self, path: &str, name: &str) -> Result<()>;
    fn block_size(&self) -> u64;
    fn replica_number(&self) -> u32;
    fn uid_of(&self, user: &str) -> Result<u32>;
    fn gid_of(&self, group: &str) -> Result<u32>;
    fn gid_of_user(&self, user: &str) -> Result<u32>;
    fn user_of(&self, uid: u32) -> Result<String>;
    fn group_of(&self, gid: u32) -> Result<String>;
}

pub struct RemoteStorage {
    binding: Arc<dyn NativeBinding>,
    client_id: i64,
    resolver: Arc<dyn IdentityResolver>,
}

impl RemoteStorage {
    pub(crate) fn new(
        binding: Arc<dyn NativeBinding>,
        client_id: i64,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            binding,
            client_id,
            resolver,
        }
    }

    fn setattr(&self, op: &str, path: &str, request: &SetAttrRequest) -> Result<()> {
        let token = normalize(path)?;
        let (record, mask) = request.parts();
        let st = self
            .binding
            .setattr(self.client_id, token.as_str(), record, mask);
        status::check(op, token.as_str(), st as i64)
    }
}

impl FileStorage for RemoteStorage {
    fn open(
        &self,
        path: &str,
        flags: OpenFlags,
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> Result<FileHandle> {
        let token = normalize(path)?;
        let fd = self
            .binding
            .open(self.client_id, token.as_str(), flags.to_native(), mode, uid, gid);
        if fd < 0 {
            return Err(status::translate("open", token.as_str(), fd as i64));
        }
        let size = self.binding.file_size(self.client_id, fd);
        if size < 0 {
            self.binding.close(self.client_id, fd);
            return Err(status::translate("file_size", token.as_str(), size));
        }
        // Append is emulated: the handle starts at the current end of file.
        // Concurrent writers through other handles can race this read.
        let position = if flags.wants_append() { size as u64 } else { 0 };
        tracing::debug!("Opened {token}: fd={fd} size={size} pos={position}");
        Ok(FileHandle::new(
            self.binding.clone(),
            self.client_id,
            fd,
            size as u64,
            position,
        ))
    }

    fn mkdirs(&self, path: &str, mode: u32, uid: u32, gid: u32) -> Result<()> {
        let token = normalize(path)?;
        let st = self
            .binding
            .mkdirs(self.client_id, token.as_str(), mode, uid, gid) as i64;
        if st == STATUS_OK || st == STATUS_EXISTS {
            return Ok(());
        }
        Err(status::translate("mkdirs", token.as_str(), st))
    }

    fn truncate(&self, path: &str, new_length: i64) -> Result<()> {
        if new_length < 0 {
            return Err(StorageError::InvalidArgument {
                msg: format!("negative truncate length: {new_length}"),
            });
        }
        self.setattr(
            "truncate",
            path,
            &SetAttrRequest::new().size(new_length as u64),
        )
    }

    fn rmdir(&self, path: &str, recursive: bool) -> Result<()> {
        let token = normalize(path)?;
        let st = self.binding.rmdir(self.client_id, token.as_str(), recursive);
        status::check("rmdir", token.as_str(), st as i64)
    }

    fn unlink(&self, path: &str) -> Result<()> {
        let token = normalize(path)?;
        let st = self.binding.unlink(self.client_id, token.as_str());
        status::check("unlink", token.as_str(), st as i64)
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from = normalize(from)?;
        let to = normalize(to)?;
        let st = self
            .binding
            .rename(self.client_id, from.as_str(), to.as_str());
        status::check("rename", from.as_str(), st as i64)
    }

    fn stat(&self, path: &str) -> Result<Option<FileStat>> {
        let token = normalize(path)?;
        let mut record = StatRecord::default();
        let st = self
            .binding
            .getattr(self.client_id, token.as_str(), &mut record) as i64;
        if st == STATUS_NOT_FOUND {
            tracing::debug!("stat {token}: not found");
            return Ok(None);
        }
        if st != STATUS_OK {
            return Err(status::translate("stat", token.as_str(), st));
        }
        Ok(Some(FileStat::from_record(
            token.leaf().to_string(),
            &record,
        )))
    }

    fn list(&self, path: &str) -> Result<Vec<FileStat>> {
        let token = normalize(path)?;
        DirEnumerator::new(self.binding.clone(), self.client_id).list(&token)
    }

    fn chmod(&self, path: &str, mode: u32) -> Result<()> {
        self.setattr("chmod", path, &SetAttrRequest::new().mode(mode))
    }

    fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<()> {
        self.setattr("chown", path, &SetAttrRequest::new().owner(uid, gid))
    }

    fn chown_names(&self, path: &str, user: &str, group: &str) -> Result<()> {
        let uid = self.resolver.uid_of(user)?;
        let gid = self.resolver.gid_of(group)?;
        self.chown(path, uid, gid)
    }

    fn set_times(&self, path: &str, mtime_nanos: i64, atime_nanos: i64) -> Result<()> {
        self.setattr(
            "set_times",
            path,
            &SetAttrRequest::new()
                .mtime_nanos(mtime_nanos)
                .atime_nanos(atime_nanos),
        )
    }

    fn set_xattr(&self, _path: &str, _name: &str, _value: &[u8]) -> Result<()> {
        Err(StorageError::Unsupported {
            op: "set_xattr".to_string(),
        })
    }

    fn get_xattr(&self, _path: &str, _name: &str) -> Result<Vec<u8>> {
        Err(StorageError::Unsupported {
            op: "get_xattr".to_string(),
        })
    }

    fn get_xattrs(&self, _path: &str, _names: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        Err(StorageError::Unsupported {
            op: "get_xattrs".to_string(),
        })
    }

    fn list_xattr(&self, _path: &str) -> Result<Vec<String>> {
        Err(StorageError::Unsupported {
            op: "list_xattr".to_string(),
        })
    }

    fn remove_xattr(&self, _path: &str, _name: &str) -> Result<()> {
        Err(StorageError::Unsupported {
            op: "remove_xattr".to_string(),
        })
    }

    fn block_size(&self) -> u64 {
        DEFAULT_BLOCK_SIZE
    }

    fn replica_number(&self) -> u32 {
        DEFAULT_REPLICA_NUMBER
    }

    fn uid_of(&self, user: &str) -> Result<u32> {
        self.resolver.uid_of(user)
    }

    fn gid_of(&self, group: &str) -> Result<u32> {
        self.resolver.gid_of(group)
    }

    fn gid_of_user(&self, user: &str) -> Result<u32> {
        self.resolver.gid_of_user(user)
    }

    fn user_of(&self, uid: u32) -> Result<String> {
        self.resolver.user_of(uid)
    }

    fn group_of(&self, gid: u32) -> Result<String> {
        self.resolver.group_of(gid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::FileType;
    use crate::idmap::StaticResolver;
    use crate::membind::MemBinding;

    fn storage(binding: &Arc<MemBinding>) -> RemoteStorage {
        let id = binding.new_client();
        let mut resolver = StaticResolver::new();
        resolver.add_user("alice", 1000, 100);
        resolver.add_group("staff", 100);
        RemoteStorage::new(binding.clone(), id, Arc::new(resolver))
    }

    #[test]
    fn test_open_append_starts_at_end_of_file() {
        let binding = Arc::new(MemBinding::new());
        binding.seed_file("/f", b"0123456789");
        let s = storage(&binding);
        let handle = s
            .open("/f", OpenFlags::write_only().with_append(), 0o644, 0, 0)
            .unwrap();
        assert_eq!(handle.position(), 10);
        assert_eq!(handle.size(), 10);
    }

    #[test]
    fn test_open_without_append_starts_at_zero() {
        let binding = Arc::new(MemBinding::new());
        binding.seed_file("/f", b"0123456789");
        let s = storage(&binding);
        let handle = s.open("/f", OpenFlags::read_only(), 0o644, 0, 0).unwrap();
        assert_eq!(handle.position(), 0);
        assert_eq!(handle.size(), 10);
    }

    #[test]
    fn test_open_missing_without_create_is_not_found() {
        let binding = Arc::new(MemBinding::new());
        let s = storage(&binding);
        let err = s
            .open("/missing", OpenFlags::read_only(), 0o644, 0, 0)
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[test]
    fn test_open_relative_path_issues_no_native_call() {
        let binding = Arc::new(MemBinding::new());
        let s = storage(&binding);
        binding.clear_calls();
        let err = s
            .open("relative/f", OpenFlags::read_only(), 0o644, 0, 0)
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument { .. }));
        assert!(binding.recorded_calls().is_empty());
    }

    #[test]
    fn test_mkdirs_on_existing_path_succeeds() {
        let binding = Arc::new(MemBinding::new());
        let s = storage(&binding);
        s.mkdirs("/a/b", 0o755, 0, 0).unwrap();
        s.mkdirs("/a/b", 0o755, 0, 0).unwrap();
        assert!(binding.ino_of("/a/b").is_some());
    }

    #[test]
    fn test_stat_on_missing_path_is_none() {
        let binding = Arc::new(MemBinding::new());
        let s = storage(&binding);
        assert!(s.stat("/missing").unwrap().is_none());
    }

    #[test]
    fn test_stat_reports_leaf_name_and_type() {
        let binding = Arc::new(MemBinding::new());
        binding.seed_file("/data/report.csv", b"a,b\n");
        let s = storage(&binding);
        let stat = s.stat("/data/report.csv").unwrap().unwrap();
        assert_eq!(stat.name, "report.csv");
        assert_eq!(stat.file_type, FileType::Regular);
        assert_eq!(stat.size, 4);
    }

    #[test]
    fn test_truncate_negative_length_issues_no_native_call() {
        let binding = Arc::new(MemBinding::new());
        binding.seed_file("/f", b"abc");
        let s = storage(&binding);
        binding.clear_calls();
        let err = s.truncate("/f", -1).unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument { .. }));
        assert!(binding.recorded_calls().is_empty());
    }

    #[test]
    fn test_truncate_writes_size_attribute() {
        let binding = Arc::new(MemBinding::new());
        binding.seed_file("/f", b"hello world");
        let s = storage(&binding);
        s.truncate("/f", 5).unwrap();
        assert_eq!(binding.file_contents("/f").unwrap(), b"hello");
    }

    #[test]
    fn test_rename_and_unlink() {
        let binding = Arc::new(MemBinding::new());
        binding.seed_file("/a", b"x");
        let s = storage(&binding);
        s.rename("/a", "/b").unwrap();
        assert!(s.stat("/a").unwrap().is_none());
        s.unlink("/b").unwrap();
        assert!(s.stat("/b").unwrap().is_none());
    }

    #[test]
    fn test_unlink_missing_is_not_found() {
        let binding = Arc::new(MemBinding::new());
        let s = storage(&binding);
        assert!(matches!(
            s.unlink("/missing"),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn test_chmod_changes_permission_bits_only() {
        let binding = Arc::new(MemBinding::new());
        binding.seed_file("/f", b"");
        let s = storage(&binding);
        s.chmod("/f", 0o600).unwrap();
        let mode = binding.mode_of("/f").unwrap();
        assert_eq!(mode & 0o7777, 0o600);
        assert_eq!(FileType::from_mode(mode), FileType::Regular);
    }

    #[test]
    fn test_chown_by_names_resolves_ids() {
        let binding = Arc::new(MemBinding::new());
        binding.seed_file("/f", b"");
        let s = storage(&binding);
        s.chown_names("/f", "alice", "staff").unwrap();
        assert_eq!(binding.owner_of("/f").unwrap(), (1000, 100));
    }

    #[test]
    fn test_chown_names_with_unknown_user_issues_no_native_call() {
        let binding = Arc::new(MemBinding::new());
        binding.seed_file("/f", b"");
        let s = storage(&binding);
        binding.clear_calls();
        assert!(s.chown_names("/f", "nobody-here", "staff").is_err());
        assert!(binding.recorded_calls().is_empty());
    }

    #[test]
    fn test_set_times_only_touches_positive_fields() {
        let binding = Arc::new(MemBinding::new());
        binding.seed_file("/f", b"");
        let s = storage(&binding);
        s.set_times("/f", 1_500_000_000, -1).unwrap();
        let stat = s.stat("/f").unwrap().unwrap();
        assert_eq!(stat.mtime.secs, 1);
        assert_eq!(stat.mtime.nsecs, 500_000_000);
        assert_eq!(stat.atime.secs, 0);
    }

    #[test]
    fn test_xattr_family_is_unsupported() {
        let binding = Arc::new(MemBinding::new());
        let s = storage(&binding);
        assert!(matches!(
            s.set_xattr("/f", "user.k", b"v"),
            Err(StorageError::Unsupported { .. })
        ));
        assert!(matches!(
            s.get_xattr("/f", "user.k"),
            Err(StorageError::Unsupported { .. })
        ));
        assert!(matches!(
            s.list_xattr("/f"),
            Err(StorageError::Unsupported { .. })
        ));
        assert!(matches!(
            s.remove_xattr("/f", "user.k"),
            Err(StorageError::Unsupported { .. })
        ));
        assert!(matches!(
            s.get_xattrs("/f", &["user.k".to_string()]),
            Err(StorageError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_static_configuration_facts() {
        let binding = Arc::new(MemBinding::new());
        let s = storage(&binding);
        assert_eq!(s.block_size(), 128 * 1024 * 1024);
        assert_eq!(s.replica_number(), 3);
    }

    #[test]
    fn test_identity_passthrough() {
        let binding = Arc::new(MemBinding::new());
        let s = storage(&binding);
        assert_eq!(s.uid_of("alice").unwrap(), 1000);
        assert_eq!(s.gid_of("staff").unwrap(), 100);
        assert_eq!(s.gid_of_user("alice").unwrap(), 100);
        assert_eq!(s.user_of(1000).unwrap(), "alice");
        assert_eq!(s.group_of(100).unwrap(), "staff");
    }
}
