//! Native session lifecycle.
//!
//! One [`Session`] owns exactly one native client id for its lifetime: the
//! id is acquired at creation, configured and started once, and released by
//! [`close`](Session::close), or on drop with a warning, since forgetting to
//! close is a leak worth hearing about. The id is never reused after close.
//!
//! The session is an explicitly owned value, not process-global state; every
//! dependent component (storage facade, file handles, the directory
//! enumerator) borrows the binding and id from it.

use crate::binding::{NativeBinding, SdkBinding};
use crate::config::{
    StorageConfig, CONFIG_KEY_LOG_DIR, CONFIG_KEY_LOG_LEVEL, CONFIG_KEY_MASTERS, CONFIG_KEY_VOLUME,
};
use crate::error::{Result, StorageError};
use crate::idmap::IdentityResolver;
use crate::storage::RemoteStorage;
use std::sync::Arc;

pub struct Session {
    binding: Arc<dyn NativeBinding>,
    client_id: i64,
    started: bool,
    closed: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("client_id", &self.client_id)
            .field("started", &self.started)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Session {
    /// Load the native SDK from `library_path` and acquire a client id.
    pub fn create(library_path: &str) -> Result<Self> {
        let binding: Arc<dyn NativeBinding> = Arc::new(SdkBinding::load(library_path)?);
        Self::with_binding(binding)
    }

    /// Acquire a client id over an existing binding. Used by tests and by
    /// embedders that supply their own binding.
    pub fn with_binding(binding: Arc<dyn NativeBinding>) -> Result<Self> {
        let client_id = binding.new_client();
        if client_id < 0 {
            return Err(StorageError::Remote {
                op: "new_client".to_string(),
                path: String::new(),
                code: client_id,
            });
        }
        tracing::debug!("Acquired native client id {client_id}");
        Ok(Self {
            binding,
            client_id,
            started: false,
            closed: false,
        })
    }

    pub fn client_id(&self) -> i64 {
        self.client_id
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Push the configuration to the native client, start it, and verify
    /// the session with a change-directory to the volume root.
    pub fn configure_and_start(&mut self, config: &StorageConfig) -> Result<()> {
        config.validate()?;
        self.binding
            .set_client(self.client_id, CONFIG_KEY_MASTERS, &config.masters);
        self.binding
            .set_client(self.client_id, CONFIG_KEY_VOLUME, &config.volume_name);
        self.binding
            .set_client(self.client_id, CONFIG_KEY_LOG_DIR, &config.log_dir);
        self.binding
            .set_client(self.client_id, CONFIG_KEY_LOG_LEVEL, &config.log_level);

        let st = self.binding.start_client(self.client_id);
        if st != 0 {
            return Err(StorageError::StartFailed { code: st });
        }
        let st = self.binding.chdir(self.client_id, "/");
        if st != 0 {
            return Err(StorageError::StartFailed { code: st });
        }
        self.started = true;
        tracing::info!(
            "Started native session {} against volume {}",
            self.client_id,
            config.volume_name
        );
        Ok(())
    }

    /// The storage capability. Available only once the session is started.
    pub fn storage(&self, resolver: Arc<dyn IdentityResolver>) -> Result<RemoteStorage> {
        if !self.started || self.closed {
            return Err(StorageError::SessionNotStarted);
        }
        Ok(RemoteStorage::new(
            self.binding.clone(),
            self.client_id,
            resolver,
        ))
    }

    /// Release the native session. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.started = false;
        self.binding.close_client(self.client_id);
        tracing::debug!("Closed native session {}", self.client_id);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.closed {
            tracing::warn!("Session {} dropped without close", self.client_id);
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idmap::StaticResolver;
    use crate::membind::MemBinding;

    fn config() -> StorageConfig {
        StorageConfig {
            masters: "master-1:17010".to_string(),
            volume_name: "vol".to_string(),
            ..StorageConfig::default()
        }
    }

    fn resolver() -> Arc<dyn IdentityResolver> {
        Arc::new(StaticResolver::new())
    }

    #[test]
    fn test_create_with_missing_library_fails() {
        let err = Session::create("/no/such/libshardfs.so").unwrap_err();
        assert!(matches!(err, StorageError::MissingLibrary { .. }));
    }

    #[test]
    fn test_storage_before_start_is_rejected() {
        let binding = Arc::new(MemBinding::new());
        let session = Session::with_binding(binding).unwrap();
        assert!(matches!(
            session.storage(resolver()),
            Err(StorageError::SessionNotStarted)
        ));
    }

    #[test]
    fn test_configure_and_start_pushes_all_keys() {
        let binding = Arc::new(MemBinding::new());
        let mut session = Session::with_binding(binding.clone()).unwrap();
        session.configure_and_start(&config()).unwrap();
        assert!(session.is_started());
        let calls = binding.recorded_calls();
        for key in [
            CONFIG_KEY_MASTERS,
            CONFIG_KEY_VOLUME,
            CONFIG_KEY_LOG_DIR,
            CONFIG_KEY_LOG_LEVEL,
        ] {
            assert!(calls.iter().any(|c| c == &format!("set_client:{key}")));
        }
        assert!(calls.iter().any(|c| c == "start_client"));
        assert!(calls.iter().any(|c| c == "chdir:/"));
    }

    #[test]
    fn test_start_with_invalid_config_issues_no_native_call() {
        let binding = Arc::new(MemBinding::new());
        let mut session = Session::with_binding(binding.clone()).unwrap();
        binding.clear_calls();
        let err = session
            .configure_and_start(&StorageConfig::default())
            .unwrap_err();
        assert!(matches!(err, StorageError::NullArgument { .. }));
        assert!(binding.recorded_calls().is_empty());
    }

    #[test]
    fn test_storage_available_after_start() {
        let binding = Arc::new(MemBinding::new());
        let mut session = Session::with_binding(binding).unwrap();
        session.configure_and_start(&config()).unwrap();
        assert!(session.storage(resolver()).is_ok());
    }

    #[test]
    fn test_close_is_idempotent() {
        let binding = Arc::new(MemBinding::new());
        let mut session = Session::with_binding(binding.clone()).unwrap();
        session.configure_and_start(&config()).unwrap();
        session.close();
        binding.clear_calls();
        session.close();
        assert!(binding.recorded_calls().is_empty());
    }

    #[test]
    fn test_storage_after_close_is_rejected() {
        let binding = Arc::new(MemBinding::new());
        let mut session = Session::with_binding(binding).unwrap();
        session.configure_and_start(&config()).unwrap();
        session.close();
        assert!(matches!(
            session.storage(resolver()),
            Err(StorageError::SessionNotStarted)
        ));
    }

    #[test]
    fn test_drop_releases_native_session() {
        let binding = Arc::new(MemBinding::new());
        let session = Session::with_binding(binding.clone()).unwrap();
        binding.clear_calls();
        drop(session);
        assert!(binding
            .recorded_calls()
            .iter()
            .any(|c| c == "close_client"));
    }
}
