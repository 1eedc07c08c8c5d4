//! Test harness: in-memory cluster environments.

use shardfs_client::config::StorageConfig;
use shardfs_client::idmap::{IdentityResolver, StaticResolver};
use shardfs_client::membind::MemBinding;
use shardfs_client::storage::RemoteStorage;
use shardfs_client::Session;
use std::sync::Arc;

/// Install a fmt subscriber honoring `RUST_LOG`, once. Safe to call from
/// every test.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};
    let _ = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init();
}

pub fn test_config() -> StorageConfig {
    StorageConfig {
        masters: "master-0:17010,master-1:17010".to_string(),
        volume_name: "it-vol".to_string(),
        ..StorageConfig::default()
    }
}

pub fn test_resolver() -> Arc<dyn IdentityResolver> {
    let mut resolver = StaticResolver::new();
    resolver.add_user("alice", 1000, 100);
    resolver.add_user("bob", 1001, 100);
    resolver.add_group("staff", 100);
    Arc::new(resolver)
}

/// A started session over a fresh in-memory binding.
pub fn started_session() -> (Arc<MemBinding>, Session) {
    init_tracing();
    let binding = Arc::new(MemBinding::new());
    let mut session = Session::with_binding(binding.clone()).expect("acquire client id");
    session
        .configure_and_start(&test_config())
        .expect("start session");
    (binding, session)
}

/// A started session plus its storage capability, bundled so tests keep
/// the session alive for as long as the storage is used.
pub struct StorageEnv {
    pub binding: Arc<MemBinding>,
    pub session: Session,
    pub storage: RemoteStorage,
}

pub fn storage_env() -> StorageEnv {
    let (binding, session) = started_session();
    let storage = session.storage(test_resolver()).expect("storage capability");
    StorageEnv {
        binding,
        session,
        storage,
    }
}
