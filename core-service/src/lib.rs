//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (remote object
//! store, settings storage, record store, status sink) into a
//! [`SyncEngine`]. Desktop apps typically enable the `desktop-shims` feature
//! (which depends on `bridge-desktop`), whereas WebAssembly builds enable the
//! `wasm` feature and rely on the adapters from `bridge-wasm`. The
//! `google-drive` feature adds the Drive `appDataFolder` remote.

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::{
    storage::{KeyValueStore, ObjectStore, RecordStore},
    Clock, StatusSink,
};
use core_runtime::config::{SyncEngineConfig, SyncEngineConfigBuilder};
use core_runtime::events::EventStream;
use core_sync::{BackupInfo, BackupOutcome, RestoreOutcome, SyncEngine, SyncReport};
use tracing::info;

#[cfg(feature = "google-drive")]
pub use provider_google_drive::{AccessTokenProvider, StaticTokenProvider};

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub use desktop::{bootstrap_desktop, desktop_dependencies, DesktopConfig, DesktopRemote};

#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
pub use bridge_wasm::WasmBridgeConfig;
#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
pub use wasm::{bootstrap_wasm, wasm_dependencies, WasmRemote};

/// Aggregated handle to all bridge dependencies the engine requires.
pub struct CoreDependencies {
    pub object_store: Arc<dyn ObjectStore>,
    pub key_value_store: Arc<dyn KeyValueStore>,
    pub record_store: Arc<dyn RecordStore>,
    pub status_sink: Option<Arc<dyn StatusSink>>,
    pub clock: Option<Arc<dyn Clock>>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from the three required stores.
    pub fn new(
        object_store: Arc<dyn ObjectStore>,
        key_value_store: Arc<dyn KeyValueStore>,
        record_store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            object_store,
            key_value_store,
            record_store,
            status_sink: None,
            clock: None,
        }
    }

    pub fn with_status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.status_sink = Some(sink);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    fn into_builder(self) -> SyncEngineConfigBuilder {
        let mut builder = SyncEngineConfig::builder()
            .object_store(self.object_store)
            .key_value_store(self.key_value_store)
            .record_store(self.record_store);
        if let Some(sink) = self.status_sink {
            builder = builder.status_sink(sink);
        }
        if let Some(clock) = self.clock {
            builder = builder.clock(clock);
        }
        builder
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    engine: SyncEngine,
}

impl CoreService {
    /// Engine with default tuning.
    pub fn new(deps: CoreDependencies) -> Result<Self> {
        Self::with_options(deps, |builder| builder)
    }

    /// Engine whose configuration is adjusted by `configure` before it is
    /// validated.
    ///
    /// ```ignore
    /// let core = CoreService::with_options(deps, |builder| {
    ///     builder
    ///         .excluded_settings("draft_*, debugMode")
    ///         .max_backups(5)
    /// })?;
    /// ```
    pub fn with_options<F>(deps: CoreDependencies, configure: F) -> Result<Self>
    where
        F: FnOnce(SyncEngineConfigBuilder) -> SyncEngineConfigBuilder,
    {
        let config = configure(deps.into_builder()).build()?;
        let engine = SyncEngine::new(config)?;
        info!("Core service initialized");
        Ok(Self { engine })
    }

    /// The underlying engine, for operations the façade does not wrap.
    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Restore-on-load and periodic sync, as configured.
    pub fn start(&self) -> bool {
        self.engine.start()
    }

    pub fn shutdown(&self) {
        self.engine.shutdown()
    }

    pub fn subscribe(&self) -> EventStream {
        self.engine.subscribe()
    }

    /// Pull then push.
    pub async fn sync_now(&self) -> Result<SyncReport> {
        Ok(self.engine.sync().await?)
    }

    pub async fn backup(&self) -> Result<BackupOutcome> {
        Ok(self.engine.backup().await?)
    }

    pub async fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        Ok(self.engine.list_backups().await?)
    }

    pub async fn restore_backup(&self, key: impl Into<String>) -> Result<RestoreOutcome> {
        Ok(self.engine.restore_backup(key).await?)
    }
}

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
mod desktop {
    use super::*;
    use bridge_desktop::{
        FsObjectStore, JsonFileKeyValueStore, SqliteRecordStore, TracingStatusSink,
    };
    use std::path::PathBuf;

    const SETTINGS_FILE: &str = "settings.json";
    const RECORDS_FILE: &str = "records.sqlite";

    /// Where the desktop engine keeps the shared state.
    pub enum DesktopRemote {
        /// A synced folder (NAS mount, Dropbox directory).
        Directory(PathBuf),
        /// Drive `appDataFolder` reached through `reqwest`.
        #[cfg(feature = "google-drive")]
        GoogleDrive(Arc<dyn AccessTokenProvider>),
        /// Any other object store.
        Custom(Arc<dyn ObjectStore>),
    }

    /// Desktop bootstrap settings.
    pub struct DesktopConfig {
        /// Directory holding `settings.json` and `records.sqlite`.
        pub data_dir: PathBuf,
        pub remote: DesktopRemote,
    }

    impl DesktopConfig {
        pub fn new(data_dir: impl Into<PathBuf>, remote: DesktopRemote) -> Self {
            Self {
                data_dir: data_dir.into(),
                remote,
            }
        }
    }

    impl DesktopRemote {
        fn into_store(self) -> Result<Arc<dyn ObjectStore>> {
            Ok(match self {
                DesktopRemote::Directory(root) => Arc::new(FsObjectStore::new(root)),
                #[cfg(feature = "google-drive")]
                DesktopRemote::GoogleDrive(tokens) => {
                    let http = Arc::new(bridge_desktop::ReqwestHttpClient::new()?);
                    Arc::new(provider_google_drive::GoogleDriveObjectStore::new(
                        http, tokens,
                    ))
                }
                DesktopRemote::Custom(store) => store,
            })
        }
    }

    /// Open the desktop stores under `config.data_dir`.
    pub async fn desktop_dependencies(config: DesktopConfig) -> Result<CoreDependencies> {
        let settings = JsonFileKeyValueStore::open(config.data_dir.join(SETTINGS_FILE))?;
        let records = SqliteRecordStore::new(config.data_dir.join(RECORDS_FILE)).await?;

        Ok(
            CoreDependencies::new(config.remote.into_store()?, Arc::new(settings), Arc::new(records))
                .with_status_sink(Arc::new(TracingStatusSink::new())),
        )
    }

    /// Convenience bootstrapper for desktop hosts.
    ///
    /// ```ignore
    /// use core_service::{bootstrap_desktop, DesktopConfig, DesktopRemote};
    ///
    /// let core = bootstrap_desktop(DesktopConfig::new(
    ///     "/home/me/.local/share/cloudsync",
    ///     DesktopRemote::Directory("/mnt/nas/cloudsync".into()),
    /// ))
    /// .await?;
    /// core.start();
    /// ```
    pub async fn bootstrap_desktop(config: DesktopConfig) -> Result<CoreService> {
        CoreService::new(desktop_dependencies(config).await?)
    }
}

#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
mod wasm {
    use super::*;
    use bridge_wasm::{build_wasm_bridges, WasmBridgeConfig};

    /// Where the browser engine keeps the shared state.
    pub enum WasmRemote {
        /// Drive `appDataFolder` reached through `fetch`.
        #[cfg(feature = "google-drive")]
        GoogleDrive(Arc<dyn AccessTokenProvider>),
        /// Any other object store (S3 adapter, test double).
        Custom(Arc<dyn ObjectStore>),
    }

    /// Build the browser stores described by `config`.
    pub fn wasm_dependencies(
        config: WasmBridgeConfig,
        remote: WasmRemote,
    ) -> Result<CoreDependencies> {
        let bridges = build_wasm_bridges(config)
            .map_err(|err| CoreError::InitializationFailed(err.to_string()))?;

        let object_store: Arc<dyn ObjectStore> = match remote {
            #[cfg(feature = "google-drive")]
            WasmRemote::GoogleDrive(tokens) => Arc::new(
                provider_google_drive::GoogleDriveObjectStore::new(bridges.http_client, tokens),
            ),
            WasmRemote::Custom(store) => store,
        };

        Ok(
            CoreDependencies::new(object_store, bridges.settings, bridges.records)
                .with_status_sink(bridges.status),
        )
    }

    /// Convenience bootstrapper for WebAssembly hosts.
    ///
    /// ```ignore
    /// use core_service::{bootstrap_wasm, WasmBridgeConfig, WasmRemote};
    ///
    /// let config = WasmBridgeConfig::new("records").with_status_callback(on_status);
    /// let core = bootstrap_wasm(config, WasmRemote::GoogleDrive(tokens))?;
    /// core.start();
    /// ```
    pub fn bootstrap_wasm(config: WasmBridgeConfig, remote: WasmRemote) -> Result<CoreService> {
        CoreService::new(wasm_dependencies(config, remote)?)
    }
}
