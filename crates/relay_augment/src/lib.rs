//! # Relay Augment
//!
//! A server-side plugin that widens what the spectator relay receives.
//!
//! Two host behaviors are intercepted during activation:
//!
//! - **Local data tables**: the serialization callbacks of the per-player and
//!   per-weapon local data tables normally limit their recipients to the
//!   owning client. The wrapper adds the relay's client slot (or slot 0 on a
//!   combined client and server instance) whenever the table is sent.
//! - **Event catalog**: the relay director only records events it was told
//!   about. The wrapper merges the host's list with the top-level keys of the
//!   event resource files and serves the merged list from then on.
//!
//! ## Architecture
//!
//! - [`host`]: traits the host implements (factories, class registry,
//!   property tables, director, filesystem)
//! - [`resolver`]: versioned interface lookup
//! - [`props`]: dotted property path resolution
//! - [`hooks`]: write-once hook records and the interception registry
//! - [`recipients`]: recipient-set augmentation
//! - [`catalog`]: event catalog merging and caching
//! - [`plugin`]: the activation sequence
//! - [`keyvalues`]: key-value resource reader and a directory-backed loader
//! - [`config`], [`logging`], [`error`]: ambient support
//!
//! ## Activation
//!
//! ```rust,no_run
//! use relay_augment::{HostFactories, InterfaceFactory, RelayAugmentPlugin};
//!
//! fn load(engine: &dyn InterfaceFactory, game: &dyn InterfaceFactory) -> bool {
//!     let plugin = match RelayAugmentPlugin::from_default_config() {
//!         Ok(plugin) => plugin,
//!         Err(_) => return false,
//!     };
//!     plugin.install(&HostFactories { engine, game }).is_ok()
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod hooks;
pub mod host;
pub mod keyvalues;
pub mod logging;
pub mod plugin;
pub mod props;
pub mod recipients;
pub mod resolver;

pub use catalog::{EventCatalog, EventCatalogBuilder};
pub use config::{EventSettings, InterfaceNames, LoggingSettings, PluginConfig, ProxyTarget};
pub use error::{
    CallError, ConfigError, HookError, InitError, PropertyError, ResourceError, Severity,
};
pub use hooks::{Hook, HookTarget, InterceptionRegistry, Redirect};
pub use host::{
    mod_events_fn, send_proxy_fn, Capability, EngineServer, EventList, GameServerDll,
    HostFactories, InterfaceFactory, KeyedHierarchy, ModEventsFn, Property, PropertyTable,
    RecipientSet, RelayClient, RelayDirector, ResourceLoader, SendProxyCall, SendProxyFn,
    ServerClass,
};
pub use keyvalues::{DirectoryLoader, KeyValues, KvValue};
pub use plugin::{RelayAugmentPlugin, PLUGIN_DESCRIPTION};
pub use props::PropertyPath;
pub use recipients::{RecipientAugmenter, RecipientBits};
