//! Plugin activation.
//!
//! [`RelayAugmentPlugin::install`] is the entry point the host's plugin
//! loader calls. It runs a strict sequence and stops at the first failure:
//!
//! 1. resolve the game-logic module, engine core, filesystem and relay
//!    director interfaces;
//! 2. intercept the director's event-catalog method;
//! 3. for every configured proxy target, resolve the property path and
//!    intercept its serialization callback.
//!
//! A failed activation is reported to the host, which then refuses to
//! activate the plugin, so no wrapper is ever relied upon after a failure.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::catalog::{wrap_mod_events, EventCatalogBuilder};
use crate::config::{PluginConfig, DEFAULT_CONFIG_PATH};
use crate::error::{HookError, InitError};
use crate::hooks::{Hook, InterceptionRegistry};
use crate::host::{Capability, HostFactories, ModEventsFn, SendProxyFn};
use crate::logging::setup_logging;
use crate::props::{resolve_by_class, PropertyPath};
use crate::recipients::{wrap_send_proxy, RecipientAugmenter};
use crate::resolver::resolve_capability;

/// Description reported to the host's plugin list.
pub const PLUGIN_DESCRIPTION: &str = "relay augment";

/// Name of the hook record on the director's event-catalog method.
pub const MOD_EVENTS_HOOK: &str = "mod_events";

/// The plugin instance owned by the host for the process lifetime.
pub struct RelayAugmentPlugin {
    config: PluginConfig,
    registry: InterceptionRegistry,
    mod_events_hook: Arc<Hook<ModEventsFn>>,
    proxy_hooks: Vec<Arc<Hook<SendProxyFn>>>,
    catalog: Arc<EventCatalogBuilder>,
    active: AtomicBool,
}

impl RelayAugmentPlugin {
    /// Creates an inactive plugin with one hook record per proxy target.
    pub fn new(config: PluginConfig) -> Self {
        let proxy_hooks = config
            .proxies
            .iter()
            .map(|target| Arc::new(Hook::new(target.label.clone())))
            .collect();

        Self {
            catalog: Arc::new(EventCatalogBuilder::new(config.events.clone())),
            registry: InterceptionRegistry::new(),
            mod_events_hook: Arc::new(Hook::new(MOD_EVENTS_HOOK)),
            proxy_hooks,
            active: AtomicBool::new(false),
            config,
        }
    }

    /// Creates a plugin from a configuration file, falling back to the
    /// defaults when the file does not exist.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self, InitError> {
        let config = PluginConfig::load_from_file(path)?;
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Creates a plugin from [`DEFAULT_CONFIG_PATH`].
    pub fn from_default_config() -> Result<Self, InitError> {
        Self::from_config_file(DEFAULT_CONFIG_PATH)
    }

    pub fn description(&self) -> &'static str {
        PLUGIN_DESCRIPTION
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn catalog(&self) -> &EventCatalogBuilder {
        &self.catalog
    }

    pub fn mod_events_hook(&self) -> &Hook<ModEventsFn> {
        &self.mod_events_hook
    }

    pub fn proxy_hooks(&self) -> impl Iterator<Item = &Hook<SendProxyFn>> {
        self.proxy_hooks.iter().map(|hook| hook.as_ref())
    }

    pub fn registry(&self) -> &InterceptionRegistry {
        &self.registry
    }

    /// Activates the plugin against the host.
    ///
    /// Any failure aborts activation and is returned for the host loader to
    /// report. Hook records are write-once, so an instance whose activation
    /// failed cannot be activated again.
    pub fn install(&self, host: &HostFactories<'_>) -> Result<(), InitError> {
        if self.is_active() {
            return Err(InitError::AlreadyLoaded);
        }

        if let Err(err) = setup_logging(&self.config.logging) {
            warn!("Logging setup failed: {}", err);
        }

        info!("Loading {}", PLUGIN_DESCRIPTION);
        match self.activate(host) {
            Ok(()) => {
                self.active.store(true, Ordering::Release);
                info!(
                    "{} loaded, {} hooks installed",
                    PLUGIN_DESCRIPTION,
                    self.registry.len()
                );
                Ok(())
            }
            Err(err) => {
                error!("{}, aborting load", err);
                Err(err)
            }
        }
    }

    fn activate(&self, host: &HostFactories<'_>) -> Result<(), InitError> {
        let names = &self.config.interfaces;
        let game = resolve_capability(
            host.game,
            &names.server_game_dll,
            Capability::into_game_server,
        )?
        .value;
        let engine =
            resolve_capability(host.engine, &names.engine_server, Capability::into_engine)?.value;
        let file_system = resolve_capability(
            host.engine,
            &names.file_system,
            Capability::into_file_system,
        )?
        .value;
        let director =
            resolve_capability(host.game, &names.relay_director, Capability::into_director)?.value;

        info!("Hooking the relay director's event catalog");
        let wrapper = wrap_mod_events(
            self.mod_events_hook.clone(),
            self.catalog.clone(),
            file_system,
        );
        self.registry
            .install(&*self.mod_events_hook, director.mod_events_slot(), wrapper)
            .map_err(|source| InitError::HookInstall {
                hook: MOD_EVENTS_HOOK.to_string(),
                source,
            })?;

        let augmenter = Arc::new(RecipientAugmenter::new(engine, director));
        let total = self.config.proxies.len();
        let targets = self.config.proxies.iter().zip(&self.proxy_hooks);
        for (index, (target, hook)) in targets.enumerate() {
            info!(
                "[{}/{}] Looking up {}.{}",
                index + 1,
                total,
                target.class,
                target.path
            );

            let path = PropertyPath::parse(&target.path);
            let prop = resolve_by_class(game.as_ref(), &target.class, &path).map_err(|source| {
                InitError::PropertyNotFound {
                    class: target.class.clone(),
                    path: target.path.clone(),
                    source,
                }
            })?;

            let hook_error = |source| InitError::HookInstall {
                hook: hook.name().to_string(),
                source,
            };
            let site = prop
                .serialization_callback()
                .ok_or_else(|| hook_error(HookError::NoCallback))?;
            self.registry
                .install(&**hook, site, wrap_send_proxy(hook.clone(), augmenter.clone()))
                .map_err(hook_error)?;
        }

        Ok(())
    }
}

impl Default for RelayAugmentPlugin {
    fn default() -> Self {
        Self::new(PluginConfig::default())
    }
}
