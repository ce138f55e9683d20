//! Event catalog builder.
//!
//! The relay director only records the events its event-catalog method
//! reports. The wrapper installed here widens that list once: it merges the
//! host's own names with the top-level keys of the configured event
//! resources, then keeps serving the merged list.
//!
//! The host keeps the returned pointer array across calls, so the catalog is
//! built at most once and its storage is never moved or freed afterwards.

use std::collections::BTreeSet;
use std::ffi::{c_char, CStr, CString};
use std::ptr::{self, NonNull};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::EventSettings;
use crate::error::{CallError, ResourceError};
use crate::hooks::Hook;
use crate::host::{mod_events_fn, EventList, ModEventsFn, ResourceLoader};

/// A sorted, deduplicated set of event names with a null-terminated
/// pointer view over them.
pub struct EventCatalog {
    names: Vec<CString>,
    view: Vec<*const c_char>,
}

// SAFETY: `view` only points into the heap buffers owned by `names`, and
// neither vector is mutated after construction.
unsafe impl Send for EventCatalog {}
unsafe impl Sync for EventCatalog {}

impl EventCatalog {
    fn from_names(names: BTreeSet<CString>) -> Self {
        let names: Vec<CString> = names.into_iter().collect();
        let mut view: Vec<*const c_char> = names.iter().map(|name| name.as_ptr()).collect();
        view.push(ptr::null());
        Self { names, view }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in lexicographic byte order.
    pub fn names(&self) -> impl Iterator<Item = &CStr> {
        self.names.iter().map(CString::as_c_str)
    }

    /// The null-terminated pointer view handed to the host.
    pub fn as_event_list(&self) -> EventList {
        // The view is null-terminated and points at strings owned by `self`.
        EventList::from_non_null(NonNull::from(self.view.as_slice()).cast())
    }
}

impl std::fmt::Debug for EventCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Builds the [`EventCatalog`] on first use and caches it.
pub struct EventCatalogBuilder {
    settings: EventSettings,
    catalog: OnceCell<EventCatalog>,
}

impl EventCatalogBuilder {
    pub fn new(settings: EventSettings) -> Self {
        Self {
            settings,
            catalog: OnceCell::new(),
        }
    }

    pub fn is_built(&self) -> bool {
        self.catalog.get().is_some()
    }

    pub fn catalog(&self) -> Option<&EventCatalog> {
        self.catalog.get()
    }

    /// Returns the cached catalog, building it first if needed.
    ///
    /// `host_events` is only called while building. If it fails the
    /// catalog stays unbuilt and the next call tries again.
    ///
    /// # Arguments
    /// * `host_events` - Produces the host's own event list
    /// * `loader` - Loads the configured event resources
    ///
    /// # Returns
    /// * `Ok(EventList)` - The cached view, identical on every call
    /// * `Err(CallError)` - The host list was unavailable; nothing was cached
    pub fn get_or_build(
        &self,
        host_events: impl FnOnce() -> Result<EventList, CallError>,
        loader: &dyn ResourceLoader,
    ) -> Result<EventList, CallError> {
        self.catalog
            .get_or_try_init(|| Ok(self.build(host_events()?, loader)))
            .map(EventCatalog::as_event_list)
    }

    fn build(&self, host_events: EventList, loader: &dyn ResourceLoader) -> EventCatalog {
        let mut names = BTreeSet::new();
        for name in host_events.names(self.settings.max_host_events) {
            names.insert(name.to_owned());
        }
        debug!("Host reported {} events", names.len());

        for resource in &self.settings.resources {
            match merge_resource(loader, resource, &self.settings.search_path, &mut names) {
                Ok(added) => debug!("Merged {} new events from {}", added, resource),
                Err(err) => {
                    debug!("Skipping event resource {}", resource);
                    err.report();
                }
            }
        }

        let catalog = EventCatalog::from_names(names);
        info!("Event catalog built with {} events", catalog.len());
        catalog
    }
}

/// Inserts every top-level key of `path` into `names`.
///
/// Returns how many names were new.
pub fn merge_resource(
    loader: &dyn ResourceLoader,
    path: &str,
    search_path: &str,
    names: &mut BTreeSet<CString>,
) -> Result<usize, ResourceError> {
    let document = loader.load(path, search_path)?;
    let mut added = 0;
    for key in document.top_level_keys() {
        match CString::new(key) {
            Ok(name) => {
                if names.insert(name) {
                    added += 1;
                }
            }
            Err(_) => warn!("Ignoring event name with embedded NUL in {}", path),
        }
    }
    Ok(added)
}

/// Builds the wrapper installed on the director's event-catalog method.
pub fn wrap_mod_events(
    hook: Arc<Hook<ModEventsFn>>,
    builder: Arc<EventCatalogBuilder>,
    loader: Arc<dyn ResourceLoader>,
) -> Arc<ModEventsFn> {
    mod_events_fn(move |director| {
        let host_events = || {
            hook.call_original(|original| original(director))?
                .ok_or_else(|| CallError::EmptyOriginal {
                    hook: hook.name().to_string(),
                })
        };

        match builder.get_or_build(host_events, loader.as_ref()) {
            Ok(list) => Some(list),
            Err(err) => {
                err.report();
                None
            }
        }
    })
}
