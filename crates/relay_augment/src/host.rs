//! Capability interfaces consumed from the host process.
//!
//! The host owns every structure described here: the server class registry,
//! the property tables hanging off it, the per-call recipient sets and the
//! filesystem. This crate never reimplements their memory layout; it only
//! talks to them through the narrow traits below, which keeps the core logic
//! testable against in-memory hosts.

use std::ffi::{c_char, c_void, CStr};
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::error::ResourceError;
use crate::hooks::Redirect;

// ============================================================================
// Interface Factories
// ============================================================================

/// A capability handed out by one of the host's interface factories.
///
/// The host factory answers a textual, versioned interface name with an
/// opaque object. Each variant is the narrow view this crate needs of that
/// object.
#[derive(Clone)]
pub enum Capability {
    /// The game-logic module, which owns the server class registry.
    GameServer(Arc<dyn GameServerDll>),
    /// The engine core, used to query the process role.
    Engine(Arc<dyn EngineServer>),
    /// The filesystem, used to load configuration resources.
    FileSystem(Arc<dyn ResourceLoader>),
    /// The relay/spectator director.
    Director(Arc<dyn RelayDirector>),
}

impl Capability {
    /// Short label of the capability kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Capability::GameServer(_) => "game server",
            Capability::Engine(_) => "engine",
            Capability::FileSystem(_) => "filesystem",
            Capability::Director(_) => "relay director",
        }
    }

    pub fn into_game_server(self) -> Option<Arc<dyn GameServerDll>> {
        match self {
            Capability::GameServer(game) => Some(game),
            _ => None,
        }
    }

    pub fn into_engine(self) -> Option<Arc<dyn EngineServer>> {
        match self {
            Capability::Engine(engine) => Some(engine),
            _ => None,
        }
    }

    pub fn into_file_system(self) -> Option<Arc<dyn ResourceLoader>> {
        match self {
            Capability::FileSystem(fs) => Some(fs),
            _ => None,
        }
    }

    pub fn into_director(self) -> Option<Arc<dyn RelayDirector>> {
        match self {
            Capability::Director(director) => Some(director),
            _ => None,
        }
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Capability").field(&self.kind()).finish()
    }
}

/// Versioned capability lookup exposed by the host.
pub trait InterfaceFactory {
    /// Returns the capability registered under exactly `name`, if any.
    fn create_interface(&self, name: &str) -> Option<Capability>;
}

/// The pair of factories the host passes to the plugin on activation.
#[derive(Clone, Copy)]
pub struct HostFactories<'a> {
    /// Engine-side factory (engine core, filesystem).
    pub engine: &'a dyn InterfaceFactory,
    /// Game-side factory (game-logic module, relay director).
    pub game: &'a dyn InterfaceFactory,
}

// ============================================================================
// Server Classes and Property Tables
// ============================================================================

/// The game-logic module, as far as the server class registry goes.
pub trait GameServerDll: Send + Sync {
    /// Walks the server class registry in host order.
    fn server_classes(&self) -> Box<dyn Iterator<Item = &dyn ServerClass> + '_>;
}

/// One entry of the server class registry.
pub trait ServerClass {
    fn network_name(&self) -> &str;
    /// Root property table of the class, if the host attached one.
    fn table(&self) -> Option<&dyn PropertyTable>;
}

/// An ordered list of replicable fields belonging to one network class.
pub trait PropertyTable {
    fn name(&self) -> &str;
    fn len(&self) -> usize;
    /// Property at `index`; the host may report a hole as `None`.
    fn property(&self, index: usize) -> Option<&dyn Property>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One field of a property table; either a leaf or a branch.
pub trait Property {
    fn name(&self) -> &str;
    /// Child table for branch properties.
    fn child_table(&self) -> Option<&dyn PropertyTable>;
    /// Serialization callback dispatch point for table-typed properties.
    fn serialization_callback(&self) -> Option<&dyn Redirect<SendProxyFn>>;
}

// ============================================================================
// Process Role, Relay Director and Recipients
// ============================================================================

/// Engine core queries.
pub trait EngineServer: Send + Sync {
    /// `true` for a headless dedicated server, `false` for a combined
    /// client and server instance.
    fn is_dedicated_server(&self) -> bool;
}

/// The relay/spectator director.
pub trait RelayDirector: Send + Sync {
    /// The relay pseudo-client, when the relay server is running.
    fn active_relay_client(&self) -> Option<&dyn RelayClient>;
    /// Virtual dispatch point of the director's event-catalog method.
    fn mod_events_slot(&self) -> &dyn Redirect<ModEventsFn>;
}

/// The relay pseudo-client.
pub trait RelayClient {
    /// Client slot of the relay; negative when unassigned.
    fn slot_index(&self) -> i32;
}

/// Bit-indexed set of client slots receiving one serialized update.
pub trait RecipientSet {
    fn add_slot(&mut self, slot: usize);
}

// ============================================================================
// Resources
// ============================================================================

/// Loader for the host's key-value resource files.
pub trait ResourceLoader: Send + Sync {
    /// Loads `path` relative to the search path identified by `search_path`.
    fn load(&self, path: &str, search_path: &str)
        -> Result<Box<dyn KeyedHierarchy>, ResourceError>;
}

/// A parsed key-value document.
pub trait KeyedHierarchy {
    /// Names of the keys directly below the document root, in order.
    fn top_level_keys(&self) -> Box<dyn Iterator<Item = &str> + '_>;
}

// ============================================================================
// Interceptable Callables
// ============================================================================

/// Arguments the host passes to a data-table serialization callback.
///
/// The pointers are opaque to this crate and are forwarded untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendProxyCall {
    pub prop: *const c_void,
    pub struct_base: *const c_void,
    pub data: *const c_void,
    pub object_id: i32,
}

impl SendProxyCall {
    pub fn new(object_id: i32) -> Self {
        Self {
            prop: std::ptr::null(),
            struct_base: std::ptr::null(),
            data: std::ptr::null(),
            object_id,
        }
    }
}

/// Data-table serialization callback.
///
/// Returns the data to serialize, or `None` when the table should be
/// skipped for this entity.
pub type SendProxyFn =
    dyn Fn(&SendProxyCall, Option<&mut dyn RecipientSet>) -> Option<NonNull<c_void>> + Send + Sync;

/// The director's event-catalog method; receives the director as `this`.
pub type ModEventsFn = dyn Fn(&dyn RelayDirector) -> Option<EventList> + Send + Sync;

/// Wraps a closure as a [`SendProxyFn`].
pub fn send_proxy_fn<F>(f: F) -> Arc<SendProxyFn>
where
    F: Fn(&SendProxyCall, Option<&mut dyn RecipientSet>) -> Option<NonNull<c_void>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Wraps a closure as a [`ModEventsFn`].
pub fn mod_events_fn<F>(f: F) -> Arc<ModEventsFn>
where
    F: Fn(&dyn RelayDirector) -> Option<EventList> + Send + Sync + 'static,
{
    Arc::new(f)
}

// ============================================================================
// Event Lists
// ============================================================================

/// A null-terminated array of C strings, as exchanged with the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventList(NonNull<*const c_char>);

impl EventList {
    /// Wraps a host-provided list. Returns `None` for a null pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must point to an array of valid, NUL-terminated strings ended
    /// by a null entry, and the array and strings must outlive every use of
    /// the returned handle.
    pub unsafe fn from_raw(ptr: *const *const c_char) -> Option<Self> {
        NonNull::new(ptr as *mut *const c_char).map(Self)
    }

    pub(crate) fn from_non_null(ptr: NonNull<*const c_char>) -> Self {
        Self(ptr)
    }

    pub fn as_ptr(&self) -> *const *const c_char {
        self.0.as_ptr()
    }

    /// Iterates the names up to the terminating null or `limit` entries.
    pub fn names(&self, limit: usize) -> EventNames<'_> {
        EventNames {
            cursor: self.0,
            remaining: limit,
            _list: PhantomData,
        }
    }
}

/// Iterator over the entries of an [`EventList`].
pub struct EventNames<'a> {
    cursor: NonNull<*const c_char>,
    remaining: usize,
    _list: PhantomData<&'a EventList>,
}

impl<'a> Iterator for EventNames<'a> {
    type Item = &'a CStr;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        // SAFETY: EventList::from_raw guarantees a null-terminated array of
        // valid strings; we never step past the terminator.
        let entry = unsafe { *self.cursor.as_ptr() };
        if entry.is_null() {
            self.remaining = 0;
            return None;
        }
        self.remaining -= 1;
        self.cursor = unsafe { NonNull::new_unchecked(self.cursor.as_ptr().add(1)) };
        Some(unsafe { CStr::from_ptr(entry) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn test_event_list_stops_at_null() {
        let owned: Vec<CString> = ["player_spawn", "player_death"]
            .iter()
            .map(|s| CString::new(*s).unwrap())
            .collect();
        let mut raw: Vec<*const c_char> = owned.iter().map(|s| s.as_ptr()).collect();
        raw.push(std::ptr::null());

        let list = unsafe { EventList::from_raw(raw.as_ptr()) }.unwrap();
        let names: Vec<&str> = list.names(1000).map(|n| n.to_str().unwrap()).collect();
        assert_eq!(names, vec!["player_spawn", "player_death"]);
    }

    #[test]
    fn test_event_list_respects_limit() {
        let owned: Vec<CString> = (0..5).map(|i| CString::new(format!("e{i}")).unwrap()).collect();
        let mut raw: Vec<*const c_char> = owned.iter().map(|s| s.as_ptr()).collect();
        raw.push(std::ptr::null());

        let list = unsafe { EventList::from_raw(raw.as_ptr()) }.unwrap();
        assert_eq!(list.names(3).count(), 3);
    }

    #[test]
    fn test_null_event_list() {
        assert!(unsafe { EventList::from_raw(std::ptr::null()) }.is_none());
    }

    #[test]
    fn test_capability_accessors() {
        struct Dedicated;
        impl EngineServer for Dedicated {
            fn is_dedicated_server(&self) -> bool {
                true
            }
        }

        let cap = Capability::Engine(Arc::new(Dedicated));
        assert_eq!(cap.kind(), "engine");
        assert!(cap.clone().into_director().is_none());
        assert!(cap.into_engine().unwrap().is_dedicated_server());
    }
}
