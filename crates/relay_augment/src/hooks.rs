//! Interception registry.
//!
//! A hook replaces the callable behind a host dispatch point with a wrapper
//! while keeping the previous callable reachable for call-through. Plain
//! function addresses and virtual dispatch slots are handled the same way:
//! the host exposes both as a [`Redirect`] site, and the registry records
//! the original in a write-once [`Hook`].
//!
//! Hooks are installed once during activation and never removed; their
//! records live as long as the plugin.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{CallError, HookError};

/// Identity of an interceptable callable in the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookTarget {
    /// A free function or callback at a fixed address.
    Function { address: usize },
    /// A virtual method slot of one object.
    Virtual { object: usize, slot: usize },
}

impl fmt::Display for HookTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookTarget::Function { address } => write!(f, "function@{address:#x}"),
            HookTarget::Virtual { object, slot } => {
                write!(f, "vtable slot {slot} of object@{object:#x}")
            }
        }
    }
}

/// A host dispatch point whose callable can be swapped.
pub trait Redirect<F: ?Sized> {
    /// Stable identity of the dispatch point.
    fn target(&self) -> HookTarget;

    /// Routes future calls to `replacement` and returns the callable that
    /// was installed before.
    fn redirect(&self, replacement: Arc<F>) -> Result<Arc<F>, HookError>;
}

/// Record of one interception point.
///
/// Created empty, filled once by [`InterceptionRegistry::install`].
pub struct Hook<F: ?Sized> {
    name: String,
    target: OnceCell<HookTarget>,
    original: OnceCell<Arc<F>>,
}

impl<F: ?Sized> Hook<F> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: OnceCell::new(),
            original: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target this hook was installed on.
    pub fn target(&self) -> Option<HookTarget> {
        self.target.get().copied()
    }

    pub fn is_installed(&self) -> bool {
        self.original.get().is_some()
    }

    /// The captured original callable.
    pub fn original(&self) -> Result<&Arc<F>, CallError> {
        self.original.get().ok_or_else(|| CallError::NullOriginal {
            hook: self.name.clone(),
        })
    }

    /// Invokes `call` with the original callable.
    ///
    /// Fails with [`CallError::NullOriginal`] before installation.
    pub fn call_original<R>(&self, call: impl FnOnce(&F) -> R) -> Result<R, CallError> {
        let original = self.original()?;
        Ok(call(original.as_ref()))
    }
}

impl<F: ?Sized> fmt::Debug for Hook<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("target", &self.target.get())
            .field("installed", &self.is_installed())
            .finish()
    }
}

/// Tracks which host targets are intercepted, and by which hook.
#[derive(Debug, Default)]
pub struct InterceptionRegistry {
    claimed: DashMap<HookTarget, String>,
}

impl InterceptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Redirects `site` to `replacement` and records the original in `hook`.
    ///
    /// One hook per target: a target already claimed by another record is
    /// refused, as is a record that is already installed. No registry lock
    /// is held while the host performs the redirect. Installs are serialized
    /// by the activation sequence.
    ///
    /// # Arguments
    /// * `hook` - Empty record that receives the captured original
    /// * `site` - Host dispatch point to redirect
    /// * `replacement` - Wrapper that future calls are routed to
    ///
    /// # Returns
    /// * `Ok(HookTarget)` - The target that is now intercepted
    /// * `Err(HookError)` - The record or target was taken, or the host refused
    pub fn install<F: ?Sized>(
        &self,
        hook: &Hook<F>,
        site: &dyn Redirect<F>,
        replacement: Arc<F>,
    ) -> Result<HookTarget, HookError> {
        if hook.is_installed() {
            return Err(HookError::AlreadyInstalled);
        }

        let target = site.target();
        if let Some(owner) = self.owner(&target) {
            return Err(HookError::TargetClaimed { target, owner });
        }

        debug!("Redirecting {} for hook {}", target, hook.name());
        let original = site.redirect(replacement)?;
        hook.original
            .set(original)
            .map_err(|_| HookError::AlreadyInstalled)?;
        let _ = hook.target.set(target);
        self.claimed.insert(target, hook.name().to_string());
        info!("Hook {} installed on {}", hook.name(), target);
        Ok(target)
    }

    /// Name of the hook intercepting `target`, if any.
    pub fn owner(&self, target: &HookTarget) -> Option<String> {
        self.claimed.get(target).map(|owner| owner.value().clone())
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Adder = dyn Fn(i32) -> i32 + Send + Sync;

    struct Slot {
        target: HookTarget,
        current: Mutex<Arc<Adder>>,
        reject: bool,
    }

    impl Slot {
        fn new(target: HookTarget) -> Self {
            let increment: Arc<Adder> = Arc::new(|x| x + 1);
            Self {
                target,
                current: Mutex::new(increment),
                reject: false,
            }
        }

        fn call(&self, x: i32) -> i32 {
            let f = self.current.lock().unwrap().clone();
            f(x)
        }
    }

    impl Redirect<Adder> for Slot {
        fn target(&self) -> HookTarget {
            self.target
        }

        fn redirect(&self, replacement: Arc<Adder>) -> Result<Arc<Adder>, HookError> {
            if self.reject {
                return Err(HookError::Rejected("write protected".to_string()));
            }
            let mut current = self.current.lock().unwrap();
            Ok(std::mem::replace(&mut *current, replacement))
        }
    }

    #[test]
    fn test_install_routes_calls_and_keeps_original() {
        let registry = InterceptionRegistry::new();
        let slot = Slot::new(HookTarget::Function { address: 0x4000 });
        let hook = Arc::new(Hook::<Adder>::new("adder"));

        let inner = hook.clone();
        let wrapper: Arc<Adder> =
            Arc::new(move |x| inner.call_original(|orig| orig(x)).unwrap_or(0) * 10);

        let target = registry.install(&*hook, &slot, wrapper).unwrap();
        assert_eq!(target, HookTarget::Function { address: 0x4000 });
        assert_eq!(hook.target(), Some(target));
        assert_eq!(registry.owner(&target).as_deref(), Some("adder"));

        assert_eq!(slot.call(1), 20);
        assert_eq!(hook.call_original(|orig| orig(1)).unwrap(), 2);
    }

    #[test]
    fn test_call_original_before_install_is_null() {
        let hook = Hook::<Adder>::new("adder");
        let err = hook.call_original(|orig| orig(1)).unwrap_err();
        assert_eq!(
            err,
            CallError::NullOriginal {
                hook: "adder".to_string()
            }
        );
    }

    #[test]
    fn test_same_target_cannot_be_claimed_twice() {
        let registry = InterceptionRegistry::new();
        let target = HookTarget::Virtual {
            object: 0x10,
            slot: 7,
        };
        let first = Slot::new(target);
        let second = Slot::new(target);

        let a = Hook::<Adder>::new("a");
        let b = Hook::<Adder>::new("b");
        registry.install(&a, &first, Arc::new(|x| x)).unwrap();

        match registry.install(&b, &second, Arc::new(|x| x)) {
            Err(HookError::TargetClaimed { owner, .. }) => assert_eq!(owner, "a"),
            other => panic!("expected TargetClaimed, got {other:?}"),
        }
        assert!(!b.is_installed());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_hook_is_write_once() {
        let registry = InterceptionRegistry::new();
        let hook = Hook::<Adder>::new("adder");
        let one = Slot::new(HookTarget::Function { address: 1 });
        let two = Slot::new(HookTarget::Function { address: 2 });

        registry.install(&hook, &one, Arc::new(|x| x)).unwrap();
        assert!(matches!(
            registry.install(&hook, &two, Arc::new(|x| x)),
            Err(HookError::AlreadyInstalled)
        ));
        assert_eq!(two.call(1), 2);
    }

    #[test]
    fn test_rejected_redirect_leaves_nothing_claimed() {
        let registry = InterceptionRegistry::new();
        let mut slot = Slot::new(HookTarget::Function { address: 3 });
        slot.reject = true;
        let hook = Hook::<Adder>::new("adder");

        assert!(matches!(
            registry.install(&hook, &slot, Arc::new(|x| x)),
            Err(HookError::Rejected(_))
        ));
        assert!(registry.is_empty());
        assert!(!hook.is_installed());
    }

    struct Reentrant<'r> {
        registry: &'r InterceptionRegistry,
        inner: Slot,
        seen_owner: Mutex<Option<Option<String>>>,
    }

    impl Redirect<Adder> for Reentrant<'_> {
        fn target(&self) -> HookTarget {
            self.inner.target()
        }

        fn redirect(&self, replacement: Arc<Adder>) -> Result<Arc<Adder>, HookError> {
            let owner = self.registry.owner(&self.target());
            assert_eq!(self.registry.len(), 0);
            *self.seen_owner.lock().unwrap() = Some(owner);
            self.inner.redirect(replacement)
        }
    }

    #[test]
    fn test_redirect_may_query_the_registry() {
        let registry = InterceptionRegistry::new();
        let site = Reentrant {
            registry: &registry,
            inner: Slot::new(HookTarget::Function { address: 0x5000 }),
            seen_owner: Mutex::new(None),
        };
        let hook = Hook::<Adder>::new("adder");

        let target = registry.install(&hook, &site, Arc::new(|x| x * 3)).unwrap();

        assert_eq!(*site.seen_owner.lock().unwrap(), Some(None));
        assert_eq!(registry.owner(&target).as_deref(), Some("adder"));
        assert_eq!(site.inner.call(2), 6);
    }
}
