//! Versioned symbol resolver.
//!
//! Host interface names end in a zero-padded version number
//! (`VEngineServer023`). The running host may expose a different version
//! than the one this plugin was written against, so the resolver strips the
//! numeric suffix and probes every version of the same width in ascending
//! order before falling back to the exact name.

use tracing::{debug, info, trace};

use crate::error::InitError;
use crate::host::{Capability, InterfaceFactory};

/// Longest numeric suffix that is probed.
pub const MAX_VERSION_DIGITS: usize = 3;

/// A successful lookup together with the name that produced it.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub name: String,
    pub value: T,
}

/// Number of trailing version digits in `name`, capped at
/// [`MAX_VERSION_DIGITS`]. The first character is never counted.
pub fn version_digits(name: &str) -> usize {
    name.bytes()
        .skip(1)
        .rev()
        .take_while(u8::is_ascii_digit)
        .take(MAX_VERSION_DIGITS)
        .count()
}

/// Candidate names probed for `name`, in order, without the fallback.
pub fn probe_names(name: &str) -> impl Iterator<Item = String> + '_ {
    let digits = version_digits(name);
    let prefix = &name[..name.len() - digits];
    let bound = if digits == 0 { 0 } else { 10usize.pow(digits as u32) };
    (0..bound).map(move |version| format!("{prefix}{version:0digits$}"))
}

/// Looks `name` up through `lookup`, probing version suffixes first.
///
/// Issues at most `10^digits` probes plus one lookup of the exact name.
pub fn resolve_versioned<T>(
    name: &str,
    mut lookup: impl FnMut(&str) -> Option<T>,
) -> Option<Resolved<T>> {
    for candidate in probe_names(name) {
        trace!("Probing {}", candidate);
        if let Some(value) = lookup(&candidate) {
            return Some(Resolved {
                name: candidate,
                value,
            });
        }
    }

    lookup(name).map(|value| Resolved {
        name: name.to_string(),
        value,
    })
}

/// Resolves a host capability and narrows it with `extract`.
///
/// A capability of the wrong kind counts as a miss for that probe.
///
/// # Arguments
/// * `factory` - Host factory answering exact interface names
/// * `name` - Requested interface name, possibly with a version suffix
/// * `extract` - Narrows the capability to the expected kind
///
/// # Returns
/// * `Ok(Resolved<T>)` - The capability and the name it was found under
/// * `Err(InitError::SymbolResolution)` - No probed name matched
pub fn resolve_capability<T>(
    factory: &dyn InterfaceFactory,
    name: &str,
    extract: impl Fn(Capability) -> Option<T>,
) -> Result<Resolved<T>, InitError> {
    debug!("Searching for {}", name);
    let resolved = resolve_versioned(name, |candidate| {
        factory.create_interface(candidate).and_then(&extract)
    })
    .ok_or_else(|| InitError::SymbolResolution {
        name: name.to_string(),
    })?;

    if resolved.name == name {
        info!("Resolved host interface {}", name);
    } else {
        info!("Resolved host interface {} as {}", name, resolved.name);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_version_digits() {
        assert_eq!(version_digits("Foo003"), 3);
        assert_eq!(version_digits("Foo12"), 2);
        assert_eq!(version_digits("Foo"), 0);
        assert_eq!(version_digits("Foo12345"), 3);
        assert_eq!(version_digits("123"), 2);
        assert_eq!(version_digits(""), 0);
    }

    #[test]
    fn test_probes_ascending_and_stops_at_first_hit() {
        let seen = RefCell::new(Vec::new());
        let resolved = resolve_versioned("Foo003", |name| {
            seen.borrow_mut().push(name.to_string());
            (name == "Foo002").then_some(2)
        })
        .unwrap();

        assert_eq!(resolved.name, "Foo002");
        assert_eq!(resolved.value, 2);
        assert_eq!(*seen.borrow(), vec!["Foo000", "Foo001", "Foo002"]);
    }

    #[test]
    fn test_newer_host_version_is_found() {
        let resolved =
            resolve_versioned("Foo003", |name| (name == "Foo017").then_some(())).unwrap();
        assert_eq!(resolved.name, "Foo017");
    }

    #[test]
    fn test_no_digits_is_a_single_lookup() {
        let mut calls = Vec::new();
        let resolved = resolve_versioned("Foo", |name| {
            calls.push(name.to_string());
            Some(())
        });
        assert!(resolved.is_some());
        assert_eq!(calls, vec!["Foo"]);
    }

    #[test]
    fn test_exhausted_probes_fall_back_to_exact_name() {
        let mut calls = 0;
        let resolved: Option<Resolved<()>> = resolve_versioned("Bar1", |_| {
            calls += 1;
            None
        });
        assert!(resolved.is_none());
        assert_eq!(calls, 11);
    }

    #[test]
    fn test_long_suffix_is_capped() {
        let names: Vec<String> = probe_names("Iface12345").take(2).collect();
        assert_eq!(names, vec!["Iface12000", "Iface12001"]);
        assert_eq!(probe_names("Iface12345").count(), 1000);
    }
}
