//! Property path resolver.
//!
//! Walks the host's property-table tree to a named field. A path is a
//! dot-separated list of property names; every segment but the last must
//! name a branch property whose child table the walk descends into.
//!
//! Lookups are linear scans in host order and the first match wins, both for
//! server class names and for property names inside a table. When a segment
//! matches a property that cannot be descended into, or whose subtree does
//! not contain the rest of the path, scanning continues with its siblings.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use tracing::{debug, trace, warn};

use crate::error::PropertyError;
use crate::host::{GameServerDll, Property, PropertyTable};

/// A parsed, dot-separated property path such as `localdata.m_vecVelocity`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PropertyPath {
    segments: Vec<String>,
}

impl PropertyPath {
    /// Splits `path` on `.`; empty segments are dropped.
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path
                .split('.')
                .filter(|segment| !segment.is_empty())
                .map(str::to_owned)
                .collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl FromStr for PropertyPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

/// Finds the property addressed by `segments` below `table`.
pub fn resolve_in_table<'t>(
    table: &'t dyn PropertyTable,
    segments: &[String],
) -> Option<&'t dyn Property> {
    let (head, rest) = segments.split_first()?;

    for index in 0..table.len() {
        let Some(prop) = table.property(index) else {
            warn!("Table {} has no property at index {}", table.name(), index);
            continue;
        };

        trace!("{}[{}] = {} (looking for {})", table.name(), index, prop.name(), head);
        if prop.name() != head.as_str() {
            continue;
        }

        if rest.is_empty() {
            debug!("Found property {} in table {}", head, table.name());
            return Some(prop);
        }

        match prop.child_table() {
            Some(child) => {
                if let Some(found) = resolve_in_table(child, rest) {
                    return Some(found);
                }
            }
            None => debug!("Property {} has no child table", head),
        }
    }

    None
}

/// Finds the root table of the first server class named `class`.
pub fn find_class_table<'g>(
    game: &'g dyn GameServerDll,
    class: &str,
) -> Result<&'g dyn PropertyTable, PropertyError> {
    let server_class = game
        .server_classes()
        .find(|candidate| candidate.network_name() == class)
        .ok_or_else(|| PropertyError::ClassNotFound(class.to_string()))?;

    server_class
        .table()
        .ok_or_else(|| PropertyError::MissingTable(class.to_string()))
}

/// Finds the property at `path` inside the server class `class`.
///
/// # Arguments
/// * `game` - Game module owning the server class registry
/// * `class` - Network class name, matched exactly
/// * `path` - Property path below the class's root table
///
/// # Returns
/// * `Ok(&dyn Property)` - The first property matching the whole path
/// * `Err(PropertyError)` - The class, its table, or the path is missing
pub fn resolve_by_class<'g>(
    game: &'g dyn GameServerDll,
    class: &str,
    path: &PropertyPath,
) -> Result<&'g dyn Property, PropertyError> {
    debug!("Looking up {}.{}", class, path);
    let table = find_class_table(game, class)?;

    if path.is_empty() {
        return Err(PropertyError::EmptyPath);
    }

    resolve_in_table(table, path.segments()).ok_or_else(|| PropertyError::NotFound {
        table: table.name().to_string(),
    })
}
