use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::error::CompileError;
use crate::kind::{Capability, Kind};

/// Atomic reference-counted string type used for identifiers.
pub(crate) type ArcStr = Arc<str>;

/// A symbolic name for a declared or implied instance.
///
/// Unique within one compilation, immutable once created. Cheap to clone;
/// tasks hold copies freely while the registry owns the binding.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ident(ArcStr);

impl Ident {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl Serialize for Ident {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Where an identifier came from: written out in the configuration, or
/// invented by the compiler for an unnamed or synthesized instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Declared { instance: usize },
    Generated,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Declared { instance } => write!(f, "instance #{instance}"),
            Origin::Generated => f.write_str("auto-generated"),
        }
    }
}

/// The built artifact bound to an identifier once its task completes.
///
/// Constructed exactly once by the owning task; every other task only ever
/// borrows it through [`Registry::resolve`].
#[derive(Debug, Clone)]
pub struct Handle {
    pub ident: Ident,
    pub kind: Kind,
    pub capabilities: BTreeSet<Capability>,
}

impl Handle {
    pub fn new(ident: Ident, kind: Kind) -> Self {
        Self {
            ident,
            kind,
            capabilities: kind.capabilities(),
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Outcome of a registry lookup.
pub(crate) enum Lookup<'a> {
    /// The identifier is built; here is its handle.
    Built(&'a Handle),
    /// Reserved but not yet built. The scheduler turns this into a
    /// suspension, not an error.
    Pending,
    /// Never reserved by any declared or auto-loaded instance. Permanent,
    /// non-retryable.
    Unknown,
}

struct Entry {
    kind: Kind,
    origin: Origin,
    handle: Option<Arc<Handle>>,
}

/// Maps every symbolic identifier of the compilation to "reserved, not yet
/// built" or "built, bound to a handle".
///
/// Identifiers move monotonically from reserved to built; nothing is ever
/// rebuilt or unregistered.
#[derive(Default)]
pub(crate) struct Registry {
    entries: BTreeMap<Ident, Entry>,
    bound: Vec<Ident>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an identifier before its owning task runs, so forward
    /// references can name it. Re-reserving the identical (name, origin)
    /// pair is idempotent; any other collision is a duplicate.
    pub fn reserve(&mut self, ident: Ident, kind: Kind, origin: Origin) -> Result<(), CompileError> {
        match self.entries.get(&ident) {
            Some(existing) if existing.origin == origin => Ok(()),
            Some(existing) => Err(CompileError::DuplicateIdentifier {
                ident,
                first: existing.origin,
                second: origin,
            }),
            None => {
                self.entries.insert(
                    ident,
                    Entry {
                        kind,
                        origin,
                        handle: None,
                    },
                );
                Ok(())
            }
        }
    }

    pub fn resolve(&self, ident: &Ident) -> Lookup<'_> {
        match self.entries.get(ident) {
            Some(Entry {
                handle: Some(handle),
                ..
            }) => Lookup::Built(handle),
            Some(_) => Lookup::Pending,
            None => Lookup::Unknown,
        }
    }

    /// Marks an identifier built. The handle's capability set must cover the
    /// capability declared when the identifier was reserved.
    pub fn bind(&mut self, handle: Handle) -> Result<(), CompileError> {
        let entry = self
            .entries
            .get_mut(&handle.ident)
            .expect("bind of an identifier that was never reserved");
        debug_assert!(entry.handle.is_none(), "identifier bound twice");

        if !handle.capabilities.contains(&entry.kind.capability()) {
            return Err(CompileError::TypeMismatch {
                ident: handle.ident.clone(),
                expected: entry.kind.capability(),
                found: handle.capabilities.iter().copied().collect(),
            });
        }

        let ident = handle.ident.clone();
        entry.handle = Some(Arc::new(handle));
        self.bound.push(ident);
        Ok(())
    }

    /// Identifiers bound since the last drain, in binding order. The
    /// scheduler uses this to requeue suspended tasks.
    pub fn drain_bound(&mut self) -> Vec<Ident> {
        std::mem::take(&mut self.bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_then_resolve_pending() {
        let mut registry = Registry::new();
        let id = Ident::new("pump");
        registry
            .reserve(id.clone(), Kind::Switch, Origin::Declared { instance: 0 })
            .unwrap();

        assert!(matches!(registry.resolve(&id), Lookup::Pending));
    }

    #[test]
    fn test_unknown_is_not_pending() {
        let registry = Registry::new();
        assert!(matches!(
            registry.resolve(&Ident::new("ghost")),
            Lookup::Unknown
        ));
    }

    #[test]
    fn test_bind_makes_built() {
        let mut registry = Registry::new();
        let id = Ident::new("pump");
        registry
            .reserve(id.clone(), Kind::Switch, Origin::Declared { instance: 0 })
            .unwrap();
        registry.bind(Handle::new(id.clone(), Kind::Switch)).unwrap();

        match registry.resolve(&id) {
            Lookup::Built(handle) => assert!(handle.has(Capability::Switch)),
            _ => panic!("expected a built handle"),
        }
        assert_eq!(registry.drain_bound(), vec![id]);
    }

    #[test]
    fn test_duplicate_reserve() {
        let mut registry = Registry::new();
        let id = Ident::new("pump");
        registry
            .reserve(id.clone(), Kind::Switch, Origin::Declared { instance: 0 })
            .unwrap();

        let err = registry
            .reserve(id, Kind::Switch, Origin::Declared { instance: 2 })
            .unwrap_err();
        assert!(matches!(
            err,
            CompileError::DuplicateIdentifier {
                first: Origin::Declared { instance: 0 },
                second: Origin::Declared { instance: 2 },
                ..
            }
        ));
    }

    #[test]
    fn test_reserve_idempotent_for_same_origin() {
        let mut registry = Registry::new();
        let id = Ident::new("pump");
        let origin = Origin::Declared { instance: 0 };
        registry.reserve(id.clone(), Kind::Switch, origin).unwrap();
        registry.reserve(id, Kind::Switch, origin).unwrap();
    }

    #[test]
    fn test_bind_checks_declared_capability() {
        let mut registry = Registry::new();
        let id = Ident::new("pump");
        registry
            .reserve(id.clone(), Kind::Switch, Origin::Declared { instance: 0 })
            .unwrap();

        // A handle claiming to be a sensor can't satisfy a switch slot.
        let err = registry
            .bind(Handle::new(id, Kind::Sensor))
            .unwrap_err();
        assert!(matches!(
            err,
            CompileError::TypeMismatch {
                expected: Capability::Switch,
                ..
            }
        ));
    }
}
