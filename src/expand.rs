use std::collections::BTreeSet;

use crate::config::{ConfigTree, Instance};
use crate::error::CompileError;
use crate::kind::Kind;
use crate::registry::Ident;

/// Computes the full set of instances to build before anything is scheduled.
///
/// Auto-load is an "ensure present" rule over kinds, run to a fixed point:
/// a missing kind gets exactly one synthesized default instance, and the
/// synthesized instance's own auto-loads are processed in turn. Synthesized
/// instances append after the declared ones, so declaration order of the
/// user's config is preserved.
///
/// Hard dependencies are checked after the fixed point, so a kind pulled in
/// by auto-load satisfies them.
pub(crate) fn expand(tree: &ConfigTree) -> Result<Vec<Instance>, CompileError> {
    let mut instances = tree.instances.clone();
    let mut present: BTreeSet<Kind> = instances.iter().map(|i| i.kind).collect();

    let mut cursor = 0;
    while cursor < instances.len() {
        let kind = instances[cursor].kind;
        for &auto in kind.auto_load() {
            if present.insert(auto) {
                tracing::debug!("auto-loading default {auto} for {kind}");
                instances.push(auto.default_instance());
            }
        }
        cursor += 1;
    }

    for (index, instance) in instances.iter().enumerate() {
        for &required in instance.kind.requires() {
            if !present.contains(&required) {
                return Err(CompileError::MissingDependency {
                    kind: required,
                    required_by: instance.describe(index),
                });
            }
        }
    }

    Ok(instances)
}

/// Hands out fresh identifiers for unnamed instances.
///
/// Generated names never collide with explicit ones: the first unnamed
/// instance of a kind takes the kind's slug, later ones get a numeric
/// suffix.
#[derive(Default)]
pub(crate) struct IdentAllocator {
    taken: BTreeSet<String>,
}

impl IdentAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an explicitly declared name so generation skips it.
    pub fn claim(&mut self, name: &str) {
        self.taken.insert(name.to_string());
    }

    pub fn generate(&mut self, kind: Kind) -> Ident {
        let base = kind.slug();
        let mut candidate = base.to_string();
        let mut n = 2;

        while self.taken.contains(&candidate) {
            candidate = format!("{base}_{n}");
            n += 1;
        }

        self.taken.insert(candidate.clone());
        Ident::new(candidate)
    }
}
