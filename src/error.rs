use thiserror::Error;

use crate::kind::{Capability, Kind};
use crate::registry::{Ident, Origin};

/// Every way a compilation can fail.
///
/// All of these are fatal: a half-built object graph has no well-defined
/// meaning, so the first error aborts the whole run and nothing is emitted.
#[derive(Debug, Error)]
pub enum CompileError {
    /// A malformed or out-of-range field discovered while planning an
    /// instance. Reported before any task is scheduled.
    #[error("Instance {instance}:\n{source}")]
    Validation {
        instance: String,
        #[source]
        source: anyhow::Error,
    },

    /// Two instances tried to reserve the same identifier.
    #[error("Identifier '{ident}' declared twice: {first} and {second}")]
    DuplicateIdentifier {
        ident: Ident,
        first: Origin,
        second: Origin,
    },

    /// A reference names an identifier no declared or auto-loaded instance
    /// ever reserved. Unlike a not-yet-built identifier, this can never
    /// become resolvable.
    #[error("Identifier '{ident}' referenced by '{referenced_by}' is not declared anywhere in the configuration")]
    UnknownIdentifier { ident: Ident, referenced_by: Ident },

    /// A resolved handle lacks the capability the reference site requires.
    #[error("Identifier '{ident}' does not provide the {expected:?} capability required here (provides {found:?})")]
    TypeMismatch {
        ident: Ident,
        expected: Capability,
        found: Vec<Capability>,
    },

    /// A hard dependency kind is absent and may not be synthesized.
    #[error("Component kind '{kind}' required by {required_by} is missing from the configuration")]
    MissingDependency { kind: Kind, required_by: String },

    /// The scheduler ran out of ready tasks while some were still suspended.
    #[error("Scheduler deadlock, reference cycle: {}", fmt_cycle(.cycle))]
    CyclicDependency { cycle: Vec<Ident> },

    #[error("Couldn't read the configuration file.\n{0}")]
    ConfigRead(#[from] std::io::Error),

    #[error("Couldn't parse the configuration.\n{0}")]
    ConfigParse(#[from] serde_json::Error),
}

fn fmt_cycle(cycle: &[Ident]) -> String {
    let mut acc = cycle
        .iter()
        .map(|ident| format!("'{ident}'"))
        .collect::<Vec<_>>()
        .join(" -> ");

    if let Some(first) = cycle.first() {
        acc.push_str(&format!(" -> '{first}'"));
    }

    acc
}
