use serde::Serialize;

use crate::kind::Kind;
use crate::registry::Ident;

/// A literal parameter value carried opaquely into the target object graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Milliseconds, the wire resolution for time periods.
    Millis(u64),
}

/// The value side of a field-binding operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Literal(Literal),
    Ref(Ident),
    /// An ordered reference collection, bound in one operation the way an
    /// interlock list is handed over as a single vector.
    RefList(Vec<Ident>),
}

/// A secondary registration an instance makes beyond plain construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Participates in the component lifecycle (setup/loop).
    Component,
    /// Exposed as a device platform of the given kind.
    Platform(Kind),
}

/// One instruction of the compiler's output stream.
///
/// The stream is ordered by task completion. Referential integrity is part of
/// the contract: every identifier a [`Op::SetField`] or [`Op::RegisterRole`]
/// names was `Construct`-ed earlier in the stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Construct {
        id: Ident,
        kind: Kind,
        params: Vec<(String, Literal)>,
    },
    SetField {
        id: Ident,
        field: String,
        value: FieldValue,
    },
    RegisterRole {
        id: Ident,
        role: Role,
    },
}

/// External consumer of the ordered operation stream.
///
/// The sink is fed only after a compilation fully succeeds; a failed run
/// never produces partial output.
pub trait Sink {
    fn accept(&mut self, op: Op);
}

impl Sink for Vec<Op> {
    fn accept(&mut self, op: Op) {
        self.push(op);
    }
}
