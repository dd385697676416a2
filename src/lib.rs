#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod config;
mod emit;
mod error;
mod executor;
mod expand;
mod kind;
mod plan;
mod registry;
mod session;
mod task;
mod utils;

pub use crate::config::{ConfigTree, Instance, Value};
pub use crate::emit::{FieldValue, Literal, Op, Role, Sink};
pub use crate::error::CompileError;
pub use crate::kind::{Capability, Kind};
pub use crate::plan::UPDATE_INTERVAL_NEVER_MS;
pub use crate::registry::{Handle, Ident, Origin};
pub use crate::session::{Session, compile, compile_into};
