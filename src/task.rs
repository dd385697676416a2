use std::collections::BTreeSet;

use crate::emit::{FieldValue, Op};
use crate::error::CompileError;
use crate::kind::Kind;
use crate::plan::Step;
use crate::registry::{Handle, Ident, Lookup, Registry};

/// Lifecycle of a generation task.
///
/// `Ready → Running → {Suspended → Ready}* → Done`, or `Failed` terminally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskState {
    Ready,
    Running,
    Suspended,
    Done,
    Failed,
}

/// What a slice of execution achieved.
#[derive(Debug)]
pub(crate) enum Progress {
    Done,
    Blocked(Ident),
}

/// The work of turning one instance into a bound handle plus its emitted
/// operations.
///
/// The step program is resumable by construction: the program counter is the
/// suspension state, so a resumed task picks up exactly where it stopped and
/// never re-emits or re-binds anything.
pub(crate) struct GenTask {
    pub index: usize,
    pub ident: Ident,
    pub kind: Kind,
    pub state: TaskState,
    /// Identifiers this task is currently blocked on.
    pub blocked_on: BTreeSet<Ident>,
    steps: Vec<Step>,
    pc: usize,
    list_pos: usize,
    buffered: Vec<Op>,
}

impl GenTask {
    pub fn new(index: usize, ident: Ident, kind: Kind, steps: Vec<Step>) -> Self {
        Self {
            index,
            ident,
            kind,
            state: TaskState::Ready,
            blocked_on: BTreeSet::new(),
            steps,
            pc: 0,
            list_pos: 0,
            buffered: Vec::new(),
        }
    }

    /// The identifiers this task will bind: its own, plus any nested
    /// sub-instances.
    pub fn owned_idents(&self) -> Vec<Ident> {
        let mut acc = vec![self.ident.clone()];
        for step in &self.steps {
            if let Step::Nested { ident, .. } = step {
                acc.push(ident.clone());
            }
        }
        acc
    }

    /// Runs the task until it completes, suspends, or fails.
    pub fn advance(&mut self, registry: &mut Registry) -> Result<Progress, CompileError> {
        self.state = TaskState::Running;
        self.blocked_on.clear();

        match self.execute(registry) {
            Ok(Progress::Done) => {
                self.state = TaskState::Done;
                Ok(Progress::Done)
            }
            Ok(Progress::Blocked(ident)) => {
                self.state = TaskState::Suspended;
                self.blocked_on.insert(ident.clone());
                Ok(Progress::Blocked(ident))
            }
            Err(err) => {
                self.state = TaskState::Failed;
                Err(err)
            }
        }
    }

    fn execute(&mut self, registry: &mut Registry) -> Result<Progress, CompileError> {
        while self.pc < self.steps.len() {
            match &self.steps[self.pc] {
                Step::Construct { params } => {
                    self.buffered.push(Op::Construct {
                        id: self.ident.clone(),
                        kind: self.kind,
                        params: params.clone(),
                    });
                }
                Step::Set { field, value } => {
                    self.buffered.push(Op::SetField {
                        id: self.ident.clone(),
                        field: field.clone(),
                        value: FieldValue::Literal(value.clone()),
                    });
                }
                Step::Register { role } => {
                    self.buffered.push(Op::RegisterRole {
                        id: self.ident.clone(),
                        role: *role,
                    });
                }
                Step::Resolve {
                    field,
                    ident,
                    expect,
                } => match registry.resolve(ident) {
                    Lookup::Built(handle) => {
                        if !handle.has(*expect) {
                            return Err(CompileError::TypeMismatch {
                                ident: ident.clone(),
                                expected: *expect,
                                found: handle.capabilities.iter().copied().collect(),
                            });
                        }
                        self.buffered.push(Op::SetField {
                            id: self.ident.clone(),
                            field: field.clone(),
                            value: FieldValue::Ref(ident.clone()),
                        });
                    }
                    Lookup::Pending => return Ok(Progress::Blocked(ident.clone())),
                    Lookup::Unknown => {
                        return Err(CompileError::UnknownIdentifier {
                            ident: ident.clone(),
                            referenced_by: self.ident.clone(),
                        });
                    }
                },
                Step::ResolveList {
                    field,
                    idents,
                    expect,
                } => {
                    // Element-by-element so a resumed task continues with the
                    // first unresolved entry.
                    while self.list_pos < idents.len() {
                        let ident = &idents[self.list_pos];
                        match registry.resolve(ident) {
                            Lookup::Built(handle) => {
                                if !handle.has(*expect) {
                                    return Err(CompileError::TypeMismatch {
                                        ident: ident.clone(),
                                        expected: *expect,
                                        found: handle.capabilities.iter().copied().collect(),
                                    });
                                }
                                self.list_pos += 1;
                            }
                            Lookup::Pending => return Ok(Progress::Blocked(ident.clone())),
                            Lookup::Unknown => {
                                return Err(CompileError::UnknownIdentifier {
                                    ident: ident.clone(),
                                    referenced_by: self.ident.clone(),
                                });
                            }
                        }
                    }
                    self.buffered.push(Op::SetField {
                        id: self.ident.clone(),
                        field: field.clone(),
                        value: FieldValue::RefList(idents.clone()),
                    });
                    self.list_pos = 0;
                }
                Step::Nested { ident, kind, steps } => {
                    for step in steps {
                        match step {
                            Step::Construct { params } => self.buffered.push(Op::Construct {
                                id: ident.clone(),
                                kind: *kind,
                                params: params.clone(),
                            }),
                            Step::Set { field, value } => self.buffered.push(Op::SetField {
                                id: ident.clone(),
                                field: field.clone(),
                                value: FieldValue::Literal(value.clone()),
                            }),
                            Step::Register { role } => self.buffered.push(Op::RegisterRole {
                                id: ident.clone(),
                                role: *role,
                            }),
                            Step::Resolve { .. } | Step::ResolveList { .. } | Step::Nested { .. } => {
                                unreachable!("nested programs cannot suspend")
                            }
                        }
                    }
                    registry.bind(Handle::new(ident.clone(), *kind))?;
                }
            }
            self.pc += 1;
        }

        registry.bind(Handle::new(self.ident.clone(), self.kind))?;
        Ok(Progress::Done)
    }

    /// Hands over the buffered operations, in the order they were produced.
    pub fn take_ops(&mut self) -> Vec<Op> {
        std::mem::take(&mut self.buffered)
    }
}
