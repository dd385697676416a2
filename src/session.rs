use console::style;

use crate::config::ConfigTree;
use crate::emit::{Op, Sink};
use crate::error::CompileError;
use crate::executor::Scheduler;
use crate::expand::{self, IdentAllocator};
use crate::plan;
use crate::registry::{Ident, Origin, Registry};
use crate::task::GenTask;

/// One compilation, from a validated configuration tree to the ordered
/// operation stream.
///
/// The session owns the identifier registry, the expanded instance list and
/// the task table; there is no ambient state, so concurrent sessions never
/// observe each other. Construction performs everything that can fail before
/// scheduling: auto-load expansion, hard-dependency checks, identifier
/// reservation and per-instance planning.
pub struct Session {
    registry: Registry,
    scheduler: Scheduler,
}

impl Session {
    pub fn new(tree: &ConfigTree) -> Result<Self, CompileError> {
        let declared = tree.instances.len();
        let instances = expand::expand(tree)?;

        let mut alloc = IdentAllocator::new();
        for instance in &instances {
            if let Some(id) = &instance.id {
                alloc.claim(id);
            }
        }

        let idents: Vec<Ident> = instances
            .iter()
            .map(|instance| match &instance.id {
                Some(id) => Ident::new(id),
                None => alloc.generate(instance.kind),
            })
            .collect();

        // Reserve every identifier up front so forward references can name
        // instances whose tasks have not run yet.
        let mut registry = Registry::new();
        for (index, (instance, ident)) in instances.iter().zip(&idents).enumerate() {
            let origin = if index < declared {
                Origin::Declared { instance: index }
            } else {
                Origin::Generated
            };
            registry.reserve(ident.clone(), instance.kind, origin)?;
        }

        let mut tasks = Vec::with_capacity(instances.len());
        for index in 0..instances.len() {
            let (steps, subs) = plan::plan_instance(&instances, &idents, &mut alloc, index)?;
            for (sub_ident, sub_kind) in subs {
                registry.reserve(sub_ident, sub_kind, Origin::Generated)?;
            }
            tasks.push(GenTask::new(
                index,
                idents[index].clone(),
                instances[index].kind,
                steps,
            ));
        }

        Ok(Self {
            registry,
            scheduler: Scheduler::new(tasks),
        })
    }

    /// Runs the scheduler to completion and returns the operation stream.
    pub fn run(mut self) -> Result<Vec<Op>, CompileError> {
        self.scheduler.run(&mut self.registry)
    }
}

/// Compiles a configuration tree into its ordered operation stream.
///
/// Compilation is a pure one-shot function of the input: the same tree
/// always yields the same stream.
pub fn compile(tree: &ConfigTree) -> Result<Vec<Op>, CompileError> {
    crate::utils::init_logging();
    eprintln!(
        "Compiling {} declared instances with {}.",
        style(tree.instances.len()).blue(),
        style("karakuri").red()
    );

    Session::new(tree)?.run()
}

/// Compiles a configuration tree and feeds the stream to `sink`.
///
/// The sink is only touched after the whole compilation succeeds; on error
/// it receives nothing.
pub fn compile_into(tree: &ConfigTree, sink: &mut dyn Sink) -> Result<(), CompileError> {
    for op in compile(tree)? {
        sink.accept(op);
    }
    Ok(())
}
