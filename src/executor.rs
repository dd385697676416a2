use std::collections::{BTreeMap, BTreeSet};

use indicatif::ProgressStyle;
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use tracing::Level;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::emit::Op;
use crate::error::CompileError;
use crate::registry::{Ident, Registry};
use crate::task::{GenTask, Progress, TaskState};

/// Cooperative, single-threaded scheduler over the generation tasks.
///
/// All tasks are seeded ready. Each turn picks the lowest-numbered ready
/// task (declaration order — stable, not optimal) and runs it until it
/// completes, suspends on an unresolved identifier, or fails. Binding an
/// identifier moves its waiters back to the ready set; when no task is ready
/// and some are still suspended, the wait edges necessarily form a cycle and
/// the run is reported as deadlocked.
pub(crate) struct Scheduler {
    tasks: Vec<GenTask>,
    ready: BTreeSet<usize>,
    waiting: BTreeMap<Ident, Vec<usize>>,
    owners: BTreeMap<Ident, usize>,
}

impl Scheduler {
    pub fn new(tasks: Vec<GenTask>) -> Self {
        let ready = tasks.iter().map(|task| task.index).collect();
        let owners = tasks
            .iter()
            .flat_map(|task| {
                task.owned_idents()
                    .into_iter()
                    .map(move |ident| (ident, task.index))
            })
            .collect();

        Self {
            tasks,
            ready,
            waiting: BTreeMap::new(),
            owners,
        }
    }

    /// Runs every task to completion and returns the operation stream in
    /// completion order.
    pub fn run(&mut self, registry: &mut Registry) -> Result<Vec<Op>, CompileError> {
        let total = self.tasks.len() as u64;
        let mut stream = Vec::new();

        let root_span = tracing::span!(Level::INFO, "generating");
        root_span.pb_set_length(total);
        root_span.pb_set_style(
            &ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("=>-"),
        );
        root_span.pb_set_message("Generating components...");
        let _enter = root_span.enter();

        let task_style = crate::utils::get_style_task();

        while let Some(&index) = self.ready.first() {
            self.ready.remove(&index);

            let task = &mut self.tasks[index];
            let span = tracing::span!(Level::INFO, "task", name = %task.ident);
            span.pb_set_style(&task_style);
            span.pb_set_message(&format!("Generating {}", task.ident));
            let _guard = span.enter();

            match task.advance(registry)? {
                Progress::Done => {
                    stream.extend(task.take_ops());
                    root_span.pb_inc(1);
                    tracing::debug!("completed");
                }
                Progress::Blocked(ident) => {
                    tracing::debug!("suspended on '{ident}'");
                    self.waiting.entry(ident).or_default().push(index);
                }
            }

            // Requeue everything unblocked by this slice, including waiters
            // on sub-instances bound mid-task.
            for ident in registry.drain_bound() {
                if let Some(waiters) = self.waiting.remove(&ident) {
                    for waiter in waiters {
                        self.tasks[waiter].state = TaskState::Ready;
                        self.ready.insert(waiter);
                    }
                }
            }
        }

        if self.tasks.iter().all(|task| task.state == TaskState::Done) {
            tracing::info!("generated {total} instances");
            Ok(stream)
        } else {
            Err(CompileError::CyclicDependency {
                cycle: self.deadlock_cycle(),
            })
        }
    }

    /// Names the reference cycle behind a deadlock.
    ///
    /// Each suspended task waits on exactly one identifier, whose owning task
    /// is itself suspended, so the wait edges form a functional graph; the
    /// strongly connected components single out the cycle and a walk along
    /// the edges presents it in order.
    fn deadlock_cycle(&self) -> Vec<Ident> {
        let mut graph = DiGraph::<usize, ()>::new();
        let mut nodes = BTreeMap::new();

        for (index, task) in self.tasks.iter().enumerate() {
            if task.state == TaskState::Suspended {
                nodes.insert(index, graph.add_node(index));
            }
        }
        for (&index, &node) in &nodes {
            for awaited in &self.tasks[index].blocked_on {
                if let Some(owner) = self.owners.get(awaited)
                    && let Some(&target) = nodes.get(owner)
                {
                    graph.add_edge(node, target, ());
                }
            }
        }

        for scc in tarjan_scc(&graph) {
            let cyclic = scc.len() > 1 || scc.iter().any(|&n| graph.find_edge(n, n).is_some());
            if !cyclic {
                continue;
            }

            let members: BTreeSet<usize> = scc.iter().map(|&n| graph[n]).collect();
            let start = *members.first().expect("SCC cannot be empty");
            let mut cycle = Vec::new();
            let mut current = start;
            loop {
                cycle.push(self.tasks[current].ident.clone());
                let Some(awaited) = self.tasks[current].blocked_on.first() else {
                    break;
                };
                match self.owners.get(awaited) {
                    Some(&owner) if members.contains(&owner) && owner != start => current = owner,
                    _ => break,
                }
            }
            return cycle;
        }

        // No cycle among the suspended tasks means they wait on identifiers
        // nobody will bind; name the blocked tasks instead.
        self.tasks
            .iter()
            .filter(|task| task.state == TaskState::Suspended)
            .map(|task| task.ident.clone())
            .collect()
    }
}
