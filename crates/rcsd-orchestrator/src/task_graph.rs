use rcsd_core::{TaskGraph, TaskNode};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Why a decomposed task set is not a valid DAG.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// The offending cycle, as ids that start and end at the same task.
    #[error("CYCLE_DETECTED: {}", .cycle.join(" -> "))]
    CycleDetected {
        /// Task ids along the cycle.
        cycle: Vec<String>,
    },

    /// A dependency names a task that is not in the set.
    #[error("DANGLING_DEPENDENCY: task '{task}' depends on unknown task '{dependency}'")]
    DanglingDependency {
        /// The declaring task.
        task: String,
        /// The missing id.
        dependency: String,
    },

    /// A task with a blank description.
    #[error("EMPTY_DESCRIPTION: task '{task}' has no description")]
    EmptyDescription {
        /// Offending task id.
        task: String,
    },

    /// Two tasks share an id.
    #[error("DUPLICATE_TASK_ID: task id '{task}' is declared more than once")]
    DuplicateTaskId {
        /// The repeated id.
        task: String,
    },
}

impl GraphError {
    /// Stable failure kind, e.g. `CYCLE_DETECTED`.
    pub fn kind(&self) -> &'static str {
        match self {
            GraphError::CycleDetected { .. } => "CYCLE_DETECTED",
            GraphError::DanglingDependency { .. } => "DANGLING_DEPENDENCY",
            GraphError::EmptyDescription { .. } => "EMPTY_DESCRIPTION",
            GraphError::DuplicateTaskId { .. } => "DUPLICATE_TASK_ID",
        }
    }
}

/// Validates raw tasks into a [`TaskGraph`].
pub struct TaskGraphBuilder;

impl TaskGraphBuilder {
    /// Checks ids, descriptions, references and cycles, in that order, and
    /// returns the tasks in dependency order.
    ///
    /// Among tasks that are ready at the same time, the one declared first
    /// comes first, so building an already-built graph is a no-op.
    /// Repeated dependency ids are collapsed.
    pub fn build(raw: Vec<TaskNode>) -> Result<TaskGraph, GraphError> {
        let ids: Vec<String> = raw.iter().map(|t| t.id.clone()).collect();
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            if index.insert(id.as_str(), i).is_some() {
                return Err(GraphError::DuplicateTaskId { task: id.clone() });
            }
        }

        if let Some(task) = raw.iter().find(|t| t.description.trim().is_empty()) {
            return Err(GraphError::EmptyDescription {
                task: task.id.clone(),
            });
        }

        // deps[i]: indices task i depends on, first occurrence order.
        let mut deps: Vec<Vec<usize>> = Vec::with_capacity(raw.len());
        for task in &raw {
            let mut seen = HashSet::new();
            let mut resolved = Vec::new();
            for dep in &task.depends_on {
                let &j = index
                    .get(dep.as_str())
                    .ok_or_else(|| GraphError::DanglingDependency {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    })?;
                if seen.insert(j) {
                    resolved.push(j);
                }
            }
            deps.push(resolved);
        }

        let order = topological_order(&deps).map_err(|cycle| GraphError::CycleDetected {
            cycle: cycle.into_iter().map(|i| ids[i].clone()).collect(),
        })?;

        let mut slots: Vec<Option<TaskNode>> = raw.into_iter().map(Some).collect();
        let tasks = order
            .into_iter()
            .filter_map(|i| {
                let mut task = slots[i].take()?;
                task.depends_on = deps[i].iter().map(|&j| ids[j].clone()).collect();
                Some(task)
            })
            .collect();
        Ok(TaskGraph::from_sorted(tasks))
    }

    /// Re-validates an existing graph.
    pub fn rebuild(graph: &TaskGraph) -> Result<TaskGraph, GraphError> {
        Self::build(graph.tasks().to_vec())
    }
}

/// Kahn's algorithm, always taking the lowest ready index.
///
/// On failure returns a cycle as a path of indices whose first and last
/// element are equal.
fn topological_order(deps: &[Vec<usize>]) -> Result<Vec<usize>, Vec<usize>> {
    let n = deps.len();
    let mut remaining: Vec<usize> = deps.iter().map(Vec::len).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, ds) in deps.iter().enumerate() {
        for &d in ds {
            dependents[d].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| remaining[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &d in &dependents[i] {
            remaining[d] -= 1;
            if remaining[d] == 0 {
                ready.insert(d);
            }
        }
    }

    if order.len() == n {
        return Ok(order);
    }

    // Every unplaced task still has an unplaced dependency, so walking
    // dependencies from any of them must revisit a task.
    let placed: HashSet<usize> = order.into_iter().collect();
    let start = (0..n).find(|i| !placed.contains(i)).unwrap_or_default();
    let mut path = vec![start];
    let mut position: HashMap<usize, usize> = HashMap::from([(start, 0)]);
    let mut current = start;
    loop {
        let Some(&next) = deps[current].iter().find(|&&d| !placed.contains(&d)) else {
            return Err(path);
        };
        if let Some(&at) = position.get(&next) {
            let mut cycle = path.split_off(at);
            cycle.push(next);
            return Err(cycle);
        }
        position.insert(next, path.len());
        path.push(next);
        current = next;
    }
}
