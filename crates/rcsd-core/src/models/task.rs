use serde::{Deserialize, Serialize};

/// Rough size of an atomic task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effort {
    /// Fits in a single short session.
    Small,
    /// A few hours of focused work.
    Medium,
    /// Should probably be split further.
    Large,
}

/// An atomic unit of work produced by the decompose stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskNode {
    /// Identifier, unique within one graph.
    pub id: String,
    /// What has to be done.
    pub description: String,
    /// Ids of the tasks this one depends on, in declaration order.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Estimated effort, when the decomposer provided one.
    #[serde(default)]
    pub estimated_effort: Option<Effort>,
}

impl TaskNode {
    /// Creates a task without dependencies.
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            depends_on: Vec::new(),
            estimated_effort: None,
        }
    }

    /// Sets the dependency list.
    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the estimated effort.
    pub fn with_effort(mut self, effort: Effort) -> Self {
        self.estimated_effort = Some(effort);
        self
    }
}

/// A validated task graph whose tasks are stored in topological order.
///
/// Build one with the orchestrator's `TaskGraphBuilder`; every dependency of
/// a task appears earlier in [`TaskGraph::tasks`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskGraph {
    tasks: Vec<TaskNode>,
}

impl TaskGraph {
    /// Wraps tasks that are already in a valid topological order.
    pub fn from_sorted(tasks: Vec<TaskNode>) -> Self {
        Self { tasks }
    }

    /// Tasks in execution order.
    pub fn tasks(&self) -> &[TaskNode] {
        &self.tasks
    }

    /// Task ids in execution order.
    pub fn order(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.id.as_str()).collect()
    }

    /// Looks up a task by id.
    pub fn get(&self, id: &str) -> Option<&TaskNode> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the graph has no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
