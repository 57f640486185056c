//! Validated task dependency graph.

use std::collections::{HashMap, HashSet};

use crate::task::Task;

/// Structural problems in a task graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("pipeline defines no tasks")]
    Empty,

    #[error("task {0} has an empty name")]
    EmptyName(usize),

    #[error("duplicate task name '{0}'")]
    DuplicateTask(String),

    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("task '{0}' depends on itself")]
    SelfDependency(String),

    #[error("dependency cycle among tasks: {}", .0.join(", "))]
    Cycle(Vec<String>),
}

/// Collect every structural error for `(name, depends_on)` pairs given in
/// declaration order.
///
/// Cycle detection only runs once names and references are clean.
pub fn dependency_errors<'a, I>(nodes: I) -> Vec<GraphError>
where
    I: IntoIterator<Item = (&'a str, &'a [String])>,
{
    let nodes: Vec<(&str, &[String])> = nodes.into_iter().collect();
    if nodes.is_empty() {
        return vec![GraphError::Empty];
    }

    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    for (i, (name, _)) in nodes.iter().enumerate() {
        if name.trim().is_empty() {
            errors.push(GraphError::EmptyName(i));
        } else if !seen.insert(*name) {
            errors.push(GraphError::DuplicateTask((*name).to_string()));
        }
    }
    for (name, deps) in &nodes {
        for dep in *deps {
            if dep.as_str() == *name {
                errors.push(GraphError::SelfDependency((*name).to_string()));
            } else if !seen.contains(dep.as_str()) {
                errors.push(GraphError::UnknownDependency {
                    task: (*name).to_string(),
                    dependency: dep.clone(),
                });
            }
        }
    }
    if !errors.is_empty() {
        return errors;
    }

    let stuck = unresolvable(&nodes);
    if !stuck.is_empty() {
        errors.push(GraphError::Cycle(stuck));
    }
    errors
}

/// Kahn's algorithm; returns the names that never reach in-degree zero.
fn unresolvable(nodes: &[(&str, &[String])]) -> Vec<String> {
    let index: HashMap<&str, usize> = nodes.iter().enumerate().map(|(i, (n, _))| (*n, i)).collect();
    let mut indegree: Vec<usize> = nodes.iter().map(|(_, deps)| deps.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, (_, deps)) in nodes.iter().enumerate() {
        for dep in *deps {
            if let Some(&d) = index.get(dep.as_str()) {
                dependents[d].push(i);
            }
        }
    }

    let mut queue: Vec<usize> = (0..nodes.len()).filter(|&i| indegree[i] == 0).collect();
    let mut resolved = vec![false; nodes.len()];
    while let Some(i) = queue.pop() {
        resolved[i] = true;
        for &next in &dependents[i] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                queue.push(next);
            }
        }
    }

    nodes
        .iter()
        .zip(resolved)
        .filter(|(_, done)| !done)
        .map(|((name, _), _)| (*name).to_string())
        .collect()
}

/// Tasks plus their resolved dependency edges.
///
/// Construction guarantees unique names, known dependencies, and
/// acyclicity, so every task is eventually schedulable.
#[derive(Debug)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    index: HashMap<String, usize>,
    dependencies: Vec<Vec<usize>>,
}

impl TaskGraph {
    /// Build a graph from tasks in declaration order.
    ///
    /// # Errors
    ///
    /// Returns the first [`GraphError`] found.
    pub fn new(tasks: Vec<Task>) -> Result<Self, GraphError> {
        let errors =
            dependency_errors(tasks.iter().map(|t| (t.name.as_str(), t.depends_on.as_slice())));
        if let Some(first) = errors.into_iter().next() {
            return Err(first);
        }

        let index: HashMap<String, usize> = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
        let dependencies = tasks
            .iter()
            .map(|t| t.depends_on.iter().filter_map(|d| index.get(d).copied()).collect())
            .collect();
        Ok(Self {
            tasks,
            index,
            dependencies,
        })
    }

    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    #[must_use]
    pub fn task(&self, name: &str) -> Option<&Task> {
        self.index.get(name).map(|&i| &self.tasks[i])
    }

    /// Indices of the tasks `index` depends on.
    #[must_use]
    pub fn dependencies(&self, index: usize) -> &[usize] {
        &self.dependencies[index]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Topological layering: level 0 has no dependencies, level `n` only
    /// depends on levels below `n`. Tasks keep declaration order within a
    /// level.
    #[must_use]
    pub fn levels(&self) -> Vec<Vec<&str>> {
        let mut depth: Vec<Option<usize>> = vec![None; self.tasks.len()];
        // Acyclic, so each pass fixes at least one task.
        while depth.iter().any(Option::is_none) {
            for i in 0..self.tasks.len() {
                if depth[i].is_some() {
                    continue;
                }
                let deps: Option<Vec<usize>> =
                    self.dependencies[i].iter().map(|&d| depth[d]).collect();
                if let Some(deps) = deps {
                    depth[i] = Some(deps.into_iter().max().map_or(0, |m| m + 1));
                }
            }
        }

        let mut levels: Vec<Vec<&str>> = Vec::new();
        for (task, d) in self.tasks.iter().zip(depth.into_iter().flatten()) {
            if levels.len() <= d {
                levels.resize_with(d + 1, Vec::new);
            }
            levels[d].push(task.name.as_str());
        }
        levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskSpec;
    use tidemark_types::table::{LoadPolicy, TableDescriptor};

    fn task(name: &str, deps: &[&str]) -> Task {
        Task {
            name: name.to_string(),
            depends_on: deps.iter().map(|d| (*d).to_string()).collect(),
            spec: TaskSpec::Load(TableDescriptor {
                table: name.to_string(),
                columns: Vec::new(),
                select_sql: "SELECT 1".into(),
                policy: LoadPolicy::Append,
            }),
        }
    }

    #[test]
    fn levels_follow_dependencies() {
        let graph = TaskGraph::new(vec![
            task("stage_events", &[]),
            task("stage_songs", &[]),
            task("load_songplays", &["stage_events", "stage_songs"]),
            task("load_users", &["stage_events"]),
            task("quality", &["load_songplays", "load_users"]),
        ])
        .unwrap();

        assert_eq!(
            graph.levels(),
            vec![
                vec!["stage_events", "stage_songs"],
                vec!["load_songplays", "load_users"],
                vec!["quality"],
            ]
        );
        assert_eq!(graph.dependencies(2), &[0, 1]);
    }

    #[test]
    fn levels_handle_forward_references() {
        let graph = TaskGraph::new(vec![task("b", &["a"]), task("a", &[])]).unwrap();
        assert_eq!(graph.levels(), vec![vec!["a"], vec!["b"]]);
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = TaskGraph::new(vec![task("a", &[]), task("a", &[])]).unwrap_err();
        assert_eq!(err, GraphError::DuplicateTask("a".into()));
    }

    #[test]
    fn unknown_dependency_rejected() {
        let err = TaskGraph::new(vec![task("a", &["ghost"])]).unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownDependency {
                task: "a".into(),
                dependency: "ghost".into()
            }
        );
    }

    #[test]
    fn self_dependency_rejected() {
        let err = TaskGraph::new(vec![task("a", &["a"])]).unwrap_err();
        assert_eq!(err, GraphError::SelfDependency("a".into()));
    }

    #[test]
    fn cycle_reports_members_only() {
        let err = TaskGraph::new(vec![
            task("root", &[]),
            task("a", &["root", "c"]),
            task("b", &["a"]),
            task("c", &["b"]),
        ])
        .unwrap_err();
        assert_eq!(err, GraphError::Cycle(vec!["a".into(), "b".into(), "c".into()]));
        assert_eq!(err.to_string(), "dependency cycle among tasks: a, b, c");
    }

    #[test]
    fn empty_graph_rejected() {
        assert_eq!(TaskGraph::new(Vec::new()).unwrap_err(), GraphError::Empty);
    }

    #[test]
    fn all_errors_collected() {
        let deps = vec!["missing".to_string()];
        let none: Vec<String> = Vec::new();
        let errors = dependency_errors([("", none.as_slice()), ("x", deps.as_slice())]);
        assert_eq!(errors.len(), 2);
    }
}
