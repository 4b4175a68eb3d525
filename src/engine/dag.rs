//! Task Dependency Graph
//!
//! Vertices are keyed by task name and hold the task payload plus two
//! adjacency sets. Edges run parent -> child: the parent must run before
//! the child. `sort` is Kahn's algorithm with vertex insertion order as
//! the tie-break, so run order is deterministic for a given spokfile.

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

use crate::file::Task;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Task {0:?} is not in the graph")]
    MissingVertex(String),

    #[error("not a DAG: dependency cycle among tasks {0:?}")]
    NotADag(Vec<String>),
}

#[derive(Debug)]
pub struct Vertex {
    pub id: String,
    pub task: Task,
    pub parents: IndexSet<String>,
    pub children: IndexSet<String>,
}

/// The task dependency DAG, mutated only while being built.
#[derive(Debug, Default)]
pub struct Graph {
    vertices: IndexMap<String, Vertex>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.vertices.contains_key(id)
    }

    /// Insert a vertex, overwriting any existing vertex with the same id.
    pub fn add_vertex(&mut self, task: Task) {
        let id = task.name.clone();
        self.vertices.insert(
            id.clone(),
            Vertex {
                id,
                task,
                parents: IndexSet::new(),
                children: IndexSet::new(),
            },
        );
    }

    /// Record that `parent` must run before `child`. Idempotent; both
    /// endpoints must already exist.
    pub fn add_edge(&mut self, parent: &str, child: &str) -> Result<(), GraphError> {
        if !self.vertices.contains_key(parent) {
            return Err(GraphError::MissingVertex(parent.to_string()));
        }
        if !self.vertices.contains_key(child) {
            return Err(GraphError::MissingVertex(child.to_string()));
        }
        self.vertices[parent].children.insert(child.to_string());
        self.vertices[child].parents.insert(parent.to_string());
        Ok(())
    }

    /// Kahn's algorithm. Returns the tasks in an order where every parent
    /// precedes its children, or fails when a cycle leaves no vertex with
    /// in-degree zero.
    pub fn sort(&self) -> Result<Vec<&Task>, GraphError> {
        let mut in_degree: IndexMap<&str, usize> = self
            .vertices
            .values()
            .map(|v| (v.id.as_str(), v.parents.len()))
            .collect();

        let mut queue: Vec<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut order = Vec::with_capacity(self.vertices.len());
        let mut next = 0;
        while next < queue.len() {
            let id = queue[next];
            next += 1;
            let vertex = &self.vertices[id];
            order.push(&vertex.task);
            for child in &vertex.children {
                if let Some(d) = in_degree.get_mut(child.as_str()) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push(child.as_str());
                    }
                }
            }
        }

        if order.len() != self.vertices.len() {
            let remaining: Vec<String> = in_degree
                .iter()
                .filter(|(_, d)| **d > 0)
                .map(|(id, _)| id.to_string())
                .collect();
            return Err(GraphError::NotADag(remaining));
        }
        Ok(order)
    }
}
