//! The File Object
//!
//! Ties the whole engine together: a `File` is a fully evaluated spokfile,
//! with globals resolved (builtin calls included), concrete tasks built,
//! and glob patterns registered for lazy expansion. `File::run` hands off
//! to the execution engine.

pub mod builtins;
pub mod glob;
pub mod task;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use thiserror::Error;

use crate::ast::{Node, Tree};
use crate::engine;
use crate::engine::RunError;
use crate::engine::TaskResult;
use crate::shell::{IoStream, Runner};

pub use builtins::BuiltinError;
pub use glob::GlobError;
pub use task::{Task, TaskError};

/// Canonical name of the build file.
pub const SPOKFILE_NAME: &str = "spokfile";

#[derive(Debug, Error)]
pub enum FileError {
    #[error("Undefined variable {name:?}")]
    UndefinedVariable { name: String },

    #[error("Builtin function arguments must be string literals, got identifier {name:?}")]
    IdentArgument { name: String },

    #[error("Unexpected assignment value for {name:?}")]
    BadAssignment { name: String },

    #[error("Duplicate task {name:?}")]
    DuplicateTask { name: String },

    #[error(transparent)]
    Builtin(#[from] BuiltinError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("No spokfile found in {start:?} or any parent up to {stop:?}")]
    NotFound { start: PathBuf, stop: PathBuf },
}

/// A fully evaluated spokfile.
#[derive(Debug)]
pub struct File {
    /// Absolute path of the spokfile itself
    pub path: PathBuf,
    /// The directory containing it; all relative literals resolve here
    pub dir: PathBuf,
    /// Evaluated global variables, in declaration order
    pub vars: IndexMap<String, String>,
    /// Concrete tasks, in declaration order
    pub tasks: IndexMap<String, Task>,
    /// Glob pattern -> expanded absolute paths; empty until expansion
    globs: HashMap<String, Vec<PathBuf>>,
    globs_expanded: bool,
}

impl File {
    /// Evaluate a parsed tree against the absolute directory that contains
    /// the spokfile.
    pub fn new(tree: &Tree, root: impl Into<PathBuf>) -> Result<Self, FileError> {
        let dir = root.into();
        let mut vars: IndexMap<String, String> = IndexMap::new();
        let mut tasks: IndexMap<String, Task> = IndexMap::new();
        let mut globs: HashMap<String, Vec<PathBuf>> = HashMap::new();

        for node in &tree.nodes {
            match node {
                Node::Assign(assign) => {
                    let name = assign.name.name.clone();
                    let value = match assign.value.as_ref() {
                        Node::String(s) => s.text.clone(),
                        Node::Ident(ident) => vars
                            .get(&ident.name)
                            .cloned()
                            .ok_or_else(|| FileError::UndefinedVariable {
                                name: ident.name.clone(),
                            })?,
                        Node::Function(call) => {
                            let mut args = Vec::with_capacity(call.args.len());
                            for arg in &call.args {
                                match arg {
                                    Node::String(s) => args.push(s.text.clone()),
                                    Node::Ident(i) => {
                                        return Err(FileError::IdentArgument {
                                            name: i.name.clone(),
                                        })
                                    }
                                    _ => {
                                        return Err(FileError::BadAssignment {
                                            name: name.clone(),
                                        })
                                    }
                                }
                            }
                            let func = builtins::lookup(&call.name.name)?;
                            func(&args)?
                        }
                        _ => return Err(FileError::BadAssignment { name }),
                    };
                    vars.insert(name, value);
                }
                Node::Task(node) => {
                    let task = Task::from_ast(node, &dir, &vars)?;
                    if tasks.contains_key(&task.name) {
                        return Err(FileError::DuplicateTask { name: task.name });
                    }
                    for pattern in task.glob_deps.iter().chain(task.glob_outputs.iter()) {
                        globs.entry(pattern.clone()).or_default();
                    }
                    tasks.insert(task.name.clone(), task);
                }
                _ => {}
            }
        }

        Ok(Self {
            path: dir.join(SPOKFILE_NAME),
            dir,
            vars,
            tasks,
            globs,
            globs_expanded: false,
        })
    }

    /// Expand every registered glob pattern against the spokfile directory.
    /// Expansion happens at most once per `File`; later calls are no-ops.
    pub fn expand_globs(&mut self) -> Result<(), GlobError> {
        if self.globs_expanded {
            return Ok(());
        }
        for (pattern, paths) in self.globs.iter_mut() {
            *paths = glob::expand(&self.dir, pattern)?;
            log::debug!("glob {:?} matched {} file(s)", pattern, paths.len());
        }
        self.globs_expanded = true;
        Ok(())
    }

    /// Expanded paths for one pattern; empty before `expand_globs`.
    pub fn glob_matches(&self, pattern: &str) -> &[PathBuf] {
        self.globs.get(pattern).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every file the given task's fingerprint covers: the union of its
    /// expanded glob dependencies and its literal file dependencies.
    pub fn files_to_hash(&self, task: &Task) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = Vec::new();
        for pattern in &task.glob_deps {
            files.extend(self.glob_matches(pattern).iter().cloned());
        }
        files.extend(task.file_deps.iter().cloned());
        files.sort();
        files.dedup();
        files
    }

    /// Run the requested tasks (and their transitive dependencies) in
    /// topological order, skipping tasks whose fingerprints are unchanged.
    pub async fn run(
        &mut self,
        stream: &mut IoStream,
        runner: &dyn Runner,
        force: bool,
        requested: &[String],
    ) -> Result<Vec<TaskResult>, RunError> {
        engine::run(self, stream, runner, force, requested).await
    }
}

/// Walk upwards from `start` towards `stop` looking for a spokfile.
pub fn find_spokfile(start: &Path, stop: &Path) -> Result<PathBuf, FileError> {
    let mut dir = start;
    loop {
        let candidate = dir.join(SPOKFILE_NAME);
        if candidate.is_file() {
            return Ok(candidate);
        }
        if dir == stop {
            break;
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => break,
        }
    }
    Err(FileError::NotFound {
        start: start.to_path_buf(),
        stop: stop.to_path_buf(),
    })
}
