//! Execution Engine
//!
//! Orchestrates a run: expand globs, build the dependency graph for the
//! requested tasks, topologically sort it, then walk the order hashing
//! each task's declared files and deciding whether to run or skip. The
//! digest cache is written back once at the end, and only when nothing
//! failed.

pub mod cache;
pub mod dag;
pub mod hash;

use std::collections::HashMap;

use serde::Serialize;
use similar::TextDiff;
use thiserror::Error;

use crate::file::{File, GlobError, Task};
use crate::shell::{CommandResult, IoStream, Runner, ShellError};

pub use cache::{Cache, CacheError, EMPTY_DIGEST};
pub use dag::{Graph, GraphError};
pub use hash::{AlwaysRun, HashError, Hasher, ParallelHasher, DIFFERENT};

/// Minimum similarity for a "Did you mean" candidate.
const SUGGESTION_THRESHOLD: f32 = 0.5;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Spokfile has no task {name:?}.{suggestion}")]
    UnknownTask { name: String, suggestion: String },

    #[error(
        "Task {task:?} declares a dependency on task {dep:?}, which does not exist.{suggestion}"
    )]
    MissingDependency {
        task: String,
        dep: String,
        suggestion: String,
    },

    #[error(transparent)]
    Glob(#[from] GlobError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Shell(#[from] ShellError),
}

/// What happened to one task during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskResult {
    pub task: String,
    pub command_results: Vec<CommandResult>,
    pub skipped: bool,
}

impl TaskResult {
    /// True when every command in the task exited zero.
    pub fn ok(&self) -> bool {
        self.command_results.iter().all(CommandResult::ok)
    }
}

/// The closest fuzzy match for `target` among `candidates`, ranked
/// case-insensitively, or `None` when nothing is close enough.
fn closest_match<'a>(
    target: &str,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Option<&'a str> {
    let target = target.to_lowercase();
    let mut best: Option<(&str, f32)> = None;
    for candidate in candidates {
        let lowered = candidate.to_lowercase();
        let ratio = TextDiff::from_chars(target.as_str(), lowered.as_str()).ratio();
        if ratio < SUGGESTION_THRESHOLD {
            continue;
        }
        if best.map(|(_, r)| ratio > r).unwrap_or(true) {
            best = Some((candidate, ratio));
        }
    }
    best.map(|(c, _)| c)
}

fn suggestion_for(file: &File, target: &str) -> String {
    match closest_match(target, file.tasks.keys().map(String::as_str)) {
        Some(m) => format!(" Did you mean {:?}?", m),
        None => String::new(),
    }
}

/// Build the dependency graph covering the requested tasks and their
/// transitive task dependencies.
fn build_graph(file: &File, requested: &[String]) -> Result<Graph, RunError> {
    let mut graph = Graph::new();
    for name in requested {
        add_task(file, name, None, &mut graph)?;
    }
    Ok(graph)
}

fn add_task(
    file: &File,
    name: &str,
    requester: Option<&str>,
    graph: &mut Graph,
) -> Result<(), RunError> {
    if graph.contains(name) {
        return Ok(());
    }
    let task = match file.tasks.get(name) {
        Some(task) => task,
        None => {
            let suggestion = suggestion_for(file, name);
            return Err(match requester {
                Some(requester) => RunError::MissingDependency {
                    task: requester.to_string(),
                    dep: name.to_string(),
                    suggestion,
                },
                None => RunError::UnknownTask {
                    name: name.to_string(),
                    suggestion,
                },
            });
        }
    };
    graph.add_vertex(task.clone());
    for dep in &task.task_deps {
        add_task(file, dep, Some(name), graph)?;
        graph.add_edge(dep, name)?;
    }
    Ok(())
}

/// Run the requested tasks. See the crate docs for the full decision
/// table; in short a task runs when its fingerprint differs from the
/// cached one, and the cache is only persisted after a fully green,
/// unforced run.
pub async fn run(
    file: &mut File,
    stream: &mut IoStream,
    runner: &dyn Runner,
    force: bool,
    requested: &[String],
) -> Result<Vec<TaskResult>, RunError> {
    file.expand_globs()?;

    let graph = build_graph(file, requested)?;
    let order: Vec<Task> = graph.sort()?.into_iter().cloned().collect();
    drop(graph);

    let cache_path = Cache::path(&file.dir);
    let mut cache = if Cache::exists(&cache_path) {
        Cache::load(&cache_path)?
    } else {
        Cache::init(&file.dir, file.tasks.keys().map(String::as_str))?
    };

    let env: HashMap<String, String> = file
        .vars
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let parallel = ParallelHasher;
    let always = AlwaysRun;
    let hasher: &dyn Hasher = if force { &always } else { &parallel };

    let mut results = Vec::with_capacity(order.len());
    let mut any_cacheable = false;

    for task in &order {
        let files = file.files_to_hash(task);
        // a task with nothing to hash can never be cached and runs every time
        let cacheable = !files.is_empty();
        any_cacheable |= cacheable;

        let current = tokio::task::block_in_place(|| hasher.hash(&files))?;

        if !cache.contains(&task.name) {
            cache.set(&task.name, EMPTY_DIGEST);
        }
        let cached = cache
            .get(&task.name)
            .unwrap_or(EMPTY_DIGEST)
            .to_string();

        if !force && cached != EMPTY_DIGEST && cached == current {
            log::info!("task {} is up to date, skipping", task.name);
            results.push(TaskResult {
                task: task.name.clone(),
                command_results: Vec::new(),
                skipped: true,
            });
            continue;
        }

        log::debug!(
            "task {}: cached digest {:?}, current digest {:?}",
            task.name,
            cached,
            current
        );
        let mut command_results = Vec::with_capacity(task.commands.len());
        for cmd in &task.commands {
            let result = runner.run(cmd, &task.name, stream, &env).await?;
            if !result.ok() {
                log::warn!(
                    "task {}: command {:?} exited with status {}",
                    task.name,
                    cmd,
                    result.status
                );
            }
            command_results.push(result);
        }

        if cacheable && !force {
            cache.set(&task.name, &current);
        }
        results.push(TaskResult {
            task: task.name.clone(),
            command_results,
            skipped: false,
        });
    }

    let all_ok = results.iter().all(TaskResult::ok);
    if !force && any_cacheable && all_ok {
        cache.dump(&cache_path)?;
        log::debug!("cache written to {:?}", cache_path);
    }

    Ok(results)
}
