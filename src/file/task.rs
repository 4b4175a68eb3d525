//! Concrete Tasks
//!
//! A `Task` is the evaluated form of a `TaskNode`: dependencies split into
//! task, file, and glob dependencies; outputs split the same way; command
//! templates rendered against the file's global variables.

use std::path::{Component, Path, PathBuf};

use indexmap::IndexMap;
use thiserror::Error;

use crate::ast::{Node, TaskNode};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task {task:?}: no value for variable {name:?} in command {command:?}")]
    MissingVariable {
        task: String,
        name: String,
        command: String,
    },

    #[error("Task {task:?}: unclosed template in command {command:?}")]
    UnclosedTemplate { task: String, command: String },
}

/// A runnable task with everything resolved except glob expansion, which
/// is deferred to (and memoized in) the enclosing `File`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Docstring, leading/trailing whitespace trimmed
    pub doc: String,
    pub name: String,
    /// Names of tasks that must run before this one
    pub task_deps: Vec<String>,
    /// Declared file dependencies as absolute paths
    pub file_deps: Vec<PathBuf>,
    /// Raw glob dependency patterns
    pub glob_deps: Vec<String>,
    /// Fully interpolated shell command lines
    pub commands: Vec<String>,
    pub named_outputs: Vec<String>,
    pub file_outputs: Vec<PathBuf>,
    pub glob_outputs: Vec<String>,
}

impl Task {
    /// Build a concrete task from its AST node. `root` is the absolute
    /// spokfile directory; `vars` are the file's evaluated globals.
    pub fn from_ast(
        node: &TaskNode,
        root: &Path,
        vars: &IndexMap<String, String>,
    ) -> Result<Self, TaskError> {
        let name = node.name.name.clone();

        let mut task_deps = Vec::new();
        let mut file_deps = Vec::new();
        let mut glob_deps = Vec::new();
        for dep in &node.dependencies {
            match dep {
                Node::String(s) if s.text.contains('*') => glob_deps.push(s.text.clone()),
                Node::String(s) => file_deps.push(resolve(root, &s.text)),
                Node::Ident(i) => task_deps.push(i.name.clone()),
                _ => {}
            }
        }

        let mut named_outputs = Vec::new();
        let mut file_outputs = Vec::new();
        let mut glob_outputs = Vec::new();
        for out in &node.outputs {
            match out {
                Node::String(s) if s.text.contains('*') => glob_outputs.push(s.text.clone()),
                Node::String(s) => file_outputs.push(resolve(root, &s.text)),
                Node::Ident(i) => named_outputs.push(i.name.clone()),
                _ => {}
            }
        }

        let mut commands = Vec::new();
        for cmd in &node.commands {
            commands.push(interpolate(&name, &cmd.text, vars)?);
        }

        Ok(Self {
            doc: node
                .docstring
                .as_ref()
                .map(|d| d.text.trim().to_string())
                .unwrap_or_default(),
            name,
            task_deps,
            file_deps,
            glob_deps,
            commands,
            named_outputs,
            file_outputs,
            glob_outputs,
        })
    }

    /// True when the task declares no file or glob dependencies at all;
    /// such tasks are never cached and run on every invocation.
    pub fn has_file_dependencies(&self) -> bool {
        !self.file_deps.is_empty() || !self.glob_deps.is_empty()
    }
}

/// Join a spokfile-relative literal onto the root, dropping `.` segments.
fn resolve(root: &Path, literal: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for comp in Path::new(literal).components() {
        match comp {
            Component::CurDir => {}
            other => path.push(other.as_os_str()),
        }
    }
    path
}

/// Render `{{.NAME}}` template references against the global variables.
/// A reference to a missing variable is an error, never an empty string.
fn interpolate(
    task: &str,
    command: &str,
    vars: &IndexMap<String, String>,
) -> Result<String, TaskError> {
    let mut out = String::with_capacity(command.len());
    let mut rest = command;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| TaskError::UnclosedTemplate {
            task: task.to_string(),
            command: command.to_string(),
        })?;
        let name = after[..end].trim().trim_start_matches('.');
        match vars.get(name) {
            Some(value) => out.push_str(value),
            None => {
                return Err(TaskError::MissingVariable {
                    task: task.to_string(),
                    name: name.to_string(),
                    command: command.to_string(),
                })
            }
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Node;
    use crate::parser::parse;

    fn task_node(src: &str) -> TaskNode {
        let tree = parse(src).unwrap();
        match tree.nodes.into_iter().next().unwrap() {
            Node::Task(t) => t,
            other => panic!("expected task, got {:?}", other),
        }
    }

    fn no_vars() -> IndexMap<String, String> {
        IndexMap::new()
    }

    #[test]
    fn test_from_ast_dependency_split() {
        let node = task_node(
            "task build(\"**/*.go\", \"main.go\", fmt) {\n    go build .\n}\n",
        );
        let task = Task::from_ast(&node, Path::new("/proj"), &no_vars()).unwrap();
        assert_eq!(task.glob_deps, vec!["**/*.go"]);
        assert_eq!(task.file_deps, vec![PathBuf::from("/proj/main.go")]);
        assert_eq!(task.task_deps, vec!["fmt"]);
    }

    #[test]
    fn test_from_ast_output_split() {
        let node = task_node(
            "task dist() -> (\"./bin/main\", \"build/*.tar\", RELEASE) {\n    make\n}\n",
        );
        let task = Task::from_ast(&node, Path::new("/proj"), &no_vars()).unwrap();
        assert_eq!(task.file_outputs, vec![PathBuf::from("/proj/bin/main")]);
        assert_eq!(task.glob_outputs, vec!["build/*.tar"]);
        assert_eq!(task.named_outputs, vec!["RELEASE"]);
    }

    #[test]
    fn test_docstring_trimmed() {
        let node = task_node("# Compile the thing\ntask build() {\n    make\n}\n");
        let task = Task::from_ast(&node, Path::new("/proj"), &no_vars()).unwrap();
        assert_eq!(task.doc, "Compile the thing");
    }

    #[test]
    fn test_interpolate_variable() {
        let node = task_node("task greet() {\n    echo {{.GREETING}} world\n}\n");
        let mut vars = IndexMap::new();
        vars.insert("GREETING".to_string(), "hello".to_string());
        let task = Task::from_ast(&node, Path::new("/proj"), &vars).unwrap();
        assert_eq!(task.commands, vec!["echo hello world"]);
    }

    #[test]
    fn test_interpolate_missing_variable() {
        let node = task_node("task greet() {\n    echo {{.NOPE}}\n}\n");
        let err = Task::from_ast(&node, Path::new("/proj"), &no_vars()).unwrap_err();
        match err {
            TaskError::MissingVariable { task, name, .. } => {
                assert_eq!(task, "greet");
                assert_eq!(name, "NOPE");
            }
            other => panic!("expected missing variable, got {:?}", other),
        }
    }

    #[test]
    fn test_interpolate_unclosed() {
        let node = task_node("task greet() {\n    echo {{.NOPE\n}\n");
        // the unclosed reference swallows up to the brace; either error is
        // acceptable but it must not silently render
        assert!(Task::from_ast(&node, Path::new("/proj"), &no_vars()).is_err());
    }

    #[test]
    fn test_has_file_dependencies() {
        let with = task_node("task a(\"f.go\") {\n    echo hi\n}\n");
        let without = task_node("task b() {\n    echo hi\n}\n");
        let vars = no_vars();
        assert!(Task::from_ast(&with, Path::new("/p"), &vars)
            .unwrap()
            .has_file_dependencies());
        assert!(!Task::from_ast(&without, Path::new("/p"), &vars)
            .unwrap()
            .has_file_dependencies());
    }
}
