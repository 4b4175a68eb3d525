//! Abstract Syntax Tree Types for Spokfiles
//!
//! A spokfile parses to a `Tree` of tagged nodes. The tree is built once by
//! the parser and never mutated afterwards; children are never navigated
//! back to their parents. `Display` pretty-prints a tree back to canonical
//! spokfile source.

use std::fmt;

/// A comment, everything after the '#'.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentNode {
    pub text: String,
}

/// An identifier: a variable, task, or builtin function name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentNode {
    pub name: String,
}

/// A quoted string literal, quotes stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringNode {
    pub text: String,
}

/// A raw shell command line from a task body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandNode {
    pub text: String,
}

/// A builtin function call on the right-hand side of an assignment.
/// Arguments are `String` or `Ident` nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionNode {
    pub name: IdentNode,
    pub args: Vec<Node>,
}

/// A global variable assignment. The value is a `String`, `Ident`, or
/// `Function` node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignNode {
    pub name: IdentNode,
    pub value: Box<Node>,
}

/// A task declaration. Dependencies and outputs are `String` or `Ident`
/// nodes; a comment directly above the declaration becomes its docstring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskNode {
    pub name: IdentNode,
    pub docstring: Option<CommentNode>,
    pub dependencies: Vec<Node>,
    pub outputs: Vec<Node>,
    pub commands: Vec<CommandNode>,
}

/// Union of all spokfile AST nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Comment(CommentNode),
    Ident(IdentNode),
    String(StringNode),
    Command(CommandNode),
    Function(FunctionNode),
    Assign(AssignNode),
    Task(TaskNode),
}

/// Root of a parsed spokfile: an ordered sequence of top-level nodes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All task nodes in declaration order.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskNode> {
        self.nodes.iter().filter_map(|n| match n {
            Node::Task(t) => Some(t),
            _ => None,
        })
    }
}

impl fmt::Display for CommentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.text)
    }
}

impl fmt::Display for IdentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl fmt::Display for StringNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.text)
    }
}

impl fmt::Display for CommandNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl fmt::Display for FunctionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for AssignNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} := {}", self.name, self.value)
    }
}

impl fmt::Display for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(doc) = &self.docstring {
            writeln!(f, "{}", doc)?;
        }
        write!(f, "task {}(", self.name)?;
        for (i, dep) in self.dependencies.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", dep)?;
        }
        write!(f, ")")?;
        match self.outputs.len() {
            0 => {}
            1 => write!(f, " -> {}", self.outputs[0])?,
            _ => {
                write!(f, " -> (")?;
                for (i, out) in self.outputs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", out)?;
                }
                write!(f, ")")?;
            }
        }
        writeln!(f, " {{")?;
        for cmd in &self.commands {
            writeln!(f, "    {}", cmd)?;
        }
        write!(f, "}}")
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Comment(n) => write!(f, "{}", n),
            Node::Ident(n) => write!(f, "{}", n),
            Node::String(n) => write!(f, "{}", n),
            Node::Command(n) => write!(f, "{}", n),
            Node::Function(n) => write!(f, "{}", n),
            Node::Assign(n) => write!(f, "{}", n),
            Node::Task(n) => write!(f, "{}", n),
        }
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 && matches!(node, Node::Task(_)) {
                writeln!(f)?;
            }
            writeln!(f, "{}", node)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> IdentNode {
        IdentNode { name: name.to_string() }
    }

    #[test]
    fn test_display_assign_string() {
        let node = AssignNode {
            name: ident("GLOBAL"),
            value: Box::new(Node::String(StringNode { text: "hello".into() })),
        };
        assert_eq!(node.to_string(), "GLOBAL := \"hello\"");
    }

    #[test]
    fn test_display_assign_function() {
        let node = AssignNode {
            name: ident("COMMIT"),
            value: Box::new(Node::Function(FunctionNode {
                name: ident("exec"),
                args: vec![Node::String(StringNode { text: "git rev-parse HEAD".into() })],
            })),
        };
        assert_eq!(node.to_string(), "COMMIT := exec(\"git rev-parse HEAD\")");
    }

    #[test]
    fn test_display_task() {
        let task = TaskNode {
            name: ident("build"),
            docstring: Some(CommentNode { text: " Compile the project".into() }),
            dependencies: vec![
                Node::String(StringNode { text: "**/*.go".into() }),
                Node::Ident(ident("fmt")),
            ],
            outputs: vec![Node::String(StringNode { text: "./bin/main".into() })],
            commands: vec![CommandNode { text: "go build .".into() }],
        };
        let expected = "\
# Compile the project
task build(\"**/*.go\", fmt) -> \"./bin/main\" {
    go build .
}";
        assert_eq!(task.to_string(), expected);
    }

    #[test]
    fn test_display_task_multiple_outputs() {
        let task = TaskNode {
            name: ident("dist"),
            docstring: None,
            dependencies: vec![],
            outputs: vec![
                Node::String(StringNode { text: "a.tar".into() }),
                Node::String(StringNode { text: "b.tar".into() }),
            ],
            commands: vec![CommandNode { text: "make dist".into() }],
        };
        assert!(task.to_string().contains("-> (\"a.tar\", \"b.tar\")"));
    }

    #[test]
    fn test_tree_tasks_iterator() {
        let tree = Tree::new(vec![
            Node::Comment(CommentNode { text: " hi".into() }),
            Node::Task(TaskNode {
                name: ident("a"),
                docstring: None,
                dependencies: vec![],
                outputs: vec![],
                commands: vec![],
            }),
        ]);
        assert_eq!(tree.tasks().count(), 1);
    }
}
