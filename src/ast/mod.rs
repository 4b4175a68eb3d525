//! Spokfile AST

pub mod types;

pub use types::{
    AssignNode, CommandNode, CommentNode, FunctionNode, IdentNode, Node, StringNode, TaskNode,
    Tree,
};
