//! Recursive Descent Parser for Spokfiles
//!
//! Consumes tokens lazily from the lexer and produces an AST.
//!
//! Grammar:
//!   File     ::= (Comment | Assign | Task)* EOF
//!   Assign   ::= IDENT ':=' (STRING | INTEGER | IDENT | Function)
//!   Function ::= IDENT '(' Arg (',' Arg)* ')'
//!   Arg      ::= STRING | IDENT
//!   Task     ::= [Comment] 'task' IDENT '(' DepList? ')' ['->' OutSpec] '{' COMMAND* '}'
//!   DepList  ::= Dep (','? Dep)*
//!   Dep      ::= STRING | IDENT
//!   OutSpec  ::= Dep | '(' Dep (','? Dep)* ')'
//!
//! A comment directly preceding a task becomes that task's docstring.
//! Commas between dependencies and outputs are tolerated and discarded.

use thiserror::Error;

use crate::ast::{
    AssignNode, CommandNode, CommentNode, FunctionNode, IdentNode, Node, StringNode, TaskNode,
    Tree,
};

use super::lexer::Lexer;
use super::token::{Token, TokenKind};

/// Errors produced while parsing a spokfile.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A lexer error, propagated verbatim.
    #[error("{0}")]
    Syntax(String),

    /// The parser hit a token it did not expect.
    #[error("Illegal Token: {token} (Line {line}). Expected one of [{expected}]\n\n\t{context}")]
    IllegalToken {
        /// Display form of the offending token
        token: String,
        line: usize,
        /// Comma-joined list of acceptable token kinds
        expected: String,
        /// The offending source line
        context: String,
    },
}

/// Spokfile parser: a recursive descent parser over the lexer's token
/// stream, with a three-token ring buffer allowing one token of lookahead
/// and one token of backup.
pub struct Parser {
    lexer: Lexer,
    lines: Vec<String>,
    ring: [Token; 3],
    /// Number of backed-up tokens available in the ring
    peek_count: usize,
}

impl Parser {
    pub fn new(input: &str) -> Self {
        let placeholder = Token::new(TokenKind::Eof, "", 0, 0);
        Self {
            lexer: Lexer::new(input),
            lines: input.lines().map(str::to_string).collect(),
            ring: [placeholder.clone(), placeholder.clone(), placeholder],
            peek_count: 0,
        }
    }

    fn next_token(&mut self) -> Token {
        if self.peek_count > 0 {
            self.peek_count -= 1;
        } else {
            // once the lexer is exhausted, keep handing back the last
            // terminal token so malformed input cannot hang the parser
            if let Some(tok) = self.lexer.next() {
                self.ring[0] = tok;
            }
        }
        self.ring[self.peek_count].clone()
    }

    fn backup(&mut self) {
        self.peek_count += 1;
    }

    fn peek(&mut self) -> Token {
        if self.peek_count > 0 {
            return self.ring[self.peek_count - 1].clone();
        }
        let tok = self.next_token();
        self.backup();
        tok
    }

    fn illegal(&self, tok: &Token, expected: &[TokenKind]) -> ParseError {
        let context = self
            .lines
            .get(tok.line.saturating_sub(1))
            .cloned()
            .unwrap_or_default();
        ParseError::IllegalToken {
            token: tok.to_string(),
            line: tok.line,
            expected: expected
                .iter()
                .map(|k| format!("{:?}", k.as_str()))
                .collect::<Vec<_>>()
                .join(", "),
            context,
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        let tok = self.next_token();
        if tok.kind == TokenKind::Error {
            return Err(ParseError::Syntax(tok.value));
        }
        if tok.kind != kind {
            return Err(self.illegal(&tok, &[kind]));
        }
        Ok(tok)
    }

    /// Parse the whole input into a `Tree`.
    pub fn parse(&mut self) -> Result<Tree, ParseError> {
        let mut nodes = Vec::new();
        loop {
            let tok = self.next_token();
            match tok.kind {
                TokenKind::Eof => break,
                TokenKind::Error => return Err(ParseError::Syntax(tok.value)),
                TokenKind::Hash => {
                    let comment = self.parse_comment()?;
                    // a comment immediately above a task is its docstring
                    if self.peek().kind == TokenKind::Task {
                        let task_tok = self.next_token();
                        nodes.push(Node::Task(self.parse_task(&task_tok, Some(comment))?));
                    } else {
                        nodes.push(Node::Comment(comment));
                    }
                }
                TokenKind::Ident => nodes.push(Node::Assign(self.parse_assign(tok)?)),
                TokenKind::Task => nodes.push(Node::Task(self.parse_task(&tok, None)?)),
                _ => {
                    return Err(self.illegal(
                        &tok,
                        &[TokenKind::Hash, TokenKind::Ident, TokenKind::Task],
                    ))
                }
            }
        }
        Ok(Tree::new(nodes))
    }

    fn parse_comment(&mut self) -> Result<CommentNode, ParseError> {
        let tok = self.expect(TokenKind::Comment)?;
        Ok(CommentNode { text: tok.value })
    }

    fn parse_assign(&mut self, name: Token) -> Result<AssignNode, ParseError> {
        self.expect(TokenKind::Declare)?;
        let tok = self.next_token();
        let value = match tok.kind {
            TokenKind::String => Node::String(StringNode { text: tok.value }),
            // integer literals are carried as their digit text
            TokenKind::Integer => Node::String(StringNode { text: tok.value }),
            TokenKind::Ident => {
                if self.peek().kind == TokenKind::LParen {
                    Node::Function(self.parse_function(tok)?)
                } else {
                    Node::Ident(IdentNode { name: tok.value })
                }
            }
            TokenKind::Error => return Err(ParseError::Syntax(tok.value)),
            _ => {
                return Err(self.illegal(
                    &tok,
                    &[TokenKind::String, TokenKind::Integer, TokenKind::Ident],
                ))
            }
        };
        Ok(AssignNode {
            name: IdentNode { name: name.value },
            value: Box::new(value),
        })
    }

    fn parse_function(&mut self, name: Token) -> Result<FunctionNode, ParseError> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        loop {
            let tok = self.next_token();
            match tok.kind {
                TokenKind::String => args.push(Node::String(StringNode { text: tok.value })),
                TokenKind::Ident => args.push(Node::Ident(IdentNode { name: tok.value })),
                TokenKind::Comma => continue,
                TokenKind::RParen => {
                    if args.is_empty() {
                        return Err(self.illegal(&tok, &[TokenKind::String, TokenKind::Ident]));
                    }
                    break;
                }
                TokenKind::Error => return Err(ParseError::Syntax(tok.value)),
                _ => {
                    return Err(self.illegal(
                        &tok,
                        &[TokenKind::String, TokenKind::Ident, TokenKind::RParen],
                    ))
                }
            }
        }
        Ok(FunctionNode {
            name: IdentNode { name: name.value },
            args,
        })
    }

    fn parse_task(
        &mut self,
        _task: &Token,
        docstring: Option<CommentNode>,
    ) -> Result<TaskNode, ParseError> {
        let name = self.expect(TokenKind::Ident)?;
        self.expect(TokenKind::LParen)?;
        let dependencies = self.parse_dep_list()?;

        let mut outputs = Vec::new();
        if self.peek().kind == TokenKind::Output {
            self.next_token();
            outputs = self.parse_outputs()?;
        }

        self.expect(TokenKind::LBrace)?;
        let mut commands = Vec::new();
        loop {
            let tok = self.next_token();
            match tok.kind {
                TokenKind::Command => commands.push(CommandNode { text: tok.value }),
                TokenKind::RBrace => break,
                TokenKind::Error => return Err(ParseError::Syntax(tok.value)),
                _ => {
                    return Err(
                        self.illegal(&tok, &[TokenKind::Command, TokenKind::RBrace])
                    )
                }
            }
        }

        Ok(TaskNode {
            name: IdentNode { name: name.value },
            docstring,
            dependencies,
            outputs,
            commands,
        })
    }

    /// Dependencies up to and including the closing ')'.
    fn parse_dep_list(&mut self) -> Result<Vec<Node>, ParseError> {
        let mut deps = Vec::new();
        loop {
            let tok = self.next_token();
            match tok.kind {
                TokenKind::String => deps.push(Node::String(StringNode { text: tok.value })),
                TokenKind::Ident => deps.push(Node::Ident(IdentNode { name: tok.value })),
                TokenKind::Comma => continue,
                TokenKind::RParen => break,
                TokenKind::Error => return Err(ParseError::Syntax(tok.value)),
                _ => {
                    return Err(self.illegal(
                        &tok,
                        &[TokenKind::String, TokenKind::Ident, TokenKind::RParen],
                    ))
                }
            }
        }
        Ok(deps)
    }

    /// A single output or a parenthesized list of them.
    fn parse_outputs(&mut self) -> Result<Vec<Node>, ParseError> {
        let tok = self.next_token();
        match tok.kind {
            TokenKind::String => Ok(vec![Node::String(StringNode { text: tok.value })]),
            TokenKind::Ident => Ok(vec![Node::Ident(IdentNode { name: tok.value })]),
            TokenKind::LParen => self.parse_dep_list(),
            TokenKind::Error => Err(ParseError::Syntax(tok.value)),
            _ => Err(self.illegal(
                &tok,
                &[TokenKind::String, TokenKind::Ident, TokenKind::LParen],
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn test_parse_empty() {
        let tree = parse("").unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn test_parse_top_level_comment() {
        let tree = parse("# A comment\n").unwrap();
        assert_eq!(
            tree.nodes,
            vec![Node::Comment(CommentNode { text: " A comment".into() })]
        );
    }

    #[test]
    fn test_parse_simple_task() {
        let tree = parse("task test() { go test ./... }").unwrap();
        assert_eq!(tree.nodes.len(), 1);
        let task = tree.tasks().next().unwrap();
        assert_eq!(task.name.name, "test");
        assert!(task.docstring.is_none());
        assert!(task.dependencies.is_empty());
        assert!(task.outputs.is_empty());
        assert_eq!(task.commands, vec![CommandNode { text: "go test ./...".into() }]);
    }

    #[test]
    fn test_parse_task_docstring() {
        let src = "# Run the project unit tests\ntask test(fmt) {\n    go test ./...\n}\n";
        let tree = parse(src).unwrap();
        let task = tree.tasks().next().unwrap();
        assert_eq!(
            task.docstring,
            Some(CommentNode { text: " Run the project unit tests".into() })
        );
        assert_eq!(
            task.dependencies,
            vec![Node::Ident(IdentNode { name: "fmt".into() })]
        );
    }

    #[test]
    fn test_comment_not_directly_above_task_is_top_level() {
        let src = "# standalone\nGLOBAL := \"x\"\ntask t() { echo hi }\n";
        let tree = parse(src).unwrap();
        assert!(matches!(tree.nodes[0], Node::Comment(_)));
        assert!(matches!(tree.nodes[1], Node::Assign(_)));
        let task = tree.tasks().next().unwrap();
        assert!(task.docstring.is_none());
    }

    #[test]
    fn test_parse_assign_forms() {
        let src = "A := \"text\"\nB := A\nC := 42\n";
        let tree = parse(src).unwrap();
        let values: Vec<&Node> = tree
            .nodes
            .iter()
            .map(|n| match n {
                Node::Assign(a) => a.value.as_ref(),
                _ => panic!("expected assign"),
            })
            .collect();
        assert_eq!(values[0], &Node::String(StringNode { text: "text".into() }));
        assert_eq!(values[1], &Node::Ident(IdentNode { name: "A".into() }));
        assert_eq!(values[2], &Node::String(StringNode { text: "42".into() }));
    }

    #[test]
    fn test_parse_function_call() {
        let tree = parse("JOINED := join(\"a\", \"b\", \"c\")\n").unwrap();
        match &tree.nodes[0] {
            Node::Assign(a) => match a.value.as_ref() {
                Node::Function(f) => {
                    assert_eq!(f.name.name, "join");
                    assert_eq!(f.args.len(), 3);
                }
                other => panic!("expected function, got {:?}", other),
            },
            other => panic!("expected assign, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_task_with_outputs() {
        let src = "task build(\"**/*.go\") -> \"./bin/main\" {\n    go build .\n}\n";
        let tree = parse(src).unwrap();
        let task = tree.tasks().next().unwrap();
        assert_eq!(
            task.outputs,
            vec![Node::String(StringNode { text: "./bin/main".into() })]
        );
    }

    #[test]
    fn test_parse_task_output_list() {
        let src = "task dist() -> (\"a.tar\", TARBALL) {\n    make dist\n}\n";
        let tree = parse(src).unwrap();
        let task = tree.tasks().next().unwrap();
        assert_eq!(task.outputs.len(), 2);
        assert_eq!(
            task.outputs[1],
            Node::Ident(IdentNode { name: "TARBALL".into() })
        );
    }

    #[test]
    fn test_deps_commas_optional() {
        let with = parse("task t(a, b) { echo hi }").unwrap();
        let without = parse("task t(a b) { echo hi }").unwrap();
        assert_eq!(
            with.tasks().next().unwrap().dependencies,
            without.tasks().next().unwrap().dependencies
        );
    }

    #[test]
    fn test_lex_error_propagates_verbatim() {
        let err = parse("X := \"oops\n").unwrap_err();
        match err {
            ParseError::Syntax(msg) => {
                assert!(msg.starts_with("SyntaxError: Unterminated string literal"), "{}", msg);
            }
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_illegal_token_reports_line_and_expected() {
        // a second task keyword where a command or '}' should be
        let src = "task t() {\n    echo hi\n";
        let err = parse(src).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("SyntaxError") || msg.contains("Illegal Token"), "{}", msg);
    }

    #[test]
    fn test_illegal_token_context_line() {
        // a function call needs at least one argument
        let src = "COMMIT := exec()\n";
        let err = parse(src).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Illegal Token: \")\" (Line 1)"), "{}", msg);
        assert!(msg.contains("Expected one of"), "{}", msg);
        assert!(msg.contains("COMMIT := exec()"), "{}", msg);
    }

    #[test]
    fn test_duplicate_commas_discarded() {
        let tree = parse("task t(a,, b) { echo hi }").unwrap();
        assert_eq!(tree.tasks().next().unwrap().dependencies.len(), 2);
    }

    #[test]
    fn test_pretty_print_round_trip() {
        let src = "\
GLOBAL := \"stuff\"
GIT_COMMIT := exec(\"git rev-parse HEAD\")

# Run the unit tests
task test(fmt) {
    go test -race ./...
}

task build(\"**/*.go\") -> \"./bin/main\" {
    go build .
}
";
        let tree = parse(src).unwrap();
        let printed = tree.to_string();
        let reparsed = parse(&printed).unwrap();
        assert_eq!(tree, reparsed);
    }
}
