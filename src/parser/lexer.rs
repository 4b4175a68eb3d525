//! Lexer for Spokfiles
//!
//! A state-function machine: each state inspects the input at the current
//! position, emits zero or more tokens, and hands control to the next state.
//! Tokens are delivered lazily and strictly FIFO through the `Iterator`
//! implementation; dropping the lexer cancels any further lexing.
//!
//! Any lex error emits a single `ERROR` token whose value reads
//! `SyntaxError: <desc> (Line L, Position P)` and ends the stream.

use std::collections::VecDeque;

use super::token::{Token, TokenKind};

/// A state function: runs one lexing step and returns the next state, or
/// `None` when the stream is finished.
struct StateFn(fn(&mut Lexer) -> Option<StateFn>);

pub struct Lexer {
    chars: Vec<char>,
    /// Start of the token currently being scanned
    start: usize,
    /// Current scan position
    pos: usize,
    /// 1-based line of `start`
    start_line: usize,
    /// 1-based column of `start` within its line
    start_col: usize,
    line: usize,
    /// Index of the first char of the current line
    line_start: usize,
    /// Open parens; decides where a completed string or comma resumes
    paren_depth: usize,
    tokens: VecDeque<Token>,
    state: Option<StateFn>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            start: 0,
            pos: 0,
            start_line: 1,
            start_col: 1,
            line: 1,
            line_start: 0,
            paren_depth: 0,
            tokens: VecDeque::new(),
            state: Some(StateFn(lex_start)),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.line_start = self.pos;
        }
        Some(c)
    }

    /// Begin a new token at the current position.
    fn mark_start(&mut self) {
        self.start = self.pos;
        self.start_line = self.line;
        self.start_col = self.pos - self.line_start + 1;
    }

    /// Text accumulated since `mark_start`.
    fn current_text(&self) -> String {
        self.chars[self.start..self.pos].iter().collect()
    }

    fn emit(&mut self, kind: TokenKind) {
        let value = self.current_text();
        self.emit_with(kind, value);
    }

    fn emit_with(&mut self, kind: TokenKind, value: String) {
        self.tokens
            .push_back(Token::new(kind, value, self.start_line, self.start_col));
    }

    /// Emit an ERROR token at the current scan position and end the stream.
    fn error(&mut self, desc: &str) -> Option<StateFn> {
        let col = self.pos - self.line_start + 1;
        let msg = format!("SyntaxError: {} (Line {}, Position {})", desc, self.line, col);
        self.tokens
            .push_back(Token::new(TokenKind::Error, msg, self.line, col));
        None
    }

    fn skip_spaces(&mut self) {
        while matches!(self.peek(), Some(' ') | Some('\t') | Some('\r')) {
            self.advance();
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(' ') | Some('\t') | Some('\r') | Some('\n')) {
            self.advance();
        }
    }

    /// True when the '}' at the current position closes a task body from
    /// within a command line: preceded by whitespace and followed by
    /// nothing but whitespace up to the end of the line.
    fn at_closing_brace(&self) -> bool {
        let preceded_by_ws = self.pos == self.start
            || self
                .chars
                .get(self.pos.saturating_sub(1))
                .map(|c| c.is_whitespace())
                .unwrap_or(true);
        let rest_blank = self.chars[self.pos + 1..]
            .iter()
            .take_while(|&&c| c != '\n')
            .all(|c| c.is_whitespace());
        preceded_by_ws && rest_blank
    }

    /// True if the input at the current position starts the `task` keyword,
    /// i.e. the literal text followed by a non-identifier character.
    fn at_task_keyword(&self) -> bool {
        let kw = ['t', 'a', 's', 'k'];
        if self.chars[self.pos..].len() < kw.len() {
            return false;
        }
        if self.chars[self.pos..self.pos + kw.len()] != kw {
            return false;
        }
        match self.chars.get(self.pos + kw.len()) {
            Some(c) => !is_ident_char(*c),
            None => true,
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

impl Iterator for Lexer {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        loop {
            if let Some(tok) = self.tokens.pop_front() {
                return Some(tok);
            }
            match self.state.take() {
                Some(f) => self.state = (f.0)(self),
                None => return None,
            }
        }
    }
}

/// Top level: between comments, assignments, and tasks.
fn lex_start(l: &mut Lexer) -> Option<StateFn> {
    l.skip_whitespace();
    l.mark_start();
    match l.peek() {
        None => {
            l.emit(TokenKind::Eof);
            None
        }
        Some('#') => Some(StateFn(lex_hash)),
        Some('{') => Some(StateFn(lex_lbrace)),
        Some(c) => {
            if l.at_task_keyword() {
                Some(StateFn(lex_task_keyword))
            } else if is_ident_start(c) {
                Some(StateFn(lex_ident))
            } else {
                l.error(&format!("Unexpected character {:?}", c))
            }
        }
    }
}

fn lex_hash(l: &mut Lexer) -> Option<StateFn> {
    l.mark_start();
    l.advance();
    l.emit(TokenKind::Hash);
    Some(StateFn(lex_comment))
}

/// Everything up to end of line, including leading spaces after the '#'.
fn lex_comment(l: &mut Lexer) -> Option<StateFn> {
    l.mark_start();
    while !matches!(l.peek(), Some('\n') | None) {
        l.advance();
    }
    l.emit(TokenKind::Comment);
    Some(StateFn(lex_start))
}

fn lex_task_keyword(l: &mut Lexer) -> Option<StateFn> {
    l.mark_start();
    for _ in 0.."task".len() {
        l.advance();
    }
    l.emit(TokenKind::Task);
    l.skip_spaces();
    match l.peek() {
        Some(c) if is_ident_start(c) => Some(StateFn(lex_ident)),
        _ => l.error("Expected task name"),
    }
}

/// An identifier, then dispatch on whatever follows it.
fn lex_ident(l: &mut Lexer) -> Option<StateFn> {
    l.mark_start();
    while matches!(l.peek(), Some(c) if is_ident_char(c)) {
        l.advance();
    }
    l.emit(TokenKind::Ident);
    l.skip_spaces();
    match l.peek() {
        Some('(') => Some(StateFn(lex_lparen)),
        Some(':') => Some(StateFn(lex_declare)),
        Some(')') => Some(StateFn(lex_rparen)),
        Some(',') => Some(StateFn(lex_args)),
        Some('{') => Some(StateFn(lex_lbrace)),
        Some('\n') | None => Some(StateFn(lex_start)),
        Some(c) => l.error(&format!("Unexpected character {:?}", c)),
    }
}

fn lex_lparen(l: &mut Lexer) -> Option<StateFn> {
    l.mark_start();
    l.advance();
    l.emit(TokenKind::LParen);
    l.paren_depth += 1;
    Some(StateFn(lex_args))
}

fn lex_rparen(l: &mut Lexer) -> Option<StateFn> {
    l.mark_start();
    l.advance();
    l.emit(TokenKind::RParen);
    l.paren_depth = l.paren_depth.saturating_sub(1);
    Some(StateFn(lex_after_rparen))
}

/// After a ')': a task body, an output arrow, or end of an assignment.
fn lex_after_rparen(l: &mut Lexer) -> Option<StateFn> {
    l.skip_spaces();
    match l.peek() {
        Some('{') => Some(StateFn(lex_lbrace)),
        Some('-') => Some(StateFn(lex_output_arrow)),
        Some('\n') | None => Some(StateFn(lex_start)),
        Some(c) => l.error(&format!("Unexpected character {:?}", c)),
    }
}

fn lex_output_arrow(l: &mut Lexer) -> Option<StateFn> {
    l.mark_start();
    l.advance();
    if l.peek() != Some('>') {
        return l.error("Unexpected character '-'");
    }
    l.advance();
    l.emit(TokenKind::Output);
    l.skip_spaces();
    match l.peek() {
        Some('"') => Some(StateFn(lex_string)),
        Some('(') => Some(StateFn(lex_lparen)),
        Some(c) if is_ident_start(c) => Some(StateFn(lex_ident)),
        _ => l.error("Expected output after '->'"),
    }
}

/// Inside a parenthesized list: dependencies, outputs, or function args.
fn lex_args(l: &mut Lexer) -> Option<StateFn> {
    l.skip_whitespace();
    l.mark_start();
    match l.peek() {
        Some(')') => Some(StateFn(lex_rparen)),
        Some('"') => Some(StateFn(lex_string)),
        Some(',') => {
            l.advance();
            l.emit(TokenKind::Comma);
            Some(StateFn(lex_args))
        }
        Some(c) if is_ident_start(c) => Some(StateFn(lex_ident)),
        Some(c) => l.error(&format!("Unexpected character {:?}", c)),
        None => l.error("Unterminated argument list"),
    }
}

fn lex_declare(l: &mut Lexer) -> Option<StateFn> {
    l.mark_start();
    l.advance();
    if l.peek() != Some('=') {
        return l.error("Expected ':='");
    }
    l.advance();
    l.emit(TokenKind::Declare);
    l.skip_spaces();
    match l.peek() {
        Some('"') => Some(StateFn(lex_string)),
        Some(c) if is_ident_start(c) => Some(StateFn(lex_ident)),
        Some(c) if c.is_ascii_digit() => Some(StateFn(lex_integer)),
        _ => l.error("Unexpected assignment value"),
    }
}

/// A quoted string literal; the emitted value excludes the quotes.
fn lex_string(l: &mut Lexer) -> Option<StateFn> {
    l.advance(); // opening quote
    l.mark_start();
    loop {
        match l.peek() {
            None | Some('\n') => return l.error("Unterminated string literal"),
            Some('\\') => {
                l.advance();
                l.advance();
            }
            Some('"') => {
                l.emit(TokenKind::String);
                l.advance(); // closing quote
                if l.paren_depth > 0 {
                    return Some(StateFn(lex_args));
                }
                return Some(StateFn(lex_start));
            }
            Some(_) => {
                l.advance();
            }
        }
    }
}

fn lex_integer(l: &mut Lexer) -> Option<StateFn> {
    l.mark_start();
    while matches!(l.peek(), Some(c) if c.is_ascii_digit()) {
        l.advance();
    }
    let digits = l.current_text();
    l.skip_spaces();
    match l.peek() {
        Some('\n') | None => {
            l.emit_with(TokenKind::Integer, digits);
            Some(StateFn(lex_start))
        }
        Some(c) => l.error(&format!("Unexpected character {:?} after integer", c)),
    }
}

fn lex_lbrace(l: &mut Lexer) -> Option<StateFn> {
    l.mark_start();
    l.advance();
    l.emit(TokenKind::LBrace);
    Some(StateFn(lex_task_body))
}

/// After the opening '{' of a task body, or between command lines.
fn lex_task_body(l: &mut Lexer) -> Option<StateFn> {
    l.skip_whitespace();
    l.mark_start();
    match l.peek() {
        Some('}') => Some(StateFn(lex_rbrace)),
        None => l.error("Unterminated task body"),
        Some(_) => Some(StateFn(lex_commands)),
    }
}

fn lex_rbrace(l: &mut Lexer) -> Option<StateFn> {
    l.mark_start();
    l.advance();
    l.emit(TokenKind::RBrace);
    Some(StateFn(lex_start))
}

/// A raw command line, terminated by a newline or the closing '}'.
///
/// A '}' only closes the body when it stands alone at the end of the line
/// preceded by whitespace; any other '}' belongs to the command text, so
/// template references like `{{.NAME}}` pass through intact.
fn lex_commands(l: &mut Lexer) -> Option<StateFn> {
    l.mark_start();
    loop {
        match l.peek() {
            Some('\n') => {
                let line = l.current_text();
                let trimmed = line.trim_end();
                if !trimmed.is_empty() {
                    l.emit_with(TokenKind::Command, trimmed.to_string());
                }
                return Some(StateFn(lex_task_body));
            }
            Some('}') if l.at_closing_brace() => {
                let line = l.current_text();
                let trimmed = line.trim_end();
                if !trimmed.is_empty() {
                    l.emit_with(TokenKind::Command, trimmed.to_string());
                }
                return Some(StateFn(lex_rbrace));
            }
            None => return l.error("Unterminated task body"),
            Some(_) => {
                l.advance();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input).map(|t| t.kind).collect()
    }

    fn collect(input: &str) -> Vec<Token> {
        Lexer::new(input).collect()
    }

    #[test]
    fn test_empty_input() {
        let toks = collect("");
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].kind, TokenKind::Eof);
    }

    #[test]
    fn test_lex_comment() {
        let toks = collect("# A comment\n");
        assert_eq!(toks.len(), 3);
        assert_eq!(toks[0].kind, TokenKind::Hash);
        assert_eq!(toks[0].value, "#");
        assert_eq!(toks[1].kind, TokenKind::Comment);
        assert_eq!(toks[1].value, " A comment");
        assert_eq!(toks[2].kind, TokenKind::Eof);
    }

    #[test]
    fn test_lex_string_assignment() {
        let toks = collect("GLOBAL := \"very important stuff here\"\n");
        let expect = [
            (TokenKind::Ident, "GLOBAL"),
            (TokenKind::Declare, ":="),
            (TokenKind::String, "very important stuff here"),
            (TokenKind::Eof, ""),
        ];
        assert_eq!(toks.len(), expect.len());
        for (tok, (kind, value)) in toks.iter().zip(expect.iter()) {
            assert_eq!(tok.kind, *kind);
            assert_eq!(tok.value, *value);
        }
    }

    #[test]
    fn test_lex_ident_assignment() {
        assert_eq!(
            kinds("COPY := GLOBAL\n"),
            vec![
                TokenKind::Ident,
                TokenKind::Declare,
                TokenKind::Ident,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_lex_integer_assignment() {
        let toks = collect("COUNT := 42\n");
        assert_eq!(toks[2].kind, TokenKind::Integer);
        assert_eq!(toks[2].value, "42");
    }

    #[test]
    fn test_lex_integer_trailing_garbage() {
        let toks = collect("COUNT := 42abc\n");
        let last = toks.last().unwrap();
        assert_eq!(last.kind, TokenKind::Error);
        assert!(last.value.starts_with("SyntaxError:"), "{}", last.value);
    }

    #[test]
    fn test_lex_function_call() {
        let toks = collect("GIT_COMMIT := exec(\"git rev-parse HEAD\")\n");
        assert_eq!(
            toks.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![
                TokenKind::Ident,
                TokenKind::Declare,
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::String,
                TokenKind::RParen,
                TokenKind::Eof
            ]
        );
        assert_eq!(toks[4].value, "git rev-parse HEAD");
    }

    #[test]
    fn test_lex_join_call_commas() {
        assert_eq!(
            kinds("P := join(\"a\", \"b\", \"c\")\n"),
            vec![
                TokenKind::Ident,
                TokenKind::Declare,
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::String,
                TokenKind::Comma,
                TokenKind::String,
                TokenKind::Comma,
                TokenKind::String,
                TokenKind::RParen,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_lex_simple_task() {
        let toks = collect("task test() { go test ./... }");
        assert_eq!(
            toks.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![
                TokenKind::Task,
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::Command,
                TokenKind::RBrace,
                TokenKind::Eof
            ]
        );
        assert_eq!(toks[1].value, "test");
        assert_eq!(toks[5].value, "go test ./...");
    }

    #[test]
    fn test_lex_task_with_deps_and_body_lines() {
        let src = "task build(\"**/*.go\", fmt) {\n    go build .\n    echo done\n}\n";
        let toks = collect(src);
        assert_eq!(
            toks.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![
                TokenKind::Task,
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::String,
                TokenKind::Comma,
                TokenKind::Ident,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::Command,
                TokenKind::Command,
                TokenKind::RBrace,
                TokenKind::Eof
            ]
        );
        assert_eq!(toks[8].value, "go build .");
        assert_eq!(toks[9].value, "echo done");
    }

    #[test]
    fn test_lex_task_single_output() {
        let src = "task build(\"**/*.go\") -> \"./bin/main\" {\n    go build .\n}\n";
        let toks = collect(src);
        let kinds: Vec<_> = toks.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Task,
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::String,
                TokenKind::RParen,
                TokenKind::Output,
                TokenKind::String,
                TokenKind::LBrace,
                TokenKind::Command,
                TokenKind::RBrace,
                TokenKind::Eof
            ]
        );
        assert_eq!(toks[6].value, "./bin/main");
    }

    #[test]
    fn test_lex_task_output_list() {
        let src = "task dist() -> (\"a.tar\", \"b.tar\") {\n    make dist\n}\n";
        assert_eq!(
            kinds(src),
            vec![
                TokenKind::Task,
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Output,
                TokenKind::LParen,
                TokenKind::String,
                TokenKind::Comma,
                TokenKind::String,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::Command,
                TokenKind::RBrace,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_lex_named_output() {
        let src = "task archive() -> TARBALL {\n    tar cf out.tar .\n}\n";
        assert_eq!(
            kinds(src),
            vec![
                TokenKind::Task,
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Output,
                TokenKind::Ident,
                TokenKind::LBrace,
                TokenKind::Command,
                TokenKind::RBrace,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_lex_unterminated_string() {
        let toks = collect("X := \"oops\n");
        let last = toks.last().unwrap();
        assert_eq!(last.kind, TokenKind::Error);
        assert!(
            last.value.contains("Unterminated string literal"),
            "{}",
            last.value
        );
        assert!(last.value.contains("Line 1"), "{}", last.value);
    }

    #[test]
    fn test_lex_error_ends_stream() {
        let toks = collect("X := \"oops\ntask t() { echo hi }\n");
        // nothing after the error token
        assert_eq!(toks.last().unwrap().kind, TokenKind::Error);
        assert_eq!(
            toks.iter().filter(|t| t.kind == TokenKind::Task).count(),
            0
        );
    }

    #[test]
    fn test_lex_error_message_format() {
        let toks = collect("?");
        let last = toks.last().unwrap();
        assert_eq!(last.kind, TokenKind::Error);
        assert!(last.value.starts_with("SyntaxError: "), "{}", last.value);
        assert!(last.value.ends_with("(Line 1, Position 1)"), "{}", last.value);
    }

    #[test]
    fn test_lex_line_and_pos_tracking() {
        let src = "# one\ntask two() {\n    echo hi\n}\n";
        let toks = collect(src);
        let task = toks.iter().find(|t| t.kind == TokenKind::Task).unwrap();
        assert_eq!(task.line, 2);
        assert_eq!(task.pos, 1);
        let cmd = toks.iter().find(|t| t.kind == TokenKind::Command).unwrap();
        assert_eq!(cmd.line, 3);
        assert_eq!(cmd.value, "echo hi");
    }

    #[test]
    fn test_lex_ident_containing_task_prefix() {
        // "taskrunner" must lex as an identifier, not the task keyword
        let toks = collect("taskrunner := \"x\"\n");
        assert_eq!(toks[0].kind, TokenKind::Ident);
        assert_eq!(toks[0].value, "taskrunner");
    }

    #[test]
    fn test_lex_command_with_template_braces() {
        let src = "task greet() {\n    echo {{.GREETING}} world\n}\n";
        let toks = collect(src);
        let cmd = toks.iter().find(|t| t.kind == TokenKind::Command).unwrap();
        assert_eq!(cmd.value, "echo {{.GREETING}} world");
        assert_eq!(
            toks.iter().filter(|t| t.kind == TokenKind::RBrace).count(),
            1
        );
    }

    #[test]
    fn test_lex_command_template_at_line_end() {
        let src = "task greet() {\n    echo {{.GREETING}}\n}\n";
        let toks = collect(src);
        let cmd = toks.iter().find(|t| t.kind == TokenKind::Command).unwrap();
        assert_eq!(cmd.value, "echo {{.GREETING}}");
    }

    #[test]
    fn test_lex_unicode_ident() {
        let toks = collect("målet := \"ok\"\n");
        assert_eq!(toks[0].kind, TokenKind::Ident);
        assert_eq!(toks[0].value, "målet");
    }
}
