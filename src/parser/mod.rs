//! # Sys2DSL Parser
//!
//! Lexes and parses the strict single-triple statement language:
//!
//! ```text
//! Statement := Dest? Operator Expr* Comment?
//! Dest      := '@' Ident (':' Ident)? | '@:' Ident
//! Operator  := Ident | Reference | Compound
//! Expr      := Ident | '?'Ident | '$'Ident | Number | String | List | Compound
//! ```
//!
//! plus `graph`/`macro`, `theory` (both spellings), and `solve` blocks.
//! Statements are line-oriented: a statement ends at newline, EOF, a
//! comment, or the closing bracket of an enclosing block. `#` and `//`
//! start line comments, `/* */` block comments nest.
//!
//! ## Hard rules
//!
//! 1. At most one `@` destination per statement.
//! 2. Destinations are single-assignment per scope (enforced by the
//!    session at execution time; the parser enforces the one-`@` rule).
//! 3. Graph bodies may contain one `return`, which accepts a bare
//!    operator call without parentheses (`return And $x $y`).

use crate::ast::{
    Dest, Expr, GraphDeclaration, Node, Program, SolveBlock, Statement, TheoryDeclaration,
};
use crate::error::ParseError;

/// Inline-comment policy for theory-file statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentPolicy {
    /// No checking (default for ad-hoc input).
    #[default]
    Off,
    /// Emit a warning when a theory statement's inline comment has fewer
    /// than three words (or is missing).
    Warn,
    /// Error when a theory statement has no inline comment.
    Require,
}

// ============================================================================
// Tokens
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// `@name`, `@name:tag`, `@:name`. Any `:tag` suffix (or the `@:`
    /// spelling) marks the binding as persistent.
    Dest { name: String, persist: bool },
    Ident(String),
    Hole(String),
    Reference(String),
    Number(f64),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Dest { name, .. } => format!("@{name}"),
            Token::Ident(s) => s.clone(),
            Token::Hole(s) => format!("?{s}"),
            Token::Reference(s) => format!("${s}"),
            Token::Number(n) => n.to_string(),
            Token::Str(s) => format!("\"{s}\""),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
            Token::LBracket => "[".to_string(),
            Token::RBracket => "]".to_string(),
            Token::LBrace => "{".to_string(),
            Token::RBrace => "}".to_string(),
            Token::Comma => ",".to_string(),
        }
    }
}

/// One source line after lexing.
#[derive(Debug, Clone)]
struct Line {
    number: usize,
    tokens: Vec<Token>,
    comment: Option<String>,
}

// ============================================================================
// Lexer
// ============================================================================

/// Strip `/* */` comments (nesting, string-aware), preserving newlines so
/// later line numbers stay accurate.
fn strip_block_comments(source: &str) -> Result<String, ParseError> {
    let mut result = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut line = 1usize;
    let mut comment_start_line = 0usize;

    while let Some(c) = chars.next() {
        if c == '\n' {
            line += 1;
            result.push('\n');
            continue;
        }
        if in_string {
            result.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    result.push(escaped);
                }
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if depth == 0 && c == '"' {
            in_string = true;
            result.push(c);
        } else if c == '/' && chars.peek() == Some(&'*') {
            chars.next();
            if depth == 0 {
                comment_start_line = line;
            }
            depth += 1;
        } else if c == '*' && chars.peek() == Some(&'/') && depth > 0 {
            chars.next();
            depth -= 1;
            if depth == 0 {
                result.push(' ');
            }
        } else if depth == 0 {
            result.push(c);
        }
    }

    if depth > 0 {
        return Err(ParseError::UnterminatedBlockComment {
            line: comment_start_line,
        });
    }
    Ok(result)
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Lex one physical line into tokens plus its trailing comment.
fn lex_line(text: &str, number: usize) -> Result<Line, ParseError> {
    let mut tokens = Vec::new();
    let mut comment = None;
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' => i += 1,
            '#' => {
                comment = Some(text[byte_offset(text, i) + 1..].trim().to_string());
                break;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                comment = Some(text[byte_offset(text, i) + 2..].trim().to_string());
                break;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '{' => {
                tokens.push(Token::LBrace);
                i += 1;
            }
            '}' => {
                tokens.push(Token::RBrace);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '@' => {
                i += 1;
                let mut persist = false;
                if chars.get(i) == Some(&':') {
                    persist = true;
                    i += 1;
                }
                let name = read_ident(&chars, &mut i);
                if name.is_empty() {
                    return Err(ParseError::UnexpectedToken {
                        line: number,
                        found: "@".to_string(),
                        expected: "a destination name after '@'".to_string(),
                    });
                }
                if !persist && chars.get(i) == Some(&':') {
                    i += 1;
                    let tag = read_ident(&chars, &mut i);
                    if tag.is_empty() {
                        return Err(ParseError::UnexpectedToken {
                            line: number,
                            found: format!("@{name}:"),
                            expected: "a tag after ':'".to_string(),
                        });
                    }
                    persist = true;
                }
                tokens.push(Token::Dest { name, persist });
            }
            '?' => {
                i += 1;
                let name = read_ident(&chars, &mut i);
                if name.is_empty() {
                    return Err(ParseError::UnexpectedToken {
                        line: number,
                        found: "?".to_string(),
                        expected: "a variable name after '?'".to_string(),
                    });
                }
                tokens.push(Token::Hole(name));
            }
            '$' => {
                i += 1;
                let name = read_ident(&chars, &mut i);
                if name.is_empty() {
                    return Err(ParseError::UnexpectedToken {
                        line: number,
                        found: "$".to_string(),
                        expected: "a binding name after '$'".to_string(),
                    });
                }
                tokens.push(Token::Reference(name));
            }
            '"' => {
                i += 1;
                let mut value = String::new();
                let mut closed = false;
                while i < chars.len() {
                    let sc = chars[i];
                    if sc == '\\' && i + 1 < chars.len() {
                        let escaped = chars[i + 1];
                        value.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            other => other,
                        });
                        i += 2;
                    } else if sc == '"' {
                        closed = true;
                        i += 1;
                        break;
                    } else {
                        value.push(sc);
                        i += 1;
                    }
                }
                if !closed {
                    return Err(ParseError::UnterminatedString { line: number });
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text.parse::<f64>().map_err(|_| ParseError::InvalidNumber {
                    line: number,
                    text: text.clone(),
                })?;
                tokens.push(Token::Number(value));
            }
            c if is_ident_start(c) => {
                let name = read_ident(&chars, &mut i);
                tokens.push(Token::Ident(name));
            }
            other => {
                return Err(ParseError::UnexpectedToken {
                    line: number,
                    found: other.to_string(),
                    expected: "an identifier, literal, or delimiter".to_string(),
                });
            }
        }
    }

    Ok(Line {
        number,
        tokens,
        comment,
    })
}

fn read_ident(chars: &[char], i: &mut usize) -> String {
    let start = *i;
    if *i < chars.len() && is_ident_start(chars[*i]) {
        *i += 1;
        while *i < chars.len() && is_ident_char(chars[*i]) {
            *i += 1;
        }
    }
    chars[start..*i].iter().collect()
}

fn byte_offset(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map_or(text.len(), |(offset, _)| offset)
}

// ============================================================================
// Parser
// ============================================================================

struct LineCursor {
    lines: Vec<Line>,
    pos: usize,
}

impl LineCursor {
    fn peek(&self) -> Option<&Line> {
        self.lines.get(self.pos)
    }

    fn next(&mut self) -> Option<Line> {
        let line = self.lines.get(self.pos).cloned();
        if line.is_some() {
            self.pos += 1;
        }
        line
    }
}

/// Parse a full DSL program with the default (off) comment policy.
pub fn parse_program(source: &str) -> Result<Program, ParseError> {
    parse_program_with_policy(source, CommentPolicy::Off)
}

/// Parse a full DSL program, applying `policy` to theory-block
/// statements.
pub fn parse_program_with_policy(
    source: &str,
    policy: CommentPolicy,
) -> Result<Program, ParseError> {
    let stripped = strip_block_comments(source)?;
    let mut lines = Vec::new();
    for (index, raw) in stripped.lines().enumerate() {
        let line = lex_line(raw, index + 1)?;
        if line.tokens.is_empty() {
            continue;
        }
        lines.push(line);
    }

    let mut cursor = LineCursor { lines, pos: 0 };
    let mut program = Program::new();
    while cursor.peek().is_some() {
        program.nodes.push(parse_node(&mut cursor, policy, false)?);
    }
    Ok(program)
}

/// Parse a single statement line (used by `Session::learn` and `ask`).
pub fn parse_statement(source: &str) -> Result<Statement, ParseError> {
    let stripped = strip_block_comments(source)?;
    let line = lex_line(stripped.trim(), 1)?;
    if line.tokens.is_empty() {
        return Err(ParseError::EmptyStatement { line: 1 });
    }
    parse_statement_line(&line)
}

fn parse_node(
    cursor: &mut LineCursor,
    policy: CommentPolicy,
    inside_theory: bool,
) -> Result<Node, ParseError> {
    let line = cursor.peek().expect("caller checked for a line").clone();

    match block_kind(&line) {
        Some(BlockKind::Graph) => Ok(Node::Graph(parse_graph(cursor)?)),
        Some(BlockKind::TheoryNamedFirst | BlockKind::TheoryKeywordFirst) => {
            Ok(Node::Theory(parse_theory(cursor, policy)?))
        }
        Some(BlockKind::Solve) => Ok(Node::Solve(parse_solve(cursor)?)),
        None => {
            cursor.next();
            let statement = parse_statement_line(&line)?;
            if inside_theory {
                apply_comment_policy(&statement, policy)?;
            }
            Ok(Node::Statement(statement))
        }
    }
}

enum BlockKind {
    Graph,
    /// `@Name theory …`
    TheoryNamedFirst,
    /// `theory Name …`
    TheoryKeywordFirst,
    Solve,
}

fn block_kind(line: &Line) -> Option<BlockKind> {
    match line.tokens.first() {
        Some(Token::Ident(kw)) if kw == "graph" || kw == "macro" => Some(BlockKind::Graph),
        Some(Token::Ident(kw)) if kw == "theory" => Some(BlockKind::TheoryKeywordFirst),
        Some(Token::Dest { .. }) => match line.tokens.get(1) {
            Some(Token::Ident(kw)) if kw == "graph" || kw == "macro" => Some(BlockKind::Graph),
            Some(Token::Ident(kw)) if kw == "theory" => Some(BlockKind::TheoryNamedFirst),
            Some(Token::Ident(kw)) if kw == "solve" => Some(BlockKind::Solve),
            _ => None,
        },
        _ => None,
    }
}

fn is_end_line(line: &Line) -> bool {
    matches!(line.tokens.as_slice(), [Token::Ident(kw)] if kw == "end")
}

fn is_close_brace_line(line: &Line) -> bool {
    matches!(line.tokens.as_slice(), [Token::RBrace] | [Token::RBracket])
}

fn apply_comment_policy(statement: &Statement, policy: CommentPolicy) -> Result<(), ParseError> {
    match policy {
        CommentPolicy::Off => Ok(()),
        CommentPolicy::Warn => {
            let words = statement
                .comment
                .as_deref()
                .map_or(0, |c| c.split_whitespace().count());
            if words < 3 {
                tracing::warn!(
                    line = statement.line,
                    "theory statement has a thin inline comment"
                );
            }
            Ok(())
        }
        CommentPolicy::Require => {
            if statement.comment.is_none() {
                Err(ParseError::MissingComment {
                    line: statement.line,
                })
            } else {
                Ok(())
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Statements
// ----------------------------------------------------------------------------

fn parse_statement_line(line: &Line) -> Result<Statement, ParseError> {
    let mut pos = 0usize;
    let tokens = &line.tokens;

    let dest = if let Some(Token::Dest { name, persist }) = tokens.first() {
        pos += 1;
        Some(Dest {
            name: name.clone(),
            persist: *persist,
        })
    } else {
        None
    };

    // Hard rule: at most one '@' per statement.
    if tokens[pos..]
        .iter()
        .any(|t| matches!(t, Token::Dest { .. }))
    {
        return Err(ParseError::MultipleDestinations { line: line.number });
    }

    if pos >= tokens.len() {
        return Err(ParseError::EmptyStatement { line: line.number });
    }

    // Operator := Ident | Reference | Compound
    let operator = match &tokens[pos] {
        Token::Ident(name) => {
            if name == "return" {
                return Err(ParseError::MisplacedReturn { line: line.number });
            }
            pos += 1;
            Expr::Ident(name.clone())
        }
        Token::Reference(name) => {
            pos += 1;
            Expr::Reference(name.clone())
        }
        Token::LParen => parse_expr(tokens, &mut pos, line.number)?,
        other => {
            return Err(ParseError::UnexpectedToken {
                line: line.number,
                found: other.describe(),
                expected: "an operator (identifier, $reference, or compound)".to_string(),
            });
        }
    };

    let mut args = Vec::new();
    while pos < tokens.len() {
        args.push(parse_expr(tokens, &mut pos, line.number)?);
    }

    Ok(Statement {
        dest,
        operator,
        args,
        comment: line.comment.clone(),
        line: line.number,
    })
}

fn parse_expr(tokens: &[Token], pos: &mut usize, line: usize) -> Result<Expr, ParseError> {
    let token = tokens.get(*pos).ok_or(ParseError::UnexpectedToken {
        line,
        found: "end of line".to_string(),
        expected: "an expression".to_string(),
    })?;
    match token {
        Token::Ident(name) => {
            *pos += 1;
            Ok(Expr::Ident(name.clone()))
        }
        Token::Hole(name) => {
            *pos += 1;
            Ok(Expr::Hole(name.clone()))
        }
        Token::Reference(name) => {
            *pos += 1;
            Ok(Expr::Reference(name.clone()))
        }
        Token::Number(n) => {
            *pos += 1;
            Ok(Expr::Number(*n))
        }
        Token::Str(s) => {
            *pos += 1;
            Ok(Expr::Str(s.clone()))
        }
        Token::LParen => {
            *pos += 1;
            // Compound := '(' Operator Expr+ ')'
            let operator = match tokens.get(*pos) {
                Some(Token::Ident(name)) => {
                    *pos += 1;
                    Expr::Ident(name.clone())
                }
                Some(Token::Reference(name)) => {
                    *pos += 1;
                    Expr::Reference(name.clone())
                }
                Some(Token::LParen) => parse_expr(tokens, pos, line)?,
                other => {
                    return Err(ParseError::UnexpectedToken {
                        line,
                        found: other.map_or("end of line".to_string(), Token::describe),
                        expected: "a compound operator".to_string(),
                    });
                }
            };
            let mut args = Vec::new();
            loop {
                match tokens.get(*pos) {
                    Some(Token::RParen) => {
                        *pos += 1;
                        break;
                    }
                    Some(_) => args.push(parse_expr(tokens, pos, line)?),
                    None => {
                        return Err(ParseError::Unbalanced {
                            line,
                            delimiter: '(',
                        });
                    }
                }
            }
            Ok(Expr::Compound {
                operator: Box::new(operator),
                args,
            })
        }
        Token::LBracket => {
            *pos += 1;
            let mut items = Vec::new();
            loop {
                match tokens.get(*pos) {
                    Some(Token::RBracket) => {
                        *pos += 1;
                        break;
                    }
                    Some(Token::Comma) => {
                        *pos += 1;
                    }
                    Some(_) => items.push(parse_expr(tokens, pos, line)?),
                    None => {
                        return Err(ParseError::Unbalanced {
                            line,
                            delimiter: '[',
                        });
                    }
                }
            }
            Ok(Expr::List(items))
        }
        other => Err(ParseError::UnexpectedToken {
            line,
            found: other.describe(),
            expected: "an expression".to_string(),
        }),
    }
}

// ----------------------------------------------------------------------------
// Blocks
// ----------------------------------------------------------------------------

fn parse_graph(cursor: &mut LineCursor) -> Result<GraphDeclaration, ParseError> {
    let header = cursor.next().expect("caller matched a graph header");
    let mut pos = 0usize;

    let dest = if let Some(Token::Dest { name, persist }) = header.tokens.first() {
        pos += 1;
        Some(Dest {
            name: name.clone(),
            persist: *persist,
        })
    } else {
        None
    };

    // Skip the 'graph' / 'macro' keyword.
    pos += 1;

    let mut idents = Vec::new();
    while let Some(Token::Ident(name)) = header.tokens.get(pos) {
        idents.push(name.clone());
        pos += 1;
    }
    if let Some(extra) = header.tokens.get(pos) {
        return Err(ParseError::UnexpectedToken {
            line: header.number,
            found: extra.describe(),
            expected: "graph parameter names".to_string(),
        });
    }
    let name = idents
        .first()
        .cloned()
        .or_else(|| dest.as_ref().map(|d| d.name.clone()))
        .ok_or(ParseError::UnexpectedToken {
            line: header.number,
            found: "graph".to_string(),
            expected: "a graph name".to_string(),
        })?;
    let params = if idents.is_empty() {
        Vec::new()
    } else {
        idents[1..].to_vec()
    };

    let mut body = Vec::new();
    let mut ret = None;
    loop {
        let Some(line) = cursor.next() else {
            return Err(ParseError::UnterminatedBlock {
                kind: "graph".to_string(),
                name,
                line: header.number,
            });
        };
        if is_end_line(&line) {
            break;
        }
        if matches!(line.tokens.first(), Some(Token::Ident(kw)) if kw == "return") {
            if ret.is_some() {
                return Err(ParseError::MisplacedReturn { line: line.number });
            }
            ret = Some(parse_return(&line)?);
            continue;
        }
        if ret.is_some() {
            // Statements after 'return' are unreachable.
            return Err(ParseError::MisplacedReturn { line: line.number });
        }
        body.push(parse_statement_line(&line)?);
    }

    Ok(GraphDeclaration {
        name,
        params,
        dest,
        body,
        ret,
        line: header.number,
    })
}

/// Parse `return Expr`, accepting a bare operator call without
/// parentheses (`return And $x $y`).
fn parse_return(line: &Line) -> Result<Expr, ParseError> {
    let tokens = &line.tokens[1..];
    if tokens.is_empty() {
        return Err(ParseError::UnexpectedToken {
            line: line.number,
            found: "return".to_string(),
            expected: "an expression after 'return'".to_string(),
        });
    }
    let mut pos = 0usize;
    let first = parse_expr(tokens, &mut pos, line.number)?;
    if pos == tokens.len() {
        return Ok(first);
    }
    // Bare operator call: first expr is the operator, the rest are args.
    let mut args = Vec::new();
    while pos < tokens.len() {
        args.push(parse_expr(tokens, &mut pos, line.number)?);
    }
    Ok(Expr::Compound {
        operator: Box::new(first),
        args,
    })
}

fn parse_theory(
    cursor: &mut LineCursor,
    policy: CommentPolicy,
) -> Result<TheoryDeclaration, ParseError> {
    let header = cursor.next().expect("caller matched a theory header");

    // Form 1: @Name theory Number (deterministic|random)
    if let Some(Token::Dest { name, .. }) = header.tokens.first() {
        let seed = match header.tokens.get(2) {
            Some(Token::Number(n)) => Some(*n),
            _ => None,
        };
        let deterministic = match header.tokens.get(3) {
            Some(Token::Ident(kw)) if kw == "deterministic" => Some(true),
            Some(Token::Ident(kw)) if kw == "random" => Some(false),
            _ => None,
        };
        let body = parse_theory_body(cursor, name, header.number, policy, TheoryClose::End)?;
        return Ok(TheoryDeclaration {
            name: name.clone(),
            seed,
            deterministic,
            body,
            line: header.number,
        });
    }

    // Form 2: theory Name ('{' | 'begin' | '[')
    let name = match header.tokens.get(1) {
        Some(Token::Ident(name)) => name.clone(),
        other => {
            return Err(ParseError::UnexpectedToken {
                line: header.number,
                found: other.map_or("end of line".to_string(), Token::describe),
                expected: "a theory name".to_string(),
            });
        }
    };
    let close = match header.tokens.get(2) {
        Some(Token::LBrace | Token::LBracket) => TheoryClose::Brace,
        Some(Token::Ident(kw)) if kw == "begin" => TheoryClose::End,
        None => TheoryClose::End,
        Some(other) => {
            return Err(ParseError::UnexpectedToken {
                line: header.number,
                found: other.describe(),
                expected: "'{', 'begin', or '['".to_string(),
            });
        }
    };
    let body = parse_theory_body(cursor, &name, header.number, policy, close)?;
    Ok(TheoryDeclaration {
        name,
        seed: None,
        deterministic: None,
        body,
        line: header.number,
    })
}

#[derive(Clone, Copy, PartialEq)]
enum TheoryClose {
    End,
    Brace,
}

fn parse_theory_body(
    cursor: &mut LineCursor,
    name: &str,
    start_line: usize,
    policy: CommentPolicy,
    close: TheoryClose,
) -> Result<Vec<Node>, ParseError> {
    let mut body = Vec::new();
    loop {
        let Some(line) = cursor.peek() else {
            return Err(ParseError::UnterminatedBlock {
                kind: "theory".to_string(),
                name: name.to_string(),
                line: start_line,
            });
        };
        let closed = match close {
            TheoryClose::End => is_end_line(line),
            TheoryClose::Brace => is_close_brace_line(line),
        };
        if closed {
            cursor.next();
            break;
        }
        body.push(parse_node(cursor, policy, true)?);
    }
    Ok(body)
}

fn parse_solve(cursor: &mut LineCursor) -> Result<SolveBlock, ParseError> {
    let header = cursor.next().expect("caller matched a solve header");
    let Some(Token::Dest { name, persist }) = header.tokens.first() else {
        return Err(ParseError::UnexpectedToken {
            line: header.number,
            found: "solve".to_string(),
            expected: "'@dest solve goal'".to_string(),
        });
    };
    let goal = match header.tokens.get(2) {
        Some(Token::Ident(goal)) => goal.clone(),
        other => {
            return Err(ParseError::UnexpectedToken {
                line: header.number,
                found: other.map_or("end of line".to_string(), Token::describe),
                expected: "a goal name after 'solve'".to_string(),
            });
        }
    };

    let mut decls = Vec::new();
    loop {
        let Some(line) = cursor.next() else {
            return Err(ParseError::UnterminatedBlock {
                kind: "solve".to_string(),
                name: goal,
                line: header.number,
            });
        };
        if is_end_line(&line) {
            break;
        }
        decls.push(parse_statement_line(&line)?);
    }

    Ok(SolveBlock {
        dest: Dest {
            name: name.clone(),
            persist: *persist,
        },
        goal,
        decls,
        line: header.number,
    })
}
