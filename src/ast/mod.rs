//! # Sys2DSL AST
//!
//! Node types produced by the parser: single-triple [`Statement`]s,
//! [`GraphDeclaration`] macro blocks, [`TheoryDeclaration`] scopes, and
//! [`SolveBlock`]s, plus the reduced forms the reasoning engine consumes:
//! [`TriplePattern`] (a first-order triple with optional `?holes`) and
//! [`CompoundTree`] (And/Or/Not composition over patterns).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

// ============================================================================
// Surface expressions
// ============================================================================

/// An expression as written in the DSL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Bare identifier: a concept or operator name.
    Ident(String),
    /// `?name` — a free variable (hole).
    Hole(String),
    /// `$name` — a lookup of a previously bound destination.
    Reference(String),
    /// Numeric literal.
    Number(f64),
    /// Quoted string literal.
    Str(String),
    /// `[a, b, c]` list.
    List(Vec<Expr>),
    /// `(op arg…)` nested application.
    Compound {
        operator: Box<Expr>,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Identifier text when this is a bare identifier.
    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Expr::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// Collect every `?hole` name in this expression.
    pub fn collect_holes(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Hole(name) => {
                out.insert(name.clone());
            }
            Expr::List(items) => {
                for item in items {
                    item.collect_holes(out);
                }
            }
            Expr::Compound { operator, args } => {
                operator.collect_holes(out);
                for arg in args {
                    arg.collect_holes(out);
                }
            }
            _ => {}
        }
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Ident(s) => write!(f, "{s}"),
            Expr::Hole(s) => write!(f, "?{s}"),
            Expr::Reference(s) => write!(f, "${s}"),
            Expr::Number(n) => write!(f, "{}", number_label(*n)),
            Expr::Str(s) => write!(f, "\"{s}\""),
            Expr::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Expr::Compound { operator, args } => {
                write!(f, "({operator}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// `@name` or `@name:persist` or `@:name` destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dest {
    pub name: String,
    /// Whether the bound fact should be persisted under its name
    /// (`@name:persist` / `@:name`).
    pub persist: bool,
}

/// One parsed statement: `@dest? operator arg… # comment?`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub dest: Option<Dest>,
    pub operator: Expr,
    pub args: Vec<Expr>,
    /// Inline comment text, when present.
    pub comment: Option<String>,
    /// 1-based source line.
    pub line: usize,
}

impl Statement {
    /// Operator name when the operator is a bare identifier.
    pub fn operator_name(&self) -> Option<&str> {
        self.operator.as_ident()
    }
}

// ============================================================================
// Blocks
// ============================================================================

/// `graph name param… … return expr? end` — a named composition of HDC
/// operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDeclaration {
    pub name: String,
    pub params: Vec<String>,
    pub dest: Option<Dest>,
    pub body: Vec<Statement>,
    /// The `return` expression; a bare operator call (`return And $x $y`)
    /// parses as an [`Expr::Compound`].
    pub ret: Option<Expr>,
    pub line: usize,
}

/// A named theory scope. Two syntaxes:
/// `@Name theory 42 deterministic … end` and `theory Name { … }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TheoryDeclaration {
    pub name: String,
    pub seed: Option<f64>,
    /// `Some(true)` = deterministic, `Some(false)` = random, `None` =
    /// unspecified.
    pub deterministic: Option<bool>,
    pub body: Vec<Node>,
    pub line: usize,
}

/// `@x solve goal … end` — scoped declarations followed by a proof of the
/// named goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveBlock {
    pub dest: Dest,
    pub goal: String,
    pub decls: Vec<Statement>,
    pub line: usize,
}

/// A top-level parse node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Statement(Statement),
    Graph(GraphDeclaration),
    Theory(TheoryDeclaration),
    Solve(SolveBlock),
}

/// A parsed DSL program.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub nodes: Vec<Node>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of top-level nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

// ============================================================================
// Engine-facing goal forms
// ============================================================================

/// An argument slot in a goal pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PatternArg {
    /// Ground concept label (numbers and strings canonicalize to labels).
    Atom(String),
    /// Free variable.
    Hole(String),
}

impl PatternArg {
    pub fn is_hole(&self) -> bool {
        matches!(self, PatternArg::Hole(_))
    }
}

impl std::fmt::Display for PatternArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternArg::Atom(s) => write!(f, "{s}"),
            PatternArg::Hole(s) => write!(f, "?{s}"),
        }
    }
}

/// A first-order triple goal, possibly containing holes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriplePattern {
    pub operator: String,
    pub args: Vec<PatternArg>,
}

impl TriplePattern {
    /// Ground triple from plain labels.
    pub fn ground(operator: &str, args: &[&str]) -> Self {
        Self {
            operator: operator.to_string(),
            args: args
                .iter()
                .map(|a| PatternArg::Atom((*a).to_string()))
                .collect(),
        }
    }

    /// Whether the pattern contains no holes.
    pub fn is_ground(&self) -> bool {
        self.args.iter().all(|a| !a.is_hole())
    }

    /// Names of holes, in argument order without duplicates.
    pub fn holes(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for arg in &self.args {
            if let PatternArg::Hole(name) = arg {
                if !seen.contains(name) {
                    seen.push(name.clone());
                }
            }
        }
        seen
    }

    /// Number of ground arguments (used as a reordering tie-break).
    pub fn ground_arity(&self) -> usize {
        self.args.iter().filter(|a| !a.is_hole()).count()
    }

    /// First argument when ground.
    pub fn ground_arg0(&self) -> Option<&str> {
        match self.args.first() {
            Some(PatternArg::Atom(label)) => Some(label),
            _ => None,
        }
    }
}

impl std::fmt::Display for TriplePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.operator)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Compound condition tree. `And` children are ordered; the engine may
/// reorder them by estimated fanout before execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CompoundTree {
    Leaf(TriplePattern),
    And(Vec<CompoundTree>),
    Or(Vec<CompoundTree>),
    Not(Box<CompoundTree>),
}

impl CompoundTree {
    /// All hole names in the tree.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut BTreeSet<String>) {
        match self {
            CompoundTree::Leaf(p) => {
                out.extend(p.holes());
            }
            CompoundTree::And(parts) | CompoundTree::Or(parts) => {
                for part in parts {
                    part.collect_variables(out);
                }
            }
            CompoundTree::Not(inner) => inner.collect_variables(out),
        }
    }

    /// Whether the tree contains any holes.
    pub fn has_variables(&self) -> bool {
        !self.variables().is_empty()
    }

    /// Leaf view when the tree is a single pattern.
    pub fn as_leaf(&self) -> Option<&TriplePattern> {
        match self {
            CompoundTree::Leaf(p) => Some(p),
            _ => None,
        }
    }
}

impl std::fmt::Display for CompoundTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompoundTree::Leaf(p) => write!(f, "({p})"),
            CompoundTree::And(parts) => {
                write!(f, "(And")?;
                for p in parts {
                    write!(f, " {p}")?;
                }
                write!(f, ")")
            }
            CompoundTree::Or(parts) => {
                write!(f, "(Or")?;
                for p in parts {
                    write!(f, " {p}")?;
                }
                write!(f, ")")
            }
            CompoundTree::Not(inner) => write!(f, "(Not {inner})"),
        }
    }
}

/// Render a number the way concept labels spell it (integers without a
/// trailing `.0`).
pub fn number_label(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_round_trips_shape() {
        let e = Expr::Compound {
            operator: Box::new(Expr::Ident("And".to_string())),
            args: vec![
                Expr::Compound {
                    operator: Box::new(Expr::Ident("isa".to_string())),
                    args: vec![Expr::Hole("x".to_string()), Expr::Ident("Mammal".to_string())],
                },
                Expr::Reference("f1".to_string()),
            ],
        };
        assert_eq!(e.to_string(), "(And (isa ?x Mammal) $f1)");
    }

    #[test]
    fn holes_are_collected_in_order() {
        let p = TriplePattern {
            operator: "parentOf".to_string(),
            args: vec![
                PatternArg::Hole("x".to_string()),
                PatternArg::Hole("y".to_string()),
                PatternArg::Hole("x".to_string()),
            ],
        };
        assert_eq!(p.holes(), vec!["x".to_string(), "y".to_string()]);
        assert!(!p.is_ground());
        assert_eq!(p.ground_arity(), 0);
    }

    #[test]
    fn compound_variables() {
        let t = CompoundTree::And(vec![
            CompoundTree::Leaf(TriplePattern {
                operator: "isa".to_string(),
                args: vec![
                    PatternArg::Hole("x".to_string()),
                    PatternArg::Atom("Mammal".to_string()),
                ],
            }),
            CompoundTree::Not(Box::new(CompoundTree::Leaf(TriplePattern {
                operator: "has".to_string(),
                args: vec![
                    PatternArg::Hole("x".to_string()),
                    PatternArg::Hole("y".to_string()),
                ],
            }))),
        ]);
        let vars = t.variables();
        assert!(vars.contains("x") && vars.contains("y"));
        assert!(t.has_variables());
    }

    #[test]
    fn number_labels_drop_integral_fraction() {
        assert_eq!(number_label(3.0), "3");
        assert_eq!(number_label(2.5), "2.5");
    }
}
