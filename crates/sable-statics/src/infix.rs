//! Operator-precedence resolution of infix chains.
//!
//! The parser leaves `a + b * - c` as a flat list of operands, operators and
//! prefix minus signs. [`resolve`] turns such a chain into a tree using only
//! the fixity of each operator; [`Analyzer`] looks those fixities up and
//! writes the tree back into the expression or pattern arena.

use sable_ast::{Assoc, ExprId, ExprKind, Fixity, Ident, InfixElem, Line, Literal, PatternId, PatternKind};

use crate::checker::{Analyzer, Frame};
use crate::error::{fail, ErrorKind, StaticError, StaticResult};
use crate::tables::PrimCon;

/// A chain element with its operator fixity already known.
#[derive(Clone, Debug, PartialEq)]
pub enum Token<T> {
    Operand(T),
    Op(Ident, Fixity),
    Neg,
}

#[derive(Clone, Debug, PartialEq)]
pub enum InfixTree<T> {
    Operand(T),
    Negate(Box<InfixTree<T>>),
    Binary {
        op: Ident,
        lhs: Box<InfixTree<T>>,
        rhs: Box<InfixTree<T>>,
    },
}

/// An operator during resolution. The outermost context has precedence -1.
struct OpInfo {
    text: String,
    prec: i16,
    assoc: Assoc,
    negation: bool,
}

impl OpInfo {
    fn of(ident: &Ident, fixity: Fixity) -> Self {
        Self {
            text: ident.to_string(),
            prec: i16::from(fixity.prec),
            assoc: fixity.assoc,
            negation: false,
        }
    }

    fn negation() -> Self {
        Self {
            text: "-".to_string(),
            prec: i16::from(Fixity::NEGATION.prec),
            assoc: Fixity::NEGATION.assoc,
            negation: true,
        }
    }
}

struct Resolver<T> {
    tokens: std::iter::Peekable<std::vec::IntoIter<Token<T>>>,
}

impl<T> Resolver<T> {
    /// Parses an operand with its prefix minus signs, then the operators
    /// that bind tighter than `op1`. A minus sign takes the operand after it
    /// together with every following operator above precedence 6, whatever
    /// operator stands to its left.
    fn parse_neg(&mut self, op1: &OpInfo) -> Result<InfixTree<T>, ErrorKind> {
        match self.tokens.next() {
            Some(Token::Operand(e)) => self.parse1(op1, InfixTree::Operand(e)),
            Some(Token::Neg) => {
                let r = self.parse_neg(&OpInfo::negation())?;
                self.parse1(op1, InfixTree::Negate(Box::new(r)))
            }
            Some(Token::Op(..)) | None => Err(ErrorKind::MalformedInfix),
        }
    }

    fn parse1(&mut self, op1: &OpInfo, mut lhs: InfixTree<T>) -> Result<InfixTree<T>, ErrorKind> {
        loop {
            let op2 = match self.tokens.peek() {
                None => return Ok(lhs),
                Some(Token::Op(ident, fixity)) => OpInfo::of(ident, *fixity),
                Some(Token::Operand(_) | Token::Neg) => return Err(ErrorKind::MalformedInfix),
            };
            if op1.prec == op2.prec && (op1.assoc != op2.assoc || op1.assoc == Assoc::Non) {
                if op1.negation {
                    return Err(ErrorKind::AmbiguousNegation { op: op2.text });
                }
                return Err(ErrorKind::AmbiguousOperators {
                    left: op1.text.clone(),
                    right: op2.text,
                });
            }
            if op1.prec > op2.prec || (op1.prec == op2.prec && op1.assoc == Assoc::Left) {
                return Ok(lhs);
            }
            let Some(Token::Op(ident, _)) = self.tokens.next() else {
                return Err(ErrorKind::MalformedInfix);
            };
            let rhs = self.parse_neg(&op2)?;
            lhs = InfixTree::Binary {
                op: ident,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }
}

/// Resolves a chain by the Haskell precedence rules.
pub fn resolve<T>(tokens: Vec<Token<T>>) -> Result<InfixTree<T>, ErrorKind> {
    let mut r = Resolver {
        tokens: tokens.into_iter().peekable(),
    };
    let top = OpInfo {
        text: String::new(),
        prec: -1,
        assoc: Assoc::Non,
        negation: false,
    };
    let tree = r.parse_neg(&top)?;
    match r.tokens.next() {
        None => Ok(tree),
        Some(_) => Err(ErrorKind::MalformedInfix),
    }
}

fn is_con_op(ident: &Ident) -> bool {
    ident.text.starts_with(':')
}

impl Analyzer<'_> {
    /// Fixity of an operator: innermost local binding first, then the
    /// global name.
    pub fn fixity_of(&self, line: Line, ident: &Ident) -> StaticResult<Fixity> {
        if !ident.is_qualified() {
            for frame in self.frames.iter().rev() {
                match frame {
                    Frame::Patterns(vars) if vars.contains(&ident.text) => return Ok(Fixity::DEFAULT),
                    Frame::Bindings(bf) => {
                        if let Some(&i) = bf.vars.get(&ident.text) {
                            let fixity = self.bindings[bf.ids[i]]
                                .binder
                                .vars()
                                .iter()
                                .find(|v| v.text == ident.text)
                                .and_then(|v| v.fixity);
                            return Ok(fixity.unwrap_or(Fixity::DEFAULT));
                        }
                    }
                    Frame::Patterns(_) => {}
                }
            }
            if let Some(prim) = PrimCon::from_text(&ident.text) {
                return Ok(prim.fixity());
            }
        }
        match self.tables.find_name(self.module, ident) {
            Some(n) => Ok(self.tables.names[n].fixity.unwrap_or(Fixity::DEFAULT)),
            None => Err(undefined(line, ident)),
        }
    }

    fn tokens<T>(&self, line: Line, elems: Vec<InfixElem<T>>) -> StaticResult<Vec<Token<T>>> {
        elems
            .into_iter()
            .map(|e| {
                Ok(match e {
                    InfixElem::Operand(x) => Token::Operand(x),
                    InfixElem::Negate => Token::Neg,
                    InfixElem::Operator(op) => {
                        let fixity = self.fixity_of(line, &op)?;
                        Token::Op(op, fixity)
                    }
                })
            })
            .collect()
    }

    // ── Expressions ──────────────────────────────────────────────

    /// Rewrites the infix chain at `e` into applications.
    pub fn tidy_infix_expr(&mut self, e: ExprId, elems: Vec<InfixElem<ExprId>>) -> StaticResult<()> {
        let line = self.ast.exprs[e].line;
        let tokens = self.tokens(line, elems)?;
        let tree = resolve(tokens).map_err(|kind| StaticError::new(line, kind))?;
        let root = self.build_expr(line, tree);
        self.ast.exprs[e].kind = self.ast.exprs[root].kind.clone();
        Ok(())
    }

    fn build_expr(&mut self, line: Line, tree: InfixTree<ExprId>) -> ExprId {
        match tree {
            InfixTree::Operand(x) => x,
            InfixTree::Negate(inner) => {
                let x = self.build_expr(line, *inner);
                let kind = match &self.ast.exprs[x].kind {
                    ExprKind::Lit(lit) => match lit.negated() {
                        Some(neg) => ExprKind::Lit(neg),
                        None => ExprKind::Negate(x),
                    },
                    _ => ExprKind::Negate(x),
                };
                self.alloc_expr(line, kind)
            }
            InfixTree::Binary { op, lhs, rhs } => {
                let l = self.build_expr(line, *lhs);
                let r = self.build_expr(line, *rhs);
                let f = if is_con_op(&op) {
                    ExprKind::Con(op)
                } else {
                    ExprKind::Var(op)
                };
                let f = self.alloc_expr(line, f);
                let fl = self.alloc_expr(line, ExprKind::App(f, l));
                self.alloc_expr(line, ExprKind::App(fl, r))
            }
        }
    }

    pub fn alloc_expr(&mut self, line: Line, kind: ExprKind) -> ExprId {
        self.ast.exprs.alloc(sable_ast::Expr { kind, line })
    }

    // ── Patterns ─────────────────────────────────────────────────

    /// Rewrites the infix chain at `p` into constructor patterns.
    pub fn tidy_infix_pat(&mut self, p: PatternId, elems: Vec<InfixElem<PatternId>>) -> StaticResult<()> {
        let line = self.ast.patterns[p].line;
        let tokens = self.tokens(line, elems)?;
        let tree = resolve(tokens).map_err(|kind| StaticError::new(line, kind))?;
        let root = self.build_pat(line, tree)?;
        self.ast.patterns[p].kind = self.ast.patterns[root].kind.clone();
        Ok(())
    }

    fn build_pat(&mut self, line: Line, tree: InfixTree<PatternId>) -> StaticResult<PatternId> {
        match tree {
            InfixTree::Operand(x) => Ok(x),
            InfixTree::Negate(inner) => {
                let x = self.build_pat(line, *inner)?;
                let neg = match &self.ast.patterns[x].kind {
                    PatternKind::Lit(lit @ (Literal::Int(_) | Literal::Float(_))) => lit.negated(),
                    _ => None,
                };
                match neg {
                    Some(lit) => Ok(self.alloc_pat(line, PatternKind::Lit(lit))),
                    None => fail(
                        line,
                        ErrorKind::IllegalPatternSyntax {
                            reason: "negation of a non-literal",
                        },
                    ),
                }
            }
            InfixTree::Binary { op, lhs, rhs } => {
                if !is_con_op(&op) && self.tables.find_name(self.module, &op).and_then(|n| self.tables.names[n].constructor()).is_none() {
                    return fail(
                        line,
                        ErrorKind::IllegalPatternSyntax {
                            reason: "variable operator in pattern",
                        },
                    );
                }
                let l = self.build_pat(line, *lhs)?;
                let r = self.build_pat(line, *rhs)?;
                Ok(self.alloc_pat(line, PatternKind::Con { con: op, args: vec![l, r] }))
            }
        }
    }

    pub fn alloc_pat(&mut self, line: Line, kind: PatternKind) -> PatternId {
        self.ast.patterns.alloc(sable_ast::Pattern { kind, line })
    }
}

/// The error for an identifier found in no scope.
pub(crate) fn undefined(line: Line, ident: &Ident) -> StaticError {
    let name = ident.to_string();
    let kind = if ident.is_qualified() {
        ErrorKind::UndefinedQualifiedName { name }
    } else if ident.text.starts_with(|c: char| c == ':' || c.is_uppercase()) {
        ErrorKind::UndefinedConstructor { name }
    } else {
        ErrorKind::UndefinedVariable { name }
    };
    StaticError::new(line, kind)
}
