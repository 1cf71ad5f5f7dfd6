//! Pattern checking and constructor resolution.

use sable_ast::{FieldBind, Ident, Line, Literal, PatternId, PatternKind, TypeExprKind};
use smol_str::SmolStr;

use crate::checker::Analyzer;
use crate::error::{fail, ErrorKind, StaticResult};
use crate::kinds::Kind;
use crate::result::ConRef;
use crate::tables::{NameId, NameKind, PrimCon};
use crate::types::Type;

impl Analyzer<'_> {
    /// Validates `p`, resolving its constructors, and appends the variables
    /// it binds to `vars`.
    pub fn check_pat(&mut self, p: PatternId, vars: &mut Vec<SmolStr>) -> StaticResult<()> {
        let line = self.ast.patterns[p].line;
        match self.ast.patterns[p].kind.clone() {
            PatternKind::Wildcard | PatternKind::Lit(_) => {}
            PatternKind::Var(v) => bind_var(line, v, vars)?,
            PatternKind::As(v, q) => {
                bind_var(line, v, vars)?;
                self.check_pat(q, vars)?;
            }
            PatternKind::Lazy(q) => self.check_pat(q, vars)?,
            PatternKind::Con { con, args } => {
                let c = self.resolve_con(line, &con)?;
                self.check_con_arity(line, &con, c, args.len())?;
                self.pattern_cons.insert(p, c);
                for q in args {
                    self.check_pat(q, vars)?;
                }
            }
            PatternKind::Tuple(ps) | PatternKind::List(ps) => {
                for q in ps {
                    self.check_pat(q, vars)?;
                }
            }
            PatternKind::Record { con, fields } => {
                let c = self.resolve_con(line, &con)?;
                self.pattern_cons.insert(p, c);
                let fields = self.check_record_fields(line, &con, c, fields, |a, field| {
                    a.alloc_pat(line, PatternKind::Var(field.text.clone()))
                })?;
                for f in &fields {
                    if let Some(q) = f.value {
                        self.check_pat(q, vars)?;
                    }
                }
                self.ast.patterns[p].kind = PatternKind::Record { con, fields };
            }
            PatternKind::NPlusK { var, k } => {
                match k {
                    Literal::Int(n) if n > 0 => {}
                    Literal::Int(_) => return fail(line, ErrorKind::NPlusKNotPositive),
                    _ => return fail(line, ErrorKind::NPlusKNotInteger),
                }
                bind_var(line, var, vars)?;
            }
            PatternKind::Infix(elems) => {
                self.tidy_infix_pat(p, elems)?;
                self.check_pat(p, vars)?;
            }
            PatternKind::Typed { pat, ty } => {
                self.h98_unsupported(line, "pattern type annotations")?;
                if matches!(
                    self.ast.type_exprs[ty].kind,
                    TypeExprKind::Qual { .. } | TypeExprKind::Forall { .. }
                ) {
                    return fail(line, ErrorKind::IllegalPatternTypeAnnotation);
                }
                let mut tyvars = Vec::new();
                self.type_vars_in(ty, &[], &mut tyvars);
                let body = self.dep_type_exp(line, &tyvars, ty)?;
                let mut t = if tyvars.is_empty() {
                    body
                } else {
                    Type::Forall {
                        kinds: vec![Kind::Star; tyvars.len()],
                        body: Box::new(body),
                    }
                };
                self.kind_check_star(line, "pattern type annotation", &mut t)?;
                self.pattern_types.insert(p, t);
                self.check_pat(pat, vars)?;
            }
        }
        Ok(())
    }

    fn check_con_arity(&self, line: Line, con: &Ident, c: ConRef, found: usize) -> StaticResult<()> {
        let expected = match c {
            ConRef::Prim(PrimCon::Tuple(n)) if n != found => {
                return fail(
                    line,
                    ErrorKind::IllegalTuplePattern {
                        con: con.to_string(),
                        found,
                    },
                );
            }
            ConRef::Prim(prim) => prim.arity(),
            ConRef::Name(n) => self.tables.names[n].user_arity(),
        };
        if expected != found {
            return fail(
                line,
                ErrorKind::ConstructorArityMismatch {
                    name: con.to_string(),
                    expected,
                },
            );
        }
        Ok(())
    }

    /// A constructor occurrence in an expression or pattern.
    pub fn resolve_con(&self, line: Line, con: &Ident) -> StaticResult<ConRef> {
        if !con.is_qualified() {
            if let Some(prim) = PrimCon::from_text(&con.text) {
                return Ok(ConRef::Prim(prim));
            }
        }
        match self.tables.find_name(self.module, con) {
            Some(n) if self.tables.names[n].constructor().is_some() => Ok(ConRef::Name(n)),
            Some(_) => fail(line, ErrorKind::NotAConstructor { name: con.to_string() }),
            None if con.is_qualified() => fail(line, ErrorKind::UndefinedQualifiedName { name: con.to_string() }),
            None => fail(line, ErrorKind::UndefinedConstructor { name: con.to_string() }),
        }
    }

    // ── Field lists ──────────────────────────────────────────────

    /// Resolves the field names of a record construction, update or
    /// pattern. At least one constructor must have all of them.
    pub fn check_field_names(&self, line: Line, fields: &[Ident]) -> StaticResult<Vec<NameId>> {
        let mut selectors: Vec<NameId> = Vec::new();
        for f in fields {
            let sel = match self.tables.find_name(self.module, f) {
                Some(n) if matches!(self.tables.names[n].kind, NameKind::Selector { .. }) => n,
                _ => return fail(line, ErrorKind::NotASelector { name: f.to_string() }),
            };
            if selectors.contains(&sel) {
                return fail(line, ErrorKind::RepeatedFieldInList { field: f.to_string() });
            }
            selectors.push(sel);
        }
        let Some((&first, rest)) = selectors.split_first() else {
            return Ok(selectors);
        };
        let shared = self
            .selector_constructors(first)
            .into_iter()
            .any(|c| rest.iter().all(|&s| self.selector_constructors(s).contains(&c)));
        if !shared {
            return fail(line, ErrorKind::NoConstructorHasFields);
        }
        Ok(selectors)
    }

    pub fn selector_constructors(&self, sel: NameId) -> Vec<NameId> {
        match &self.tables.names[sel].kind {
            NameKind::Selector { fields, .. } => fields.iter().map(|&(c, _)| c).collect(),
            _ => Vec::new(),
        }
    }

    /// Shared checks for the field list of a record construction or
    /// pattern: the fields must belong to `c`, and punned fields get a
    /// variable made by `pun`.
    pub fn check_record_fields<T: Copy>(
        &mut self,
        line: Line,
        con: &Ident,
        c: ConRef,
        fields: Vec<FieldBind<T>>,
        pun: impl Fn(&mut Self, &Ident) -> T,
    ) -> StaticResult<Vec<FieldBind<T>>> {
        let idents: Vec<Ident> = fields.iter().map(|f| f.field.clone()).collect();
        let selectors = self.check_field_names(line, &idents)?;
        let owns = |a: &Self, sel: NameId| match c {
            ConRef::Name(n) => a.selector_constructors(sel).contains(&n),
            ConRef::Prim(_) => false,
        };
        if selectors.iter().any(|&s| !owns(self, s)) {
            return fail(
                line,
                ErrorKind::ConstructorLacksFields {
                    constructor: con.to_string(),
                },
            );
        }
        let mut out = Vec::with_capacity(fields.len());
        for f in fields {
            let value = match f.value {
                Some(v) => v,
                None => {
                    self.h98_unsupported(line, "punned field bindings")?;
                    pun(self, &f.field)
                }
            };
            out.push(FieldBind {
                field: f.field,
                value: Some(value),
            });
        }
        Ok(out)
    }
}

fn bind_var(line: Line, v: SmolStr, vars: &mut Vec<SmolStr>) -> StaticResult<()> {
    if vars.contains(&v) {
        return fail(line, ErrorKind::RepeatedPatternVariable { name: v.to_string() });
    }
    vars.push(v);
    Ok(())
}

/// Variables a pattern binds, read syntactically.
pub(crate) fn pattern_vars(ast: &sable_ast::Module, p: PatternId, acc: &mut Vec<SmolStr>) {
    fn push(v: &SmolStr, acc: &mut Vec<SmolStr>) {
        if !acc.contains(v) {
            acc.push(v.clone());
        }
    }
    match &ast.patterns[p].kind {
        PatternKind::Wildcard | PatternKind::Lit(_) => {}
        PatternKind::Var(v) | PatternKind::NPlusK { var: v, .. } => push(v, acc),
        PatternKind::As(v, q) => {
            push(v, acc);
            pattern_vars(ast, *q, acc);
        }
        PatternKind::Lazy(q) | PatternKind::Typed { pat: q, .. } => pattern_vars(ast, *q, acc),
        PatternKind::Con { args: ps, .. } | PatternKind::Tuple(ps) | PatternKind::List(ps) => {
            for &q in ps {
                pattern_vars(ast, q, acc);
            }
        }
        PatternKind::Record { fields, .. } => {
            for f in fields {
                match f.value {
                    Some(q) => pattern_vars(ast, q, acc),
                    None => push(&f.field.text, acc),
                }
            }
        }
        PatternKind::Infix(elems) => {
            for e in elems {
                if let sable_ast::InfixElem::Operand(q) = e {
                    pattern_vars(ast, *q, acc);
                }
            }
        }
    }
}
