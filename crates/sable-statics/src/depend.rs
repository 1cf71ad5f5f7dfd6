//! Scope and dependency analysis of value bindings.
//!
//! Each declaration list (top level, `let`, `where`, `let` qualifier) opens a
//! [`Frame::Bindings`] scope. While the right-hand side of binding `i` is
//! walked, every occurrence that resolves to binding `j` of an enclosing
//! frame adds the edge `i -> j` in that frame. Pattern-bound variables add no
//! edges. The SCCs of each frame's edges are its binding groups.

use sable_ast::{ExprId, ExprKind, Ident, Line, Literal, PatternId, Qualifier, RhsBody};
use std::collections::HashMap;
use tracing::trace;

use crate::bindings::{Equation, RawBinding};
use crate::checker::{Analyzer, BindingFrame, Frame};
use crate::error::{fail, ErrorKind, StaticResult};
use crate::infix::undefined;
use crate::result::{Alternative, Binder, Binding, BindingId, ConRef, Rhs, ScopeKey, VarRef};
use crate::scc::strongly_connected;

impl Analyzer<'_> {
    // ── Scopes ───────────────────────────────────────────────────

    /// Opens a scope for `raw`, analyses every binding in it and returns
    /// the binding groups, dependencies first. The scope stays open until
    /// [`Analyzer::leave_scope`].
    pub fn enter_scope(&mut self, raw: Vec<RawBinding>) -> StaticResult<Vec<Vec<BindingId>>> {
        let mut vars = HashMap::new();
        let mut ids = Vec::with_capacity(raw.len());
        let mut bodies = Vec::with_capacity(raw.len());
        for (i, r) in raw.into_iter().enumerate() {
            for v in r.binder.vars() {
                vars.insert(v.text.clone(), i);
            }
            ids.push(self.bindings.alloc(Binding {
                line: r.line,
                binder: r.binder,
                alts: Vec::new(),
            }));
            bodies.push(r.equations);
        }
        let n = ids.len();
        self.frames.push(Frame::Bindings(BindingFrame {
            vars,
            ids: ids.clone(),
            current: None,
            edges: vec![Vec::new(); n],
        }));

        for (i, equations) in bodies.into_iter().enumerate() {
            self.set_current(Some(i));
            if let Binder::Pattern { pat, .. } = self.bindings[ids[i]].binder {
                self.check_pat(pat, &mut Vec::new())?;
            }
            let alts = equations
                .into_iter()
                .map(|eq| self.dep_alt(eq))
                .collect::<StaticResult<Vec<_>>>()?;
            self.bindings[ids[i]].alts = alts;
        }
        self.set_current(None);

        let edges = match self.frames.last() {
            Some(Frame::Bindings(bf)) => bf.edges.clone(),
            _ => Vec::new(),
        };
        let groups: Vec<Vec<BindingId>> = strongly_connected(n, |v| edges[v].clone())
            .into_iter()
            .map(|g| g.into_iter().map(|i| ids[i]).collect())
            .collect();
        trace!(bindings = n, groups = groups.len(), "binding groups");
        Ok(groups)
    }

    pub fn leave_scope(&mut self) {
        self.frames.pop();
    }

    fn set_current(&mut self, current: Option<usize>) {
        if let Some(Frame::Bindings(bf)) = self.frames.last_mut() {
            bf.current = current;
        }
    }

    /// Analyses a class default or instance member outside any binding
    /// group.
    pub fn detached_binding(&mut self, raw: RawBinding) -> StaticResult<BindingId> {
        let id = self.bindings.alloc(Binding {
            line: raw.line,
            binder: raw.binder,
            alts: Vec::new(),
        });
        let alts = raw
            .equations
            .into_iter()
            .map(|eq| self.dep_alt(eq))
            .collect::<StaticResult<Vec<_>>>()?;
        self.bindings[id].alts = alts;
        Ok(id)
    }

    /// Runs `f` with `frame` pushed, restoring the stack afterwards.
    fn with_frame<T>(&mut self, frame: Frame, f: impl FnOnce(&mut Self) -> StaticResult<T>) -> StaticResult<T> {
        let depth = self.frames.len();
        self.frames.push(frame);
        let result = f(self);
        self.frames.truncate(depth);
        result
    }

    /// Opens a scope for a local declaration list and runs `f` inside it.
    fn with_locals<T>(
        &mut self,
        decls: &[sable_ast::ValueDecl],
        f: impl FnOnce(&mut Self) -> StaticResult<T>,
    ) -> StaticResult<(Vec<Vec<BindingId>>, T)> {
        let raw = self.eqns_to_bindings(decls, false)?;
        let depth = self.frames.len();
        let result = self.enter_scope(raw).and_then(|groups| Ok((groups, f(self)?)));
        self.frames.truncate(depth);
        result
    }

    // ── Alternatives ─────────────────────────────────────────────

    fn dep_alt(&mut self, eq: Equation) -> StaticResult<Alternative> {
        let mut vars = Vec::new();
        for &a in &eq.args {
            self.check_pat(a, &mut vars)?;
        }
        let rhs = self.with_frame(Frame::Patterns(vars), |a| a.dep_rhs(eq.rhs))?;
        Ok(Alternative { args: eq.args, rhs })
    }

    fn dep_rhs(&mut self, rhs: sable_ast::Rhs) -> StaticResult<Rhs> {
        let (locals, ()) = if rhs.wheres.is_empty() {
            (Vec::new(), self.dep_rhs_body(&rhs.body)?)
        } else {
            self.with_locals(&rhs.wheres, |a| a.dep_rhs_body(&rhs.body))?
        };
        Ok(Rhs {
            line: rhs.line,
            body: rhs.body,
            locals,
        })
    }

    fn dep_rhs_body(&mut self, body: &RhsBody) -> StaticResult<()> {
        match body {
            RhsBody::Plain(e) => self.dep_expr(*e),
            RhsBody::Guarded(guards) => {
                for g in guards {
                    self.dep_expr(g.guard)?;
                    self.dep_expr(g.body)?;
                }
                Ok(())
            }
        }
    }

    fn dep_patterns(&mut self, pats: &[PatternId]) -> StaticResult<Vec<smol_str::SmolStr>> {
        let mut vars = Vec::new();
        for &p in pats {
            self.check_pat(p, &mut vars)?;
        }
        Ok(vars)
    }

    // ── Expressions ──────────────────────────────────────────────

    pub fn dep_expr(&mut self, e: ExprId) -> StaticResult<()> {
        let line = self.ast.exprs[e].line;
        match self.ast.exprs[e].kind.clone() {
            ExprKind::Var(ident) => {
                let r = self.resolve_var(line, &ident)?;
                self.resolutions.insert(e, r);
            }
            ExprKind::Con(ident) => {
                let c = self.resolve_con(line, &ident)?;
                self.resolutions.insert(e, VarRef::Con(c));
            }
            ExprKind::Lit(_) => {}
            ExprKind::App(f, x) => {
                self.dep_expr(f)?;
                self.dep_expr(x)?;
            }
            ExprKind::Infix(elems) => {
                self.tidy_infix_expr(e, elems)?;
                self.dep_expr(e)?;
            }
            ExprKind::Negate(x) => {
                let folded = match &self.ast.exprs[x].kind {
                    ExprKind::Lit(lit @ (Literal::Int(_) | Literal::Float(_))) => lit.negated(),
                    _ => None,
                };
                match folded {
                    Some(lit) => self.ast.exprs[e].kind = ExprKind::Lit(lit),
                    None => self.dep_expr(x)?,
                }
            }
            ExprKind::Lambda { params, body } => {
                let vars = self.dep_patterns(&params)?;
                self.with_frame(Frame::Patterns(vars), |a| a.dep_expr(body))?;
            }
            ExprKind::Let { decls, body } => {
                let (groups, ()) = self.with_locals(&decls, |a| a.dep_expr(body))?;
                self.local_groups.insert(ScopeKey::Let(e), groups);
            }
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.dep_expr(cond)?;
                self.dep_expr(then_branch)?;
                self.dep_expr(else_branch)?;
            }
            ExprKind::Case { scrutinee, alts } => {
                self.dep_expr(scrutinee)?;
                for (index, alt) in alts.into_iter().enumerate() {
                    let vars = self.dep_patterns(&[alt.pat])?;
                    let rhs = self.with_frame(Frame::Patterns(vars), |a| a.dep_rhs(alt.rhs))?;
                    if !rhs.locals.is_empty() {
                        self.local_groups.insert(ScopeKey::CaseAlt { expr: e, index }, rhs.locals);
                    }
                }
            }
            ExprKind::Tuple(xs) | ExprKind::List(xs) => {
                for x in xs {
                    self.dep_expr(x)?;
                }
            }
            ExprKind::Comprehension { head, quals } => self.dep_quals(e, &quals, head)?,
            ExprKind::Do { stmts, last } => self.dep_quals(e, &stmts, last)?,
            ExprKind::Typed { expr, ty } => {
                self.dep_expr(expr)?;
                let t = self.check_sig_type(line, "type annotation", ty)?;
                self.annotations.insert(e, t);
            }
            ExprKind::RecordCon { con, fields } => {
                let c = self.resolve_con(line, &con)?;
                self.resolutions.insert(e, VarRef::Con(c));
                let fields = self.check_record_fields(line, &con, c, fields, |a, field| {
                    a.alloc_expr(line, ExprKind::Var(Ident::unqual(field.text.clone())))
                })?;
                self.check_strict_fields(line, c, &fields)?;
                for f in &fields {
                    if let Some(v) = f.value {
                        self.dep_expr(v)?;
                    }
                }
                self.ast.exprs[e].kind = ExprKind::RecordCon { con, fields };
            }
            ExprKind::RecordUpdate { record, fields } => {
                if fields.is_empty() {
                    return fail(line, ErrorKind::EmptyFieldUpdate);
                }
                self.dep_expr(record)?;
                let idents: Vec<Ident> = fields.iter().map(|f| f.field.clone()).collect();
                self.check_field_names(line, &idents)?;
                let mut out = Vec::with_capacity(fields.len());
                for f in fields {
                    let value = match f.value {
                        Some(v) => v,
                        None => {
                            self.h98_unsupported(line, "punned field bindings")?;
                            self.alloc_expr(line, ExprKind::Var(Ident::unqual(f.field.text.clone())))
                        }
                    };
                    self.dep_expr(value)?;
                    out.push(sable_ast::FieldBind {
                        field: f.field,
                        value: Some(value),
                    });
                }
                self.ast.exprs[e].kind = ExprKind::RecordUpdate { record, fields: out };
            }
        }
        Ok(())
    }

    /// Qualifiers scope over the qualifiers after them and over `last`.
    fn dep_quals(&mut self, e: ExprId, quals: &[Qualifier], last: ExprId) -> StaticResult<()> {
        let depth = self.frames.len();
        let result = self.dep_quals_open(e, quals, last);
        self.frames.truncate(depth);
        result
    }

    fn dep_quals_open(&mut self, e: ExprId, quals: &[Qualifier], last: ExprId) -> StaticResult<()> {
        for (index, q) in quals.iter().enumerate() {
            match q {
                Qualifier::Generator { pat, expr } => {
                    self.dep_expr(*expr)?;
                    let vars = self.dep_patterns(&[*pat])?;
                    self.frames.push(Frame::Patterns(vars));
                }
                Qualifier::Let(decls) => {
                    let raw = self.eqns_to_bindings(decls, false)?;
                    let groups = self.enter_scope(raw)?;
                    self.local_groups.insert(ScopeKey::Qualifier { expr: e, index }, groups);
                }
                Qualifier::Guard(g) => self.dep_expr(*g)?,
            }
        }
        self.dep_expr(last)
    }

    /// A record construction must define every strict field of its
    /// constructor.
    fn check_strict_fields(&self, line: Line, c: ConRef, fields: &[sable_ast::FieldBind<ExprId>]) -> StaticResult<()> {
        let ConRef::Name(con) = c else {
            return Ok(());
        };
        let Some(info) = self.tables.names[con].constructor() else {
            return Ok(());
        };
        for &pos in &info.strict_fields {
            let label = info.labels.get(pos).cloned().flatten();
            let given = label
                .as_ref()
                .is_some_and(|l| fields.iter().any(|f| f.field.text == *l));
            if !given {
                let field = match label {
                    Some(l) => l.to_string(),
                    None => (pos + 1).to_string(),
                };
                return fail(line, ErrorKind::MissingStrictField { field });
            }
        }
        Ok(())
    }

    // ── Variables ────────────────────────────────────────────────

    /// Resolves a variable occurrence: pattern variables and bindings of
    /// enclosing scopes first, innermost out, then global names.
    pub fn resolve_var(&mut self, line: Line, ident: &Ident) -> StaticResult<VarRef> {
        if !ident.is_qualified() {
            for frame in self.frames.iter_mut().rev() {
                match frame {
                    Frame::Patterns(vars) if vars.contains(&ident.text) => return Ok(VarRef::Local),
                    Frame::Patterns(_) => {}
                    Frame::Bindings(bf) => {
                        if let Some(&j) = bf.vars.get(&ident.text) {
                            bf.depend_on(j);
                            return Ok(VarRef::Binding(bf.ids[j]));
                        }
                    }
                }
            }
        }
        let Some(n) = self.tables.find_name(self.module, ident) else {
            return Err(undefined(line, ident));
        };
        // `M.f` naming a top-level binding of this module.
        if ident.is_qualified() && self.tables.names[n].module == self.module {
            let bindings = &self.bindings;
            if let Some(Frame::Bindings(bf)) = self.frames.first_mut() {
                let top = bf.vars.get(&ident.text).copied().filter(|&j| {
                    bindings[bf.ids[j]].binder.vars().iter().any(|v| v.name == Some(n))
                });
                if let Some(j) = top {
                    bf.depend_on(j);
                    return Ok(VarRef::Binding(bf.ids[j]));
                }
            }
        }
        Ok(VarRef::Global(n))
    }
}

impl BindingFrame {
    fn depend_on(&mut self, j: usize) {
        if let Some(i) = self.current {
            if !self.edges[i].contains(&j) {
                self.edges[i].push(j);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{ModuleAnalysis, Options, Statics};
    use sable_ast::{builder::op, builder::operand, ModuleBuilder};

    fn analyse(b: ModuleBuilder) -> ModuleAnalysis {
        let mut statics = Statics::with_prelude(Options::default()).unwrap();
        statics.analyze_module(b.finish().unwrap()).unwrap()
    }

    #[test]
    fn mutual_recursion_is_one_group() {
        let mut b = ModuleBuilder::new("M");
        let (g, f, five) = (b.var("g"), b.var("f"), b.int(5));
        let decls = [b.fun("f", vec![], g), b.fun("g", vec![], f), b.fun("h", vec![], five)];
        for d in decls {
            b.push(d);
        }
        let m = analyse(b);
        let groups = m.group_texts();
        assert_eq!(groups.len(), 2);
        assert!(groups.contains(&vec!["f".into(), "g".into()]));
        assert!(groups.contains(&vec!["h".into()]));
    }

    #[test]
    fn dependencies_come_before_dependents() {
        let mut b = ModuleBuilder::new("M");
        let (x, one) = (b.var("x"), b.int(1));
        let decls = [b.fun("y", vec![], x), b.fun("x", vec![], one)];
        for d in decls {
            b.push(d);
        }
        let m = analyse(b);
        assert_eq!(m.group_texts(), vec![vec!["x"], vec!["y"]]);
    }

    #[test]
    fn pattern_variables_shadow_bindings() {
        let mut b = ModuleBuilder::new("M");
        let (px, x) = (b.pvar("f"), b.var("f"));
        let decl = b.fun("f", vec![px], x);
        b.push(decl);
        let m = analyse(b);
        let f = m.binding("f").unwrap();
        let rhs = &m.bindings[f].alts[0].rhs;
        let sable_ast::RhsBody::Plain(body) = rhs.body else { unreachable!() };
        assert_eq!(m.resolutions.get(body), Some(&crate::VarRef::Local));
    }

    #[test]
    fn where_bindings_get_their_own_groups() {
        let mut b = ModuleBuilder::new("M");
        let (a_ref, b_ref, one) = (b.var("a"), b.var("b"), b.int(1));
        let body = b.infix(vec![operand(a_ref), op("+"), operand(b_ref)]);
        let (inner_one, inner_b) = (b.var("c"), b.int(2));
        let wheres = vec![b.fun("a", vec![], one), b.fun("b", vec![], inner_one), b.fun("c", vec![], inner_b)];
        let decl = b.fun_where("f", vec![], body, wheres);
        b.push(decl);
        let m = analyse(b);
        let f = m.binding("f").unwrap();
        let locals = &m.bindings[f].alts[0].rhs.locals;
        assert_eq!(m.texts(locals), vec![vec!["a"], vec!["c"], vec!["b"]]);
    }

    #[test]
    fn undefined_variable_is_reported() {
        let mut b = ModuleBuilder::new("M");
        let y = b.var("nowhere");
        let decl = b.fun("f", vec![], y);
        b.push(decl);
        let mut statics = Statics::with_prelude(Options::default()).unwrap();
        let err = statics.analyze_module(b.finish().unwrap()).unwrap_err();
        insta::assert_snapshot!(err.to_string(), @r#"line 1: undefined variable "nowhere""#);
    }
}
