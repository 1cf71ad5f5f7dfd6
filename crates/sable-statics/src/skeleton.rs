//! Conversion of type expressions to skeletons.
//!
//! Two passes: [`Analyzer::to_skeleton`] replaces type variables by offsets
//! and is purely syntactic; [`Analyzer::resolve_type`] looks constructor and
//! class identifiers up in the symbol tables, recording each one it meets as
//! a dependency of the declaration being checked.

use sable_ast::{Line, PredExpr, TypeExprId, TypeExprKind};
use smol_str::SmolStr;

use crate::checker::{Analyzer, TcNode};
use crate::error::{fail, ErrorKind, StaticResult};
use crate::kinds::Kind;
use crate::types::{ClassRef, Pred, Prim, Type};

/// Upper bound on the type variables one type may bind.
pub const NUM_OFFSETS: usize = 1024;

impl Analyzer<'_> {
    // ── Type variables ───────────────────────────────────────────

    /// Appends the free type variables of `te` that are not in `bound`, in
    /// order of first occurrence. Variables bound by an inner `forall` are
    /// skipped.
    pub fn type_vars_in(&self, te: TypeExprId, bound: &[SmolStr], acc: &mut Vec<SmolStr>) {
        match &self.ast.type_exprs[te].kind {
            TypeExprKind::Var(v) => {
                if !bound.contains(v) && !acc.contains(v) {
                    acc.push(v.clone());
                }
            }
            TypeExprKind::Con(_) => {}
            TypeExprKind::App(a, b) | TypeExprKind::Fun(a, b) => {
                self.type_vars_in(*a, bound, acc);
                self.type_vars_in(*b, bound, acc);
            }
            TypeExprKind::List(t) | TypeExprKind::Bang(t) => self.type_vars_in(*t, bound, acc),
            TypeExprKind::Tuple(ts) => {
                for t in ts {
                    self.type_vars_in(*t, bound, acc);
                }
            }
            TypeExprKind::Forall { vars, body } => {
                let inner: Vec<SmolStr> = bound.iter().chain(vars).cloned().collect();
                self.type_vars_in(*body, &inner, acc);
            }
            TypeExprKind::Qual { context, body } => {
                for p in context {
                    self.type_vars_in_pred(p, bound, acc);
                }
                self.type_vars_in(*body, bound, acc);
            }
        }
    }

    pub fn type_vars_in_pred(&self, pred: &PredExpr, bound: &[SmolStr], acc: &mut Vec<SmolStr>) {
        for &a in &pred.args {
            self.type_vars_in(a, bound, acc);
        }
    }

    // ── Variable-to-offset ───────────────────────────────────────

    /// Rewrites `te` with each variable of `tyvars` replaced by its position.
    /// Constructors stay identifiers.
    pub fn to_skeleton(&self, line: Line, tyvars: &[SmolStr], te: TypeExprId) -> StaticResult<Type> {
        if tyvars.len() >= NUM_OFFSETS {
            return fail(line, ErrorKind::TooManyTypeVariables { what: "type" });
        }
        let ty = match &self.ast.type_exprs[te].kind {
            TypeExprKind::Var(v) => match tyvars.iter().position(|t| t == v) {
                Some(o) => Type::Offset(o),
                None => {
                    return fail(line, ErrorKind::UndefinedTypeVariable { name: v.to_string() });
                }
            },
            TypeExprKind::Con(ident) => match Prim::from_text(&ident.text) {
                Some(prim) if !ident.is_qualified() => Type::Prim(prim),
                _ => Type::Ident(ident.clone()),
            },
            TypeExprKind::App(f, a) => Type::app(
                self.to_skeleton(line, tyvars, *f)?,
                self.to_skeleton(line, tyvars, *a)?,
            ),
            TypeExprKind::Fun(a, r) => Type::arrow(
                self.to_skeleton(line, tyvars, *a)?,
                self.to_skeleton(line, tyvars, *r)?,
            ),
            TypeExprKind::List(t) => Type::app(Type::Prim(Prim::List), self.to_skeleton(line, tyvars, *t)?),
            TypeExprKind::Tuple(ts) => {
                let elems = ts
                    .iter()
                    .map(|t| self.to_skeleton(line, tyvars, *t))
                    .collect::<StaticResult<Vec<_>>>()?;
                Type::apply(Type::Prim(Prim::Tuple(elems.len())), elems)
            }
            TypeExprKind::Forall { vars, body } => {
                let inner: Vec<SmolStr> = tyvars.iter().chain(vars).cloned().collect();
                Type::Forall {
                    kinds: vec![Kind::Star; vars.len()],
                    body: Box::new(self.to_skeleton(line, &inner, *body)?),
                }
            }
            TypeExprKind::Qual { context, body } => Type::Qual {
                context: context
                    .iter()
                    .map(|p| self.pred_to_skeleton(line, tyvars, p))
                    .collect::<StaticResult<Vec<_>>>()?,
                body: Box::new(self.to_skeleton(line, tyvars, *body)?),
            },
            TypeExprKind::Bang(_) => return fail(line, ErrorKind::IllegalStrictnessAnnotation),
        };
        Ok(ty)
    }

    pub fn pred_to_skeleton(&self, line: Line, tyvars: &[SmolStr], pred: &PredExpr) -> StaticResult<Pred> {
        let args = pred
            .args
            .iter()
            .map(|a| self.to_skeleton(line, tyvars, *a))
            .collect::<StaticResult<Vec<_>>>()?;
        Ok(Pred {
            class: ClassRef::Ident(pred.class.clone()),
            args,
        })
    }

    // ── Identifier-to-entity ─────────────────────────────────────

    pub fn resolve_type(&mut self, line: Line, ty: &mut Type) -> StaticResult<()> {
        match ty {
            Type::Ident(ident) => {
                let Some(id) = self.tables.find_tycon(self.module, ident) else {
                    let name = ident.to_string();
                    return if ident.is_qualified() {
                        fail(line, ErrorKind::UndefinedQualifiedName { name })
                    } else {
                        fail(line, ErrorKind::UndefinedTypeConstructor { name })
                    };
                };
                self.record_dep(TcNode::Tycon(id));
                *ty = Type::Tycon(id);
            }
            Type::App(f, a) => {
                self.resolve_type(line, f)?;
                self.resolve_type(line, a)?;
            }
            Type::Forall { body, .. } => self.resolve_type(line, body)?,
            Type::Qual { context, body } => {
                for p in context.iter_mut() {
                    self.resolve_pred(line, p)?;
                }
                self.resolve_type(line, body)?;
            }
            Type::Offset(_) | Type::Tycon(_) | Type::Prim(_) => {}
        }
        Ok(())
    }

    pub fn resolve_pred(&mut self, line: Line, pred: &mut Pred) -> StaticResult<()> {
        if let ClassRef::Ident(ident) = &pred.class {
            let Some(id) = self.tables.find_class(self.module, ident) else {
                let name = ident.to_string();
                return if ident.is_qualified() {
                    fail(line, ErrorKind::UndefinedQualifiedName { name })
                } else {
                    fail(line, ErrorKind::UndefinedClass { name })
                };
            };
            let class = &self.tables.classes[id];
            if class.arity != pred.args.len() {
                return fail(
                    line,
                    ErrorKind::ClassArityMismatch {
                        class: class.text.to_string(),
                    },
                );
            }
            self.record_dep(TcNode::Class(id));
            pred.class = ClassRef::Class(id);
        }
        for a in pred.args.iter_mut() {
            self.resolve_type(line, a)?;
        }
        Ok(())
    }

    // ── Both passes ──────────────────────────────────────────────

    pub fn dep_type_exp(&mut self, line: Line, tyvars: &[SmolStr], te: TypeExprId) -> StaticResult<Type> {
        let mut ty = self.to_skeleton(line, tyvars, te)?;
        self.resolve_type(line, &mut ty)?;
        Ok(ty)
    }

    pub fn dep_pred_exp(&mut self, line: Line, tyvars: &[SmolStr], pred: &PredExpr) -> StaticResult<Pred> {
        let mut p = self.pred_to_skeleton(line, tyvars, pred)?;
        self.resolve_pred(line, &mut p)?;
        Ok(p)
    }
}
