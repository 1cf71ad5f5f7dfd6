//! Type signatures, local quantifiers and the Haskell 98 restrictions on
//! contexts.

use sable_ast::{Line, TypeExprId, TypeExprKind};
use smol_str::SmolStr;

use crate::checker::Analyzer;
use crate::error::{fail, ErrorKind, StaticResult};
use crate::kinds::Kind;
use crate::skeleton::NUM_OFFSETS;
use crate::types::{Pred, Type};

impl Analyzer<'_> {
    /// Converts a declared type: implicit quantification over its free
    /// variables, ambiguity check, kinds, Haskell 98 restrictions.
    pub fn check_sig_type(&mut self, line: Line, what: &'static str, te: TypeExprId) -> StaticResult<Type> {
        let te = match &self.ast.type_exprs[te].kind {
            TypeExprKind::Forall { body, .. } => {
                self.h98_unsupported(line, "explicit quantification")?;
                *body
            }
            _ => te,
        };
        let mut tyvars = Vec::new();
        self.type_vars_in(te, &[], &mut tyvars);
        if tyvars.len() >= NUM_OFFSETS {
            return fail(line, ErrorKind::TooManyTypeVariables { what });
        }
        let body = self.dep_type_exp(line, &tyvars, te)?;
        if body.is_ambiguous() {
            return fail(
                line,
                ErrorKind::AmbiguousType {
                    what: what.to_string(),
                    ty: self.tables.show_type(&body).to_string(),
                },
            );
        }
        let mut ty = if tyvars.is_empty() {
            body
        } else {
            Type::Forall {
                kinds: vec![Kind::Star; tyvars.len()],
                body: Box::new(body),
            }
        };
        self.kind_check_star(line, what, &mut ty)?;
        self.h98_check_type(line, &ty)?;
        Ok(ty)
    }

    /// Rules for the variables of a local `forall`: distinct, not hiding a
    /// variable of the enclosing declaration, and each one used.
    pub fn check_quant_vars(&self, line: Line, quantified: &[SmolStr], outer: &[SmolStr], used: &[SmolStr]) -> StaticResult<()> {
        for (i, v) in quantified.iter().enumerate() {
            if quantified[..i].contains(v) {
                return fail(line, ErrorKind::DuplicatedQuantifiedVariable { name: v.to_string() });
            }
            if outer.contains(v) {
                return fail(line, ErrorKind::QuantifierHidesOuter { name: v.to_string() });
            }
            if !used.contains(v) {
                return fail(line, ErrorKind::UnusedQuantifiedVariable { name: v.to_string() });
            }
        }
        Ok(())
    }

    // ── Haskell 98 ───────────────────────────────────────────────

    /// In Haskell 98 a constraint has one argument, a type variable, or with
    /// `allow_args` a type variable applied to types.
    pub fn h98_check_context(&self, line: Line, place: &'static str, allow_args: bool, context: &[Pred]) -> StaticResult<()> {
        if !self.options.haskell98 {
            return Ok(());
        }
        for p in context {
            let simple = match p.args.as_slice() {
                [Type::Offset(_)] => true,
                [t] => allow_args && matches!(t.head(), Type::Offset(_)),
                _ => false,
            };
            if !simple {
                return fail(
                    line,
                    ErrorKind::IllegalHaskell98Constraint {
                        place,
                        constraint: self.tables.show_pred(p).to_string(),
                    },
                );
            }
        }
        Ok(())
    }

    pub fn h98_check_type(&self, line: Line, ty: &Type) -> StaticResult<()> {
        self.h98_check_context(line, "type", true, ty.context())
    }
}
