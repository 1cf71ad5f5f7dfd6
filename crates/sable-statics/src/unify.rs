//! First-order unification and matching over type skeletons.
//!
//! Offsets act as variables. Used to compare instance heads: two heads
//! overlap when they unify, and one is more specific than another when the
//! other matches it.

use std::collections::HashMap;

use crate::types::{Pred, Type};

pub type Subst = HashMap<usize, Type>;

#[derive(Default)]
pub struct Unifier {
    subst: Subst,
}

impl Unifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn shallow<'t>(&'t self, mut ty: &'t Type) -> &'t Type {
        while let Type::Offset(o) = ty {
            match self.subst.get(o) {
                Some(bound) => ty = bound,
                None => break,
            }
        }
        ty
    }

    fn occurs(&self, o: usize, ty: &Type) -> bool {
        match self.shallow(ty) {
            Type::Offset(p) => *p == o,
            Type::App(f, a) => self.occurs(o, f) || self.occurs(o, a),
            _ => false,
        }
    }

    pub fn unify(&mut self, a: &Type, b: &Type) -> bool {
        let a = self.shallow(a).clone();
        let b = self.shallow(b).clone();
        match (&a, &b) {
            (Type::Offset(x), Type::Offset(y)) if x == y => true,
            (Type::Offset(x), other) | (other, Type::Offset(x)) => {
                if self.occurs(*x, other) {
                    return false;
                }
                self.subst.insert(*x, other.clone());
                true
            }
            (Type::App(f1, a1), Type::App(f2, a2)) => self.unify(f1, f2) && self.unify(a1, a2),
            _ => a == b,
        }
    }

    pub fn unify_preds(&mut self, a: &Pred, b: &Pred) -> bool {
        a.class == b.class
            && a.args.len() == b.args.len()
            && a.args.iter().zip(&b.args).all(|(x, y)| self.unify(x, y))
    }

    /// Applies the solution found so far.
    pub fn apply(&self, ty: &Type) -> Type {
        match self.shallow(ty) {
            Type::App(f, a) => Type::app(self.apply(f), self.apply(a)),
            other => other.clone(),
        }
    }

    pub fn apply_pred(&self, p: &Pred) -> Pred {
        p.map_args(|t| self.apply(t))
    }
}

/// One-way matching: binds offsets of `pattern` so that it equals `target`.
/// Offsets in `target` are rigid.
pub fn match_type(pattern: &Type, target: &Type, subst: &mut Subst) -> bool {
    match (pattern, target) {
        (Type::Offset(o), _) => match subst.get(o) {
            Some(bound) => bound == target,
            None => {
                subst.insert(*o, target.clone());
                true
            }
        },
        (Type::App(f1, a1), Type::App(f2, a2)) => match_type(f1, f2, subst) && match_type(a1, a2, subst),
        _ => pattern == target,
    }
}

pub fn match_pred(pattern: &Pred, target: &Pred) -> Option<Subst> {
    let mut subst = Subst::new();
    let ok = pattern.class == target.class
        && pattern.args.len() == target.args.len()
        && pattern
            .args
            .iter()
            .zip(&target.args)
            .all(|(p, t)| match_type(p, t, &mut subst));
    ok.then_some(subst)
}

/// Replaces the offsets bound by `subst`.
pub fn substitute(ty: &Type, subst: &Subst) -> Type {
    match ty {
        Type::Offset(o) => subst.get(o).cloned().unwrap_or(Type::Offset(*o)),
        Type::App(f, a) => Type::app(substitute(f, subst), substitute(a, subst)),
        other => other.clone(),
    }
}

/// Renumbers offsets in order of first occurrence, starting from zero.
pub fn normalize_pred(p: &Pred) -> Pred {
    let mut order = Vec::new();
    p.collect_offsets(&mut order);
    let subst: Subst = order.iter().enumerate().map(|(i, &o)| (o, Type::Offset(i))).collect();
    p.map_args(|t| substitute(t, &subst))
}
