//! Kind inference and checking.
//!
//! Type constructors and classes are grouped by dependency; each group gets
//! fresh kind variables, every type in its definitions posts constraints,
//! and the solution is frozen with leftover variables defaulted to `*`.
//! Standalone types (signatures, instance heads, defaults) are checked the
//! same way against the frozen kinds.

use sable_ast::Line;
use std::collections::HashMap;
use tracing::{debug_span, trace};

use crate::checker::{Analyzer, TcNode};
use crate::error::{fail, ErrorKind, StaticError, StaticResult};
use crate::kinds::{Kind, KindSubst, KindUnifyError};
use crate::scc::strongly_connected_by;
use crate::tables::{ClassId, InstId, NameId, Tables, TyconBody, TyconId};
use crate::types::{Pred, Type};

pub(crate) struct KindChecker<'t> {
    tables: &'t Tables,
    pub subst: KindSubst,
    /// Kinds of the group under inference, in place of the tables' entries.
    pub tycon_kinds: HashMap<TyconId, Kind>,
    pub class_kinds: HashMap<ClassId, Vec<Kind>>,
}

impl<'t> KindChecker<'t> {
    pub fn new(tables: &'t Tables) -> Self {
        Self {
            tables,
            subst: KindSubst::new(),
            tycon_kinds: HashMap::new(),
            class_kinds: HashMap::new(),
        }
    }

    fn tycon_kind(&self, id: TyconId) -> Kind {
        self.tycon_kinds
            .get(&id)
            .cloned()
            .unwrap_or_else(|| self.tables.tycons[id].kind.clone())
    }

    fn class_kinds(&self, id: ClassId) -> Vec<Kind> {
        self.class_kinds
            .get(&id)
            .cloned()
            .unwrap_or_else(|| self.tables.classes[id].kinds.clone())
    }

    /// Checks that `ty` has kind `expected` where offset `i` has kind
    /// `env[i]`. Quantifiers inside `ty` get fresh kinds; see [`Self::fix`].
    pub fn check(&mut self, line: Line, what: &str, env: &[Kind], ty: &mut Type, expected: &Kind) -> StaticResult<()> {
        self.check_saturated(line, ty)?;
        let inferred = self.infer(line, what, env, ty)?;
        self.unify_or_report(line, what, ty, expected, &inferred)
    }

    pub fn check_pred(&mut self, line: Line, what: &str, env: &[Kind], pred: &mut Pred) -> StaticResult<()> {
        for a in &pred.args {
            self.check_saturated(line, a)?;
        }
        let Some(class) = pred.class.id() else {
            return Ok(());
        };
        let kinds = self.class_kinds(class);
        for (arg, expected) in pred.args.iter_mut().zip(&kinds) {
            let inferred = self.infer(line, what, env, arg)?;
            self.unify_or_report(line, what, arg, expected, &inferred)?;
        }
        Ok(())
    }

    fn infer(&mut self, line: Line, what: &str, env: &[Kind], ty: &mut Type) -> StaticResult<Kind> {
        match ty {
            Type::Offset(o) => Ok(env.get(*o).cloned().unwrap_or(Kind::Star)),
            Type::Ident(_) => Ok(Kind::Star),
            Type::Tycon(t) => Ok(self.tycon_kind(*t)),
            Type::Prim(p) => Ok(p.kind()),
            Type::App(f, a) => {
                let kf = self.infer(line, what, env, f)?;
                let ka = self.infer(line, what, env, a)?;
                let result = self.subst.fresh();
                let expected_f = Kind::arrow(ka.clone(), result.clone());
                if let Kind::Arrow(param, _) = self.subst.resolve(&kf) {
                    self.unify_or_report(line, what, a, &param, &ka)?;
                }
                self.unify_or_report(line, what, f, &expected_f, &kf)?;
                Ok(result)
            }
            Type::Forall { kinds, body } => {
                let fresh = self.subst.fresh_n(kinds.len());
                *kinds = fresh.clone();
                let inner: Vec<Kind> = env.iter().cloned().chain(fresh).collect();
                let k = self.infer(line, what, &inner, body)?;
                self.unify_or_report(line, what, body, &Kind::Star, &k)?;
                Ok(Kind::Star)
            }
            Type::Qual { context, body } => {
                for p in context.iter_mut() {
                    self.check_pred(line, what, env, p)?;
                }
                let k = self.infer(line, what, env, body)?;
                self.unify_or_report(line, what, body, &Kind::Star, &k)?;
                Ok(Kind::Star)
            }
        }
    }

    fn unify_or_report(&mut self, line: Line, what: &str, ty: &Type, expected: &Kind, inferred: &Kind) -> StaticResult<()> {
        self.subst
            .unify(expected, inferred)
            .map_err(|e| self.mismatch(line, what, ty, expected, inferred, e))
    }

    fn mismatch(&self, line: Line, what: &str, ty: &Type, expected: &Kind, inferred: &Kind, err: KindUnifyError) -> StaticError {
        StaticError::new(
            line,
            ErrorKind::KindMismatch {
                what: what.to_string(),
                expr: self.tables.show_type(ty).to_string(),
                expected: self.subst.resolve(expected).to_string(),
                inferred: self.subst.resolve(inferred).to_string(),
                reason: err.reason(),
            },
        )
    }

    /// Synonyms must be applied to at least their arity.
    fn check_saturated(&self, line: Line, ty: &Type) -> StaticResult<()> {
        match ty {
            Type::Forall { body, .. } => self.check_saturated(line, body),
            Type::Qual { context, body } => {
                for a in context.iter().flat_map(|p| &p.args) {
                    self.check_saturated(line, a)?;
                }
                self.check_saturated(line, body)
            }
            _ => {
                let (head, args) = ty.spine();
                if let Type::Tycon(t) = head {
                    let tycon = &self.tables.tycons[*t];
                    if tycon.what.is_synonym() && args.len() < tycon.arity {
                        return fail(
                            line,
                            ErrorKind::SynonymNotFullyApplied {
                                name: tycon.text.to_string(),
                            },
                        );
                    }
                }
                for a in args {
                    self.check_saturated(line, a)?;
                }
                Ok(())
            }
        }
    }

    /// Freezes the kinds of every quantifier in `ty`.
    pub fn fix(&self, ty: &mut Type) {
        match ty {
            Type::Forall { kinds, body } => {
                for k in kinds.iter_mut() {
                    *k = self.subst.generalize(k);
                }
                self.fix(body);
            }
            Type::Qual { context, body } => {
                for a in context.iter_mut().flat_map(|p| p.args.iter_mut()) {
                    self.fix(a);
                }
                self.fix(body);
            }
            Type::App(f, a) => {
                self.fix(f);
                self.fix(a);
            }
            Type::Offset(_) | Type::Ident(_) | Type::Tycon(_) | Type::Prim(_) => {}
        }
    }
}

/// Where an inferred type is written back once its group is solved.
enum Slot {
    Constructor(NameId),
    Synonym(TyconId),
    Member { class: usize, member: usize },
}

impl Analyzer<'_> {
    /// Checks a standalone type at kind `*` and freezes its quantifiers.
    pub fn kind_check_star(&self, line: Line, what: &str, ty: &mut Type) -> StaticResult<()> {
        let mut kc = KindChecker::new(&*self.tables);
        kc.check(line, what, &[], ty, &Kind::Star)?;
        kc.fix(ty);
        Ok(())
    }

    /// Infers kinds for every type constructor and class of the module, one
    /// dependency group at a time.
    pub fn kind_groups(&mut self) -> StaticResult<()> {
        let mut nodes = Vec::new();
        let mut deps: HashMap<TcNode, Vec<TcNode>> = HashMap::new();
        for t in &self.pending_tycons {
            nodes.push(TcNode::Tycon(t.id));
            deps.insert(TcNode::Tycon(t.id), t.deps.clone());
        }
        for c in &self.pending_classes {
            nodes.push(TcNode::Class(c.id));
            deps.insert(TcNode::Class(c.id), c.deps.clone());
        }
        let groups = strongly_connected_by(&nodes, |n| deps.get(&n).cloned().unwrap_or_default());
        trace!(?groups, "kind groups");
        for group in &groups {
            self.kind_tc_group(group)?;
        }
        Ok(())
    }

    fn kind_tc_group(&mut self, group: &[TcNode]) -> StaticResult<()> {
        let _span = debug_span!("kind_group", size = group.len()).entered();

        let (tycon_kinds, class_kinds, solved) = {
            let tables: &Tables = &*self.tables;
            let mut kc = KindChecker::new(tables);

            for node in group {
                match *node {
                    TcNode::Tycon(t) => {
                        let tycon = &tables.tycons[t];
                        let args = kc.subst.fresh_n(tycon.arity);
                        let result = if tycon.what.is_synonym() {
                            kc.subst.fresh()
                        } else {
                            Kind::Star
                        };
                        kc.tycon_kinds.insert(t, Kind::chain(args, result));
                    }
                    TcNode::Class(c) => {
                        let kinds = kc.subst.fresh_n(tables.classes[c].arity);
                        kc.class_kinds.insert(c, kinds);
                    }
                }
            }

            let mut solved: Vec<(Slot, Type)> = Vec::new();
            for node in group {
                match *node {
                    TcNode::Tycon(t) => {
                        let tycon = &tables.tycons[t];
                        let kind = kc.tycon_kind(t);
                        let params = kind.args();
                        for mut p in tycon.context.iter().cloned() {
                            kc.check_pred(tycon.line, "data type context", &params, &mut p)?;
                        }
                        match &tycon.body {
                            TyconBody::Constructors(cs) => {
                                for &c in cs {
                                    let name = &tables.names[c];
                                    if let Some(mut ty) = name.ty.clone() {
                                        kc.check(name.line, "constructor function", &[], &mut ty, &Kind::Star)?;
                                        solved.push((Slot::Constructor(c), ty));
                                    }
                                }
                            }
                            TyconBody::Synonym(body) => {
                                let mut result = &kind;
                                while let Kind::Arrow(_, r) = result {
                                    result = r;
                                }
                                let result = result.clone();
                                let mut ty = body.clone();
                                kc.check(tycon.line, "type synonym", &params, &mut ty, &result)?;
                                solved.push((Slot::Synonym(t), ty));
                            }
                            TyconBody::Pending => {}
                        }
                    }
                    TcNode::Class(c) => {
                        let class = &tables.classes[c];
                        let params = kc.class_kinds(c);
                        for mut p in class.supers.iter().cloned() {
                            kc.check_pred(class.line, "class declaration", &params, &mut p)?;
                        }
                        let Some(i) = self.pending_classes.iter().position(|p| p.id == c) else {
                            continue;
                        };
                        for (j, m) in self.pending_classes[i].members.iter().enumerate() {
                            let mut ty = m.ty.clone();
                            kc.check(m.line, "member function type signature", &[], &mut ty, &Kind::Star)?;
                            solved.push((Slot::Member { class: i, member: j }, ty));
                        }
                    }
                }
            }

            let tycon_kinds: Vec<(TyconId, Kind)> = kc
                .tycon_kinds
                .iter()
                .map(|(&t, k)| (t, kc.subst.generalize(k)))
                .collect();
            let class_kinds: Vec<(ClassId, Vec<Kind>)> = kc
                .class_kinds
                .iter()
                .map(|(&c, ks)| (c, ks.iter().map(|k| kc.subst.generalize(k)).collect()))
                .collect();
            for (_, ty) in solved.iter_mut() {
                kc.fix(ty);
            }
            (tycon_kinds, class_kinds, solved)
        };

        for (t, k) in tycon_kinds {
            trace!(tycon = %self.tables.tycons[t].text, kind = %k, "kind inferred");
            self.tables.tycons[t].kind = k;
        }
        for (c, ks) in class_kinds {
            self.tables.classes[c].kinds = ks;
        }
        for (slot, ty) in solved {
            match slot {
                Slot::Constructor(n) => self.tables.names[n].ty = Some(ty),
                Slot::Synonym(t) => self.tables.tycons[t].body = TyconBody::Synonym(ty),
                Slot::Member { class, member } => self.pending_classes[class].members[member].ty = ty,
            }
        }
        Ok(())
    }

    /// Kinds of an instance's type variables, from its head and context.
    pub fn kind_inst(&mut self, inst: InstId) -> StaticResult<()> {
        let kinds = {
            let tables: &Tables = &*self.tables;
            let i = &tables.insts[inst];
            let mut offsets = Vec::new();
            i.head.collect_offsets(&mut offsets);
            let n = offsets.iter().max().map_or(0, |m| m + 1);

            let mut kc = KindChecker::new(tables);
            let env = kc.subst.fresh_n(n);
            let mut head = i.head.clone();
            kc.check_pred(i.line, "instance declaration", &env, &mut head)?;
            for mut p in i.context.iter().cloned() {
                kc.check_pred(i.line, "instance context", &env, &mut p)?;
            }
            env.iter().map(|k| kc.subst.generalize(k)).collect::<Vec<_>>()
        };
        self.tables.insts[inst].kinds = kinds;
        Ok(())
    }
}
