//! Instance declarations, overlap-checked insertion and instance lookup.

use sable_ast::{InstanceDecl, Line, TypeExprId, TypeExprKind, ValueDecl};
use smol_str::SmolStr;
use tracing::trace;

use crate::checker::Analyzer;
use crate::error::{fail, ErrorKind, StaticResult};
use crate::skeleton::NUM_OFFSETS;
use crate::tables::{Inst, InstId, NameKind};
use crate::types::{Pred, Type};
use crate::unify::{match_pred, normalize_pred, substitute, Subst, Unifier};

/// Nesting bound for [`Analyzer::entails`].
const ENTAIL_DEPTH: usize = 64;

impl Analyzer<'_> {
    pub fn check_instance(&mut self, decl: &InstanceDecl) -> StaticResult<()> {
        let line = decl.line;

        let mut tyvars: Vec<SmolStr> = Vec::new();
        self.type_vars_in_pred(&decl.head, &[], &mut tyvars);
        for p in &decl.context {
            self.type_vars_in_pred(p, &[], &mut tyvars);
        }
        if tyvars.len() >= NUM_OFFSETS {
            return fail(line, ErrorKind::TooManyTypeVariables { what: "instance" });
        }
        if self.options.haskell98 {
            for &arg in &decl.head.args {
                self.h98_instance_type(line, arg)?;
            }
        }

        let mut head = self.dep_pred_exp(line, &tyvars, &decl.head)?;
        let Some(class) = head.class.id() else {
            return fail(line, ErrorKind::UndefinedClass { name: decl.head.class.to_string() });
        };
        for arg in head.args.iter_mut() {
            if let Type::Tycon(t) = arg.head() {
                let tycon = &self.tables.tycons[*t];
                if tycon.what.is_synonym() {
                    if self.options.haskell98 {
                        return fail(
                            line,
                            ErrorKind::SynonymInInstanceHead {
                                name: tycon.text.to_string(),
                                class: self.tables.classes[class].text.to_string(),
                            },
                        );
                    }
                    *arg = self.tables.full_expand(arg);
                }
            }
        }

        let context = decl
            .context
            .iter()
            .map(|p| self.dep_pred_exp(line, &tyvars, p))
            .collect::<StaticResult<Vec<_>>>()?;
        self.h98_check_context(line, "instance context", false, &context)?;
        let mut in_head = Vec::new();
        head.collect_offsets(&mut in_head);
        if context.iter().any(|p| p.args.iter().any(|a| a.offsets().iter().any(|o| !in_head.contains(o)))) {
            return fail(
                line,
                ErrorKind::AmbiguousType {
                    what: "instance declaration".to_string(),
                    ty: format!("{} => {}", self.tables.show_context(&context), self.tables.show_pred(&head)),
                },
            );
        }

        let inst = self.tables.insts.alloc(Inst {
            class,
            module: self.module,
            line,
            head,
            context,
            kinds: Vec::new(),
            builder: None,
            derived: false,
            derived_members: Vec::new(),
        });
        self.kind_inst(inst)?;
        self.insert_instance(inst)?;

        let mut equations = Vec::new();
        for member in &decl.members {
            match member {
                ValueDecl::Sig(s) => return fail(s.line, ErrorKind::IllegalInstanceSignature),
                ValueDecl::Fixity(f) => return fail(f.line, ErrorKind::IllegalInstanceFixity),
                ValueDecl::FunBind(_) | ValueDecl::PatBind(_) => equations.push(member.clone()),
            }
        }
        let raw = self.extract_bindings(&equations)?;
        let slots = self.class_bindings("instance", class, raw)?;

        self.add_inst_builder(inst);
        self.tables.modules[self.module].instances.push(inst);
        self.instances.push(inst);
        self.member_impls.push((inst, slots));
        Ok(())
    }

    pub fn add_inst_builder(&mut self, inst: InstId) {
        let i = &self.tables.insts[inst];
        let text = format!(
            "inst.{}.{}",
            self.tables.classes[i.class].text,
            u32::from(inst.into_raw())
        );
        let (line, arity) = (i.line, i.context.len());
        let builder = self
            .tables
            .generated_name(self.module, text, line, arity, NameKind::InstBuilder { inst });
        self.tables.insts[inst].builder = Some(builder);
    }

    /// Haskell 98 instance types: a constructor applied to distinct type
    /// variables.
    fn h98_instance_type(&self, line: Line, te: TypeExprId) -> StaticResult<()> {
        let mut args = Vec::new();
        match &self.ast.type_exprs[te].kind {
            TypeExprKind::Var(_) | TypeExprKind::Forall { .. } | TypeExprKind::Qual { .. } | TypeExprKind::Bang(_) => {
                return fail(line, ErrorKind::InstanceHeadConstructorExpected);
            }
            TypeExprKind::Con(_) => {}
            TypeExprKind::List(t) => args.push(*t),
            TypeExprKind::Tuple(ts) => args.extend(ts.iter().copied()),
            TypeExprKind::Fun(a, r) => args.extend([*a, *r]),
            TypeExprKind::App(..) => {
                let mut t = te;
                while let TypeExprKind::App(f, a) = &self.ast.type_exprs[t].kind {
                    args.push(*a);
                    t = *f;
                }
                if !matches!(self.ast.type_exprs[t].kind, TypeExprKind::Con(_)) {
                    return fail(line, ErrorKind::InstanceHeadConstructorExpected);
                }
            }
        }
        let mut seen: Vec<&SmolStr> = Vec::new();
        for a in args {
            let TypeExprKind::Var(v) = &self.ast.type_exprs[a].kind else {
                return fail(line, ErrorKind::InstanceHeadVariableExpected);
            };
            if seen.contains(&v) {
                return fail(
                    line,
                    ErrorKind::RepeatedTypeVariable {
                        name: v.to_string(),
                        place: "instance type",
                    },
                );
            }
            seen.push(v);
        }
        Ok(())
    }

    // ── Insertion ────────────────────────────────────────────────

    /// Links `inst` into its class's instance list, most specific first.
    pub fn insert_instance(&mut self, inst: InstId) -> StaticResult<()> {
        let (class, line, head) = {
            let i = &self.tables.insts[inst];
            (i.class, i.line, i.head.clone())
        };
        let width = head.args.iter().flat_map(|a| a.offsets()).max().map_or(0, |m| m + 1);
        let existing = self.tables.classes[class].instances.clone();
        let mut position = None;
        for (j, &other) in existing.iter().enumerate() {
            let other_head = self.tables.insts[other].head.clone();
            let shifted = other_head.map_args(|t| t.shift(width));
            let mut u = Unifier::new();
            if !u.unify_preds(&head, &shifted) {
                continue;
            }
            if normalize_pred(&head) == normalize_pred(&other_head) {
                return fail(
                    line,
                    ErrorKind::DuplicateDefinition {
                        what: "instance",
                        name: self.tables.show_pred(&head).to_string(),
                    },
                );
            }
            let overlap = || ErrorKind::OverlappingInstances {
                class: self.tables.classes[class].text.to_string(),
                this: self.tables.show_pred(&head).to_string(),
                other: self.tables.show_pred(&other_head).to_string(),
                common: self.tables.show_pred(&normalize_pred(&u.apply_pred(&head))).to_string(),
            };
            if !self.options.overlap_allowed() {
                return fail(line, overlap());
            }
            let this_more = match_pred(&other_head, &head).is_some() && match_pred(&head, &other_head).is_none();
            let other_more = match_pred(&head, &other_head).is_some() && match_pred(&other_head, &head).is_none();
            if this_more {
                position.get_or_insert(j);
            } else if !other_more {
                return fail(line, overlap());
            }
        }
        let instances = &mut self.tables.classes[class].instances;
        match position {
            Some(j) => instances.insert(j, inst),
            None => instances.push(inst),
        }
        trace!(class = %self.tables.classes[class].text, head = %self.tables.show_pred(&self.tables.insts[inst].head), "instance inserted");
        Ok(())
    }

    // ── Lookup ───────────────────────────────────────────────────

    /// The most specific instance whose head matches `pred`.
    pub fn find_instance(&self, pred: &Pred) -> Option<(InstId, Subst)> {
        let class = pred.class.id()?;
        self.tables.classes[class]
            .instances
            .iter()
            .find_map(|&i| match_pred(&self.tables.insts[i].head, pred).map(|s| (i, s)))
    }

    /// Whether instances alone prove `pred`.
    pub fn entails(&self, pred: &Pred) -> bool {
        self.entails_at(pred, 0)
    }

    fn entails_at(&self, pred: &Pred, depth: usize) -> bool {
        if depth > ENTAIL_DEPTH {
            return false;
        }
        match self.find_instance(pred) {
            Some((inst, subst)) => self.tables.insts[inst]
                .context
                .iter()
                .all(|q| self.entails_at(&q.map_args(|t| substitute(t, &subst)), depth + 1)),
            None => false,
        }
    }
}
