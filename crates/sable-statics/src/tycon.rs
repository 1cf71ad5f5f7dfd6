//! Data types, newtypes and synonyms.

use sable_ast::{ConstrFields, DataDecl, Line, SynonymDecl, TypeExprId, TypeExprKind};
use smol_str::SmolStr;
use std::collections::HashSet;

use crate::bindings::RawBinding;
use crate::checker::{Analyzer, DeriveRequest, TcNode, TyconSource};
use crate::error::{at, fail, ErrorKind, StaticResult};
use crate::kinds::Kind;
use crate::tables::{ConstructorInfo, NameId, NameKind, Tables, TyconBody, TyconId, TyconWhat};
use crate::types::{Pred, Type};

impl Analyzer<'_> {
    /// Second phase for one registered type constructor.
    pub fn check_tycon_defn(&mut self, index: usize) -> StaticResult<()> {
        let (id, line) = (self.pending_tycons[index].id, self.pending_tycons[index].line);
        self.tc_deps.clear();
        match self.pending_tycons[index].source.clone() {
            TyconSource::Synonym(decl) => self.check_synonym_defn(id, &decl)?,
            TyconSource::Data(decl) => {
                check_distinct_params(line, &decl.params)?;
                self.dep_constrs(id, &decl)?;
            }
        }
        self.pending_tycons[index].deps = std::mem::take(&mut self.tc_deps);
        Ok(())
    }

    fn check_synonym_defn(&mut self, id: TyconId, decl: &SynonymDecl) -> StaticResult<()> {
        check_distinct_params(decl.line, &decl.params)?;
        let body = self.dep_type_exp(decl.line, &decl.params, decl.rhs)?;
        if self.tc_deps.contains(&TcNode::Tycon(id)) {
            return fail(
                decl.line,
                ErrorKind::RecursiveSynonym {
                    name: decl.name.to_string(),
                },
            );
        }
        self.tables.tycons[id].body = TyconBody::Synonym(body);
        Ok(())
    }

    // ── Constructors ─────────────────────────────────────────────

    fn dep_constrs(&mut self, id: TyconId, decl: &DataDecl) -> StaticResult<()> {
        let line = decl.line;
        let params = &decl.params;
        let result = Type::applied_to_offsets(Type::Tycon(id), params.len());

        let context = decl
            .context
            .iter()
            .map(|p| self.dep_pred_exp(line, params, p))
            .collect::<StaticResult<Vec<_>>>()?;
        self.h98_check_context(line, "data type context", false, &context)?;
        self.tables.tycons[id].context = context.clone();

        let mut constructors = Vec::new();
        let mut selectors: Vec<NameId> = Vec::new();
        for (index, c) in decl.constructors.iter().enumerate() {
            let cline = c.line;
            let mut sig: Vec<SmolStr> = params.clone();

            if !c.quantified.is_empty() {
                self.h98_unsupported(cline, "existential quantification")?;
                let mut used = Vec::new();
                for p in &c.context {
                    self.type_vars_in_pred(p, &[], &mut used);
                }
                for (_, te) in field_types(&c.fields) {
                    self.type_vars_in(te, &[], &mut used);
                }
                self.check_quant_vars(cline, &c.quantified, params, &used)?;
                sig.extend(c.quantified.iter().cloned());
            }

            let mut local = Vec::new();
            for p in &c.context {
                let mut vars = Vec::new();
                self.type_vars_in_pred(p, &[], &mut vars);
                if let Some(v) = vars.iter().find(|v| !c.quantified.contains(v)) {
                    return fail(cline, ErrorKind::ConstraintVariableNotLocal { name: v.to_string() });
                }
                local.push(self.dep_pred_exp(cline, &sig, p)?);
            }

            let fields = field_types(&c.fields);
            let labelled = matches!(c.fields, ConstrFields::Labelled(_));
            let mut components = Vec::new();
            let mut strict_fields = Vec::new();
            let mut labels = Vec::new();
            let mut rank2 = None;
            for (pos, (label, te)) in fields.into_iter().enumerate() {
                let te = match self.ast.type_exprs[te].kind {
                    TypeExprKind::Bang(inner) => {
                        strict_fields.push(pos);
                        inner
                    }
                    _ => te,
                };
                let ty = self.dep_comp_type(cline, &sig, te)?;
                if matches!(ty, Type::Forall { .. }) {
                    rank2 = Some(pos);
                }
                components.push(ty);
                labels.push(label);
            }

            if !decl.deriving.is_empty() {
                if rank2.is_some() {
                    return fail(cline, ErrorKind::PolymorphicComponentDerive);
                }
                if !c.quantified.is_empty() {
                    return fail(cline, ErrorKind::ExistentialComponentDerive);
                }
            }
            if labelled && !c.quantified.is_empty() {
                return fail(cline, ErrorKind::ExistentialSelectors);
            }
            if decl.is_newtype {
                let name = c.name.to_string();
                if !local.is_empty() {
                    return fail(cline, ErrorKind::NewtypeContext { name });
                }
                if components.len() != 1 || decl.constructors.len() != 1 {
                    return fail(cline, ErrorKind::NewtypeArity { name });
                }
                if !strict_fields.is_empty() {
                    return fail(cline, ErrorKind::NewtypeStrictness { name });
                }
            }

            // Only the parts of the datatype context the components mention.
            let mut used = Vec::new();
            for t in &components {
                t.collect_offsets(&mut used);
            }
            let mut full_context: Vec<Pred> = context
                .iter()
                .filter(|p| {
                    let mut offs = Vec::new();
                    p.collect_offsets(&mut offs);
                    !offs.is_empty() && offs.iter().all(|o| used.contains(o))
                })
                .cloned()
                .collect();
            full_context.extend(local.iter().cloned());

            let body = components
                .iter()
                .rev()
                .fold(result.clone(), |acc, t| Type::arrow(t.clone(), acc));
            let qualified = if full_context.is_empty() {
                body
            } else {
                Type::Qual {
                    context: full_context,
                    body: Box::new(body),
                }
            };
            let ty = if sig.is_empty() {
                qualified
            } else {
                Type::Forall {
                    kinds: vec![Kind::Star; sig.len()],
                    body: Box::new(qualified),
                }
            };

            let con = self
                .tables
                .declare_name(self.module, &c.name, cline, "constructor function")
                .map_err(at(cline))?;
            let name = &mut self.tables.names[con];
            name.line = cline;
            name.arity = components.len() + local.len();
            name.ty = Some(ty);
            name.kind = NameKind::Constructor(ConstructorInfo {
                tycon: id,
                index,
                local_context: local,
                strict_fields,
                rank2,
                existentials: c.quantified.len(),
                labels: labels.clone(),
            });
            constructors.push(con);

            for (pos, label) in labels.iter().enumerate() {
                if let Some(label) = label {
                    if labels[..pos].contains(&Some(label.clone())) {
                        return fail(
                            cline,
                            ErrorKind::RepeatedFieldName {
                                field: label.to_string(),
                                constructor: c.name.to_string(),
                            },
                        );
                    }
                    self.add_selector(cline, id, con, pos, label, &mut selectors)?;
                }
            }
        }

        let tycon = &mut self.tables.tycons[id];
        tycon.body = TyconBody::Constructors(constructors);
        tycon.selectors = selectors;

        for class in &decl.deriving {
            let Some(cid) = self.tables.find_class(self.module, class) else {
                return fail(line, ErrorKind::UndefinedDerivedClass { name: class.to_string() });
            };
            self.derive_requests.push(DeriveRequest {
                line,
                tycon: id,
                class: cid,
            });
        }
        Ok(())
    }

    /// A constructor component. A `forall` here makes the constructor rank 2.
    fn dep_comp_type(&mut self, line: Line, sig: &[SmolStr], te: TypeExprId) -> StaticResult<Type> {
        let TypeExprKind::Forall { vars, body } = self.ast.type_exprs[te].kind.clone() else {
            return self.dep_type_exp(line, sig, te);
        };
        self.h98_unsupported(line, "polymorphic components")?;
        let mut used = Vec::new();
        self.type_vars_in(body, &[], &mut used);
        self.check_quant_vars(line, &vars, sig, &used)?;
        let inner: Vec<SmolStr> = sig.iter().chain(&vars).cloned().collect();
        let body = self.dep_type_exp(line, &inner, body)?;
        let ty = Type::Forall {
            kinds: vec![Kind::Star; vars.len()],
            body: Box::new(body),
        };
        if ty.is_ambiguous() {
            return fail(
                line,
                ErrorKind::AmbiguousType {
                    what: "constructor component".to_string(),
                    ty: self.tables.show_type(&ty).to_string(),
                },
            );
        }
        Ok(ty)
    }

    /// Adds `con` at `pos` to the selector for `label`, creating it if this
    /// is the first constructor of the type with that field.
    fn add_selector(
        &mut self,
        line: Line,
        tycon: TyconId,
        con: NameId,
        pos: usize,
        label: &SmolStr,
        selectors: &mut Vec<NameId>,
    ) -> StaticResult<()> {
        if let Some(&sel) = selectors.iter().find(|&&s| self.tables.names[s].text == *label) {
            if let NameKind::Selector { fields, .. } = &mut self.tables.names[sel].kind {
                fields.push((con, pos));
            }
            return Ok(());
        }
        let sel = self
            .tables
            .declare_name(self.module, label, line, "selector")
            .map_err(|kind| match kind {
                ErrorKind::DuplicateDefinition { name, .. } => ErrorKind::RepeatedSelectorDefinition { name },
                other => other,
            })
            .map_err(at(line))?;
        let name = &mut self.tables.names[sel];
        name.line = line;
        name.arity = 1;
        name.kind = NameKind::Selector {
            tycon,
            fields: vec![(con, pos)],
        };
        selectors.push(sel);
        Ok(())
    }

    // ── Synonyms ─────────────────────────────────────────────────

    /// Rejects synonym cycles and replaces each body by its full expansion,
    /// dependencies first.
    pub fn check_synonyms(&mut self) -> StaticResult<()> {
        let synonyms: Vec<usize> = (0..self.pending_tycons.len())
            .filter(|&i| matches!(self.pending_tycons[i].source, TyconSource::Synonym(_)))
            .collect();
        let mut done = HashSet::new();
        for i in synonyms {
            let mut path = Vec::new();
            self.visit_synonym(i, &mut path, &mut done)?;
        }
        Ok(())
    }

    fn visit_synonym(&mut self, index: usize, path: &mut Vec<usize>, done: &mut HashSet<usize>) -> StaticResult<()> {
        if done.contains(&index) {
            return Ok(());
        }
        let id = self.pending_tycons[index].id;
        if let Some(start) = path.iter().position(|&p| p == index) {
            let first = self.tables.tycons[id].text.to_string();
            let line = self.pending_tycons[index].line;
            return match path.last() {
                Some(&last) if path.len() - start > 1 => {
                    let second = self.tables.tycons[self.pending_tycons[last].id].text.to_string();
                    fail(line, ErrorKind::MutuallyRecursiveSynonyms { first, second })
                }
                _ => fail(line, ErrorKind::RecursiveSynonym { name: first }),
            };
        }
        path.push(index);
        let deps: Vec<usize> = self.pending_tycons[index]
            .deps
            .iter()
            .filter_map(|d| match d {
                TcNode::Tycon(t) => self
                    .pending_tycons
                    .iter()
                    .position(|p| p.id == *t && matches!(p.source, TyconSource::Synonym(_))),
                TcNode::Class(_) => None,
            })
            .collect();
        for d in deps {
            self.visit_synonym(d, path, done)?;
        }
        path.pop();

        if let Some(body) = self.tables.tycons[id].synonym_body().cloned() {
            let expanded = self.tables.full_expand(&body);
            self.tables.tycons[id].body = TyconBody::Synonym(expanded);
        }
        done.insert(index);
        Ok(())
    }

    /// Every variable a restricted synonym names must be bound at top level.
    pub fn check_restricted_synonyms(&self, top: &[RawBinding]) -> StaticResult<()> {
        for pending in &self.pending_tycons {
            let tycon = &self.tables.tycons[pending.id];
            if tycon.what != TyconWhat::RestrictedSynonym {
                continue;
            }
            for v in &tycon.restricted_to {
                if !top.iter().any(|b| b.binder.vars().iter().any(|bv| bv.text == *v)) {
                    return fail(
                        pending.line,
                        ErrorKind::MissingRestrictedBinding {
                            name: v.to_string(),
                            synonym: tycon.text.to_string(),
                        },
                    );
                }
            }
        }
        Ok(())
    }
}

fn check_distinct_params(line: Line, params: &[SmolStr]) -> StaticResult<()> {
    for (i, p) in params.iter().enumerate() {
        if params[..i].contains(p) {
            return fail(
                line,
                ErrorKind::RepeatedTypeVariable {
                    name: p.to_string(),
                    place: "left hand side of type definition",
                },
            );
        }
    }
    Ok(())
}

/// Component types by position, with their labels.
fn field_types(fields: &ConstrFields) -> Vec<(Option<SmolStr>, TypeExprId)> {
    match fields {
        ConstrFields::Positional(ts) => ts.iter().map(|&t| (None, t)).collect(),
        ConstrFields::Labelled(fs) => fs
            .iter()
            .flat_map(|f| f.labels.iter().map(move |l| (Some(l.clone()), f.ty)))
            .collect(),
    }
}

// ── Expansion ─────────────────────────────────────────────────────

impl Tables {
    /// Expands every saturated application of an ordinary synonym.
    /// Restricted synonyms stay opaque.
    pub fn full_expand(&self, ty: &Type) -> Type {
        self.expand_with(ty, &|_| false)
    }

    /// Like [`Tables::full_expand`], also expanding restricted synonyms
    /// for which `transparent` holds.
    pub fn expand_with(&self, ty: &Type, transparent: &dyn Fn(TyconId) -> bool) -> Type {
        match ty {
            Type::Forall { kinds, body } => Type::Forall {
                kinds: kinds.clone(),
                body: Box::new(self.expand_with(body, transparent)),
            },
            Type::Qual { context, body } => Type::Qual {
                context: context
                    .iter()
                    .map(|p| p.map_args(|a| self.expand_with(a, transparent)))
                    .collect(),
                body: Box::new(self.expand_with(body, transparent)),
            },
            Type::App(..) | Type::Tycon(_) => {
                let (head, args) = ty.spine();
                if let Type::Tycon(t) = head {
                    let tycon = &self.tycons[*t];
                    let opens = match tycon.what {
                        TyconWhat::Synonym => true,
                        TyconWhat::RestrictedSynonym => transparent(*t),
                        TyconWhat::Data | TyconWhat::Newtype => false,
                    };
                    if let (true, Some(body)) = (opens, tycon.synonym_body()) {
                        if args.len() >= tycon.arity {
                            let (now, rest) = args.split_at(tycon.arity);
                            let now: Vec<Type> = now.iter().map(|&a| a.clone()).collect();
                            let applied = Type::apply(body.instantiate(&now), rest.iter().map(|&a| a.clone()));
                            return self.expand_with(&applied, transparent);
                        }
                    }
                }
                Type::apply(head.clone(), args.into_iter().map(|a| self.expand_with(a, transparent)))
            }
            Type::Offset(_) | Type::Ident(_) | Type::Prim(_) => ty.clone(),
        }
    }
}
