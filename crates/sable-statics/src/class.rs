//! Class declarations: heads, superclasses, member signatures and the
//! dictionary names generated for each class.

use sable_ast::{TypeExprKind, ValueDecl};
use smol_str::SmolStr;

use crate::bindings::RawBinding;
use crate::checker::{Analyzer, MemberSig};
use crate::error::{at, fail, ErrorKind, StaticResult};
use crate::kinds::Kind;
use crate::result::Binder;
use crate::skeleton::NUM_OFFSETS;
use crate::tables::{ClassId, NameKind};
use crate::types::{Pred, Type};

impl Analyzer<'_> {
    /// Second phase for one registered class.
    pub fn check_class_defn(&mut self, index: usize) -> StaticResult<()> {
        let decl = self.pending_classes[index].decl.clone();
        let id = self.pending_classes[index].id;
        let line = decl.line;
        self.tc_deps.clear();

        let mut params: Vec<SmolStr> = Vec::new();
        for &p in &decl.params {
            let TypeExprKind::Var(v) = &self.ast.type_exprs[p].kind else {
                return fail(line, ErrorKind::TypeVariableRequiredInClassHead);
            };
            if params.contains(v) {
                return fail(
                    line,
                    ErrorKind::RepeatedTypeVariable {
                        name: v.to_string(),
                        place: "class header",
                    },
                );
            }
            params.push(v.clone());
        }

        let supers = decl
            .context
            .iter()
            .map(|p| self.dep_pred_exp(line, &params, p))
            .collect::<StaticResult<Vec<_>>>()?;
        self.h98_check_context(line, "class declaration", false, &supers)?;
        self.tables.classes[id].supers = supers;

        let head = self.tables.classes[id].head.clone();
        let mut members: Vec<MemberSig> = Vec::new();
        let mut fixities = Vec::new();
        let mut equations = Vec::new();
        for member in &decl.members {
            match member {
                ValueDecl::Sig(sig) => {
                    let ty = self.member_type(sig.line, &params, &head, sig.ty)?;
                    for v in &sig.vars {
                        if v.is_qualified() {
                            return fail(sig.line, ErrorKind::QualifiedSignature { name: v.to_string() });
                        }
                        if members.iter().any(|m| m.text == v.text) {
                            return fail(sig.line, ErrorKind::RepeatedMemberDefinition { name: v.text.to_string() });
                        }
                        members.push(MemberSig {
                            line: sig.line,
                            text: v.text.clone(),
                            ty: ty.clone(),
                        });
                    }
                }
                ValueDecl::Fixity(f) => fixities.push(f.clone()),
                ValueDecl::FunBind(_) | ValueDecl::PatBind(_) => equations.push(member.clone()),
            }
        }
        let defaults = self.extract_bindings(&equations)?;

        let pending = &mut self.pending_classes[index];
        pending.members = members;
        pending.fixities = fixities;
        pending.defaults = defaults;
        pending.deps = std::mem::take(&mut self.tc_deps);
        Ok(())
    }

    /// `forall params vars. (C params, ctx) => body` for a member signature.
    fn member_type(&mut self, line: sable_ast::Line, params: &[SmolStr], head: &Pred, te: sable_ast::TypeExprId) -> StaticResult<Type> {
        let mut extra = Vec::new();
        self.type_vars_in(te, params, &mut extra);
        let all: Vec<SmolStr> = params.iter().chain(&extra).cloned().collect();
        if all.len() >= NUM_OFFSETS {
            return fail(
                line,
                ErrorKind::TooManyTypeVariables {
                    what: "member function type signature",
                },
            );
        }
        let (context, body) = match self.dep_type_exp(line, &all, te)? {
            Type::Qual { context, body } => (context, *body),
            other => (Vec::new(), other),
        };
        self.h98_check_context(line, "member function type signature", true, &context)?;
        let ty = Type::Qual {
            context: std::iter::once(head.clone()).chain(context).collect(),
            body: Box::new(body),
        };
        if ty.is_ambiguous() {
            return fail(
                line,
                ErrorKind::AmbiguousType {
                    what: "member function type signature".to_string(),
                    ty: self.tables.show_type(&ty).to_string(),
                },
            );
        }
        Ok(Type::Forall {
            kinds: vec![Kind::Star; all.len()],
            body: Box::new(ty),
        })
    }

    /// Creates the member names, dictionary selectors, constructor and
    /// builder of a class whose kinds are known.
    pub fn add_members(&mut self, index: usize) -> StaticResult<()> {
        let id = self.pending_classes[index].id;
        let (text, line, num_supers) = {
            let class = &self.tables.classes[id];
            (class.text.clone(), class.line, class.supers.len())
        };

        let selectors = (0..num_supers)
            .map(|k| {
                self.tables.generated_name(
                    self.module,
                    format!("sc{}.{}", k, text),
                    line,
                    1,
                    NameKind::DictSelector { class: id, index: k },
                )
            })
            .collect();
        self.tables.classes[id].dict_selectors = selectors;

        let sigs: Vec<(sable_ast::Line, SmolStr, Type)> = self.pending_classes[index]
            .members
            .iter()
            .map(|m| (m.line, m.text.clone(), m.ty.clone()))
            .collect();
        let mut members = Vec::new();
        for (j, (mline, mtext, ty)) in sigs.into_iter().enumerate() {
            let n = self
                .tables
                .declare_name(self.module, &mtext, mline, "member function")
                .map_err(at(mline))?;
            let name = &mut self.tables.names[n];
            name.line = mline;
            name.arity = ty.body().arrow_args().len();
            name.kind = NameKind::Member { class: id, index: j };
            name.ty = Some(ty);
            members.push(n);
        }
        self.tables.classes[id].members = members.clone();

        for f in self.pending_classes[index].fixities.clone() {
            for op in &f.ops {
                let Some(&n) = members.iter().find(|&&m| self.tables.names[m].text == *op) else {
                    return fail(f.line, ErrorKind::MissingFixityBinding { op: op.to_string() });
                };
                if self.tables.names[n].fixity.is_some() {
                    return fail(f.line, ErrorKind::RepeatedFixity { op: op.to_string() });
                }
                self.tables.names[n].fixity = Some(f.fixity);
            }
        }

        let total = num_supers + members.len();
        let make = self.tables.generated_name(
            self.module,
            format!("Make.{}", text),
            line,
            total,
            NameKind::DictConstructor {
                class: id,
                single_entry: total == 1,
            },
        );
        let builder = self.tables.generated_name(
            self.module,
            format!("class.{}", text),
            line,
            num_supers + 1,
            NameKind::DictBuilder { class: id },
        );
        let class = &mut self.tables.classes[id];
        class.dict_constructor = Some(make);
        class.dict_builder = Some(builder);

        let defaults = std::mem::take(&mut self.pending_classes[index].defaults);
        let slots = self.class_bindings("class", id, defaults)?;
        self.member_defaults.push((id, slots));
        Ok(())
    }

    /// Assigns each class a level one above its deepest superclass.
    pub fn visit_classes(&mut self) -> StaticResult<()> {
        let ids: Vec<ClassId> = self.pending_classes.iter().map(|c| c.id).collect();
        let mut visiting = Vec::new();
        for id in ids {
            self.class_level(id, &mut visiting)?;
        }
        Ok(())
    }

    fn class_level(&mut self, id: ClassId, visiting: &mut Vec<ClassId>) -> StaticResult<u32> {
        let class = &self.tables.classes[id];
        if class.level > 0 {
            return Ok(class.level);
        }
        if visiting.contains(&id) {
            return fail(class.line, ErrorKind::RecursiveClassHierarchy { name: class.text.to_string() });
        }
        let supers: Vec<ClassId> = class.supers.iter().filter_map(|p| p.class.id()).collect();
        visiting.push(id);
        let mut level = 1;
        for s in supers {
            level = level.max(self.class_level(s, visiting)? + 1);
        }
        visiting.pop();
        self.tables.classes[id].level = level;
        Ok(level)
    }

    /// Places member bindings of a class or instance declaration in class
    /// member order.
    pub fn class_bindings(&self, place: &'static str, class: ClassId, raw: Vec<RawBinding>) -> StaticResult<Vec<Option<RawBinding>>> {
        let members = &self.tables.classes[class].members;
        let mut slots: Vec<Option<RawBinding>> = (0..members.len()).map(|_| None).collect();
        for mut b in raw {
            let Binder::Var(v) = &mut b.binder else {
                return fail(b.line, ErrorKind::IllegalPatternBinding { place });
            };
            let Some(index) = members.iter().position(|&m| self.tables.names[m].text == v.text) else {
                return fail(
                    b.line,
                    ErrorKind::UnknownMember {
                        member: v.text.to_string(),
                        class: self.tables.classes[class].text.to_string(),
                    },
                );
            };
            v.name = Some(members[index]);
            slots[index] = Some(b);
        }
        Ok(slots)
    }
}
