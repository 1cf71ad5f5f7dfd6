//! Derived instances.
//!
//! Every `deriving` request becomes an instance whose context starts as the
//! datatype context. Each constructor component `t` then obliges `C t`.
//! Obligations headed by a type variable join the context; any other is
//! reduced through the instance that matches it, whose own context becomes
//! new obligations. Derived instances may rely on one another, so all of
//! them are solved together until no context grows.

use sable_ast::Line;
use tracing::{debug, trace};

use crate::checker::Analyzer;
use crate::error::{fail, ErrorKind, StaticResult};
use crate::tables::{ClassId, Inst, InstId, NameId, TyconId};
use crate::types::{Pred, Type};
use crate::unify::substitute;

/// Derivable classes with the members a derived instance supplies.
const DERIVABLE: &[(&str, &[&str])] = &[
    ("Eq", &["=="]),
    ("Ord", &["compare"]),
    ("Enum", &["toEnum", "fromEnum", "enumFrom", "enumFromThen"]),
    ("Ix", &["range", "index", "inRange"]),
    ("Show", &["showsPrec"]),
    ("Read", &["readsPrec"]),
    ("Bounded", &["minBound", "maxBound"]),
];

struct Pending {
    inst: InstId,
    line: Line,
    obligations: Vec<Pred>,
}

impl Analyzer<'_> {
    pub fn add_derived_instances(&mut self) -> StaticResult<()> {
        let requests = std::mem::take(&mut self.derive_requests);
        let mut pending = Vec::new();
        for r in &requests {
            let members = self.derivable(r.line, r.class)?;
            self.check_derive_shape(r.line, r.tycon, r.class)?;
            pending.push(self.start_derived(r.line, r.tycon, r.class, members)?);
        }
        self.solve_derived(&pending)?;
        for p in &pending {
            let context = self.tables.insts[p.inst].context.clone();
            self.h98_check_context(p.line, "derived instance", false, &context)?;
            self.derived.push(p.inst);
            debug!(instance = %self.tables.show_pred(&self.tables.insts[p.inst].head), context = %self.tables.show_context(&context), "derived");
        }
        Ok(())
    }

    /// Members the derived instance must supply, or an error if `class` is
    /// not one of the standard derivable classes.
    fn derivable(&self, line: Line, class: ClassId) -> StaticResult<Vec<NameId>> {
        let c = &self.tables.classes[class];
        let standard = self.tables.modules[c.module].text == "Prelude";
        let Some((_, members)) = DERIVABLE.iter().find(|(text, _)| standard && *text == c.text) else {
            return fail(line, ErrorKind::UnsupportedDerivedClass { class: c.text.to_string() });
        };
        Ok(c.members
            .iter()
            .copied()
            .filter(|&m| members.contains(&self.tables.names[m].text.as_str()))
            .collect())
    }

    fn check_derive_shape(&self, line: Line, tycon: TyconId, class: ClassId) -> StaticResult<()> {
        let t = &self.tables.tycons[tycon];
        let class_text = self.tables.classes[class].text.as_str();
        let constructors = t.constructors();
        let enumeration = constructors.iter().all(|&c| self.tables.names[c].arity == 0);
        let reason = match class_text {
            _ if constructors.is_empty() && matches!(class_text, "Enum" | "Bounded" | "Ix") => {
                Some("type has no constructors")
            }
            "Enum" if !enumeration => Some("constructors must all be nullary"),
            "Bounded" | "Ix" if !enumeration && constructors.len() != 1 => {
                Some("type must be an enumeration or have a single constructor")
            }
            _ => None,
        };
        match reason {
            Some(reason) => fail(
                line,
                ErrorKind::CannotDerive {
                    class: class_text.to_string(),
                    tycon: t.text.to_string(),
                    reason,
                },
            ),
            None => Ok(()),
        }
    }

    /// Creates the instance `C (T a1 .. an)` with the datatype context and
    /// collects its obligations.
    fn start_derived(&mut self, line: Line, tycon: TyconId, class: ClassId, members: Vec<NameId>) -> StaticResult<Pending> {
        let t = &self.tables.tycons[tycon];
        let head = Pred::new(class, vec![Type::applied_to_offsets(Type::Tycon(tycon), t.arity)]);
        let context = t.context.clone();
        let kinds = t.kind.args();

        let mut obligations = Vec::new();
        for &c in t.constructors() {
            let Some(ty) = &self.tables.names[c].ty else {
                continue;
            };
            for arg in ty.body().arrow_args() {
                let p = Pred::new(class, vec![self.tables.full_expand(arg)]);
                if !obligations.contains(&p) {
                    obligations.push(p);
                }
            }
        }

        let inst = self.tables.insts.alloc(Inst {
            class,
            module: self.module,
            line,
            head,
            context,
            kinds,
            builder: None,
            derived: true,
            derived_members: members,
        });
        self.insert_instance(inst)?;
        self.add_inst_builder(inst);
        self.tables.modules[self.module].instances.push(inst);
        Ok(Pending { inst, line, obligations })
    }

    fn solve_derived(&mut self, pending: &[Pending]) -> StaticResult<()> {
        let limit = self.options.derive_iteration_limit;
        let mut passes = 0;
        loop {
            passes += 1;
            if passes > limit {
                return fail(
                    pending.first().map_or(0, |p| p.line),
                    ErrorKind::DerivationDidNotConverge { passes: limit },
                );
            }
            let mut changed = false;
            for p in pending {
                let found = self.reduce(p, limit)?;
                let context = &mut self.tables.insts[p.inst].context;
                for q in found {
                    if !context.contains(&q) {
                        context.push(q);
                        changed = true;
                    }
                }
            }
            trace!(passes, changed, "derived context pass");
            if !changed {
                return Ok(());
            }
        }
    }

    /// Reduces the obligations of one derived instance to predicates on
    /// type variables, using the contexts currently known.
    fn reduce(&self, p: &Pending, limit: usize) -> StaticResult<Vec<Pred>> {
        let mut work: Vec<Pred> = p.obligations.iter().rev().cloned().collect();
        let mut seen: Vec<Pred> = Vec::new();
        let mut found = Vec::new();
        let mut steps = 0;
        while let Some(q) = work.pop() {
            steps += 1;
            if steps > 64 * limit {
                return fail(p.line, ErrorKind::DerivationDidNotConverge { passes: limit });
            }
            if seen.contains(&q) {
                continue;
            }
            seen.push(q.clone());
            if q.args.iter().all(|a| matches!(a.head(), Type::Offset(_))) {
                found.push(q);
                continue;
            }
            let Some((inst, subst)) = self.find_instance(&q) else {
                return fail(
                    p.line,
                    ErrorKind::MissingInstanceForDerivation {
                        required: self.tables.show_pred(&q).to_string(),
                        derived: self.tables.show_pred(&self.tables.insts[p.inst].head).to_string(),
                    },
                );
            };
            for r in self.tables.insts[inst].context.iter().rev() {
                work.push(r.map_args(|t| substitute(t, &subst)));
            }
        }
        Ok(found)
    }
}
