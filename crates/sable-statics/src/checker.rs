//! The per-module analysis context.
//!
//! An [`Analyzer`] owns everything transient about one unit: the module AST,
//! declarations waiting for their second phase, the lexical scope stack and
//! the outputs built so far. The passes themselves live in the sibling
//! modules as further `impl Analyzer` blocks; [`Analyzer::run`] fixes the
//! order they run in.

use la_arena::{Arena, ArenaMap};
use sable_ast::{
    ClassDecl, DataDecl, Decl, DefaultDecl, ExprId, FixityDecl, ForeignDecl, ForeignDirection,
    InstanceDecl, Line, Module, PatternId, RestrictedItem, SynonymDecl, ValueDecl,
};
use smol_str::SmolStr;
use std::collections::HashMap;
use tracing::{debug, debug_span};

use crate::bindings::RawBinding;
use crate::error::{at, fail, ErrorKind, StaticError, StaticResult};
use crate::result::{
    Binding, BindingId, ConRef, ExprAnalysis, ForeignExport, ModuleAnalysis, ScopeKey, VarRef,
};
use crate::tables::{ClassId, InstId, ModuleId, NameKind, Tables, TyconId, TyconWhat};
use crate::types::{Pred, Type};
use crate::Options;

/// A node of the type-constructor and class dependency graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum TcNode {
    Tycon(TyconId),
    Class(ClassId),
}

#[derive(Clone)]
pub(crate) enum TyconSource {
    Data(DataDecl),
    Synonym(SynonymDecl),
}

/// A type constructor registered in the first phase.
pub(crate) struct PendingTycon {
    pub id: TyconId,
    pub line: Line,
    pub source: TyconSource,
    /// Tycons and classes its definition mentions.
    pub deps: Vec<TcNode>,
}

/// A class registered in the first phase, with the parts of its body that
/// wait for kind inference.
pub(crate) struct PendingClass {
    pub id: ClassId,
    pub decl: ClassDecl,
    pub deps: Vec<TcNode>,
    pub members: Vec<MemberSig>,
    pub fixities: Vec<FixityDecl>,
    pub defaults: Vec<RawBinding>,
}

pub(crate) struct MemberSig {
    pub line: Line,
    pub text: SmolStr,
    /// `forall params vars. (C params, ctx) => body`
    pub ty: Type,
}

pub(crate) struct DeriveRequest {
    pub line: Line,
    pub tycon: TyconId,
    pub class: ClassId,
}

/// Declarations whose processing waits until every type and class is known.
#[derive(Default)]
pub(crate) struct Deferred {
    pub instances: Vec<InstanceDecl>,
    pub defaults: Vec<DefaultDecl>,
    pub foreign: Vec<ForeignDecl>,
    pub values: Vec<ValueDecl>,
}

/// One level of the lexical scope stack.
pub(crate) enum Frame {
    /// Variables bound by the patterns of a lambda, equation, case
    /// alternative or generator.
    Patterns(Vec<SmolStr>),
    Bindings(BindingFrame),
}

pub(crate) struct BindingFrame {
    pub vars: HashMap<SmolStr, usize>,
    pub ids: Vec<BindingId>,
    /// Binding whose right-hand side is being walked.
    pub current: Option<usize>,
    pub edges: Vec<Vec<usize>>,
}

pub(crate) struct Analyzer<'a> {
    pub tables: &'a mut Tables,
    pub options: &'a Options,
    pub module: ModuleId,
    pub ast: Module,

    // Second-phase worklists
    pub pending_tycons: Vec<PendingTycon>,
    pub pending_classes: Vec<PendingClass>,
    pub derive_requests: Vec<DeriveRequest>,
    /// Tycons and classes mentioned since the last reset.
    pub tc_deps: Vec<TcNode>,
    pub member_defaults: Vec<(ClassId, Vec<Option<RawBinding>>)>,
    pub member_impls: Vec<(InstId, Vec<Option<RawBinding>>)>,

    pub frames: Vec<Frame>,

    // Outputs
    pub instances: Vec<InstId>,
    pub derived: Vec<InstId>,
    pub bindings: Arena<Binding>,
    pub local_groups: HashMap<ScopeKey, Vec<Vec<BindingId>>>,
    pub resolutions: ArenaMap<ExprId, VarRef>,
    pub pattern_cons: ArenaMap<PatternId, ConRef>,
    pub annotations: ArenaMap<ExprId, Type>,
    pub pattern_types: ArenaMap<PatternId, Type>,
    pub class_defaults: HashMap<ClassId, Vec<Option<BindingId>>>,
    pub instance_members: HashMap<InstId, Vec<Option<BindingId>>>,
    pub foreign_exports: Vec<ForeignExport>,
}

impl<'a> Analyzer<'a> {
    pub fn new(tables: &'a mut Tables, options: &'a Options, module: ModuleId, ast: Module) -> Self {
        Self {
            tables,
            options,
            module,
            ast,
            pending_tycons: Vec::new(),
            pending_classes: Vec::new(),
            derive_requests: Vec::new(),
            tc_deps: Vec::new(),
            member_defaults: Vec::new(),
            member_impls: Vec::new(),
            frames: Vec::new(),
            instances: Vec::new(),
            derived: Vec::new(),
            bindings: Arena::new(),
            local_groups: HashMap::new(),
            resolutions: ArenaMap::default(),
            pattern_cons: ArenaMap::default(),
            annotations: ArenaMap::default(),
            pattern_types: ArenaMap::default(),
            class_defaults: HashMap::new(),
            instance_members: HashMap::new(),
            foreign_exports: Vec::new(),
        }
    }

    // ── Driver ───────────────────────────────────────────────────

    pub fn run(mut self) -> StaticResult<ModuleAnalysis> {
        let _span = debug_span!("module", name = %self.ast.name).entered();

        self.process_imports()?;
        debug!("imports resolved");

        let decls = std::mem::take(&mut self.ast.decls);
        let deferred = self.register(&decls)?;

        for i in 0..self.pending_tycons.len() {
            self.check_tycon_defn(i)?;
        }
        self.check_synonyms()?;
        debug!(count = self.pending_tycons.len(), "type constructors checked");

        for i in 0..self.pending_classes.len() {
            self.check_class_defn(i)?;
        }
        self.kind_groups()?;
        for i in 0..self.pending_classes.len() {
            self.add_members(i)?;
        }
        self.visit_classes()?;
        debug!(count = self.pending_classes.len(), "classes checked");

        for decl in &deferred.instances {
            self.check_instance(decl)?;
        }
        self.add_derived_instances()?;
        debug!(
            instances = self.instances.len(),
            derived = self.derived.len(),
            "instances checked"
        );

        self.check_defaults(&deferred.defaults)?;

        let mut raw = self.eqns_to_bindings(&deferred.values, true)?;
        self.declare_top_level(&mut raw)?;
        self.check_foreign(&deferred.foreign)?;
        self.check_exports()?;
        self.check_restricted_synonyms(&raw)?;

        let groups = self.enter_scope(raw)?;
        self.analyse_members()?;
        self.leave_scope();
        debug!(groups = groups.len(), "bindings analysed");

        self.ast.decls = decls;
        Ok(self.finish(groups))
    }

    /// Analyses a single expression against the module's top level.
    pub fn run_expr(mut self, root: ExprId) -> StaticResult<ExprAnalysis> {
        let _span = debug_span!("expression", module = %self.ast.name).entered();
        self.dep_expr(root)?;
        Ok(ExprAnalysis {
            ast: self.ast,
            root,
            bindings: self.bindings,
            local_groups: self.local_groups,
            resolutions: self.resolutions,
            pattern_cons: self.pattern_cons,
            annotations: self.annotations,
            pattern_types: self.pattern_types,
        })
    }

    fn finish(self, groups: Vec<Vec<BindingId>>) -> ModuleAnalysis {
        ModuleAnalysis {
            module: self.module,
            ast: self.ast,
            bindings: self.bindings,
            groups,
            local_groups: self.local_groups,
            resolutions: self.resolutions,
            pattern_cons: self.pattern_cons,
            annotations: self.annotations,
            pattern_types: self.pattern_types,
            tycons: self.pending_tycons.iter().map(|t| t.id).collect(),
            classes: self.pending_classes.iter().map(|c| c.id).collect(),
            instances: self.instances,
            derived: self.derived,
            class_defaults: self.class_defaults,
            instance_members: self.instance_members,
            foreign_exports: self.foreign_exports,
        }
    }

    // ── Registration ─────────────────────────────────────────────

    /// First phase: enters every type, class and foreign import so later
    /// passes can refer to them in any order.
    fn register(&mut self, decls: &[Decl]) -> StaticResult<Deferred> {
        let mut deferred = Deferred::default();
        for decl in decls {
            match decl {
                Decl::Data(d) => {
                    let what = if d.is_newtype {
                        TyconWhat::Newtype
                    } else {
                        TyconWhat::Data
                    };
                    let id = self
                        .tables
                        .declare_tycon(self.module, &d.name, d.line, d.params.len(), what)
                        .map_err(at(d.line))?;
                    self.pending_tycons.push(PendingTycon {
                        id,
                        line: d.line,
                        source: TyconSource::Data(d.clone()),
                        deps: Vec::new(),
                    });
                }
                Decl::Synonym(s) => {
                    let what = match &s.restricted_to {
                        Some(_) => {
                            self.h98_unsupported(s.line, "restricted type synonyms")?;
                            TyconWhat::RestrictedSynonym
                        }
                        None => TyconWhat::Synonym,
                    };
                    let id = self
                        .tables
                        .declare_tycon(self.module, &s.name, s.line, s.params.len(), what)
                        .map_err(at(s.line))?;
                    for item in s.restricted_to.iter().flatten() {
                        match item {
                            RestrictedItem::Var(v) => self.tables.tycons[id].restricted_to.push(v.clone()),
                            RestrictedItem::Sig(sig) => {
                                for v in &sig.vars {
                                    self.tables.tycons[id].restricted_to.push(v.text.clone());
                                }
                                deferred.values.push(ValueDecl::Sig(sig.clone()));
                            }
                        }
                    }
                    self.pending_tycons.push(PendingTycon {
                        id,
                        line: s.line,
                        source: TyconSource::Synonym(s.clone()),
                        deps: Vec::new(),
                    });
                }
                Decl::Class(c) => {
                    if c.params.len() != 1 {
                        self.h98_unsupported(c.line, "multiple parameter classes")?;
                    }
                    let id = self
                        .tables
                        .declare_class(self.module, &c.name, c.line, c.params.len())
                        .map_err(at(c.line))?;
                    self.pending_classes.push(PendingClass {
                        id,
                        decl: c.clone(),
                        deps: Vec::new(),
                        members: Vec::new(),
                        fixities: Vec::new(),
                        defaults: Vec::new(),
                    });
                }
                Decl::Instance(i) => deferred.instances.push(i.clone()),
                Decl::Default(d) => {
                    if !deferred.defaults.is_empty() {
                        return fail(d.line, ErrorKind::MultipleDefaults);
                    }
                    deferred.defaults.push(d.clone());
                }
                Decl::Foreign(f) => {
                    if f.direction == ForeignDirection::Import {
                        let id = self
                            .tables
                            .declare_name(self.module, &f.name, f.line, "foreign import")
                            .map_err(at(f.line))?;
                        let name = &mut self.tables.names[id];
                        name.line = f.line;
                        name.kind = NameKind::ForeignImport {
                            entity: f.entity.clone(),
                        };
                    }
                    deferred.foreign.push(f.clone());
                }
                Decl::Value(v) => deferred.values.push(v.clone()),
            }
        }
        Ok(deferred)
    }

    // ── Defaults and foreign declarations ────────────────────────

    fn check_defaults(&mut self, decls: &[DefaultDecl]) -> StaticResult<()> {
        let types = match decls.first() {
            Some(decl) => {
                let mut types = Vec::new();
                for &te in &decl.types {
                    let mut ty = self.dep_type_exp(decl.line, &[], te)?;
                    self.kind_check_star(decl.line, "default declaration", &mut ty)?;
                    let ty = self.tables.full_expand(&ty);
                    if let Some(num) = self.prelude_class("Num") {
                        if !self.entails(&Pred::new(num, vec![ty.clone()])) {
                            return fail(
                                decl.line,
                                ErrorKind::DefaultNotNum {
                                    ty: self.tables.show_type(&ty).to_string(),
                                },
                            );
                        }
                    }
                    types.push(ty);
                }
                types
            }
            None => ["Integer", "Double"]
                .iter()
                .filter_map(|t| self.tables.lookup_tycon(self.module, t))
                .map(Type::Tycon)
                .collect(),
        };
        self.tables.modules[self.module].defaults = types;
        Ok(())
    }

    fn check_foreign(&mut self, decls: &[ForeignDecl]) -> StaticResult<()> {
        for f in decls {
            let ty = self.check_sig_type(f.line, "foreign declaration", f.ty)?;
            match f.direction {
                ForeignDirection::Import => {
                    if let Some(id) = self.tables.lookup_name(self.module, &f.name) {
                        let name = &mut self.tables.names[id];
                        name.arity = ty.body().arrow_args().len();
                        name.ty = Some(ty);
                    }
                }
                ForeignDirection::Export => {
                    let Some(name) = self.tables.lookup_name(self.module, &f.name) else {
                        return fail(
                            f.line,
                            ErrorKind::UndefinedVariable {
                                name: f.name.to_string(),
                            },
                        );
                    };
                    if self.foreign_exports.iter().any(|e| e.name == name) {
                        return fail(
                            f.line,
                            ErrorKind::DuplicateDefinition {
                                what: "foreign export",
                                name: f.name.to_string(),
                            },
                        );
                    }
                    self.tables.generated_name(
                        self.module,
                        format!("export.{}", f.name),
                        f.line,
                        0,
                        NameKind::ForeignExport {
                            entity: f.entity.clone(),
                        },
                    );
                    self.foreign_exports.push(ForeignExport {
                        line: f.line,
                        name,
                        entity: f.entity.clone(),
                        ty,
                    });
                }
            }
        }
        Ok(())
    }

    // ── Class and instance member bodies ─────────────────────────

    fn analyse_members(&mut self) -> StaticResult<()> {
        for (class, slots) in std::mem::take(&mut self.member_defaults) {
            let ids = self.member_bindings(slots)?;
            self.class_defaults.insert(class, ids);
        }
        for (inst, slots) in std::mem::take(&mut self.member_impls) {
            let ids = self.member_bindings(slots)?;
            self.instance_members.insert(inst, ids);
        }
        Ok(())
    }

    fn member_bindings(&mut self, slots: Vec<Option<RawBinding>>) -> StaticResult<Vec<Option<BindingId>>> {
        slots
            .into_iter()
            .map(|slot| slot.map(|raw| self.detached_binding(raw)).transpose())
            .collect()
    }

    // ── Helpers ──────────────────────────────────────────────────

    /// A class defined by the Prelude, if one is loaded.
    pub fn prelude_class(&self, text: &str) -> Option<ClassId> {
        let prelude = self.tables.find_module("Prelude")?;
        self.tables.modules[prelude]
            .defined_classes
            .iter()
            .copied()
            .find(|&c| self.tables.classes[c].text == text)
    }

    pub fn module_text(&self) -> String {
        self.tables.modules[self.module].text.to_string()
    }

    pub fn h98_unsupported(&self, line: Line, feature: &'static str) -> StaticResult<()> {
        if self.options.haskell98 {
            return Err(StaticError::new(line, ErrorKind::Haskell98Unsupported { feature }));
        }
        Ok(())
    }

    pub fn record_dep(&mut self, node: TcNode) {
        if !self.tc_deps.contains(&node) {
            self.tc_deps.push(node);
        }
    }
}
