//! What analysis hands to the type checker.

use la_arena::{Arena, ArenaMap, Idx};
use sable_ast::{ExprId, Fixity, Line, Module, PatternId, RhsBody};
use smol_str::SmolStr;
use std::collections::HashMap;

use crate::tables::{ClassId, InstId, ModuleId, NameId, PrimCon, TyconId};
use crate::types::Type;

pub type BindingId = Idx<Binding>;

/// One entry of a binding group: a function binding with its equations, or
/// a pattern binding.
#[derive(Clone, Debug)]
pub struct Binding {
    pub line: Line,
    pub binder: Binder,
    /// Equations in source order. A pattern binding has exactly one, with
    /// no arguments.
    pub alts: Vec<Alternative>,
}

#[derive(Clone, Debug)]
pub enum Binder {
    Var(BoundVar),
    Pattern { pat: PatternId, vars: Vec<BoundVar> },
}

impl Binder {
    pub fn vars(&self) -> &[BoundVar] {
        match self {
            Binder::Var(v) => std::slice::from_ref(v),
            Binder::Pattern { vars, .. } => vars,
        }
    }

    pub fn vars_mut(&mut self) -> &mut [BoundVar] {
        match self {
            Binder::Var(v) => std::slice::from_mut(v),
            Binder::Pattern { vars, .. } => vars,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BoundVar {
    pub text: SmolStr,
    /// Set for top-level binders.
    pub name: Option<NameId>,
    /// Declared type, kind-checked.
    pub sig: Option<Type>,
    pub fixity: Option<Fixity>,
}

impl BoundVar {
    pub fn new(text: SmolStr) -> Self {
        Self {
            text,
            name: None,
            sig: None,
            fixity: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Alternative {
    pub args: Vec<PatternId>,
    pub rhs: Rhs,
}

#[derive(Clone, Debug)]
pub struct Rhs {
    pub line: Line,
    pub body: RhsBody,
    /// Binding groups of the `where` clause, dependencies first.
    pub locals: Vec<Vec<BindingId>>,
}

/// What a variable occurrence refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarRef {
    /// Bound by an enclosing pattern.
    Local,
    /// A binding of an enclosing `let`, `where` or the top level.
    Binding(BindingId),
    Global(NameId),
    Con(ConRef),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConRef {
    Name(NameId),
    Prim(PrimCon),
}

/// Nested scopes whose binding groups are not attached to a right-hand side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    Let(ExprId),
    /// `let` qualifier `index` of a comprehension or `do` block.
    Qualifier { expr: ExprId, index: usize },
    /// `where` clause of alternative `index` of a `case`.
    CaseAlt { expr: ExprId, index: usize },
}

#[derive(Clone, Debug)]
pub struct ForeignExport {
    pub line: Line,
    pub name: NameId,
    pub entity: SmolStr,
    pub ty: Type,
}

/// Everything produced for one module.
#[derive(Debug)]
pub struct ModuleAnalysis {
    pub module: ModuleId,
    /// The input, with infix chains rewritten into applications.
    pub ast: Module,
    pub bindings: Arena<Binding>,
    /// Top-level binding groups, dependencies first.
    pub groups: Vec<Vec<BindingId>>,
    pub local_groups: HashMap<ScopeKey, Vec<Vec<BindingId>>>,
    pub resolutions: ArenaMap<ExprId, VarRef>,
    pub pattern_cons: ArenaMap<PatternId, ConRef>,
    pub annotations: ArenaMap<ExprId, Type>,
    pub pattern_types: ArenaMap<PatternId, Type>,
    pub tycons: Vec<TyconId>,
    pub classes: Vec<ClassId>,
    pub instances: Vec<InstId>,
    pub derived: Vec<InstId>,
    /// Default method bindings in class member order.
    pub class_defaults: HashMap<ClassId, Vec<Option<BindingId>>>,
    /// Instance member bindings in class member order.
    pub instance_members: HashMap<InstId, Vec<Option<BindingId>>>,
    pub foreign_exports: Vec<ForeignExport>,
}

impl ModuleAnalysis {
    /// The binding that binds `text` at top level.
    pub fn binding(&self, text: &str) -> Option<BindingId> {
        self.groups
            .iter()
            .flatten()
            .copied()
            .find(|&b| self.bindings[b].binder.vars().iter().any(|v| v.text == text))
    }

    /// Binder texts of each top-level group.
    pub fn group_texts(&self) -> Vec<Vec<SmolStr>> {
        self.texts(&self.groups)
    }

    pub fn texts(&self, groups: &[Vec<BindingId>]) -> Vec<Vec<SmolStr>> {
        groups
            .iter()
            .map(|g| {
                g.iter()
                    .flat_map(|&b| self.bindings[b].binder.vars().iter().map(|v| v.text.clone()))
                    .collect()
            })
            .collect()
    }
}

/// Result of analysing one interactive expression.
#[derive(Debug)]
pub struct ExprAnalysis {
    pub ast: Module,
    pub root: ExprId,
    pub bindings: Arena<Binding>,
    pub local_groups: HashMap<ScopeKey, Vec<Vec<BindingId>>>,
    pub resolutions: ArenaMap<ExprId, VarRef>,
    pub pattern_cons: ArenaMap<PatternId, ConRef>,
    pub annotations: ArenaMap<ExprId, Type>,
    pub pattern_types: ArenaMap<PatternId, Type>,
}
