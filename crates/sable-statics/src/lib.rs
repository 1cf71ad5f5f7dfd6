//! Static analysis of Haskell modules.
//!
//! [`Statics`] owns the symbol tables of every module analysed so far. Each
//! call to [`Statics::analyze_module`] resolves one module's imports, checks
//! and kind-infers its types and classes, checks its instances (deriving
//! where asked), resolves infix expressions and scopes, and splits its value
//! bindings into dependency-ordered binding groups. The result is what a
//! type checker consumes next.
//!
//! A unit that fails leaves the tables exactly as they were.

mod bindings;
pub mod builtins;
mod checker;
mod class;
mod depend;
mod derive;
mod error;
mod imports;
pub mod infix;
mod instance;
mod kindcheck;
pub mod kinds;
mod pattern;
mod result;
pub mod scc;
mod sigtype;
mod skeleton;
pub mod tables;
mod tycon;
pub mod types;
pub mod unify;

#[cfg(test)]
mod tests;

use sable_ast::{BuildError, ExprId, Module};
use thiserror::Error;
use tracing::{debug, debug_span};

use crate::checker::Analyzer;

pub use error::{ErrorKind, StaticError, StaticResult};
pub use kinds::Kind;
pub use result::{
    Alternative, Binder, Binding, BindingId, BoundVar, ConRef, ExprAnalysis, ForeignExport, ModuleAnalysis, Rhs,
    ScopeKey, VarRef,
};
pub use skeleton::NUM_OFFSETS;
pub use tables::{ClassId, InstId, ModuleId, NameId, Tables, TyconId};
pub use types::{Pred, Type};

// ── Options ───────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct Options {
    /// Reject everything outside Haskell 98.
    pub haskell98: bool,
    /// Permit overlapping instances when one head is strictly more specific.
    /// Ignored in Haskell 98 mode.
    pub allow_overlap: bool,
    /// Passes the derived-context solver may take before giving up.
    pub derive_iteration_limit: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            haskell98: false,
            allow_overlap: false,
            derive_iteration_limit: 64,
        }
    }
}

impl Options {
    pub fn haskell98(mut self, on: bool) -> Self {
        self.haskell98 = on;
        self
    }

    pub fn allow_overlap(mut self, on: bool) -> Self {
        self.allow_overlap = on;
        self
    }

    pub fn derive_iteration_limit(mut self, limit: usize) -> Self {
        self.derive_iteration_limit = limit;
        self
    }

    pub(crate) fn overlap_allowed(&self) -> bool {
        self.allow_overlap && !self.haskell98
    }
}

#[derive(Debug, Error)]
pub enum PreludeError {
    #[error("building the Prelude: {0}")]
    Build(#[from] BuildError),
    #[error("analysing the Prelude: {0}")]
    Analysis(#[from] StaticError),
}

// ── Statics ───────────────────────────────────────────────────────

/// The universe of analysed modules.
pub struct Statics {
    tables: Tables,
    options: Options,
}

impl Statics {
    /// An empty universe with no Prelude.
    pub fn new(options: Options) -> Self {
        Self {
            tables: Tables::default(),
            options,
        }
    }

    /// A universe holding the built-in Prelude.
    pub fn with_prelude(options: Options) -> Result<Self, PreludeError> {
        let mut statics = Self::new(options);
        let prelude = builtins::prelude()?;
        statics.analyze_module(prelude)?;
        Ok(statics)
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Analyses one module. On failure the tables are restored to their
    /// state before the call.
    pub fn analyze_module(&mut self, ast: Module) -> StaticResult<ModuleAnalysis> {
        if self.tables.find_module(&ast.name).is_some() {
            return Err(StaticError::new(
                ast.line,
                ErrorKind::DuplicateDefinition {
                    what: "module",
                    name: ast.name.to_string(),
                },
            ));
        }
        let snapshot = self.tables.clone();
        let module = self.tables.add_module(ast.name.clone());
        let result = Analyzer::new(&mut self.tables, &self.options, module, ast).run();
        match &result {
            Ok(m) => debug!(module = %self.tables.modules[module].text, groups = m.groups.len(), "module analysed"),
            Err(err) => {
                debug!(%err, "module rejected");
                self.tables = snapshot;
            }
        }
        result
    }

    /// Analyses the expression `root` of `ast` in the scope of the
    /// already-analysed module `module`. The tables are left unchanged.
    pub fn analyze_expr(&mut self, module: &str, ast: Module, root: ExprId) -> StaticResult<ExprAnalysis> {
        let Some(id) = self.tables.find_module(module) else {
            return Err(StaticError::new(
                ast.line,
                ErrorKind::UndefinedModule {
                    name: module.to_string(),
                },
            ));
        };
        let snapshot = self.tables.clone();
        let result = Analyzer::new(&mut self.tables, &self.options, id, ast).run_expr(root);
        self.tables = snapshot;
        result
    }

    /// Expands synonyms in `ty` as seen from binding group `group` of
    /// `analysis`: restricted synonyms of the module open up only in a
    /// group that binds one of the variables they name.
    pub fn expand_in_group(&self, analysis: &ModuleAnalysis, group: &[BindingId], ty: &Type) -> Type {
        let _span = debug_span!("expand_in_group", bindings = group.len()).entered();
        let bound: Vec<&str> = group
            .iter()
            .flat_map(|&b| analysis.bindings[b].binder.vars().iter().map(|v| v.text.as_str()))
            .collect();
        self.tables.expand_with(ty, &|t| {
            let tycon = &self.tables.tycons[t];
            tycon.module == analysis.module && tycon.restricted_to.iter().any(|v| bound.contains(&v.as_str()))
        })
    }

    /// Expands every ordinary synonym in `ty`.
    pub fn full_expand(&self, ty: &Type) -> Type {
        self.tables.full_expand(ty)
    }

    /// Runs `f` against a fresh analyzer for `ast` with its imports in
    /// scope. The tables keep whatever `f` adds.
    #[cfg(test)]
    pub(crate) fn with_analyzer<T>(
        &mut self,
        ast: Module,
        f: impl FnOnce(&mut Analyzer<'_>) -> StaticResult<T>,
    ) -> StaticResult<T> {
        let module = self.tables.add_module(ast.name.clone());
        let mut analyzer = Analyzer::new(&mut self.tables, &self.options, module, ast);
        analyzer.process_imports()?;
        f(&mut analyzer)
    }
}
