//! Import and export lists.

use sable_ast::{Entity, ExportItem, ImportDecl, ImportSpec, Line, SubEntities};
use smol_str::SmolStr;
use tracing::trace;

use crate::checker::Analyzer;
use crate::error::{at, fail, ErrorKind, StaticResult};
use crate::tables::{ClassId, Export, ModuleId, NameId, NameKind, TyconId, TyconWhat};

/// Entities removed by a `hiding` list.
#[derive(Default)]
struct Hidden {
    names: Vec<NameId>,
    tycons: Vec<TyconId>,
    classes: Vec<ClassId>,
}

impl Hidden {
    fn add(&mut self, e: Export) {
        match e {
            Export::Name(n) => self.names.push(n),
            Export::Tycon { id, subs } => {
                self.tycons.push(id);
                self.names.extend(subs);
            }
            Export::Class { id, subs } => {
                self.classes.push(id);
                self.names.extend(subs);
            }
        }
    }

    /// What remains of `e`. A hidden type or class leaves its unhidden
    /// sub-entities importable as plain names.
    fn filter(&self, e: Export) -> Vec<Export> {
        let keep = |subs: Vec<NameId>| -> Vec<NameId> { subs.into_iter().filter(|n| !self.names.contains(n)).collect() };
        match e {
            Export::Name(n) if self.names.contains(&n) => Vec::new(),
            Export::Name(n) => vec![Export::Name(n)],
            Export::Tycon { id, subs } if self.tycons.contains(&id) => keep(subs).into_iter().map(Export::Name).collect(),
            Export::Tycon { id, subs } => vec![Export::Tycon { id, subs: keep(subs) }],
            Export::Class { id, subs } if self.classes.contains(&id) => keep(subs).into_iter().map(Export::Name).collect(),
            Export::Class { id, subs } => vec![Export::Class { id, subs: keep(subs) }],
        }
    }
}

impl Analyzer<'_> {
    // ── Imports ──────────────────────────────────────────────────

    /// Brings imported entities into scope. Every module but the Prelude
    /// imports the Prelude implicitly unless it names it itself.
    pub fn process_imports(&mut self) -> StaticResult<()> {
        let mut imports = self.ast.imports.clone();
        let implicit = self.ast.name != "Prelude"
            && self.tables.find_module("Prelude").is_some()
            && !imports.iter().any(|i| i.module == "Prelude");
        if implicit {
            imports.insert(0, ImportDecl::new(self.ast.line, "Prelude"));
        }
        for imp in &imports {
            self.import(imp)?;
        }
        Ok(())
    }

    fn import(&mut self, imp: &ImportDecl) -> StaticResult<()> {
        let line = imp.line;
        if imp.module == self.ast.name {
            return fail(
                line,
                ErrorKind::RecursiveImport {
                    module: imp.module.to_string(),
                },
            );
        }
        let Some(from) = self.tables.find_module(&imp.module) else {
            return fail(
                line,
                ErrorKind::UndefinedModule {
                    name: imp.module.to_string(),
                },
            );
        };

        let alias = imp.alias.clone().unwrap_or_else(|| imp.module.clone());
        let qualified = &mut self.tables.modules[self.module].qualified;
        if !qualified.contains(&(alias.clone(), from)) {
            qualified.push((alias, from));
        }
        if imp.qualified {
            return Ok(());
        }

        let exports = self.tables.modules[from].exports.clone();
        let selected = match &imp.spec {
            ImportSpec::All => exports,
            ImportSpec::Only(entities) => entities
                .iter()
                .map(|e| self.select_export(line, from, &exports, e))
                .collect::<StaticResult<Vec<_>>>()?,
            ImportSpec::Hiding(entities) => {
                let mut hidden = Hidden::default();
                for e in entities {
                    hidden.add(self.select_hidden(line, from, &exports, e)?);
                }
                exports.into_iter().flat_map(|e| hidden.filter(e)).collect()
            }
        };
        trace!(module = %imp.module, entities = selected.len(), "import");
        for e in &selected {
            self.import_export(line, from, e)?;
        }
        Ok(())
    }

    fn import_export(&mut self, line: Line, from: ModuleId, e: &Export) -> StaticResult<()> {
        let subs = match e {
            Export::Name(n) => std::slice::from_ref(n),
            Export::Tycon { id, subs } => {
                self.tables.import_tycon(self.module, *id, from).map_err(at(line))?;
                subs
            }
            Export::Class { id, subs } => {
                self.tables.import_class(self.module, *id, from).map_err(at(line))?;
                subs
            }
        };
        for &n in subs {
            self.tables.import_name(self.module, n, from).map_err(at(line))?;
        }
        Ok(())
    }

    /// The part of `exports` an import list entry names.
    fn select_export(&self, line: Line, from: ModuleId, exports: &[Export], entity: &Entity) -> StaticResult<Export> {
        let unknown = |name: &SmolStr| ErrorKind::UnknownImportEntity {
            name: name.to_string(),
            module: self.tables.modules[from].text.to_string(),
        };
        match entity {
            Entity::Var(v) => {
                let all = exports.iter().flat_map(|e| match e {
                    Export::Name(n) => vec![*n],
                    Export::Tycon { subs, .. } | Export::Class { subs, .. } => subs.clone(),
                });
                let found = all
                    .filter(|&n| self.tables.names[n].constructor().is_none())
                    .find(|&n| self.tables.names[n].text == v.text);
                match found {
                    Some(n) => Ok(Export::Name(n)),
                    None => fail(line, unknown(&v.text)),
                }
            }
            Entity::Type { name, subs } => {
                for e in exports {
                    match e {
                        Export::Tycon { id, subs: available } if self.tables.tycons[*id].text == name.text => {
                            let subs = self.pick_subs(name.text.as_str(), available, subs, "constructor or field of")
                                .map_err(at(line))?;
                            return Ok(Export::Tycon { id: *id, subs });
                        }
                        Export::Class { id, subs: available } if self.tables.classes[*id].text == name.text => {
                            let subs = self.pick_subs(name.text.as_str(), available, subs, "member of").map_err(at(line))?;
                            return Ok(Export::Class { id: *id, subs });
                        }
                        _ => {}
                    }
                }
                fail(line, unknown(&name.text))
            }
        }
    }

    /// Like [`Self::select_export`], but a bare capitalised name may also
    /// hide a data constructor.
    fn select_hidden(&self, line: Line, from: ModuleId, exports: &[Export], entity: &Entity) -> StaticResult<Export> {
        let err = match self.select_export(line, from, exports, entity) {
            Ok(e) => return Ok(e),
            Err(err) => err,
        };
        if let Entity::Type {
            name,
            subs: SubEntities::None,
        } = entity
        {
            let con = exports
                .iter()
                .filter_map(|e| match e {
                    Export::Tycon { subs, .. } => Some(subs),
                    _ => None,
                })
                .flatten()
                .copied()
                .find(|&n| self.tables.names[n].text == name.text && self.tables.names[n].constructor().is_some());
            if let Some(n) = con {
                return Ok(Export::Name(n));
            }
        }
        Err(err)
    }

    /// Resolves the sub-entity list `T(..)` or `T(c1, c2)` against what
    /// `T` offers.
    fn pick_subs(
        &self,
        parent: &str,
        available: &[NameId],
        subs: &SubEntities,
        relation: &'static str,
    ) -> Result<Vec<NameId>, ErrorKind> {
        match subs {
            SubEntities::None => Ok(Vec::new()),
            SubEntities::All => Ok(available.to_vec()),
            SubEntities::Some(texts) => texts
                .iter()
                .map(|t| {
                    available
                        .iter()
                        .copied()
                        .find(|&n| self.tables.names[n].text == *t)
                        .ok_or_else(|| ErrorKind::NotASubentity {
                            name: t.to_string(),
                            relation,
                            parent: parent.to_string(),
                        })
                })
                .collect(),
        }
    }

    // ── Exports ──────────────────────────────────────────────────

    /// Computes the module's export list. Without an explicit list every
    /// local entity is exported.
    pub fn check_exports(&mut self) -> StaticResult<()> {
        let line = self.ast.line;
        let exports = match self.ast.exports.clone() {
            None => self.local_exports(),
            Some(items) => {
                let mut out = Vec::new();
                for item in &items {
                    let found = match item {
                        ExportItem::Module(m) => self.export_module(line, m)?,
                        ExportItem::Entity(e) => vec![self.export_entity(line, e)?],
                    };
                    for e in found {
                        merge_export(&mut out, e);
                    }
                }
                out
            }
        };
        trace!(count = exports.len(), "exports");
        self.tables.modules[self.module].exports = exports;
        Ok(())
    }

    fn local_exports(&self) -> Vec<Export> {
        let info = &self.tables.modules[self.module];
        let names = info
            .defined_names
            .iter()
            .copied()
            .filter(|&n| {
                matches!(
                    self.tables.names[n].kind,
                    NameKind::Function | NameKind::ForeignImport { .. }
                )
            })
            .map(Export::Name);
        let tycons = info.defined_tycons.iter().map(|&id| Export::Tycon {
            id,
            subs: self.tables.tycon_subentities(id),
        });
        let classes = info.defined_classes.iter().map(|&id| Export::Class {
            id,
            subs: self.tables.classes[id].members.clone(),
        });
        names.chain(tycons).chain(classes).collect()
    }

    /// `module M`: the module itself, or everything in scope unqualified
    /// that came from modules imported as `M`.
    fn export_module(&self, line: Line, m: &SmolStr) -> StaticResult<Vec<Export>> {
        if *m == self.ast.name {
            return Ok(self.local_exports());
        }
        let sources: Vec<ModuleId> = self.tables.modules[self.module]
            .qualified
            .iter()
            .filter(|(alias, _)| alias == m)
            .map(|&(_, id)| id)
            .collect();
        if sources.is_empty() {
            return fail(
                line,
                ErrorKind::UnknownExportModule {
                    name: m.to_string(),
                    module: self.module_text(),
                },
            );
        }
        let in_scope = |n: NameId| self.tables.lookup_name(self.module, &self.tables.names[n].text) == Some(n);
        let mut out = Vec::new();
        for source in sources {
            for e in &self.tables.modules[source].exports {
                let visible = match e {
                    Export::Name(n) => in_scope(*n).then_some(Export::Name(*n)),
                    Export::Tycon { id, subs } => (self.tables.lookup_tycon(self.module, &self.tables.tycons[*id].text)
                        == Some(*id))
                    .then(|| Export::Tycon {
                        id: *id,
                        subs: subs.iter().copied().filter(|&n| in_scope(n)).collect(),
                    }),
                    Export::Class { id, subs } => (self.tables.lookup_class(self.module, &self.tables.classes[*id].text)
                        == Some(*id))
                    .then(|| Export::Class {
                        id: *id,
                        subs: subs.iter().copied().filter(|&n| in_scope(n)).collect(),
                    }),
                };
                out.extend(visible);
            }
        }
        Ok(out)
    }

    fn export_entity(&self, line: Line, entity: &Entity) -> StaticResult<Export> {
        let module = self.module_text();
        let unknown = |name: &sable_ast::Ident| ErrorKind::UnknownExportEntity {
            name: name.to_string(),
            module: self.module_text(),
        };
        match entity {
            Entity::Var(v) => match self.tables.find_name(self.module, v) {
                Some(n) if self.tables.names[n].constructor().is_none() => Ok(Export::Name(n)),
                _ => fail(line, unknown(v)),
            },
            Entity::Type { name, subs } => {
                if let Some(id) = self.tables.find_tycon(self.module, name) {
                    let t = &self.tables.tycons[id];
                    if t.what.is_synonym() {
                        return match subs {
                            SubEntities::Some(_) => fail(
                                line,
                                ErrorKind::SynonymConstructorList {
                                    name: name.to_string(),
                                    module,
                                },
                            ),
                            SubEntities::All if matches!(t.what, TyconWhat::RestrictedSynonym) => fail(
                                line,
                                ErrorKind::RestrictedSynonymExport {
                                    name: name.to_string(),
                                    module,
                                },
                            ),
                            _ => Ok(Export::Tycon { id, subs: Vec::new() }),
                        };
                    }
                    let available = self.tables.tycon_subentities(id);
                    let subs = self
                        .pick_subs(name.text.as_str(), &available, subs, "constructor or field of")
                        .map_err(at(line))?;
                    return Ok(Export::Tycon { id, subs });
                }
                if let Some(id) = self.tables.find_class(self.module, name) {
                    let available = self.tables.classes[id].members.clone();
                    let subs = self.pick_subs(name.text.as_str(), &available, subs, "member of").map_err(at(line))?;
                    return Ok(Export::Class { id, subs });
                }
                if *subs != SubEntities::None && self.tables.find_name(self.module, name).is_some() {
                    return fail(
                        line,
                        ErrorKind::ExportListForNonType {
                            name: name.to_string(),
                            module,
                        },
                    );
                }
                fail(line, unknown(name))
            }
        }
    }
}

/// Adds `e` to `out`, joining the sub-entities of repeated types and
/// classes.
fn merge_export(out: &mut Vec<Export>, e: Export) {
    fn join(subs: &mut Vec<NameId>, more: &[NameId]) {
        for &n in more {
            if !subs.contains(&n) {
                subs.push(n);
            }
        }
    }
    for have in out.iter_mut() {
        match (have, &e) {
            (Export::Name(a), Export::Name(b)) if *a == *b => return,
            (Export::Tycon { id: a, subs }, Export::Tycon { id: b, subs: more }) if *a == *b => {
                join(subs, more);
                return;
            }
            (Export::Class { id: a, subs }, Export::Class { id: b, subs: more }) if *a == *b => {
                join(subs, more);
                return;
            }
            _ => {}
        }
    }
    out.push(e);
}

#[cfg(test)]
mod tests {
    use crate::tables::Export;
    use crate::{Options, Statics};
    use sable_ast::{Entity, ExportItem, ImportDecl, ModuleBuilder};

    /// Module `A` with `data T = C Int | D`, `f = 1` and `g = f`.
    fn with_a(exports: Option<Vec<ExportItem>>) -> Statics {
        let mut statics = Statics::with_prelude(Options::default()).unwrap();
        let mut b = ModuleBuilder::new("A");
        if let Some(items) = exports {
            b.exports(items);
        }
        let t = b.data("T", &["C Int", "D"]);
        b.push(t);
        let (one, f) = (b.int(1), b.var("f"));
        let decls = [b.fun("f", vec![], one), b.fun("g", vec![], f)];
        for d in decls {
            b.push(d);
        }
        statics.analyze_module(b.finish().unwrap()).unwrap();
        statics
    }

    fn importing(statics: &mut Statics, name: &str, import: ImportDecl, body: &str) -> Result<(), String> {
        let mut b = ModuleBuilder::new(name);
        b.import(import);
        let e = b.var(body);
        let decl = b.fun("h", vec![], e);
        b.push(decl);
        statics
            .analyze_module(b.finish().unwrap())
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    #[test]
    fn default_exports_are_the_local_entities() {
        let statics = with_a(None);
        let tables = statics.tables();
        let a = tables.find_module("A").unwrap();
        let exports = &tables.modules[a].exports;
        assert_eq!(exports.len(), 3);
        assert!(exports.iter().any(|e| matches!(e, Export::Tycon { subs, .. } if subs.len() == 2)));
    }

    #[test]
    fn qualified_imports_need_the_qualifier() {
        let mut statics = with_a(None);
        let imp = ImportDecl::new(1, "A").qualified().alias("X");
        assert_eq!(importing(&mut statics, "B1", imp.clone(), "X.f"), Ok(()));
        let err = importing(&mut statics, "B2", imp, "f").unwrap_err();
        insta::assert_snapshot!(err, @r#"line 1: undefined variable "f""#);
    }

    #[test]
    fn hiding_and_only_lists() {
        let mut statics = with_a(None);
        let hide = ImportDecl::new(1, "A").hiding(vec![Entity::var("g")]);
        assert_eq!(importing(&mut statics, "B3", hide.clone(), "f"), Ok(()));
        assert!(importing(&mut statics, "B4", hide, "g").is_err());

        let only = ImportDecl::new(1, "A").only(vec![Entity::ty_with("T", &["D"])]);
        assert!(importing(&mut statics, "B5", only.clone(), "f").is_err());

        let bad = ImportDecl::new(1, "A").only(vec![Entity::var("nope")]);
        let err = importing(&mut statics, "B6", bad, "f").unwrap_err();
        insta::assert_snapshot!(err, @r#"line 1: unknown entity "nope" imported from module "A""#);

        let bad = ImportDecl::new(1, "A").only(vec![Entity::ty_with("T", &["E"])]);
        let err = importing(&mut statics, "B7", bad, "f").unwrap_err();
        insta::assert_snapshot!(err, @r#"line 1: entity "E" is not a constructor or field of "T""#);
    }

    #[test]
    fn export_list_limits_what_is_visible() {
        let mut statics = with_a(Some(vec![ExportItem::Entity(Entity::ty("T")), ExportItem::Entity(Entity::var("g"))]));
        assert_eq!(importing(&mut statics, "B8", ImportDecl::new(1, "A"), "g"), Ok(()));
        assert!(importing(&mut statics, "B9", ImportDecl::new(1, "A"), "f").is_err());
    }

    #[test]
    fn bad_export_lists() {
        let mut statics = Statics::with_prelude(Options::default()).unwrap();
        let mut b = ModuleBuilder::new("A");
        b.exports(vec![ExportItem::Entity(Entity::ty_with("S", &["X"]))]);
        let s = b.synonym("S", "Int");
        b.push(s);
        let err = statics.analyze_module(b.finish().unwrap()).unwrap_err();
        insta::assert_snapshot!(err.to_string(), @r#"line 1: explicit constructor list given for type synonym "S" in export list of module "A""#);

        let mut b = ModuleBuilder::new("A");
        b.exports(vec![ExportItem::Module("Missing".into())]);
        let err = statics.analyze_module(b.finish().unwrap()).unwrap_err();
        insta::assert_snapshot!(err.to_string(), @r#"line 1: unknown module "Missing" exported from module "A""#);
    }

    #[test]
    fn reexport_through_module_item() {
        let mut statics = with_a(None);
        let mut b = ModuleBuilder::new("B");
        b.import(ImportDecl::new(1, "A"));
        b.exports(vec![ExportItem::Module("A".into())]);
        statics.analyze_module(b.finish().unwrap()).unwrap();
        let mut c = ModuleBuilder::new("C");
        c.import(ImportDecl::new(1, "B"));
        let e = c.var("g");
        let decl = c.fun("h", vec![], e);
        c.push(decl);
        statics.analyze_module(c.finish().unwrap()).unwrap();
    }

    #[test]
    fn self_import_is_recursive() {
        let mut statics = Statics::with_prelude(Options::default()).unwrap();
        let mut b = ModuleBuilder::new("A");
        b.import(ImportDecl::new(1, "A"));
        let err = statics.analyze_module(b.finish().unwrap()).unwrap_err();
        insta::assert_snapshot!(err.to_string(), @r#"line 1: recursive import dependency on module "A""#);
    }
}
