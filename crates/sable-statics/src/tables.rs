//! Symbol tables: the single owning store for every Name, Tycon, Class,
//! Inst and module record. Everything else refers to entities by handle.

use la_arena::{Arena, Idx};
use sable_ast::{Fixity, Ident, Line};
use smol_str::SmolStr;
use std::collections::HashMap;

use crate::error::ErrorKind;
use crate::kinds::Kind;
use crate::types::{Pred, Type};

pub type NameId = Idx<Name>;
pub type TyconId = Idx<Tycon>;
pub type ClassId = Idx<Class>;
pub type InstId = Idx<Inst>;
pub type ModuleId = Idx<ModuleInfo>;

// ── Names ─────────────────────────────────────────────────────────

/// A value-level entity.
#[derive(Clone, Debug)]
pub struct Name {
    pub text: SmolStr,
    pub module: ModuleId,
    pub line: Line,
    pub arity: usize,
    pub kind: NameKind,
    /// Declared type, with bound variables as offsets.
    pub ty: Option<Type>,
    pub fixity: Option<Fixity>,
}

#[derive(Clone, Debug)]
pub enum NameKind {
    /// Reserved but not yet defined.
    Placeholder,
    Function,
    Constructor(ConstructorInfo),
    /// Field selector; maps each constructor with the field to its position.
    Selector {
        tycon: TyconId,
        fields: Vec<(NameId, usize)>,
    },
    Member { class: ClassId, index: usize },
    DictSelector { class: ClassId, index: usize },
    DictConstructor { class: ClassId, single_entry: bool },
    DictBuilder { class: ClassId },
    InstBuilder { inst: InstId },
    ForeignImport { entity: SmolStr },
    ForeignExport { entity: SmolStr },
}

#[derive(Clone, Debug)]
pub struct ConstructorInfo {
    pub tycon: TyconId,
    pub index: usize,
    /// Constraints on existential variables. Each adds a dictionary argument.
    pub local_context: Vec<Pred>,
    pub strict_fields: Vec<usize>,
    /// Position of the last polymorphic component, if any.
    pub rank2: Option<usize>,
    pub existentials: usize,
    /// Field labels by position.
    pub labels: Vec<Option<SmolStr>>,
}

impl Name {
    pub fn placeholder(text: SmolStr, module: ModuleId, line: Line) -> Self {
        Self {
            text,
            module,
            line,
            arity: 0,
            kind: NameKind::Placeholder,
            ty: None,
            fixity: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.kind, NameKind::Placeholder)
    }

    pub fn constructor(&self) -> Option<&ConstructorInfo> {
        match &self.kind {
            NameKind::Constructor(info) => Some(info),
            _ => None,
        }
    }

    /// Arity as seen by patterns: dictionary arguments excluded.
    pub fn user_arity(&self) -> usize {
        match &self.kind {
            NameKind::Constructor(info) => self.arity - info.local_context.len(),
            _ => self.arity,
        }
    }
}

/// Constructors built into the language rather than declared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimCon {
    Nil,
    Cons,
    Unit,
    Tuple(usize),
}

impl PrimCon {
    pub fn from_text(text: &str) -> Option<PrimCon> {
        match text {
            "[]" => Some(PrimCon::Nil),
            ":" => Some(PrimCon::Cons),
            "()" => Some(PrimCon::Unit),
            _ => sable_ast::tuple_con_arity(text).map(PrimCon::Tuple),
        }
    }

    pub fn arity(self) -> usize {
        match self {
            PrimCon::Nil | PrimCon::Unit => 0,
            PrimCon::Cons => 2,
            PrimCon::Tuple(n) => n,
        }
    }

    pub fn fixity(self) -> Fixity {
        match self {
            PrimCon::Cons => Fixity::new(sable_ast::Assoc::Right, 5),
            _ => Fixity::DEFAULT,
        }
    }
}

// ── Type constructors ─────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TyconWhat {
    Data,
    Newtype,
    Synonym,
    /// Synonym that is transparent only in the bindings it names.
    RestrictedSynonym,
}

impl TyconWhat {
    pub fn is_synonym(self) -> bool {
        matches!(self, TyconWhat::Synonym | TyconWhat::RestrictedSynonym)
    }
}

#[derive(Clone, Debug)]
pub enum TyconBody {
    /// Registered, body not yet resolved.
    Pending,
    Constructors(Vec<NameId>),
    Synonym(Type),
}

#[derive(Clone, Debug)]
pub struct Tycon {
    pub text: SmolStr,
    pub module: ModuleId,
    pub line: Line,
    pub arity: usize,
    pub what: TyconWhat,
    pub kind: Kind,
    pub body: TyconBody,
    /// Datatype context, as written.
    pub context: Vec<Pred>,
    pub selectors: Vec<NameId>,
    /// Variables a restricted synonym is transparent for.
    pub restricted_to: Vec<SmolStr>,
}

impl Tycon {
    pub fn constructors(&self) -> &[NameId] {
        match &self.body {
            TyconBody::Constructors(cs) => cs,
            _ => &[],
        }
    }

    pub fn synonym_body(&self) -> Option<&Type> {
        match &self.body {
            TyconBody::Synonym(t) => Some(t),
            _ => None,
        }
    }
}

// ── Classes and instances ─────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct Class {
    pub text: SmolStr,
    pub module: ModuleId,
    pub line: Line,
    pub arity: usize,
    /// `C o0 .. on-1`
    pub head: Pred,
    pub supers: Vec<Pred>,
    pub kinds: Vec<Kind>,
    pub members: Vec<NameId>,
    /// Most specific first.
    pub instances: Vec<InstId>,
    /// Depth in the superclass hierarchy. Zero until visited.
    pub level: u32,
    pub dict_selectors: Vec<NameId>,
    pub dict_constructor: Option<NameId>,
    pub dict_builder: Option<NameId>,
}

#[derive(Clone, Debug)]
pub struct Inst {
    pub class: ClassId,
    pub module: ModuleId,
    pub line: Line,
    pub head: Pred,
    pub context: Vec<Pred>,
    pub kinds: Vec<Kind>,
    pub builder: Option<NameId>,
    pub derived: bool,
    /// Members a derived instance must supply.
    pub derived_members: Vec<NameId>,
}

// ── Modules ───────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Export {
    Name(NameId),
    /// A type with the constructors and selectors exported alongside.
    Tycon { id: TyconId, subs: Vec<NameId> },
    /// A class with the members exported alongside.
    Class { id: ClassId, subs: Vec<NameId> },
}

#[derive(Clone, Debug, Default)]
pub struct ModuleInfo {
    pub text: SmolStr,
    /// Unqualified names in scope, local and imported.
    pub names: HashMap<SmolStr, NameId>,
    pub tycons: HashMap<SmolStr, TyconId>,
    pub classes: HashMap<SmolStr, ClassId>,
    /// Alias → module, for qualified lookup.
    pub qualified: Vec<(SmolStr, ModuleId)>,
    pub exports: Vec<Export>,
    pub defined_names: Vec<NameId>,
    pub defined_tycons: Vec<TyconId>,
    pub defined_classes: Vec<ClassId>,
    pub instances: Vec<InstId>,
    /// Types tried, in order, when defaulting ambiguous numeric types.
    pub defaults: Vec<Type>,
}

// ── Tables ────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default)]
pub struct Tables {
    pub names: Arena<Name>,
    pub tycons: Arena<Tycon>,
    pub classes: Arena<Class>,
    pub insts: Arena<Inst>,
    pub modules: Arena<ModuleInfo>,
    module_index: HashMap<SmolStr, ModuleId>,
}

impl Tables {
    pub fn add_module(&mut self, text: SmolStr) -> ModuleId {
        let id = self.modules.alloc(ModuleInfo {
            text: text.clone(),
            ..ModuleInfo::default()
        });
        self.module_index.insert(text, id);
        id
    }

    pub fn find_module(&self, text: &str) -> Option<ModuleId> {
        self.module_index.get(text).copied()
    }

    // ── Declaration ───────────────────────────────────────────────

    /// Returns the placeholder for `text` in `module`, creating one if needed.
    /// Fails if a defined entity already owns the text.
    pub fn declare_name(
        &mut self,
        module: ModuleId,
        text: &SmolStr,
        line: Line,
        what: &'static str,
    ) -> Result<NameId, ErrorKind> {
        if let Some(&id) = self.modules[module].names.get(text) {
            let existing = &self.names[id];
            return if existing.is_placeholder() {
                Ok(id)
            } else if existing.module != module {
                Err(ErrorKind::ClashesWithImport {
                    what,
                    name: text.to_string(),
                })
            } else {
                Err(ErrorKind::DuplicateDefinition {
                    what,
                    name: text.to_string(),
                })
            };
        }
        let id = self.names.alloc(Name::placeholder(text.clone(), module, line));
        let info = &mut self.modules[module];
        info.names.insert(text.clone(), id);
        info.defined_names.push(id);
        Ok(id)
    }

    /// Creates a compiler-generated name. It is not entered in any scope.
    pub fn generated_name(&mut self, module: ModuleId, text: String, line: Line, arity: usize, kind: NameKind) -> NameId {
        let mut name = Name::placeholder(SmolStr::new(text), module, line);
        name.arity = arity;
        name.kind = kind;
        self.names.alloc(name)
    }

    fn check_type_namespace(&self, module: ModuleId, text: &SmolStr, what: &'static str) -> Result<(), ErrorKind> {
        let info = &self.modules[module];
        let existing_module = info
            .tycons
            .get(text)
            .map(|&t| self.tycons[t].module)
            .or_else(|| info.classes.get(text).map(|&c| self.classes[c].module));
        match existing_module {
            None => Ok(()),
            Some(m) if m != module => Err(ErrorKind::ClashesWithImport {
                what,
                name: text.to_string(),
            }),
            Some(_) if what == "class" && info.tycons.contains_key(text) => Err(ErrorKind::NameClash {
                name: text.to_string(),
            }),
            Some(_) if what != "class" && info.classes.contains_key(text) => Err(ErrorKind::NameClash {
                name: text.to_string(),
            }),
            Some(_) => Err(ErrorKind::DuplicateDefinition {
                what,
                name: text.to_string(),
            }),
        }
    }

    pub fn declare_tycon(
        &mut self,
        module: ModuleId,
        text: &SmolStr,
        line: Line,
        arity: usize,
        what: TyconWhat,
    ) -> Result<TyconId, ErrorKind> {
        let description = match what {
            TyconWhat::Data | TyconWhat::Newtype => "type constructor",
            TyconWhat::Synonym | TyconWhat::RestrictedSynonym => "type synonym",
        };
        self.check_type_namespace(module, text, description)?;
        let id = self.tycons.alloc(Tycon {
            text: text.clone(),
            module,
            line,
            arity,
            what,
            kind: Kind::simple(arity),
            body: TyconBody::Pending,
            context: Vec::new(),
            selectors: Vec::new(),
            restricted_to: Vec::new(),
        });
        let info = &mut self.modules[module];
        info.tycons.insert(text.clone(), id);
        info.defined_tycons.push(id);
        Ok(id)
    }

    pub fn declare_class(&mut self, module: ModuleId, text: &SmolStr, line: Line, arity: usize) -> Result<ClassId, ErrorKind> {
        self.check_type_namespace(module, text, "class")?;
        let id = self.classes.alloc(Class {
            text: text.clone(),
            module,
            line,
            arity,
            head: Pred {
                class: crate::types::ClassRef::Ident(Ident::unqual(text.clone())),
                args: Vec::new(),
            },
            supers: Vec::new(),
            kinds: vec![Kind::Star; arity],
            members: Vec::new(),
            instances: Vec::new(),
            level: 0,
            dict_selectors: Vec::new(),
            dict_constructor: None,
            dict_builder: None,
        });
        self.classes[id].head = Pred::new(id, (0..arity).map(Type::Offset).collect());
        let info = &mut self.modules[module];
        info.classes.insert(text.clone(), id);
        info.defined_classes.push(id);
        Ok(id)
    }

    // ── Importing ─────────────────────────────────────────────────

    pub fn import_name(&mut self, module: ModuleId, id: NameId, from: ModuleId) -> Result<(), ErrorKind> {
        let text = self.names[id].text.clone();
        match self.modules[module].names.get(&text) {
            Some(&existing) if existing == id => Ok(()),
            Some(_) => Err(ErrorKind::ImportClash {
                what: "variable",
                name: text.to_string(),
                module: self.modules[from].text.to_string(),
            }),
            None => {
                self.modules[module].names.insert(text, id);
                Ok(())
            }
        }
    }

    pub fn import_tycon(&mut self, module: ModuleId, id: TyconId, from: ModuleId) -> Result<(), ErrorKind> {
        let text = self.tycons[id].text.clone();
        let info = &self.modules[module];
        if info.classes.contains_key(&text) {
            return Err(ErrorKind::NameClash { name: text.to_string() });
        }
        match info.tycons.get(&text) {
            Some(&existing) if existing == id => Ok(()),
            Some(_) => Err(ErrorKind::ImportClash {
                what: "type constructor",
                name: text.to_string(),
                module: self.modules[from].text.to_string(),
            }),
            None => {
                self.modules[module].tycons.insert(text, id);
                Ok(())
            }
        }
    }

    pub fn import_class(&mut self, module: ModuleId, id: ClassId, from: ModuleId) -> Result<(), ErrorKind> {
        let text = self.classes[id].text.clone();
        let info = &self.modules[module];
        if info.tycons.contains_key(&text) {
            return Err(ErrorKind::NameClash { name: text.to_string() });
        }
        match info.classes.get(&text) {
            Some(&existing) if existing == id => Ok(()),
            Some(_) => Err(ErrorKind::ImportClash {
                what: "class",
                name: text.to_string(),
                module: self.modules[from].text.to_string(),
            }),
            None => {
                self.modules[module].classes.insert(text, id);
                Ok(())
            }
        }
    }

    // ── Lookup ────────────────────────────────────────────────────

    pub fn lookup_name(&self, module: ModuleId, text: &str) -> Option<NameId> {
        self.modules[module].names.get(text).copied()
    }

    pub fn lookup_tycon(&self, module: ModuleId, text: &str) -> Option<TyconId> {
        self.modules[module].tycons.get(text).copied()
    }

    pub fn lookup_class(&self, module: ModuleId, text: &str) -> Option<ClassId> {
        self.modules[module].classes.get(text).copied()
    }

    /// Modules reachable through qualifier `alias` from `module`.
    fn aliased<'a>(&'a self, module: ModuleId, alias: &'a str) -> impl Iterator<Item = ModuleId> + 'a {
        let own = (self.modules[module].text == alias).then_some(module);
        own.into_iter().chain(
            self.modules[module]
                .qualified
                .iter()
                .filter(move |(a, _)| a == alias)
                .map(|&(_, m)| m),
        )
    }

    /// Names a module makes visible to importers, sub-entities included.
    pub fn exported_names(&self, module: ModuleId) -> impl Iterator<Item = NameId> + '_ {
        self.modules[module].exports.iter().flat_map(|e| match e {
            Export::Name(n) => vec![*n],
            Export::Tycon { subs, .. } | Export::Class { subs, .. } => subs.clone(),
        })
    }

    pub fn find_name(&self, module: ModuleId, ident: &Ident) -> Option<NameId> {
        let Some(q) = &ident.qualifier else {
            return self.lookup_name(module, &ident.text);
        };
        self.aliased(module, q).find_map(|m| {
            if m == module {
                self.modules[m]
                    .defined_names
                    .iter()
                    .copied()
                    .find(|&n| self.names[n].text == ident.text)
            } else {
                self.exported_names(m).find(|&n| self.names[n].text == ident.text)
            }
        })
    }

    pub fn find_tycon(&self, module: ModuleId, ident: &Ident) -> Option<TyconId> {
        let Some(q) = &ident.qualifier else {
            return self.lookup_tycon(module, &ident.text);
        };
        self.aliased(module, q).find_map(|m| {
            if m == module {
                self.modules[m]
                    .defined_tycons
                    .iter()
                    .copied()
                    .find(|&t| self.tycons[t].text == ident.text)
            } else {
                self.modules[m].exports.iter().find_map(|e| match e {
                    Export::Tycon { id, .. } if self.tycons[*id].text == ident.text => Some(*id),
                    _ => None,
                })
            }
        })
    }

    pub fn find_class(&self, module: ModuleId, ident: &Ident) -> Option<ClassId> {
        let Some(q) = &ident.qualifier else {
            return self.lookup_class(module, &ident.text);
        };
        self.aliased(module, q).find_map(|m| {
            if m == module {
                self.modules[m]
                    .defined_classes
                    .iter()
                    .copied()
                    .find(|&c| self.classes[c].text == ident.text)
            } else {
                self.modules[m].exports.iter().find_map(|e| match e {
                    Export::Class { id, .. } if self.classes[*id].text == ident.text => Some(*id),
                    _ => None,
                })
            }
        })
    }

    /// Every constructor and selector of a datatype.
    pub fn tycon_subentities(&self, tycon: TyconId) -> Vec<NameId> {
        let t = &self.tycons[tycon];
        t.constructors().iter().chain(t.selectors.iter()).copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declare_name_reuses_placeholder_and_rejects_redefinition() {
        let mut t = Tables::default();
        let m = t.add_module("M".into());
        let x: SmolStr = "x".into();
        let id = t.declare_name(m, &x, 1, "variable").unwrap();
        assert_eq!(t.declare_name(m, &x, 2, "variable").unwrap(), id);
        t.names[id].kind = NameKind::Function;
        let err = t.declare_name(m, &x, 3, "variable").unwrap_err();
        insta::assert_snapshot!(err.to_string(), @r#"repeated definition of variable "x""#);
    }

    #[test]
    fn classes_and_tycons_share_a_namespace() {
        let mut t = Tables::default();
        let m = t.add_module("M".into());
        let name: SmolStr = "T".into();
        t.declare_tycon(m, &name, 1, 0, TyconWhat::Data).unwrap();
        let err = t.declare_class(m, &name, 2, 1).unwrap_err();
        insta::assert_snapshot!(err.to_string(), @r#""T" used as both class and type constructor"#);
        let err = t.declare_tycon(m, &name, 3, 0, TyconWhat::Synonym).unwrap_err();
        insta::assert_snapshot!(err.to_string(), @r#"repeated definition of type synonym "T""#);
    }

    #[test]
    fn qualified_lookup_goes_through_exports() {
        let mut t = Tables::default();
        let a = t.add_module("A".into());
        let b = t.add_module("B".into());
        let f: SmolStr = "f".into();
        let g: SmolStr = "g".into();
        let fid = t.declare_name(a, &f, 1, "variable").unwrap();
        t.declare_name(a, &g, 1, "variable").unwrap();
        t.modules[a].exports.push(Export::Name(fid));
        t.modules[b].qualified.push(("X".into(), a));
        assert_eq!(t.find_name(b, &Ident::qual("X", "f")), Some(fid));
        assert_eq!(t.find_name(b, &Ident::qual("X", "g")), None);
        assert_eq!(t.find_name(b, &Ident::qual("A", "f")), None);
    }
}
