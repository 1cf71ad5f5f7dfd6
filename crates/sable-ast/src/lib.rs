pub mod builder;

use la_arena::{Arena, Idx};
use smol_str::SmolStr;
use std::fmt;

pub use builder::{BuildError, ModuleBuilder};

/// Source line number. Line 0 marks synthesized declarations.
pub type Line = u32;

// ── ID types ──────────────────────────────────────────────────────

pub type ExprId = Idx<Expr>;
pub type TypeExprId = Idx<TypeExpr>;
pub type PatternId = Idx<Pattern>;

// ── Identifiers ───────────────────────────────────────────────────

/// An identifier as written in source, possibly qualified: `M.x`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident {
    pub qualifier: Option<SmolStr>,
    pub text: SmolStr,
}

impl Ident {
    pub fn unqual(text: impl Into<SmolStr>) -> Self {
        Self {
            qualifier: None,
            text: text.into(),
        }
    }

    pub fn qual(module: impl Into<SmolStr>, text: impl Into<SmolStr>) -> Self {
        Self {
            qualifier: Some(module.into()),
            text: text.into(),
        }
    }

    /// Splits `M.N.x` into qualifier `M.N` and text `x`. Operators such as
    /// `.` or `M..` keep their dots.
    pub fn parse(src: &str) -> Self {
        if let Some(pos) = src.rfind('.') {
            let (module, rest) = (&src[..pos], &src[pos + 1..]);
            let module_ok = module
                .split('.')
                .all(|seg| seg.chars().next().is_some_and(|c| c.is_ascii_uppercase()));
            if module_ok && !rest.is_empty() {
                return Self::qual(module, rest);
            }
        }
        Self::unqual(src)
    }

    pub fn is_qualified(&self) -> bool {
        self.qualifier.is_some()
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(m) => write!(f, "{}.{}", m, self.text),
            None => write!(f, "{}", self.text),
        }
    }
}

/// Text of the tuple constructor of the given arity: `(,)`, `(,,)`, ...
pub fn tuple_con_text(arity: usize) -> SmolStr {
    let mut s = String::from("(");
    for _ in 1..arity {
        s.push(',');
    }
    s.push(')');
    SmolStr::new(s)
}

/// Arity of a tuple constructor text such as `(,,)`.
pub fn tuple_con_arity(text: &str) -> Option<usize> {
    let inner = text.strip_prefix('(')?.strip_suffix(')')?;
    if !inner.is_empty() && inner.chars().all(|c| c == ',') {
        Some(inner.len() + 1)
    } else {
        None
    }
}

// ── Module ────────────────────────────────────────────────────────

/// A parsed module: header, imports and top-level declarations, with
/// expressions, patterns and type expressions stored in arenas.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: SmolStr,
    pub line: Line,
    /// `None` when the header has no export list.
    pub exports: Option<Vec<ExportItem>>,
    pub imports: Vec<ImportDecl>,
    pub decls: Vec<Decl>,
    pub exprs: Arena<Expr>,
    pub type_exprs: Arena<TypeExpr>,
    pub patterns: Arena<Pattern>,
}

impl Module {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            line: 1,
            exports: None,
            imports: Vec::new(),
            decls: Vec::new(),
            exprs: Arena::new(),
            type_exprs: Arena::new(),
            patterns: Arena::new(),
        }
    }
}

// ── Imports and exports ───────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ImportDecl {
    pub line: Line,
    pub module: SmolStr,
    pub qualified: bool,
    pub alias: Option<SmolStr>,
    pub spec: ImportSpec,
}

impl ImportDecl {
    pub fn new(line: Line, module: impl Into<SmolStr>) -> Self {
        Self {
            line,
            module: module.into(),
            qualified: false,
            alias: None,
            spec: ImportSpec::All,
        }
    }

    pub fn qualified(mut self) -> Self {
        self.qualified = true;
        self
    }

    pub fn alias(mut self, alias: impl Into<SmolStr>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn only(mut self, entities: Vec<Entity>) -> Self {
        self.spec = ImportSpec::Only(entities);
        self
    }

    pub fn hiding(mut self, entities: Vec<Entity>) -> Self {
        self.spec = ImportSpec::Hiding(entities);
        self
    }
}

#[derive(Debug, Clone)]
pub enum ImportSpec {
    All,
    Only(Vec<Entity>),
    Hiding(Vec<Entity>),
}

/// One entry of an import or export list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    /// A variable or operator: `x`, `(+)`.
    Var(Ident),
    /// A type or class, with its sub-entity list.
    Type { name: Ident, subs: SubEntities },
}

impl Entity {
    pub fn var(name: &str) -> Self {
        Entity::Var(Ident::parse(name))
    }

    /// `T` with no sub-entities.
    pub fn ty(name: &str) -> Self {
        Entity::Type {
            name: Ident::parse(name),
            subs: SubEntities::None,
        }
    }

    /// `T(..)`
    pub fn ty_all(name: &str) -> Self {
        Entity::Type {
            name: Ident::parse(name),
            subs: SubEntities::All,
        }
    }

    /// `T(c1, c2)`
    pub fn ty_with(name: &str, subs: &[&str]) -> Self {
        Entity::Type {
            name: Ident::parse(name),
            subs: SubEntities::Some(subs.iter().map(|s| SmolStr::new(s)).collect()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubEntities {
    None,
    All,
    Some(Vec<SmolStr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportItem {
    Entity(Entity),
    /// `module M`
    Module(SmolStr),
}

// ── Top-level declarations ────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Decl {
    Data(DataDecl),
    Synonym(SynonymDecl),
    Class(ClassDecl),
    Instance(InstanceDecl),
    Default(DefaultDecl),
    Foreign(ForeignDecl),
    Value(ValueDecl),
}

impl Decl {
    pub fn line(&self) -> Line {
        match self {
            Decl::Data(d) => d.line,
            Decl::Synonym(d) => d.line,
            Decl::Class(d) => d.line,
            Decl::Instance(d) => d.line,
            Decl::Default(d) => d.line,
            Decl::Foreign(d) => d.line,
            Decl::Value(d) => d.line(),
        }
    }
}

macro_rules! decl_from {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Decl {
            fn from(d: $ty) -> Self {
                Decl::$variant(d)
            }
        })*
    };
}

decl_from! {
    DataDecl => Data,
    SynonymDecl => Synonym,
    ClassDecl => Class,
    InstanceDecl => Instance,
    DefaultDecl => Default,
    ForeignDecl => Foreign,
    ValueDecl => Value,
}

/// `data` or `newtype` declaration.
#[derive(Debug, Clone)]
pub struct DataDecl {
    pub line: Line,
    pub is_newtype: bool,
    pub context: Vec<PredExpr>,
    pub name: SmolStr,
    pub params: Vec<SmolStr>,
    pub constructors: Vec<ConstrDecl>,
    pub deriving: Vec<Ident>,
}

impl DataDecl {
    pub fn deriving(mut self, classes: &[&str]) -> Self {
        self.deriving = classes.iter().map(|c| Ident::parse(c)).collect();
        self
    }

    pub fn context(mut self, context: Vec<PredExpr>) -> Self {
        self.context = context;
        self
    }
}

/// One constructor alternative: `forall e. Show e => MkT e !Int`.
#[derive(Debug, Clone)]
pub struct ConstrDecl {
    pub line: Line,
    pub name: SmolStr,
    /// Existentially quantified variables.
    pub quantified: Vec<SmolStr>,
    pub context: Vec<PredExpr>,
    pub fields: ConstrFields,
}

#[derive(Debug, Clone)]
pub enum ConstrFields {
    /// Components may be wrapped in `TypeExprKind::Bang`.
    Positional(Vec<TypeExprId>),
    Labelled(Vec<FieldDecl>),
}

/// `f, g :: !Int`
#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub labels: Vec<SmolStr>,
    pub ty: TypeExprId,
}

#[derive(Debug, Clone)]
pub struct SynonymDecl {
    pub line: Line,
    pub name: SmolStr,
    pub params: Vec<SmolStr>,
    pub rhs: TypeExprId,
    /// `type T = ... in f, g :: t`
    pub restricted_to: Option<Vec<RestrictedItem>>,
}

impl SynonymDecl {
    pub fn restricted_to(mut self, items: Vec<RestrictedItem>) -> Self {
        self.restricted_to = Some(items);
        self
    }
}

#[derive(Debug, Clone)]
pub enum RestrictedItem {
    Var(SmolStr),
    Sig(SigDecl),
}

#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub line: Line,
    pub context: Vec<PredExpr>,
    pub name: SmolStr,
    /// Written as types so that a non-variable parameter can be reported.
    pub params: Vec<TypeExprId>,
    pub members: Vec<ValueDecl>,
}

#[derive(Debug, Clone)]
pub struct InstanceDecl {
    pub line: Line,
    pub context: Vec<PredExpr>,
    pub head: PredExpr,
    pub members: Vec<ValueDecl>,
}

#[derive(Debug, Clone)]
pub struct DefaultDecl {
    pub line: Line,
    pub types: Vec<TypeExprId>,
}

#[derive(Debug, Clone)]
pub struct ForeignDecl {
    pub line: Line,
    pub direction: ForeignDirection,
    /// External entity string, e.g. a C symbol.
    pub entity: SmolStr,
    pub name: SmolStr,
    pub ty: TypeExprId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignDirection {
    Import,
    Export,
}

/// Class constraint as written: `C t1 .. tn`.
#[derive(Debug, Clone)]
pub struct PredExpr {
    pub line: Line,
    pub class: Ident,
    pub args: Vec<TypeExprId>,
}

// ── Value declarations ────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum ValueDecl {
    /// One equation `f p1 .. pn = rhs`.
    FunBind(FunBind),
    PatBind(PatBind),
    Sig(SigDecl),
    Fixity(FixityDecl),
}

impl ValueDecl {
    pub fn line(&self) -> Line {
        match self {
            ValueDecl::FunBind(b) => b.rhs.line,
            ValueDecl::PatBind(b) => b.rhs.line,
            ValueDecl::Sig(s) => s.line,
            ValueDecl::Fixity(f) => f.line,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunBind {
    pub name: SmolStr,
    pub args: Vec<PatternId>,
    pub rhs: Rhs,
}

#[derive(Debug, Clone)]
pub struct PatBind {
    pub pat: PatternId,
    pub rhs: Rhs,
}

#[derive(Debug, Clone)]
pub struct SigDecl {
    pub line: Line,
    pub vars: Vec<Ident>,
    pub ty: TypeExprId,
}

#[derive(Debug, Clone)]
pub struct FixityDecl {
    pub line: Line,
    pub ops: Vec<SmolStr>,
    pub fixity: Fixity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Assoc {
    Left,
    Right,
    Non,
}

/// Precedence and associativity of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fixity {
    pub assoc: Assoc,
    pub prec: u8,
}

impl Fixity {
    /// Fixity of an operator with no declaration: `infixl 9`.
    pub const DEFAULT: Fixity = Fixity {
        assoc: Assoc::Left,
        prec: 9,
    };

    /// Fixity used for prefix negation.
    pub const NEGATION: Fixity = Fixity {
        assoc: Assoc::Left,
        prec: 6,
    };

    pub const fn new(assoc: Assoc, prec: u8) -> Self {
        Self { assoc, prec }
    }
}

impl fmt::Display for Fixity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kw = match self.assoc {
            Assoc::Left => "infixl",
            Assoc::Right => "infixr",
            Assoc::Non => "infix",
        };
        write!(f, "{} {}", kw, self.prec)
    }
}

#[derive(Debug, Clone)]
pub struct Rhs {
    pub line: Line,
    pub body: RhsBody,
    /// `where` declarations.
    pub wheres: Vec<ValueDecl>,
}

#[derive(Debug, Clone)]
pub enum RhsBody {
    Plain(ExprId),
    Guarded(Vec<GuardedExpr>),
}

#[derive(Debug, Clone)]
pub struct GuardedExpr {
    pub line: Line,
    pub guard: ExprId,
    pub body: ExprId,
}

// ── Expressions ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub line: Line,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Var(Ident),
    Con(Ident),
    Lit(Literal),
    App(ExprId, ExprId),
    /// Unresolved operator chain, as produced by the parser.
    Infix(Vec<InfixElem<ExprId>>),
    /// Prefix negation. Only produced by infix resolution.
    Negate(ExprId),
    Lambda {
        params: Vec<PatternId>,
        body: ExprId,
    },
    Let {
        decls: Vec<ValueDecl>,
        body: ExprId,
    },
    If {
        cond: ExprId,
        then_branch: ExprId,
        else_branch: ExprId,
    },
    Case {
        scrutinee: ExprId,
        alts: Vec<CaseAlt>,
    },
    Tuple(Vec<ExprId>),
    List(Vec<ExprId>),
    /// `[head | quals]`
    Comprehension {
        head: ExprId,
        quals: Vec<Qualifier>,
    },
    /// `do { stmts; last }`
    Do {
        stmts: Vec<Qualifier>,
        last: ExprId,
    },
    Typed {
        expr: ExprId,
        ty: TypeExprId,
    },
    RecordCon {
        con: Ident,
        fields: Vec<FieldBind<ExprId>>,
    },
    RecordUpdate {
        record: ExprId,
        fields: Vec<FieldBind<ExprId>>,
    },
}

#[derive(Debug, Clone)]
pub struct CaseAlt {
    pub pat: PatternId,
    pub rhs: Rhs,
}

#[derive(Debug, Clone)]
pub enum Qualifier {
    /// `pat <- expr`
    Generator { pat: PatternId, expr: ExprId },
    /// `let decls`
    Let(Vec<ValueDecl>),
    /// A boolean guard, or a `do` statement with no binder.
    Guard(ExprId),
}

/// `field = value`, or a punned `field` when `value` is `None`.
#[derive(Debug, Clone)]
pub struct FieldBind<T> {
    pub field: Ident,
    pub value: Option<T>,
}

/// Element of an unresolved infix chain.
#[derive(Debug, Clone, PartialEq)]
pub enum InfixElem<T> {
    Operand(T),
    Operator(Ident),
    /// Prefix minus.
    Negate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Char(char),
    String(SmolStr),
}

impl Literal {
    /// Numeric negation, if the literal is a number.
    pub fn negated(&self) -> Option<Literal> {
        match self {
            Literal::Int(n) => Some(Literal::Int(n.wrapping_neg())),
            Literal::Float(x) => Some(Literal::Float(-x)),
            Literal::Char(_) | Literal::String(_) => None,
        }
    }
}

// ── Patterns ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Pattern {
    pub kind: PatternKind,
    pub line: Line,
}

#[derive(Debug, Clone)]
pub enum PatternKind {
    Wildcard,
    Var(SmolStr),
    /// `v@p`
    As(SmolStr, PatternId),
    /// `~p`
    Lazy(PatternId),
    Lit(Literal),
    Con {
        con: Ident,
        args: Vec<PatternId>,
    },
    Tuple(Vec<PatternId>),
    List(Vec<PatternId>),
    Record {
        con: Ident,
        fields: Vec<FieldBind<PatternId>>,
    },
    /// `n+k`
    NPlusK { var: SmolStr, k: Literal },
    Infix(Vec<InfixElem<PatternId>>),
    Typed {
        pat: PatternId,
        ty: TypeExprId,
    },
}

// ── Type expressions ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TypeExpr {
    pub kind: TypeExprKind,
    pub line: Line,
}

#[derive(Debug, Clone)]
pub enum TypeExprKind {
    Var(SmolStr),
    /// Type constructor or class name. Primitive constructors are written
    /// `->`, `[]`, `()` and `(,)`.
    Con(Ident),
    App(TypeExprId, TypeExprId),
    Fun(TypeExprId, TypeExprId),
    List(TypeExprId),
    Tuple(Vec<TypeExprId>),
    Forall {
        vars: Vec<SmolStr>,
        body: TypeExprId,
    },
    Qual {
        context: Vec<PredExpr>,
        body: TypeExprId,
    },
    /// Strictness annotation on a constructor component.
    Bang(TypeExprId),
}
