use sable_ast::Line;
use std::fmt;

/// A fatal static-semantics error. Analysis of the current unit stops at the
/// first one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticError {
    pub line: Line,
    pub kind: ErrorKind,
}

pub type StaticResult<T> = Result<T, StaticError>;

impl StaticError {
    pub fn new(line: Line, kind: ErrorKind) -> Self {
        Self { line, kind }
    }
}

impl fmt::Display for StaticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.kind)
    }
}

impl std::error::Error for StaticError {}

/// Attaches a line to a table-level error.
pub(crate) fn at(line: Line) -> impl Fn(ErrorKind) -> StaticError {
    move |kind| StaticError::new(line, kind)
}

pub(crate) fn fail<T>(line: Line, kind: ErrorKind) -> StaticResult<T> {
    Err(StaticError::new(line, kind))
}

fn reason_suffix(reason: &Option<String>) -> String {
    match reason {
        Some(r) => format!(" ({})", r),
        None => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    // ── Definitions and names ─────────────────────────────────────
    #[error("\"{name}\" used as both class and type constructor")]
    NameClash { name: String },

    #[error("repeated definition of {what} \"{name}\"")]
    DuplicateDefinition { what: &'static str, name: String },

    #[error("definition of {what} \"{name}\" clashes with import")]
    ClashesWithImport { what: &'static str, name: String },

    #[error("{what} \"{name}\" imported from module \"{module}\" clashes with an entity already in scope")]
    ImportClash {
        what: &'static str,
        name: String,
        module: String,
    },

    #[error("undefined variable \"{name}\"")]
    UndefinedVariable { name: String },

    #[error("undefined qualified name \"{name}\"")]
    UndefinedQualifiedName { name: String },

    #[error("undefined constructor function \"{name}\"")]
    UndefinedConstructor { name: String },

    #[error("\"{name}\" is not a constructor function")]
    NotAConstructor { name: String },

    #[error("undefined type constructor \"{name}\"")]
    UndefinedTypeConstructor { name: String },

    #[error("undefined type variable \"{name}\"")]
    UndefinedTypeVariable { name: String },

    #[error("undefined class \"{name}\"")]
    UndefinedClass { name: String },

    #[error("unknown class \"{name}\" in derived instance")]
    UndefinedDerivedClass { name: String },

    #[error("unknown module \"{name}\"")]
    UndefinedModule { name: String },

    // ── Imports and exports ───────────────────────────────────────
    #[error("recursive import dependency on module \"{module}\"")]
    RecursiveImport { module: String },

    #[error("unknown entity \"{name}\" imported from module \"{module}\"")]
    UnknownImportEntity { name: String, module: String },

    #[error("unknown entity \"{name}\" exported from module \"{module}\"")]
    UnknownExportEntity { name: String, module: String },

    #[error("unknown module \"{name}\" exported from module \"{module}\"")]
    UnknownExportModule { name: String, module: String },

    #[error("entity \"{name}\" is not a {relation} \"{parent}\"")]
    NotASubentity {
        name: String,
        relation: &'static str,
        parent: String,
    },

    #[error("explicit constructor list given for type synonym \"{name}\" in export list of module \"{module}\"")]
    SynonymConstructorList { name: String, module: String },

    #[error("transparent export of restricted type synonym \"{name}\" in module \"{module}\"")]
    RestrictedSynonymExport { name: String, module: String },

    #[error("explicit list of operations given for entity \"{name}\" in module \"{module}\"")]
    ExportListForNonType { name: String, module: String },

    // ── Types and kinds ───────────────────────────────────────────
    #[error("too many type variables in {what}")]
    TooManyTypeVariables { what: &'static str },

    #[error("kind error in {what}: `{expr}` has kind {inferred}, expected {expected}{}", reason_suffix(.reason))]
    KindMismatch {
        what: String,
        expr: String,
        expected: String,
        inferred: String,
        reason: Option<String>,
    },

    #[error("not enough arguments for type synonym \"{name}\"")]
    SynonymNotFullyApplied { name: String },

    #[error("ambiguous type signature in {what}: `{ty}`")]
    AmbiguousType { what: String, ty: String },

    #[error("illegal strictness annotation")]
    IllegalStrictnessAnnotation,

    #[error("type synonym \"{name}\" is recursive")]
    RecursiveSynonym { name: String },

    #[error("type synonyms \"{first}\" and \"{second}\" are mutually recursive")]
    MutuallyRecursiveSynonyms { first: String, second: String },

    #[error("repeated type variable \"{name}\" in {place}")]
    RepeatedTypeVariable { name: String, place: &'static str },

    #[error("repeated quantified variable \"{name}\"")]
    DuplicatedQuantifiedVariable { name: String },

    #[error("local quantifier for \"{name}\" hides an outer use of the same variable")]
    QuantifierHidesOuter { name: String },

    #[error("locally quantified variable \"{name}\" is not used")]
    UnusedQuantifiedVariable { name: String },

    // ── Data declarations ─────────────────────────────────────────
    #[error("repeated field name \"{field}\" for constructor \"{constructor}\"")]
    RepeatedFieldName { field: String, constructor: String },

    #[error("repeated definition for selector \"{name}\"")]
    RepeatedSelectorDefinition { name: String },

    #[error("variable \"{name}\" in constraint is not locally bound")]
    ConstraintVariableNotLocal { name: String },

    #[error("illegal context for newtype constructor \"{name}\"")]
    NewtypeContext { name: String },

    #[error("newtype constructor \"{name}\" must have exactly one argument")]
    NewtypeArity { name: String },

    #[error("illegal strictness annotation for newtype constructor \"{name}\"")]
    NewtypeStrictness { name: String },

    #[error("cannot derive instances for types with polymorphic components")]
    PolymorphicComponentDerive,

    #[error("cannot derive instances for types with existentially typed components")]
    ExistentialComponentDerive,

    #[error("cannot use selectors with existentially typed components")]
    ExistentialSelectors,

    // ── Classes and instances ─────────────────────────────────────
    #[error("class hierarchy for \"{name}\" is not acyclic")]
    RecursiveClassHierarchy { name: String },

    #[error("type variable required in class head")]
    TypeVariableRequiredInClassHead,

    #[error("wrong number of arguments for class \"{class}\"")]
    ClassArityMismatch { class: String },

    #[error("type variable expected in instance type")]
    InstanceHeadVariableExpected,

    #[error("constructor expected in instance type")]
    InstanceHeadConstructorExpected,

    #[error("type synonym \"{name}\" not permitted in instance of \"{class}\"")]
    SynonymInInstanceHead { name: String, class: String },

    #[error("overlapping instances for class \"{class}\"\n*** This instance   : {this}\n*** Overlaps with  : {other}\n*** Common instance : {common}")]
    OverlappingInstances {
        class: String,
        this: String,
        other: String,
        common: String,
    },

    #[error("type signature declarations not permitted in instance declaration")]
    IllegalInstanceSignature,

    #[error("fixity declarations not permitted in instance declaration")]
    IllegalInstanceFixity,

    #[error("no member \"{member}\" in class \"{class}\"")]
    UnknownMember { member: String, class: String },

    #[error("pattern binding illegal in {place} declaration")]
    IllegalPatternBinding { place: &'static str },

    #[error("repeated definition for member function \"{name}\"")]
    RepeatedMemberDefinition { name: String },

    // ── Derived instances and defaults ────────────────────────────
    #[error("an instance of {required} is required to derive {derived}")]
    MissingInstanceForDerivation { required: String, derived: String },

    #[error("sorry, cannot derive instances of class \"{class}\"")]
    UnsupportedDerivedClass { class: String },

    #[error("cannot derive {class} for type \"{tycon}\": {reason}")]
    CannotDerive {
        class: String,
        tycon: String,
        reason: &'static str,
    },

    #[error("derived instance contexts did not converge after {passes} passes")]
    DerivationDidNotConverge { passes: usize },

    #[error("multiple default declarations are not permitted in a single module")]
    MultipleDefaults,

    #[error("default types must be instances of the Num class, but `{ty}` is not")]
    DefaultNotNum { ty: String },

    // ── Haskell 98 mode ───────────────────────────────────────────
    #[error("illegal Haskell 98 class constraint in {place}: `{constraint}`")]
    IllegalHaskell98Constraint {
        place: &'static str,
        constraint: String,
    },

    #[error("Haskell 98 does not support {feature}")]
    Haskell98Unsupported { feature: &'static str },

    // ── Bindings ──────────────────────────────────────────────────
    #[error("\"{name}\" multiply defined")]
    MultiplyDefined { name: String },

    #[error("equations give different arities for \"{name}\"")]
    EquationArityMismatch { name: String },

    #[error("no variables defined in left hand side pattern")]
    NoPatternVariables,

    #[error("type signature for qualified variable \"{name}\" is not allowed")]
    QualifiedSignature { name: String },

    #[error("missing binding for variable \"{name}\" in type signature")]
    MissingSignatureBinding { name: String },

    #[error("repeated type signature for \"{name}\"")]
    RepeatedSignature { name: String },

    #[error("missing binding for variable \"{op}\" in fixity declaration")]
    MissingFixityBinding { op: String },

    #[error("repeated fixity declaration for operator \"{op}\"")]
    RepeatedFixity { op: String },

    #[error("no top level binding of \"{name}\" for restricted synonym \"{synonym}\"")]
    MissingRestrictedBinding { name: String, synonym: String },

    // ── Patterns and expressions ──────────────────────────────────
    #[error("repeated variable \"{name}\" in pattern")]
    RepeatedPatternVariable { name: String },

    #[error("constructor \"{name}\" must have exactly {expected} argument(s) in pattern")]
    ConstructorArityMismatch { name: String, expected: usize },

    #[error("illegal tuple pattern: {found} components for constructor `{con}`")]
    IllegalTuplePattern { con: String, found: usize },

    #[error("integer k required in n+k pattern")]
    NPlusKNotInteger,

    #[error("integer k in n+k pattern must be > 0")]
    NPlusKNotPositive,

    #[error("illegal pattern syntax: {reason}")]
    IllegalPatternSyntax { reason: &'static str },

    #[error("illegal type in pattern annotation")]
    IllegalPatternTypeAnnotation,

    #[error("ambiguous use of operator \"{right}\" with \"{left}\"")]
    AmbiguousOperators { left: String, right: String },

    #[error("ambiguous use of unary minus with \"{op}\"")]
    AmbiguousNegation { op: String },

    #[error("malformed operator application")]
    MalformedInfix,

    #[error("\"{name}\" is not a selector function/field name")]
    NotASelector { name: String },

    #[error("repeated field name \"{field}\" in field list")]
    RepeatedFieldInList { field: String },

    #[error("no constructor has all of the fields specified")]
    NoConstructorHasFields,

    #[error("constructor \"{constructor}\" does not have selected fields")]
    ConstructorLacksFields { constructor: String },

    #[error("construction does not define strict field \"{field}\"")]
    MissingStrictField { field: String },

    #[error("empty field list in update")]
    EmptyFieldUpdate,
}
