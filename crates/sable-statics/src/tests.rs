use super::*;
use crate::tables::{NameKind, TyconBody};
use proptest::prelude::*;
use sable_ast::builder::{op, operand};
use sable_ast::{
    Assoc, CaseAlt, ExprKind, InfixElem, Literal, Module, ModuleBuilder, Qualifier, RestrictedItem, RhsBody,
};

fn build(f: impl FnOnce(&mut ModuleBuilder)) -> Module {
    let mut b = ModuleBuilder::new("M");
    f(&mut b);
    b.finish().unwrap()
}

fn check_with(options: Options, f: impl FnOnce(&mut ModuleBuilder)) -> (Statics, StaticResult<ModuleAnalysis>) {
    let mut statics = Statics::with_prelude(options).unwrap();
    let result = statics.analyze_module(build(f));
    (statics, result)
}

fn check_ok(f: impl FnOnce(&mut ModuleBuilder)) -> (Statics, ModuleAnalysis) {
    let (statics, result) = check_with(Options::default(), f);
    match result {
        Ok(m) => (statics, m),
        Err(e) => panic!("unexpected error: {}", e),
    }
}

fn check_err(f: impl FnOnce(&mut ModuleBuilder)) -> StaticError {
    check_err_with(Options::default(), f)
}

fn check_err_with(options: Options, f: impl FnOnce(&mut ModuleBuilder)) -> StaticError {
    let (_, result) = check_with(options, f);
    match result {
        Ok(_) => panic!("expected an error, got none"),
        Err(e) => e,
    }
}

/// The plain right-hand side of the single equation of top-level `name`.
fn body_of(m: &ModuleAnalysis, name: &str) -> sable_ast::ExprId {
    let b = m.binding(name).unwrap();
    match m.bindings[b].alts[0].rhs.body {
        RhsBody::Plain(e) => e,
        RhsBody::Guarded(_) => panic!("guarded"),
    }
}

fn render(ast: &Module, e: sable_ast::ExprId) -> String {
    match &ast.exprs[e].kind {
        ExprKind::Var(v) | ExprKind::Con(v) => v.to_string(),
        ExprKind::Lit(Literal::Int(n)) => n.to_string(),
        ExprKind::App(f, x) => format!("({} {})", render(ast, *f), render(ast, *x)),
        ExprKind::Negate(x) => format!("(negate {})", render(ast, *x)),
        other => format!("{:?}", other),
    }
}

fn tycon(statics: &Statics, m: &ModuleAnalysis, text: &str) -> TyconId {
    statics.tables().lookup_tycon(m.module, text).unwrap()
}

// ── Module pipeline ──────────────────────────────────────────────

#[test]
fn prelude_is_analysed() {
    let statics = Statics::with_prelude(Options::default()).unwrap();
    let tables = statics.tables();
    let prelude = tables.find_module("Prelude").unwrap();
    for class in ["Eq", "Ord", "Enum", "Bounded", "Show", "Read", "Ix", "Num"] {
        assert!(tables.lookup_class(prelude, class).is_some(), "{}", class);
    }
    let maybe = tables.lookup_tycon(prelude, "Maybe").unwrap();
    assert_eq!(tables.tycons[maybe].kind, Kind::simple(1));
    let string = tables.lookup_tycon(prelude, "String").unwrap();
    assert_eq!(
        tables.show_type(&tables.full_expand(&Type::Tycon(string))).to_string(),
        "[Char]"
    );
}

#[test]
fn prelude_passes_haskell98_mode() {
    assert!(Statics::with_prelude(Options::default().haskell98(true)).is_ok());
}

#[test]
fn empty_universe_has_no_prelude() {
    let mut statics = Statics::new(Options::default());
    let err = statics
        .analyze_module(build(|b| {
            let one = b.int(1);
            let x = b.var("x");
            let body = b.infix(vec![operand(x), op("+"), operand(one)]);
            let px = b.pvar("x");
            let f = b.fun("f", vec![px], body);
            b.push(f);
        }))
        .unwrap_err();
    insta::assert_snapshot!(err.to_string(), @r#"line 1: undefined variable "+""#);
}

#[test]
fn duplicate_module_is_rejected() {
    let mut statics = Statics::with_prelude(Options::default()).unwrap();
    statics.analyze_module(build(|_| {})).unwrap();
    let err = statics.analyze_module(build(|_| {})).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @r#"line 1: repeated definition of module "M""#);
}

#[test]
fn failed_module_leaves_no_trace() {
    let mut statics = Statics::with_prelude(Options::default()).unwrap();
    let names = statics.tables().names.len();
    let modules = statics.tables().modules.len();
    let err = statics.analyze_module(build(|b| {
        let t = b.data("T", &["A", "B Int"]);
        b.push(t);
        let y = b.var("nowhere");
        let f = b.fun("f", vec![], y);
        b.push(f);
    }));
    assert!(err.is_err());
    assert_eq!(statics.tables().names.len(), names);
    assert_eq!(statics.tables().modules.len(), modules);
    assert!(statics.tables().find_module("M").is_none());
    statics.analyze_module(build(|_| {})).unwrap();
}

#[test]
fn local_definition_clashes_with_import() {
    let err = check_err(|b| {
        let one = b.int(1);
        let d = b.fun("map", vec![], one);
        b.push(d);
    });
    insta::assert_snapshot!(err.to_string(), @r#"line 1: definition of variable "map" clashes with import"#);
}

// ── Types and kinds ──────────────────────────────────────────────

#[test]
fn datatype_kinds_are_inferred() {
    let (statics, m) = check_ok(|b| {
        let tree = b.data("Tree a", &["Leaf", "Node (Tree a) a (Tree a)"]);
        let app = b.data("App f a", &["App (f a)"]);
        let fix = b.newtype("Fix f", "In (f (Fix f))");
        b.push(tree).push(app).push(fix);
    });
    let tables = statics.tables();
    let kind = |t: &str| tables.tycons[tycon(&statics, &m, t)].kind.to_string();
    assert_eq!(kind("Tree"), "* -> *");
    assert_eq!(kind("App"), "(* -> *) -> * -> *");
    assert_eq!(kind("Fix"), "(* -> *) -> *");
    let node = tables.lookup_name(m.module, "Node").unwrap();
    assert_eq!(tables.names[node].arity, 3);
}

#[test]
fn kind_mismatch_is_reported() {
    let (statics, m) = check_ok(|b| {
        let t = b.data("T a", &["MkT (a Int)"]);
        b.push(t);
    });
    let t = tycon(&statics, &m, "T");
    assert_eq!(statics.tables().tycons[t].kind.to_string(), "(* -> *) -> *");

    let err = check_err(|b| {
        let t = b.data("T a", &["MkT (a Int)"]);
        let v = b.data("V", &["MkV (T Int)"]);
        b.push(t).push(v);
    });
    let ErrorKind::KindMismatch { expr, inferred, expected, .. } = &err.kind else {
        panic!("kind mismatch expected, got {}", err);
    };
    assert_eq!((expr.as_str(), inferred.as_str(), expected.as_str()), ("Int", "*", "* -> *"));

    let err = check_err(|b| {
        let d = b.data("Bad", &["Bad (Maybe Maybe)"]);
        b.push(d);
    });
    assert!(matches!(err.kind, ErrorKind::KindMismatch { .. }), "{}", err);
}

#[test]
fn recursive_synonyms_are_rejected() {
    let err = check_err(|b| {
        let s = b.synonym("T", "[T]");
        b.push(s);
    });
    insta::assert_snapshot!(err.to_string(), @r#"line 1: type synonym "T" is recursive"#);

    let err = check_err(|b| {
        let (x, y) = (b.synonym("A", "Maybe B"), b.synonym("B", "[A]"));
        b.push(x).push(y);
    });
    assert!(matches!(err.kind, ErrorKind::MutuallyRecursiveSynonyms { .. }), "{}", err);
}

#[test]
fn synonyms_expand_and_must_be_saturated() {
    let (statics, m) = check_ok(|b| {
        let s = b.synonym("Pair a", "(a, a)");
        let t = b.synonym("Names", "Pair String");
        b.push(s).push(t);
    });
    let tables = statics.tables();
    let names = Type::Tycon(tycon(&statics, &m, "Names"));
    insta::assert_snapshot!(tables.show_type(&tables.full_expand(&names)).to_string(), @"([Char], [Char])");

    let err = check_err(|b| {
        let s = b.synonym("Pair a", "(a, a)");
        b.push(s);
        let sig = b.sig(&["f"], "Pair -> Int");
        let one = b.int(1);
        let f = b.fun("f", vec![], one);
        b.push(sig).push(f);
    });
    insta::assert_snapshot!(err.to_string(), @r#"line 1: not enough arguments for type synonym "Pair""#);
}

#[test]
fn type_and_class_names_clash() {
    let err = check_err(|b| {
        let d = b.data("T", &["T"]);
        let c = b.class("T a", vec![]);
        b.push(d).push(c);
    });
    insta::assert_snapshot!(err.to_string(), @r#"line 1: "T" used as both class and type constructor"#);
}

#[test]
fn newtype_needs_one_component() {
    let err = check_err(|b| {
        let n = b.newtype("N", "N Int Int");
        b.push(n);
    });
    insta::assert_snapshot!(err.to_string(), @r#"line 1: newtype constructor "N" must have exactly one argument"#);
}

#[test]
fn existential_constructor_gets_dictionary_arguments() {
    let (statics, m) = check_ok(|b| {
        let d = b.data("Showable", &["forall e. Show e => MkShowable e"]);
        b.push(d);
    });
    let tables = statics.tables();
    let con = tables.lookup_name(m.module, "MkShowable").unwrap();
    let info = tables.names[con].constructor().unwrap();
    assert_eq!(info.existentials, 1);
    assert_eq!(info.local_context.len(), 1);
    assert_eq!(tables.names[con].arity, 2);
    assert_eq!(tables.names[con].user_arity(), 1);
}

#[test]
fn existential_types_are_not_haskell98() {
    let err = check_err_with(Options::default().haskell98(true), |b| {
        let d = b.data("Box", &["forall e. MkBox e"]);
        b.push(d);
    });
    assert!(matches!(err.kind, ErrorKind::Haskell98Unsupported { .. }), "{}", err);
}

// ── Classes and instances ────────────────────────────────────────

#[test]
fn class_members_and_dictionaries() {
    let (statics, m) = check_ok(|b| {
        let members = vec![
            b.sig(&["empty"], "f a"),
            b.sig(&["insert"], "a -> f a -> f a"),
        ];
        let c = b.class("Container f", members);
        b.push(c);
        let size = b.sig(&["size"], "f a -> Int");
        let sub = b.class("Container f => Sized f", vec![size]);
        b.push(sub);
    });
    let tables = statics.tables();
    let container = tables.lookup_class(m.module, "Container").unwrap();
    let class = &tables.classes[container];
    assert_eq!(class.kinds, vec![Kind::simple(1)]);
    assert_eq!(class.members.len(), 2);
    let make = class.dict_constructor.unwrap();
    assert_eq!(tables.names[make].arity, 2);
    assert!(matches!(tables.names[make].kind, NameKind::DictConstructor { single_entry: false, .. }));

    let sized = &tables.classes[tables.lookup_class(m.module, "Sized").unwrap()];
    assert_eq!(sized.dict_selectors.len(), 1);
    assert!(sized.level > class.level);
    let make = sized.dict_constructor.unwrap();
    assert!(matches!(tables.names[make].kind, NameKind::DictConstructor { single_entry: false, .. }));
    assert_eq!(tables.names[sized.dict_builder.unwrap()].arity, 2);
}

#[test]
fn cyclic_superclasses_are_rejected() {
    let err = check_err(|b| {
        let (x, y) = (b.class("B a => A a", vec![]), b.class("A a => B a", vec![]));
        b.push(x).push(y);
    });
    assert!(matches!(err.kind, ErrorKind::RecursiveClassHierarchy { .. }), "{}", err);
}

#[test]
fn instance_members_are_slotted_in_class_order() {
    let (_, m) = check_ok(|b| {
        let d = b.data("Colour", &["Red", "Green"]);
        b.push(d);
        let (px, py, t) = (b.pwild(), b.pwild(), b.con("True"));
        let eq = b.fun("==", vec![px, py], t);
        let inst = b.instance("Eq Colour", vec![eq]);
        b.push(inst);
    });
    let inst = m.instances[0];
    let slots = &m.instance_members[&inst];
    assert_eq!(slots.len(), 2);
    assert!(slots[0].is_some() && slots[1].is_none());
}

#[test]
fn instance_errors() {
    let err = check_err(|b| {
        let d = b.data("Colour", &["Red"]);
        b.push(d);
        let one = b.int(1);
        let foo = b.fun("foo", vec![], one);
        let inst = b.instance("Eq Colour", vec![foo]);
        b.push(inst);
    });
    insta::assert_snapshot!(err.to_string(), @r#"line 1: no member "foo" in class "Eq""#);

    let err = check_err(|b| {
        let inst = b.instance("Eq a => Eq (Maybe a)", vec![]);
        b.push(inst);
    });
    assert!(matches!(err.kind, ErrorKind::DuplicateDefinition { what: "instance", .. }), "{}", err);

    let err = check_err(|b| {
        let inst = b.instance("Eq Nowhere", vec![]);
        b.push(inst);
    });
    insta::assert_snapshot!(err.to_string(), @r#"line 1: undefined type constructor "Nowhere""#);
}

#[test]
fn overlapping_instances_follow_the_policy() {
    let decls = |b: &mut ModuleBuilder| {
        let c = b.class("C a", vec![]);
        let (general, specific) = (b.instance("C [a]", vec![]), b.instance("C [Int]", vec![]));
        b.push(c).push(general).push(specific);
    };
    let err = check_err(decls);
    assert!(matches!(err.kind, ErrorKind::OverlappingInstances { .. }), "{}", err);

    let (statics, result) = check_with(Options::default().allow_overlap(true), decls);
    let m = result.unwrap();
    let tables = statics.tables();
    let c = &tables.classes[tables.lookup_class(m.module, "C").unwrap()];
    let first = &tables.insts[c.instances[0]];
    assert_eq!(tables.show_pred(&first.head).to_string(), "C [Int]");
}

#[test]
fn synonym_instance_heads_expand_outside_haskell98() {
    let (statics, m) = check_ok(|b| {
        let c = b.class("Named a", vec![]);
        let inst = b.instance("Named String", vec![]);
        b.push(c).push(inst);
    });
    let tables = statics.tables();
    let head = &tables.insts[m.instances[0]].head;
    assert_eq!(tables.show_pred(head).to_string(), "Named [Char]");

    let err = check_err_with(Options::default().haskell98(true), |b| {
        let c = b.class("Named a", vec![]);
        let inst = b.instance("Named String", vec![]);
        b.push(c).push(inst);
    });
    assert!(matches!(err.kind, ErrorKind::SynonymInInstanceHead { .. } | ErrorKind::InstanceHeadVariableExpected), "{}", err);
}

// ── Derived instances ────────────────────────────────────────────

#[test]
fn derived_contexts_come_from_components() {
    let (statics, m) = check_ok(|b| {
        let d = b.data("P a b", &["P a Int", "Q [b]"]).deriving(&["Eq", "Show"]);
        b.push(d);
    });
    let tables = statics.tables();
    assert_eq!(m.derived.len(), 2);
    let shown: Vec<String> = m
        .derived
        .iter()
        .map(|&i| {
            let inst = &tables.insts[i];
            format!("{} => {}", tables.show_context(&inst.context), tables.show_pred(&inst.head))
        })
        .collect();
    assert_eq!(shown, vec!["(Eq a, Eq b) => Eq (P a b)", "(Show a, Show b) => Show (P a b)"]);
    let eq = &tables.insts[m.derived[0]];
    assert_eq!(eq.derived_members.len(), 1);
}

#[test]
fn mutually_recursive_derivations_converge() {
    let (statics, m) = check_ok(|b| {
        let x = b.data("A a", &["A (B a)"]).deriving(&["Eq"]);
        let y = b.data("B a", &["B (A a)", "N a"]).deriving(&["Eq"]);
        b.push(x).push(y);
    });
    let tables = statics.tables();
    for &i in &m.derived {
        assert_eq!(tables.show_context(&tables.insts[i].context), "Eq a");
    }
}

#[test]
fn derivation_needs_component_instances() {
    let err = check_err(|b| {
        let d = b.data("F", &["F (Int -> Int)"]).deriving(&["Eq"]);
        b.push(d);
    });
    assert!(matches!(err.kind, ErrorKind::MissingInstanceForDerivation { .. }), "{}", err);
}

#[test]
fn derivation_shape_rules() {
    let err = check_err(|b| {
        let d = b.data("E", &["E Int"]).deriving(&["Enum"]);
        b.push(d);
    });
    insta::assert_snapshot!(err.to_string(), @r#"line 1: cannot derive Enum for type "E": constructors must all be nullary"#);

    let err = check_err(|b| {
        let c = b.class("Mine a", vec![]);
        let d = b.data("E", &["E"]).deriving(&["Mine"]);
        b.push(c).push(d);
    });
    insta::assert_snapshot!(err.to_string(), @r#"line 1: sorry, cannot derive instances of class "Mine""#);

    let (_, m) = check_ok(|b| {
        let d = b.data("Pair", &["Pair Int Char"]).deriving(&["Bounded", "Ix", "Eq", "Ord"]);
        b.push(d);
    });
    assert_eq!(m.derived.len(), 4);
}

#[test]
fn derive_iteration_limit_is_configurable() {
    let err = check_err_with(Options::default().derive_iteration_limit(2), |b| {
        let x = b.data("A a", &["A (B a)"]).deriving(&["Eq"]);
        let y = b.data("B a", &["B (A a)", "N a"]).deriving(&["Eq"]);
        b.push(x).push(y);
    });
    insta::assert_snapshot!(err.to_string(), @"line 1: derived instance contexts did not converge after 2 passes");
}

// ── Defaults and foreign declarations ────────────────────────────

#[test]
fn default_declarations() {
    let (statics, m) = check_ok(|b| {
        let d = b.default(&["Int", "Double"]);
        b.push(d);
    });
    let defaults = &statics.tables().modules[m.module].defaults;
    assert_eq!(defaults.len(), 2);

    let (statics, m) = check_ok(|_| {});
    let tables = statics.tables();
    let shown: Vec<String> = tables.modules[m.module]
        .defaults
        .iter()
        .map(|t| tables.show_type(t).to_string())
        .collect();
    assert_eq!(shown, vec!["Integer", "Double"]);

    let err = check_err(|b| {
        let d = b.default(&["Bool"]);
        b.push(d);
    });
    insta::assert_snapshot!(err.to_string(), @"line 1: default types must be instances of the Num class, but `Bool` is not");

    let err = check_err(|b| {
        let (x, y) = (b.default(&["Int"]), b.default(&["Integer"]));
        b.push(x).push(y);
    });
    insta::assert_snapshot!(err.to_string(), @"line 1: multiple default declarations are not permitted in a single module");
}

#[test]
fn foreign_declarations() {
    let (statics, m) = check_ok(|b| {
        let imp = b.foreign_import("c_sin", "sin", "Double -> Double");
        let (px, x) = (b.pvar("x"), b.var("x"));
        let f = b.fun("twice", vec![px], x);
        let exp = b.foreign_export("twice_c", "twice", "Int -> Int");
        b.push(imp).push(f).push(exp);
    });
    let tables = statics.tables();
    let sin = tables.lookup_name(m.module, "sin").unwrap();
    assert_eq!(tables.names[sin].arity, 1);
    assert_eq!(m.foreign_exports.len(), 1);

    let err = check_err(|b| {
        let exp = b.foreign_export("g_c", "g", "Int");
        b.push(exp);
    });
    insta::assert_snapshot!(err.to_string(), @r#"line 1: undefined variable "g""#);

    let err = check_err(|b| {
        let one = b.int(1);
        let f = b.fun("f", vec![], one);
        let (x, y) = (b.foreign_export("a", "f", "Int"), b.foreign_export("b", "f", "Int"));
        b.push(f).push(x).push(y);
    });
    insta::assert_snapshot!(err.to_string(), @r#"line 1: repeated definition of foreign export "f""#);
}

// ── Restricted synonyms ──────────────────────────────────────────

fn stack_module(b: &mut ModuleBuilder) {
    let s = b
        .synonym("Stack", "[Int]")
        .restricted_to(vec![RestrictedItem::Var("push".into())]);
    b.push(s);
    let sig = b.sig(&["push"], "Int -> Stack -> Stack");
    let (px, ps, x, s, cons) = (b.pvar("x"), b.pvar("s"), b.var("x"), b.var("s"), b.con(":"));
    let body = b.app(cons, &[x, s]);
    let push = b.fun("push", vec![px, ps], body);
    let empty = b.list(vec![]);
    let sig2 = b.sig(&["fresh"], "Stack");
    let fresh = b.fun("fresh", vec![], empty);
    b.push(sig).push(push).push(sig2).push(fresh);
}

#[test]
fn restricted_synonym_opens_only_in_its_group() {
    let (statics, m) = check_ok(stack_module);
    let stack = Type::Tycon(tycon(&statics, &m, "Stack"));
    let group_of = |name: &str| {
        let b = m.binding(name).unwrap();
        m.groups.iter().find(|g| g.contains(&b)).unwrap().clone()
    };
    let tables = statics.tables();
    let inside = statics.expand_in_group(&m, &group_of("push"), &stack);
    let outside = statics.expand_in_group(&m, &group_of("fresh"), &stack);
    assert_eq!(tables.show_type(&inside).to_string(), "[Int]");
    assert_eq!(tables.show_type(&outside).to_string(), "Stack");
    assert_eq!(statics.full_expand(&stack), stack);
}

#[test]
fn restricted_synonym_needs_its_bindings() {
    let err = check_err(|b| {
        let s = b
            .synonym("Stack", "[Int]")
            .restricted_to(vec![RestrictedItem::Var("pop".into())]);
        b.push(s);
    });
    insta::assert_snapshot!(err.to_string(), @r#"line 1: no top level binding of "pop" for restricted synonym "Stack""#);

    let err = check_err_with(Options::default().haskell98(true), stack_module);
    insta::assert_snapshot!(err.to_string(), @"line 1: Haskell 98 does not support restricted type synonyms");
}

#[test]
fn restricted_synonym_cannot_be_exported_transparently() {
    let err = check_err(|b| {
        b.exports(vec![sable_ast::ExportItem::Entity(sable_ast::Entity::ty_all("Stack"))]);
        stack_module(b);
    });
    insta::assert_snapshot!(err.to_string(), @r#"line 1: transparent export of restricted type synonym "Stack" in module "M""#);
}

// ── Records ──────────────────────────────────────────────────────

fn record_module(b: &mut ModuleBuilder) {
    let r = b.record("R", &[("R", &[("x", "Int"), ("y", "!Int")])]);
    let s = b.record("S", &[("A", &[("a", "Int")]), ("B", &[("b", "Int")])]);
    b.push(r).push(s);
}

#[test]
fn record_construction_and_update() {
    let (statics, m) = check_ok(|b| {
        record_module(b);
        let (one, two) = (b.int(1), b.int(2));
        let r = b.record_con("R", vec![("x", Some(one)), ("y", Some(two))]);
        let mk = b.fun("mk", vec![], r);
        let (pr, rv, three) = (b.pvar("r"), b.var("r"), b.int(3));
        let upd = b.record_update(rv, vec![("x", Some(three))]);
        let set = b.fun("set", vec![pr], upd);
        let (pv, one) = (b.pvar("v"), b.int(1));
        let pat = b.precord("R", vec![("x", Some(pv))]);
        let get = b.fun("get", vec![pat], one);
        b.push(mk).push(set).push(get);
    });
    let tables = statics.tables();
    let x = tables.lookup_name(m.module, "x").unwrap();
    assert!(matches!(tables.names[x].kind, NameKind::Selector { .. }));
    let r = tables.lookup_name(m.module, "R").unwrap();
    assert_eq!(tables.names[r].constructor().unwrap().strict_fields, vec![1]);
}

#[test]
fn shared_field_labels_make_one_selector() {
    let (statics, m) = check_ok(|b| {
        record_module(b);
        let t = b.record("T", &[("T1", &[("f", "Int")]), ("T2", &[("g", "Char"), ("f", "Int")])]);
        b.push(t);
        let (pv, v) = (b.pvar("v"), b.var("v"));
        let pat = b.precord("T2", vec![("f", Some(pv))]);
        let get = b.fun("get", vec![pat], v);
        b.push(get);
    });
    let tables = statics.tables();
    let f = tables.lookup_name(m.module, "f").unwrap();
    let (t1, t2) = (tables.lookup_name(m.module, "T1").unwrap(), tables.lookup_name(m.module, "T2").unwrap());
    let NameKind::Selector { tycon: owner, fields } = &tables.names[f].kind else {
        panic!("selector expected");
    };
    assert_eq!(*owner, tycon(&statics, &m, "T"));
    assert_eq!(fields, &vec![(t1, 0), (t2, 1)]);

    let (a, bsel) = (tables.lookup_name(m.module, "a").unwrap(), tables.lookup_name(m.module, "b").unwrap());
    assert_ne!(a, bsel);
    let NameKind::Selector { fields, .. } = &tables.names[bsel].kind else {
        panic!("selector expected");
    };
    assert_eq!(fields.len(), 1);

    let err = check_err(|b| {
        record_module(b);
        let (px, one) = (b.pvar("x"), b.int(1));
        let pat = b.precord("B", vec![("a", Some(px))]);
        let f = b.fun("f", vec![pat], one);
        b.push(f);
    });
    insta::assert_snapshot!(err.to_string(), @r#"line 1: constructor "B" does not have selected fields"#);
}

#[test]
fn record_errors() {
    let err = check_err(|b| {
        record_module(b);
        let one = b.int(1);
        let r = b.record_con("R", vec![("x", Some(one))]);
        let f = b.fun("f", vec![], r);
        b.push(f);
    });
    insta::assert_snapshot!(err.to_string(), @r#"line 1: construction does not define strict field "y""#);

    let err = check_err(|b| {
        record_module(b);
        let one = b.int(1);
        let r = b.record_con("R", vec![("a", Some(one))]);
        let f = b.fun("f", vec![], r);
        b.push(f);
    });
    insta::assert_snapshot!(err.to_string(), @r#"line 1: constructor "R" does not have selected fields"#);

    let err = check_err(|b| {
        record_module(b);
        let (s, one, two) = (b.var("s"), b.int(1), b.int(2));
        let u = b.record_update(s, vec![("a", Some(one)), ("b", Some(two))]);
        let ps = b.pvar("s");
        let f = b.fun("f", vec![ps], u);
        b.push(f);
    });
    insta::assert_snapshot!(err.to_string(), @"line 1: no constructor has all of the fields specified");

    let err = check_err(|b| {
        record_module(b);
        let (s, one) = (b.var("s"), b.int(1));
        let u = b.record_update(s, vec![("x", Some(one)), ("x", None)]);
        let ps = b.pvar("s");
        let f = b.fun("f", vec![ps], u);
        b.push(f);
    });
    insta::assert_snapshot!(err.to_string(), @r#"line 1: repeated field name "x" in field list"#);

    let err = check_err(|b| {
        record_module(b);
        let s = b.var("s");
        let u = b.record_update(s, vec![]);
        let ps = b.pvar("s");
        let f = b.fun("f", vec![ps], u);
        b.push(f);
    });
    insta::assert_snapshot!(err.to_string(), @"line 1: empty field list in update");

    let err = check_err(|b| {
        record_module(b);
        let (s, one) = (b.var("s"), b.int(1));
        let u = b.record_update(s, vec![("map", Some(one))]);
        let ps = b.pvar("s");
        let f = b.fun("f", vec![ps], u);
        b.push(f);
    });
    insta::assert_snapshot!(err.to_string(), @r#"line 1: "map" is not a selector function/field name"#);
}

#[test]
fn punned_fields_are_not_haskell98() {
    let module = |b: &mut ModuleBuilder| {
        record_module(b);
        let one = b.int(1);
        let pat = b.precord("R", vec![("x", None)]);
        let f = b.fun("f", vec![pat], one);
        b.push(f);
    };
    check_ok(module);
    let err = check_err_with(Options::default().haskell98(true), module);
    insta::assert_snapshot!(err.to_string(), @"line 1: Haskell 98 does not support punned field bindings");
}

// ── Patterns ─────────────────────────────────────────────────────

#[test]
fn pattern_errors() {
    let err = check_err(|b| {
        let (just, one) = (b.pcon("Just", vec![]), b.int(1));
        let f = b.fun("f", vec![just], one);
        b.push(f);
    });
    insta::assert_snapshot!(err.to_string(), @r#"line 1: constructor "Just" must have exactly 1 argument(s) in pattern"#);

    let err = check_err(|b| {
        let (x, y, one) = (b.pvar("x"), b.pvar("x"), b.int(1));
        let f = b.fun("f", vec![x, y], one);
        b.push(f);
    });
    insta::assert_snapshot!(err.to_string(), @r#"line 1: repeated variable "x" in pattern"#);

    let err = check_err(|b| {
        let (p, one) = (b.pnplusk("n", Literal::Int(0)), b.int(1));
        let f = b.fun("f", vec![p], one);
        b.push(f);
    });
    insta::assert_snapshot!(err.to_string(), @"line 1: integer k in n+k pattern must be > 0");

    let err = check_err(|b| {
        let (x, one) = (b.pvar("x"), b.int(1));
        let p = b.pcon("(,)", vec![x]);
        let f = b.fun("f", vec![p], one);
        b.push(f);
    });
    insta::assert_snapshot!(err.to_string(), @"line 1: illegal tuple pattern: 1 components for constructor `(,)`");

    let err = check_err(|b| {
        let (p, one) = (b.pcon("Nope", vec![]), b.int(1));
        let f = b.fun("f", vec![p], one);
        b.push(f);
    });
    insta::assert_snapshot!(err.to_string(), @r#"line 1: undefined constructor function "Nope""#);
}

#[test]
fn infix_patterns_become_constructor_patterns() {
    let (_, m) = check_ok(|b| {
        let (x, xs) = (b.pvar("x"), b.pvar("xs"));
        let p = b.pinfix(vec![operand(x), op(":"), operand(xs)]);
        let body = b.var("x");
        let f = b.fun("hd", vec![p], body);
        b.push(f);
    });
    let hd = m.binding("hd").unwrap();
    let p = m.bindings[hd].alts[0].args[0];
    assert_eq!(m.pattern_cons.get(p), Some(&ConRef::Prim(tables::PrimCon::Cons)));

    let err = check_err(|b| {
        let (x, y) = (b.pvar("x"), b.pvar("y"));
        let p = b.pinfix(vec![operand(x), op("+"), operand(y)]);
        let one = b.int(1);
        let f = b.fun("f", vec![p], one);
        b.push(f);
    });
    insta::assert_snapshot!(err.to_string(), @"line 1: illegal pattern syntax: variable operator in pattern");
}

#[test]
fn pattern_type_annotations() {
    let (_, m) = check_ok(|b| {
        let x = b.pvar("x");
        let p = b.ptyped(x, "Maybe a");
        let body = b.var("x");
        let f = b.fun("f", vec![p], body);
        b.push(f);
    });
    assert_eq!(m.pattern_types.iter().count(), 1);

    let err = check_err_with(Options::default().haskell98(true), |b| {
        let x = b.pvar("x");
        let p = b.ptyped(x, "Int");
        let one = b.int(1);
        let f = b.fun("f", vec![p], one);
        b.push(f);
    });
    insta::assert_snapshot!(err.to_string(), @"line 1: Haskell 98 does not support pattern type annotations");
}

// ── Expressions and scopes ───────────────────────────────────────

#[test]
fn infix_expressions_follow_fixities() {
    let (_, m) = check_ok(|b| {
        let (one, two, three) = (b.int(1), b.int(2), b.int(3));
        let e = b.infix(vec![operand(one), op("+"), operand(two), op("*"), operand(three)]);
        let f = b.fun("f", vec![], e);
        let (one, two) = (b.int(1), b.int(2));
        let n = b.infix(vec![InfixElem::Negate, operand(one), op("+"), operand(two)]);
        let g = b.fun("g", vec![], n);
        let (x, y, xs) = (b.var("x"), b.var("y"), b.var("xs"));
        let c = b.infix(vec![operand(x), op(":"), operand(y), op(":"), operand(xs)]);
        let (px, py, pxs) = (b.pvar("x"), b.pvar("y"), b.pvar("xs"));
        let h = b.fun("h", vec![px, py, pxs], c);
        b.push(f).push(g).push(h);
    });
    assert_eq!(render(&m.ast, body_of(&m, "f")), "((+ 1) ((* 2) 3))");
    assert_eq!(render(&m.ast, body_of(&m, "g")), "((+ -1) 2)");
    assert_eq!(render(&m.ast, body_of(&m, "h")), "((: x) ((: y) xs))");
}

#[test]
fn unary_minus_follows_its_fixity() {
    let (_, m) = check_ok(|b| {
        let (one, two) = (b.int(1), b.int(2));
        let e = b.infix(vec![operand(one), op("+"), InfixElem::Negate, operand(two)]);
        let f = b.fun("f", vec![], e);
        let one = b.int(1);
        let e = b.infix(vec![InfixElem::Negate, InfixElem::Negate, operand(one)]);
        let g = b.fun("g", vec![], e);
        let (px, py, x, y) = (b.pvar("x"), b.pvar("y"), b.var("x"), b.var("y"));
        let e = b.infix(vec![InfixElem::Negate, operand(x), op("*"), operand(y)]);
        let h = b.fun("h", vec![px, py], e);
        let (px, x) = (b.pvar("x"), b.var("x"));
        let e = b.infix(vec![InfixElem::Negate, InfixElem::Negate, operand(x)]);
        let k = b.fun("k", vec![px], e);
        b.push(f).push(g).push(h).push(k);
    });
    assert_eq!(render(&m.ast, body_of(&m, "f")), "((+ 1) -2)");
    assert_eq!(render(&m.ast, body_of(&m, "g")), "1");
    assert_eq!(render(&m.ast, body_of(&m, "h")), "(negate ((* x) y))");
    assert_eq!(render(&m.ast, body_of(&m, "k")), "(negate (negate x))");
}

#[test]
fn infix_ambiguities_are_reported() {
    let err = check_err(|b| {
        let (x, y, z) = (b.int(1), b.int(2), b.int(3));
        let e = b.infix(vec![operand(x), op("=="), operand(y), op("=="), operand(z)]);
        let f = b.fun("f", vec![], e);
        b.push(f);
    });
    insta::assert_snapshot!(err.to_string(), @r#"line 1: ambiguous use of operator "==" with "==""#);

    let err = check_err(|b| {
        let (pa, pb, a) = (b.pvar("a"), b.pvar("b"), b.var("a"));
        let fixity = b.fixity(Assoc::Right, 6, &["+>"]);
        let plus = b.fun("+>", vec![pa, pb], a);
        let (x, y) = (b.int(1), b.int(2));
        let e = b.infix(vec![InfixElem::Negate, operand(x), op("+>"), operand(y)]);
        let f = b.fun("f", vec![], e);
        b.push(fixity).push(plus).push(f);
    });
    insta::assert_snapshot!(err.to_string(), @r#"line 1: ambiguous use of unary minus with "+>""#);
}

#[test]
fn local_fixity_declarations_apply() {
    let (_, m) = check_ok(|b| {
        let (pa, pb, a) = (b.pvar("a"), b.pvar("b"), b.var("a"));
        let decls = vec![b.fixity(Assoc::Right, 9, &["<+>"]), b.fun("<+>", vec![pa, pb], a)];
        let (one, two, three) = (b.int(1), b.int(2), b.int(3));
        let chain = b.infix(vec![operand(one), op("<+>"), operand(two), op("+"), operand(three)]);
        let e = b.let_in(decls, chain);
        let f = b.fun("f", vec![], e);
        b.push(f);
    });
    let body = body_of(&m, "f");
    let ExprKind::Let { body: chain, .. } = m.ast.exprs[body].kind.clone() else {
        panic!("let expected");
    };
    assert_eq!(render(&m.ast, chain), "((+ ((<+> 1) 2)) 3)");
}

#[test]
fn let_bindings_are_grouped() {
    let (_, m) = check_ok(|b| {
        let (bv, one) = (b.var("b"), b.int(1));
        let decls = vec![b.fun("a", vec![], bv), b.fun("b", vec![], one)];
        let a = b.var("a");
        let e = b.let_in(decls, a);
        let f = b.fun("f", vec![], e);
        b.push(f);
    });
    let body = body_of(&m, "f");
    let groups = &m.local_groups[&ScopeKey::Let(body)];
    assert_eq!(m.texts(groups), vec![vec!["b"], vec!["a"]]);
    let ExprKind::Let { body: inner, .. } = m.ast.exprs[body].kind.clone() else {
        panic!("let expected");
    };
    assert!(matches!(m.resolutions.get(inner), Some(VarRef::Binding(_))));
}

#[test]
fn comprehensions_and_do_blocks_scope_left_to_right() {
    let (_, m) = check_ok(|b| {
        let (px, xs) = (b.pvar("x"), b.var("xs"));
        let (x, y) = (b.var("x"), b.var("y"));
        let let_y = vec![b.fun("y", vec![], x)];
        let (y2, t) = (b.var("y"), b.con("True"));
        let guard = b.infix(vec![operand(y2), op("=="), operand(t)]);
        let quals = vec![
            Qualifier::Generator { pat: px, expr: xs },
            Qualifier::Let(let_y),
            Qualifier::Guard(guard),
        ];
        let e = b.comprehension(y, quals);
        let pxs = b.pvar("xs");
        let f = b.fun("f", vec![pxs], e);
        b.push(f);
    });
    let body = body_of(&m, "f");
    let groups = &m.local_groups[&ScopeKey::Qualifier { expr: body, index: 1 }];
    assert_eq!(m.texts(groups), vec![vec!["y"]]);

    let err = check_err(|b| {
        let (x, px, xs) = (b.var("x"), b.pvar("x"), b.var("xs"));
        let quals = vec![Qualifier::Guard(x), Qualifier::Generator { pat: px, expr: xs }];
        let one = b.int(1);
        let e = b.do_block(quals, one);
        let pxs = b.pvar("xs");
        let f = b.fun("f", vec![pxs], e);
        b.push(f);
    });
    insta::assert_snapshot!(err.to_string(), @r#"line 1: undefined variable "x""#);
}

#[test]
fn case_alternatives_with_where_clauses() {
    let (_, m) = check_ok(|b| {
        let (pj, pn) = (b.pvar("v"), b.pcon("Nothing", vec![]));
        let just = b.pcon("Just", vec![pj]);
        let (w, v) = (b.var("w"), b.var("v"));
        let mut rhs = b.rhs(w);
        rhs.wheres = vec![b.fun("w", vec![], v)];
        let zero = b.int(0);
        let none = b.rhs(zero);
        let s = b.var("s");
        let e = b.expr(ExprKind::Case {
            scrutinee: s,
            alts: vec![CaseAlt { pat: just, rhs }, CaseAlt { pat: pn, rhs: none }],
        });
        let ps = b.pvar("s");
        let f = b.fun("f", vec![ps], e);
        b.push(f);
    });
    let body = body_of(&m, "f");
    let groups = &m.local_groups[&ScopeKey::CaseAlt { expr: body, index: 0 }];
    assert_eq!(m.texts(groups), vec![vec!["w"]]);
    assert!(!m.local_groups.contains_key(&ScopeKey::CaseAlt { expr: body, index: 1 }));
}

#[test]
fn class_defaults_resolve_against_top_level() {
    let (statics, m) = check_ok(|b| {
        let (px, x, helper) = (b.pvar("x"), b.var("x"), b.var("helper"));
        let body = b.app(helper, &[x]);
        let members = vec![b.sig(&["describe"], "a -> Int"), b.fun("describe", vec![px], body)];
        let c = b.class("Describe a", members);
        let (pw, zero) = (b.pwild(), b.int(0));
        let helper = b.fun("helper", vec![pw], zero);
        b.push(c).push(helper);
    });
    let class = statics.tables().lookup_class(m.module, "Describe").unwrap();
    let slot = m.class_defaults[&class][0].unwrap();
    let RhsBody::Plain(body) = m.bindings[slot].alts[0].rhs.body else {
        panic!("plain body expected");
    };
    let ExprKind::App(f, _) = m.ast.exprs[body].kind else {
        panic!("application expected");
    };
    assert_eq!(m.resolutions.get(f), Some(&VarRef::Binding(m.binding("helper").unwrap())));
}

#[test]
fn signatures_and_annotations_are_checked() {
    let (statics, m) = check_ok(|b| {
        let sig = b.sig(&["f"], "Eq a => a -> a -> Bool");
        let (px, py, x, y) = (b.pvar("x"), b.pvar("y"), b.var("x"), b.var("y"));
        let e = b.infix(vec![operand(x), op("=="), operand(y)]);
        let f = b.fun("f", vec![px, py], e);
        let one = b.int(1);
        let t = b.typed(one, "Int");
        let g = b.fun("g", vec![], t);
        b.push(sig).push(f).push(g);
    });
    let tables = statics.tables();
    let f = tables.lookup_name(m.module, "f").unwrap();
    let ty = tables.names[f].ty.as_ref().unwrap();
    insta::assert_snapshot!(tables.show_type(ty).to_string(), @"forall a. Eq a => a -> a -> Bool");
    assert_eq!(m.annotations.iter().count(), 1);

    let err = check_err(|b| {
        let sig = b.sig(&["f"], "Eq b => a -> a");
        let (px, x) = (b.pvar("x"), b.var("x"));
        let f = b.fun("f", vec![px], x);
        b.push(sig).push(f);
    });
    assert!(matches!(err.kind, ErrorKind::AmbiguousType { .. }), "{}", err);
}

#[test]
fn qualified_references_to_own_top_level() {
    let (_, m) = check_ok(|b| {
        let one = b.int(1);
        let f = b.fun("f", vec![], one);
        let q = b.var("M.f");
        let g = b.fun("g", vec![], q);
        b.push(f).push(g);
    });
    assert_eq!(m.group_texts(), vec![vec!["f"], vec!["g"]]);
    let g = body_of(&m, "g");
    assert_eq!(m.resolutions.get(g), Some(&VarRef::Binding(m.binding("f").unwrap())));
}

#[test]
fn interactive_expressions() {
    let mut statics = Statics::with_prelude(Options::default()).unwrap();
    statics
        .analyze_module(build(|b| {
            let one = b.int(1);
            let f = b.fun("answer", vec![], one);
            b.push(f);
        }))
        .unwrap();
    let names = statics.tables().names.len();

    let mut b = ModuleBuilder::new("M");
    let (answer, two) = (b.var("answer"), b.int(2));
    let root = b.infix(vec![operand(answer), op("*"), operand(two)]);
    let e = statics.analyze_expr("M", b.finish().unwrap(), root).unwrap();
    assert_eq!(render(&e.ast, root), "((* answer) 2)");
    assert_eq!(statics.tables().names.len(), names);

    let mut b = ModuleBuilder::new("M");
    let root = b.var("answer");
    let err = statics.analyze_expr("Nope", b.finish().unwrap(), root).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @r#"line 1: unknown module "Nope""#);
}

#[test]
fn guarded_right_hand_sides_are_walked() {
    let err = check_err(|b| {
        let (g, x) = (b.var("otherwise"), b.var("missing"));
        let f = b.fun_guarded("f", vec![], vec![(g, x)]);
        b.push(f);
    });
    insta::assert_snapshot!(err.to_string(), @r#"line 1: undefined variable "missing""#);
}

#[test]
fn top_level_fixity_for_constructors() {
    let (statics, m) = check_ok(|b| {
        let mut d = b.data("Op", &["Plus Int Int"]);
        d.constructors[0].name = ":+".into();
        let fixity = b.fixity(Assoc::Left, 6, &[":+"]);
        b.push(d).push(fixity);
    });
    let tables = statics.tables();
    let con = tables.lookup_name(m.module, ":+").unwrap();
    assert_eq!(tables.names[con].fixity, Some(sable_ast::Fixity::new(Assoc::Left, 6)));
    assert!(matches!(tables.tycons[tycon(&statics, &m, "Op")].body, TyconBody::Constructors(_)));
}

// ── Properties ───────────────────────────────────────────────────

/// Top-level bindings `f0 .. fn` where `fi` mentions each `fj` in
/// `deps[i]`.
fn chain_module(deps: &[Vec<usize>]) -> Module {
    build(|b| {
        for (i, ds) in deps.iter().enumerate() {
            let refs: Vec<_> = ds.iter().map(|j| b.var(&format!("f{}", j))).collect();
            let body = b.list(refs);
            let f = b.fun(&format!("f{}", i), vec![], body);
            b.push(f);
        }
    })
}

#[derive(Clone, Debug)]
enum Shape {
    Leaf(u8),
    Unary(u8, Box<Shape>),
    Arrow(Box<Shape>, Box<Shape>),
}

fn shape() -> impl Strategy<Value = Shape> {
    (0u8..4).prop_map(Shape::Leaf).prop_recursive(4, 24, 2, |inner| {
        prop_oneof![
            ((0u8..3), inner.clone()).prop_map(|(k, s)| Shape::Unary(k, Box::new(s))),
            (inner.clone(), inner).prop_map(|(a, r)| Shape::Arrow(Box::new(a), Box::new(r))),
        ]
    })
}

fn to_type(tables: &Tables, prelude: ModuleId, s: &Shape) -> Type {
    let tc = |t: &str| tables.lookup_tycon(prelude, t).map_or(Type::Offset(0), Type::Tycon);
    match s {
        Shape::Leaf(0) => tc("String"),
        Shape::Leaf(1) => tc("Int"),
        Shape::Leaf(2) => tc("ShowS"),
        Shape::Leaf(_) => Type::Offset(0),
        Shape::Unary(k, inner) => {
            let head = match k {
                0 => tc("Maybe"),
                1 => Type::Prim(types::Prim::List),
                _ => tc("ReadS"),
            };
            Type::app(head, to_type(tables, prelude, inner))
        }
        Shape::Arrow(a, r) => Type::arrow(to_type(tables, prelude, a), to_type(tables, prelude, r)),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn binding_groups_respect_dependencies_and_are_deterministic(
        deps in proptest::collection::vec(proptest::collection::vec(0usize..8, 0..3), 1..8)
    ) {
        let n = deps.len();
        let deps: Vec<Vec<usize>> = deps.into_iter().map(|ds| ds.into_iter().filter(|&j| j < n).collect()).collect();
        let run = || {
            let mut statics = Statics::with_prelude(Options::default()).unwrap();
            statics.analyze_module(chain_module(&deps)).unwrap().group_texts()
        };
        let groups = run();
        prop_assert_eq!(&groups, &run());

        let position = |i: usize| {
            let text = format!("f{}", i);
            groups.iter().position(|g| g.iter().any(|t| *t == text)).unwrap()
        };
        for (i, ds) in deps.iter().enumerate() {
            for &j in ds {
                prop_assert!(position(j) <= position(i));
            }
        }
        prop_assert_eq!(groups.iter().map(Vec::len).sum::<usize>(), n);
    }

    #[test]
    fn synonym_expansion_is_idempotent(s in shape()) {
        let statics = Statics::with_prelude(Options::default()).unwrap();
        let tables = statics.tables();
        let prelude = tables.find_module("Prelude").unwrap();
        let ty = to_type(tables, prelude, &s);
        let once = tables.full_expand(&ty);
        prop_assert_eq!(tables.full_expand(&once), once);
    }
}
