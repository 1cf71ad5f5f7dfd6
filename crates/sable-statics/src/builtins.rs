//! The built-in Prelude.
//!
//! Built with [`ModuleBuilder`] and analysed like any other module, so the
//! standard types and classes get their handles, dictionaries and derived
//! instances from the same passes user code goes through.

use sable_ast::builder::{op, operand};
use sable_ast::{Assoc, BuildError, ExprId, Module, ModuleBuilder, PatternId, ValueDecl};

/// Primitive types with no visible constructors.
const PRIMITIVES: &[&str] = &["Int", "Integer", "Float", "Double", "Char"];

/// Instances for the primitive types, lists, unit and pairs.
const INSTANCES: &[&str] = &[
    "Eq Int",
    "Ord Int",
    "Enum Int",
    "Bounded Int",
    "Show Int",
    "Read Int",
    "Ix Int",
    "Num Int",
    "Eq Integer",
    "Ord Integer",
    "Enum Integer",
    "Show Integer",
    "Read Integer",
    "Ix Integer",
    "Num Integer",
    "Eq Float",
    "Ord Float",
    "Enum Float",
    "Show Float",
    "Read Float",
    "Num Float",
    "Eq Double",
    "Ord Double",
    "Enum Double",
    "Show Double",
    "Read Double",
    "Num Double",
    "Eq Char",
    "Ord Char",
    "Enum Char",
    "Bounded Char",
    "Show Char",
    "Read Char",
    "Ix Char",
    "Eq a => Eq [a]",
    "Ord a => Ord [a]",
    "Show a => Show [a]",
    "Read a => Read [a]",
    "Eq ()",
    "Ord ()",
    "Enum ()",
    "Bounded ()",
    "Show ()",
    "Read ()",
    "Ix ()",
    "(Eq a, Eq b) => Eq (a, b)",
    "(Ord a, Ord b) => Ord (a, b)",
    "(Bounded a, Bounded b) => Bounded (a, b)",
    "(Show a, Show b) => Show (a, b)",
    "(Read a, Read b) => Read (a, b)",
    "(Ix a, Ix b) => Ix (a, b)",
];

/// Builds the Prelude module.
pub fn prelude() -> Result<Module, BuildError> {
    let mut b = ModuleBuilder::new("Prelude");
    types(&mut b);
    classes(&mut b);
    for head in INSTANCES {
        let inst = b.instance(head, Vec::new());
        b.push(inst);
    }
    functions(&mut b);
    b.finish()
}

fn types(b: &mut ModuleBuilder) {
    for prim in PRIMITIVES {
        let d = b.data(prim, &[]);
        b.push(d);
    }
    let all = ["Eq", "Ord", "Enum", "Bounded", "Show", "Read", "Ix"];
    let bool_ = b.data("Bool", &["False", "True"]).deriving(&all);
    let ordering = b.data("Ordering", &["LT", "EQ", "GT"]).deriving(&all);
    let maybe = b.data("Maybe a", &["Nothing", "Just a"]).deriving(&["Eq", "Ord", "Show", "Read"]);
    b.push(bool_).push(ordering).push(maybe);

    let synonyms = [
        ("String", "[Char]"),
        ("ShowS", "String -> String"),
        ("ReadS a", "String -> [(a, String)]"),
    ];
    for (lhs, rhs) in synonyms {
        let s = b.synonym(lhs, rhs);
        b.push(s);
    }
}

// ── Classes ──────────────────────────────────────────────────────

fn classes(b: &mut ModuleBuilder) {
    let eq = {
        let (px, py) = (b.pvar("x"), b.pvar("y"));
        let (x, y, not) = (b.var("x"), b.var("y"), b.var("not"));
        let test = b.infix(vec![operand(x), op("=="), operand(y)]);
        let body = b.app(not, &[test]);
        vec![
            b.sig(&["==", "/="], "a -> a -> Bool"),
            b.fixity(Assoc::Non, 4, &["==", "/="]),
            b.fun("/=", vec![px, py], body),
        ]
    };
    let c = b.class("Eq a", eq);
    b.push(c);

    let ord = {
        let max = choose(b, "max", "y", "x");
        let min = choose(b, "min", "x", "y");
        vec![
            b.sig(&["compare"], "a -> a -> Ordering"),
            b.sig(&["<", "<=", ">", ">="], "a -> a -> Bool"),
            b.sig(&["max", "min"], "a -> a -> a"),
            b.fixity(Assoc::Non, 4, &["<", "<=", ">", ">="]),
            max,
            min,
        ]
    };
    let c = b.class("Eq a => Ord a", ord);
    b.push(c);

    let enum_ = vec![
        b.sig(&["toEnum"], "Int -> a"),
        b.sig(&["fromEnum"], "a -> Int"),
        b.sig(&["enumFrom"], "a -> [a]"),
        b.sig(&["enumFromThen"], "a -> a -> [a]"),
        b.sig(&["succ", "pred"], "a -> a"),
    ];
    let c = b.class("Enum a", enum_);
    b.push(c);

    let bounded = vec![b.sig(&["minBound", "maxBound"], "a")];
    let c = b.class("Bounded a", bounded);
    b.push(c);

    let show = {
        let px = b.pvar("x");
        let (shows_prec, zero, x, empty) = (b.var("showsPrec"), b.int(0), b.var("x"), b.string(""));
        let body = b.app(shows_prec, &[zero, x, empty]);
        vec![
            b.sig(&["showsPrec"], "Int -> a -> ShowS"),
            b.sig(&["show"], "a -> String"),
            b.sig(&["showList"], "[a] -> ShowS"),
            b.fun("show", vec![px], body),
        ]
    };
    let c = b.class("Show a", show);
    b.push(c);

    let read = vec![b.sig(&["readsPrec"], "Int -> ReadS a"), b.sig(&["readList"], "ReadS [a]")];
    let c = b.class("Read a", read);
    b.push(c);

    let ix = vec![
        b.sig(&["range"], "(a, a) -> [a]"),
        b.sig(&["index"], "(a, a) -> a -> Int"),
        b.sig(&["inRange"], "(a, a) -> a -> Bool"),
    ];
    let c = b.class("Ord a => Ix a", ix);
    b.push(c);

    let num = vec![
        b.sig(&["+", "-", "*"], "a -> a -> a"),
        b.sig(&["negate", "abs", "signum"], "a -> a"),
        b.sig(&["fromInteger"], "Integer -> a"),
        b.fixity(Assoc::Left, 6, &["+", "-"]),
        b.fixity(Assoc::Left, 7, &["*"]),
    ];
    let c = b.class("(Eq a, Show a) => Num a", num);
    b.push(c);
}

/// `name x y = if x <= y then a else b`
fn choose(b: &mut ModuleBuilder, name: &str, a: &str, other: &str) -> ValueDecl {
    let (px, py) = (b.pvar("x"), b.pvar("y"));
    let (x, y) = (b.var("x"), b.var("y"));
    let test = b.infix(vec![operand(x), op("<="), operand(y)]);
    let (then_branch, else_branch) = (b.var(a), b.var(other));
    let body = b.if_then_else(test, then_branch, else_branch);
    b.fun(name, vec![px, py], body)
}

// ── Functions ────────────────────────────────────────────────────

fn cons_pat(b: &mut ModuleBuilder, head: &str, tail: &str) -> PatternId {
    let (x, xs) = (b.pvar(head), b.pvar(tail));
    b.pcon(":", vec![x, xs])
}

fn cons(b: &mut ModuleBuilder, head: ExprId, tail: ExprId) -> ExprId {
    let c = b.con(":");
    b.app(c, &[head, tail])
}

fn functions(b: &mut ModuleBuilder) {
    let mut decls = vec![b.sig(&["not"], "Bool -> Bool")];
    for (arg, result) in [("True", "False"), ("False", "True")] {
        let (p, r) = (b.pcon(arg, vec![]), b.con(result));
        decls.push(b.fun("not", vec![p], r));
    }

    let t = b.con("True");
    decls.push(b.sig(&["otherwise"], "Bool"));
    decls.push(b.fun("otherwise", vec![], t));

    let (px, x) = (b.pvar("x"), b.var("x"));
    decls.push(b.sig(&["id"], "a -> a"));
    decls.push(b.fun("id", vec![px], x));

    let (pf, pg, px) = (b.pvar("f"), b.pvar("g"), b.pvar("x"));
    let (f, g, x) = (b.var("f"), b.var("g"), b.var("x"));
    let inner = b.app(g, &[x]);
    let body = b.app(f, &[inner]);
    decls.push(b.sig(&["."], "(b -> c) -> (a -> b) -> a -> c"));
    decls.push(b.fixity(Assoc::Right, 9, &["."]));
    decls.push(b.fun(".", vec![pf, pg, px], body));

    let (pf, px, f, x) = (b.pvar("f"), b.pvar("x"), b.var("f"), b.var("x"));
    let body = b.app(f, &[x]);
    decls.push(b.sig(&["$"], "(a -> b) -> a -> b"));
    decls.push(b.fixity(Assoc::Right, 0, &["$"]));
    decls.push(b.fun("$", vec![pf, px], body));

    decls.push(b.sig(&["&&", "||"], "Bool -> Bool -> Bool"));
    decls.push(b.fixity(Assoc::Right, 3, &["&&"]));
    decls.push(b.fixity(Assoc::Right, 2, &["||"]));
    for (name, passes, stops) in [("&&", "True", "False"), ("||", "False", "True")] {
        let (p, px, x) = (b.pcon(passes, vec![]), b.pvar("x"), b.var("x"));
        decls.push(b.fun(name, vec![p, px], x));
        let (p, w, r) = (b.pcon(stops, vec![]), b.pwild(), b.con(stops));
        decls.push(b.fun(name, vec![p, w], r));
    }

    decls.push(b.sig(&["++"], "[a] -> [a] -> [a]"));
    decls.push(b.fixity(Assoc::Right, 5, &["++"]));
    let (nil, pys, ys) = (b.plist(vec![]), b.pvar("ys"), b.var("ys"));
    decls.push(b.fun("++", vec![nil, pys], ys));
    let (p, pys) = (cons_pat(b, "x", "xs"), b.pvar("ys"));
    let (x, xs, ys) = (b.var("x"), b.var("xs"), b.var("ys"));
    let rest = b.infix(vec![operand(xs), op("++"), operand(ys)]);
    let body = cons(b, x, rest);
    decls.push(b.fun("++", vec![p, pys], body));

    decls.push(b.sig(&["map"], "(a -> b) -> [a] -> [b]"));
    let (pf, nil, empty) = (b.pwild(), b.plist(vec![]), b.list(vec![]));
    decls.push(b.fun("map", vec![pf, nil], empty));
    let (pf, p) = (b.pvar("f"), cons_pat(b, "x", "xs"));
    let (f, x, map, f2, xs) = (b.var("f"), b.var("x"), b.var("map"), b.var("f"), b.var("xs"));
    let head = b.app(f, &[x]);
    let tail = b.app(map, &[f2, xs]);
    let body = cons(b, head, tail);
    decls.push(b.fun("map", vec![pf, p], body));

    for (name, pick, ty) in [("fst", "x", "(a, b) -> a"), ("snd", "y", "(a, b) -> b")] {
        let (px, py) = (b.pvar("x"), b.pvar("y"));
        let pair = b.ptuple(vec![px, py]);
        let r = b.var(pick);
        decls.push(b.sig(&[name], ty));
        decls.push(b.fun(name, vec![pair], r));
    }

    for d in decls {
        b.push(d);
    }
    let error = b.foreign_import("primError", "error", "String -> a");
    b.push(error);
}
