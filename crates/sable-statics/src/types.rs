use sable_ast::Ident;
use std::fmt;

use crate::kinds::Kind;
use crate::tables::{ClassId, Tables, TyconId};

// ── Types ─────────────────────────────────────────────────────────

/// Type skeleton. Bound type variables are positional offsets; constructor
/// references are identifiers until resolved against the symbol tables.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    /// Bound type variable. A `Forall` binds the offsets following those
    /// already in scope.
    Offset(usize),
    /// Unresolved constructor reference.
    Ident(Ident),
    Tycon(TyconId),
    Prim(Prim),
    App(Box<Type>, Box<Type>),
    /// Quantifies `kinds.len()` further offsets.
    Forall { kinds: Vec<Kind>, body: Box<Type> },
    Qual { context: Vec<Pred>, body: Box<Type> },
}

/// Built-in type constructors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Prim {
    Arrow,
    List,
    Unit,
    Tuple(usize),
}

impl Prim {
    pub fn arity(self) -> usize {
        match self {
            Prim::Arrow => 2,
            Prim::List => 1,
            Prim::Unit => 0,
            Prim::Tuple(n) => n,
        }
    }

    pub fn kind(self) -> Kind {
        Kind::simple(self.arity())
    }

    /// Recognizes the written forms `->`, `[]`, `()` and `(,..)`.
    pub fn from_text(text: &str) -> Option<Prim> {
        match text {
            "->" => Some(Prim::Arrow),
            "[]" => Some(Prim::List),
            "()" => Some(Prim::Unit),
            _ => sable_ast::tuple_con_arity(text).map(Prim::Tuple),
        }
    }
}

/// Class constraint `C t1 .. tn`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Pred {
    pub class: ClassRef,
    pub args: Vec<Type>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ClassRef {
    Ident(Ident),
    Class(ClassId),
}

impl ClassRef {
    pub fn id(&self) -> Option<ClassId> {
        match self {
            ClassRef::Class(c) => Some(*c),
            ClassRef::Ident(_) => None,
        }
    }
}

impl Pred {
    pub fn new(class: ClassId, args: Vec<Type>) -> Self {
        Self {
            class: ClassRef::Class(class),
            args,
        }
    }

    pub fn map_args(&self, f: impl Fn(&Type) -> Type) -> Pred {
        Pred {
            class: self.class.clone(),
            args: self.args.iter().map(f).collect(),
        }
    }

    pub fn collect_offsets(&self, acc: &mut Vec<usize>) {
        for a in &self.args {
            a.collect_offsets(acc);
        }
    }
}

impl Type {
    pub fn app(f: Type, a: Type) -> Type {
        Type::App(Box::new(f), Box::new(a))
    }

    pub fn apply(head: Type, args: impl IntoIterator<Item = Type>) -> Type {
        args.into_iter().fold(head, Type::app)
    }

    pub fn arrow(a: Type, b: Type) -> Type {
        Type::apply(Type::Prim(Prim::Arrow), [a, b])
    }

    /// `head o0 .. on-1`
    pub fn applied_to_offsets(head: Type, n: usize) -> Type {
        Type::apply(head, (0..n).map(Type::Offset))
    }

    /// Head and arguments of an application spine.
    pub fn spine(&self) -> (&Type, Vec<&Type>) {
        let mut args = Vec::new();
        let mut t = self;
        while let Type::App(f, a) = t {
            args.push(&**a);
            t = f;
        }
        args.reverse();
        (t, args)
    }

    pub fn head(&self) -> &Type {
        let mut t = self;
        while let Type::App(f, _) = t {
            t = f;
        }
        t
    }

    /// Distinct offsets in left-to-right order of first occurrence.
    pub fn collect_offsets(&self, acc: &mut Vec<usize>) {
        match self {
            Type::Offset(o) => {
                if !acc.contains(o) {
                    acc.push(*o);
                }
            }
            Type::App(f, a) => {
                f.collect_offsets(acc);
                a.collect_offsets(acc);
            }
            Type::Forall { body, .. } => body.collect_offsets(acc),
            Type::Qual { context, body } => {
                for p in context {
                    p.collect_offsets(acc);
                }
                body.collect_offsets(acc);
            }
            Type::Ident(_) | Type::Tycon(_) | Type::Prim(_) => {}
        }
    }

    pub fn offsets(&self) -> Vec<usize> {
        let mut acc = Vec::new();
        self.collect_offsets(&mut acc);
        acc
    }

    pub fn mentions_offset(&self, o: usize) -> bool {
        self.offsets().contains(&o)
    }

    /// Replaces `Offset(i)` by `args[i]`. Offsets beyond `args` are kept.
    pub fn instantiate(&self, args: &[Type]) -> Type {
        match self {
            Type::Offset(o) => args.get(*o).cloned().unwrap_or(Type::Offset(*o)),
            Type::App(f, a) => Type::app(f.instantiate(args), a.instantiate(args)),
            Type::Forall { kinds, body } => Type::Forall {
                kinds: kinds.clone(),
                body: Box::new(body.instantiate(args)),
            },
            Type::Qual { context, body } => Type::Qual {
                context: context.iter().map(|p| p.map_args(|t| t.instantiate(args))).collect(),
                body: Box::new(body.instantiate(args)),
            },
            other => other.clone(),
        }
    }

    /// Renumbers every offset by `by`.
    pub fn shift(&self, by: usize) -> Type {
        match self {
            Type::Offset(o) => Type::Offset(o + by),
            Type::App(f, a) => Type::app(f.shift(by), a.shift(by)),
            Type::Forall { kinds, body } => Type::Forall {
                kinds: kinds.clone(),
                body: Box::new(body.shift(by)),
            },
            Type::Qual { context, body } => Type::Qual {
                context: context.iter().map(|p| p.map_args(|t| t.shift(by))).collect(),
                body: Box::new(body.shift(by)),
            },
            other => other.clone(),
        }
    }

    /// Strips an outer quantifier and context.
    pub fn body(&self) -> &Type {
        match self {
            Type::Forall { body, .. } => body.body(),
            Type::Qual { body, .. } => body,
            other => other,
        }
    }

    pub fn context(&self) -> &[Pred] {
        match self {
            Type::Forall { body, .. } => body.context(),
            Type::Qual { context, .. } => context,
            _ => &[],
        }
    }

    /// Argument types of a function type `a1 -> .. -> an -> r`.
    pub fn arrow_args(&self) -> Vec<&Type> {
        let mut out = Vec::new();
        let mut t = self;
        loop {
            let (head, args) = t.spine();
            match (head, args.as_slice()) {
                (Type::Prim(Prim::Arrow), [a, r]) => {
                    out.push(*a);
                    t = *r;
                }
                _ => return out,
            }
        }
    }

    /// A qualified type is ambiguous when a variable of its context does not
    /// occur in its body.
    pub fn is_ambiguous(&self) -> bool {
        let (context, body) = match self {
            Type::Forall { body, .. } => return body.is_ambiguous(),
            Type::Qual { context, body } => (context, body),
            _ => return false,
        };
        let in_body = body.offsets();
        let mut in_context = Vec::new();
        for p in context {
            p.collect_offsets(&mut in_context);
        }
        in_context.iter().any(|o| !in_body.contains(o))
    }
}

// ── Rendering ─────────────────────────────────────────────────────

/// Name used when printing offset `o`: `a`, `b`, .., `z`, `a1`, ..
pub fn offset_name(o: usize) -> String {
    let letter = (b'a' + (o % 26) as u8) as char;
    if o < 26 {
        letter.to_string()
    } else {
        format!("{}{}", letter, o / 26)
    }
}

pub struct TypeDisplay<'a> {
    pub ty: &'a Type,
    pub tables: &'a Tables,
}

pub struct PredDisplay<'a> {
    pub pred: &'a Pred,
    pub tables: &'a Tables,
}

impl Tables {
    pub fn show_type<'a>(&'a self, ty: &'a Type) -> TypeDisplay<'a> {
        TypeDisplay { ty, tables: self }
    }

    pub fn show_pred<'a>(&'a self, pred: &'a Pred) -> PredDisplay<'a> {
        PredDisplay { pred, tables: self }
    }

    pub fn show_context(&self, context: &[Pred]) -> String {
        let parts: Vec<String> = context.iter().map(|p| self.show_pred(p).to_string()).collect();
        match parts.len() {
            1 => parts[0].clone(),
            _ => format!("({})", parts.join(", ")),
        }
    }

    fn class_text(&self, class: &ClassRef) -> String {
        match class {
            ClassRef::Ident(i) => i.to_string(),
            ClassRef::Class(c) => self.classes[*c].text.to_string(),
        }
    }
}

#[derive(Clone, Copy, PartialEq, PartialOrd)]
enum Prec {
    Top,
    Fun,
    Arg,
}

fn write_type(f: &mut fmt::Formatter<'_>, tables: &Tables, ty: &Type, prec: Prec) -> fmt::Result {
    match ty {
        Type::Offset(o) => write!(f, "{}", offset_name(*o)),
        Type::Ident(i) => write!(f, "{}", i),
        Type::Tycon(t) => write!(f, "{}", tables.tycons[*t].text),
        Type::Prim(Prim::Arrow) => write!(f, "(->)"),
        Type::Prim(Prim::List) => write!(f, "[]"),
        Type::Prim(Prim::Unit) => write!(f, "()"),
        Type::Prim(Prim::Tuple(n)) => write!(f, "{}", sable_ast::tuple_con_text(*n)),
        Type::Forall { kinds, body } => {
            if prec > Prec::Top {
                write!(f, "(")?;
            }
            let first = body.min_bound_offset(kinds.len());
            write!(f, "forall")?;
            for o in first..first + kinds.len() {
                write!(f, " {}", offset_name(o))?;
            }
            write!(f, ". ")?;
            write_type(f, tables, body, Prec::Top)?;
            if prec > Prec::Top {
                write!(f, ")")?;
            }
            Ok(())
        }
        Type::Qual { context, body } => {
            if prec > Prec::Top {
                write!(f, "(")?;
            }
            write!(f, "{} => ", tables.show_context(context))?;
            write_type(f, tables, body, Prec::Top)?;
            if prec > Prec::Top {
                write!(f, ")")?;
            }
            Ok(())
        }
        Type::App(..) => {
            let (head, args) = ty.spine();
            match (head, args.as_slice()) {
                (Type::Prim(Prim::Arrow), [a, r]) => {
                    if prec > Prec::Fun {
                        write!(f, "(")?;
                    }
                    write_type(f, tables, a, Prec::Arg)?;
                    write!(f, " -> ")?;
                    write_type(f, tables, r, Prec::Fun)?;
                    if prec > Prec::Fun {
                        write!(f, ")")?;
                    }
                    Ok(())
                }
                (Type::Prim(Prim::List), [a]) => {
                    write!(f, "[")?;
                    write_type(f, tables, a, Prec::Top)?;
                    write!(f, "]")
                }
                (Type::Prim(Prim::Tuple(n)), elems) if elems.len() == *n => {
                    write!(f, "(")?;
                    for (i, e) in elems.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write_type(f, tables, e, Prec::Top)?;
                    }
                    write!(f, ")")
                }
                _ => {
                    if prec == Prec::Arg {
                        write!(f, "(")?;
                    }
                    write_type(f, tables, head, Prec::Arg)?;
                    for a in &args {
                        write!(f, " ")?;
                        write_type(f, tables, a, Prec::Arg)?;
                    }
                    if prec == Prec::Arg {
                        write!(f, ")")?;
                    }
                    Ok(())
                }
            }
        }
    }
}

impl Type {
    /// Lowest offset a quantifier over `n` variables binds: everything at or
    /// above it within the body belongs to this quantifier or inner ones.
    fn min_bound_offset(&self, n: usize) -> usize {
        self.offsets().into_iter().max().map_or(0, |m| (m + 1).saturating_sub(n))
    }
}

impl fmt::Display for TypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_type(f, self.tables, self.ty, Prec::Top)
    }
}

impl fmt::Display for PredDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tables.class_text(&self.pred.class))?;
        for a in &self.pred.args {
            write!(f, " ")?;
            write_type(f, self.tables, a, Prec::Arg)?;
        }
        Ok(())
    }
}
