//! Programmatic construction of [`Module`]s.
//!
//! The statics core consumes ASTs from an external parser. The builder is how
//! everything else (the built-in Prelude, tests) produces them. Type
//! expressions, contexts and constructor alternatives are given as strings in
//! ordinary Haskell notation:
//!
//! ```text
//! b.ty("(Eq a, Show b) => a -> [b] -> (a, b)")
//! b.data("Tree a", &["Leaf", "Node (Tree a) a !(Tree a)"])
//! b.data("T", &["forall e. Show e => MkT e"])
//! ```
//!
//! Malformed strings are recorded and reported by [`ModuleBuilder::finish`].

use crate::*;
use logos::Logos;
use smol_str::SmolStr;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("line {line}: {message} in `{text}`")]
pub struct BuildError {
    pub line: Line,
    pub text: String,
    pub message: String,
}

pub struct ModuleBuilder {
    module: Module,
    line: Line,
    errors: Vec<BuildError>,
}

/// Operator element of an infix chain.
pub fn op<T>(name: &str) -> InfixElem<T> {
    InfixElem::Operator(Ident::parse(name))
}

/// Operand element of an infix chain.
pub fn operand<T>(x: T) -> InfixElem<T> {
    InfixElem::Operand(x)
}

impl ModuleBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            module: Module::new(name),
            line: 1,
            errors: Vec::new(),
        }
    }

    /// Sets the source line attached to everything built afterwards.
    pub fn at(&mut self, line: Line) -> &mut Self {
        self.line = line;
        self
    }

    pub fn line(&self) -> Line {
        self.line
    }

    pub fn push(&mut self, decl: impl Into<Decl>) -> &mut Self {
        self.module.decls.push(decl.into());
        self
    }

    pub fn import(&mut self, mut decl: ImportDecl) -> &mut Self {
        if decl.line == 0 {
            decl.line = self.line;
        }
        self.module.imports.push(decl);
        self
    }

    pub fn exports(&mut self, items: Vec<ExportItem>) -> &mut Self {
        self.module.exports = Some(items);
        self
    }

    pub fn finish(self) -> Result<Module, BuildError> {
        match self.errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(self.module),
        }
    }

    /// Builds the module even if some strings were malformed. The malformed
    /// pieces are replaced by `()`.
    pub fn finish_lossy(self) -> Module {
        self.module
    }

    fn error(&mut self, text: &str, message: String) {
        self.errors.push(BuildError {
            line: self.line,
            text: text.to_string(),
            message,
        });
    }

    // ── Types ─────────────────────────────────────────────────────

    fn alloc_ty(&mut self, kind: TypeExprKind) -> TypeExprId {
        self.module.type_exprs.alloc(TypeExpr {
            kind,
            line: self.line,
        })
    }

    fn unit_ty(&mut self) -> TypeExprId {
        self.alloc_ty(TypeExprKind::Con(Ident::unqual("()")))
    }

    pub fn ty(&mut self, src: &str) -> TypeExprId {
        match self.parse_with(src, |p| p.ty()) {
            Some(t) => t,
            None => self.unit_ty(),
        }
    }

    pub fn context(&mut self, src: &str) -> Vec<PredExpr> {
        if src.trim().is_empty() {
            return Vec::new();
        }
        self.parse_with(src, |p| {
            let t = p.btype()?;
            p.to_context(t)
        })
        .unwrap_or_default()
    }

    pub fn pred(&mut self, src: &str) -> PredExpr {
        let line = self.line;
        self.parse_with(src, |p| {
            let t = p.btype()?;
            p.to_pred(t)
        })
        .unwrap_or_else(|| PredExpr {
            line,
            class: Ident::unqual("?"),
            args: Vec::new(),
        })
    }

    fn parse_with<T>(
        &mut self,
        src: &str,
        f: impl FnOnce(&mut TypeParser<'_>) -> Result<T, String>,
    ) -> Option<T> {
        let tokens = match lex(src) {
            Ok(tokens) => tokens,
            Err(msg) => {
                self.error(src, msg);
                return None;
            }
        };
        let line = self.line;
        let mut parser = TypeParser {
            tokens,
            pos: 0,
            line,
            arena: &mut self.module.type_exprs,
        };
        let result = f(&mut parser).and_then(|value| {
            if parser.pos < parser.tokens.len() {
                Err(format!("unexpected {:?}", parser.tokens[parser.pos]))
            } else {
                Ok(value)
            }
        });
        match result {
            Ok(value) => Some(value),
            Err(msg) => {
                self.error(src, msg);
                None
            }
        }
    }

    /// Splits a left-hand side such as `T a b` into name and parameters.
    fn lhs(&mut self, src: &str) -> (SmolStr, Vec<SmolStr>) {
        let mut words = src.split_whitespace().map(SmolStr::new);
        match words.next() {
            Some(name) => (name, words.collect()),
            None => {
                self.error(src, "empty left-hand side".to_string());
                (SmolStr::new("?"), Vec::new())
            }
        }
    }

    // ── Declarations ──────────────────────────────────────────────

    fn constr(&mut self, src: &str) -> ConstrDecl {
        let line = self.line;
        let parsed = self.parse_with(src, |p| {
            let t = p.ty()?;
            p.to_constr(t)
        });
        let (name, quantified, context, fields) =
            parsed.unwrap_or_else(|| (SmolStr::new("?"), Vec::new(), Vec::new(), Vec::new()));
        ConstrDecl {
            line,
            name,
            quantified,
            context,
            fields: ConstrFields::Positional(fields),
        }
    }

    /// `data lhs = c1 | c2 ...`
    pub fn data(&mut self, lhs: &str, constrs: &[&str]) -> DataDecl {
        let (name, params) = self.lhs(lhs);
        let constructors = constrs.iter().map(|c| self.constr(c)).collect();
        DataDecl {
            line: self.line,
            is_newtype: false,
            context: Vec::new(),
            name,
            params,
            constructors,
            deriving: Vec::new(),
        }
    }

    /// `newtype lhs = c`
    pub fn newtype(&mut self, lhs: &str, constr: &str) -> DataDecl {
        let mut decl = self.data(lhs, &[constr]);
        decl.is_newtype = true;
        decl
    }

    /// Data declaration whose constructors all use record syntax. Each field
    /// entry is `(label, type)`.
    pub fn record(&mut self, lhs: &str, constrs: &[(&str, &[(&str, &str)])]) -> DataDecl {
        let (name, params) = self.lhs(lhs);
        let mut constructors = Vec::new();
        for (con, fields) in constrs {
            let fields = fields
                .iter()
                .map(|(label, ty)| FieldDecl {
                    labels: vec![SmolStr::new(label)],
                    ty: self.ty(ty),
                })
                .collect();
            constructors.push(ConstrDecl {
                line: self.line,
                name: SmolStr::new(con),
                quantified: Vec::new(),
                context: Vec::new(),
                fields: ConstrFields::Labelled(fields),
            });
        }
        DataDecl {
            line: self.line,
            is_newtype: false,
            context: Vec::new(),
            name,
            params,
            constructors,
            deriving: Vec::new(),
        }
    }

    /// `type lhs = rhs`
    pub fn synonym(&mut self, lhs: &str, rhs: &str) -> SynonymDecl {
        let (name, params) = self.lhs(lhs);
        let rhs = self.ty(rhs);
        SynonymDecl {
            line: self.line,
            name,
            params,
            rhs,
            restricted_to: None,
        }
    }

    /// `class head where members`, with `head` like `Eq a => Ord a`.
    pub fn class(&mut self, head: &str, members: Vec<ValueDecl>) -> ClassDecl {
        let line = self.line;
        let parsed = self.parse_with(head, |p| {
            let t = p.ty()?;
            let (context, body) = p.split_qual(t)?;
            let (name, params) = p.spine(body);
            match p.kind(name) {
                TypeExprKind::Con(ident) if !ident.is_qualified() => Ok((context, ident.text, params)),
                _ => Err("class name expected".to_string()),
            }
        });
        let (context, name, params) =
            parsed.unwrap_or_else(|| (Vec::new(), SmolStr::new("?"), Vec::new()));
        ClassDecl {
            line,
            context,
            name,
            params,
            members,
        }
    }

    /// `instance head where members`, with `head` like `Eq a => Eq [a]`.
    pub fn instance(&mut self, head: &str, members: Vec<ValueDecl>) -> InstanceDecl {
        let line = self.line;
        let parsed = self.parse_with(head, |p| {
            let t = p.ty()?;
            let (context, body) = p.split_qual(t)?;
            Ok((context, p.to_pred(body)?))
        });
        let (context, head) = parsed.unwrap_or_else(|| {
            (
                Vec::new(),
                PredExpr {
                    line,
                    class: Ident::unqual("?"),
                    args: Vec::new(),
                },
            )
        });
        InstanceDecl {
            line,
            context,
            head,
            members,
        }
    }

    pub fn default(&mut self, types: &[&str]) -> DefaultDecl {
        let types = types.iter().map(|t| self.ty(t)).collect();
        DefaultDecl {
            line: self.line,
            types,
        }
    }

    pub fn foreign_import(&mut self, entity: &str, name: &str, ty: &str) -> ForeignDecl {
        self.foreign(ForeignDirection::Import, entity, name, ty)
    }

    pub fn foreign_export(&mut self, entity: &str, name: &str, ty: &str) -> ForeignDecl {
        self.foreign(ForeignDirection::Export, entity, name, ty)
    }

    fn foreign(&mut self, direction: ForeignDirection, entity: &str, name: &str, ty: &str) -> ForeignDecl {
        ForeignDecl {
            line: self.line,
            direction,
            entity: SmolStr::new(entity),
            name: SmolStr::new(name),
            ty: self.ty(ty),
        }
    }

    // ── Value declarations ────────────────────────────────────────

    pub fn sig(&mut self, vars: &[&str], ty: &str) -> ValueDecl {
        ValueDecl::Sig(self.sig_decl(vars, ty))
    }

    pub fn sig_decl(&mut self, vars: &[&str], ty: &str) -> SigDecl {
        SigDecl {
            line: self.line,
            vars: vars.iter().map(|v| Ident::parse(v)).collect(),
            ty: self.ty(ty),
        }
    }

    pub fn fixity(&mut self, assoc: Assoc, prec: u8, ops: &[&str]) -> ValueDecl {
        ValueDecl::Fixity(FixityDecl {
            line: self.line,
            ops: ops.iter().map(|o| SmolStr::new(o)).collect(),
            fixity: Fixity::new(assoc, prec),
        })
    }

    pub fn rhs(&mut self, body: ExprId) -> Rhs {
        Rhs {
            line: self.line,
            body: RhsBody::Plain(body),
            wheres: Vec::new(),
        }
    }

    /// `name args = body`
    pub fn fun(&mut self, name: &str, args: Vec<PatternId>, body: ExprId) -> ValueDecl {
        let rhs = self.rhs(body);
        ValueDecl::FunBind(FunBind {
            name: SmolStr::new(name),
            args,
            rhs,
        })
    }

    /// `name args = body where wheres`
    pub fn fun_where(
        &mut self,
        name: &str,
        args: Vec<PatternId>,
        body: ExprId,
        wheres: Vec<ValueDecl>,
    ) -> ValueDecl {
        let mut rhs = self.rhs(body);
        rhs.wheres = wheres;
        ValueDecl::FunBind(FunBind {
            name: SmolStr::new(name),
            args,
            rhs,
        })
    }

    /// `name args | g1 = e1 | g2 = e2 ...`
    pub fn fun_guarded(
        &mut self,
        name: &str,
        args: Vec<PatternId>,
        guards: Vec<(ExprId, ExprId)>,
    ) -> ValueDecl {
        let line = self.line;
        let guards = guards
            .into_iter()
            .map(|(guard, body)| GuardedExpr { line, guard, body })
            .collect();
        ValueDecl::FunBind(FunBind {
            name: SmolStr::new(name),
            args,
            rhs: Rhs {
                line,
                body: RhsBody::Guarded(guards),
                wheres: Vec::new(),
            },
        })
    }

    /// `pat = body`
    pub fn pat_bind(&mut self, pat: PatternId, body: ExprId) -> ValueDecl {
        let rhs = self.rhs(body);
        ValueDecl::PatBind(PatBind { pat, rhs })
    }

    // ── Expressions ───────────────────────────────────────────────

    pub fn expr(&mut self, kind: ExprKind) -> ExprId {
        self.module.exprs.alloc(Expr {
            kind,
            line: self.line,
        })
    }

    pub fn var(&mut self, name: &str) -> ExprId {
        self.expr(ExprKind::Var(Ident::parse(name)))
    }

    pub fn con(&mut self, name: &str) -> ExprId {
        self.expr(ExprKind::Con(Ident::parse(name)))
    }

    pub fn int(&mut self, n: i64) -> ExprId {
        self.expr(ExprKind::Lit(Literal::Int(n)))
    }

    pub fn string(&mut self, s: &str) -> ExprId {
        self.expr(ExprKind::Lit(Literal::String(SmolStr::new(s))))
    }

    /// `f a1 .. an`
    pub fn app(&mut self, f: ExprId, args: &[ExprId]) -> ExprId {
        args.iter()
            .fold(f, |acc, &arg| self.expr(ExprKind::App(acc, arg)))
    }

    pub fn infix(&mut self, elems: Vec<InfixElem<ExprId>>) -> ExprId {
        self.expr(ExprKind::Infix(elems))
    }

    pub fn lambda(&mut self, params: Vec<PatternId>, body: ExprId) -> ExprId {
        self.expr(ExprKind::Lambda { params, body })
    }

    pub fn let_in(&mut self, decls: Vec<ValueDecl>, body: ExprId) -> ExprId {
        self.expr(ExprKind::Let { decls, body })
    }

    pub fn if_then_else(&mut self, cond: ExprId, then_branch: ExprId, else_branch: ExprId) -> ExprId {
        self.expr(ExprKind::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    pub fn case(&mut self, scrutinee: ExprId, alts: Vec<(PatternId, ExprId)>) -> ExprId {
        let alts = alts
            .into_iter()
            .map(|(pat, body)| CaseAlt {
                pat,
                rhs: self.rhs(body),
            })
            .collect();
        self.expr(ExprKind::Case { scrutinee, alts })
    }

    pub fn tuple(&mut self, elems: Vec<ExprId>) -> ExprId {
        self.expr(ExprKind::Tuple(elems))
    }

    pub fn list(&mut self, elems: Vec<ExprId>) -> ExprId {
        self.expr(ExprKind::List(elems))
    }

    pub fn comprehension(&mut self, head: ExprId, quals: Vec<Qualifier>) -> ExprId {
        self.expr(ExprKind::Comprehension { head, quals })
    }

    pub fn do_block(&mut self, stmts: Vec<Qualifier>, last: ExprId) -> ExprId {
        self.expr(ExprKind::Do { stmts, last })
    }

    pub fn typed(&mut self, expr: ExprId, ty: &str) -> ExprId {
        let ty = self.ty(ty);
        self.expr(ExprKind::Typed { expr, ty })
    }

    pub fn record_con(&mut self, con: &str, fields: Vec<(&str, Option<ExprId>)>) -> ExprId {
        let fields = field_binds(fields);
        self.expr(ExprKind::RecordCon {
            con: Ident::parse(con),
            fields,
        })
    }

    pub fn record_update(&mut self, record: ExprId, fields: Vec<(&str, Option<ExprId>)>) -> ExprId {
        let fields = field_binds(fields);
        self.expr(ExprKind::RecordUpdate { record, fields })
    }

    // ── Patterns ──────────────────────────────────────────────────

    pub fn pat(&mut self, kind: PatternKind) -> PatternId {
        self.module.patterns.alloc(Pattern {
            kind,
            line: self.line,
        })
    }

    pub fn pvar(&mut self, name: &str) -> PatternId {
        self.pat(PatternKind::Var(SmolStr::new(name)))
    }

    pub fn pwild(&mut self) -> PatternId {
        self.pat(PatternKind::Wildcard)
    }

    pub fn pint(&mut self, n: i64) -> PatternId {
        self.pat(PatternKind::Lit(Literal::Int(n)))
    }

    pub fn pcon(&mut self, con: &str, args: Vec<PatternId>) -> PatternId {
        self.pat(PatternKind::Con {
            con: Ident::parse(con),
            args,
        })
    }

    pub fn ptuple(&mut self, elems: Vec<PatternId>) -> PatternId {
        self.pat(PatternKind::Tuple(elems))
    }

    pub fn plist(&mut self, elems: Vec<PatternId>) -> PatternId {
        self.pat(PatternKind::List(elems))
    }

    pub fn pas(&mut self, name: &str, pat: PatternId) -> PatternId {
        self.pat(PatternKind::As(SmolStr::new(name), pat))
    }

    pub fn plazy(&mut self, pat: PatternId) -> PatternId {
        self.pat(PatternKind::Lazy(pat))
    }

    pub fn pnplusk(&mut self, var: &str, k: Literal) -> PatternId {
        self.pat(PatternKind::NPlusK {
            var: SmolStr::new(var),
            k,
        })
    }

    pub fn precord(&mut self, con: &str, fields: Vec<(&str, Option<PatternId>)>) -> PatternId {
        let fields = field_binds(fields);
        self.pat(PatternKind::Record {
            con: Ident::parse(con),
            fields,
        })
    }

    pub fn pinfix(&mut self, elems: Vec<InfixElem<PatternId>>) -> PatternId {
        self.pat(PatternKind::Infix(elems))
    }

    pub fn ptyped(&mut self, pat: PatternId, ty: &str) -> PatternId {
        let ty = self.ty(ty);
        self.pat(PatternKind::Typed { pat, ty })
    }
}

fn field_binds<T>(fields: Vec<(&str, Option<T>)>) -> Vec<FieldBind<T>> {
    fields
        .into_iter()
        .map(|(field, value)| FieldBind {
            field: Ident::parse(field),
            value,
        })
        .collect()
}

// ── Type-string lexer ─────────────────────────────────────────────

#[derive(Logos, Debug, Clone, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
enum Token {
    #[token("forall")]
    Forall,
    #[token("->")]
    Arrow,
    #[token("=>")]
    DArrow,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBrack,
    #[token("]")]
    RBrack,
    #[token(",")]
    Comma,
    #[token("!")]
    Bang,
    #[token(".")]
    Dot,

    /// Type variable or constructor, possibly qualified: `a`, `Maybe`, `M.T`.
    #[regex(r"([A-Z][a-zA-Z0-9_']*\.)*[a-zA-Z_][a-zA-Z0-9_']*", callback = |lex| SmolStr::new(lex.slice()))]
    Ident(SmolStr),
}

fn lex(src: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(src);
    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push(token),
            Err(()) => return Err(format!("unexpected character `{}`", lexer.slice())),
        }
    }
    Ok(tokens)
}

// ── Type-string parser ────────────────────────────────────────────

struct TypeParser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    line: Line,
    arena: &'a mut la_arena::Arena<TypeExpr>,
}

type Constr = (SmolStr, Vec<SmolStr>, Vec<PredExpr>, Vec<TypeExprId>);

impl TypeParser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expect(&mut self, tok: Token) -> Result<(), String> {
        match self.bump() {
            Some(t) if t == tok => Ok(()),
            Some(t) => Err(format!("expected {:?}, found {:?}", tok, t)),
            None => Err(format!("expected {:?}, found end of input", tok)),
        }
    }

    fn alloc(&mut self, kind: TypeExprKind) -> TypeExprId {
        self.arena.alloc(TypeExpr {
            kind,
            line: self.line,
        })
    }

    fn kind(&self, id: TypeExprId) -> TypeExprKind {
        self.arena[id].kind.clone()
    }

    fn con(&mut self, text: &str) -> TypeExprId {
        self.alloc(TypeExprKind::Con(Ident::unqual(text)))
    }

    /// type := 'forall' vars '.' type | btype '=>' type | btype ['->' type]
    fn ty(&mut self) -> Result<TypeExprId, String> {
        if self.peek() == Some(&Token::Forall) {
            self.bump();
            let mut vars = Vec::new();
            while let Some(Token::Ident(v)) = self.peek().cloned() {
                self.bump();
                vars.push(v);
            }
            self.expect(Token::Dot)?;
            let body = self.ty()?;
            return Ok(self.alloc(TypeExprKind::Forall { vars, body }));
        }
        let t = self.btype()?;
        match self.peek() {
            Some(Token::DArrow) => {
                self.bump();
                let context = self.to_context(t)?;
                let body = self.ty()?;
                Ok(self.alloc(TypeExprKind::Qual { context, body }))
            }
            Some(Token::Arrow) => {
                self.bump();
                let r = self.ty()?;
                Ok(self.alloc(TypeExprKind::Fun(t, r)))
            }
            _ => Ok(t),
        }
    }

    fn starts_atype(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Ident(_) | Token::LParen | Token::LBrack | Token::Bang)
        )
    }

    fn btype(&mut self) -> Result<TypeExprId, String> {
        let mut t = self.atype()?;
        while self.starts_atype() {
            let arg = self.atype()?;
            t = self.alloc(TypeExprKind::App(t, arg));
        }
        Ok(t)
    }

    fn atype(&mut self) -> Result<TypeExprId, String> {
        match self.bump() {
            Some(Token::Ident(word)) => {
                let first = word.chars().next().unwrap_or('_');
                if first.is_lowercase() || first == '_' {
                    Ok(self.alloc(TypeExprKind::Var(word)))
                } else {
                    Ok(self.alloc(TypeExprKind::Con(Ident::parse(&word))))
                }
            }
            Some(Token::Bang) => {
                let t = self.atype()?;
                Ok(self.alloc(TypeExprKind::Bang(t)))
            }
            Some(Token::LBrack) => {
                if self.peek() == Some(&Token::RBrack) {
                    self.bump();
                    return Ok(self.con("[]"));
                }
                let t = self.ty()?;
                self.expect(Token::RBrack)?;
                Ok(self.alloc(TypeExprKind::List(t)))
            }
            Some(Token::LParen) => self.paren(),
            Some(t) => Err(format!("unexpected {:?}", t)),
            None => Err("unexpected end of input".to_string()),
        }
    }

    fn paren(&mut self) -> Result<TypeExprId, String> {
        match self.peek() {
            Some(Token::RParen) => {
                self.bump();
                Ok(self.con("()"))
            }
            Some(Token::Arrow) if self.peek_at(1) == Some(&Token::RParen) => {
                self.pos += 2;
                Ok(self.con("->"))
            }
            Some(Token::Comma) => {
                let mut arity = 1;
                while self.peek() == Some(&Token::Comma) {
                    self.bump();
                    arity += 1;
                }
                self.expect(Token::RParen)?;
                Ok(self.con(&tuple_con_text(arity)))
            }
            _ => {
                let first = self.ty()?;
                let mut elems = vec![first];
                while self.peek() == Some(&Token::Comma) {
                    self.bump();
                    elems.push(self.ty()?);
                }
                self.expect(Token::RParen)?;
                if elems.len() == 1 {
                    Ok(first)
                } else {
                    Ok(self.alloc(TypeExprKind::Tuple(elems)))
                }
            }
        }
    }

    /// Head and arguments of an application spine.
    fn spine(&self, t: TypeExprId) -> (TypeExprId, Vec<TypeExprId>) {
        let mut args = Vec::new();
        let mut head = t;
        while let TypeExprKind::App(f, a) = self.arena[head].kind {
            args.push(a);
            head = f;
        }
        args.reverse();
        (head, args)
    }

    fn to_pred(&self, t: TypeExprId) -> Result<PredExpr, String> {
        let (head, args) = self.spine(t);
        match self.kind(head) {
            TypeExprKind::Con(class) => Ok(PredExpr {
                line: self.line,
                class,
                args,
            }),
            _ => Err("class constraint expected".to_string()),
        }
    }

    fn to_context(&self, t: TypeExprId) -> Result<Vec<PredExpr>, String> {
        match self.kind(t) {
            TypeExprKind::Tuple(elems) => elems.into_iter().map(|e| self.to_pred(e)).collect(),
            TypeExprKind::Con(ident) if ident.text == "()" => Ok(Vec::new()),
            _ => Ok(vec![self.to_pred(t)?]),
        }
    }

    fn split_qual(&self, t: TypeExprId) -> Result<(Vec<PredExpr>, TypeExprId), String> {
        match self.kind(t) {
            TypeExprKind::Qual { context, body } => Ok((context, body)),
            _ => Ok((Vec::new(), t)),
        }
    }

    fn to_constr(&self, t: TypeExprId) -> Result<Constr, String> {
        let (quantified, t) = match self.kind(t) {
            TypeExprKind::Forall { vars, body } => (vars, body),
            _ => (Vec::new(), t),
        };
        let (context, body) = self.split_qual(t)?;
        let (head, args) = self.spine(body);
        match self.kind(head) {
            TypeExprKind::Con(ident) if !ident.is_qualified() => {
                Ok((ident.text, quantified, context, args))
            }
            _ => Err("constructor name expected".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(m: &Module, t: TypeExprId) -> String {
        match &m.type_exprs[t].kind {
            TypeExprKind::Var(v) => v.to_string(),
            TypeExprKind::Con(c) => c.to_string(),
            TypeExprKind::App(f, a) => format!("({} {})", render(m, *f), render(m, *a)),
            TypeExprKind::Fun(a, b) => format!("({} -> {})", render(m, *a), render(m, *b)),
            TypeExprKind::List(t) => format!("[{}]", render(m, *t)),
            TypeExprKind::Tuple(ts) => {
                let parts: Vec<_> = ts.iter().map(|t| render(m, *t)).collect();
                format!("({})", parts.join(", "))
            }
            TypeExprKind::Forall { vars, body } => {
                format!("(forall {}. {})", vars.join(" "), render(m, *body))
            }
            TypeExprKind::Qual { context, body } => {
                let preds: Vec<_> = context
                    .iter()
                    .map(|p| {
                        let args: Vec<_> = p.args.iter().map(|a| render(m, *a)).collect();
                        format!("{} {}", p.class, args.join(" "))
                    })
                    .collect();
                format!("({} => {})", preds.join(", "), render(m, *body))
            }
            TypeExprKind::Bang(t) => format!("!{}", render(m, *t)),
        }
    }

    #[test]
    fn lexes_qualified_names_and_keywords() {
        let tokens = lex("forall a'. Data.Map.Map a -> !M.x => (,)").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Forall,
                Token::Ident("a'".into()),
                Token::Dot,
                Token::Ident("Data.Map.Map".into()),
                Token::Ident("a".into()),
                Token::Arrow,
                Token::Bang,
                Token::Ident("M.x".into()),
                Token::DArrow,
                Token::LParen,
                Token::Comma,
                Token::RParen,
            ]
        );
        assert_eq!(lex("forallx").unwrap(), vec![Token::Ident("forallx".into())]);
        assert_eq!(lex("a + b"), Err("unexpected character `+`".to_string()));
    }

    #[test]
    fn parses_qualified_function_type() {
        let mut b = ModuleBuilder::new("M");
        let t = b.ty("(Eq a, Show b) => a -> [b] -> (a, M.T b)");
        let m = b.finish().unwrap();
        insta::assert_snapshot!(render(&m, t), @"(Eq a, Show b => (a -> ([b] -> (a, (M.T b)))))");
    }

    #[test]
    fn parses_primitive_constructors() {
        let mut b = ModuleBuilder::new("M");
        let t = b.ty("(->) [] () (,,)");
        let m = b.finish().unwrap();
        insta::assert_snapshot!(render(&m, t), @"(((-> []) ()) (,,))");
    }

    #[test]
    fn parses_existential_constructor() {
        let mut b = ModuleBuilder::new("M");
        let d = b.data("T", &["forall e. Show e => MkT e !Int"]);
        b.finish().unwrap();
        let c = &d.constructors[0];
        assert_eq!(c.name, "MkT");
        assert_eq!(c.quantified, vec![SmolStr::new("e")]);
        assert_eq!(c.context.len(), 1);
        match &c.fields {
            ConstrFields::Positional(fields) => assert_eq!(fields.len(), 2),
            ConstrFields::Labelled(_) => panic!("expected positional fields"),
        }
    }

    #[test]
    fn class_head_with_superclass() {
        let mut b = ModuleBuilder::new("M");
        let c = b.class("Eq a => Ord a", vec![]);
        b.finish().unwrap();
        assert_eq!(c.name, "Ord");
        assert_eq!(c.params.len(), 1);
        assert_eq!(c.context[0].class, Ident::unqual("Eq"));
    }

    #[test]
    fn malformed_type_is_reported() {
        let mut b = ModuleBuilder::new("M");
        b.at(7);
        b.ty("a -> ");
        let err = b.finish().unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"line 7: unexpected end of input in `a -> `");
    }
}
