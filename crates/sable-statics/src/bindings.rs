//! Grouping raw equations into bindings and attaching signatures and
//! fixities.

use sable_ast::{Line, PatternId, PatternKind, ValueDecl};
use smol_str::SmolStr;

use crate::checker::Analyzer;
use crate::error::{at, fail, ErrorKind, StaticResult};
use crate::pattern::pattern_vars;
use crate::result::{Binder, BoundVar};
use crate::tables::NameKind;

/// A binding before dependency analysis.
#[derive(Clone, Debug)]
pub struct RawBinding {
    pub line: Line,
    pub binder: Binder,
    pub equations: Vec<Equation>,
}

#[derive(Clone, Debug)]
pub struct Equation {
    pub args: Vec<PatternId>,
    pub rhs: sable_ast::Rhs,
}

impl RawBinding {
    fn binds(&self, text: &str) -> bool {
        self.binder.vars().iter().any(|v| v.text == text)
    }

    fn var_mut(&mut self, text: &str) -> Option<&mut BoundVar> {
        self.binder.vars_mut().iter_mut().find(|v| v.text == text)
    }
}

impl Analyzer<'_> {
    /// Groups the function and pattern bindings of `decls`. Equations of one
    /// function must be contiguous and agree on arity.
    pub fn extract_bindings(&self, decls: &[ValueDecl]) -> StaticResult<Vec<RawBinding>> {
        let mut out: Vec<RawBinding> = Vec::new();
        let mut open: Option<SmolStr> = None;
        for decl in decls {
            match decl {
                ValueDecl::FunBind(f) => {
                    let line = f.rhs.line;
                    let equation = Equation {
                        args: f.args.clone(),
                        rhs: f.rhs.clone(),
                    };
                    if open.as_ref() == Some(&f.name) {
                        if let Some(b) = out.last_mut() {
                            if b.equations[0].args.len() != f.args.len() {
                                return fail(line, ErrorKind::EquationArityMismatch { name: f.name.to_string() });
                            }
                            b.equations.push(equation);
                            continue;
                        }
                    }
                    if out.iter().any(|b| b.binds(&f.name)) {
                        return fail(line, ErrorKind::MultiplyDefined { name: f.name.to_string() });
                    }
                    out.push(RawBinding {
                        line,
                        binder: Binder::Var(BoundVar::new(f.name.clone())),
                        equations: vec![equation],
                    });
                    open = Some(f.name.clone());
                }
                ValueDecl::PatBind(pb) => {
                    open = None;
                    let line = pb.rhs.line;
                    let (binder, args) = match &self.ast.patterns[pb.pat].kind {
                        PatternKind::Var(v) => (Binder::Var(BoundVar::new(v.clone())), Vec::new()),
                        _ => {
                            let mut vars = Vec::new();
                            pattern_vars(&self.ast, pb.pat, &mut vars);
                            if vars.is_empty() {
                                return fail(line, ErrorKind::NoPatternVariables);
                            }
                            let binder = Binder::Pattern {
                                pat: pb.pat,
                                vars: vars.into_iter().map(BoundVar::new).collect(),
                            };
                            (binder, Vec::new())
                        }
                    };
                    if let Some(v) = binder.vars().iter().find(|v| out.iter().any(|b| b.binds(&v.text))) {
                        return fail(line, ErrorKind::MultiplyDefined { name: v.text.to_string() });
                    }
                    out.push(RawBinding {
                        line,
                        binder,
                        equations: vec![Equation {
                            args,
                            rhs: pb.rhs.clone(),
                        }],
                    });
                }
                ValueDecl::Sig(_) | ValueDecl::Fixity(_) => open = None,
            }
        }
        Ok(out)
    }

    /// Bindings of one declaration list with their signatures and fixities
    /// attached. At top level a fixity may also name a constructor or class
    /// member of the module.
    pub fn eqns_to_bindings(&mut self, decls: &[ValueDecl], top: bool) -> StaticResult<Vec<RawBinding>> {
        let mut raw = self.extract_bindings(decls)?;

        for decl in decls {
            let ValueDecl::Sig(sig) = decl else { continue };
            for v in &sig.vars {
                if v.is_qualified() {
                    return fail(sig.line, ErrorKind::QualifiedSignature { name: v.to_string() });
                }
                let Some(bv) = raw.iter_mut().find_map(|b| b.var_mut(&v.text)) else {
                    return fail(sig.line, ErrorKind::MissingSignatureBinding { name: v.text.to_string() });
                };
                if bv.sig.is_some() {
                    return fail(sig.line, ErrorKind::RepeatedSignature { name: v.text.to_string() });
                }
            }
            let ty = self.check_sig_type(sig.line, "type signature", sig.ty)?;
            for v in &sig.vars {
                if let Some(bv) = raw.iter_mut().find_map(|b| b.var_mut(&v.text)) {
                    bv.sig = Some(ty.clone());
                }
            }
        }

        for decl in decls {
            let ValueDecl::Fixity(f) = decl else { continue };
            for op in &f.ops {
                if let Some(bv) = raw.iter_mut().find_map(|b| b.var_mut(op)) {
                    if bv.fixity.is_some() {
                        return fail(f.line, ErrorKind::RepeatedFixity { op: op.to_string() });
                    }
                    bv.fixity = Some(f.fixity);
                    continue;
                }
                let own = if top {
                    self.tables.lookup_name(self.module, op).filter(|&n| {
                        let name = &self.tables.names[n];
                        name.module == self.module
                            && matches!(name.kind, NameKind::Constructor(_) | NameKind::Member { .. })
                    })
                } else {
                    None
                };
                let Some(n) = own else {
                    return fail(f.line, ErrorKind::MissingFixityBinding { op: op.to_string() });
                };
                if self.tables.names[n].fixity.is_some() {
                    return fail(f.line, ErrorKind::RepeatedFixity { op: op.to_string() });
                }
                self.tables.names[n].fixity = Some(f.fixity);
            }
        }
        Ok(raw)
    }

    /// Enters every top-level binder in the symbol tables.
    pub fn declare_top_level(&mut self, raw: &mut [RawBinding]) -> StaticResult<()> {
        for b in raw.iter_mut() {
            let line = b.line;
            let arity = match &b.binder {
                Binder::Var(_) => b.equations.first().map_or(0, |e| e.args.len()),
                Binder::Pattern { .. } => 0,
            };
            for v in b.binder.vars_mut() {
                let n = self
                    .tables
                    .declare_name(self.module, &v.text, line, "variable")
                    .map_err(at(line))?;
                let name = &mut self.tables.names[n];
                name.line = line;
                name.arity = arity;
                name.kind = NameKind::Function;
                name.ty = v.sig.clone();
                name.fixity = v.fixity;
                v.name = Some(n);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{Options, Statics};
    use sable_ast::{ModuleBuilder, ValueDecl};

    fn grouped(build: impl FnOnce(&mut ModuleBuilder) -> Vec<ValueDecl>) -> String {
        let mut statics = Statics::with_prelude(Options::default()).unwrap();
        let mut b = ModuleBuilder::new("M");
        let decls = build(&mut b);
        let module = b.finish().unwrap();
        statics
            .with_analyzer(module, |a| {
                let raw = a.eqns_to_bindings(&decls, false)?;
                Ok(raw
                    .iter()
                    .map(|r| {
                        let vars: Vec<String> = r.binder.vars().iter().map(|v| v.text.to_string()).collect();
                        format!("{}/{}", vars.join(","), r.equations.len())
                    })
                    .collect::<Vec<_>>()
                    .join(" "))
            })
            .unwrap_or_else(|e| e.to_string())
    }

    #[test]
    fn contiguous_equations_form_one_binding() {
        let out = grouped(|b| {
            let (z, n, one) = (b.pint(0), b.pvar("n"), b.int(1));
            let body = b.var("n");
            let (x, y) = (b.pvar("x"), b.pvar("y"));
            let pair = b.ptuple(vec![x, y]);
            let rhs = b.var("f");
            vec![b.fun("f", vec![z], one), b.fun("f", vec![n], body), b.pat_bind(pair, rhs)]
        });
        assert_eq!(out, "f/2 x,y/1");
    }

    #[test]
    fn separated_equations_are_rejected() {
        let out = grouped(|b| {
            let (one, two, three) = (b.int(1), b.int(2), b.int(3));
            vec![b.fun("f", vec![], one), b.fun("g", vec![], two), b.fun("f", vec![], three)]
        });
        insta::assert_snapshot!(out, @r#"line 1: "f" multiply defined"#);
    }

    #[test]
    fn equation_arities_must_agree() {
        let out = grouped(|b| {
            let x = b.pvar("x");
            let (one, two) = (b.int(1), b.int(2));
            vec![b.fun("f", vec![x], one), b.fun("f", vec![], two)]
        });
        insta::assert_snapshot!(out, @r#"line 1: equations give different arities for "f""#);
    }

    #[test]
    fn signatures_need_bindings() {
        let out = grouped(|b| {
            let one = b.int(1);
            vec![b.sig(&["g"], "Int"), b.fun("f", vec![], one)]
        });
        insta::assert_snapshot!(out, @r#"line 1: missing binding for variable "g" in type signature"#);
        let out = grouped(|b| {
            let one = b.int(1);
            vec![b.sig(&["f"], "Int"), b.sig(&["f"], "Int"), b.fun("f", vec![], one)]
        });
        insta::assert_snapshot!(out, @r#"line 1: repeated type signature for "f""#);
    }

    #[test]
    fn pattern_binding_needs_a_variable() {
        let out = grouped(|b| {
            let w = b.pwild();
            let p = b.ptuple(vec![w]);
            let one = b.int(1);
            vec![b.pat_bind(p, one)]
        });
        insta::assert_snapshot!(out, @"line 1: no variables defined in left hand side pattern");
    }

    #[test]
    fn local_fixity_needs_a_binding() {
        let out = grouped(|b| {
            let one = b.int(1);
            vec![b.fixity(sable_ast::Assoc::Left, 6, &["+++"]), b.fun("f", vec![], one)]
        });
        insta::assert_snapshot!(out, @r#"line 1: missing binding for variable "+++" in fixity declaration"#);
    }
}
