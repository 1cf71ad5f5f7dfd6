use std::fmt;

// ── Kinds ─────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Star,
    /// Kind of extensible-record rows.
    Row,
    Arrow(Box<Kind>, Box<Kind>),
    /// Unification variable, only present while a group is being inferred.
    Var(u32),
}

impl Kind {
    pub fn arrow(from: Kind, to: Kind) -> Kind {
        Kind::Arrow(Box::new(from), Box::new(to))
    }

    /// `k1 -> .. -> kn -> result`
    pub fn chain(args: impl IntoIterator<Item = Kind>, result: Kind) -> Kind {
        let args: Vec<Kind> = args.into_iter().collect();
        args.into_iter()
            .rev()
            .fold(result, |acc, k| Kind::arrow(k, acc))
    }

    /// `* -> .. -> *` with `n` arguments.
    pub fn simple(n: usize) -> Kind {
        Kind::chain(std::iter::repeat(Kind::Star).take(n), Kind::Star)
    }

    /// Argument kinds of an arrow chain.
    pub fn args(&self) -> Vec<Kind> {
        let mut out = Vec::new();
        let mut k = self;
        while let Kind::Arrow(a, r) = k {
            out.push((**a).clone());
            k = r;
        }
        out
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Star => write!(f, "*"),
            Kind::Row => write!(f, "row"),
            Kind::Var(v) => write!(f, "k{}", v),
            Kind::Arrow(a, r) => match **a {
                Kind::Arrow(..) => write!(f, "({}) -> {}", a, r),
                _ => write!(f, "{} -> {}", a, r),
            },
        }
    }
}

// ── Substitution ──────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KindUnifyError {
    Mismatch,
    Infinite,
}

impl KindUnifyError {
    pub fn reason(self) -> Option<String> {
        match self {
            KindUnifyError::Mismatch => None,
            KindUnifyError::Infinite => Some("unification would give infinite kind".to_string()),
        }
    }
}

/// Substitution for kind variables. Variables are bound at most once;
/// lookups follow chains of bound variables.
#[derive(Clone, Debug, Default)]
pub struct KindSubst {
    bindings: Vec<Option<Kind>>,
}

impl KindSubst {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self) -> Kind {
        let v = self.bindings.len() as u32;
        self.bindings.push(None);
        Kind::Var(v)
    }

    pub fn fresh_n(&mut self, n: usize) -> Vec<Kind> {
        (0..n).map(|_| self.fresh()).collect()
    }

    /// Follows bound variables at the root only.
    fn shallow(&self, k: &Kind) -> Kind {
        let mut k = k.clone();
        while let Kind::Var(v) = k {
            match self.bindings.get(v as usize).and_then(|b| b.clone()) {
                Some(bound) => k = bound,
                None => break,
            }
        }
        k
    }

    /// Applies the substitution everywhere.
    pub fn resolve(&self, k: &Kind) -> Kind {
        match self.shallow(k) {
            Kind::Arrow(a, r) => Kind::arrow(self.resolve(&a), self.resolve(&r)),
            other => other,
        }
    }

    /// Resolves and replaces every remaining variable with `*`.
    pub fn generalize(&self, k: &Kind) -> Kind {
        match self.shallow(k) {
            Kind::Arrow(a, r) => Kind::arrow(self.generalize(&a), self.generalize(&r)),
            Kind::Var(_) => Kind::Star,
            other => other,
        }
    }

    fn occurs(&self, v: u32, k: &Kind) -> bool {
        match self.shallow(k) {
            Kind::Var(w) => v == w,
            Kind::Arrow(a, r) => self.occurs(v, &a) || self.occurs(v, &r),
            Kind::Star | Kind::Row => false,
        }
    }

    pub fn unify(&mut self, a: &Kind, b: &Kind) -> Result<(), KindUnifyError> {
        let a = self.shallow(a);
        let b = self.shallow(b);
        match (&a, &b) {
            (Kind::Var(v), Kind::Var(w)) if v == w => Ok(()),
            (Kind::Var(v), other) | (other, Kind::Var(v)) => {
                if self.occurs(*v, other) {
                    return Err(KindUnifyError::Infinite);
                }
                self.bindings[*v as usize] = Some(other.clone());
                Ok(())
            }
            (Kind::Star, Kind::Star) | (Kind::Row, Kind::Row) => Ok(()),
            (Kind::Arrow(a1, r1), Kind::Arrow(a2, r2)) => {
                self.unify(a1, a2)?;
                self.unify(r1, r2)
            }
            _ => Err(KindUnifyError::Mismatch),
        }
    }
}
