//! Immutable expression trees.
//!
//! Trees are produced by an external parser or symbolic differentiator
//! and only read here. The [`Display`](fmt::Display) rendering is
//! canonical: equal trees render to equal text, which is used for
//! serialization. [`Expr::cache_key`] additionally tags variables and keys
//! the evaluator's cache.

use std::fmt;
use std::ops;

use indexmap::IndexSet;
use tcad_core::NameSuffix;

/// An expression node.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// A literal number.
    Constant(f64),
    /// A named scalar: region parameter or circuit node.
    Variable(String),
    /// A named model, including derivative and suffixed names.
    Model(String),
    /// Sum of the operands.
    Add(Vec<Expr>),
    /// Product of the operands.
    Product(Vec<Expr>),
    /// `cond ? then : 0`.
    If(Box<Expr>, Box<Expr>),
    /// `cond ? then : else`.
    IfElse(Box<Expr>, Box<Expr>, Box<Expr>),
    /// A registry function applied elementwise.
    Call(String, Vec<Expr>),
    /// Text the parser could not understand.
    Invalid(String),
}

const OPERATORS: [&str; 9] = ["&&", "||", "==", "!=", "<", "<=", ">", ">=", "pow"];

impl Expr {
    /// A literal.
    pub fn constant(value: f64) -> Self {
        Self::Constant(value)
    }

    /// A parameter or circuit node reference.
    pub fn var(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    /// A model reference.
    pub fn model(name: impl Into<String>) -> Self {
        Self::Model(name.into())
    }

    /// Sum of `terms`.
    pub fn add(terms: Vec<Expr>) -> Self {
        Self::Add(terms)
    }

    /// Product of `factors`.
    pub fn product(factors: Vec<Expr>) -> Self {
        Self::Product(factors)
    }

    /// `cond ? then : 0`.
    pub fn if_then(cond: Expr, then: Expr) -> Self {
        Self::If(Box::new(cond), Box::new(then))
    }

    /// `cond ? then : otherwise`.
    pub fn if_else(cond: Expr, then: Expr, otherwise: Expr) -> Self {
        Self::IfElse(Box::new(cond), Box::new(then), Box::new(otherwise))
    }

    /// `name(args...)`.
    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Call(name.into(), args)
    }

    /// `base ^ exponent`.
    pub fn pow(self, exponent: Expr) -> Self {
        Self::call("pow", vec![self, exponent])
    }

    /// Whether the tree is a literal.
    pub fn is_constant(&self) -> bool {
        matches!(self, Self::Constant(_))
    }

    /// Every model and variable name the tree references, in first-use order.
    pub fn referenced_names(&self) -> IndexSet<String> {
        let mut out = IndexSet::new();
        self.collect_names(&mut out);
        out
    }

    /// Names a model computed from this tree must be invalidated by.
    ///
    /// Each referenced name, plus the base of any suffixed name so that a
    /// projection such as `n@n0` follows writes to `n`.
    pub fn dependencies(&self) -> IndexSet<String> {
        let mut out = IndexSet::new();
        for name in self.referenced_names() {
            if let Some((base, _)) = NameSuffix::split(&name) {
                out.insert(base.to_string());
            }
            out.insert(name);
        }
        out
    }

    fn collect_names(&self, out: &mut IndexSet<String>) {
        match self {
            Self::Constant(_) | Self::Invalid(_) => {}
            Self::Variable(n) | Self::Model(n) => {
                out.insert(n.clone());
            }
            Self::Add(xs) | Self::Product(xs) | Self::Call(_, xs) => {
                for x in xs {
                    x.collect_names(out);
                }
            }
            Self::If(c, t) => {
                c.collect_names(out);
                t.collect_names(out);
            }
            Self::IfElse(c, t, e) => {
                c.collect_names(out);
                t.collect_names(out);
                e.collect_names(out);
            }
        }
    }
}

/// Renders a tree, optionally marking variables so they never render like
/// a model of the same name.
struct Render<'a> {
    expr: &'a Expr,
    tagged: bool,
}

impl Render<'_> {
    fn child<'b>(&self, expr: &'b Expr) -> Render<'b> {
        Render {
            expr,
            tagged: self.tagged,
        }
    }

    fn join(&self, f: &mut fmt::Formatter<'_>, xs: &[Expr], sep: &str) -> fmt::Result {
        for (i, x) in xs.iter().enumerate() {
            if i > 0 {
                f.write_str(sep)?;
            }
            write!(f, "{}", self.child(x))?;
        }
        Ok(())
    }
}

impl fmt::Display for Render<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.expr {
            Expr::Constant(v) => write!(f, "{v:?}"),
            Expr::Variable(n) if self.tagged => write!(f, "${n}"),
            Expr::Variable(n) | Expr::Model(n) => f.write_str(n),
            Expr::Add(xs) => {
                f.write_str("(")?;
                self.join(f, xs, " + ")?;
                f.write_str(")")
            }
            Expr::Product(xs) => {
                f.write_str("(")?;
                self.join(f, xs, " * ")?;
                f.write_str(")")
            }
            Expr::If(c, t) => write!(f, "if({}, {})", self.child(c), self.child(t)),
            Expr::IfElse(c, t, e) => write!(
                f,
                "ifelse({}, {}, {})",
                self.child(c),
                self.child(t),
                self.child(e)
            ),
            Expr::Call(name, args) if name == "!" && args.len() == 1 => {
                write!(f, "(!{})", self.child(&args[0]))
            }
            Expr::Call(name, args) if args.len() == 2 && OPERATORS.contains(&name.as_str()) => {
                let op = if name == "pow" { "^" } else { name.as_str() };
                write!(f, "({} {op} {})", self.child(&args[0]), self.child(&args[1]))
            }
            Expr::Call(name, args) => {
                write!(f, "{name}(")?;
                self.join(f, args, ", ")?;
                f.write_str(")")
            }
            Expr::Invalid(text) => f.write_str(text),
        }
    }
}

impl Expr {
    /// Canonical text with variables written `$name`.
    ///
    /// Distinguishes a variable from a model of the same name, which the
    /// plain rendering does not.
    pub fn cache_key(&self) -> String {
        Render {
            expr: self,
            tagged: true,
        }
        .to_string()
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Render {
            expr: self,
            tagged: false,
        }
        .fmt(f)
    }
}

// ── Operator sugar ─────────────────────────────────────────────────

impl ops::Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        match self {
            Expr::Add(mut xs) => {
                xs.push(rhs);
                Expr::Add(xs)
            }
            lhs => Expr::Add(vec![lhs, rhs]),
        }
    }
}

impl ops::Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        self + (-rhs)
    }
}

impl ops::Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        match self {
            Expr::Product(mut xs) => {
                xs.push(rhs);
                Expr::Product(xs)
            }
            lhs => Expr::Product(vec![lhs, rhs]),
        }
    }
}

impl ops::Div for Expr {
    type Output = Expr;

    fn div(self, rhs: Expr) -> Expr {
        self * rhs.pow(Expr::Constant(-1.0))
    }
}

impl ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        match self {
            Expr::Constant(v) => Expr::Constant(-v),
            x => Expr::Product(vec![Expr::Constant(-1.0), x]),
        }
    }
}
