use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, Mul, Sub};

/// A linear expression over integer constants and named symbols:
/// `constant + k1*sym1 + k2*sym2 + ...`.
///
/// The expression is agnostic as to whether its value is an absolute address,
/// an offset into a section, or an immediate. No stored coefficient is ever
/// zero; cancelled terms are dropped eagerly, so structural equality is
/// equality of the canonical form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Expression {
    constant: i64,
    terms: BTreeMap<String, i64>,
}

impl Expression {
    pub fn scalar(value: i64) -> Expression {
        Expression {
            constant: value,
            terms: BTreeMap::new(),
        }
    }

    pub fn symbol<S: Into<String>>(name: S) -> Expression {
        let mut terms = BTreeMap::new();
        terms.insert(name.into(), 1);
        Expression { constant: 0, terms }
    }

    /// True if the expression has no symbolic terms.
    pub fn is_scalar(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn is_zero(&self) -> bool {
        self.is_scalar() && self.constant == 0
    }

    pub fn constant(&self) -> i64 {
        self.constant
    }

    /// The symbol names occurring in the expression, lexicographically sorted.
    pub fn symbols(&self) -> Vec<&str> {
        self.terms.keys().map(String::as_str).collect()
    }

    /// Replaces every occurrence of `term` with `value`, distributing the
    /// removed coefficient over the replacement. No-op if `term` is absent.
    pub fn substitute<T: Into<Expression>>(&mut self, term: &str, value: T) {
        let coefficient = match self.terms.remove(term) {
            Some(c) => c,
            None => return,
        };

        let value = value.into();
        self.constant += value.constant * coefficient;
        for (sym, coeff) in value.terms {
            *self.terms.entry(sym).or_insert(0) += coeff * coefficient;
        }

        self.cleanup();
    }

    fn cleanup(&mut self) {
        self.terms.retain(|_, coeff| *coeff != 0);
    }
}

impl From<i64> for Expression {
    fn from(value: i64) -> Expression {
        Expression::scalar(value)
    }
}

impl From<&str> for Expression {
    fn from(name: &str) -> Expression {
        Expression::symbol(name)
    }
}

impl From<String> for Expression {
    fn from(name: String) -> Expression {
        Expression::symbol(name)
    }
}

impl From<&Expression> for Expression {
    fn from(expr: &Expression) -> Expression {
        expr.clone()
    }
}

impl<T: Into<Expression>> Add<T> for Expression {
    type Output = Expression;

    fn add(mut self, rhs: T) -> Expression {
        let rhs = rhs.into();
        self.constant += rhs.constant;
        for (sym, coeff) in rhs.terms {
            *self.terms.entry(sym).or_insert(0) += coeff;
        }
        self.cleanup();
        self
    }
}

impl<T: Into<Expression>> Sub<T> for Expression {
    type Output = Expression;

    fn sub(mut self, rhs: T) -> Expression {
        let rhs = rhs.into();
        self.constant -= rhs.constant;
        for (sym, coeff) in rhs.terms {
            *self.terms.entry(sym).or_insert(0) -= coeff;
        }
        self.cleanup();
        self
    }
}

/// Scaling by an integer. Symbol-by-symbol products are rejected by the
/// parser; the algebra itself stays linear by construction.
impl Mul<i64> for Expression {
    type Output = Expression;

    fn mul(mut self, rhs: i64) -> Expression {
        self.constant *= rhs;
        for coeff in self.terms.values_mut() {
            *coeff *= rhs;
        }
        self.cleanup();
        self
    }
}

impl fmt::Display for Expression {
    /// Emits GAS-compatible text: terms sorted by symbol, coefficient 1 and
    /// -1 folded into the sign, the constant appended last, `+-` rewritten
    /// to `-`. A pure scalar prints its value, so the empty expression
    /// prints `0`.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_scalar() {
            return write!(f, "{}", self.constant);
        }

        let mut parts: Vec<String> = Vec::with_capacity(self.terms.len() + 1);
        for (sym, coeff) in &self.terms {
            parts.push(match coeff {
                1 => sym.clone(),
                -1 => format!("-{}", sym),
                _ => format!("{}*{}", coeff, sym),
            });
        }
        if self.constant != 0 {
            parts.push(self.constant.to_string());
        }

        write!(f, "{}", parts.join("+").replace("+-", "-"))
    }
}
