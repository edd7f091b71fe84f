//! The dynamically typed value model: complex numbers, sequences, text, and
//! procedure references, with broadcasting arithmetic across sequences.

use std::{
    fmt::{self, Write as _},
    ops::{Add, Div, Mul, Neg, Sub},
};

use strum::{Display, IntoStaticStr};

use crate::{
    builtins::ProcedureKind,
    error::{Error, RunResult},
};

/// A complex number stored as a `(real, imag)` pair of `f32`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Number {
    pub real: f32,
    pub imag: f32,
}

impl Number {
    #[must_use]
    pub const fn new(real: f32, imag: f32) -> Self {
        Self { real, imag }
    }

    /// Whether the imaginary component is non-zero.
    #[must_use]
    pub fn is_complex(self) -> bool {
        self.imag != 0.0
    }

    #[must_use]
    pub fn magnitude(self) -> f32 {
        (self.real * self.real + self.imag * self.imag).sqrt()
    }

    /// The argument angle, `atan2(imag, real)`.
    #[must_use]
    pub fn angle(self) -> f32 {
        self.imag.atan2(self.real)
    }

    #[must_use]
    pub fn conjugate(self) -> Self {
        Self::new(self.real, -self.imag)
    }

    /// Canonical complex power, `exp(exponent · ln self)`.
    ///
    /// A negative-zero imaginary component is normalised first so that real
    /// bases sit on the principal branch.
    #[must_use]
    pub fn pow(self, exponent: Self) -> Self {
        let mut base = self;
        if base.imag == 0.0 {
            base.imag = 0.0;
        }
        if base.real == 0.0 && base.imag == 0.0 {
            if exponent.real == 0.0 && exponent.imag == 0.0 {
                return Self::from(1.0);
            }
            return Self::from(0.0);
        }
        let ln = Self::new(base.magnitude().ln(), base.angle());
        let scaled = exponent * ln;
        let modulus = scaled.real.exp();
        Self::new(modulus * scaled.imag.cos(), modulus * scaled.imag.sin())
    }
}

impl From<f32> for Number {
    fn from(real: f32) -> Self {
        Self::new(real, 0.0)
    }
}

impl PartialEq<f32> for Number {
    fn eq(&self, other: &f32) -> bool {
        self.imag == 0.0 && self.real == *other
    }
}

impl Add for Number {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::new(self.real + other.real, self.imag + other.imag)
    }
}

impl Sub for Number {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self::new(self.real - other.real, self.imag - other.imag)
    }
}

impl Mul for Number {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        Self::new(
            self.real * other.real - self.imag * other.imag,
            self.imag * other.real + self.real * other.imag,
        )
    }
}

impl Div for Number {
    type Output = Self;

    fn div(self, other: Self) -> Self {
        if !self.is_complex() && !other.is_complex() {
            return Self::from(self.real / other.real);
        }
        let denominator = other.real * other.real + other.imag * other.imag;
        let numerator = self * other.conjugate();
        Self::new(numerator.real / denominator, numerator.imag / denominator)
    }
}

impl Neg for Number {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.real, -self.imag)
    }
}

impl fmt::Display for Number {
    /// Components with magnitude below `0.001` are suppressed; an empty
    /// rendering collapses to `"0"`; a non-finite real part renders raw.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.real.is_finite() {
            return write!(f, "{}", self.real);
        }
        let mut rendered = String::new();
        let show_real = self.real.abs() >= 0.001;
        let show_imag = self.imag.abs() >= 0.001;
        if show_real {
            write!(rendered, "{:.3}", self.real)?;
            if show_imag {
                rendered.push_str(" + ");
            }
        }
        if show_imag {
            write!(rendered, "{:.3}i", self.imag)?;
        }
        if rendered.is_empty() {
            rendered.push('0');
        }
        f.write_str(&rendered)
    }
}

/// An ordered sequence of [`Number`]s with signed wrap-around indexing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sequence {
    data: Vec<Number>,
}

impl Sequence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn push(&mut self, value: Number) {
        self.data.push(value);
    }

    /// Index access with Python-style wrap-around: `-1` is the last element.
    /// Out-of-range indices fail.
    pub fn get(&self, index: i64) -> RunResult<Number> {
        let length = self.data.len() as i64;
        let mut n = index;
        if n < 0 {
            n += length;
        }
        if n < 0 || n >= length {
            return Err(Error::type_error(format!(
                "Sequence index out of range. Index is: {index}, length is: {length}"
            )));
        }
        Ok(self.data[n as usize])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Number> {
        self.data.iter()
    }

    pub(crate) fn data_mut(&mut self) -> &mut [Number] {
        &mut self.data
    }
}

impl From<Vec<Number>> for Sequence {
    fn from(data: Vec<Number>) -> Self {
        Self { data }
    }
}

impl From<Vec<f32>> for Sequence {
    fn from(data: Vec<f32>) -> Self {
        Self {
            data: data.into_iter().map(Number::from).collect(),
        }
    }
}

impl FromIterator<Number> for Sequence {
    fn from_iter<I: IntoIterator<Item = Number>>(iter: I) -> Self {
        Self {
            data: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Sequence {
    type Item = &'a Number;
    type IntoIter = std::slice::Iter<'a, Number>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{ ")?;
        for (n, element) in self.data.iter().enumerate() {
            if n > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{element}")?;
        }
        f.write_str(" }")
    }
}

/// The kind tag of a [`Value`], as reported by the `type_of` procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Type {
    Number,
    Sequence,
    Text,
    Procedure,
}

/// The tagged union carried by symbols, expression evaluation, and procedure
/// arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(Number),
    Sequence(Sequence),
    Text(String),
    Procedure(ProcedureKind),
}

impl Value {
    #[must_use]
    pub fn get_type(&self) -> Type {
        match self {
            Self::Number(_) => Type::Number,
            Self::Sequence(_) => Type::Sequence,
            Self::Text(_) => Type::Text,
            Self::Procedure(_) => Type::Procedure,
        }
    }

    pub fn as_number(&self) -> RunResult<Number> {
        match self {
            Self::Number(number) => Ok(*number),
            other => Err(Error::type_error(format!(
                "Expected a number, found a value of type {}",
                other.get_type()
            ))),
        }
    }

    pub fn as_sequence(&self) -> RunResult<&Sequence> {
        match self {
            Self::Sequence(sequence) => Ok(sequence),
            other => Err(Error::type_error(format!(
                "Expected a sequence, found a value of type {}",
                other.get_type()
            ))),
        }
    }

    pub fn as_text(&self) -> RunResult<&str> {
        match self {
            Self::Text(text) => Ok(text),
            other => Err(Error::type_error(format!(
                "Expected text, found a value of type {}",
                other.get_type()
            ))),
        }
    }

    pub fn as_procedure(&self) -> RunResult<ProcedureKind> {
        match self {
            Self::Procedure(procedure) => Ok(*procedure),
            other => Err(Error::type_error(format!(
                "Expected a procedure, found a value of type {}",
                other.get_type()
            ))),
        }
    }

    fn arithmetic(&self, other: &Self, op: fn(Number, Number) -> Number) -> RunResult<Self> {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => Ok(Self::Number(op(*a, *b))),
            (Self::Number(a), Self::Sequence(s)) => {
                Ok(Self::Sequence(s.iter().map(|element| op(*a, *element)).collect()))
            }
            (Self::Sequence(s), Self::Number(b)) => {
                Ok(Self::Sequence(s.iter().map(|element| op(*element, *b)).collect()))
            }
            (Self::Sequence(a), Self::Sequence(b)) => {
                if a.len() != b.len() {
                    return Err(Error::type_error(
                        "Attempted to perform arithmetic on sequences of unequal length",
                    ));
                }
                Ok(Self::Sequence(
                    a.iter().zip(b.iter()).map(|(x, y)| op(*x, *y)).collect(),
                ))
            }
            _ => Err(Error::type_error(
                "Attempted to perform arithmetic on a non-numeric value",
            )),
        }
    }

    pub fn add(&self, other: &Self) -> RunResult<Self> {
        self.arithmetic(other, |a, b| a + b)
    }

    pub fn subtract(&self, other: &Self) -> RunResult<Self> {
        self.arithmetic(other, |a, b| a - b)
    }

    pub fn multiply(&self, other: &Self) -> RunResult<Self> {
        self.arithmetic(other, |a, b| a * b)
    }

    pub fn divide(&self, other: &Self) -> RunResult<Self> {
        self.arithmetic(other, |a, b| a / b)
    }

    pub fn exponentiate(&self, other: &Self) -> RunResult<Self> {
        self.arithmetic(other, Number::pow)
    }

    pub fn negated(&self) -> RunResult<Self> {
        match self {
            Self::Number(number) => Ok(Self::Number(-*number)),
            Self::Sequence(sequence) => {
                Ok(Self::Sequence(sequence.iter().map(|element| -*element).collect()))
            }
            _ => Err(Error::type_error(
                "Attempted to perform arithmetic on a non-numeric value",
            )),
        }
    }
}

impl From<Number> for Value {
    fn from(number: Number) -> Self {
        Self::Number(number)
    }
}

impl From<f32> for Value {
    fn from(real: f32) -> Self {
        Self::Number(Number::from(real))
    }
}

impl From<Sequence> for Value {
    fn from(sequence: Sequence) -> Self {
        Self::Sequence(sequence)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(number) => write!(f, "{number}"),
            Self::Sequence(sequence) => write!(f, "{sequence}"),
            Self::Text(text) => f.write_str(text),
            Self::Procedure(_) => f.write_str("PROCEDURE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complex_multiplication_follows_the_textbook_rule() {
        let product = Number::new(1.0, 2.0) * Number::new(3.0, -1.0);
        assert_eq!(product, Number::new(5.0, 5.0));
    }

    #[test]
    fn division_is_the_inverse_of_multiplication() {
        let a = Number::new(2.5, -1.0);
        let b = Number::new(0.5, 3.0);
        let quotient = (a * b) / b;
        assert!((quotient.real - a.real).abs() < 1e-5);
        assert!((quotient.imag - a.imag).abs() < 1e-5);
    }

    #[test]
    fn real_division_by_zero_is_ieee_infinity() {
        let quotient = Number::from(5.0) / Number::from(0.0);
        assert!(quotient.real.is_infinite());
    }

    #[test]
    fn power_of_a_negative_real_reaches_the_imaginary_axis() {
        let root = Number::from(-1.0).pow(Number::from(0.5));
        assert!(root.real.abs() < 1e-6);
        assert!((root.imag - 1.0).abs() < 1e-6);
    }

    #[test]
    fn small_components_are_suppressed_when_rendering() {
        assert_eq!(Number::new(1.5, 0.0).to_string(), "1.500");
        assert_eq!(Number::new(0.0, -2.0).to_string(), "-2.000i");
        assert_eq!(Number::new(1.0, 1.0).to_string(), "1.000 + 1.000i");
        assert_eq!(Number::new(0.0002, 0.0002).to_string(), "0");
    }

    #[test]
    fn sequence_indices_wrap_once_from_the_end() {
        let sequence = Sequence::from(vec![1.0, 2.0, 3.0]);
        assert_eq!(sequence.get(-1).unwrap(), Number::from(3.0));
        assert_eq!(sequence.get(0).unwrap(), Number::from(1.0));
        assert!(sequence.get(-4).is_err());
        assert!(sequence.get(3).is_err());
    }

    #[test]
    fn sequence_arithmetic_requires_matching_lengths() {
        let a = Value::Sequence(Sequence::from(vec![1.0, 2.0]));
        let b = Value::Sequence(Sequence::from(vec![1.0, 2.0, 3.0]));
        assert!(a.add(&b).is_err());
    }
}
