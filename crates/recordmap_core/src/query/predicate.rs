//! Predicates and sort descriptors.
//!
//! [`Predicate`] is written against declared property names. The translator
//! turns it into a [`ZonePredicate`] over storage keys, which is what
//! backends evaluate.

use recordmap_codec::Value;
use std::cmp::Ordering;

/// Comparison applied between a stored value and an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    /// `==`. Null equals null.
    Equal,
    /// `!=`.
    NotEqual,
    /// `<`.
    Less,
    /// `<=`.
    LessOrEqual,
    /// `>`.
    Greater,
    /// `>=`.
    GreaterOrEqual,
    /// Substring of a string, or element of an array.
    Contains,
    /// String prefix.
    BeginsWith,
    /// The stored value is one of the operand array's elements.
    In,
}

impl ComparisonOperator {
    /// Applies the operator. An absent stored value behaves like `Null`.
    #[must_use]
    pub fn apply(self, stored: Option<&Value>, operand: &Value) -> bool {
        let stored = stored.unwrap_or(&Value::Null);
        match self {
            Self::Equal => values_equal(stored, operand),
            Self::NotEqual => !values_equal(stored, operand),
            Self::Less => ordered(stored, operand, |o| o == Ordering::Less),
            Self::LessOrEqual => ordered(stored, operand, |o| o != Ordering::Greater),
            Self::Greater => ordered(stored, operand, |o| o == Ordering::Greater),
            Self::GreaterOrEqual => ordered(stored, operand, |o| o != Ordering::Less),
            Self::Contains => match (stored, operand) {
                (Value::Text(text), Value::Text(needle)) => text.contains(needle.as_str()),
                (Value::Array(items), needle) => {
                    items.iter().any(|item| values_equal(item, needle))
                }
                _ => false,
            },
            Self::BeginsWith => match (stored, operand) {
                (Value::Text(text), Value::Text(prefix)) => text.starts_with(prefix.as_str()),
                _ => false,
            },
            Self::In => match operand {
                Value::Array(candidates) => candidates
                    .iter()
                    .any(|candidate| values_equal(stored, candidate)),
                _ => false,
            },
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    a == b || a.compare(b) == Some(Ordering::Equal)
}

fn ordered(a: &Value, b: &Value, test: impl Fn(Ordering) -> bool) -> bool {
    if a.is_null() || b.is_null() {
        return false;
    }
    a.compare(b).is_some_and(test)
}

/// A boolean expression over declared property names.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Constant.
    Literal(bool),
    /// Compare one property with a value.
    Compare {
        /// Declared property name.
        key: String,
        /// Operator.
        op: ComparisonOperator,
        /// Operand.
        value: Value,
    },
    /// All must hold.
    And(Vec<Predicate>),
    /// Any must hold.
    Or(Vec<Predicate>),
    /// Negation.
    Not(Box<Predicate>),
}

impl Predicate {
    /// Compares `key` with `value`.
    #[must_use]
    pub fn compare(
        key: impl Into<String>,
        op: ComparisonOperator,
        value: impl Into<Value>,
    ) -> Self {
        Self::Compare {
            key: key.into(),
            op,
            value: value.into(),
        }
    }

    /// `key == value`.
    #[must_use]
    pub fn equal(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(key, ComparisonOperator::Equal, value)
    }

    /// Both hold.
    #[must_use]
    pub fn and(self, other: Predicate) -> Self {
        match self {
            Self::And(mut terms) => {
                terms.push(other);
                Self::And(terms)
            }
            first => Self::And(vec![first, other]),
        }
    }

    /// Either holds.
    #[must_use]
    pub fn or(self, other: Predicate) -> Self {
        match self {
            Self::Or(mut terms) => {
                terms.push(other);
                Self::Or(terms)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    /// Negates the predicate.
    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Rewrites every key with `resolve`, producing a zone predicate.
    pub fn map_keys<E>(
        &self,
        resolve: &mut impl FnMut(&str) -> Result<String, E>,
    ) -> Result<ZonePredicate, E> {
        Ok(match self {
            Self::Literal(value) => ZonePredicate::Literal(*value),
            Self::Compare { key, op, value } => ZonePredicate::Compare {
                key: resolve(key)?,
                op: *op,
                value: value.clone(),
            },
            Self::And(terms) => ZonePredicate::And(
                terms
                    .iter()
                    .map(|term| term.map_keys(&mut *resolve))
                    .collect::<Result<_, _>>()?,
            ),
            Self::Or(terms) => ZonePredicate::Or(
                terms
                    .iter()
                    .map(|term| term.map_keys(&mut *resolve))
                    .collect::<Result<_, _>>()?,
            ),
            Self::Not(inner) => ZonePredicate::Not(Box::new(inner.map_keys(&mut *resolve)?)),
        })
    }
}

/// A boolean expression over storage keys, evaluated by backends.
#[derive(Debug, Clone, PartialEq)]
pub enum ZonePredicate {
    /// Constant.
    Literal(bool),
    /// Compare one stored key with a value.
    Compare {
        /// Storage key.
        key: String,
        /// Operator.
        op: ComparisonOperator,
        /// Operand.
        value: Value,
    },
    /// All must hold.
    And(Vec<ZonePredicate>),
    /// Any must hold.
    Or(Vec<ZonePredicate>),
    /// Negation.
    Not(Box<ZonePredicate>),
}

impl ZonePredicate {
    /// Evaluates against a record whose stored values are read by `lookup`.
    pub fn evaluate<F>(&self, lookup: &F) -> bool
    where
        F: Fn(&str) -> Option<Value>,
    {
        match self {
            Self::Literal(value) => *value,
            Self::Compare { key, op, value } => op.apply(lookup(key).as_ref(), value),
            Self::And(terms) => terms.iter().all(|term| term.evaluate(lookup)),
            Self::Or(terms) => terms.iter().any(|term| term.evaluate(lookup)),
            Self::Not(inner) => !inner.evaluate(lookup),
        }
    }
}

/// Sort order on one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortDescriptor {
    /// Property name, or storage key once translated.
    pub key: String,
    /// Ascending if true.
    pub ascending: bool,
}

impl SortDescriptor {
    /// Ascending order on `key`.
    #[must_use]
    pub fn ascending(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ascending: true,
        }
    }

    /// Descending order on `key`.
    #[must_use]
    pub fn descending(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ascending: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn record(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn eval(predicate: &ZonePredicate, fields: &HashMap<String, Value>) -> bool {
        predicate.evaluate(&|key: &str| fields.get(key).cloned())
    }

    fn zone(predicate: &Predicate) -> ZonePredicate {
        predicate
            .map_keys(&mut |key: &str| Ok::<_, ()>(key.to_string()))
            .unwrap()
    }

    fn holds(
        fields: &HashMap<String, Value>,
        key: &str,
        op: ComparisonOperator,
        value: impl Into<Value>,
    ) -> bool {
        eval(&zone(&Predicate::compare(key, op, value)), fields)
    }

    #[test]
    fn comparison_operators() {
        let fields = record(&[("pages", Value::Integer(300)), ("title", Value::from("Dune"))]);
        assert!(holds(&fields, "pages", ComparisonOperator::Greater, 100));
        assert!(holds(&fields, "pages", ComparisonOperator::LessOrEqual, 300.0));
        assert!(!holds(&fields, "pages", ComparisonOperator::Less, 300));
        assert!(holds(&fields, "title", ComparisonOperator::BeginsWith, "Du"));
        assert!(holds(&fields, "title", ComparisonOperator::Contains, "un"));
        assert!(eval(
            &zone(&Predicate::compare(
                "title",
                ComparisonOperator::In,
                Value::Array(vec![Value::from("Emma"), Value::from("Dune")])
            )),
            &fields
        ));
    }

    #[test]
    fn missing_values_behave_like_null() {
        let fields = record(&[]);
        assert!(eval(&zone(&Predicate::equal("subtitle", Value::Null)), &fields));
        assert!(!eval(&zone(&Predicate::compare("pages", ComparisonOperator::Less, 10)), &fields));
        assert!(holds(&fields, "pages", ComparisonOperator::NotEqual, 10));
    }

    #[test]
    fn boolean_combinators() {
        let fields = record(&[("a", Value::Integer(1)), ("b", Value::Integer(2))]);
        let both = Predicate::equal("a", 1).and(Predicate::equal("b", 2));
        let either = Predicate::equal("a", 5).or(Predicate::equal("b", 2));
        assert!(eval(&zone(&both), &fields));
        assert!(eval(&zone(&either), &fields));
        assert!(!eval(&zone(&both.negate()), &fields));
        let chained = Predicate::equal("a", 1)
            .and(Predicate::Literal(true))
            .and(Predicate::Literal(true));
        assert!(matches!(chained, Predicate::And(ref terms) if terms.len() == 3));
    }

    #[test]
    fn map_keys_propagates_errors() {
        let predicate = Predicate::equal("a", 1).and(Predicate::equal("rel", 2));
        let result = predicate.map_keys(&mut |key: &str| {
            if key == "rel" {
                Err(key.to_string())
            } else {
                Ok(format!("k_{key}"))
            }
        });
        assert_eq!(result, Err("rel".to_string()));
    }
}
