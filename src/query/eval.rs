//! In-memory evaluation of parsed expressions, for storage backends that do
//! not render SQL.

use std::{borrow::Cow, cmp::Ordering};

use crate::query::{Direction, FieldKind, FilterExp, Operator, OrderExp};

/// Anything that can report a value by internal field name.
pub trait FieldSource {
    fn field_value(&self, internal: &str) -> Option<Cow<'_, str>>;
}

pub fn matches_all<S>(filters: &[FilterExp], source: &S) -> bool
where
    S: FieldSource + ?Sized,
{
    filters.iter().all(|filter| matches_filter(filter, source))
}

fn matches_filter<S>(filter: &FilterExp, source: &S) -> bool
where
    S: FieldSource + ?Sized,
{
    let expected = match filter.kind {
        FieldKind::Text => Cow::Owned(filter.value.replace("''", "'")),
        _ => Cow::Borrowed(filter.value.as_str()),
    };
    filter.fields.iter().any(|field| {
        source
            .field_value(field)
            .is_some_and(|actual| matches_value(filter, &actual, &expected))
    })
}

fn matches_value(filter: &FilterExp, actual: &str, expected: &str) -> bool {
    if filter.operator == Operator::Like {
        return like(expected, actual);
    }
    let ordering = if filter.kind.is_numeric() {
        match (actual.trim().parse::<f64>(), expected.parse::<f64>()) {
            (Ok(left), Ok(right)) => left.partial_cmp(&right),
            _ => None,
        }
    } else {
        Some(actual.cmp(expected))
    };
    ordering.is_some_and(|ordering| match filter.operator {
        Operator::Eq => ordering == Ordering::Equal,
        Operator::Ne => ordering != Ordering::Equal,
        Operator::Lt => ordering == Ordering::Less,
        Operator::Le => ordering != Ordering::Greater,
        Operator::Gt => ordering == Ordering::Greater,
        Operator::Ge => ordering != Ordering::Less,
        Operator::Like => false,
    })
}

/// SQL `LIKE` matching: `%` is any run of characters, `_` exactly one.
pub fn like(pattern: &str, value: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let value: Vec<char> = value.chars().collect();
    let (mut p, mut v) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;
    while v < value.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == value[v]) {
            p += 1;
            v += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, v));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            v = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '%')
}

fn compare_loose(left: &str, right: &str) -> Ordering {
    match (left.trim().parse::<f64>(), right.trim().parse::<f64>()) {
        (Ok(l), Ok(r)) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
        _ => left.cmp(right),
    }
}

/// Orders two sources by the given expressions; numbers compare numerically.
pub fn compare<S>(orders: &[OrderExp], left: &S, right: &S) -> Ordering
where
    S: FieldSource + ?Sized,
{
    for order in orders {
        let l = left.field_value(&order.field).unwrap_or_default();
        let r = right.field_value(&order.field).unwrap_or_default();
        let ordering = compare_loose(&l, &r);
        let ordering = match order.direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
