//! Limit, order and filter expressions for list queries.
//!
//! Each parser reads one query-string token that uses `:` and `,` as its only
//! structural separators:
//!
//! - limit: `offset:count`
//! - order: `field:direction[,field:direction...]`
//! - filter: `field:op:value[,field:op:value...]`, with `*` as a field
//!   wildcard that searches every field the [`Extractor`] exposes
//!
//! Field names never reach a query unless the entity's [`Checker`] or
//! [`Extractor`] whitelists them, and typed values are checked or escaped by
//! the extractor. Any malformed token rejects the whole expression.

pub mod eval;
pub mod fields;
pub mod sql;

use std::{fmt, str::FromStr};

use crate::error::QueryError;

pub use fields::{FieldMap, FieldSpec};

pub const DEFAULT_LIMIT: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub offset: u64,
    /// `None` means no limit clause at all.
    pub count: Option<u64>,
}

impl Default for Limit {
    fn default() -> Self {
        Self {
            offset: 0,
            count: Some(DEFAULT_LIMIT),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

impl FromStr for Direction {
    type Err = QueryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            _ => Err(QueryError::InvalidDirection(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderExp {
    pub field: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    Ne,
    Like,
}

impl Operator {
    pub fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Ne => "!=",
            Operator::Like => "like",
        }
    }
}

impl FromStr for Operator {
    type Err = QueryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "eq" => Ok(Operator::Eq),
            "lt" => Ok(Operator::Lt),
            "le" => Ok(Operator::Le),
            "gt" => Ok(Operator::Gt),
            "ge" => Ok(Operator::Ge),
            "ne" => Ok(Operator::Ne),
            "lk" => Ok(Operator::Like),
            _ => Err(QueryError::InvalidOperator(value.to_string())),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Float,
    Bool,
    Text,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Bool => "boolean",
            FieldKind::Text => "string",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, FieldKind::Integer | FieldKind::Float)
    }
}

/// A whitelisted field with a checked, escaped value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub name: String,
    pub value: String,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterExp {
    /// Internal field names; more than one for wildcard filters.
    pub fields: Vec<String>,
    pub operator: Operator,
    pub value: String,
    pub kind: FieldKind,
}

/// Sort whitelist of an entity.
pub trait Checker {
    /// Internal name of `field` when it may be sorted on.
    fn check(&self, field: &str) -> Option<&str>;
}

/// Filter whitelist of an entity.
pub trait Extractor {
    fn extract(&self, field: &str, raw_value: &str) -> Result<Extracted, QueryError>;

    /// Internal names searched by the `*` wildcard.
    fn all_fields(&self) -> Vec<String>;
}

pub fn parse_limit(raw: &str) -> Result<Limit, QueryError> {
    parse_limit_or(raw, DEFAULT_LIMIT)
}

/// Parses `offset:count`; empty input yields offset 0 and `default_count`.
/// A count of 0 removes the limit instead of selecting zero rows.
pub fn parse_limit_or(raw: &str, default_count: u64) -> Result<Limit, QueryError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Limit {
            offset: 0,
            count: Some(default_count),
        });
    }
    let invalid = || QueryError::InvalidLimit(trimmed.to_string());
    let (offset, count) = trimmed.split_once(':').ok_or_else(invalid)?;
    let offset = offset.trim().parse::<u64>().map_err(|_| invalid())?;
    let count = count.trim().parse::<u64>().map_err(|_| invalid())?;
    Ok(Limit {
        offset,
        count: (count > 0).then_some(count),
    })
}

fn tokens(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|token| !token.is_empty())
}

pub fn parse_order<C>(raw: &str, checker: &C) -> Result<Vec<OrderExp>, QueryError>
where
    C: Checker + ?Sized,
{
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut orders = Vec::new();
    for token in tokens(raw) {
        let (field, direction) = token
            .split_once(':')
            .ok_or_else(|| QueryError::InvalidSort(token.to_string()))?;
        let direction = direction.trim().parse::<Direction>()?;
        let field = field.trim();
        let internal = checker
            .check(field)
            .ok_or_else(|| QueryError::UnknownField(field.to_string()))?;
        orders.push(OrderExp {
            field: internal.to_string(),
            direction,
        });
    }
    if orders.is_empty() {
        return Err(QueryError::SortNotFound);
    }
    Ok(orders)
}

pub fn parse_filter<E>(raw: &str, extractor: &E) -> Result<Vec<FilterExp>, QueryError>
where
    E: Extractor + ?Sized,
{
    let mut filters = Vec::new();
    for token in tokens(raw) {
        let mut parts = token.splitn(3, ':');
        let (Some(field), Some(operator), Some(value)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(QueryError::InvalidFilter(token.to_string()));
        };
        let field = field.trim();
        if field.is_empty() {
            return Err(QueryError::InvalidFilter(token.to_string()));
        }
        let operator = operator.trim().parse::<Operator>()?;

        let mut filter = if field == "*" {
            if value.contains('\'') {
                return Err(QueryError::QuoteInWildcard);
            }
            let fields = extractor.all_fields();
            if fields.is_empty() {
                return Err(QueryError::UnknownField(field.to_string()));
            }
            FilterExp {
                fields,
                operator,
                value: value.to_string(),
                kind: FieldKind::Text,
            }
        } else {
            let extracted = extractor.extract(field, value)?;
            FilterExp {
                fields: vec![extracted.name],
                operator,
                value: extracted.value,
                kind: extracted.kind,
            }
        };
        if operator == Operator::Like {
            filter.value = filter.value.replace('*', "%");
        }
        filters.push(filter);
    }
    Ok(filters)
}

/// Parsed limit, order and filter for one list request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowQuery {
    pub limit: Limit,
    pub order: Vec<OrderExp>,
    pub filter: Vec<FilterExp>,
}

impl RowQuery {
    pub fn parse<F>(limit: &str, order: &str, filter: &str, fields: &F) -> Result<Self, QueryError>
    where
        F: Checker + Extractor + ?Sized,
    {
        Ok(Self {
            limit: parse_limit(limit)?,
            order: parse_order(order, fields)?,
            filter: parse_filter(filter, fields)?,
        })
    }

    /// Same query without pagination.
    pub fn unbounded(mut self) -> Self {
        self.limit = Limit {
            offset: 0,
            count: None,
        };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> FieldMap {
        FieldMap::new()
            .field("name", "name", FieldKind::Text)
            .field("age", "age", FieldKind::Integer)
            .field("score", "score", FieldKind::Float)
    }

    #[test]
    fn limit_parses_offset_and_count() {
        assert_eq!(
            parse_limit("0:10").unwrap(),
            Limit {
                offset: 0,
                count: Some(10)
            }
        );
        assert_eq!(parse_limit("").unwrap(), Limit::default());
        assert_eq!(parse_limit("").unwrap().count, Some(100));
    }

    #[test]
    fn zero_count_means_unbounded() {
        assert_eq!(
            parse_limit("5:0").unwrap(),
            Limit {
                offset: 5,
                count: None
            }
        );
    }

    #[test]
    fn limit_rejects_malformed_tokens() {
        for raw in ["abc:10", "10", "1:x", "-1:10", "1:-5", "1:2:3"] {
            assert!(
                matches!(parse_limit(raw), Err(QueryError::InvalidLimit(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn order_keeps_input_order() {
        let orders = parse_order("name:asc,age:DESC", &people()).unwrap();
        assert_eq!(
            orders,
            vec![
                OrderExp {
                    field: "name".into(),
                    direction: Direction::Asc
                },
                OrderExp {
                    field: "age".into(),
                    direction: Direction::Desc
                },
            ]
        );
    }

    #[test]
    fn order_rejects_bad_direction_and_unknown_field() {
        assert_eq!(
            parse_order("name:sideways", &people()),
            Err(QueryError::InvalidDirection("sideways".into()))
        );
        assert_eq!(
            parse_order("unknown:asc", &people()),
            Err(QueryError::UnknownField("unknown".into()))
        );
        assert!(matches!(
            parse_order("name", &people()),
            Err(QueryError::InvalidSort(_))
        ));
    }

    #[test]
    fn order_empty_versus_nothing_found() {
        assert!(parse_order("", &people()).unwrap().is_empty());
        assert_eq!(parse_order(" , ", &people()), Err(QueryError::SortNotFound));
    }

    #[test]
    fn filter_typed_field() {
        let filters = parse_filter("age:eq:30", &people()).unwrap();
        assert_eq!(
            filters,
            vec![FilterExp {
                fields: vec!["age".into()],
                operator: Operator::Eq,
                value: "30".into(),
                kind: FieldKind::Integer,
            }]
        );
        assert!(matches!(
            parse_filter("age:eq:thirty", &people()),
            Err(QueryError::InvalidValue { .. })
        ));
    }

    #[test]
    fn like_rewrites_stars() {
        let filters = parse_filter("name:lk:jo*n", &people()).unwrap();
        assert_eq!(filters[0].operator, Operator::Like);
        assert_eq!(filters[0].value, "jo%n");
    }

    #[test]
    fn text_values_double_quotes() {
        let filters = parse_filter("name:eq:o'brien", &people()).unwrap();
        assert_eq!(filters[0].value, "o''brien");
    }

    #[test]
    fn wildcard_searches_all_fields() {
        let filters = parse_filter("*:lk:*ann*", &people()).unwrap();
        assert_eq!(filters[0].fields, vec!["name", "age", "score"]);
        assert_eq!(filters[0].value, "%ann%");
        assert_eq!(
            parse_filter("*:eq:foo'bar", &people()),
            Err(QueryError::QuoteInWildcard)
        );
    }

    #[test]
    fn filter_values_may_contain_colons() {
        let filters = parse_filter("name:eq:10:30", &people()).unwrap();
        assert_eq!(filters[0].value, "10:30");
    }

    #[test]
    fn filter_rejects_malformed_tokens() {
        assert!(matches!(
            parse_filter("name:eq", &people()),
            Err(QueryError::InvalidFilter(_))
        ));
        assert!(matches!(
            parse_filter("name:contains:x", &people()),
            Err(QueryError::InvalidOperator(_))
        ));
        assert!(matches!(
            parse_filter("age:eq:1,height:gt:2", &people()),
            Err(QueryError::UnknownField(_))
        ));
    }
}
