//! SQL fragment rendering for parsed expressions.
//!
//! Field names in the expressions are already internal names from a
//! whitelist and values are already checked or quote-escaped, so rendering is
//! plain string assembly.

use itertools::Itertools;

use crate::query::{FieldKind, FilterExp, Limit, OrderExp};

fn literal(filter: &FilterExp) -> String {
    match filter.kind {
        FieldKind::Text => format!("'{}'", filter.value),
        _ => filter.value.clone(),
    }
}

pub fn order_clause(orders: &[OrderExp]) -> String {
    if orders.is_empty() {
        return String::new();
    }
    format!(
        "ORDER BY {}",
        orders
            .iter()
            .map(|order| format!("{} {}", order.field, order.direction.as_sql()))
            .join(", ")
    )
}

pub fn filter_fragment(filter: &FilterExp) -> String {
    let value = literal(filter);
    let op = filter.operator.as_sql();
    if filter.fields.len() == 1 {
        format!("{} {op} {value}", filter.fields[0])
    } else {
        format!(
            "({})",
            filter
                .fields
                .iter()
                .map(|field| format!("{field} {op} {value}"))
                .join(" OR ")
        )
    }
}

pub fn where_clause(filters: &[FilterExp]) -> String {
    if filters.is_empty() {
        return String::new();
    }
    format!("WHERE {}", filters.iter().map(filter_fragment).join(" AND "))
}

pub fn limit_clause(limit: &Limit) -> String {
    match (limit.count, limit.offset) {
        (Some(count), offset) => format!("LIMIT {count} OFFSET {offset}"),
        (None, 0) => String::new(),
        (None, offset) => format!("OFFSET {offset}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{
        Direction, FieldMap, parse_filter, parse_limit, parse_order,
    };

    fn fields() -> FieldMap {
        FieldMap::new()
            .field("name", "u.name", FieldKind::Text)
            .field("age", "u.age", FieldKind::Integer)
    }

    #[test]
    fn renders_order() {
        let orders = parse_order("name:asc,age:desc", &fields()).unwrap();
        assert_eq!(order_clause(&orders), "ORDER BY u.name ASC, u.age DESC");
        assert_eq!(order_clause(&[]), "");
        assert_eq!(
            order_clause(&[OrderExp {
                field: "x".into(),
                direction: Direction::Desc
            }]),
            "ORDER BY x DESC"
        );
    }

    #[test]
    fn renders_filters() {
        let filters = parse_filter("name:lk:jo*,age:ge:18", &fields()).unwrap();
        assert_eq!(
            where_clause(&filters),
            "WHERE u.name like 'jo%' AND u.age >= 18"
        );
    }

    #[test]
    fn renders_wildcard_as_disjunction() {
        let filters = parse_filter("*:eq:7", &fields()).unwrap();
        assert_eq!(filter_fragment(&filters[0]), "(u.name = '7' OR u.age = '7')");
    }

    #[test]
    fn escaped_quotes_stay_inside_literal() {
        let filters = parse_filter("name:eq:x' OR '1'='1", &fields()).unwrap();
        assert_eq!(
            filter_fragment(&filters[0]),
            "u.name = 'x'' OR ''1''=''1'"
        );
    }

    #[test]
    fn renders_limits() {
        assert_eq!(limit_clause(&parse_limit("").unwrap()), "LIMIT 100 OFFSET 0");
        assert_eq!(limit_clause(&parse_limit("20:10").unwrap()), "LIMIT 10 OFFSET 20");
        assert_eq!(limit_clause(&parse_limit("0:0").unwrap()), "");
        assert_eq!(limit_clause(&parse_limit("5:0").unwrap()), "OFFSET 5");
    }
}
