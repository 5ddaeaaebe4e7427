use proptest::prelude::*;
use table_engine::{
    error::QueryError,
    query::{
        Direction, FieldKind, FieldMap, Limit, Operator, eval::like, parse_filter, parse_limit,
        parse_order,
        sql::{limit_clause, where_clause},
    },
};

fn people() -> FieldMap {
    FieldMap::new()
        .field("name", "name", FieldKind::Text)
        .field("age", "age", FieldKind::Integer)
}

#[test]
fn limit_defaults_and_unbounded_count() {
    assert_eq!(
        parse_limit("0:10").unwrap(),
        Limit {
            offset: 0,
            count: Some(10)
        }
    );
    assert_eq!(parse_limit("").unwrap(), Limit::default());
    assert_eq!(parse_limit("5:0").unwrap().count, None);
    assert_eq!(limit_clause(&parse_limit("5:0").unwrap()), "OFFSET 5");
    assert!(parse_limit("abc:10").is_err());
}

#[test]
fn order_tokens_keep_input_order() {
    let fields = people();
    let order = parse_order("name:asc,age:DESC", &fields).unwrap();
    assert_eq!(order.len(), 2);
    assert_eq!(order[0].field, "name");
    assert_eq!(order[1].direction, Direction::Desc);
    assert!(matches!(
        parse_order("name:sideways", &fields),
        Err(QueryError::InvalidDirection(_))
    ));
    assert!(matches!(
        parse_order("unknown:asc", &fields),
        Err(QueryError::UnknownField(_))
    ));
    assert!(parse_order("", &fields).unwrap().is_empty());
}

#[test]
fn filter_tokens_are_typed_and_rewritten() {
    let fields = people();
    let filters = parse_filter("age:eq:30", &fields).unwrap();
    assert_eq!(filters.len(), 1);
    assert_eq!(filters[0].fields, vec!["age"]);
    assert_eq!(filters[0].operator, Operator::Eq);
    assert_eq!(filters[0].value, "30");

    let filters = parse_filter("name:lk:jo*n", &fields).unwrap();
    assert_eq!(filters[0].value, "jo%n");

    assert_eq!(
        parse_filter("*:eq:foo'bar", &fields),
        Err(QueryError::QuoteInWildcard)
    );
    assert!(parse_filter("age:eq:thirty", &fields).is_err());
    assert!(parse_filter("age:between:1", &fields).is_err());
}

#[test]
fn quotes_in_named_text_filters_are_doubled() {
    let fields = people();
    let filters = parse_filter("name:eq:O'Brien", &fields).unwrap();
    assert_eq!(where_clause(&filters), "WHERE name = 'O''Brien'");
}

proptest! {
    #[test]
    fn any_offset_and_positive_count_parse(offset in 0u64..1_000_000, count in 1u64..1_000_000) {
        let limit = parse_limit(&format!("{offset}:{count}")).unwrap();
        prop_assert_eq!(limit.offset, offset);
        prop_assert_eq!(limit.count, Some(count));
    }

    #[test]
    fn unknown_sort_fields_are_always_rejected(field in "[a-z]{3,12}") {
        prop_assume!(field != "name" && field != "age");
        let fields = people();
        let raw = format!("{field}:asc");
        prop_assert!(parse_order(&raw, &fields).is_err());
    }

    #[test]
    fn wildcard_values_with_quotes_never_parse(prefix in "[a-z]{0,8}", suffix in "[a-z]{0,8}") {
        let fields = people();
        let raw = format!("*:eq:{prefix}'{suffix}");
        prop_assert_eq!(parse_filter(&raw, &fields), Err(QueryError::QuoteInWildcard));
    }

    #[test]
    fn like_without_wildcards_is_equality(left in "[a-z]{0,10}", right in "[a-z]{0,10}") {
        prop_assert_eq!(like(&left, &right), left == right);
    }

    #[test]
    fn like_percent_matches_any_suffix(prefix in "[a-z]{0,6}", rest in "[a-z]{0,6}") {
        let value = format!("{prefix}{rest}");
        let pattern = format!("{prefix}%");
        prop_assert!(like(&pattern, &value));
    }
}
