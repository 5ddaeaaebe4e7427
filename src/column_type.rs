//! Column type validation.
//!
//! [`validate`] decides whether a raw cell value satisfies a [`ColumnType`]
//! and returns the corrected value for types with a domain parser (phone
//! numbers, prices, ranges). Regular expressions are anchored so a pattern
//! must match the whole value. [`RegexCache`] compiles every referenced
//! pattern once; [`TypeValidator`] bundles the cache with the type lookup
//! used by bulk validation and cell edits. All of it is read-only after
//! construction and safe to share across threads.

use std::{collections::HashMap, str::FromStr};

use regex::Regex;
use rust_decimal::Decimal;

use crate::{
    error::ConfigError,
    model::{Alignment, ColumnType, DEFAULT_COLUMN_TYPE_ID, ValueParser},
};

/// Outcome of validating one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub valid: bool,
    pub corrected: String,
}

impl Verdict {
    fn valid(corrected: impl Into<String>) -> Self {
        Self {
            valid: true,
            corrected: corrected.into(),
        }
    }

    fn invalid(raw: &str) -> Self {
        Self {
            valid: false,
            corrected: raw.to_string(),
        }
    }
}

pub fn compile_pattern(column_type: &ColumnType) -> Result<Regex, ConfigError> {
    Regex::new(&format!("^(?:{})$", column_type.regexp)).map_err(|source| {
        ConfigError::InvalidRegex {
            id: column_type.id,
            name: column_type.name.clone(),
            source,
        }
    })
}

/// Validates `raw` against `column_type`. `compiled` is the type's anchored
/// regex when the caller has one cached; otherwise it is compiled here.
///
/// Empty values of optional types are valid without consulting the regex.
pub fn validate(
    column_type: &ColumnType,
    compiled: Option<&Regex>,
    raw: &str,
) -> Result<Verdict, ConfigError> {
    if column_type.is_default() {
        return Ok(Verdict::valid(raw));
    }
    if raw.is_empty() {
        return Ok(if column_type.required {
            Verdict::invalid(raw)
        } else {
            Verdict::valid(raw)
        });
    }
    if !column_type.regexp.is_empty() {
        let matched = match compiled {
            Some(regex) => regex.is_match(raw),
            None => compile_pattern(column_type)?.is_match(raw),
        };
        if !matched {
            return Ok(Verdict::invalid(raw));
        }
    }
    let corrected = match column_type.parser {
        ValueParser::None => Some(raw.to_string()),
        ValueParser::Phone => correct_phone(raw),
        ValueParser::Price => correct_price(raw),
        ValueParser::Range => correct_range(raw),
    };
    Ok(match corrected {
        Some(value) => Verdict::valid(value),
        None => Verdict::invalid(raw),
    })
}

fn correct_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse::<u64>().is_ok().then_some(digits)
}

fn parse_amount(raw: &str) -> Option<Decimal> {
    let normalized: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    Decimal::from_str(&normalized).ok()
}

fn correct_price(raw: &str) -> Option<String> {
    parse_amount(raw)
        .filter(|price| !price.is_sign_negative())
        .map(|price| price.to_string())
}

fn correct_range(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let (low, high) = trimmed
        .split_once("..")
        .or_else(|| trimmed.split_once('-'))?;
    let low = parse_amount(low)?;
    let high = parse_amount(high)?;
    (low <= high).then(|| format!("{low}-{high}"))
}

/// Anchored regexes keyed by column type id.
#[derive(Debug, Default, Clone)]
pub struct RegexCache {
    patterns: HashMap<u64, Regex>,
}

impl RegexCache {
    pub fn build<'a, I>(types: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = &'a ColumnType>,
    {
        let mut patterns = HashMap::new();
        for column_type in types {
            if column_type.regexp.is_empty() || column_type.is_default() {
                continue;
            }
            patterns.insert(column_type.id, compile_pattern(column_type)?);
        }
        Ok(Self { patterns })
    }

    pub fn get(&self, type_id: u64) -> Option<&Regex> {
        self.patterns.get(&type_id)
    }
}

/// Column types plus their compiled patterns.
#[derive(Debug, Clone)]
pub struct TypeValidator {
    types: HashMap<u64, ColumnType>,
    regexes: RegexCache,
}

impl TypeValidator {
    pub fn new(types: HashMap<u64, ColumnType>) -> Result<Self, ConfigError> {
        let regexes = RegexCache::build(types.values())?;
        Ok(Self { types, regexes })
    }

    /// The type and its compiled pattern, if it has one.
    pub fn resolve(&self, type_id: u64) -> Result<(&ColumnType, Option<&Regex>), ConfigError> {
        let column_type = self
            .types
            .get(&type_id)
            .ok_or(ConfigError::UnknownColumnType(type_id))?;
        Ok((column_type, self.regexes.get(type_id)))
    }

    pub fn validate(&self, type_id: u64, raw: &str) -> Result<Verdict, ConfigError> {
        let (column_type, compiled) = self.resolve(type_id)?;
        validate(column_type, compiled, raw)
    }
}

/// Column types every catalog starts from.
pub fn builtin_catalog() -> Vec<ColumnType> {
    fn entry(
        id: u64,
        name: &str,
        required: bool,
        regexp: &str,
        parser: ValueParser,
        align: Alignment,
    ) -> ColumnType {
        ColumnType {
            id,
            name: name.to_string(),
            required,
            regexp: regexp.to_string(),
            align_head: align,
            align_body: align,
            parser,
            active: true,
        }
    }

    use Alignment::{Left, Right};
    use ValueParser::{None, Phone, Price, Range};
    vec![
        entry(DEFAULT_COLUMN_TYPE_ID, "Default", false, "", None, Left),
        entry(2, "Text", false, "", None, Left),
        entry(3, "Required text", true, "", None, Left),
        entry(4, "Integer", false, r"-?\d+", None, Right),
        entry(5, "Decimal", false, r"-?\d+([.,]\d+)?", None, Right),
        entry(6, "E-mail", false, r"[^@\s]+@[^@\s]+\.[^@\s]+", None, Left),
        entry(7, "Phone", false, r"\+?[\d\s()\-]{5,20}", Phone, Left),
        entry(8, "Price", false, r"\d[\d\s]*([.,]\d{1,2})?", Price, Right),
        entry(
            9,
            "Range",
            false,
            r"\s*\d+([.,]\d+)?\s*(-|\.\.)\s*\d+([.,]\d+)?\s*",
            Range,
            Right,
        ),
        entry(10, "Date", false, r"\d{4}-\d{2}-\d{2}", None, Left),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_type(id: u64) -> ColumnType {
        builtin_catalog()
            .into_iter()
            .find(|t| t.id == id)
            .expect("builtin type")
    }

    fn custom(required: bool, regexp: &str) -> ColumnType {
        ColumnType {
            id: 42,
            name: "custom".into(),
            required,
            regexp: regexp.into(),
            align_head: Alignment::Left,
            align_body: Alignment::Left,
            parser: ValueParser::None,
            active: true,
        }
    }

    #[test]
    fn default_type_accepts_anything() {
        let default = catalog_type(DEFAULT_COLUMN_TYPE_ID);
        for raw in ["", "anything", "  ", "'; DROP TABLE"] {
            assert!(validate(&default, None, raw).unwrap().valid);
        }
    }

    #[test]
    fn required_rejects_empty_regardless_of_regex() {
        assert!(!validate(&custom(true, ""), None, "").unwrap().valid);
        assert!(!validate(&custom(true, ".*"), None, "").unwrap().valid);
    }

    #[test]
    fn regex_must_match_the_whole_value() {
        let digits = custom(false, r"\d+");
        assert!(validate(&digits, None, "123").unwrap().valid);
        assert!(!validate(&digits, None, "123abc").unwrap().valid);
        assert!(!validate(&digits, None, "x123").unwrap().valid);
    }

    #[test]
    fn bad_regex_is_a_configuration_error() {
        let broken = custom(false, "(unclosed");
        assert!(matches!(
            validate(&broken, None, "x"),
            Err(ConfigError::InvalidRegex { id: 42, .. })
        ));
        assert!(RegexCache::build([&broken]).is_err());
    }

    #[test]
    fn phone_numbers_are_normalized_to_digits() {
        let phone = catalog_type(7);
        let verdict = validate(&phone, None, "+7 (912) 345-67-89").unwrap();
        assert!(verdict.valid);
        assert_eq!(verdict.corrected, "79123456789");
    }

    #[test]
    fn phone_keeps_leading_zeros() {
        let phone = catalog_type(7);
        let verdict = validate(&phone, None, "0044 20 7946 0958").unwrap();
        assert!(verdict.valid);
        assert_eq!(verdict.corrected, "00442079460958");
    }

    #[test]
    fn phone_that_overflows_is_invalid_not_an_error() {
        let mut phone = catalog_type(7);
        phone.regexp = r"\d+".into();
        let verdict = validate(&phone, None, "999999999999999999999999").unwrap();
        assert!(!verdict.valid);
    }

    #[test]
    fn prices_accept_comma_decimals() {
        let price = catalog_type(8);
        let verdict = validate(&price, None, "1 250,50").unwrap();
        assert!(verdict.valid);
        assert_eq!(verdict.corrected, "1250.50");
        assert!(!validate(&price, None, "12.505").unwrap().valid);
    }

    #[test]
    fn ranges_require_ordered_bounds() {
        let range = catalog_type(9);
        let verdict = validate(&range, None, "10 - 20,5").unwrap();
        assert!(verdict.valid);
        assert_eq!(verdict.corrected, "10-20.5");
        assert_eq!(validate(&range, None, "1..3").unwrap().corrected, "1-3");
        assert!(!validate(&range, None, "20-10").unwrap().valid);
    }

    #[test]
    fn validator_uses_cached_patterns() {
        let types = builtin_catalog()
            .into_iter()
            .map(|t| (t.id, t))
            .collect::<HashMap<_, _>>();
        let validator = TypeValidator::new(types).unwrap();
        assert!(validator.validate(4, "-17").unwrap().valid);
        assert!(!validator.validate(4, "1.5").unwrap().valid);
        assert!(matches!(
            validator.validate(99, "x"),
            Err(ConfigError::UnknownColumnType(99))
        ));
    }
}
