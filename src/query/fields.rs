//! Static field whitelists.
//!
//! A [`FieldMap`] maps the public field names a client may sort or filter on
//! to their internal query names and value kinds. It implements both
//! [`Checker`] and [`Extractor`], so an entity only needs to declare its map.

use crate::{
    error::QueryError,
    model::TableColumn,
    query::{Checker, Extracted, Extractor, FieldKind},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub internal: String,
    pub kind: FieldKind,
    pub sortable: bool,
    /// Included in `*` wildcard searches.
    pub searchable: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    fields: Vec<(String, FieldSpec)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sortable, wildcard-searchable field.
    pub fn field(self, public: &str, internal: &str, kind: FieldKind) -> Self {
        self.with(public, internal, kind, true)
    }

    /// Adds a sortable field that wildcard searches skip.
    pub fn meta_field(self, public: &str, internal: &str, kind: FieldKind) -> Self {
        self.with(public, internal, kind, false)
    }

    fn with(mut self, public: &str, internal: &str, kind: FieldKind, searchable: bool) -> Self {
        if self.lookup_exact(public).is_none() {
            self.fields.push((
                public.to_string(),
                FieldSpec {
                    internal: internal.to_string(),
                    kind,
                    sortable: true,
                    searchable,
                },
            ));
        }
        self
    }

    /// Fields of a customer table's rows: row metadata plus every column under
    /// its header name and its `field{N}` alias.
    pub fn for_table_rows(columns: &[TableColumn]) -> Self {
        let mut map = FieldMap::new()
            .meta_field("id", "id", FieldKind::Integer)
            .meta_field("position", "position", FieldKind::Integer)
            .meta_field("wrong", "wrong", FieldKind::Bool)
            .meta_field("edition", "edition", FieldKind::Integer);
        for column in columns {
            let internal = column_field(column.field_num);
            map = map
                .field(&column.name, &internal, FieldKind::Text)
                .field(&format!("field{}", column.field_num), &internal, FieldKind::Text);
        }
        map
    }

    fn lookup_exact(&self, public: &str) -> Option<&FieldSpec> {
        self.fields
            .iter()
            .find(|(name, _)| name == public)
            .map(|(_, spec)| spec)
    }

    pub fn lookup(&self, public: &str) -> Option<&FieldSpec> {
        self.lookup_exact(public).or_else(|| {
            self.fields
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(public))
                .map(|(_, spec)| spec)
        })
    }
}

/// Internal query name of a column slot.
pub fn column_field(field_num: u8) -> String {
    format!("field_{field_num}")
}

fn check_value(field: &str, kind: FieldKind, raw: &str) -> Result<String, QueryError> {
    let invalid = || QueryError::InvalidValue {
        field: field.to_string(),
        kind: kind.as_str(),
        value: raw.to_string(),
    };
    let trimmed = raw.trim();
    match kind {
        FieldKind::Integer => trimmed
            .parse::<i64>()
            .map(|value| value.to_string())
            .map_err(|_| invalid()),
        FieldKind::Float => match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(trimmed.to_string()),
            _ => Err(invalid()),
        },
        FieldKind::Bool => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok("true".to_string()),
            "false" | "0" => Ok("false".to_string()),
            _ => Err(invalid()),
        },
        FieldKind::Text => Ok(raw.replace('\'', "''")),
    }
}

impl Checker for FieldMap {
    fn check(&self, field: &str) -> Option<&str> {
        self.lookup(field)
            .filter(|spec| spec.sortable)
            .map(|spec| spec.internal.as_str())
    }
}

impl Extractor for FieldMap {
    fn extract(&self, field: &str, raw_value: &str) -> Result<Extracted, QueryError> {
        let spec = self
            .lookup(field)
            .ok_or_else(|| QueryError::UnknownField(field.to_string()))?;
        Ok(Extracted {
            name: spec.internal.clone(),
            value: check_value(field, spec.kind, raw_value)?,
            kind: spec.kind,
        })
    }

    fn all_fields(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for (_, spec) in &self.fields {
            if spec.searchable && !names.contains(&spec.internal) {
                names.push(spec.internal.clone());
            }
        }
        names
    }
}
