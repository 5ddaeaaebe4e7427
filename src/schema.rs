//! Schema inference for imported tables.
//!
//! Imported columns always start out with the default column type; users
//! assign real types afterwards. Inference therefore only decides names,
//! ordering and field slots. A column's `field_num` is its 1-based position
//! and must fit a byte, which caps the table width at [`MAX_COLUMNS`].

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    error::ImportError,
    model::{DEFAULT_COLUMN_TYPE_ID, TableColumn},
};

pub const MAX_COLUMNS: usize = u8::MAX as usize;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    pub position: usize,
    pub field_num: u8,
    pub column_type_id: u64,
    pub prebuilt: bool,
}

impl ColumnDefinition {
    pub fn into_table_column(self, customer_table_id: u64) -> TableColumn {
        TableColumn {
            id: 0,
            customer_table_id,
            name: self.name,
            column_type_id: self.column_type_id,
            position: self.position,
            field_num: self.field_num,
            prebuilt: self.prebuilt,
            edition: 1,
            original_id: 0,
            active: true,
            created: Utc::now(),
        }
    }
}

pub fn synthetic_name(position: usize) -> String {
    format!("Column {position}")
}

/// Builds one column definition per field of `header_row`, in order.
///
/// With `has_header` the cell text names the column (blank cells fall back to
/// the synthetic name); otherwise every column is named `Column {position}`.
pub fn infer_schema(
    header_row: &[String],
    has_header: bool,
) -> Result<Vec<ColumnDefinition>, ImportError> {
    if header_row.is_empty() {
        return Err(ImportError::NoData);
    }
    if header_row.len() > MAX_COLUMNS {
        return Err(ImportError::TooManyColumns {
            found: header_row.len(),
            max: MAX_COLUMNS,
        });
    }
    Ok(header_row
        .iter()
        .enumerate()
        .map(|(position, cell)| {
            let name = if has_header && !cell.trim().is_empty() {
                cell.clone()
            } else {
                synthetic_name(position)
            };
            ColumnDefinition {
                name,
                position,
                // MAX_COLUMNS keeps position + 1 within a byte.
                field_num: (position + 1) as u8,
                column_type_id: DEFAULT_COLUMN_TYPE_ID,
                prebuilt: false,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn header_names_are_kept_in_order() {
        let columns = infer_schema(&row(&["Name", "Age"]), true).unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].name, "Name");
        assert_eq!(columns[1].name, "Age");
        assert_eq!(columns[0].position, 0);
        assert_eq!(columns[1].position, 1);
        assert_eq!(columns[0].field_num, 1);
        assert_eq!(columns[1].field_num, 2);
        assert!(columns.iter().all(|c| c.column_type_id == DEFAULT_COLUMN_TYPE_ID));
        assert!(columns.iter().all(|c| !c.prebuilt));
    }

    #[test]
    fn headerless_sources_get_synthetic_names() {
        let columns = infer_schema(&row(&["Name", "Age"]), false).unwrap();
        assert_eq!(columns[0].name, "Column 0");
        assert_eq!(columns[1].name, "Column 1");
    }

    #[test]
    fn blank_header_cells_fall_back_to_synthetic_names() {
        let columns = infer_schema(&row(&["id", "  ", "total"]), true).unwrap();
        assert_eq!(columns[1].name, "Column 1");
    }

    #[test]
    fn header_text_is_kept_verbatim() {
        let columns = infer_schema(&row(&[" Unit price ", "qty"]), true).unwrap();
        assert_eq!(columns[0].name, " Unit price ");
    }

    #[test]
    fn empty_row_is_no_data() {
        assert!(matches!(infer_schema(&[], true), Err(ImportError::NoData)));
    }

    #[test]
    fn width_is_capped() {
        let wide = vec![String::from("x"); MAX_COLUMNS + 1];
        assert!(matches!(
            infer_schema(&wide, false),
            Err(ImportError::TooManyColumns { found: 256, max: 255 })
        ));
        let widest = vec![String::from("x"); MAX_COLUMNS];
        let columns = infer_schema(&widest, false).unwrap();
        assert_eq!(columns.last().unwrap().field_num, 255);
    }

    #[test]
    fn inference_is_deterministic() {
        let header = row(&["a", "b", "c"]);
        assert_eq!(
            infer_schema(&header, true).unwrap(),
            infer_schema(&header, true).unwrap()
        );
    }
}
