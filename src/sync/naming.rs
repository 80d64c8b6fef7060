//! Table and column naming.
//!
//! Table names are `<workspace>__<application>` built from the two URL
//! labels. Column names come from field external ids, truncated to
//! [`MAX_COLUMN_LEN`] characters and made unique within the table.

use std::collections::{HashMap, HashSet};

use crate::remote::{RemoteField, RemoteItem};
use crate::storage::FIXED_COLUMNS;

use super::codec::encode;

/// Longest column name derived from an external id (before any collision suffix).
pub const MAX_COLUMN_LEN: usize = 40;

/// Replace every character that is not an ASCII letter, digit or `_` with `_`.
#[must_use]
pub fn normalize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Target table name for an application.
#[must_use]
pub fn table_name(workspace_label: &str, app_label: &str) -> String {
    format!(
        "{}__{}",
        normalize_label(workspace_label),
        normalize_label(app_label)
    )
}

/// One data column and the field it is filled from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub external_id: String,
}

/// Ordered data columns of a mirrored table.
///
/// Built from the application's active fields; the same model drives both
/// table creation and row construction, so the two can only disagree when
/// the remote schema changed after the table was created.
#[derive(Debug, Clone, Default)]
pub struct ColumnModel {
    columns: Vec<Column>,
    by_external_id: HashMap<String, usize>,
}

impl ColumnModel {
    /// Derive column names from fields, in field order.
    ///
    /// A truncated name that equals (ignoring case) a fixed column or an
    /// earlier column gets `_2`, `_3`, ... appended until it is unique.
    pub fn from_fields<'a, I>(fields: I) -> Self
    where
        I: IntoIterator<Item = &'a RemoteField>,
    {
        let mut taken: HashSet<String> = FIXED_COLUMNS.iter().map(|c| c.to_lowercase()).collect();
        let mut model = Self::default();

        for field in fields {
            // Repeated external ids map to the first column only
            if model.by_external_id.contains_key(&field.external_id) {
                continue;
            }

            let base: String = field.external_id.chars().take(MAX_COLUMN_LEN).collect();
            let mut name = base.clone();
            let mut suffix = 2;
            while taken.contains(&name.to_lowercase()) {
                name = format!("{base}_{suffix}");
                suffix += 1;
            }

            taken.insert(name.to_lowercase());
            model
                .by_external_id
                .insert(field.external_id.clone(), model.columns.len());
            model.columns.push(Column {
                name,
                external_id: field.external_id.clone(),
            });
        }

        model
    }

    /// Column names in table order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column index for a field, if the field is part of the model.
    #[must_use]
    pub fn position(&self, external_id: &str) -> Option<usize> {
        self.by_external_id.get(external_id).copied()
    }

    /// Encoded values for an item, one per column.
    ///
    /// Columns the item carries no value for stay empty, and item fields
    /// outside the model are ignored.
    #[must_use]
    pub fn row_values(&self, item: &RemoteItem) -> Vec<String> {
        let mut values = vec![String::new(); self.columns.len()];
        for field in &item.fields {
            if let Some(index) = self.position(&field.external_id) {
                values[index] = encode(field);
            }
        }
        values
    }
}

/// Table names handed out during one pass.
#[derive(Debug, Default)]
pub struct TableClaims {
    owners: HashMap<String, i64>,
}

impl TableClaims {
    /// Claim `table` for `app_id`.
    ///
    /// # Errors
    ///
    /// Returns the owning application id when another application already
    /// claimed the name.
    pub fn claim(&mut self, table: &str, app_id: i64) -> Result<(), i64> {
        match self.owners.get(table) {
            Some(&owner) if owner != app_id => Err(owner),
            Some(_) => Ok(()),
            None => {
                self.owners.insert(table.to_string(), app_id);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{FieldType, LifecycleStatus, RemoteItemField};
    use chrono::NaiveDateTime;

    fn field(external_id: &str) -> RemoteField {
        RemoteField {
            external_id: external_id.to_string(),
            field_type: FieldType::Plain("text".to_string()),
            status: LifecycleStatus::Active,
        }
    }

    #[test]
    fn test_table_name_is_deterministic() {
        assert_eq!(table_name("sales-team", "lead-tracker"), "sales_team__lead_tracker");
        assert_eq!(
            table_name("sales-team", "lead-tracker"),
            table_name("sales-team", "lead-tracker")
        );
        assert_ne!(table_name("sales", "leads"), table_name("sales", "deals"));
    }

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("a.b c/d-e_f9"), "a_b_c_d_e_f9");
        assert_eq!(normalize_label("ação"), "a__o");
    }

    #[test]
    fn test_long_names_that_truncate_equal_stay_distinct() {
        let fields = [
            field("customer_identifier_code_long_name_a_very_long_suffix"),
            field("customer_identifier_code_long_name_a_very_long_suffix_b"),
        ];
        let model = ColumnModel::from_fields(&fields);
        let names = model.names();

        assert_eq!(names[0].chars().count(), MAX_COLUMN_LEN);
        assert_eq!(names[1], format!("{}_2", names[0]));
        assert_ne!(names[0], names[1]);
    }

    #[test]
    fn test_distinct_truncated_names_are_kept() {
        let fields = [
            field("customer_identifier_code_long_name_a"),
            field("customer_identifier_code_long_name_b"),
        ];
        let names = ColumnModel::from_fields(&fields).names();
        assert_eq!(
            names,
            vec![
                "customer_identifier_code_long_name_a".to_string(),
                "customer_identifier_code_long_name_b".to_string()
            ]
        );
    }

    #[test]
    fn test_fixed_column_names_are_reserved() {
        let fields = [field("id"), field("ID"), field("created_on"), field("title")];
        let names = ColumnModel::from_fields(&fields).names();
        assert_eq!(names, vec!["id_2", "ID_3", "created_on_2", "title"]);
    }

    #[test]
    fn test_first_claim_wins() {
        let mut claims = TableClaims::default();
        assert!(claims.claim("sales__leads", 1).is_ok());
        assert!(claims.claim("sales__leads", 1).is_ok());
        assert_eq!(claims.claim("sales__leads", 2), Err(1));
        assert!(claims.claim("sales__deals", 2).is_ok());
    }

    #[test]
    fn test_row_values_follow_column_order() {
        let fields = [field("title"), field("notes"), field("stage")];
        let model = ColumnModel::from_fields(&fields);

        let ts = NaiveDateTime::parse_from_str("2023-01-01 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let item = RemoteItem {
            item_id: 1,
            created_on: ts,
            last_event_on: ts,
            fields: vec![
                RemoteItemField {
                    external_id: "stage".to_string(),
                    field_type: FieldType::Plain("text".to_string()),
                    values: vec![serde_json::json!({"value": "won"})],
                },
                RemoteItemField {
                    external_id: "retired".to_string(),
                    field_type: FieldType::Plain("text".to_string()),
                    values: vec![serde_json::json!({"value": "ignored"})],
                },
                RemoteItemField {
                    external_id: "title".to_string(),
                    field_type: FieldType::Plain("text".to_string()),
                    values: vec![serde_json::json!({"value": "Acme"})],
                },
            ],
        };

        assert_eq!(model.row_values(&item), vec!["Acme", "", "won"]);
    }
}
