//! Field value encoding.
//!
//! Every item field becomes one text cell. The result is the raw text, with
//! no quoting or escaping: it is always bound as a statement parameter.

use serde_json::Value;

use crate::remote::{FieldType, RemoteItemField};

/// Separator for multi-valued fields (contacts, app references).
pub const MULTI_VALUE_SEPARATOR: &str = "|";

/// Encode a field as text.
///
/// Total over [`FieldType`]: a value missing where its type expects one
/// encodes as an empty string.
#[must_use]
pub fn encode(field: &RemoteItemField) -> String {
    let first = field.values.first();

    match &field.field_type {
        FieldType::Category => text_at(first, &["value", "text"]),
        FieldType::Date => text_at(first, &["start"]),
        FieldType::Calculation => match first.and_then(|v| v.get("start")) {
            Some(start) => stringify(start),
            None => text_at(first, &["value"]),
        },
        FieldType::Money => {
            let currency = text_at(first, &["currency"]);
            let amount = text_at(first, &["value"]);
            if currency.is_empty() && amount.is_empty() {
                String::new()
            } else {
                format!("{currency} {amount}")
            }
        }
        FieldType::Image => text_at(first, &["value", "link"]),
        FieldType::Embed => text_at(first, &["embed", "url"]),
        FieldType::Contact => join_all(&field.values, &["value", "name"]),
        FieldType::App => join_all(&field.values, &["value", "title"]),
        FieldType::Plain(_) => text_at(first, &["value"]),
    }
}

fn lookup<'a>(value: Option<&'a Value>, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value?, |current, key| current.get(*key))
}

fn text_at(value: Option<&Value>, path: &[&str]) -> String {
    lookup(value, path).map(stringify).unwrap_or_default()
}

fn join_all(values: &[Value], path: &[&str]) -> String {
    values
        .iter()
        .map(|v| text_at(Some(v), path))
        .collect::<Vec<_>>()
        .join(MULTI_VALUE_SEPARATOR)
}

/// Strings as-is, null as empty, anything else as compact JSON.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(field_type: &str, values: Value) -> RemoteItemField {
        serde_json::from_value(json!({
            "external_id": "f",
            "type": field_type,
            "values": values,
        }))
        .unwrap()
    }

    #[test]
    fn test_category_uses_first_option() {
        let f = field(
            "category",
            json!([{"value": {"id": 1, "text": "Won"}}, {"value": {"id": 2, "text": "Lost"}}]),
        );
        assert_eq!(encode(&f), "Won");
    }

    #[test]
    fn test_date_and_calculation_start() {
        let date = field("date", json!([{"start": "2023-04-01 08:00:00", "end": null}]));
        assert_eq!(encode(&date), "2023-04-01 08:00:00");

        let calc_date = field("calculation", json!([{"start": "2023-04-02 00:00:00"}]));
        assert_eq!(encode(&calc_date), "2023-04-02 00:00:00");

        let calc_number = field("calculation", json!([{"value": "42.0000"}]));
        assert_eq!(encode(&calc_number), "42.0000");
    }

    #[test]
    fn test_money() {
        let f = field("money", json!([{"currency": "BRL", "value": "1500.0000"}]));
        assert_eq!(encode(&f), "BRL 1500.0000");
    }

    #[test]
    fn test_image_and_embed() {
        let image = field(
            "image",
            json!([{"value": {"file_id": 9, "link": "https://files.podio.com/9"}}]),
        );
        assert_eq!(encode(&image), "https://files.podio.com/9");

        let embed = field(
            "embed",
            json!([{"embed": {"url": "https://example.com/doc"}, "file": null}]),
        );
        assert_eq!(encode(&embed), "https://example.com/doc");
    }

    #[test]
    fn test_multi_valued_fields_are_joined() {
        let contacts = field(
            "contact",
            json!([{"value": {"name": "Ana"}}, {"value": {"name": "Bruno"}}]),
        );
        assert_eq!(encode(&contacts), "Ana|Bruno");

        let apps = field(
            "app",
            json!([{"value": {"item_id": 1, "title": "Deal A"}}, {"value": {"item_id": 2, "title": "Deal B"}}]),
        );
        assert_eq!(encode(&apps), "Deal A|Deal B");
    }

    #[test]
    fn test_plain_values_are_stringified() {
        assert_eq!(encode(&field("text", json!([{"value": "hello"}]))), "hello");
        assert_eq!(encode(&field("number", json!([{"value": 3.5}]))), "3.5");
        assert_eq!(encode(&field("duration", json!([{"value": 3600}]))), "3600");
        assert_eq!(
            encode(&field("location", json!([{"value": {"lat": 1}}]))),
            r#"{"lat":1}"#
        );
    }

    #[test]
    fn test_quotes_are_preserved() {
        let f = field("text", json!([{"value": "O'Brien said \"hi\""}]));
        assert_eq!(encode(&f), "O'Brien said \"hi\"");
    }

    #[test]
    fn test_missing_values_encode_empty() {
        assert_eq!(encode(&field("text", json!([]))), "");
        assert_eq!(encode(&field("category", json!([{"value": {}}]))), "");
        assert_eq!(encode(&field("contact", json!([]))), "");
        assert_eq!(encode(&field("money", json!([]))), "");
    }
}
