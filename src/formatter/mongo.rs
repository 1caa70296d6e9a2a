//! MongoDB result rendering
//!
//! Scalars print bare; documents and arrays print as pretty relaxed
//! Extended JSON, so ObjectIds and dates appear as `{"$oid": ...}` and
//! `{"$date": ...}`.

use mongodb::bson::Bson;

/// Render a result value
pub fn format_bson(value: &Bson) -> String {
    match value {
        Bson::Null | Bson::Undefined => "null".to_string(),
        Bson::String(s) => s.clone(),
        Bson::Boolean(b) => b.to_string(),
        Bson::Int32(i) => i.to_string(),
        Bson::Int64(i) => i.to_string(),
        Bson::Double(f) => f.to_string(),
        Bson::Array(items) if items.is_empty() => "[]".to_string(),
        other => {
            let json = other.clone().into_relaxed_extjson();
            serde_json::to_string_pretty(&json).unwrap_or_else(|_| json.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{doc, oid::ObjectId};

    #[test]
    fn test_scalars() {
        assert_eq!(format_bson(&Bson::Null), "null");
        assert_eq!(format_bson(&Bson::Undefined), "null");
        assert_eq!(format_bson(&Bson::String("switched".into())), "switched");
        assert_eq!(format_bson(&Bson::Int64(12)), "12");
        assert_eq!(format_bson(&Bson::Double(1.5)), "1.5");
        assert_eq!(format_bson(&Bson::Boolean(true)), "true");
    }

    #[test]
    fn test_empty_array() {
        assert_eq!(format_bson(&Bson::Array(vec![])), "[]");
    }

    #[test]
    fn test_document_is_pretty_json() {
        let text = format_bson(&Bson::Document(doc! { "name": "a", "n": 1 }));
        assert_eq!(text, "{\n  \"name\": \"a\",\n  \"n\": 1\n}");
    }

    #[test]
    fn test_object_id_uses_extended_json() {
        let oid = ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
        let text = format_bson(&Bson::Array(vec![Bson::Document(doc! { "_id": oid })]));
        assert!(text.contains("\"$oid\": \"507f1f77bcf86cd799439011\""));
        assert!(text.starts_with('['));
    }
}
