/// Decode a JSON string-array column, tolerating NULL/empty/garbage.
pub(crate) fn json_vec(raw: Option<String>) -> Vec<String> {
    raw.as_deref()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default()
}

/// Encode a string list as a JSON array column value.
pub(crate) fn vec_json(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_vec_roundtrip() {
        let items = vec!["a".to_string(), "b".to_string()];
        assert_eq!(json_vec(Some(vec_json(&items))), items);
    }

    #[test]
    fn json_vec_tolerates_garbage() {
        assert!(json_vec(None).is_empty());
        assert!(json_vec(Some("not json".into())).is_empty());
        assert!(json_vec(Some(String::new())).is_empty());
    }
}
