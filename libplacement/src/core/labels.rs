use std::collections::HashMap;

/// Reports whether `actual` contains every key of `required` with the same
/// value. Extra keys in `actual` are ignored.
pub fn has_matching_labels(
    actual: &HashMap<String, String>,
    required: &HashMap<String, String>,
) -> bool {
    if actual.len() < required.len() {
        return false;
    }
    required
        .iter()
        .all(|(key, value)| matches!(actual.get(key), Some(v) if v == value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_selector_matches_anything() {
        assert!(has_matching_labels(&labels(&[]), &labels(&[])));
        assert!(has_matching_labels(&labels(&[("a", "1")]), &labels(&[])));
    }

    #[test]
    fn test_subset_matches() {
        let actual = labels(&[("app", "nginx"), ("tier", "web")]);
        assert!(has_matching_labels(&actual, &labels(&[("app", "nginx")])));
        assert!(has_matching_labels(&actual, &actual));
    }

    #[test]
    fn test_value_mismatch() {
        let actual = labels(&[("app", "nginx")]);
        assert!(!has_matching_labels(&actual, &labels(&[("app", "redis")])));
    }

    #[test]
    fn test_missing_key() {
        let actual = labels(&[("app", "nginx"), ("tier", "web")]);
        assert!(!has_matching_labels(&actual, &labels(&[("zone", "a")])));
    }

    #[test]
    fn test_fewer_labels_than_required() {
        let actual = labels(&[("app", "nginx")]);
        let required = labels(&[("app", "nginx"), ("tier", "web")]);
        assert!(!has_matching_labels(&actual, &required));
    }
}
