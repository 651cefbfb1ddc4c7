//! Query evaluation for the in-memory store.
//!
//! Approximates the OpenSearch behaviour the pipeline relies on: analysed
//! `match` filters, fuzzy multi-field text matching with AUTO edit distance and
//! the relevance, creation time, id ordering.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde_json::Value;

use search_sync_shared::{FilterExpr, FilterTerm, QueryMode, CREATED_AT_FIELD};

/// Score a document against a query. `None` means the document does not match.
pub(crate) fn score(document: &Value, mode: &QueryMode, text_fields: &[(&str, f32)]) -> Option<f32> {
    match mode {
        QueryMode::MatchAll => Some(1.0),
        QueryMode::Filter(expr) => filter_matches(document, expr).then_some(1.0),
        QueryMode::FreeText(text) => {
            let score = text_score(document, text, text_fields);
            (score > 0.0).then_some(score)
        }
    }
}

/// Compare two scored documents: higher score first, then newer, then by id.
pub(crate) fn compare(a: &(f32, &Value), b: &(f32, &Value)) -> Ordering {
    b.0.total_cmp(&a.0)
        .then_with(|| created_at(b.1).cmp(&created_at(a.1)))
        .then_with(|| document_id(a.1).cmp(document_id(b.1)))
}

fn created_at(document: &Value) -> Option<DateTime<Utc>> {
    document
        .get(CREATED_AT_FIELD)
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn document_id(document: &Value) -> &str {
    document.get("id").and_then(Value::as_str).unwrap_or_default()
}

fn filter_matches(document: &Value, expr: &FilterExpr) -> bool {
    expr.any_of
        .iter()
        .any(|clause| clause.iter().all(|term| term_matches(document, term)))
}

fn term_matches(document: &Value, term: &FilterTerm) -> bool {
    let wanted = tokenize(&term.value);
    if wanted.is_empty() {
        return false;
    }
    let Some(field) = resolve_path(document, &term.field) else {
        return false;
    };
    let present = value_tokens(field);
    wanted.iter().all(|token| present.contains(token))
}

fn text_score(document: &Value, text: &str, text_fields: &[(&str, f32)]) -> f32 {
    let query_tokens = tokenize(text);
    let mut total = 0.0;

    for query_token in &query_tokens {
        let max_edits = auto_fuzziness(query_token.chars().count());
        let mut best: f32 = 0.0;

        for (field, boost) in text_fields {
            let Some(value) = resolve_path(document, field) else {
                continue;
            };
            for token in value_tokens(value) {
                let edits = levenshtein(query_token, &token);
                let weight = match edits {
                    0 => *boost,
                    e if e <= max_edits => *boost * 0.5,
                    _ => 0.0,
                };
                best = best.max(weight);
            }
        }
        total += best;
    }

    total
}

/// Edits allowed by AUTO fuzziness for a term of the given length.
fn auto_fuzziness(len: usize) -> usize {
    match len {
        0..=2 => 0,
        3..=5 => 1,
        _ => 2,
    }
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

fn resolve_path<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(document, |value, segment| value.get(segment))
}

/// Lowercased alphanumeric tokens, the way the standard analyzer splits text.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn value_tokens(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::String(s) => tokenize(s),
        Value::Bool(b) => vec![b.to_string()],
        Value::Number(n) => tokenize(&n.to_string()),
        Value::Array(items) => items.iter().flat_map(value_tokens).collect(),
        Value::Object(map) => map.values().flat_map(value_tokens).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FIELDS: &[(&str, f32)] = &[("title", 3.0), ("description", 1.0)];

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("milk", "milk"), 0);
        assert_eq!(levenshtein("milk", "mlik"), 2);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
    }

    #[test]
    fn test_auto_fuzziness() {
        assert_eq!(auto_fuzziness(2), 0);
        assert_eq!(auto_fuzziness(4), 1);
        assert_eq!(auto_fuzziness(8), 2);
    }

    #[test]
    fn test_filter_terms() {
        let doc = json!({
            "title": "Buy milk",
            "isCompleted": false,
            "priority": 2,
            "manufacturer": { "country": "Germany" }
        });

        let expr = FilterExpr::parse("isCompleted:false AND priority:2").unwrap();
        assert!(filter_matches(&doc, &expr));

        let expr = FilterExpr::parse("title:\"buy milk\"").unwrap();
        assert!(filter_matches(&doc, &expr));

        let expr = FilterExpr::parse("manufacturer.country:germany").unwrap();
        assert!(filter_matches(&doc, &expr));

        let expr = FilterExpr::parse("priority:1 OR title:milk").unwrap();
        assert!(filter_matches(&doc, &expr));

        let expr = FilterExpr::parse("priority:1 AND title:milk").unwrap();
        assert!(!filter_matches(&doc, &expr));

        let expr = FilterExpr::parse("missing:x").unwrap();
        assert!(!filter_matches(&doc, &expr));
    }

    #[test]
    fn test_text_score_prefers_exact_and_boosted_fields() {
        let in_title = json!({ "title": "Buy milk", "description": "" });
        let in_description = json!({ "title": "Groceries", "description": "milk" });
        let typo = json!({ "title": "Buy mlk" });
        let unrelated = json!({ "title": "Walk the dog" });

        let exact = text_score(&in_title, "milk", FIELDS);
        assert!(exact > text_score(&in_description, "milk", FIELDS));
        assert!(text_score(&typo, "milk", FIELDS) > 0.0);
        assert!(exact > text_score(&typo, "milk", FIELDS));
        assert_eq!(text_score(&unrelated, "milk", FIELDS), 0.0);
    }

    #[test]
    fn test_compare_orders_by_score_then_newest_then_id() {
        let old = json!({ "id": "a", "createdAt": "2024-01-01T00:00:00Z" });
        let new = json!({ "id": "b", "createdAt": "2024-06-01T00:00:00.5Z" });
        let same_time = json!({ "id": "c", "createdAt": "2024-06-01T00:00:00.500Z" });

        let mut scored = vec![(1.0, &old), (1.0, &same_time), (1.0, &new), (2.0, &old)];
        scored.sort_by(compare);

        let ids: Vec<&str> = scored.iter().map(|(_, doc)| document_id(doc)).collect();
        assert_eq!(ids, vec!["a", "b", "c", "a"]);
        assert_eq!(scored[0].0, 2.0);
    }
}
