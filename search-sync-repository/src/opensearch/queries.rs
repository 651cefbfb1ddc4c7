//! OpenSearch query builders.
//!
//! This module translates a [`SearchQuery`] into an OpenSearch search body.

use serde_json::{json, Value};

use search_sync_shared::{FilterExpr, FilterTerm, QueryMode, SearchQuery, CREATED_AT_FIELD};

/// Build the complete search body for a query: query clause, pagination and
/// the stable sort order.
pub fn build_search_body(query: &SearchQuery, text_fields: &[(&str, f32)]) -> Value {
    json!({
        "query": build_query(&query.mode, text_fields),
        "from": query.offset(),
        "size": query.page_size,
        "sort": build_sort(),
        "track_total_hits": true
    })
}

fn build_query(mode: &QueryMode, text_fields: &[(&str, f32)]) -> Value {
    match mode {
        QueryMode::MatchAll => json!({ "match_all": {} }),
        QueryMode::Filter(expr) => build_filter_query(expr),
        QueryMode::FreeText(text) => build_text_query(text, text_fields),
    }
}

/// Relevance first, then newest first, then id so equal-score pages are stable.
fn build_sort() -> Value {
    json!([
        { "_score": { "order": "desc" } },
        { CREATED_AT_FIELD: { "order": "desc", "unmapped_type": "date" } },
        { "id": { "order": "asc", "unmapped_type": "keyword" } }
    ])
}

/// Build a filter query: OR over clauses, AND within a clause.
fn build_filter_query(expr: &FilterExpr) -> Value {
    let clauses: Vec<Value> = expr
        .any_of
        .iter()
        .map(|terms| {
            let must: Vec<Value> = terms.iter().map(build_term).collect();
            json!({ "bool": { "must": must } })
        })
        .collect();

    json!({
        "bool": {
            "should": clauses,
            "minimum_should_match": 1
        }
    })
}

fn build_term(term: &FilterTerm) -> Value {
    json!({
        "match": {
            term.field.as_str(): {
                "query": term.value,
                "operator": "and"
            }
        }
    })
}

/// Build a fuzzy free-text query over the boosted text fields.
///
/// AUTO fuzziness allows variable edits based on term length:
/// 1-2 chars: 0 edits, 3-5 chars: 1 edit, 6+ chars: 2 edits
fn build_text_query(text: &str, text_fields: &[(&str, f32)]) -> Value {
    let fields: Vec<String> = text_fields
        .iter()
        .map(|(field, boost)| {
            if (*boost - 1.0).abs() < f32::EPSILON {
                field.to_string()
            } else {
                format!("{}^{}", field, boost)
            }
        })
        .collect();

    json!({
        "multi_match": {
            "query": text,
            "fields": fields,
            "fuzziness": "AUTO"
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TODO_FIELDS: &[(&str, f32)] = &[("title", 3.0), ("description", 1.0)];

    #[test]
    fn test_build_match_all_body() {
        let body = build_search_body(&SearchQuery::match_all().page(3, 10), TODO_FIELDS);

        assert!(body["query"]["match_all"].is_object());
        assert_eq!(body["from"], 20);
        assert_eq!(body["size"], 10);
        assert_eq!(body["track_total_hits"], true);
    }

    #[test]
    fn test_build_sort() {
        let sort = build_sort();
        let sort = sort.as_array().unwrap();

        assert_eq!(sort.len(), 3);
        assert_eq!(sort[0]["_score"]["order"], "desc");
        assert_eq!(sort[1][CREATED_AT_FIELD]["order"], "desc");
        assert_eq!(sort[2]["id"]["order"], "asc");
    }

    #[test]
    fn test_build_filter_query() {
        let query = SearchQuery::parse("isCompleted:false AND priority:2 OR title:milk").unwrap();
        let body = build_search_body(&query, TODO_FIELDS);

        let should = body["query"]["bool"]["should"].as_array().unwrap();
        assert_eq!(should.len(), 2);
        assert_eq!(body["query"]["bool"]["minimum_should_match"], 1);

        let first = should[0]["bool"]["must"].as_array().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0]["match"]["isCompleted"]["query"], "false");
        assert_eq!(first[1]["match"]["priority"]["query"], "2");
        assert_eq!(should[1]["bool"]["must"][0]["match"]["title"]["query"], "milk");
    }

    #[test]
    fn test_build_text_query() {
        let body = build_search_body(&SearchQuery::free_text("by milk"), TODO_FIELDS);

        let multi_match = &body["query"]["multi_match"];
        assert_eq!(multi_match["query"], "by milk");
        assert_eq!(multi_match["fuzziness"], "AUTO");
        assert_eq!(multi_match["fields"], json!(["title^3", "description"]));
    }
}
