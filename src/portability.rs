//! JSON export and import of link lists.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::models::Link;

pub const EXPORT_FILENAME: &str = "atalho-links.json";

pub fn export_links(links: &[Link]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(links)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportedLink {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    created_at: Option<Value>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_created_at(value: Option<Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(s) => DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|d| d.with_timezone(&Utc)),
        Value::Number(n) => DateTime::from_timestamp_millis(n.as_i64()?),
        _ => None,
    }
}

/// Parses an exported JSON array. Entries without id, url and slug are
/// dropped; a missing or unreadable `createdAt` becomes now.
pub fn import_links(json: &str) -> serde_json::Result<Vec<Link>> {
    let entries: Vec<Value> = serde_json::from_str(json)?;
    let now = Utc::now();
    let links = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<ImportedLink>(entry).ok())
        .filter_map(|entry| {
            Some(Link {
                id: non_empty(entry.id)?,
                url: non_empty(entry.url)?,
                slug: non_empty(entry.slug)?,
                title: non_empty(entry.title),
                created_at: parse_created_at(entry.created_at).unwrap_or(now),
            })
        })
        .collect();
    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn tuples(links: &[Link]) -> HashSet<(String, String, String, Option<String>)> {
        links
            .iter()
            .map(|l| (l.id.clone(), l.url.clone(), l.slug.clone(), l.title.clone()))
            .collect()
    }

    #[test]
    fn round_trip_preserves_links() {
        let links = vec![
            Link {
                id: "1".into(),
                url: "https://example.com/a".into(),
                slug: "example-a".into(),
                title: Some("A".into()),
                created_at: Utc::now(),
            },
            Link {
                id: "2".into(),
                url: "https://example.com/b".into(),
                slug: "example-b".into(),
                title: None,
                created_at: Utc::now(),
            },
        ];
        let json = export_links(&links).unwrap();
        let back = import_links(&json).unwrap();
        assert_eq!(tuples(&back), tuples(&links));
        assert_eq!(back, links);
    }

    #[test]
    fn incomplete_entries_are_dropped_and_dates_regenerated() {
        let json = r#"[
            {"id": "1", "url": "https://a.example", "slug": "a"},
            {"id": "2", "url": "https://b.example"},
            {"url": "https://c.example", "slug": "c"},
            {"id": "4", "url": "https://d.example", "slug": "d", "createdAt": "yesterday"},
            {"id": "5", "url": "https://e.example", "slug": "e", "createdAt": 0},
            "garbage"
        ]"#;
        let before = Utc::now();
        let links = import_links(json).unwrap();
        let ids: Vec<_> = links.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "4", "5"]);
        assert!(links[0].created_at >= before);
        assert!(links[1].created_at >= before);
        assert_eq!(links[2].created_at.timestamp(), 0);
    }

    #[test]
    fn non_array_is_an_error() {
        assert!(import_links(r#"{"id": "1"}"#).is_err());
    }
}
