use crate::types::ScoredResult;
use recall_state::unix_ms_now;

pub const MAX_RESULTS_PER_CATEGORY: usize = 3;

/// "other" is dropped entirely above this size: when most results defy
/// categorization the bucket is noise, not signal.
const MAX_OTHER_ITEMS: usize = 5;

const MAX_RECENT_ITEMS: usize = 2;
const DAY_MS: u64 = 24 * 60 * 60 * 1000;

const CATEGORY_ORDER: [&str; 8] = [
    "authentication",
    "database",
    "controller",
    "model",
    "config",
    "test",
    "api",
    "other",
];

/// Renders ranked results into a compact, categorized digest string.
/// Purely presentational, but the categorization and capping rules are
/// contractual for downstream consumers.
pub struct ContextFormatter;

impl ContextFormatter {
    pub fn format(results: &[ScoredResult]) -> String {
        if results.is_empty() {
            return String::new();
        }

        let mut lines = vec![String::new(), "Relevant context from memory:".to_string()];

        for category in CATEGORY_ORDER {
            let items: Vec<&ScoredResult> = results
                .iter()
                .filter(|r| Self::categorize(r) == category)
                .collect();
            if items.is_empty() {
                continue;
            }
            if category == "other" && items.len() > MAX_OTHER_ITEMS {
                continue;
            }

            lines.push(String::new());
            lines.push(format!("{}:", capitalize(category)));
            for result in items.iter().take(MAX_RESULTS_PER_CATEGORY) {
                let doc = &result.document;
                let label = doc
                    .metadata_str("path")
                    .or_else(|| doc.metadata_str("name"))
                    .unwrap_or("unknown");
                lines.push(format!("- {label}"));
                let summary = Self::summary(result);
                if !summary.is_empty() {
                    lines.push(format!("    {summary}"));
                }
            }
        }

        let recent = Self::recent_changes(results);
        if !recent.is_empty() {
            lines.push(String::new());
            lines.push("Recently changed:".to_string());
            for entry in recent {
                lines.push(format!("- {entry}"));
            }
        }

        lines.push(String::new());
        lines.join("\n")
    }

    /// Category from path substrings and the declared document type.
    pub fn categorize(result: &ScoredResult) -> &'static str {
        let doc = &result.document;
        let doc_type = doc.metadata_str("type").unwrap_or_default();
        let path = doc.metadata_str("path").unwrap_or_default().to_lowercase();

        if path.contains("auth") || doc_type == "auth" {
            "authentication"
        } else if doc_type == "table" || path.contains("migration") {
            "database"
        } else if path.contains("controller") || doc_type == "controller" {
            "controller"
        } else if path.contains("model") || doc_type == "model" {
            "model"
        } else if path.contains("config") || doc_type == "config" {
            "config"
        } else if path.contains("test") || doc_type == "test" {
            "test"
        } else if path.contains("api") || path.contains("route") {
            "api"
        } else {
            "other"
        }
    }

    fn summary(result: &ScoredResult) -> String {
        let doc = &result.document;
        match doc.metadata_str("type") {
            Some("function") => {
                let name = doc.metadata_str("name").unwrap_or("?");
                let params = string_list(doc, "params", 3);
                let returns = doc.metadata_str("returns").unwrap_or("void");
                format!("{name}({}) -> {returns}", params.join(", "))
            }
            Some("table") => {
                let columns = string_list(doc, "columns", 4);
                let total = doc
                    .metadata
                    .get("columns")
                    .and_then(|v| v.as_array())
                    .map_or(0, Vec::len);
                let more = if total > 4 { ", ..." } else { "" };
                format!("columns: {}{more}", columns.join(", "))
            }
            Some("file") => {
                let functions = string_list(doc, "functions", 3);
                if functions.is_empty() {
                    first_sentence(&doc.content)
                } else {
                    format!("functions: {}", functions.join(", "))
                }
            }
            _ => first_sentence(&doc.content),
        }
    }

    /// Up to two entries that both scored recent and actually changed within
    /// the last week.
    fn recent_changes(results: &[ScoredResult]) -> Vec<String> {
        let now = unix_ms_now();
        results
            .iter()
            .filter(|r| r.recency_score >= 0.8)
            .filter_map(|r| {
                let updated = r.document.updated_at_ms()?;
                let age_days = now.saturating_sub(updated) / DAY_MS;
                if age_days >= 7 {
                    return None;
                }
                let path = r.document.metadata_str("path").unwrap_or("?");
                let ago = if age_days == 0 {
                    "today".to_string()
                } else {
                    format!("{age_days}d ago")
                };
                Some(format!("{ago}: {path}"))
            })
            .take(MAX_RECENT_ITEMS)
            .collect()
    }
}

fn string_list(doc: &crate::types::MemoryDocument, key: &str, limit: usize) -> Vec<String> {
    doc.metadata
        .get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .take(limit)
                .collect()
        })
        .unwrap_or_default()
}

fn first_sentence(content: &str) -> String {
    if let Some(idx) = content.find(". ") {
        return content[..=idx].to_string();
    }
    if content.chars().count() > 80 {
        let cut: String = content.chars().take(80).collect();
        return format!("{cut}...");
    }
    content.to_string()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
