use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

/// Synonyms and related terms used to widen recall during context queries.
static KEYWORD_EXPANSIONS: Lazy<HashMap<&'static str, &'static [&'static str]>> =
    Lazy::new(|| {
        let mut map: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
        map.insert("login", &["auth", "authentication", "signin", "session", "jwt", "token"]);
        map.insert("logout", &["signout", "session", "auth"]);
        map.insert("user", &["account", "profile", "member", "customer"]);
        map.insert("database", &["db", "sql", "table", "schema", "migration"]);
        map.insert("api", &["endpoint", "route", "controller", "rest", "request"]);
        map.insert("bug", &["fix", "error", "issue", "problem", "debug"]);
        map.insert("feature", &["implement", "add", "create", "new"]);
        map.insert("test", &["spec", "unit", "integration", "jest", "pytest"]);
        map.insert("payment", &["stripe", "checkout", "billing", "invoice", "cart"]);
        map.insert("email", &["mail", "notification", "smtp", "newsletter"]);
        map.insert("upload", &["file", "image", "storage", "s3", "media"]);
        map.insert("search", &["query", "find", "filter", "index"]);
        map.insert("cache", &["redis", "memcached", "store", "ttl"]);
        map.insert("config", &["settings", "env", "environment", "configuration"]);
        map.insert("model", &["entity", "orm", "schema"]);
        map.insert("view", &["template", "component", "frontend"]);
        map.insert("controller", &["handler", "action", "endpoint"]);
        map.insert("middleware", &["filter", "guard", "interceptor"]);
        map.insert("validation", &["validate", "check", "verify", "sanitize"]);
        map.insert("security", &["auth", "permission", "role", "access"]);
        map
    });

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "a", "an", "in", "on", "at", "to", "for", "of", "and", "or", "is", "are", "was",
        "were", "be", "been", "being", "have", "has", "do", "does", "did", "will", "would",
        "could", "should", "may", "might", "must", "shall", "can", "need", "dare", "ought",
        "used", "this", "that", "these", "those", "it", "its", "they", "their", "with", "from",
        "by", "about", "into", "through", "during", "before", "after", "above", "below",
        "between", "under", "again", "further", "then", "once", "here", "there", "when",
        "where", "why", "how", "all", "each", "few", "more", "most", "other", "some", "such",
        "no", "nor", "not", "only", "own", "same", "so", "than", "too", "very", "just", "also",
        "now", "new", "get", "set", "make",
    ]
    .into_iter()
    .collect()
});

/// Extracts and expands keywords from free text for search enhancement.
pub struct KeywordExtractor;

impl KeywordExtractor {
    /// Lowercase, strip punctuation, drop stop-words and words of two
    /// characters or fewer. Order of first occurrence, deduplicated.
    pub fn extract(text: &str) -> Vec<String> {
        let normalized: String = text
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();

        let mut seen = HashSet::new();
        normalized
            .split_whitespace()
            .filter(|word| word.len() > 2 && !STOP_WORDS.contains(word))
            .filter(|word| seen.insert(word.to_string()))
            .map(str::to_string)
            .collect()
    }

    /// Widen keywords with related terms from the fixed synonym table.
    pub fn expand(keywords: &[String]) -> Vec<String> {
        let mut expanded: Vec<String> = keywords.to_vec();
        let mut seen: HashSet<&str> = keywords.iter().map(String::as_str).collect();

        for keyword in keywords {
            if let Some(synonyms) = KEYWORD_EXPANSIONS.get(keyword.as_str()) {
                for synonym in *synonyms {
                    if seen.insert(synonym) {
                        expanded.push((*synonym).to_string());
                    }
                }
            }
        }
        expanded
    }

    pub fn extract_and_expand(text: &str) -> (Vec<String>, Vec<String>) {
        let original = Self::extract(text);
        let expanded = Self::expand(&original);
        (original, expanded)
    }
}

/// Task classification driving the type-bonus table in relevance scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Bug,
    Feature,
    Database,
    Test,
    Refactor,
    General,
}

impl TaskType {
    pub fn detect(description: &str) -> TaskType {
        let text = description.to_lowercase();
        let contains_any = |words: &[&str]| words.iter().any(|w| text.contains(w));

        if contains_any(&["bug", "fix", "error", "issue", "broken"]) {
            TaskType::Bug
        } else if contains_any(&["feature", "implement", "add", "create", "build"]) {
            TaskType::Feature
        } else if contains_any(&["database", "db", "migration", "table", "schema", "sql"]) {
            TaskType::Database
        } else if contains_any(&["test", "spec", "unit", "integration", "e2e"]) {
            TaskType::Test
        } else if contains_any(&["refactor", "cleanup", "optimize", "improve", "restructure"]) {
            TaskType::Refactor
        } else {
            TaskType::General
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TaskType::Bug => "bug",
            TaskType::Feature => "feature",
            TaskType::Database => "database",
            TaskType::Test => "test",
            TaskType::Refactor => "refactor",
            TaskType::General => "general",
        }
    }
}

const SENSITIVE_PATTERNS: [&str; 9] = [
    ".env",
    "credentials",
    "secrets",
    "password",
    "api_key",
    "private_key",
    ".pem",
    ".key",
    "id_rsa",
];

const EXCLUDED_DIRECTORIES: [&str; 14] = [
    "node_modules/",
    "vendor/",
    ".git/",
    "dist/",
    "build/",
    ".next/",
    "__pycache__/",
    ".cache/",
    ".venv/",
    "venv/",
    "coverage/",
    "package-lock.json",
    "yarn.lock",
    "composer.lock",
];

/// Whether a file is safe and useful to feed into memory: refuses secrets
/// and dependency/build artifacts.
pub fn should_index_file(file_path: &str) -> bool {
    let path = file_path.to_lowercase();
    if SENSITIVE_PATTERNS.iter().any(|p| path.contains(p)) {
        return false;
    }
    if EXCLUDED_DIRECTORIES.iter().any(|p| path.contains(p)) {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extraction_drops_stop_words_and_short_words() {
        let keywords = KeywordExtractor::extract("Fix the login bug in the DB layer");
        assert_eq!(keywords, vec!["fix", "login", "bug", "layer"]);
    }

    #[test]
    fn extraction_strips_punctuation() {
        let keywords = KeywordExtractor::extract("Login-Bug: session/token handling!");
        assert!(keywords.contains(&"login".to_string()));
        assert!(keywords.contains(&"session".to_string()));
        assert!(keywords.contains(&"token".to_string()));
    }

    #[test]
    fn expansion_adds_synonyms_without_duplicates() {
        let expanded = KeywordExtractor::expand(&["login".to_string(), "auth".to_string()]);
        assert!(expanded.contains(&"authentication".to_string()));
        assert!(expanded.contains(&"jwt".to_string()));
        assert_eq!(
            expanded.iter().filter(|k| k.as_str() == "auth").count(),
            1
        );
    }

    #[test]
    fn task_type_detection() {
        assert_eq!(TaskType::detect("fix the login bug"), TaskType::Bug);
        assert_eq!(TaskType::detect("implement dark mode"), TaskType::Feature);
        assert_eq!(TaskType::detect("alter the users table"), TaskType::Database);
        assert_eq!(TaskType::detect("write unit coverage"), TaskType::Test);
        assert_eq!(TaskType::detect("cleanup module layout"), TaskType::Refactor);
        assert_eq!(TaskType::detect("ship it"), TaskType::General);
    }

    #[test]
    fn sensitive_and_vendored_files_are_refused() {
        assert!(!should_index_file(".env"));
        assert!(!should_index_file("config/credentials.yml"));
        assert!(!should_index_file("node_modules/lodash/index.js"));
        assert!(!should_index_file("keys/id_rsa"));
        assert!(should_index_file("src/auth/handler.rs"));
    }
}
