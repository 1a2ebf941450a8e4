use std::fmt;

/// The fixed set of named memory partitions per project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Files, modules, directories.
    CodeStructure,
    /// Functions, methods, classes.
    Functions,
    /// Tables, columns, relations.
    DatabaseSchema,
    /// Patterns, frameworks, conventions.
    Architecture,
    /// Insights from work sessions.
    Learnings,
    /// Deep logic summaries extracted from code.
    CodeSummaries,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::CodeStructure,
        Collection::Functions,
        Collection::DatabaseSchema,
        Collection::Architecture,
        Collection::Learnings,
        Collection::CodeSummaries,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Collection::CodeStructure => "code_structure",
            Collection::Functions => "functions",
            Collection::DatabaseSchema => "database_schema",
            Collection::Architecture => "architecture",
            Collection::Learnings => "learnings",
            Collection::CodeSummaries => "code_summaries",
        }
    }

    pub fn parse(name: &str) -> Option<Collection> {
        Collection::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which collections a query searches. A tagged scope instead of an "all"
/// string sentinel, so a collection literally named "all" can never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryScope {
    All,
    Named(Collection),
}

impl QueryScope {
    /// String boundary: `"all"` selects everything, a known collection name
    /// selects that collection, anything else is `None` (callers treat it
    /// as an empty result, not an error).
    pub fn parse(raw: &str) -> Option<QueryScope> {
        if raw == "all" {
            return Some(QueryScope::All);
        }
        Collection::parse(raw).map(QueryScope::Named)
    }

    pub fn collections(self) -> Vec<Collection> {
        match self {
            QueryScope::All => Collection::ALL.to_vec(),
            QueryScope::Named(collection) => vec![collection],
        }
    }
}
