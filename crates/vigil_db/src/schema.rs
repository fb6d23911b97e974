//! Index schema and shared query text.
//!
//! All CREATE TABLE statements live here - single source of truth.
//! Timestamps are stored as epoch milliseconds (UTC).

use sqlx::{Database, Encode, QueryBuilder, Type};
use vigil_model::time;

use crate::driver::{PageCursor, PageQuery};
use crate::filter::{glob_prefix_pattern, like_prefix_pattern, PathPattern};

pub(crate) const INDEX_TABLE: &str = "service_index";
pub(crate) const STATE_TABLE: &str = "index_state";

/// Due-time ordering key; entries with no due time sort last.
pub(crate) const SORT_KEY: &str = "COALESCE(service_time, 9223372036854775807)";

#[cfg(feature = "sqlite")]
pub(crate) const SQLITE_SETUP: &[&str] = &[
    "DROP TABLE IF EXISTS service_index",
    "DROP TABLE IF EXISTS index_state",
    r#"CREATE TABLE service_index (
        file_path TEXT PRIMARY KEY NOT NULL,
        service_time INTEGER,
        updated INTEGER NOT NULL
    )"#,
    "CREATE INDEX idx_service_index_due ON service_index (COALESCE(service_time, 9223372036854775807), file_path)",
    "CREATE INDEX idx_service_index_updated ON service_index (updated)",
    r#"CREATE TABLE index_state (
        config_md5 TEXT NOT NULL,
        last_reindexed INTEGER,
        software_version TEXT NOT NULL
    )"#,
];

#[cfg(feature = "postgres")]
pub(crate) const POSTGRES_SETUP: &[&str] = &[
    "DROP TABLE IF EXISTS service_index",
    "DROP TABLE IF EXISTS index_state",
    r#"CREATE TABLE service_index (
        file_path TEXT PRIMARY KEY NOT NULL,
        service_time BIGINT,
        updated BIGINT NOT NULL
    )"#,
    "CREATE INDEX idx_service_index_due ON service_index (COALESCE(service_time, 9223372036854775807), file_path)",
    "CREATE INDEX idx_service_index_prefix ON service_index (file_path text_pattern_ops)",
    "CREATE INDEX idx_service_index_updated ON service_index (updated)",
    r#"CREATE TABLE index_state (
        config_md5 TEXT NOT NULL,
        last_reindexed BIGINT,
        software_version TEXT NOT NULL
    )"#,
];

/// The path column is binary so distinct paths never collide on the key;
/// selection matching folds case explicitly. InnoDB caps key length at 3072
/// bytes, which is 768 `utf8mb4` characters.
#[cfg(feature = "mysql")]
pub(crate) const MYSQL_SETUP: &[&str] = &[
    "DROP TABLE IF EXISTS service_index",
    "DROP TABLE IF EXISTS index_state",
    r#"CREATE TABLE service_index (
        file_path VARCHAR(768) CHARACTER SET utf8mb4 COLLATE utf8mb4_bin PRIMARY KEY NOT NULL,
        service_time BIGINT,
        updated BIGINT NOT NULL
    )"#,
    "CREATE INDEX idx_service_index_due ON service_index ((COALESCE(service_time, 9223372036854775807)), file_path)",
    "CREATE INDEX idx_service_index_updated ON service_index (updated)",
    r#"CREATE TABLE index_state (
        config_md5 TEXT NOT NULL,
        last_reindexed BIGINT,
        software_version TEXT NOT NULL
    )"#,
];

/// How a backend expresses "path starts with".
#[derive(Debug, Clone, Copy)]
pub(crate) enum PrefixSyntax {
    /// `GLOB` (SQLite, case-sensitive)
    Glob,
    /// `LIKE ... ESCAPE '\'` (case-sensitive on PostgreSQL)
    Like,
    /// `LIKE ... ESCAPE '\\'` and `=` under a case-folding collation
    /// (MySQL, whose default collations fold case)
    LikeFolded,
}

/// Collation applied to selection matches on case-folding backends.
const FOLDED_COLLATION: &str = "utf8mb4_general_ci";

/// Build the paged selection for `query`, continuing after `after`.
pub(crate) fn page_query<'args, DB>(
    query: &PageQuery,
    after: Option<&PageCursor>,
    limit: usize,
    syntax: PrefixSyntax,
) -> QueryBuilder<'args, DB>
where
    DB: Database,
    <DB as Database>::Arguments<'args>: Default,
    i64: Encode<'args, DB> + Type<DB>,
    String: Encode<'args, DB> + Type<DB>,
{
    let mut qb = QueryBuilder::new(format!(
        "SELECT file_path, service_time, updated FROM {} WHERE updated <= ",
        INDEX_TABLE
    ));
    qb.push_bind(time::to_millis(&query.snapshot));

    if let Some(due_by) = query.due_by.as_ref() {
        qb.push(" AND service_time IS NOT NULL AND service_time <= ");
        qb.push_bind(time::to_millis(due_by));
    }

    if !query.filter.is_empty() {
        qb.push(" AND (");
        for (i, pattern) in query.filter.patterns().iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            match (pattern, syntax) {
                (PathPattern::Exact(path), PrefixSyntax::LikeFolded) => {
                    qb.push("file_path = ")
                        .push_bind(path.clone())
                        .push(" COLLATE ")
                        .push(FOLDED_COLLATION);
                }
                (PathPattern::Exact(path), _) => {
                    qb.push("file_path = ").push_bind(path.clone());
                }
                (PathPattern::Prefix(prefix), PrefixSyntax::Glob) => {
                    qb.push("file_path GLOB ").push_bind(glob_prefix_pattern(prefix));
                }
                (PathPattern::Prefix(prefix), PrefixSyntax::Like) => {
                    qb.push("file_path LIKE ")
                        .push_bind(like_prefix_pattern(prefix))
                        .push(" ESCAPE '\\'");
                }
                (PathPattern::Prefix(prefix), PrefixSyntax::LikeFolded) => {
                    qb.push("file_path LIKE ")
                        .push_bind(like_prefix_pattern(prefix))
                        .push(" COLLATE ")
                        .push(FOLDED_COLLATION)
                        .push(" ESCAPE '\\\\'");
                }
            }
        }
        qb.push(")");
    }

    if let Some(cursor) = after {
        qb.push(" AND (")
            .push(SORT_KEY)
            .push(" > ")
            .push_bind(cursor.sort_key)
            .push(" OR (")
            .push(SORT_KEY)
            .push(" = ")
            .push_bind(cursor.sort_key)
            .push(" AND file_path > ")
            .push_bind(cursor.file_path.clone())
            .push("))");
    }

    qb.push(" ORDER BY ")
        .push(SORT_KEY)
        .push(", file_path LIMIT ")
        .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    qb
}
