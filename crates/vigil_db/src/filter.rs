//! Path filters for index queries.
//!
//! A target path ending in `/` selects everything beneath it; any other
//! target selects exactly that path. Backends translate prefixes into their
//! own pattern syntax, escaping pattern metacharacters. Matching is
//! case-sensitive on SQLite and PostgreSQL and folds case on MySQL, following
//! each engine's default.

/// One selector target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    Exact(String),
    Prefix(String),
}

impl PathPattern {
    pub fn from_target(target: &str) -> Self {
        if target.ends_with('/') {
            PathPattern::Prefix(target.to_string())
        } else {
            PathPattern::Exact(target.to_string())
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Exact(exact) => path == exact,
            PathPattern::Prefix(prefix) => path.starts_with(prefix.as_str()),
        }
    }
}

/// Disjunction of path patterns; an empty filter matches every path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathFilter {
    patterns: Vec<PathPattern>,
}

impl PathFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn from_targets<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: targets
                .into_iter()
                .map(|t| PathPattern::from_target(t.as_ref()))
                .collect(),
        }
    }

    pub fn patterns(&self) -> &[PathPattern] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, path: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.matches(path))
    }
}

/// SQLite `GLOB` pattern for everything under `prefix` (GLOB is case-sensitive).
pub fn glob_prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        match ch {
            '*' => pattern.push_str("[*]"),
            '?' => pattern.push_str("[?]"),
            '[' => pattern.push_str("[[]"),
            _ => pattern.push(ch),
        }
    }
    pattern.push('*');
    pattern
}

/// `LIKE ... ESCAPE '\'` pattern for everything under `prefix`.
pub fn like_prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_separator_is_prefix() {
        let filter = PathFilter::from_targets(["/data/loc1/", "/data/other/file.txt"]);
        assert_eq!(
            filter.patterns(),
            &[
                PathPattern::Prefix("/data/loc1/".to_string()),
                PathPattern::Exact("/data/other/file.txt".to_string()),
            ]
        );
        assert!(filter.matches("/data/loc1/a/b.txt"));
        assert!(filter.matches("/data/other/file.txt"));
        assert!(!filter.matches("/data/other/file.txt.bak"));
        assert!(!filter.matches("/data/loc10/a.txt"));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(PathFilter::all().matches("/anything"));
    }

    #[test]
    fn test_glob_escaping() {
        assert_eq!(glob_prefix_pattern("/data/"), "/data/*");
        assert_eq!(glob_prefix_pattern("/d*a/[x]?/"), "/d[*]a/[[]x][?]/*");
    }

    #[test]
    fn test_like_escaping() {
        assert_eq!(like_prefix_pattern("/data/"), "/data/%");
        assert_eq!(like_prefix_pattern("/a_b%c\\/"), "/a\\_b\\%c\\\\/%");
    }
}
