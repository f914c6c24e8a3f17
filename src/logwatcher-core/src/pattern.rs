//! Pattern Set and File-to-Patterns Map
//!
//! Built once at startup from configuration and immutable thereafter.

use std::collections::HashMap;

use regex::Regex;

use crate::error::CoreError;

/// A single compiled regular-expression pattern, keyed by a unique name.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub name: String,
    pub regex: Regex,
}

impl Pattern {
    pub fn compile(name: impl Into<String>, pattern: &str) -> Result<Self, CoreError> {
        let name = name.into();
        let regex = Regex::new(pattern).map_err(|source| CoreError::InvalidRegex {
            name: name.clone(),
            source,
        })?;
        Ok(Self { name, regex })
    }

    pub fn is_match(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }
}

/// The compiled regex library, keyed by pattern name. Immutable after startup.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: HashMap<String, Pattern>,
}

impl PatternSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pattern set from `name -> regex source` pairs, failing on the
    /// first invalid regex.
    pub fn build<I, S>(entries: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = (S, S)>,
        S: AsRef<str>,
    {
        let mut patterns = HashMap::new();
        for (name, source) in entries {
            let pattern = Pattern::compile(name.as_ref(), source.as_ref())?;
            patterns.insert(pattern.name.clone(), pattern);
        }
        Ok(Self { patterns })
    }

    pub fn get(&self, name: &str) -> Option<&Pattern> {
        self.patterns.get(name)
    }

    /// Look up a pattern by name, failing with [`CoreError::PatternNotFound`]
    /// instead of silently returning `None`. Used where a caller asserts a
    /// name *must* resolve — e.g. checking a `FilePatternBinding` built from
    /// the same configuration actually references compiled patterns.
    pub fn get_checked(&self, name: &str) -> Result<&Pattern, CoreError> {
        self.patterns
            .get(name)
            .ok_or_else(|| CoreError::PatternNotFound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Mapping `path -> set<pattern name>` selecting which patterns apply to
/// which files. Immutable after startup.
#[derive(Debug, Clone, Default)]
pub struct FilePatternBinding {
    bindings: HashMap<String, Vec<String>>,
}

impl FilePatternBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build<I, P, N>(entries: I) -> Self
    where
        I: IntoIterator<Item = (P, Vec<N>)>,
        P: Into<String>,
        N: Into<String>,
    {
        let bindings = entries
            .into_iter()
            .map(|(path, names)| (path.into(), names.into_iter().map(Into::into).collect()))
            .collect();
        Self { bindings }
    }

    /// Pattern names bound to `path`, or an empty slice if the path isn't configured.
    pub fn patterns_for(&self, path: &str) -> &[String] {
        self.bindings
            .get(path)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_valid_pattern() {
        let pattern = Pattern::compile("err", "ERROR").unwrap();
        assert!(pattern.is_match("an ERROR occurred"));
        assert!(!pattern.is_match("all good"));
    }

    #[test]
    fn rejects_invalid_pattern() {
        let err = Pattern::compile("bad", "(unclosed").unwrap_err();
        assert!(matches!(err, CoreError::InvalidRegex { .. }));
    }

    #[test]
    fn get_checked_fails_on_missing_pattern() {
        let set = PatternSet::build([("err", "ERROR")]).unwrap();
        assert!(set.get_checked("err").is_ok());
        let err = set.get_checked("missing").unwrap_err();
        assert!(matches!(err, CoreError::PatternNotFound(name) if name == "missing"));
    }

    #[test]
    fn pattern_set_lookup() {
        let set = PatternSet::build([("err", "ERROR"), ("warn", "WARN")]).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.get("err").is_some());
        assert!(set.get("missing").is_none());
    }

    #[test]
    fn binding_returns_empty_for_unknown_path() {
        let binding = FilePatternBinding::build([("a.log", vec!["err"])]);
        assert_eq!(binding.patterns_for("a.log"), &["err".to_string()]);
        assert!(binding.patterns_for("b.log").is_empty());
    }
}
