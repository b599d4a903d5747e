//! Query string parameters.

use crate::error::GatewayError;

/// Ordered, multi-valued query parameters.
///
/// Parameters keep the order in which they appeared in the query string, and
/// a name may occur more than once. Handlers may add, replace or remove
/// parameters; [`QueryParams::to_query_string`] re-encodes the current state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a raw (percent-encoded) query string.
    ///
    /// An empty string yields an empty set.
    pub fn parse(raw: &str) -> Result<Self, GatewayError> {
        let raw = raw.strip_prefix('?').unwrap_or(raw);
        if raw.is_empty() {
            return Ok(Self::new());
        }
        serde_urlencoded::from_str::<Vec<(String, String)>>(raw)
            .map(|pairs| Self { pairs })
            .map_err(|e| GatewayError::validation(format!("Invalid query string: {e}")))
    }

    /// Returns the first value of the named parameter.
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns every value of the named parameter, in order.
    pub fn all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns true if the named parameter is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.pairs.iter().any(|(key, _)| key == name)
    }

    /// Appends a value.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((name.into(), value.into()));
    }

    /// Replaces every value of the named parameter with a single value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.pairs.push((name, value.into()));
    }

    /// Removes every value of the named parameter.
    pub fn remove(&mut self, name: &str) {
        self.pairs.retain(|(key, _)| key != name);
    }

    /// Returns the parameters as name/value pairs.
    #[must_use]
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Returns true if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Encodes the current parameters as a query string (without `?`).
    #[must_use]
    pub fn to_query_string(&self) -> String {
        serde_urlencoded::to_string(&self.pairs).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_multi_valued() {
        let params = QueryParams::parse("sort=a&sort=b&page=2").unwrap();
        assert_eq!(params.first("sort"), Some("a"));
        assert_eq!(params.all("sort").collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(params.first("page"), Some("2"));
        assert!(!params.contains("missing"));
    }

    #[test]
    fn test_parse_empty_and_leading_question_mark() {
        assert!(QueryParams::parse("").unwrap().is_empty());
        let params = QueryParams::parse("?a=1").unwrap();
        assert_eq!(params.first("a"), Some("1"));
    }

    #[test]
    fn test_percent_decoding_and_encoding() {
        let params = QueryParams::parse("filter=%7B%22a%22%3A1%7D").unwrap();
        assert_eq!(params.first("filter"), Some("{\"a\":1}"));
        assert_eq!(params.to_query_string(), "filter=%7B%22a%22%3A1%7D");
    }

    #[test]
    fn test_set_replaces_all_values() {
        let mut params = QueryParams::parse("a=1&a=2&b=3").unwrap();
        params.set("a", "9");
        assert_eq!(params.to_query_string(), "b=3&a=9");
        params.remove("b");
        params.append("c", "x y");
        assert_eq!(params.to_query_string(), "a=9&c=x+y");
    }

    proptest! {
        #[test]
        fn test_rebuilt_query_string_preserves_values(
            name in "[a-z]{1,8}",
            value in "\\PC{0,24}",
        ) {
            let mut params = QueryParams::new();
            params.set(name.as_str(), value.as_str());

            let reparsed = QueryParams::parse(&params.to_query_string()).unwrap();
            prop_assert_eq!(reparsed.first(&name), Some(value.as_str()));
        }
    }
}
