//! A minimal dotted-path subset of jq expressions, covering the handful of
//! shapes the health probes actually need: `.result`, `.ledger_version`,
//! `.params.result.slot`. Anything beyond plain `.a.b.c` field access (jq
//! filters, array indexing, pipes) is out of scope; there is no jq crate in
//! this workspace's dependency tree, and the original expressions this
//! gateway needs are all field paths.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotPath(Vec<String>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathError;

impl DotPath {
    /// Parses `.a.b.c` into `["a", "b", "c"]`. A bare `.` parses to an empty
    /// path (identity).
    pub fn parse(expr: &str) -> Result<Self, PathError> {
        let expr = expr.strip_prefix('.').ok_or(PathError)?;
        if expr.is_empty() {
            return Ok(Self(Vec::new()));
        }
        Ok(Self(expr.split('.').map(str::to_string).collect()))
    }

    pub fn extract<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        let mut current = value;
        for segment in &self.0 {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Extracts and renders the value as the string a numeric parser
    /// expects: a JSON string's contents verbatim, or a number reprinted.
    pub fn extract_as_str(&self, value: &Value) -> Option<String> {
        match self.extract(value)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_top_level_result() {
        let path = DotPath::parse(".result").unwrap();
        let value = json!({"result": "0x10"});
        assert_eq!(path.extract_as_str(&value).unwrap(), "0x10");
    }

    #[test]
    fn extracts_nested_path() {
        let path = DotPath::parse(".params.result.slot").unwrap();
        let value = json!({"params": {"result": {"slot": 42}}});
        assert_eq!(path.extract_as_str(&value).unwrap(), "42");
    }

    #[test]
    fn extracts_ledger_version() {
        let path = DotPath::parse(".ledger_version").unwrap();
        let value = json!({"ledger_version": "328594425"});
        assert_eq!(path.extract_as_str(&value).unwrap(), "328594425");
    }

    #[test]
    fn missing_field_is_none() {
        let path = DotPath::parse(".result").unwrap();
        let value = json!({"other": 1});
        assert!(path.extract_as_str(&value).is_none());
    }

    #[test]
    fn rejects_expressions_without_leading_dot() {
        assert!(DotPath::parse("result").is_err());
    }
}
