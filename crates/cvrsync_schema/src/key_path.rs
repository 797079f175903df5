//! Key-path templates.
//!
//! A template such as `sr/[skill]/[createdAt]` names the replica key of an
//! entity. Literal segments are copied verbatim, bracketed variables are
//! replaced by field values.

use crate::error::{SchemaError, SchemaResult};
use regex::Regex;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

/// A compiled key-path template.
///
/// The matching regular expression is built once, at compile time.
#[derive(Debug, Clone)]
pub struct KeyPath {
    template: String,
    segments: Vec<Segment>,
    pattern: Regex,
}

impl KeyPath {
    /// Compiles a template.
    ///
    /// Rejects unbalanced brackets, empty or repeated variable names, and
    /// two variables with no literal between them (their boundary would be
    /// ambiguous).
    pub fn compile(template: &str) -> SchemaResult<Self> {
        let segments = Self::split(template)?;

        let mut pattern = String::from("(?s)^");
        for segment in &segments {
            match segment {
                Segment::Literal(text) => pattern.push_str(&regex::escape(text)),
                Segment::Variable(_) => pattern.push_str("(.+?)"),
            }
        }
        pattern.push('$');

        let pattern = Regex::new(&pattern).map_err(|e| {
            SchemaError::invalid_schema(format!("key path `{template}`: {e}"))
        })?;

        Ok(Self {
            template: template.to_string(),
            segments,
            pattern,
        })
    }

    fn split(template: &str) -> SchemaResult<Vec<Segment>> {
        let invalid =
            |why: &str| SchemaError::invalid_schema(format!("key path `{template}`: {why}"));

        let mut segments = Vec::new();
        let mut rest = template;
        while !rest.is_empty() {
            match rest.find(['[', ']']) {
                Some(pos) if rest.as_bytes()[pos] == b']' => {
                    return Err(invalid("unmatched `]`"));
                }
                Some(pos) => {
                    if pos > 0 {
                        segments.push(Segment::Literal(rest[..pos].to_string()));
                    }
                    let after = &rest[pos + 1..];
                    let close = after.find(']').ok_or_else(|| invalid("unclosed `[`"))?;
                    let name = &after[..close];
                    if name.is_empty() || name.contains('[') {
                        return Err(invalid("malformed variable"));
                    }
                    if matches!(segments.last(), Some(Segment::Variable(_))) {
                        return Err(invalid("adjacent variables need a separator"));
                    }
                    let duplicate = segments
                        .iter()
                        .any(|s| matches!(s, Segment::Variable(v) if v == name));
                    if duplicate {
                        return Err(invalid("variable used twice"));
                    }
                    segments.push(Segment::Variable(name.to_string()));
                    rest = &after[close + 1..];
                }
                None => {
                    segments.push(Segment::Literal(rest.to_string()));
                    rest = "";
                }
            }
        }
        Ok(segments)
    }

    /// Returns the template text.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Returns the variable names in template order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Variable(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Returns the literal text before the first variable.
    pub fn prefix(&self) -> &str {
        match self.segments.first() {
            Some(Segment::Literal(text)) => text,
            _ => "",
        }
    }

    /// Returns true if `key` has the shape of this template.
    pub fn matches(&self, key: &str) -> bool {
        self.pattern.is_match(key)
    }

    /// Substitutes each variable with its rendered value, in template order.
    ///
    /// A value must be non-empty and must not contain the literal that
    /// follows its variable. The finished key is parsed back and must yield
    /// the same values, which also catches a value ending in a prefix of a
    /// multi-character separator.
    pub fn interpolate(&self, values: &BTreeMap<String, String>) -> SchemaResult<String> {
        let mut key = String::with_capacity(self.template.len());
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(text) => key.push_str(text),
                Segment::Variable(name) => {
                    let value = values.get(name).ok_or_else(|| {
                        SchemaError::missing_field(name.clone())
                    })?;
                    if value.is_empty() {
                        return Err(SchemaError::encoding_failed(
                            name.clone(),
                            "key variable is empty",
                        ));
                    }
                    if let Some(Segment::Literal(next)) = self.segments.get(i + 1) {
                        if value.contains(next.as_str()) {
                            return Err(SchemaError::encoding_failed(
                                name.clone(),
                                format!("key variable contains separator `{next}`"),
                            ));
                        }
                    }
                    key.push_str(value);
                }
            }
        }

        let parsed = self.parse(&key)?;
        if let Some(name) = self
            .variables()
            .find(|name| parsed.get(*name) != values.get(*name))
        {
            return Err(SchemaError::encoding_failed(
                name.to_string(),
                format!("key `{key}` does not parse back to its values"),
            ));
        }
        Ok(key)
    }

    /// Extracts the variable values from a key.
    pub fn parse(&self, key: &str) -> SchemaResult<BTreeMap<String, String>> {
        let captures = self
            .pattern
            .captures(key)
            .ok_or_else(|| SchemaError::KeyMismatch {
                key: key.to_string(),
                template: self.template.clone(),
            })?;

        Ok(self
            .variables()
            .zip(captures.iter().skip(1))
            .filter_map(|(name, capture)| {
                capture.map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn compile_and_inspect() {
        let path = KeyPath::compile("sr/[skill]/[createdAt]").unwrap();
        assert_eq!(path.prefix(), "sr/");
        assert_eq!(path.variables().collect::<Vec<_>>(), ["skill", "createdAt"]);
    }

    #[test]
    fn interpolate_in_template_order() {
        let path = KeyPath::compile("sr/[skill]/[createdAt]").unwrap();
        let key = path
            .interpolate(&values(&[("createdAt", "1700"), ("skill", "he:好")]))
            .unwrap();
        assert_eq!(key, "sr/he:好/1700");
    }

    #[test]
    fn parse_extracts_variables() {
        let path = KeyPath::compile("sr/[skill]/[createdAt]").unwrap();
        let parsed = path.parse("sr/he:好/1700").unwrap();
        assert_eq!(parsed, values(&[("skill", "he:好"), ("createdAt", "1700")]));
    }

    #[test]
    fn trailing_variable_takes_the_rest() {
        let path = KeyPath::compile("s/[skill]").unwrap();
        let parsed = path.parse("s/a/b/c").unwrap();
        assert_eq!(parsed, values(&[("skill", "a/b/c")]));
    }

    #[test]
    fn literals_are_escaped() {
        let path = KeyPath::compile("p.q+/[a]").unwrap();
        assert!(path.matches("p.q+/x"));
        assert!(!path.matches("pxq+/x"));
    }

    #[test]
    fn parse_rejects_wrong_shape() {
        let path = KeyPath::compile("s/[skill]").unwrap();
        assert!(matches!(
            path.parse("sr/x"),
            Err(SchemaError::KeyMismatch { .. })
        ));
        assert!(path.parse("s/").is_err());
    }

    #[test]
    fn interpolate_rejects_unparseable_values() {
        let path = KeyPath::compile("sr/[skill]/[createdAt]").unwrap();
        assert!(path
            .interpolate(&values(&[("skill", "a/b"), ("createdAt", "1")]))
            .is_err());
        assert!(path
            .interpolate(&values(&[("skill", ""), ("createdAt", "1")]))
            .is_err());
        assert!(path.interpolate(&values(&[("skill", "a")])).is_err());
    }

    #[test]
    fn values_may_span_lines() {
        let path = KeyPath::compile("s/[skill]").unwrap();
        let key = path.interpolate(&values(&[("skill", "a\nb")])).unwrap();
        assert_eq!(key, "s/a\nb");
        assert_eq!(path.parse(&key).unwrap(), values(&[("skill", "a\nb")]));

        let path = KeyPath::compile("sr/[skill]/[createdAt]").unwrap();
        let parsed = path.parse("sr/x\ny/1\n2").unwrap();
        assert_eq!(parsed, values(&[("skill", "x\ny"), ("createdAt", "1\n2")]));
    }

    #[test]
    fn partial_separator_at_value_end_is_rejected() {
        let path = KeyPath::compile("[a]/x/[b]").unwrap();
        let err = path
            .interpolate(&values(&[("a", "p/x"), ("b", "q")]))
            .unwrap_err();
        assert!(matches!(err, SchemaError::EncodingFailed { .. }));

        let key = path.interpolate(&values(&[("a", "p"), ("b", "x/q")])).unwrap();
        assert_eq!(path.parse(&key).unwrap(), values(&[("a", "p"), ("b", "x/q")]));
    }

    #[test]
    fn compile_rejects_malformed_templates() {
        assert!(KeyPath::compile("s/[skill").is_err());
        assert!(KeyPath::compile("s/skill]").is_err());
        assert!(KeyPath::compile("s/[]").is_err());
        assert!(KeyPath::compile("s/[a][b]").is_err());
        assert!(KeyPath::compile("s/[a]/[a]").is_err());
    }
}
