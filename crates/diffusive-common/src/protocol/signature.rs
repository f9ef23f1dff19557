//! Method signatures
//!
//! A signature names one overload of a method: the receiver type, the method
//! name and the ordered argument types. It is the key of the method registry,
//! of the diffuser repository and of the HTTP resources, and it is what a
//! peer compares against `base_signature` to refuse re-diffusing a call.
//!
//! The textual form is `Type:method(ArgA,ArgB)`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::{DiffusiveError, Result};

/// A `(target type, method name, argument types)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Signature {
    pub target_type: String,
    pub method_name: String,
    pub argument_types: Vec<String>,
}

impl Signature {
    pub fn new<I, S>(target_type: impl Into<String>, method_name: impl Into<String>, argument_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            target_type: target_type.into(),
            method_name: method_name.into(),
            argument_types: argument_types.into_iter().map(Into::into).collect(),
        }
    }

    /// Textual key, `Type:method(A,B)`.
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Parses the textual key produced by [`Signature::key`].
    ///
    /// Argument types may themselves contain commas inside brackets
    /// (`Map<String,i64>`), so the argument list is split only at top-level
    /// commas.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the separator or the parentheses are
    /// missing, or if a component is empty.
    pub fn parse(key: &str) -> Result<Self> {
        let invalid = |why: &str| DiffusiveError::InvalidRequest(format!("Malformed signature '{}': {}", key, why));

        // Method names never contain ':', so the separator is the last one
        // before the argument list; path-qualified types keep their `::`.
        let paren = key.find('(').ok_or_else(|| invalid("missing '('"))?;
        let colon = key[..paren].rfind(':').ok_or_else(|| invalid("missing ':'"))?;
        let (target_type, rest) = (&key[..colon], &key[colon + 1..]);
        let open = paren - colon - 1;
        if !rest.ends_with(')') {
            return Err(invalid("missing ')'"));
        }

        let method_name = &rest[..open];
        let args = &rest[open + 1..rest.len() - 1];

        if target_type.trim().is_empty() || method_name.trim().is_empty() {
            return Err(invalid("empty type or method name"));
        }

        let argument_types = split_top_level(args)
            .into_iter()
            .map(|a| {
                if a.is_empty() {
                    Err(invalid("empty argument type"))
                } else {
                    Ok(a)
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            target_type: target_type.trim().to_string(),
            method_name: method_name.trim().to_string(),
            argument_types,
        })
    }
}

/// Splits a comma-separated type list at commas outside any brackets.
///
/// `"String,Map<String,i64>"` yields `["String", "Map<String,i64>"]`.
pub fn split_top_level(args: &str) -> Vec<String> {
    if args.trim().is_empty() {
        return Vec::new();
    }

    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in args.chars() {
        match c {
            '<' | '(' | '[' => {
                depth += 1;
                current.push(c);
            }
            '>' | ')' | ']' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    parts.push(current.trim().to_string());
    parts
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}({})", self.target_type, self.method_name, self.argument_types.join(","))
    }
}

impl FromStr for Signature {
    type Err = DiffusiveError;

    fn from_str(s: &str) -> Result<Self> {
        Signature::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_path_qualified_type() {
        let sig = Signature::parse("demo::Point:dist(f64)").unwrap();
        assert_eq!(sig, Signature::new("demo::Point", "dist", ["f64"]));
        assert_eq!(sig.key(), "demo::Point:dist(f64)");

        let sig = Signature::parse("geo::Shape:area(Vec<geo::Point>,HashMap<String,f64>)").unwrap();
        assert_eq!(sig.target_type, "geo::Shape");
        assert_eq!(sig.method_name, "area");
        assert_eq!(sig.argument_types, vec!["Vec<geo::Point>", "HashMap<String,f64>"]);
    }

    #[test]
    fn test_key_format() {
        let sig = Signature::new("shapes.Circle", "scale", ["f64", "bool"]);
        assert_eq!(sig.key(), "shapes.Circle:scale(f64,bool)");
    }

    #[test]
    fn test_no_arguments() {
        let sig = Signature::new("Counter", "value", Vec::<String>::new());
        assert_eq!(sig.key(), "Counter:value()");
        assert_eq!(Signature::parse("Counter:value()").unwrap(), sig);
    }

    #[test]
    fn test_parse_nested_generic_arguments() {
        let sig = Signature::parse("Index:merge(Map<String,i64>,Vec<u8>)").unwrap();
        assert_eq!(sig.target_type, "Index");
        assert_eq!(sig.method_name, "merge");
        assert_eq!(sig.argument_types, vec!["Map<String,i64>", "Vec<u8>"]);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Signature::parse("no-separator").is_err());
        assert!(Signature::parse("Type:method").is_err());
        assert!(Signature::parse(":method()").is_err());
        assert!(Signature::parse("Type:(i32)").is_err());
        assert!(Signature::parse("Type:m(i32,)").is_err());
    }
}
