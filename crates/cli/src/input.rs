//! Parsing of command-line params and stdin control lines.

use serde_json::{Map, Value};

/// One line read from stdin.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Replace the query params with a JSON object.
    Params(Value),
    Refetch,
    Invalidate,
    Bump,
    Skip,
}

pub fn parse_line(line: &str) -> Result<Command, String> {
    let line = line.trim();
    match line {
        "" => Ok(Command::Skip),
        "!refetch" => Ok(Command::Refetch),
        "!invalidate" => Ok(Command::Invalidate),
        "!bump" => Ok(Command::Bump),
        _ if line.starts_with('!') => Err(format!("unknown command: {line}")),
        _ => match serde_json::from_str::<Value>(line) {
            Ok(value @ (Value::Object(_) | Value::Null)) => Ok(Command::Params(value)),
            Ok(_) => Err("params must be a JSON object".to_string()),
            Err(e) => Err(format!("invalid JSON: {e}")),
        },
    }
}

/// Build a params object from `key=value` pairs.
///
/// Values that parse as JSON keep their type; anything else is a string.
/// A repeated key collects its values into an array.
pub fn params_from_pairs(pairs: &[String]) -> Result<Value, String> {
    let mut params = Map::new();
    for pair in pairs {
        let (key, raw) = pair.split_once('=').ok_or_else(|| format!("expected key=value, got {pair}"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("empty key in {pair}"));
        }
        let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));

        match params.remove(key) {
            None => {
                params.insert(key.to_string(), value);
            }
            Some(Value::Array(mut items)) => {
                items.push(value);
                params.insert(key.to_string(), Value::Array(items));
            }
            Some(previous) => {
                params.insert(key.to_string(), Value::Array(vec![previous, value]));
            }
        }
    }
    Ok(Value::Object(params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_line("  !refetch "), Ok(Command::Refetch));
        assert_eq!(parse_line("!invalidate"), Ok(Command::Invalidate));
        assert_eq!(parse_line("!bump"), Ok(Command::Bump));
        assert_eq!(parse_line(""), Ok(Command::Skip));
        assert!(parse_line("!nope").is_err());
    }

    #[test]
    fn test_parse_params_line() {
        assert_eq!(parse_line(r#"{"base": "X"}"#), Ok(Command::Params(json!({"base": "X"}))));
        assert_eq!(parse_line("null"), Ok(Command::Params(Value::Null)));
        assert!(parse_line("[1, 2]").is_err());
        assert!(parse_line("{base").is_err());
    }

    #[test]
    fn test_params_from_pairs() {
        let pairs = ["base=X", "cities=Lima", "cities=Cusco", "limit=10"].map(String::from);
        assert_eq!(
            params_from_pairs(&pairs),
            Ok(json!({"base": "X", "cities": ["Lima", "Cusco"], "limit": 10}))
        );
        assert_eq!(params_from_pairs(&[]), Ok(json!({})));
    }

    #[test]
    fn test_params_from_pairs_rejects_malformed() {
        assert!(params_from_pairs(&["base".to_string()]).is_err());
        assert!(params_from_pairs(&["=X".to_string()]).is_err());
    }
}
