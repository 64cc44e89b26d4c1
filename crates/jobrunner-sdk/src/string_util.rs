use anyhow::Result;
use serde::de::DeserializeOwned;

/// Small string helpers shared across crates.
pub struct StringUtil;

impl StringUtil {
    /// Deserialize a JSON string into `T`.
    pub fn convert_from_json<T: DeserializeOwned>(json: &str) -> Result<T> {
        let value = serde_json::from_str(json)?;
        Ok(value)
    }

    /// Parse a loose boolean.
    ///
    /// `"1"`, `"true"`, `"yes"` and `"on"` are true; `"0"`, `"false"`, `"no"`
    /// and `"off"` are false (case-insensitive). Anything else is `None`.
    pub fn convert_to_bool(value: &str) -> Option<bool> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    }

    /// Quote `value` for a POSIX shell using single quotes.
    pub fn shell_quote(value: &str) -> String {
        if !value.is_empty()
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c))
        {
            return value.to_string();
        }
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_to_bool_values() {
        assert_eq!(StringUtil::convert_to_bool("TRUE"), Some(true));
        assert_eq!(StringUtil::convert_to_bool(" on "), Some(true));
        assert_eq!(StringUtil::convert_to_bool("0"), Some(false));
        assert_eq!(StringUtil::convert_to_bool("No"), Some(false));
        assert_eq!(StringUtil::convert_to_bool(""), None);
        assert_eq!(StringUtil::convert_to_bool("maybe"), None);
    }

    #[test]
    fn shell_quote_plain_and_special() {
        assert_eq!(StringUtil::shell_quote("main"), "main");
        assert_eq!(StringUtil::shell_quote("a b"), "'a b'");
        assert_eq!(StringUtil::shell_quote("it's"), r"'it'\''s'");
        assert_eq!(StringUtil::shell_quote(""), "''");
    }

    #[test]
    fn convert_from_json_errors_on_garbage() {
        let parsed: Result<Vec<i32>> = StringUtil::convert_from_json("[1, 2");
        assert!(parsed.is_err());
    }
}
