//! Input/output content codecs.
//!
//! Formats are looked up in two tiers: the owning registry's override table
//! first, then the process-wide defaults in [`crate::defaults`].

use std::sync::Arc;

use serde_json::Value;

use crate::error::FormatError;

/// Decodes a request body of a given content type into structured data.
pub type InputFormat = Arc<dyn Fn(&[u8]) -> Result<Value, FormatError> + Send + Sync>;

/// Encodes a structured value into a response body.
pub type OutputFormat = Arc<dyn Fn(&Value) -> Result<FormattedBody, FormatError> + Send + Sync>;

/// An encoded response body plus its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedBody {
    pub content_type: String,
    pub body: Vec<u8>,
}

/// The built-in `application/json` decoder.
pub fn json_input() -> InputFormat {
    Arc::new(|bytes| {
        serde_json::from_slice(bytes).map_err(|source| FormatError::Decode {
            content_type: "application/json".to_string(),
            source,
        })
    })
}

/// The built-in JSON encoder (pretty-printed, `application/json`).
pub fn json_output() -> OutputFormat {
    Arc::new(|value| {
        let body =
            serde_json::to_vec_pretty(value).map_err(|source| FormatError::Encode { source })?;
        Ok(FormattedBody {
            content_type: "application/json".to_string(),
            body,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_input_decodes() {
        let decode = json_input();
        let value = decode(br#"{"a": 1}"#).unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn json_input_rejects_garbage() {
        let decode = json_input();
        assert!(decode(b"not json").is_err());
    }

    #[test]
    fn json_output_encodes_with_content_type() {
        let encode = json_output();
        let formatted = encode(&json!({"a": 1})).unwrap();
        assert_eq!(formatted.content_type, "application/json");
        let round: Value = serde_json::from_slice(&formatted.body).unwrap();
        assert_eq!(round, json!({"a": 1}));
    }
}
