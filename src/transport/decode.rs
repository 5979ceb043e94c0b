use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::errors::Error;
use crate::types::ResponseBody;

static ERROR_FRAGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Error:.[^<]+").expect("error fragment pattern is valid"));

/// Decodes a body by content type: JSON, text, or raw bytes.
///
/// An empty JSON body decodes to `null`.
pub fn decode_body(content_type: Option<&str>, bytes: Vec<u8>) -> Result<ResponseBody, Error> {
    let Some(content_type) = content_type else {
        return Ok(ResponseBody::Raw(bytes));
    };
    if content_type.contains("json") {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(ResponseBody::Json(Value::Null));
        }
        return Ok(ResponseBody::Json(serde_json::from_slice(&bytes)?));
    }
    if content_type.contains("text") {
        let text = String::from_utf8_lossy(&bytes).into_owned();
        return Ok(ResponseBody::Text(
            extract_error_message(&text).unwrap_or(text),
        ));
    }
    Ok(ResponseBody::Raw(bytes))
}

/// Pulls the message out of an `Error: ...` fragment in a text/HTML body,
/// stopping at the next `<`.
pub fn extract_error_message(text: &str) -> Option<String> {
    let fragment = ERROR_FRAGMENT.find(text)?;
    let message = fragment.as_str().replacen("Error:", "", 1).trim().to_string();
    if message.is_empty() {
        None
    } else {
        Some(message)
    }
}
