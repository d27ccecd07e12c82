use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::FetchError;

/// JSON type a payload field must have.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadShape {
    List,
    Object,
}

/// Backend response wrapper: `{ "success": bool, "<payload_key>": ..., ... }`.
///
/// Anything that does not look like this is `MalformedResponse`, never a panic.
#[derive(Clone, Debug)]
pub struct Envelope {
    success: bool,
    message: Option<String>,
    body: Map<String, Value>,
}

impl Envelope {
    pub fn parse(body: Value) -> Result<Self, FetchError> {
        let Value::Object(body) = body else {
            return Err(FetchError::malformed("envelope is not a JSON object"));
        };

        let success = match body.get("success") {
            Some(Value::Bool(b)) => *b,
            Some(_) => return Err(FetchError::malformed("`success` is not a boolean")),
            None => return Err(FetchError::malformed("missing `success` field")),
        };

        let message = body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self {
            success,
            message,
            body,
        })
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Raw top-level field (e.g. `unread_count`), if present.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    /// Extracts and decodes the payload, dropping the transport fields.
    pub fn payload<T: DeserializeOwned>(
        &self,
        key: &str,
        shape: PayloadShape,
    ) -> Result<T, FetchError> {
        if !self.success {
            return Err(FetchError::malformed(format!(
                "backend reported failure: {}",
                self.message.as_deref().unwrap_or("no message")
            )));
        }

        let raw = self
            .body
            .get(key)
            .ok_or_else(|| FetchError::malformed(format!("missing payload field `{key}`")))?;

        let shape_ok = match shape {
            PayloadShape::List => raw.is_array(),
            PayloadShape::Object => raw.is_object(),
        };
        if !shape_ok {
            return Err(FetchError::malformed(format!(
                "payload field `{key}` is not {shape:?}"
            )));
        }

        serde_json::from_value(raw.clone())
            .map_err(|e| FetchError::malformed(format!("payload `{key}`: {e}")))
    }

    pub fn list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, FetchError> {
        self.payload(key, PayloadShape::List)
    }
}
