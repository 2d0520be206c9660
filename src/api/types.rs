use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// One-shot message carried to the next rendered page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    /// Error text.
    pub err: Option<String>,
    /// Success text.
    pub serr: Option<String>,
}

impl Flash {
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            err: Some(message.into()),
            serr: None,
        }
    }

    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            err: None,
            serr: Some(message.into()),
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.err.is_none() && self.serr.is_none()
    }
}

/// Result of running an action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionResponse {
    pub error: bool,
    pub message: Option<String>,
    /// Replaces the rule's success/error target when set.
    pub redirect: Option<String>,
    pub payload: Value,
}

impl ActionResponse {
    #[must_use]
    pub fn ok() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: true,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    #[must_use]
    pub fn redirect_to(mut self, target: impl Into<String>) -> Self {
        self.redirect = Some(target.into());
        self
    }

    #[must_use]
    pub fn flash(&self) -> Flash {
        match (&self.message, self.error) {
            (Some(msg), true) => Flash::error(msg.clone()),
            (Some(msg), false) => Flash::success(msg.clone()),
            (None, _) => Flash::default(),
        }
    }

    /// `{error, message}` followed by the payload's own fields.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut body = Map::new();
        body.insert("error".to_string(), Value::Bool(self.error));
        body.insert(
            "message".to_string(),
            Value::String(self.message.clone().unwrap_or_default()),
        );

        match &self.payload {
            Value::Object(fields) => {
                for (key, value) in fields {
                    body.entry(key.clone()).or_insert_with(|| value.clone());
                }
            }
            Value::Null => {}
            other => {
                body.insert("data".to_string(), other.clone());
            }
        }

        Value::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_json_merges_payload() {
        let response = ActionResponse::success("done")
            .with_payload(json!({"username": "bob", "message": "ignored"}));
        assert_eq!(
            response.to_json(),
            json!({"error": false, "message": "done", "username": "bob"})
        );
    }

    #[test]
    fn test_action_json_without_payload() {
        assert_eq!(
            ActionResponse::failure("nope").to_json(),
            json!({"error": true, "message": "nope"})
        );
    }

    #[test]
    fn test_flash_from_response() {
        assert_eq!(ActionResponse::failure("x").flash(), Flash::error("x"));
        assert_eq!(ActionResponse::success("y").flash(), Flash::success("y"));
        assert!(ActionResponse::ok().flash().is_empty());
    }
}
