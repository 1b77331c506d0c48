use serde::Serialize;

/// Uniform command response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: String,
}

impl<T: Serialize> CommandResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// For commands with no payload.
#[derive(Debug, Clone, Serialize)]
pub struct Empty {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shape() {
        let resp = CommandResponse::ok(serde_json::json!({"n": 1}));
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["success"], true);
        assert_eq!(v["data"]["n"], 1);
        assert!(v.get("message").is_none());

        let resp: CommandResponse<Empty> = CommandResponse::err("nope");
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["success"], false);
        assert_eq!(v["message"], "nope");
    }
}
