//! HL7v2 message resource exchanged with the Aidbox REST API.
//!
//! Only the fields the pipeline reads are modelled on the response side;
//! everything else in the body is ignored.

use serde::{Deserialize, Serialize};

/// Reference to the server-side parsing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hl7v2ConfigRef {
    pub resource_type: String,
    pub id: String,
}

impl Default for Hl7v2ConfigRef {
    fn default() -> Self {
        Self {
            resource_type: "Hl7v2Config".to_string(),
            id: "default".to_string(),
        }
    }
}

/// Request body for `POST /Hl7v2Message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hl7v2MessagePayload {
    pub resource_type: String,
    /// Raw message text, surrounding whitespace trimmed
    pub src: String,
    pub status: String,
    pub config: Hl7v2ConfigRef,
}

impl Hl7v2MessagePayload {
    pub fn new(content: &str) -> Self {
        Self {
            resource_type: "Hl7v2Message".to_string(),
            src: content.trim().to_string(),
            status: "received".to_string(),
            config: Hl7v2ConfigRef::default(),
        }
    }
}

/// Response body from `POST /Hl7v2Message`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Hl7v2MessageResponse {
    #[serde(default)]
    pub id: Option<String>,
    /// Processing verdict: `processed`, `error`, or anything else the server invents
    #[serde(default)]
    pub status: Option<String>,
}

impl Hl7v2MessageResponse {
    /// Parse a response body. An empty body is a valid, empty response.
    pub fn from_body(body: &str) -> Result<Self, serde_json::Error> {
        if body.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let payload = Hl7v2MessagePayload::new("\nMSH|^~\\&|TEST|SYSTEM\nPID|1||123\n\n");
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["resourceType"], "Hl7v2Message");
        assert_eq!(json["status"], "received");
        assert_eq!(json["src"], "MSH|^~\\&|TEST|SYSTEM\nPID|1||123");
        assert_eq!(json["config"]["resourceType"], "Hl7v2Config");
        assert_eq!(json["config"]["id"], "default");
    }

    #[test]
    fn test_response_ignores_extra_fields() {
        let body = r#"{"id":"msg-1","status":"error","resourceType":"Hl7v2Message","outcome":["error","Parsing failed"]}"#;
        let response = Hl7v2MessageResponse::from_body(body).unwrap();
        assert_eq!(response.id.as_deref(), Some("msg-1"));
        assert_eq!(response.status.as_deref(), Some("error"));
    }

    #[test]
    fn test_empty_body_is_empty_response() {
        assert_eq!(
            Hl7v2MessageResponse::from_body("  ").unwrap(),
            Hl7v2MessageResponse::default()
        );
        assert!(Hl7v2MessageResponse::from_body("<html>").is_err());
    }
}
