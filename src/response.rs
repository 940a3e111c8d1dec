//!
//! Uniform JSON response envelope
//! ------------------------------
//! Every API response carries the same four bookkeeping fields; typed
//! payloads flatten those fields alongside their own list key. Failed
//! requests are reported with HTTP 400 and the error details inside the
//! envelope, so API clients only ever parse one shape.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::store::{Keypair, Model, SigningLog};

pub const JSON_HEADER: &str = "application/json; charset=UTF-8";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardResponse {
    pub success: bool,
    pub error_code: String,
    pub error_subcode: String,
    #[serde(rename = "message")]
    pub error_message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelsResponse {
    #[serde(flatten)]
    pub standard: StandardResponse,
    pub models: Vec<Model>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KeypairsResponse {
    #[serde(flatten)]
    pub standard: StandardResponse,
    pub keypairs: Vec<Keypair>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SigningLogResponse {
    #[serde(flatten)]
    pub standard: StandardResponse,
    pub logs: Vec<SigningLog>,
}

fn standard(success: bool, error_code: &str, error_subcode: &str, message: &str) -> StandardResponse {
    StandardResponse {
        success,
        error_code: error_code.to_string(),
        error_subcode: error_subcode.to_string(),
        error_message: message.to_string(),
    }
}

/// Serialize the envelope and wrap it in an HTTP response. A failed
/// request keeps its details in the body and reports 400 at the HTTP
/// layer; only an encode failure bubbles up as an error.
fn encode<T: Serialize>(success: bool, body: &T) -> anyhow::Result<Response> {
    let bytes = serde_json::to_vec(body).map_err(|err| {
        error!("cannot encode response: {}", err);
        err
    })?;
    let status = if success { StatusCode::OK } else { StatusCode::BAD_REQUEST };
    Ok(Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, JSON_HEADER)
        .body(Body::from(bytes))?)
}

pub fn format_standard_response(
    success: bool,
    error_code: &str,
    error_subcode: &str,
    message: &str,
) -> anyhow::Result<Response> {
    encode(success, &standard(success, error_code, error_subcode, message))
}

pub fn format_models_response(
    success: bool,
    error_code: &str,
    error_subcode: &str,
    message: &str,
    models: Vec<Model>,
) -> anyhow::Result<Response> {
    let body = ModelsResponse { standard: standard(success, error_code, error_subcode, message), models };
    encode(success, &body)
}

pub fn format_keypairs_response(
    success: bool,
    error_code: &str,
    error_subcode: &str,
    message: &str,
    keypairs: Vec<Keypair>,
) -> anyhow::Result<Response> {
    let body =
        KeypairsResponse { standard: standard(success, error_code, error_subcode, message), keypairs };
    encode(success, &body)
}

pub fn format_signing_log_response(
    success: bool,
    error_code: &str,
    error_subcode: &str,
    message: &str,
    logs: Vec<SigningLog>,
) -> anyhow::Result<Response> {
    let body = SigningLogResponse { standard: standard(success, error_code, error_subcode, message), logs };
    encode(success, &body)
}

/// Decode the bookkeeping fields of any envelope body.
pub fn parse_standard_response(bytes: &[u8]) -> anyhow::Result<StandardResponse> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_bytes(resp: Response) -> Vec<u8> {
        to_bytes(resp.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    #[tokio::test]
    async fn success_envelope_is_200_json() {
        let resp = format_standard_response(true, "", "", "").unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], JSON_HEADER);
        let parsed = parse_standard_response(&body_bytes(resp).await).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.error_code, "");
        assert_eq!(parsed.error_message, "");
    }

    #[tokio::test]
    async fn failure_envelope_is_400_with_details() {
        let resp =
            format_standard_response(false, "error-decode-key", "invalid-encoding", "not base64")
                .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], JSON_HEADER);
        let parsed = parse_standard_response(&body_bytes(resp).await).unwrap();
        assert!(!parsed.success);
        assert_eq!(parsed.error_code, "error-decode-key");
        assert_eq!(parsed.error_subcode, "invalid-encoding");
        assert_eq!(parsed.error_message, "not base64");
    }

    #[tokio::test]
    async fn message_field_uses_wire_name() {
        let resp = format_standard_response(false, "error-auth", "", "forbidden").unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(value["message"], "forbidden");
        assert!(value.get("error_message").is_none());
    }

    #[tokio::test]
    async fn models_payload_flattens_next_to_list() {
        let models = vec![
            Model { id: 1, brand_id: "system".into(), name: "Alder 聖誕快樂".into(), revision: 1 },
            Model { id: 2, brand_id: "system".into(), name: "Ash".into(), revision: 7 },
        ];
        let resp = format_models_response(true, "", "", "", models.clone()).unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = body_bytes(resp).await;
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["models"][0]["name"], "Alder 聖誕快樂");
        let typed: ModelsResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(typed.models, models);
        assert!(typed.standard.success);
    }

    #[tokio::test]
    async fn keypair_and_log_payloads_use_their_keys() {
        let keypairs = vec![Keypair {
            id: 4,
            authority_id: "maker".into(),
            key_id: "UytH3dzS".into(),
            active: true,
        }];
        let resp = format_keypairs_response(true, "", "", "", keypairs).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(value["keypairs"][0]["key_id"], "UytH3dzS");

        let logs = vec![SigningLog {
            id: 9,
            make: "maker".into(),
            model: "Ash".into(),
            serial_number: "A1228ML".into(),
            fingerprint: "a1:b2".into(),
            created: chrono::Utc::now(),
        }];
        let resp = format_signing_log_response(true, "", "", "", logs).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(value["logs"][0]["serial_number"], "A1228ML");
        assert_eq!(value["success"], true);
    }

    #[tokio::test]
    async fn failure_payload_keeps_empty_list() {
        let resp = format_models_response(false, "error-fetch-models", "", "store offline", vec![])
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let value: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error_code"], "error-fetch-models");
        assert_eq!(value["models"].as_array().unwrap().len(), 0);
    }
}
