//! Wire contract with the gateway and callers.

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;
use vend_core::{
    ExchangeFailure, ExchangeStage, FailureKind, FailureResponse, IncomingRequest, RequestId,
    TemporaryCredentials,
};

#[test]
fn test_credentials_body() {
    let credentials = TemporaryCredentials {
        access_key_id: "ASIAEXAMPLE".to_string(),
        secret_access_key: "secret".to_string(),
        session_token: "session".to_string(),
        expiration: Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap(),
    };

    assert_eq!(
        serde_json::to_value(&credentials).unwrap(),
        json!({
            "accessKeyId": "ASIAEXAMPLE",
            "secretAccessKey": "secret",
            "sessionToken": "session",
            "expiration": "2030-01-02T03:04:05Z",
        })
    );
}

#[test]
fn test_failure_body() {
    let request_id: RequestId = "req_0192f1c2a3b47c5d8e9f0a1b2c3d4e5f".parse().unwrap();
    let failure = ExchangeFailure {
        request_id,
        kind: FailureKind::ContextMissing,
        stage: ExchangeStage::AssumingRole,
        detail: "Federated token carries no identity context".to_string(),
    };

    let body = serde_json::to_value(failure.to_response()).unwrap();
    assert_eq!(
        body,
        json!({
            "requestId": "req_0192f1c2a3b47c5d8e9f0a1b2c3d4e5f",
            "message": "ContextMissing",
            "details": "Federated token carries no identity context",
        })
    );

    let parsed: FailureResponse = serde_json::from_value(body).unwrap();
    assert_eq!(parsed.message, FailureKind::ContextMissing.as_str());
}

#[test]
fn test_gateway_event_without_token() {
    let request: IncomingRequest =
        serde_json::from_value(json!({ "path": "/exchange", "httpMethod": "GET" })).unwrap();
    assert_eq!(request.token(), None);
    assert_eq!(request.path, "/exchange");
}

#[test]
fn test_failure_kind_names_are_stable() {
    let names: Vec<String> = [
        FailureKind::MalformedToken,
        FailureKind::MissingKeyId,
        FailureKind::KeyLookupError,
        FailureKind::SignatureInvalid,
        FailureKind::FederationRejected,
        FailureKind::FederationUnavailable,
        FailureKind::ContextMissing,
        FailureKind::AssumeRoleRejected,
        FailureKind::AssumeRoleUnavailable,
        FailureKind::Unexpected,
    ]
    .iter()
    .map(|kind| serde_json::to_value(kind).unwrap().as_str().unwrap().to_string())
    .collect();

    assert_eq!(
        names,
        vec![
            "MalformedToken",
            "MissingKeyId",
            "KeyLookupError",
            "SignatureInvalid",
            "FederationRejected",
            "FederationUnavailable",
            "ContextMissing",
            "AssumeRoleRejected",
            "AssumeRoleUnavailable",
            "Unexpected",
        ]
    );
}
