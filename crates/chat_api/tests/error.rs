use chat_api::error::{parse_error_code, parse_error_message, NO_ROWS_CODE};
use chat_api::ChatApiError;
use reqwest::StatusCode;

#[test]
fn error_message_prefers_structured_fields() {
    assert_eq!(
        parse_error_message(StatusCode::BAD_REQUEST, r#"{"error":"Bad Request"}"#),
        "Bad Request"
    );
    assert_eq!(
        parse_error_message(StatusCode::BAD_REQUEST, r#"{"error":{"message":"nested"}}"#),
        "nested"
    );
    assert_eq!(
        parse_error_message(
            StatusCode::NOT_ACCEPTABLE,
            r#"{"code":"PGRST116","message":"JSON object requested, multiple (or no) rows returned"}"#
        ),
        "JSON object requested, multiple (or no) rows returned"
    );
    assert_eq!(
        parse_error_message(StatusCode::BAD_REQUEST, r#"{"detail":"Failed to add message"}"#),
        "Failed to add message"
    );
}

#[test]
fn error_message_falls_back_to_body_or_reason() {
    assert_eq!(
        parse_error_message(StatusCode::BAD_GATEWAY, "upstream down"),
        "upstream down"
    );
    assert_eq!(
        parse_error_message(StatusCode::SERVICE_UNAVAILABLE, ""),
        "Service Unavailable"
    );
}

#[test]
fn error_code_detects_no_rows() {
    let body = r#"{"code":"PGRST116","details":"The result contains 0 rows"}"#;
    assert_eq!(parse_error_code(body).as_deref(), Some(NO_ROWS_CODE));
    assert_eq!(parse_error_code("not json"), None);

    let error = ChatApiError::Status {
        status: StatusCode::NOT_ACCEPTABLE,
        message: "no rows".to_string(),
        code: parse_error_code(body),
    };
    assert!(error.is_no_rows());
    assert!(!error.is_timeout());
    assert_eq!(error.to_string(), "HTTP 406 Not Acceptable: no rows");
}
