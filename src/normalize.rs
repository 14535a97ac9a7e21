use reqwest::{header, StatusCode};

use crate::{AnalyticsError, Payload, Result};

/// Maximum number of characters kept from a body for diagnostics.
pub const SNIPPET_CHARS: usize = 200;

pub(crate) async fn read_response(response: reqwest::Response) -> Result<Payload> {
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let body = response
        .bytes()
        .await
        .map_err(AnalyticsError::from_transport)?;
    normalize(status, content_type.as_deref(), &body)
}

/// Classifies a received response by its declared content type and status.
pub fn normalize(status: StatusCode, content_type: Option<&str>, body: &[u8]) -> Result<Payload> {
    if is_json(content_type) {
        return normalize_json(status, body);
    }

    let text = String::from_utf8_lossy(body);
    if status.is_success() {
        return Ok(Payload::Text(text.into_owned()));
    }

    match content_type {
        Some(content_type) if !is_textual(content_type) => {
            Err(AnalyticsError::UnsupportedContent {
                status: status.as_u16(),
                content_type: content_type.to_owned(),
                snippet: snippet(&text),
            })
        }
        _ => Err(http_error(status, Payload::Text(snippet(&text)))),
    }
}

fn normalize_json(status: StatusCode, body: &[u8]) -> Result<Payload> {
    // Only no-content statuses may omit the body; an empty 200 is malformed.
    if body.iter().all(u8::is_ascii_whitespace) {
        if matches!(status, StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT) {
            return Ok(Payload::Json(serde_json::Value::Null));
        }
        if !status.is_success() {
            return Err(http_error(status, Payload::Json(serde_json::Value::Null)));
        }
    }

    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) if status.is_success() => Ok(Payload::Json(value)),
        Ok(value) => Err(http_error(status, Payload::Json(value))),
        Err(source) if status.is_success() => Err(AnalyticsError::Parse {
            status: status.as_u16(),
            snippet: snippet(&String::from_utf8_lossy(body)),
            source,
        }),
        Err(_) => Err(http_error(
            status,
            Payload::Text(snippet(&String::from_utf8_lossy(body))),
        )),
    }
}

fn http_error(status: StatusCode, body: Payload) -> AnalyticsError {
    AnalyticsError::Http {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_owned(),
        body,
    }
}

fn is_json(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|value| value.to_ascii_lowercase().contains("application/json"))
}

fn is_textual(content_type: &str) -> bool {
    let lower = content_type.to_ascii_lowercase();
    lower.trim().is_empty()
        || lower.starts_with("text/")
        || lower.contains("xml")
        || lower.starts_with("application/x-www-form-urlencoded")
}

/// Truncates `text` to [`SNIPPET_CHARS`] characters.
pub(crate) fn snippet(text: &str) -> String {
    match text.char_indices().nth(SNIPPET_CHARS) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use serde_json::json;

    use super::{normalize, snippet, SNIPPET_CHARS};
    use crate::{AnalyticsError, Payload};

    const JSON: Option<&str> = Some("application/json; charset=utf-8");

    #[test]
    fn json_success_is_parsed() {
        let payload = normalize(StatusCode::OK, JSON, br#"{"views": 10}"#).expect("must parse");
        assert_eq!(payload, Payload::Json(json!({"views": 10})));
    }

    #[test]
    fn malformed_json_success_is_parse_error() {
        let err = normalize(StatusCode::OK, JSON, b"{not json").expect_err("must fail");
        assert!(matches!(err, AnalyticsError::Parse { status: 200, .. }));
    }

    #[test]
    fn json_error_keeps_parsed_detail() {
        let err = normalize(StatusCode::UNAUTHORIZED, JSON, br#"{"error": "expired"}"#)
            .expect_err("must fail");
        match err {
            AnalyticsError::Http { status, body, .. } => {
                assert_eq!(status, 401);
                assert_eq!(body, Payload::Json(json!({"error": "expired"})));
            }
            other => panic!("expected http error, got {other:?}"),
        }
    }

    #[test]
    fn malformed_json_error_falls_back_to_text_detail() {
        let err = normalize(StatusCode::BAD_GATEWAY, JSON, b"<html>bad gateway</html>")
            .expect_err("must fail");
        match err {
            AnalyticsError::Http { status, body, .. } => {
                assert_eq!(status, 502);
                assert_eq!(body, Payload::Text("<html>bad gateway</html>".to_owned()));
            }
            other => panic!("expected http error, got {other:?}"),
        }
    }

    #[test]
    fn empty_json_body_is_parse_error_unless_no_content() {
        let err = normalize(StatusCode::OK, JSON, b"").expect_err("must fail");
        assert!(matches!(err, AnalyticsError::Parse { status: 200, .. }));
        let err = normalize(StatusCode::CREATED, JSON, b"  \n").expect_err("must fail");
        assert!(matches!(err, AnalyticsError::Parse { status: 201, .. }));

        let payload = normalize(StatusCode::NO_CONTENT, JSON, b"").expect("must succeed");
        assert_eq!(payload, Payload::Json(serde_json::Value::Null));
        let payload = normalize(StatusCode::RESET_CONTENT, JSON, b"").expect("must succeed");
        assert_eq!(payload, Payload::Json(serde_json::Value::Null));
    }

    #[test]
    fn empty_json_error_body_is_http_error() {
        let err = normalize(StatusCode::NOT_FOUND, JSON, b"").expect_err("must fail");
        assert!(matches!(err, AnalyticsError::Http { status: 404, .. }));
    }

    #[test]
    fn text_success_passes_through() {
        let payload =
            normalize(StatusCode::OK, Some("text/csv"), b"a,b\n1,2").expect("must succeed");
        assert_eq!(payload, Payload::Text("a,b\n1,2".to_owned()));
    }

    #[test]
    fn text_error_is_truncated_http_error() {
        let body = "x".repeat(1_000);
        let err = normalize(
            StatusCode::INTERNAL_SERVER_ERROR,
            Some("text/html"),
            body.as_bytes(),
        )
        .expect_err("must fail");
        match err {
            AnalyticsError::Http {
                body: Payload::Text(text),
                ..
            } => assert_eq!(text.chars().count(), SNIPPET_CHARS + 1),
            other => panic!("expected http error, got {other:?}"),
        }
    }

    #[test]
    fn missing_content_type_error_is_http_error() {
        let err = normalize(StatusCode::NOT_FOUND, None, b"missing").expect_err("must fail");
        assert!(matches!(err, AnalyticsError::Http { status: 404, .. }));
    }

    #[test]
    fn binary_error_is_unsupported_content() {
        let err = normalize(
            StatusCode::BAD_REQUEST,
            Some("application/octet-stream"),
            &[0, 159, 146, 150],
        )
        .expect_err("must fail");
        assert!(matches!(
            err,
            AnalyticsError::UnsupportedContent { status: 400, .. }
        ));
    }

    #[test]
    fn snippet_respects_char_boundaries() {
        let text = "é".repeat(SNIPPET_CHARS + 5);
        let cut = snippet(&text);
        assert!(cut.ends_with('…'));
        assert_eq!(cut.chars().count(), SNIPPET_CHARS + 1);
        assert_eq!(snippet("short"), "short");
    }
}
