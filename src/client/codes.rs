//! Array result codes and JSON coercion rules
//!
//! Array responses are loosely typed: the same numeric code may arrive as a
//! JSON number on one endpoint and as a quoted string on another. Everything
//! that inspects a response body goes through the helpers here.

use serde_json::Value;

/// Request carried no valid session (older array firmware)
pub const NOT_AUTHENTICATED: i64 = 10000003;
/// Session was kicked out or timed out
pub const SESSION_OFFLINE: i64 = 1077949069;

/// Wrong user name or password
pub const LOGIN_FAILED: i64 = 1077949061;
/// Wrong user name or password, reported with an argument
pub const LOGIN_FAILED_WITH_ARG: i64 = 1077987870;
/// Account locked after repeated failures
pub const USER_PASSWORD_INVALID: i64 = 1073754390;
/// Source address locked after repeated failures
pub const IP_LOCKED: i64 = 1077949071;

/// Coerce a JSON value into an integer code.
///
/// Accepts integers, integral floats and numeric strings.
pub fn as_code(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Coerce a JSON value into a float (numbers and numeric strings)
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// The `result` field of a response body.
///
/// Newer endpoints nest it as `{"result": {"code": 0, "description": ""}}`.
pub fn result_code(body: &Value) -> Option<i64> {
    match body.get("result")? {
        Value::Object(result) => result.get("code").and_then(as_code),
        other => as_code(other),
    }
}

/// The `errorCode` field of a response body
pub fn error_code(body: &Value) -> Option<i64> {
    body.get("errorCode").and_then(as_code)
}

/// Whether the response reports an expired or missing session
pub fn is_session_expired(body: &Value) -> bool {
    matches!(error_code(body), Some(SESSION_OFFLINE) | Some(NOT_AUTHENTICATED))
}

/// Whether a login error code means the credentials themselves are unusable
pub fn is_hard_auth_failure(code: i64) -> bool {
    matches!(
        code,
        LOGIN_FAILED | LOGIN_FAILED_WITH_ARG | USER_PASSWORD_INVALID | IP_LOCKED
    )
}

/// True iff the `detail` array is non-empty and every entry carries `code`
pub fn check_detail_error_code(body: &Value, code: i64) -> bool {
    let details = match body.get("detail").and_then(Value::as_array) {
        Some(details) if !details.is_empty() => details,
        _ => return false,
    };

    details
        .iter()
        .all(|detail| detail.is_object() && error_code(detail) == Some(code))
}

/// Human-readable description of a failed response
pub fn describe(body: &Value) -> String {
    body.get("description")
        .or_else(|| body.get("errorMsg"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_code_coercion() {
        assert_eq!(as_code(&json!(1077949069)), Some(SESSION_OFFLINE));
        assert_eq!(as_code(&json!(1077949069.0)), Some(SESSION_OFFLINE));
        assert_eq!(as_code(&json!("1077949069")), Some(SESSION_OFFLINE));
        assert_eq!(as_code(&json!(" 0 ")), Some(0));
        assert_eq!(as_code(&json!(1.5)), None);
        assert_eq!(as_code(&json!("abc")), None);
        assert_eq!(as_code(&json!(true)), None);
        assert_eq!(as_code(&Value::Null), None);
    }

    #[test]
    fn test_session_expired_encodings() {
        assert!(is_session_expired(&json!({"errorCode": "1077949069"})));
        assert!(is_session_expired(&json!({"errorCode": 1077949069})));
        assert!(is_session_expired(&json!({"errorCode": 10000003})));
        assert!(!is_session_expired(&json!({"errorCode": 0})));
        assert!(!is_session_expired(&json!({"result": 0})));
    }

    #[test]
    fn test_hard_auth_failures() {
        for code in [LOGIN_FAILED, LOGIN_FAILED_WITH_ARG, USER_PASSWORD_INVALID, IP_LOCKED] {
            assert!(is_hard_auth_failure(code));
        }
        assert!(!is_hard_auth_failure(SESSION_OFFLINE));
    }

    #[test]
    fn test_check_detail_error_code() {
        let body = json!({"detail": [{"errorCode": 5}, {"errorCode": "5"}]});
        assert!(check_detail_error_code(&body, 5));

        let mixed = json!({"detail": [{"errorCode": 5}, {"errorCode": 6}]});
        assert!(!check_detail_error_code(&mixed, 5));

        assert!(!check_detail_error_code(&json!({"detail": []}), 5));
        assert!(!check_detail_error_code(&json!({}), 5));
        assert!(!check_detail_error_code(&json!({"detail": ["bad"]}), 5));
    }

    #[test]
    fn test_result_code_shapes() {
        assert_eq!(result_code(&json!({"result": 0})), Some(0));
        assert_eq!(result_code(&json!({"result": {"code": "5"}})), Some(5));
        assert_eq!(result_code(&json!({"data": 1})), None);
    }

    #[test]
    fn test_as_number() {
        assert_eq!(as_number(&json!(1024)), Some(1024.0));
        assert_eq!(as_number(&json!("2.5")), Some(2.5));
        assert_eq!(as_number(&json!(null)), None);
    }
}
