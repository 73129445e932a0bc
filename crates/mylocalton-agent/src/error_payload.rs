use crate::error::ErrorCode;

pub const PREFIX: &str = "MYLOCALTON_ERROR_JSON:";

const MAX_MESSAGE_BYTES: usize = 16 * 1024;
const MAX_HINT_BYTES: usize = 4 * 1024;

#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

fn truncate_utf8(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }

    let suffix = "…(truncated)";
    let keep = max_bytes.saturating_sub(suffix.len()).max(1);
    let mut end = keep.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = s[..end].to_string();
    out.push_str(suffix);
    out
}

pub fn encode(code: &str, message: impl Into<String>, hint: Option<&str>) -> String {
    let payload = ErrorPayload {
        code: code.to_string(),
        message: truncate_utf8(&message.into(), MAX_MESSAGE_BYTES),
        hint: hint.map(|h| truncate_utf8(h, MAX_HINT_BYTES)),
    };
    let json = serde_json::to_string(&payload)
        .unwrap_or_else(|_| "{\"code\":\"internal\",\"message\":\"serialize_failed\"}".to_string());
    format!("{PREFIX}{json}")
}

/// Encodes a typed lifecycle error with its code and hint.
pub fn encode_error<E>(err: &E) -> String
where
    E: ErrorCode + std::error::Error,
{
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let s = cause.to_string();
        if !message.ends_with(&s) {
            message.push_str(": ");
            message.push_str(&s);
        }
        source = cause.source();
    }
    encode(err.code(), message, err.hint())
}

/// Wraps a typed error into an `anyhow::Error` whose message is the encoded payload.
pub fn anyhow<E>(err: E) -> anyhow::Error
where
    E: ErrorCode + std::error::Error,
{
    anyhow::anyhow!(encode_error(&err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LaunchError, StopError};

    fn decode(s: &str) -> serde_json::Value {
        assert!(s.starts_with(PREFIX));
        serde_json::from_str(&s[PREFIX.len()..]).unwrap()
    }

    #[test]
    fn encode_truncates_on_char_boundary() {
        let long = "é".repeat(MAX_MESSAGE_BYTES);
        let v = decode(&encode("test", long, Some(&"h".repeat(MAX_HINT_BYTES + 10))));
        let msg = v["message"].as_str().unwrap();
        assert!(msg.len() <= MAX_MESSAGE_BYTES);
        assert!(msg.ends_with("…(truncated)"));
        assert!(v["hint"].as_str().unwrap().len() <= MAX_HINT_BYTES);
    }

    #[test]
    fn typed_errors_carry_code_hint_and_cause() {
        let err = LaunchError::Spawn {
            command: "java -jar MyLocalTon-x86-64.jar".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        let v = decode(&encode_error(&err));
        assert_eq!(v["code"], "spawn_failed");
        let msg = v["message"].as_str().unwrap();
        assert!(msg.contains("java -jar MyLocalTon-x86-64.jar"));
        assert_eq!(msg.matches("no such file").count(), 1);
        assert!(v["hint"].as_str().unwrap().contains("Java"));

        let v = decode(&encode_error(&StopError::Signal {
            pid: 7,
            message: "denied".to_string(),
        }));
        assert_eq!(v["code"], "signal_failed");
        assert!(v.get("hint").is_none());
    }
}
