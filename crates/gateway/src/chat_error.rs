//! Structured error parsing for chat error messages.
//!
//! Converts raw error strings from agent runners / LLM providers into
//! structured JSON payloads that the frontend can render directly.

use serde_json::Value;

/// Parse a raw error string into a structured error object with `type`, `icon`,
/// `title`, `detail`, and optionally `provider` and `resetsAt` fields.
pub fn parse_chat_error(raw: &str, provider_name: Option<&str>) -> Value {
    let mut error = try_parse_known_error(raw);

    if let Some(name) = provider_name {
        error
            .as_object_mut()
            .unwrap()
            .insert("provider".into(), Value::String(name.to_string()));
    }

    error
}

fn try_parse_known_error(raw: &str) -> Value {
    let http_status = extract_http_status(raw);

    // Try to extract embedded JSON from the error string.
    if let Some(start) = raw.find('{')
        && let Ok(parsed) = serde_json::from_str::<Value>(&raw[start..])
    {
        let err_obj = parsed.get("error").unwrap_or(&parsed);

        // Usage limit
        if matches_type_or_message(err_obj, "usage_limit_reached", "usage limit") {
            let plan_type = err_obj
                .get("plan_type")
                .and_then(|v| v.as_str())
                .unwrap_or("current");
            let resets_at = extract_resets_at(err_obj);
            return build_error(
                "usage_limit_reached",
                "",
                "Usage limit reached",
                &format!("Your {} plan limit has been reached.", plan_type),
                resets_at,
            );
        }

        // Rate limit
        if matches_type_or_message(err_obj, "rate_limit_exceeded", "rate limit")
            || matches_type_or_message(err_obj, "rate_limit_exceeded", "quota exceeded")
            || http_status == Some(429)
        {
            let detail = err_obj
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("Too many requests. Please wait a moment.");
            let resets_at = extract_resets_at(err_obj);
            return build_error(
                "rate_limit_exceeded",
                "\u{26A0}\u{FE0F}",
                "Rate limited",
                detail,
                resets_at,
            );
        }

        // Generic JSON error with a message field
        if let Some(msg) = extract_message(err_obj)
            && is_unsupported_model_message(msg)
        {
            return build_error(
                "unsupported_model",
                "\u{26A0}\u{FE0F}",
                "Model not supported",
                msg,
                None,
            );
        }

        // Generic JSON error with a message field
        if let Some(msg) = err_obj.get("message").and_then(|v| v.as_str()) {
            return build_error("api_error", "\u{26A0}\u{FE0F}", "Error", msg, None);
        }
    }

    // Check for HTTP status codes in the raw message.
    if let Some(code) = http_status {
        match code {
            401 | 403 => {
                return build_error(
                    "auth_error",
                    "\u{1F512}",
                    "Authentication error",
                    "Your session may have expired or credentials are invalid.",
                    None,
                );
            },
            429 => {
                return build_error(
                    "rate_limit_exceeded",
                    "",
                    "Rate limited",
                    "Too many requests. Please wait a moment and try again.",
                    None,
                );
            },
            code if code >= 500 => {
                return build_error(
                    "server_error",
                    "\u{1F6A8}",
                    "Server error",
                    "The upstream provider returned an error. Please try again later.",
                    None,
                );
            },
            _ => {},
        }
    }

    if is_unsupported_model_message(raw) {
        return build_error(
            "unsupported_model",
            "\u{26A0}\u{FE0F}",
            "Model not supported",
            raw,
            None,
        );
    }

    // Default: pass through raw message.
    build_error("unknown", "\u{26A0}\u{FE0F}", "Error", raw, None)
}

fn extract_message(obj: &Value) -> Option<&str> {
    obj.get("detail")
        .and_then(|v| v.as_str())
        .or_else(|| obj.get("message").and_then(|v| v.as_str()))
        .or_else(|| {
            obj.get("error")
                .and_then(|v| v.get("message"))
                .and_then(|v| v.as_str())
        })
        .or_else(|| {
            obj.get("error")
                .and_then(|v| v.get("detail"))
                .and_then(|v| v.as_str())
        })
}

fn is_unsupported_model_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    let has_model = lower.contains("model");
    let unsupported = lower.contains("not supported")
        || lower.contains("unsupported")
        || lower.contains("not available");
    has_model && unsupported
}

fn matches_type_or_message(obj: &Value, type_str: &str, message_substr: &str) -> bool {
    if let Some(t) = obj.get("type").and_then(|v| v.as_str())
        && t == type_str
    {
        return true;
    }
    if let Some(m) = obj.get("message").and_then(|v| v.as_str())
        && m.to_lowercase().contains(message_substr)
    {
        return true;
    }
    false
}

fn extract_resets_at(obj: &Value) -> Option<u64> {
    obj.get("resets_at").and_then(|v| v.as_u64())
}

fn extract_http_status(raw: &str) -> Option<u16> {
    // Match patterns like "HTTP 429", "status 503", "status: 401", "status=429"
    let patterns = ["HTTP ", "status= ", "status=", "status: ", "status "];
    for pat in &patterns {
        if let Some(idx) = raw.find(pat) {
            let after = &raw[idx + pat.len()..];
            let digits: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(code) = digits.parse::<u16>() {
                return Some(code);
            }
        }
    }
    None
}

fn build_error(
    error_type: &str,
    icon: &str,
    title: &str,
    detail: &str,
    resets_at: Option<u64>,
) -> Value {
    let mut obj = serde_json::json!({
        "type": error_type,
        "icon": icon,
        "title": title,
        "detail": detail,
    });
    if let Some(ts) = resets_at {
        // Send as milliseconds for the frontend.
        obj.as_object_mut()
            .unwrap()
            .insert("resetsAt".into(), Value::Number((ts * 1000).into()));
    }
    obj
}
