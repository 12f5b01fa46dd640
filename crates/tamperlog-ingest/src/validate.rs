use serde_json::Value;

use crate::error::IngestError;

/// Maximum byte length of `event_type` and `source_app_id`.
pub const MAX_IDENTIFIER_LEN: usize = 256;

/// True when `payload` carries nothing: JSON `null` or the empty string.
/// `0`, `false`, `{}` and `[]` are real payloads.
pub fn is_blank_payload(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn check_identifier(field: &str, value: &str) -> Result<(), IngestError> {
    if value.trim().is_empty() {
        return Err(IngestError::Validation(format!("{field} is required")));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(IngestError::Validation(format!(
            "{field} exceeds {MAX_IDENTIFIER_LEN} bytes"
        )));
    }
    Ok(())
}

/// Checks the append input contract. Pure; runs before any storage access.
pub(crate) fn validate_event(
    event_type: &str,
    source_app_id: &str,
    data_payload: &Value,
) -> Result<(), IngestError> {
    check_identifier("eventType", event_type)?;
    check_identifier("sourceAppId", source_app_id)?;
    if is_blank_payload(data_payload) {
        return Err(IngestError::Validation("dataPayload is required".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_well_formed_event() {
        assert!(validate_event("signup", "web", &json!({ "plan": "free" })).is_ok());
        assert!(validate_event("signup", "web", &json!(0)).is_ok());
        assert!(validate_event("signup", "web", &json!([])).is_ok());
        assert!(validate_event("signup", "web", &json!(false)).is_ok());
        assert!(validate_event("signup", "web", &json!(" ")).is_ok());
    }

    #[test]
    fn rejects_blank_identifiers() {
        for (event_type, source) in [("", "web"), ("signup", ""), ("   ", "web"), ("signup", "\t")] {
            let err = validate_event(event_type, source, &json!({})).unwrap_err();
            assert!(err.is_client_error());
        }
    }

    #[test]
    fn rejects_null_payload() {
        for payload in [json!(null), json!("")] {
            let err = validate_event("signup", "web", &payload).unwrap_err();
            assert_eq!(err.to_string(), "invalid event: dataPayload is required");
        }
    }

    #[test]
    fn rejects_oversized_identifier() {
        let long = "x".repeat(MAX_IDENTIFIER_LEN + 1);
        assert!(validate_event(&long, "web", &json!(1)).is_err());
        assert!(validate_event("signup", &long, &json!(1)).is_err());

        let max = "x".repeat(MAX_IDENTIFIER_LEN);
        assert!(validate_event(&max, &max, &json!(1)).is_ok());
    }
}
