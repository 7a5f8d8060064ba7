//! The JSON wire format for rule lists.

use floodgate_core::FlowRule;

use crate::DataSourceError;

/// Decode a JSON array of rule objects.
///
/// # Errors
/// Returns a decode error when the payload is not a JSON array of rule
/// objects; individual unknown keys are ignored.
pub fn decode_rules(raw: &str) -> Result<Vec<FlowRule>, DataSourceError> {
    Ok(serde_json::from_str(raw)?)
}

/// Encode rules back into the wire format.
///
/// # Errors
/// Returns an error when serialization fails.
pub fn encode_rules(rules: &[FlowRule]) -> Result<String, DataSourceError> {
    Ok(serde_json::to_string_pretty(rules)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use floodgate_core::{ControlBehavior, FlowGrade};

    #[test]
    fn decodes_an_array_with_mixed_rules() {
        let raw = r#"[
            {"resource": "/orders", "count": 20},
            {"resource": "/orders", "limitApp": "svc-a", "grade": 0, "count": 5},
            {"resource": "/search", "count": 50, "controlBehavior": 2,
             "maxQueueingTimeMs": 200, "unknownKey": true}
        ]"#;
        let rules = decode_rules(raw).expect("array decodes");
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[1].grade, FlowGrade::Thread);
        assert_eq!(rules[2].control_behavior, ControlBehavior::RateLimit);
        assert_eq!(rules[2].max_queueing_time_ms, 200);
    }

    #[test]
    fn rejects_non_array_payloads() {
        assert!(decode_rules(r#"{"resource": "/orders"}"#).is_err());
        assert!(decode_rules("not json").is_err());
    }

    #[test]
    fn round_trips_through_the_wire_format() {
        let rules = vec![
            FlowRule::new("/a", 10.0),
            FlowRule::new("/b", 3.0).with_warm_up(10),
        ];
        let encoded = encode_rules(&rules).expect("encodes");
        let decoded = decode_rules(&encoded).expect("decodes");
        assert_eq!(decoded, rules);
    }
}
