//! Integration tests for the protocol module
//!
//! These tests verify request construction, the wire invariants enforced on
//! decode, and request id generation.

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::serializer::SerializerKind;
    use serde_json::json;
    use std::collections::HashSet;

    fn counter_add() -> InvocationRequest {
        InvocationRequest::builder(SerializerKind::Json, "Counter", "add")
            .target(&10i64)
            .argument("i64", &5i64)
            .returns("i64")
            .build()
            .unwrap()
    }

    #[test]
    fn test_request_creation() {
        let req = counter_add();
        assert_eq!(req.target_type(), "Counter");
        assert_eq!(req.method_name(), "add");
        assert_eq!(req.return_type(), "i64");
        assert_eq!(req.argument_types(), &["i64".to_string()]);
        assert_eq!(req.decode_target::<i64>().unwrap(), 10);
        assert_eq!(req.decode_argument::<i64>(0).unwrap(), 5);
        assert!(req.base_signature().is_none());
    }

    #[test]
    fn test_default_return_type_is_unit() {
        let req = InvocationRequest::builder(SerializerKind::Binary, "Log", "flush")
            .build()
            .unwrap();
        assert_eq!(req.return_type(), UNIT_TYPE);
        assert_eq!(req.signature().key(), "Log:flush()");
    }

    #[test]
    fn test_mismatched_arguments_rejected() {
        let result = InvocationRequest::builder(SerializerKind::Json, "Counter", "add")
            .arguments(vec!["i64".to_string(), "i64".to_string()], vec![b"1".to_vec()])
            .build();

        assert!(matches!(result, Err(DiffusiveError::InvalidRequest(_))));
    }

    #[test]
    fn test_more_values_than_types_rejected() {
        let result = InvocationRequest::builder(SerializerKind::Json, "Counter", "add")
            .arguments(vec![], vec![b"1".to_vec()])
            .build();

        assert!(matches!(result, Err(DiffusiveError::InvalidRequest(_))));
    }

    #[test]
    fn test_empty_method_rejected() {
        let result = InvocationRequest::builder(SerializerKind::Json, "Counter", "").build();
        assert!(matches!(result, Err(DiffusiveError::InvalidRequest(_))));
    }

    #[test]
    fn test_argument_index_out_of_range() {
        let req = counter_add();
        assert!(matches!(
            req.decode_argument::<i64>(3),
            Err(DiffusiveError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_with_base_signature_keeps_request_id() {
        let req = counter_add();
        let pinned = req.with_base_signature("Counter:add(i64)");
        assert_eq!(pinned.request_id(), req.request_id());
        assert_eq!(pinned.base_signature(), Some("Counter:add(i64)"));
        assert!(req.base_signature().is_none());
    }

    #[test]
    fn test_request_wire_form() {
        let req = counter_add();
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["serializer"], json!("json"));
        // blobs travel as base64 text
        assert!(value["target_value"].is_string());

        let decoded: InvocationRequest = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_mismatched_wire_request_rejected() {
        let mut value = serde_json::to_value(counter_add()).unwrap();
        value["argument_types"] = json!(["i64", "i64"]);

        let decoded: std::result::Result<InvocationRequest, _> = serde_json::from_value(value);
        assert!(decoded.is_err());
    }

    #[test]
    fn test_result_ok() {
        let result = InvocationResult::ok("r1", "i64", SerializerKind::Json.encode(&15i64).unwrap());
        assert!(result.is_ok());
        assert_eq!(result.status(), InvocationStatus::Ok);
        assert!(result.error_detail().is_none());
        assert_eq!(result.decode::<i64>(SerializerKind::Json).unwrap(), 15);
    }

    #[test]
    fn test_result_error() {
        let result = InvocationResult::error("r2", "i64", "boom");
        assert!(!result.is_ok());
        assert!(result.result_value().is_none());
        assert!(matches!(
            result.decode::<i64>(SerializerKind::Json),
            Err(DiffusiveError::TargetExecution(detail)) if detail == "boom"
        ));
    }

    #[test]
    fn test_result_wire_invariant() {
        let bad = json!({
            "request_id": "r3",
            "status": "ok",
            "result_type": "i64",
            "error_detail": "should not be here"
        });
        let decoded: std::result::Result<InvocationResult, _> = serde_json::from_value(bad);
        assert!(decoded.is_err());

        let good = serde_json::to_value(InvocationResult::error("r4", "()", "nope")).unwrap();
        assert!(good.get("result_value").is_none());
        let decoded: InvocationResult = serde_json::from_value(good).unwrap();
        assert_eq!(decoded.error_detail(), Some("nope"));
    }

    // ========================================================================
    // Request ID Stress Tests
    // ========================================================================

    #[test]
    fn test_request_id_uniqueness() {
        let ids: HashSet<_> = (0..1000).map(|_| counter_add().request_id().to_string()).collect();
        assert_eq!(ids.len(), 1000, "All request IDs should be unique");
    }

    #[test]
    fn test_request_id_uniqueness_under_stress() {
        use std::sync::{Arc, Mutex};
        use std::thread;

        let ids = Arc::new(Mutex::new(HashSet::new()));
        let mut handles = vec![];

        for _ in 0..10 {
            let ids = Arc::clone(&ids);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    let id = generate_request_id();
                    ids.lock().unwrap().insert(id);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ids.lock().unwrap().len(), 10_000);
    }

    #[test]
    fn test_request_id_is_path_safe() {
        let id = generate_request_id();
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
