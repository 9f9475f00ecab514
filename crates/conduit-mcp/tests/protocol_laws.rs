//! Property tests for the wire-level laws: request-id round-trip
//! fidelity and pagination-cursor opacity.

use conduit_mcp::protocol::{Cursor, JsonRpcMessage, RequestId};
use proptest::prelude::*;

proptest! {
    /// Numeric ids survive the wire as numbers.
    #[test]
    fn numeric_request_ids_round_trip(id in any::<i64>()) {
        let original = RequestId::new_number(id);
        let wire = serde_json::to_string(&original).unwrap();
        let parsed: RequestId = serde_json::from_str(&wire).unwrap();
        prop_assert!(matches!(parsed, RequestId::Number(_)));
        prop_assert_eq!(original, parsed);
    }

    /// String ids survive the wire as strings, even all-digit ones.
    #[test]
    fn string_request_ids_round_trip(id in "[a-zA-Z0-9_-]{1,32}") {
        let original = RequestId::new_string(id.clone());
        let wire = serde_json::to_string(&original).unwrap();
        let parsed: RequestId = serde_json::from_str(&wire).unwrap();
        prop_assert_eq!(&parsed, &original);
        prop_assert!(matches!(parsed, RequestId::String(_)));
        // The string variant never collapses into the numeric one.
        prop_assert_ne!(parsed, RequestId::new_number(0));
    }

    /// A string id made of digits stays distinct from the same number.
    #[test]
    fn digit_strings_and_numbers_stay_distinct(n in 0i64..1_000_000) {
        let string_id = RequestId::new_string(n.to_string());
        let numeric_id = RequestId::new_number(n);
        prop_assert_ne!(&string_id, &numeric_id);

        let wire = serde_json::to_string(&string_id).unwrap();
        let parsed: RequestId = serde_json::from_str(&wire).unwrap();
        prop_assert_eq!(parsed, string_id);
    }

    /// Cursors decode back to the index they encoded.
    #[test]
    fn cursors_round_trip(index in 0usize..10_000_000) {
        let cursor = Cursor::from_index(index);
        prop_assert_eq!(cursor.to_index().unwrap(), index);
    }

    /// A request with any id round-trips through the message sum type.
    #[test]
    fn request_messages_round_trip(id in any::<i64>(), method in "[a-z/]{1,24}") {
        let message = JsonRpcMessage::request(method, None, RequestId::new_number(id));
        let wire = serde_json::to_string(&message).unwrap();
        let parsed: JsonRpcMessage = serde_json::from_str(&wire).unwrap();
        prop_assert_eq!(message, parsed);
    }
}
