//! Property-based tests for the pure parts of the domain model.

use proptest::prelude::*;

use datawise::domain::models::{
    AgentRegistry, ConversationState, DataRef, Message, UsageDelta,
};
use datawise::Fingerprint;

proptest! {
    /// The fingerprint is a pure function of the normalized query and the
    /// dataset identity.
    #[test]
    fn fingerprint_is_deterministic(query in ".{0,200}", name in "[a-z]{1,12}", version in "[a-z0-9]{1,8}") {
        let data = DataRef::new(name, version);
        let a = Fingerprint::compute(&query, Some(&data));
        let b = Fingerprint::compute(&query, Some(&data));
        prop_assert_eq!(a, b);
    }

    /// Leading/trailing whitespace and case never change the fingerprint.
    #[test]
    fn fingerprint_ignores_case_and_padding(query in "[a-zA-Z0-9 ]{1,100}") {
        let padded = format!("  {}  ", query.to_uppercase());
        prop_assert_eq!(
            Fingerprint::compute(&query, None),
            Fingerprint::compute(&padded, None)
        );
    }

    /// Distinct dataset versions produce distinct fingerprints.
    #[test]
    fn fingerprint_separates_dataset_versions(query in "[a-z ]{1,50}", v1 in "[0-9]{1,6}", v2 in "[0-9]{1,6}") {
        prop_assume!(v1 != v2);
        let a = Fingerprint::compute(&query, Some(&DataRef::new("data.csv", v1)));
        let b = Fingerprint::compute(&query, Some(&DataRef::new("data.csv", v2)));
        prop_assert_ne!(a, b);
    }

    /// At every observation point: round count equals the number of messages
    /// and cumulative cost equals the sum of per-message deltas.
    #[test]
    fn conversation_invariants_hold_after_every_append(costs in prop::collection::vec(0.0f64..5.0, 0..40)) {
        let registry = AgentRegistry::default_team();
        let mut state = ConversationState::new("prop".to_string(), "query".to_string(), None);
        let mut expected_cost = 0.0;

        for (i, cost) in costs.iter().enumerate() {
            let msg = Message::new(state.next_seq(), "Data_Analyzer", format!("turn {i}"))
                .with_usage(UsageDelta::new(1, 1, *cost));
            state.append_message(msg, &registry).unwrap();
            expected_cost += cost;

            prop_assert_eq!(state.round_count, (i + 1) as u64);
            prop_assert_eq!(state.round_count, state.messages.len() as u64);
            prop_assert!((state.cumulative_cost - expected_cost).abs() < 1e-9);
        }
    }

    /// Message sequence indices are exactly the insertion order.
    #[test]
    fn message_order_is_never_rearranged(n in 0usize..30) {
        let registry = AgentRegistry::default_team();
        let mut state = ConversationState::new("prop".to_string(), "query".to_string(), None);

        for i in 0..n {
            let msg = Message::new(state.next_seq(), "Data_Analyzer", format!("turn {i}"));
            state.append_message(msg, &registry).unwrap();
        }

        for (i, msg) in state.messages.iter().enumerate() {
            prop_assert_eq!(msg.seq, i as u64);
        }
    }
}
