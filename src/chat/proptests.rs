//! Property-based tests for keyword matching and the responder's
//! keyword path:
//! - A trigger is found regardless of case or surrounding text
//! - Keyword replies never depend on history and never reach the service

use super::{match_keyword, ChatResponder, ConversationTurn, KEYWORD_RULES};
use crate::llm::testing::MockLlmService;
use proptest::prelude::*;
use std::sync::Arc;

/// Index into the keyword table
fn arb_rule_index() -> impl Strategy<Value = usize> {
    0..KEYWORD_RULES.len()
}

/// Filler that cannot contain any trigger
fn arb_filler() -> impl Strategy<Value = String> {
    "[0-9 ,.!?-]{0,20}"
}

/// Apply a per-character case mask to `s`
fn recase(s: &str, mask: &[bool]) -> String {
    s.chars()
        .zip(mask.iter().cycle())
        .map(|(c, upper)| {
            if *upper {
                c.to_uppercase().collect::<String>()
            } else {
                c.to_string()
            }
        })
        .collect()
}

fn arb_history() -> impl Strategy<Value = Vec<ConversationTurn>> {
    proptest::collection::vec(
        (any::<bool>(), "[a-zA-Z0-9 ?]{0,40}").prop_map(|(user, text)| {
            if user {
                ConversationTurn::user(text)
            } else {
                ConversationTurn::assistant(text)
            }
        }),
        0..6,
    )
}

proptest! {
    #[test]
    fn prop_trigger_matches_in_any_case(
        index in arb_rule_index(),
        prefix in arb_filler(),
        suffix in arb_filler(),
        mask in proptest::collection::vec(any::<bool>(), 1..8),
    ) {
        let rule = &KEYWORD_RULES[index];
        let message = format!("{prefix}{}{suffix}", recase(rule.trigger, &mask));

        let matched = match_keyword(KEYWORD_RULES, &message);
        prop_assert!(matched.is_some(), "no match for {:?}", message);
        prop_assert_eq!(matched.unwrap().reply, rule.reply);
    }

    #[test]
    fn prop_filler_alone_never_matches(text in arb_filler()) {
        prop_assert!(match_keyword(KEYWORD_RULES, &text).is_none());
    }

    #[test]
    fn prop_keyword_reply_independent_of_history(
        index in arb_rule_index(),
        history in arb_history(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let mock = Arc::new(MockLlmService::new());
        let responder = ChatResponder::new(mock.clone());
        let rule = &KEYWORD_RULES[index];
        let message = format!("Tell me about {}", rule.trigger.to_uppercase());

        let reply = runtime.block_on(responder.respond(&history, &message));

        prop_assert_eq!(reply.as_str(), rule.reply);
        prop_assert_eq!(mock.call_count(), 0);
    }
}
