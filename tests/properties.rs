//! Property tests for topic matching, payload decoding and change gating.

use alarm_bridge::host::{Capability, RecordingHost};
use alarm_bridge::mqtt::payload::{decode_level, falsy, truthy};
use alarm_bridge::mqtt::topic;
use alarm_bridge::panel::emitter::{set_and_emit, Notifier};
use proptest::prelude::*;

fn segment() -> impl Strategy<Value = String> {
    "[a-z0-9_.$()*?]{1,6}"
}

fn topic_segments() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec(segment(), 1..6)
}

// ── topic matching ───────────────────────────────────────────

proptest! {
    /// Without wildcards a pattern is a plain string comparison.
    #[test]
    fn literal_pattern_matches_only_itself(
        topic in topic_segments(),
        pattern in topic_segments(),
    ) {
        let topic = topic.join("/");
        let pattern = pattern.join("/");
        prop_assert_eq!(topic::matches(&topic, Some(pattern.as_str())), topic == pattern);
        prop_assert!(topic::matches(&topic, Some(topic.as_str())));
    }

    /// `+` consumes exactly one segment; everything else compares literally.
    #[test]
    fn single_level_wildcard_matches_by_segment(
        topic in topic_segments(),
        pattern in proptest::collection::vec(
            prop_oneof![Just("+".to_string()), segment()],
            1..6,
        ),
    ) {
        let expected = topic.len() == pattern.len()
            && topic.iter().zip(&pattern).all(|(t, p)| p == "+" || t == p);
        prop_assert_eq!(
            topic::matches(&topic.join("/"), Some(pattern.join("/").as_str())),
            expected
        );
    }

    /// A trailing `#` accepts any non-empty remainder under its prefix.
    #[test]
    fn multi_level_wildcard_matches_any_suffix(
        prefix in topic_segments(),
        suffix in topic_segments(),
    ) {
        let pattern = format!("{}/#", prefix.join("/"));
        let topic = format!("{}/{}", prefix.join("/"), suffix.join("/"));
        prop_assert!(topic::matches(&topic, Some(pattern.as_str())));
    }

    /// Nothing matches an absent or empty pattern.
    #[test]
    fn empty_pattern_never_matches(topic in topic_segments()) {
        let topic = topic.join("/");
        prop_assert!(!topic::matches(&topic, None));
        prop_assert!(!topic::matches(&topic, Some("")));
    }
}

// ── payload decoding ─────────────────────────────────────────

proptest! {
    #[test]
    fn truthy_and_falsy_are_disjoint(text in "\\PC{0,12}") {
        prop_assert!(!(truthy(&text) && falsy(&text)));
    }

    #[test]
    fn level_always_lands_in_range(value in proptest::num::f64::ANY) {
        if let Some(level) = decode_level(&value.to_string()) {
            prop_assert!((0.0..=100.0).contains(&level));
        }
    }
}

// ── change gating ────────────────────────────────────────────

proptest! {
    /// The host hears about a value exactly when it differs from the last one.
    #[test]
    fn emitter_notifies_once_per_distinct_change(
        values in proptest::collection::vec(proptest::option::of(any::<bool>()), 0..32),
    ) {
        let host = RecordingHost::new();
        let notifier = Notifier::new(&host, "sensor:p", "P");
        let mut slot: Option<bool> = None;

        let mut expected = 0;
        let mut last: Option<bool> = None;
        for value in values {
            if value != last {
                expected += 1;
                last = value;
            }
            set_and_emit(&mut slot, value, &notifier, Capability::Online);
        }

        prop_assert_eq!(slot, last);
        prop_assert_eq!(host.notifications("sensor:p", Capability::Online).len(), expected);
    }
}
