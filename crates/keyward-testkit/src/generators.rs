//! Proptest generators for property-based testing.

use proptest::prelude::*;

use keyward::{Action, Actions, Block, OrgId, Predicate, StreamId};

/// Generate any subset of actions.
pub fn actions() -> impl Strategy<Value = Actions> {
    prop::sample::subsequence(Action::ALL.to_vec(), 0..=Action::ALL.len())
        .prop_map(|picked| Actions::of(&picked))
}

/// Generate a predicate of any shape.
pub fn predicate() -> impl Strategy<Value = Predicate> {
    prop_oneof![
        actions().prop_map(Predicate::Has),
        actions().prop_map(Predicate::HasAny),
        Just(Predicate::Any),
    ]
}

/// Generate a slash-separated secret name.
pub fn secret_name() -> impl Strategy<Value = String> {
    "(/[a-z][a-z0-9_-]{0,15}){1,4}".prop_map(String::from)
}

/// Generate content bytes of at most `max_len`.
pub fn content(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate indices `0..len` for a single stream, in shuffled order, for
/// some `len` in `1..=max_len`.
pub fn shuffled_batch(max_len: u64) -> impl Strategy<Value = Vec<Block>> {
    (1..=max_len.max(1))
        .prop_flat_map(|len| Just((0..len).collect::<Vec<u64>>()).prop_shuffle())
        .prop_map(|indices| {
            let (org, stream) = (OrgId::generate(), StreamId::generate());
            indices
                .into_iter()
                .map(|index| Block {
                    org_id: org,
                    stream_id: stream,
                    index,
                    payload: index.to_le_bytes().to_vec().into(),
                })
                .collect()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward::core::validate_batch;

    proptest! {
        #[test]
        fn test_any_order_of_a_fresh_stream_is_accepted(batch in shuffled_batch(32)) {
            let (org, stream) = validate_batch(&batch, None).unwrap();
            prop_assert_eq!(org, batch[0].org_id);
            prop_assert_eq!(stream, batch[0].stream_id);
        }

        #[test]
        fn test_batch_overlapping_stored_tail_is_rejected(batch in shuffled_batch(32)) {
            prop_assert!(validate_batch(&batch, Some(0)).is_err());
        }

        #[test]
        fn test_has_any_matches_intersection(held in actions(), wanted in actions()) {
            let allowed = Predicate::HasAny(wanted).allows(held);
            prop_assert_eq!(allowed, held.has_any(wanted));
            prop_assert_eq!(allowed, wanted.flatten().iter().any(|a| held.flatten().contains(a)));
        }

        #[test]
        fn test_widening_held_keeps_predicates_true(p in predicate(), held in actions(), extra in actions()) {
            if p.allows(held) {
                prop_assert!(p.allows(held | extra));
            }
        }

        #[test]
        fn test_names_are_paths(name in secret_name()) {
            prop_assert!(name.starts_with('/'));
            prop_assert!(!name.ends_with('/'));
        }
    }
}
