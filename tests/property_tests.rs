//! Property tests for the portal's data plumbing.
//!
//! Runs on host (x86_64) only — proptest is not available for ESP32
//! targets.

#![cfg(not(target_os = "espidf"))]

use hearth::portal::body::{BodyAssembler, BodyError, BODY_MAX_BYTES};
use hearth::config::merge_json;
use proptest::prelude::*;

// ── Chunked body reassembly ───────────────────────────────────

/// Split `body` into consecutive chunks at the given cut fractions.
fn split_at_fractions(body: &[u8], fractions: &[f64]) -> Vec<(usize, Vec<u8>)> {
    let mut cuts: Vec<usize> = fractions
        .iter()
        .map(|f| ((body.len() as f64) * f) as usize)
        .collect();
    cuts.push(0);
    cuts.push(body.len());
    cuts.sort_unstable();
    cuts.dedup();

    cuts.windows(2)
        .map(|w| (w[0], body[w[0]..w[1]].to_vec()))
        .collect()
}

proptest! {
    /// For any body and any split into consecutive chunks, the
    /// reassembled buffer equals the original bytes, independent of
    /// chunk boundaries.
    #[test]
    fn reassembly_is_boundary_independent(
        body in proptest::collection::vec(any::<u8>(), 1..2048),
        fractions in proptest::collection::vec(0.0f64..1.0, 0..8),
    ) {
        let chunks = split_at_fractions(&body, &fractions);
        let total = body.len();

        let mut assembler = BodyAssembler::new();
        let mut result = None;
        for (index, chunk) in &chunks {
            let fed = assembler.feed(*index, chunk, total).unwrap();
            if let Some(complete) = fed {
                result = Some(complete);
            }
        }

        prop_assert_eq!(result.unwrap(), body);
    }

    /// A body whose declared total exceeds the cap is rejected on the
    /// first chunk and never buffered.
    #[test]
    fn oversized_totals_always_rejected(
        excess in 1usize..100_000,
        chunk in proptest::collection::vec(any::<u8>(), 0..64),
    ) {
        let total = BODY_MAX_BYTES + excess;
        let mut assembler = BodyAssembler::new();
        prop_assert_eq!(
            assembler.feed(0, &chunk, total),
            Err(BodyError::Oversized { total })
        );
        prop_assert!(!assembler.is_active());
    }
}

// ── Patch merge ───────────────────────────────────────────────

fn arb_json_leaf() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        any::<bool>().prop_map(serde_json::Value::from),
        any::<i64>().prop_map(serde_json::Value::from),
        "[a-z]{0,8}".prop_map(serde_json::Value::from),
    ]
}

fn arb_flat_object() -> impl Strategy<Value = serde_json::Value> {
    proptest::collection::btree_map("[a-e]", arb_json_leaf(), 0..5).prop_map(|map| {
        serde_json::Value::Object(map.into_iter().collect())
    })
}

proptest! {
    /// Disjoint patches accumulate: merging `a` then `b` onto an empty
    /// object yields the union when keys don't overlap.
    #[test]
    fn disjoint_patches_accumulate(
        a in arb_flat_object(),
        b in arb_flat_object(),
    ) {
        let a_keys: Vec<String> = a.as_object().unwrap().keys().cloned().collect();
        let b = {
            // Drop overlapping keys from b to make the patches disjoint.
            let mut object = b.as_object().unwrap().clone();
            for key in &a_keys {
                object.remove(key);
            }
            serde_json::Value::Object(object)
        };

        let mut merged = serde_json::json!({});
        merge_json(&mut merged, &a);
        merge_json(&mut merged, &b);

        let merged = merged.as_object().unwrap();
        for (key, value) in a.as_object().unwrap() {
            prop_assert_eq!(merged.get(key), Some(value));
        }
        for (key, value) in b.as_object().unwrap() {
            prop_assert_eq!(merged.get(key), Some(value));
        }
        prop_assert_eq!(
            merged.len(),
            a.as_object().unwrap().len() + b.as_object().unwrap().len()
        );
    }

    /// Reapplying the same patch is a no-op.
    #[test]
    fn merge_idempotent_on_reapplication(patch in arb_flat_object()) {
        let mut once = serde_json::json!({});
        merge_json(&mut once, &patch);
        let mut twice = once.clone();
        merge_json(&mut twice, &patch);
        prop_assert_eq!(once, twice);
    }

    /// The second patch wins on overlapping keys.
    #[test]
    fn overlapping_keys_take_latest_value(
        base in arb_flat_object(),
        patch in arb_flat_object(),
    ) {
        let mut merged = base.clone();
        merge_json(&mut merged, &patch);
        for (key, value) in patch.as_object().unwrap() {
            prop_assert_eq!(merged.get(key), Some(value));
        }
    }
}
