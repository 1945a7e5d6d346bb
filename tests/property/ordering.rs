//! Priority ordering is a stable sort keyed by priority-table position.

use hazprod::dissemination::order_by_priority;
use proptest::prelude::*;

const TABLE: &[&str] = &["FFW", "FLW", "FFS", "FLS"];
const CODES: &[&str] = &["FFW", "FLW", "FFS", "FLS", "SVR", "XYZ"];

fn rank(code: &str) -> usize {
    TABLE.iter().position(|c| *c == code).unwrap_or(usize::MAX)
}

proptest! {
    #[test]
    fn ordering_is_a_stable_permutation(picks in prop::collection::vec(0..CODES.len(), 0..40)) {
        let priority: Vec<String> = TABLE.iter().map(|c| c.to_string()).collect();
        let items: Vec<(&str, usize)> = picks.iter().enumerate().map(|(i, p)| (CODES[*p], i)).collect();

        let (ordered, missing) = order_by_priority(items.clone(), &priority, |item: &(&str, usize)| item.0);

        prop_assert_eq!(ordered.len(), items.len());
        for pair in ordered.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            prop_assert!(rank(a.0) <= rank(b.0));
            if rank(a.0) == rank(b.0) {
                prop_assert!(a.1 < b.1, "equal ranks must keep input order");
            }
        }

        let mut expected_missing: Vec<String> = Vec::new();
        for (code, _) in &items {
            if rank(code) == usize::MAX && !expected_missing.iter().any(|m| m == code) {
                expected_missing.push(code.to_string());
            }
        }
        prop_assert_eq!(missing, expected_missing);
    }

    #[test]
    fn ordering_twice_changes_nothing(picks in prop::collection::vec(0..CODES.len(), 0..40)) {
        let priority: Vec<String> = TABLE.iter().map(|c| c.to_string()).collect();
        let items: Vec<&str> = picks.iter().map(|p| CODES[*p]).collect();
        let (once, _) = order_by_priority(items, &priority, |c: &&str| *c);
        let (twice, _) = order_by_priority(once.clone(), &priority, |c: &&str| *c);
        prop_assert_eq!(once, twice);
    }
}
