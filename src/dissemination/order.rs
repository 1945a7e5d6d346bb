//! Priority ordering of a batch's products.

use std::collections::HashMap;

/// Order `items` by the position of their PIL in `priority`.
///
/// Items whose PIL is not configured follow all configured ones in their
/// original relative order; their PILs are returned, deduplicated, as
/// missing-from-configuration.
pub fn order_by_priority<T, F>(items: Vec<T>, priority: &[String], pil: F) -> (Vec<T>, Vec<String>)
where
    F: Fn(&T) -> &str,
{
    let rank: HashMap<&str, usize> = priority
        .iter()
        .enumerate()
        .map(|(i, p)| (p.as_str(), i))
        .collect();

    let mut missing: Vec<String> = Vec::new();
    for item in &items {
        let code = pil(item);
        if !rank.contains_key(code) && !missing.iter().any(|m| m == code) {
            missing.push(code.to_string());
        }
    }

    let mut keyed: Vec<(usize, T)> = items
        .into_iter()
        .map(|item| {
            let key = rank.get(pil(&item)).copied().unwrap_or(usize::MAX);
            (key, item)
        })
        .collect();
    // stable: equal keys keep their input order
    keyed.sort_by_key(|(key, _)| *key);
    (keyed.into_iter().map(|(_, item)| item).collect(), missing)
}
