use std::collections::BTreeMap;

/// Partition `items` by `key_fn`, preserving input order inside each bucket.
/// Buckets come back ordered by key.
pub fn group_by_key<'a, T, K, F>(
    items: impl IntoIterator<Item = &'a T>,
    key_fn: F,
) -> BTreeMap<K, Vec<&'a T>>
where
    T: 'a,
    K: Ord,
    F: Fn(&T) -> K,
{
    let mut groups: BTreeMap<K, Vec<&T>> = BTreeMap::new();
    for item in items {
        groups.entry(key_fn(item)).or_default().push(item);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_by_key_partitions_in_order() {
        let words = ["apple", "avocado", "banana", "blueberry", "cherry"];
        let groups = group_by_key(words.iter(), |w| w.chars().next());

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[&Some('a')], vec![&"apple", &"avocado"]);
        assert_eq!(groups[&Some('b')], vec![&"banana", &"blueberry"]);
        assert_eq!(groups[&Some('c')], vec![&"cherry"]);
    }
}
