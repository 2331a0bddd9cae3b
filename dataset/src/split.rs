use std::collections::BTreeMap;

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::{Error, Result};

/// Seeded, stratified train/test split.
///
/// Items are grouped by `label`; each group is shuffled and
/// `round(len * test_fraction)` of it goes to the test side. The same seed
/// always yields the same split.
pub fn train_test_split<T, K: Ord>(
    items: Vec<T>,
    label: impl Fn(&T) -> K,
    test_fraction: f64,
    seed: u64,
) -> Result<(Vec<T>, Vec<T>)> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(Error::InvalidTestFraction(test_fraction));
    }

    let mut groups: BTreeMap<K, Vec<T>> = BTreeMap::new();
    for item in items {
        groups.entry(label(&item)).or_default().push(item);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();
    for (_, mut group) in groups {
        group.shuffle(&mut rng);
        let n_test = ((group.len() as f64 * test_fraction).round() as usize).min(group.len());
        let rest = group.split_off(n_test);
        test.extend(group);
        train.extend(rest);
    }

    train.shuffle(&mut rng);
    test.shuffle(&mut rng);
    Ok((train, test))
}
