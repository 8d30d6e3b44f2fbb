use crate::queue::QueueStore;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShuffleOutcome {
    Shuffled,
    Restored,
    Diverged,
}

pub fn fisher_yates<T, R>(items: &mut [T], rng: &mut R)
where
    R: Rng + ?Sized,
{
    for i in (1..items.len()).rev() {
        let j = rng.random_range(0..=i);
        items.swap(i, j);
    }
}

pub fn toggle<R>(store: &mut QueueStore, rng: &mut R) -> ShuffleOutcome
where
    R: Rng + ?Sized,
{
    if store.is_shuffled() {
        unshuffle(store)
    } else {
        shuffle(store, rng);
        ShuffleOutcome::Shuffled
    }
}

fn shuffle<R>(store: &mut QueueStore, rng: &mut R)
where
    R: Rng + ?Sized,
{
    let active = store.current_key();
    let mut order = store.entries.clone();
    fisher_yates(&mut order, rng);

    if let Some(key) = active
        && let Some(pos) = order.iter().position(|entry| entry.key == key)
    {
        let entry = order.remove(pos);
        order.insert(0, entry);
    }

    store.original = Some(std::mem::replace(&mut store.entries, order));
    store.current = active.map(|_| 0);
}

fn unshuffle(store: &mut QueueStore) -> ShuffleOutcome {
    let Some(original) = store.original.take() else {
        return ShuffleOutcome::Restored;
    };

    let mut expected: Vec<_> = store.entries.iter().map(|entry| entry.key).collect();
    let mut retained: Vec<_> = original.iter().map(|entry| entry.key).collect();
    expected.sort_unstable();
    retained.sort_unstable();
    if expected != retained {
        tracing::warn!(
            queued = expected.len(),
            retained = retained.len(),
            "original order diverged from shuffled queue; keeping current order"
        );
        return ShuffleOutcome::Diverged;
    }

    let active = store.current_key();
    store.entries = original;
    store.relocate_current(active);
    ShuffleOutcome::Restored
}
