use crate::model::DropPosition;
use crate::queue::QueueStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReorderPlan {
    pub insert_at: usize,
    pub current: Option<usize>,
}

pub fn plan(
    from: usize,
    to: usize,
    drop: DropPosition,
    current: Option<usize>,
) -> ReorderPlan {
    let mut insert_at = match drop {
        DropPosition::After => to + 1,
        DropPosition::Before => to,
    };
    if from < insert_at {
        insert_at -= 1;
    }

    let current = current.map(|current| {
        let mut adjusted = if from < current { current - 1 } else { current };
        if from > current && insert_at <= adjusted {
            adjusted += 1;
        }
        adjusted
    });

    ReorderPlan { insert_at, current }
}

pub fn apply(store: &mut QueueStore, from: usize, to: usize, drop: DropPosition) -> bool {
    let len = store.len();
    if from >= len || to >= len || Some(from) == store.current_index() {
        return false;
    }

    let active = store.current_key();
    let plan = plan(from, to, drop, store.current_index());

    let moved = store.entries.remove(from);
    let insert_at = plan.insert_at.min(store.entries.len());
    store.entries.insert(insert_at, moved);
    store.relocate_current(active);

    if store.current_index() != plan.current {
        tracing::debug!(
            from,
            to,
            predicted = ?plan.current,
            actual = ?store.current_index(),
            "reorder arithmetic disagreed with active entry lookup"
        );
    }
    true
}
