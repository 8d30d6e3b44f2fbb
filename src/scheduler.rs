use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    CrossfadeTick,
    ProgressReport,
    SnapshotSave,
}

#[derive(Debug, Clone)]
struct ScheduledTask {
    id: TaskId,
    kind: TimerKind,
    due_ms: u64,
    period_ms: u64,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    now_ms: u64,
    next_id: u64,
    tasks: Vec<ScheduledTask>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn schedule_repeating(&mut self, kind: TimerKind, period: Duration) -> TaskId {
        let period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX).max(1);
        self.next_id += 1;
        let id = TaskId(self.next_id);
        self.tasks.push(ScheduledTask {
            id,
            kind,
            due_ms: self.now_ms.saturating_add(period_ms),
            period_ms,
        });
        id
    }

    pub fn cancel(&mut self, id: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.id != id);
        self.tasks.len() != before
    }

    pub fn is_scheduled(&self, id: TaskId) -> bool {
        self.tasks.iter().any(|task| task.id == id)
    }

    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    pub fn pop_due(&mut self, until_ms: u64) -> Option<(TaskId, TimerKind)> {
        let task = self
            .tasks
            .iter_mut()
            .filter(|task| task.due_ms <= until_ms)
            .min_by_key(|task| (task.due_ms, task.id))?;

        self.now_ms = self.now_ms.max(task.due_ms);
        task.due_ms = task.due_ms.saturating_add(task.period_ms);
        Some((task.id, task.kind))
    }

    pub fn settle(&mut self, until_ms: u64) {
        self.now_ms = self.now_ms.max(until_ms);
    }
}

#[derive(Debug, Default)]
pub struct TimerSlot {
    armed: Option<TaskId>,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, scheduler: &mut Scheduler, kind: TimerKind, period: Duration) -> TaskId {
        self.cancel(scheduler);
        let id = scheduler.schedule_repeating(kind, period);
        self.armed = Some(id);
        id
    }

    pub fn cancel(&mut self, scheduler: &mut Scheduler) -> bool {
        match self.armed.take() {
            Some(id) => scheduler.cancel(id),
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    pub fn owns(&self, id: TaskId) -> bool {
        self.armed == Some(id)
    }
}
