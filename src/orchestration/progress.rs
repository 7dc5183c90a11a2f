//! Whole-batch progress board.
//!
//! Supervisors send individual [`ProgressRecord`]s; the board keeps the latest
//! record per task index and hands out full [`BatchSnapshot`]s, so a consumer
//! that skips intermediate snapshots still converges on the final state.

use super::types::{BatchMode, BatchSnapshot, ProgressRecord, TaskSpec};

#[derive(Debug)]
pub struct ProgressBoard {
    mode: BatchMode,
    records: Vec<ProgressRecord>,
}

impl ProgressBoard {
    /// A board with every task queued.
    pub fn new(mode: BatchMode, tasks: &[TaskSpec]) -> Self {
        let records = tasks
            .iter()
            .enumerate()
            .map(|(index, task)| ProgressRecord::queued(index, task.agent_name.clone()))
            .collect();
        Self { mode, records }
    }

    /// Record an update. Returns `false` (and keeps the old record) when the
    /// index is unknown or the update would move the task's status backwards
    /// or out of a terminal state.
    pub fn apply(&mut self, record: ProgressRecord) -> bool {
        let Some(current) = self.records.get_mut(record.task_index) else {
            tracing::debug!(task_index = record.task_index, "Progress for unknown task index");
            return false;
        };
        if current.status.is_terminal() || record.status < current.status {
            return false;
        }
        *current = record;
        true
    }

    pub fn snapshot(&self) -> BatchSnapshot {
        BatchSnapshot {
            mode: self.mode,
            tasks: self.records.clone(),
        }
    }

    pub fn into_records(self) -> Vec<ProgressRecord> {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::types::TaskStatus;

    fn board() -> ProgressBoard {
        ProgressBoard::new(
            BatchMode::Parallel,
            &[TaskSpec::new("a", "x"), TaskSpec::new("b", "y")],
        )
    }

    fn record(index: usize, status: TaskStatus, tools: u64) -> ProgressRecord {
        ProgressRecord {
            status,
            tool_call_count: tools,
            ..ProgressRecord::queued(index, "a")
        }
    }

    #[test]
    fn starts_with_every_task_queued() {
        let snapshot = board().snapshot();
        assert_eq!(snapshot.mode, BatchMode::Parallel);
        assert_eq!(snapshot.tasks.len(), 2);
        assert!(snapshot.tasks.iter().all(|t| t.status == TaskStatus::Queued));
        assert_eq!(snapshot.tasks[1].agent_name, "b");
    }

    #[test]
    fn running_updates_replace_each_other() {
        let mut board = board();
        assert!(board.apply(record(0, TaskStatus::Running, 1)));
        assert!(board.apply(record(0, TaskStatus::Running, 2)));
        assert_eq!(board.snapshot().tasks[0].tool_call_count, 2);
    }

    #[test]
    fn status_never_moves_backwards() {
        let mut board = board();
        assert!(board.apply(record(1, TaskStatus::Completed, 3)));
        assert!(!board.apply(record(1, TaskStatus::Running, 4)));
        assert!(!board.apply(record(1, TaskStatus::Failed, 4)));

        let tasks = board.into_records();
        assert_eq!(tasks[1].status, TaskStatus::Completed);
        assert_eq!(tasks[1].tool_call_count, 3);
    }

    #[test]
    fn out_of_range_index_is_ignored() {
        let mut board = board();
        assert!(!board.apply(record(7, TaskStatus::Running, 0)));
    }
}
