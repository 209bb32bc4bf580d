use std::collections::HashSet;

use crate::models::{ProcessKey, ProcessRecord, StaleProcessEntry};

/// 对比上一周期与本周期的进程集合
///
/// 返回新的进程集合，以及上一周期存在、本周期消失的进程。
/// `stop_time` 为所有消失进程共用的估计退出时间。
pub fn reconcile(
    previous: &HashSet<ProcessKey>,
    current: &[ProcessRecord],
    stop_time: u64,
) -> (HashSet<ProcessKey>, Vec<StaleProcessEntry>) {
    let current_set: HashSet<ProcessKey> = current.iter().map(ProcessRecord::key).collect();

    let mut stale: Vec<StaleProcessEntry> = previous
        .difference(&current_set)
        .map(|key| StaleProcessEntry {
            pid: key.pid,
            name: key.name.clone(),
            stop_time,
        })
        .collect();
    // HashSet 迭代顺序不固定
    stale.sort_by(|a, b| (a.pid, &a.name).cmp(&(b.pid, &b.name)));

    (current_set, stale)
}

/// 持有上一周期的进程集合
#[derive(Debug, Default)]
pub struct Reconciler {
    known: HashSet<ProcessKey>,
    stop_offset: u64,
}

impl Reconciler {
    pub fn new(stop_offset: u64) -> Self {
        Self {
            known: HashSet::new(),
            stop_offset,
        }
    }

    /// 执行一次对比并用本周期的集合替换已知集合
    pub fn reconcile(&mut self, current: &[ProcessRecord], now: u64) -> Vec<StaleProcessEntry> {
        let stop_time = now.saturating_sub(self.stop_offset);
        let (updated, stale) = reconcile(&self.known, current, stop_time);
        self.known = updated;
        stale
    }

    pub fn known(&self) -> &HashSet<ProcessKey> {
        &self.known
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pid: u64, name: &str) -> ProcessRecord {
        ProcessRecord {
            pid,
            name: name.to_string(),
            start_time: 0,
            cpu_utilization: 0.0,
            memory_utilization: 0.0,
            cpu_usage_user: 0,
            cpu_usage_system: 0,
        }
    }

    fn set(keys: &[(u64, &str)]) -> HashSet<ProcessKey> {
        keys.iter().map(|(pid, name)| ProcessKey::new(*pid, *name)).collect()
    }

    fn stale_keys(stale: &[StaleProcessEntry]) -> HashSet<ProcessKey> {
        stale.iter().map(|e| ProcessKey::new(e.pid, e.name.as_str())).collect()
    }

    #[test]
    fn test_first_observation_has_no_stale() {
        let (updated, stale) = reconcile(&HashSet::new(), &[record(1, "a"), record(2, "b")], 0);
        assert_eq!(updated, set(&[(1, "a"), (2, "b")]));
        assert!(stale.is_empty());
    }

    #[test]
    fn test_disappeared_process_is_stale() {
        let previous = set(&[(1, "a"), (2, "b")]);
        let (updated, stale) = reconcile(&previous, &[record(1, "a")], 100);
        assert_eq!(updated, set(&[(1, "a")]));
        assert_eq!(
            stale,
            vec![StaleProcessEntry {
                pid: 2,
                name: "b".to_string(),
                stop_time: 100,
            }]
        );
    }

    #[test]
    fn test_empty_observation_marks_everything_stale() {
        let (updated, stale) = reconcile(&set(&[(1, "a")]), &[], 0);
        assert!(updated.is_empty());
        assert_eq!(stale_keys(&stale), set(&[(1, "a")]));
    }

    #[test]
    fn test_same_set_is_idempotent() {
        let current = [record(3, "c"), record(1, "a"), record(2, "b")];
        let previous = set(&[(1, "a"), (2, "b"), (3, "c")]);
        let (updated, stale) = reconcile(&previous, &current, 0);
        assert_eq!(updated, previous);
        assert!(stale.is_empty());
    }

    #[test]
    fn test_result_ignores_observation_order() {
        let previous = set(&[(1, "a"), (2, "b"), (3, "c"), (4, "d")]);
        let forward = [record(1, "a"), record(5, "e"), record(3, "c")];
        let backward = [record(3, "c"), record(5, "e"), record(1, "a")];

        let (u1, s1) = reconcile(&previous, &forward, 7);
        let (u2, s2) = reconcile(&previous, &backward, 7);
        assert_eq!(u1, u2);
        assert_eq!(s1, s2);
        assert_eq!(stale_keys(&s1), set(&[(2, "b"), (4, "d")]));
    }

    #[test]
    fn test_reused_pid_with_new_name_is_stale_under_old_name() {
        let (updated, stale) = reconcile(&set(&[(7, "old")]), &[record(7, "new")], 0);
        assert_eq!(updated, set(&[(7, "new")]));
        assert_eq!(stale_keys(&stale), set(&[(7, "old")]));
    }

    #[test]
    fn test_reconciler_carries_state_between_cycles() {
        let mut reconciler = Reconciler::new(10);

        assert!(reconciler.reconcile(&[record(1, "a"), record(2, "b")], 1_000).is_empty());

        let stale = reconciler.reconcile(&[record(1, "a")], 1_010);
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].pid, 2);
        assert_eq!(stale[0].stop_time, 1_000);
        assert_eq!(reconciler.known(), &set(&[(1, "a")]));

        // 已报告过的进程不会再次出现
        assert!(reconciler.reconcile(&[record(1, "a")], 1_020).is_empty());
    }

    #[test]
    fn test_stop_time_saturates() {
        let mut reconciler = Reconciler::new(10);
        reconciler.reconcile(&[record(1, "a")], 0);
        let stale = reconciler.reconcile(&[], 5);
        assert_eq!(stale[0].stop_time, 0);
    }
}
