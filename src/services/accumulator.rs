use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::metrics::MetricsSink;
use crate::models::{ProcessKey, StaleProcessEntry};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    /// 成功删除的进程数
    pub deleted: usize,
    /// 删除失败、留待下次 flush 的进程数
    pub failed: usize,
}

/// 累积已消失的进程，等待批量删除其 metrics
///
/// 以 pid 为键，重复的 pid 覆盖旧值。
/// pid 被复用后以新名字再次消失时，旧名字的条目移入 `displaced`，仍会在 flush 时删除。
#[derive(Debug, Default)]
pub struct StaleAccumulator {
    entries: BTreeMap<u64, (String, u64)>,
    displaced: Vec<StaleProcessEntry>,
    flush_threshold: usize,
}

impl StaleAccumulator {
    pub fn new(flush_threshold: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            displaced: Vec::new(),
            flush_threshold,
        }
    }

    pub fn accumulate(&mut self, stale: impl IntoIterator<Item = StaleProcessEntry>) {
        for entry in stale {
            self.displaced
                .retain(|old| !(old.pid == entry.pid && old.name == entry.name));

            let previous = self.entries.insert(entry.pid, (entry.name, entry.stop_time));
            if let Some((name, stop_time)) = previous {
                let current = &self.entries[&entry.pid].0;
                if name != *current {
                    log::debug!("PID {} reused: {} -> {}, keeping both for deletion", entry.pid, name, current);
                    self.displaced.push(StaleProcessEntry {
                        pid: entry.pid,
                        name,
                        stop_time,
                    });
                }
            }
        }
    }

    /// 移除重新出现在本周期观测中的进程，避免删除仍在运行进程的 metrics
    pub fn forget_present(&mut self, current: &HashSet<ProcessKey>) {
        self.entries
            .retain(|pid, (name, _)| !current.contains(&ProcessKey::new(*pid, name.as_str())));
        self.displaced
            .retain(|entry| !current.contains(&ProcessKey::new(entry.pid, entry.name.as_str())));
    }

    pub fn len(&self) -> usize {
        self.entries.len() + self.displaced.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.displaced.is_empty()
    }

    pub fn exceeds_threshold(&self) -> bool {
        self.len() > self.flush_threshold
    }

    /// 按 (pid, name) 排序的快照
    pub fn entries(&self) -> Vec<StaleProcessEntry> {
        let mut entries: Vec<StaleProcessEntry> = self
            .entries
            .iter()
            .map(|(pid, (name, stop_time))| StaleProcessEntry {
                pid: *pid,
                name: name.clone(),
                stop_time: *stop_time,
            })
            .chain(self.displaced.iter().cloned())
            .collect();
        entries.sort_by(|a, b| (a.pid, &a.name).cmp(&(b.pid, &b.name)));
        entries
    }

    /// 逐个删除累积进程的 metrics，失败的条目保留到下次 flush
    pub fn flush(&mut self, sink: &dyn MetricsSink) -> FlushReport {
        let mut report = FlushReport::default();

        self.entries
            .retain(|pid, (name, stop_time)| !delete_one(sink, *pid, name, *stop_time, &mut report));
        self.displaced
            .retain(|entry| !delete_one(sink, entry.pid, &entry.name, entry.stop_time, &mut report));

        report
    }
}

// 删除成功返回 true
fn delete_one(sink: &dyn MetricsSink, pid: u64, name: &str, stop_time: u64, report: &mut FlushReport) -> bool {
    match sink.delete_process(pid, name) {
        Ok(()) => {
            log::debug!("Deleted metrics of PID {} ({}), stopped around {}", pid, name, stop_time);
            report.deleted += 1;
            true
        }
        Err(e) => {
            log::warn!("Failed to delete metrics of PID {} ({}): {:#}", pid, name, e);
            report.failed += 1;
            false
        }
    }
}
