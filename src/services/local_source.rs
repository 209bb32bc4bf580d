use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use sysinfo::{ProcessesToUpdate, System};
use tokio::time::{sleep_until, Instant};

use crate::models::{LoadAverage, Notification, OverallUtilization, RawProcessTuple};
use crate::services::observation::ObservationSource;

/// 采样本机进程表，生成与网元通知相同结构的数据
///
/// 每个周期依次产生进程统计、负载均值、整体 CPU/内存 三条通知，
/// 采样间隔随系统负载调整
pub struct LocalSource {
    system: System,
    cadence: AdaptiveInterval,
    next_sample: Instant,
    pending: VecDeque<Notification>,
}

/// 根据负载均值伸缩的采样间隔
///
/// - 负载上升且每 CPU 负载超过 1：比上次更高时 ×1.5，否则 ×1.15
/// - 负载上升但未过载：÷1.5
/// - 负载下降：恢复为基础间隔
///
/// 结果限制在基础间隔的 1/4 到 4 倍之间。
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveInterval {
    base: Duration,
    current: Duration,
    prev_demand: f64,
}

impl AdaptiveInterval {
    const MIN_FACTOR: u32 = 4;
    const MAX_FACTOR: u32 = 4;

    pub fn new(base: Duration) -> Self {
        Self {
            base,
            current: base,
            prev_demand: 0.0,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn adapt(&mut self, load: &LoadAverage, cpu_count: usize) -> Duration {
        let rising = load.one > load.five || load.one > load.fifteen;

        let next = if rising {
            let demand = load.one / cpu_count.max(1) as f64;
            if demand > 1.0 {
                let factor = if demand > self.prev_demand { 1.5 } else { 1.15 };
                self.prev_demand = demand;
                self.current.mul_f64(factor)
            } else {
                self.current.div_f64(1.5)
            }
        } else {
            self.base
        };

        self.current = next.clamp(self.base / Self::MIN_FACTOR, self.base * Self::MAX_FACTOR);
        self.current
    }
}

impl LocalSource {
    pub fn new(period: Duration) -> Self {
        Self {
            system: System::new_all(),
            cadence: AdaptiveInterval::new(period),
            next_sample: Instant::now(),
            pending: VecDeque::new(),
        }
    }

    fn sample(&mut self) {
        self.system.refresh_memory();
        self.system.refresh_processes(ProcessesToUpdate::All, true);

        let total_memory = self.system.total_memory();
        let mut processes: Vec<_> = self
            .system
            .processes()
            .values()
            .filter(|process| process.thread_kind().is_none())
            .collect();
        // CPU 使用率降序
        processes.sort_by(|a, b| b.cpu_usage().total_cmp(&a.cpu_usage()));

        let mut total_cpu = 0.0;
        let mut total_memory_percent = 0.0;
        let mut tuples = Vec::with_capacity(processes.len());

        for process in processes {
            let pid = process.pid().as_u32();
            let cpu_utilization = process.cpu_usage() as f64;
            let memory_utilization = if total_memory > 0 {
                (process.memory() as f64 / total_memory as f64) * 100.0
            } else {
                0.0
            };
            let (user, system) = read_cpu_times(pid);

            total_cpu += cpu_utilization;
            total_memory_percent += memory_utilization;

            tuples.push(RawProcessTuple(vec![
                pid.to_string(),
                process.name().to_string_lossy().into_owned(),
                process.run_time().to_string(),
                user.to_string(),
                system.to_string(),
                format!("{:.2}", cpu_utilization),
                format!("{:.2}", memory_utilization),
            ]));
        }

        let load = System::load_average();
        let load = LoadAverage {
            one: load.one,
            five: load.five,
            fifteen: load.fifteen,
        };

        let previous = self.cadence.current();
        let next = self.cadence.adapt(&load, self.system.cpus().len());
        if next != previous {
            log::info!("📈 Sampling interval adjusted: {:?} -> {:?}", previous, next);
        }
        self.next_sample = Instant::now() + next;

        log::debug!(
            "Sampled {} processes, CPU {:.2}%, memory {:.2}%",
            tuples.len(),
            total_cpu,
            total_memory_percent
        );

        self.pending.push_back(Notification::ProcessStatistics(tuples));
        self.pending.push_back(Notification::LoadAverage(load));
        self.pending
            .push_back(Notification::OverallUtilization(OverallUtilization {
                cpu_utilization: total_cpu,
                memory_utilization: total_memory_percent,
            }));
    }
}

#[async_trait]
impl ObservationSource for LocalSource {
    async fn next_notification(&mut self) -> Option<Result<Notification>> {
        if self.pending.is_empty() {
            sleep_until(self.next_sample).await;
            self.sample();
        }
        self.pending.pop_front().map(Ok)
    }
}

/// 读取 /proc/<pid>/stat 中的 utime 与 stime
#[cfg(target_os = "linux")]
fn read_cpu_times(pid: u32) -> (u64, u64) {
    std::fs::read_to_string(format!("/proc/{}/stat", pid))
        .ok()
        .and_then(|stat| parse_stat_cpu_times(&stat))
        .unwrap_or((0, 0))
}

#[cfg(not(target_os = "linux"))]
fn read_cpu_times(_pid: u32) -> (u64, u64) {
    (0, 0)
}

// 进程名可能包含空格和括号，从最后一个 ')' 之后开始数字段
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_stat_cpu_times(stat: &str) -> Option<(u64, u64)> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace().skip(11);
    let user = fields.next()?.parse().ok()?;
    let system = fields.next()?.parse().ok()?;
    Some((user, system))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::record_parser::parse_records;

    #[test]
    fn test_parse_stat_cpu_times() {
        let stat = "1234 (my (odd) proc) S 1 1234 1234 0 -1 4194560 512 0 0 0 150 42 0 0 20 0 1 0 100 0 0";
        assert_eq!(parse_stat_cpu_times(stat), Some((150, 42)));
    }

    #[test]
    fn test_parse_truncated_stat() {
        assert_eq!(parse_stat_cpu_times("1 (init) S 0 1"), None);
        assert_eq!(parse_stat_cpu_times("garbage"), None);
    }

    fn load(one: f64, five: f64, fifteen: f64) -> LoadAverage {
        LoadAverage { one, five, fifteen }
    }

    #[test]
    fn test_overloaded_and_rising_stretches_interval() {
        let mut cadence = AdaptiveInterval::new(Duration::from_secs(10));

        assert_eq!(cadence.adapt(&load(4.0, 2.0, 1.0), 2), Duration::from_secs(15));
        // 需求没有继续增长
        assert_eq!(cadence.adapt(&load(3.0, 2.0, 1.0), 2), Duration::from_secs(15).mul_f64(1.15));
    }

    #[test]
    fn test_rising_but_not_overloaded_shortens_interval() {
        let mut cadence = AdaptiveInterval::new(Duration::from_secs(12));
        assert_eq!(cadence.adapt(&load(1.5, 1.0, 1.0), 4), Duration::from_secs(8));
    }

    #[test]
    fn test_falling_load_resets_interval() {
        let mut cadence = AdaptiveInterval::new(Duration::from_secs(10));
        cadence.adapt(&load(8.0, 1.0, 1.0), 2);
        assert_ne!(cadence.current(), Duration::from_secs(10));

        assert_eq!(cadence.adapt(&load(0.5, 1.0, 1.0), 2), Duration::from_secs(10));
    }

    #[test]
    fn test_interval_is_bounded() {
        let mut cadence = AdaptiveInterval::new(Duration::from_secs(10));
        for i in 0..20 {
            cadence.adapt(&load(10.0 + i as f64, 1.0, 1.0), 1);
        }
        assert_eq!(cadence.current(), Duration::from_secs(40));

        let mut cadence = AdaptiveInterval::new(Duration::from_secs(10));
        for _ in 0..20 {
            cadence.adapt(&load(0.2, 0.1, 0.1), 8);
        }
        assert_eq!(cadence.current(), Duration::from_millis(2500));
    }

    #[test]
    fn test_zero_cpu_count_is_treated_as_one() {
        let mut cadence = AdaptiveInterval::new(Duration::from_secs(10));
        assert_eq!(cadence.adapt(&load(2.0, 1.0, 1.0), 0), Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_local_sample_contains_current_process() {
        let mut source = LocalSource::new(Duration::from_millis(10));

        let Some(Ok(Notification::ProcessStatistics(tuples))) = source.next_notification().await else {
            panic!("expected process statistics first");
        };
        let records = parse_records(&tuples).unwrap();
        let current_pid = std::process::id() as u64;
        let current = records.iter().find(|r| r.pid == current_pid).unwrap();
        // 运行时长而不是启动时刻的时间戳
        assert!(current.start_time < 1_000_000_000);

        assert!(matches!(
            source.next_notification().await,
            Some(Ok(Notification::LoadAverage(_)))
        ));
        assert!(matches!(
            source.next_notification().await,
            Some(Ok(Notification::OverallUtilization(_)))
        ));
    }
}
