use lazy_static::lazy_static;
use prometheus::{
    IntCounterVec, Encoder, Gauge, GaugeVec, IntCounter, IntGauge, Opts, Registry, TextEncoder,
    register_int_counter_vec_with_registry, register_gauge_vec_with_registry,
    register_gauge_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry,
};
use sysinfo::System;

use crate::models::{LoadAverage, OverallUtilization, ProcessRecord};

lazy_static! {
    static ref HOSTNAME: String = System::host_name().unwrap_or_else(|| "unknown".to_string());
}

/// 进程 metrics 的写入端
pub trait MetricsSink: Send + Sync {
    fn update_process(&self, record: &ProcessRecord);

    /// 删除某个 (pid, name) 的全部 series
    fn delete_process(&self, pid: u64, name: &str) -> anyhow::Result<()>;
}

pub struct MetricsRegistry {
    registry: Registry,

    // 每进程 gauge，标签 pid / name / hostname
    pub process_cpu_utilization: GaugeVec,
    pub process_memory_utilization: GaugeVec,
    pub process_cpu_usage_user: GaugeVec,
    pub process_cpu_usage_system: GaugeVec,
    pub process_start_time: GaugeVec,

    // 系统级 gauge，标签 hostname
    pub system_load_average_1m: GaugeVec,
    pub system_load_average_5m: GaugeVec,
    pub system_load_average_15m: GaugeVec,
    pub system_cpu_utilization: GaugeVec,
    pub system_memory_utilization: GaugeVec,

    // exporter 自身
    pub notifications_total: IntCounterVec,
    pub parse_errors_total: IntCounter,
    pub stale_processes_total: IntCounter,
    pub stale_pending: IntGauge,
    pub flushes_total: IntCounter,
    pub deleted_processes_total: IntCounter,
    pub last_notification_timestamp: Gauge,
}

impl MetricsRegistry {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let process_labels = &["pid", "name", "hostname"];
        let host_labels = &["hostname"];

        let process_cpu_utilization = register_gauge_vec_with_registry!(
            Opts::new("process_cpu_utilization_percent", "Process CPU utilization percentage"),
            process_labels,
            registry
        )?;

        let process_memory_utilization = register_gauge_vec_with_registry!(
            Opts::new("process_memory_utilization_percent", "Process memory utilization percentage"),
            process_labels,
            registry
        )?;

        let process_cpu_usage_user = register_gauge_vec_with_registry!(
            Opts::new("process_cpu_usage_user", "User space CPU time of the process"),
            process_labels,
            registry
        )?;

        let process_cpu_usage_system = register_gauge_vec_with_registry!(
            Opts::new("process_cpu_usage_system", "Kernel space CPU time of the process"),
            process_labels,
            registry
        )?;

        let process_start_time = register_gauge_vec_with_registry!(
            Opts::new("process_reported_start_time_seconds", "Seconds since the process started, as reported in the notification"),
            process_labels,
            registry
        )?;

        let system_load_average_1m = register_gauge_vec_with_registry!(
            Opts::new("system_load_average_1m", "Load average over 1 minute"),
            host_labels,
            registry
        )?;

        let system_load_average_5m = register_gauge_vec_with_registry!(
            Opts::new("system_load_average_5m", "Load average over 5 minutes"),
            host_labels,
            registry
        )?;

        let system_load_average_15m = register_gauge_vec_with_registry!(
            Opts::new("system_load_average_15m", "Load average over 15 minutes"),
            host_labels,
            registry
        )?;

        let system_cpu_utilization = register_gauge_vec_with_registry!(
            Opts::new("system_cpu_utilization_percent", "Overall CPU utilization percentage"),
            host_labels,
            registry
        )?;

        let system_memory_utilization = register_gauge_vec_with_registry!(
            Opts::new("system_memory_utilization_percent", "Overall memory utilization percentage"),
            host_labels,
            registry
        )?;

        let notifications_total = register_int_counter_vec_with_registry!(
            Opts::new("procmon_notifications_total", "Notifications received by kind"),
            &["kind"],
            registry
        )?;

        let parse_errors_total = register_int_counter_with_registry!(
            Opts::new("procmon_parse_errors_total", "Observation cycles skipped because of malformed data"),
            registry
        )?;

        let stale_processes_total = register_int_counter_with_registry!(
            Opts::new("procmon_stale_processes_total", "Processes detected as gone"),
            registry
        )?;

        let stale_pending = register_int_gauge_with_registry!(
            Opts::new("procmon_stale_pending", "Stale processes waiting for metric deletion"),
            registry
        )?;

        let flushes_total = register_int_counter_with_registry!(
            Opts::new("procmon_flushes_total", "Flushes of accumulated stale processes"),
            registry
        )?;

        let deleted_processes_total = register_int_counter_with_registry!(
            Opts::new("procmon_deleted_processes_total", "Processes whose series were deleted"),
            registry
        )?;

        let last_notification_timestamp = register_gauge_with_registry!(
            Opts::new("procmon_last_notification_timestamp_seconds", "Unix timestamp of the last notification"),
            registry
        )?;

        // exporter 自身的进程 metrics
        #[cfg(target_os = "linux")]
        registry.register(Box::new(prometheus::process_collector::ProcessCollector::for_self()))?;

        Ok(Self {
            registry,
            process_cpu_utilization,
            process_memory_utilization,
            process_cpu_usage_user,
            process_cpu_usage_system,
            process_start_time,
            system_load_average_1m,
            system_load_average_5m,
            system_load_average_15m,
            system_cpu_utilization,
            system_memory_utilization,
            notifications_total,
            parse_errors_total,
            stale_processes_total,
            stale_pending,
            flushes_total,
            deleted_processes_total,
            last_notification_timestamp,
        })
    }

    pub fn hostname() -> &'static str {
        HOSTNAME.as_str()
    }

    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    pub fn update_load_average(&self, load: &LoadAverage) {
        let labels = &[Self::hostname()];
        self.system_load_average_1m.with_label_values(labels).set(load.one);
        self.system_load_average_5m.with_label_values(labels).set(load.five);
        self.system_load_average_15m.with_label_values(labels).set(load.fifteen);
    }

    pub fn update_overall_utilization(&self, overall: &OverallUtilization) {
        let labels = &[Self::hostname()];
        self.system_cpu_utilization
            .with_label_values(labels)
            .set(overall.cpu_utilization);
        self.system_memory_utilization
            .with_label_values(labels)
            .set(overall.memory_utilization);
    }

    fn process_gauges(&self) -> [&GaugeVec; 5] {
        [
            &self.process_cpu_utilization,
            &self.process_memory_utilization,
            &self.process_cpu_usage_user,
            &self.process_cpu_usage_system,
            &self.process_start_time,
        ]
    }
}

impl MetricsSink for MetricsRegistry {
    fn update_process(&self, record: &ProcessRecord) {
        let pid = record.pid.to_string();
        let labels = &[pid.as_str(), record.name.as_str(), Self::hostname()];

        self.process_cpu_utilization
            .with_label_values(labels)
            .set(record.cpu_utilization);
        self.process_memory_utilization
            .with_label_values(labels)
            .set(record.memory_utilization);
        self.process_cpu_usage_user
            .with_label_values(labels)
            .set(record.cpu_usage_user as f64);
        self.process_cpu_usage_system
            .with_label_values(labels)
            .set(record.cpu_usage_system as f64);
        self.process_start_time
            .with_label_values(labels)
            .set(record.start_time as f64);
    }

    fn delete_process(&self, pid: u64, name: &str) -> anyhow::Result<()> {
        let pid = pid.to_string();
        let labels = &[pid.as_str(), name, Self::hostname()];

        // 不存在的 series 视为已删除，只统计真正删除过 series 的进程
        let removed = self
            .process_gauges()
            .iter()
            .filter(|gauge| gauge.remove_label_values(labels).is_ok())
            .count();
        if removed > 0 {
            self.deleted_processes_total.inc();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pid: u64, name: &str) -> ProcessRecord {
        ProcessRecord {
            pid,
            name: name.to_string(),
            start_time: 12,
            cpu_utilization: 3.5,
            memory_utilization: 1.25,
            cpu_usage_user: 100,
            cpu_usage_system: 20,
        }
    }

    #[test]
    fn test_update_then_delete_process() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.update_process(&record(42, "confd"));

        let text = metrics.render().unwrap();
        assert!(text.contains("process_cpu_utilization_percent{"));
        assert!(text.contains("pid=\"42\""));
        assert!(text.contains("name=\"confd\""));

        metrics.delete_process(42, "confd").unwrap();
        let text = metrics.render().unwrap();
        assert!(!text.contains("pid=\"42\""));
        assert_eq!(metrics.deleted_processes_total.get(), 1);
    }

    #[test]
    fn test_delete_unknown_process_is_ok() {
        let metrics = MetricsRegistry::new().unwrap();
        assert!(metrics.delete_process(1, "never-seen").is_ok());
        assert_eq!(metrics.deleted_processes_total.get(), 0);
    }

    #[test]
    fn test_system_gauges() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.update_load_average(&LoadAverage {
            one: 0.29,
            five: 0.5,
            fifteen: 0.48,
        });
        metrics.update_overall_utilization(&OverallUtilization {
            cpu_utilization: 12.0,
            memory_utilization: 30.0,
        });

        let labels = &[MetricsRegistry::hostname()];
        assert_eq!(metrics.system_load_average_5m.with_label_values(labels).get(), 0.5);
        assert_eq!(metrics.system_memory_utilization.with_label_values(labels).get(), 30.0);
    }
}
