use regex::Regex;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::metrics::{MetricsRegistry, MetricsSink};
use crate::models::{Notification, RawProcessTuple, StaleProcessEntry};
use crate::services::accumulator::{FlushReport, StaleAccumulator};
use crate::services::observation::ObservationSource;
use crate::services::reconciler::Reconciler;
use crate::services::record_parser::{filter_records, parse_records};

/// 发给监控循环的请求
#[derive(Debug)]
pub enum MonitorCommand {
    /// 立即删除所有累积的已消失进程
    Flush(oneshot::Sender<FlushReport>),
    ListStale(oneshot::Sender<Vec<StaleProcessEntry>>),
}

#[derive(Debug, Clone, Default)]
pub struct MonitorConfig {
    pub flush_threshold: usize,
    pub stop_offset: u64,
    pub name_filter: Option<Regex>,
}

/// 唯一持有对比状态的工作循环
pub struct Monitor {
    source: Box<dyn ObservationSource>,
    reconciler: Reconciler,
    accumulator: StaleAccumulator,
    metrics: Arc<MetricsRegistry>,
    sink: Arc<dyn MetricsSink>,
    name_filter: Option<Regex>,
}

impl Monitor {
    pub fn new(source: Box<dyn ObservationSource>, metrics: Arc<MetricsRegistry>, config: MonitorConfig) -> Self {
        let sink: Arc<dyn MetricsSink> = metrics.clone();
        Self::with_sink(source, metrics, sink, config)
    }

    pub fn with_sink(
        source: Box<dyn ObservationSource>,
        metrics: Arc<MetricsRegistry>,
        sink: Arc<dyn MetricsSink>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            source,
            reconciler: Reconciler::new(config.stop_offset),
            accumulator: StaleAccumulator::new(config.flush_threshold),
            metrics,
            sink,
            name_filter: config.name_filter,
        }
    }

    /// 运行到取消或来源结束，退出前执行最后一次 flush
    pub async fn run(mut self, cancel: CancellationToken, mut commands: mpsc::Receiver<MonitorCommand>) {
        log::info!("🔄 Monitor loop started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("Monitor loop cancelled");
                    break;
                }
                Some(command) = commands.recv() => self.handle_command(command),
                next = self.source.next_notification() => match next {
                    Some(Ok(notification)) => self.handle_notification(notification, unix_now()),
                    Some(Err(e)) => {
                        log::warn!("Skipping notification: {:#}", e);
                        self.metrics.parse_errors_total.inc();
                    }
                    None => {
                        log::info!("Notification stream ended");
                        break;
                    }
                },
            }
        }

        if !self.accumulator.is_empty() {
            let report = self.flush("shutdown");
            if report.failed > 0 {
                log::warn!("{} stale process(es) could not be deleted before exit", report.failed);
            }
        }
        log::info!("✅ Monitor loop stopped");
    }

    fn handle_command(&mut self, command: MonitorCommand) {
        match command {
            MonitorCommand::Flush(reply) => {
                let report = self.flush("request");
                let _ = reply.send(report);
            }
            MonitorCommand::ListStale(reply) => {
                let _ = reply.send(self.accumulator.entries());
            }
        }
    }

    pub fn handle_notification(&mut self, notification: Notification, now: u64) {
        self.metrics.last_notification_timestamp.set(now as f64);
        self.metrics
            .notifications_total
            .with_label_values(&[notification.kind()])
            .inc();

        match notification {
            Notification::ProcessStatistics(tuples) => self.observe_processes(&tuples, now),
            Notification::LoadAverage(load) => self.metrics.update_load_average(&load),
            Notification::OverallUtilization(overall) => self.metrics.update_overall_utilization(&overall),
        }
    }

    fn observe_processes(&mut self, tuples: &[RawProcessTuple], now: u64) {
        let records = match parse_records(tuples) {
            Ok(records) => records,
            Err(e) => {
                log::warn!("Skipping observation cycle: {:#}", e);
                self.metrics.parse_errors_total.inc();
                return;
            }
        };
        let records = filter_records(records, self.name_filter.as_ref());

        let stale = self.reconciler.reconcile(&records, now);

        for record in &records {
            self.sink.update_process(record);
        }

        self.accumulator.forget_present(self.reconciler.known());

        if !stale.is_empty() {
            for entry in &stale {
                log::info!("Process {} ({}) is gone, stopped around {}", entry.pid, entry.name, entry.stop_time);
            }
            self.metrics.stale_processes_total.inc_by(stale.len() as u64);
            self.accumulator.accumulate(stale);
        }

        if self.accumulator.exceeds_threshold() {
            self.flush("threshold");
        }

        self.metrics.stale_pending.set(self.accumulator.len() as i64);
        log::debug!(
            "Observed {} processes, {} stale pending",
            records.len(),
            self.accumulator.len()
        );
    }

    fn flush(&mut self, reason: &str) -> FlushReport {
        let pending = self.accumulator.len();
        let report = self.accumulator.flush(self.sink.as_ref());

        self.metrics.flushes_total.inc();
        self.metrics.stale_pending.set(self.accumulator.len() as i64);
        log::info!(
            "Flushed stale processes ({}): {} pending, {} deleted, {} failed",
            reason,
            pending,
            report.deleted,
            report.failed
        );
        report
    }

    #[cfg(test)]
    pub fn accumulator(&self) -> &StaleAccumulator {
        &self.accumulator
    }

    #[cfg(test)]
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
