use anyhow::Context;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::metrics::MetricsRegistry;
use crate::models::StaleProcessEntry;
use crate::services::accumulator::FlushReport;
use crate::services::monitor::MonitorCommand;

/// HTTP 处理函数共享的状态
///
/// 对比状态只在监控循环内部，这里只持有发往它的命令通道
#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<MetricsRegistry>,
    commands: mpsc::Sender<MonitorCommand>,
}

impl AppState {
    pub fn new(metrics: Arc<MetricsRegistry>, commands: mpsc::Sender<MonitorCommand>) -> Self {
        Self { metrics, commands }
    }

    pub async fn request_flush(&self) -> anyhow::Result<FlushReport> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(MonitorCommand::Flush(reply))
            .await
            .context("monitor loop is not running")?;
        response.await.context("monitor loop stopped before replying")
    }

    pub async fn list_stale(&self) -> anyhow::Result<Vec<StaleProcessEntry>> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(MonitorCommand::ListStale(reply))
            .await
            .context("monitor loop is not running")?;
        response.await.context("monitor loop stopped before replying")
    }
}
