use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::services::monitor::MonitorCommand;

/// 把系统信号转换成监控循环的事件
///
/// SIGINT / SIGTERM 取消循环（循环退出前会 flush），SIGUSR1 请求立即 flush
#[cfg(unix)]
pub async fn watch_signals(cancel: CancellationToken, commands: mpsc::Sender<MonitorCommand>) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut user1 = signal(SignalKind::user_defined1())?;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = terminate.recv() => {
                log::info!("Received SIGTERM, shutting down");
                break;
            }
            _ = interrupt.recv() => {
                log::info!("Received SIGINT, shutting down");
                break;
            }
            _ = user1.recv() => {
                log::info!("Received SIGUSR1, flushing stale processes");
                if !request_flush(&commands).await {
                    break;
                }
            }
        }
    }

    cancel.cancel();
    Ok(())
}

#[cfg(not(unix))]
pub async fn watch_signals(cancel: CancellationToken, _commands: mpsc::Sender<MonitorCommand>) -> anyhow::Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        result = tokio::signal::ctrl_c() => result?,
    }
    log::info!("Received Ctrl-C, shutting down");
    cancel.cancel();
    Ok(())
}

#[cfg_attr(not(unix), allow(dead_code))]
async fn request_flush(commands: &mpsc::Sender<MonitorCommand>) -> bool {
    let (reply, response) = oneshot::channel();
    if commands.send(MonitorCommand::Flush(reply)).await.is_err() {
        return false;
    }
    match response.await {
        Ok(report) => {
            log::info!("Flush done: {} deleted, {} failed", report.deleted, report.failed);
            true
        }
        Err(_) => false,
    }
}
