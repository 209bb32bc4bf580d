use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::AsyncRead;

use crate::cli::{CommandArgs, SourceKind};
use crate::models::Notification;
use crate::services::local_source::LocalSource;
use crate::services::stream_source::StreamSource;

/// 遥测通知来源
#[async_trait]
pub trait ObservationSource: Send {
    /// 等待下一条通知；来源结束时返回 `None`
    async fn next_notification(&mut self) -> Option<Result<Notification>>;
}

/// 根据命令行参数打开通知来源
pub async fn open_source(args: &CommandArgs) -> Result<Box<dyn ObservationSource>> {
    match args.source {
        SourceKind::Local => {
            log::info!("Sampling local processes every {}s", args.interval);
            Ok(Box::new(LocalSource::new(Duration::from_secs(args.interval.max(1)))))
        }
        SourceKind::Stream => {
            let reader: Box<dyn AsyncRead + Unpin + Send> = if args.input == "-" {
                log::info!("Reading notification stream from stdin");
                Box::new(tokio::io::stdin())
            } else {
                log::info!("Reading notification stream from {}", args.input);
                let file = tokio::fs::File::open(&args.input)
                    .await
                    .with_context(|| format!("failed to open notification stream '{}'", args.input))?;
                Box::new(file)
            };
            Ok(Box::new(StreamSource::new(reader)))
        }
    }
}
