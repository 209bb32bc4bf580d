use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::models::Notification;
use crate::services::notification_decoder::decode_notification;
use crate::services::observation::ObservationSource;

/// NETCONF 1.0 消息结束符
pub const END_OF_MESSAGE: &[u8] = b"]]>]]>";

const READ_CHUNK: usize = 8192;

/// 单条消息的默认上限
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// 从字节流中读取以 `]]>]]>` 分隔的 NETCONF 通知
pub struct StreamSource<R> {
    reader: R,
    buffer: Vec<u8>,
    // 已确认不含结束符的前缀长度
    scanned: usize,
    max_message_size: usize,
    // 超长消息被丢弃，直到下一个结束符
    discarding: bool,
    finished: bool,
}

impl<R: AsyncRead + Unpin + Send> StreamSource<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_message_size(reader, MAX_MESSAGE_SIZE)
    }

    pub fn with_max_message_size(reader: R, max_message_size: usize) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
            scanned: 0,
            max_message_size,
            discarding: false,
            finished: false,
        }
    }

    async fn next_message(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(message) = split_message(&mut self.buffer, &mut self.scanned) {
                if std::mem::take(&mut self.discarding) {
                    log::debug!("Dropped tail of oversized message ({} bytes)", message.len());
                    continue;
                }
                if message.len() > self.max_message_size {
                    anyhow::bail!("message of {} bytes exceeds {} bytes", message.len(), self.max_message_size);
                }
                if message.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                return Ok(Some(String::from_utf8(message).context("message is not valid UTF-8")?));
            }

            if self.buffer.len() > self.max_message_size {
                // 保留末尾几个字节，结束符可能跨越读取边界
                let keep = END_OF_MESSAGE.len() - 1;
                let dropped = self.buffer.len() - keep;
                self.buffer.drain(..dropped);
                self.scanned = 0;
                if !std::mem::replace(&mut self.discarding, true) {
                    anyhow::bail!("message exceeds {} bytes without a terminator", self.max_message_size);
                }
            }

            if self.finished {
                // 流结束时最后一条消息可能没有结束符
                let rest = std::mem::take(&mut self.buffer);
                self.scanned = 0;
                if self.discarding || rest.iter().all(u8::is_ascii_whitespace) {
                    return Ok(None);
                }
                return Ok(Some(String::from_utf8(rest).context("message is not valid UTF-8")?));
            }

            let mut chunk = [0u8; READ_CHUNK];
            match self.reader.read(&mut chunk).await {
                Ok(0) => self.finished = true,
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    self.finished = true;
                    return Err(e).context("failed to read notification stream");
                }
            }
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> ObservationSource for StreamSource<R> {
    async fn next_notification(&mut self) -> Option<Result<Notification>> {
        loop {
            let message = match self.next_message().await {
                Ok(Some(message)) => message,
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            };

            match decode_notification(&message) {
                Ok(Some(notification)) => return Some(Ok(notification)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// 取出缓冲区中第一条完整消息（不含结束符）
///
/// `scanned` 记录上次扫描到的位置，没有找到结束符时只需扫描新读入的数据。
pub fn split_message(buffer: &mut Vec<u8>, scanned: &mut usize) -> Option<Vec<u8>> {
    let start = (*scanned).min(buffer.len());
    let Some(offset) = buffer[start..]
        .windows(END_OF_MESSAGE.len())
        .position(|window| window == END_OF_MESSAGE)
    else {
        *scanned = buffer.len().saturating_sub(END_OF_MESSAGE.len() - 1);
        return None;
    };

    let end = start + offset;
    let mut message: Vec<u8> = buffer.drain(..end + END_OF_MESSAGE.len()).collect();
    message.truncate(end);
    *scanned = 0;
    Some(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LoadAverage;

    const HELLO: &str = r#"<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><capabilities><capability>urn:ietf:params:netconf:base:1.0</capability></capabilities></hello>"#;

    fn load_average(one: &str) -> String {
        format!(
            "<notification><eventTime>t</eventTime><system-load-average>\
             <a>{}</a><b>0.5</b><c>0.25</c></system-load-average></notification>",
            one
        )
    }

    #[test]
    fn test_split_message() {
        let mut scanned = 0;
        let mut buffer = b"<a/>]]>]]><b/>]]>]]><c".to_vec();
        assert_eq!(split_message(&mut buffer, &mut scanned), Some(b"<a/>".to_vec()));
        assert_eq!(split_message(&mut buffer, &mut scanned), Some(b"<b/>".to_vec()));
        assert_eq!(split_message(&mut buffer, &mut scanned), None);
        assert_eq!(buffer, b"<c".to_vec());
    }

    #[test]
    fn test_split_message_resumes_scan_across_reads() {
        let mut scanned = 0;
        let mut buffer = b"<abcdefgh/>]]>".to_vec();
        assert_eq!(split_message(&mut buffer, &mut scanned), None);
        assert_eq!(scanned, buffer.len() - (END_OF_MESSAGE.len() - 1));

        // 结束符跨越两次读取
        buffer.extend_from_slice(b"]]><next");
        assert_eq!(split_message(&mut buffer, &mut scanned), Some(b"<abcdefgh/>".to_vec()));
        assert_eq!(scanned, 0);
        assert_eq!(buffer, b"<next".to_vec());
    }

    #[tokio::test]
    async fn test_oversized_message_is_skipped() {
        let huge = format!("<notification>{}</notification>", "x".repeat(300));
        let stream = format!("{}]]>]]>{}]]>]]>", huge, load_average("4"));
        let mut source = StreamSource::with_max_message_size(stream.as_bytes(), 256);

        assert!(source.next_notification().await.unwrap().is_err());
        assert!(source.next_notification().await.unwrap().is_ok());
        assert!(source.next_notification().await.is_none());
    }

    #[tokio::test]
    async fn test_unterminated_oversized_data_is_bounded() {
        let stream = format!("{}]]>]]>{}", load_average("5"), "y".repeat(1000));
        let mut source = StreamSource::with_max_message_size(stream.as_bytes(), 256);

        assert!(source.next_notification().await.unwrap().is_ok());
        assert!(source.next_notification().await.unwrap().is_err());
        assert!(source.buffer.len() < END_OF_MESSAGE.len());
        assert!(source.next_notification().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_skips_hello_and_decodes_notifications() {
        let stream = format!(
            "{}]]>]]>\n{}]]>]]>\n{}]]>]]>\n",
            HELLO,
            load_average("1.5"),
            load_average("2.5")
        );
        let mut source = StreamSource::new(stream.as_bytes());

        let first = source.next_notification().await.unwrap().unwrap();
        assert_eq!(
            first,
            Notification::LoadAverage(LoadAverage {
                one: 1.5,
                five: 0.5,
                fifteen: 0.25,
            })
        );
        assert!(source.next_notification().await.unwrap().is_ok());
        assert!(source.next_notification().await.is_none());
    }

    #[tokio::test]
    async fn test_unterminated_last_message_is_decoded() {
        let stream = format!("{}]]>]]>{}", load_average("1"), load_average("2"));
        let mut source = StreamSource::new(stream.as_bytes());

        assert!(source.next_notification().await.unwrap().is_ok());
        assert!(source.next_notification().await.unwrap().is_ok());
        assert!(source.next_notification().await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_message_does_not_end_stream() {
        let stream = format!("<notification><oops></notification>]]>]]>{}]]>]]>", load_average("3"));
        let mut source = StreamSource::new(stream.as_bytes());

        assert!(source.next_notification().await.unwrap().is_err());
        assert!(source.next_notification().await.unwrap().is_ok());
        assert!(source.next_notification().await.is_none());
    }
}
