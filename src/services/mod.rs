pub mod accumulator;
pub mod local_source;
pub mod monitor;
pub mod notification_decoder;
pub mod observation;
pub mod reconciler;
pub mod record_parser;
pub mod signals;
pub mod stream_source;

pub use monitor::{Monitor, MonitorConfig};
pub use observation::open_source;
pub use signals::watch_signals;
