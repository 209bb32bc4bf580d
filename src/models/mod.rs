pub mod notification;
pub mod process;

pub use notification::{LoadAverage, Notification, OverallUtilization, RawProcessTuple};
pub use process::{ProcessKey, ProcessRecord, StaleProcessEntry};
