/// 按固定位置顺序排列的原始进程属性:
/// pid, name, start-time, cpu-usage-user, cpu-usage-system, cpu-utilization, memory-utilization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawProcessTuple(pub Vec<String>);

impl RawProcessTuple {
    pub fn fields(&self) -> &[String] {
        &self.0
    }
}

impl<S: Into<String>> FromIterator<S> for RawProcessTuple {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

/// 系统整体 CPU / 内存使用率
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OverallUtilization {
    pub cpu_utilization: f64,
    pub memory_utilization: f64,
}

/// 一条遥测通知
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    ProcessStatistics(Vec<RawProcessTuple>),
    LoadAverage(LoadAverage),
    OverallUtilization(OverallUtilization),
}

impl Notification {
    /// 用作 `procmon_notifications_total` 的 kind 标签
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::ProcessStatistics(_) => "process-statistics",
            Notification::LoadAverage(_) => "system-load-average",
            Notification::OverallUtilization(_) => "system-overall-cpu-memory",
        }
    }
}
