use serde::Serialize;

/// 单个进程在一次观测周期中的统计
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessRecord {
    /// 进程 ID（每个进程实例唯一）
    pub pid: u64,
    /// 进程名称（不唯一）
    pub name: String,
    /// 启动时间（秒，按通知原样上报）
    pub start_time: u64,
    /// CPU 使用率 (百分比)
    pub cpu_utilization: f64,
    /// 内存使用率 (百分比)
    pub memory_utilization: f64,
    /// 用户态 CPU 时间
    pub cpu_usage_user: u64,
    /// 内核态 CPU 时间
    pub cpu_usage_system: u64,
}

impl ProcessRecord {
    pub fn key(&self) -> ProcessKey {
        ProcessKey::new(self.pid, &self.name)
    }
}

/// (pid, name) 标签对，metrics 以此区分进程
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ProcessKey {
    pub pid: u64,
    pub name: String,
}

impl ProcessKey {
    pub fn new(pid: u64, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
        }
    }
}

/// 已消失的进程
///
/// 通知中不会上报真实的退出时间，`stop_time` 是检测时间减去固定偏移后的估计值
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleProcessEntry {
    pub pid: u64,
    pub name: String,
    /// Unix 时间戳（秒）
    pub stop_time: u64,
}
