use clap::{Parser, ValueEnum};

/// 通知来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    /// 读取 NETCONF 通知流（stdin 或文件）
    Stream,
    /// 采样本机进程表
    Local,
}

/// Procmon Exporter - 将进程遥测通知导出为 Prometheus metrics
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// 监听端口
    #[arg(short, long, env = "PORT", default_value_t = 54545)]
    pub port: u16,

    /// 监听地址
    #[arg(short = 'a', long, env = "ADDRESS", default_value = "0.0.0.0")]
    pub address: String,

    /// 通知来源
    #[arg(short, long, env = "SOURCE", value_enum, default_value_t = SourceKind::Stream)]
    pub source: SourceKind,

    /// 通知流路径，`-` 表示 stdin
    #[arg(short, long, env = "INPUT", default_value = "-")]
    pub input: String,

    /// 本机采样间隔（秒）
    #[arg(long, env = "INTERVAL", default_value_t = 10)]
    pub interval: u64,

    /// 累积的已消失进程超过该数量时立即 flush
    #[arg(long, env = "FLUSH_THRESHOLD", default_value_t = 64)]
    pub flush_threshold: usize,

    /// 估计退出时间时从检测时间减去的秒数
    #[arg(long, env = "STOP_OFFSET", default_value_t = 10)]
    pub stop_offset: u64,

    /// 只导出名称匹配该正则的进程
    #[arg(long, env = "NAME_FILTER")]
    pub name_filter: Option<String>,
}
