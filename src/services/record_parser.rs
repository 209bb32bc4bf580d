use anyhow::{Context, Result};
use regex::Regex;
use std::str::FromStr;

use crate::models::{ProcessRecord, RawProcessTuple};

/// 每条进程记录的字段数
pub const PROCESS_FIELD_COUNT: usize = 7;

const FIELD_NAMES: [&str; PROCESS_FIELD_COUNT] = [
    "pid",
    "name",
    "start-time",
    "cpu-usage-user",
    "cpu-usage-system",
    "cpu-utilization",
    "memory-utilization",
];

/// 解析一次观测中的全部进程记录
///
/// 任一记录字段不足或无法解析时整个周期失败
pub fn parse_records(tuples: &[RawProcessTuple]) -> Result<Vec<ProcessRecord>> {
    tuples
        .iter()
        .enumerate()
        .map(|(index, tuple)| {
            parse_record(tuple).with_context(|| format!("process entry #{} is malformed", index))
        })
        .collect()
}

pub fn parse_record(tuple: &RawProcessTuple) -> Result<ProcessRecord> {
    let fields = tuple.fields();
    if fields.len() < PROCESS_FIELD_COUNT {
        anyhow::bail!(
            "expected {} fields, got {}: {:?}",
            PROCESS_FIELD_COUNT,
            fields.len(),
            fields
        );
    }

    Ok(ProcessRecord {
        pid: field(fields, 0)?,
        name: fields[1].trim().to_string(),
        start_time: field(fields, 2)?,
        cpu_usage_user: field(fields, 3)?,
        cpu_usage_system: field(fields, 4)?,
        cpu_utilization: field(fields, 5)?,
        memory_utilization: field(fields, 6)?,
    })
}

fn field<T>(fields: &[String], index: usize) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = fields[index].trim();
    raw.parse::<T>()
        .with_context(|| format!("invalid {} value '{}'", FIELD_NAMES[index], raw))
}

/// 按进程名过滤
pub fn filter_records(records: Vec<ProcessRecord>, name_filter: Option<&Regex>) -> Vec<ProcessRecord> {
    match name_filter {
        Some(regex) => records
            .into_iter()
            .filter(|record| regex.is_match(&record.name))
            .collect(),
        None => records,
    }
}
