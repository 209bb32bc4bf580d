use anyhow::{Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::models::{LoadAverage, Notification, OverallUtilization, RawProcessTuple};

const PROCESS_STATISTICS: &str = "process-statistics";
const SYSTEM_LOAD_AVERAGE: &str = "system-load-average";
const SYSTEM_OVERALL_CPU_MEMORY: &str = "system-overall-cpu-memory";

/// payload 下的一个子元素
#[derive(Debug, Default)]
struct Node {
    name: String,
    text: String,
    children: Vec<String>,
}

/// 解析一条 NETCONF 通知
///
/// 根元素不是 `<notification>`（如 `<hello>`、`<rpc-reply>`）或 payload 类型未知时返回 `Ok(None)`。
/// 所有字段按位置读取，命名空间被忽略。
pub fn decode_notification(xml: &str) -> Result<Option<Notification>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut depth = 0usize;
    let mut payload: Option<String> = None;
    let mut in_payload = false;
    let mut nodes: Vec<Node> = Vec::new();

    loop {
        let event = reader
            .read_event()
            .with_context(|| format!("malformed notification XML at byte {}", reader.buffer_position()))?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let name = local_name(e)?;

                match depth {
                    0 if name != "notification" => {
                        log::debug!("Skipping <{}> message", name);
                        return Ok(None);
                    }
                    1 if payload.is_none() && name != "eventTime" => {
                        payload = Some(name);
                        in_payload = !is_empty;
                    }
                    2 if in_payload => nodes.push(Node {
                        name,
                        ..Default::default()
                    }),
                    3 if in_payload => {
                        if let Some(node) = nodes.last_mut() {
                            node.children.push(String::new());
                        }
                    }
                    _ => {}
                }

                if !is_empty {
                    depth += 1;
                }
            }
            Event::Text(ref t) => {
                let text = t.unescape().context("invalid text in notification")?;
                push_text(&mut nodes, depth, in_payload, &text);
            }
            Event::CData(ref c) => {
                let text = String::from_utf8_lossy(c);
                push_text(&mut nodes, depth, in_payload, &text);
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if depth == 1 {
                    in_payload = false;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 {
        anyhow::bail!("truncated notification: {} element(s) left open", depth);
    }

    let Some(payload) = payload else {
        return Ok(None);
    };

    match payload.as_str() {
        PROCESS_STATISTICS => {
            let tuples = nodes
                .into_iter()
                .filter(|node| node.name == "process")
                .map(|node| RawProcessTuple(node.children))
                .collect();
            Ok(Some(Notification::ProcessStatistics(tuples)))
        }
        SYSTEM_LOAD_AVERAGE => {
            let values = flat_values(&nodes, 3, SYSTEM_LOAD_AVERAGE)?;
            Ok(Some(Notification::LoadAverage(LoadAverage {
                one: values[0],
                five: values[1],
                fifteen: values[2],
            })))
        }
        SYSTEM_OVERALL_CPU_MEMORY => {
            let values = flat_values(&nodes, 2, SYSTEM_OVERALL_CPU_MEMORY)?;
            Ok(Some(Notification::OverallUtilization(OverallUtilization {
                cpu_utilization: values[0],
                memory_utilization: values[1],
            })))
        }
        other => {
            log::debug!("Ignoring notification with payload <{}>", other);
            Ok(None)
        }
    }
}

fn local_name(e: &BytesStart) -> Result<String> {
    let name = e.local_name();
    Ok(std::str::from_utf8(name.as_ref())
        .context("element name is not valid UTF-8")?
        .to_string())
}

// depth 为文本所在元素的深度 + 1
fn push_text(nodes: &mut [Node], depth: usize, in_payload: bool, text: &str) {
    if !in_payload {
        return;
    }
    let Some(node) = nodes.last_mut() else {
        return;
    };
    match depth {
        3 => node.text.push_str(text),
        4 => {
            if let Some(field) = node.children.last_mut() {
                field.push_str(text);
            }
        }
        _ => {}
    }
}

fn flat_values(nodes: &[Node], expected: usize, kind: &str) -> Result<Vec<f64>> {
    if nodes.len() < expected {
        anyhow::bail!("{} has {} values, expected {}", kind, nodes.len(), expected);
    }
    nodes[..expected]
        .iter()
        .map(|node| {
            node.text
                .trim()
                .parse::<f64>()
                .with_context(|| format!("invalid {} value '{}' in {}", node.name, node.text, kind))
        })
        .collect()
}
