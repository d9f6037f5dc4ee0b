use serde_json::{Map, Value};

use crate::types::{Axes, RawReading};

/// 单帧解码错误，只记录日志，不中断数据流
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("frame has no pitch/roll")]
    MissingAngles,
}

/// 固件可能输出的非标准数值，按长度从长到短匹配
const NON_FINITE_TOKENS: [&str; 3] = ["infinity", "inf", "nan"];

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// 从 `start` 开始匹配可选符号 + 非标准数值，返回匹配结束位置
fn match_non_finite(bytes: &[u8], start: usize) -> Option<usize> {
    let mut pos = start;
    if matches!(bytes.get(pos), Some(b'-') | Some(b'+')) {
        pos += 1;
    }

    for token in NON_FINITE_TOKENS {
        let end = pos + token.len();
        if end > bytes.len() || !bytes[pos..end].eq_ignore_ascii_case(token.as_bytes()) {
            continue;
        }
        if bytes.get(end).map_or(true, |b| !is_word_byte(*b)) {
            return Some(end);
        }
    }
    None
}

/// 把冒号后面的 nan / inf / infinity（任意大小写、可带符号）替换成 null
pub fn repair_tokens(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b':' {
            i += 1;
            continue;
        }

        let mut value_start = i + 1;
        while value_start < bytes.len() && bytes[value_start].is_ascii_whitespace() {
            value_start += 1;
        }

        match match_non_finite(bytes, value_start) {
            Some(end) => {
                out.push_str(&text[copied..=i]);
                out.push_str(" null");
                copied = end;
                i = end;
            }
            None => i += 1,
        }
    }

    out.push_str(&text[copied..]);
    out
}

/// 取有限数值，其它一律视为缺失
fn finite_number(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64).filter(|v| v.is_finite())
}

/// 字段默认值表
enum Coerce {
    Zero,
    Now,
}

const AXIS_FIELDS: [(&str, Coerce); 3] = [("x", Coerce::Zero), ("y", Coerce::Zero), ("z", Coerce::Zero)];
const ANGLE_FIELDS: [(&str, Coerce); 2] = [("pitch", Coerce::Zero), ("roll", Coerce::Zero)];
const TIMESTAMP_FIELD: (&str, Coerce) = ("timestamp", Coerce::Now);

impl Coerce {
    fn number(&self, value: Option<&Value>, now_ms: i64) -> f64 {
        finite_number(value).unwrap_or(match self {
            Coerce::Zero => 0.0,
            Coerce::Now => now_ms as f64,
        })
    }
}

fn coerce_axes(object: &Map<String, Value>, key: &str, now_ms: i64) -> Axes {
    let group = object.get(key).and_then(Value::as_object);
    let [x, y, z] = AXIS_FIELDS
        .each_ref()
        .map(|(name, rule)| rule.number(group.and_then(|g| g.get(*name)), now_ms));
    Axes::new(x, y, z)
}

/// 解析已修复的文本并逐字段补默认值
///
/// 缺少 `pitch` 或 `roll` 键的帧直接丢弃；值为 null 的键视为存在。
pub fn decode_frame(text: &str, now_ms: i64) -> Result<RawReading, DecodeError> {
    let repaired = repair_tokens(text);
    let value: Value = serde_json::from_str(&repaired)?;
    let object = value.as_object().ok_or(DecodeError::NotAnObject)?;

    if ANGLE_FIELDS.iter().any(|(name, _)| !object.contains_key(*name)) {
        return Err(DecodeError::MissingAngles);
    }

    let [pitch, roll] = ANGLE_FIELDS
        .each_ref()
        .map(|(name, rule)| rule.number(object.get(*name), now_ms));

    let (name, rule) = &TIMESTAMP_FIELD;
    let timestamp = match object.get(*name).and_then(Value::as_i64) {
        Some(ts) => ts,
        None => rule.number(object.get(*name), now_ms) as i64,
    };

    Ok(RawReading::new(
        coerce_axes(object, "accelerometer", now_ms),
        coerce_axes(object, "magnetometer", now_ms),
        pitch,
        roll,
        timestamp,
    ))
}

/// 二进制帧按 UTF-8 文本处理
pub fn decode_bytes(payload: &[u8], now_ms: i64) -> Result<RawReading, DecodeError> {
    let text = std::str::from_utf8(payload)?;
    decode_frame(text, now_ms)
}
