use serde::{Deserialize, Deserializer, Serialize};

/// 角度范围（度）
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct AngleRange {
    pub min: f64,
    pub max: f64,
}

impl AngleRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

fn default_tilt_range() -> AngleRange {
    AngleRange::new(-5.0, 5.0)
}

fn default_level_range() -> AngleRange {
    AngleRange::new(-45.0, 45.0)
}

fn default_show_pitch() -> bool {
    true
}

/// null 与缺失同样处理
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RangeWire {
    min: Option<f64>,
    max: Option<f64>,
}

impl RangeWire {
    fn or(range: Option<RangeWire>, fallback: AngleRange) -> AngleRange {
        let range = range.unwrap_or_default();
        AngleRange {
            min: range.min.unwrap_or(fallback.min),
            max: range.max.unwrap_or(fallback.max),
        }
    }
}

/// 设备原始 JSON，每个叶子字段都可能缺失或为 null
#[derive(Deserialize, Default)]
#[serde(default)]
struct SettingsWire {
    roll_range: Option<RangeWire>,
    pitch_range: Option<RangeWire>,
    level_range: Option<RangeWire>,
    zero_offset: Option<f64>,
    axis_swap: Option<bool>,
    show_pitch: Option<bool>,
}

impl From<SettingsWire> for DeviceSettings {
    fn from(wire: SettingsWire) -> Self {
        Self {
            roll_range: RangeWire::or(wire.roll_range, default_tilt_range()),
            pitch_range: RangeWire::or(wire.pitch_range, default_tilt_range()),
            level_range: RangeWire::or(wire.level_range, default_level_range()),
            zero_offset: wire.zero_offset.unwrap_or(0.0),
            axis_swap: wire.axis_swap.unwrap_or(false),
            show_pitch: wire.show_pitch.unwrap_or_else(default_show_pitch),
        }
    }
}

/// 设备配置（`GET /settings`）
///
/// 每个字段单独补默认值，包括范围里的 `min` / `max`。
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(from = "SettingsWire")]
pub struct DeviceSettings {
    pub roll_range: AngleRange,
    pub pitch_range: AngleRange,
    pub level_range: AngleRange,
    pub zero_offset: f64,
    pub axis_swap: bool,
    pub show_pitch: bool,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            roll_range: default_tilt_range(),
            pitch_range: default_tilt_range(),
            level_range: default_level_range(),
            zero_offset: 0.0,
            axis_swap: false,
            show_pitch: default_show_pitch(),
        }
    }
}

/// 电池状态（`GET /battery`）
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct BatteryData {
    #[serde(default, deserialize_with = "null_as_default")]
    pub percentage: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub voltage: f64,
}

/// 零点校准结果（`GET /calibrate_zero`）
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct ZeroCalibration {
    #[serde(default, deserialize_with = "null_as_default")]
    pub offset: f64,
}

/// WiFi 配置，提交后设备会重启
#[derive(Clone, Debug, PartialEq)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
    pub ip: String,
    pub gateway: String,
}

impl WifiCredentials {
    pub fn new(ssid: &str, password: &str, ip: &str, gateway: &str) -> Self {
        Self {
            ssid: ssid.to_string(),
            password: password.to_string(),
            ip: ip.to_string(),
            gateway: gateway.to_string(),
        }
    }

    /// 所有字段都必须填写
    pub fn is_complete(&self) -> bool {
        ![&self.ssid, &self.password, &self.ip, &self.gateway]
            .iter()
            .any(|field| field.is_empty())
    }
}

/// 设备 HTTP 接口的可达性与电量
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct DeviceStatus {
    pub reachable: bool,
    pub battery: BatteryData,
    pub checked_at: i64,
}
