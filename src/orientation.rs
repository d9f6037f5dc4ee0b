use std::fmt;

use serde::Serialize;

use crate::types::{ProcessedOrientation, RawReading};
use crate::utils::round_to;

/// 将角度折回 `[0, 360)`，同时把 -0.0 变成 0.0
fn wrap_degrees(degrees: f64) -> f64 {
    let mut wrapped = degrees;
    if wrapped < 0.0 {
        wrapped += 360.0;
    }
    if wrapped >= 360.0 {
        wrapped -= 360.0;
    }
    wrapped + 0.0
}

/// 由原始三轴数据计算姿态
///
/// pitch / roll 由加速度计重新计算，不使用固件上报的角度；
/// 航向做倾斜补偿。纯函数，可重复、并发调用。
pub fn process(reading: &RawReading) -> ProcessedOrientation {
    let a = &reading.accelerometer;
    let m = &reading.magnetometer;

    let pitch = a.y.atan2(a.z).to_degrees();
    let roll = a.x.atan2(a.z).to_degrees();

    let mut heading = m.y.atan2(m.x).to_degrees();
    if heading < 0.0 {
        heading += 360.0;
    }

    let magnitude = (a.x * a.x + a.y * a.y + a.z * a.z).sqrt();

    // 倾斜补偿
    let pitch_rad = pitch.to_radians();
    let roll_rad = roll.to_radians();
    let xh = m.x * pitch_rad.cos() + m.z * pitch_rad.sin();
    let yh = m.x * roll_rad.sin() * pitch_rad.sin() + m.y * roll_rad.cos()
        - m.z * roll_rad.sin() * pitch_rad.cos();

    let mut tilt_compensated_heading = yh.atan2(xh).to_degrees();
    if tilt_compensated_heading < 0.0 {
        tilt_compensated_heading += 360.0;
    }

    // magnitude == 0 时为 NaN
    let gravity_vector = (a.z / magnitude).acos().to_degrees();

    let horizontal_acceleration = (a.x * a.x + a.y * a.y).sqrt();

    ProcessedOrientation {
        pitch: round_to(pitch, 1),
        roll: round_to(roll, 1),
        heading: wrap_degrees(round_to(heading, 2)),
        magnitude: round_to(magnitude, 2),
        tilt_compensated_heading: wrap_degrees(round_to(tilt_compensated_heading, 2)),
        gravity_vector: round_to(gravity_vector, 2),
        horizontal_acceleration: round_to(horizontal_acceleration, 2),
    }
}

/// 八方位
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinal {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl Cardinal {
    const ALL: [Cardinal; 8] = [
        Cardinal::N,
        Cardinal::NE,
        Cardinal::E,
        Cardinal::SE,
        Cardinal::S,
        Cardinal::SW,
        Cardinal::W,
        Cardinal::NW,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Cardinal::N => "N",
            Cardinal::NE => "NE",
            Cardinal::E => "E",
            Cardinal::SE => "SE",
            Cardinal::S => "S",
            Cardinal::SW => "SW",
            Cardinal::W => "W",
            Cardinal::NW => "NW",
        }
    }
}

impl fmt::Display for Cardinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 航向角对应的八方位，每 45° 一格
pub fn cardinal_direction(degrees: f64) -> Cardinal {
    let index = (degrees / 45.0).round().rem_euclid(8.0) as usize;
    Cardinal::ALL[index % 8]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Axes;
    use approx::assert_relative_eq;
    use rand::Rng;

    fn reading(a: (f64, f64, f64), m: (f64, f64, f64)) -> RawReading {
        RawReading::new(
            Axes::new(a.0, a.1, a.2),
            Axes::new(m.0, m.1, m.2),
            0.0,
            0.0,
            0,
        )
    }

    #[test]
    fn test_level_device_facing_north() {
        let result = process(&reading((0.0, 0.0, 9.8), (20.0, 0.0, 0.0)));

        assert_eq!(result.pitch, 0.0);
        assert_eq!(result.roll, 0.0);
        assert_eq!(result.heading, 0.0);
        assert_eq!(result.tilt_compensated_heading, 0.0);
        assert_eq!(result.magnitude, 9.8);
        assert_eq!(result.gravity_vector, 0.0);
        assert_eq!(result.horizontal_acceleration, 0.0);
    }

    #[test]
    fn test_pure_roll() {
        let result = process(&reading((9.8, 0.0, 0.0), (20.0, 0.0, 0.0)));

        assert_eq!(result.roll, 90.0);
        assert_eq!(result.pitch, 0.0);
        assert_eq!(result.gravity_vector, 90.0);
        assert_eq!(result.magnitude, 9.8);
        assert_eq!(result.horizontal_acceleration, 9.8);
    }

    #[test]
    fn test_negative_heading_wraps() {
        // atan2(-1, 0) = -90°
        let result = process(&reading((0.0, 0.0, 9.8), (0.0, -1.0, 0.0)));
        assert_eq!(result.heading, 270.0);
        assert_eq!(result.tilt_compensated_heading, 270.0);
    }

    #[test]
    fn test_heading_just_below_zero_stays_in_range() {
        // 非常接近 360° 的航向取整后会到 360，需要折回 0
        let result = process(&reading((0.0, 0.0, 9.8), (20.0, -0.000_01, 0.0)));
        assert_eq!(result.heading, 0.0);
        assert!(result.heading.is_sign_positive());
    }

    #[test]
    fn test_zero_magnitude_only_affects_gravity_vector() {
        let result = process(&reading((0.0, 0.0, 0.0), (0.0, 20.0, 0.0)));

        assert!(result.gravity_vector.is_nan());
        assert_eq!(result.magnitude, 0.0);
        assert_eq!(result.heading, 90.0);
        assert_eq!(result.pitch, 0.0);
        assert_eq!(result.roll, 0.0);
        assert_eq!(result.horizontal_acceleration, 0.0);
    }

    #[test]
    fn test_fields_match_rounded_formulas() {
        let raw = reading((1.234, -2.345, 9.1), (23.5, -11.25, 40.0));
        let result = process(&raw);

        let pitch = (-2.345f64).atan2(9.1).to_degrees();
        let roll = 1.234f64.atan2(9.1).to_degrees();
        let magnitude = (1.234f64.powi(2) + 2.345f64.powi(2) + 9.1f64.powi(2)).sqrt();
        let mut heading = (-11.25f64).atan2(23.5).to_degrees();
        if heading < 0.0 {
            heading += 360.0;
        }

        assert_eq!(result.pitch, round_to(pitch, 1));
        assert_eq!(result.roll, round_to(roll, 1));
        assert_eq!(result.heading, round_to(heading, 2));
        assert_eq!(result.magnitude, round_to(magnitude, 2));
        assert_eq!(
            result.horizontal_acceleration,
            round_to((1.234f64.powi(2) + 2.345f64.powi(2)).sqrt(), 2)
        );
        assert_relative_eq!(result.magnitude, 9.48, epsilon = 1e-9);
    }

    #[test]
    fn test_tilt_compensation_changes_heading_when_tilted() {
        let level = process(&reading((0.0, 0.0, 9.8), (20.0, 5.0, -30.0)));
        let tilted = process(&reading((0.0, 4.0, 8.9), (20.0, 5.0, -30.0)));

        assert_eq!(level.heading, tilted.heading);
        assert_ne!(tilted.heading, tilted.tilt_compensated_heading);
    }

    #[test]
    fn test_process_is_idempotent() {
        let raw = reading((0.31, -9.2, 2.7), (-14.0, 33.3, 8.5));
        let first = process(&raw);
        let second = process(&raw);

        assert_eq!(first.pitch.to_bits(), second.pitch.to_bits());
        assert_eq!(first.heading.to_bits(), second.heading.to_bits());
        assert_eq!(
            first.tilt_compensated_heading.to_bits(),
            second.tilt_compensated_heading.to_bits()
        );
        assert_eq!(first.gravity_vector.to_bits(), second.gravity_vector.to_bits());
        assert_eq!(first, second);
    }

    #[test]
    fn test_headings_always_in_range() {
        let mut rng = rand::rng();

        for _ in 0..5000 {
            let raw = reading(
                (
                    rng.random_range(-20.0..20.0),
                    rng.random_range(-20.0..20.0),
                    rng.random_range(-20.0..20.0),
                ),
                (
                    rng.random_range(-60.0..60.0),
                    rng.random_range(-60.0..60.0),
                    rng.random_range(-60.0..60.0),
                ),
            );
            let result = process(&raw);

            assert!(
                (0.0..360.0).contains(&result.heading),
                "heading out of range: {}",
                result.heading
            );
            assert!(
                (0.0..360.0).contains(&result.tilt_compensated_heading),
                "tilt compensated heading out of range: {}",
                result.tilt_compensated_heading
            );
        }
    }

    #[test]
    fn test_cardinal_direction() {
        assert_eq!(cardinal_direction(0.0), Cardinal::N);
        assert_eq!(cardinal_direction(22.4), Cardinal::N);
        assert_eq!(cardinal_direction(22.5), Cardinal::NE);
        assert_eq!(cardinal_direction(90.0), Cardinal::E);
        assert_eq!(cardinal_direction(180.0), Cardinal::S);
        assert_eq!(cardinal_direction(270.0), Cardinal::W);
        assert_eq!(cardinal_direction(315.0), Cardinal::NW);
        assert_eq!(cardinal_direction(350.0), Cardinal::N);
        assert_eq!(cardinal_direction(359.99).to_string(), "N");
    }
}
