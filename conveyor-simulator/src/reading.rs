use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

const MOTOR_STATUSES: [&str; 3] = ["running", "stopped", "warning"];
const SENSOR_STATUSES: [&str; 2] = ["ok", "blocked"];

/// One simulated conveyor reading, serialized as the flat wire object.
#[derive(Debug, Clone, Serialize)]
pub struct Reading {
    pub conveyor_count: u8,
    pub position_in_sequence: u8,
    pub number_of_pieces: u16,
    pub last_piece_time: f64,
    pub motor_operating_time: f64,
    pub motor_status: &'static str,
    pub input_sensor_status: &'static str,
    pub output_sensor_status: &'static str,
    pub temperature: f64,
    pub vibration: f64,
    pub current: f64,
    pub energy_consumption: f64,
    pub battery_level: u8,
    pub load_level: u8,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn pick<R: Rng + ?Sized>(rng: &mut R, choices: &[&'static str]) -> &'static str {
    choices.choose(rng).copied().unwrap_or(choices[0])
}

impl Reading {
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            conveyor_count: rng.gen_range(1..=5),
            position_in_sequence: rng.gen_range(1..=5),
            number_of_pieces: rng.gen_range(0..=1000),
            last_piece_time: round2(rng.gen_range(0.5..=10.0)),
            motor_operating_time: round2(rng.gen_range(0.5..=10.0)),
            motor_status: pick(rng, &MOTOR_STATUSES),
            input_sensor_status: pick(rng, &SENSOR_STATUSES),
            output_sensor_status: pick(rng, &SENSOR_STATUSES),
            temperature: round2(rng.gen_range(25.0..=50.0)),
            vibration: round2(rng.gen_range(0.1..=5.0)),
            current: round2(rng.gen_range(5.0..=20.0)),
            energy_consumption: round2(rng.gen_range(5.0..=20.0)),
            battery_level: rng.gen_range(0..=100),
            load_level: rng.gen_range(0..=100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_readings_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let r = Reading::random(&mut rng);
            assert!((1..=5).contains(&r.conveyor_count));
            assert!((1..=5).contains(&r.position_in_sequence));
            assert!(r.number_of_pieces <= 1000);
            assert!((0.5..=10.0).contains(&r.last_piece_time));
            assert!((25.0..=50.0).contains(&r.temperature));
            assert!((0.1..=5.0).contains(&r.vibration));
            assert!((5.0..=20.0).contains(&r.current));
            assert!(r.battery_level <= 100);
            assert!(r.load_level <= 100);
            assert!(MOTOR_STATUSES.contains(&r.motor_status));
            assert!(SENSOR_STATUSES.contains(&r.input_sensor_status));
        }
    }

    #[test]
    fn test_two_decimal_places() {
        assert_eq!(round2(3.14159), 3.14);
        assert_eq!(round2(2.005_1), 2.01);
    }

    #[test]
    fn test_serializes_flat_object() {
        let mut rng = StdRng::seed_from_u64(1);
        let json = serde_json::to_value(Reading::random(&mut rng)).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 14);
        assert!(object.contains_key("energy_consumption"));
        assert!(object["motor_status"].is_string());
    }
}
