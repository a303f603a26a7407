//! Sensor driver building blocks.
//!
//! - [`RawSample`] converts ICM-42670 style big-endian register words to
//!   physical units.
//! - [`SelfTestSensor`] reports a push-button level instead of motion, for
//!   bench checks of the radio path without an IMU fitted.
//! - [`SimulatedImu`] produces a resting orientation plus noise.

use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Buf;
use rand::Rng;

use imunode_types::{AXIS_COUNT, ParseError, ParseResult};

use crate::error::Result;
use crate::traits::SensorDriver;

/// Accelerometer sensitivity at ±16 g full scale.
pub const ACCEL_LSB_PER_G: f32 = 2048.0;

/// Gyroscope sensitivity at ±2000 deg/s full scale.
pub const GYRO_LSB_PER_DPS: f32 = 16.4;

/// Six raw register words: accel X/Y/Z then gyro X/Y/Z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawSample {
    pub accel: [i16; 3],
    pub gyro: [i16; 3],
}

impl RawSample {
    /// Size of a burst read covering all six data registers.
    pub const LEN: usize = 12;

    /// Parse a burst read of the six data registers (big-endian words).
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] if fewer than
    /// [`Self::LEN`] bytes are given. Extra bytes are ignored.
    pub fn from_be_bytes(data: &[u8]) -> ParseResult<Self> {
        if data.len() < Self::LEN {
            return Err(ParseError::InsufficientBytes {
                expected: Self::LEN,
                actual: data.len(),
            });
        }
        let mut buf = data;
        let mut raw = Self::default();
        for word in raw.accel.iter_mut().chain(raw.gyro.iter_mut()) {
            *word = buf.get_i16();
        }
        Ok(raw)
    }

    /// Convert to g and deg/s.
    pub fn scaled(&self) -> [f32; AXIS_COUNT] {
        let mut out = [0.0; AXIS_COUNT];
        for (dst, raw) in out[..3].iter_mut().zip(self.accel) {
            *dst = f32::from(raw) / ACCEL_LSB_PER_G;
        }
        for (dst, raw) in out[3..].iter_mut().zip(self.gyro) {
            *dst = f32::from(raw) / GYRO_LSB_PER_DPS;
        }
        out
    }
}

/// Sensor stand-in that reports a button instead of motion.
///
/// Axis 0 is `1.0` while `pressed` returns `true`, `0.0` otherwise. All
/// other axes read zero.
pub struct SelfTestSensor<F> {
    pressed: F,
}

impl<F> SelfTestSensor<F>
where
    F: Fn() -> bool + Send + Sync,
{
    /// Create a self-test sensor polling `pressed` on every read.
    pub fn new(pressed: F) -> Self {
        Self { pressed }
    }
}

impl<F> std::fmt::Debug for SelfTestSensor<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelfTestSensor").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> SensorDriver for SelfTestSensor<F>
where
    F: Fn() -> bool + Send + Sync,
{
    async fn read_sample(&self) -> Result<[f32; AXIS_COUNT]> {
        let mut axes = [0.0; AXIS_COUNT];
        if (self.pressed)() {
            axes[0] = 1.0;
        }
        Ok(axes)
    }
}

/// Simulated IMU at rest: gravity along one axis plus uniform noise.
#[derive(Debug)]
pub struct SimulatedImu {
    gravity: [f32; 3],
    accel_noise: f32,
    gyro_noise: f32,
    reads: Mutex<u64>,
}

impl Default for SimulatedImu {
    fn default() -> Self {
        Self::new(0.02, 0.5)
    }
}

impl SimulatedImu {
    /// Create a level IMU (1 g on Z) with the given noise amplitudes in
    /// g and deg/s.
    pub fn new(accel_noise: f32, gyro_noise: f32) -> Self {
        Self {
            gravity: [0.0, 0.0, 1.0],
            accel_noise: accel_noise.abs(),
            gyro_noise: gyro_noise.abs(),
            reads: Mutex::new(0),
        }
    }

    /// Orient gravity along `gravity` (in g).
    #[must_use]
    pub fn with_gravity(mut self, gravity: [f32; 3]) -> Self {
        self.gravity = gravity;
        self
    }

    /// Number of samples produced so far.
    pub fn reads(&self) -> u64 {
        *self.reads.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn noise(rng: &mut impl Rng, amplitude: f32) -> f32 {
        if amplitude == 0.0 {
            0.0
        } else {
            rng.random_range(-amplitude..=amplitude)
        }
    }
}

#[async_trait]
impl SensorDriver for SimulatedImu {
    async fn read_sample(&self) -> Result<[f32; AXIS_COUNT]> {
        let mut rng = rand::rng();
        let mut axes = [0.0; AXIS_COUNT];
        for (axis, g) in axes[..3].iter_mut().zip(self.gravity) {
            *axis = g + Self::noise(&mut rng, self.accel_noise);
        }
        for axis in &mut axes[3..] {
            *axis = Self::noise(&mut rng, self.gyro_noise);
        }
        *self.reads.lock().unwrap_or_else(std::sync::PoisonError::into_inner) += 1;
        Ok(axes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_raw_sample_parse_and_scale() {
        // accel: 2048, -2048, 1024; gyro: 164, -164, 0
        let data = [
            0x08, 0x00, 0xF8, 0x00, 0x04, 0x00, 0x00, 0xA4, 0xFF, 0x5C, 0x00, 0x00,
        ];
        let raw = RawSample::from_be_bytes(&data).unwrap();
        assert_eq!(raw.accel, [2048, -2048, 1024]);
        assert_eq!(raw.gyro, [164, -164, 0]);

        let scaled = raw.scaled();
        assert_eq!(&scaled[..3], &[1.0, -1.0, 0.5]);
        assert!((scaled[3] - 10.0).abs() < 1e-4);
        assert!((scaled[4] + 10.0).abs() < 1e-4);
        assert_eq!(scaled[5], 0.0);
    }

    #[test]
    fn test_raw_sample_too_short() {
        assert_eq!(
            RawSample::from_be_bytes(&[0; 11]),
            Err(ParseError::InsufficientBytes {
                expected: 12,
                actual: 11
            })
        );
    }

    #[tokio::test]
    async fn test_self_test_sensor_follows_button() {
        let button = Arc::new(AtomicBool::new(false));
        let probe = Arc::clone(&button);
        let sensor = SelfTestSensor::new(move || probe.load(Ordering::Relaxed));

        assert_eq!(sensor.read_sample().await.unwrap(), [0.0; AXIS_COUNT]);
        button.store(true, Ordering::Relaxed);
        let axes = sensor.read_sample().await.unwrap();
        assert_eq!(axes[0], 1.0);
        assert!(axes[1..].iter().all(|&a| a == 0.0));
    }

    #[tokio::test]
    async fn test_simulated_imu_stays_near_rest() {
        let imu = SimulatedImu::new(0.05, 1.0);
        for _ in 0..100 {
            let [ax, ay, az, gx, gy, gz] = imu.read_sample().await.unwrap();
            assert!(ax.abs() <= 0.05 && ay.abs() <= 0.05);
            assert!((az - 1.0).abs() <= 0.05 + f32::EPSILON);
            assert!(gx.abs() <= 1.0 && gy.abs() <= 1.0 && gz.abs() <= 1.0);
        }
        assert_eq!(imu.reads(), 100);
    }

    #[tokio::test]
    async fn test_simulated_imu_without_noise() {
        let imu = SimulatedImu::new(0.0, 0.0).with_gravity([1.0, 0.0, 0.0]);
        assert_eq!(
            imu.read_sample().await.unwrap(),
            [1.0, 0.0, 0.0, 0.0, 0.0, 0.0]
        );
    }
}
