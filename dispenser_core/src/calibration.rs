//! Linear conversion from current-loop receiver counts to engineering units.

use crate::error::{DispenserError, Result};

/// `value = gain * raw + offset`, evaluated in f64 so large raw counts keep
/// their precision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopCalibration {
    pub gain: f64,
    pub offset: f64,
}

impl LoopCalibration {
    /// 0.9..15 L/min across 4..20 mA with 16-bit sampling.
    pub const FLOW_16BIT: Self = Self {
        gain: 0.000_602_781_008_4,
        offset: -2.625_000_000_9,
    };

    /// -25..125 °C across 4..20 mA with 16-bit sampling.
    pub const TEMPERATURE_16BIT: Self = Self {
        gain: 0.006_412_563_919,
        offset: -62.500_000_005_5,
    };

    pub const fn new(gain: f64, offset: f64) -> Self {
        Self { gain, offset }
    }

    /// Derive gain/offset from two `(raw, value)` anchors, typically the raw
    /// counts at 4 mA and 20 mA and the values they stand for.
    pub fn from_span(lo: (i32, f64), hi: (i32, f64)) -> Result<Self> {
        let dx = f64::from(hi.0) - f64::from(lo.0);
        if dx == 0.0 {
            return Err(DispenserError::Config("calibration anchors share a raw value".into()).into());
        }
        let gain = (hi.1 - lo.1) / dx;
        if !gain.is_finite() || gain == 0.0 {
            return Err(DispenserError::Config(format!(
                "calibration anchors give an unusable gain ({gain})"
            ))
            .into());
        }
        Ok(Self {
            gain,
            offset: lo.1 - gain * f64::from(lo.0),
        })
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub fn apply(&self, raw: i32) -> f32 {
        (self.gain * f64::from(raw) + self.offset) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_the_loop_span() {
        // 4 mA and 20 mA land on these counts with a 16-bit receiver.
        let flow = LoopCalibration::FLOW_16BIT;
        assert!((flow.apply(5846) - 0.9).abs() < 0.01);
        assert!((flow.apply(29239) - 15.0).abs() < 0.01);
        let temp = LoopCalibration::TEMPERATURE_16BIT;
        assert!((temp.apply(5848) - -25.0).abs() < 0.05);
        assert!((temp.apply(29240) - 125.0).abs() < 0.05);
    }

    #[test]
    fn from_span_reproduces_anchors() {
        let cal = LoopCalibration::from_span((1000, 0.0), (3000, 10.0)).unwrap();
        assert!((cal.apply(1000)).abs() < 1e-6);
        assert!((cal.apply(3000) - 10.0).abs() < 1e-6);
        assert!((cal.apply(2000) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn from_span_rejects_degenerate_anchors() {
        assert!(LoopCalibration::from_span((10, 0.0), (10, 5.0)).is_err());
        assert!(LoopCalibration::from_span((10, 5.0), (20, 5.0)).is_err());
    }
}
