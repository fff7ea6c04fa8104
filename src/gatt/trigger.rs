//! ES Trigger Setting: when does an update produce a notification.
//!
//! | Code | Condition             | Operand         |
//! |------|-----------------------|-----------------|
//! | 0x00 | inactive              | none            |
//! | 0x01 | fixed interval        | u24 seconds     |
//! | 0x02 | no less than interval | u24 seconds     |
//! | 0x03 | value changed         | none            |
//! | 0x04 | less than             | reference value |
//! | 0x05 | less or equal         | reference value |
//! | 0x06 | greater than          | reference value |
//! | 0x07 | greater or equal      | reference value |
//! | 0x08 | equal                 | reference value |
//! | 0x09 | not equal             | reference value |
//!
//! The descriptor is read-only; the condition is fixed by the firmware.
//! Time-based conditions (0x01, 0x02) encode on read but never fire: there
//! is no per-characteristic notification timer.

use heapless::Vec;

/// Largest encoded trigger setting: code byte plus a 4-byte reference.
pub const TRIGGER_MAX_LEN: usize = 5;

/// A characteristic value type the trigger can compare and encode.
pub trait TriggerValue: Copy + PartialEq + PartialOrd + Default {
    fn to_le(self) -> Vec<u8, 4>;
}

macro_rules! trigger_value {
    ($($t:ty),*) => {$(
        impl TriggerValue for $t {
            fn to_le(self) -> Vec<u8, 4> {
                let mut v = Vec::new();
                // at most 4 bytes
                let _ = v.extend_from_slice(&self.to_le_bytes());
                v
            }
        }
    )*};
}

trigger_value!(i16, u16, u32);

/// Notification condition with its operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger<T> {
    Inactive,
    FixedInterval { seconds: u32 },
    NoLessThan { seconds: u32 },
    ValueChanged,
    LessThan(T),
    LessOrEqual(T),
    GreaterThan(T),
    GreaterOrEqual(T),
    Equal(T),
    NotEqual(T),
}

impl<T: TriggerValue> Default for Trigger<T> {
    fn default() -> Self {
        Self::ValueChanged
    }
}

impl<T: TriggerValue> Trigger<T> {
    pub fn code(&self) -> u8 {
        match self {
            Self::Inactive => 0x00,
            Self::FixedInterval { .. } => 0x01,
            Self::NoLessThan { .. } => 0x02,
            Self::ValueChanged => 0x03,
            Self::LessThan(_) => 0x04,
            Self::LessOrEqual(_) => 0x05,
            Self::GreaterThan(_) => 0x06,
            Self::GreaterOrEqual(_) => 0x07,
            Self::Equal(_) => 0x08,
            Self::NotEqual(_) => 0x09,
        }
    }

    /// Whether moving from `old` to `new` should be notified.
    pub fn evaluate(&self, old: T, new: T) -> bool {
        match *self {
            Self::Inactive | Self::FixedInterval { .. } | Self::NoLessThan { .. } => false,
            Self::ValueChanged => new != old,
            Self::LessThan(r) => new < r,
            Self::LessOrEqual(r) => new <= r,
            Self::GreaterThan(r) => new > r,
            Self::GreaterOrEqual(r) => new >= r,
            Self::Equal(r) => new == r,
            Self::NotEqual(r) => new != r,
        }
    }

    /// Descriptor read value.
    pub fn encode(&self) -> Vec<u8, TRIGGER_MAX_LEN> {
        let mut out = Vec::new();
        // capacity covers code + u32 operand
        let _ = out.push(self.code());
        match *self {
            Self::Inactive | Self::ValueChanged => {}
            Self::FixedInterval { seconds } | Self::NoLessThan { seconds } => {
                let _ = out.extend_from_slice(&seconds.to_le_bytes()[..3]);
            }
            Self::LessThan(r)
            | Self::LessOrEqual(r)
            | Self::GreaterThan(r)
            | Self::GreaterOrEqual(r)
            | Self::Equal(r)
            | Self::NotEqual(r) => {
                let _ = out.extend_from_slice(&r.to_le());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_based_conditions_never_fire() {
        let t: Trigger<i16> = Trigger::FixedInterval { seconds: 10 };
        assert!(!t.evaluate(0, 100));
        let t: Trigger<i16> = Trigger::NoLessThan { seconds: 10 };
        assert!(!t.evaluate(0, 100));
        assert!(!Trigger::<i16>::Inactive.evaluate(0, 100));
    }

    #[test]
    fn comparisons_use_reference_not_old_value() {
        let t = Trigger::LessThan(1_000u16);
        assert!(t.evaluate(5_000, 999));
        assert!(!t.evaluate(0, 1_000));
        assert!(Trigger::GreaterOrEqual(-500i16).evaluate(0, -500));
        assert!(Trigger::NotEqual(7u32).evaluate(7, 8));
        assert!(!Trigger::Equal(7u32).evaluate(7, 8));
    }

    #[test]
    fn value_changed_compares_old_and_new() {
        let t = Trigger::<i16>::ValueChanged;
        assert!(!t.evaluate(2_000, 2_000));
        assert!(t.evaluate(2_000, 2_005));
    }

    #[test]
    fn encodings() {
        assert_eq!(Trigger::<i16>::ValueChanged.encode().as_slice(), &[0x03]);
        assert_eq!(
            Trigger::<u16>::FixedInterval { seconds: 0x01_0203 }.encode().as_slice(),
            &[0x01, 0x03, 0x02, 0x01]
        );
        assert_eq!(
            Trigger::GreaterThan(-4_000i16).encode().as_slice(),
            &[0x06, 0x60, 0xF0]
        );
        assert_eq!(
            Trigger::Equal(1_013_250u32).encode().as_slice(),
            &[0x08, 0x02, 0x76, 0x0F, 0x00]
        );
    }
}
