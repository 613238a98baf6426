// ── Global preference keys ──
//
// Process-wide UI preferences. Persisted by the preferences
// collaborator in `uxstore-config`, not by the store.

use strum::{Display, EnumString, IntoStaticStr};

use crate::enum_key_value;
use crate::key::{KeyDef, Namespace};
use crate::value::{KeyValue, ValueType};

pub const NAMESPACE: &str = "preferences";

pub const UNIT_TYPE: &str = "unit_type";
pub const AFC_ENABLED: &str = "afc_enabled";
pub const GRID_LINE_TYPE: &str = "grid_line_type";

const METERS_PER_FOOT: f64 = 0.3048;

/// Unit system used to display distances and speeds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum UnitType {
    #[default]
    Metric,
    Imperial,
}

enum_key_value!(UnitType, "unit_type");

impl UnitType {
    /// Convert a distance in meters into this unit system.
    pub fn distance_from_meters(self, meters: f64) -> f64 {
        match self {
            Self::Metric => meters,
            Self::Imperial => meters / METERS_PER_FOOT,
        }
    }
}

/// Camera view grid overlay.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum GridLineType {
    #[default]
    None,
    Parallel,
    ParallelDiagonal,
    Unknown,
}

enum_key_value!(GridLineType, "grid_line_type");

pub fn namespace() -> Namespace {
    Namespace::new(NAMESPACE)
        .with_key(KeyDef::new(UNIT_TYPE, UnitType::value_type()))
        .with_key(KeyDef::new(AFC_ENABLED, ValueType::Bool))
        .with_key(KeyDef::new(GRID_LINE_TYPE, GridLineType::value_type()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn unit_type_round_trips_through_value() {
        let v: Value = UnitType::Imperial.into();
        assert_eq!(v.to_string(), "unit_type::imperial");
        assert_eq!(UnitType::from_value(&v), Some(UnitType::Imperial));
    }

    #[test]
    fn enum_value_from_other_family_is_rejected() {
        let v: Value = GridLineType::Parallel.into();
        assert_eq!(UnitType::from_value(&v), None);
    }

    #[test]
    fn imperial_distance_is_in_feet() {
        let feet = UnitType::Imperial.distance_from_meters(3.048);
        assert!((feet - 10.0).abs() < 1e-9);
        assert!((UnitType::Metric.distance_from_meters(3.0) - 3.0).abs() < f64::EPSILON);
    }
}
