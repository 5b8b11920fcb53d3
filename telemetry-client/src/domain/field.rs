use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Longest field name accepted through the `Custom` escape hatch.
pub const MAX_FIELD_NAME_LEN: usize = 64;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid field name '{name}': {reason}")]
pub struct InvalidFieldName {
    pub name: String,
    pub reason: &'static str,
}

fn check_custom_name(name: &str) -> Result<(), InvalidFieldName> {
    if name.is_empty() {
        return Err(InvalidFieldName {
            name: name.to_string(),
            reason: "must not be empty",
        });
    }
    if name.len() > MAX_FIELD_NAME_LEN {
        return Err(InvalidFieldName {
            name: name.to_string(),
            reason: "longer than 64 characters",
        });
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(InvalidFieldName {
            name: name.to_string(),
            reason: "only ASCII letters, digits, '_', '-' and '.' are allowed",
        });
    }
    Ok(())
}

/// Measured quantity carried by a sensor sample.
///
/// Each value becomes one field column of the `sensor_data` measurement.
/// Sensor types the service does not know yet go through `Custom`, which
/// only admits a conservative identifier charset so the name can be placed
/// in generated query text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SensorField {
    Temperature,
    Humidity,
    Pressure,
    Light,
    Co2,
    Motion,
    Custom(String),
}

impl SensorField {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Pressure => "pressure",
            Self::Light => "light",
            Self::Co2 => "co2",
            Self::Motion => "motion",
            Self::Custom(name) => name,
        }
    }
}

impl FromStr for SensorField {
    type Err = InvalidFieldName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let field = match s {
            "temperature" => Self::Temperature,
            "humidity" => Self::Humidity,
            "pressure" => Self::Pressure,
            "light" => Self::Light,
            "co2" => Self::Co2,
            "motion" => Self::Motion,
            other => {
                check_custom_name(other)?;
                Self::Custom(other.to_string())
            }
        };
        Ok(field)
    }
}

/// Electrical quantity recorded in the `consumption_data` measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConsumptionMetric {
    Current,
    Voltage,
    Power,
}

impl ConsumptionMetric {
    /// Canonical metric set, used when a query names none.
    pub const ALL: [ConsumptionMetric; 3] = [Self::Current, Self::Voltage, Self::Power];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Voltage => "voltage",
            Self::Power => "power",
        }
    }
}

impl FromStr for ConsumptionMetric {
    type Err = InvalidFieldName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "current" => Ok(Self::Current),
            "voltage" => Ok(Self::Voltage),
            "power" => Ok(Self::Power),
            other => Err(InvalidFieldName {
                name: other.to_string(),
                reason: "expected one of current, voltage, power",
            }),
        }
    }
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

string_serde!(SensorField);
string_serde!(ConsumptionMetric);
