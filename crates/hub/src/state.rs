use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightLevel {
    Low,
    Medium,
    High,
}

impl LightLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for LightLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LightLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown light level '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PumpStatus {
    Idle,
    Running,
}

// ---------------------------------------------------------------------------
// Core state
// ---------------------------------------------------------------------------

/// The single live view of the garden.  Owned by the coordinator and only
/// mutated while its lock is held.
#[derive(Debug, Clone)]
pub struct SystemState {
    /// Kept fractional so the slow idle decay accumulates between ticks.
    pub moisture: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub light_level: LightLevel,
    pub is_watering: bool,
}

/// What viewers receive in a `system_status` event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub moisture_level: u8,
    pub temperature: f64,
    pub humidity: f64,
    pub light_level: LightLevel,
    pub is_watering: bool,
    pub pump_status: PumpStatus,
}

impl SystemState {
    pub fn new(moisture: f64, light_level: LightLevel) -> Self {
        Self {
            moisture: moisture.clamp(0.0, 100.0),
            temperature: 24.0,
            humidity: 65.0,
            light_level,
            is_watering: false,
        }
    }

    /// Moisture as reported to viewers and stored in logs.
    pub fn moisture_level(&self) -> u8 {
        self.moisture.round().clamp(0.0, 100.0) as u8
    }

    pub fn pump_status(&self) -> PumpStatus {
        if self.is_watering {
            PumpStatus::Running
        } else {
            PumpStatus::Idle
        }
    }

    /// Build the JSON-serialisable status snapshot.
    pub fn to_status(&self) -> SystemStatus {
        SystemStatus {
            moisture_level: self.moisture_level(),
            temperature: self.temperature,
            humidity: self.humidity,
            light_level: self.light_level,
            is_watering: self.is_watering,
            pump_status: self.pump_status(),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pump_status_follows_is_watering() {
        let mut st = SystemState::new(50.0, LightLevel::High);
        assert_eq!(st.to_status().pump_status, PumpStatus::Idle);
        st.is_watering = true;
        assert_eq!(st.to_status().pump_status, PumpStatus::Running);
    }

    #[test]
    fn moisture_level_rounds_fractional_value() {
        let mut st = SystemState::new(67.6, LightLevel::High);
        assert_eq!(st.moisture_level(), 68);
        st.moisture = 67.4;
        assert_eq!(st.moisture_level(), 67);
    }

    #[test]
    fn new_clamps_initial_moisture() {
        assert_eq!(SystemState::new(140.0, LightLevel::Low).moisture_level(), 100);
        assert_eq!(SystemState::new(-3.0, LightLevel::Low).moisture_level(), 0);
    }

    #[test]
    fn status_serializes_camel_case() {
        let st = SystemState::new(68.0, LightLevel::High);
        let json = serde_json::to_value(st.to_status()).unwrap();
        assert_eq!(json["moistureLevel"], 68);
        assert_eq!(json["lightLevel"], "high");
        assert_eq!(json["isWatering"], false);
        assert_eq!(json["pumpStatus"], "idle");
    }

    #[test]
    fn light_level_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<LightLevel>(), Ok(LightLevel::High));
        assert_eq!(" medium ".parse::<LightLevel>(), Ok(LightLevel::Medium));
        assert!("dim".parse::<LightLevel>().is_err());
    }
}
