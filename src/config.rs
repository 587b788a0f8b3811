use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// What the ring editor does with a point that equals an existing vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CoincidentVertex {
    /// Insert anyway; the ring gains a duplicate vertex.
    #[default]
    Duplicate,
    /// Leave the ring as it is.
    Merge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditConfig {
    /// Maximum distance, in map units, between a node and a ring segment for
    /// the node to be considered on that ring.
    pub snap_tolerance: f64,
    pub coincident_vertex: CoincidentVertex,
    #[serde(rename = "fetchTimeoutMs", with = "millis")]
    pub fetch_timeout: Option<Duration>,
}

impl Default for EditConfig {
    fn default() -> Self {
        Self {
            snap_tolerance: 1e-6,
            coincident_vertex: CoincidentVertex::Duplicate,
            fetch_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl EditConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.snap_tolerance.is_finite() || self.snap_tolerance < 0.0 {
            return Err(ConfigError::SnapTolerance(self.snap_tolerance));
        }
        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
