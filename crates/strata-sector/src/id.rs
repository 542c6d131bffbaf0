use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable sector identifier, unique within one model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectorId(pub u32);

impl fmt::Display for SectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SectorId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Identifies one loaded model (one engine instance) among several.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(pub u32);

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model#{}", self.0)
    }
}

/// Level of geometric detail a sector is fetched and drawn at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fidelity {
    /// Coarse quad/point primitives.
    Simple,
    /// Full mesh data.
    Detailed,
}

impl Fidelity {
    pub const ALL: [Fidelity; 2] = [Fidelity::Simple, Fidelity::Detailed];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Fidelity::Simple => "simple",
            Fidelity::Detailed => "detailed",
        }
    }
}

impl fmt::Display for Fidelity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
