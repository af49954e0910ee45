//! ID types for the connection index

use core::fmt;

/// Global neuron identifier (1-based, process-wide after population offsetting)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Gid(pub u32);

impl Gid {
    /// Create a new gid
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub const fn raw(&self) -> u32 {
        self.0
    }
}

impl From<u32> for Gid {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an edge population: the (source, destination) node population pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PopulationId {
    /// Source node population
    pub source: u32,
    /// Destination node population
    pub dest: u32,
}

impl PopulationId {
    /// The base population `(0, 0)`
    pub const BASE: Self = Self { source: 0, dest: 0 };

    /// Create a new population id
    pub const fn new(source: u32, dest: u32) -> Self {
        Self { source, dest }
    }
}

impl From<(u32, u32)> for PopulationId {
    fn from((source, dest): (u32, u32)) -> Self {
        Self { source, dest }
    }
}

impl fmt::Display for PopulationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.source, self.dest)
    }
}

#[cfg(feature = "serde")]
mod serde_impls {
    use super::*;
    use serde::{Deserialize, Serialize};

    impl Serialize for Gid {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            self.0.serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for Gid {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            let id = u32::deserialize(deserializer)?;
            Ok(Gid::new(id))
        }
    }

    impl Serialize for PopulationId {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            (self.source, self.dest).serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for PopulationId {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            let (source, dest) = <(u32, u32)>::deserialize(deserializer)?;
            Ok(PopulationId::new(source, dest))
        }
    }
}
