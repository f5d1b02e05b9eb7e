//! Change events carried on the bus.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The global counter value right after a mutation.
///
/// Consumers treat it as the latest known value, never as a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub value: i64,
}

impl ChangeEvent {
    pub fn new(value: i64) -> Self {
        Self { value }
    }

    /// Bus wire form: the stringified integer.
    pub fn to_message(&self) -> String {
        self.value.to_string()
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl FromStr for ChangeEvent {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self::new)
    }
}
