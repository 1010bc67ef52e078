//! Person payloads and the request that starts a team workflow.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A generated person. Built once by the decoder and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub first_name: String,
    pub last_name: String,
    pub location: String,
    pub female: bool,
}

impl Person {
    pub fn new(first_name: &str, last_name: &str, location: &str, female: bool) -> Self {
        Self {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            location: location.to_string(),
            female,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl std::fmt::Display for Person {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.first_name, self.last_name, self.location)
    }
}

/// Input for one team workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationRequest {
    leader_is_female: bool,
    team_size: usize,
}

impl CreationRequest {
    pub fn new(leader_is_female: bool, team_size: usize) -> Result<Self> {
        if team_size == 0 {
            return Err(Error::Validation("team_size must be at least 1".into()));
        }
        Ok(Self {
            leader_is_female,
            team_size,
        })
    }

    /// Random leader gender and a team size in `min..=max`.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, min: usize, max: usize) -> Result<Self> {
        if min == 0 || min > max {
            return Err(Error::Validation(format!(
                "invalid team size bounds {}..={}",
                min, max
            )));
        }
        Self::new(rng.gen_bool(0.5), rng.gen_range(min..=max))
    }

    pub fn leader_is_female(&self) -> bool {
        self.leader_is_female
    }

    pub fn team_size(&self) -> usize {
        self.team_size
    }
}
