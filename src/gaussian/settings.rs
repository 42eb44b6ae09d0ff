use std::str::FromStr;

use bevy::prelude::*;
use clap::ValueEnum;
use serde::{
    Deserialize,
    Serialize,
};

use crate::error::SplatError;


#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    Hash,
    PartialEq,
    Serialize,
    Deserialize,
    ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    #[default]
    Medium,
    High,
}

impl QualityTier {
    /// level digit used by pre-encoded scene headers
    pub fn level(&self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }

    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Self::High,
            1 => Self::Medium,
            _ => Self::Low,
        }
    }
}

impl FromStr for QualityTier {
    type Err = SplatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "2" => Ok(Self::Low),
            "medium" | "1" => Ok(Self::Medium),
            "high" | "0" => Ok(Self::High),
            _ => Err(SplatError::UnknownQuality(s.to_string())),
        }
    }
}


#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Serialize,
    Deserialize,
)]
pub struct ChunkConfig {
    pub alpha_threshold: u8,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            alpha_threshold: 10,
        }
    }
}

impl ChunkConfig {
    pub fn effective_threshold(&self) -> u8 {
        self.alpha_threshold.max(5)
    }

    pub fn ln_threshold(&self) -> f32 {
        (self.effective_threshold() as f32 / 255.0).ln()
    }
}


#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Serialize,
    Deserialize,
)]
pub struct SortConfig {
    pub bucket_count: u32,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            bucket_count: 65536,
        }
    }
}


#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Serialize,
    Deserialize,
)]
pub struct TriggerConfig {
    pub rotation_cos: f32,
    pub sort_distance: f32,
    pub change_distance: f32,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            rotation_cos: 0.995,
            sort_distance: 1.0,
            change_distance: 0.5,
        }
    }
}


#[derive(
    Resource,
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Serialize,
    Deserialize,
)]
pub struct EngineSettings {
    pub chunk: ChunkConfig,
    pub sort: SortConfig,
    pub trigger: TriggerConfig,
}
