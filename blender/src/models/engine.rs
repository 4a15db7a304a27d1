use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[error("Unknown render engine: {0}")]
pub struct EngineError(String);

#[derive(Debug, Copy, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Engine {
    Cycles,
    #[default]
    Eevee,
    Workbench,
}

impl FromStr for Engine {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CYCLES" => Ok(Engine::Cycles),
            "EEVEE" | "BLENDER_EEVEE" => Ok(Engine::Eevee),
            "WORKBENCH" | "BLENDER_WORKBENCH" => Ok(Engine::Workbench),
            _ => Err(EngineError(s.to_owned())),
        }
    }
}

// value passed to -E
impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Engine::Cycles => "CYCLES",
            Engine::Eevee => "BLENDER_EEVEE",
            Engine::Workbench => "BLENDER_WORKBENCH",
        };
        f.write_str(name)
    }
}
