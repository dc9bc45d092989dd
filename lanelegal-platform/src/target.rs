//! Named target generations.

use std::fmt;
use std::str::FromStr;

/// Hardware generation a capability preset describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Generation {
    Gen6,
    Gen7,
    Gen75,
    Gen8,
    Gen9,
    Gen11,
    Gen12,
}

impl Generation {
    pub const ALL: [Generation; 7] = [
        Generation::Gen6,
        Generation::Gen7,
        Generation::Gen75,
        Generation::Gen8,
        Generation::Gen9,
        Generation::Gen11,
        Generation::Gen12,
    ];

    /// Version number times ten, e.g. 75 for Gen75
    pub fn verx10(self) -> u32 {
        match self {
            Self::Gen6 => 60,
            Self::Gen7 => 70,
            Self::Gen75 => 75,
            Self::Gen8 => 80,
            Self::Gen9 => 90,
            Self::Gen11 => 110,
            Self::Gen12 => 120,
        }
    }
}

impl FromStr for Generation {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gen6" | "snb" => Ok(Self::Gen6),
            "gen7" | "ivb" => Ok(Self::Gen7),
            "gen75" | "hsw" => Ok(Self::Gen75),
            "gen8" | "bdw" => Ok(Self::Gen8),
            "gen9" | "skl" => Ok(Self::Gen9),
            "gen11" | "icl" => Ok(Self::Gen11),
            "gen12" | "tgl" => Ok(Self::Gen12),
            _ => Err("Unknown generation"),
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Gen6 => "gen6",
            Self::Gen7 => "gen7",
            Self::Gen75 => "gen75",
            Self::Gen8 => "gen8",
            Self::Gen9 => "gen9",
            Self::Gen11 => "gen11",
            Self::Gen12 => "gen12",
        };
        write!(f, "{}", s)
    }
}
