use std::fmt;

use process::{NoteMetadata, QUALITY_COUNT};
use serde::{Deserialize, Serialize};

use crate::Error;

macro_rules! id_enum {
    ($name:ident, $what:literal { $($variant:ident = $id:literal => $label:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "IdOrName", into = "u8")]
        pub enum $name {
            $($variant = $id),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn id(self) -> u8 {
                self as u8
            }

            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl TryFrom<IdOrName> for $name {
            type Error = Error;

            fn try_from(value: IdOrName) -> Result<Self, Self::Error> {
                match value {
                    IdOrName::Id(id) => id.try_into(),
                    IdOrName::Name(name) => name.parse(),
                }
            }
        }

        impl TryFrom<u8> for $name {
            type Error = Error;

            fn try_from(id: u8) -> Result<Self, Self::Error> {
                match id {
                    $($id => Ok($name::$variant),)+
                    _ => Err(Error::UnknownId { what: $what, id }),
                }
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                value.id()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl std::str::FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.name() == s)
                    .ok_or_else(|| Error::UnknownName { what: $what, name: s.to_string() })
            }
        }
    };
}

/// Wire form of the id enums: NSynth writes numeric ids, configs may use names.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IdOrName {
    Id(u8),
    Name(String),
}

id_enum!(InstrumentFamily, "instrument family" {
    Bass = 0 => "bass",
    Brass = 1 => "brass",
    Flute = 2 => "flute",
    Guitar = 3 => "guitar",
    Keyboard = 4 => "keyboard",
    Mallet = 5 => "mallet",
    Organ = 6 => "organ",
    Reed = 7 => "reed",
    String = 8 => "string",
    SynthLead = 9 => "synth_lead",
    Vocal = 10 => "vocal",
});

id_enum!(InstrumentSource, "instrument source" {
    Acoustic = 0 => "acoustic",
    Electronic = 1 => "electronic",
    Synthetic = 2 => "synthetic",
});

/// One entry of an NSynth `examples.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub note: u32,
    pub note_str: String,
    pub instrument: u32,
    pub instrument_str: String,
    pub instrument_family: InstrumentFamily,
    pub instrument_family_str: String,
    pub instrument_source: InstrumentSource,
    pub instrument_source_str: String,
    pub pitch: u8,
    pub velocity: u8,
    pub sample_rate: u32,
    pub qualities: [u8; QUALITY_COUNT],
    #[serde(default)]
    pub qualities_str: Vec<String>,
}

impl NoteRecord {
    pub fn metadata(&self) -> NoteMetadata {
        NoteMetadata {
            instrument_source: self.instrument_source.id(),
            pitch: self.pitch,
            velocity: self.velocity,
            qualities: self.qualities,
        }
    }
}

/// A record with its decoded mono waveform.
#[derive(Debug, Clone)]
pub struct Note {
    pub record: NoteRecord,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}
