use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FormatError {
    #[error("Unknown image format: {0}")]
    InvalidInput(String),
}

// More context: https://docs.blender.org/api/current/bpy.types.ImageFormatSettings.html#bpy.types.ImageFormatSettings.file_format
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Format {
    TGA,
    RAWTGA,
    JPEG,
    IRIS,
    #[default]
    PNG,
    BMP,
    HDR,
    TIFF,
}

impl Format {
    /// File extension blender appends when `use_file_extension` is on.
    pub fn extension(&self) -> &'static str {
        match self {
            Format::TGA | Format::RAWTGA => "tga",
            Format::JPEG => "jpg",
            Format::IRIS => "rgb",
            Format::PNG => "png",
            Format::BMP => "bmp",
            Format::HDR => "hdr",
            Format::TIFF => "tif",
        }
    }
}

impl Serialize for Format {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Format {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

impl FromStr for Format {
    type Err = FormatError;

    // accepts both the command line names (-F) and the python identifiers
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TGA" | "TARGA" => Ok(Format::TGA),
            "RAWTGA" | "TARGA_RAW" => Ok(Format::RAWTGA),
            "JPEG" | "JPG" => Ok(Format::JPEG),
            "IRIS" => Ok(Format::IRIS),
            "PNG" => Ok(Format::PNG),
            "BMP" => Ok(Format::BMP),
            "HDR" => Ok(Format::HDR),
            "TIFF" | "TIF" => Ok(Format::TIFF),
            _ => Err(FormatError::InvalidInput(s.to_owned())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::TGA => "TARGA",
            Format::RAWTGA => "TARGA_RAW",
            Format::JPEG => "JPEG",
            Format::IRIS => "IRIS",
            Format::PNG => "PNG",
            Format::BMP => "BMP",
            Format::HDR => "HDR",
            Format::TIFF => "TIFF",
        };
        f.write_str(name)
    }
}
