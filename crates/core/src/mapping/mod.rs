use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Ilda2WavError, Point, Result};

/// Separator between descriptor tokens in a layout string.
pub const SEPARATOR: char = '|';

/// Point field routed to an audio channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Selector {
    X,
    Y,
    Z,
    /// Beam on/off gate: full scale when the point is lit, silence when blanked.
    Blank,
    /// The 8-bit color index stored in the low byte of the point status.
    Color,
}

impl Selector {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'X' => Some(Self::X),
            'Y' => Some(Self::Y),
            'Z' => Some(Self::Z),
            'B' => Some(Self::Blank),
            'C' => Some(Self::Color),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Self::X => 'X',
            Self::Y => 'Y',
            Self::Z => 'Z',
            Self::Blank => 'B',
            Self::Color => 'C',
        }
    }
}

/// Describes how a point field is routed to one output channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub selector: Selector,
    /// Gain applied to coordinate selectors. Ignored by `Blank` and `Color`.
    pub multiplier: f32,
}

impl ChannelDescriptor {
    pub fn new(selector: Selector, multiplier: f32) -> Self {
        Self {
            selector,
            multiplier,
        }
    }

    /// Computes the sample this channel carries for `point`.
    ///
    /// Coordinates are scaled, rounded to the nearest integer and saturated to
    /// the `i16` range; `NaN` maps to zero.
    pub fn sample(&self, point: &Point) -> i16 {
        match self.selector {
            Selector::X => scale(point.x, self.multiplier),
            Selector::Y => scale(point.y, self.multiplier),
            Selector::Z => scale(point.z, self.multiplier),
            Selector::Blank => {
                if point.status.is_blank() {
                    0
                } else {
                    i16::MAX
                }
            }
            Selector::Color => i16::from(point.status.color()),
        }
    }

    fn parse_token(token: &str) -> Option<Self> {
        let selector_char = token.chars().last()?;
        let selector = Selector::from_char(selector_char)?;
        let prefix = &token[..token.len() - selector_char.len_utf8()];
        let multiplier = if prefix.is_empty() {
            1.0
        } else {
            prefix.parse::<f32>().ok()?
        };
        Some(Self::new(selector, multiplier))
    }
}

// `as` from f32 saturates and sends NaN to zero.
fn scale(value: i16, multiplier: f32) -> i16 {
    (multiplier * f32::from(value)).round() as i16
}

impl fmt::Display for ChannelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.multiplier != 1.0 {
            write!(f, "{}", self.multiplier)?;
        }
        write!(f, "{}", self.selector.as_char())
    }
}

/// Ordered list of 2 or 4 channel descriptors; one entry per output channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelLayout {
    channels: Vec<ChannelDescriptor>,
}

impl ChannelLayout {
    /// Parses a layout such as `Y|-1X|B|C`.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let malformed = || Ilda2WavError::MalformedDescriptor(descriptor.to_string());

        let tokens: Vec<&str> = descriptor.split(SEPARATOR).collect();
        if !matches!(tokens.len(), 2 | 4) {
            return Err(malformed());
        }

        let channels = tokens
            .into_iter()
            .map(ChannelDescriptor::parse_token)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(malformed)?;

        Ok(Self { channels })
    }

    pub fn channels(&self) -> &[ChannelDescriptor] {
        &self.channels
    }

    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }
}

impl FromStr for ChannelLayout {
    type Err = Ilda2WavError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ChannelLayout {
    type Error = Ilda2WavError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ChannelLayout> for String {
    fn from(layout: ChannelLayout) -> Self {
        layout.to_string()
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, channel) in self.channels.iter().enumerate() {
            if i > 0 {
                write!(f, "{SEPARATOR}")?;
            }
            write!(f, "{channel}")?;
        }
        Ok(())
    }
}
