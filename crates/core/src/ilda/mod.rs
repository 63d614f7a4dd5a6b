//! Decoder for ILDA laser animation streams.
//!
//! A stream is a sequence of tables. Every table starts with a 32-byte header
//! followed by `length` point records of 8 bytes; all integers are big-endian.
//! A header declaring zero points marks the end of the animation.
//!
//! The `index` and `total` header fields are carried through untouched. Their
//! consistency across tables is not checked: real-world files routinely get
//! them wrong and the conversion never depends on them.

use std::{
    fmt,
    io::{self, Read, Write},
};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::{Ilda2WavError, Result};

/// Magic bytes opening every table header.
pub const MAGIC: [u8; 4] = *b"ILDA";
/// Size of a table header on the wire.
pub const HEADER_LEN: usize = 32;
/// Size of one point record on the wire.
pub const POINT_LEN: usize = 8;
/// Width of the fixed info field.
pub const INFO_LEN: usize = 16;

/// Kind of content carried by a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TableType {
    Points3D = 0,
    Points2D = 1,
    Colors = 2,
}

impl TryFrom<u8> for TableType {
    type Error = Ilda2WavError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::Points3D),
            1 => Ok(Self::Points2D),
            2 => Ok(Self::Colors),
            other => Err(Ilda2WavError::corrupt(format!(
                "unknown table type code {other}"
            ))),
        }
    }
}

/// Point status word: flags in the high bits, color index in the low byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Status(pub u16);

impl Status {
    pub const BLANK_MASK: u16 = 0x4000;
    pub const LAST_POINT_MASK: u16 = 0x8000;

    /// Returns true when the beam is off for this point.
    pub fn is_blank(self) -> bool {
        self.0 & Self::BLANK_MASK == Self::BLANK_MASK
    }

    /// Returns true when this is the final point of its table.
    pub fn is_last(self) -> bool {
        self.0 & Self::LAST_POINT_MASK == Self::LAST_POINT_MASK
    }

    pub fn color(self) -> u8 {
        (self.0 & 0x00ff) as u8
    }
}

/// One beam position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i16,
    pub y: i16,
    pub z: i16,
    pub status: Status,
}

impl Point {
    fn read_from(mut r: impl Read) -> io::Result<Self> {
        Ok(Self {
            x: r.read_i16::<BigEndian>()?,
            y: r.read_i16::<BigEndian>()?,
            z: r.read_i16::<BigEndian>()?,
            status: Status(r.read_u16::<BigEndian>()?),
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_i16::<BigEndian>(self.x)?;
        w.write_i16::<BigEndian>(self.y)?;
        w.write_i16::<BigEndian>(self.z)?;
        w.write_u16::<BigEndian>(self.status.0)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let blank = if self.status.is_blank() { 'b' } else { ' ' };
        let last = if self.status.is_last() { 'l' } else { ' ' };
        write!(
            f,
            "{:6} {:6} {:6} {:3} {} {}",
            self.x,
            self.y,
            self.z,
            self.status.color(),
            blank,
            last
        )
    }
}

/// Table header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub table_type: TableType,
    /// Free-text label with the padding trimmed off. Each byte of the field
    /// maps to the char of the same code point.
    pub info: String,
    /// Declared number of points; zero terminates the animation.
    pub length: u16,
    /// 1-based position among sibling tables.
    pub index: u16,
    /// Total number of tables, or reserved.
    pub total: u16,
    /// Scanner head identifier.
    pub head: u8,
}

impl Header {
    /// Reads the next header. Returns `Ok(None)` when the stream ends exactly
    /// on a header boundary.
    fn read_from<R: Read>(r: &mut R) -> Result<Option<Self>> {
        let mut raw = [0u8; HEADER_LEN];
        let filled = fill(r, &mut raw)?;
        if filled == 0 {
            return Ok(None);
        }
        if filled >= MAGIC.len() && raw[..MAGIC.len()] != MAGIC {
            return Err(Ilda2WavError::corrupt(format!(
                "wrong magic {:02x?}",
                &raw[..MAGIC.len()]
            )));
        }
        if filled < HEADER_LEN {
            return Err(Ilda2WavError::corrupt(format!(
                "header truncated after {filled} of {HEADER_LEN} bytes"
            )));
        }

        Self::parse(&raw).map(Some)
    }

    fn parse(raw: &[u8; HEADER_LEN]) -> Result<Self> {
        // magic (4) + reserved (3)
        let mut cursor = &raw[7..];
        let table_type = TableType::try_from(cursor.read_u8()?)?;

        // ISO 8859-1: one char per byte, so any label survives a re-encode.
        let (info_bytes, mut cursor) = cursor.split_at(INFO_LEN);
        let info: String = info_bytes.iter().map(|&b| char::from(b)).collect();
        let info = info
            .trim_end_matches(|c: char| c.is_ascii_whitespace() || c == '\0')
            .to_string();

        Ok(Self {
            table_type,
            info,
            length: cursor.read_u16::<BigEndian>()?,
            index: cursor.read_u16::<BigEndian>()?,
            total: cursor.read_u16::<BigEndian>()?,
            head: cursor.read_u8()?,
        })
    }

    /// Serializes the header. The info label is space-padded (or cut) to its
    /// fixed width and the reserved bytes are zero. Characters outside
    /// ISO 8859-1 are written as `?`.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let mut info = [b' '; INFO_LEN];
        for (slot, c) in info.iter_mut().zip(self.info.chars()) {
            *slot = u8::try_from(c).unwrap_or(b'?');
        }

        w.write_all(&MAGIC)?;
        w.write_all(&[0; 3])?;
        w.write_u8(self.table_type as u8)?;
        w.write_all(&info)?;
        w.write_u16::<BigEndian>(self.length)?;
        w.write_u16::<BigEndian>(self.index)?;
        w.write_u16::<BigEndian>(self.total)?;
        w.write_u8(self.head)?;
        w.write_u8(0)
    }

    /// Header that ends an animation.
    pub fn terminator() -> Self {
        Self {
            table_type: TableType::Points3D,
            info: String::new(),
            length: 0,
            index: 0,
            total: 0,
            head: 0,
        }
    }
}

/// A table of points, i.e. one animation frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    header: Header,
    points: Vec<Point>,
}

impl Frame {
    /// Builds a frame; the header's declared length is taken from `points`.
    pub fn new(mut header: Header, points: Vec<Point>) -> Result<Self> {
        header.length = u16::try_from(points.len()).map_err(|_| {
            Ilda2WavError::msg(format!("{} points do not fit in one table", points.len()))
        })?;
        Ok(Self { header, points })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn read_points<R: Read>(r: &mut R, header: Header) -> Result<Self> {
        let mut raw = vec![0u8; usize::from(header.length) * POINT_LEN];
        let filled = fill(r, &mut raw)?;
        if filled < raw.len() {
            return Err(Ilda2WavError::corrupt(format!(
                "table {} truncated: {} of {} point bytes",
                header.index,
                filled,
                raw.len()
            )));
        }

        let points = raw
            .chunks_exact(POINT_LEN)
            .map(Point::read_from)
            .collect::<io::Result<Vec<_>>>()?;

        Ok(Self { header, points })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.header.write_to(w)?;
        self.points.iter().try_for_each(|point| point.write_to(w))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame {}, {}, {} points",
            self.header.index, self.header.info, self.header.length
        )
    }
}

/// Decoded animation: frames in stream order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Animation {
    frames: Vec<Frame>,
}

impl Animation {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    /// Decodes tables until a zero-length header or the end of the stream.
    pub fn read_from<R: Read>(mut r: R) -> Result<Self> {
        let mut frames = Vec::new();

        while let Some(header) = Header::read_from(&mut r)? {
            if header.length == 0 {
                tracing::debug!(frames = frames.len(), "reached terminator table");
                break;
            }
            frames.push(Frame::read_points(&mut r, header)?);
        }

        Ok(Self { frames })
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Serializes every frame followed by a terminator header.
    pub fn write_to<W: Write>(&self, mut w: W) -> io::Result<()> {
        for frame in &self.frames {
            frame.write_to(&mut w)?;
        }
        Header::terminator().write_to(&mut w)
    }
}

impl fmt::Display for Animation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ILDA animation, {} frames", self.frames.len())
    }
}

/// Decodes an animation from `reader`.
pub fn read_animation<R: Read>(reader: R) -> Result<Animation> {
    Animation::read_from(reader)
}

/// Reads until `buf` is full or the stream ends, returning the byte count.
fn fill<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
