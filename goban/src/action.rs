use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail, Result};
use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub enum Color {
    Black,
    White,
}

impl Color {
    pub fn opponent(self) -> Self {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Color::Black => 'B',
            Color::White => 'W',
        }
    }
}

impl FromStr for Color {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "B" | "BLACK" => Ok(Color::Black),
            "W" | "WHITE" => Ok(Color::White),
            _ => Err(anyhow!("Color must be 'B' or 'W', got {}", s)),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// A playable point or a pass.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub enum Vertex {
    Play(Coordinate),
    Pass,
}

impl Vertex {
    pub fn from_gtp(text: &str, board_size: usize) -> Result<Self> {
        if text.trim().eq_ignore_ascii_case("pass") {
            return Ok(Vertex::Pass);
        }

        Coordinate::from_gtp(text, board_size).map(Vertex::Play)
    }

    pub fn coordinate(self) -> Option<Coordinate> {
        match self {
            Vertex::Play(coord) => Some(coord),
            Vertex::Pass => None,
        }
    }

    pub fn is_pass(self) -> bool {
        matches!(self, Vertex::Pass)
    }
}

impl FromStr for Vertex {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("pass") {
            return Ok(Vertex::Pass);
        }

        Coordinate::parse(s).map(Vertex::Play)
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Vertex::Play(coord) => write!(f, "{}", coord),
            Vertex::Pass => write!(f, "PASS"),
        }
    }
}

impl Serialize for Vertex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Vertex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct VertexVisitor;

        impl Visitor<'_> for VertexVisitor {
            type Value = Vertex;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a GTP vertex such as \"Q16\" or \"PASS\"")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Vertex, E> {
                value.parse().map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(VertexVisitor)
    }
}

/// A colored move, the unit of a game record.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct Move {
    pub color: Color,
    pub vertex: Vertex,
}

impl Move {
    pub fn new(color: Color, vertex: Vertex) -> Self {
        Self { color, vertex }
    }

    /// Parses the `"B Q16"` / `"W PASS"` form used by the engine protocol.
    pub fn from_gtp(text: &str, board_size: usize) -> Result<Self> {
        let mut parts = text.split_whitespace();

        let color = parts
            .next()
            .ok_or_else(|| anyhow!("Empty move"))?
            .parse::<Color>()?;
        let vertex_text = parts
            .next()
            .ok_or_else(|| anyhow!("Invalid move format: {}. Expected 'COLOR COORD'", text))?;

        if parts.next().is_some() {
            bail!("Invalid move format: {}. Expected 'COLOR COORD'", text);
        }

        Ok(Self {
            color,
            vertex: Vertex::from_gtp(vertex_text, board_size)?,
        })
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.color, self.vertex)
    }
}
