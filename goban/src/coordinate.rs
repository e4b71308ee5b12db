use std::fmt;

use anyhow::{anyhow, bail, Result};

use crate::constants::{GTP_COLUMNS, MAX_BOARD_SIZE};

/// A point on the board.
///
/// `col` counts from the left edge, `row` from the bottom edge, both
/// zero-based. The GTP text form uses column letters skipping `I` and a
/// one-based row, so `col: 0, row: 0` prints as `A1`.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct Coordinate {
    pub col: u8,
    pub row: u8,
}

impl Coordinate {
    pub fn new(col: usize, row: usize) -> Self {
        assert!(
            col < MAX_BOARD_SIZE && row < MAX_BOARD_SIZE,
            "Coordinate ({}, {}) exceeds the maximum board size",
            col,
            row
        );

        Self {
            col: col as u8,
            row: row as u8,
        }
    }

    /// Parses a GTP coordinate such as `Q16`, validating against the board size.
    pub fn from_gtp(text: &str, board_size: usize) -> Result<Self> {
        let coordinate = Self::parse(text)?;

        if coordinate.col as usize >= board_size || coordinate.row as usize >= board_size {
            bail!(
                "Coordinate {} is out of bounds for a {}x{} board",
                text,
                board_size,
                board_size
            );
        }

        Ok(coordinate)
    }

    /// Parses a GTP coordinate without a board size bound. The result is
    /// valid for any board at most [`MAX_BOARD_SIZE`] wide.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let mut chars = text.chars();

        let col_letter = chars
            .next()
            .ok_or_else(|| anyhow!("Empty coordinate"))?
            .to_ascii_uppercase();

        let col = GTP_COLUMNS
            .find(col_letter)
            .ok_or_else(|| anyhow!("Invalid column letter in coordinate: {}", text))?;

        let row: usize = chars
            .as_str()
            .parse()
            .map_err(|_| anyhow!("Invalid row in coordinate: {}", text))?;

        if row == 0 || row > MAX_BOARD_SIZE || col >= MAX_BOARD_SIZE {
            bail!("Coordinate {} is out of range", text);
        }

        Ok(Self {
            col: col as u8,
            row: (row - 1) as u8,
        })
    }

    pub fn col(&self) -> usize {
        self.col as usize
    }

    pub fn row(&self) -> usize {
        self.row as usize
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let letter = GTP_COLUMNS
            .as_bytes()
            .get(self.col as usize)
            .copied()
            .unwrap_or(b'?') as char;

        write!(f, "{}{}", letter, self.row + 1)
    }
}

impl fmt::Debug for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
