use crate::action::{Move, Vertex};
use crate::board::Board;
use crate::coordinate::Coordinate;

/// The eight transforms of the dihedral group of the square board.
///
/// Index order is fixed and observable: lookups probe variants in this
/// order, identity first, so equal candidates resolve deterministically.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub enum Symmetry {
    Identity,
    Rotate90,
    Rotate180,
    Rotate270,
    FlipHorizontal,
    FlipVertical,
    FlipDiagonal,
    FlipAntiDiagonal,
}

impl Symmetry {
    pub const ALL: [Symmetry; 8] = [
        Symmetry::Identity,
        Symmetry::Rotate90,
        Symmetry::Rotate180,
        Symmetry::Rotate270,
        Symmetry::FlipHorizontal,
        Symmetry::FlipVertical,
        Symmetry::FlipDiagonal,
        Symmetry::FlipAntiDiagonal,
    ];

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|&s| s == self).unwrap()
    }

    pub fn from_index(index: usize) -> Option<Symmetry> {
        Self::ALL.get(index).copied()
    }

    /// The transform that undoes this one. Only the quarter turns pair up;
    /// every other member of the group is its own inverse.
    pub fn inverse(self) -> Symmetry {
        match self {
            Symmetry::Rotate90 => Symmetry::Rotate270,
            Symmetry::Rotate270 => Symmetry::Rotate90,
            other => other,
        }
    }

    /// Maps a coordinate through this transform. Total and closed over the
    /// board: every input inside the board lands inside the board.
    pub fn apply(self, coord: Coordinate, board_size: usize) -> Coordinate {
        let m = (board_size - 1) as u8;
        let (col, row) = (coord.col, coord.row);

        let (new_col, new_row) = match self {
            Symmetry::Identity => (col, row),
            Symmetry::Rotate90 => (row, m - col),
            Symmetry::Rotate180 => (m - col, m - row),
            Symmetry::Rotate270 => (m - row, col),
            Symmetry::FlipHorizontal => (m - col, row),
            Symmetry::FlipVertical => (col, m - row),
            Symmetry::FlipDiagonal => (row, col),
            Symmetry::FlipAntiDiagonal => (m - row, m - col),
        };

        Coordinate {
            col: new_col,
            row: new_row,
        }
    }

    /// Passes are fixed points of every transform.
    pub fn apply_vertex(self, vertex: Vertex, board_size: usize) -> Vertex {
        match vertex {
            Vertex::Play(coord) => Vertex::Play(self.apply(coord, board_size)),
            Vertex::Pass => Vertex::Pass,
        }
    }

    pub fn apply_move(self, mv: Move, board_size: usize) -> Move {
        Move {
            color: mv.color,
            vertex: self.apply_vertex(mv.vertex, board_size),
        }
    }
}

/// The transforms under which the stones currently on the board map onto
/// themselves, color for color. All eight for an empty board.
pub fn valid_symmetries(board: &Board) -> Vec<Symmetry> {
    Symmetry::ALL
        .iter()
        .copied()
        .filter(|&symmetry| {
            board.stones().iter().all(|(&coord, &color)| {
                let mapped = symmetry.apply(coord, board.size());
                board.stone_at(mapped) == Some(color)
            })
        })
        .collect()
}

/// Komi quantized to half-point steps, printed with one decimal so keys
/// built by different writers agree ("7.5", "0.5", "7.0").
pub fn format_komi(komi: f32) -> String {
    format!("{:.1}", quantize_komi(komi))
}

pub fn quantize_komi(komi: f32) -> f32 {
    (komi * 2.0).round() / 2.0
}

/// Builds the textual lookup key for a move sequence:
/// `"<size>:<komi>:B[Q16];W[D4];..."`.
pub fn move_key(board_size: usize, komi: f32, moves: &[Move]) -> String {
    let sequence = moves
        .iter()
        .map(|mv| format!("{}[{}]", mv.color, mv.vertex))
        .collect::<Vec<_>>()
        .join(";");

    format!("{}:{}:{}", board_size, format_komi(komi), sequence)
}

/// The up-to-eight transformed probe keys for a move sequence, identity
/// first. Sequences that are themselves symmetric produce duplicate keys;
/// those keep the first transform that produced them.
pub fn move_key_variants(
    board_size: usize,
    komi: f32,
    moves: &[Move],
) -> Vec<(Symmetry, String)> {
    let mut variants: Vec<(Symmetry, String)> = Vec::with_capacity(Symmetry::ALL.len());

    for symmetry in Symmetry::ALL {
        let transformed = moves
            .iter()
            .map(|&mv| symmetry.apply_move(mv, board_size))
            .collect::<Vec<_>>();
        let key = move_key(board_size, komi, &transformed);

        if !variants.iter().any(|(_, existing)| *existing == key) {
            variants.push((symmetry, key));
        }
    }

    variants
}
