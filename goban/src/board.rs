use std::collections::HashMap;
use std::fmt;

use anyhow::{anyhow, bail, Result};

use crate::action::{Color, Move, Vertex};
use crate::constants::{is_supported_size, DEFAULT_KOMI, HANDICAP_KOMI};
use crate::coordinate::Coordinate;
use crate::symmetries::{self, Symmetry};
use crate::zobrist;

const HANDICAP_19: [&[&str]; 8] = [
    &["D4", "Q16"],
    &["D4", "Q16", "D16"],
    &["D4", "Q16", "D16", "Q4"],
    &["D4", "Q16", "D16", "Q4", "K10"],
    &["D4", "Q16", "D16", "Q4", "D10", "Q10"],
    &["D4", "Q16", "D16", "Q4", "D10", "Q10", "K10"],
    &["D4", "Q16", "D16", "Q4", "D10", "Q10", "K4", "K16"],
    &["D4", "Q16", "D16", "Q4", "D10", "Q10", "K4", "K16", "K10"],
];

const HANDICAP_13: [&[&str]; 8] = [
    &["D4", "K10"],
    &["D4", "K10", "D10"],
    &["D4", "K10", "D10", "K4"],
    &["D4", "K10", "D10", "K4", "G7"],
    &["D4", "K10", "D10", "K4", "D7", "K7"],
    &["D4", "K10", "D10", "K4", "D7", "K7", "G7"],
    &["D4", "K10", "D10", "K4", "D7", "K7", "G4", "G10"],
    &["D4", "K10", "D10", "K4", "D7", "K7", "G4", "G10", "G7"],
];

const HANDICAP_9: [&[&str]; 8] = [
    &["C3", "G7"],
    &["C3", "G7", "C7"],
    &["C3", "G7", "C7", "G3"],
    &["C3", "G7", "C7", "G3", "E5"],
    &["C3", "G7", "C7", "G3", "C5", "G5"],
    &["C3", "G7", "C7", "G3", "C5", "G5", "E5"],
    &["C3", "G7", "C7", "G3", "C5", "G5", "E3", "E7"],
    &["C3", "G7", "C7", "G3", "C5", "G5", "E3", "E7", "E5"],
];

/// Standard star-point placements for 2..=9 handicap stones.
pub fn handicap_coordinates(board_size: usize, handicap: usize) -> Result<Vec<Coordinate>> {
    if handicap < 2 {
        return Ok(Vec::new());
    }

    if handicap > 9 {
        bail!("Handicap must be 2-9, got {}", handicap);
    }

    let table = match board_size {
        19 => &HANDICAP_19,
        13 => &HANDICAP_13,
        9 => &HANDICAP_9,
        _ => bail!("Board size must be 9, 13, or 19, got {}", board_size),
    };

    table[handicap - 2]
        .iter()
        .map(|text| Coordinate::from_gtp(text, board_size))
        .collect()
}

/// One analyzed position: the stones on the board, the move record that
/// produced them, and the rules context (komi, player to move).
///
/// Built once per query and immutable afterwards.
#[derive(Clone, Debug)]
pub struct Board {
    size: usize,
    stones: HashMap<Coordinate, Color>,
    moves: Vec<Move>,
    handicap_stones: Vec<Coordinate>,
    komi: f32,
    next_player: Color,
}

impl Board {
    pub fn new(size: usize) -> Result<Self> {
        if !is_supported_size(size) {
            bail!("Board size must be 9, 13, or 19, got {}", size);
        }

        Ok(Self {
            size,
            stones: HashMap::new(),
            moves: Vec::new(),
            handicap_stones: Vec::new(),
            komi: DEFAULT_KOMI,
            next_player: Color::Black,
        })
    }

    /// Builds a board from query parameters: size, handicap count, optional
    /// komi (defaulted from the handicap), and a GTP move list.
    pub fn setup(
        size: usize,
        handicap: usize,
        komi: Option<f32>,
        moves: &[String],
    ) -> Result<Self> {
        let mut board = Self::new(size)?;

        board.komi = komi.unwrap_or(if handicap >= 2 {
            HANDICAP_KOMI
        } else {
            DEFAULT_KOMI
        });

        if handicap >= 2 {
            board.setup_handicap(handicap)?;
        }

        for text in moves {
            board.play_gtp(text)?;
        }

        Ok(board)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn komi(&self) -> f32 {
        self.komi
    }

    pub fn set_komi(&mut self, komi: f32) {
        self.komi = komi;
    }

    pub fn next_player(&self) -> Color {
        self.next_player
    }

    pub fn stones(&self) -> &HashMap<Coordinate, Color> {
        &self.stones
    }

    pub fn stone_at(&self, coord: Coordinate) -> Option<Color> {
        self.stones.get(&coord).copied()
    }

    pub fn is_occupied(&self, coord: Coordinate) -> bool {
        self.stones.contains_key(&coord)
    }

    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    pub fn handicap_stones(&self) -> &[Coordinate] {
        &self.handicap_stones
    }

    /// Places the standard handicap stones. White moves first afterwards.
    pub fn setup_handicap(&mut self, handicap: usize) -> Result<()> {
        if handicap < 2 {
            return Ok(());
        }

        let coordinates = handicap_coordinates(self.size, handicap)?;

        for coord in &coordinates {
            self.stones.insert(*coord, Color::Black);
        }

        self.handicap_stones = coordinates;
        self.next_player = Color::White;

        Ok(())
    }

    pub fn play(&mut self, mv: Move) -> Result<()> {
        if let Vertex::Play(coord) = mv.vertex {
            if coord.col() >= self.size || coord.row() >= self.size {
                bail!(
                    "Coordinate {} is out of bounds for a {}x{} board",
                    coord,
                    self.size,
                    self.size
                );
            }

            if self.is_occupied(coord) {
                bail!("Position {} is already occupied", coord);
            }

            self.stones.insert(coord, mv.color);
        }

        self.next_player = mv.color.opponent();
        self.moves.push(mv);

        Ok(())
    }

    pub fn play_gtp(&mut self, text: &str) -> Result<()> {
        let mv = Move::from_gtp(text, self.size)?;
        self.play(mv)
    }

    /// The `B[Q16];W[D4];...` record string, handicap stones leading.
    pub fn move_sequence_string(&self) -> String {
        self.sequence_with_handicap(Symmetry::Identity)
            .iter()
            .map(|mv| format!("{}[{}]", mv.color, mv.vertex))
            .collect::<Vec<_>>()
            .join(";")
    }

    /// The textual lookup key for this position, in its own orientation.
    pub fn move_key(&self) -> String {
        self.transformed_move_key(Symmetry::Identity)
    }

    /// The lookup key after mapping every move through `symmetry`.
    pub fn transformed_move_key(&self, symmetry: Symmetry) -> String {
        let transformed = self.sequence_with_handicap(symmetry);
        symmetries::move_key(self.size, self.komi, &transformed)
    }

    /// The eight probe keys for this position, identity first, deduplicated.
    pub fn move_key_variants(&self) -> Vec<(Symmetry, String)> {
        let sequence = self.sequence_with_handicap(Symmetry::Identity);
        symmetries::move_key_variants(self.size, self.komi, &sequence)
    }

    fn sequence_with_handicap(&self, symmetry: Symmetry) -> Vec<Move> {
        self.handicap_stones
            .iter()
            .map(|&coord| Move::new(Color::Black, Vertex::Play(coord)))
            .chain(self.moves.iter().copied())
            .map(|mv| symmetry.apply_move(mv, self.size))
            .collect()
    }

    /// The position hash in this board's own orientation.
    pub fn zobrist_hash(&self) -> u64 {
        zobrist::position_hash(&self.stones, self.next_player, self.komi)
    }

    /// The orientation-independent hash: the minimum position hash over the
    /// eight transformed variants, paired with the transform that maps this
    /// board into that canonical orientation. Ties keep the earliest
    /// transform in [`Symmetry::ALL`] order.
    pub fn canonical_hash(&self) -> (u64, Symmetry) {
        let mut best: Option<(u64, Symmetry)> = None;

        for symmetry in Symmetry::ALL {
            let stones = self.transformed_stones(symmetry);
            let hash = zobrist::position_hash(&stones, self.next_player, self.komi);

            if best.map_or(true, |(min, _)| hash < min) {
                best = Some((hash, symmetry));
            }
        }

        best.expect("At least the identity transform was evaluated")
    }

    pub fn transformed_stones(&self, symmetry: Symmetry) -> HashMap<Coordinate, Color> {
        self.stones
            .iter()
            .map(|(&coord, &color)| (symmetry.apply(coord, self.size), color))
            .collect()
    }

    /// The GTP command sequence that reproduces this position in an engine.
    pub fn gtp_setup_commands(&self) -> Vec<String> {
        let mut commands = vec![
            format!("boardsize {}", self.size),
            "clear_board".to_string(),
            format!("komi {}", self.komi),
        ];

        for coord in &self.handicap_stones {
            commands.push(format!("play B {}", coord));
        }

        for mv in &self.moves {
            commands.push(format!("play {}", mv));
        }

        commands
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Board(size={}, stones={}, moves={}, komi={}, next={})",
            self.size,
            self.stones.len(),
            self.moves.len(),
            self.komi,
            self.next_player
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_with_moves(size: usize, moves: &[&str]) -> Board {
        let moves: Vec<String> = moves.iter().map(|m| m.to_string()).collect();
        Board::setup(size, 0, None, &moves).unwrap()
    }

    #[test]
    fn test_new_board_defaults() {
        let board = Board::new(19).unwrap();
        assert_eq!(board.size(), 19);
        assert_eq!(board.komi(), DEFAULT_KOMI);
        assert_eq!(board.next_player(), Color::Black);
        assert!(board.stones().is_empty());
    }

    #[test]
    fn test_unsupported_size_rejected() {
        assert!(Board::new(10).is_err());
        assert!(Board::new(0).is_err());
        assert!(Board::new(25).is_err());
    }

    #[test]
    fn test_play_alternates_players() {
        let mut board = Board::new(19).unwrap();
        board.play_gtp("B Q16").unwrap();
        assert_eq!(board.next_player(), Color::White);
        board.play_gtp("W D4").unwrap();
        assert_eq!(board.next_player(), Color::Black);
        assert_eq!(board.stones().len(), 2);
    }

    #[test]
    fn test_play_occupied_rejected() {
        let mut board = Board::new(9).unwrap();
        board.play_gtp("B E5").unwrap();
        assert!(board.play_gtp("W E5").is_err());
    }

    #[test]
    fn test_play_pass_keeps_stones() {
        let mut board = Board::new(9).unwrap();
        board.play_gtp("B E5").unwrap();
        board.play_gtp("W PASS").unwrap();

        assert_eq!(board.stones().len(), 1);
        assert_eq!(board.next_player(), Color::Black);
        assert_eq!(board.moves().len(), 2);
    }

    #[test]
    fn test_setup_handicap_19() {
        let board = Board::setup(19, 4, None, &[]).unwrap();

        assert_eq!(board.handicap_stones().len(), 4);
        assert_eq!(board.komi(), HANDICAP_KOMI);
        assert_eq!(board.next_player(), Color::White);
        assert_eq!(
            board.stone_at(Coordinate::from_gtp("D4", 19).unwrap()),
            Some(Color::Black)
        );
    }

    #[test]
    fn test_handicap_coordinates_all_sizes() {
        for size in [9usize, 13, 19] {
            for handicap in 2..=9 {
                let coords = handicap_coordinates(size, handicap).unwrap();
                assert_eq!(coords.len(), handicap);
            }
        }

        assert!(handicap_coordinates(19, 10).is_err());
        assert!(handicap_coordinates(11, 2).is_err());
        assert!(handicap_coordinates(9, 0).unwrap().is_empty());
    }

    #[test]
    fn test_move_sequence_string() {
        let board = board_with_moves(19, &["B Q16", "W D4", "B PASS"]);
        assert_eq!(board.move_sequence_string(), "B[Q16];W[D4];B[PASS]");
    }

    #[test]
    fn test_move_sequence_string_includes_handicap() {
        let moves = vec!["W E5".to_string()];
        let board = Board::setup(9, 2, None, &moves).unwrap();

        assert_eq!(board.move_sequence_string(), "B[C3];B[G7];W[E5]");
        assert_eq!(board.komi(), HANDICAP_KOMI);
    }

    #[test]
    fn test_move_key_matches_sequence() {
        let board = board_with_moves(9, &["B E5"]);
        assert_eq!(board.move_key(), "9:7.5:B[E5]");
    }

    #[test]
    fn test_zobrist_hash_move_order_transposition() {
        let a = board_with_moves(19, &["B Q16", "W D4", "B Q3", "W C16"]);
        let b = board_with_moves(19, &["B Q3", "W C16", "B Q16", "W D4"]);

        // Same stones, same player to move: same hash.
        assert_eq!(a.zobrist_hash(), b.zobrist_hash());
    }

    #[test]
    fn test_canonical_hash_invariant_under_mirror() {
        let board = board_with_moves(9, &["B C3", "W G5"]);
        let mirrored = board_with_moves(9, &["B G3", "W C5"]);

        // The mirrored position is the same game up to symmetry.
        assert_eq!(board.canonical_hash().0, mirrored.canonical_hash().0);
    }

    #[test]
    fn test_canonical_hash_invariant_under_rotation() {
        let board = board_with_moves(13, &["B D4", "W K10"]);

        for symmetry in Symmetry::ALL {
            let rotated_moves: Vec<String> = board
                .moves()
                .iter()
                .map(|&mv| symmetry.apply_move(mv, 13).to_string())
                .collect();
            let rotated = Board::setup(13, 0, None, &rotated_moves).unwrap();

            assert_eq!(
                board.canonical_hash().0,
                rotated.canonical_hash().0,
                "{:?}",
                symmetry
            );
        }
    }

    #[test]
    fn test_canonical_hash_distinguishes_positions() {
        let a = board_with_moves(9, &["B C3"]);
        let b = board_with_moves(9, &["B D3"]);

        assert_ne!(a.canonical_hash().0, b.canonical_hash().0);
    }

    #[test]
    fn test_gtp_setup_commands() {
        let board = board_with_moves(9, &["B E5", "W C3"]);
        let commands = board.gtp_setup_commands();

        assert_eq!(commands[0], "boardsize 9");
        assert_eq!(commands[1], "clear_board");
        assert_eq!(commands[2], "komi 7.5");
        assert_eq!(commands[3], "play B E5");
        assert_eq!(commands[4], "play W C3");
    }
}
