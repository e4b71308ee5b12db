use std::collections::HashMap;

use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::action::Color;
use crate::constants::MAX_BOARD_SIZE;
use crate::coordinate::Coordinate;
use crate::symmetries::quantize_komi;

/// Seed for the hash tables. Fixed so that hashes are stable across runs
/// and therefore usable as persistent cache keys.
const ZOBRIST_SEED: u64 = 42;

/// Komi values are keyed in half-point steps over [-100.0, 100.0].
const KOMI_STEPS: usize = 401;

struct ZobristTable {
    stones: Vec<u64>,
    player: u64,
    komi: [u64; KOMI_STEPS],
}

static TABLE: Lazy<ZobristTable> = Lazy::new(|| {
    let mut rng = StdRng::seed_from_u64(ZOBRIST_SEED);

    let stones = (0..2 * MAX_BOARD_SIZE * MAX_BOARD_SIZE)
        .map(|_| rng.gen::<u64>())
        .collect();

    let player = rng.gen::<u64>();

    let mut komi = [0u64; KOMI_STEPS];
    for value in komi.iter_mut() {
        *value = rng.gen::<u64>();
    }

    ZobristTable {
        stones,
        player,
        komi,
    }
});

fn stone_value(coord: Coordinate, color: Color) -> u64 {
    let color_offset = match color {
        Color::Black => 0,
        Color::White => MAX_BOARD_SIZE * MAX_BOARD_SIZE,
    };

    TABLE.stones[color_offset + coord.col() * MAX_BOARD_SIZE + coord.row()]
}

fn komi_value(komi: f32) -> u64 {
    let step = (quantize_komi(komi) * 2.0).round() as i32 + 200;

    if (0..KOMI_STEPS as i32).contains(&step) {
        TABLE.komi[step as usize]
    } else {
        0
    }
}

/// XOR hash over the stones, the player to move, and the quantized komi.
pub fn position_hash(
    stones: &HashMap<Coordinate, Color>,
    next_player: Color,
    komi: f32,
) -> u64 {
    let mut hash = 0u64;

    for (&coord, &color) in stones {
        hash ^= stone_value(coord, color);
    }

    if next_player == Color::White {
        hash ^= TABLE.player;
    }

    hash ^ komi_value(komi)
}

/// The hex form used as a persistent lookup key.
pub fn hash_key(hash: u64) -> String {
    format!("{:016x}", hash)
}
