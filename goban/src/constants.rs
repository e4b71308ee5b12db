/// Board sizes the analyzer supports.
pub const SUPPORTED_SIZES: [usize; 3] = [9, 13, 19];

pub const MAX_BOARD_SIZE: usize = 19;

/// GTP column letters. The letter `I` is skipped by convention.
pub const GTP_COLUMNS: &str = "ABCDEFGHJKLMNOPQRST";

pub const DEFAULT_KOMI: f32 = 7.5;

/// Komi used when two or more handicap stones are placed.
pub const HANDICAP_KOMI: f32 = 0.5;

pub fn is_supported_size(size: usize) -> bool {
    SUPPORTED_SIZES.contains(&size)
}
