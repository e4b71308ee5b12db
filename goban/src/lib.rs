pub mod action;
pub mod board;
pub mod constants;
pub mod coordinate;
pub mod sgf;
pub mod symmetries;
pub mod zobrist;

pub use action::*;
pub use board::*;
pub use constants::*;
pub use coordinate::*;
pub use symmetries::*;
pub use zobrist::*;
