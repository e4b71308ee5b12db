//! Minimal SGF reader/writer for game records.
//!
//! Only the main line is read; variations are skipped. Unknown properties
//! are ignored rather than rejected.

use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;

use anyhow::{bail, Result};
use log::warn;

use crate::action::{Color, Move, Vertex};
use crate::constants::{is_supported_size, DEFAULT_KOMI};
use crate::coordinate::Coordinate;

#[derive(Debug)]
pub struct ParsedGame {
    pub board_size: usize,
    pub komi: f32,
    pub handicap: usize,
    pub handicap_stones: Vec<Coordinate>,
    pub moves: Vec<Move>,
    pub metadata: HashMap<String, String>,
}

type Node = Vec<(String, Vec<String>)>;

pub fn parse(content: &str) -> Result<ParsedGame> {
    let nodes = main_line_nodes(content)?;

    let root = match nodes.first() {
        Some(root) => root,
        None => bail!("SGF contains no nodes"),
    };

    let board_size = root_value(root, "SZ")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(19);

    if !is_supported_size(board_size) {
        bail!("Unsupported SGF board size: {}", board_size);
    }

    let komi = root_value(root, "KM")
        .and_then(|v| v.parse::<f32>().ok())
        .unwrap_or(DEFAULT_KOMI);

    let handicap = root_value(root, "HA")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut handicap_stones = Vec::new();
    if let Some((_, values)) = root.iter().find(|(name, _)| name == "AB") {
        for value in values {
            match sgf_point(value, board_size) {
                Some(coord) => handicap_stones.push(coord),
                None => warn!("Skipping unreadable AB point in SGF: {:?}", value),
            }
        }
    }

    let mut metadata = HashMap::new();
    for (prop, key) in [
        ("PB", "black_player"),
        ("PW", "white_player"),
        ("DT", "date"),
        ("RE", "result"),
        ("EV", "event"),
        ("GN", "game_name"),
    ] {
        if let Some(value) = root_value(root, prop) {
            if !value.is_empty() {
                metadata.insert(key.to_string(), value);
            }
        }
    }

    let mut moves = Vec::new();
    for node in nodes.iter().skip(1) {
        for (name, values) in node {
            let color = match name.as_str() {
                "B" => Color::Black,
                "W" => Color::White,
                _ => continue,
            };

            let value = values.first().map(String::as_str).unwrap_or("");
            let vertex = if value.is_empty() || (value == "tt" && board_size <= 19) {
                Vertex::Pass
            } else {
                match sgf_point(value, board_size) {
                    Some(coord) => Vertex::Play(coord),
                    None => {
                        warn!("Skipping unreadable move point in SGF: {:?}", value);
                        continue;
                    }
                }
            };

            moves.push(Move::new(color, vertex));
        }
    }

    Ok(ParsedGame {
        board_size,
        komi,
        handicap,
        handicap_stones,
        moves,
        metadata,
    })
}

/// Serializes a game record. The inverse of [`parse`] for the properties
/// this module understands.
pub fn compose(
    board_size: usize,
    moves: &[Move],
    komi: f32,
    handicap_stones: &[Coordinate],
    black_player: &str,
    white_player: &str,
) -> String {
    let mut out = String::from("(;GM[1]FF[4]CA[UTF-8]");

    out.push_str(&format!("SZ[{}]", board_size));
    out.push_str(&format!("KM[{}]", komi));
    out.push_str(&format!("PB[{}]", escape(black_player)));
    out.push_str(&format!("PW[{}]", escape(white_player)));

    if !handicap_stones.is_empty() {
        out.push_str(&format!("HA[{}]", handicap_stones.len()));
        out.push_str("AB");
        for coord in handicap_stones {
            out.push_str(&format!("[{}]", point_text(*coord, board_size)));
        }
    }

    for mv in moves {
        let value = match mv.vertex {
            Vertex::Play(coord) => point_text(coord, board_size),
            Vertex::Pass => String::new(),
        };
        out.push_str(&format!(";{}[{}]", mv.color, value));
    }

    out.push(')');
    out
}

fn root_value(root: &Node, name: &str) -> Option<String> {
    root.iter()
        .find(|(prop, _)| prop == name)
        .and_then(|(_, values)| values.first().cloned())
}

/// SGF points are two letters, column then row, both counted from the
/// top-left corner.
fn sgf_point(value: &str, board_size: usize) -> Option<Coordinate> {
    let bytes = value.as_bytes();
    if bytes.len() != 2 {
        return None;
    }

    let col_char = (bytes[0] as char).to_ascii_lowercase();
    let row_char = (bytes[1] as char).to_ascii_lowercase();

    if !col_char.is_ascii_lowercase() || !row_char.is_ascii_lowercase() {
        return None;
    }

    let col = col_char as usize - 'a' as usize;
    let row_from_top = row_char as usize - 'a' as usize;

    if col >= board_size || row_from_top >= board_size {
        return None;
    }

    Some(Coordinate::new(col, board_size - 1 - row_from_top))
}

fn point_text(coord: Coordinate, board_size: usize) -> String {
    let col = (b'a' + coord.col) as char;
    let row = (b'a' + (board_size - 1 - coord.row()) as u8) as char;
    format!("{}{}", col, row)
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace(']', "\\]")
}

fn main_line_nodes(content: &str) -> Result<Vec<Node>> {
    let mut chars = content.chars().peekable();

    skip_until_open(&mut chars)?;
    parse_sequence(&mut chars)
}

fn skip_until_open(chars: &mut Peekable<Chars>) -> Result<()> {
    for c in chars.by_ref() {
        if c == '(' {
            return Ok(());
        }
    }

    bail!("SGF contains no game tree")
}

/// Parses the sequence following an opening parenthesis, descending only
/// into the first subtree at each branch point.
fn parse_sequence(chars: &mut Peekable<Chars>) -> Result<Vec<Node>> {
    let mut nodes = Vec::new();
    let mut branched = false;

    loop {
        skip_whitespace(chars);

        match chars.peek() {
            Some(';') => {
                chars.next();
                nodes.push(parse_node(chars)?);
            }
            Some('(') => {
                chars.next();
                if branched {
                    skip_subtree(chars)?;
                } else {
                    branched = true;
                    nodes.extend(parse_sequence(chars)?);
                }
            }
            Some(')') => {
                chars.next();
                return Ok(nodes);
            }
            Some(_) => {
                chars.next();
            }
            None => bail!("Unbalanced parentheses in SGF"),
        }
    }
}

fn skip_subtree(chars: &mut Peekable<Chars>) -> Result<()> {
    let mut depth = 1usize;
    let mut in_value = false;
    let mut escaped = false;

    for c in chars.by_ref() {
        if escaped {
            escaped = false;
            continue;
        }

        match c {
            '\\' if in_value => escaped = true,
            '[' if !in_value => in_value = true,
            ']' if in_value => in_value = false,
            '(' if !in_value => depth += 1,
            ')' if !in_value => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            _ => {}
        }
    }

    bail!("Unbalanced parentheses in SGF")
}

fn parse_node(chars: &mut Peekable<Chars>) -> Result<Node> {
    let mut properties = Vec::new();

    loop {
        skip_whitespace(chars);

        match chars.peek() {
            Some(c) if c.is_ascii_alphabetic() => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphabetic() {
                        name.push(c.to_ascii_uppercase());
                        chars.next();
                    } else {
                        break;
                    }
                }

                let mut values = Vec::new();
                loop {
                    skip_whitespace(chars);
                    if chars.peek() != Some(&'[') {
                        break;
                    }
                    chars.next();
                    values.push(parse_value(chars)?);
                }

                properties.push((name, values));
            }
            _ => return Ok(properties),
        }
    }
}

fn parse_value(chars: &mut Peekable<Chars>) -> Result<String> {
    let mut value = String::new();
    let mut escaped = false;

    for c in chars.by_ref() {
        if escaped {
            value.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == ']' {
            return Ok(value);
        } else {
            value.push(c);
        }
    }

    bail!("Unterminated property value in SGF")
}

fn skip_whitespace(chars: &mut Peekable<Chars>) {
    while chars.peek().is_some_and(|c| c.is_whitespace()) {
        chars.next();
    }
}
