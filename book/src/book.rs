use std::collections::HashMap;
use std::path::Path;

use log::{debug, info, warn};

use goban::{
    is_supported_size, valid_symmetries, zobrist, Board, Coordinate, Symmetry, Vertex,
};
use model::{AnalysisResult, Completeness, MoveCandidate, Source};

use crate::bundle::{self, BookLoadError, RawEntry};

/// Behavior knobs for the book. The synthetic first move per board size is
/// an opening-theory heuristic, not a structural requirement, so it lives
/// here rather than in the lookup code.
#[derive(Clone, Debug)]
pub struct BookOptions {
    pub synthetic_enabled: bool,
    pub synthetic_openings: HashMap<usize, Coordinate>,
}

impl Default for BookOptions {
    fn default() -> Self {
        let synthetic_openings = [(9usize, "E5"), (13, "G7"), (19, "Q16")]
            .into_iter()
            .map(|(size, text)| {
                let coord = Coordinate::from_gtp(text, size)
                    .expect("Default synthetic openings are valid coordinates");
                (size, coord)
            })
            .collect();

        Self {
            synthetic_enabled: true,
            synthetic_openings,
        }
    }
}

#[derive(Debug)]
struct BookEntry {
    board_size: usize,
    komi: f32,
    candidates: Vec<MoveCandidate>,
    visits: u32,
}

#[derive(Clone, Debug, Default)]
pub struct BookStats {
    pub total_entries: usize,
    pub by_board_size: HashMap<usize, usize>,
}

/// The read-only opening book: precomputed high-effort results bundled at
/// deployment, indexed by position hash and by move-sequence key.
///
/// Loaded once at startup and immutable afterwards, so shared references
/// may read it concurrently without synchronization.
#[derive(Debug, Default)]
pub struct OpeningBook {
    entries: Vec<BookEntry>,
    by_move_key: HashMap<String, usize>,
    by_hash: HashMap<String, usize>,
    options: BookOptions,
    loaded: bool,
}

impl OpeningBook {
    pub fn new(options: BookOptions) -> Self {
        Self {
            entries: Vec::new(),
            by_move_key: HashMap::new(),
            by_hash: HashMap::new(),
            options,
            loaded: false,
        }
    }

    /// Loads the bundled book. Idempotent: a second call is a no-op. On
    /// failure the index is left exactly as it was (empty on first load);
    /// a partially readable bundle never partially populates the index.
    pub fn load(&mut self, path: &Path) -> Result<(), BookLoadError> {
        if self.loaded {
            debug!("Opening book already loaded; ignoring load of {:?}", path);
            return Ok(());
        }

        let bundle = bundle::read_bundle(path)?;

        let mut entries: Vec<BookEntry> = Vec::with_capacity(bundle.entries.len());
        let mut by_move_key: HashMap<String, usize> = HashMap::new();
        let mut by_hash: HashMap<String, usize> = HashMap::new();
        let mut skipped = 0usize;

        for raw in bundle.entries {
            match convert_entry(&raw) {
                Some(entry) => {
                    let move_key =
                        format!("{}:{}:{}", raw.s, goban::format_komi(raw.k), raw.m);
                    let index = entries.len();

                    insert_keeping_best(&mut by_move_key, &entries, move_key, index, raw.v);
                    insert_keeping_best(&mut by_hash, &entries, raw.h, index, raw.v);

                    entries.push(entry);
                }
                None => {
                    skipped += 1;
                    warn!("Skipping malformed opening book entry for key {:?}", raw.m);
                }
            }
        }

        info!(
            "Opening book loaded from {:?}: {} entries ({} skipped)",
            path,
            entries.len(),
            skipped
        );

        self.entries = entries;
        self.by_move_key = by_move_key;
        self.by_hash = by_hash;
        self.loaded = true;

        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> BookStats {
        let mut by_board_size: HashMap<usize, usize> = HashMap::new();
        for entry in &self.entries {
            *by_board_size.entry(entry.board_size).or_default() += 1;
        }

        BookStats {
            total_entries: self.entries.len(),
            by_board_size,
        }
    }

    /// The full probe: canonical hash first, then the move-key variants,
    /// then the synthetic empty-board fallback.
    pub fn lookup(&self, board: &Board) -> Option<AnalysisResult> {
        if let Some(result) = self.lookup_by_hash(board) {
            return Some(result);
        }

        if let Some(result) = self.lookup_by_moves(board) {
            return Some(result);
        }

        self.synthetic_fallback(board)
    }

    /// Probes the hash index with the canonical position hash. A hit means
    /// the stored orientation is the canonical one, so candidates map back
    /// through the inverse of the canonicalizing transform.
    pub fn lookup_by_hash(&self, board: &Board) -> Option<AnalysisResult> {
        let (hash, to_canonical) = board.canonical_hash();
        let index = *self.by_hash.get(&zobrist::hash_key(hash))?;
        let entry = &self.entries[index];

        Some(self.build_result(board, entry, to_canonical))
    }

    /// Probes the move-key index with each symmetry variant of the move
    /// sequence, identity first; the first hit wins.
    pub fn lookup_by_moves(&self, board: &Board) -> Option<AnalysisResult> {
        for (symmetry, key) in board.move_key_variants() {
            if let Some(&index) = self.by_move_key.get(&key) {
                let entry = &self.entries[index];
                return Some(self.build_result(board, entry, symmetry));
            }
        }

        None
    }

    /// Maps an entry found in the orientation reached by `to_entry` back to
    /// the caller's orientation, then re-expands through the symmetries the
    /// current stones actually admit.
    fn build_result(
        &self,
        board: &Board,
        entry: &BookEntry,
        to_entry: Symmetry,
    ) -> AnalysisResult {
        debug_assert_eq!(entry.komi, goban::quantize_komi(board.komi()));

        let from_entry = to_entry.inverse();
        let valid = valid_symmetries(board);

        let mut top_moves: Vec<MoveCandidate> = Vec::new();
        let mut seen: Vec<Vertex> = Vec::new();

        for candidate in &entry.candidates {
            let original = candidate.transformed(board.size(), from_entry);

            for &symmetry in &valid {
                let expanded = original.transformed(board.size(), symmetry);

                if let Vertex::Play(coord) = expanded.vertex {
                    if board.is_occupied(coord) {
                        continue;
                    }
                }

                if seen.contains(&expanded.vertex) {
                    continue;
                }

                seen.push(expanded.vertex);
                top_moves.push(expanded);
            }
        }

        let mut result = AnalysisResult {
            position_key: board.move_key(),
            board_size: board.size(),
            komi: board.komi(),
            top_moves,
            effort_visits: entry.visits,
            source: Source::OpeningBook,
            completeness: Completeness::Complete,
            compute_seconds: None,
            engine_label: "opening-book".to_string(),
        };

        result.sort_candidates();
        result
    }

    /// A known-empty standard position never answers "no suggestion": when
    /// the bundle has nothing for an untouched board, synthesize the one
    /// configured standard first move instead.
    fn synthetic_fallback(&self, board: &Board) -> Option<AnalysisResult> {
        if !self.options.synthetic_enabled {
            return None;
        }

        if !board.stones().is_empty() || !board.moves().is_empty() {
            return None;
        }

        let coord = *self.options.synthetic_openings.get(&board.size())?;

        debug!(
            "Synthesizing opening suggestion {} for empty {}x{} board",
            coord,
            board.size(),
            board.size()
        );

        Some(AnalysisResult {
            position_key: board.move_key(),
            board_size: board.size(),
            komi: board.komi(),
            top_moves: vec![MoveCandidate::new(Vertex::Play(coord), 0.5, 0.0, 0)],
            effort_visits: 0,
            source: Source::OpeningBook,
            completeness: Completeness::Partial,
            compute_seconds: None,
            engine_label: "opening-book".to_string(),
        })
    }
}

fn convert_entry(raw: &RawEntry) -> Option<BookEntry> {
    if !is_supported_size(raw.s) {
        return None;
    }

    let mut candidates = Vec::with_capacity(raw.t.len());
    for raw_candidate in &raw.t {
        if !(0.0..=1.0).contains(&raw_candidate.winrate) {
            return None;
        }

        let vertex = Vertex::from_gtp(&raw_candidate.vertex, raw.s).ok()?;
        candidates.push(MoveCandidate::new(
            vertex,
            raw_candidate.winrate,
            raw_candidate.score_lead,
            raw_candidate.visits,
        ));
    }

    if candidates.is_empty() {
        return None;
    }

    candidates.sort_by(|a, b| b.win_probability.total_cmp(&a.win_probability));

    Some(BookEntry {
        board_size: raw.s,
        komi: goban::quantize_komi(raw.k),
        candidates,
        visits: raw.v,
    })
}

/// Duplicate keys keep the entry with the most effort behind it.
fn insert_keeping_best(
    map: &mut HashMap<String, usize>,
    entries: &[BookEntry],
    key: String,
    index: usize,
    visits: u32,
) {
    match map.get(&key) {
        Some(&existing) if entries[existing].visits >= visits => {}
        _ => {
            map.insert(key, index);
        }
    }
}
