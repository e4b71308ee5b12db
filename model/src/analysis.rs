use serde::{Deserialize, Serialize};

use goban::{Board, Symmetry, Vertex};

/// A candidate move with its analysis statistics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MoveCandidate {
    #[serde(rename = "move")]
    pub vertex: Vertex,
    #[serde(rename = "winrate")]
    pub win_probability: f32,
    pub score_lead: f32,
    pub visits: u32,
}

impl MoveCandidate {
    pub fn new(vertex: Vertex, win_probability: f32, score_lead: f32, visits: u32) -> Self {
        Self {
            vertex,
            win_probability,
            score_lead,
            visits,
        }
    }

    pub fn transformed(&self, board_size: usize, symmetry: Symmetry) -> Self {
        Self {
            vertex: symmetry.apply_vertex(self.vertex, board_size),
            ..self.clone()
        }
    }
}

/// Where a result came from, in fallback order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Source {
    OpeningBook,
    LocalCache,
    LiveEngine,
}

impl Source {
    pub fn label(self) -> &'static str {
        match self {
            Source::OpeningBook => "opening-book",
            Source::LocalCache => "local-cache",
            Source::LiveEngine => "live-engine",
        }
    }
}

/// Whether an analysis ran to its requested effort or was cut short.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Completeness {
    Complete,
    Partial,
}

impl Completeness {
    pub fn is_complete(self) -> bool {
        matches!(self, Completeness::Complete)
    }
}

/// A ranked set of move suggestions for one position.
#[derive(Clone, Debug)]
pub struct AnalysisResult {
    /// The storage key of the position this was computed for: the canonical
    /// position hash when one is available, the move-sequence key otherwise.
    pub position_key: String,
    pub board_size: usize,
    pub komi: f32,
    /// Candidates in descending win-probability order, never containing an
    /// occupied point of the position they answer.
    pub top_moves: Vec<MoveCandidate>,
    /// The visit budget invested to produce this result.
    pub effort_visits: u32,
    pub source: Source,
    pub completeness: Completeness,
    pub compute_seconds: Option<f32>,
    pub engine_label: String,
}

impl AnalysisResult {
    /// Restores the candidate ordering invariant. Stable, so candidates with
    /// equal win probability keep their relative order.
    pub fn sort_candidates(&mut self) {
        self.top_moves
            .sort_by(|a, b| b.win_probability.total_cmp(&a.win_probability));
    }

    /// Maps every candidate through `symmetry`, leaving the stats untouched.
    pub fn transform_candidates(&mut self, symmetry: Symmetry) {
        for candidate in &mut self.top_moves {
            *candidate = candidate.transformed(self.board_size, symmetry);
        }
    }

    /// Drops candidates that name an occupied point of `board`, enforcing
    /// the legality invariant before a result is stored or returned.
    pub fn retain_legal(&mut self, board: &Board) {
        self.top_moves.retain(|candidate| match candidate.vertex {
            Vertex::Play(coord) => {
                coord.col() < board.size()
                    && coord.row() < board.size()
                    && !board.is_occupied(coord)
            }
            Vertex::Pass => true,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goban::Coordinate;

    fn candidate(text: &str, win_probability: f32) -> MoveCandidate {
        MoveCandidate::new(text.parse().unwrap(), win_probability, 0.0, 10)
    }

    fn result_with(top_moves: Vec<MoveCandidate>) -> AnalysisResult {
        AnalysisResult {
            position_key: "test".to_string(),
            board_size: 9,
            komi: 7.5,
            top_moves,
            effort_visits: 100,
            source: Source::LiveEngine,
            completeness: Completeness::Complete,
            compute_seconds: None,
            engine_label: "test".to_string(),
        }
    }

    #[test]
    fn test_candidate_serde_roundtrip() {
        let candidate = MoveCandidate::new("Q16".parse().unwrap(), 0.523, 0.8, 150);

        let json = serde_json::to_string(&candidate).unwrap();
        assert!(json.contains("\"move\":\"Q16\""));
        assert!(json.contains("\"winrate\":0.523"));

        let parsed: MoveCandidate = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, candidate);
    }

    #[test]
    fn test_candidate_serde_rejects_malformed() {
        let json = r#"{"move":"ZZ99","winrate":0.5,"score_lead":0.0,"visits":1}"#;
        assert!(serde_json::from_str::<MoveCandidate>(json).is_err());

        let json = r#"{"winrate":0.5,"score_lead":0.0,"visits":1}"#;
        assert!(serde_json::from_str::<MoveCandidate>(json).is_err());
    }

    #[test]
    fn test_sort_candidates_descending() {
        let mut result = result_with(vec![
            candidate("C3", 0.40),
            candidate("E5", 0.55),
            candidate("G7", 0.48),
        ]);

        result.sort_candidates();

        let order: Vec<String> = result
            .top_moves
            .iter()
            .map(|c| c.vertex.to_string())
            .collect();
        assert_eq!(order, vec!["E5", "G7", "C3"]);
    }

    #[test]
    fn test_retain_legal_drops_occupied() {
        let mut board = Board::new(9).unwrap();
        board.play_gtp("B E5").unwrap();

        let mut result = result_with(vec![candidate("E5", 0.6), candidate("C3", 0.5)]);
        result.retain_legal(&board);

        assert_eq!(result.top_moves.len(), 1);
        assert_eq!(result.top_moves[0].vertex.to_string(), "C3");
    }

    #[test]
    fn test_retain_legal_keeps_pass() {
        let board = Board::new(9).unwrap();

        let mut result = result_with(vec![MoveCandidate::new(Vertex::Pass, 0.5, 0.0, 1)]);
        result.retain_legal(&board);

        assert_eq!(result.top_moves.len(), 1);
    }

    #[test]
    fn test_transform_candidates() {
        let mut result = result_with(vec![candidate("C3", 0.5)]);
        result.transform_candidates(Symmetry::Rotate180);

        assert_eq!(
            result.top_moves[0].vertex.coordinate().unwrap(),
            Coordinate::from_gtp("G7", 9).unwrap()
        );
    }
}
