use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::time::Instant;

use book::OpeningBook;
use goban::{zobrist, Board, Symmetry};
use model::{AnalysisResult, Source};
use store::AnalysisStore;

use crate::engine::Engine;
use crate::errors::{AnalyzeError, EngineError};

#[derive(Clone, Debug)]
pub struct AnalyzerOptions {
    /// Wall-clock bound on one engine invocation.
    pub engine_timeout: Duration,
    /// How many candidates a result carries at most.
    pub top_moves_count: usize,
    /// Default effort for 19x19 boards.
    pub visits_19: u32,
    /// Default effort for the smaller boards.
    pub visits_small: u32,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            engine_timeout: Duration::from_secs(60),
            top_moves_count: 10,
            visits_19: 150,
            visits_small: 500,
        }
    }
}

impl AnalyzerOptions {
    pub fn default_visits(&self, board_size: usize) -> u32 {
        if board_size == 19 {
            self.visits_19
        } else {
            self.visits_small
        }
    }
}

/// One `analyze` call's input.
#[derive(Clone, Debug)]
pub struct AnalysisRequest {
    pub board_size: usize,
    /// GTP move strings, e.g. `["B Q16", "W D4"]`.
    pub moves: Vec<String>,
    pub handicap: usize,
    pub komi: Option<f32>,
    /// Minimum effort a cached entry must carry to count as a hit.
    pub required_lookup_visits: u32,
    /// Effort for a live engine run; defaulted per board size when absent.
    pub compute_visits: Option<u32>,
    /// Skip both lookup layers and go straight to the engine.
    pub force_refresh: bool,
}

impl AnalysisRequest {
    pub fn new(board_size: usize) -> Self {
        Self {
            board_size,
            moves: Vec::new(),
            handicap: 0,
            komi: None,
            required_lookup_visits: 0,
            compute_visits: None,
            force_refresh: false,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct AnalyzerStats {
    pub book_entries: usize,
    pub cache_entries: u64,
    pub by_board_size: HashMap<usize, u64>,
}

/// The lookup chain is a strict forward-only state machine; within one call
/// the phases only ever advance in this order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    QueryingBook,
    QueryingCache,
    InvokingEngine,
}

/// The top-level analysis surface: opening book, then local cache, then the
/// live engine, with engine results written back into the cache.
///
/// Owns its book, store, and engine handles outright; construct one per
/// installation and pass it around by reference.
pub struct Analyzer {
    book: OpeningBook,
    store: AnalysisStore,
    engine: Option<Box<dyn Engine + Send>>,
    options: AnalyzerOptions,
    cancel_requested: Arc<AtomicBool>,
}

impl Analyzer {
    pub fn new(
        book: OpeningBook,
        store: AnalysisStore,
        engine: Option<Box<dyn Engine + Send>>,
        options: AnalyzerOptions,
    ) -> Self {
        Self {
            book,
            store,
            engine,
            options,
            cancel_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn book(&self) -> &OpeningBook {
        &self.book
    }

    pub fn store(&self) -> &AnalysisStore {
        &self.store
    }

    /// A flag the caller may set from another task to cancel the in-flight
    /// engine step of the current `analyze` call. Reset on each call.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel_requested.clone()
    }

    pub fn shutdown(&mut self) {
        if let Some(engine) = &mut self.engine {
            engine.stop();
        }
    }

    /// Resolves one position through the fallback chain.
    ///
    /// Phases advance strictly forward: book, cache, engine. The first
    /// layer that answers is terminal. Lookup-layer failures are recovered
    /// locally and the chain continues; only the engine step, or running
    /// out of layers entirely, fails the call.
    pub async fn analyze(
        &mut self,
        request: AnalysisRequest,
    ) -> Result<AnalysisResult, AnalyzeError> {
        let board = build_board(&request)?;
        self.cancel_requested.store(false, Ordering::SeqCst);

        let (canonical, to_canonical) = board.canonical_hash();
        let lookup_key = zobrist::hash_key(canonical);

        let mut phase = if request.force_refresh {
            Phase::InvokingEngine
        } else {
            Phase::QueryingBook
        };

        let mut book_note = "skipped";
        let mut cache_note = "skipped".to_string();

        loop {
            match phase {
                Phase::QueryingBook => {
                    if let Some(mut result) = self.book.lookup(&board) {
                        result.retain_legal(&board);
                        result.top_moves.truncate(self.options.top_moves_count);

                        debug!("Book hit for {}", result.position_key);
                        return Ok(result);
                    }

                    book_note = if self.book.is_loaded() {
                        "no entry"
                    } else {
                        "not loaded"
                    };
                    phase = Phase::QueryingCache;
                }

                Phase::QueryingCache => {
                    match self.store.get(&lookup_key, board.komi(), None).await {
                        Ok(Some(result))
                            if result.effort_visits >= request.required_lookup_visits =>
                        {
                            let mut result = result;
                            // Stored candidates are in the canonical
                            // orientation; map them into the caller's.
                            result.transform_candidates(to_canonical.inverse());
                            result.retain_legal(&board);
                            result.sort_candidates();
                            result.top_moves.truncate(self.options.top_moves_count);

                            debug!("Cache hit for {}", lookup_key);
                            return Ok(result);
                        }
                        Ok(Some(result)) => {
                            cache_note = format!(
                                "best entry has {} visits, {} required",
                                result.effort_visits, request.required_lookup_visits
                            );
                        }
                        Ok(None) => {
                            cache_note = "no entry".to_string();
                        }
                        Err(e) => {
                            warn!("Cache lookup failed, continuing to engine: {}", e);
                            cache_note = e.to_string();
                        }
                    }

                    phase = Phase::InvokingEngine;
                }

                Phase::InvokingEngine => {
                    return self
                        .invoke_engine(
                            &request,
                            &board,
                            &lookup_key,
                            to_canonical,
                            book_note,
                            &cache_note,
                        )
                        .await;
                }
            }
        }
    }

    async fn invoke_engine(
        &mut self,
        request: &AnalysisRequest,
        board: &Board,
        lookup_key: &str,
        to_canonical: Symmetry,
        book_note: &str,
        cache_note: &str,
    ) -> Result<AnalysisResult, AnalyzeError> {
        let engine = match &mut self.engine {
            Some(engine) => engine,
            None => {
                return Err(AnalyzeError::EngineUnavailable(compose_unavailable(
                    book_note,
                    cache_note,
                    "disabled",
                )));
            }
        };

        if !engine.is_running() {
            engine.start().map_err(|e| {
                AnalyzeError::EngineUnavailable(compose_unavailable(
                    book_note,
                    cache_note,
                    &e.to_string(),
                ))
            })?;
        }

        let compute_visits = request
            .compute_visits
            .unwrap_or_else(|| self.options.default_visits(board.size()));

        debug!(
            "Invoking engine {} with {} visits",
            engine.label(),
            compute_visits
        );

        let mut handle = engine
            .request_analysis(board, compute_visits)
            .map_err(AnalyzeError::EngineFailed)?;

        let deadline = Instant::now() + self.options.engine_timeout;
        let mut poll = tokio::time::interval(Duration::from_millis(50));

        let output = loop {
            tokio::select! {
                terminal = &mut handle.result => {
                    break match terminal {
                        Ok(Ok(output)) => output,
                        Ok(Err(EngineError::Cancelled)) => {
                            return Err(AnalyzeError::EngineCancelled)
                        }
                        Ok(Err(e)) => return Err(AnalyzeError::EngineFailed(e)),
                        Err(_) => {
                            return Err(AnalyzeError::EngineFailed(
                                EngineError::ProcessExited,
                            ))
                        }
                    };
                }
                Some(progress) = handle.progress.recv() => {
                    debug!(
                        "Engine progress: {} visits, winrate {:.3}, best {}",
                        progress.visits, progress.win_probability, progress.best_vertex
                    );
                }
                _ = tokio::time::sleep_until(deadline) => {
                    handle.cancel();
                    return Err(AnalyzeError::EngineTimeout(self.options.engine_timeout));
                }
                _ = poll.tick() => {
                    if self.cancel_requested.load(Ordering::SeqCst) {
                        handle.cancel();
                        return Err(AnalyzeError::EngineCancelled);
                    }
                }
            }
        };

        let mut result = AnalysisResult {
            position_key: lookup_key.to_string(),
            board_size: board.size(),
            komi: board.komi(),
            top_moves: output.candidates,
            effort_visits: compute_visits,
            source: Source::LiveEngine,
            completeness: output.completeness,
            compute_seconds: Some(output.compute_seconds),
            engine_label: output.engine_label,
        };

        result.retain_legal(board);
        result.sort_candidates();
        result.top_moves.truncate(self.options.top_moves_count);

        // Persist in the canonical orientation so any equivalent position
        // finds it again.
        let mut stored = result.clone();
        stored.transform_candidates(to_canonical);
        if let Err(e) = self.store.put(&stored).await {
            warn!("Failed to write analysis back to cache: {}", e);
        }

        Ok(result)
    }

    pub async fn stats(&self) -> AnalyzerStats {
        let book_stats = self.book.stats();

        let store_stats = match self.store.stats().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Cache stats unavailable: {}", e);
                Default::default()
            }
        };

        let mut by_board_size: HashMap<usize, u64> = HashMap::new();
        for (size, count) in &book_stats.by_board_size {
            *by_board_size.entry(*size).or_default() += *count as u64;
        }
        for (size, count) in &store_stats.by_board_size {
            *by_board_size.entry(*size).or_default() += count;
        }

        AnalyzerStats {
            book_entries: book_stats.total_entries,
            cache_entries: store_stats.total_entries,
            by_board_size,
        }
    }
}

fn build_board(request: &AnalysisRequest) -> Result<Board, AnalyzeError> {
    Board::setup(
        request.board_size,
        request.handicap,
        request.komi,
        &request.moves,
    )
    .map_err(|e| AnalyzeError::UnsupportedPosition(e.to_string()))
}

fn compose_unavailable(book_note: &str, cache_note: &str, engine_note: &str) -> String {
    format!(
        "position not in opening book ({}) or local cache ({}); live engine unavailable ({})",
        book_note, cache_note, engine_note
    )
}
