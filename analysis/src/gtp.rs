//! GTP backend: drives an external engine process (KataGo or compatible)
//! over its text protocol.
//!
//! The process is long-running: spawned once, reused across analyses, and
//! told to `quit` on shutdown. Analysis uses the streaming `kata-analyze`
//! command, reading `info move ...` lines until the requested effort is
//! reached or the invocation is cancelled.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use goban::Board;
use model::{Completeness, MoveCandidate};

use crate::engine::{AnalysisHandle, AnalysisWork, Engine, EngineOutput, Progress};
use crate::errors::EngineError;

#[derive(Clone, Debug)]
pub struct GtpOptions {
    pub binary: PathBuf,
    pub model: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub label: String,
    /// Reporting interval passed to `kata-analyze`, in centiseconds.
    pub report_interval_cs: u32,
}

impl GtpOptions {
    pub fn new(binary: PathBuf) -> Self {
        Self {
            binary,
            model: None,
            config: None,
            label: "katago".to_string(),
            report_interval_cs: 10,
        }
    }
}

struct GtpIo {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
}

/// An [`Engine`] speaking GTP to a subprocess.
pub struct GtpEngine {
    options: GtpOptions,
    io: Option<Arc<Mutex<GtpIo>>>,
}

impl GtpEngine {
    pub fn new(options: GtpOptions) -> Self {
        Self { options, io: None }
    }
}

impl Engine for GtpEngine {
    fn start(&mut self) -> Result<(), EngineError> {
        if self.io.is_some() {
            return Ok(());
        }

        let mut command = Command::new(&self.options.binary);
        command.arg("gtp");

        if let Some(model) = &self.options.model {
            command.arg("-model").arg(model);
        }
        if let Some(config) = &self.options.config {
            command.arg("-config").arg(config);
        }

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Startup(format!("{}: {}", self.options.binary.display(), e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Startup("engine stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Startup("engine stdout unavailable".to_string()))?;

        debug!("Started GTP engine {:?}", self.options.binary);

        self.io = Some(Arc::new(Mutex::new(GtpIo {
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
        })));

        Ok(())
    }

    fn stop(&mut self) {
        if let Some(io) = self.io.take() {
            tokio::spawn(async move {
                let mut io = io.lock().await;

                let _ = io.stdin.write_all(b"quit\n").await;
                let _ = io.stdin.flush().await;

                if tokio::time::timeout(Duration::from_secs(2), io.child.wait())
                    .await
                    .is_err()
                {
                    warn!("GTP engine did not quit in time; killing it");
                    let _ = io.child.start_kill();
                }
            });
        }
    }

    fn is_running(&self) -> bool {
        self.io.is_some()
    }

    fn label(&self) -> &str {
        &self.options.label
    }

    fn request_analysis(
        &self,
        board: &Board,
        max_visits: u32,
    ) -> Result<AnalysisHandle, EngineError> {
        let io = self.io.clone().ok_or(EngineError::NotRunning)?;
        let (handle, work) = AnalysisHandle::channel();

        let board = board.clone();
        let label = self.options.label.clone();
        let interval_cs = self.options.report_interval_cs;

        tokio::spawn(async move {
            let started = Instant::now();

            let outcome = run_analysis(&io, &board, max_visits, interval_cs, &work).await;

            let terminal = outcome.map(|(candidates, visits)| {
                let completeness = if visits >= max_visits {
                    Completeness::Complete
                } else {
                    Completeness::Partial
                };

                EngineOutput {
                    candidates,
                    visits,
                    completeness,
                    compute_seconds: started.elapsed().as_secs_f32(),
                    engine_label: label,
                }
            });

            // The caller may have stopped listening after a timeout.
            let _ = work.result.send(terminal);
        });

        Ok(handle)
    }
}

async fn run_analysis(
    io: &Arc<Mutex<GtpIo>>,
    board: &Board,
    max_visits: u32,
    interval_cs: u32,
    work: &AnalysisWork,
) -> Result<(Vec<MoveCandidate>, u32), EngineError> {
    let mut io = io.lock().await;

    for command in board.gtp_setup_commands() {
        send_command(&mut io, &command).await?;
    }

    let command = format!(
        "kata-analyze {} interval {}",
        board.next_player(),
        interval_cs
    );
    write_line(&mut io, &command).await?;

    let mut latest: Vec<MoveCandidate> = Vec::new();
    let mut total_visits = 0u32;

    loop {
        if work.cancelled() {
            stop_analysis(&mut io).await;
            return Err(EngineError::Cancelled);
        }

        let line = match tokio::time::timeout(Duration::from_millis(200), io.lines.next_line())
            .await
        {
            // No output yet; loop around to re-check cancellation.
            Err(_) => continue,
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => return Err(EngineError::ProcessExited),
            Ok(Err(e)) => return Err(EngineError::Protocol(e.to_string())),
        };

        if line.starts_with('?') {
            stop_analysis(&mut io).await;
            return Err(EngineError::Protocol(line));
        }

        if !line.starts_with("info ") {
            continue;
        }

        let candidates = parse_analyze_line(&line, board.size());
        if candidates.is_empty() {
            continue;
        }

        total_visits = candidates.iter().map(|c| c.visits).sum();

        if let Some(best) = candidates.first() {
            work.report_progress(Progress {
                visits: total_visits,
                win_probability: best.win_probability,
                score_lead: best.score_lead,
                best_vertex: best.vertex,
            });
        }

        latest = candidates;

        if total_visits >= max_visits {
            break;
        }
    }

    stop_analysis(&mut io).await;

    if latest.is_empty() {
        return Err(EngineError::Protocol(
            "engine produced no analysis output".to_string(),
        ));
    }

    Ok((latest, total_visits))
}

/// Sends one GTP command and reads its response, which ends with a blank
/// line. Error responses start with `?`.
async fn send_command(io: &mut GtpIo, command: &str) -> Result<String, EngineError> {
    write_line(io, command).await?;

    let mut response_lines: Vec<String> = Vec::new();

    loop {
        match io.lines.next_line().await {
            Ok(Some(line)) => {
                if line.is_empty() {
                    if !response_lines.is_empty() {
                        break;
                    }
                } else {
                    response_lines.push(line);
                }
            }
            Ok(None) => return Err(EngineError::ProcessExited),
            Err(e) => return Err(EngineError::Protocol(e.to_string())),
        }
    }

    let response = response_lines.join("\n");

    if let Some(message) = response.strip_prefix('?') {
        return Err(EngineError::Protocol(format!(
            "command {:?} failed: {}",
            command,
            message.trim()
        )));
    }

    Ok(response
        .strip_prefix('=')
        .map(|r| r.trim_start().to_string())
        .unwrap_or(response))
}

async fn write_line(io: &mut GtpIo, line: &str) -> Result<(), EngineError> {
    io.stdin
        .write_all(line.as_bytes())
        .await
        .map_err(|e| EngineError::Protocol(e.to_string()))?;
    io.stdin
        .write_all(b"\n")
        .await
        .map_err(|e| EngineError::Protocol(e.to_string()))?;
    io.stdin
        .flush()
        .await
        .map_err(|e| EngineError::Protocol(e.to_string()))
}

/// Ends a streaming analysis and drains its remaining output.
async fn stop_analysis(io: &mut GtpIo) {
    if write_line(io, "stop").await.is_err() {
        return;
    }

    loop {
        match tokio::time::timeout(Duration::from_millis(300), io.lines.next_line()).await {
            Ok(Ok(Some(line))) if !line.is_empty() => continue,
            _ => break,
        }
    }
}

static VISITS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"visits\s+(\d+)").unwrap());
static WINRATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"winrate\s+([0-9.]+)").unwrap());
static SCORE_LEAD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"scoreLead\s+(-?[0-9.]+)").unwrap());

/// Parses one `kata-analyze` report line:
///
/// `info move Q3 visits 45 winrate 0.52 scoreLead 0.31 order 0 pv ... info move R4 ...`
///
/// Unreadable segments are dropped; candidates come back sorted by visits.
fn parse_analyze_line(line: &str, board_size: usize) -> Vec<MoveCandidate> {
    let mut candidates: Vec<MoveCandidate> = Vec::new();

    for segment in line.split("info move ").skip(1) {
        let vertex_text = match segment.split_whitespace().next() {
            Some(text) => text,
            None => continue,
        };

        let vertex = match goban::Vertex::from_gtp(vertex_text, board_size) {
            Ok(vertex) => vertex,
            Err(_) => continue,
        };

        let visits = VISITS_RE
            .captures(segment)
            .and_then(|c| c[1].parse::<u32>().ok());
        let win_probability = WINRATE_RE
            .captures(segment)
            .and_then(|c| c[1].parse::<f32>().ok());
        let score_lead = SCORE_LEAD_RE
            .captures(segment)
            .and_then(|c| c[1].parse::<f32>().ok())
            .unwrap_or(0.0);

        if let (Some(visits), Some(win_probability)) = (visits, win_probability) {
            if (0.0..=1.0).contains(&win_probability) {
                candidates.push(MoveCandidate::new(
                    vertex,
                    win_probability,
                    score_lead,
                    visits,
                ));
            }
        }
    }

    candidates.sort_by(|a, b| b.visits.cmp(&a.visits));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_analyze_line_two_moves() {
        let line = "info move Q3 visits 45 winrate 0.523445 scoreLead 0.312 prior 0.08 \
                    order 0 pv Q3 R4 Q5 info move R4 visits 38 winrate 0.518923 \
                    scoreLead 0.287 prior 0.07 order 1 pv R4 Q3 R6";

        let candidates = parse_analyze_line(line, 19);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].vertex.to_string(), "Q3");
        assert_eq!(candidates[0].visits, 45);
        assert!((candidates[0].win_probability - 0.523445).abs() < 1e-6);
        assert!((candidates[0].score_lead - 0.312).abs() < 1e-6);
    }

    #[test]
    fn test_parse_analyze_line_sorts_by_visits() {
        let line = "info move A1 visits 5 winrate 0.4 scoreLead 0.0 \
                    info move B2 visits 50 winrate 0.6 scoreLead 1.0";

        let candidates = parse_analyze_line(line, 9);

        assert_eq!(candidates[0].vertex.to_string(), "B2");
        assert_eq!(candidates[1].vertex.to_string(), "A1");
    }

    #[test]
    fn test_parse_analyze_line_pass() {
        let line = "info move pass visits 12 winrate 0.35 scoreLead -2.1";

        let candidates = parse_analyze_line(line, 9);

        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].vertex.is_pass());
    }

    #[test]
    fn test_parse_analyze_line_skips_malformed_segments() {
        let line = "info move ZZ visits 5 winrate 0.4 \
                    info move C3 visits 10 winrate 0.5 scoreLead 0.2 \
                    info move D4 winrate 0.5";

        let candidates = parse_analyze_line(line, 9);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].vertex.to_string(), "C3");
    }

    #[test]
    fn test_parse_analyze_line_rejects_out_of_range_winrate() {
        let line = "info move C3 visits 10 winrate 1.5 scoreLead 0.2";
        assert!(parse_analyze_line(line, 9).is_empty());
    }

    #[test]
    fn test_parse_non_info_line() {
        assert!(parse_analyze_line("= ok", 9).is_empty());
        assert!(parse_analyze_line("", 9).is_empty());
    }
}
