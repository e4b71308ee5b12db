mod cli;
mod settings;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use env_logger::Env;
use log::{info, warn};

use analysis::{
    AnalysisRequest, AnalyzeError, Analyzer, AnalyzerOptions, Engine, GtpEngine, GtpOptions,
};
use book::{BookOptions, OpeningBook};
use cli::{AnalyzeArgs, Cli, Commands, ImportSgfArgs, PositionArgs};
use common::{get_env_usize, ConfigLoader, FsExt};
use model::AnalysisResult;
use settings::Settings;
use store::AnalysisStore;

fn main() -> Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let mut builder = tokio::runtime::Builder::new_multi_thread();

    builder.enable_all();

    if let Some(worker_threads) = get_env_usize("TOKIO_THREADS") {
        builder.worker_threads(worker_threads);
    }

    builder.build().unwrap().block_on(async_main())?;

    Ok(())
}

async fn async_main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.relative_to_cwd()?;
    let config = ConfigLoader::new(config_path, "analysis".to_string())?;
    let settings: Settings = config.load()?;

    match cli.command {
        Commands::Analyze(args) => analyze(&settings, args).await,
        Commands::Query(args) => query(&settings, args).await,
        Commands::ImportSgf(args) => import_sgf(&settings, args).await,
        Commands::Stats => stats(&settings).await,
    }
}

async fn analyze(settings: &Settings, args: AnalyzeArgs) -> Result<()> {
    let mut analyzer = build_analyzer(settings, !args.no_engine).await?;

    let request = AnalysisRequest {
        board_size: args.position.size,
        moves: args.position.moves.clone(),
        handicap: args.position.handicap,
        komi: args.position.komi,
        required_lookup_visits: args.lookup_visits,
        compute_visits: args.visits,
        force_refresh: args.force_refresh,
    };

    let outcome = analyzer.analyze(request).await;
    analyzer.shutdown();

    print_result(&outcome?);
    Ok(())
}

async fn query(settings: &Settings, args: PositionArgs) -> Result<()> {
    let mut analyzer = build_analyzer(settings, false).await?;

    let request = AnalysisRequest {
        board_size: args.size,
        moves: args.moves.clone(),
        handicap: args.handicap,
        komi: args.komi,
        required_lookup_visits: 0,
        compute_visits: None,
        force_refresh: false,
    };

    match analyzer.analyze(request).await {
        Ok(result) => print_result(&result),
        Err(AnalyzeError::EngineUnavailable(_)) => {
            println!("Position not found in opening book or cache.");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

async fn import_sgf(settings: &Settings, args: ImportSgfArgs) -> Result<()> {
    let content = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read SGF file {}", args.file))?;
    let game = goban::sgf::parse(&content)?;

    info!(
        "Imported SGF: {size}x{size} board, {moves} moves, komi {komi}",
        size = game.board_size,
        moves = game.moves.len(),
        komi = game.komi
    );

    // Handicap placements from the record are replayed verbatim rather than
    // re-derived, since SGF files may use nonstandard spots.
    let moves = game
        .handicap_stones
        .iter()
        .map(|coord| format!("B {}", coord))
        .chain(game.moves.iter().map(|mv| mv.to_string()))
        .collect();

    let mut analyzer = build_analyzer(settings, !args.no_engine).await?;

    let request = AnalysisRequest {
        board_size: game.board_size,
        moves,
        handicap: 0,
        komi: Some(game.komi),
        required_lookup_visits: 0,
        compute_visits: args.visits,
        force_refresh: false,
    };

    let outcome = analyzer.analyze(request).await;
    analyzer.shutdown();

    print_result(&outcome?);
    Ok(())
}

async fn stats(settings: &Settings) -> Result<()> {
    let analyzer = build_analyzer(settings, false).await?;
    let stats = analyzer.stats().await;

    println!("Opening book entries: {}", stats.book_entries);
    println!("Local cache entries:  {}", stats.cache_entries);

    if !stats.by_board_size.is_empty() {
        println!("\nBy board size:");
        let mut sizes: Vec<_> = stats.by_board_size.iter().collect();
        sizes.sort();
        for (size, count) in sizes {
            println!("  {size}x{size}: {count}");
        }
    }

    Ok(())
}

async fn build_analyzer(settings: &Settings, with_engine: bool) -> Result<Analyzer> {
    let store = AnalysisStore::open(&settings.db_path).await?;

    let mut open_book = OpeningBook::new(BookOptions::default());
    if let Some(path) = &settings.book_path {
        if let Err(e) = open_book.load(path) {
            // Non-fatal: the cache and engine layers still function.
            warn!("Opening book unavailable: {}", e);
        }
    }

    let engine: Option<Box<dyn Engine + Send>> = if with_engine && settings.engine_enabled {
        settings.engine_binary.as_ref().map(|binary| {
            let mut options = GtpOptions::new(binary.clone());
            options.model = settings.engine_model.clone();
            options.config = settings.engine_config.clone();
            options.label = settings.engine_label.clone();

            Box::new(GtpEngine::new(options)) as Box<dyn Engine + Send>
        })
    } else {
        None
    };

    let options = AnalyzerOptions {
        engine_timeout: Duration::from_secs(settings.engine_timeout_secs),
        top_moves_count: settings.top_moves_count,
        visits_19: settings.visits_19x19,
        visits_small: settings.visits_small,
    };

    Ok(Analyzer::new(open_book, store, engine, options))
}

fn print_result(result: &AnalysisResult) {
    let completeness = if result.completeness.is_complete() {
        "complete"
    } else {
        "partial"
    };

    println!("{}", "=".repeat(50));
    println!("Go Position Analysis");
    println!("{}", "=".repeat(50));
    println!(
        "Board: {size}x{size} | Komi: {komi}",
        size = result.board_size,
        komi = result.komi
    );
    println!(
        "Source: {} | Effort: {} visits ({})",
        result.source.label(),
        result.effort_visits,
        completeness
    );
    println!();
    println!("Top {} candidates:", result.top_moves.len());

    for (i, candidate) in result.top_moves.iter().enumerate() {
        let sign = if candidate.score_lead >= 0.0 { "+" } else { "" };
        println!(
            "  {:2}. {:<4} | WinRate {:5.1}% | ScoreLead {}{:.1} | Visits {}",
            i + 1,
            candidate.vertex.to_string(),
            candidate.win_probability * 100.0,
            sign,
            candidate.score_lead,
            candidate.visits
        );
    }

    println!();
    println!("Engine: {}", result.engine_label);
    println!("{}", "=".repeat(50));
}
