//! Thin CLI wiring `clap`, `tracing-subscriber` and `indicatif` around
//! `duperscooper-core`. Owns no duplicate-detection logic; every exit
//! code and surfaced flag maps onto a core operation.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use duperscooper_core::album::matcher::{match_albums, MatchOptions, Strategy as MatcherStrategy};
use duperscooper_core::album::{build_albums, Album};
use duperscooper_core::apply::{execute, plan};
use duperscooper_core::cache::{Cache, LegacyJsonCache, SqliteCache};
use duperscooper_core::config::DuperscooperConfig;
use duperscooper_core::grouping::group_tracks;
use duperscooper_core::rules::RuleSet;
use duperscooper_core::scanner::{Algorithm, ScanOutcome, Scanner, ScannerConfig};
use duperscooper_core::serialize::{Item, RecordGroup, ScanResult};
use duperscooper_core::staging::{Mode as StagingMode, StagingEngine};
use tracing::{error, info};

const EXIT_SUCCESS_NO_DUPLICATES: u8 = 0;
const EXIT_ERROR: u8 = 1;
const EXIT_SUCCESS_DUPLICATES_FOUND: u8 = 2;
/// Reserved for cooperative cancellation (SIGINT); no signal handler is
/// wired up yet, so this code is never returned today.
#[allow(dead_code)]
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser)]
#[command(name = "duperscooper")]
#[command(about = "Finds and removes duplicate audio tracks and albums by fingerprint")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file, layered over the built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan one or more paths for duplicate tracks or albums.
    Scan(ScanArgs),
    /// Apply deletion rules to a previously produced scan result.
    ApplyRules(ApplyArgs),
    /// Cache maintenance operations.
    Cache(CacheArgs),
    /// Staging batch operations: list, restore, empty.
    Stage(StageArgs),
}

#[derive(clap::Args)]
struct ScanArgs {
    /// Root paths to scan.
    paths: Vec<PathBuf>,

    #[arg(long, value_enum, default_value = "track")]
    mode: ModeArg,

    #[arg(long, value_enum, default_value = "perceptual")]
    algorithm: AlgorithmArg,

    #[arg(long, default_value_t = 97.0)]
    threshold: f64,

    #[arg(long)]
    workers: Option<usize>,

    #[arg(long, value_enum, default_value = "sqlite")]
    cache_backend: CacheBackendArg,

    #[arg(long)]
    update_cache: bool,

    #[arg(long)]
    disable_cache: bool,

    #[arg(long, value_enum, default_value = "record")]
    output: OutputArg,

    #[arg(long)]
    partial_album: bool,

    #[arg(long, default_value_t = 0.5)]
    partial_album_min_overlap: f64,
}

#[derive(Copy, Clone, ValueEnum)]
enum ModeArg {
    Track,
    Album,
}

#[derive(Copy, Clone, ValueEnum)]
enum AlgorithmArg {
    Exact,
    Perceptual,
}

#[derive(Copy, Clone, ValueEnum)]
enum CacheBackendArg {
    Sqlite,
    LegacyJson,
}

#[derive(Copy, Clone, ValueEnum)]
enum OutputArg {
    Record,
    Flat,
    Text,
}

#[derive(clap::Args)]
struct ApplyArgs {
    /// Path to a serialized scan result (record JSON or flat CSV).
    input: PathBuf,

    #[arg(long, default_value = "eliminate-duplicates")]
    strategy: String,

    #[arg(long)]
    rules_config: Option<PathBuf>,

    #[arg(long)]
    execute: bool,
}

#[derive(clap::Args)]
struct CacheArgs {
    #[command(subcommand)]
    op: CacheOp,
}

#[derive(Subcommand)]
enum CacheOp {
    Clear,
    Stats,
    CleanupOld {
        #[arg(long, default_value_t = 90)]
        max_age_days: u64,
    },
    MigrateLegacy {
        #[arg(long)]
        from: PathBuf,
    },
}

#[derive(clap::Args)]
struct StageArgs {
    #[arg(long)]
    scan_root: PathBuf,

    #[command(subcommand)]
    op: StageOp,
}

#[derive(Subcommand)]
enum StageOp {
    List,
    Restore { batch_id: uuid::Uuid },
    Empty {
        #[arg(long)]
        max_age_days: Option<u64>,
    },
}

fn main() -> ExitCode {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let config = match DuperscooperConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("failed to load configuration: {e}");
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let code = match cli.command {
        Commands::Scan(args) => run_scan(args, &config),
        Commands::ApplyRules(args) => run_apply(args),
        Commands::Cache(args) => run_cache(args, &config),
        Commands::Stage(args) => run_stage(args),
    };
    ExitCode::from(code)
}

fn open_cache(config: &DuperscooperConfig) -> anyhow::Result<Box<dyn Cache>> {
    use duperscooper_core::config::CacheBackendChoice;
    let cache: Box<dyn Cache> = match config.cache_backend {
        CacheBackendChoice::Sqlite => {
            let path = config
                .cache_path_override
                .clone()
                .unwrap_or_else(|| duperscooper_paths::PATHS.cache_db.clone());
            Box::new(SqliteCache::open(&path)?)
        }
        CacheBackendChoice::LegacyJson => {
            let path = config
                .cache_path_override
                .clone()
                .unwrap_or_else(|| duperscooper_paths::PATHS.legacy_cache_file.clone());
            Box::new(LegacyJsonCache::open(&path)?)
        }
    };
    Ok(cache)
}

fn run_scan(args: ScanArgs, config: &DuperscooperConfig) -> u8 {
    if args.paths.is_empty() {
        error!("at least one path must be provided");
        return EXIT_ERROR;
    }

    let cache = match open_cache(config) {
        Ok(c) => c,
        Err(e) => {
            error!("cache unavailable, continuing without it: {e}");
            Box::new(NullCache)
        }
    };

    let algorithm = match args.algorithm {
        AlgorithmArg::Exact => Algorithm::Exact,
        AlgorithmArg::Perceptual => Algorithm::Perceptual,
    };

    let mut scanner_config = ScannerConfig::default();
    scanner_config.algorithm = algorithm;
    scanner_config.update_cache = args.update_cache;
    if let Some(workers) = args.workers {
        scanner_config.threads = workers.max(1);
    }

    let spinner = indicatif::ProgressBar::new_spinner();
    spinner.set_message("scanning...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(120));

    let scanner = Scanner::new(scanner_config, cache.as_ref());
    let ScanOutcome { tracks, errors } = scanner.scan(&args.paths);

    spinner.finish_with_message(format!("scanned {} files", tracks.len()));
    info!(scanned = tracks.len(), errors, "scan complete");

    let result = match args.mode {
        ModeArg::Track => {
            let groups = group_tracks(&tracks, algorithm, args.threshold);
            let record_groups: Vec<RecordGroup> = groups
                .into_iter()
                .enumerate()
                .map(|(i, g)| RecordGroup {
                    group_id: i as u64,
                    matched_album: None,
                    matched_artist: None,
                    items: g
                        .members
                        .into_iter()
                        .map(|m| {
                            let t = &tracks[m.index];
                            Item {
                                path: t.path.display().to_string(),
                                group_id: i as u64,
                                size: t.size,
                                file_size: t.size,
                                quality_score: t.quality_score,
                                quality_string: t.quality_string.clone(),
                                similarity_to_best: Some(m.similarity_to_best),
                                match_percentage: Some(m.similarity_to_best),
                                match_method: Some(match algorithm {
                                    Algorithm::Exact => "exact".to_string(),
                                    Algorithm::Perceptual => "perceptual".to_string(),
                                }),
                                is_best: m.is_best,
                                recommended_action: format!("{:?}", m.recommended_action).to_lowercase(),
                                format: Some(t.codec.clone()),
                                codec: Some(t.codec.clone()),
                                bitrate_bps: t.bitrate_bps,
                                sample_rate_hz: t.sample_rate_hz,
                                bit_depth: t.bit_depth,
                                is_lossless: t.lossless,
                                track_count: None,
                                album_identifier: t.album_identifier.clone(),
                                album_name: t.album.clone(),
                                artist_name: t.artist.clone(),
                            }
                        })
                        .collect(),
                })
                .collect();
            ScanResult::from_items(record_groups)
        }
        ModeArg::Album => {
            let albums: Vec<Album> = build_albums(&tracks);
            let options = MatchOptions {
                strategy: MatcherStrategy::Auto,
                threshold: args.threshold,
                partial: args.partial_album,
                min_overlap_ratio: args.partial_album_min_overlap,
            };
            let groups = match_albums(&albums, options);
            let record_groups: Vec<RecordGroup> = groups
                .into_iter()
                .enumerate()
                .map(|(i, g)| RecordGroup {
                    group_id: i as u64,
                    matched_album: g.members.first().and_then(|m| m.matched_album.clone()),
                    matched_artist: g.members.first().and_then(|m| m.matched_artist.clone()),
                    items: g
                        .members
                        .into_iter()
                        .map(|m| {
                            let album = &albums[m.index];
                            Item {
                                path: album.path.display().to_string(),
                                group_id: i as u64,
                                size: album.total_size,
                                file_size: album.total_size,
                                quality_score: album.average_quality_score,
                                quality_string: album.quality_string.clone(),
                                similarity_to_best: None,
                                match_percentage: Some(m.confidence),
                                match_method: Some("album".to_string()),
                                is_best: false,
                                recommended_action: "review".to_string(),
                                format: None,
                                codec: None,
                                bitrate_bps: None,
                                sample_rate_hz: None,
                                bit_depth: None,
                                is_lossless: false,
                                track_count: Some(album.track_count as u64),
                                album_identifier: album.album_identifier.clone(),
                                album_name: album.album_name.clone(),
                                artist_name: album.artist_name.clone(),
                            }
                        })
                        .collect(),
                })
                .collect();
            ScanResult::from_items(record_groups)
        }
    };

    let rendered = match args.output {
        OutputArg::Record => serde_json::to_string_pretty(&result).unwrap_or_default(),
        OutputArg::Flat => result.to_flat_csv(),
        OutputArg::Text => format!(
            "scanned {} files, {} groups, {} duplicates, {} errors",
            tracks.len(),
            result.total_groups,
            result.total_duplicates,
            errors
        ),
    };
    println!("{rendered}");

    if errors > 0 {
        info!(errors, "some files could not be processed");
    }

    if result.total_groups == 0 {
        EXIT_SUCCESS_NO_DUPLICATES
    } else {
        EXIT_SUCCESS_DUPLICATES_FOUND
    }
}

fn run_apply(args: ApplyArgs) -> u8 {
    let raw = match std::fs::read_to_string(&args.input) {
        Ok(r) => r,
        Err(e) => {
            error!("could not read scan result: {e}");
            return EXIT_ERROR;
        }
    };

    let scan_result = match serde_json::from_str::<ScanResult>(&raw).or_else(|_| {
        ScanResult::from_flat_csv(&raw).ok_or_else(|| serde_json::from_str::<ScanResult>("null").unwrap_err())
    }) {
        Ok(r) => r,
        Err(_) => {
            error!("scan result is neither valid record JSON nor flat CSV");
            return EXIT_ERROR;
        }
    };

    let rules = match args.strategy.as_str() {
        "eliminate-duplicates" => RuleSet::eliminate_duplicates(),
        "keep-lossless" => RuleSet::keep_lossless(),
        "custom" => match args.rules_config.as_deref().map(std::fs::read_to_string) {
            Some(Ok(raw)) => match serde_json::from_str(&raw) {
                Ok(r) => r,
                Err(e) => {
                    error!("invalid rules config: {e}");
                    return EXIT_ERROR;
                }
            },
            _ => {
                error!("custom strategy requires --rules-config");
                return EXIT_ERROR;
            }
        },
        other if other.starts_with("keep-format:") => {
            RuleSet::keep_format(other.trim_start_matches("keep-format:"))
        }
        other => {
            error!("unknown strategy: {other}");
            return EXIT_ERROR;
        }
    };

    let report = match plan(&scan_result, &rules) {
        Ok(r) => r,
        Err(e) => {
            error!("rule evaluation failed: {e}");
            return EXIT_ERROR;
        }
    };

    println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());

    if args.execute {
        let scan_root = args
            .input
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let engine = StagingEngine::new(scan_root);
        match execute(&scan_result, &report, &engine, StagingMode::Track) {
            Ok(batch_id) => info!(%batch_id, "staged marked items"),
            Err(e) => {
                error!("staging failed: {e}");
                return EXIT_ERROR;
            }
        }
    }

    EXIT_SUCCESS_NO_DUPLICATES
}

fn run_cache(args: CacheArgs, config: &DuperscooperConfig) -> u8 {
    let cache = match open_cache(config) {
        Ok(c) => c,
        Err(e) => {
            error!("could not open cache: {e}");
            return EXIT_ERROR;
        }
    };

    match args.op {
        CacheOp::Clear => match cache.clear() {
            Ok(()) => EXIT_SUCCESS_NO_DUPLICATES,
            Err(e) => {
                error!("{e}");
                EXIT_ERROR
            }
        },
        CacheOp::Stats => {
            let stats = cache.stats();
            println!("hits={} misses={} size={}", stats.hits, stats.misses, stats.size);
            EXIT_SUCCESS_NO_DUPLICATES
        }
        CacheOp::CleanupOld { max_age_days } => {
            match cache.cleanup_old(std::time::Duration::from_secs(max_age_days * 86_400)) {
                Ok(removed) => {
                    println!("removed {removed} stale entries");
                    EXIT_SUCCESS_NO_DUPLICATES
                }
                Err(e) => {
                    error!("{e}");
                    EXIT_ERROR
                }
            }
        }
        CacheOp::MigrateLegacy { from } => {
            let legacy = match LegacyJsonCache::open(&from) {
                Ok(c) => c,
                Err(e) => {
                    error!("{e}");
                    return EXIT_ERROR;
                }
            };
            let entries = match legacy.export_entries() {
                Ok(e) => e,
                Err(e) => {
                    error!("{e}");
                    return EXIT_ERROR;
                }
            };
            match cache.migrate_legacy(entries) {
                Ok(imported) => {
                    println!("imported {imported} entries from {}", from.display());
                    EXIT_SUCCESS_NO_DUPLICATES
                }
                Err(e) => {
                    error!("{e}");
                    EXIT_ERROR
                }
            }
        }
    }
}

fn run_stage(args: StageArgs) -> u8 {
    let engine = StagingEngine::new(&args.scan_root);
    match args.op {
        StageOp::List => {
            for batch_id in engine.list_batches() {
                match engine.read_manifest(batch_id) {
                    Ok(manifest) => {
                        let restored = manifest.items.iter().filter(|i| i.restored).count();
                        let state = if restored == 0 {
                            "none"
                        } else if restored == manifest.items.len() {
                            "all"
                        } else {
                            "partial"
                        };
                        println!(
                            "{batch_id} mode={:?} items={} restored={state}",
                            manifest.mode,
                            manifest.items.len()
                        );
                    }
                    Err(e) => error!("{e}"),
                }
            }
            EXIT_SUCCESS_NO_DUPLICATES
        }
        StageOp::Restore { batch_id } => match engine.restore(batch_id) {
            Ok(()) => EXIT_SUCCESS_NO_DUPLICATES,
            Err(e) => {
                error!("{e}");
                EXIT_ERROR
            }
        },
        StageOp::Empty { max_age_days } => {
            let max_age = max_age_days.map(|d| std::time::Duration::from_secs(d * 86_400));
            match engine.empty(max_age) {
                Ok(removed) => {
                    println!("removed {removed} staging batches");
                    EXIT_SUCCESS_NO_DUPLICATES
                }
                Err(e) => {
                    error!("{e}");
                    EXIT_ERROR
                }
            }
        }
    }
}

/// No-op cache used when the configured backend fails to open: corruption
/// or open failure degrades to compute-without-cache rather than
/// aborting the run.
struct NullCache;

impl Cache for NullCache {
    fn get(&self, _: &str) -> Result<Option<duperscooper_core::Fingerprint>, duperscooper_core::error::CacheError> {
        Ok(None)
    }
    fn set(
        &self,
        _: &str,
        _: &duperscooper_core::Fingerprint,
        _: &str,
    ) -> Result<(), duperscooper_core::error::CacheError> {
        Ok(())
    }
    fn stats(&self) -> duperscooper_core::cache::StatsReport {
        duperscooper_core::cache::StatsReport {
            hits: 0,
            misses: 0,
            size: 0,
            backend_kind: duperscooper_core::cache::BackendKind::Sqlite,
        }
    }
    fn clear(&self) -> Result<(), duperscooper_core::error::CacheError> {
        Ok(())
    }
    fn cleanup_old(&self, _: std::time::Duration) -> Result<u64, duperscooper_core::error::CacheError> {
        Ok(0)
    }
    fn migrate_legacy(
        &self,
        _: Vec<duperscooper_core::cache::LegacyEntry>,
    ) -> Result<u64, duperscooper_core::error::CacheError> {
        Ok(0)
    }
}

