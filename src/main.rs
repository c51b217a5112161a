use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{interval_at, Duration, Instant};
use trendsignal::config::AppConfig;
use trendsignal::data::synthetic::MarketScenario;
use trendsignal::data::{CandleFeed, CandleStore, FileFeed, SyntheticFeed};
use trendsignal::delivery::{format_daily_summary, format_signal_message, ChannelSink, LogSink, Notification, SignalSink};
use trendsignal::engine::scanner::{trading_date, until_next};
use trendsignal::engine::{Clock, Scanner, SignalEngine, SystemClock};
use trendsignal::risk::RiskManager;
use trendsignal::TradeOutcome;

const STORE_CAPACITY: usize = 1_000;
const DEMO_HISTORY: usize = 300;

#[derive(Parser, Debug)]
#[command(name = "trendsignal", about = "Trend-following signal engine for NIFTY/BANKNIFTY options")]
struct Args {
    /// TOML configuration file (defaults to ./trendsignal.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding <INSTRUMENT>_<timeframe>.json candle files
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Use the seeded synthetic feed instead of files
    #[arg(long)]
    demo: bool,

    /// Run a single scan and exit
    #[arg(long)]
    once: bool,

    /// Where the risk state is persisted between runs
    #[arg(long, default_value = "trendsignal_state.json")]
    state_file: PathBuf,

    /// Seed for the synthetic feed
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    tracing::info!("🚀 TrendSignal starting");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.schedule.utc_offset_minutes));
    let store = Arc::new(CandleStore::new(STORE_CAPACITY));
    let mut feed = create_feed(&args, &config)?;

    let today = trading_date(clock.now(), config.schedule.rollover_time);
    let risk = Arc::new(Mutex::new(load_risk_state(&args.state_file, &config, today)));

    log_configuration(&config);

    if args.once {
        refresh_feed(feed.as_mut(), &store);
        let scanner = Scanner::new(
            SignalEngine::from_config(&config),
            store.clone(),
            risk.clone(),
            Arc::new(LogSink),
            clock.clone(),
        )
        .with_rollover_time(config.schedule.rollover_time);
        let report = scanner.run_tick();
        tracing::info!(
            "Scan complete: {} signals, {} rejections, {} suppressed",
            report.signals.len(),
            report.rejections.len(),
            report.suppressed
        );
        save_risk_state(&args.state_file, &risk);
        return Ok(());
    }

    let (sink, notifications) = ChannelSink::new(32);
    let sink: Arc<dyn SignalSink> = Arc::new(sink);
    let scanner = Arc::new(Scanner::new(
        SignalEngine::from_config(&config),
        store.clone(),
        risk.clone(),
        sink,
        clock.clone(),
    )
    .with_rollover_time(config.schedule.rollover_time));

    tracing::info!("\n🔄 Spawning loops...");

    // Loop 1: feed refresh + scan
    let scan_task = {
        let scanner = scanner.clone();
        let store = store.clone();
        let state_file = args.state_file.clone();
        let every = Duration::from_secs(config.schedule.scan_interval_secs);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now(), every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                refresh_feed(feed.as_mut(), &store);

                let report = scanner.run_tick();
                if report.skipped {
                    continue;
                }
                tracing::info!(
                    "🔎 [SCAN] {}: {} signals, {} rejections, {} suppressed",
                    report.at.format("%H:%M:%S"),
                    report.signals.len(),
                    report.rejections.len(),
                    report.suppressed
                );
                if !report.signals.is_empty() {
                    save_risk_state(&state_file, &scanner.risk());
                }
            }
        })
    };

    // Loop 2: day rollover
    let rollover_task = {
        let scanner = scanner.clone();
        let clock = clock.clone();
        let state_file = args.state_file.clone();
        let at = config.schedule.rollover_time;
        tokio::spawn(async move {
            loop {
                let wait = until_next(clock.now(), at)
                    .to_std()
                    .unwrap_or(Duration::from_secs(60));
                tracing::info!("Next risk rollover in {:?}", wait);
                tokio::time::sleep(wait).await;

                scanner.rollover();
                save_risk_state(&state_file, &scanner.risk());
            }
        })
    };

    // Loop 3: trade outcomes reported on stdin
    let outcome_task = {
        let risk = risk.clone();
        let state_file = args.state_file.clone();
        tokio::spawn(async move {
            read_outcomes(risk, state_file).await;
        })
    };

    // Delivery collaborator
    let delivery_task = tokio::spawn(print_notifications(notifications));

    tracing::info!("✅ All loops spawned");
    tracing::info!("  Type 'win' or 'loss' to report a trade outcome, 'status' for the daily summary");
    tracing::info!("\nPress Ctrl+C to stop...\n");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
        }
        result = scan_task => {
            tracing::error!("Scan loop exited: {:?}", result);
        }
        result = rollover_task => {
            tracing::error!("Rollover loop exited: {:?}", result);
        }
        result = outcome_task => {
            tracing::error!("Outcome reader exited: {:?}", result);
        }
        result = delivery_task => {
            tracing::error!("Delivery task exited: {:?}", result);
        }
    }

    save_risk_state(&args.state_file, &risk);
    tracing::info!("👋 TrendSignal stopped");
    Ok(())
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trendsignal=info,trendsignal::strategy=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn create_feed(args: &Args, config: &AppConfig) -> Result<Box<dyn CandleFeed>> {
    let timeframes = vec![config.timeframes.htf, config.timeframes.ltf];

    if args.demo {
        let mut feed = SyntheticFeed::new(args.seed, timeframes, DEMO_HISTORY);
        for (i, name) in config.instrument_names().iter().enumerate() {
            let scenario = if i % 2 == 0 {
                MarketScenario::Uptrend
            } else {
                MarketScenario::Downtrend
            };
            feed = feed.with_instrument(name, demo_start_price(name), scenario);
        }
        tracing::info!("Using synthetic feed (seed {})", args.seed);
        return Ok(Box::new(feed));
    }

    match &args.data_dir {
        Some(dir) => {
            tracing::info!("Reading candles from {}", dir.display());
            Ok(Box::new(FileFeed::new(dir.clone(), config.instrument_names(), timeframes)))
        }
        None => bail!("either --data-dir or --demo is required"),
    }
}

fn demo_start_price(instrument: &str) -> f64 {
    match instrument {
        "NIFTY" => 22_000.0,
        "BANKNIFTY" => 47_000.0,
        _ => 10_000.0,
    }
}

fn refresh_feed(feed: &mut dyn CandleFeed, store: &CandleStore) {
    match feed.refresh(store, Utc::now()) {
        Ok(changed) => tracing::debug!("Feed refreshed: {} candles updated", changed),
        Err(e) => tracing::warn!("  ✗ Feed refresh failed: {}", e),
    }
}

fn load_risk_state(path: &Path, config: &AppConfig, today: chrono::NaiveDate) -> RiskManager {
    let limits = config.risk.limits.clone();
    match std::fs::read_to_string(path) {
        Ok(json) => {
            tracing::info!("Restoring risk state from {}", path.display());
            RiskManager::restore_json(limits, &json, today)
        }
        Err(_) => RiskManager::new(limits, today),
    }
}

fn save_risk_state(path: &Path, risk: &Mutex<RiskManager>) {
    let json = {
        let manager = risk.lock().unwrap_or_else(|e| e.into_inner());
        manager.to_json()
    };

    let result = json
        .context("Failed to serialize risk state")
        .and_then(|json| std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display())));
    if let Err(e) = result {
        tracing::warn!("{:#}", e);
    }
}

async fn read_outcomes(risk: Arc<Mutex<RiskManager>>, state_file: PathBuf) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let outcome = match line.trim().to_lowercase().as_str() {
            "win" | "w" => TradeOutcome::Win,
            "loss" | "l" => TradeOutcome::Loss,
            "status" => {
                let summary = risk.lock().unwrap_or_else(|e| e.into_inner()).summary();
                println!("{}", format_daily_summary(&summary));
                continue;
            }
            "" => continue,
            other => {
                tracing::warn!("Unknown command '{}', expected win, loss or status", other);
                continue;
            }
        };

        risk.lock()
            .unwrap_or_else(|e| e.into_inner())
            .record_outcome(outcome);
        save_risk_state(&state_file, &risk);
    }
}

async fn print_notifications(mut rx: tokio::sync::mpsc::Receiver<Notification>) {
    while let Some(notification) = rx.recv().await {
        match notification {
            Notification::Signal(signal) => println!("\n{}\n", format_signal_message(&signal)),
            Notification::Summary(summary) => println!("\n{}\n", format_daily_summary(&summary)),
        }
    }
}

fn log_configuration(config: &AppConfig) {
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Instruments: {}", config.instrument_names().join(", "));
    tracing::info!("  Timeframes: {} trend / {} entry", config.timeframes.htf, config.timeframes.ltf);
    tracing::info!(
        "  Capital: ₹{:.0}, risk {:.1}% per trade, max {} lots",
        config.risk.sizing.total_capital,
        config.risk.sizing.risk_per_trade * 100.0,
        config.risk.sizing.max_lots
    );
    tracing::info!(
        "  Limits: {} signals/day, pause after {} losses",
        config.risk.limits.daily_max_signals,
        config.risk.limits.max_consecutive_losses
    );
    tracing::info!("  Minimum confluence: {:.1}/10", config.scoring.min_score);
}
