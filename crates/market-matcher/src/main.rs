//! Market Matching CLI
//!
//! Matches every production origin to its most profitable destination market
//! for the April and/or October marketing periods.
//!
//! Usage:
//!   match-markets match --origins data/swift_corn.geojson \
//!                       --destinations data/swift_markets.geojson \
//!                       --rules config/normalization_rules.json \
//!                       --period both --prefix Swift
//!
//!   match-markets geocode output/Swift_OD_October.csv

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use market_matcher::routing::OfflineRouter;
use market_matcher::{
    geocode, loader, normalize, writer, DestinationPoint, DistanceResolver, Matcher,
    MatcherConfig, OriginPoint, OsrmRouter, PeriodKind, RoadRouter, UtmZone,
};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "match-markets",
    about = "Match grain production origins to their most profitable markets"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run origin-destination matching and write output tables
    Match(MatchArgs),
    /// Append WGS84 X/Y columns to a written table
    Geocode(GeocodeArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum PeriodArg {
    April,
    October,
    Both,
}

impl PeriodArg {
    fn periods(self) -> Vec<PeriodKind> {
        match self {
            PeriodArg::April => vec![PeriodKind::April],
            PeriodArg::October => vec![PeriodKind::October],
            PeriodArg::Both => PeriodKind::ALL.to_vec(),
        }
    }
}

#[derive(Args, Debug)]
struct ZoneArgs {
    /// UTM zone number of the projected coordinates
    #[arg(long)]
    utm_zone: Option<u8>,

    /// Coordinates are in the southern hemisphere
    #[arg(long)]
    southern: bool,
}

#[derive(Args, Debug)]
struct MatchArgs {
    /// Origin point layer (GeoJSON)
    #[arg(short, long)]
    origins: PathBuf,

    /// Destination point layer (GeoJSON)
    #[arg(short, long)]
    destinations: PathBuf,

    /// Output directory
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Marketing period(s) to run
    #[arg(short, long, value_enum, default_value_t = PeriodArg::Both)]
    period: PeriodArg,

    /// Destination normalization rules (JSON)
    #[arg(short, long)]
    rules: Option<PathBuf>,

    /// Config file (JSON); flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// OSRM base URL
    #[arg(long)]
    osrm_url: Option<String>,

    /// Routing request timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Origins evaluated concurrently
    #[arg(long)]
    max_concurrent: Option<usize>,

    #[command(flatten)]
    zone: ZoneArgs,

    /// Straight-line distances only, no routing requests
    #[arg(long)]
    offline: bool,

    /// Output file name prefix
    #[arg(long)]
    prefix: Option<String>,

    /// Also output O-D lines as GeoJSON
    #[arg(long)]
    geojson: bool,
}

#[derive(Args, Debug)]
struct GeocodeArgs {
    /// CSV table written by `match`
    input: PathBuf,

    /// Coordinate pair column (default: origin_xy, else destination_xy)
    #[arg(long)]
    column: Option<String>,

    #[command(flatten)]
    zone: ZoneArgs,
}

fn resolve_config(args: &MatchArgs) -> Result<MatcherConfig> {
    let mut config = match &args.config {
        Some(path) => MatcherConfig::from_file(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => MatcherConfig::default(),
    };

    if let Some(url) = &args.osrm_url {
        config.osrm_url = url.clone();
    }
    if let Some(secs) = args.timeout_secs {
        config.timeout_secs = secs;
    }
    if let Some(n) = args.max_concurrent {
        config.max_concurrent = n;
    }
    if let Some(number) = args.zone.utm_zone {
        config.utm_zone = UtmZone::new(number, !args.zone.southern)?;
    } else if args.zone.southern {
        config.utm_zone = UtmZone::new(config.utm_zone.number, false)?;
    }
    if args.offline {
        config.offline = true;
    }
    if let Some(prefix) = &args.prefix {
        config.output_prefix = prefix.clone();
    }

    config.validate()?;
    Ok(config)
}

async fn run_periods<R: RoadRouter>(
    router: R,
    args: &MatchArgs,
    config: &MatcherConfig,
    origins: &[OriginPoint],
    destinations: &[DestinationPoint],
) -> Result<()> {
    let matcher = Matcher::new(
        DistanceResolver::new(router, config.utm_zone),
        config.max_concurrent,
    );
    let geojson_zone = args.geojson.then_some(config.utm_zone);

    for period in args.period.periods() {
        info!("\n{}", "-".repeat(60));
        info!("{} period ({:.0}% shipped)", period, period.share() * 100.0);
        info!("{}", "-".repeat(60));

        let outcome = matcher.match_period(origins, destinations, period).await;
        let written = writer::write_period_outputs(
            &args.output_dir,
            &config.output_prefix,
            &outcome,
            geojson_zone,
        )
        .with_context(|| format!("Failed to write {} outputs", period))?;

        let stats = &outcome.stats;
        info!("Origins evaluated:        {}", stats.origins_evaluated);
        info!("Matches written:          {}", stats.records_emitted);
        info!("Origins without profit:   {}", stats.origins_dropped);
        info!("Incomplete candidates:    {}", stats.candidates_skipped);
        info!("Straight-line fallbacks:  {}", stats.straight_line_fallbacks);
        for path in [&written.matches, &written.destinations, &written.metadata, &written.geojson]
            .into_iter()
            .flatten()
        {
            info!("  -> {:?}", path);
        }
    }

    Ok(())
}

async fn run_match(args: MatchArgs) -> Result<()> {
    let config = resolve_config(&args)?;

    info!("{}", "=".repeat(60));
    info!("Grain Market Matcher");
    info!("{}", "=".repeat(60));

    let origins = loader::load_origins(&args.origins)
        .with_context(|| format!("Failed to load origins from {:?}", args.origins))?;
    let mut destinations = loader::load_destinations(&args.destinations)
        .with_context(|| format!("Failed to load destinations from {:?}", args.destinations))?;

    if let Some(path) = &args.rules {
        let rules = normalize::load_rules(path)
            .with_context(|| format!("Failed to load rules from {:?}", path))?;
        normalize::apply_rules(&mut destinations, &rules)?;
    }

    if config.offline {
        info!("Offline mode: straight-line distances only");
        run_periods(OfflineRouter, &args, &config, &origins, &destinations).await?;
    } else {
        info!("Routing via {}", config.osrm_url);
        let router = OsrmRouter::from_config(&config)?;
        run_periods(router, &args, &config, &origins, &destinations).await?;
    }

    info!("\n{}", "=".repeat(60));
    info!("DONE");
    info!("{}", "=".repeat(60));

    Ok(())
}

fn run_geocode(args: GeocodeArgs) -> Result<()> {
    let zone = UtmZone::new(
        args.zone.utm_zone.unwrap_or(UtmZone::default().number),
        !args.zone.southern,
    )?;
    let input: &Path = &args.input;

    match geocode::augment_table(input, args.column.as_deref(), zone)
        .with_context(|| format!("Failed to geocode {:?}", input))?
    {
        Some(output) => info!("Wrote {:?}", output),
        None => info!("Nothing written for {:?}", input),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Command::Match(args) => run_match(args).await,
        Command::Geocode(args) => run_geocode(args),
    }
}
