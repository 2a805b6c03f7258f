//! # Mail Prospector CLI
//!
//! Command-line interface for the `mail_prospector_core` library. Parses arguments,
//! builds the configuration, reads person records from a file or stdin, runs the
//! pipeline, and writes the results as JSON.

use mail_prospector_core::{
    check_smtp_connectivity, find_single, initialize_prospector, process_queries_with_progress,
    Config, ConfigBuilder, PersonQuery, ProgressHook, Prospector, ProspectResult, SenderMode,
};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter, FmtSubscriber};

/// How the sender pool is walked when a recipient reply is ambiguous.
#[derive(Copy, Clone, Debug, ValueEnum)]
enum SenderModeArg {
    /// Stop at the first sender the host accepts.
    First,
    /// Retry the recipient with every accepted sender.
    Each,
}

impl From<SenderModeArg> for SenderMode {
    fn from(arg: SenderModeArg) -> Self {
        match arg {
            SenderModeArg::First => SenderMode::FirstAccepted,
            SenderModeArg::Each => SenderMode::EachAccepted,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Discovers and verifies email addresses for named people.",
    long_about = "Mail Prospector combines address pattern generation, page crawling and SMTP probing to find verified email addresses for a person, then ranks them against an identity lookup."
)]
struct AppArgs {
    /// Input file with one record per line: `First Last [hint-url ...] [keywords ...]`. Use `-` for stdin.
    #[arg(short, long, default_value = "input.txt", env = "PROSPECTOR_INPUT")]
    input: String,

    /// Path to the output JSON file.
    #[arg(short, long, default_value = "results.json", env = "PROSPECTOR_OUTPUT")]
    output: String,

    /// Look up a single person instead of reading the input file.
    #[arg(long, env = "PROSPECTOR_NAME")]
    name: Option<String>,

    /// Hint URL or domain for the single-person mode. Repeatable.
    #[arg(long = "hint", requires = "name")]
    hints: Vec<String>,

    /// Search keywords for the single-person mode.
    #[arg(long, requires = "name", default_value = "")]
    keywords: String,

    /// Write results to standard output instead of the output file.
    #[arg(long, default_value = "false", env = "PROSPECTOR_STDOUT")]
    stdout: bool,

    /// Path to a TOML configuration file. CLI args override file settings.
    #[arg(long, env = "PROSPECTOR_CONFIG")]
    config_file: Option<String>,

    /// Number of queries processed concurrently.
    #[arg(short, long, env = "PROSPECTOR_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Link depth followed from each hint URL (0 = the page itself).
    #[arg(long, env = "PROSPECTOR_MAX_DEPTH")]
    max_depth: Option<usize>,

    /// User agent string for HTTP requests.
    #[arg(long, env = "PROSPECTOR_USER_AGENT")]
    user_agent: Option<String>,

    /// SMTP socket timeout in seconds.
    #[arg(long, env = "PROSPECTOR_SMTP_TIMEOUT")]
    smtp_timeout: Option<u64>,

    /// HTTP request timeout in seconds.
    #[arg(long, env = "PROSPECTOR_REQUEST_TIMEOUT")]
    request_timeout: Option<u64>,

    /// DNS resolution timeout in seconds.
    #[arg(long, env = "PROSPECTOR_DNS_TIMEOUT")]
    dns_timeout: Option<u64>,

    /// Comma-separated list of DNS servers to use for lookups.
    #[arg(long, value_delimiter = ',', env = "PROSPECTOR_DNS_SERVERS")]
    dns_servers: Option<Vec<String>>,

    /// Delay between mail-host attempts, in milliseconds.
    #[arg(long, env = "PROSPECTOR_HOST_DELAY_MS")]
    host_delay_ms: Option<u64>,

    /// Comma-separated sender addresses used for `MAIL FROM`, in order.
    #[arg(long, value_delimiter = ',', env = "PROSPECTOR_SENDERS")]
    senders: Option<Vec<String>>,

    #[arg(long, value_enum)]
    sender_mode: Option<SenderModeArg>,

    /// Identity lookup endpoint.
    #[arg(long, env = "PROSPECTOR_IDENTITY_ENDPOINT")]
    identity_endpoint: Option<String>,

    /// Identity lookup API key. Scoring is skipped without one.
    #[arg(long, env = "PROSPECTOR_IDENTITY_API_KEY", hide_env_values = true)]
    identity_api_key: Option<String>,

    /// Drop matches whose name distance exceeds this value.
    #[arg(long)]
    max_name_distance: Option<usize>,

    /// Cookie jar file for authenticated hosts.
    #[arg(long, env = "PROSPECTOR_COOKIE_JAR")]
    cookie_jar: Option<String>,

    /// Comma-separated hosts fetched with the cookie session.
    #[arg(long, value_delimiter = ',', env = "PROSPECTOR_AUTHENTICATED_HOSTS")]
    authenticated_hosts: Option<Vec<String>>,

    /// Search page to crawl per query; `{query}` is replaced by the name and keywords.
    #[arg(long, env = "PROSPECTOR_SEARCH_URL")]
    search_url: Option<String>,

    /// Profile directory to crawl per person; `{first}` and `{last}` are filled in.
    #[arg(long, env = "PROSPECTOR_DIRECTORY_URL")]
    directory_url: Option<String>,

    /// Skip the outbound port 25 check at startup.
    #[arg(long, default_value = "false")]
    skip_smtp_check: bool,
}

/// One entry of the JSON output.
#[derive(Serialize)]
struct OutputEntry<'a> {
    query: &'a PersonQuery,
    result: &'a ProspectResult,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_thread_names(true)
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .compact()
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Setting up tracing subscriber failed")?;

    tracing::info!(
        "Mail Prospector CLI v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let args = AppArgs::parse();
    tracing::debug!("Parsed CLI arguments: {:?}", args);

    let config = build_config(&args)?;
    tracing::debug!("Effective configuration loaded: {:?}", config);

    if args.skip_smtp_check {
        tracing::info!("Skipping SMTP connectivity test.");
    } else {
        match check_smtp_connectivity(&config).await {
            Ok(_) => tracing::info!(
                "SMTP connectivity test passed (outbound port {} likely open).",
                config.smtp_port
            ),
            Err(e) => {
                tracing::error!("SMTP connectivity test failed: {}", e);
                tracing::warn!("Probing will likely be inconclusive for every candidate.");
                tracing::warn!("Check firewall rules or ISP restrictions on outbound SMTP.");
            }
        }
    }

    let prospector = match initialize_prospector(config) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            tracing::error!("Initialization error: {}", e);
            return Err(anyhow::anyhow!("Failed to initialize prospector: {}", e));
        }
    };

    let start_time = Instant::now();
    let execution_result = if args.name.is_some() {
        process_single_mode(&prospector, &args).await
    } else {
        process_file_mode(prospector, &args, start_time).await
    };

    if let Err(e) = execution_result {
        tracing::error!("Execution failed: {}", e);
        return Err(e);
    }
    tracing::info!("Finished. Total duration: {:.2?}", start_time.elapsed());
    Ok(())
}

fn build_config(args: &AppArgs) -> Result<Config> {
    let mut builder = ConfigBuilder::new();

    if let Some(ref path) = args.config_file {
        builder = builder.config_file(path);
    }
    if let Some(c) = args.concurrency {
        builder = builder.max_concurrency(c);
    }
    if let Some(d) = args.max_depth {
        builder = builder.max_depth(d);
    }
    if let Some(ref ua) = args.user_agent {
        builder = builder.user_agent(ua);
    }
    if let Some(t) = args.smtp_timeout {
        builder = builder.smtp_timeout(Duration::from_secs(t));
    }
    if let Some(t) = args.request_timeout {
        builder = builder.request_timeout(Duration::from_secs(t));
    }
    if let Some(t) = args.dns_timeout {
        builder = builder.dns_timeout(Duration::from_secs(t));
    }
    if let Some(ref servers) = args.dns_servers {
        if !servers.is_empty() {
            builder = builder.dns_servers(servers.clone());
        }
    }
    if let Some(ms) = args.host_delay_ms {
        builder = builder.host_pacing(Duration::from_millis(ms));
    }
    if let Some(ref senders) = args.senders {
        if !senders.is_empty() {
            builder = builder.sender_pool(senders.clone());
        }
    }
    if let Some(mode) = args.sender_mode {
        builder = builder.sender_mode(mode.into());
    }
    if let Some(ref endpoint) = args.identity_endpoint {
        builder = builder.identity_endpoint(endpoint);
    }
    if let Some(ref key) = args.identity_api_key {
        builder = builder.identity_api_key(Some(key));
    }
    if let Some(max) = args.max_name_distance {
        builder = builder.max_name_distance(max);
    }
    if let Some(ref path) = args.cookie_jar {
        builder = builder.cookie_jar_path(path);
    }
    if let Some(ref hosts) = args.authenticated_hosts {
        builder = builder.authenticated_hosts(hosts.clone());
    }
    if let Some(ref url) = args.search_url {
        builder = builder.search_url_template(Some(url));
    }
    if let Some(ref url) = args.directory_url {
        builder = builder.directory_url_template(Some(url));
    }

    builder.build().map_err(|e| {
        tracing::error!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to build configuration: {}", e)
    })
}

async fn process_single_mode(prospector: &Prospector, args: &AppArgs) -> Result<()> {
    let name = args.name.as_deref().unwrap_or_default();
    let query = PersonQuery::new(name, args.hints.iter().cloned(), args.keywords.clone())
        .with_context(|| format!("Invalid query for '{}'", name))?;

    tracing::info!(
        "Prospecting for '{}' with {} hint(s)",
        query.name,
        query.hint_urls.len()
    );
    let result = find_single(prospector, &query).await;

    write_results(&[(&query, &result)], args)?;
    log_summary(&[(&query, &result)], 1, Duration::ZERO);
    Ok(())
}

async fn process_file_mode(
    prospector: Arc<Prospector>,
    args: &AppArgs,
    start_time: Instant,
) -> Result<()> {
    tracing::info!(
        "Running in file mode. Input: '{}', Output: '{}'",
        args.input,
        if args.stdout { "<stdout>" } else { args.output.as_str() }
    );

    if !args.stdout {
        ensure_output_writable(&args.output)?;
    }

    let (queries, total_records) = load_queries(&args.input)?;
    if queries.is_empty() {
        tracing::warn!("Input '{}' contains no valid records. Writing empty results.", args.input);
        write_results(&[], args)?;
        return Ok(());
    }
    tracing::info!(
        "Loaded {} queries from {} records (concurrency: {})",
        queries.len(),
        total_records,
        prospector.config().max_concurrency
    );

    let pb = ProgressBar::new(queries.len() as u64);
    pb.set_style(ProgressStyle::default_bar()
         .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) | ETA: {eta} | {msg}")
         .context("Failed to set progress bar template")?
         .progress_chars("=> "));
    pb.set_message("Prospecting...");

    let tick = pb.clone();
    let hook: ProgressHook = Arc::new(move |query: &PersonQuery, result: &ProspectResult| {
        tick.set_message(format!("{}: {} verified", query.name, result.verified().count()));
        tick.inc(1);
    });

    let results = process_queries_with_progress(prospector, queries, Some(hook)).await;
    pb.finish_with_message(format!("Processed {} queries", results.len()));

    let mut ordered: Vec<(&PersonQuery, &ProspectResult)> = results.iter().collect();
    ordered.sort_by(|a, b| a.0.cmp(b.0));

    write_results(&ordered, args)?;
    log_summary(&ordered, total_records, start_time.elapsed());
    Ok(())
}

/// Reads one query per non-blank line; `#` starts a comment line. Bad records are skipped.
fn load_queries(input: &str) -> Result<(Vec<PersonQuery>, usize)> {
    let reader: Box<dyn BufRead> = if input == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let path = Path::new(input);
        if !path.is_file() {
            return Err(anyhow::anyhow!("Input file not found or is not a file: {}", input));
        }
        let file = File::open(path).with_context(|| format!("Failed to open input file '{}'", input))?;
        Box::new(BufReader::new(file))
    };

    let mut queries = Vec::new();
    let mut total = 0;
    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {} of '{}'", index + 1, input))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        total += 1;
        match PersonQuery::from_record(trimmed) {
            Ok(query) => queries.push(query),
            Err(e) => tracing::warn!("Skipping line {}: {}", index + 1, e),
        }
    }
    Ok((queries, total))
}

fn ensure_output_writable(output: &str) -> Result<()> {
    let output_path = Path::new(output);
    if let Some(parent_dir) = output_path.parent() {
        if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
            tracing::debug!("Creating output directory: {}", parent_dir.display());
            std::fs::create_dir_all(parent_dir).with_context(|| {
                format!("Failed to create output directory '{}'", parent_dir.display())
            })?;
        }
    }
    File::create(output)
        .with_context(|| format!("Cannot write to output file '{}'. Check permissions.", output))?;
    Ok(())
}

/// Writes `[{ query, result }, ...]` as pretty JSON to the output file or stdout.
fn write_results(results: &[(&PersonQuery, &ProspectResult)], args: &AppArgs) -> Result<()> {
    let entries: Vec<OutputEntry<'_>> = results
        .iter()
        .map(|&(query, result)| OutputEntry { query, result })
        .collect();

    if args.stdout {
        let stdout = io::stdout();
        let mut writer = BufWriter::new(stdout.lock());
        serde_json::to_writer_pretty(&mut writer, &entries)
            .context("Failed to serialize results to JSON")?;
        writeln!(writer).context("Failed to write to stdout")?;
        return Ok(());
    }

    tracing::debug!("Writing {} results to {}", entries.len(), args.output);
    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create/truncate output file '{}'", args.output))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &entries)
        .with_context(|| format!("Failed to serialize results to JSON for '{}'", args.output))?;
    tracing::info!("Results saved to '{}'.", args.output);
    Ok(())
}

fn log_summary(results: &[(&PersonQuery, &ProspectResult)], total_records: usize, duration: Duration) {
    let with_verified = results
        .iter()
        .filter(|(_, r)| r.verified().next().is_some())
        .count();
    let with_match = results
        .iter()
        .filter(|(_, r)| r.best_match().is_some())
        .count();
    let skipped = results
        .iter()
        .filter(|(_, r)| r.skipped_reason.is_some())
        .count();
    let probed: usize = results.iter().map(|(_, r)| r.probes.len()).sum();

    tracing::info!("-------------------- Prospecting Summary --------------------");
    tracing::info!("Records read                : {}", total_records);
    tracing::info!("Queries processed           : {}", results.len());
    tracing::info!("  - With verified addresses : {}", with_verified);
    tracing::info!("  - With identity match     : {}", with_match);
    tracing::info!("  - Skipped (no candidates) : {}", skipped);
    tracing::info!("Candidates probed           : {}", probed);
    if duration > Duration::ZERO {
        tracing::info!("Total time taken            : {:.2?}", duration);
    }
    for (query, result) in results {
        if let Some(best) = result.best_match() {
            tracing::info!("{} -> {} (distance {})", query.name, best.candidate, best.score);
        }
    }
    tracing::info!("-------------------------------------------------------------");
}
