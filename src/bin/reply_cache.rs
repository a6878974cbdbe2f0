//! reply-cache: settings validation and backend probe
//!
//! Usage:
//!   reply-cache validate <settings.yaml>       Validate a settings file
//!   reply-cache probe [--config <path>]        Round-trip a probe reply, print stats
//!   reply-cache version                        Show version information

use anyhow::{bail, Context};
use reply_cache::config::CacheSettings;
use reply_cache::ResponseCache;
use std::path::PathBuf;
use std::time::Duration;

const PROBE_PROMPT: &str = "reply-cache probe";

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let result = match args[1].as_str() {
        "validate" => cmd_validate(&args[2..]),
        "probe" => cmd_probe(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("reply-cache {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn print_usage() {
    println!(
        r#"reply-cache: response cache tooling

USAGE:
    reply-cache <COMMAND> [OPTIONS]

COMMANDS:
    validate <path>             Validate a YAML settings file (env overrides applied)
    probe [--config <path>]     Store and read back a probe reply, then print stats as JSON
    version                     Show version information
    help                        Show this help message

ENVIRONMENT:
    REPLY_CACHE_BACKEND         memory | redis | none
    REPLY_CACHE_TTL_SECONDS     Default entry lifetime
    REPLY_CACHE_MAX_SIZE        Entry bound for the memory backend
    REDIS_HOST, REDIS_PORT, REDIS_PASSWORD, REDIS_DB
    REDIS_TIMEOUT_MS, REDIS_SCAN_TIMEOUT_MS
    RUST_LOG                    Log filter (e.g. reply_cache=debug)"#
    );
}

fn config_flag(args: &[String]) -> Option<PathBuf> {
    args.iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}

fn load_settings(path: Option<&PathBuf>) -> anyhow::Result<CacheSettings> {
    let mut settings = match path {
        Some(p) => CacheSettings::from_file(p)
            .with_context(|| format!("reading settings from {}", p.display()))?,
        None => CacheSettings::default(),
    };
    settings.apply_env().context("applying environment overrides")?;
    settings.validate()?;
    Ok(settings)
}

fn cmd_validate(args: &[String]) -> anyhow::Result<()> {
    let Some(path) = args.first().map(PathBuf::from) else {
        bail!("validate needs a settings file path");
    };
    let settings = load_settings(Some(&path))?;
    println!("{}: OK", path.display());
    println!("{}", serde_yaml::to_string(&redacted(settings))?);
    Ok(())
}

async fn cmd_probe(args: &[String]) -> anyhow::Result<()> {
    let settings = load_settings(config_flag(args).as_ref())?;
    let cache = ResponseCache::from_settings(&settings)?;

    let reply = format!("probe at {:?}", std::time::SystemTime::now());
    let stored = cache
        .cache_response(PROBE_PROMPT, &reply, Some(Duration::from_secs(30)))
        .await?;
    let read_back = cache.get_cached_response(PROBE_PROMPT).await;
    cache.invalidate(PROBE_PROMPT).await;

    let healthy = stored && read_back.as_deref() == Some(reply.as_str());
    println!(
        "backend {}: {}",
        cache.backend_name(),
        if healthy { "OK" } else { "DEGRADED (fail-open)" }
    );
    println!("{}", serde_json::to_string_pretty(&cache.get_stats().await)?);
    if cache.is_enabled() && !healthy {
        std::process::exit(2);
    }
    Ok(())
}

fn redacted(mut settings: CacheSettings) -> CacheSettings {
    if settings.redis.password.is_some() {
        settings.redis.password = Some("***".to_string());
    }
    settings
}
