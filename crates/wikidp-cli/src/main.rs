//! WikiDP CLI
//!
//! Runs the portal's HTTP API and exposes the same lookups on the command
//! line:
//! - `serve`: the JSON API used by the portal front end
//! - `item`, `property`, `search`, `puid`, `formats`: one-shot lookups
//! - `schema`: property checklist for a local JSON schema
//! - `config`: effective configuration with secrets masked

use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;
use wikidp_portal::{
    HttpClaimWriter, HttpKnowledgeBase, ItemDetail, Portal, SearchHit, WriteAuth,
};
use wikidp_sparql::{HttpSparqlEndpoint, IdPatterns};

mod config;
mod server;

use config::{LogFormat, PortalConfig, DEFAULT_UI_LANGUAGES, SIGN_UP_URL};

#[derive(Parser)]
#[command(name = "wikidp")]
#[command(
    author,
    version,
    about = "WikiDP: Wikidata for digital preservation"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

/// Flags that override every other configuration source.
#[derive(Args, Debug, Clone, Default)]
struct GlobalArgs {
    /// JSON config file (same as `WIKIDP_CONFIG_FILE`).
    #[arg(long, global = true)]
    config_file: Option<PathBuf>,

    /// Preferred label language.
    #[arg(long, global = true)]
    lang: Option<String>,

    /// Language used when the preferred one has no text.
    #[arg(long, global = true)]
    fallback_lang: Option<String>,

    #[arg(long, global = true)]
    schema_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    sparql_url: Option<String>,

    /// Wikibase action API used for reads.
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Print coloured one-line summaries instead of JSON.
    #[arg(long, global = true)]
    plain: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the JSON API.
    Serve(ServeArgs),

    /// Show an item (label, description, aliases; `--claims` for statements).
    Item {
        qid: String,
        #[arg(long)]
        claims: bool,
    },

    /// Show one property's details.
    Property { pid: String },

    /// Free-text item search.
    Search {
        text: String,
        /// Put PUID matches first, as the portal's search page does.
        #[arg(long)]
        context: bool,
    },

    /// Look up file formats by PRONOM identifier (`fmt/43`, `fmt_43`).
    Puid { puid: String },

    /// List file formats with their media types.
    Formats,

    /// Property checklist for a schema file under the schema directory.
    Schema {
        /// Schema path relative to the schema directory; omit to list schemas.
        name: Option<String>,
    },

    /// Print the effective configuration.
    Config,
}

#[derive(Args, Debug, Clone)]
struct ServeArgs {
    /// Listen address; defaults to `WIKIDP_HOST:PORT`. Use `127.0.0.1:0` to auto-pick a port.
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Write `{addr, pid}` JSON here once listening.
    #[arg(long)]
    ready_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.global)?;
    init_tracing(&config)?;

    tracing::info!(profile = ?config.profile, "wikidp started");
    tracing::info!(
        lang = %config.lang,
        fallback = %config.fallback_lang,
        wikibase_language = %config.wikibase_language(),
        "configured languages"
    );
    match config.log_file.as_ref() {
        Some(path) => tracing::info!(path = %path.display(), "logging to file"),
        None => tracing::info!("logging to stderr"),
    }

    let plain = cli.global.plain;
    match cli.command {
        Commands::Config => cmd_config(&config, plain)?,
        Commands::Serve(args) => {
            let listen = match args.listen {
                Some(addr) => addr,
                None => config
                    .listen_addr()
                    .parse()
                    .with_context(|| format!("invalid listen address `{}`", config.listen_addr()))?,
            };
            let portal = build_portal(&config)?;
            server::cmd_serve(
                portal,
                server::ServerConfig {
                    listen,
                    ready_file: args.ready_file,
                },
            )?;
        }
        Commands::Item { qid, claims } => {
            let portal = build_portal(&config)?;
            match portal.item_detail(&qid, claims)? {
                Some(item) if plain => print_item(&item),
                Some(item) => print_json(&item)?,
                None => return Err(anyhow!("item {qid} not found")),
            }
        }
        Commands::Property { pid } => {
            let portal = build_portal(&config)?;
            let row = portal
                .property(&pid)?
                .ok_or_else(|| anyhow!("property {pid} not found"))?;
            if plain {
                println!(
                    "{} {} {}",
                    pid.cyan().bold(),
                    row.get("propertyLabel").map(String::as_str).unwrap_or(""),
                    row.get("propertyType").map(String::as_str).unwrap_or("").dimmed()
                );
            } else {
                print_json(&row)?;
            }
        }
        Commands::Search { text, context } => {
            let portal = build_portal(&config)?;
            let text = text.trim();
            if context {
                let hits = portal.search_result_context(text)?;
                if plain {
                    for hit in &hits {
                        match hit {
                            SearchHit::Puid(p) => {
                                println!("{} {} {}", "puid".yellow().bold(), p.qid.cyan(), p.label)
                            }
                            SearchHit::Item(item) => print_item(item),
                        }
                    }
                } else {
                    print_json(&hits)?;
                }
            } else {
                let items = portal.search_result_list(text)?;
                if plain {
                    items.iter().for_each(print_item);
                } else {
                    print_json(&items)?;
                }
            }
        }
        Commands::Puid { puid } => {
            let portal = build_portal(&config)?;
            let (puid, results) = portal.search_by_puid(&puid)?;
            if plain {
                for r in &results {
                    println!("{} {} {} {}", puid.yellow(), "→".cyan(), r.format.bold(), r.label);
                }
            } else {
                print_json(&serde_json::json!({ "puid": puid, "results": results }))?;
            }
        }
        Commands::Formats => {
            let portal = build_portal(&config)?;
            let formats = portal.file_formats()?;
            if plain {
                for f in &formats {
                    println!("{} {} {}", f.qid.cyan(), f.name, f.media_types.join(", ").dimmed());
                }
            } else {
                print_json(&formats)?;
            }
        }
        Commands::Schema { name } => {
            let portal = build_portal(&config)?;
            match name {
                Some(name) => {
                    let checklist = portal.property_checklist(&name)?;
                    if plain {
                        for row in &checklist {
                            println!(
                                "  {} {}",
                                row.get("id").map(String::as_str).unwrap_or("").cyan(),
                                row.get("propertyLabel").map(String::as_str).unwrap_or("")
                            );
                        }
                    } else {
                        print_json(&checklist)?;
                    }
                }
                None => print_json(&portal.schema_listing()?)?,
            }
        }
    }

    Ok(())
}

/// Defaults, profile and environment, then the command-line flags on top.
fn load_config(flags: &GlobalArgs) -> Result<PortalConfig> {
    let config_file = flags
        .config_file
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned());
    let mut config = PortalConfig::from_lookup(|key| {
        if key == "WIKIDP_CONFIG_FILE" && config_file.is_some() {
            return config_file.clone();
        }
        std::env::var(key).ok()
    })?;

    if let Some(lang) = flags.lang.clone() {
        config.lang = lang;
    }
    if let Some(lang) = flags.fallback_lang.clone() {
        config.fallback_lang = lang;
    }
    if let Some(dir) = flags.schema_dir.clone() {
        config.schema_dir = dir;
    }
    if let Some(url) = flags.sparql_url.clone() {
        config.sparql_url = url;
    }
    if let Some(url) = flags.api_url.clone() {
        config.api_url = url;
    }
    Ok(config)
}

fn init_tracing(config: &PortalConfig) -> Result<()> {
    match config.log_file.as_ref() {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            install_subscriber(config, Mutex::new(file), false);
        }
        None => install_subscriber(config, std::io::stderr, true),
    }
    Ok(())
}

fn install_subscriber<W>(config: &PortalConfig, writer: W, ansi: bool)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.profile.log_level()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi);

    // A second install (tests driving `main` twice) is harmless.
    let _ = match config.log_format {
        LogFormat::Verbose => builder
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .try_init(),
        LogFormat::Compact => builder.compact().with_target(false).try_init(),
    };
}

fn build_portal(config: &PortalConfig) -> Result<Portal> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let sparql = HttpSparqlEndpoint::new(&config.sparql_url, &config.user_agent, timeout)?;
    let kb = HttpKnowledgeBase::new(&config.api_url, &config.user_agent, timeout)?;
    let ids = IdPatterns::new(&config.item_regex, &config.property_regex)
        .context("invalid identifier regex")?;

    let mut portal = Portal::new(Arc::new(kb), Arc::new(sparql), config.languages())
        .with_id_patterns(ids)
        .with_schema_dir(config.schema_dir.clone());

    if let Some(auth) = write_auth(config) {
        let writer = HttpClaimWriter::new(&config.write_api_url, auth, &config.user_agent, timeout)?;
        portal = portal.with_writer(Arc::new(writer));
    } else {
        tracing::debug!("no write credentials configured; claim writes are disabled");
    }
    Ok(portal)
}

fn write_auth(config: &PortalConfig) -> Option<WriteAuth> {
    match (&config.bot_user, &config.bot_password, &config.oauth_token) {
        (Some(user), Some(password), _) => Some(WriteAuth::BotPassword {
            user: user.clone(),
            password: password.clone(),
        }),
        (_, _, Some(token)) => Some(WriteAuth::OAuthToken(token.clone())),
        _ => None,
    }
}

fn cmd_config(config: &PortalConfig, plain: bool) -> Result<()> {
    let shown = config.redacted();
    if plain {
        println!("{} {:?}", "profile".bold(), shown.profile);
        println!("{} {}", "listen".bold(), shown.listen_addr());
        println!("{} {}", "languages".bold(), shown.wikibase_language());
        println!("{} {}", "sparql".bold(), shown.sparql_url);
        println!("{} {}", "api".bold(), shown.api_url);
        println!("{} {}", "write api".bold(), shown.write_api_url);
        println!("{} {}", "schemas".bold(), shown.schema_dir.display());
        let writes = if write_auth(config).is_some() {
            "enabled".green().bold()
        } else {
            "disabled".yellow().bold()
        };
        println!("{} {}", "writes".bold(), writes);
        return Ok(());
    }

    let ui_languages: Vec<_> = DEFAULT_UI_LANGUAGES
        .iter()
        .map(|(code, name)| serde_json::json!({ "code": code, "name": name }))
        .collect();
    print_json(&serde_json::json!({
        "config": shown,
        "wikibase_language": config.wikibase_language(),
        "sign_up_url": SIGN_UP_URL,
        "ui_languages": ui_languages,
    }))
}

fn print_item(item: &ItemDetail) {
    println!(
        "{} {} {}",
        item.qid.cyan().bold(),
        item.label.bold(),
        item.description.dimmed()
    );
    if !item.aliases.is_empty() {
        println!("  {} {}", "aka".yellow(), item.aliases.join(", "));
    }
    if let Some(statements) = item.statements.as_ref() {
        for claim in statements.claims.iter().chain(&statements.external_links) {
            println!("  {} {} ({} values)", "→".cyan(), claim.label, claim.values.len());
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
