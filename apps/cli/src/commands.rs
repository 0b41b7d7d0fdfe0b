//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use url::Url;

use spiderpool_core::{
    DomainOutcome, ProgressReporter, generate_all_spider_pools, generate_spider_pool_pages,
    initialize_content_sources, load_source_file,
};
use spiderpool_shared::{
    AppConfig, DomainAlias, DomainType, GenerationConfig, expand_home, init_config, load_config,
};
use spiderpool_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// spiderpool: synthesize and maintain spider-pool pages.
#[derive(Parser)]
#[command(
    name = "spiderpool",
    version,
    about = "Seed content sources and generate spider-pool pages per domain.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Database path (defaults to `defaults.database_path` from config).
    #[arg(long, global = true, env = "SPIDERPOOL_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Seed or refresh the builtin content sources.
    Seed {
        /// Also upsert a content source defined in this TOML file.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Website management.
    Website {
        #[command(subcommand)]
        action: WebsiteAction,
    },

    /// Domain alias management.
    Domain {
        #[command(subcommand)]
        action: DomainAction,
    },

    /// Generate pages for one domain alias.
    Generate {
        /// Domain alias ID or domain name.
        #[arg(long)]
        domain: String,

        /// Theme tag (defaults to the configured theme for the domain).
        #[arg(long)]
        theme: Option<String>,

        /// Number of pages (defaults to `defaults.page_count`).
        #[arg(long)]
        count: Option<u32>,
    },

    /// Generate pages for every active spider-pool domain.
    GenerateAll {
        /// Pages per domain (defaults to `defaults.page_count`).
        #[arg(long)]
        count: Option<u32>,
    },

    /// List generated pages of a domain alias.
    Pages {
        /// Domain alias ID or domain name.
        #[arg(long)]
        domain: String,
    },

    /// Show view and crawl counters of a domain alias.
    Stats {
        /// Domain alias ID or domain name.
        #[arg(long)]
        domain: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Website subcommands.
#[derive(Subcommand)]
pub(crate) enum WebsiteAction {
    /// Register a website.
    Add {
        /// Display name.
        name: String,
    },
}

/// Domain alias subcommands.
#[derive(Subcommand)]
pub(crate) enum DomainAction {
    /// Bind a domain to a website.
    Add {
        /// Owning website ID.
        #[arg(long)]
        website: String,

        /// Bare domain name, e.g. pool-a.example.com.
        domain: String,

        /// Domain role: spider-pool, main-site, or redirect-page.
        #[arg(long = "type", default_value = "spider-pool")]
        domain_type: String,

        /// Register the alias as inactive.
        #[arg(long)]
        inactive: bool,

        /// Primary keyword tag (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Secondary keyword tag (repeatable).
        #[arg(long = "secondary-tag")]
        secondary_tags: Vec<String>,
    },
    /// List all domain aliases.
    List,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "spiderpool=info",
        1 => "spiderpool=debug",
        _ => "spiderpool=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = load_config()?;
    let db = cli.db.clone();

    match cli.command {
        Command::Seed { file } => cmd_seed(&config, db, file.as_deref()).await,
        Command::Website { action } => match action {
            WebsiteAction::Add { name } => cmd_website_add(&config, db, &name).await,
        },
        Command::Domain { action } => match action {
            DomainAction::Add {
                website,
                domain,
                domain_type,
                inactive,
                tags,
                secondary_tags,
            } => {
                let mut alias = DomainAlias::new(website, domain, domain_type.parse::<DomainType>()?);
                alias.is_active = !inactive;
                alias.primary_tags = tags;
                alias.secondary_tags = secondary_tags;
                cmd_domain_add(&config, db, alias).await
            }
            DomainAction::List => cmd_domain_list(&config, db).await,
        },
        Command::Generate {
            domain,
            theme,
            count,
        } => cmd_generate(&config, db, &domain, theme.as_deref(), count).await,
        Command::GenerateAll { count } => cmd_generate_all(&config, db, count).await,
        Command::Pages { domain } => cmd_pages(&config, db, &domain).await,
        Command::Stats { domain } => cmd_stats(&config, db, &domain).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config).await,
        },
    }
}

/// Open the database from `--db` or the configured default path.
async fn open_storage(config: &AppConfig, db: Option<PathBuf>) -> Result<Storage> {
    let path = match db {
        Some(p) => p,
        None => expand_home(&config.defaults.database_path)?,
    };
    info!(path = %path.display(), "opening database");
    Ok(Storage::open(&path).await?)
}

/// Look up an alias by ID first, then by domain name.
async fn resolve_alias(storage: &Storage, key: &str) -> Result<DomainAlias> {
    if let Some(alias) = storage.get_domain_alias(key).await? {
        return Ok(alias);
    }
    storage
        .get_domain_alias_by_domain(key)
        .await?
        .ok_or_else(|| eyre!("no domain alias with ID or name '{key}'"))
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Result<Self> {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")?
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Ok(Self { spinner })
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn page_written(&self, slug: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Writing [{current}/{total}] {slug}"));
    }

    fn domain_finished(&self, outcome: &DomainOutcome) {
        let line = match &outcome.error {
            None => format!(
                "  ok    {} ({}): {} pages",
                outcome.domain, outcome.theme, outcome.pages_written
            ),
            Some(err) => format!(
                "  FAIL  {} ({}) after {} pages: {err}",
                outcome.domain, outcome.theme, outcome.pages_written
            ),
        };
        self.spinner.println(line);
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_seed(config: &AppConfig, db: Option<PathBuf>, file: Option<&Path>) -> Result<()> {
    let storage = open_storage(config, db).await?;
    let seeded = initialize_content_sources(&storage).await?;
    for source in &seeded {
        println!(
            "  {:<24} {:>4} paragraphs {:>4} headings {:>4} keywords",
            source.name, source.total_paragraphs, source.total_headings, source.total_keywords
        );
    }

    if let Some(path) = file {
        let def = load_source_file(path)?;
        let source = storage.upsert_content_source(&def).await?;
        println!(
            "  {:<24} {:>4} paragraphs {:>4} headings {:>4} keywords  (from {})",
            source.name,
            source.total_paragraphs,
            source.total_headings,
            source.total_keywords,
            path.display()
        );
    }
    Ok(())
}

async fn cmd_website_add(config: &AppConfig, db: Option<PathBuf>, name: &str) -> Result<()> {
    let storage = open_storage(config, db).await?;
    let website = storage.insert_website(name).await?;
    println!("{}", website.id);
    Ok(())
}

async fn cmd_domain_add(config: &AppConfig, db: Option<PathBuf>, alias: DomainAlias) -> Result<()> {
    let parsed = Url::parse(&format!("https://{}/", alias.domain))
        .map_err(|e| eyre!("invalid domain '{}': {e}", alias.domain))?;
    if parsed.host_str() != Some(alias.domain.as_str()) {
        return Err(eyre!("'{}' is not a bare domain name", alias.domain));
    }

    let storage = open_storage(config, db).await?;
    storage.insert_domain_alias(&alias).await?;
    info!(domain = %alias.domain, domain_type = %alias.domain_type, "domain alias added");
    println!("{}", alias.id);
    Ok(())
}

async fn cmd_domain_list(config: &AppConfig, db: Option<PathBuf>) -> Result<()> {
    let storage = open_storage(config, db).await?;
    let aliases = storage.list_domain_aliases().await?;
    if aliases.is_empty() {
        println!("no domain aliases registered");
        return Ok(());
    }
    for alias in aliases {
        let flag = if alias.is_active { "" } else { " (inactive)" };
        println!(
            "  {}  {:<32} {:<14}{flag}",
            alias.id,
            alias.domain,
            alias.domain_type.as_str()
        );
    }
    Ok(())
}

async fn cmd_generate(
    config: &AppConfig,
    db: Option<PathBuf>,
    domain: &str,
    theme: Option<&str>,
    count: Option<u32>,
) -> Result<()> {
    let storage = open_storage(config, db).await?;
    let generation = GenerationConfig::from(config);
    let alias = resolve_alias(&storage, domain).await?;

    let theme = theme.unwrap_or_else(|| generation.themes.theme_for(&alias.domain));
    let count = count.unwrap_or(generation.page_count);

    let reporter = CliProgress::new()?;
    let result =
        generate_spider_pool_pages(&storage, &generation, &alias.id, theme, count, &reporter).await;
    reporter.finish();
    let result = result?;

    println!();
    println!("  Domain:   {}", result.domain);
    println!("  Theme:    {}", result.theme);
    println!("  Inserted: {}", result.inserted);
    println!("  Updated:  {}", result.updated);
    println!("  Time:     {:.1}s", result.elapsed.as_secs_f64());
    println!();
    Ok(())
}

async fn cmd_generate_all(config: &AppConfig, db: Option<PathBuf>, count: Option<u32>) -> Result<()> {
    let storage = open_storage(config, db).await?;
    let mut generation = GenerationConfig::from(config);
    if let Some(count) = count {
        generation.page_count = count;
    }

    let reporter = CliProgress::new()?;
    let summary = generate_all_spider_pools(&storage, &generation, &reporter).await;
    reporter.finish();
    let summary = summary?;

    println!();
    println!("  Domains:   {}", summary.domains_attempted);
    println!("  Succeeded: {}", summary.domains_succeeded);
    println!("  Failed:    {}", summary.domains_failed);
    println!("  Pages:     {}", summary.pages_generated);
    println!("  Time:      {:.1}s", summary.elapsed.as_secs_f64());
    println!();

    if summary.domains_failed > 0 {
        return Err(eyre!(
            "{} of {} domains failed",
            summary.domains_failed,
            summary.domains_attempted
        ));
    }
    Ok(())
}

async fn cmd_pages(config: &AppConfig, db: Option<PathBuf>, domain: &str) -> Result<()> {
    let storage = open_storage(config, db).await?;
    let alias = resolve_alias(&storage, domain).await?;
    let pages = storage.list_spider_pages(&alias.id).await?;
    for page in &pages {
        println!(
            "  {:<20} {:>6} views {:>6} crawls  {}",
            page.slug, page.views, page.crawler_visits, page.title
        );
    }
    println!("  {} pages on {}", pages.len(), alias.domain);
    Ok(())
}

async fn cmd_stats(config: &AppConfig, db: Option<PathBuf>, domain: &str) -> Result<()> {
    let storage = open_storage(config, db).await?;
    let alias = resolve_alias(&storage, domain).await?;
    let stats = storage.domain_page_stats(&alias.id).await?;

    println!("  Domain:         {}", alias.domain);
    println!("  Pages:          {}", stats.page_count);
    println!("  Views:          {}", stats.total_views);
    println!("  Crawler visits: {}", stats.total_crawler_visits);
    match stats.last_crawled {
        Some(at) => println!("  Last crawled:   {}", at.to_rfc3339()),
        None => println!("  Last crawled:   never"),
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}
