//! Generation orchestration: one domain at a time, pages written serially.
//!
//! Two entry points:
//! - [`generate_spider_pool_pages`] for a single domain alias + theme + count
//! - [`generate_all_spider_pools`] for every active spider-pool alias, with the
//!   theme looked up in the configured [`ThemeMap`](spiderpool_shared::ThemeMap)

use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use spiderpool_shared::{DomainAlias, GenerationConfig, Result, SpiderPoolError};
use spiderpool_storage::{Storage, UpsertOutcome};

use crate::synthesis::{Synthesizer, theme_slug};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Result of generating pages for one domain alias.
#[derive(Debug, Clone)]
pub struct DomainGenerationResult {
    pub domain_alias_id: String,
    pub domain: String,
    pub theme: String,
    /// Pages newly created.
    pub inserted: usize,
    /// Pages rewritten in place.
    pub updated: usize,
    pub elapsed: Duration,
}

impl DomainGenerationResult {
    pub fn pages_written(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Pages written so far for one domain. Survives a mid-batch failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageTally {
    pub inserted: usize,
    pub updated: usize,
}

impl PageTally {
    pub fn total(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Per-domain line of a bulk run summary.
#[derive(Debug, Clone)]
pub struct DomainOutcome {
    pub domain_alias_id: String,
    pub domain: String,
    pub theme: String,
    /// Pages persisted, including those written before a failure.
    pub pages_written: usize,
    /// Failure message, if this domain failed.
    pub error: Option<String>,
}

impl DomainOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate result of [`generate_all_spider_pools`].
#[derive(Debug, Clone, Default)]
pub struct GenerationSummary {
    pub domains_attempted: usize,
    pub domains_succeeded: usize,
    pub domains_failed: usize,
    /// Pages persisted across all domains, failed ones included.
    pub pages_generated: usize,
    pub outcomes: Vec<DomainOutcome>,
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for reporting generation status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each page upsert.
    fn page_written(&self, slug: &str, current: usize, total: usize);
    /// Called when a domain finishes, successfully or not.
    fn domain_finished(&self, outcome: &DomainOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn page_written(&self, _slug: &str, _current: usize, _total: usize) {}
    fn domain_finished(&self, _outcome: &DomainOutcome) {}
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Generate or refresh `page_count` pages for one domain alias.
///
/// Input, the alias, and the content-source precondition are all checked
/// before the first write. Errors propagate to the caller.
#[instrument(skip_all, fields(domain_alias_id = %domain_alias_id, theme = %theme, page_count = page_count))]
pub async fn generate_spider_pool_pages(
    storage: &Storage,
    config: &GenerationConfig,
    domain_alias_id: &str,
    theme: &str,
    page_count: u32,
    progress: &dyn ProgressReporter,
) -> Result<DomainGenerationResult> {
    if page_count == 0 {
        return Err(SpiderPoolError::validation(
            "page count must be greater than zero",
        ));
    }
    theme_slug(theme)?;

    let alias = storage
        .get_domain_alias(domain_alias_id)
        .await?
        .ok_or_else(|| SpiderPoolError::not_found(format!("domain alias {domain_alias_id}")))?;
    if !alias.is_spider_pool_target() {
        warn!(
            domain = %alias.domain,
            domain_type = %alias.domain_type,
            active = alias.is_active,
            "generating for a domain that is not an active spider pool"
        );
    }

    progress.phase("Loading content sources");
    let synthesizer = load_synthesizer(storage, config).await?;

    let mut tally = PageTally::default();
    generate_for_alias(
        storage,
        &synthesizer,
        &alias,
        theme,
        page_count,
        &mut tally,
        progress,
    )
    .await
}

/// Generate pages for every active spider-pool alias.
///
/// A missing content-source precondition aborts before any domain is touched.
/// After that, each domain is attempted independently; a failing domain is
/// recorded in the summary and the run moves on.
#[instrument(skip_all, fields(page_count = config.page_count))]
pub async fn generate_all_spider_pools(
    storage: &Storage,
    config: &GenerationConfig,
    progress: &dyn ProgressReporter,
) -> Result<GenerationSummary> {
    let start = Instant::now();
    if config.page_count == 0 {
        return Err(SpiderPoolError::config(
            "page_count must be greater than zero",
        ));
    }

    progress.phase("Loading content sources");
    let synthesizer = load_synthesizer(storage, config).await?;

    progress.phase("Listing spider-pool domains");
    let aliases = storage.list_spider_pool_aliases().await?;
    info!(domains = aliases.len(), "starting bulk generation");

    let mut summary = GenerationSummary::default();
    for alias in &aliases {
        let theme = config.themes.theme_for(&alias.domain).to_string();
        progress.phase(&format!("Generating {} ({theme})", alias.domain));

        let mut tally = PageTally::default();
        let result = generate_for_alias(
            storage,
            &synthesizer,
            alias,
            &theme,
            config.page_count,
            &mut tally,
            progress,
        )
        .await;

        let error = match result {
            Ok(_) => None,
            Err(e) => {
                warn!(
                    domain = %alias.domain,
                    error = %e,
                    pages_written = tally.total(),
                    "domain generation failed"
                );
                Some(e.to_string())
            }
        };
        let outcome = DomainOutcome {
            domain_alias_id: alias.id.clone(),
            domain: alias.domain.clone(),
            theme,
            pages_written: tally.total(),
            error,
        };

        summary.domains_attempted += 1;
        summary.pages_generated += outcome.pages_written;
        if outcome.succeeded() {
            summary.domains_succeeded += 1;
        } else {
            summary.domains_failed += 1;
        }
        progress.domain_finished(&outcome);
        summary.outcomes.push(outcome);
    }

    summary.elapsed = start.elapsed();
    info!(
        attempted = summary.domains_attempted,
        succeeded = summary.domains_succeeded,
        failed = summary.domains_failed,
        pages = summary.pages_generated,
        "bulk generation complete"
    );
    Ok(summary)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn load_synthesizer(storage: &Storage, config: &GenerationConfig) -> Result<Synthesizer> {
    let sources = storage.list_active_content_sources().await?;
    let synthesizer = Synthesizer::new(&sources, config.synthesis.clone())?;
    debug!(
        sources = sources.len(),
        paragraphs = synthesizer.pool().paragraph_count(),
        headings = synthesizer.pool().heading_count(),
        keywords = synthesizer.pool().keyword_count(),
        "fragment pool ready"
    );
    Ok(synthesizer)
}

/// Synthesize then upsert, one page at a time. `tally` counts every page
/// persisted, so the caller still knows what landed if a write fails.
async fn generate_for_alias(
    storage: &Storage,
    synthesizer: &Synthesizer,
    alias: &DomainAlias,
    theme: &str,
    page_count: u32,
    tally: &mut PageTally,
    progress: &dyn ProgressReporter,
) -> Result<DomainGenerationResult> {
    let start = Instant::now();
    let specs = synthesizer.synthesize(alias, theme, page_count)?;
    let total = specs.len();

    for (i, spec) in specs.iter().enumerate() {
        match storage.upsert_spider_page(spec).await? {
            UpsertOutcome::Inserted => tally.inserted += 1,
            UpsertOutcome::Updated => tally.updated += 1,
        }
        debug!(slug = %spec.slug, "page written");
        progress.page_written(&spec.slug, i + 1, total);
    }

    let result = DomainGenerationResult {
        domain_alias_id: alias.id.clone(),
        domain: alias.domain.clone(),
        theme: theme.to_string(),
        inserted: tally.inserted,
        updated: tally.updated,
        elapsed: start.elapsed(),
    };
    info!(
        domain = %alias.domain,
        theme,
        inserted = tally.inserted,
        updated = tally.updated,
        "domain generation complete"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashSet};

    use super::*;
    use spiderpool_shared::{ContentSourceDef, DomainType, SynthesisConfig, ThemeMap};
    use uuid::Uuid;

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("sp_pipeline_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    /// One active source: 20 paragraphs, 10 headings, 50 keywords.
    async fn seed_source(storage: &Storage) -> Vec<String> {
        let def = ContentSourceDef {
            name: "fixture".into(),
            file_origin: None,
            is_active: true,
            paragraphs: (1..=20).map(|i| format!("Paragraph {i} body text.")).collect(),
            headings: (1..=10).map(|i| format!("Heading {i}")).collect(),
            keywords: (1..=50).map(|i| format!("kw{i}")).collect(),
        };
        storage.upsert_content_source(&def).await.expect("seed source");
        def.keywords
    }

    async fn add_alias(storage: &Storage, domain: &str, domain_type: DomainType) -> DomainAlias {
        let website = storage.insert_website("site").await.expect("website");
        let alias = DomainAlias::new(&website.id, domain, domain_type);
        storage.insert_domain_alias(&alias).await.expect("alias");
        alias
    }

    fn config_with(page_count: u32, themes: &[(&str, &str)]) -> GenerationConfig {
        let entries: BTreeMap<String, String> = themes
            .iter()
            .map(|(d, t)| (d.to_string(), t.to_string()))
            .collect();
        GenerationConfig {
            page_count,
            synthesis: SynthesisConfig::default(),
            themes: ThemeMap::new(entries, "general"),
        }
    }

    #[tokio::test]
    async fn five_pages_for_one_domain() {
        let storage = test_storage().await;
        let pool = seed_source(&storage).await;
        let alias = add_alias(&storage, "pool.example.com", DomainType::SpiderPool).await;

        let result = generate_spider_pool_pages(
            &storage,
            &GenerationConfig::default(),
            &alias.id,
            "seo",
            5,
            &SilentProgress,
        )
        .await
        .expect("generate");
        assert_eq!(result.inserted, 5);
        assert_eq!(result.updated, 0);

        let pages = storage.list_spider_pages(&alias.id).await.unwrap();
        let slugs: Vec<&str> = pages.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(
            slugs,
            vec!["seo-0001", "seo-0002", "seo-0003", "seo-0004", "seo-0005"]
        );
        for page in &pages {
            assert_eq!(page.domain_alias_id, alias.id);
            assert_eq!(page.theme, "seo");
            assert!(!page.keywords.is_empty());
            assert!(page.keywords.iter().all(|k| pool.contains(k)));
            assert_eq!(page.views, 0);
            assert_eq!(page.crawler_visits, 0);
            assert!(page.last_crawled.is_none());
        }
    }

    #[tokio::test]
    async fn regeneration_updates_in_place_and_keeps_counters() {
        let storage = test_storage().await;
        seed_source(&storage).await;
        let alias = add_alias(&storage, "pool.example.com", DomainType::SpiderPool).await;
        let config = GenerationConfig::default();

        generate_spider_pool_pages(&storage, &config, &alias.id, "seo", 150, &SilentProgress)
            .await
            .expect("first run");
        storage.record_page_view(&alias.id, "seo-0042").await.unwrap();
        storage.record_crawler_visit(&alias.id, "seo-0042").await.unwrap();
        let before = storage.find_spider_page(&alias.id, "seo-0042").await.unwrap().unwrap();

        let second =
            generate_spider_pool_pages(&storage, &config, &alias.id, "seo", 150, &SilentProgress)
                .await
                .expect("second run");
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 150);
        assert_eq!(storage.count_spider_pages(&alias.id).await.unwrap(), 150);

        let after = storage.find_spider_page(&alias.id, "seo-0042").await.unwrap().unwrap();
        assert_eq!(after.id, before.id);
        assert_eq!(after.views, 1);
        assert_eq!(after.crawler_visits, 1);
        assert_eq!(after.last_crawled, before.last_crawled);

        let untouched = storage.find_spider_page(&alias.id, "seo-0001").await.unwrap().unwrap();
        assert_eq!(untouched.views, 0);
        assert_eq!(untouched.crawler_visits, 0);
    }

    #[tokio::test]
    async fn one_run_yields_distinct_slugs_and_bodies() {
        let storage = test_storage().await;
        seed_source(&storage).await;
        let alias = add_alias(&storage, "pool.example.com", DomainType::SpiderPool).await;

        generate_spider_pool_pages(
            &storage,
            &GenerationConfig::default(),
            &alias.id,
            "seo",
            150,
            &SilentProgress,
        )
        .await
        .unwrap();

        let pages = storage.list_spider_pages(&alias.id).await.unwrap();
        let slugs: HashSet<&str> = pages.iter().map(|p| p.slug.as_str()).collect();
        let bodies: HashSet<&str> = pages.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(slugs.len(), 150);
        assert_eq!(bodies.len(), 150);
    }

    #[tokio::test]
    async fn no_active_sources_fails_without_writes() {
        let storage = test_storage().await;
        let alias = add_alias(&storage, "pool.example.com", DomainType::SpiderPool).await;
        storage
            .upsert_content_source(&ContentSourceDef {
                name: "disabled".into(),
                is_active: false,
                paragraphs: vec!["p".into()],
                headings: vec!["h".into()],
                keywords: vec!["k".into()],
                ..Default::default()
            })
            .await
            .unwrap();

        let err = generate_spider_pool_pages(
            &storage,
            &GenerationConfig::default(),
            &alias.id,
            "seo",
            10,
            &SilentProgress,
        )
        .await
        .unwrap_err();
        assert!(err.is_precondition());
        assert_eq!(storage.count_spider_pages(&alias.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected() {
        let storage = test_storage().await;
        seed_source(&storage).await;
        let alias = add_alias(&storage, "pool.example.com", DomainType::SpiderPool).await;
        let config = GenerationConfig::default();

        let zero = generate_spider_pool_pages(&storage, &config, &alias.id, "seo", 0, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(zero, SpiderPoolError::Validation { .. }));

        let bad_theme =
            generate_spider_pool_pages(&storage, &config, &alias.id, "***", 3, &SilentProgress)
                .await
                .unwrap_err();
        assert!(matches!(bad_theme, SpiderPoolError::Validation { .. }));

        let missing =
            generate_spider_pool_pages(&storage, &config, "no-such-alias", "seo", 3, &SilentProgress)
                .await
                .unwrap_err();
        assert!(matches!(missing, SpiderPoolError::NotFound(_)));
    }

    #[tokio::test]
    async fn bulk_run_isolates_failing_domain() {
        let storage = test_storage().await;
        seed_source(&storage).await;
        let a = add_alias(&storage, "a-pool.example.com", DomainType::SpiderPool).await;
        let b = add_alias(&storage, "b-pool.example.com", DomainType::SpiderPool).await;
        let c = add_alias(&storage, "c-pool.example.com", DomainType::SpiderPool).await;

        // b's theme has no slug-safe characters, so its generation fails.
        let config = config_with(
            10,
            &[("a-pool.example.com", "travel"), ("b-pool.example.com", "???")],
        );
        let summary = generate_all_spider_pools(&storage, &config, &SilentProgress)
            .await
            .expect("bulk run");

        assert_eq!(summary.domains_attempted, 3);
        assert_eq!(summary.domains_succeeded, 2);
        assert_eq!(summary.domains_failed, 1);
        assert_eq!(summary.pages_generated, 20);

        let failed: Vec<&DomainOutcome> =
            summary.outcomes.iter().filter(|o| !o.succeeded()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].domain_alias_id, b.id);
        assert!(failed[0].error.as_deref().unwrap_or("").contains("theme"));

        assert_eq!(storage.count_spider_pages(&a.id).await.unwrap(), 10);
        assert_eq!(storage.count_spider_pages(&b.id).await.unwrap(), 0);
        assert_eq!(storage.count_spider_pages(&c.id).await.unwrap(), 10);

        let a_page = storage.find_spider_page(&a.id, "travel-0001").await.unwrap();
        assert!(a_page.is_some());
        let c_page = storage.find_spider_page(&c.id, "general-0001").await.unwrap();
        assert_eq!(c_page.expect("default theme page").theme, "general");
    }

    #[tokio::test]
    async fn bulk_run_survives_storage_failure_mid_domain() {
        let path = std::env::temp_dir().join(format!("sp_pipeline_{}.db", Uuid::now_v7()));
        let storage = Storage::open(&path).await.expect("open test db");
        seed_source(&storage).await;
        let a = add_alias(&storage, "a-pool.example.com", DomainType::SpiderPool).await;
        let b = add_alias(&storage, "b-pool.example.com", DomainType::SpiderPool).await;
        let c = add_alias(&storage, "c-pool.example.com", DomainType::SpiderPool).await;

        // Reject b's fourth page at the database level.
        let db = libsql::Builder::new_local(&path).build().await.unwrap();
        let conn = db.connect().unwrap();
        conn.execute(
            &format!(
                "CREATE TRIGGER reject_page BEFORE INSERT ON spider_pool_pages
                 WHEN NEW.domain_alias_id = '{}' AND NEW.slug = 'general-0004'
                 BEGIN SELECT RAISE(ABORT, 'disk quota exceeded'); END",
                b.id
            ),
            (),
        )
        .await
        .unwrap();

        let summary = generate_all_spider_pools(&storage, &config_with(10, &[]), &SilentProgress)
            .await
            .expect("bulk run");

        assert_eq!(summary.domains_attempted, 3);
        assert_eq!(summary.domains_succeeded, 2);
        assert_eq!(summary.domains_failed, 1);

        let failed = summary
            .outcomes
            .iter()
            .find(|o| !o.succeeded())
            .expect("one failed domain");
        assert_eq!(failed.domain_alias_id, b.id);
        assert!(failed.error.as_deref().unwrap_or("").contains("disk quota exceeded"));
        assert_eq!(failed.pages_written, 3);

        assert_eq!(storage.count_spider_pages(&a.id).await.unwrap(), 10);
        assert_eq!(storage.count_spider_pages(&b.id).await.unwrap(), 3);
        assert_eq!(storage.count_spider_pages(&c.id).await.unwrap(), 10);

        let mut persisted = 0;
        for id in [&a.id, &b.id, &c.id] {
            persisted += storage.count_spider_pages(id).await.unwrap() as usize;
        }
        assert_eq!(summary.pages_generated, persisted);
        for outcome in &summary.outcomes {
            let stored = storage.count_spider_pages(&outcome.domain_alias_id).await.unwrap();
            assert_eq!(outcome.pages_written as u64, stored);
        }
    }

    #[tokio::test]
    async fn bulk_run_skips_ineligible_domains() {
        let storage = test_storage().await;
        seed_source(&storage).await;
        let main = add_alias(&storage, "www.example.com", DomainType::MainSite).await;
        let redirect = add_alias(&storage, "go.example.com", DomainType::RedirectPage).await;

        let website = storage.insert_website("site").await.unwrap();
        let mut inactive = DomainAlias::new(&website.id, "old-pool.example.com", DomainType::SpiderPool);
        inactive.is_active = false;
        storage.insert_domain_alias(&inactive).await.unwrap();

        let pool = add_alias(&storage, "pool.example.com", DomainType::SpiderPool).await;

        let summary = generate_all_spider_pools(&storage, &config_with(4, &[]), &SilentProgress)
            .await
            .unwrap();
        assert_eq!(summary.domains_attempted, 1);
        assert_eq!(summary.outcomes[0].domain, "pool.example.com");

        assert_eq!(storage.count_spider_pages(&pool.id).await.unwrap(), 4);
        for id in [&main.id, &redirect.id, &inactive.id] {
            assert_eq!(storage.count_spider_pages(id).await.unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn bulk_run_without_sources_is_fatal() {
        let storage = test_storage().await;
        let alias = add_alias(&storage, "pool.example.com", DomainType::SpiderPool).await;

        let err = generate_all_spider_pools(&storage, &config_with(5, &[]), &SilentProgress)
            .await
            .unwrap_err();
        assert!(err.is_precondition());
        assert_eq!(storage.count_spider_pages(&alias.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn bulk_run_with_zero_page_count_is_config_error() {
        let storage = test_storage().await;
        seed_source(&storage).await;
        let err = generate_all_spider_pools(&storage, &config_with(0, &[]), &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, SpiderPoolError::Config { .. }));
    }
}
