//! Page synthesis: turns a pool of content-source fragments into distinct
//! per-page bodies, titles, slugs, and keyword sets.
//!
//! Every choice is driven by a SHA-256 digest of
//! `(domain alias, theme, page index, attempt, purpose)`, so a run is fully
//! reproducible: regenerating with the same inputs yields the same specs.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use spiderpool_shared::{
    ContentSource, DomainAlias, PageSpec, PageStatus, Result, SpiderPoolError, SynthesisConfig,
    dedup_terms,
};

/// Re-rolls tried before falling back to a variation line.
const MAX_ATTEMPTS: u32 = 8;

static NON_SLUG_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{Alphabetic}\p{N}]+").expect("valid slug pattern"));

// ---------------------------------------------------------------------------
// Slugs
// ---------------------------------------------------------------------------

/// Normalize a theme into a slug prefix (`"Home & Garden"` → `home-garden`).
///
/// Letters and digits of any script are kept; every other run of characters
/// collapses to one `-`. Themes that differ only in case or punctuation
/// (`"Home & Garden"`, `"home garden"`) share a prefix and therefore the same
/// page slugs on a domain.
pub fn theme_slug(theme: &str) -> Result<String> {
    let lowered = theme.trim().to_lowercase();
    let slug = NON_SLUG_CHARS
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string();
    if slug.is_empty() {
        return Err(SpiderPoolError::validation(format!(
            "theme '{theme}' has no slug-safe characters"
        )));
    }
    Ok(slug)
}

/// Slug for the page at 1-based `index`, e.g. `seo-0007`.
pub fn page_slug(theme_slug: &str, index: u32) -> String {
    format!("{theme_slug}-{index:04}")
}

/// `"home-garden"` → `"Home Garden"`.
fn theme_label(theme_slug: &str) -> String {
    theme_slug
        .split('-')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Fragment pool
// ---------------------------------------------------------------------------

/// Merged material from all active content sources.
#[derive(Debug, Clone)]
pub struct FragmentPool {
    paragraphs: Vec<String>,
    headings: Vec<String>,
    keywords: Vec<String>,
}

impl FragmentPool {
    /// Merge the sources in the given order, dropping blanks and duplicates.
    ///
    /// Fails with a precondition error when there is nothing to build a page
    /// body from.
    pub fn from_sources(sources: &[ContentSource]) -> Result<Self> {
        if sources.is_empty() {
            return Err(SpiderPoolError::precondition("no active content sources"));
        }

        let paragraphs: Vec<String> = sources.iter().flat_map(|s| s.paragraphs.clone()).collect();
        let headings: Vec<String> = sources.iter().flat_map(|s| s.headings.clone()).collect();
        let keywords: Vec<String> = sources.iter().flat_map(|s| s.keywords.clone()).collect();

        let pool = Self {
            paragraphs: dedup_terms(&paragraphs),
            headings: dedup_terms(&headings),
            keywords: dedup_terms(&keywords),
        };

        if pool.paragraphs.is_empty() || pool.headings.is_empty() {
            return Err(SpiderPoolError::precondition(
                "active content sources provide no paragraphs or no headings",
            ));
        }
        Ok(pool)
    }

    pub fn paragraph_count(&self) -> usize {
        self.paragraphs.len()
    }

    pub fn heading_count(&self) -> usize {
        self.headings.len()
    }

    pub fn keyword_count(&self) -> usize {
        self.keywords.len()
    }
}

// ---------------------------------------------------------------------------
// Deterministic choice stream
// ---------------------------------------------------------------------------

/// Digest-backed source of index-keyed choices for one page attempt.
struct Chooser<'a> {
    alias_id: &'a str,
    theme: &'a str,
    index: u32,
    attempt: u32,
}

impl Chooser<'_> {
    fn roll(&self, purpose: &str, n: usize) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(self.alias_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.theme.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.index.to_le_bytes());
        hasher.update(self.attempt.to_le_bytes());
        hasher.update(purpose.as_bytes());
        hasher.update((n as u64).to_le_bytes());
        let digest = hasher.finalize();
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(buf)
    }

    /// Value in `0..len`; `len` must be non-zero.
    fn below(&self, purpose: &str, n: usize, len: usize) -> usize {
        (self.roll(purpose, n) % len as u64) as usize
    }

    /// Value in `lo..=hi`.
    fn between(&self, purpose: &str, lo: usize, hi: usize) -> usize {
        lo + self.below(purpose, 0, hi - lo + 1)
    }

    /// `count` distinct indices into a collection of `len`, via a partial
    /// Fisher-Yates shuffle.
    fn sample(&self, purpose: &str, len: usize, count: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..len).collect();
        let count = count.min(len);
        for j in 0..count {
            let pick = j + self.below(purpose, j, len - j);
            order.swap(j, pick);
        }
        order.truncate(count);
        order
    }
}

// ---------------------------------------------------------------------------
// Synthesizer
// ---------------------------------------------------------------------------

/// Builds page specs for one domain alias from a [`FragmentPool`].
#[derive(Debug, Clone)]
pub struct Synthesizer {
    pool: FragmentPool,
    bounds: SynthesisConfig,
}

impl Synthesizer {
    /// Build from the active content sources.
    pub fn new(sources: &[ContentSource], bounds: SynthesisConfig) -> Result<Self> {
        bounds.validate()?;
        Ok(Self {
            pool: FragmentPool::from_sources(sources)?,
            bounds,
        })
    }

    pub fn pool(&self) -> &FragmentPool {
        &self.pool
    }

    /// Synthesize `page_count` pages for `alias` under `theme`.
    ///
    /// Slugs are `{theme-slug}-0001` onward; no two returned pages share a
    /// slug or a body.
    pub fn synthesize(
        &self,
        alias: &DomainAlias,
        theme: &str,
        page_count: u32,
    ) -> Result<Vec<PageSpec>> {
        if page_count == 0 {
            return Err(SpiderPoolError::validation(
                "page count must be greater than zero",
            ));
        }
        let slug_prefix = theme_slug(theme)?;
        let keyword_pool = self.keyword_pool(alias, &slug_prefix);

        let mut seen_bodies: HashSet<[u8; 32]> = HashSet::with_capacity(page_count as usize);
        let mut specs = Vec::with_capacity(page_count as usize);

        for index in 1..=page_count {
            let mut page = None;
            for attempt in 0..MAX_ATTEMPTS {
                let chooser = Chooser {
                    alias_id: &alias.id,
                    theme: &slug_prefix,
                    index,
                    attempt,
                };
                let draft = self.compose(&chooser, &keyword_pool, &slug_prefix);
                if seen_bodies.insert(body_digest(&draft.content)) {
                    page = Some(draft);
                    break;
                }
            }

            let draft = match page {
                Some(draft) => draft,
                None => {
                    let chooser = Chooser {
                        alias_id: &alias.id,
                        theme: &slug_prefix,
                        index,
                        attempt: 0,
                    };
                    let mut draft = self.compose(&chooser, &keyword_pool, &slug_prefix);
                    draft.content.push_str(&format!(
                        "\n\n_{} edition {index}_\n",
                        theme_label(&slug_prefix)
                    ));
                    if !seen_bodies.insert(body_digest(&draft.content)) {
                        return Err(SpiderPoolError::precondition(format!(
                            "content pool too small to vary page {index}"
                        )));
                    }
                    draft
                }
            };

            specs.push(PageSpec {
                domain_alias_id: alias.id.clone(),
                slug: page_slug(&slug_prefix, index),
                title: draft.title,
                content: draft.content,
                keywords: draft.keywords,
                theme: theme.trim().to_string(),
                status: PageStatus::Active,
                published: true,
            });
        }

        Ok(specs)
    }

    /// Source keywords, else the alias tags, else the theme itself.
    fn keyword_pool(&self, alias: &DomainAlias, slug_prefix: &str) -> Vec<String> {
        if !self.pool.keywords.is_empty() {
            return self.pool.keywords.clone();
        }
        let tags: Vec<String> = alias
            .primary_tags
            .iter()
            .chain(alias.secondary_tags.iter())
            .cloned()
            .collect();
        let tags = dedup_terms(&tags);
        if !tags.is_empty() {
            return tags;
        }
        vec![theme_label(slug_prefix).to_lowercase()]
    }

    fn compose(&self, chooser: &Chooser<'_>, keyword_pool: &[String], slug_prefix: &str) -> Draft {
        let pool = &self.pool;

        let keyword_count = chooser
            .between(
                "keyword-count",
                self.bounds.min_keywords,
                self.bounds.max_keywords,
            )
            .min(keyword_pool.len());
        let keywords: Vec<String> = chooser
            .sample("keywords", keyword_pool.len(), keyword_count)
            .into_iter()
            .map(|i| keyword_pool[i].clone())
            .collect();

        let sections = chooser.between(
            "sections",
            self.bounds.min_sections,
            self.bounds.max_sections,
        );
        let heading_start = chooser.below("heading-start", 0, pool.headings.len());
        let paragraph_start = chooser.below("paragraph-start", 0, pool.paragraphs.len());
        let paragraph_step = 1 + chooser.below("paragraph-step", 0, pool.paragraphs.len().max(2) - 1);

        let lead_heading = &pool.headings[heading_start];
        let lead_keyword = keywords.first().map(String::as_str).unwrap_or(slug_prefix);
        let title = format!(
            "{lead_heading}: {lead_keyword} | {}",
            theme_label(slug_prefix)
        );

        let mut content = format!("# {title}\n");
        let mut cursor = paragraph_start;
        for section in 0..sections {
            let heading = &pool.headings[(heading_start + section) % pool.headings.len()];
            content.push_str(&format!("\n## {heading}\n"));

            let depth = 1 + chooser.below("section-depth", section, 2);
            for _ in 0..depth {
                content.push_str(&format!("\n{}\n", pool.paragraphs[cursor]));
                cursor = (cursor + paragraph_step) % pool.paragraphs.len();
            }
        }
        content.push_str(&format!("\nTopics: {}\n", keywords.join(", ")));

        Draft {
            title,
            content,
            keywords,
        }
    }
}

struct Draft {
    title: String,
    content: String,
    keywords: Vec<String>,
}

fn body_digest(content: &str) -> [u8; 32] {
    Sha256::digest(content.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use spiderpool_shared::DomainType;

    fn source(paragraphs: usize, headings: usize, keywords: usize) -> ContentSource {
        ContentSource {
            id: "src-1".into(),
            name: "fixture".into(),
            file_origin: None,
            is_active: true,
            paragraphs: (1..=paragraphs).map(|i| format!("Paragraph number {i}.")).collect(),
            headings: (1..=headings).map(|i| format!("Heading {i}")).collect(),
            keywords: (1..=keywords).map(|i| format!("keyword-{i}")).collect(),
            total_paragraphs: paragraphs,
            total_headings: headings,
            total_keywords: keywords,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn alias() -> DomainAlias {
        DomainAlias::new("site-1", "pool.example.com", DomainType::SpiderPool)
    }

    #[test]
    fn theme_slug_normalizes() {
        assert_eq!(theme_slug("seo").unwrap(), "seo");
        assert_eq!(theme_slug("  Home & Garden ").unwrap(), "home-garden");
        assert_eq!(theme_slug("Finance_2024").unwrap(), "finance-2024");
        assert_eq!(theme_slug("科技").unwrap(), "科技");
        assert_eq!(theme_slug("Café Culture").unwrap(), "café-culture");
        assert_eq!(theme_slug("home garden").unwrap(), theme_slug("Home & Garden").unwrap());
        assert!(theme_slug("!!!").is_err());
        assert!(theme_slug("").is_err());
    }

    #[test]
    fn page_slug_is_zero_padded() {
        assert_eq!(page_slug("seo", 1), "seo-0001");
        assert_eq!(page_slug("seo", 150), "seo-0150");
        assert_eq!(page_slug("seo", 12345), "seo-12345");
    }

    #[test]
    fn theme_label_title_cases_words() {
        assert_eq!(theme_label("home-garden"), "Home Garden");
        assert_eq!(theme_label("seo"), "Seo");
    }

    #[test]
    fn no_sources_is_precondition_failure() {
        let err = Synthesizer::new(&[], SynthesisConfig::default()).unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn sources_without_paragraphs_are_precondition_failure() {
        let err = Synthesizer::new(&[source(0, 3, 3)], SynthesisConfig::default()).unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn pool_merges_and_dedups_sources() {
        let mut second = source(4, 2, 60);
        second.name = "second".into();
        let synth =
            Synthesizer::new(&[source(20, 10, 50), second], SynthesisConfig::default()).unwrap();
        assert_eq!(synth.pool().paragraph_count(), 20);
        assert_eq!(synth.pool().heading_count(), 10);
        assert_eq!(synth.pool().keyword_count(), 60);
    }

    #[test]
    fn zero_pages_rejected() {
        let synth = Synthesizer::new(&[source(5, 5, 5)], SynthesisConfig::default()).unwrap();
        let err = synth.synthesize(&alias(), "seo", 0).unwrap_err();
        assert!(matches!(err, SpiderPoolError::Validation { .. }));
    }

    #[test]
    fn slugs_are_sequential_and_unique() {
        let synth = Synthesizer::new(&[source(20, 10, 50)], SynthesisConfig::default()).unwrap();
        let specs = synth.synthesize(&alias(), "seo", 5).unwrap();
        let slugs: Vec<&str> = specs.iter().map(|s| s.slug.as_str()).collect();
        assert_eq!(
            slugs,
            vec!["seo-0001", "seo-0002", "seo-0003", "seo-0004", "seo-0005"]
        );
    }

    #[test]
    fn synthesis_is_deterministic() {
        let synth = Synthesizer::new(&[source(20, 10, 50)], SynthesisConfig::default()).unwrap();
        let alias = alias();
        let first = synth.synthesize(&alias, "seo", 25).unwrap();
        let second = synth.synthesize(&alias, "seo", 25).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn bodies_are_distinct_for_a_large_run() {
        let synth = Synthesizer::new(&[source(20, 10, 50)], SynthesisConfig::default()).unwrap();
        let specs = synth.synthesize(&alias(), "seo", 300).unwrap();
        let bodies: HashSet<&str> = specs.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(bodies.len(), 300);
    }

    #[test]
    fn bodies_are_distinct_even_from_a_single_fragment() {
        let synth = Synthesizer::new(&[source(1, 1, 1)], SynthesisConfig::default()).unwrap();
        let specs = synth.synthesize(&alias(), "seo", 20).unwrap();
        let bodies: HashSet<&str> = specs.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(bodies.len(), 20);
    }

    #[test]
    fn keyword_sets_stay_within_bounds() {
        let pool = source(20, 10, 50);
        let synth = Synthesizer::new(&[pool.clone()], SynthesisConfig::default()).unwrap();
        for spec in synth.synthesize(&alias(), "seo", 100).unwrap() {
            assert!((5..=15).contains(&spec.keywords.len()), "{}", spec.keywords.len());
            let unique: HashSet<&String> = spec.keywords.iter().collect();
            assert_eq!(unique.len(), spec.keywords.len());
            assert!(spec.keywords.iter().all(|k| pool.keywords.contains(k)));
        }
    }

    #[test]
    fn keyword_sets_clamp_to_small_pool() {
        let synth = Synthesizer::new(&[source(5, 5, 3)], SynthesisConfig::default()).unwrap();
        for spec in synth.synthesize(&alias(), "seo", 10).unwrap() {
            assert_eq!(spec.keywords.len(), 3);
        }
    }

    #[test]
    fn keywords_fall_back_to_alias_tags_then_theme() {
        let synth = Synthesizer::new(&[source(5, 5, 0)], SynthesisConfig::default()).unwrap();

        let mut tagged = alias();
        tagged.primary_tags = vec!["beach".into(), "hotel".into()];
        tagged.secondary_tags = vec!["hotel".into(), "flight".into()];
        let specs = synth.synthesize(&tagged, "travel", 3).unwrap();
        for spec in &specs {
            assert_eq!(spec.keywords.len(), 3);
            assert!(spec.keywords.iter().all(|k| ["beach", "hotel", "flight"].contains(&k.as_str())));
        }

        let specs = synth.synthesize(&alias(), "Home Garden", 2).unwrap();
        assert_eq!(specs[0].keywords, vec!["home garden".to_string()]);
        assert_eq!(specs[0].slug, "home-garden-0001");
        assert_eq!(specs[0].theme, "Home Garden");
    }

    #[test]
    fn theme_flavors_title_and_slug() {
        let synth = Synthesizer::new(&[source(8, 4, 20)], SynthesisConfig::default()).unwrap();
        let spec = &synth.synthesize(&alias(), "travel", 1).unwrap()[0];
        assert!(spec.title.ends_with("| Travel"));
        assert!(spec.content.starts_with("# "));
        assert!(spec.content.contains("Topics: "));
        assert_eq!(spec.status, PageStatus::Active);
        assert!(spec.published);
    }

    #[test]
    fn different_domains_get_different_bodies() {
        let synth = Synthesizer::new(&[source(20, 10, 50)], SynthesisConfig::default()).unwrap();
        let a = synth.synthesize(&alias(), "seo", 10).unwrap();
        let b = synth.synthesize(&alias(), "seo", 10).unwrap();
        // Fresh aliases carry fresh ids, so the choice streams differ.
        assert_ne!(
            a.iter().map(|s| &s.content).collect::<Vec<_>>(),
            b.iter().map(|s| &s.content).collect::<Vec<_>>()
        );
    }
}
