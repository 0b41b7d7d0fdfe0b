//! Content-source seeding.
//!
//! Builtin sources are compiled in and upserted by name, so re-running the
//! seed refreshes them in place. Extra sources can be loaded from TOML files.

use std::path::Path;

use tracing::{info, instrument};

use spiderpool_shared::{ContentSource, ContentSourceDef, Result, SpiderPoolError};
use spiderpool_storage::Storage;

fn lines(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Compiled-in content sources.
pub fn builtin_sources() -> Vec<ContentSourceDef> {
    vec![
        ContentSourceDef {
            name: "web-fundamentals".into(),
            file_origin: None,
            is_active: true,
            paragraphs: lines(&[
                "A fast page starts with a small critical path. Inline only the styles the first screen needs and defer everything else until after the first paint.",
                "Descriptive link text helps both readers and crawlers understand where a link leads before following it.",
                "Every page should answer one clear question. When a page tries to cover everything, it usually ranks for nothing.",
                "Structured headings give a document an outline. Screen readers, search engines, and skimming readers all rely on that outline.",
                "Images need meaningful alternative text. A short sentence describing the subject is more useful than a list of keywords.",
                "Canonical URLs tell search engines which of several similar addresses is the preferred one to index.",
                "A sitemap lists the pages a site wants discovered, along with hints about how often each one changes.",
                "Server response time sets a floor for every other performance metric. Caching at the edge often removes most of it.",
                "Internal links spread authority between pages and help crawlers find content that is several clicks away from the home page.",
                "Mobile layouts are no longer a secondary concern. Most first visits now happen on a phone over an unreliable network.",
                "Meta descriptions do not change rankings directly, but a clear summary improves the chance that a searcher clicks through.",
                "Broken links waste crawl budget and frustrate visitors. A periodic link audit keeps both problems small.",
                "Readable URLs with a few words separated by hyphens are easier to share and easier to remember.",
                "Fresh content signals an active site, but updating a date without changing the substance rarely helps.",
                "Accessible color contrast makes text readable in bright sunlight as well as for readers with low vision.",
                "Long pages benefit from a short summary at the top so readers can decide quickly whether to keep going.",
                "Redirect chains slow down both users and crawlers. Point old addresses straight at their final destination.",
                "Consistent navigation lets visitors build a mental map of the site after only a couple of pages.",
                "Compressing text responses is one of the cheapest performance wins available on almost any server.",
                "Clear authorship and contact details make a site more trustworthy to readers and to reviewers alike.",
            ]),
            headings: lines(&[
                "Getting the Basics Right",
                "Why Page Speed Matters",
                "Writing for Humans First",
                "Structuring Your Content",
                "Links That Help",
                "Making Pages Discoverable",
                "Mobile Considerations",
                "Keeping Things Fresh",
                "Accessibility Checklist",
                "Common Mistakes to Avoid",
            ]),
            keywords: lines(&[
                "page speed", "core web vitals", "internal linking", "sitemap", "canonical url",
                "meta description", "alt text", "heading structure", "mobile first", "crawl budget",
                "redirects", "broken links", "url structure", "content freshness", "accessibility",
                "color contrast", "compression", "caching", "edge cdn", "navigation",
                "site architecture", "user intent", "readability", "summaries", "authorship",
                "trust signals", "structured data", "schema markup", "open graph", "robots txt",
                "indexing", "search console", "analytics", "bounce rate", "dwell time",
                "long tail keywords", "anchor text", "image optimization", "lazy loading", "render blocking",
                "critical css", "font loading", "http caching", "server response", "time to first byte",
                "duplicate content", "pagination", "breadcrumbs", "hreflang", "localization",
            ]),
        },
        ContentSourceDef {
            name: "travel-notes".into(),
            file_origin: None,
            is_active: true,
            paragraphs: lines(&[
                "Booking the first night in advance removes most of the stress from arriving somewhere new after dark.",
                "Local markets are the quickest way to learn what a region actually eats, and they are usually cheaper than restaurants.",
                "Travelling in the shoulder season means thinner crowds, lower prices, and weather that is often just as pleasant.",
                "A small day bag with water, a charger, and a printed copy of your address solves most problems before they start.",
                "Trains connect city centres directly, which often makes them faster than a short flight once airport time is counted.",
                "Learning a handful of polite phrases in the local language goes a long way toward friendly conversations.",
                "Walking tours are a cheap introduction to a city and a good way to get recommendations from someone who lives there.",
                "Keeping digital copies of documents in two separate places makes a lost passport an inconvenience rather than a crisis.",
                "Slow travel, staying longer in fewer places, tends to cost less and leave more lasting memories.",
                "Checking opening days for museums and sights avoids arriving at a locked door on the one free afternoon.",
            ]),
            headings: lines(&[
                "Before You Go",
                "Getting Around",
                "Where to Stay",
                "Eating Like a Local",
                "Travelling on a Budget",
                "Staying Safe",
            ]),
            keywords: lines(&[
                "travel tips", "shoulder season", "budget travel", "train travel", "local food",
                "walking tours", "packing list", "travel documents", "slow travel", "city guide",
                "accommodation", "day trips", "public transport", "travel insurance", "itinerary",
            ]),
        },
    ]
}

/// Upsert every builtin content source.
///
/// Safe to run repeatedly: each source is keyed by name and refreshed in
/// place, with totals recomputed from its collections.
#[instrument(skip_all)]
pub async fn initialize_content_sources(storage: &Storage) -> Result<Vec<ContentSource>> {
    let mut stored = Vec::new();
    for def in builtin_sources() {
        let source = storage.upsert_content_source(&def).await?;
        info!(
            name = %source.name,
            paragraphs = source.total_paragraphs,
            headings = source.total_headings,
            keywords = source.total_keywords,
            "content source seeded"
        );
        stored.push(source);
    }
    Ok(stored)
}

/// Read a content-source definition from a TOML file.
///
/// The file path is recorded as the source's origin.
pub fn load_source_file(path: &Path) -> Result<ContentSourceDef> {
    let raw = std::fs::read_to_string(path).map_err(|e| SpiderPoolError::io(path, e))?;
    let mut def: ContentSourceDef = toml::from_str(&raw)
        .map_err(|e| SpiderPoolError::parse(format!("{}: {e}", path.display())))?;

    if def.name.trim().is_empty() {
        return Err(SpiderPoolError::validation(format!(
            "{}: content source name is empty",
            path.display()
        )));
    }
    def.file_origin = Some(path.display().to_string());
    Ok(def)
}
