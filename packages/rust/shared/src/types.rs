//! Core domain types: websites, domain aliases, content sources, and
//! spider-pool pages.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SpiderPoolError;

// ---------------------------------------------------------------------------
// DomainType
// ---------------------------------------------------------------------------

/// Role a domain alias plays for its parent website.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainType {
    MainSite,
    RedirectPage,
    SpiderPool,
}

impl DomainType {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MainSite => "main_site",
            Self::RedirectPage => "redirect_page",
            Self::SpiderPool => "spider_pool",
        }
    }
}

impl std::fmt::Display for DomainType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DomainType {
    type Err = SpiderPoolError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "main_site" => Ok(Self::MainSite),
            "redirect_page" => Ok(Self::RedirectPage),
            "spider_pool" => Ok(Self::SpiderPool),
            other => Err(SpiderPoolError::validation(format!(
                "unknown domain type '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// PageStatus
// ---------------------------------------------------------------------------

/// Serving status of a spider-pool page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    #[default]
    Active,
    Inactive,
}

impl PageStatus {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl std::str::FromStr for PageStatus {
    type Err = SpiderPoolError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(SpiderPoolError::validation(format!(
                "unknown page status '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Website / DomainAlias
// ---------------------------------------------------------------------------

/// A logical property owning one or more domain aliases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Website {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A domain name bound to a website.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainAlias {
    /// Unique alias identifier (UUID v7).
    pub id: String,
    /// Owning website.
    pub website_id: String,
    /// Bare host name, e.g. `pool-a.example.com`.
    pub domain: String,
    pub domain_type: DomainType,
    pub is_active: bool,
    /// Primary keyword tags for this domain.
    #[serde(default)]
    pub primary_tags: Vec<String>,
    /// Secondary keyword tags for this domain.
    #[serde(default)]
    pub secondary_tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl DomainAlias {
    /// New active alias with a fresh UUID v7 and no tags.
    pub fn new(
        website_id: impl Into<String>,
        domain: impl Into<String>,
        domain_type: DomainType,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            website_id: website_id.into(),
            domain: domain.into().trim().to_ascii_lowercase(),
            domain_type,
            is_active: true,
            primary_tags: Vec::new(),
            secondary_tags: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Whether this alias is an eligible spider-pool generation target.
    pub fn is_spider_pool_target(&self) -> bool {
        self.is_active && self.domain_type == DomainType::SpiderPool
    }
}

// ---------------------------------------------------------------------------
// Content sources
// ---------------------------------------------------------------------------

/// Writable definition of a content source.
///
/// Carries only the collections; totals are derived by the storage layer at
/// write time and cannot be supplied here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentSourceDef {
    /// Unique display name; seeding is keyed on it.
    pub name: String,
    /// File the definition was loaded from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_origin: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub paragraphs: Vec<String>,
    #[serde(default)]
    pub headings: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl ContentSourceDef {
    /// Keywords with blanks dropped and duplicates removed, first occurrence wins.
    pub fn keyword_set(&self) -> Vec<String> {
        dedup_terms(&self.keywords)
    }
}

/// Trim, drop empties, and de-duplicate while keeping first-seen order.
pub fn dedup_terms(terms: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_string()))
        .map(String::from)
        .collect()
}

/// A stored content source, including its cached totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSource {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_origin: Option<String>,
    pub is_active: bool,
    pub paragraphs: Vec<String>,
    pub headings: Vec<String>,
    pub keywords: Vec<String>,
    pub total_paragraphs: usize,
    pub total_headings: usize,
    pub total_keywords: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentSource {
    /// Whether the cached totals agree with the stored collections.
    pub fn counts_consistent(&self) -> bool {
        self.total_paragraphs == self.paragraphs.len()
            && self.total_headings == self.headings.len()
            && self.total_keywords == self.keywords.len()
    }
}

// ---------------------------------------------------------------------------
// Spider-pool pages
// ---------------------------------------------------------------------------

/// A synthesized page ready to be upserted. Counters are not carried here;
/// they belong to the stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSpec {
    pub domain_alias_id: String,
    /// Unique per domain alias.
    pub slug: String,
    pub title: String,
    pub content: String,
    pub keywords: Vec<String>,
    pub theme: String,
    pub status: PageStatus,
    pub published: bool,
}

/// A persisted spider-pool page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpiderPoolPage {
    pub id: String,
    pub domain_alias_id: String,
    pub slug: String,
    pub title: String,
    pub content: String,
    pub keywords: Vec<String>,
    pub theme: String,
    pub status: PageStatus,
    pub published: bool,
    /// Render count, bumped by the page-serving collaborator.
    pub views: u64,
    /// Crawler visit count, bumped by the page-serving collaborator.
    pub crawler_visits: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_crawled: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate counters across all pages of one domain alias.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainPageStats {
    pub page_count: u64,
    pub total_views: u64,
    pub total_crawler_visits: u64,
    pub last_crawled: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_type_parses_both_spellings() {
        assert_eq!("spider_pool".parse::<DomainType>().unwrap(), DomainType::SpiderPool);
        assert_eq!("main-site".parse::<DomainType>().unwrap(), DomainType::MainSite);
        assert!("mirror".parse::<DomainType>().is_err());
    }

    #[test]
    fn domain_type_serializes_snake_case() {
        let json = serde_json::to_string(&DomainType::RedirectPage).expect("serialize");
        assert_eq!(json, "\"redirect_page\"");
    }

    #[test]
    fn keyword_set_drops_blanks_and_duplicates() {
        let def = ContentSourceDef {
            name: "seo".into(),
            keywords: vec![
                "rust".into(),
                " rust ".into(),
                "".into(),
                "tokio".into(),
                "rust".into(),
            ],
            ..Default::default()
        };
        assert_eq!(def.keyword_set(), vec!["rust".to_string(), "tokio".to_string()]);
    }

    #[test]
    fn content_source_def_defaults_to_active() {
        let def: ContentSourceDef =
            toml::from_str("name = \"x\"\nparagraphs = [\"p\"]").expect("parse");
        assert!(def.is_active);
        assert!(def.headings.is_empty());
    }

    #[test]
    fn spider_pool_target_requires_active_and_type() {
        let mut alias = DomainAlias::new("w", " Pool.Example.com ", DomainType::SpiderPool);
        assert_eq!(alias.domain, "pool.example.com");
        assert!(alias.is_spider_pool_target());
        alias.is_active = false;
        assert!(!alias.is_spider_pool_target());
        alias.is_active = true;
        alias.domain_type = DomainType::MainSite;
        assert!(!alias.is_spider_pool_target());
    }
}
