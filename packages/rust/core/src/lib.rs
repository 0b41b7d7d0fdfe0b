//! Spider-pool generation: content-source seeding, page synthesis, and the
//! per-domain and bulk orchestration entry points.

pub mod pipeline;
pub mod sources;
pub mod synthesis;

pub use pipeline::{
    DomainGenerationResult, DomainOutcome, GenerationSummary, PageTally, ProgressReporter,
    SilentProgress, generate_all_spider_pools, generate_spider_pool_pages,
};
pub use sources::{builtin_sources, initialize_content_sources, load_source_file};
pub use synthesis::{FragmentPool, Synthesizer, page_slug, theme_slug};
