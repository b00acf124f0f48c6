//! TTL Policy - Key-Pattern Heuristics
//!
//! Keys are colon-delimited namespaced identifiers (`article:42`,
//! `articles:list:page:3`). The access pattern of a key is inferred from its
//! shape, and each category maps to a static `(l1_ttl, l2_ttl)` band.
//!
//! Everything in this module is a pure function of the key string and the
//! policy table.

use std::time::Duration;

/// Access-pattern category of a cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCategory {
    /// Paginated or filtered collections, invalidated on every write to the collection
    HighChurnListing,
    /// Categories, tags, menus, translations; rarely change
    SemiStaticTaxonomy,
    /// A single entity addressed by id (`article:42`)
    StableEntity,
    /// Counters, statistics, trending lists
    VolatileAggregate,
    /// Anything that does not match a known shape
    Unclassified,
}

const AGGREGATE_MARKERS: &[&str] = &[
    "count", "stats", "trending", "popular", "aggregate", "dashboard", "recent", "views",
];
const LISTING_MARKERS: &[&str] = &["list", "lists", "page", "search", "feed", "index"];
const TAXONOMY_MARKERS: &[&str] = &[
    "category", "categories", "tag", "tags", "taxonomy", "menu", "menus", "translation",
    "translations", "language", "languages", "locale", "locales", "settings",
];

/// Classify a key by its colon-delimited segments.
///
/// Aggregates win over listings (a paginated "trending" list is still
/// volatile), listings win over taxonomy, and a two-segment `name:id` key is
/// a stable entity.
#[must_use]
pub fn classify_key(key: &str) -> KeyCategory {
    let segments: Vec<String> = key.split(':').map(str::to_ascii_lowercase).collect();
    let has_marker = |markers: &[&str]| {
        segments
            .iter()
            .any(|segment| markers.contains(&segment.as_str()))
    };

    if has_marker(AGGREGATE_MARKERS) {
        KeyCategory::VolatileAggregate
    } else if has_marker(LISTING_MARKERS) {
        KeyCategory::HighChurnListing
    } else if has_marker(TAXONOMY_MARKERS) {
        KeyCategory::SemiStaticTaxonomy
    } else if is_entity_key(&segments) {
        KeyCategory::StableEntity
    } else {
        KeyCategory::Unclassified
    }
}

/// `<name>:<id>` or `<name>:<id>:<lang>` where `id` is numeric or a slug.
fn is_entity_key(segments: &[String]) -> bool {
    match segments {
        [name, id] | [name, id, _] => {
            !name.is_empty()
                && !id.is_empty()
                && id
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        }
        _ => false,
    }
}

/// How much of the keyspace an invalidation pattern covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternScope {
    /// Covers an entire entity collection or more; L1 is cleared
    Broad,
    /// Scoped below a single entity; L1 is left to expire on its own
    Narrow,
}

/// Classify a glob pattern for L1 invalidation.
///
/// Broad when the literal prefix (up to the first `*`, `?` or `[`) has at most
/// two segments and none of them is a numeric id: `*`, `article:*`,
/// `articles:list:*`. Anything more specific is narrow.
#[must_use]
pub fn classify_pattern(pattern: &str) -> PatternScope {
    let literal_end = pattern.find(['*', '?', '[']).unwrap_or(pattern.len());
    let prefix = pattern.get(..literal_end).unwrap_or(pattern);

    let segments: Vec<&str> = prefix
        .split(':')
        .filter(|segment| !segment.is_empty())
        .collect();

    let scoped_to_id = segments
        .iter()
        .any(|segment| segment.chars().all(|c| c.is_ascii_digit()));

    if segments.len() <= 2 && !scoped_to_id {
        PatternScope::Broad
    } else {
        PatternScope::Narrow
    }
}

/// TTL band for one tier pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlBand {
    pub l1: Duration,
    pub l2: Duration,
}

impl TtlBand {
    #[must_use]
    pub const fn new(l1: Duration, l2: Duration) -> Self {
        Self { l1, l2 }
    }
}

/// Static `KeyCategory -> TtlBand` table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub high_churn_listing: TtlBand,
    pub semi_static_taxonomy: TtlBand,
    pub stable_entity: TtlBand,
    pub volatile_aggregate: TtlBand,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            high_churn_listing: TtlBand::new(Duration::from_secs(60), Duration::from_secs(300)),
            semi_static_taxonomy: TtlBand::new(
                Duration::from_secs(600),
                Duration::from_secs(6 * 3600),
            ),
            stable_entity: TtlBand::new(Duration::from_secs(300), Duration::from_secs(3600)),
            volatile_aggregate: TtlBand::new(Duration::from_secs(15), Duration::from_secs(60)),
        }
    }
}

impl TtlPolicy {
    /// Band for a category; `None` for unclassified keys (tier defaults apply).
    #[must_use]
    pub fn band(&self, category: KeyCategory) -> Option<TtlBand> {
        match category {
            KeyCategory::HighChurnListing => Some(self.high_churn_listing),
            KeyCategory::SemiStaticTaxonomy => Some(self.semi_static_taxonomy),
            KeyCategory::StableEntity => Some(self.stable_entity),
            KeyCategory::VolatileAggregate => Some(self.volatile_aggregate),
            KeyCategory::Unclassified => None,
        }
    }

    /// Resolve per-tier TTLs: explicit override, else key category, else tier default.
    #[must_use]
    pub fn resolve(&self, key: &str, options: TtlOptions, defaults: TtlBand) -> TtlBand {
        let heuristic = self.band(classify_key(key)).unwrap_or(defaults);
        TtlBand {
            l1: options.l1.unwrap_or(heuristic.l1),
            l2: options.l2.unwrap_or(heuristic.l2),
        }
    }
}

/// Per-call TTL overrides for `set`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TtlOptions {
    pub l1: Option<Duration>,
    pub l2: Option<Duration>,
}

impl TtlOptions {
    /// Use the key heuristics for both tiers.
    #[must_use]
    pub fn heuristic() -> Self {
        Self::default()
    }

    /// Override both tiers explicitly.
    #[must_use]
    pub fn explicit(l1: Duration, l2: Duration) -> Self {
        Self {
            l1: Some(l1),
            l2: Some(l2),
        }
    }

    /// Same TTL for both tiers.
    #[must_use]
    pub fn uniform(ttl: Duration) -> Self {
        Self::explicit(ttl, ttl)
    }
}
