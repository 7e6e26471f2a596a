use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Globally unique item identifier (UUID v4).
pub type ItemId = Uuid;

/// Longest `why` note kept, in characters.
pub const MAX_WHY_CHARS: usize = 140;

/// Lifecycle band of a captured tab.
///
/// Variants are declared in rank order so the derived `Ord` matches
/// [`ItemState::rank`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Fresh,
    Fading,
    Critical,
    Archived,
    Dead,
}

impl ItemState {
    pub const ALL: [ItemState; 5] = [
        ItemState::Fresh,
        ItemState::Fading,
        ItemState::Critical,
        ItemState::Archived,
        ItemState::Dead,
    ];

    /// Position in the fresh → dead progression (0..=4).
    pub fn rank(self) -> u8 {
        match self {
            ItemState::Fresh => 0,
            ItemState::Fading => 1,
            ItemState::Critical => 2,
            ItemState::Archived => 3,
            ItemState::Dead => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemState::Fresh => "fresh",
            ItemState::Fading => "fading",
            ItemState::Critical => "critical",
            ItemState::Archived => "archived",
            ItemState::Dead => "dead",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fresh" => Some(ItemState::Fresh),
            "fading" => Some(ItemState::Fading),
            "critical" => Some(ItemState::Critical),
            "archived" => Some(ItemState::Archived),
            "dead" => Some(ItemState::Dead),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One captured tab-close record.
///
/// Serialized with camelCase keys; this is the shape the popup and the
/// `json_items` export see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub url: String,
    pub title: String,
    pub domain: String,
    pub why: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_touched_at: Option<DateTime<Utc>>,
    pub state: ItemState,
    pub touch_count: u32,
    pub is_starred: bool,
    pub last_chance_shown_at: Option<DateTime<Utc>>,
}

impl Item {
    /// A freshly captured item: `fresh`, untouched, unstarred.
    pub fn fresh(id: ItemId, snapshot: &CaptureSnapshot) -> Self {
        Self {
            id,
            url: snapshot.url.clone(),
            title: snapshot.title.clone(),
            domain: snapshot.domain.clone(),
            why: normalize_why(snapshot.why.as_deref()),
            created_at: snapshot.at,
            last_touched_at: None,
            state: ItemState::Fresh,
            touch_count: 0,
            is_starred: false,
            last_chance_shown_at: None,
        }
    }

    pub fn has_why(&self) -> bool {
        self.why.is_some()
    }

    pub fn meta(&self) -> ItemMeta {
        ItemMeta {
            id: self.id,
            created_at: self.created_at,
            state: self.state,
            is_starred: self.is_starred,
            last_chance_shown_at: self.last_chance_shown_at,
        }
    }
}

/// Lightweight row used by the eviction planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMeta {
    pub id: ItemId,
    pub created_at: DateTime<Utc>,
    pub state: ItemState,
    pub is_starred: bool,
    pub last_chance_shown_at: Option<DateTime<Utc>>,
}

/// What the ingestion layer knows about a tab at the moment it closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSnapshot {
    pub url: String,
    pub title: String,
    pub domain: String,
    pub at: DateTime<Utc>,
    pub why: Option<String>,
}

/// Trim a user note, drop it if empty, and cap it at [`MAX_WHY_CHARS`].
pub fn normalize_why(why: Option<&str>) -> Option<String> {
    let trimmed = why?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_WHY_CHARS).collect())
}

/// Lower-cased host of `url` without a leading `www.`, or `"unknown"`.
pub fn domain_from_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) if !host.is_empty() => {
                let host = host.to_lowercase();
                host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
            }
            _ => "unknown".to_string(),
        },
        Err(_) => "unknown".to_string(),
    }
}
