//! Domain records shared by the backfill engine and the HTTP clients.
//!
//! - `Fid`: candidate key in the external identity space
//! - `ScoreRecord`: computed score returned by the creator score API
//! - `AggregateEntry`: one leaderboard row, owned by the aggregate service

use serde::{Deserialize, Deserializer, Serialize};

/// Identity key of a candidate entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fid(pub u64);

impl Fid {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for Fid {
    fn from(value: u64) -> Self {
        Fid(value)
    }
}

impl std::fmt::Display for Fid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tier labels arrive as a string, `null`, or not at all.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn tier_or_na(tier: &str) -> &str {
    if tier.is_empty() {
        "N/A"
    } else {
        tier
    }
}

/// A present, non-empty profile string.
fn is_filled(value: &Option<String>) -> bool {
    value.as_deref().map(|s| !s.is_empty()).unwrap_or(false)
}

/// Score record computed by the scoring service for one key.
///
/// A missing `overall_score` marks an inactive or unscoreable entity. That is
/// a valid terminal answer, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    /// Key the record was computed for. Some responses omit it; callers
    /// backfill it from the request.
    #[serde(default)]
    pub fid: Option<Fid>,

    #[serde(default)]
    pub overall_score: Option<f64>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub tier: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default, rename = "pfpUrl")]
    pub avatar_url: Option<String>,
}

impl ScoreRecord {
    /// Whether the record carries a handle or a display name.
    pub fn has_enrichment(&self) -> bool {
        is_filled(&self.username) || is_filled(&self.display_name)
    }

    /// Whether the scoring service produced an actual score.
    pub fn is_scored(&self) -> bool {
        self.overall_score.is_some()
    }

    /// Tier for display, `N/A` when the service sent none.
    pub fn tier_label(&self) -> &str {
        tier_or_na(&self.tier)
    }

    /// One-line rendering used by status output: `@handle (Name) - 71.2 (B)`.
    pub fn label(&self) -> String {
        let score = self
            .overall_score
            .map(|s| format!("{:.1}", s))
            .unwrap_or_else(|| "N/A".to_string());
        let tier = self.tier_label();
        if self.has_enrichment() {
            format!(
                "@{} ({}) - {} ({})",
                self.username.as_deref().unwrap_or("N/A"),
                self.display_name.as_deref().unwrap_or("N/A"),
                score,
                tier
            )
        } else {
            format!("{} ({})", score, tier)
        }
    }
}

/// One ranked row of the downstream leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateEntry {
    pub rank: u32,

    pub fid: Fid,

    #[serde(default)]
    pub overall_score: Option<f64>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub tier: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default)]
    pub pfp_url: Option<String>,
}

impl AggregateEntry {
    /// Same predicate as [`ScoreRecord::has_enrichment`].
    pub fn has_enrichment(&self) -> bool {
        is_filled(&self.username) || is_filled(&self.display_name)
    }

    pub fn tier_label(&self) -> &str {
        tier_or_na(&self.tier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_score_record_from_wire_json() {
        let record: ScoreRecord = serde_json::from_value(json!({
            "fid": 3,
            "overallScore": 82.5,
            "tier": "A",
            "username": "dwr.eth",
            "displayName": "Dan Romero",
            "pfpUrl": "https://example.com/dwr.png"
        }))
        .unwrap();

        assert_eq!(record.fid, Some(Fid(3)));
        assert_eq!(record.overall_score, Some(82.5));
        assert_eq!(record.avatar_url.as_deref(), Some("https://example.com/dwr.png"));
        assert!(record.has_enrichment());
        assert!(record.is_scored());
    }

    #[test]
    fn test_null_score_is_not_scored() {
        let record: ScoreRecord =
            serde_json::from_value(json!({"overallScore": null, "tier": "D"})).unwrap();
        assert!(!record.is_scored());
        assert!(!record.has_enrichment());
        assert_eq!(record.label(), "N/A (D)");
    }

    #[test]
    fn test_empty_strings_do_not_count_as_enrichment() {
        let record: ScoreRecord = serde_json::from_value(json!({
            "overallScore": 10.0,
            "tier": "C",
            "username": "",
            "displayName": null
        }))
        .unwrap();
        assert!(!record.has_enrichment());
    }

    #[test]
    fn test_display_name_alone_is_enrichment() {
        let entry: AggregateEntry = serde_json::from_value(json!({
            "rank": 4,
            "fid": 99,
            "overallScore": 55.0,
            "tier": "B",
            "displayName": "Jesse"
        }))
        .unwrap();
        assert!(entry.has_enrichment());
        assert_eq!(entry.fid, Fid(99));
    }

    #[test]
    fn test_null_tier_decodes_as_empty() {
        let record: ScoreRecord = serde_json::from_value(json!({
            "fid": 7,
            "overallScore": 61.0,
            "tier": null,
            "username": "x"
        }))
        .unwrap();
        assert!(record.is_scored());
        assert_eq!(record.tier, "");
        assert_eq!(record.label(), "@x (N/A) - 61.0 (N/A)");

        let entry: AggregateEntry = serde_json::from_value(json!({
            "rank": 1,
            "fid": 7,
            "overallScore": 61.0,
            "tier": null
        }))
        .unwrap();
        assert_eq!(entry.tier_label(), "N/A");
    }

    #[test]
    fn test_label_with_profile() {
        let record = ScoreRecord {
            fid: Some(Fid(194)),
            overall_score: Some(71.24),
            tier: "B".to_string(),
            username: Some("rish".to_string()),
            display_name: None,
            avatar_url: None,
        };
        assert_eq!(record.label(), "@rish (N/A) - 71.2 (B)");
    }
}
