//! Wire envelopes of the scoring service and their classification into
//! [`FetchOutcome`].

use crate::domain::{AggregateEntry, Fid, ScoreRecord};
use crate::error::{CallError, FailureKind};
use serde::{Deserialize, Serialize};

/// Error substrings that mark a key as invalid rather than a failed call.
///
/// The scoring service has no structured error code, so this match on the
/// message text is the whole contract. Keep it case-insensitive.
const NOT_FOUND_MARKERS: [&str; 2] = ["not found", "invalid"];

/// `{success, data?, error?}` returned by `GET /score/creator/{fid}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScoreEnvelope {
    pub success: bool,
    #[serde(default)]
    pub data: Option<ScoreRecord>,
    #[serde(default)]
    pub error: Option<String>,
}

/// `{success, data: {leaderboard: [...]}}` returned by `GET /leaderboard`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LeaderboardEnvelope {
    pub success: bool,
    #[serde(default)]
    pub data: Option<LeaderboardData>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LeaderboardData {
    #[serde(default)]
    pub leaderboard: Vec<AggregateEntry>,
}

impl LeaderboardEnvelope {
    pub fn into_entries(self) -> Result<Vec<AggregateEntry>, CallError> {
        if !self.success {
            return Err(CallError::Rejected(
                self.error.unwrap_or_else(|| "Unknown error".to_string()),
            ));
        }
        self.data
            .map(|d| d.leaderboard)
            .ok_or_else(|| CallError::Malformed("leaderboard response without data".to_string()))
    }
}

/// Result of asking the scoring service for one key.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Call succeeded. The score may still be absent for inactive entities.
    Scored(ScoreRecord),
    /// Collaborator reports the key as invalid or unknown.
    NotFound(String),
    /// Transport failure, timeout, or undecodable payload.
    TransientFailure(CallError),
}

impl FetchOutcome {
    /// Why this outcome did not produce a scored record, if it didn't.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            FetchOutcome::Scored(record) if record.is_scored() => None,
            FetchOutcome::Scored(_) => Some(FailureKind::DomainNullScore),
            FetchOutcome::NotFound(_) => Some(FailureKind::DomainNotFound),
            FetchOutcome::TransientFailure(err) => Some(err.kind()),
        }
    }

    pub fn record(&self) -> Option<&ScoreRecord> {
        match self {
            FetchOutcome::Scored(record) => Some(record),
            _ => None,
        }
    }
}

/// Case-insensitive match against the not-found markers.
pub fn is_not_found_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    NOT_FOUND_MARKERS.iter().any(|m| lower.contains(m))
}

/// Classify a decoded score envelope for `fid`.
pub fn classify_envelope(fid: Fid, envelope: ScoreEnvelope) -> FetchOutcome {
    if envelope.success {
        return match envelope.data {
            Some(mut record) => {
                record.fid.get_or_insert(fid);
                FetchOutcome::Scored(record)
            }
            None => FetchOutcome::TransientFailure(CallError::Malformed(
                "success response without data".to_string(),
            )),
        };
    }

    let message = envelope
        .error
        .unwrap_or_else(|| "Unknown error".to_string());
    if is_not_found_message(&message) {
        FetchOutcome::NotFound(message)
    } else {
        FetchOutcome::TransientFailure(CallError::Rejected(message))
    }
}

/// Decode and classify a raw response body.
///
/// The body is inspected whatever the HTTP status, since the service reports
/// unknown keys inside a JSON envelope. A body that is not an envelope is a
/// status failure when the status was non-2xx, otherwise malformed.
pub fn classify_body(fid: Fid, status: u16, body: &str) -> FetchOutcome {
    match serde_json::from_str::<ScoreEnvelope>(body) {
        Ok(envelope) => classify_envelope(fid, envelope),
        Err(_) if !(200..300).contains(&status) => {
            FetchOutcome::TransientFailure(CallError::Status(status))
        }
        Err(e) => FetchOutcome::TransientFailure(CallError::Malformed(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(value: serde_json::Value) -> ScoreEnvelope {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_null_score_is_scored_but_not_counted() {
        let outcome = classify_envelope(
            Fid(42),
            envelope(json!({"success": true, "data": {"overallScore": null, "tier": "D"}})),
        );
        let record = outcome.record().expect("scored");
        assert_eq!(record.fid, Some(Fid(42)));
        assert_eq!(outcome.failure_kind(), Some(FailureKind::DomainNullScore));
    }

    #[test]
    fn test_fid_not_found_is_domain_not_found() {
        let outcome = classify_envelope(
            Fid(7),
            envelope(json!({"success": false, "error": "FID not found"})),
        );
        assert_eq!(outcome, FetchOutcome::NotFound("FID not found".to_string()));
        assert_eq!(outcome.failure_kind(), Some(FailureKind::DomainNotFound));
    }

    #[test]
    fn test_not_found_match_is_case_insensitive() {
        assert!(is_not_found_message("Invalid FID supplied"));
        assert!(is_not_found_message("user NOT FOUND"));
        assert!(!is_not_found_message("rate limit exceeded"));
    }

    #[test]
    fn test_other_errors_are_transient() {
        let outcome = classify_envelope(
            Fid(7),
            envelope(json!({"success": false, "error": "upstream timeout"})),
        );
        assert_eq!(outcome.failure_kind(), Some(FailureKind::TransportError));
    }

    #[test]
    fn test_success_without_data_is_malformed() {
        let outcome = classify_envelope(Fid(7), envelope(json!({"success": true})));
        assert_eq!(outcome.failure_kind(), Some(FailureKind::MalformedResponse));
    }

    #[test]
    fn test_scored_record_keeps_returned_fid() {
        let outcome = classify_envelope(
            Fid(7),
            envelope(json!({
                "success": true,
                "data": {"fid": 8, "overallScore": 12.0, "tier": "C"}
            })),
        );
        assert_eq!(outcome.record().unwrap().fid, Some(Fid(8)));
        assert_eq!(outcome.failure_kind(), None);
    }

    #[test]
    fn test_classify_body_by_status() {
        let not_found = classify_body(Fid(1), 404, r#"{"success":false,"error":"Invalid FID"}"#);
        assert!(matches!(not_found, FetchOutcome::NotFound(_)));

        let gateway = classify_body(Fid(1), 502, "<html>Bad Gateway</html>");
        assert_eq!(gateway, FetchOutcome::TransientFailure(CallError::Status(502)));

        let garbage = classify_body(Fid(1), 200, "not json");
        assert_eq!(garbage.failure_kind(), Some(FailureKind::MalformedResponse));
    }

    #[test]
    fn test_null_tier_still_scores() {
        let body = json!({
            "success": true,
            "data": {"fid": 7, "overallScore": 61.0, "tier": null, "username": "x"}
        });
        let outcome = classify_body(Fid(7), 200, &body.to_string());
        let record = outcome.record().expect("scored");
        assert_eq!(record.overall_score, Some(61.0));
        assert!(record.has_enrichment());
        assert_eq!(outcome.failure_kind(), None);

        let bare = classify_body(
            Fid(9),
            200,
            r#"{"success":true,"data":{"overallScore":61,"tier":null}}"#,
        );
        assert_eq!(bare.failure_kind(), None);
    }

    #[test]
    fn test_leaderboard_row_with_null_tier() {
        let env: LeaderboardEnvelope = serde_json::from_value(json!({
            "success": true,
            "data": {"leaderboard": [
                {"rank": 1, "fid": 3, "overallScore": 90.0, "tier": null, "username": "dwr.eth"},
                {"rank": 2, "fid": 4, "overallScore": 80.0, "tier": "A"}
            ]}
        }))
        .unwrap();
        let entries = env.into_entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].tier_label(), "N/A");
        assert_eq!(entries[1].tier_label(), "A");
    }

    #[test]
    fn test_leaderboard_envelope() {
        let env: LeaderboardEnvelope = serde_json::from_value(json!({
            "success": true,
            "data": {"leaderboard": [{"rank": 1, "fid": 3, "overallScore": 90.0, "tier": "A"}]}
        }))
        .unwrap();
        let entries = env.into_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].fid, Fid(3));

        let failed: LeaderboardEnvelope =
            serde_json::from_value(json!({"success": false, "error": "boom"})).unwrap();
        assert_eq!(
            failed.into_entries().unwrap_err(),
            CallError::Rejected("boom".to_string())
        );
    }
}
