use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Whether a lender relationship is still being followed on a deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum TrackingStatus {
    Active,
    Inactive,
}

impl std::fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackingStatus::Active => write!(f, "active"),
            TrackingStatus::Inactive => write!(f, "inactive"),
        }
    }
}

/// One lender's last known update on a deal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LenderUpdate {
    pub tracking_status: TrackingStatus,
    /// ISO-8601 timestamp as delivered by the store; may be absent.
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl LenderUpdate {
    pub fn new(tracking_status: TrackingStatus, updated_at: Option<DateTime<Utc>>) -> Self {
        Self {
            tracking_status,
            updated_at: updated_at.map(|t| t.to_rfc3339()),
        }
    }

    /// Parsed `updated_at`. Absent and unparseable timestamps both yield `None`.
    pub fn last_updated_at(&self) -> Option<DateTime<Utc>> {
        parse_iso_timestamp(self.updated_at.as_deref()?)
    }

    pub fn is_active(&self) -> bool {
        self.tracking_status == TrackingStatus::Active
    }
}

/// Parse an ISO-8601 timestamp. Values without an offset are read as UTC,
/// and a bare date means midnight UTC.
pub fn parse_iso_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(t.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

/// A scalar JSON value rendered as text. Objects, arrays and null yield `None`.
pub fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A deal with its lender sub-records, in board order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub id: Uuid,
    /// Display name of the deal.
    pub company: String,
    #[serde(default)]
    pub lenders: Vec<LenderUpdate>,
}

/// The two user-configurable staleness cut-offs, in whole days.
///
/// `warning_days < critical_days` is expected but not enforced; see
/// [`StalenessThresholds::is_inverted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessThresholds {
    #[serde(rename = "lenderUpdateYellowDays")]
    pub warning_days: u32,
    #[serde(rename = "lenderUpdateRedDays")]
    pub critical_days: u32,
}

impl StalenessThresholds {
    pub fn new(warning_days: u32, critical_days: u32) -> Self {
        Self {
            warning_days,
            critical_days,
        }
    }

    /// True when the warning cut-off is above the critical one. Under the
    /// classification precedence no lender can ever land in `warning` then.
    pub fn is_inverted(&self) -> bool {
        self.warning_days > self.critical_days
    }
}

/// Freshness classification of a single lender update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    Warning,
    Critical,
}

impl std::fmt::Display for Freshness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Freshness::Fresh => write!(f, "fresh"),
            Freshness::Warning => write!(f, "warning"),
            Freshness::Critical => write!(f, "critical"),
        }
    }
}

/// Independent notification sources that keep per-user read state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationSource {
    /// Deal activity feed entries.
    Activity,
    /// Items waiting in the external-sync queue.
    SyncQueue,
    /// Memo updates on a deal.
    MemoUpdate,
}

impl std::fmt::Display for NotificationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationSource::Activity => write!(f, "activity"),
            NotificationSource::SyncQueue => write!(f, "sync_queue"),
            NotificationSource::MemoUpdate => write!(f, "memo_update"),
        }
    }
}

impl FromStr for NotificationSource {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "activity" => Ok(NotificationSource::Activity),
            "sync_queue" => Ok(NotificationSource::SyncQueue),
            "memo_update" => Ok(NotificationSource::MemoUpdate),
            other => Err(crate::error::AppError::Validation(format!(
                "Unknown notification type '{}'",
                other
            ))),
        }
    }
}

/// Identity of one notification item within its source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReadKey {
    #[serde(rename = "type")]
    pub source: NotificationSource,
    #[serde(rename = "id")]
    pub source_id: String,
}

impl ReadKey {
    pub fn new(source: NotificationSource, source_id: impl Into<String>) -> Self {
        Self {
            source,
            source_id: source_id.into(),
        }
    }
}

/// A persisted acknowledgment: user `user_id` has seen `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadMarker {
    pub user_id: Uuid,
    pub notification_type: NotificationSource,
    pub notification_id: String,
    pub marked_at: DateTime<Utc>,
}

impl ReadMarker {
    pub fn key(&self) -> ReadKey {
        ReadKey::new(self.notification_type, self.notification_id.clone())
    }
}

/// Kind of change carried by a realtime event. Only inserts are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One message from the realtime push feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub source_table: String,
    pub event_type: ChangeKind,
    /// Opaque record payload; carries at least an `id`.
    pub record: serde_json::Value,
}

impl NotificationEvent {
    pub fn insert(source_table: impl Into<String>, record: serde_json::Value) -> Self {
        Self {
            source_table: source_table.into(),
            event_type: ChangeKind::Insert,
            record,
        }
    }

    /// The record's `id` rendered as a string, whether stored as text or number.
    pub fn record_id(&self) -> Option<String> {
        scalar_to_string(self.record.get("id")?)
    }
}

/// Why the decision endpoint blocked a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    RateLimited,
    BotDetected,
    None,
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::RateLimited => write!(f, "rate_limited"),
            BlockReason::BotDetected => write!(f, "bot_detected"),
            BlockReason::None => write!(f, "none"),
        }
    }
}

impl From<Option<&str>> for BlockReason {
    fn from(reason: Option<&str>) -> Self {
        match reason {
            Some("rate_limited") => BlockReason::RateLimited,
            Some("bot_detected") => BlockReason::BotDetected,
            _ => BlockReason::None,
        }
    }
}

/// Outcome of one rate-limit check. Superseded by the next check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitVerdict {
    pub allowed: bool,
    pub retry_after_seconds: Option<u64>,
    pub reason: BlockReason,
}

impl RateLimitVerdict {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            retry_after_seconds: None,
            reason: BlockReason::None,
        }
    }

    pub fn block(reason: BlockReason, retry_after_seconds: Option<u64>) -> Self {
        Self {
            allowed: false,
            retry_after_seconds,
            reason,
        }
    }
}

/// Request body of the rate-limit decision call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub path: String,
}

/// Response body of the rate-limit decision call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResponse {
    pub allowed: bool,
    /// Any JSON number is accepted; fractions round up and negatives become 0.
    #[serde(
        default,
        deserialize_with = "deserialize_retry_after",
        skip_serializing_if = "Option::is_none"
    )]
    pub retry_after: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

fn deserialize_retry_after<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let seconds = Option::<f64>::deserialize(deserializer)?;
    Ok(seconds
        .filter(|s| s.is_finite())
        .map(|s| s.ceil().max(0.0) as u64))
}

impl From<DecisionResponse> for RateLimitVerdict {
    fn from(resp: DecisionResponse) -> Self {
        if resp.allowed {
            return RateLimitVerdict::allow();
        }
        RateLimitVerdict::block(BlockReason::from(resp.reason.as_deref()), resp.retry_after)
    }
}

impl From<RateLimitVerdict> for DecisionResponse {
    fn from(verdict: RateLimitVerdict) -> Self {
        Self {
            allowed: verdict.allowed,
            retry_after: verdict.retry_after_seconds,
            reason: (verdict.reason != BlockReason::None).then(|| verdict.reason.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lender_update_parses_iso_timestamp() {
        let lender: LenderUpdate = serde_json::from_value(serde_json::json!({
            "trackingStatus": "active",
            "updatedAt": "2026-10-01T12:30:00Z"
        }))
        .unwrap();
        assert!(lender.is_active());
        let ts = lender.last_updated_at().unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-10-01T12:30:00+00:00");
    }

    fn active_at(raw: &str) -> LenderUpdate {
        LenderUpdate {
            tracking_status: TrackingStatus::Active,
            updated_at: Some(raw.to_string()),
        }
    }

    #[test]
    fn test_lender_update_timestamp_without_offset_is_utc() {
        let ts = active_at("2026-10-01T12:30:00").last_updated_at().unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-10-01T12:30:00+00:00");
    }

    #[test]
    fn test_lender_update_fractional_seconds_without_offset() {
        let ts = active_at("2026-10-01T12:30:00.123456")
            .last_updated_at()
            .unwrap();
        assert_eq!(ts.timestamp(), 1_790_857_800);
        assert_eq!(ts.timestamp_subsec_micros(), 123_456);
    }

    #[test]
    fn test_lender_update_date_only_is_midnight_utc() {
        let ts = active_at("2026-10-01").last_updated_at().unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-10-01T00:00:00+00:00");
    }

    #[test]
    fn test_lender_update_offset_timestamp_converted_to_utc() {
        let ts = active_at("2026-10-01T14:30:00+02:00").last_updated_at().unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-10-01T12:30:00+00:00");
    }

    #[test]
    fn test_lender_update_malformed_timestamp_is_none() {
        let lender = LenderUpdate {
            tracking_status: TrackingStatus::Active,
            updated_at: Some("last tuesday".to_string()),
        };
        assert!(lender.last_updated_at().is_none());
    }

    #[test]
    fn test_deal_without_lenders_field() {
        let deal: Deal = serde_json::from_value(serde_json::json!({
            "id": "4b1c2b2e-6a0c-4a55-9f1f-0d0b7c6f1a11",
            "company": "Acme Holdings"
        }))
        .unwrap();
        assert!(deal.lenders.is_empty());
    }

    #[test]
    fn test_thresholds_wire_names() {
        let t: StalenessThresholds = serde_json::from_value(serde_json::json!({
            "lenderUpdateYellowDays": 7,
            "lenderUpdateRedDays": 14
        }))
        .unwrap();
        assert_eq!(t, StalenessThresholds::new(7, 14));
        assert!(!t.is_inverted());
        assert!(StalenessThresholds::new(20, 10).is_inverted());
    }

    #[test]
    fn test_notification_source_round_trips_through_text() {
        for source in [
            NotificationSource::Activity,
            NotificationSource::SyncQueue,
            NotificationSource::MemoUpdate,
        ] {
            assert_eq!(source.to_string().parse::<NotificationSource>().unwrap(), source);
        }
        assert!("calendar".parse::<NotificationSource>().is_err());
    }

    #[test]
    fn test_read_key_wire_shape() {
        let key: ReadKey =
            serde_json::from_value(serde_json::json!({"type": "activity", "id": "x1"})).unwrap();
        assert_eq!(key, ReadKey::new(NotificationSource::Activity, "x1"));
    }

    #[test]
    fn test_event_record_id_accepts_numbers() {
        let event = NotificationEvent::insert("activities", serde_json::json!({"id": 42}));
        assert_eq!(event.record_id().as_deref(), Some("42"));
        let event = NotificationEvent::insert("activities", serde_json::json!({"status": "x"}));
        assert!(event.record_id().is_none());
    }

    #[test]
    fn test_decision_response_to_verdict() {
        let resp: DecisionResponse = serde_json::from_value(serde_json::json!({
            "allowed": false,
            "retryAfter": 30,
            "reason": "rate_limited"
        }))
        .unwrap();
        let verdict = RateLimitVerdict::from(resp);
        assert!(!verdict.allowed);
        assert_eq!(verdict.retry_after_seconds, Some(30));
        assert_eq!(verdict.reason, BlockReason::RateLimited);

        let allowed: DecisionResponse =
            serde_json::from_value(serde_json::json!({"allowed": true})).unwrap();
        assert_eq!(RateLimitVerdict::from(allowed), RateLimitVerdict::allow());
    }

    #[test]
    fn test_fractional_retry_after_rounds_up() {
        let resp: DecisionResponse = serde_json::from_value(serde_json::json!({
            "allowed": false,
            "retryAfter": 2.5,
            "reason": "rate_limited"
        }))
        .unwrap();
        let verdict = RateLimitVerdict::from(resp);
        assert!(!verdict.allowed);
        assert_eq!(verdict.retry_after_seconds, Some(3));
        assert_eq!(verdict.reason, BlockReason::RateLimited);
    }

    #[test]
    fn test_negative_or_null_retry_after() {
        let resp: DecisionResponse =
            serde_json::from_value(serde_json::json!({"allowed": false, "retryAfter": -4}))
                .unwrap();
        assert_eq!(resp.retry_after, Some(0));

        let resp: DecisionResponse =
            serde_json::from_value(serde_json::json!({"allowed": false, "retryAfter": null}))
                .unwrap();
        assert_eq!(resp.retry_after, None);
    }

    #[test]
    fn test_scalar_to_string() {
        assert_eq!(scalar_to_string(&serde_json::json!("u1")).as_deref(), Some("u1"));
        assert_eq!(scalar_to_string(&serde_json::json!(42)).as_deref(), Some("42"));
        assert_eq!(scalar_to_string(&serde_json::json!(true)).as_deref(), Some("true"));
        assert!(scalar_to_string(&serde_json::json!({})).is_none());
        assert!(scalar_to_string(&serde_json::Value::Null).is_none());
    }

    #[test]
    fn test_verdict_to_response_omits_none_reason() {
        let resp = DecisionResponse::from(RateLimitVerdict::allow());
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json, serde_json::json!({"allowed": true}));

        let resp = DecisionResponse::from(RateLimitVerdict::block(BlockReason::BotDetected, None));
        assert_eq!(resp.reason.as_deref(), Some("bot_detected"));
    }
}
