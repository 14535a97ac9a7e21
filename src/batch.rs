//! Dashboard batch: six channel analytics calls issued together.

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde_json::{json, Value as JsonValue};

use crate::{AnalyticsClient, AnalyticsError, BatchResult, Result};

/// Inclusive reporting window sent as `from`/`to` query parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    /// The `period_days` days ending at `to`.
    pub fn ending_at(to: DateTime<Utc>, period_days: u32) -> Result<Self> {
        let from = TimeDelta::try_days(i64::from(period_days))
            .and_then(|span| to.checked_sub_signed(span))
            .ok_or_else(|| {
                AnalyticsError::InvalidRequest(format!(
                    "period of {period_days} days is out of range"
                ))
            })?;
        Ok(Self { from, to })
    }

    /// The `period_days` days ending now.
    pub fn last_days(period_days: u32) -> Result<Self> {
        Self::ending_at(Utc::now(), period_days)
    }

    /// `from=..&to=..` with ISO-8601 millisecond UTC timestamps.
    pub fn query(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("from", &iso8601(self.from))
            .append_pair("to", &iso8601(self.to))
            .finish()
    }
}

pub(crate) fn iso8601(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Path prefix for one channel. Ids that would break out of the path are
/// rejected.
fn channel_path(channel_id: &str) -> Result<String> {
    let id = channel_id.trim();
    if id.is_empty() || id.contains(['/', '?', '#', '%']) || id.contains(char::is_whitespace) {
        return Err(AnalyticsError::InvalidRequest(format!(
            "invalid channel id '{channel_id}'"
        )));
    }
    Ok(format!("/analytics/channels/{id}"))
}

impl BatchResult {
    /// Value used for `real_time` when that call fails.
    pub fn empty_real_time(timestamp: DateTime<Utc>) -> JsonValue {
        json!({ "metrics": [], "timestamp": iso8601(timestamp) })
    }

    /// Value used for `alerts` when that call fails.
    pub fn empty_alerts(timestamp: DateTime<Utc>) -> JsonValue {
        json!({ "alerts": [], "timestamp": iso8601(timestamp) })
    }
}

impl AnalyticsClient {
    async fn get_ranged(
        &self,
        channel_id: &str,
        resource: &str,
        range: &DateRange,
    ) -> Result<JsonValue> {
        let endpoint = format!("{}/{resource}?{}", channel_path(channel_id)?, range.query());
        Ok(self.get(&endpoint).await?.into_json())
    }

    pub async fn get_overview(&self, channel_id: &str, range: &DateRange) -> Result<JsonValue> {
        self.get_ranged(channel_id, "overview", range).await
    }

    pub async fn get_growth(&self, channel_id: &str, range: &DateRange) -> Result<JsonValue> {
        self.get_ranged(channel_id, "growth", range).await
    }

    pub async fn get_reach(&self, channel_id: &str, range: &DateRange) -> Result<JsonValue> {
        self.get_ranged(channel_id, "reach", range).await
    }

    pub async fn get_top_posts(&self, channel_id: &str, range: &DateRange) -> Result<JsonValue> {
        self.get_ranged(channel_id, "top-posts", range).await
    }

    pub async fn get_real_time(&self, channel_id: &str) -> Result<JsonValue> {
        let endpoint = format!("{}/realtime", channel_path(channel_id)?);
        Ok(self.get(&endpoint).await?.into_json())
    }

    pub async fn get_alerts(&self, channel_id: &str) -> Result<JsonValue> {
        let endpoint = format!("{}/alerts", channel_path(channel_id)?);
        Ok(self.get(&endpoint).await?.into_json())
    }

    /// Fetches all dashboard data for a channel concurrently.
    ///
    /// The four core calls (overview, growth, reach, top posts) share one
    /// date range; if any of them fails the whole batch fails with that
    /// error. The real-time and alerts calls fall back to
    /// [`BatchResult::empty_real_time`] and [`BatchResult::empty_alerts`].
    pub async fn get_batch(&self, channel_id: &str, period_days: u32) -> Result<BatchResult> {
        channel_path(channel_id)?;
        let timestamp = Utc::now();
        let range = DateRange::ending_at(timestamp, period_days)?;

        let real_time = async {
            let value = self.get_real_time(channel_id).await.unwrap_or_else(|err| {
                fallback("realTime", err, BatchResult::empty_real_time(timestamp))
            });
            Ok::<_, AnalyticsError>(value)
        };
        let alerts = async {
            let value = self.get_alerts(channel_id).await.unwrap_or_else(|err| {
                fallback("alerts", err, BatchResult::empty_alerts(timestamp))
            });
            Ok::<_, AnalyticsError>(value)
        };

        let (overview, growth, reach, top_posts, real_time, alerts) = tokio::try_join!(
            self.get_overview(channel_id, &range),
            self.get_growth(channel_id, &range),
            self.get_reach(channel_id, &range),
            self.get_top_posts(channel_id, &range),
            real_time,
            alerts,
        )?;

        Ok(BatchResult {
            overview,
            growth,
            reach,
            top_posts,
            real_time,
            alerts,
            timestamp,
        })
    }
}

fn fallback(section: &str, err: AnalyticsError, default: JsonValue) -> JsonValue {
    #[cfg(feature = "tracing")]
    tracing::warn!(section, error = %err, "auxiliary batch call failed; using empty default");
    #[cfg(not(feature = "tracing"))]
    let _ = (section, err);
    default
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{channel_path, DateRange};
    use crate::{AnalyticsError, BatchResult};

    #[test]
    fn range_spans_period_and_formats_iso8601() {
        let to = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        let range = DateRange::ending_at(to, 30).expect("must build range");
        assert_eq!(range.from, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        assert_eq!(
            range.query(),
            "from=2024-03-01T12%3A00%3A00.000Z&to=2024-03-31T12%3A00%3A00.000Z"
        );
    }

    #[test]
    fn absurd_period_is_rejected() {
        assert!(matches!(
            DateRange::last_days(u32::MAX),
            Err(AnalyticsError::InvalidRequest(_))
        ));
    }

    #[test]
    fn channel_ids_cannot_escape_the_path() {
        assert_eq!(
            channel_path("@news").expect("must accept"),
            "/analytics/channels/@news"
        );
        assert!(channel_path("../admin").is_err());
        assert!(channel_path("a b").is_err());
        assert!(channel_path("").is_err());
    }

    #[test]
    fn empty_defaults_carry_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            BatchResult::empty_real_time(ts),
            json!({"metrics": [], "timestamp": "2024-01-02T03:04:05.000Z"})
        );
        assert_eq!(
            BatchResult::empty_alerts(ts),
            json!({"alerts": [], "timestamp": "2024-01-02T03:04:05.000Z"})
        );
    }
}
