use crate::gateway::SyncError;
use crate::models::{
    round_score, score_label, BarPoint, ChartsResponse, HistoryEntry, HistoryResponse, Metrics,
    PredictionRecord, RadarPoint,
};
use tracing::warn;

pub const OFFLINE_HISTORY: &str = "Sync your data to view global history.";
pub const EMPTY_HISTORY: &str = "No cloud data found yet.";

pub fn build_charts(metrics: &Metrics) -> ChartsResponse {
    ChartsResponse {
        radar: build_radar(metrics),
        bars: build_bars(metrics),
    }
}

/// Visual snapshot. Work and exercise are scaled to sit on the same axis range
/// as the other three.
fn build_radar(metrics: &Metrics) -> Vec<RadarPoint> {
    [
        ("Sleep", metrics.sleep),
        ("Work", metrics.work / 1.5),
        ("Exercise", f64::from(metrics.exercise) / 15.0),
        ("Caffeine", f64::from(metrics.caffeine)),
        ("Screen", metrics.screen),
    ]
    .into_iter()
    .map(|(axis, value)| RadarPoint {
        axis: axis.to_string(),
        value,
    })
    .collect()
}

fn build_bars(metrics: &Metrics) -> Vec<BarPoint> {
    [
        ("Sleep", metrics.sleep),
        ("Work", metrics.work),
        ("Screen", metrics.screen),
    ]
    .into_iter()
    .map(|(metric, hours)| BarPoint {
        metric: metric.to_string(),
        hours,
    })
    .collect()
}

pub fn build_history(result: Result<Vec<PredictionRecord>, SyncError>) -> HistoryResponse {
    match result {
        Ok(records) if records.is_empty() => HistoryResponse {
            connected: true,
            entries: Vec::new(),
            message: Some(EMPTY_HISTORY.to_string()),
        },
        Ok(records) => HistoryResponse {
            connected: true,
            entries: records.into_iter().map(history_entry).collect(),
            message: None,
        },
        Err(err) => {
            if !matches!(err, SyncError::NotConnected) {
                warn!("history query failed: {err}");
            }
            HistoryResponse {
                connected: !matches!(err, SyncError::NotConnected),
                entries: Vec::new(),
                message: Some(OFFLINE_HISTORY.to_string()),
            }
        }
    }
}

fn history_entry(record: PredictionRecord) -> HistoryEntry {
    HistoryEntry {
        label: format!("{} | Score: {}", record.name, score_label(record.score)),
        score: round_score(record.score),
        name: record.name,
        timestamp: record.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    #[test]
    fn radar_scales_work_and_exercise() {
        let charts = build_charts(&Metrics::default());
        let axes: Vec<&str> = charts.radar.iter().map(|p| p.axis.as_str()).collect();
        assert_eq!(axes, ["Sleep", "Work", "Exercise", "Caffeine", "Screen"]);
        let values: Vec<f64> = charts.radar.iter().map(|p| p.value).collect();
        assert_eq!(values[0], 7.5);
        assert!((values[1] - 8.0 / 1.5).abs() < 1e-12);
        assert_eq!(values[2], 2.0);
        assert_eq!(values[3], 2.0);
        assert_eq!(values[4], 3.0);
    }

    #[test]
    fn bars_cover_hour_metrics_only() {
        let charts = build_charts(&Metrics::default());
        let bars: Vec<(&str, f64)> = charts
            .bars
            .iter()
            .map(|b| (b.metric.as_str(), b.hours))
            .collect();
        assert_eq!(bars, [("Sleep", 7.5), ("Work", 8.0), ("Screen", 3.0)]);
    }

    #[test]
    fn history_labels_round_scores() {
        let created_at: DateTime<Utc> = "2026-01-05T10:00:00Z".parse().unwrap();
        let history = build_history(Ok(vec![PredictionRecord {
            name: "Bob".into(),
            score: 72.34,
            metrics: Metrics::default(),
            created_at,
        }]));
        assert!(history.connected);
        assert_eq!(history.message, None);
        assert_eq!(history.entries[0].label, "Bob | Score: 72.3%");
        assert_eq!(history.entries[0].score, 72.3);
    }

    #[test]
    fn history_messages_for_empty_and_offline() {
        let empty = build_history(Ok(Vec::new()));
        assert_eq!(empty.message.as_deref(), Some(EMPTY_HISTORY));

        let offline = build_history(Err(SyncError::NotConnected));
        assert!(!offline.connected);
        assert_eq!(offline.message.as_deref(), Some(OFFLINE_HISTORY));
    }
}
