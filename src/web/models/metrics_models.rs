use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::entities::metric;
use crate::db::services::metric_service::MetricRange;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsQuery {
    #[serde(default)]
    pub range: MetricRange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricPoint {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSeries {
    pub metric_name: String,
    pub unit: String,
    pub data: Vec<MetricPoint>,
}

/// Groups ascending samples into one series per metric name, keeping first-seen order.
pub fn group_into_series(samples: Vec<metric::Model>) -> Vec<MetricSeries> {
    let mut series: Vec<MetricSeries> = Vec::new();
    for sample in samples {
        let point = MetricPoint {
            value: sample.value,
            timestamp: sample.timestamp,
        };
        match series.iter_mut().find(|s| s.metric_name == sample.metric_name) {
            Some(existing) => existing.data.push(point),
            None => series.push(MetricSeries {
                metric_name: sample.metric_name,
                unit: sample.unit,
                data: vec![point],
            }),
        }
    }
    series
}
