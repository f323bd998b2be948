//! Aggregation tree parser.

use serde_json::Value;

use crate::document::parse_time;
use crate::error::{GalenaError, Result};

/// Default bucket count for `terms` aggregations.
pub const DEFAULT_TERMS_SIZE: usize = 10;
/// Default target bucket count for auto-interval date histograms.
pub const DEFAULT_AUTO_BUCKETS: usize = 10;
/// Default percentile set.
pub const DEFAULT_PERCENTS: [f64; 7] = [1.0, 5.0, 25.0, 50.0, 75.0, 95.0, 99.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Min,
    Max,
    Avg,
    Sum,
    Count,
}

/// One explicit numeric range bucket.
#[derive(Debug, Clone)]
pub struct RangeBucket {
    pub key: Option<String>,
    pub from: Option<f64>,
    pub to: Option<f64>,
}

/// What one aggregation computes.
#[derive(Debug, Clone)]
pub enum AggSpec {
    Terms {
        field: String,
        size: usize,
    },
    Range {
        field: String,
        ranges: Vec<RangeBucket>,
    },
    /// Bounds are parsed to epoch millis up front.
    DateRange {
        field: String,
        ranges: Vec<RangeBucket>,
    },
    Histogram {
        field: String,
        interval: f64,
        offset: f64,
    },
    DateHistogram {
        field: String,
        /// Fixed interval in millis; `None` selects auto-interval.
        interval: Option<i64>,
        buckets: usize,
    },
    Metric {
        kind: MetricKind,
        field: String,
    },
    Cardinality {
        field: String,
    },
    Percentiles {
        field: String,
        percents: Vec<f64>,
    },
    Stats {
        field: String,
    },
}

/// A named aggregation with nested sub-aggregations.
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub spec: AggSpec,
    pub subs: Vec<(String, Aggregation)>,
}

/// Parse the `aggs` object of a search request.
pub fn parse(body: &Value) -> Result<Vec<(String, Aggregation)>> {
    let Value::Object(map) = body else {
        return Err(GalenaError::parsing("[aggs] expected an object"));
    };

    let mut out = Vec::with_capacity(map.len());
    for (name, def) in map {
        out.push((name.clone(), parse_one(name, def)?));
    }
    Ok(out)
}

fn parse_one(name: &str, def: &Value) -> Result<Aggregation> {
    let Value::Object(map) = def else {
        return Err(GalenaError::parsing(format!(
            "[aggs] [{name}] expected an object"
        )));
    };

    let mut spec: Option<AggSpec> = None;
    let mut subs = Vec::new();

    for (key, body) in map {
        match key.as_str() {
            "aggs" | "aggregations" => {
                subs = parse(body)?;
            }
            kind => {
                if spec.is_some() {
                    return Err(GalenaError::parsing(format!(
                        "[aggs] [{name}] declares more than one aggregation type"
                    )));
                }
                spec = Some(parse_spec(name, kind, body)?);
            }
        }
    }

    let spec = spec.ok_or_else(|| {
        GalenaError::parsing(format!("[aggs] [{name}] is missing an aggregation type"))
    })?;
    Ok(Aggregation { spec, subs })
}

fn parse_spec(name: &str, kind: &str, body: &Value) -> Result<AggSpec> {
    let field = || -> Result<String> {
        body.get("field")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| GalenaError::parsing(format!("[aggs] [{name}] is missing field")))
    };

    match kind {
        "terms" => Ok(AggSpec::Terms {
            field: field()?,
            size: body
                .get("size")
                .and_then(Value::as_u64)
                .map(|v| v as usize)
                .unwrap_or(DEFAULT_TERMS_SIZE),
        }),
        "range" => Ok(AggSpec::Range {
            field: field()?,
            ranges: parse_ranges(name, body, |v| {
                v.as_f64().ok_or_else(|| {
                    GalenaError::parsing(format!("[aggs] [{name}] range bound must be a number"))
                })
            })?,
        }),
        "date_range" => {
            let format = body.get("format").and_then(Value::as_str);
            Ok(AggSpec::DateRange {
                field: field()?,
                ranges: parse_ranges(name, body, |v| {
                    parse_time(v, format).map(|millis| millis as f64)
                })?,
            })
        }
        "histogram" => {
            let interval = body
                .get("interval")
                .and_then(Value::as_f64)
                .ok_or_else(|| {
                    GalenaError::parsing(format!("[aggs] [{name}] is missing interval"))
                })?;
            if interval <= 0.0 {
                return Err(GalenaError::parsing(format!(
                    "[aggs] [{name}] interval must be > 0"
                )));
            }
            Ok(AggSpec::Histogram {
                field: field()?,
                interval,
                offset: body.get("offset").and_then(Value::as_f64).unwrap_or(0.0),
            })
        }
        "date_histogram" => {
            let interval_str = body
                .get("interval")
                .or_else(|| body.get("fixed_interval"))
                .or_else(|| body.get("calendar_interval"))
                .and_then(Value::as_str);
            let interval = interval_str.map(parse_interval).transpose()?;
            Ok(AggSpec::DateHistogram {
                field: field()?,
                interval,
                buckets: body
                    .get("buckets")
                    .and_then(Value::as_u64)
                    .map(|v| v as usize)
                    .unwrap_or(DEFAULT_AUTO_BUCKETS),
            })
        }
        "min" => Ok(AggSpec::Metric {
            kind: MetricKind::Min,
            field: field()?,
        }),
        "max" => Ok(AggSpec::Metric {
            kind: MetricKind::Max,
            field: field()?,
        }),
        "avg" => Ok(AggSpec::Metric {
            kind: MetricKind::Avg,
            field: field()?,
        }),
        "sum" => Ok(AggSpec::Metric {
            kind: MetricKind::Sum,
            field: field()?,
        }),
        "count" | "value_count" => Ok(AggSpec::Metric {
            kind: MetricKind::Count,
            field: field()?,
        }),
        "cardinality" => Ok(AggSpec::Cardinality { field: field()? }),
        "percentiles" => {
            let percents = body
                .get("percents")
                .and_then(Value::as_array)
                .map(|arr| arr.iter().filter_map(Value::as_f64).collect())
                .unwrap_or_else(|| DEFAULT_PERCENTS.to_vec());
            Ok(AggSpec::Percentiles {
                field: field()?,
                percents,
            })
        }
        "stats" => Ok(AggSpec::Stats { field: field()? }),
        other => Err(GalenaError::parsing(format!(
            "[aggs] [{name}] doesn't support type [{other}]"
        ))),
    }
}

fn parse_ranges<F>(name: &str, body: &Value, parse_bound: F) -> Result<Vec<RangeBucket>>
where
    F: Fn(&Value) -> Result<f64>,
{
    let ranges = body
        .get("ranges")
        .and_then(Value::as_array)
        .ok_or_else(|| GalenaError::parsing(format!("[aggs] [{name}] is missing ranges")))?;

    ranges
        .iter()
        .map(|entry| {
            Ok(RangeBucket {
                key: entry
                    .get("key")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                from: entry.get("from").map(&parse_bound).transpose()?,
                to: entry.get("to").map(&parse_bound).transpose()?,
            })
        })
        .collect()
}

/// Parse `"30s"` / `"5m"` / `"1h"` / `"1d"` / `"1w"` interval strings to
/// millis.
fn parse_interval(raw: &str) -> Result<i64> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| GalenaError::parsing(format!("[aggs] interval [{raw}] is missing unit")))?;
    let (number, unit) = raw.split_at(split);
    let value: i64 = number
        .parse()
        .map_err(|_| GalenaError::parsing(format!("[aggs] interval [{raw}] is invalid")))?;

    let factor = match unit {
        "ms" => 1,
        "s" => 1000,
        "m" => 60 * 1000,
        "h" => 60 * 60 * 1000,
        "d" => 24 * 60 * 60 * 1000,
        "w" => 7 * 24 * 60 * 60 * 1000,
        other => {
            return Err(GalenaError::parsing(format!(
                "[aggs] interval unit [{other}] is not supported"
            )));
        }
    };
    Ok(value * factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_terms_defaults() {
        let aggs = parse(&json!({"by_city": {"terms": {"field": "City"}}})).unwrap();
        let (name, agg) = &aggs[0];
        assert_eq!(name, "by_city");
        assert!(
            matches!(&agg.spec, AggSpec::Terms { field, size } if field == "City" && *size == 10)
        );
    }

    #[test]
    fn test_nested_aggs() {
        let aggs = parse(&json!({
            "by_city": {
                "terms": {"field": "City"},
                "aggs": {
                    "max_year": {"max": {"field": "Year"}}
                }
            }
        }))
        .unwrap();

        let (_, agg) = &aggs[0];
        assert_eq!(agg.subs.len(), 1);
        assert!(matches!(
            agg.subs[0].1.spec,
            AggSpec::Metric {
                kind: MetricKind::Max,
                ..
            }
        ));
    }

    #[test]
    fn test_date_histogram_intervals() {
        let aggs = parse(&json!({
            "per_hour": {"date_histogram": {"field": "@timestamp", "interval": "1h"}}
        }))
        .unwrap();
        assert!(matches!(
            aggs[0].1.spec,
            AggSpec::DateHistogram {
                interval: Some(3_600_000),
                ..
            }
        ));

        let auto = parse(&json!({
            "auto": {"date_histogram": {"field": "@timestamp"}}
        }))
        .unwrap();
        assert!(matches!(
            auto[0].1.spec,
            AggSpec::DateHistogram { interval: None, .. }
        ));
    }

    #[test]
    fn test_percentiles_defaults() {
        let aggs = parse(&json!({"p": {"percentiles": {"field": "Year"}}})).unwrap();
        match &aggs[0].1.spec {
            AggSpec::Percentiles { percents, .. } => {
                assert_eq!(percents.len(), 7);
                assert_eq!(percents[3], 50.0);
            }
            _ => panic!("expected percentiles"),
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = parse(&json!({"x": {"frobnicate": {"field": "f"}}})).unwrap_err();
        assert!(err.to_string().contains("doesn't support type"));
    }

    #[test]
    fn test_two_types_rejected() {
        let err = parse(&json!({
            "x": {"min": {"field": "f"}, "max": {"field": "f"}}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("more than one"));
    }
}
