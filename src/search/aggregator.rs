//! Aggregation buckets: consume matches one at a time, then finalize into
//! Elasticsearch-shaped response JSON.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{TimeZone, Utc};
use serde_json::{json, Map, Value};

use crate::dsl::aggs::{AggSpec, Aggregation, MetricKind, RangeBucket};
use crate::index::reader::DocumentMatch;

/// A live aggregation bucket tree. One bucket consumes every match of a
/// search and renders the full `aggregations` response object.
#[derive(Debug)]
pub struct Bucket {
    aggs: Vec<(String, AggState)>,
    consumed: u64,
}

impl Bucket {
    pub fn new(specs: &[(String, Aggregation)]) -> Self {
        Bucket {
            aggs: specs
                .iter()
                .map(|(name, agg)| (name.clone(), AggState::new(agg)))
                .collect(),
            consumed: 0,
        }
    }

    /// Number of matches consumed so far.
    pub fn count(&self) -> u64 {
        self.consumed
    }

    pub fn consume(&mut self, doc: &DocumentMatch) {
        self.consumed += 1;
        for (_, state) in &mut self.aggs {
            state.consume(doc);
        }
    }

    /// Render the response object. `None` when no aggregations were asked.
    pub fn finalize(self) -> Option<Value> {
        if self.aggs.is_empty() {
            return None;
        }
        let mut out = Map::new();
        for (name, state) in self.aggs {
            out.insert(name, state.finalize());
        }
        Some(Value::Object(out))
    }
}

#[derive(Debug)]
enum AggState {
    Terms {
        field: String,
        size: usize,
        subs: Vec<(String, Aggregation)>,
        buckets: HashMap<String, (u64, Bucket)>,
    },
    Range {
        field: String,
        date: bool,
        ranges: Vec<RangeBucket>,
        buckets: Vec<(u64, Bucket)>,
        subs: Vec<(String, Aggregation)>,
    },
    Histogram {
        field: String,
        interval: f64,
        offset: f64,
        subs: Vec<(String, Aggregation)>,
        buckets: BTreeMap<i64, (u64, Bucket)>,
    },
    DateHistogram {
        field: String,
        interval: Option<i64>,
        target_buckets: usize,
        subs: Vec<(String, Aggregation)>,
        fixed: BTreeMap<i64, (u64, Bucket)>,
        /// Raw values buffered while the interval is still unknown.
        raw: Vec<(i64, DocumentMatch)>,
    },
    Metric {
        kind: MetricKind,
        field: String,
        count: u64,
        sum: f64,
        min: f64,
        max: f64,
    },
    Cardinality {
        field: String,
        seen: HashSet<String>,
    },
    Percentiles {
        field: String,
        percents: Vec<f64>,
        values: Vec<f64>,
    },
    Stats {
        field: String,
        count: u64,
        sum: f64,
        min: f64,
        max: f64,
    },
}

impl AggState {
    fn new(agg: &Aggregation) -> Self {
        match &agg.spec {
            AggSpec::Terms { field, size } => AggState::Terms {
                field: field.clone(),
                size: *size,
                subs: agg.subs.clone(),
                buckets: HashMap::new(),
            },
            AggSpec::Range { field, ranges } => AggState::Range {
                field: field.clone(),
                date: false,
                buckets: ranges.iter().map(|_| (0, Bucket::new(&agg.subs))).collect(),
                ranges: ranges.clone(),
                subs: agg.subs.clone(),
            },
            AggSpec::DateRange { field, ranges } => AggState::Range {
                field: field.clone(),
                date: true,
                buckets: ranges.iter().map(|_| (0, Bucket::new(&agg.subs))).collect(),
                ranges: ranges.clone(),
                subs: agg.subs.clone(),
            },
            AggSpec::Histogram {
                field,
                interval,
                offset,
            } => AggState::Histogram {
                field: field.clone(),
                interval: *interval,
                offset: *offset,
                subs: agg.subs.clone(),
                buckets: BTreeMap::new(),
            },
            AggSpec::DateHistogram {
                field,
                interval,
                buckets,
            } => AggState::DateHistogram {
                field: field.clone(),
                interval: *interval,
                target_buckets: *buckets,
                subs: agg.subs.clone(),
                fixed: BTreeMap::new(),
                raw: Vec::new(),
            },
            AggSpec::Metric { kind, field } => AggState::Metric {
                kind: *kind,
                field: field.clone(),
                count: 0,
                sum: 0.0,
                min: f64::INFINITY,
                max: f64::NEG_INFINITY,
            },
            AggSpec::Cardinality { field } => AggState::Cardinality {
                field: field.clone(),
                seen: HashSet::new(),
            },
            AggSpec::Percentiles { field, percents } => AggState::Percentiles {
                field: field.clone(),
                percents: percents.clone(),
                values: Vec::new(),
            },
            AggSpec::Stats { field } => AggState::Stats {
                field: field.clone(),
                count: 0,
                sum: 0.0,
                min: f64::INFINITY,
                max: f64::NEG_INFINITY,
            },
        }
    }

    fn consume(&mut self, doc: &DocumentMatch) {
        match self {
            AggState::Terms {
                field,
                subs,
                buckets,
                ..
            } => {
                let Some(values) = doc.values(field) else { return };
                for value in values {
                    let key = value.to_display();
                    let entry = buckets
                        .entry(key)
                        .or_insert_with(|| (0, Bucket::new(subs)));
                    entry.0 += 1;
                    entry.1.consume(doc);
                }
            }
            AggState::Range {
                field,
                ranges,
                buckets,
                ..
            } => {
                let Some(values) = doc.values(field) else { return };
                let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
                for (i, range) in ranges.iter().enumerate() {
                    let hit = numbers.iter().any(|n| {
                        range.from.map_or(true, |from| *n >= from)
                            && range.to.map_or(true, |to| *n < to)
                    });
                    if hit {
                        buckets[i].0 += 1;
                        buckets[i].1.consume(doc);
                    }
                }
            }
            AggState::Histogram {
                field,
                interval,
                offset,
                subs,
                buckets,
            } => {
                let Some(values) = doc.values(field) else { return };
                for n in values.iter().filter_map(|v| v.as_f64()) {
                    let slot = ((n - *offset) / *interval).floor() as i64;
                    let entry = buckets
                        .entry(slot)
                        .or_insert_with(|| (0, Bucket::new(subs)));
                    entry.0 += 1;
                    entry.1.consume(doc);
                }
            }
            AggState::DateHistogram {
                field,
                interval,
                subs,
                fixed,
                raw,
                ..
            } => {
                let Some(values) = doc.values(field) else { return };
                for millis in values.iter().filter_map(|v| v.as_f64()).map(|n| n as i64) {
                    match interval {
                        Some(step) => {
                            let slot = millis.div_euclid(*step);
                            let entry = fixed
                                .entry(slot)
                                .or_insert_with(|| (0, Bucket::new(subs)));
                            entry.0 += 1;
                            entry.1.consume(doc);
                        }
                        None => raw.push((millis, doc.clone())),
                    }
                }
            }
            AggState::Metric { field, count, sum, min, max, .. }
            | AggState::Stats { field, count, sum, min, max } => {
                let Some(values) = doc.values(field) else { return };
                for n in values.iter().filter_map(|v| v.as_f64()) {
                    *count += 1;
                    *sum += n;
                    if n < *min {
                        *min = n;
                    }
                    if n > *max {
                        *max = n;
                    }
                }
            }
            AggState::Cardinality { field, seen } => {
                let Some(values) = doc.values(field) else { return };
                for value in values {
                    seen.insert(value.to_display());
                }
            }
            AggState::Percentiles { field, values, .. } => {
                let Some(doc_values) = doc.values(field) else {
                    return;
                };
                values.extend(doc_values.iter().filter_map(|v| v.as_f64()));
            }
        }
    }

    fn finalize(self) -> Value {
        match self {
            AggState::Terms { size, buckets, .. } => {
                let mut entries: Vec<(String, u64, Bucket)> = buckets
                    .into_iter()
                    .map(|(key, (count, bucket))| (key, count, bucket))
                    .collect();
                // Highest count first; ties alphabetical for determinism.
                entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                entries.truncate(size);

                let buckets: Vec<Value> = entries
                    .into_iter()
                    .map(|(key, count, bucket)| {
                        let mut obj = json!({"key": key, "doc_count": count});
                        merge_subs(&mut obj, bucket);
                        obj
                    })
                    .collect();
                json!({ "buckets": buckets })
            }
            AggState::Range {
                date,
                ranges,
                buckets,
                ..
            } => {
                let rendered: Vec<Value> = ranges
                    .iter()
                    .zip(buckets)
                    .map(|(range, (count, bucket))| {
                        let key = range.key.clone().unwrap_or_else(|| {
                            format!(
                                "{}-{}",
                                bound_label(range.from, date),
                                bound_label(range.to, date)
                            )
                        });
                        let mut obj = json!({"key": key, "doc_count": count});
                        if let Some(from) = range.from {
                            obj["from"] = json!(from);
                        }
                        if let Some(to) = range.to {
                            obj["to"] = json!(to);
                        }
                        merge_subs(&mut obj, bucket);
                        obj
                    })
                    .collect();
                json!({ "buckets": rendered })
            }
            AggState::Histogram {
                interval,
                offset,
                buckets,
                ..
            } => {
                let rendered: Vec<Value> = buckets
                    .into_iter()
                    .map(|(slot, (count, bucket))| {
                        let key = slot as f64 * interval + offset;
                        let mut obj = json!({"key": key, "doc_count": count});
                        merge_subs(&mut obj, bucket);
                        obj
                    })
                    .collect();
                json!({ "buckets": rendered })
            }
            AggState::DateHistogram {
                interval,
                target_buckets,
                subs,
                mut fixed,
                raw,
                ..
            } => {
                // Auto-interval: choose a step from the observed range,
                // then replay the buffered matches.
                if interval.is_none() && !raw.is_empty() {
                    let min = raw.iter().map(|(m, _)| *m).min().expect("non-empty");
                    let max = raw.iter().map(|(m, _)| *m).max().expect("non-empty");
                    let step = auto_interval(min, max, target_buckets);
                    for (millis, doc) in &raw {
                        let slot = millis.div_euclid(step);
                        let entry = fixed
                            .entry(slot)
                            .or_insert_with(|| (0, Bucket::new(&subs)));
                        entry.0 += 1;
                        entry.1.consume(doc);
                    }
                    return render_date_buckets(fixed, step);
                }
                render_date_buckets(fixed, interval.unwrap_or(1))
            }
            AggState::Metric {
                kind,
                count,
                sum,
                min,
                max,
                ..
            } => {
                let value = match kind {
                    MetricKind::Count => count as f64,
                    MetricKind::Sum => sum,
                    MetricKind::Avg if count > 0 => sum / count as f64,
                    MetricKind::Min if count > 0 => min,
                    MetricKind::Max if count > 0 => max,
                    _ => 0.0,
                };
                json!({ "value": value })
            }
            AggState::Cardinality { seen, .. } => json!({ "value": seen.len() }),
            AggState::Percentiles {
                percents,
                mut values,
                ..
            } => {
                values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                let mut out = Map::new();
                for p in percents {
                    out.insert(format!("{p}"), json!(percentile(&values, p)));
                }
                json!({ "values": out })
            }
            AggState::Stats {
                count,
                sum,
                min,
                max,
                ..
            } => {
                if count == 0 {
                    json!({"count": 0, "min": null, "max": null, "avg": null, "sum": 0.0})
                } else {
                    json!({
                        "count": count,
                        "min": min,
                        "max": max,
                        "avg": sum / count as f64,
                        "sum": sum,
                    })
                }
            }
        }
    }
}

fn merge_subs(obj: &mut Value, bucket: Bucket) {
    if let Some(Value::Object(subs)) = bucket.finalize() {
        if let Value::Object(map) = obj {
            for (name, value) in subs {
                map.insert(name, value);
            }
        }
    }
}

fn render_date_buckets(buckets: BTreeMap<i64, (u64, Bucket)>, step: i64) -> Value {
    let rendered: Vec<Value> = buckets
        .into_iter()
        .map(|(slot, (count, bucket))| {
            let key = slot * step;
            let mut obj = json!({
                "key": key,
                "key_as_string": millis_to_rfc3339(key),
                "doc_count": count,
            });
            merge_subs(&mut obj, bucket);
            obj
        })
        .collect();
    json!({ "buckets": rendered })
}

fn millis_to_rfc3339(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}

fn bound_label(bound: Option<f64>, date: bool) -> String {
    match bound {
        None => "*".to_string(),
        Some(n) if date => millis_to_rfc3339(n as i64),
        Some(n) => format!("{n}"),
    }
}

/// Pick a rounded step so the observed span yields roughly `target` buckets.
fn auto_interval(min: i64, max: i64, target: usize) -> i64 {
    const STEPS: [i64; 12] = [
        1000,
        5_000,
        30_000,
        60_000,
        300_000,
        1_800_000,
        3_600_000,
        10_800_000,
        43_200_000,
        86_400_000,
        604_800_000,
        2_592_000_000,
    ];
    let span = (max - min).max(1);
    let raw = span / target.max(1) as i64;
    for step in STEPS {
        if raw <= step {
            return step;
        }
    }
    *STEPS.last().expect("non-empty")
}

/// Linear interpolation percentile over sorted values.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    if low == high {
        return sorted[low];
    }
    let weight = rank - low as f64;
    sorted[low] * (1.0 - weight) + sorted[high] * weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Analyzer;
    use crate::dsl::aggs;
    use crate::index::field::{Document, Field};
    use crate::index::reader::IndexReader;
    use crate::index::{IndexQuery, Segment};
    use serde_json::json;
    use std::sync::Arc;

    fn matches_for(docs: &[(&str, &str, f64)]) -> Vec<DocumentMatch> {
        let analyzer = Analyzer::standard();
        let mut segment = Segment::new();
        for (id, city, year) in docs {
            let mut doc = Document::new(*id);
            doc.add_field(Field::text("City", city, &analyzer).unwrap());
            doc.add_field(Field::numeric("Year", *year));
            segment.insert(doc);
        }
        IndexReader::new(Arc::new(segment))
            .matches(&IndexQuery::MatchAll, &vec![])
            .unwrap()
    }

    fn run(aggs_body: serde_json::Value, docs: &[(&str, &str, f64)]) -> Value {
        let specs = aggs::parse(&aggs_body).unwrap();
        let mut bucket = Bucket::new(&specs);
        for m in matches_for(docs) {
            bucket.consume(&m);
        }
        bucket.finalize().unwrap()
    }

    #[test]
    fn test_terms_buckets() {
        let out = run(
            json!({"by_city": {"terms": {"field": "City"}}}),
            &[("1", "turin", 2006.0), ("2", "turin", 2006.0), ("3", "athens", 2004.0)],
        );

        let buckets = out["by_city"]["buckets"].as_array().unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0]["key"], "turin");
        assert_eq!(buckets[0]["doc_count"], 2);
    }

    #[test]
    fn test_metrics() {
        let out = run(
            json!({
                "max_year": {"max": {"field": "Year"}},
                "avg_year": {"avg": {"field": "Year"}},
                "n": {"count": {"field": "Year"}}
            }),
            &[("1", "a", 2000.0), ("2", "b", 2010.0)],
        );

        assert_eq!(out["max_year"]["value"], 2010.0);
        assert_eq!(out["avg_year"]["value"], 2005.0);
        assert_eq!(out["n"]["value"], 2.0);
    }

    #[test]
    fn test_nested_terms_with_metric() {
        let out = run(
            json!({
                "by_city": {
                    "terms": {"field": "City"},
                    "aggs": {"max_year": {"max": {"field": "Year"}}}
                }
            }),
            &[("1", "turin", 2006.0), ("2", "turin", 2010.0)],
        );

        let bucket = &out["by_city"]["buckets"][0];
        assert_eq!(bucket["max_year"]["value"], 2010.0);
    }

    #[test]
    fn test_range_buckets_half_open() {
        let out = run(
            json!({
                "years": {"range": {"field": "Year", "ranges": [
                    {"from": 2000, "to": 2006},
                    {"from": 2006}
                ]}}
            }),
            &[("1", "a", 2004.0), ("2", "b", 2006.0), ("3", "c", 2010.0)],
        );

        let buckets = out["years"]["buckets"].as_array().unwrap();
        assert_eq!(buckets[0]["doc_count"], 1);
        assert_eq!(buckets[1]["doc_count"], 2);
    }

    #[test]
    fn test_cardinality_and_stats() {
        let out = run(
            json!({
                "cities": {"cardinality": {"field": "City"}},
                "stats": {"stats": {"field": "Year"}}
            }),
            &[("1", "turin", 2006.0), ("2", "turin", 2004.0)],
        );

        assert_eq!(out["cities"]["value"], 1);
        assert_eq!(out["stats"]["count"], 2);
        assert_eq!(out["stats"]["min"], 2004.0);
    }

    #[test]
    fn test_percentile_interpolation() {
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0], 50.0), 2.5);
        assert_eq!(percentile(&[10.0], 99.0), 10.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }
}
