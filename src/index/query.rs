//! Primitive query tree and its evaluation against a segment.
//!
//! Scoring is BM25 (k1 = 1.2, b = 0.75). Multi-term expansions (prefix,
//! wildcard, regexp, fuzzy) union the per-term scores.

use ahash::AHashMap;
use regex::Regex;

use crate::error::{GalenaError, Result};
use crate::index::segment::{PostingList, Segment};

const K1: f64 = 1.2;
const B: f64 = 0.75;

/// Cap on dictionary expansions for multi-term queries.
const MAX_EXPANSIONS: usize = 128;

/// A geographic point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Primitive query node understood by the index layer.
#[derive(Debug, Clone)]
pub enum IndexQuery {
    MatchAll,
    MatchNone,
    Term {
        field: String,
        value: String,
    },
    Phrase {
        field: String,
        terms: Vec<String>,
    },
    PhrasePrefix {
        field: String,
        terms: Vec<String>,
    },
    Prefix {
        field: String,
        value: String,
    },
    Wildcard {
        field: String,
        pattern: String,
    },
    Regexp {
        field: String,
        pattern: String,
    },
    Fuzzy {
        field: String,
        value: String,
        fuzziness: u32,
        prefix_length: usize,
    },
    NumericRange {
        field: String,
        min: Option<f64>,
        max: Option<f64>,
        min_inclusive: bool,
        max_inclusive: bool,
    },
    TimeRange {
        field: String,
        min: Option<i64>,
        max: Option<i64>,
        min_inclusive: bool,
        max_inclusive: bool,
    },
    Exists {
        field: String,
    },
    TermsSet {
        field: String,
        terms: Vec<String>,
        min_match_field: String,
    },
    Bool {
        must: Vec<IndexQuery>,
        should: Vec<IndexQuery>,
        must_not: Vec<IndexQuery>,
        filter: Vec<IndexQuery>,
        minimum_should_match: u32,
    },
    Boosting {
        positive: Box<IndexQuery>,
        negative: Box<IndexQuery>,
        negative_boost: f32,
    },
    Boost {
        query: Box<IndexQuery>,
        boost: f32,
    },
    GeoBoundingBox {
        field: String,
        top_left: GeoPoint,
        bottom_right: GeoPoint,
    },
    GeoDistance {
        field: String,
        center: GeoPoint,
        distance_meters: f64,
    },
    GeoPolygon {
        field: String,
        points: Vec<GeoPoint>,
    },
}

/// Evaluate a query against a segment, producing ordinal → score.
pub fn execute(segment: &Segment, query: &IndexQuery) -> Result<AHashMap<u32, f32>> {
    match query {
        IndexQuery::MatchAll => Ok(all_docs(segment)),
        IndexQuery::MatchNone => Ok(AHashMap::new()),
        IndexQuery::Term { field, value } => Ok(score_term(segment, field, value)),
        IndexQuery::Phrase { field, terms } => Ok(score_phrase(segment, field, terms)),
        IndexQuery::PhrasePrefix { field, terms } => {
            let Some((last, head)) = terms.split_last() else {
                return Ok(AHashMap::new());
            };
            let expansions = expand_prefix(segment, field, last);
            let mut out = AHashMap::new();
            for expansion in expansions {
                let mut phrase: Vec<String> = head.to_vec();
                phrase.push(expansion);
                merge_max(&mut out, score_phrase(segment, field, &phrase));
            }
            Ok(out)
        }
        IndexQuery::Prefix { field, value } => {
            let terms = expand_prefix(segment, field, value);
            Ok(score_terms_union(segment, field, &terms))
        }
        IndexQuery::Wildcard { field, pattern } => {
            let regex = wildcard_to_regex(pattern)?;
            let terms = expand_regex(segment, field, &regex);
            Ok(score_terms_union(segment, field, &terms))
        }
        IndexQuery::Regexp { field, pattern } => {
            let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
                GalenaError::parsing(format!("[regexp] pattern is invalid: {e}"))
            })?;
            let terms = expand_regex(segment, field, &regex);
            Ok(score_terms_union(segment, field, &terms))
        }
        IndexQuery::Fuzzy {
            field,
            value,
            fuzziness,
            prefix_length,
        } => {
            let terms = expand_fuzzy(segment, field, value, *fuzziness, *prefix_length);
            Ok(score_terms_union(segment, field, &terms))
        }
        IndexQuery::NumericRange {
            field,
            min,
            max,
            min_inclusive,
            max_inclusive,
        } => Ok(scan_values(segment, field, |v| {
            let Some(n) = v.as_f64() else { return false };
            in_bounds(n, *min, *max, *min_inclusive, *max_inclusive)
        })),
        IndexQuery::TimeRange {
            field,
            min,
            max,
            min_inclusive,
            max_inclusive,
        } => Ok(scan_values(segment, field, |v| {
            let Some(n) = v.as_f64() else { return false };
            in_bounds(
                n,
                min.map(|m| m as f64),
                max.map(|m| m as f64),
                *min_inclusive,
                *max_inclusive,
            )
        })),
        IndexQuery::Exists { field } => Ok(scan_docs(segment, |doc| {
            doc.values.get(field).is_some_and(|v| !v.is_empty())
        })),
        IndexQuery::TermsSet {
            field,
            terms,
            min_match_field,
        } => Ok(score_terms_set(segment, field, terms, min_match_field)),
        IndexQuery::Bool {
            must,
            should,
            must_not,
            filter,
            minimum_should_match,
        } => execute_bool(segment, must, should, must_not, filter, *minimum_should_match),
        IndexQuery::Boosting {
            positive,
            negative,
            negative_boost,
        } => {
            let mut scores = execute(segment, positive)?;
            let demoted = execute(segment, negative)?;
            for (ord, score) in scores.iter_mut() {
                if demoted.contains_key(ord) {
                    *score *= negative_boost;
                }
            }
            Ok(scores)
        }
        IndexQuery::Boost { query, boost } => {
            let mut scores = execute(segment, query)?;
            for score in scores.values_mut() {
                *score *= boost;
            }
            Ok(scores)
        }
        IndexQuery::GeoBoundingBox {
            field,
            top_left,
            bottom_right,
        } => Ok(scan_geo(segment, field, |p| {
            p.lat <= top_left.lat
                && p.lat >= bottom_right.lat
                && p.lon >= top_left.lon
                && p.lon <= bottom_right.lon
        })),
        IndexQuery::GeoDistance {
            field,
            center,
            distance_meters,
        } => Ok(scan_geo(segment, field, |p| {
            haversine_meters(*center, p) <= *distance_meters
        })),
        IndexQuery::GeoPolygon { field, points } => {
            if points.len() < 3 {
                return Err(GalenaError::parsing(
                    "[geo_polygon] requires at least three points",
                ));
            }
            let points = points.clone();
            Ok(scan_geo(segment, field, move |p| {
                point_in_polygon(p, &points)
            }))
        }
    }
}

fn execute_bool(
    segment: &Segment,
    must: &[IndexQuery],
    should: &[IndexQuery],
    must_not: &[IndexQuery],
    filter: &[IndexQuery],
    minimum_should_match: u32,
) -> Result<AHashMap<u32, f32>> {
    // Base candidates: intersection of must clauses, else should union,
    // else every live doc (filter-only or empty bool).
    let mut scores: AHashMap<u32, f32>;
    let mut should_counts: AHashMap<u32, u32> = AHashMap::new();
    let mut should_scores: AHashMap<u32, f32> = AHashMap::new();

    for clause in should {
        let clause_scores = execute(segment, clause)?;
        for (ord, score) in clause_scores {
            *should_counts.entry(ord).or_default() += 1;
            *should_scores.entry(ord).or_default() += score;
        }
    }

    if !must.is_empty() {
        let mut iter = must.iter();
        scores = execute(segment, iter.next().expect("non-empty"))?;
        for clause in iter {
            let clause_scores = execute(segment, clause)?;
            scores.retain(|ord, _| clause_scores.contains_key(ord));
            for (ord, score) in scores.iter_mut() {
                *score += clause_scores.get(ord).copied().unwrap_or(0.0);
            }
        }
        // In the presence of must, should clauses only contribute score,
        // unless a minimum is demanded.
        let min = minimum_should_match;
        if min > 0 {
            scores.retain(|ord, _| should_counts.get(ord).copied().unwrap_or(0) >= min);
        }
        for (ord, score) in scores.iter_mut() {
            *score += should_scores.get(ord).copied().unwrap_or(0.0);
        }
    } else if !should.is_empty() {
        let min = minimum_should_match.max(1);
        scores = should_scores
            .into_iter()
            .filter(|(ord, _)| should_counts.get(ord).copied().unwrap_or(0) >= min)
            .collect();
    } else {
        scores = all_docs(segment);
    }

    // Filter context: restricts candidates without contributing score.
    for clause in filter {
        let clause_scores = execute(segment, clause)?;
        scores.retain(|ord, _| clause_scores.contains_key(ord));
    }

    for clause in must_not {
        let excluded = execute(segment, clause)?;
        scores.retain(|ord, _| !excluded.contains_key(ord));
    }

    Ok(scores)
}

fn all_docs(segment: &Segment) -> AHashMap<u32, f32> {
    (0..segment.docs.len() as u32)
        .filter(|ord| segment.doc(*ord).is_some())
        .map(|ord| (ord, 1.0))
        .collect()
}

fn scan_docs<F>(segment: &Segment, predicate: F) -> AHashMap<u32, f32>
where
    F: Fn(&crate::index::segment::StoredDoc) -> bool,
{
    (0..segment.docs.len() as u32)
        .filter_map(|ord| segment.doc(ord).map(|doc| (ord, doc)))
        .filter(|(_, doc)| predicate(doc))
        .map(|(ord, _)| (ord, 1.0))
        .collect()
}

fn scan_values<F>(segment: &Segment, field: &str, predicate: F) -> AHashMap<u32, f32>
where
    F: Fn(&crate::index::segment::DocValue) -> bool,
{
    scan_docs(segment, |doc| {
        doc.values
            .get(field)
            .is_some_and(|values| values.iter().any(&predicate))
    })
}

fn scan_geo<F>(segment: &Segment, field: &str, predicate: F) -> AHashMap<u32, f32>
where
    F: Fn(GeoPoint) -> bool,
{
    scan_docs(segment, |doc| {
        doc.values.get(field).is_some_and(|values| {
            values
                .iter()
                .filter_map(|v| parse_geo_value(&v.to_display()))
                .any(&predicate)
        })
    })
}

/// Parse a `"lat,lon"` doc value into a point.
fn parse_geo_value(raw: &str) -> Option<GeoPoint> {
    let (lat, lon) = raw.split_once(',')?;
    Some(GeoPoint {
        lat: lat.trim().parse().ok()?,
        lon: lon.trim().parse().ok()?,
    })
}

fn in_bounds(
    n: f64,
    min: Option<f64>,
    max: Option<f64>,
    min_inclusive: bool,
    max_inclusive: bool,
) -> bool {
    if let Some(min) = min {
        if min_inclusive {
            if n < min {
                return false;
            }
        } else if n <= min {
            return false;
        }
    }
    if let Some(max) = max {
        if max_inclusive {
            if n > max {
                return false;
            }
        } else if n >= max {
            return false;
        }
    }
    true
}

fn score_term(segment: &Segment, field: &str, term: &str) -> AHashMap<u32, f32> {
    let mut out = AHashMap::new();
    if let Some(posting) = segment.posting(field, term) {
        score_posting(segment, field, posting, &mut out);
    }
    out
}

fn score_terms_union(segment: &Segment, field: &str, terms: &[String]) -> AHashMap<u32, f32> {
    let mut out = AHashMap::new();
    for term in terms {
        if let Some(posting) = segment.posting(field, term) {
            score_posting(segment, field, posting, &mut out);
        }
    }
    out
}

/// Fold one posting list into the score map with BM25 term scores.
fn score_posting(
    segment: &Segment,
    field: &str,
    posting: &PostingList,
    out: &mut AHashMap<u32, f32>,
) {
    let n = segment.live_docs() as f64;
    let df = posting.docs.len() as f64;
    let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln().max(0.0);
    let avg_len = segment.avg_field_len(field).max(1.0);

    for (i, &ord) in posting.docs.iter().enumerate() {
        let Some(doc) = segment.doc(ord) else { continue };
        let freq = posting.freqs[i] as f64;
        let len = *doc.lens.get(field).unwrap_or(&1) as f64;
        let tf = freq * (K1 + 1.0) / (freq + K1 * (1.0 - B + B * len / avg_len));
        *out.entry(ord).or_default() += (idf * tf) as f32;
    }
}

fn score_phrase(segment: &Segment, field: &str, terms: &[String]) -> AHashMap<u32, f32> {
    let mut out = AHashMap::new();
    if terms.is_empty() {
        return out;
    }
    if terms.len() == 1 {
        return score_term(segment, field, &terms[0]);
    }

    let postings: Option<Vec<&PostingList>> = terms
        .iter()
        .map(|t| segment.posting(field, t))
        .collect();
    let Some(postings) = postings else { return out };

    let mut term_scores = AHashMap::new();
    for posting in &postings {
        score_posting(segment, field, posting, &mut term_scores);
    }

    // Candidates must appear in every term's posting list.
    let first = postings[0];
    'docs: for (i, &ord) in first.docs.iter().enumerate() {
        if segment.doc(ord).is_none() {
            continue;
        }
        let mut position_lists: Vec<&[u32]> = Vec::with_capacity(postings.len());
        position_lists.push(&first.positions[i]);
        for posting in &postings[1..] {
            match posting.docs.binary_search(&ord) {
                Ok(idx) => position_lists.push(&posting.positions[idx]),
                Err(_) => continue 'docs,
            }
        }
        // Look for consecutive positions across the chain.
        let matched = position_lists[0].iter().any(|&start| {
            position_lists[1..]
                .iter()
                .enumerate()
                .all(|(offset, positions)| {
                    positions.binary_search(&(start + offset as u32 + 1)).is_ok()
                })
        });
        if matched {
            let score = term_scores.get(&ord).copied().unwrap_or(1.0);
            out.insert(ord, score);
        }
    }
    out
}

fn score_terms_set(
    segment: &Segment,
    field: &str,
    terms: &[String],
    min_match_field: &str,
) -> AHashMap<u32, f32> {
    let mut counts: AHashMap<u32, u32> = AHashMap::new();
    let mut scores: AHashMap<u32, f32> = AHashMap::new();
    for term in terms {
        if let Some(posting) = segment.posting(field, term) {
            for &ord in &posting.docs {
                *counts.entry(ord).or_default() += 1;
            }
            score_posting(segment, field, posting, &mut scores);
        }
    }

    scores.retain(|ord, _| {
        let Some(doc) = segment.doc(*ord) else {
            return false;
        };
        let required = doc
            .values
            .get(min_match_field)
            .and_then(|values| values.first())
            .and_then(|v| v.as_f64())
            .unwrap_or(1.0) as u32;
        counts.get(ord).copied().unwrap_or(0) >= required
    });
    scores
}

fn expand_prefix(segment: &Segment, field: &str, prefix: &str) -> Vec<String> {
    let Some(terms) = segment.terms(field) else {
        return Vec::new();
    };
    terms
        .range(prefix.to_string()..)
        .take_while(|(term, _)| term.starts_with(prefix))
        .take(MAX_EXPANSIONS)
        .map(|(term, _)| term.clone())
        .collect()
}

fn expand_regex(segment: &Segment, field: &str, regex: &Regex) -> Vec<String> {
    let Some(terms) = segment.terms(field) else {
        return Vec::new();
    };
    terms
        .keys()
        .filter(|term| regex.is_match(term))
        .take(MAX_EXPANSIONS)
        .cloned()
        .collect()
}

fn expand_fuzzy(
    segment: &Segment,
    field: &str,
    value: &str,
    fuzziness: u32,
    prefix_length: usize,
) -> Vec<String> {
    let Some(terms) = segment.terms(field) else {
        return Vec::new();
    };
    let prefix: String = value.chars().take(prefix_length).collect();
    terms
        .keys()
        .filter(|term| term.starts_with(&prefix))
        .filter(|term| levenshtein(value, term) <= fuzziness as usize)
        .take(MAX_EXPANSIONS)
        .cloned()
        .collect()
}

/// Translate a wildcard pattern (`*`, `?`) into an anchored regex.
fn wildcard_to_regex(pattern: &str) -> Result<Regex> {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    Regex::new(&out)
        .map_err(|e| GalenaError::parsing(format!("[wildcard] pattern is invalid: {e}")))
}

/// Levenshtein edit distance with a standard two-row DP.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            cur[j + 1] = (prev[j + 1] + 1).min(cur[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

fn merge_max(target: &mut AHashMap<u32, f32>, other: AHashMap<u32, f32>) {
    for (ord, score) in other {
        let entry = target.entry(ord).or_insert(score);
        if score > *entry {
            *entry = score;
        }
    }
}

/// Great-circle distance between two points, in meters.
fn haversine_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Ray-casting point-in-polygon test.
fn point_in_polygon(p: GeoPoint, polygon: &[GeoPoint]) -> bool {
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (pi, pj) = (polygon[i], polygon[j]);
        if ((pi.lat > p.lat) != (pj.lat > p.lat))
            && (p.lon < (pj.lon - pi.lon) * (p.lat - pi.lat) / (pj.lat - pi.lat) + pi.lon)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}
