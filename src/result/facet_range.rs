//! Facet-range reconstruction.
//!
//! The server only sends each bucket's lower bound plus a single `gap`, and
//! reports documents outside `[start, end)` as bare `before`/`after` counts. This
//! builder rebuilds explicit `[lower, upper)` buckets:
//!
//! 1. the axis type (integer, float, date) is inferred from the first boundary token;
//! 2. the gap is parsed for that axis (numeric literal or date-math expression);
//! 3. every bucket gets `upper = lower + gap`; when the response omits the gap,
//!    inner buckets end at the next lower bound and the last one is extended by
//!    the spacing of the first two (whole months for calendar-aligned dates);
//! 4. an open-below "before" bucket ends at the first lower bound and an
//!    open-above "after" bucket starts at the last upper bound, each kept only
//!    when its count is positive.

use chrono::{DateTime, Datelike, Months, TimeDelta, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::{
    FacetKeyValue, JsonFacetKind, ResultBuilder, count_value, json_buckets, json_facets,
    optional_count, require_object,
};
use crate::error::{ExpressError, Result};
use crate::provider::Protocol;

static GAP_COUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid gap count regex"));

/// One bucket. `minimum: None` is the before bucket, `maximum: None` the after
/// bucket (or any bucket whose gap could not be determined).
///
/// Ordering is by minimum first (absent sorts lowest), then maximum.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct FacetRange<T> {
    pub minimum: Option<T>,
    pub maximum: Option<T>,
}

impl<T> FacetRange<T> {
    pub fn new(minimum: Option<T>, maximum: Option<T>) -> Self {
        Self { minimum, maximum }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeAxis {
    Integer,
    Float,
    Date,
}

/// A reconstructed range facet over one of the supported axis types.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "axis", rename_all = "lowercase")]
pub enum RangeFacet {
    Integer(FacetKeyValue<FacetRange<i64>>),
    Float(FacetKeyValue<FacetRange<f64>>),
    Date(FacetKeyValue<FacetRange<DateTime<Utc>>>),
}

impl RangeFacet {
    pub fn name(&self) -> &str {
        match self {
            Self::Integer(f) => &f.name,
            Self::Float(f) => &f.name,
            Self::Date(f) => &f.name,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Integer(f) => f.len(),
            Self::Float(f) => f.len(),
            Self::Date(f) => f.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn axis(&self) -> RangeAxis {
        match self {
            Self::Integer(_) => RangeAxis::Integer,
            Self::Float(_) => RangeAxis::Float,
            Self::Date(_) => RangeAxis::Date,
        }
    }

    pub fn as_integer(&self) -> Option<&FacetKeyValue<FacetRange<i64>>> {
        match self {
            Self::Integer(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<&FacetKeyValue<FacetRange<f64>>> {
        match self {
            Self::Float(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&FacetKeyValue<FacetRange<DateTime<Utc>>>> {
        match self {
            Self::Date(f) => Some(f),
            _ => None,
        }
    }
}

/// Width of a date bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateGap {
    /// Calendar months (years are twelve months).
    Months(i32),
    /// Fixed-length span (milliseconds through weeks).
    Exact(TimeDelta),
}

#[derive(Debug, Clone, Copy)]
enum DateUnit {
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

/// Checked in order: `MILLI` must win over `SECOND` for "MILLISECOND".
const DATE_UNITS: [(&str, DateUnit); 8] = [
    ("MILLI", DateUnit::Millisecond),
    ("SECOND", DateUnit::Second),
    ("MINUTE", DateUnit::Minute),
    ("HOUR", DateUnit::Hour),
    ("DAY", DateUnit::Day),
    ("WEEK", DateUnit::Week),
    ("MONTH", DateUnit::Month),
    ("YEAR", DateUnit::Year),
];

impl DateGap {
    /// Parse a date-math gap such as `+1DAY`, `+7DAYS` or `+3MONTHS`.
    ///
    /// The unit is matched by substring and scaled by the first number in the
    /// expression (1 when absent).
    pub fn parse(expr: &str) -> Result<Self> {
        let upper = expr.trim().to_ascii_uppercase();
        let bad = || ExpressError::shape(format!("unsupported date gap '{expr}'"));

        let unit = DATE_UNITS
            .iter()
            .find(|(token, _)| upper.contains(token))
            .map(|(_, unit)| *unit)
            .ok_or_else(bad)?;
        let mut count = match GAP_COUNT.find(&upper) {
            Some(m) => m.as_str().parse::<i64>().map_err(|_| bad())?,
            None => 1,
        };
        if upper.starts_with('-') {
            count = -count;
        }

        let gap = match unit {
            DateUnit::Millisecond => TimeDelta::try_milliseconds(count).map(Self::Exact),
            DateUnit::Second => TimeDelta::try_seconds(count).map(Self::Exact),
            DateUnit::Minute => TimeDelta::try_minutes(count).map(Self::Exact),
            DateUnit::Hour => TimeDelta::try_hours(count).map(Self::Exact),
            DateUnit::Day => TimeDelta::try_days(count).map(Self::Exact),
            DateUnit::Week => TimeDelta::try_weeks(count).map(Self::Exact),
            DateUnit::Month => i32::try_from(count).ok().map(Self::Months),
            DateUnit::Year => i32::try_from(count)
                .ok()
                .and_then(|c| c.checked_mul(12))
                .map(Self::Months),
        };
        gap.ok_or_else(bad)
    }

    /// Spacing of two consecutive lower bounds: whole calendar months when `upper`
    /// is `lower` shifted by months (same day and time), else the exact span.
    pub fn between(lower: DateTime<Utc>, upper: DateTime<Utc>) -> Self {
        let months = (upper.year() - lower.year()) * 12 + upper.month() as i32
            - lower.month() as i32;
        if months != 0 && Self::Months(months).add_to(lower).ok() == Some(upper) {
            Self::Months(months)
        } else {
            Self::Exact(upper.signed_duration_since(lower))
        }
    }

    pub fn add_to(&self, lower: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let shifted = match *self {
            Self::Months(m) if m >= 0 => lower.checked_add_months(Months::new(m.unsigned_abs())),
            Self::Months(m) => lower.checked_sub_months(Months::new(m.unsigned_abs())),
            Self::Exact(delta) => lower.checked_add_signed(delta),
        };
        shifted.ok_or_else(|| ExpressError::shape(format!("date bucket {lower} + gap overflows")))
    }
}

fn add_integer(lower: i64, gap: &i64) -> Result<i64> {
    lower
        .checked_add(*gap)
        .ok_or_else(|| ExpressError::shape(format!("integer bucket {lower} + {gap} overflows")))
}

fn add_float(lower: f64, gap: &f64) -> Result<f64> {
    Ok(lower + gap)
}

fn add_date(lower: DateTime<Utc>, gap: &DateGap) -> Result<DateTime<Utc>> {
    gap.add_to(lower)
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn numeric_str(value: &str) -> &str {
    let trimmed = value.trim();
    trimmed.strip_prefix('+').unwrap_or(trimmed)
}

/// Axis of a boundary token: integers, then floats, then dates.
fn infer_axis(token: &Value) -> Result<RangeAxis> {
    match token {
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(RangeAxis::Integer),
        Value::Number(_) => Ok(RangeAxis::Float),
        Value::String(s) if numeric_str(s).parse::<i64>().is_ok() => Ok(RangeAxis::Integer),
        Value::String(s) if numeric_str(s).parse::<f64>().is_ok() => Ok(RangeAxis::Float),
        Value::String(s) if parse_date(s).is_some() => Ok(RangeAxis::Date),
        other => Err(ExpressError::shape(format!(
            "range boundary {other} is not an integer, float or date"
        ))),
    }
}

/// Axis of a facet that returned no buckets, judged by its gap.
fn axis_from_gap(gap: Option<&Value>) -> RangeAxis {
    match gap {
        Some(Value::String(s)) if numeric_str(s).parse::<i64>().is_ok() => RangeAxis::Integer,
        Some(Value::String(s)) if numeric_str(s).parse::<f64>().is_ok() => RangeAxis::Float,
        Some(Value::String(_)) => RangeAxis::Date,
        Some(Value::Number(n)) if !(n.is_i64() || n.is_u64()) => RangeAxis::Float,
        _ => RangeAxis::Integer,
    }
}

fn integer_token(token: &Value) -> Result<i64> {
    match token {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => numeric_str(s).parse().ok(),
        _ => None,
    }
    .ok_or_else(|| ExpressError::shape(format!("{token} is not an integer")))
}

fn float_token(token: &Value) -> Result<f64> {
    match token {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => numeric_str(s).parse().ok(),
        _ => None,
    }
    .ok_or_else(|| ExpressError::shape(format!("{token} is not a float")))
}

fn date_token(token: &Value) -> Result<DateTime<Utc>> {
    token
        .as_str()
        .and_then(parse_date)
        .ok_or_else(|| ExpressError::shape(format!("{token} is not a date")))
}

fn date_gap(token: &Value) -> Result<DateGap> {
    token
        .as_str()
        .ok_or_else(|| ExpressError::shape(format!("date gap {token} is not a string")))
        .and_then(DateGap::parse)
}

/// Raw facet block in protocol-neutral form.
struct RawRange<'a> {
    name: &'a str,
    bounds: Vec<(Value, i64)>,
    gap: Option<&'a Value>,
    before: i64,
    after: i64,
}

fn typed_bounds<T>(raw: &RawRange<'_>, parse: fn(&Value) -> Result<T>) -> Result<Vec<(T, i64)>> {
    raw.bounds
        .iter()
        .map(|(token, count)| Ok((parse(token)?, *count)))
        .collect()
}

/// Gap from the first two lower bounds, for responses that do not echo it.
fn infer_gap<T: Copy, G>(lowers: &[(T, i64)], diff: fn(T, T) -> Option<G>) -> Option<G> {
    match lowers {
        [(first, _), (second, _), ..] => diff(*first, *second),
        _ => None,
    }
}

/// Gap as echoed by the server, or inferred from the bucket spacing.
#[derive(Debug, Clone, Copy)]
enum Gap<G> {
    Declared(G),
    Inferred(G),
}

impl<G> Gap<G> {
    fn value(&self) -> &G {
        match self {
            Self::Declared(g) | Self::Inferred(g) => g,
        }
    }
}

/// With an inferred gap, inner buckets end at the next lower bound and only the
/// last bucket is extended by the gap.
fn assemble<T: Copy + PartialEq, G>(
    name: &str,
    lowers: Vec<(T, i64)>,
    gap: Option<Gap<G>>,
    add: fn(T, &G) -> Result<T>,
    before: i64,
    after: i64,
) -> Result<FacetKeyValue<FacetRange<T>>> {
    let next_lowers: Vec<Option<T>> = lowers
        .iter()
        .skip(1)
        .map(|(lower, _)| Some(*lower))
        .chain(std::iter::once(None))
        .collect();
    let buckets = lowers
        .into_iter()
        .zip(next_lowers)
        .map(|((lower, count), next)| {
            let upper = match (&gap, next) {
                (Some(Gap::Inferred(_)), Some(next)) => Some(next),
                (Some(gap), _) => Some(add(lower, gap.value())?),
                (None, _) => None,
            };
            Ok((FacetRange::new(Some(lower), upper), count))
        })
        .collect::<Result<Vec<_>>>()?;

    let first_lower = buckets.first().and_then(|(r, _)| r.minimum);
    let last_upper = buckets.last().and_then(|(r, _)| r.maximum);

    let mut facet = FacetKeyValue::new(name);
    if before > 0 {
        facet.data.push((FacetRange::new(None, first_lower), before));
    }
    facet.data.extend(buckets);
    if after > 0 {
        facet.data.push((FacetRange::new(last_upper, None), after));
    }
    Ok(facet)
}

fn reconstruct(raw: RawRange<'_>) -> Result<RangeFacet> {
    let axis = match raw.bounds.first() {
        Some((token, _)) => infer_axis(token)?,
        None => axis_from_gap(raw.gap),
    };
    debug!(
        facet = raw.name,
        ?axis,
        buckets = raw.bounds.len(),
        before = raw.before,
        after = raw.after,
        "facet_range_reconstruct"
    );

    let facet = match axis {
        RangeAxis::Integer => {
            let lowers = typed_bounds(&raw, integer_token)?;
            let gap = match raw.gap {
                Some(token) => Some(Gap::Declared(integer_token(token)?)),
                None => infer_gap(&lowers, |a: i64, b: i64| b.checked_sub(a)).map(Gap::Inferred),
            };
            RangeFacet::Integer(assemble(
                raw.name,
                lowers,
                gap,
                add_integer,
                raw.before,
                raw.after,
            )?)
        }
        RangeAxis::Float => {
            let lowers = typed_bounds(&raw, float_token)?;
            let gap = match raw.gap {
                Some(token) => Some(Gap::Declared(float_token(token)?)),
                None => infer_gap(&lowers, |a: f64, b: f64| Some(b - a)).map(Gap::Inferred),
            };
            RangeFacet::Float(assemble(
                raw.name,
                lowers,
                gap,
                add_float,
                raw.before,
                raw.after,
            )?)
        }
        RangeAxis::Date => {
            let lowers = typed_bounds(&raw, date_token)?;
            let gap = match raw.gap {
                Some(token) => Some(Gap::Declared(date_gap(token)?)),
                None => infer_gap(&lowers, |a: DateTime<Utc>, b: DateTime<Utc>| {
                    Some(DateGap::between(a, b))
                })
                .map(Gap::Inferred),
            };
            RangeFacet::Date(assemble(
                raw.name,
                lowers,
                gap,
                add_date,
                raw.before,
                raw.after,
            )?)
        }
    };
    Ok(facet)
}

/// Flat `[bound, count, ...]`, or `{bound: count}` in map layout.
fn classic_bounds(name: &str, counts: &Value) -> Result<Vec<(Value, i64)>> {
    match counts {
        Value::Array(flat) => {
            if flat.len() % 2 != 0 {
                return Err(ExpressError::shape(format!(
                    "facet range '{name}' has an odd number of count entries"
                )));
            }
            flat.chunks_exact(2)
                .map(|pair| Ok((pair[0].clone(), count_value(&pair[1], "bucket count")?)))
                .collect()
        }
        Value::Object(map) => map
            .iter()
            .map(|(bound, count)| {
                Ok((Value::String(bound.clone()), count_value(count, "bucket count")?))
            })
            .collect(),
        other => Err(ExpressError::shape(format!(
            "facet range '{name}' counts are {other}"
        ))),
    }
}

fn classic_range<'a>(name: &'a str, block: &'a Value) -> Result<RawRange<'a>> {
    let block: &Map<String, Value> = block
        .as_object()
        .ok_or_else(|| ExpressError::shape(format!("facet range '{name}' is not an object")))?;
    let counts = block
        .get("counts")
        .ok_or_else(|| ExpressError::shape(format!("facet range '{name}' has no counts")))?;
    let gap = block
        .get("gap")
        .ok_or_else(|| ExpressError::shape(format!("facet range '{name}' has no gap")))?;
    Ok(RawRange {
        name,
        bounds: classic_bounds(name, counts)?,
        gap: Some(gap),
        before: optional_count(block, "before")?,
        after: optional_count(block, "after")?,
    })
}

fn json_range<'a>(name: &'a str, block: &'a Map<String, Value>) -> Result<RawRange<'a>> {
    let bounds = json_buckets(name, block)?
        .into_iter()
        .map(|(val, count)| (val.clone(), count))
        .collect();
    Ok(RawRange {
        name,
        bounds,
        gap: block.get("gap"),
        before: optional_count(block, "before")?,
        after: optional_count(block, "after")?,
    })
}

/// Builds one [`RangeFacet`] per range facet in the response.
#[derive(Debug, Clone, Copy, Default)]
pub struct FacetRangeResultBuilder;

impl ResultBuilder for FacetRangeResultBuilder {
    type Data = Vec<RangeFacet>;

    fn execute(&self, response: &Value, protocol: Protocol) -> Result<Vec<RangeFacet>> {
        match protocol {
            Protocol::Classic => require_object(response, &["facet_counts", "facet_ranges"])?
                .iter()
                .map(|(name, block)| reconstruct(classic_range(name, block)?))
                .collect(),
            Protocol::JsonApi => json_facets(response)?
                .into_iter()
                .filter(|(_, _, kind)| *kind == JsonFacetKind::Range)
                .map(|(name, block, _)| reconstruct(json_range(name, block)?))
                .collect(),
        }
    }
}
