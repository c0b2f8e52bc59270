//! Composable value expressions rendered into Solr query fragments.

use std::fmt;

use crate::error::{ExpressError, Result};
use crate::schema::{FieldSelector, ValueKind};

/// Latitude/longitude pair used by spatial filters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoCoordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(ExpressError::invalid(format!(
                "latitude {latitude} outside -90..90"
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(ExpressError::invalid(format!(
                "longitude {longitude} outside -180..180"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

impl fmt::Display for GeoCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

/// Spatial filter function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialFunction {
    /// Exact great-circle distance.
    Geofilt,
    /// Bounding box around the circle (cheaper, less exact).
    Bbox,
}

impl SpatialFunction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Geofilt => "geofilt",
            Self::Bbox => "bbox",
        }
    }
}

/// A value expression. Every variant renders to a deterministic wire fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    /// Matches every document (`*:*`).
    All,
    /// Caller-supplied fragment passed through untouched.
    Free(String),
    /// `<field>:<value>`
    Single { field: FieldSelector, value: String },
    /// `<field>:[<from> TO <to>]`, `*` for the open side.
    Range {
        field: FieldSelector,
        from: Option<String>,
        to: Option<String>,
    },
    /// Bare field reference.
    Field(FieldSelector),
    Spatial {
        function: SpatialFunction,
        field: FieldSelector,
        center: GeoCoordinate,
        distance_km: f64,
    },
}

fn non_blank(what: &str, value: String) -> Result<String> {
    if value.trim().is_empty() {
        Err(ExpressError::invalid(format!("{what} must not be blank")))
    } else {
        Ok(value)
    }
}

impl ParameterValue {
    pub fn all() -> Self {
        Self::All
    }

    pub fn free(value: impl Into<String>) -> Result<Self> {
        Ok(Self::Free(non_blank("free value", value.into())?))
    }

    pub fn single(field: FieldSelector, value: impl ToString) -> Result<Self> {
        Ok(Self::Single {
            field,
            value: non_blank("single value", value.to_string())?,
        })
    }

    /// At least one bound is required.
    pub fn range(field: FieldSelector, from: Option<String>, to: Option<String>) -> Result<Self> {
        let from = from.map(|v| non_blank("range start", v)).transpose()?;
        let to = to.map(|v| non_blank("range end", v)).transpose()?;
        if from.is_none() && to.is_none() {
            return Err(ExpressError::invalid(format!(
                "range on '{}' needs at least one bound",
                field.name()
            )));
        }
        Ok(Self::Range { field, from, to })
    }

    pub fn range_from(field: FieldSelector, from: impl ToString) -> Result<Self> {
        Self::range(field, Some(from.to_string()), None)
    }

    pub fn range_to(field: FieldSelector, to: impl ToString) -> Result<Self> {
        Self::range(field, None, Some(to.to_string()))
    }

    pub fn range_between(
        field: FieldSelector,
        from: impl ToString,
        to: impl ToString,
    ) -> Result<Self> {
        Self::range(field, Some(from.to_string()), Some(to.to_string()))
    }

    pub fn field(field: FieldSelector) -> Self {
        Self::Field(field)
    }

    /// The field must be declared as [`ValueKind::Location`].
    pub fn spatial(
        function: SpatialFunction,
        field: FieldSelector,
        center: GeoCoordinate,
        distance_km: f64,
    ) -> Result<Self> {
        if field.kind() != ValueKind::Location {
            return Err(ExpressError::invalid(format!(
                "spatial filter on '{}' requires a location field, got {}",
                field.name(),
                field.kind()
            )));
        }
        if !distance_km.is_finite() || distance_km <= 0.0 {
            return Err(ExpressError::invalid("spatial distance must be positive"));
        }
        Ok(Self::Spatial {
            function,
            field,
            center,
            distance_km,
        })
    }

    /// Field referenced by this value, if any.
    pub fn selector(&self) -> Option<&FieldSelector> {
        match self {
            Self::All | Self::Free(_) => None,
            Self::Single { field, .. }
            | Self::Range { field, .. }
            | Self::Field(field)
            | Self::Spatial { field, .. } => Some(field),
        }
    }

    /// Render the wire fragment.
    pub fn execute(&self) -> String {
        match self {
            Self::All => "*:*".to_string(),
            Self::Free(value) => value.clone(),
            Self::Single { field, value } => format!("{}:{value}", field.wire_name()),
            Self::Range { field, from, to } => format!(
                "{}:[{} TO {}]",
                field.wire_name(),
                from.as_deref().unwrap_or("*"),
                to.as_deref().unwrap_or("*")
            ),
            Self::Field(field) => field.wire_name().to_string(),
            Self::Spatial {
                function,
                field,
                center,
                distance_km,
            } => format!(
                "{{!{} sfield={} pt={center} d={distance_km}}}",
                function.as_str(),
                field.wire_name()
            ),
        }
    }
}
