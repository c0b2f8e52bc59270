//! Query description: value expressions and the parameters that carry them.

pub mod parameter;
pub mod value;

pub use parameter::{Parameter, ParameterKind};
pub use value::{GeoCoordinate, ParameterValue, SpatialFunction};
