//! Weather factors a dataset keeps, and how their raw values are converted.

use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// A closed set of value conversions applied to a factor while formatting.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Conversion {
    #[default]
    Identity,
    /// `value * factor`
    LinearScale { factor: f64 },
    /// `value + offset`
    Offset { offset: f64 },
    /// Maps integer codes to values. Codes missing from the table become null.
    LookupTable { table: Vec<(i64, f64)> },
}

impl Conversion {
    pub fn apply(&self, expr: Expr) -> Expr {
        match self {
            Conversion::Identity => expr,
            Conversion::LinearScale { factor } => expr.cast(DataType::Float64) * lit(*factor),
            Conversion::Offset { offset } => expr.cast(DataType::Float64) + lit(*offset),
            Conversion::LookupTable { table } => {
                let code = expr.cast(DataType::Int64);
                table.iter().fold(
                    lit(NULL).cast(DataType::Float64),
                    |otherwise, (from, to)| {
                        when(code.clone().eq(lit(*from)))
                            .then(lit(*to))
                            .otherwise(otherwise)
                    },
                )
            }
        }
    }
}

/// The name a raw factor is stored under, and its conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    pub name: String,
    #[serde(default)]
    pub conversion: Conversion,
}

impl Factor {
    pub fn renamed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            conversion: Conversion::Identity,
        }
    }

    pub fn converted(name: impl Into<String>, conversion: Conversion) -> Self {
        Self {
            name: name.into(),
            conversion,
        }
    }
}
