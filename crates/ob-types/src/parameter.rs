//! Parameter, objective and metric declarations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{ObError, ObResult};
use crate::{config_error, validation_error};

/// Storage type of a varying parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    Float32,
    Float64,
    Int32,
    Int64,
    Uint64,
    Bool,
    Str,
}

impl Dtype {
    /// Single-character kind code: `f`, `i`, `u`, `b` or `U`.
    pub fn kind(&self) -> char {
        match self {
            Dtype::Float32 | Dtype::Float64 => 'f',
            Dtype::Int32 | Dtype::Int64 => 'i',
            Dtype::Uint64 => 'u',
            Dtype::Bool => 'b',
            Dtype::Str => 'U',
        }
    }
}

impl Default for Dtype {
    fn default() -> Self {
        Dtype::Float64
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dtype::Float32 => "float32",
            Dtype::Float64 => "float64",
            Dtype::Int32 => "int32",
            Dtype::Int64 => "int64",
            Dtype::Uint64 => "uint64",
            Dtype::Bool => "bool",
            Dtype::Str => "str",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Dtype {
    type Err = ObError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "float" | "float64" | "f64" | "double" => Ok(Dtype::Float64),
            "float32" | "f32" => Ok(Dtype::Float32),
            "int" | "int64" | "i64" => Ok(Dtype::Int64),
            "int32" | "i32" => Ok(Dtype::Int32),
            "uint" | "uint64" | "u64" => Ok(Dtype::Uint64),
            "bool" => Ok(Dtype::Bool),
            "str" | "string" => Ok(Dtype::Str),
            other => Err(config_error!("unrecognised dtype '{other}'")),
        }
    }
}

/// A concrete parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
}

impl ParameterValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Int(v) => *v as f64,
            Self::Float(v) => *v,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

/// An input parameter explored by the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaryingParameter {
    pub name: String,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub dtype: Dtype,
    pub is_fixed: bool,
    /// Value used while the parameter is fixed.
    pub default_value: Option<f64>,
    pub is_fidelity: bool,
    pub fidelity_target_value: Option<f64>,
}

impl VaryingParameter {
    pub fn new(name: impl Into<String>, lower_bound: f64, upper_bound: f64) -> ObResult<Self> {
        let name = name.into();
        check_bounds(&name, lower_bound, upper_bound)?;
        Ok(Self {
            name,
            lower_bound,
            upper_bound,
            dtype: Dtype::Float64,
            is_fixed: false,
            default_value: None,
            is_fidelity: false,
            fidelity_target_value: None,
        })
    }

    pub fn with_dtype(mut self, dtype: Dtype) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn with_default_value(mut self, value: f64) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Mark the parameter as a fidelity with the given target value.
    pub fn with_fidelity(mut self, target_value: f64) -> Self {
        self.is_fidelity = true;
        self.fidelity_target_value = Some(target_value);
        self
    }

    /// Pin the parameter to `value` for subsequent generation.
    pub fn fix_value(&mut self, value: f64) -> ObResult<()> {
        if value < self.lower_bound || value > self.upper_bound {
            return Err(validation_error!(
                "fixed value {value} of '{}' is outside [{}, {}]",
                self.name,
                self.lower_bound,
                self.upper_bound
            ));
        }
        self.is_fixed = true;
        self.default_value = Some(value);
        Ok(())
    }

    pub fn free_value(&mut self) {
        self.is_fixed = false;
    }

    pub fn update_range(&mut self, lower_bound: f64, upper_bound: f64) -> ObResult<()> {
        check_bounds(&self.name, lower_bound, upper_bound)?;
        self.lower_bound = lower_bound;
        self.upper_bound = upper_bound;
        Ok(())
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower_bound && value <= self.upper_bound
    }
}

fn check_bounds(name: &str, lower: f64, upper: f64) -> ObResult<()> {
    if !lower.is_finite() || !upper.is_finite() || lower >= upper {
        return Err(validation_error!(
            "invalid bounds [{lower}, {upper}] for parameter '{name}'"
        ));
    }
    Ok(())
}

/// An optimization objective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objective {
    pub name: String,
    pub minimize: bool,
}

impl Objective {
    pub fn minimize(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            minimize: true,
        }
    }

    pub fn maximize(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            minimize: false,
        }
    }
}

/// A metric recorded for each trial that is not optimized directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedParameter {
    pub name: String,
}

impl AnalyzedParameter {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}
