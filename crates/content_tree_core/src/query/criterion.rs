//! Criterion contract and the language code criterion.
//!
//! # Responsibility
//! - Define the closed set of operators a criterion may use.
//! - Check a criterion value against the operator specifications it accepts.
//!
//! # Invariants
//! - A criterion is validated once, at construction.
//! - Array values are never empty.

use crate::model::content::is_valid_language_code;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Comparison operator of a criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    In,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Between,
    Contains,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::In => "in",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Like => "like",
            Self::Between => "between",
            Self::Contains => "contains",
        }
    }

    /// Parses the representation produced by [`Operator::as_str`].
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "=" => Some(Self::Eq),
            "in" => Some(Self::In),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Gte),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Lte),
            "like" => Some(Self::Like),
            "between" => Some(Self::Between),
            "contains" => Some(Self::Contains),
            _ => None,
        }
    }
}

/// Whether an operator takes one value or a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFormat {
    Single,
    Array,
}

/// Scalar type of every value a specification accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Integer,
    Boolean,
}

/// One accepted operator with its value shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Specification {
    pub operator: Operator,
    pub format: ValueFormat,
    pub value_type: ValueType,
}

impl Specification {
    pub const fn new(operator: Operator, format: ValueFormat, value_type: ValueType) -> Self {
        Self {
            operator,
            format,
            value_type,
        }
    }
}

/// One criterion scalar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Boolean(bool),
    Integer(i64),
    String(String),
}

impl Scalar {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Boolean(_) => ValueType::Boolean,
            Self::Integer(_) => ValueType::Integer,
            Self::String(_) => ValueType::String,
        }
    }
}

/// Value of a criterion: one scalar or a list of scalars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CriterionValue {
    Array(Vec<Scalar>),
    Single(Scalar),
}

impl CriterionValue {
    pub fn format(&self) -> ValueFormat {
        match self {
            Self::Single(_) => ValueFormat::Single,
            Self::Array(_) => ValueFormat::Array,
        }
    }

    /// Every scalar of the value in order.
    pub fn scalars(&self) -> &[Scalar] {
        match self {
            Self::Single(scalar) => std::slice::from_ref(scalar),
            Self::Array(scalars) => scalars,
        }
    }

    /// Parses a value delivered as JSON by a query builder.
    pub fn from_json(value: serde_json::Value) -> Result<Self, CriterionError> {
        serde_json::from_value(value).map_err(|err| CriterionError::InvalidValue {
            message: err.to_string(),
        })
    }
}

impl From<&str> for CriterionValue {
    fn from(value: &str) -> Self {
        Self::Single(Scalar::String(value.to_string()))
    }
}

impl From<Vec<&str>> for CriterionValue {
    fn from(values: Vec<&str>) -> Self {
        Self::Array(
            values
                .into_iter()
                .map(|value| Scalar::String(value.to_string()))
                .collect(),
        )
    }
}

/// Errors raised when a criterion is built with an unsupported shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CriterionError {
    UnsupportedOperator(Operator),
    FormatMismatch {
        operator: Operator,
        expected: ValueFormat,
    },
    TypeMismatch {
        operator: Operator,
        expected: ValueType,
    },
    EmptyArray(Operator),
    InvalidValue {
        message: String,
    },
}

impl Display for CriterionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedOperator(operator) => {
                write!(f, "operator `{}` is not supported", operator.as_str())
            }
            Self::FormatMismatch { operator, expected } => write!(
                f,
                "operator `{}` expects {expected:?} value format",
                operator.as_str()
            ),
            Self::TypeMismatch { operator, expected } => write!(
                f,
                "operator `{}` expects {expected:?} values",
                operator.as_str()
            ),
            Self::EmptyArray(operator) => {
                write!(f, "operator `{}` needs at least one value", operator.as_str())
            }
            Self::InvalidValue { message } => write!(f, "invalid criterion value: {message}"),
        }
    }
}

impl Error for CriterionError {}

/// Polymorphic matcher consumed by a query layer.
pub trait Criterion {
    /// Attribute the criterion applies to, when it has one.
    fn target(&self) -> Option<&str>;
    fn operator(&self) -> Operator;
    fn value(&self) -> &CriterionValue;
    /// Operators this criterion accepts with their value shapes.
    fn specifications(&self) -> &'static [Specification];
}

/// Checks `value` against the specification declared for `operator`.
pub fn validate_criterion(
    operator: Operator,
    value: &CriterionValue,
    specifications: &[Specification],
) -> Result<(), CriterionError> {
    let spec = specifications
        .iter()
        .find(|spec| spec.operator == operator)
        .ok_or(CriterionError::UnsupportedOperator(operator))?;

    match (spec.format, value) {
        (ValueFormat::Single, CriterionValue::Single(_)) => {}
        (ValueFormat::Array, CriterionValue::Array(scalars)) if scalars.is_empty() => {
            return Err(CriterionError::EmptyArray(operator));
        }
        (ValueFormat::Array, CriterionValue::Array(_)) => {}
        (expected, _) => {
            return Err(CriterionError::FormatMismatch { operator, expected });
        }
    }

    if value
        .scalars()
        .iter()
        .any(|scalar| scalar.value_type() != spec.value_type)
    {
        return Err(CriterionError::TypeMismatch {
            operator,
            expected: spec.value_type,
        });
    }
    Ok(())
}

const LANGUAGE_CODE_SPECIFICATIONS: &[Specification] = &[
    Specification::new(Operator::In, ValueFormat::Array, ValueType::String),
    Specification::new(Operator::Eq, ValueFormat::Single, ValueType::String),
];

/// Matches content by language code and always-available state.
///
/// `match_always_available` is carried for the query layer, which decides how
/// always-available content interacts with the language filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageCode {
    operator: Operator,
    value: CriterionValue,
    match_always_available: bool,
}

impl LanguageCode {
    /// Builds the criterion; arrays use `In`, single values use `Eq`.
    pub fn new(
        value: impl Into<CriterionValue>,
        match_always_available: bool,
    ) -> Result<Self, CriterionError> {
        let value = value.into();
        let operator = match value.format() {
            ValueFormat::Array => Operator::In,
            ValueFormat::Single => Operator::Eq,
        };
        Self::build(operator, value, match_always_available)
    }

    /// Builds the criterion from query builder input.
    ///
    /// Language codes have no target; `target` is ignored. Always-available
    /// matching stays at its default of `true`.
    pub fn from_query_builder(
        _target: Option<&str>,
        operator: Operator,
        value: CriterionValue,
    ) -> Result<Self, CriterionError> {
        Self::build(operator, value, true)
    }

    pub fn match_always_available(&self) -> bool {
        self.match_always_available
    }

    /// Language codes in the order given.
    pub fn language_codes(&self) -> Vec<&str> {
        self.value
            .scalars()
            .iter()
            .filter_map(|scalar| match scalar {
                Scalar::String(code) => Some(code.as_str()),
                _ => None,
            })
            .collect()
    }

    fn build(
        operator: Operator,
        value: CriterionValue,
        match_always_available: bool,
    ) -> Result<Self, CriterionError> {
        validate_criterion(operator, &value, LANGUAGE_CODE_SPECIFICATIONS)?;
        for scalar in value.scalars() {
            if let Scalar::String(code) = scalar {
                if !is_valid_language_code(code) {
                    return Err(CriterionError::InvalidValue {
                        message: format!("`{code}` is not a language code"),
                    });
                }
            }
        }
        Ok(Self {
            operator,
            value,
            match_always_available,
        })
    }
}

impl Criterion for LanguageCode {
    fn target(&self) -> Option<&str> {
        None
    }

    fn operator(&self) -> Operator {
        self.operator
    }

    fn value(&self) -> &CriterionValue {
        &self.value
    }

    fn specifications(&self) -> &'static [Specification] {
        LANGUAGE_CODE_SPECIFICATIONS
    }
}
