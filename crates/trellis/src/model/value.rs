//! Cell values and value types.
//!
//! Columns hand values to the host through [`CellValue`] rather than through
//! the domain item type, so the projection can stay ignorant of row items.

use std::cmp::Ordering;
use std::fmt;

use trellis_core::{BindingError, Result};

/// Check state for check-box cells and tree nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CheckState {
    /// Not checked.
    #[default]
    Unchecked,
    /// Some children checked.
    PartiallyChecked,
    /// Checked.
    Checked,
}

impl CheckState {
    /// Returns `true` if checked fully or partially.
    pub fn is_checked(&self) -> bool {
        !matches!(self, CheckState::Unchecked)
    }

    /// The state a click moves to. A partial check clears.
    pub fn toggle(&self) -> CheckState {
        match self {
            CheckState::Unchecked => CheckState::Checked,
            CheckState::PartiallyChecked | CheckState::Checked => CheckState::Unchecked,
        }
    }
}

impl From<bool> for CheckState {
    fn from(checked: bool) -> Self {
        if checked {
            CheckState::Checked
        } else {
            CheckState::Unchecked
        }
    }
}

/// The declared type of a column's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Free text.
    Text,
    /// Signed integer.
    Int,
    /// Floating point.
    Float,
    /// Boolean.
    Bool,
    /// Check box.
    Check,
}

/// A single cell's value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    /// No value.
    #[default]
    None,
    /// Text.
    Text(String),
    /// Integer.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// Check state.
    Check(CheckState),
}

impl CellValue {
    /// Returns `true` for [`CellValue::None`].
    pub fn is_none(&self) -> bool {
        matches!(self, CellValue::None)
    }

    /// The value's type, if it has one.
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            CellValue::None => None,
            CellValue::Text(_) => Some(ValueType::Text),
            CellValue::Int(_) => Some(ValueType::Int),
            CellValue::Float(_) => Some(ValueType::Float),
            CellValue::Bool(_) => Some(ValueType::Bool),
            CellValue::Check(_) => Some(ValueType::Check),
        }
    }

    /// Text content, if this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer content, if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            CellValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric content widened to `f64`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            CellValue::Float(n) => Some(*n),
            CellValue::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Boolean content. Check states count as booleans.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CellValue::Bool(b) => Some(*b),
            CellValue::Check(state) => Some(state.is_checked()),
            _ => None,
        }
    }

    /// Check state content. Booleans convert.
    pub fn as_check_state(&self) -> Option<CheckState> {
        match self {
            CellValue::Check(state) => Some(*state),
            CellValue::Bool(b) => Some((*b).into()),
            _ => None,
        }
    }

    /// Default display text.
    pub fn display_text(&self) -> String {
        self.to_string()
    }

    /// Total order used by default column sorting.
    ///
    /// `None` sorts first. Numbers compare numerically across `Int` and
    /// `Float`. Values of unrelated types order by type.
    pub fn compare(&self, other: &CellValue) -> Ordering {
        use CellValue::*;
        match (self, other) {
            (None, None) => Ordering::Equal,
            (None, _) => Ordering::Less,
            (_, None) => Ordering::Greater,
            (Text(a), Text(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Int(_) | Float(_), Int(_) | Float(_)) => {
                let (a, b) = (self.as_float().unwrap_or(0.0), other.as_float().unwrap_or(0.0));
                a.total_cmp(&b)
            }
            (Bool(a), Bool(b)) => a.cmp(b),
            (Check(a), Check(b)) => check_rank(*a).cmp(&check_rank(*b)),
            _ => type_rank(self).cmp(&type_rank(other)),
        }
    }

    /// Parses editor text into a value of `value_type`.
    pub fn parse(value_type: ValueType, text: &str, column: &str) -> Result<CellValue> {
        let trimmed = text.trim();
        match value_type {
            ValueType::Text => Ok(CellValue::Text(text.to_string())),
            ValueType::Int => trimmed
                .parse()
                .map(CellValue::Int)
                .map_err(|e| BindingError::invalid_value(column, format!("{e}"))),
            ValueType::Float => trimmed
                .parse()
                .map(CellValue::Float)
                .map_err(|e| BindingError::invalid_value(column, format!("{e}"))),
            ValueType::Bool | ValueType::Check => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(CellValue::Bool(true)),
                "false" | "no" | "0" | "" => Ok(CellValue::Bool(false)),
                other => Err(BindingError::invalid_value(
                    column,
                    format!("'{other}' is not a boolean"),
                )),
            },
        }
    }
}

fn check_rank(state: CheckState) -> u8 {
    match state {
        CheckState::Unchecked => 0,
        CheckState::PartiallyChecked => 1,
        CheckState::Checked => 2,
    }
}

fn type_rank(value: &CellValue) -> u8 {
    match value {
        CellValue::None => 0,
        CellValue::Bool(_) => 1,
        CellValue::Check(_) => 2,
        CellValue::Int(_) | CellValue::Float(_) => 3,
        CellValue::Text(_) => 4,
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::None => Ok(()),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Int(n) => write!(f, "{n}"),
            CellValue::Float(n) => write!(f, "{n}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Check(state) => f.write_str(if state.is_checked() { "true" } else { "false" }),
        }
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Int(n)
    }
}

impl From<i32> for CellValue {
    fn from(n: i32) -> Self {
        CellValue::Int(n as i64)
    }
}

impl From<u32> for CellValue {
    fn from(n: u32) -> Self {
        CellValue::Int(n as i64)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Float(n)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

impl From<CheckState> for CellValue {
    fn from(state: CheckState) -> Self {
        CellValue::Check(state)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(CellValue::None, Into::into)
    }
}
