//! Argument extraction helpers shared by every tool handler (C11). Each
//! function returns `INVALID_ARGUMENT` with the offending field name in
//! `details` on mismatch, matching the uniform failure envelope.

use crate::error::{AppError, ErrorCode};
use serde_json::Value;

fn invalid(field: &str, reason: &str) -> AppError {
    AppError::new(ErrorCode::InvalidArgument, format!("argument '{field}' {reason}")).with_detail("field", field.to_string())
}

pub fn require_str<'a>(args: &'a Value, field: &str) -> Result<&'a str, AppError> {
    args.get(field).and_then(Value::as_str).ok_or_else(|| invalid(field, "is required and must be a string"))
}

pub fn opt_str<'a>(args: &'a Value, field: &str) -> Option<&'a str> {
    args.get(field).and_then(Value::as_str)
}

pub fn opt_u64(args: &Value, field: &str, default: u64) -> Result<u64, AppError> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v.as_u64().ok_or_else(|| invalid(field, "must be a non-negative integer")),
    }
}

pub fn opt_f64(args: &Value, field: &str) -> Result<Option<f64>, AppError> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_f64().map(Some).ok_or_else(|| invalid(field, "must be a number")),
    }
}

pub fn opt_bool(args: &Value, field: &str, default: bool) -> Result<bool, AppError> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v.as_bool().ok_or_else(|| invalid(field, "must be a boolean")),
    }
}

pub fn opt_bool_opt(args: &Value, field: &str) -> Result<Option<bool>, AppError> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_bool().map(Some).ok_or_else(|| invalid(field, "must be a boolean")),
    }
}

pub fn opt_usize(args: &Value, field: &str, default: usize) -> Result<usize, AppError> {
    Ok(opt_u64(args, field, default as u64)? as usize)
}
