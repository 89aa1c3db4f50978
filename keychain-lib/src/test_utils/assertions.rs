//! Assertion helpers for classified errors.

use std::fmt::Debug;

use crate::errors::KeychainErrorCode;
use crate::Result;

/// Assert that an operation failed with the given error code.
///
/// # Panics
/// Panics if the operation succeeded or failed with another code.
pub fn assert_error_code<T: Debug>(result: Result<T>, expected: KeychainErrorCode) {
    match result {
        Ok(value) => panic!("expected {expected:?}, got Ok({value:?})"),
        Err(err) => assert_eq!(
            err.code(),
            expected,
            "expected {expected:?}, got error: {err}"
        ),
    }
}

/// Assert that a lookup succeeded and found nothing.
///
/// # Panics
/// Panics if the lookup failed or returned a value.
pub fn assert_not_found<T: Debug>(result: Result<Option<T>>) {
    match result {
        Ok(None) => {}
        Ok(Some(value)) => panic!("expected no item, found {value:?}"),
        Err(err) => panic!("expected no item, got error: {err}"),
    }
}
