//! Internal utilities.

use std::hash::Hash;

use base64::Engine;
use pdf_writer::Name;
use siphasher::sip128::{Hasher128, SipHasher13};

use crate::error::{CapyError, CapyResult};

pub(crate) trait NameExt {
    fn to_pdf_name(&self) -> Name<'_>;
}

impl NameExt for String {
    fn to_pdf_name(&self) -> Name<'_> {
        Name(self.as_bytes())
    }
}

impl NameExt for &str {
    fn to_pdf_name(&self) -> Name<'_> {
        Name(self.as_bytes())
    }
}

/// Create a base64-encoded hash of the value.
pub(crate) fn hash_base64<T: Hash + ?Sized>(value: &T) -> String {
    base64::engine::general_purpose::STANDARD.encode(hash128(value).to_be_bytes())
}

/// Calculate a 128-bit siphash of a value.
pub(crate) fn hash128<T: Hash + ?Sized>(value: &T) -> u128 {
    let mut state = SipHasher13::new();
    value.hash(&mut state);
    state.finish128().as_u128()
}

/// Reject NaN and infinite operands.
pub(crate) fn check_finite(values: &[f32], what: &str) -> CapyResult<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(CapyError::invalid(format!("Non-finite {what}.")))
    }
}

/// Check that all values lie in the 0..=1 range.
pub(crate) fn check_unit_range(values: &[f32], what: &str) -> CapyResult<()> {
    if values.iter().all(|v| (0.0..=1.0).contains(v)) {
        Ok(())
    } else {
        Err(CapyError::invalid(format!(
            "{what} must be in the range [0, 1]."
        )))
    }
}

/// Check that a name can be written as its own PDF name object.
pub(crate) fn check_pdf_name(name: &str, what: &str) -> CapyResult<()> {
    if name.is_empty() {
        return Err(CapyError::invalid(format!("{what} must not be empty.")));
    }

    if name.starts_with('/') {
        return Err(CapyError::invalid(format!(
            "{what} must not start with a slash."
        )));
    }

    Ok(())
}
