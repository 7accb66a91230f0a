//! Name validation for schedulers, wires and derived vertices.

use crate::core::WiringError;

/// Check that `name` is non-empty and only uses ASCII letters, digits and underscores.
///
/// # Errors
///
/// Returns [`WiringError::IllegalName`] otherwise.
pub fn validate_name(name: &str) -> Result<(), WiringError> {
    let legal = !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
    if legal {
        Ok(())
    } else {
        Err(WiringError::IllegalName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_illegal_names() {
        for name in ["", " ", "foo bar", "foo?bar", "foo:bar", "foo*bar", "foo/bar", "foo\\bar", "foo-bar", "füü"] {
            assert!(
                matches!(validate_name(name), Err(WiringError::IllegalName(_))),
                "`{name}` should be rejected"
            );
        }
    }

    #[test]
    fn accepts_legal_names() {
        for name in ["x", "fooBar", "foo_bar", "foo_bar123", "123", "_"] {
            assert!(validate_name(name).is_ok(), "`{name}` should be accepted");
        }
    }
}
