//! Error types for the SDMX client
//!
//! One taxonomy covers every layer of the crate:
//!
//! - **`Io` / `Xml`**: transport or parsing failure. Retryable at the
//!   caller's discretion; the library never retries internally.
//! - **`UnexpectedBackend`**: a backend violated its contract, either by
//!   panicking or by returning nothing where a value is required. Produced
//!   exclusively by [`crate::failsafe::FailsafeClient`].
//! - **`MalformedSeries`**: an aggregation policy of "none" saw a second
//!   observation collapse onto an already-occupied target period.
//! - **`IllegalState`**: API misuse, such as reading from a cursor before
//!   the first advance or building a path that does not follow its order.
//! - **`NotFound`**: the request resolved to the canonical empty-result
//!   sentinel. Distinct from a transport failure.
//! - **`KeyLimitExceeded`**: Cartesian key expansion would exceed the
//!   configured cap; raised before any key is generated.

use thiserror::Error;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the SDMX client
#[derive(Error, Debug)]
pub enum Error {
    /// Transport failure (file or network I/O)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Wire-format parsing failure
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// A backend violated its contract
    #[error("backend contract violation: {violation}")]
    UnexpectedBackend {
        /// What the backend did wrong
        violation: ContractViolation,
    },

    /// Duplicate observation for one target period under the "none" policy
    #[error("malformed series {key}: duplicate observation for period {period}")]
    MalformedSeries {
        /// Textual form of the series key
        key: String,
        /// The target period that received more than one observation
        period: String,
    },

    /// Cursor or converter API misuse
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// The request yields the canonical empty-result sentinel
    #[error("not found: {0}")]
    NotFound(String),

    /// Cartesian key expansion would exceed the configured cap
    #[error("key expansion would generate {generated} keys, limit is {limit}")]
    KeyLimitExceeded {
        /// Number of keys the expansion would produce
        generated: usize,
        /// Configured cap
        limit: usize,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Detail of a backend contract violation
///
/// Wrapped by [`Error::UnexpectedBackend`] so that upstream callers see a
/// single error contract regardless of how a backend misbehaved.
#[derive(Error, Debug)]
pub enum ContractViolation {
    /// The delegate panicked during the call
    #[error("backend panicked in {operation}: {message}")]
    Panic {
        /// Name of the SPI operation that panicked
        operation: &'static str,
        /// Stringified panic payload
        message: String,
    },

    /// The delegate returned nothing where a value is contractually required
    #[error("backend returned no value for required {operation}")]
    MissingValue {
        /// Name of the SPI operation that returned nothing
        operation: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_violation_detail() {
        let err = Error::UnexpectedBackend {
            violation: ContractViolation::MissingValue { operation: "flow" },
        };
        let text = err.to_string();
        assert!(text.contains("contract violation"));
        assert!(text.contains("flow"));
    }

    #[test]
    fn display_key_limit() {
        let err = Error::KeyLimitExceeded {
            generated: 500_000,
            limit: 100_000,
        };
        assert!(err.to_string().contains("500000"));
        assert!(err.to_string().contains("100000"));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
