//! Contract enforcement over third-party backends
//!
//! Backend implementations arrive from outside the crate and do not
//! always honor the [`Backend`] contract. [`FailsafeClient`] converts the
//! two ways a backend can misbehave into ordinary errors:
//!
//! - a panic inside any backend call becomes
//!   [`ContractViolation::Panic`], caught at the decorator boundary so it
//!   never unwinds into application code
//! - `Ok(None)` from an operation whose contract requires a value becomes
//!   [`ContractViolation::MissingValue`]
//!
//! A `false` keys-only capability is a legitimate answer and passes
//! through untouched.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use tracing::error;

use crate::backend::{Backend, SeriesStream};
use crate::error::{ContractViolation, Error, Result};
use crate::schema::DimensionSchema;
use crate::types::{Dataflow, FlowRef, Key, StructureRef};

/// Panic-catching, contract-normalizing backend decorator
pub struct FailsafeClient<B: Backend> {
    inner: B,
}

impl<B: Backend> FailsafeClient<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }

    /// The wrapped backend
    pub fn inner(&self) -> &B {
        &self.inner
    }

    fn guard<T>(&self, operation: &'static str, call: impl FnOnce(&B) -> Result<T>) -> Result<T> {
        match catch_unwind(AssertUnwindSafe(|| call(&self.inner))) {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload);
                error!(operation, message, "backend panicked");
                Err(Error::UnexpectedBackend {
                    violation: ContractViolation::Panic {
                        operation,
                        message,
                    },
                })
            }
        }
    }

    fn require<T>(&self, operation: &'static str, found: Option<T>) -> Result<T> {
        found.ok_or_else(|| {
            error!(operation, "backend returned no value where one is required");
            Error::UnexpectedBackend {
                violation: ContractViolation::MissingValue { operation },
            }
        })
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl<B: Backend> Backend for FailsafeClient<B> {
    fn base(&self) -> String {
        self.inner.base()
    }

    fn flows(&self) -> Result<Vec<Dataflow>> {
        self.guard("flows", |backend| backend.flows())
    }

    fn flow(&self, flow: &FlowRef) -> Result<Option<Dataflow>> {
        let found = self.guard("flow", |backend| backend.flow(flow))?;
        // A flow the backend advertises must resolve
        Ok(Some(self.require("flow", found)?))
    }

    fn structure(&self, structure: &StructureRef) -> Result<Option<DimensionSchema>> {
        let found = self.guard("structure", |backend| backend.structure(structure))?;
        Ok(Some(self.require("structure", found)?))
    }

    fn data(
        &self,
        flow: &FlowRef,
        key: &Key,
        keys_only: bool,
    ) -> Result<Box<dyn SeriesStream>> {
        let stream = self.guard("data", |backend| backend.data(flow, key, keys_only))?;
        Ok(Box::new(FailsafeStream { inner: stream }))
    }

    fn keys_only_supported(&self) -> Result<bool> {
        self.guard("keys_only_supported", |backend| backend.keys_only_supported())
    }

    fn peek_structure_ref(&self, flow: &FlowRef) -> Result<Option<StructureRef>> {
        // The peek is an optional hint; None is a valid answer
        self.guard("peek_structure_ref", |backend| backend.peek_structure_ref(flow))
    }

    fn ping(&self) -> Result<Duration> {
        self.guard("ping", |backend| backend.ping())
    }
}

struct FailsafeStream {
    inner: Box<dyn SeriesStream>,
}

impl SeriesStream for FailsafeStream {
    fn next_series(&mut self) -> Result<Option<crate::types::Series>> {
        match catch_unwind(AssertUnwindSafe(|| self.inner.next_series())) {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload);
                error!(operation = "next_series", message, "backend panicked");
                Err(Error::UnexpectedBackend {
                    violation: ContractViolation::Panic {
                        operation: "next_series",
                        message,
                    },
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::VecSeriesStream;

    /// Backend that panics on metadata calls and denies flow lookups
    struct MisbehavingBackend;

    impl Backend for MisbehavingBackend {
        fn base(&self) -> String {
            "mem://misbehaving/en".to_string()
        }

        fn flows(&self) -> Result<Vec<Dataflow>> {
            panic!("flows exploded")
        }

        fn flow(&self, _flow: &FlowRef) -> Result<Option<Dataflow>> {
            Ok(None)
        }

        fn structure(&self, _structure: &StructureRef) -> Result<Option<DimensionSchema>> {
            Ok(None)
        }

        fn data(
            &self,
            _flow: &FlowRef,
            _key: &Key,
            _keys_only: bool,
        ) -> Result<Box<dyn SeriesStream>> {
            Ok(Box::new(VecSeriesStream::new(Vec::new())))
        }

        fn keys_only_supported(&self) -> Result<bool> {
            Ok(false)
        }

        fn peek_structure_ref(&self, _flow: &FlowRef) -> Result<Option<StructureRef>> {
            Ok(None)
        }

        fn ping(&self) -> Result<Duration> {
            Ok(Duration::ZERO)
        }
    }

    #[test]
    fn panic_becomes_contract_violation() {
        let client = FailsafeClient::new(MisbehavingBackend);
        let error = client.flows().unwrap_err();
        match error {
            Error::UnexpectedBackend {
                violation: ContractViolation::Panic { operation, message },
            } => {
                assert_eq!(operation, "flows");
                assert_eq!(message, "flows exploded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_flow_becomes_contract_violation() {
        let client = FailsafeClient::new(MisbehavingBackend);
        let error = client.flow(&FlowRef::of("MEI")).unwrap_err();
        assert!(matches!(
            error,
            Error::UnexpectedBackend {
                violation: ContractViolation::MissingValue { operation: "flow" }
            }
        ));
    }

    #[test]
    fn missing_structure_becomes_contract_violation() {
        let client = FailsafeClient::new(MisbehavingBackend);
        let error = client.structure(&StructureRef::of("DSD")).unwrap_err();
        assert!(matches!(
            error,
            Error::UnexpectedBackend {
                violation: ContractViolation::MissingValue {
                    operation: "structure"
                }
            }
        ));
    }

    #[test]
    fn capability_false_is_not_an_error() {
        let client = FailsafeClient::new(MisbehavingBackend);
        assert!(!client.keys_only_supported().unwrap());
    }

    #[test]
    fn peek_none_is_not_an_error() {
        let client = FailsafeClient::new(MisbehavingBackend);
        assert!(client
            .peek_structure_ref(&FlowRef::of("MEI"))
            .unwrap()
            .is_none());
    }
}
