//! The checker context handed to a model at instantiation.
//!
//! A model reports messages through [`CheckContext::log_message`]. The context verifies that the
//! instance name the model passes back is the one it was instantiated with, counts the messages
//! per level and forwards them to the `log` facade.

use std::{cell::RefCell, rc::Rc};

use crate::{
    ledger::BufferLedger,
    traits::{CapabilityError, Res},
};

/// Status attached to a message from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    OK,
    Warning,
    Discard,
    Error,
    Fatal,
    Pending,
}

impl From<Result<Res, CapabilityError>> for Status {
    fn from(res: Result<Res, CapabilityError>) -> Self {
        match res {
            Ok(Res::OK) => Status::OK,
            Ok(Res::Warning) => Status::Warning,
            Ok(Res::Pending) => Status::Pending,
            Err(CapabilityError::Discard) => Status::Discard,
            Err(CapabilityError::Error) => Status::Error,
            Err(CapabilityError::Fatal) => Status::Fatal,
        }
    }
}

impl Status {
    fn level(&self) -> log::Level {
        match self {
            Status::OK | Status::Pending => log::Level::Info,
            Status::Warning | Status::Discard => log::Level::Warn,
            Status::Error | Status::Fatal => log::Level::Error,
        }
    }
}

/// Counts of messages received from the model.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MessageCounts {
    pub info: usize,
    pub warnings: usize,
    pub errors: usize,
    /// Messages whose instance name did not match the instantiated one.
    pub name_mismatches: usize,
}

#[derive(Debug, Default)]
struct Inner {
    ledger: BufferLedger,
    expected_instance: RefCell<String>,
    counts: RefCell<MessageCounts>,
}

#[derive(Clone, Debug)]
pub struct CheckContext(Rc<Inner>);

impl Default for CheckContext {
    fn default() -> Self {
        Self::new(BufferLedger::new())
    }
}

impl CheckContext {
    pub fn new(ledger: BufferLedger) -> Self {
        let inner = Inner {
            ledger,
            ..Default::default()
        };
        Self(Rc::new(inner))
    }

    pub fn ledger(&self) -> &BufferLedger {
        &self.0.ledger
    }

    /// Record the name the next instance is created with.
    pub fn expect_instance(&self, name: &str) {
        *self.0.expected_instance.borrow_mut() = name.to_owned();
    }

    pub fn message_counts(&self) -> MessageCounts {
        self.0.counts.borrow().clone()
    }

    /// Entry point for messages emitted by a model instance.
    pub fn log_message(&self, instance_name: &str, status: Status, category: &str, message: &str) {
        let level = status.level();
        let expected = self.0.expected_instance.borrow();
        let mismatch = *expected != instance_name;
        {
            let mut counts = self.0.counts.borrow_mut();
            match level {
                log::Level::Error => counts.errors += 1,
                log::Level::Warn => counts.warnings += 1,
                _ => counts.info += 1,
            }
            if mismatch {
                counts.name_mismatches += 1;
            }
        }

        if mismatch {
            log::error!(
                "Logger callback does not propagate instance name correctly: got '{instance_name}', expected '{expected}'"
            );
        }

        log::logger().log(
            &log::Record::builder()
                .args(format_args!("[{instance_name}] {message}"))
                .level(level)
                .module_path(Some("fmu"))
                .target(category)
                .build(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn test_message_counts() {
        let ctx = CheckContext::new(BufferLedger::new());
        ctx.expect_instance("inst");
        ctx.log_message("inst", Status::OK, "logAll", "hello");
        ctx.log_message("inst", Status::Discard, "logAll", "step too large");
        ctx.log_message("other", Status::Fatal, "logAll", "boom");

        assert_eq!(
            ctx.message_counts(),
            MessageCounts {
                info: 1,
                warnings: 1,
                errors: 1,
                name_mismatches: 1,
            }
        );
    }

    #[test]
    fn test_status_from_result() {
        assert_eq!(Status::from(Ok(Res::Warning)), Status::Warning);
        assert_eq!(Status::from(Err(CapabilityError::Fatal)), Status::Fatal);
    }
}
