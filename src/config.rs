//! Options given by the caller of pull and push

use crate::error::*;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

/// Account for the registry, sent as HTTP basic auth to the token endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Credentials {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Use `http` instead of `https`
    pub insecure: bool,
    /// Use stored credentials for the registry if `None`
    pub credentials: Option<Credentials>,
    /// Timeout of each request
    pub timeout: Option<Duration>,
    /// The whole operation fails with [Error::DeadlineExceeded] after this
    pub deadline: Option<Instant>,
    /// The operation stops with [Error::Cancelled] at the next request once this is set
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Options {
    pub fn insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Check cancellation and deadline, and returns the time budget left for a request
    pub fn remaining(&self) -> Result<Option<Duration>> {
        if let Some(flag) = &self.cancel {
            if flag.load(Ordering::SeqCst) {
                return Err(Error::Cancelled);
            }
        }
        let left = match self.deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(Error::DeadlineExceeded);
                }
                Some(deadline - now)
            }
            None => None,
        };
        Ok(match (left, self.timeout) {
            (Some(left), Some(timeout)) => Some(left.min(timeout)),
            (left, timeout) => left.or(timeout),
        })
    }
}
