use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::errors::{EntGraphError, Result};

/// Caller-owned flag that aborts in-flight queries.
///
/// Clones share the same flag. Queries poll it between traversal hops and
/// between scanned rows; a tripped token fails the whole query with
/// [`EntGraphError::Cancelled`] and no partial result is returned.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(EntGraphError::cancelled("cancelled by caller"))
        } else {
            Ok(())
        }
    }
}

pub(crate) fn check(token: Option<&CancelToken>) -> Result<()> {
    token.map_or(Ok(()), CancelToken::check)
}
