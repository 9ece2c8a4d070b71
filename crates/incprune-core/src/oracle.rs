//! Build oracle seam.
//!
//! The oracle is the only source of truth for whether a set of edits is
//! safe. `verify` takes `&mut self`, so holding the oracle by exclusive
//! borrow is what keeps two rebuilds from ever overlapping.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome of one full project rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    Pass,
    Fail,
}

impl Verification {
    pub fn passed(&self) -> bool {
        matches!(self, Verification::Pass)
    }
}

impl From<bool> for Verification {
    fn from(ok: bool) -> Self {
        if ok {
            Verification::Pass
        } else {
            Verification::Fail
        }
    }
}

/// Rebuilds the project and reports pass or fail.
///
/// Implementations must map every failure to run the build (spawn errors,
/// timeouts) to [`Verification::Fail`] rather than erroring.
#[async_trait]
pub trait BuildOracle: Send {
    async fn verify(&mut self) -> Verification;
}

#[async_trait]
impl<T: BuildOracle + ?Sized> BuildOracle for Box<T> {
    async fn verify(&mut self) -> Verification {
        (**self).verify().await
    }
}
