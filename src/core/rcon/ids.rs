// src/core/rcon/ids.rs

//! Request identifier sources.

use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Produces candidate request identifiers.
///
/// Candidates are not required to be valid; the client rejects zero, the chat
/// sentinel, and identifiers that are still outstanding, and asks again.
pub trait IdSource: Send + Sync {
    fn next_id(&self) -> i32;
}

/// The production source: uniformly random 32-bit identifiers.
pub struct RandomIds {
    rng: Mutex<SmallRng>,
}

impl RandomIds {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(SmallRng::from_entropy()),
        }
    }
}

impl Default for RandomIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdSource for RandomIds {
    fn next_id(&self) -> i32 {
        self.rng.lock().r#gen::<i32>()
    }
}
