//! Test helpers for the federated peg crates: an [`ArbitraryGenerator`]
//! for fuzzing persisted entities, plus in-memory mock implementations of
//! the transfer store's external collaborators.

pub mod chain;
pub mod harness;
pub mod wallet;

use arbitrary::{Arbitrary, Unstructured};
use rand_core::{OsRng, RngCore};

pub use chain::MockChain;
pub use harness::StoreHarness;
pub use wallet::MockFederationWallet;

/// Default buffer size backing the generator.
const ARB_GEN_LEN: usize = 65_536;

/// Generates arbitrary values of borsh/arbitrary-deriving types from an
/// OS-seeded entropy buffer.
#[derive(Debug)]
pub struct ArbitraryGenerator {
    buf: Vec<u8>,
}

impl Default for ArbitraryGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ArbitraryGenerator {
    pub fn new() -> Self {
        Self::new_with_size(ARB_GEN_LEN)
    }

    pub fn new_with_size(s: usize) -> Self {
        Self { buf: vec![0u8; s] }
    }

    /// Generates an arbitrary instance of `T`, retrying with fresh entropy
    /// when the type needs more bytes than one fill provides.
    pub fn generate<T>(&mut self) -> T
    where
        T: for<'a> Arbitrary<'a> + Clone,
    {
        const MAX_ATTEMPTS: usize = 16;
        let mut last_error = None;

        for _ in 0..MAX_ATTEMPTS {
            OsRng.fill_bytes(&mut self.buf);
            let mut u = Unstructured::new(&self.buf);
            match T::arbitrary(&mut u) {
                Ok(value) => return value,
                Err(err) => last_error = Some(err),
            }
        }

        let error_msg = last_error
            .map(|err| err.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        panic!("failed to generate arbitrary instance: {error_msg}");
    }
}
