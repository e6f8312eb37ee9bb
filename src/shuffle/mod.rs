//! Speaker-anonymizing batch permutation.
//!
//! The embedding producer may be order-sensitive (batch statistics, for
//! example). Feeding it the flattened `N * M` utterances in a random order and
//! restoring that order afterwards keeps positional correlation from leaking
//! speaker identity, while downstream code still sees the `(speaker, utterance)`
//! grouping intact.
//!
//! Randomness always comes from a caller-owned [`rand::Rng`]; nothing here
//! touches a process-wide generator, so seeded runs are reproducible and
//! concurrent batches never race on shared state.

#[cfg(test)]
mod tests;

use candle_core::Tensor;
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::constants::BatchDims;
use crate::error::{Ge2eError, Ge2eResult};
use crate::tensor::select_rows;

/// Returns the inverse of `forward`, so that `inverse[forward[i]] == i`.
///
/// `forward` must be a permutation of `0..forward.len()`; use
/// [`Permutation::from_forward`] when that is not already guaranteed.
pub fn invert(forward: &[usize]) -> Vec<usize> {
    let mut inverse = vec![0; forward.len()];
    for (position, &source) in forward.iter().enumerate() {
        inverse[source] = position;
    }
    inverse
}

/// A bijection over `0..len` together with its inverse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutation {
    forward: Vec<usize>,
    inverse: Vec<usize>,
}

impl Permutation {
    /// Draws a uniformly random permutation of `0..len` from `rng`.
    ///
    /// The identity is a legal outcome.
    pub fn random<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Ge2eResult<Self> {
        Ok(BatchShuffler::new(len)?.draw(rng))
    }

    /// Builds a permutation from an explicit forward ordering, checking that it is a bijection.
    pub fn from_forward(forward: Vec<usize>) -> Ge2eResult<Self> {
        if forward.is_empty() {
            return Err(Ge2eError::invalid("permutation length must be positive"));
        }
        let mut seen = vec![false; forward.len()];
        for &i in &forward {
            if i >= forward.len() || seen[i] {
                return Err(Ge2eError::invalid(format!(
                    "{forward:?} is not a permutation of 0..{}",
                    forward.len()
                )));
            }
            seen[i] = true;
        }
        let inverse = invert(&forward);
        Ok(Self { forward, inverse })
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Source index for each output position: `shuffled[i] = original[forward[i]]`.
    pub fn forward(&self) -> &[usize] {
        &self.forward
    }

    pub fn inverse(&self) -> &[usize] {
        &self.inverse
    }

    pub fn is_identity(&self) -> bool {
        self.forward.iter().enumerate().all(|(i, &j)| i == j)
    }

    /// Reorders `items` by the forward permutation.
    pub fn apply<T: Clone>(&self, items: &[T]) -> Ge2eResult<Vec<T>> {
        self.check_len(items.len())?;
        Ok(self.forward.iter().map(|&i| items[i].clone()).collect())
    }

    /// Undoes [`apply`](Self::apply).
    pub fn restore<T: Clone>(&self, items: &[T]) -> Ge2eResult<Vec<T>> {
        self.check_len(items.len())?;
        Ok(self.inverse.iter().map(|&i| items[i].clone()).collect())
    }

    /// Reorders axis 0 of `t` by the forward permutation.
    pub fn permute_rows(&self, t: &Tensor) -> Ge2eResult<Tensor> {
        self.check_rows(t)?;
        select_rows(t, &self.forward)
    }

    /// Undoes [`permute_rows`](Self::permute_rows). Gradients flow through.
    pub fn restore_rows(&self, t: &Tensor) -> Ge2eResult<Tensor> {
        self.check_rows(t)?;
        select_rows(t, &self.inverse)
    }

    fn check_len(&self, len: usize) -> Ge2eResult<()> {
        if len != self.len() {
            return Err(Ge2eError::shape(format!(
                "permutation of length {} applied to {len} items",
                self.len()
            )));
        }
        Ok(())
    }

    fn check_rows(&self, t: &Tensor) -> Ge2eResult<()> {
        match t.dims().first() {
            Some(&rows) => self.check_len(rows),
            None => Err(Ge2eError::shape("cannot permute the rows of a scalar")),
        }
    }
}

/// Draws per-batch permutations over the flattened `(speaker, utterance)` axis.
#[derive(Debug, Clone, Copy)]
pub struct BatchShuffler {
    len: usize,
}

impl BatchShuffler {
    /// Shuffler for `len` flattened utterances. Fails if `len == 0`.
    pub fn new(len: usize) -> Ge2eResult<Self> {
        if len == 0 {
            return Err(Ge2eError::invalid("shuffler needs at least one utterance"));
        }
        Ok(Self { len })
    }

    /// Shuffler for an `N x M` batch.
    pub fn for_batch(dims: BatchDims) -> Ge2eResult<Self> {
        Self::new(dims.flat_len())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Draws a fresh permutation from the caller's generator.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Permutation {
        let mut forward: Vec<usize> = (0..self.len).collect();
        forward.shuffle(rng);
        let inverse = invert(&forward);
        debug!(len = self.len, "Drew batch permutation");
        Permutation { forward, inverse }
    }
}
