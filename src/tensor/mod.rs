//! Validated dense tensor operations.
//!
//! Thin wrappers over [`candle_core::Tensor`] that check rank, axis bounds, and
//! element counts up front and fail with [`Ge2eError::Shape`](crate::Ge2eError::Shape)
//! instead of letting the backend broadcast or truncate. None of these hold state.
//!
//! Everything downstream (centroids, similarity, loss, EER) is built from these
//! helpers plus plain candle ops, so autograd flows through them unchanged.

pub mod ops;


pub use ops::{
    concat, count_true, expect_rank, greater_than, greater_than_tensor, identity_mask, mean_axis,
    narrow, reshape, select_rows, stack, sum_axis,
};
