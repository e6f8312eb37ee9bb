use candle_core::{DType, Device, Tensor};

use crate::error::{Ge2eError, Ge2eResult};

/// Fails unless `t` has exactly `rank` axes. `what` names the tensor in the error.
pub fn expect_rank(t: &Tensor, rank: usize, what: &str) -> Ge2eResult<()> {
    if t.rank() != rank {
        return Err(Ge2eError::shape(format!(
            "{what} must have rank {rank}, got shape {:?}",
            t.dims()
        )));
    }
    Ok(())
}

fn check_axis(t: &Tensor, axis: usize) -> Ge2eResult<()> {
    if axis >= t.rank() {
        return Err(Ge2eError::shape(format!(
            "axis {axis} out of range for shape {:?}",
            t.dims()
        )));
    }
    Ok(())
}

/// Reshapes without changing the element count.
pub fn reshape(t: &Tensor, dims: &[usize]) -> Ge2eResult<Tensor> {
    let target: usize = dims.iter().product();
    if target != t.elem_count() {
        return Err(Ge2eError::shape(format!(
            "cannot reshape {:?} ({} elements) into {:?} ({} elements)",
            t.dims(),
            t.elem_count(),
            dims,
            target
        )));
    }
    Ok(t.reshape(dims.to_vec())?)
}

/// Stacks same-shaped tensors along a new axis (`axis <= rank`).
pub fn stack(tensors: &[Tensor], axis: usize) -> Ge2eResult<Tensor> {
    let first = tensors
        .first()
        .ok_or_else(|| Ge2eError::shape("cannot stack an empty tensor list"))?;
    if axis > first.rank() {
        return Err(Ge2eError::shape(format!(
            "stack axis {axis} out of range for rank {}",
            first.rank()
        )));
    }
    if let Some(other) = tensors.iter().find(|t| t.dims() != first.dims()) {
        return Err(Ge2eError::shape(format!(
            "stack requires identical shapes, got {:?} and {:?}",
            first.dims(),
            other.dims()
        )));
    }
    Ok(Tensor::stack(tensors, axis)?)
}

/// Concatenates along an existing axis; all other axes must agree.
pub fn concat(tensors: &[Tensor], axis: usize) -> Ge2eResult<Tensor> {
    let first = tensors
        .first()
        .ok_or_else(|| Ge2eError::shape("cannot concatenate an empty tensor list"))?;
    check_axis(first, axis)?;
    for t in &tensors[1..] {
        let compatible = t.rank() == first.rank()
            && t
                .dims()
                .iter()
                .zip(first.dims())
                .enumerate()
                .all(|(i, (a, b))| i == axis || a == b);
        if !compatible {
            return Err(Ge2eError::shape(format!(
                "cannot concatenate {:?} with {:?} along axis {axis}",
                first.dims(),
                t.dims()
            )));
        }
    }
    Ok(Tensor::cat(tensors, axis)?)
}

/// Takes `len` entries starting at `start` along `axis`.
pub fn narrow(t: &Tensor, axis: usize, start: usize, len: usize) -> Ge2eResult<Tensor> {
    check_axis(t, axis)?;
    let size = t.dims()[axis];
    if start + len > size {
        return Err(Ge2eError::shape(format!(
            "narrow [{start}, {}) exceeds axis {axis} of size {size}",
            start + len
        )));
    }
    Ok(t.narrow(axis, start, len)?)
}

/// Gathers rows along axis 0 in the order given by `indices`.
///
/// Used to apply a permutation to a flattened batch. Gradients flow back to
/// the source rows.
pub fn select_rows(t: &Tensor, indices: &[usize]) -> Ge2eResult<Tensor> {
    if t.rank() == 0 {
        return Err(Ge2eError::shape("cannot select rows from a scalar"));
    }
    let rows = t.dims()[0];
    if let Some(&bad) = indices.iter().find(|&&i| i >= rows) {
        return Err(Ge2eError::shape(format!(
            "row index {bad} out of range for {rows} rows"
        )));
    }
    let ids: Vec<u32> = indices.iter().map(|&i| i as u32).collect();
    let ids = Tensor::from_vec(ids, indices.len(), t.device())?;
    Ok(t.index_select(&ids, 0)?)
}

/// Elementwise `t > threshold`, returned as a `u8` mask of the same shape.
pub fn greater_than(t: &Tensor, threshold: f64) -> Ge2eResult<Tensor> {
    Ok(t.gt(threshold)?)
}

/// Elementwise `a > b` for same-shaped tensors; no broadcasting.
pub fn greater_than_tensor(a: &Tensor, b: &Tensor) -> Ge2eResult<Tensor> {
    if a.dims() != b.dims() {
        return Err(Ge2eError::shape(format!(
            "comparison requires identical shapes, got {:?} and {:?}",
            a.dims(),
            b.dims()
        )));
    }
    Ok(a.gt(b)?)
}

/// Sums along `axis`, removing it.
pub fn sum_axis(t: &Tensor, axis: usize) -> Ge2eResult<Tensor> {
    check_axis(t, axis)?;
    Ok(t.sum(axis)?)
}

/// Arithmetic mean along `axis`, removing it. A zero-length axis is an error.
pub fn mean_axis(t: &Tensor, axis: usize) -> Ge2eResult<Tensor> {
    check_axis(t, axis)?;
    if t.dims()[axis] == 0 {
        return Err(Ge2eError::shape(format!(
            "cannot take the mean over empty axis {axis} of {:?}",
            t.dims()
        )));
    }
    Ok(t.mean(axis)?)
}

/// Number of set entries in a `u8` mask.
pub fn count_true(mask: &Tensor) -> Ge2eResult<f64> {
    if mask.dtype() != DType::U8 {
        return Err(Ge2eError::shape(format!(
            "expected a u8 mask, got {:?}",
            mask.dtype()
        )));
    }
    let count = mask.to_dtype(DType::F32)?.sum_all()?.to_scalar::<f32>()?;
    Ok(count as f64)
}

/// `n x n` `u8` mask with ones on the diagonal.
pub fn identity_mask(n: usize, device: &Device) -> Ge2eResult<Tensor> {
    let data: Vec<u8> = (0..n * n).map(|i| u8::from(i / n == i % n)).collect();
    Ok(Tensor::from_vec(data, (n, n), device)?)
}
