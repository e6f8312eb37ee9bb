//! Hand-built tensors shared by the integration tests.

use candle_core::{Device, Tensor};

/// Four speaker directions in 3-D: the standard basis plus `-(1, 1, 1) / sqrt(3)`.
pub fn speaker_directions() -> [[f32; 3]; 4] {
    let k = -1.0 / 3f32.sqrt();
    [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [k, k, k]]
}

/// `(4, m, 3)` batch where every utterance of speaker `s` is direction `s`.
pub fn direction_batch(m: usize) -> Tensor {
    let dirs = speaker_directions();
    let data: Vec<f32> = dirs
        .iter()
        .flat_map(|dir| std::iter::repeat_n(dir, m).flatten().copied())
        .collect();
    Tensor::from_vec(data, (4, m, 3), &Device::Cpu).expect("direction batch")
}

pub fn dot(a: &[f32; 3], b: &[f32; 3]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum()
}

/// `(n, m, n)` similarity with `own` on the true-speaker entries and `other` elsewhere.
pub fn separated(n: usize, m: usize, own: f32, other: f32) -> Vec<f32> {
    let mut data = Vec::with_capacity(n * m * n);
    for s in 0..n {
        for _ in 0..m {
            data.extend((0..n).map(|k| if k == s { own } else { other }));
        }
    }
    data
}

pub fn similarity(data: Vec<f32>, n: usize, m: usize) -> Tensor {
    Tensor::from_vec(data, (n, m, n), &Device::Cpu).expect("similarity tensor")
}

pub fn max_abs_diff(a: &Tensor, b: &Tensor) -> f32 {
    (a - b)
        .and_then(|d| d.abs())
        .and_then(|d| d.flatten_all())
        .and_then(|d| d.max(0))
        .and_then(|d| d.to_scalar::<f32>())
        .expect("max abs diff")
}
