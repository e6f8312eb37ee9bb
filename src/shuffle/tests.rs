use super::*;
use candle_core::{Device, Tensor};
use rand::SeedableRng;
use rand::rngs::StdRng;

#[test]
fn test_invert_simple() {
    assert_eq!(invert(&[2, 0, 1]), vec![1, 2, 0]);
    assert_eq!(invert(&[0]), vec![0]);
}

#[test]
fn test_random_is_bijection() {
    let mut rng = StdRng::seed_from_u64(7);
    let perm = Permutation::random(20, &mut rng).unwrap();
    let mut sorted = perm.forward().to_vec();
    sorted.sort_unstable();
    assert_eq!(sorted, (0..20).collect::<Vec<_>>());
    for (i, &j) in perm.forward().iter().enumerate() {
        assert_eq!(perm.inverse()[j], i);
    }
}

#[test]
fn test_random_zero_length_is_invalid() {
    let mut rng = StdRng::seed_from_u64(7);
    let err = Permutation::random(0, &mut rng).unwrap_err();
    assert!(err.is_invalid_input());
}

#[test]
fn test_seeded_draws_are_reproducible() {
    let shuffler = BatchShuffler::new(32).unwrap();
    let a = shuffler.draw(&mut StdRng::seed_from_u64(55));
    let b = shuffler.draw(&mut StdRng::seed_from_u64(55));
    assert_eq!(a, b);

    let c = shuffler.draw(&mut StdRng::seed_from_u64(56));
    assert_ne!(a.forward(), c.forward());
}

#[test]
fn test_apply_then_restore_roundtrip() {
    let mut rng = StdRng::seed_from_u64(1);
    let items: Vec<char> = "speakers".chars().collect();
    let perm = Permutation::random(items.len(), &mut rng).unwrap();
    let shuffled = perm.apply(&items).unwrap();
    assert_eq!(perm.restore(&shuffled).unwrap(), items);
}

#[test]
fn test_apply_length_mismatch() {
    let perm = Permutation::from_forward(vec![1, 0]).unwrap();
    assert!(perm.apply(&[1, 2, 3]).unwrap_err().is_shape());
}

#[test]
fn test_from_forward_rejects_non_bijection() {
    assert!(Permutation::from_forward(vec![0, 0, 1]).is_err());
    assert!(Permutation::from_forward(vec![0, 3, 1]).is_err());
    assert!(Permutation::from_forward(vec![]).is_err());
}

#[test]
fn test_identity_is_legal() {
    let perm = Permutation::from_forward(vec![0, 1, 2]).unwrap();
    assert!(perm.is_identity());
    assert_eq!(perm.apply(&[5, 6, 7]).unwrap(), vec![5, 6, 7]);
}

#[test]
fn test_permute_rows_matches_apply() {
    let perm = Permutation::from_forward(vec![2, 0, 1]).unwrap();
    let t = Tensor::new(&[[0f32, 0.5], [1.0, 1.5], [2.0, 2.5]], &Device::Cpu).unwrap();
    let shuffled = perm.permute_rows(&t).unwrap();
    assert_eq!(
        shuffled.to_vec2::<f32>().unwrap(),
        vec![vec![2.0, 2.5], vec![0.0, 0.5], vec![1.0, 1.5]]
    );
    let restored = perm.restore_rows(&shuffled).unwrap();
    assert_eq!(restored.to_vec2::<f32>().unwrap(), t.to_vec2::<f32>().unwrap());
}

#[test]
fn test_permute_rows_wrong_row_count() {
    let perm = Permutation::from_forward(vec![1, 0]).unwrap();
    let t = Tensor::zeros((3, 2), candle_core::DType::F32, &Device::Cpu).unwrap();
    assert!(perm.permute_rows(&t).unwrap_err().is_shape());
}

#[test]
fn test_shuffler_for_batch() {
    let shuffler = BatchShuffler::for_batch(BatchDims::new(4, 5)).unwrap();
    assert_eq!(shuffler.len(), 20);
    assert!(BatchShuffler::new(0).unwrap_err().is_invalid_input());
}
