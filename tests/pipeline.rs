//! End-to-end checks of the centroid, similarity, loss and EER pipeline on
//! hand-constructed batches with known answers.

mod common;

use candle_core::Device;
use ge2e::centroid::{centroids, leave_one_out_centroids};
use ge2e::eer::{EerEvaluator, ThresholdGrid, find_eer};
use ge2e::loss::{Ge2eLoss, LossConfig, LossPolicy, Reduction};
use ge2e::similarity::similarity_tensor;

use common::fixtures::{
    direction_batch, dot, max_abs_diff, separated, similarity, speaker_directions,
};

#[test]
fn test_identical_utterances_centroids_are_speaker_directions() {
    let batch = direction_batch(4);
    let centers = centroids(&batch).expect("centroids");
    let expected: Vec<Vec<f32>> = speaker_directions().iter().map(|d| d.to_vec()).collect();

    let got = centers.to_vec2::<f32>().expect("to_vec2");
    for (row, want) in got.iter().zip(&expected) {
        for (a, b) in row.iter().zip(want) {
            assert!((a - b).abs() < 1e-6, "{row:?} vs {want:?}");
        }
    }

    let loo = leave_one_out_centroids(&batch, &centers).expect("loo");
    let broadcast = centers
        .unsqueeze(1)
        .and_then(|c| c.broadcast_as((4, 4, 3)))
        .expect("broadcast");
    assert!(max_abs_diff(&loo, &broadcast) < 1e-6);
}

#[test]
fn test_identical_utterances_similarity_matches_direction_cosines() {
    let batch = direction_batch(4);
    let centers = centroids(&batch).unwrap();
    let sim = similarity_tensor(&batch, &centers).unwrap();
    assert_eq!(sim.dims(), &[4, 4, 4]);

    let dirs = speaker_directions();
    let values = sim.to_vec3::<f32>().unwrap();
    for s in 0..4 {
        for u in 0..4 {
            for k in 0..4 {
                let expected = if k == s { 1.0 } else { dot(&dirs[s], &dirs[k]) };
                let got = values[s][u][k] as f64;
                assert!((got - expected).abs() < 1e-5, "S[{s},{u},{k}] = {got}");
            }
        }
    }
}

#[test]
fn test_identical_utterances_softmax_loss_closed_form() {
    let batch = direction_batch(4);
    let loss = Ge2eLoss::new(LossConfig::default(), &Device::Cpu).unwrap();
    let value = loss.forward(&batch).unwrap().to_scalar::<f32>().unwrap() as f64;

    // S'[s,u,k] = 10 * cos(e_s, e_k) - 5, identical for every u.
    let dirs = speaker_directions();
    let mut expected = 0.0;
    for s in 0..4 {
        let logits: Vec<f64> = (0..4)
            .map(|k| {
                let cos = if k == s { 1.0 } else { dot(&dirs[s], &dirs[k]) };
                10.0 * cos - 5.0
            })
            .collect();
        let lse = logits.iter().map(|l| l.exp()).sum::<f64>().ln();
        expected += 4.0 * (lse - logits[s]);
    }

    assert!(value >= 0.0);
    assert!(
        (value - expected).abs() < 2e-5,
        "loss {value} vs closed form {expected}"
    );
}

#[test]
fn test_identical_utterances_contrast_loss_closed_form() {
    let batch = direction_batch(4);
    let config = LossConfig {
        policy: LossPolicy::Contrast,
        reduction: Reduction::Mean,
        ..Default::default()
    };
    let loss = Ge2eLoss::new(config, &Device::Cpu).unwrap();
    let value = loss.forward(&batch).unwrap().to_scalar::<f32>().unwrap() as f64;

    let sigmoid = |x: f64| 1.0 / (1.0 + (-x).exp());
    let dirs = speaker_directions();
    let mut expected = 0.0;
    for s in 0..4 {
        let hardest = (0..4)
            .filter(|&k| k != s)
            .map(|k| sigmoid(10.0 * dot(&dirs[s], &dirs[k]) - 5.0))
            .fold(f64::MIN, f64::max);
        expected += 1.0 - sigmoid(5.0) + hardest;
    }
    expected /= 4.0;

    assert!((value - expected).abs() < 1e-5, "loss {value} vs {expected}");
}

#[test]
fn test_identical_utterances_have_zero_eer() {
    let batch = direction_batch(4);
    let centers = centroids(&batch).unwrap();
    let sim = similarity_tensor(&batch, &centers).unwrap();

    let result = EerEvaluator::default().evaluate(&sim).unwrap();
    assert_eq!(result.eer, 0.0);
    assert!(result.threshold > 0.0 && result.threshold < 1.0);
}

#[test]
fn test_crafted_tensor_balances_at_point_seven() {
    // One genuine score at 0.65 is rejected from 0.7 on; one impostor score
    // at 0.75 is accepted up to 0.7. Both rates are 1/10 at 0.7.
    let (n, m) = (2, 5);
    let mut data = separated(n, m, 0.95, 0.1);
    data[4 * n] = 0.65;
    data[(m + 2) * n] = 0.75;
    let sim = similarity(data, n, m);

    let grid = ThresholdGrid::new(vec![0.5, 0.6, 0.7, 0.8, 0.9]).unwrap();
    let result = find_eer(&sim, grid.values()).unwrap();
    assert_eq!(result.threshold, 0.7);
    assert!((result.eer - 0.1).abs() < 1e-12);
    assert!((result.far - 0.1).abs() < 1e-12);
    assert!((result.frr - 0.1).abs() < 1e-12);
}

#[test]
fn test_uniform_scores_give_half_eer() {
    let sim = similarity(vec![0.5; 3 * 4 * 3], 3, 4);
    let result = EerEvaluator::default().evaluate(&sim).unwrap();
    assert_eq!(result.far, 0.0);
    assert_eq!(result.frr, 1.0);
    assert_eq!(result.eer, 0.5);
}
