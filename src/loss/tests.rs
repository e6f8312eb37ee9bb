use super::*;
use candle_core::{Device, Tensor};
use candle_nn::Optimizer;

fn sim(data: Vec<f32>, n: usize, m: usize) -> Tensor {
    Tensor::from_vec(data, (n, m, n), &Device::Cpu).unwrap()
}

fn small_sim() -> Tensor {
    sim(vec![0.8, 0.1, 0.3, 0.6], 2, 1)
}

fn sigmoid_f64(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn loss_with(policy: LossPolicy, reduction: Reduction) -> Ge2eLoss {
    let config = LossConfig {
        policy,
        reduction,
        ..Default::default()
    };
    Ge2eLoss::new(config, &Device::Cpu).unwrap()
}

fn scalar(t: &Tensor) -> f64 {
    t.to_scalar::<f32>().unwrap() as f64
}

mod config_tests {
    use super::*;

    #[test]
    fn test_loss_config_default() {
        let config = LossConfig::default();
        assert_eq!(config.policy, LossPolicy::Softmax);
        assert_eq!(config.reduction, Reduction::Sum);
        assert_eq!(config.initial_scale, 10.0);
        assert_eq!(config.initial_bias, -5.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("softmax".parse::<LossPolicy>().unwrap(), LossPolicy::Softmax);
        assert_eq!("Contrast".parse::<LossPolicy>().unwrap(), LossPolicy::Contrast);
        assert_eq!(" contrastive ".parse::<LossPolicy>().unwrap(), LossPolicy::Contrast);
        assert!("hinge".parse::<LossPolicy>().is_err());
        assert_eq!(LossPolicy::Contrast.to_string(), "contrast");
    }

    #[test]
    fn test_reduction_from_str() {
        assert_eq!("MEAN".parse::<Reduction>().unwrap(), Reduction::Mean);
        assert_eq!("sum".parse::<Reduction>().unwrap(), Reduction::Sum);
        assert!("max".parse::<Reduction>().is_err());
    }

    #[test]
    fn test_validate_rejects_non_positive_scale() {
        for scale in [0.0, -1.0, f64::NAN] {
            let config = LossConfig {
                initial_scale: scale,
                ..Default::default()
            };
            assert!(config.validate().unwrap_err().is_invalid_input());
        }
    }

    #[test]
    fn test_validate_rejects_non_finite_bias() {
        let config = LossConfig {
            initial_bias: f64::INFINITY,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}

#[test]
fn test_initial_calibration() {
    let loss = loss_with(LossPolicy::Softmax, Reduction::Sum);
    assert!((loss.scale().unwrap() - 10.0).abs() < 1e-4);
    assert!((loss.bias().unwrap() + 5.0).abs() < 1e-6);
    assert_eq!(loss.vars().len(), 2);
}

#[test]
fn test_set_calibration() {
    let loss = loss_with(LossPolicy::Softmax, Reduction::Sum);
    loss.set_calibration(2.0, 0.5).unwrap();
    assert!((loss.scale().unwrap() - 2.0).abs() < 1e-5);
    assert!((loss.bias().unwrap() - 0.5).abs() < 1e-6);
    assert!(loss.set_calibration(0.0, 0.0).unwrap_err().is_invalid_input());
}

#[test]
fn test_calibrate_is_affine() {
    let loss = loss_with(LossPolicy::Softmax, Reduction::Sum);
    let out = loss.calibrate(&small_sim()).unwrap();
    let v = out.flatten_all().unwrap().to_vec1::<f32>().unwrap();
    let expected = [3.0, -4.0, -2.0, 1.0];
    for (a, b) in v.iter().zip(expected) {
        assert!((a - b).abs() < 1e-4);
    }
}

#[test]
fn test_softmax_per_utterance_matches_closed_form() {
    let loss = loss_with(LossPolicy::Softmax, Reduction::Sum);
    let per = loss.per_utterance(&small_sim()).unwrap().to_vec2::<f32>().unwrap();
    let row0 = -3.0 + (3.0f64.exp() + (-4.0f64).exp()).ln();
    let row1 = -1.0 + ((-2.0f64).exp() + 1.0f64.exp()).ln();
    assert!((per[0][0] as f64 - row0).abs() < 1e-4);
    assert!((per[1][0] as f64 - row1).abs() < 1e-4);

    let total = scalar(&loss.loss(&small_sim()).unwrap());
    assert!((total - (row0 + row1)).abs() < 1e-4);
}

#[test]
fn test_contrast_per_utterance_matches_closed_form() {
    let loss = loss_with(LossPolicy::Contrast, Reduction::Mean);
    let per = loss.per_utterance(&small_sim()).unwrap().to_vec2::<f32>().unwrap();
    let row0 = 1.0 - sigmoid_f64(3.0) + sigmoid_f64(-4.0);
    let row1 = 1.0 - sigmoid_f64(1.0) + sigmoid_f64(-2.0);
    assert!((per[0][0] as f64 - row0).abs() < 1e-5);
    assert!((per[1][0] as f64 - row1).abs() < 1e-5);

    let mean = scalar(&loss.loss(&small_sim()).unwrap());
    assert!((mean - (row0 + row1) / 2.0).abs() < 1e-5);
}

#[test]
fn test_sum_is_mean_times_rows() {
    let s = sim(
        vec![
            0.9, 0.2, 0.1, 0.7, 0.3, 0.2, //
            0.1, 0.8, 0.4, 0.2, 0.6, 0.5, //
            0.3, 0.1, 0.9, 0.2, 0.0, 0.5,
        ],
        3,
        2,
    );
    let sum = scalar(&loss_with(LossPolicy::Softmax, Reduction::Sum).loss(&s).unwrap());
    let mean = scalar(&loss_with(LossPolicy::Softmax, Reduction::Mean).loss(&s).unwrap());
    assert!((sum - mean * 6.0).abs() < 1e-4);
}

#[test]
fn test_loss_non_negative_and_decreasing() {
    for policy in [LossPolicy::Softmax, LossPolicy::Contrast] {
        let loss = loss_with(policy, Reduction::Sum);
        loss.set_calibration(3.0, 0.0).unwrap();
        let mut previous = f64::INFINITY;
        for own in [-0.5f32, 0.0, 0.3, 0.6, 0.9] {
            let s = sim(vec![own, 0.4, 0.2, 0.7], 2, 1);
            let value = scalar(&loss.loss(&s).unwrap());
            assert!(value >= 0.0, "{policy} loss negative: {value}");
            assert!(value < previous, "{policy} loss did not decrease at {own}");
            previous = value;
        }
    }
}

#[test]
fn test_loss_rejects_single_speaker() {
    let loss = loss_with(LossPolicy::Softmax, Reduction::Sum);
    let s = sim(vec![0.9, 0.8], 1, 2);
    assert!(loss.loss(&s).unwrap_err().is_invalid_input());
}

#[test]
fn test_loss_rejects_non_square() {
    let loss = loss_with(LossPolicy::Softmax, Reduction::Sum);
    let s = Tensor::zeros((2, 3, 4), candle_core::DType::F32, &Device::Cpu).unwrap();
    assert!(loss.loss(&s).unwrap_err().is_shape());
}

#[test]
fn test_gradients_reach_calibration() {
    for policy in [LossPolicy::Softmax, LossPolicy::Contrast] {
        let loss = loss_with(policy, Reduction::Sum);
        let value = loss.loss(&small_sim()).unwrap();
        let grads = value.backward().unwrap();
        for var in loss.vars() {
            let g = grads.get(var.as_tensor()).expect("calibration gradient");
            assert!(g.to_scalar::<f32>().unwrap().is_finite());
        }
    }
}

#[test]
fn test_forward_gradients_reach_embeddings() {
    let loss = loss_with(LossPolicy::Softmax, Reduction::Sum);
    let e = candle_core::Var::from_tensor(
        &Tensor::new(
            &[
                [[1.0f32, 0.1], [0.9, 0.2], [0.8, -0.1]],
                [[0.1, 1.0], [-0.2, 0.9], [0.0, 0.7]],
            ],
            &Device::Cpu,
        )
        .unwrap(),
    )
    .unwrap();
    let value = loss.forward(e.as_tensor()).unwrap();
    assert!(scalar(&value) >= 0.0);
    let grads = value.backward().unwrap();
    let g = grads.get(e.as_tensor()).expect("embedding gradient");
    assert_eq!(g.dims(), &[2, 3, 2]);
}

#[test]
fn test_forward_with_zero_utterance_has_finite_gradients() {
    for policy in [LossPolicy::Softmax, LossPolicy::Contrast] {
        let loss = loss_with(policy, Reduction::Sum);
        let e = candle_core::Var::from_tensor(
            &Tensor::new(
                &[[[1.0f32, 0.0], [0.0, 0.0]], [[0.0, 1.0], [0.0, 0.9]]],
                &Device::Cpu,
            )
            .unwrap(),
        )
        .unwrap();
        let value = loss.forward(e.as_tensor()).unwrap();
        assert!(scalar(&value).is_finite());

        let grads = value.backward().unwrap();
        let g = grads
            .get(e.as_tensor())
            .expect("embedding gradient")
            .flatten_all()
            .unwrap()
            .to_vec1::<f32>()
            .unwrap();
        assert!(g.iter().all(|x| x.is_finite()), "{policy:?}: grad = {g:?}");
        for var in loss.vars() {
            let cg = grads.get(var.as_tensor()).expect("calibration gradient");
            assert!(cg.to_scalar::<f32>().unwrap().is_finite());
        }
    }
}

#[test]
fn test_scale_stays_positive_after_aggressive_step() {
    let loss = loss_with(LossPolicy::Softmax, Reduction::Sum);
    let mut sgd = candle_nn::SGD::new(loss.vars(), 2.0).unwrap();
    for _ in 0..5 {
        // d sum(S') / dw = sum(S) = 1.8, so an unconstrained w would cross zero on step 3.
        let value = loss.calibrate(&small_sim()).unwrap().sum_all().unwrap();
        sgd.backward_step(&value).unwrap();
        let scale = loss.scale().unwrap();
        assert!(scale > 0.0, "scale went non-positive: {scale}");
    }
}
