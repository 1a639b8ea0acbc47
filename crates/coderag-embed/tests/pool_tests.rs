use candle_core::{Device, Tensor, DType};
use coderag_embed::masked_mean_l2;
use coderag_embed::tokenize::{pad_rows, PAD_ID};

#[test]
fn masked_mean_l2_basic() {
    let dev = Device::Cpu;
    // Two tokens with hidden dim 4; second token is masked out.
    let h = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0,
                                 5.0, 6.0, 7.0, 8.0],
                               (1, 2, 4), &dev).unwrap();
    let mask = Tensor::from_slice(&[1i64, 0i64], (1, 2), &dev).unwrap()
        .to_dtype(DType::F32).unwrap();
    let out = masked_mean_l2(&h, &mask).unwrap();
    let v: Vec<Vec<f32>> = out.to_vec2().unwrap();
    let v = &v[0];
    let norm: f32 = (1.0f32*1.0 + 2.0*2.0 + 3.0*3.0 + 4.0*4.0).sqrt();
    let expected = [1.0/norm, 2.0/norm, 3.0/norm, 4.0/norm];
    for (a,b) in v.iter().cloned().zip(expected) {
        assert!((a - b).abs() < 1e-5, "a={} b={}", a, b);
    }
}

#[test]
fn masked_mean_l2_rejects_wrong_rank() {
    let dev = Device::Cpu;
    let h = Tensor::zeros((2, 4), DType::F32, &dev).unwrap();
    let mask = Tensor::ones((2, 1), DType::F32, &dev).unwrap();
    assert!(masked_mean_l2(&h, &mask).is_err());
}

#[test]
fn pad_rows_pads_to_longest_and_caps() {
    let long: (&[u32], &[u32]) = (&[0, 7, 2], &[1, 1, 1]);
    let short: (&[u32], &[u32]) = (&[0, 2], &[1, 1]);
    let (ids, mask) = pad_rows(&[long, short], 8, &Device::Cpu).unwrap();
    assert_eq!(ids.to_vec2::<u32>().unwrap(), vec![vec![0, 7, 2], vec![0, 2, PAD_ID]]);
    assert_eq!(mask.to_vec2::<u32>().unwrap(), vec![vec![1, 1, 1], vec![1, 1, 0]]);

    let over: (&[u32], &[u32]) = (&[0, 7, 7, 7, 2], &[1, 1, 1, 1, 1]);
    let (ids, _) = pad_rows(&[over], 2, &Device::Cpu).unwrap();
    assert_eq!(ids.dims(), &[1, 2]);
}
