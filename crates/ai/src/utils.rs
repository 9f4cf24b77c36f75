use candle_core::Device;
use ndarray::{s, Array1};

/// L2-normalize an embedding. A zero vector is returned unchanged.
pub fn normalize(v: Array1<f32>) -> Array1<f32> {
    let norm = v.dot(&v).sqrt();
    if norm > 0.0 {
        v / norm
    } else {
        v
    }
}

/// Right-pad `arr` with zeros up to `len`; longer inputs are truncated.
pub fn pad_with_zeros(arr: &Array1<i64>, len: usize) -> Array1<i64> {
    let mut padded = Array1::zeros(len);
    let n = arr.len().min(len);
    padded.slice_mut(s![..n]).assign(&arr.slice(s![..n]));
    padded
}

/// Element-wise mean of two embeddings of the same dimension.
///
/// The result is not re-normalized, so its norm is at most the larger of the
/// two input norms.
pub fn embedding_average(a: &[f32], b: &[f32]) -> anyhow::Result<Vec<f32>> {
    if a.len() != b.len() {
        anyhow::bail!(
            "embedding dimension mismatch: {} vs {}",
            a.len(),
            b.len()
        );
    }

    Ok(a.iter().zip(b).map(|(x, y)| (x + y) / 2.0).collect())
}

/// Device candle models run on, picked by the enabled cargo features.
pub fn device() -> candle_core::Result<Device> {
    #[cfg(feature = "cuda")]
    {
        return Device::new_cuda(0);
    }

    #[cfg(all(feature = "metal", not(feature = "cuda")))]
    {
        return Device::new_metal(0);
    }

    #[allow(unreachable_code)]
    Ok(Device::Cpu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn test_normalize() {
        let v = normalize(arr1(&[3.0, 4.0]));
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let zero = normalize(arr1(&[0.0, 0.0]));
        assert_eq!(zero, arr1(&[0.0, 0.0]));
    }

    #[test]
    fn test_pad_with_zeros() {
        assert_eq!(pad_with_zeros(&arr1(&[1, 2, 3]), 5), arr1(&[1, 2, 3, 0, 0]));
        assert_eq!(pad_with_zeros(&arr1(&[1, 2, 3]), 2), arr1(&[1, 2]));
    }

    #[test]
    fn test_embedding_average() {
        let avg = embedding_average(&[1.0, 0.0, -1.0], &[0.0, 1.0, 1.0]).unwrap();
        assert_eq!(avg, vec![0.5, 0.5, 0.0]);

        // unit inputs pointing different ways give a shorter vector
        let avg = embedding_average(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        let norm = avg.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 0.5f32.sqrt()).abs() < 1e-6);

        assert!(embedding_average(&[1.0], &[1.0, 2.0]).is_err());
        assert!(embedding_average(&[], &[]).unwrap().is_empty());
    }
}
