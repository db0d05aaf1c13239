use ndarray::{Array2, ArrayView2, Axis};

/// `1/x` with the convention `1/0 = 0`.
#[inline]
pub fn pseudo_reciprocal(x: f64) -> f64 {
    if x == 0.0 { 0.0 } else { 1.0 / x }
}

/// Divide each column by its sum; all-zero columns stay zero.
pub fn normalize_columns(a: &mut Array2<f64>) {
    let sums = a.sum_axis(Axis(0)).mapv(pseudo_reciprocal);
    *a *= &sums.insert_axis(Axis(0));
}

/// Maximum absolute row sum of a dense block.
pub fn exact_inf_norm(a: ArrayView2<f64>) -> f64 {
    a.rows()
        .into_iter()
        .map(|row| row.iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

/// Maximum absolute column sum of a dense block.
pub fn exact_one_norm(a: ArrayView2<f64>) -> f64 {
    a.columns()
        .into_iter()
        .map(|col| col.iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

pub fn all_finite(a: ArrayView2<f64>) -> bool {
    a.iter().all(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn zero_columns_stay_zero() {
        let mut a = array![[1.0, 0.0, 2.0], [3.0, 0.0, 2.0]];
        normalize_columns(&mut a);
        assert_eq!(a, array![[0.25, 0.0, 0.5], [0.75, 0.0, 0.5]]);
        assert_eq!(pseudo_reciprocal(0.0), 0.0);
        assert_eq!(pseudo_reciprocal(4.0), 0.25);
    }

    #[test]
    fn dense_norms() {
        let a = array![[1.0, -2.0], [-3.0, 0.5]];
        assert_eq!(exact_one_norm(a.view()), 4.0);
        assert_eq!(exact_inf_norm(a.view()), 3.5);
        assert!(!all_finite(array![[f64::NAN]].view()));
    }
}
