// Array helpers shared by the dataset loaders
//
//   one_hot: class indices → [N, num_classes] indicator rows
//   partial_flatten: [N, H, W] → [N, H*W], keeping the example axis
//   chunk_range: the contiguous slice of [0, len) owned by one worker
//   worker_chunk: apply chunk_range to axis 0 of any array

use std::ops::Range;

use ndarray::{Array, Array2, Array3, ArrayBase, Axis, Data, Dimension, Slice};

use crate::error::{Error, Result};

/// One-hot encode `labels` into rows of width `num_classes`.
///
/// Fails with a format error when a label does not name a class.
pub fn one_hot<S>(labels: &ArrayBase<S, ndarray::Ix1>, num_classes: usize) -> Result<Array2<u8>>
where
    S: Data<Elem = u8>,
{
    let mut out = Array2::<u8>::zeros((labels.len(), num_classes));
    for (i, &label) in labels.iter().enumerate() {
        let class = label as usize;
        if class >= num_classes {
            return Err(Error::format(format!(
                "label {label} at index {i} is outside 0..{num_classes}"
            )));
        }
        out[[i, class]] = 1;
    }
    Ok(out)
}

/// Collapse every axis after the first into one.
///
/// `[N, H, W]` → `[N, H*W]`, row-major within each example.
pub fn partial_flatten<T: Clone>(x: Array3<T>) -> Result<Array2<T>> {
    let (n, rows, cols) = x.dim();
    let x = if x.is_standard_layout() {
        x
    } else {
        x.as_standard_layout().into_owned()
    };
    x.into_shape((n, rows * cols))
        .map_err(|e| Error::format(format!("cannot flatten [{n}, {rows}, {cols}]: {e}")))
}

/// Contiguous range of `[0, len)` owned by `worker_id` out of `num_workers`.
///
/// The first `len % num_workers` workers take one extra element, so the
/// ranges of all workers tile `[0, len)` exactly.
pub fn chunk_range(len: usize, worker_id: usize, num_workers: usize) -> Result<Range<usize>> {
    if num_workers == 0 {
        return Err(Error::config("num_workers must be at least 1"));
    }
    if worker_id >= num_workers {
        return Err(Error::config(format!(
            "worker_id {worker_id} out of range for {num_workers} workers"
        )));
    }
    let base = len / num_workers;
    let extra = len % num_workers;
    let start = worker_id * base + worker_id.min(extra);
    let size = base + usize::from(worker_id < extra);
    Ok(start..start + size)
}

/// Keep only `worker_id`'s contiguous share of axis 0.
pub fn worker_chunk<A, S, D>(
    x: &ArrayBase<S, D>,
    worker_id: usize,
    num_workers: usize,
) -> Result<Array<A, D>>
where
    A: Clone,
    S: Data<Elem = A>,
    D: Dimension,
{
    if x.ndim() == 0 {
        return Err(Error::config("cannot chunk a zero-dimensional array"));
    }
    let range = chunk_range(x.len_of(Axis(0)), worker_id, num_workers)?;
    Ok(x.slice_axis(Axis(0), Slice::from(range)).to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2, Array1};

    #[test]
    fn test_one_hot() {
        let labels = arr1(&[0u8, 3, 9]);
        let oh = one_hot(&labels, 10).unwrap();
        assert_eq!(oh.dim(), (3, 10));
        for (row, &label) in oh.rows().into_iter().zip(labels.iter()) {
            assert_eq!(row.sum(), 1);
            assert_eq!(row[label as usize], 1);
        }
    }

    #[test]
    fn test_one_hot_out_of_range() {
        let labels = arr1(&[1u8, 10]);
        let err = one_hot(&labels, 10).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_partial_flatten() {
        let x = Array3::from_shape_vec((2, 2, 3), (0u8..12).collect()).unwrap();
        let flat = partial_flatten(x).unwrap();
        assert_eq!(flat.dim(), (2, 6));
        assert_eq!(flat.row(1).to_vec(), vec![6, 7, 8, 9, 10, 11]);
    }

    #[test]
    fn test_partial_flatten_non_standard_layout() {
        let x = Array3::from_shape_vec((2, 2, 2), (0u8..8).collect()).unwrap();
        let swapped = x.permuted_axes([0, 2, 1]);
        let flat = partial_flatten(swapped).unwrap();
        assert_eq!(flat.row(0).to_vec(), vec![0, 2, 1, 3]);
    }

    #[test]
    fn test_chunk_range_even() {
        assert_eq!(chunk_range(10, 0, 2).unwrap(), 0..5);
        assert_eq!(chunk_range(10, 1, 2).unwrap(), 5..10);
    }

    #[test]
    fn test_chunk_range_uneven_tiles() {
        let len = 11;
        let n = 4;
        let mut next = 0;
        for w in 0..n {
            let r = chunk_range(len, w, n).unwrap();
            assert_eq!(r.start, next);
            next = r.end;
        }
        assert_eq!(next, len);
        assert_eq!(chunk_range(len, 0, n).unwrap().len(), 3);
        assert_eq!(chunk_range(len, 3, n).unwrap().len(), 2);
    }

    #[test]
    fn test_chunk_range_more_workers_than_items() {
        assert_eq!(chunk_range(2, 3, 4).unwrap().len(), 0);
    }

    #[test]
    fn test_chunk_range_invalid() {
        assert!(matches!(chunk_range(10, 0, 0), Err(Error::Config(_))));
        assert!(matches!(chunk_range(10, 2, 2), Err(Error::Config(_))));
    }

    #[test]
    fn test_worker_chunk_2d() {
        let x = arr2(&[[0, 0], [1, 1], [2, 2]]);
        let c = worker_chunk(&x, 1, 2).unwrap();
        assert_eq!(c, arr2(&[[2, 2]]));
    }

    #[test]
    fn test_worker_chunk_1d() {
        let x: Array1<u8> = (0..6).collect();
        assert_eq!(worker_chunk(&x, 0, 3).unwrap(), arr1(&[0, 1]));
    }
}
