use serde::{
    Serialize,
    Serializer,
};

use crate::errors::{
    DataProcessingError,
    Result,
};

/// Simple dense 2D array.
///
/// `values` is a flattened array of values
/// `major_dim` is the number of values in each row (the image width)
/// `minor_dim` is the number of rows (the image height)
///
/// Note on memory layout:
///
/// Values that belong to the same row are adjacent
/// in memory, so `get(row, col)` maps to `values[row * major_dim + col]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Array2D<T: Clone + Copy> {
    pub(super) values: Vec<T>,
    pub(super) major_dim: usize,
    pub(super) minor_dim: usize,
}

impl<T: Clone + Copy> Array2D<T> {
    pub fn new<S: AsRef<[T]>, C: AsRef<[S]>>(values: C) -> Result<Array2D<T>> {
        let nrows = values.as_ref().len();
        if nrows == 0 {
            return Err(DataProcessingError::ExpectedNonEmptyData {
                context: Some("building a 2D array".into()),
            }
            .into());
        }
        let ncols = values.as_ref()[0].as_ref().len();

        let mut flat = Vec::with_capacity(nrows * ncols);
        for row in values.as_ref() {
            let row = row.as_ref();
            if row.len() != ncols {
                return Err(DataProcessingError::ExpectedSlicesSameLength {
                    expected: ncols,
                    other: row.len(),
                    context: "rows of a 2D array".into(),
                }
                .into());
            }
            flat.extend_from_slice(row);
        }

        Ok(Array2D {
            values: flat,
            major_dim: ncols,
            minor_dim: nrows,
        })
    }

    pub fn new_filled(value: T, nrows: usize, ncols: usize) -> Array2D<T> {
        Array2D {
            values: vec![value; nrows * ncols],
            major_dim: ncols,
            minor_dim: nrows,
        }
    }

    pub fn from_flat_vector(values: Vec<T>, nrows: usize, ncols: usize) -> Result<Array2D<T>> {
        if values.len() != nrows * ncols {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: nrows * ncols,
                other: values.len(),
                context: "flat values for a 2D array".into(),
            }
            .into());
        }
        Ok(Array2D {
            values,
            major_dim: ncols,
            minor_dim: nrows,
        })
    }

    /// Apply a function to each row of the array
    ///
    /// Example:
    /// ```
    /// use msiquery::models::Array2D;
    /// let array = Array2D::new(vec![vec![1, 2, 3], vec![4, 5, 6]]).unwrap();
    /// let result: Vec<u32> = array.row_apply(|x| x.iter().sum()).collect();
    /// assert_eq!(result, vec![6, 15]);
    /// ```
    pub fn row_apply<'a: 'b, 'b, W, F: FnMut(&[T]) -> W + 'b>(
        &'a self,
        f: F,
    ) -> impl Iterator<Item = W> + 'b {
        // chunks(0) panics, zero-width arrays have no rows to visit
        let width = self.major_dim.max(1);
        let take = if self.major_dim == 0 { 0 } else { self.minor_dim };
        self.values.chunks(width).take(take).map(f)
    }

    pub fn get(&self, row_idx: usize, col_idx: usize) -> Option<T> {
        if row_idx >= self.minor_dim || col_idx >= self.major_dim {
            return None;
        }
        Some(self.values[row_idx * self.major_dim + col_idx])
    }

    /// Writes a value, failing when the position lies outside the array.
    pub fn try_insert(&mut self, row_idx: usize, col_idx: usize, value: T) -> Option<()> {
        if row_idx >= self.minor_dim || col_idx >= self.major_dim {
            return None;
        }
        self.values[row_idx * self.major_dim + col_idx] = value;
        Some(())
    }

    pub fn nrows(&self) -> usize {
        self.minor_dim
    }

    pub fn ncols(&self) -> usize {
        self.major_dim
    }

    /// (height, width)
    pub fn shape(&self) -> (usize, usize) {
        (self.minor_dim, self.major_dim)
    }

    pub fn to_rows(&self) -> Vec<Vec<T>> {
        self.row_apply(|row| row.to_vec()).collect()
    }
}

impl<T: Clone + Copy + Serialize> Serialize for Array2D<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        // Nested rows, the shape image viewers expect
        serializer.collect_seq(self.row_apply(|row| row.to_vec()))
    }
}

/// Dense raster of reduced intensities, `image[y - 1][x - 1]`.
pub type IonImage = Array2D<f64>;

impl IonImage {
    pub fn max_value(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }

    pub fn count_nonzero(&self) -> usize {
        self.values.iter().filter(|v| **v != 0.0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array2d_new() -> Result<()> {
        let values = vec![vec![1, 2, 3], vec![4, 5, 6]];
        let array = Array2D::new(&values)?;

        assert_eq!(array.major_dim, 3); // columns
        assert_eq!(array.minor_dim, 2); // rows

        // Values in same row should be adjacent
        assert_eq!(array.values, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(array.get(1, 0), Some(4));
        assert_eq!(array.get(2, 0), None);
        Ok(())
    }

    #[test]
    fn test_array2d_error_handling() {
        let invalid_values = vec![vec![1, 2, 3], vec![4, 5]];
        assert!(Array2D::new(&invalid_values).is_err());

        let empty_values: Vec<Vec<i32>> = vec![];
        assert!(Array2D::new(&empty_values).is_err());

        assert!(Array2D::from_flat_vector(vec![1, 2, 3], 2, 2).is_err());
    }

    #[test]
    fn test_insertion() {
        let mut array = Array2D::new_filled(0, 2, 3);
        assert_eq!(array.try_insert(0, 0, 7), Some(()));
        assert_eq!(array.try_insert(1, 2, 8), Some(()));
        assert_eq!(array.try_insert(2, 0, 9), None);
        assert_eq!(array.try_insert(0, 3, 9), None);
        assert_eq!(array.values, vec![7, 0, 0, 0, 0, 8]);
    }

    #[test]
    fn test_zero_width_rows() {
        let array: Array2D<f64> = Array2D::new_filled(0.0, 3, 0);
        assert_eq!(array.to_rows().len(), 0);
        assert_eq!(array.shape(), (3, 0));
    }

    #[test]
    fn test_serialize_as_rows() {
        let image = IonImage::new(vec![vec![1.0, 0.0], vec![0.0, 2.5]]).unwrap();
        let json = serde_json::to_string(&image).unwrap();
        assert_eq!(json, "[[1.0,0.0],[0.0,2.5]]");
        assert_eq!(image.max_value(), 2.5);
        assert_eq!(image.count_nonzero(), 2);
    }
}
