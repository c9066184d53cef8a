//! Relative (delta) encoding of grids
//!
//! Each column is encoded along the time axis:
//!
//! ```text
//! relative[x, 0] = absolute[x, 0]
//! relative[x, y] = absolute[x, y] - absolute[x, y - 1]
//! ```
//!
//! `make_absolute` is the prefix sum that reverses it. Integer grids use
//! wrapping arithmetic so the round trip is exact for every input. Decimal
//! grids take the difference of the IEEE 754 bit patterns, read as `i64`,
//! instead of a float subtraction. Neighbouring samples of similar magnitude
//! still give small deltas, and every value (NaN payloads included) comes back
//! bit for bit.
//!
//! This encoding is an optional space optimization and is not used by the
//! storage read/write path.

use crate::chunk::grid::{DoubleArray2, IntArray2};

pub trait RelativeEncoding: Sized {
    fn make_relative(&self) -> Self;

    fn make_absolute(&self) -> Self;
}

impl RelativeEncoding for IntArray2 {
    fn make_relative(&self) -> Self {
        let mut result = self.clone();
        for x in 0..self.width() {
            for y in 1..self.height() {
                result.set(x, y, self.get(x, y).wrapping_sub(self.get(x, y - 1)));
            }
        }
        result
    }

    fn make_absolute(&self) -> Self {
        let mut result = self.clone();
        for x in 0..self.width() {
            for y in 1..self.height() {
                let previous = result.get(x, y - 1);
                result.set(x, y, previous.wrapping_add(self.get(x, y)));
            }
        }
        result
    }
}

impl RelativeEncoding for DoubleArray2 {
    fn make_relative(&self) -> Self {
        let mut result = self.clone();
        for x in 0..self.width() {
            for y in 1..self.height() {
                let delta = bits(self.get(x, y)).wrapping_sub(bits(self.get(x, y - 1)));
                result.set(x, y, from_bits(delta));
            }
        }
        result
    }

    fn make_absolute(&self) -> Self {
        let mut result = self.clone();
        for x in 0..self.width() {
            for y in 1..self.height() {
                let value = bits(result.get(x, y - 1)).wrapping_add(bits(self.get(x, y)));
                result.set(x, y, from_bits(value));
            }
        }
        result
    }
}

fn bits(value: f64) -> i64 {
    value.to_bits() as i64
}

fn from_bits(bits: i64) -> f64 {
    f64::from_bits(bits as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn same_bits(a: &DoubleArray2, b: &DoubleArray2) -> bool {
        a.width() == b.width()
            && a.height() == b.height()
            && a
                .data()
                .iter()
                .zip(b.data())
                .all(|(x, y)| x.to_bits() == y.to_bits())
    }

    #[test]
    fn test_relative_decimal_columns() {
        // two series, three timestamps
        let grid = DoubleArray2::from_data(2, 3, vec![10.0, 1.0, 12.0, 4.0, 11.0, 9.0]);
        let relative = grid.make_relative();
        // first row stays absolute
        assert_eq!(relative.get(0, 0), 10.0);
        assert_eq!(relative.get(1, 0), 1.0);
        assert_eq!(relative.get(0, 1).to_bits() as i64, bits(12.0) - bits(10.0));
        assert_eq!(relative.make_absolute(), grid);
    }

    #[test]
    fn test_relative_mixed_magnitudes_are_exact() {
        let values = vec![1.0, 1e-20, 0.1, 0.3, f64::MAX, -0.0, f64::MIN_POSITIVE, -1e300, 5e-324, 0.0];
        let grid = DoubleArray2::from_data(1, values.len(), values);
        assert!(same_bits(&grid.make_relative().make_absolute(), &grid));

        let grid = DoubleArray2::from_data(2, 3, vec![1e16, 1.0, 1.0, 1e-20, 1e16 + 2.0, 0.3]);
        let round_trip = grid.make_relative().make_absolute();
        assert!(same_bits(&round_trip, &grid));
        assert_eq!(round_trip.get(1, 1), 1e-20);
    }

    #[test]
    fn test_relative_int_round_trip() {
        let grid = IntArray2::from_data(
            3,
            4,
            vec![1, i32::MAX, -1, 5, i32::MIN, -2, 3, 0, 1 << 30, 3, 7, -1],
        );
        let relative = grid.make_relative();
        assert_eq!(relative.get(0, 1), 4);
        assert_eq!(relative.make_absolute(), grid);
    }

    #[test]
    fn test_relative_gaps_round_trip() {
        let grid = DoubleArray2::from_data(
            1,
            6,
            vec![1.0, f64::NAN, 3.0, 4.0, f64::INFINITY, 2.0],
        );
        assert!(same_bits(&grid.make_relative().make_absolute(), &grid));

        let all_nan = DoubleArray2::new(2, 3, f64::NAN);
        assert!(same_bits(&all_nan.make_relative().make_absolute(), &all_nan));
    }

    #[test]
    fn test_relative_empty_grids() {
        for (w, h) in [(0, 0), (0, 3), (3, 0)] {
            let doubles = DoubleArray2::new(w, h, 0.0);
            assert_eq!(doubles.make_relative().make_absolute(), doubles);
            let ints = IntArray2::new(w, h, 0);
            assert_eq!(ints.make_relative().make_absolute(), ints);
        }
    }
}
