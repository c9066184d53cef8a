//! Two dimensional value grids
//!
//! Columns are data series, rows are timestamps. Values are stored row-major
//! so all series of one point in time are adjacent.
//!
//! # Wire format
//!
//! ```text
//! [width: i16 BE][height: i16 BE][row 0 ... row height-1]
//! element: f64 (8 bytes BE) or i32 (4 bytes BE)
//! ```
//!
//! A grid with `width == 0 || height == 0` is encoded as the header alone.

use crate::storage::error::{HistoryError, HistoryResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Write};

const HEADER_SIZE: usize = 4;

/// Element types that can be stored in a grid and encoded big-endian
pub trait GridElement: Copy + PartialEq + fmt::Debug + fmt::Display {
    const ENCODED_SIZE: usize;

    fn write_be(&self, out: &mut Vec<u8>);

    fn read_be(bytes: &[u8]) -> Self;
}

impl GridElement for f64 {
    const ENCODED_SIZE: usize = 8;

    fn write_be(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }

    fn read_be(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes[..8]);
        f64::from_be_bytes(buf)
    }
}

impl GridElement for i32 {
    const ENCODED_SIZE: usize = 4;

    fn write_be(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }

    fn read_be(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&bytes[..4]);
        i32::from_be_bytes(buf)
    }
}

/// A fixed size grid of `width * height` elements
#[derive(Debug, Clone, PartialEq)]
pub struct Array2<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

/// Grid of decimal values
pub type DoubleArray2 = Array2<f64>;

/// Grid of integers (enum sets, reference entry ids)
pub type IntArray2 = Array2<i32>;

impl<T: GridElement> Array2<T> {
    /// Creates a grid filled with `initial`
    pub fn new(width: usize, height: usize, initial: T) -> Self {
        Self {
            width,
            height,
            data: vec![initial; width * height],
        }
    }

    /// Wraps row-major data
    ///
    /// # Panics
    /// Panics if `data.len() != width * height`
    pub fn from_data(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "invalid data size for {}x{} grid",
            width,
            height
        );
        Self {
            width,
            height,
            data,
        }
    }

    pub fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            data: Vec::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    fn offset(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.width, "x {} out of bounds {}", x, self.width);
        debug_assert!(y < self.height, "y {} out of bounds {}", y, self.height);
        y * self.width + x
    }

    /// Value of column `x` in row `y`
    pub fn get(&self, x: usize, y: usize) -> T {
        self.data[self.offset(x, y)]
    }

    pub fn set(&mut self, x: usize, y: usize, value: T) {
        let offset = self.offset(x, y);
        self.data[offset] = value;
    }

    /// All columns of one row
    pub fn row(&self, y: usize) -> &[T] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    pub fn set_row(&mut self, y: usize, values: &[T]) {
        assert_eq!(values.len(), self.width, "invalid row size");
        self.data[y * self.width..(y + 1) * self.width].copy_from_slice(values);
    }

    /// Copies rows `[from, to)` into a new grid
    pub fn rows(&self, from: usize, to: usize) -> Self {
        Self::from_data(
            self.width,
            to - from,
            self.data[from * self.width..to * self.width].to_vec(),
        )
    }

    /// Encodes the grid in the fixed-width big-endian format
    pub fn to_bytes(&self) -> HistoryResult<Vec<u8>> {
        let width = i16::try_from(self.width)
            .map_err(|_| HistoryError::InvalidGrid(format!("width {} too large", self.width)))?;
        let height = i16::try_from(self.height)
            .map_err(|_| HistoryError::InvalidGrid(format!("height {} too large", self.height)))?;

        let mut out = Vec::with_capacity(HEADER_SIZE + self.data.len() * T::ENCODED_SIZE);
        out.extend_from_slice(&width.to_be_bytes());
        out.extend_from_slice(&height.to_be_bytes());

        if self.width == 0 || self.height == 0 {
            return Ok(out);
        }

        for value in &self.data {
            value.write_be(&mut out);
        }
        Ok(out)
    }

    /// Decodes a grid written by `to_bytes`
    pub fn from_bytes(bytes: &[u8]) -> HistoryResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(HistoryError::InvalidGrid(format!(
                "payload too short for header: {} bytes",
                bytes.len()
            )));
        }

        let width = i16::from_be_bytes([bytes[0], bytes[1]]);
        let height = i16::from_be_bytes([bytes[2], bytes[3]]);
        if width < 0 || height < 0 {
            return Err(HistoryError::InvalidGrid(format!(
                "negative dimensions {}x{}",
                width, height
            )));
        }
        let (width, height) = (width as usize, height as usize);

        if width == 0 || height == 0 {
            return Ok(Self {
                width,
                height,
                data: Vec::new(),
            });
        }

        let expected = HEADER_SIZE + width * height * T::ENCODED_SIZE;
        if bytes.len() != expected {
            return Err(HistoryError::InvalidGrid(format!(
                "expected {} bytes for {}x{} grid but got {}",
                expected,
                width,
                height,
                bytes.len()
            )));
        }

        let data = bytes[HEADER_SIZE..]
            .chunks_exact(T::ENCODED_SIZE)
            .map(T::read_be)
            .collect();

        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Renders one row per line, columns separated by tabs
    pub fn as_matrix_string(&self) -> String {
        let mut out = String::new();
        for y in 0..self.height {
            let row: Vec<String> = self.row(y).iter().map(|v| v.to_string()).collect();
            let _ = writeln!(out, "{}", row.join("\t"));
        }
        out
    }
}

impl<T: GridElement> Serialize for Array2<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let bytes = self.to_bytes().map_err(serde::ser::Error::custom)?;
        serializer.serialize_bytes(&bytes)
    }
}

impl<'de, T: GridElement> Deserialize<'de> for Array2<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
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
    fn test_row_major_layout() {
        let mut grid = IntArray2::new(3, 2, 0);
        grid.set(2, 1, 7);
        assert_eq!(grid.data()[5], 7);
        assert_eq!(grid.row(1), &[0, 0, 7]);
        assert_eq!(grid.get(2, 1), 7);
    }

    #[test]
    fn test_double_codec_layout() {
        let grid = DoubleArray2::from_data(2, 1, vec![1.0, -2.5]);
        let bytes = grid.to_bytes().unwrap();
        assert_eq!(&bytes[0..4], &[0, 2, 0, 1]);
        assert_eq!(bytes.len(), 4 + 2 * 8);
        assert_eq!(&bytes[4..12], &1.0f64.to_be_bytes());
        assert_eq!(&bytes[12..20], &(-2.5f64).to_be_bytes());
        assert_eq!(DoubleArray2::from_bytes(&bytes).unwrap(), grid);
    }

    #[test]
    fn test_int_codec_layout() {
        let grid = IntArray2::from_data(1, 2, vec![1, -1]);
        let bytes = grid.to_bytes().unwrap();
        assert_eq!(bytes, vec![0, 1, 0, 2, 0, 0, 0, 1, 0xff, 0xff, 0xff, 0xff]);
        assert_eq!(IntArray2::from_bytes(&bytes).unwrap(), grid);
    }

    #[test]
    fn test_codec_empty_grids() {
        for (w, h) in [(0, 0), (0, 5), (4, 0)] {
            let grid = DoubleArray2::new(w, h, 0.0);
            let bytes = grid.to_bytes().unwrap();
            assert_eq!(bytes.len(), 4);
            let decoded = DoubleArray2::from_bytes(&bytes).unwrap();
            assert_eq!(decoded.width(), w);
            assert_eq!(decoded.height(), h);
            assert!(decoded.is_empty());
        }
    }

    #[test]
    fn test_codec_preserves_nan_and_sentinels() {
        let grid = DoubleArray2::from_data(3, 1, vec![f64::NAN, f64::MAX, -0.0]);
        let decoded = DoubleArray2::from_bytes(&grid.to_bytes().unwrap()).unwrap();
        assert!(same_bits(&grid, &decoded));
    }

    #[test]
    fn test_codec_rejects_truncated_payload() {
        let grid = IntArray2::new(2, 2, 3);
        let mut bytes = grid.to_bytes().unwrap();
        bytes.pop();
        assert!(matches!(
            IntArray2::from_bytes(&bytes),
            Err(HistoryError::InvalidGrid(_))
        ));
        assert!(IntArray2::from_bytes(&[0, 1]).is_err());
        assert!(IntArray2::from_bytes(&[0xff, 0xff, 0, 1]).is_err());
    }

    #[test]
    fn test_rows_copy() {
        let grid = IntArray2::from_data(2, 3, vec![1, 2, 3, 4, 5, 6]);
        let middle = grid.rows(1, 3);
        assert_eq!(middle.height(), 2);
        assert_eq!(middle.data(), &[3, 4, 5, 6]);
    }

    #[test]
    fn test_serde_uses_codec() {
        let grid = DoubleArray2::from_data(1, 2, vec![f64::NAN, 4.0]);
        let json = serde_json::to_string(&grid).unwrap();
        let restored: DoubleArray2 = serde_json::from_str(&json).unwrap();
        assert!(same_bits(&grid, &restored));

        let encoded = bincode::serialize(&grid).unwrap();
        let restored: DoubleArray2 = bincode::deserialize(&encoded).unwrap();
        assert!(same_bits(&grid, &restored));
    }
}
