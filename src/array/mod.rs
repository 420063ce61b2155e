use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Element type of a tensor. Serialized with numpy-style names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    Bool,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl Dtype {
    pub fn itemsize(self) -> usize {
        match self {
            Dtype::Bool | Dtype::Uint8 | Dtype::Int8 => 1,
            Dtype::Uint16 | Dtype::Int16 => 2,
            Dtype::Uint32 | Dtype::Int32 | Dtype::Float32 => 4,
            Dtype::Uint64 | Dtype::Int64 | Dtype::Float64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Dtype::Bool => "bool",
            Dtype::Uint8 => "uint8",
            Dtype::Uint16 => "uint16",
            Dtype::Uint32 => "uint32",
            Dtype::Uint64 => "uint64",
            Dtype::Int8 => "int8",
            Dtype::Int16 => "int16",
            Dtype::Int32 => "int32",
            Dtype::Int64 => "int64",
            Dtype::Float32 => "float32",
            Dtype::Float64 => "float64",
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A Rust type that can be laid out as little-endian tensor elements.
pub trait Element: Copy {
    const DTYPE: Dtype;

    fn write_le(&self, out: &mut Vec<u8>);
}

impl Element for bool {
    const DTYPE: Dtype = Dtype::Bool;

    fn write_le(&self, out: &mut Vec<u8>) {
        out.push(*self as u8);
    }
}

macro_rules! impl_element {
    ($($t:ty => $dtype:ident),* $(,)?) => {
        $(
            impl Element for $t {
                const DTYPE: Dtype = Dtype::$dtype;

                fn write_le(&self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_element! {
    u8 => Uint8,
    u16 => Uint16,
    u32 => Uint32,
    u64 => Uint64,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
}

fn num_elements(shape: &[usize]) -> usize {
    shape.iter().product()
}

fn check_no_zero_dims(shape: &[usize]) -> Result<()> {
    if shape.contains(&0) {
        return Err(Error::ShapeValidation(format!(
            "shape {:?} has a zero-length dimension",
            shape
        )));
    }
    Ok(())
}

/// A dense array: a shape plus its elements as little-endian bytes in
/// row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Array {
    pub dtype: Dtype,
    pub shape: Vec<usize>,
    pub data: Vec<u8>,
}

impl Array {
    pub fn new(dtype: Dtype, shape: Vec<usize>, data: Vec<u8>) -> Result<Self> {
        let expected = num_elements(&shape) * dtype.itemsize();
        if data.len() != expected {
            return Err(Error::ShapeValidation(format!(
                "shape {:?} of {} needs {} bytes, got {}",
                shape,
                dtype,
                expected,
                data.len()
            )));
        }
        Ok(Array { dtype, shape, data })
    }

    pub fn from_slice<T: Element>(shape: &[usize], values: &[T]) -> Result<Self> {
        let mut data = Vec::with_capacity(values.len() * T::DTYPE.itemsize());
        for v in values {
            v.write_le(&mut data);
        }
        Array::new(T::DTYPE, shape.to_vec(), data)
    }
}

/// One sample of a tensor. Samples of the same tensor share a dtype but may
/// have different shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub shape: Vec<usize>,
    pub data: Vec<u8>,
}

impl Sample {
    pub fn new(shape: Vec<usize>, data: Vec<u8>) -> Self {
        Sample { shape, data }
    }

    pub fn validate(&self, dtype: Dtype) -> Result<()> {
        check_no_zero_dims(&self.shape)?;
        let expected = num_elements(&self.shape) * dtype.itemsize();
        if self.data.len() != expected {
            return Err(Error::ShapeValidation(format!(
                "sample of shape {:?} and dtype {} needs {} bytes, got {}",
                self.shape,
                dtype,
                expected,
                self.data.len()
            )));
        }
        Ok(())
    }
}

/// A validated, non-empty sequence of samples sharing one dtype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    dtype: Dtype,
    samples: Vec<Sample>,
}

impl Batch {
    pub fn from_samples(dtype: Dtype, samples: Vec<Sample>) -> Result<Self> {
        if samples.is_empty() {
            return Err(Error::ShapeValidation("batch has no samples".into()));
        }
        for sample in &samples {
            sample.validate(dtype)?;
        }
        Ok(Batch { dtype, samples })
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

/// Turns an array into a batch of samples. With `batched` the first
/// dimension indexes samples; without it the whole array is one sample (a
/// scalar becomes a sample of shape `[1]`).
pub fn normalize(array: Array, batched: bool) -> Result<Batch> {
    let Array { dtype, shape, data } = array;
    check_no_zero_dims(&shape)?;

    if !batched {
        let shape = if shape.is_empty() { vec![1] } else { shape };
        return Batch::from_samples(dtype, vec![Sample::new(shape, data)]);
    }

    let (n, sample_shape) = match shape.split_first() {
        Some((n, rest)) => (*n, rest.to_vec()),
        None => {
            return Err(Error::ShapeValidation(
                "batched array must have a batch dimension".into(),
            ))
        }
    };

    let sample_len = num_elements(&sample_shape) * dtype.itemsize();
    if data.len() != n * sample_len {
        return Err(Error::ShapeValidation(format!(
            "shape {:?} of {} needs {} bytes, got {}",
            shape,
            dtype,
            n * sample_len,
            data.len()
        )));
    }
    let samples = data
        .chunks(sample_len)
        .map(|bytes| Sample::new(sample_shape.clone(), bytes.to_vec()))
        .collect();
    Batch::from_samples(dtype, samples)
}

#[cfg(test)]
mod test {
    use super::{normalize, Array, Batch, Dtype, Sample};
    use crate::error::Error;

    #[test]
    fn test_from_slice() {
        let a = Array::from_slice(&[2], &[1_u16, 258]).unwrap();
        assert_eq!(Dtype::Uint16, a.dtype);
        assert_eq!(vec![1, 0, 2, 1], a.data);

        assert!(matches!(
            Array::from_slice(&[3], &[1_u16, 2]),
            Err(Error::ShapeValidation(_))
        ));
    }

    #[test]
    fn test_normalize_batched() {
        let a = Array::from_slice(&[3, 2], &[1_u8, 2, 3, 4, 5, 6]).unwrap();
        let batch = normalize(a, true).unwrap();
        assert_eq!(3, batch.len());
        assert_eq!(
            &Sample::new(vec![2], vec![3, 4]),
            &batch.samples()[1],
        );
    }

    #[test]
    fn test_normalize_unbatched() {
        let a = Array::from_slice(&[3, 2], &[1_u8, 2, 3, 4, 5, 6]).unwrap();
        let batch = normalize(a, false).unwrap();
        assert_eq!(1, batch.len());
        assert_eq!(vec![3, 2], batch.samples()[0].shape);

        let scalar = Array::from_slice(&[], &[7.5_f64]).unwrap();
        let batch = normalize(scalar, false).unwrap();
        assert_eq!(vec![1], batch.samples()[0].shape);
        assert_eq!(8, batch.samples()[0].data.len());
    }

    #[test]
    fn test_rejects_bad_shapes() {
        let zero = Array::new(Dtype::Float32, vec![2, 0], vec![]).unwrap();
        assert!(matches!(normalize(zero, true), Err(Error::ShapeValidation(_))));

        let scalar = Array::from_slice(&[], &[1_i32]).unwrap();
        assert!(matches!(normalize(scalar, true), Err(Error::ShapeValidation(_))));

        assert!(matches!(
            Batch::from_samples(Dtype::Uint8, vec![]),
            Err(Error::ShapeValidation(_))
        ));

        // Dynamic batches still have to agree with the dtype.
        assert!(matches!(
            Batch::from_samples(
                Dtype::Int32,
                vec![Sample::new(vec![1], vec![0; 4]), Sample::new(vec![2], vec![0; 4])]
            ),
            Err(Error::ShapeValidation(_))
        ));
    }
}
