use serde::{Deserialize, Serialize};

/// Element type of a tensor buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    #[default]
    Int64,
    Int32,
    Float32,
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ElementType::Int64 => "int64",
            ElementType::Int32 => "int32",
            ElementType::Float32 => "float32",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TensorData {
    Int64(Vec<i64>),
    Int32(Vec<i32>),
    Float32(Vec<f32>),
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            TensorData::Int64(v) => v.len(),
            TensorData::Int32(v) => v.len(),
            TensorData::Float32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            TensorData::Int64(_) => ElementType::Int64,
            TensorData::Int32(_) => ElementType::Int32,
            TensorData::Float32(_) => ElementType::Float32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ShapeError {
    #[error("tensor {name}: shape {shape:?} holds {expected} elements, buffer has {actual}")]
    Mismatch {
        name: String,
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("tensor {name}: value {value} does not fit in {element_type}")]
    OutOfRange {
        name: String,
        value: i64,
        element_type: ElementType,
    },

    #[error("tensor {name}: cannot build integer input as {element_type}")]
    NotAnIntegerType {
        name: String,
        element_type: ElementType,
    },
}

/// A named, typed, shaped buffer exchanged with the inference provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: TensorData,
}

impl Tensor {
    /// Build a tensor, checking that the shape accounts for every element of the buffer.
    pub fn new(
        name: impl Into<String>,
        shape: Vec<usize>,
        data: TensorData,
    ) -> Result<Self, ShapeError> {
        let name = name.into();
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(ShapeError::Mismatch {
                name,
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { name, shape, data })
    }

    /// Build an integer input tensor in the requested element type.
    pub fn from_ints(
        name: impl Into<String>,
        shape: Vec<usize>,
        values: &[i64],
        element_type: ElementType,
    ) -> Result<Self, ShapeError> {
        let name = name.into();
        let data = match element_type {
            ElementType::Int64 => TensorData::Int64(values.to_vec()),
            ElementType::Int32 => {
                let mut out = Vec::with_capacity(values.len());
                for &v in values {
                    let narrowed = i32::try_from(v).map_err(|_| ShapeError::OutOfRange {
                        name: name.clone(),
                        value: v,
                        element_type,
                    })?;
                    out.push(narrowed);
                }
                TensorData::Int32(out)
            }
            ElementType::Float32 => {
                return Err(ShapeError::NotAnIntegerType { name, element_type });
            }
        };
        Self::new(name, shape, data)
    }

    pub fn element_type(&self) -> ElementType {
        self.data.element_type()
    }
}
