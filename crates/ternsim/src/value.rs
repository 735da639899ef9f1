use crate::bitvec::BitVec;
use std::fmt;

/// A storage value: a single bit-vector or a nested fixed-size array of them.
///
/// Arrays mirror a node's `dimensions`, outermost dimension first.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Bits(BitVec),
    Array(Vec<Value>),
}

impl Value {
    /// A fully unknown value of the given element width and array shape.
    pub fn x(width: usize, dims: &[usize]) -> Value {
        match dims.split_first() {
            None => Value::Bits(BitVec::x(width)),
            Some((&len, rest)) => Value::Array((0..len).map(|_| Value::x(width, rest)).collect()),
        }
    }

    pub fn as_bits(&self) -> &BitVec {
        match self {
            Value::Bits(bits) => bits,
            Value::Array(_) => panic!("expected a scalar value, found an array"),
        }
    }

    pub fn into_bits(self) -> BitVec {
        match self {
            Value::Bits(bits) => bits,
            Value::Array(_) => panic!("expected a scalar value, found an array"),
        }
    }

    pub fn as_array(&self) -> &[Value] {
        match self {
            Value::Array(elems) => elems,
            Value::Bits(_) => panic!("expected an array value, found a scalar"),
        }
    }

    /// Element at `path`, outermost index first.
    pub fn get(&self, path: &[usize]) -> &Value {
        path.iter().fold(self, |v, &i| &v.as_array()[i])
    }

    pub fn get_mut(&mut self, path: &[usize]) -> &mut Value {
        let mut current = self;
        for &i in path {
            current = match current {
                Value::Array(elems) => &mut elems[i],
                Value::Bits(_) => panic!("index path descends into a scalar value"),
            };
        }
        current
    }

    /// Element-wise [`BitVec::combine`].
    pub fn combine(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Bits(a), Value::Bits(b)) => Value::Bits(a.combine(b)),
            (Value::Array(a), Value::Array(b)) => {
                assert_eq!(a.len(), b.len(), "combine: mismatched array lengths");
                Value::Array(a.iter().zip(b).map(|(x, y)| x.combine(y)).collect())
            }
            _ => panic!("combine: mismatched value shapes"),
        }
    }

    /// Resizes scalar leaves to `width`.
    pub fn resize(&self, width: usize) -> Value {
        match self {
            Value::Bits(bits) => Value::Bits(bits.resize(width)),
            Value::Array(elems) => Value::Array(elems.iter().map(|e| e.resize(width)).collect()),
        }
    }
}

impl From<BitVec> for Value {
    fn from(bits: BitVec) -> Self {
        Value::Bits(bits)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bits(bits) => write!(f, "{bits:?}"),
            Value::Array(elems) => f.debug_list().entries(elems).finish(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bits(bits) => write!(f, "{bits}"),
            Value::Array(elems) => {
                write!(f, "[")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, "]")
            }
        }
    }
}
