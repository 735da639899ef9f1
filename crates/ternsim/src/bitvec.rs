use num_bigint::{BigInt, BigUint};
use num_traits::{One as _, ToPrimitive as _, Zero as _};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

mod ternary;
mod values;

pub use ternary::Ternary;
pub use values::Values;

/// All-ones pattern of `width` bits.
fn ones(width: usize) -> BigUint {
    (BigUint::one() << width) - BigUint::one()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseBitVecError {
    #[error("invalid character `{0}` in bit-vector literal (expected 0, 1, x or _)")]
    InvalidChar(char),
}

/// Fixed-width four-valued bit-vector.
///
/// `value` holds the defined bits, `mask` marks unknown (X) bits. Both are
/// kept within `width` bits and `value & mask == 0` always holds. Bit 0 is
/// the least significant bit.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BitVec {
    width: usize,
    value: BigUint,
    mask: BigUint,
}

impl BitVec {
    /// A fully-defined vector holding `value` truncated to `width` bits.
    pub fn new(width: usize, value: impl Into<BigUint>) -> Self {
        Self {
            width,
            value: value.into() & ones(width),
            mask: BigUint::zero(),
        }
    }

    /// A vector with explicit unknown bits. Value bits under the mask are cleared.
    pub fn with_mask(width: usize, value: impl Into<BigUint>, mask: impl Into<BigUint>) -> Self {
        let all = ones(width);
        let mask = mask.into() & &all;
        let value = value.into() & (all ^ &mask);
        Self { width, value, mask }
    }

    /// Two's complement encoding of `value` in `width` bits.
    pub fn from_i64(width: usize, value: i64) -> Self {
        if value >= 0 {
            return Self::new(width, value as u64);
        }
        let modulus = BigUint::one() << width;
        let magnitude = BigUint::from(value.unsigned_abs()) % &modulus;
        Self::new(width, (modulus - magnitude) & ones(width))
    }

    /// Fully unknown vector.
    pub fn x(width: usize) -> Self {
        Self {
            width,
            value: BigUint::zero(),
            mask: ones(width),
        }
    }

    pub fn zero(width: usize) -> Self {
        Self::new(width, 0u32)
    }

    pub fn from_bool(value: bool) -> Self {
        Self::new(1, value as u32)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn value(&self) -> &BigUint {
        &self.value
    }

    pub fn mask(&self) -> &BigUint {
        &self.mask
    }

    pub fn is_fully_defined(&self) -> bool {
        self.mask.is_zero()
    }

    /// The concrete value, if no bit is unknown.
    pub fn to_biguint(&self) -> Option<BigUint> {
        self.is_fully_defined().then(|| self.value.clone())
    }

    /// The concrete value, if no bit is unknown and it fits in 64 bits.
    pub fn to_u64(&self) -> Option<u64> {
        if self.is_fully_defined() { self.value.to_u64() } else { None }
    }

    /// Three-valued truth: true if any defined bit is 1, false if all bits are
    /// defined 0, unknown otherwise.
    pub fn truthiness(&self) -> Ternary {
        if !self.value.is_zero() {
            Ternary::True
        } else if !self.mask.is_zero() {
            Ternary::Unknown
        } else {
            Ternary::False
        }
    }

    /// Single bit as a 1-bit vector. Negative indices count from the MSB end.
    pub fn bit(&self, index: isize) -> BitVec {
        let pos = if index < 0 {
            self.width as isize + index
        } else {
            index
        };
        assert!(
            pos >= 0 && (pos as usize) < self.width,
            "bit index {index} out of range for width {}",
            self.width
        );
        self.slice(pos as usize, 1)
    }

    /// `len` bits starting at bit `start`.
    pub fn slice(&self, start: usize, len: usize) -> BitVec {
        assert!(
            start + len <= self.width,
            "slice [{start} +: {len}] out of range for width {}",
            self.width
        );
        let all = ones(len);
        Self {
            width: len,
            value: (&self.value >> start) & &all,
            mask: (&self.mask >> start) & all,
        }
    }

    /// Replaces `bits.width()` bits starting at `start` with `bits`.
    pub fn splice(&self, start: usize, bits: &BitVec) -> BitVec {
        assert!(
            start + bits.width <= self.width,
            "splice [{start} +: {}] out of range for width {}",
            bits.width,
            self.width
        );
        let keep = ones(self.width) ^ (ones(bits.width) << start);
        Self {
            width: self.width,
            value: (&self.value & &keep) | (&bits.value << start),
            mask: (&self.mask & &keep) | (&bits.mask << start),
        }
    }

    pub fn zero_extend(&self, width: usize) -> BitVec {
        assert!(
            width >= self.width,
            "zero_extend from {} to narrower width {width}",
            self.width
        );
        Self {
            width,
            value: self.value.clone(),
            mask: self.mask.clone(),
        }
    }

    pub fn sign_extend(&self, width: usize) -> BitVec {
        assert!(
            width >= self.width,
            "sign_extend from {} to narrower width {width}",
            self.width
        );
        if self.width == 0 {
            return Self::zero(width);
        }
        let upper = ones(width) ^ ones(self.width);
        let sign = self.width as u64 - 1;
        let mut value = self.value.clone();
        let mut mask = self.mask.clone();
        if self.mask.bit(sign) {
            mask |= upper;
        } else if self.value.bit(sign) {
            value |= upper;
        }
        Self { width, value, mask }
    }

    pub fn truncate(&self, width: usize) -> BitVec {
        assert!(
            width <= self.width,
            "truncate from {} to wider width {width}",
            self.width
        );
        self.slice(0, width)
    }

    /// Truncates or zero-extends to `width`.
    pub fn resize(&self, width: usize) -> BitVec {
        if width <= self.width {
            self.truncate(width)
        } else {
            self.zero_extend(width)
        }
    }

    /// Concatenation, most significant part first.
    pub fn concat(parts: &[BitVec]) -> BitVec {
        let mut width = 0;
        let mut value = BigUint::zero();
        let mut mask = BigUint::zero();
        for part in parts.iter().rev() {
            value |= &part.value << width;
            mask |= &part.mask << width;
            width += part.width;
        }
        Self { width, value, mask }
    }

    pub fn repeat(&self, count: usize) -> BitVec {
        let parts = vec![self.clone(); count];
        Self::concat(&parts)
    }

    /// Merges two same-width vectors: bits where both agree stay defined,
    /// disagreeing or unknown bits become unknown.
    pub fn combine(&self, other: &BitVec) -> BitVec {
        assert_eq!(
            self.width, other.width,
            "combine: mismatched widths {} and {}",
            self.width, other.width
        );
        let mask = &self.mask | &other.mask | (&self.value ^ &other.value);
        Self::with_mask(self.width, self.value.clone(), mask)
    }

    /// All concrete values consistent with the unknown mask.
    pub fn values(&self) -> Values {
        Values::new(&self.value, &self.mask, self.width)
    }

    /// Lowest and highest concrete value consistent with the mask.
    pub fn bounds(&self) -> (BigUint, BigUint) {
        (self.value.clone(), &self.value | &self.mask)
    }

    fn align(&self, other: &BitVec) -> (BitVec, BitVec) {
        let width = self.width.max(other.width);
        (self.zero_extend(width), other.zero_extend(width))
    }

    /// Defined-zero bits.
    fn zeros(&self) -> BigUint {
        ones(self.width) ^ (&self.value | &self.mask)
    }

    pub fn bit_not(&self) -> BitVec {
        Self {
            width: self.width,
            value: self.zeros(),
            mask: self.mask.clone(),
        }
    }

    pub fn bit_and(&self, other: &BitVec) -> BitVec {
        let (a, b) = self.align(other);
        let one = &a.value & &b.value;
        let zero = a.zeros() | b.zeros();
        let mask = ones(a.width) ^ (&one | zero);
        Self::with_mask(a.width, one, mask)
    }

    pub fn bit_or(&self, other: &BitVec) -> BitVec {
        let (a, b) = self.align(other);
        let one = &a.value | &b.value;
        let zero = a.zeros() & b.zeros();
        let mask = ones(a.width) ^ (&one | zero);
        Self::with_mask(a.width, one, mask)
    }

    pub fn bit_xor(&self, other: &BitVec) -> BitVec {
        let (a, b) = self.align(other);
        let mask = &a.mask | &b.mask;
        Self::with_mask(a.width, &a.value ^ &b.value, mask)
    }

    /// Addition with worst-case unknown propagation. A result bit is unknown
    /// when either operand bit is unknown or when the carry into it differs
    /// between the all-unknowns-0 and all-unknowns-1 bounds; carries are
    /// monotonic so every value in between agrees with both bounds.
    fn add_with_carry(a: &BitVec, b: &BitVec, carry_in: bool) -> BitVec {
        debug_assert_eq!(a.width, b.width);
        let cin = BigUint::from(carry_in as u32);
        let (a_lo, a_hi) = a.bounds();
        let (b_lo, b_hi) = b.bounds();
        let lo = &a_lo + &b_lo + &cin;
        let hi = &a_hi + &b_hi + &cin;
        let carries_lo = &lo ^ &a_lo ^ &b_lo;
        let carries_hi = &hi ^ &a_hi ^ &b_hi;
        let mask = &a.mask | &b.mask | (carries_lo ^ carries_hi);
        Self::with_mask(a.width, lo, mask)
    }

    pub fn wrapping_add(&self, other: &BitVec) -> BitVec {
        let (a, b) = self.align(other);
        Self::add_with_carry(&a, &b, false)
    }

    pub fn wrapping_sub(&self, other: &BitVec) -> BitVec {
        let (a, b) = self.align(other);
        Self::add_with_carry(&a, &b.bit_not(), true)
    }

    /// Multiplication. Any unknown operand bit makes the whole product unknown.
    pub fn wrapping_mul(&self, other: &BitVec) -> BitVec {
        let (a, b) = self.align(other);
        if !a.is_fully_defined() || !b.is_fully_defined() {
            return Self::x(a.width);
        }
        Self::new(a.width, &a.value * &b.value)
    }

    pub fn ternary_eq(&self, other: &BitVec) -> Ternary {
        let (a, b) = self.align(other);
        let unknown = &a.mask | &b.mask;
        let differ = (&a.value ^ &b.value) & (ones(a.width) ^ &unknown);
        if !differ.is_zero() {
            Ternary::False
        } else if !unknown.is_zero() {
            Ternary::Unknown
        } else {
            Ternary::True
        }
    }

    pub fn ternary_ne(&self, other: &BitVec) -> Ternary {
        !self.ternary_eq(other)
    }

    /// Unsigned less-than.
    pub fn lt(&self, other: &BitVec) -> Ternary {
        let (a, b) = self.align(other);
        let (a_min, a_max) = a.bounds();
        let (b_min, b_max) = b.bounds();
        if a_max < b_min {
            Ternary::True
        } else if a_min >= b_max {
            Ternary::False
        } else {
            Ternary::Unknown
        }
    }

    pub fn le(&self, other: &BitVec) -> Ternary {
        !other.lt(self)
    }

    pub fn gt(&self, other: &BitVec) -> Ternary {
        other.lt(self)
    }

    pub fn ge(&self, other: &BitVec) -> Ternary {
        !self.lt(other)
    }

    fn signed_bounds(&self) -> (BigInt, BigInt) {
        assert!(self.width > 0, "signed comparison of a zero-width vector");
        let sign = self.width as u64 - 1;
        let sign_bit = BigUint::one() << sign;
        let (lo, hi) = if self.mask.bit(sign) {
            (
                &self.value | &sign_bit,
                (&self.value | &self.mask) & (ones(self.width) ^ &sign_bit),
            )
        } else {
            (self.value.clone(), &self.value | &self.mask)
        };
        let to_signed = |pattern: BigUint| {
            if pattern.bit(sign) {
                BigInt::from(pattern) - (BigInt::one() << self.width)
            } else {
                BigInt::from(pattern)
            }
        };
        (to_signed(lo), to_signed(hi))
    }

    /// Two's complement less-than.
    pub fn signed_lt(&self, other: &BitVec) -> Ternary {
        assert_eq!(
            self.width, other.width,
            "signed_lt: mismatched widths {} and {}",
            self.width, other.width
        );
        let (a_min, a_max) = self.signed_bounds();
        let (b_min, b_max) = other.signed_bounds();
        if a_max < b_min {
            Ternary::True
        } else if a_min >= b_max {
            Ternary::False
        } else {
            Ternary::Unknown
        }
    }
}

impl From<Ternary> for BitVec {
    fn from(value: Ternary) -> Self {
        match value {
            Ternary::False => BitVec::new(1, 0u32),
            Ternary::True => BitVec::new(1, 1u32),
            Ternary::Unknown => BitVec::x(1),
        }
    }
}

impl From<bool> for BitVec {
    fn from(value: bool) -> Self {
        BitVec::from_bool(value)
    }
}

impl FromStr for BitVec {
    type Err = ParseBitVecError;

    /// Parses `0`, `1` and `x` characters, most significant bit first.
    /// Underscores are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut width = 0;
        let mut value = BigUint::zero();
        let mut mask = BigUint::zero();
        for c in s.chars().rev() {
            match c {
                '_' => continue,
                '0' => {}
                '1' => value.set_bit(width, true),
                'x' | 'X' => mask.set_bit(width, true),
                other => return Err(ParseBitVecError::InvalidChar(other)),
            }
            width += 1;
        }
        Ok(Self {
            width: width as usize,
            value,
            mask,
        })
    }
}

impl fmt::Display for BitVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in (0..self.width as u64).rev() {
            let c = if self.mask.bit(i) {
                'x'
            } else if self.value.bit(i) {
                '1'
            } else {
                '0'
            };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for BitVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}'b{}", self.width, self)
    }
}

macro_rules! forward_binop {
    ($trait:ident, $method:ident, $imp:ident) => {
        impl std::ops::$trait<&BitVec> for &BitVec {
            type Output = BitVec;

            fn $method(self, rhs: &BitVec) -> BitVec {
                self.$imp(rhs)
            }
        }

        impl std::ops::$trait for BitVec {
            type Output = BitVec;

            fn $method(self, rhs: BitVec) -> BitVec {
                (&self).$imp(&rhs)
            }
        }
    };
}

forward_binop!(BitAnd, bitand, bit_and);
forward_binop!(BitOr, bitor, bit_or);
forward_binop!(BitXor, bitxor, bit_xor);
forward_binop!(Add, add, wrapping_add);
forward_binop!(Sub, sub, wrapping_sub);
forward_binop!(Mul, mul, wrapping_mul);

impl std::ops::Not for &BitVec {
    type Output = BitVec;

    fn not(self) -> BitVec {
        self.bit_not()
    }
}

impl std::ops::Not for BitVec {
    type Output = BitVec;

    fn not(self) -> BitVec {
        self.bit_not()
    }
}
