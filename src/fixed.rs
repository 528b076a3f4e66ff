use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Rem, Sub, SubAssign};

/// Signed binary fixed point with 16 fractional bits (Q16.16).
///
/// Time arithmetic during loop unrolling repeatedly adds the same offset to a
/// running total; integer fixed point keeps that exact where floating point
/// would drift across iterations.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct Fixed(i32);

pub const FRAC_BITS: u32 = 16;
const ONE_RAW: i32 = 1 << FRAC_BITS;
const FRAC_MASK: i32 = ONE_RAW - 1;

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);
    pub const ONE: Fixed = Fixed(ONE_RAW);

    pub fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> i32 {
        self.0
    }

    pub fn from_int(v: i32) -> Self {
        Self(v << FRAC_BITS)
    }

    pub fn from_f32(v: f32) -> Self {
        Self((v as f64 * ONE_RAW as f64).round() as i32)
    }

    /// Exact rational construction: `num/den` scaled without a float detour.
    pub fn from_ratio(num: i32, den: i32) -> Self {
        debug_assert!(den != 0);
        Self((((num as i64) << FRAC_BITS) / den as i64) as i32)
    }

    /// `from_int` that refuses integers whose raw form overflows i32. The
    /// representable integral range is -32768..=32767.
    pub fn checked_from_int(v: i32) -> Option<Self> {
        i32::try_from((v as i64) << FRAC_BITS).ok().map(Self)
    }

    pub fn checked_from_ratio(num: i32, den: i32) -> Option<Self> {
        if den == 0 {
            return None;
        }
        i32::try_from(((num as i64) << FRAC_BITS) / den as i64)
            .ok()
            .map(Self)
    }

    pub fn checked_from_f32(v: f32) -> Option<Self> {
        let raw = (v as f64 * ONE_RAW as f64).round();
        if raw >= i32::MIN as f64 && raw <= i32::MAX as f64 {
            Some(Self(raw as i32))
        } else {
            None
        }
    }

    pub fn to_f32(self) -> f32 {
        self.0 as f32 / ONE_RAW as f32
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / ONE_RAW as f64
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Largest integral value not above `self`. Masking the fraction bits is
    /// already the floor for negative raws in two's complement.
    pub fn floor(self) -> Self {
        Self(self.0 & !FRAC_MASK)
    }

    pub fn floor_to_int(self) -> i32 {
        self.0 >> FRAC_BITS
    }

    pub fn abs(self) -> Self {
        Self(self.0.wrapping_abs())
    }

    /// Minimal byte width that round-trips the raw value: 0, 1, 2 or 4.
    pub fn encoded_width(self) -> u8 {
        let raw = self.0;
        if raw == 0 {
            0
        } else if raw >= i8::MIN as i32 && raw <= i8::MAX as i32 {
            1
        } else if raw >= i16::MIN as i32 && raw <= i16::MAX as i32 {
            2
        } else {
            4
        }
    }

    /// Appends exactly `encoded_width()` little-endian bytes.
    pub fn encode(self, out: &mut Vec<u8>) {
        match self.encoded_width() {
            0 => {}
            1 => out.push(self.0 as i8 as u8),
            2 => out.extend_from_slice(&(self.0 as i16).to_le_bytes()),
            _ => out.extend_from_slice(&self.0.to_le_bytes()),
        }
    }

    /// Reads back a value written with the given width code (0/1/2/4 bytes),
    /// advancing `pos`. Returns `None` on truncated input.
    pub fn decode(width: u8, bytes: &[u8], pos: &mut usize) -> Option<Self> {
        let take = |pos: &mut usize, n: usize| -> Option<&[u8]> {
            let s = bytes.get(*pos..*pos + n)?;
            *pos += n;
            Some(s)
        };
        let raw = match width {
            0 => 0,
            1 => take(pos, 1)?[0] as i8 as i32,
            2 => i16::from_le_bytes(take(pos, 2)?.try_into().ok()?) as i32,
            4 => i32::from_le_bytes(take(pos, 4)?.try_into().ok()?),
            _ => return None,
        };
        Some(Self(raw))
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_f64())
    }
}

impl Add for Fixed {
    type Output = Fixed;
    fn add(self, rhs: Fixed) -> Fixed {
        Fixed(self.0.wrapping_add(rhs.0))
    }
}

impl AddAssign for Fixed {
    fn add_assign(&mut self, rhs: Fixed) {
        *self = *self + rhs;
    }
}

impl Sub for Fixed {
    type Output = Fixed;
    fn sub(self, rhs: Fixed) -> Fixed {
        Fixed(self.0.wrapping_sub(rhs.0))
    }
}

impl SubAssign for Fixed {
    fn sub_assign(&mut self, rhs: Fixed) {
        *self = *self - rhs;
    }
}

impl Neg for Fixed {
    type Output = Fixed;
    fn neg(self) -> Fixed {
        Fixed(self.0.wrapping_neg())
    }
}

impl Mul<i32> for Fixed {
    type Output = Fixed;
    fn mul(self, rhs: i32) -> Fixed {
        Fixed(self.0.wrapping_mul(rhs))
    }
}

impl Mul<f32> for Fixed {
    type Output = Fixed;
    fn mul(self, rhs: f32) -> Fixed {
        self * Fixed::from_f32(rhs)
    }
}

impl Mul for Fixed {
    type Output = Fixed;
    // Widen to i64 before the shift so intermediate products keep every bit.
    fn mul(self, rhs: Fixed) -> Fixed {
        Fixed(((self.0 as i64 * rhs.0 as i64) >> FRAC_BITS) as i32)
    }
}

impl Div<i32> for Fixed {
    type Output = Fixed;
    fn div(self, rhs: i32) -> Fixed {
        Fixed(self.0 / rhs)
    }
}

impl Div<f32> for Fixed {
    type Output = Fixed;
    fn div(self, rhs: f32) -> Fixed {
        self / Fixed::from_f32(rhs)
    }
}

impl Div for Fixed {
    type Output = Fixed;
    // Widen and pre-shift the dividend so the integer divide keeps fraction bits.
    fn div(self, rhs: Fixed) -> Fixed {
        Fixed((((self.0 as i64) << FRAC_BITS) / rhs.0 as i64) as i32)
    }
}

impl Rem<i32> for Fixed {
    type Output = Fixed;
    fn rem(self, rhs: i32) -> Fixed {
        Fixed(self.0 % (rhs << FRAC_BITS))
    }
}
