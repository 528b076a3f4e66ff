use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Sub};

use crate::fixed::Fixed;

/// A point in musical time: measures, beats, ticks and raw seconds, each an
/// independent [`Fixed`] component. How the four combine into continuous
/// playback seconds is the host tempo map's business, not ours.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Timestamp {
    pub measures: Fixed,
    pub beats: Fixed,
    pub ticks: Fixed,
    pub seconds: Fixed,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp {
        measures: Fixed::ZERO,
        beats: Fixed::ZERO,
        ticks: Fixed::ZERO,
        seconds: Fixed::ZERO,
    };

    pub fn from_beats(beats: Fixed) -> Self {
        Self {
            beats,
            ..Self::ZERO
        }
    }

    pub fn is_zero(&self) -> bool {
        self.measures.is_zero()
            && self.beats.is_zero()
            && self.ticks.is_zero()
            && self.seconds.is_zero()
    }

    fn components(&self) -> [Fixed; 4] {
        [self.measures, self.beats, self.ticks, self.seconds]
    }

    fn from_components(c: [Fixed; 4]) -> Self {
        Self {
            measures: c[0],
            beats: c[1],
            ticks: c[2],
            seconds: c[3],
        }
    }

    /// Parses a timestamp literal: one or more `number` + suffix groups where
    /// the suffix is `m`, `b`, `t` or `s` and the number is an integer, a
    /// decimal, or an exact rational (`1/3b`). Returns `None` unless the whole
    /// string is consumed and at least one suffixed component is present.
    pub fn parse(s: &str) -> Option<Timestamp> {
        let bytes = s.as_bytes();
        let mut i = 0usize;
        let mut out = Timestamp::ZERO;
        let mut seen = [false; 4];

        while i < bytes.len() {
            let value = scan_component(bytes, &mut i)?;
            let slot = match bytes.get(i).copied() {
                Some(b'm') => 0,
                Some(b'b') => 1,
                Some(b't') => 2,
                Some(b's') => 3,
                _ => return None,
            };
            i += 1;
            if seen[slot] {
                return None; // duplicate suffix, e.g. "1b2b"
            }
            seen[slot] = true;
            let mut c = out.components();
            c[slot] = value;
            out = Timestamp::from_components(c);
        }

        if seen.iter().any(|&s| s) { Some(out) } else { None }
    }

    /// One mask byte (2 bits per component, measures in the low pair) followed
    /// by each component's minimal-width encoding.
    pub fn encode(&self, out: &mut Vec<u8>) {
        let comps = self.components();
        let mut mask = 0u8;
        for (slot, c) in comps.iter().enumerate() {
            mask |= width_code(c.encoded_width()) << (slot * 2);
        }
        out.push(mask);
        for c in comps {
            c.encode(out);
        }
    }

    pub fn decode(bytes: &[u8], pos: &mut usize) -> Option<Timestamp> {
        let mask = *bytes.get(*pos)?;
        *pos += 1;
        let mut comps = [Fixed::ZERO; 4];
        for (slot, c) in comps.iter_mut().enumerate() {
            let width = code_width((mask >> (slot * 2)) & 0b11);
            *c = Fixed::decode(width, bytes, pos)?;
        }
        Some(Timestamp::from_components(comps))
    }
}

fn width_code(width: u8) -> u8 {
    match width {
        0 => 0,
        1 => 1,
        2 => 2,
        _ => 3,
    }
}

fn code_width(code: u8) -> u8 {
    match code {
        0 => 0,
        1 => 1,
        2 => 2,
        _ => 4,
    }
}

/// Scans one component number at `bytes[*i..]`: `-?digits(.digits)?` or the
/// exact rational form `-?digits/digits`.
fn scan_component(bytes: &[u8], i: &mut usize) -> Option<Fixed> {
    let start = *i;
    let neg = bytes.get(*i) == Some(&b'-');
    if neg {
        *i += 1;
    }

    let int_start = *i;
    while bytes.get(*i).is_some_and(u8::is_ascii_digit) {
        *i += 1;
    }
    if *i == int_start {
        return None;
    }

    // Checked constructors reject components outside the representable
    // range, so an overlong literal fails the parse instead of wrapping.
    match bytes.get(*i) {
        Some(b'/') => {
            let num: i32 = std::str::from_utf8(&bytes[int_start..*i]).ok()?.parse().ok()?;
            *i += 1;
            let den_start = *i;
            while bytes.get(*i).is_some_and(u8::is_ascii_digit) {
                *i += 1;
            }
            let den: i32 = std::str::from_utf8(&bytes[den_start..*i]).ok()?.parse().ok()?;
            Fixed::checked_from_ratio(if neg { -num } else { num }, den)
        }
        Some(b'.') => {
            *i += 1;
            let frac_start = *i;
            while bytes.get(*i).is_some_and(u8::is_ascii_digit) {
                *i += 1;
            }
            if *i == frac_start {
                return None;
            }
            let text = std::str::from_utf8(&bytes[start..*i]).ok()?;
            let v: f32 = text.parse().ok()?;
            Fixed::checked_from_f32(v)
        }
        _ => {
            let v: i32 = std::str::from_utf8(&bytes[int_start..*i]).ok()?.parse().ok()?;
            Fixed::checked_from_int(if neg { -v } else { v })
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut any = false;
        for (c, suffix) in self.components().into_iter().zip(['m', 'b', 't', 's']) {
            if !c.is_zero() {
                write!(f, "{c}{suffix}")?;
                any = true;
            }
        }
        if !any {
            write!(f, "0b")?;
        }
        Ok(())
    }
}

impl Add for Timestamp {
    type Output = Timestamp;
    fn add(self, rhs: Timestamp) -> Timestamp {
        Timestamp {
            measures: self.measures + rhs.measures,
            beats: self.beats + rhs.beats,
            ticks: self.ticks + rhs.ticks,
            seconds: self.seconds + rhs.seconds,
        }
    }
}

impl AddAssign for Timestamp {
    fn add_assign(&mut self, rhs: Timestamp) {
        *self = *self + rhs;
    }
}

impl Sub for Timestamp {
    type Output = Timestamp;
    fn sub(self, rhs: Timestamp) -> Timestamp {
        Timestamp {
            measures: self.measures - rhs.measures,
            beats: self.beats - rhs.beats,
            ticks: self.ticks - rhs.ticks,
            seconds: self.seconds - rhs.seconds,
        }
    }
}

impl Mul<i32> for Timestamp {
    type Output = Timestamp;
    fn mul(self, rhs: i32) -> Timestamp {
        Timestamp::from_components(self.components().map(|c| c * rhs))
    }
}

impl Mul<f32> for Timestamp {
    type Output = Timestamp;
    fn mul(self, rhs: f32) -> Timestamp {
        Timestamp::from_components(self.components().map(|c| c * rhs))
    }
}

impl Div<i32> for Timestamp {
    type Output = Timestamp;
    fn div(self, rhs: i32) -> Timestamp {
        Timestamp::from_components(self.components().map(|c| c / rhs))
    }
}

impl Div<f32> for Timestamp {
    type Output = Timestamp;
    fn div(self, rhs: f32) -> Timestamp {
        Timestamp::from_components(self.components().map(|c| c / rhs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_components() {
        assert_eq!(
            Timestamp::parse("2m").unwrap().measures,
            Fixed::from_int(2)
        );
        assert_eq!(Timestamp::parse("3b").unwrap().beats, Fixed::from_int(3));
        assert_eq!(
            Timestamp::parse("1.5t").unwrap().ticks,
            Fixed::from_f32(1.5)
        );
        assert_eq!(
            Timestamp::parse("0.25s").unwrap().seconds,
            Fixed::from_f32(0.25)
        );
    }

    #[test]
    fn parses_combined_literal() {
        let t = Timestamp::parse("2b1.5t").unwrap();
        assert_eq!(t.beats, Fixed::from_int(2));
        assert_eq!(t.ticks, Fixed::from_f32(1.5));
        assert!(t.measures.is_zero());
    }

    #[test]
    fn parses_rational_component() {
        let t = Timestamp::parse("1/3b").unwrap();
        assert_eq!(t.beats, Fixed::from_ratio(1, 3));
    }

    #[test]
    fn rejects_malformed_literals() {
        assert!(Timestamp::parse("2").is_none()); // no suffix
        assert!(Timestamp::parse("b").is_none());
        assert!(Timestamp::parse("1b2b").is_none()); // duplicate suffix
        assert!(Timestamp::parse("1x").is_none());
        assert!(Timestamp::parse("1/0b").is_none());
        assert!(Timestamp::parse("").is_none());
        assert!(Timestamp::parse("1b garbage").is_none());
    }

    #[test]
    fn rejects_out_of_range_components() {
        // The integral range of a component is -32768..=32767; anything
        // beyond must fail the parse rather than wrap.
        assert!(Timestamp::parse("40000b").is_none());
        assert!(Timestamp::parse("32768b").is_none());
        assert!(Timestamp::parse("40000.5s").is_none());
        assert!(Timestamp::parse("1000000/2b").is_none());

        assert_eq!(
            Timestamp::parse("32767b").unwrap().beats,
            Fixed::from_int(32767)
        );
        assert_eq!(
            Timestamp::parse("-32768b").unwrap().beats,
            Fixed::from_int(-32768)
        );
    }

    #[test]
    fn arithmetic_is_componentwise() {
        let a = Timestamp::parse("1b2t").unwrap();
        let b = Timestamp::parse("2b").unwrap();
        let sum = a + b;
        assert_eq!(sum.beats, Fixed::from_int(3));
        assert_eq!(sum.ticks, Fixed::from_int(2));

        let scaled = b * 3;
        assert_eq!(scaled.beats, Fixed::from_int(6));
        assert_eq!((scaled / 2).beats, Fixed::from_int(3));
    }

    #[test]
    fn repeated_offsets_do_not_drift() {
        let every = Timestamp::parse("1/3b").unwrap();
        let mut acc = Timestamp::ZERO;
        for _ in 0..300 {
            acc += every;
        }
        assert_eq!(acc.beats, Fixed::from_ratio(1, 3) * 300);
    }

    #[test]
    fn encode_decode_round_trips() {
        for s in ["0b", "2b1.5t", "1/3b", "100m50b25t0.5s", "-3b"] {
            let t = Timestamp::parse(s).unwrap();
            let mut buf = Vec::new();
            t.encode(&mut buf);
            let mut pos = 0;
            let back = Timestamp::decode(&buf, &mut pos).unwrap();
            assert_eq!(back, t);
            assert_eq!(pos, buf.len());
        }
    }

    #[test]
    fn zero_encodes_to_single_mask_byte() {
        let mut buf = Vec::new();
        Timestamp::ZERO.encode(&mut buf);
        assert_eq!(buf, vec![0u8]);
    }
}
