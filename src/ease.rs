/// Interpolation kind attached to a keyframe, applied toward the next key.
/// `Fixed` holds the previous value with no remap at all.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
pub enum Ease {
    Fixed,
    #[default]
    Linear,
    Smooth,
    EaseIn,
    EaseOut,
}

impl Ease {
    /// Script keyword for this kind, also used by the lexer's keyword table.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Linear => "linear",
            Self::Smooth => "smooth",
            Self::EaseIn => "easein",
            Self::EaseOut => "easeout",
        }
    }

    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "fixed" => Some(Self::Fixed),
            "linear" => Some(Self::Linear),
            "smooth" => Some(Self::Smooth),
            "easein" => Some(Self::EaseIn),
            "easeout" => Some(Self::EaseOut),
            _ => None,
        }
    }

    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Fixed => 0.0,
            Self::Linear => t,
            Self::Smooth => t * t * (3.0 - 2.0 * t),
            Self::EaseIn => t * t,
            Self::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
        }
    }

    pub(crate) fn byte(self) -> u8 {
        match self {
            Self::Fixed => 0,
            Self::Linear => 1,
            Self::Smooth => 2,
            Self::EaseIn => 3,
            Self::EaseOut => 4,
        }
    }

    pub(crate) fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Fixed),
            1 => Some(Self::Linear),
            2 => Some(Self::Smooth),
            3 => Some(Self::EaseIn),
            4 => Some(Self::EaseOut),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_stable() {
        for ease in [Ease::Linear, Ease::Smooth, Ease::EaseIn, Ease::EaseOut] {
            assert_eq!(ease.apply(0.0), 0.0);
            assert_eq!(ease.apply(1.0), 1.0);
        }
    }

    #[test]
    fn smooth_midpoint_is_exact() {
        // t^2 (3 - 2t) at t = 0.5 is exactly 0.5 in binary floating point.
        assert_eq!(Ease::Smooth.apply(0.5), 0.5);
    }

    #[test]
    fn monotonic_spot_check() {
        for ease in [Ease::Linear, Ease::Smooth, Ease::EaseIn, Ease::EaseOut] {
            let a = ease.apply(0.25);
            let b = ease.apply(0.5);
            let c = ease.apply(0.75);
            assert!(a < b);
            assert!(b < c);
        }
    }

    #[test]
    fn keyword_round_trip() {
        for ease in [
            Ease::Fixed,
            Ease::Linear,
            Ease::Smooth,
            Ease::EaseIn,
            Ease::EaseOut,
        ] {
            assert_eq!(Ease::from_keyword(ease.keyword()), Some(ease));
            assert_eq!(Ease::from_byte(ease.byte()), Some(ease));
        }
    }
}
