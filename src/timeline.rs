use crate::ease::Ease;
use crate::value::{Value, Vector};

/// Interpolatable destination type.
pub trait Lerp: Sized + Clone {
    fn lerp(a: &Self, b: &Self, t: f32) -> Self;
}

impl Lerp for f32 {
    fn lerp(a: &Self, b: &Self, t: f32) -> Self {
        a + (b - a) * t
    }
}

impl Lerp for Vector {
    fn lerp(a: &Self, b: &Self, t: f32) -> Self {
        let mut lanes = [0.0f32; 4];
        for (lane, (x, y)) in lanes.iter_mut().zip(a.lanes.iter().zip(b.lanes.iter())) {
            *lane = x + (y - x) * t;
        }
        Vector::new(a.dim, lanes)
    }
}

// Discrete payloads step rather than blend.
impl Lerp for Value {
    fn lerp(a: &Self, _b: &Self, _t: f32) -> Self {
        a.clone()
    }
}

/// One typed keyframe: time in continuous playback seconds, the declaration
/// order tag breaking ties between simultaneous keys.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Keyframe<T> {
    pub time: f32,
    pub value: T,
    pub ease: Ease,
    pub order: u32,
}

/// Sentinel cursor: before the first keyframe / never evaluated.
const BEFORE_FIRST: isize = -1;

fn sort_keys<T>(keys: &mut [Keyframe<T>]) {
    keys.sort_by(|a, b| {
        a.time
            .total_cmp(&b.time)
            .then_with(|| a.order.cmp(&b.order))
    });
}

/// Moves the cached cursor so it points at the last key with `time <= t`
/// (or `BEFORE_FIRST`). Amortized O(1) for monotonic playback, O(n) worst
/// case for an arbitrary seek.
fn seek<T>(keys: &[Keyframe<T>], cursor: &mut isize, t: f32, mut crossed: impl FnMut(usize)) {
    while ((*cursor + 1) as usize) < keys.len() && keys[(*cursor + 1) as usize].time <= t {
        *cursor += 1;
        crossed(*cursor as usize);
    }
    while *cursor >= BEFORE_FIRST + 1 && keys[*cursor as usize].time > t {
        *cursor -= 1;
    }
}

/// Continuous-valued timeline: an immutable keyframe array sorted by
/// (time, order) plus a cached evaluation cursor.
#[derive(Debug)]
pub struct Curve<T> {
    keys: Vec<Keyframe<T>>,
    cursor: isize,
    /// Bracket index of the previous evaluation, for the step-kind skip.
    last_bracket: Option<isize>,
}

impl<T: Lerp> Curve<T> {
    /// Builds a curve, sorting once; the array is immutable afterwards.
    pub fn new(mut keys: Vec<Keyframe<T>>) -> Self {
        debug_assert!(!keys.is_empty());
        sort_keys(&mut keys);
        Self {
            keys,
            cursor: BEFORE_FIRST,
            last_bracket: None,
        }
    }

    pub fn keys(&self) -> &[Keyframe<T>] {
        &self.keys
    }

    /// Samples the curve at `time` (seconds). Returns `None` when the
    /// bracketing pair is unchanged since the last call and its kind is
    /// `Fixed`, so callers can skip the property write entirely.
    pub fn evaluate(&mut self, time: f32) -> Option<T> {
        seek(&self.keys, &mut self.cursor, time, |_| {});

        let last = self.keys.len() as isize - 1;
        let bracket = self.cursor;
        let interior = bracket >= 0 && bracket < last;
        if interior
            && self.last_bracket == Some(bracket)
            && self.keys[bracket as usize].ease == Ease::Fixed
        {
            return None;
        }
        self.last_bracket = Some(bracket);

        if bracket < 0 {
            return Some(self.keys[0].value.clone());
        }
        if bracket >= last {
            return Some(self.keys[last as usize].value.clone());
        }

        let a = &self.keys[bracket as usize];
        if a.ease == Ease::Fixed {
            return Some(a.value.clone());
        }
        let b = &self.keys[bracket as usize + 1];
        let denom = b.time - a.time;
        let t = if denom > 0.0 {
            (time - a.time) / denom
        } else {
            1.0
        };
        Some(T::lerp(&a.value, &b.value, a.ease.apply(t)))
    }
}

/// Discrete-valued timeline. Never interpolates: advancing across keyframe
/// boundaries fires each crossed key exactly once, in time order, and only
/// when the caller asks for triggering. Backward movement repositions the
/// cursor silently.
#[derive(Debug)]
pub struct Event<T> {
    keys: Vec<Keyframe<T>>,
    cursor: isize,
}

impl<T> Event<T> {
    pub fn new(mut keys: Vec<Keyframe<T>>) -> Self {
        sort_keys(&mut keys);
        Self {
            keys,
            cursor: BEFORE_FIRST,
        }
    }

    pub fn keys(&self) -> &[Keyframe<T>] {
        &self.keys
    }

    pub fn evaluate(&mut self, time: f32, trigger: bool, mut fire: impl FnMut(&Keyframe<T>)) {
        let keys = &self.keys;
        seek(keys, &mut self.cursor, time, |i| {
            if trigger {
                fire(&keys[i]);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(time: f32, value: f32, ease: Ease, order: u32) -> Keyframe<f32> {
        Keyframe {
            time,
            value,
            ease,
            order,
        }
    }

    #[test]
    fn smooth_curve_matches_smoothstep() {
        let mut c = Curve::new(vec![
            key(0.0, 0.0, Ease::Smooth, 0),
            key(1.0, 10.0, Ease::Linear, 1),
        ]);
        assert_eq!(c.evaluate(0.5), Some(5.0)); // smoothstep(0.5) == 0.5 exactly
        assert_eq!(c.evaluate(-1.0), Some(0.0));
        assert_eq!(c.evaluate(2.0), Some(10.0));
    }

    #[test]
    fn fixed_kind_steps_and_skips_recomputation() {
        let mut c = Curve::new(vec![
            key(0.0, 1.0, Ease::Fixed, 0),
            key(1.0, 9.0, Ease::Linear, 1),
        ]);
        assert_eq!(c.evaluate(0.2), Some(1.0));
        // Same bracket, Fixed kind: no recomputation needed.
        assert_eq!(c.evaluate(0.7), None);
        assert_eq!(c.evaluate(1.0), Some(9.0));
    }

    #[test]
    fn cursor_survives_arbitrary_seeks() {
        let keys: Vec<_> = (0..10)
            .map(|i| key(i as f32, i as f32, Ease::Linear, i))
            .collect();
        let mut c = Curve::new(keys);
        assert_eq!(c.evaluate(8.5), Some(8.5));
        assert_eq!(c.evaluate(0.5), Some(0.5));
        assert_eq!(c.evaluate(3.25), Some(3.25));
        assert_eq!(c.evaluate(3.5), Some(3.5));
    }

    #[test]
    fn equal_time_keys_tie_break_on_order() {
        let mut c = Curve::new(vec![
            key(1.0, 5.0, Ease::Linear, 7),
            key(1.0, 3.0, Ease::Linear, 2),
            key(0.0, 0.0, Ease::Linear, 0),
        ]);
        // Last write (highest order) wins at the shared time.
        assert_eq!(c.evaluate(1.0), Some(5.0));
        assert_eq!(c.keys()[1].order, 2);
        assert_eq!(c.keys()[2].order, 7);
    }

    #[test]
    fn events_catch_up_in_order_and_seek_back_silently() {
        let mut e = Event::new(vec![
            key(1.0, 1.0, Ease::Linear, 0),
            key(2.0, 2.0, Ease::Linear, 1),
            key(3.0, 3.0, Ease::Linear, 2),
        ]);
        let mut fired = Vec::new();
        e.evaluate(2.5, true, |k| fired.push(k.value));
        assert_eq!(fired, vec![1.0, 2.0]);

        // Backward seek fires nothing and repositions before the first key.
        fired.clear();
        e.evaluate(0.5, true, |k| fired.push(k.value));
        assert!(fired.is_empty());

        // Advancing again re-fires from the repositioned cursor.
        e.evaluate(1.5, true, |k| fired.push(k.value));
        assert_eq!(fired, vec![1.0]);
    }

    #[test]
    fn events_move_without_firing_when_not_triggered() {
        let mut e = Event::new(vec![key(1.0, 1.0, Ease::Linear, 0)]);
        let mut fired = 0;
        e.evaluate(5.0, false, |_| fired += 1);
        assert_eq!(fired, 0);
        // Already past the key: a triggering call must not replay it.
        e.evaluate(6.0, true, |_| fired += 1);
        assert_eq!(fired, 0);
    }

    #[test]
    fn vector_lerp_is_lanewise() {
        let a = Vector::new(3, [0.0, 10.0, -2.0, 0.0]);
        let b = Vector::new(3, [10.0, 0.0, 2.0, 0.0]);
        let mid = <Vector as Lerp>::lerp(&a, &b, 0.5);
        assert_eq!(mid.as_slice(), &[5.0, 5.0, 0.0]);
    }
}
