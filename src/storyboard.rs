use std::collections::BTreeMap;
use std::fmt;

use crate::binding::{Binding, ObjectDecl, PathSeg};
use crate::ease::Ease;
use crate::timeline::{Curve, Event, Keyframe};
use crate::timestamp::Timestamp;
use crate::value::{Value, Vector};

/// A keyframe as accumulated during compilation: still in musical time, its
/// value still untyped. Typed conversion happens only at load, once the
/// binding is resolved against a real property.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct KeyframeBuilder {
    pub time: Timestamp,
    pub value: Value,
    pub ease: Ease,
    /// Program-wide declaration order, the tie-break for simultaneous keys.
    pub order: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TimelineKind {
    Curve,
    Event,
}

/// All keyframes accumulated for one destination.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TimelineBuilder {
    pub binding: Binding,
    pub kind: TimelineKind,
    pub keys: Vec<KeyframeBuilder>,
}

/// Tempo map: musical time to continuous playback seconds. Injected by the
/// host; the compiler never interprets the components itself.
pub trait TimeMap {
    fn seconds(&self, t: &Timestamp) -> f32;
}

/// Typed write access to one host property, produced by the host per binding.
pub enum CurveTarget {
    Float(Box<dyn FnMut(f32)>),
    Vector { dim: u8, set: Box<dyn FnMut(Vector)> },
}

pub type EventHandler = Box<dyn FnMut(&Value)>;

/// The external collaborator a storyboard is loaded against. Resolving a
/// binding path into a live property is entirely the host's concern; the
/// runtime only needs a typed setter back.
pub trait StoryboardHost {
    /// Prepare one declared reference (load a bundle, instantiate an asset...).
    /// Declarations arrive in source order, so dependencies come first.
    /// Returning false omits every timeline bound to this reference.
    fn prepare(&mut self, decl: &ObjectDecl) -> bool;

    fn curve_target(&mut self, decl: &ObjectDecl, path: &[PathSeg]) -> Option<CurveTarget>;

    fn event_target(&mut self, decl: &ObjectDecl, path: &[PathSeg]) -> Option<EventHandler>;
}

enum BoundTimeline {
    Float {
        curve: Curve<f32>,
        set: Box<dyn FnMut(f32)>,
    },
    Vector {
        curve: Curve<Vector>,
        set: Box<dyn FnMut(Vector)>,
    },
    Event {
        event: Event<Value>,
        fire: EventHandler,
    },
}

/// Diagnostics from one load. Binding failures are never fatal: each failing
/// timeline is logged and omitted while the rest load and play.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub curves: usize,
    pub events: usize,
    pub skipped: Vec<String>,
}

/// The unit of load/unload/evaluate: everything one compile produced.
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Storyboard {
    pub objects: Vec<ObjectDecl>,
    pub timelines: Vec<TimelineBuilder>,
    /// Declaration-time globals, exported for host consumption.
    pub out_params: BTreeMap<String, Value>,
    #[serde(skip)]
    bound: Vec<BoundTimeline>,
}

// Bound timelines hold boxed host closures, so the derive is unavailable;
// report their count instead.
impl fmt::Debug for Storyboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storyboard")
            .field("objects", &self.objects)
            .field("timelines", &self.timelines)
            .field("out_params", &self.out_params)
            .field("bound", &self.bound.len())
            .finish()
    }
}

impl Storyboard {
    pub fn new(
        objects: Vec<ObjectDecl>,
        timelines: Vec<TimelineBuilder>,
        out_params: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            objects,
            timelines,
            out_params,
            bound: Vec::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        !self.bound.is_empty()
    }

    /// Binds every timeline against the host, converting raw keyframes into
    /// typed, sorted arrays in playback seconds.
    #[tracing::instrument(skip_all)]
    pub fn load(&mut self, time_map: &dyn TimeMap, host: &mut dyn StoryboardHost) -> LoadReport {
        self.bound.clear();
        let mut report = LoadReport::default();

        let prepared: Vec<bool> = self.objects.iter().map(|d| host.prepare(d)).collect();
        for (decl, ok) in self.objects.iter().zip(&prepared) {
            if !ok {
                tracing::warn!(name = %decl.name, "reference failed to prepare");
                report.skipped.push(format!("reference '{}'", decl.name));
            }
        }

        for tb in &self.timelines {
            let decl = &self.objects[tb.binding.object.0 as usize];
            if !prepared[tb.binding.object.0 as usize] {
                report
                    .skipped
                    .push(format!("timeline {}", tb.binding.describe()));
                continue;
            }

            match tb.kind {
                TimelineKind::Event => match host.event_target(decl, &tb.binding.path) {
                    Some(fire) => {
                        let keys = tb
                            .keys
                            .iter()
                            .map(|k| Keyframe {
                                time: time_map.seconds(&k.time),
                                value: k.value.clone(),
                                ease: k.ease,
                                order: k.order,
                            })
                            .collect();
                        self.bound.push(BoundTimeline::Event {
                            event: Event::new(keys),
                            fire,
                        });
                        report.events += 1;
                    }
                    None => {
                        tracing::warn!(binding = %tb.binding.describe(), "event binding not found");
                        report
                            .skipped
                            .push(format!("event {}", tb.binding.describe()));
                    }
                },
                TimelineKind::Curve => match host.curve_target(decl, &tb.binding.path) {
                    Some(CurveTarget::Float(set)) => {
                        match typed_keys(tb, time_map, |v| v.as_f32()) {
                            Some(keys) => {
                                self.bound.push(BoundTimeline::Float {
                                    curve: Curve::new(keys),
                                    set,
                                });
                                report.curves += 1;
                            }
                            None => skip_mistyped(&mut report, tb, "float"),
                        }
                    }
                    Some(CurveTarget::Vector { dim, set }) => {
                        match typed_keys(tb, time_map, |v| v.as_vector(dim)) {
                            Some(keys) => {
                                self.bound.push(BoundTimeline::Vector {
                                    curve: Curve::new(keys),
                                    set,
                                });
                                report.curves += 1;
                            }
                            None => skip_mistyped(&mut report, tb, "vector"),
                        }
                    }
                    None => {
                        tracing::warn!(binding = %tb.binding.describe(), "curve binding not found");
                        report
                            .skipped
                            .push(format!("curve {}", tb.binding.describe()));
                    }
                },
            }
        }

        report
    }

    /// Drops all bound state; the compiled data stays intact for a re-load.
    pub fn unload(&mut self) {
        self.bound.clear();
    }

    /// Drives every bound timeline to `seconds`. Discrete events fire only
    /// when `trigger_events` is set, so a scrub can reposition silently.
    pub fn evaluate(&mut self, seconds: f32, trigger_events: bool) {
        for bt in &mut self.bound {
            match bt {
                BoundTimeline::Float { curve, set } => {
                    if let Some(v) = curve.evaluate(seconds) {
                        set(v);
                    }
                }
                BoundTimeline::Vector { curve, set } => {
                    if let Some(v) = curve.evaluate(seconds) {
                        set(v);
                    }
                }
                BoundTimeline::Event { event, fire } => {
                    event.evaluate(seconds, trigger_events, |k| fire(&k.value));
                }
            }
        }
    }
}

fn typed_keys<T>(
    tb: &TimelineBuilder,
    time_map: &dyn TimeMap,
    convert: impl Fn(&Value) -> Option<T>,
) -> Option<Vec<Keyframe<T>>> {
    tb.keys
        .iter()
        .map(|k| {
            Some(Keyframe {
                time: time_map.seconds(&k.time),
                value: convert(&k.value)?,
                ease: k.ease,
                order: k.order,
            })
        })
        .collect()
}

fn skip_mistyped(report: &mut LoadReport, tb: &TimelineBuilder, expected: &str) {
    tracing::warn!(
        binding = %tb.binding.describe(),
        expected,
        "keyframe value does not coerce to the bound property type"
    );
    report
        .skipped
        .push(format!("curve {} (type mismatch)", tb.binding.describe()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{ObjectId, ObjectKind};
    use crate::fixed::Fixed;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Beats map 1:1 to seconds; other components are ignored.
    struct BeatsAsSeconds;
    impl TimeMap for BeatsAsSeconds {
        fn seconds(&self, t: &Timestamp) -> f32 {
            t.beats.to_f32()
        }
    }

    struct RecordingHost {
        floats: Rc<RefCell<Vec<f32>>>,
        fired: Rc<RefCell<Vec<Value>>>,
        known_path: PathSeg,
    }

    impl StoryboardHost for RecordingHost {
        fn prepare(&mut self, _decl: &ObjectDecl) -> bool {
            true
        }

        fn curve_target(&mut self, _decl: &ObjectDecl, path: &[PathSeg]) -> Option<CurveTarget> {
            if path.first() != Some(&self.known_path) {
                return None;
            }
            let out = Rc::clone(&self.floats);
            Some(CurveTarget::Float(Box::new(move |v| {
                out.borrow_mut().push(v);
            })))
        }

        fn event_target(&mut self, _decl: &ObjectDecl, _path: &[PathSeg]) -> Option<EventHandler> {
            let out = Rc::clone(&self.fired);
            Some(Box::new(move |v| out.borrow_mut().push(v.clone())))
        }
    }

    fn beats(b: i32) -> Timestamp {
        Timestamp::from_beats(Fixed::from_int(b))
    }

    fn curve_builder(path: &str, times: &[i32]) -> TimelineBuilder {
        TimelineBuilder {
            binding: Binding::new(ObjectId(0), vec![PathSeg::Name(path.into())]),
            kind: TimelineKind::Curve,
            keys: times
                .iter()
                .enumerate()
                .map(|(i, &t)| KeyframeBuilder {
                    time: beats(t),
                    value: Value::Int(t * 10),
                    ease: Ease::Linear,
                    order: i as u32,
                })
                .collect(),
        }
    }

    fn board(timelines: Vec<TimelineBuilder>) -> Storyboard {
        Storyboard::new(
            vec![ObjectDecl {
                name: "note".into(),
                kind: ObjectKind::External {
                    scene_name: "Note01".into(),
                },
            }],
            timelines,
            BTreeMap::new(),
        )
    }

    #[test]
    fn load_binds_and_evaluate_drives_setters() {
        let mut sb = board(vec![curve_builder("alpha", &[0, 2])]);
        let floats = Rc::new(RefCell::new(Vec::new()));
        let mut host = RecordingHost {
            floats: Rc::clone(&floats),
            fired: Rc::new(RefCell::new(Vec::new())),
            known_path: PathSeg::Name("alpha".into()),
        };
        let report = sb.load(&BeatsAsSeconds, &mut host);
        assert_eq!(report.curves, 1);
        assert!(report.skipped.is_empty());
        assert!(sb.is_loaded());

        sb.evaluate(1.0, false);
        assert_eq!(floats.borrow().as_slice(), &[10.0]); // halfway 0..20

        sb.unload();
        assert!(!sb.is_loaded());
    }

    #[test]
    fn debug_formats_without_bound_closures() {
        let mut sb = board(vec![curve_builder("alpha", &[0, 1])]);
        let mut host = RecordingHost {
            floats: Rc::new(RefCell::new(Vec::new())),
            fired: Rc::new(RefCell::new(Vec::new())),
            known_path: PathSeg::Name("alpha".into()),
        };
        sb.load(&BeatsAsSeconds, &mut host);

        let dump = format!("{sb:?}");
        assert!(dump.contains("Storyboard"));
        assert!(dump.contains("timelines"));
        assert!(dump.contains("bound: 1"));
    }

    #[test]
    fn unresolved_bindings_are_skipped_not_fatal() {
        let mut sb = board(vec![
            curve_builder("alpha", &[0, 1]),
            curve_builder("nope", &[0, 1]),
        ]);
        let mut host = RecordingHost {
            floats: Rc::new(RefCell::new(Vec::new())),
            fired: Rc::new(RefCell::new(Vec::new())),
            known_path: PathSeg::Name("alpha".into()),
        };
        let report = sb.load(&BeatsAsSeconds, &mut host);
        assert_eq!(report.curves, 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].contains(".nope"));
    }

    #[test]
    fn events_respect_the_trigger_flag() {
        let mut sb = board(vec![TimelineBuilder {
            binding: Binding::new(ObjectId(0), vec![PathSeg::Name("hit".into())]),
            kind: TimelineKind::Event,
            keys: vec![
                KeyframeBuilder {
                    time: beats(1),
                    value: Value::Str("a".into()),
                    ease: Ease::Fixed,
                    order: 0,
                },
                KeyframeBuilder {
                    time: beats(2),
                    value: Value::Str("b".into()),
                    ease: Ease::Fixed,
                    order: 1,
                },
            ],
        }]);
        let fired = Rc::new(RefCell::new(Vec::new()));
        let mut host = RecordingHost {
            floats: Rc::new(RefCell::new(Vec::new())),
            fired: Rc::clone(&fired),
            known_path: PathSeg::Name("hit".into()),
        };
        sb.load(&BeatsAsSeconds, &mut host);

        sb.evaluate(2.5, true);
        assert_eq!(
            fired.borrow().as_slice(),
            &[Value::Str("a".into()), Value::Str("b".into())]
        );

        fired.borrow_mut().clear();
        sb.evaluate(0.0, true); // backward: silent
        sb.evaluate(3.0, false); // forward without triggering: silent
        assert!(fired.borrow().is_empty());
    }

    #[test]
    fn mistyped_values_skip_the_timeline() {
        let mut sb = board(vec![TimelineBuilder {
            binding: Binding::new(ObjectId(0), vec![PathSeg::Name("alpha".into())]),
            kind: TimelineKind::Curve,
            keys: vec![KeyframeBuilder {
                time: beats(0),
                value: Value::Str("not a number".into()),
                ease: Ease::Linear,
                order: 0,
            }],
        }]);
        let mut host = RecordingHost {
            floats: Rc::new(RefCell::new(Vec::new())),
            fired: Rc::new(RefCell::new(Vec::new())),
            known_path: PathSeg::Name("alpha".into()),
        };
        let report = sb.load(&BeatsAsSeconds, &mut host);
        assert_eq!(report.curves, 0);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].contains("type mismatch"));
    }
}
