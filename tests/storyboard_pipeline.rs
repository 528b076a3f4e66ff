//! End-to-end: script source through compile, serialization, host binding
//! and playback evaluation.

use std::cell::RefCell;
use std::rc::Rc;

use cadenza::{
    CurveTarget, EventHandler, ObjectDecl, PathSeg, Storyboard, StoryboardHost, TimeMap,
    Timestamp, Value,
};

const SCRIPT: &str = r#"
// One scene object, a fade curve and a tapped event train.
object note "Note01"
setg lift 2

proc Main
0b call Fade
2b loop Tap 3 1b

proc Fade
0b key note.alpha 0 smooth
2b key note.alpha lift

proc Tap
0b event note.hit iter
"#;

/// One beat is one second; other components are ignored.
struct BeatClock;

impl TimeMap for BeatClock {
    fn seconds(&self, t: &Timestamp) -> f32 {
        t.beats.to_f32()
    }
}

#[derive(Default)]
struct Recorder {
    alpha: Rc<RefCell<Vec<f32>>>,
    hits: Rc<RefCell<Vec<Value>>>,
}

impl StoryboardHost for Recorder {
    fn prepare(&mut self, decl: &ObjectDecl) -> bool {
        decl.name == "note"
    }

    fn curve_target(&mut self, _decl: &ObjectDecl, path: &[PathSeg]) -> Option<CurveTarget> {
        if path == [PathSeg::Name("alpha".into())] {
            let out = Rc::clone(&self.alpha);
            Some(CurveTarget::Float(Box::new(move |v| {
                out.borrow_mut().push(v);
            })))
        } else {
            None
        }
    }

    fn event_target(&mut self, _decl: &ObjectDecl, path: &[PathSeg]) -> Option<EventHandler> {
        if path == [PathSeg::Name("hit".into())] {
            let out = Rc::clone(&self.hits);
            Some(Box::new(move |v| out.borrow_mut().push(v.clone())))
        } else {
            None
        }
    }
}

fn load(sb: &mut Storyboard) -> Recorder {
    let host = Recorder::default();
    let mut binder = Recorder {
        alpha: Rc::clone(&host.alpha),
        hits: Rc::clone(&host.hits),
    };
    let report = sb.load(&BeatClock, &mut binder);
    assert_eq!(report.curves, 1);
    assert_eq!(report.events, 1);
    assert!(report.skipped.is_empty(), "skipped: {:?}", report.skipped);
    host
}

#[test]
fn script_compiles_loads_and_plays() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let mut sb = cadenza::compile_script(SCRIPT).expect("script compiles");
    assert_eq!(sb.objects.len(), 1);
    assert_eq!(sb.out_params["lift"], Value::Int(2));

    let rec = load(&mut sb);

    // Smoothstep midpoint of the 0..2 fade.
    sb.evaluate(1.0, false);
    assert_eq!(rec.alpha.borrow().as_slice(), &[1.0]);
    assert!(rec.hits.borrow().is_empty());

    // Sweep past the whole event train: each key fires once, in order.
    sb.evaluate(10.0, true);
    assert_eq!(
        rec.hits.borrow().as_slice(),
        &[Value::Int(0), Value::Int(1), Value::Int(2)]
    );

    // Curve clamps at its last key.
    assert_eq!(rec.alpha.borrow().last(), Some(&2.0));
}

#[test]
fn scrubbing_repositions_without_refiring() {
    let mut sb = cadenza::compile_script(SCRIPT).expect("script compiles");
    let rec = load(&mut sb);

    sb.evaluate(10.0, true);
    assert_eq!(rec.hits.borrow().len(), 3);

    // Scrub back silently, then replay only the first event.
    rec.hits.borrow_mut().clear();
    sb.evaluate(0.0, true);
    assert!(rec.hits.borrow().is_empty());
    sb.evaluate(2.5, true);
    assert_eq!(rec.hits.borrow().as_slice(), &[Value::Int(0)]);
}

#[test]
fn binary_form_plays_identically() {
    let sb = cadenza::compile_script(SCRIPT).expect("script compiles");
    let bytes = cadenza::write_storyboard(&sb);
    let mut back = cadenza::read_storyboard(&bytes).expect("round trip");
    assert_eq!(back.timelines, sb.timelines);

    let rec = load(&mut back);
    back.evaluate(1.0, false);
    assert_eq!(rec.alpha.borrow().as_slice(), &[1.0]);
}

#[test]
fn unload_stops_playback_until_reloaded() {
    let mut sb = cadenza::compile_script(SCRIPT).expect("script compiles");
    let rec = load(&mut sb);

    sb.unload();
    assert!(!sb.is_loaded());
    sb.evaluate(1.0, true);
    assert!(rec.alpha.borrow().is_empty());
    assert!(rec.hits.borrow().is_empty());

    let rec = load(&mut sb);
    sb.evaluate(1.0, false);
    assert_eq!(rec.alpha.borrow().len(), 1);
}

#[test]
fn failed_references_skip_their_timelines() {
    let script = r#"
object note "Note01"
object ghost "Missing"

proc Main
0b key note.alpha 1
0b key ghost.alpha 1
"#;
    let mut sb = cadenza::compile_script(script).expect("script compiles");
    let host = Recorder::default();
    let mut binder = Recorder {
        alpha: Rc::clone(&host.alpha),
        hits: Rc::clone(&host.hits),
    };
    // Recorder::prepare only accepts "note".
    let report = sb.load(&BeatClock, &mut binder);
    assert_eq!(report.curves, 1);
    assert!(report.skipped.iter().any(|s| s.contains("ghost") || s.contains("#1")));

    sb.evaluate(0.0, false);
    assert_eq!(host.alpha.borrow().len(), 1);
}
