#![forbid(unsafe_code)]

pub mod binary;
pub mod binding;
pub mod compile;
pub mod ease;
pub mod error;
pub mod fixed;
pub mod lexer;
pub mod storyboard;
pub mod timeline;
pub mod timestamp;
pub mod token;
pub mod value;

mod resolve;
mod scope;

pub use binary::{read_storyboard, write_storyboard};
pub use binding::{Binding, ObjectDecl, ObjectId, ObjectKind, PathSeg};
pub use compile::{compile_file, compile_script};
pub use ease::Ease;
pub use error::{CadenzaError, CadenzaResult, CompileFailure};
pub use fixed::Fixed;
pub use storyboard::{
    CurveTarget, EventHandler, KeyframeBuilder, LoadReport, Storyboard, StoryboardHost, TimeMap,
    TimelineBuilder, TimelineKind,
};
pub use timeline::{Curve, Event, Keyframe, Lerp};
pub use timestamp::Timestamp;
pub use value::{Value, Vector};
