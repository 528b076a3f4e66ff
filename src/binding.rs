/// Index into a storyboard's object-reference list.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    serde::Serialize, serde::Deserialize,
)]
pub struct ObjectId(pub u32);

/// One declared external reference: the script-level name it was declared
/// under plus the tagged constructor the host needs to produce it.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ObjectDecl {
    pub name: String,
    pub kind: ObjectKind,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ObjectKind {
    /// An object that already exists in the host scene, looked up by name.
    External { scene_name: String },
    /// An asset bundle, loaded from a source path.
    Bundle { source: String },
    /// An asset inside a previously declared bundle.
    Asset { bundle: ObjectId, path: String },
    /// A fresh instance of a previously loaded asset.
    Instance { asset: ObjectId },
    /// A post-processing effect, created by name.
    PostProcess { effect: String },
}

/// One segment of an access path into the host object graph.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PathSeg {
    Name(String),
    Index(i32),
}

impl std::fmt::Display for PathSeg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name(n) => write!(f, ".{n}"),
            Self::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// Resolved destination for a timeline: an object reference plus the access
/// path left undereferenced at compile time. Structural equality makes this
/// the aggregation key, so every call site that targets the same destination
/// accumulates into one timeline.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Binding {
    pub object: ObjectId,
    pub path: Vec<PathSeg>,
}

impl Binding {
    pub fn new(object: ObjectId, path: Vec<PathSeg>) -> Self {
        Self { object, path }
    }

    /// Human-readable form for diagnostics, e.g. `#2.color[0].r`.
    pub fn describe(&self) -> String {
        use std::fmt::Write as _;
        let mut s = format!("#{}", self.object.0);
        for seg in &self.path {
            let _ = write!(s, "{seg}");
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_compare_structurally() {
        let a = Binding::new(
            ObjectId(1),
            vec![PathSeg::Name("color".into()), PathSeg::Index(2)],
        );
        let b = Binding::new(
            ObjectId(1),
            vec![PathSeg::Name("color".into()), PathSeg::Index(2)],
        );
        let c = Binding::new(ObjectId(1), vec![PathSeg::Name("color".into())]);
        assert_eq!(a, b);
        assert_ne!(a, c);

        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(a, 1);
        *map.entry(b).or_insert(0) += 1;
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn describe_is_readable() {
        let b = Binding::new(
            ObjectId(3),
            vec![PathSeg::Name("pos".into()), PathSeg::Index(0)],
        );
        assert_eq!(b.describe(), "#3.pos[0]");
    }
}
