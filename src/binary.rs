//! Compact storyboard serialization. Timestamps use the minimal-width
//! component encoding; values carry one tag byte each. The format is a plain
//! byte stream with no alignment requirements.

use std::collections::BTreeMap;

use crate::binding::{Binding, ObjectDecl, ObjectId, ObjectKind, PathSeg};
use crate::ease::Ease;
use crate::error::{CadenzaError, CadenzaResult};
use crate::storyboard::{KeyframeBuilder, Storyboard, TimelineBuilder, TimelineKind};
use crate::timestamp::Timestamp;
use crate::value::{Value, Vector};

const MAGIC: &[u8; 4] = b"CDZA";
const VERSION: u8 = 1;

pub fn write_storyboard(sb: &Storyboard) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.push(VERSION);

    write_u32(&mut out, sb.objects.len() as u32);
    for decl in &sb.objects {
        write_object(&mut out, decl);
    }

    write_u32(&mut out, sb.timelines.len() as u32);
    for tl in &sb.timelines {
        write_timeline(&mut out, tl);
    }

    write_u32(&mut out, sb.out_params.len() as u32);
    for (name, value) in &sb.out_params {
        write_str(&mut out, name);
        write_value(&mut out, value);
    }
    out
}

pub fn read_storyboard(bytes: &[u8]) -> CadenzaResult<Storyboard> {
    let mut r = Reader { bytes, pos: 0 };
    if r.take(4)? != MAGIC {
        return Err(CadenzaError::binary("bad magic, not a storyboard file"));
    }
    let version = r.u8()?;
    if version != VERSION {
        return Err(CadenzaError::binary(format!(
            "unsupported format version {version}"
        )));
    }

    let n_objects = r.u32()? as usize;
    let mut objects = Vec::with_capacity(n_objects.min(4096));
    for _ in 0..n_objects {
        objects.push(read_object(&mut r)?);
    }

    let n_timelines = r.u32()? as usize;
    let mut timelines = Vec::with_capacity(n_timelines.min(4096));
    for _ in 0..n_timelines {
        timelines.push(read_timeline(&mut r)?);
    }

    let n_params = r.u32()? as usize;
    let mut out_params = BTreeMap::new();
    for _ in 0..n_params {
        let name = r.string()?;
        let value = read_value(&mut r)?;
        out_params.insert(name, value);
    }

    if r.pos != bytes.len() {
        return Err(CadenzaError::binary(format!(
            "{} trailing byte(s) after storyboard data",
            bytes.len() - r.pos
        )));
    }
    Ok(Storyboard::new(objects, timelines, out_params))
}

fn write_object(out: &mut Vec<u8>, decl: &ObjectDecl) {
    write_str(out, &decl.name);
    match &decl.kind {
        ObjectKind::External { scene_name } => {
            out.push(0);
            write_str(out, scene_name);
        }
        ObjectKind::Bundle { source } => {
            out.push(1);
            write_str(out, source);
        }
        ObjectKind::Asset { bundle, path } => {
            out.push(2);
            write_u32(out, bundle.0);
            write_str(out, path);
        }
        ObjectKind::Instance { asset } => {
            out.push(3);
            write_u32(out, asset.0);
        }
        ObjectKind::PostProcess { effect } => {
            out.push(4);
            write_str(out, effect);
        }
    }
}

fn read_object(r: &mut Reader<'_>) -> CadenzaResult<ObjectDecl> {
    let name = r.string()?;
    let kind = match r.u8()? {
        0 => ObjectKind::External {
            scene_name: r.string()?,
        },
        1 => ObjectKind::Bundle {
            source: r.string()?,
        },
        2 => ObjectKind::Asset {
            bundle: ObjectId(r.u32()?),
            path: r.string()?,
        },
        3 => ObjectKind::Instance {
            asset: ObjectId(r.u32()?),
        },
        4 => ObjectKind::PostProcess {
            effect: r.string()?,
        },
        tag => return Err(CadenzaError::binary(format!("unknown object tag {tag}"))),
    };
    Ok(ObjectDecl { name, kind })
}

fn write_timeline(out: &mut Vec<u8>, tl: &TimelineBuilder) {
    out.push(match tl.kind {
        TimelineKind::Curve => 0,
        TimelineKind::Event => 1,
    });
    write_binding(out, &tl.binding);
    write_u32(out, tl.keys.len() as u32);
    for k in &tl.keys {
        k.time.encode(out);
        write_value(out, &k.value);
        out.push(k.ease.byte());
        write_u32(out, k.order);
    }
}

fn read_timeline(r: &mut Reader<'_>) -> CadenzaResult<TimelineBuilder> {
    let kind = match r.u8()? {
        0 => TimelineKind::Curve,
        1 => TimelineKind::Event,
        tag => return Err(CadenzaError::binary(format!("unknown timeline tag {tag}"))),
    };
    let binding = read_binding(r)?;
    let n = r.u32()? as usize;
    let mut keys = Vec::with_capacity(n.min(65536));
    for _ in 0..n {
        let time = r.timestamp()?;
        let value = read_value(r)?;
        let ease = Ease::from_byte(r.u8()?)
            .ok_or_else(|| CadenzaError::binary("unknown interpolation kind"))?;
        let order = r.u32()?;
        keys.push(KeyframeBuilder {
            time,
            value,
            ease,
            order,
        });
    }
    Ok(TimelineBuilder {
        binding,
        kind,
        keys,
    })
}

fn write_binding(out: &mut Vec<u8>, b: &Binding) {
    write_u32(out, b.object.0);
    write_u32(out, b.path.len() as u32);
    for seg in &b.path {
        match seg {
            PathSeg::Name(n) => {
                out.push(0);
                write_str(out, n);
            }
            PathSeg::Index(i) => {
                out.push(1);
                write_u32(out, *i as u32);
            }
        }
    }
}

fn read_binding(r: &mut Reader<'_>) -> CadenzaResult<Binding> {
    let object = ObjectId(r.u32()?);
    let n = r.u32()? as usize;
    let mut path = Vec::with_capacity(n.min(256));
    for _ in 0..n {
        path.push(match r.u8()? {
            0 => PathSeg::Name(r.string()?),
            1 => PathSeg::Index(r.u32()? as i32),
            tag => return Err(CadenzaError::binary(format!("unknown path tag {tag}"))),
        });
    }
    Ok(Binding::new(object, path))
}

// Value tags. Integers pick the smallest of three widths; true and false are
// tags of their own so booleans cost one byte total.
const TAG_NULL: u8 = 0;
const TAG_FALSE: u8 = 1;
const TAG_TRUE: u8 = 2;
const TAG_I8: u8 = 3;
const TAG_I16: u8 = 4;
const TAG_I32: u8 = 5;
const TAG_F32: u8 = 6;
const TAG_STR: u8 = 7;
const TAG_VECTOR: u8 = 8;
const TAG_ARRAY: u8 = 9;
const TAG_TIME: u8 = 10;
const TAG_OBJECT: u8 = 11;
const TAG_EASE: u8 = 12;
const TAG_BINDING: u8 = 13;

fn write_value(out: &mut Vec<u8>, v: &Value) {
    match v {
        Value::Null => out.push(TAG_NULL),
        Value::Bool(false) => out.push(TAG_FALSE),
        Value::Bool(true) => out.push(TAG_TRUE),
        Value::Int(i) => {
            if let Ok(b) = i8::try_from(*i) {
                out.push(TAG_I8);
                out.push(b as u8);
            } else if let Ok(s) = i16::try_from(*i) {
                out.push(TAG_I16);
                out.extend_from_slice(&s.to_le_bytes());
            } else {
                out.push(TAG_I32);
                out.extend_from_slice(&i.to_le_bytes());
            }
        }
        Value::Float(f) => {
            out.push(TAG_F32);
            out.extend_from_slice(&f.to_le_bytes());
        }
        Value::Str(s) => {
            out.push(TAG_STR);
            write_str(out, s);
        }
        Value::Vector(vec) => {
            out.push(TAG_VECTOR);
            out.push(vec.dim);
            for lane in vec.as_slice() {
                out.extend_from_slice(&lane.to_le_bytes());
            }
        }
        Value::Array(items) => {
            out.push(TAG_ARRAY);
            write_u32(out, items.len() as u32);
            for item in items {
                write_value(out, item);
            }
        }
        Value::Time(t) => {
            out.push(TAG_TIME);
            t.encode(out);
        }
        Value::Object(id) => {
            out.push(TAG_OBJECT);
            write_u32(out, id.0);
        }
        Value::Ease(e) => {
            out.push(TAG_EASE);
            out.push(e.byte());
        }
        Value::Binding(b) => {
            out.push(TAG_BINDING);
            write_binding(out, b);
        }
    }
}

fn read_value(r: &mut Reader<'_>) -> CadenzaResult<Value> {
    Ok(match r.u8()? {
        TAG_NULL => Value::Null,
        TAG_FALSE => Value::Bool(false),
        TAG_TRUE => Value::Bool(true),
        TAG_I8 => Value::Int(r.u8()? as i8 as i32),
        TAG_I16 => Value::Int(i16::from_le_bytes(r.array()?) as i32),
        TAG_I32 => Value::Int(i32::from_le_bytes(r.array()?)),
        TAG_F32 => Value::Float(f32::from_le_bytes(r.array()?)),
        TAG_STR => Value::Str(r.string()?),
        TAG_VECTOR => {
            let dim = r.u8()?;
            if !(1..=4).contains(&dim) {
                return Err(CadenzaError::binary(format!("bad vector dimension {dim}")));
            }
            let mut lanes = [0.0f32; 4];
            for lane in lanes.iter_mut().take(dim as usize) {
                *lane = f32::from_le_bytes(r.array()?);
            }
            Value::Vector(Vector::new(dim, lanes))
        }
        TAG_ARRAY => {
            let n = r.u32()? as usize;
            let mut items = Vec::with_capacity(n.min(65536));
            for _ in 0..n {
                items.push(read_value(r)?);
            }
            Value::Array(items)
        }
        TAG_TIME => Value::Time(r.timestamp()?),
        TAG_OBJECT => Value::Object(ObjectId(r.u32()?)),
        TAG_EASE => Value::Ease(
            Ease::from_byte(r.u8()?)
                .ok_or_else(|| CadenzaError::binary("unknown interpolation kind"))?,
        ),
        TAG_BINDING => Value::Binding(read_binding(r)?),
        tag => return Err(CadenzaError::binary(format!("unknown value tag {tag}"))),
    })
}

fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    write_u32(out, s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> CadenzaResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&e| e <= self.bytes.len())
            .ok_or_else(|| CadenzaError::binary("unexpected end of storyboard data"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> CadenzaResult<[u8; N]> {
        Ok(self.take(N)?.try_into().expect("slice length checked"))
    }

    fn u8(&mut self) -> CadenzaResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> CadenzaResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn string(&mut self) -> CadenzaResult<String> {
        let n = self.u32()? as usize;
        let raw = self.take(n)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| CadenzaError::binary("string field is not valid utf-8"))
    }

    fn timestamp(&mut self) -> CadenzaResult<Timestamp> {
        Timestamp::decode(&self.bytes[..], &mut self.pos)
            .ok_or_else(|| CadenzaError::binary("truncated timestamp"))
    }
}
