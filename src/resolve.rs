use std::collections::HashMap;

use crate::binding::{Binding, ObjectId, PathSeg};
use crate::ease::Ease;
use crate::scope::Scope;
use crate::timestamp::Timestamp;
use crate::token::Token;
use crate::value::Value;

/// Name environment a token is resolved against: the active scope's locals
/// (if any) shadow the shared globals, which shadow declared object names.
pub(crate) struct Env<'a> {
    pub scope: Option<&'a Scope>,
    pub globals: &'a HashMap<String, Value>,
    pub objects: &'a HashMap<String, ObjectId>,
}

impl Env<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(scope) = self.scope
            && let Some(v) = scope.local(name)
        {
            return Some(v);
        }
        if let Some(v) = self.globals.get(name) {
            return Some(v.clone());
        }
        self.objects.get(name).map(|id| Value::Object(*id))
    }
}

/// Resolves a token to a concrete value. Failure is a soft error message; the
/// caller attaches the instruction's line number.
pub(crate) fn resolve(token: &Token, env: &Env<'_>) -> Result<Value, String> {
    match token {
        Token::Constant(v) => Ok(v.clone()),
        Token::Name(name) => env
            .lookup(name)
            .ok_or_else(|| format!("unknown name '{name}'")),
        Token::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(resolve(item, env)?);
            }
            Ok(Value::Array(out))
        }
        Token::Chain(segs) => resolve_chain(segs, env),
        Token::FuncCall { name, args } => call_builtin(name, args, env),
        Token::Indexer(_) => Err("indexer outside of a chain".to_string()),
        Token::Opcode(op) => Err(format!("unexpected keyword '{}'", op.keyword())),
    }
}

/// Chain walk: the head resolves as a name, then segments are dereferenced
/// eagerly until the intermediate value is an object reference; from there the
/// remaining segments are captured as a Binding, because the host object graph
/// does not exist until load time.
fn resolve_chain(segs: &[Token], env: &Env<'_>) -> Result<Value, String> {
    let (head, rest) = segs.split_first().ok_or("empty chain")?;
    let head_name = head
        .raw_name()
        .ok_or("chain must start with a name")?;
    let mut current = env
        .lookup(head_name)
        .ok_or_else(|| format!("unknown name '{head_name}'"))?;

    for (i, seg) in rest.iter().enumerate() {
        if let Value::Object(object) = current {
            let path = capture_path(&rest[i..], env)?;
            return Ok(Value::Binding(Binding::new(object, path)));
        }
        current = match seg {
            Token::Indexer(inner) => {
                let idx = resolve_int(inner, env)?;
                let Value::Array(items) = &current else {
                    return Err(format!("cannot index into {}", current.kind_name()));
                };
                usize::try_from(idx)
                    .ok()
                    .and_then(|i| items.get(i))
                    .cloned()
                    .ok_or_else(|| format!("index {idx} out of bounds"))?
            }
            Token::Name(name) => {
                return Err(format!(
                    "cannot access '{name}' on {}",
                    current.kind_name()
                ));
            }
            other => return Err(format!("invalid chain segment {other:?}")),
        };
    }

    Ok(current)
}

/// Converts trailing chain segments into binding path segments. Indexer
/// expressions still resolve (so `pads[iter]` works); names are captured
/// verbatim and never dereferenced.
fn capture_path(segs: &[Token], env: &Env<'_>) -> Result<Vec<PathSeg>, String> {
    let mut path = Vec::with_capacity(segs.len());
    for seg in segs {
        match seg {
            Token::Name(name) => path.push(PathSeg::Name(name.clone())),
            Token::Indexer(inner) => path.push(PathSeg::Index(resolve_int(inner, env)?)),
            other => return Err(format!("invalid binding path segment {other:?}")),
        }
    }
    Ok(path)
}

fn call_builtin(name: &str, args: &[Token], env: &Env<'_>) -> Result<Value, String> {
    let mut vals = Vec::with_capacity(args.len());
    for a in args {
        let v = resolve(a, env)?;
        vals.push(
            v.as_f32()
                .ok_or_else(|| format!("'{name}' expects numeric arguments, got {}", v.kind_name()))?,
        );
    }
    let arity = |n: usize| -> Result<(), String> {
        if vals.len() == n {
            Ok(())
        } else {
            Err(format!("'{name}' expects {n} argument(s), got {}", vals.len()))
        }
    };
    let out = match name {
        "abs" => {
            arity(1)?;
            vals[0].abs()
        }
        "floor" => {
            arity(1)?;
            vals[0].floor()
        }
        "min" => {
            arity(2)?;
            vals[0].min(vals[1])
        }
        "max" => {
            arity(2)?;
            vals[0].max(vals[1])
        }
        "clamp" => {
            arity(3)?;
            vals[0].clamp(vals[1], vals[2])
        }
        "lerp" => {
            arity(3)?;
            vals[0] + (vals[1] - vals[0]) * vals[2]
        }
        _ => return Err(format!("unknown function '{name}'")),
    };
    Ok(Value::Float(out))
}

pub(crate) fn resolve_time(token: &Token, env: &Env<'_>) -> Result<Timestamp, String> {
    match resolve(token, env)? {
        Value::Time(t) => Ok(t),
        other => Err(format!("expected timestamp, got {}", other.kind_name())),
    }
}

pub(crate) fn resolve_int(token: &Token, env: &Env<'_>) -> Result<i32, String> {
    let v = resolve(token, env)?;
    v.as_int()
        .ok_or_else(|| format!("expected integer, got {}", v.kind_name()))
}

pub(crate) fn resolve_binding(token: &Token, env: &Env<'_>) -> Result<Binding, String> {
    match resolve(token, env)? {
        Value::Binding(b) => Ok(b),
        Value::Object(id) => Ok(Binding::new(id, Vec::new())),
        other => Err(format!("expected binding, got {}", other.kind_name())),
    }
}

pub(crate) fn resolve_ease(token: &Token, env: &Env<'_>) -> Result<Ease, String> {
    match resolve(token, env)? {
        Value::Ease(e) => Ok(e),
        other => Err(format!("expected interpolation kind, got {}", other.kind_name())),
    }
}

/// Declarations need the literal identifier, never its value.
pub(crate) fn raw_name(token: &Token) -> Result<&str, String> {
    token
        .raw_name()
        .ok_or_else(|| format!("expected a literal name, found {token:?}"))
}
