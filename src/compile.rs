use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::Context as _;

use crate::binding::{Binding, ObjectDecl, ObjectId, ObjectKind};
use crate::ease::Ease;
use crate::error::{CadenzaError, CompileFailure};
use crate::lexer::{Instruction, parse_script};
use crate::resolve::{self, Env};
use crate::scope::{Procedure, Scope};
use crate::storyboard::{KeyframeBuilder, Storyboard, TimelineBuilder, TimelineKind};
use crate::timestamp::Timestamp;
use crate::token::Opcode;
use crate::value::Value;

/// Shared state threaded through both passes. Pass 1 fills declarations and
/// procedures; pass 2 unrolls Main and accumulates keyframes.
#[derive(Default)]
struct CompileContext {
    objects: Vec<ObjectDecl>,
    object_ids: HashMap<String, ObjectId>,
    globals: HashMap<String, Value>,
    procedures: HashMap<String, Procedure>,
    builders: Vec<TimelineBuilder>,
    /// Structural binding identity maps every call site writing the same
    /// destination into one timeline. Builder order stays first-touch.
    builder_index: HashMap<(Binding, TimelineKind), usize>,
    /// Program-wide declaration counter, stamped on every emitted key.
    key_order: u32,
}

impl CompileContext {
    fn declare(&mut self, line: usize, name: &str, kind: ObjectKind) -> Result<ObjectId, CadenzaError> {
        if self.object_ids.contains_key(name) || self.globals.contains_key(name) {
            return Err(CadenzaError::compile(
                line,
                format!("name '{name}' is already declared"),
            ));
        }
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(ObjectDecl {
            name: name.to_string(),
            kind,
        });
        self.object_ids.insert(name.to_string(), id);
        Ok(id)
    }

    fn push_key(&mut self, binding: Binding, kind: TimelineKind, key: KeyframeBuilder) {
        let slot = (binding, kind);
        let idx = match self.builder_index.get(&slot) {
            Some(&i) => i,
            None => {
                let i = self.builders.len();
                self.builders.push(TimelineBuilder {
                    binding: slot.0.clone(),
                    kind,
                    keys: Vec::new(),
                });
                self.builder_index.insert(slot, i);
                i
            }
        };
        self.builders[idx].keys.push(key);
    }

    fn global_env(&self) -> Env<'_> {
        Env {
            scope: None,
            globals: &self.globals,
            objects: &self.object_ids,
        }
    }
}

/// Compiles script source into a storyboard. Lexical errors are collected
/// across the whole file; the first error past lexing is fatal.
#[tracing::instrument(skip_all)]
pub fn compile_script(src: &str) -> Result<Storyboard, CompileFailure> {
    let instructions = parse_script(src).map_err(CompileFailure::new)?;
    let mut ctx = CompileContext::default();
    pass_declarations(&instructions, &mut ctx).map_err(|e| CompileFailure::new(vec![e]))?;

    // Globals are exported as authored, before procedure bodies mutate them.
    let out_params: BTreeMap<String, Value> = ctx
        .globals
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    pass_unroll(&instructions, &mut ctx).map_err(|e| CompileFailure::new(vec![e]))?;
    tracing::debug!(
        objects = ctx.objects.len(),
        timelines = ctx.builders.len(),
        keys = ctx.key_order,
        "compiled storyboard"
    );
    Ok(Storyboard::new(ctx.objects, ctx.builders, out_params))
}

pub fn compile_file(path: &Path) -> Result<Storyboard, CompileFailure> {
    let src = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))
        .map_err(|e| CompileFailure::new(vec![e.into()]))?;
    compile_script(&src)
}

/// Pass 1: walk every instruction once. The global prefix executes eagerly
/// (declarations, setg/seta); each `proc` registers a body range. Opcodes in
/// the wrong context are hard errors.
fn pass_declarations(instructions: &[Instruction], ctx: &mut CompileContext) -> Result<(), CadenzaError> {
    let mut in_procedure = false;
    for (idx, inst) in instructions.iter().enumerate() {
        let line = inst.line;
        if inst.opcode == Opcode::Proc {
            register_procedure(inst, idx, ctx)?;
            in_procedure = true;
            continue;
        }
        if in_procedure {
            if inst.opcode.is_declaration() {
                return Err(CadenzaError::compile(
                    line,
                    format!(
                        "'{}' declarations must precede the first procedure",
                        inst.opcode.keyword()
                    ),
                ));
            }
            continue; // body instructions run in pass 2
        }
        if inst.opcode.is_procedure_only() {
            return Err(CadenzaError::compile(
                line,
                format!(
                    "'{}' may only appear inside a procedure body",
                    inst.opcode.keyword()
                ),
            ));
        }
        apply_global(inst, ctx)?;
    }
    Ok(())
}

fn register_procedure(inst: &Instruction, idx: usize, ctx: &mut CompileContext) -> Result<(), CadenzaError> {
    let line = inst.line;
    expect_args(inst, 1, usize::MAX)?;
    let name = resolve::raw_name(&inst.args[0]).map_err(|m| CadenzaError::compile(line, m))?;
    let mut params = Vec::with_capacity(inst.args.len() - 1);
    for t in &inst.args[1..] {
        let p = resolve::raw_name(t).map_err(|m| CadenzaError::compile(line, m))?;
        if params.iter().any(|q| q == p) {
            return Err(CadenzaError::compile(
                line,
                format!("duplicate parameter '{p}' in procedure '{name}'"),
            ));
        }
        params.push(p.to_string());
    }
    if ctx.procedures.contains_key(name) {
        return Err(CadenzaError::compile(
            line,
            format!("procedure '{name}' is already defined"),
        ));
    }
    ctx.procedures.insert(
        name.to_string(),
        Procedure {
            start_index: idx + 1,
            params,
        },
    );
    Ok(())
}

fn apply_global(inst: &Instruction, ctx: &mut CompileContext) -> Result<(), CadenzaError> {
    let line = inst.line;
    let soft = |m: String| CadenzaError::compile(line, m);
    match inst.opcode {
        Opcode::Object => {
            expect_args(inst, 2, 2)?;
            let name = resolve::raw_name(&inst.args[0]).map_err(soft)?.to_string();
            let scene = resolve::resolve(&inst.args[1], &ctx.global_env()).map_err(soft)?;
            let scene_name = expect_str(scene, "scene name", line)?;
            ctx.declare(line, &name, ObjectKind::External { scene_name })?;
        }
        Opcode::Bundle => {
            expect_args(inst, 2, 2)?;
            let name = resolve::raw_name(&inst.args[0]).map_err(soft)?.to_string();
            let source = resolve::resolve(&inst.args[1], &ctx.global_env()).map_err(soft)?;
            let source = expect_str(source, "bundle source", line)?;
            ctx.declare(line, &name, ObjectKind::Bundle { source })?;
        }
        Opcode::Load => {
            expect_args(inst, 3, 3)?;
            let name = resolve::raw_name(&inst.args[0]).map_err(soft)?.to_string();
            let bundle = resolve::resolve(&inst.args[1], &ctx.global_env()).map_err(soft)?;
            let bundle = expect_object(bundle, "load", line)?;
            if !matches!(ctx.objects[bundle.0 as usize].kind, ObjectKind::Bundle { .. }) {
                return Err(CadenzaError::compile(line, "'load' expects a bundle"));
            }
            let path = resolve::resolve(&inst.args[2], &ctx.global_env()).map_err(soft)?;
            let path = expect_str(path, "asset path", line)?;
            ctx.declare(line, &name, ObjectKind::Asset { bundle, path })?;
        }
        Opcode::Inst => {
            expect_args(inst, 2, 2)?;
            let name = resolve::raw_name(&inst.args[0]).map_err(soft)?.to_string();
            let asset = resolve::resolve(&inst.args[1], &ctx.global_env()).map_err(soft)?;
            let asset = expect_object(asset, "inst", line)?;
            if !matches!(ctx.objects[asset.0 as usize].kind, ObjectKind::Asset { .. }) {
                return Err(CadenzaError::compile(line, "'inst' expects a loaded asset"));
            }
            ctx.declare(line, &name, ObjectKind::Instance { asset })?;
        }
        Opcode::Post => {
            expect_args(inst, 2, 2)?;
            let name = resolve::raw_name(&inst.args[0]).map_err(soft)?.to_string();
            let effect = resolve::resolve(&inst.args[1], &ctx.global_env()).map_err(soft)?;
            let effect = expect_str(effect, "effect name", line)?;
            ctx.declare(line, &name, ObjectKind::PostProcess { effect })?;
        }
        Opcode::SetG => {
            expect_args(inst, 2, 2)?;
            let name = resolve::raw_name(&inst.args[0]).map_err(soft)?.to_string();
            if ctx.object_ids.contains_key(&name) {
                return Err(CadenzaError::compile(
                    line,
                    format!("'{name}' already names a declared reference"),
                ));
            }
            let value = resolve::resolve(&inst.args[1], &ctx.global_env()).map_err(soft)?;
            ctx.globals.insert(name, value);
        }
        Opcode::SetA => {
            let env = ctx.global_env();
            let (name, index, value) = resolve_seta(inst, &env)?;
            store_array_element(ctx, line, &name, index, value)?;
        }
        // Proc and procedure-only opcodes are handled by the caller.
        _ => unreachable!("pass 1 context filtering"),
    }
    Ok(())
}

/// Pass 2: unroll Main with an explicit instruction pointer and scope chain.
/// Calls push a child scope, loops re-run the body with `iter` advanced, and
/// end-of-body pops back to the recorded return index.
fn pass_unroll(instructions: &[Instruction], ctx: &mut CompileContext) -> Result<(), CadenzaError> {
    let main = ctx
        .procedures
        .get("Main")
        .cloned()
        .ok_or_else(|| CadenzaError::compile(1, "script defines no procedure named 'Main'"))?;

    let mut scope = Scope::root(main.start_index);
    let mut ip = main.start_index;
    loop {
        if ip >= instructions.len() || instructions[ip].opcode == Opcode::Proc {
            if scope.next_iteration() {
                ip = scope.start_index;
                continue;
            }
            let resume = scope.return_index;
            match scope.into_parent() {
                Some(parent) => {
                    scope = parent;
                    ip = resume;
                    continue;
                }
                None => break,
            }
        }

        let inst = &instructions[ip];
        let line = inst.line;
        let soft = |m: String| CadenzaError::compile(line, m);
        match inst.opcode {
            Opcode::Call | Opcode::Loop => {
                enter_call(inst, ctx, &mut scope, &mut ip)?;
                continue;
            }
            Opcode::Key => {
                expect_args(inst, 3, 4)?;
                let env = scoped_env(&scope, ctx);
                let time = resolve::resolve_time(&inst.args[0], &env).map_err(soft)?;
                let binding = resolve::resolve_binding(&inst.args[1], &env).map_err(soft)?;
                let value = resolve::resolve(&inst.args[2], &env).map_err(soft)?;
                let ease = match inst.args.get(3) {
                    Some(t) => resolve::resolve_ease(t, &env).map_err(soft)?,
                    None => Ease::Linear,
                };
                let time = scope.global_time(time);
                let order = ctx.key_order;
                ctx.key_order += 1;
                ctx.push_key(
                    binding,
                    TimelineKind::Curve,
                    KeyframeBuilder {
                        time,
                        value,
                        ease,
                        order,
                    },
                );
            }
            Opcode::Event => {
                expect_args(inst, 2, 3)?;
                let env = scoped_env(&scope, ctx);
                let time = resolve::resolve_time(&inst.args[0], &env).map_err(soft)?;
                let binding = resolve::resolve_binding(&inst.args[1], &env).map_err(soft)?;
                let value = match inst.args.get(2) {
                    Some(t) => resolve::resolve(t, &env).map_err(soft)?,
                    None => Value::Null,
                };
                let time = scope.global_time(time);
                let order = ctx.key_order;
                ctx.key_order += 1;
                ctx.push_key(
                    binding,
                    TimelineKind::Event,
                    KeyframeBuilder {
                        time,
                        value,
                        ease: Ease::Fixed,
                        order,
                    },
                );
            }
            Opcode::Set => {
                expect_args(inst, 2, 2)?;
                let name = resolve::raw_name(&inst.args[0]).map_err(soft)?.to_string();
                if name == "iter" || name == "count" {
                    return Err(CadenzaError::compile(
                        line,
                        format!("'{name}' is a reserved iteration variable"),
                    ));
                }
                let value = resolve::resolve(&inst.args[1], &scoped_env(&scope, ctx)).map_err(soft)?;
                scope.set_local(name, value);
            }
            Opcode::SetG => {
                expect_args(inst, 2, 2)?;
                let name = resolve::raw_name(&inst.args[0]).map_err(soft)?.to_string();
                if ctx.object_ids.contains_key(&name) {
                    return Err(CadenzaError::compile(
                        line,
                        format!("'{name}' already names a declared reference"),
                    ));
                }
                let value = resolve::resolve(&inst.args[1], &scoped_env(&scope, ctx)).map_err(soft)?;
                ctx.globals.insert(name, value);
            }
            Opcode::SetA => {
                let env = scoped_env(&scope, ctx);
                let (name, index, value) = resolve_seta(inst, &env)?;
                store_array_element(ctx, line, &name, index, value)?;
            }
            other => {
                // Declarations inside bodies are rejected in pass 1 already.
                return Err(CadenzaError::compile(
                    line,
                    format!("'{}' cannot appear inside a procedure body", other.keyword()),
                ));
            }
        }
        ip += 1;
    }
    Ok(())
}

/// Activates a procedure for `call` and `loop`. Arguments are resolved in the
/// caller's scope before the child is pushed.
fn enter_call(
    inst: &Instruction,
    ctx: &mut CompileContext,
    scope: &mut Scope,
    ip: &mut usize,
) -> Result<(), CadenzaError> {
    let line = inst.line;
    let soft = |m: String| CadenzaError::compile(line, m);
    let looped = inst.opcode == Opcode::Loop;
    let fixed_args = if looped { 4 } else { 2 };
    expect_args(inst, fixed_args, usize::MAX)?;

    let env = scoped_env(scope, ctx);
    let time = resolve::resolve_time(&inst.args[0], &env).map_err(soft)?;
    let name = resolve::raw_name(&inst.args[1]).map_err(soft)?;
    let (count, every) = if looped {
        let count = resolve::resolve_int(&inst.args[2], &env).map_err(soft)?;
        if count < 1 {
            return Err(CadenzaError::compile(
                line,
                format!("loop count must be positive, got {count}"),
            ));
        }
        (count as u32, resolve::resolve_time(&inst.args[3], &env).map_err(soft)?)
    } else {
        (1, Timestamp::ZERO)
    };

    let proc = ctx
        .procedures
        .get(name)
        .cloned()
        .ok_or_else(|| CadenzaError::compile(line, format!("unknown procedure '{name}'")))?;
    let actual_tokens = &inst.args[fixed_args..];
    if actual_tokens.len() != proc.params.len() {
        return Err(CadenzaError::compile(
            line,
            format!(
                "procedure '{name}' takes {} argument(s), got {}",
                proc.params.len(),
                actual_tokens.len()
            ),
        ));
    }
    if scope.would_recurse(proc.start_index) {
        return Err(CadenzaError::compile(
            line,
            format!("recursive call to '{name}'"),
        ));
    }
    let mut actuals = Vec::with_capacity(actual_tokens.len());
    for t in actual_tokens {
        actuals.push(resolve::resolve(t, &env).map_err(soft)?);
    }
    let start = scope.global_time(time);

    let parent = std::mem::replace(scope, Scope::root(0));
    let mut child = Scope::child(parent, proc.start_index, *ip + 1, count, start, every);
    for (param, value) in proc.params.iter().zip(actuals) {
        child.set_local(param, value);
    }
    *scope = child;
    *ip = proc.start_index;
    Ok(())
}

fn scoped_env<'a>(scope: &'a Scope, ctx: &'a CompileContext) -> Env<'a> {
    Env {
        scope: Some(scope),
        globals: &ctx.globals,
        objects: &ctx.object_ids,
    }
}

fn resolve_seta(inst: &Instruction, env: &Env<'_>) -> Result<(String, i32, Value), CadenzaError> {
    let line = inst.line;
    let soft = |m: String| CadenzaError::compile(line, m);
    expect_args(inst, 3, 3)?;
    let name = resolve::raw_name(&inst.args[0]).map_err(soft)?.to_string();
    let index = resolve::resolve_int(&inst.args[1], env).map_err(soft)?;
    let value = resolve::resolve(&inst.args[2], env).map_err(soft)?;
    Ok((name, index, value))
}

fn store_array_element(
    ctx: &mut CompileContext,
    line: usize,
    name: &str,
    index: i32,
    value: Value,
) -> Result<(), CadenzaError> {
    let Some(Value::Array(items)) = ctx.globals.get_mut(name) else {
        return Err(CadenzaError::compile(
            line,
            format!("'{name}' is not a global array"),
        ));
    };
    let slot = usize::try_from(index)
        .ok()
        .and_then(|i| items.get_mut(i))
        .ok_or_else(|| {
            CadenzaError::compile(line, format!("index {index} out of bounds for '{name}'"))
        })?;
    *slot = value;
    Ok(())
}

fn expect_args(inst: &Instruction, min: usize, max: usize) -> Result<(), CadenzaError> {
    let n = inst.args.len();
    if n >= min && n <= max {
        return Ok(());
    }
    let want = if min == max {
        format!("{min}")
    } else if max == usize::MAX {
        format!("at least {min}")
    } else {
        format!("{min} to {max}")
    };
    Err(CadenzaError::compile(
        inst.line,
        format!(
            "'{}' expects {want} argument(s), got {n}",
            inst.opcode.keyword()
        ),
    ))
}

fn expect_str(v: Value, what: &str, line: usize) -> Result<String, CadenzaError> {
    match v {
        Value::Str(s) => Ok(s),
        other => Err(CadenzaError::compile(
            line,
            format!("{what} must be a string, got {}", other.kind_name()),
        )),
    }
}

fn expect_object(v: Value, op: &str, line: usize) -> Result<ObjectId, CadenzaError> {
    match v {
        Value::Object(id) => Ok(id),
        other => Err(CadenzaError::compile(
            line,
            format!("'{op}' expects a declared reference, got {}", other.kind_name()),
        )),
    }
}
