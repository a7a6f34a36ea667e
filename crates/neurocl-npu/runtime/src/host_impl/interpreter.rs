// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Kernel body interpreter
//!
//! Element state mirrors the rendered device code: inputs and outputs are
//! loaded into scalars, the fragment runs, outputs are stored back. Locals
//! start at zero for every element.

use ahash::AHashMap;

use super::device::{HostBuffer, HostData};
use crate::error::{Result, RuntimeError};
use crate::kernel::{
    chunk, Cond, DirectBody, ElementwiseBody, Expr, KernelBody, KernelSource, LaunchGeometry,
    ProbeBody, Regime, Stmt, VarRole, META_BINDING,
};

type Fault<T> = std::result::Result<T, String>;

/// Execute one launch of `source` over `args`
pub(crate) fn execute(
    source: &KernelSource,
    args: &[HostBuffer],
    geometry: &LaunchGeometry,
) -> Result<()> {
    // Bindings are distinct allocations (checked at bind time), so taking
    // every write lock up front cannot deadlock.
    let mut guards: Vec<_> = args.iter().map(|b| b.data.write()).collect();
    let mut memory = Memory {
        slots: guards.iter_mut().map(|g| &mut **g).collect(),
    };
    let outcome = match &source.body {
        KernelBody::Elementwise(body) => run_elementwise(body, &mut memory, geometry),
        KernelBody::Probe(body) => run_probe(body, &mut memory, geometry),
        KernelBody::Direct(body) => run_direct(body, &mut memory, geometry),
    };
    outcome.map_err(|reason| RuntimeError::Launch {
        kernel: source.name.clone(),
        reason,
    })
}

struct Memory<'a> {
    slots: Vec<&'a mut HostData>,
}

impl Memory<'_> {
    fn slot(&self, slot: usize) -> Fault<&HostData> {
        self.slots
            .get(slot)
            .map(|d| &**d)
            .ok_or_else(|| format!("binding {} is not bound", slot))
    }

    fn slot_mut(&mut self, slot: usize) -> Fault<&mut HostData> {
        self.slots
            .get_mut(slot)
            .map(|d| &mut **d)
            .ok_or_else(|| format!("binding {} is not bound", slot))
    }

    fn f32_at(&self, slot: usize, index: usize) -> Fault<f32> {
        match self.slot(slot)? {
            HostData::F32(v) => v
                .get(index)
                .copied()
                .ok_or_else(|| out_of_bounds(slot, index, v.len())),
            HostData::I32(_) => Err(format!("binding {} is not a float buffer", slot)),
        }
    }

    fn set_f32(&mut self, slot: usize, index: usize, value: f32) -> Fault<()> {
        match self.slot_mut(slot)? {
            HostData::F32(v) => {
                let len = v.len();
                let cell = v.get_mut(index).ok_or_else(|| out_of_bounds(slot, index, len))?;
                *cell = value;
                Ok(())
            }
            HostData::I32(_) => Err(format!("binding {} is not a float buffer", slot)),
        }
    }

    fn i32_at(&self, slot: usize, index: usize) -> Fault<i32> {
        match self.slot(slot)? {
            HostData::I32(v) => v
                .get(index)
                .copied()
                .ok_or_else(|| out_of_bounds(slot, index, v.len())),
            HostData::F32(_) => Err(format!("binding {} is not an integer buffer", slot)),
        }
    }

    fn set_i32(&mut self, slot: usize, index: usize, value: i32) -> Fault<()> {
        match self.slot_mut(slot)? {
            HostData::I32(v) => {
                let len = v.len();
                let cell = v.get_mut(index).ok_or_else(|| out_of_bounds(slot, index, len))?;
                *cell = value;
                Ok(())
            }
            HostData::F32(_) => Err(format!("binding {} is not an integer buffer", slot)),
        }
    }

    /// Non-negative entry of the metadata buffer
    fn meta(&self, index: usize) -> Fault<usize> {
        let value = self.i32_at(META_BINDING, index)?;
        usize::try_from(value).map_err(|_| format!("negative metadata entry {} at {}", value, index))
    }
}

fn out_of_bounds(slot: usize, index: usize, len: usize) -> String {
    format!(
        "binding {} index {} out of bounds (length {})",
        slot, index, len
    )
}

/// Named scalars visible to a fragment
struct Scope<'a> {
    values: AHashMap<&'a str, f32>,
}

impl<'a> Scope<'a> {
    fn new() -> Self {
        Self {
            values: AHashMap::new(),
        }
    }

    fn set(&mut self, name: &'a str, value: f32) {
        self.values.insert(name, value);
    }

    fn get(&self, name: &str) -> Fault<f32> {
        self.values
            .get(name)
            .copied()
            .ok_or_else(|| format!("undeclared name '{}'", name))
    }
}

/// Indexed vector access for direct-function fragments
trait VectorIo {
    fn load(&self, name: &str, index: usize) -> Fault<f32>;
    fn store(&mut self, name: &str, index: usize, value: f32) -> Fault<()>;
}

struct NoVectors;

impl VectorIo for NoVectors {
    fn load(&self, name: &str, _index: usize) -> Fault<f32> {
        Err(format!("indexed load from '{}' outside a direct kernel", name))
    }

    fn store(&mut self, name: &str, _index: usize, _value: f32) -> Fault<()> {
        Err(format!("indexed store to '{}' outside a direct kernel", name))
    }
}

fn to_index(value: f32) -> Fault<usize> {
    if value.is_finite() && value >= 0.0 {
        Ok(value as usize)
    } else {
        Err(format!("invalid vector index {}", value))
    }
}

fn eval(expr: &Expr, scope: &Scope<'_>, io: &dyn VectorIo) -> Fault<f32> {
    Ok(match expr {
        Expr::Const(v) => *v,
        Expr::Var(name) => scope.get(name)?,
        Expr::Neg(a) => -eval(a, scope, io)?,
        Expr::Binary(op, a, b) => op.apply(eval(a, scope, io)?, eval(b, scope, io)?),
        Expr::Call(builtin, args) => {
            let values = args
                .iter()
                .map(|a| eval(a, scope, io))
                .collect::<Fault<Vec<f32>>>()?;
            builtin.apply(&values)
        }
        Expr::Select(cond, a, b) => {
            if test(cond, scope, io)? {
                eval(a, scope, io)?
            } else {
                eval(b, scope, io)?
            }
        }
        Expr::Index(name, index) => io.load(name, to_index(eval(index, scope, io)?)?)?,
    })
}

fn test(cond: &Cond, scope: &Scope<'_>, io: &dyn VectorIo) -> Fault<bool> {
    Ok(match cond {
        Cond::Compare(op, a, b) => op.apply(eval(a, scope, io)?, eval(b, scope, io)?),
        Cond::And(a, b) => test(a, scope, io)? && test(b, scope, io)?,
        Cond::Or(a, b) => test(a, scope, io)? || test(b, scope, io)?,
        Cond::Not(a) => !test(a, scope, io)?,
    })
}

fn exec<'a>(stmts: &'a [Stmt], scope: &mut Scope<'a>, io: &mut dyn VectorIo) -> Fault<()> {
    for stmt in stmts {
        match stmt {
            Stmt::Assign(name, value) => {
                let v = eval(value, scope, &*io)?;
                scope.set(name, v);
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                if test(cond, scope, &*io)? {
                    exec(then, scope, io)?;
                } else {
                    exec(otherwise, scope, io)?;
                }
            }
            Stmt::Store {
                target,
                index,
                value,
            } => {
                let i = to_index(eval(index, scope, &*io)?)?;
                let v = eval(value, scope, &*io)?;
                io.store(target, i, v)?;
            }
        }
    }
    Ok(())
}

/// Per-row state of one variable
#[derive(Clone, Copy)]
struct VarRow {
    start: usize,
    /// Parameter with one value per element
    vector: bool,
    /// Parameter value held for the whole row (scalar parameters)
    scalar: f32,
}

fn load_row(body: &ElementwiseBody, memory: &Memory<'_>, row: usize) -> Fault<Vec<VarRow>> {
    body.vars
        .iter()
        .map(|var| {
            let start = memory.meta(var.starts + row)?;
            let vector = match var.shape0s {
                Some(offset) => memory.meta(offset + row)? > 1,
                None => true,
            };
            let scalar = if var.role == VarRole::Param && !vector {
                memory.f32_at(var.binding, start)?
            } else {
                0.0
            };
            Ok(VarRow {
                start,
                vector,
                scalar,
            })
        })
        .collect()
}

fn run_element<'a>(
    body: &'a ElementwiseBody,
    memory: &mut Memory<'_>,
    scope: &mut Scope<'a>,
    rows: &[VarRow],
    m: usize,
) -> Fault<()> {
    for local in &body.fragment.locals {
        scope.set(local, 0.0);
    }
    for (var, row) in body.vars.iter().zip(rows) {
        let value = if var.role == VarRole::Param && !row.vector {
            row.scalar
        } else {
            memory.f32_at(var.binding, row.start + m)?
        };
        scope.set(&var.name, value);
    }
    exec(&body.fragment.body, scope, &mut NoVectors)?;
    for (var, row) in body.vars.iter().zip(rows) {
        if var.role == VarRole::Output {
            memory.set_f32(var.binding, row.start + m, scope.get(&var.name)?)?;
        }
    }
    Ok(())
}

fn run_elementwise(
    body: &ElementwiseBody,
    memory: &mut Memory<'_>,
    geometry: &LaunchGeometry,
) -> Fault<()> {
    let lengths = (0..body.n_rows)
        .map(|n| memory.meta(body.lengths + n))
        .collect::<Fault<Vec<usize>>>()?;
    let mut scope = Scope::new();
    for (name, value) in &body.constants {
        scope.set(name, *value);
    }

    match body.regime {
        Regime::Block => {
            // Work-item (m, n); items with m >= len(n) idle.
            for n in 0..geometry.global[1].min(body.n_rows) {
                let active = geometry.global[0].min(lengths[n]);
                if active == 0 {
                    continue;
                }
                let rows = load_row(body, memory, n)?;
                for m in 0..active {
                    run_element(body, memory, &mut scope, &rows, m)?;
                }
            }
        }
        Regime::Flattened { n_elements } => {
            for gid in 0..geometry.global[0].min(body.n_items) {
                let mut rows: Vec<VarRow> = Vec::new();
                for step in chunk(&lengths, gid, n_elements) {
                    if step.entered_row {
                        rows = load_row(body, memory, step.cursor.row)?;
                    }
                    run_element(body, memory, &mut scope, &rows, step.cursor.offset)?;
                }
            }
        }
    }
    Ok(())
}

fn run_probe(body: &ProbeBody, memory: &mut Memory<'_>, geometry: &LaunchGeometry) -> Fault<()> {
    let width = body.local_width;
    for n in 0..geometry.global[1].min(body.n_rows) {
        let countdown = memory.i32_at(body.countdowns, n)?;
        let n_dims = memory.meta(body.x_shape0s + n)?;

        // Phase 1: every work-item of the row copies a strided part.
        if countdown <= 0 {
            let bufpos = usize::try_from(memory.i32_at(body.bufpositions, n)?)
                .map_err(|_| format!("negative buffer position on probe row {}", n))?;
            let x_start = memory.meta(body.x_starts + n)?;
            let y_start = memory.meta(body.y_starts + n)?;
            let y_len = memory.meta(body.y_lengths + n)?;
            if (bufpos + 1) * n_dims > y_len {
                return Err(format!(
                    "probe row {} ring buffer overflow at position {}",
                    n, bufpos
                ));
            }
            for lid in 0..width {
                let mut ii = lid;
                while ii < n_dims {
                    let value = memory.f32_at(body.x, x_start + ii)?;
                    memory.set_f32(body.y, y_start + bufpos * n_dims + ii, value)?;
                    ii += width;
                }
            }
        }

        // Barrier, then work-item 0 updates the counters.
        if countdown <= 0 {
            let period = memory.i32_at(body.periods, n)?;
            let bufpos = memory.i32_at(body.bufpositions, n)?;
            memory.set_i32(body.countdowns, n, period - 1)?;
            memory.set_i32(body.bufpositions, n, bufpos + 1)?;
        } else {
            memory.set_i32(body.countdowns, n, countdown - 1)?;
        }
    }
    Ok(())
}

struct DirectIo<'m, 'a> {
    memory: &'m mut Memory<'a>,
    body: &'m DirectBody,
    x_start: usize,
    x_len: usize,
    y_start: usize,
    y_len: usize,
}

impl VectorIo for DirectIo<'_, '_> {
    fn load(&self, name: &str, index: usize) -> Fault<f32> {
        if name != self.body.arg_name {
            return Err(format!("unknown input vector '{}'", name));
        }
        if index >= self.x_len {
            return Err(format!(
                "'{}[{}]' out of range (length {})",
                name, index, self.x_len
            ));
        }
        self.memory.f32_at(self.body.x, self.x_start + index)
    }

    fn store(&mut self, name: &str, index: usize, value: f32) -> Fault<()> {
        if index >= self.y_len {
            return Err(format!(
                "'{}[{}]' out of range (length {})",
                name, index, self.y_len
            ));
        }
        self.memory.set_f32(self.body.y, self.y_start + index, value)
    }
}

fn run_direct(body: &DirectBody, memory: &mut Memory<'_>, geometry: &LaunchGeometry) -> Fault<()> {
    let mut scope = Scope::new();
    for n in 0..geometry.global[0].min(body.n_rows) {
        for local in &body.fragment.locals {
            scope.set(local, 0.0);
        }
        let mut io = DirectIo {
            x_start: memory.meta(body.x_starts + n)?,
            x_len: memory.meta(body.x_lengths + n)?,
            y_start: memory.meta(body.y_starts + n)?,
            y_len: memory.meta(body.y_lengths + n)?,
            memory: &mut *memory,
            body,
        };
        exec(&body.fragment.body, &mut scope, &mut io)?;
    }
    Ok(())
}
