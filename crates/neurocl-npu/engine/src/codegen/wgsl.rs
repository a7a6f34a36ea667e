// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! WGSL rendering of kernel bodies
//!
//! Naming inside generated code: `k_meta` is the metadata buffer, `k_bufN`
//! the buffer at binding N, `v_<name>` a fragment scalar, `s_<name>` a row
//! start offset, `f_<name>` a parameter's is-vector flag.

use neurocl_npu_runtime::kernel::{
    Access, BinaryOp, Builtin, BufferDecl, Cond, DirectBody, ElementwiseBody, Expr, ProbeBody,
    Regime, Stmt, VarRole, META_BINDING,
};

const INDENT: &str = "    ";

/// Identifier of the buffer at a binding slot
pub fn buffer_ident(slot: usize) -> String {
    if slot == META_BINDING {
        "k_meta".to_string()
    } else {
        format!("k_buf{}", slot)
    }
}

/// Identifier of a fragment scalar
pub fn var_ident(name: &str) -> String {
    format!("v_{}", name)
}

/// WGSL literal for a finite f32
pub fn float_literal(value: f32) -> String {
    if value.is_sign_negative() && value != 0.0 {
        format!("(-{:?}f)", -value)
    } else {
        format!("{:?}f", value.abs())
    }
}

/// Source text under construction
struct Writer {
    text: String,
    depth: usize,
}

impl Writer {
    fn new() -> Self {
        Self {
            text: String::new(),
            depth: 0,
        }
    }

    fn line(&mut self, line: &str) {
        for _ in 0..self.depth {
            self.text.push_str(INDENT);
        }
        self.text.push_str(line);
        self.text.push('\n');
    }

    fn open(&mut self, line: &str) {
        self.line(line);
        self.depth += 1;
    }

    fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line("}");
    }

    fn blank(&mut self) {
        self.text.push('\n');
    }

    fn finish(self) -> String {
        self.text
    }
}

fn header(w: &mut Writer, name: &str, summary: &str, bindings: &[BufferDecl]) {
    w.line(&format!("// neurocl kernel '{}': {}", name, summary));
    for (slot, decl) in bindings.iter().enumerate() {
        let access = match decl.access {
            Access::Read => "read",
            Access::ReadWrite => "read_write",
        };
        w.line(&format!(
            "@group(0) @binding({}) var<storage, {}> {}: array<{}>; // {}",
            slot,
            access,
            buffer_ident(slot),
            decl.scalar.wgsl_name(),
            decl.name
        ));
    }
    w.blank();
}

/// How indexed vector accesses render (direct kernels only)
struct VectorCtx<'a> {
    arg_name: &'a str,
    x: String,
    y: String,
}

fn expr(e: &Expr, ctx: Option<&VectorCtx<'_>>) -> String {
    match e {
        Expr::Const(v) => float_literal(*v),
        Expr::Var(name) => var_ident(name),
        Expr::Neg(a) => format!("(-{})", expr(a, ctx)),
        Expr::Binary(op, a, b) => {
            let symbol = match op {
                BinaryOp::Add => "+",
                BinaryOp::Sub => "-",
                BinaryOp::Mul => "*",
                BinaryOp::Div => "/",
            };
            format!("({} {} {})", expr(a, ctx), symbol, expr(b, ctx))
        }
        Expr::Call(builtin, args) => {
            let args: Vec<String> = args.iter().map(|a| expr(a, ctx)).collect();
            match builtin {
                Builtin::Log1p => format!("log(1.0f + {})", args.join(", ")),
                _ => format!("{}({})", builtin.name(), args.join(", ")),
            }
        }
        Expr::Select(c, a, b) => format!(
            "select({}, {}, {})",
            expr(b, ctx),
            expr(a, ctx),
            cond(c, ctx)
        ),
        Expr::Index(name, index) => match ctx {
            Some(v) if v.arg_name == name.as_str() => {
                format!("{}[s_x + i32({})]", v.x, expr(index, ctx))
            }
            // Rejected by validation before rendering matters.
            _ => format!("0.0f /* unknown vector {} */", name),
        },
    }
}

fn cond(c: &Cond, ctx: Option<&VectorCtx<'_>>) -> String {
    match c {
        Cond::Compare(op, a, b) => format!("({} {} {})", expr(a, ctx), op.symbol(), expr(b, ctx)),
        Cond::And(a, b) => format!("({} && {})", cond(a, ctx), cond(b, ctx)),
        Cond::Or(a, b) => format!("({} || {})", cond(a, ctx), cond(b, ctx)),
        Cond::Not(a) => format!("(!{})", cond(a, ctx)),
    }
}

fn stmts(w: &mut Writer, body: &[Stmt], ctx: Option<&VectorCtx<'_>>) {
    for s in body {
        match s {
            Stmt::Assign(name, value) => {
                w.line(&format!("{} = {};", var_ident(name), expr(value, ctx)));
            }
            Stmt::If {
                cond: c,
                then,
                otherwise,
            } => {
                w.open(&format!("if {} {{", cond(c, ctx)));
                stmts(w, then, ctx);
                if otherwise.is_empty() {
                    w.close();
                } else {
                    w.depth -= 1;
                    w.open("} else {");
                    stmts(w, otherwise, ctx);
                    w.close();
                }
            }
            Stmt::Store {
                index, value, ..
            } => {
                let y = ctx.map_or_else(|| "k_invalid".to_string(), |v| v.y.clone());
                w.line(&format!(
                    "{}[s_y + i32({})] = {};",
                    y,
                    expr(index, ctx),
                    expr(value, ctx)
                ));
            }
        }
    }
}

fn meta(offset: usize, row: &str) -> String {
    format!("k_meta[{} + {}]", offset, row)
}

/// Render an elementwise kernel in either regime
pub fn render_elementwise(
    name: &str,
    body: &ElementwiseBody,
    bindings: &[BufferDecl],
    local: [usize; 2],
) -> String {
    let mut w = Writer::new();
    let summary = match body.regime {
        Regime::Block => format!("block regime, {} rows", body.n_rows),
        Regime::Flattened { n_elements } => format!(
            "flattened regime, {} rows, {} elements per work-item",
            body.n_rows, n_elements
        ),
    };
    header(&mut w, name, &summary, bindings);
    w.line(&format!(
        "@compute @workgroup_size({}, {}, 1)",
        local[0].max(1),
        local[1].max(1)
    ));
    w.open("fn main(@builtin(global_invocation_id) gid: vec3<u32>) {");
    match body.regime {
        Regime::Block => block_main(&mut w, body),
        Regime::Flattened { n_elements } => flattened_main(&mut w, body, n_elements),
    }
    w.close();
    w.finish()
}

fn store_outputs(w: &mut Writer, body: &ElementwiseBody) {
    for var in body.vars.iter().filter(|v| v.role == VarRole::Output) {
        w.line(&format!(
            "{}[s_{} + k_m] = {};",
            buffer_ident(var.binding),
            var.name,
            var_ident(&var.name)
        ));
    }
}

fn block_main(w: &mut Writer, body: &ElementwiseBody) {
    w.line("let k_m = i32(gid.x);");
    w.line("let k_n = i32(gid.y);");
    w.open(&format!("if (k_n >= {}) {{", body.n_rows));
    w.line("return;");
    w.close();
    w.open(&format!("if (k_m >= {}) {{", meta(body.lengths, "k_n")));
    w.line("return;");
    w.close();

    for var in &body.vars {
        w.line(&format!("let s_{} = {};", var.name, meta(var.starts, "k_n")));
    }
    for var in &body.vars {
        let buf = buffer_ident(var.binding);
        match (var.role, var.shape0s) {
            (VarRole::Param, Some(shape0s)) => {
                w.line(&format!("var k_i_{} = s_{};", var.name, var.name));
                w.open(&format!("if ({} > 1) {{", meta(shape0s, "k_n")));
                w.line(&format!("k_i_{} = k_i_{} + k_m;", var.name, var.name));
                w.close();
                w.line(&format!(
                    "let {}: f32 = {}[k_i_{}];",
                    var_ident(&var.name),
                    buf,
                    var.name
                ));
            }
            _ => w.line(&format!(
                "var {}: f32 = {}[s_{} + k_m];",
                var_ident(&var.name),
                buf,
                var.name
            )),
        }
    }
    for (cname, value) in &body.constants {
        w.line(&format!("let {}: f32 = {};", var_ident(cname), float_literal(*value)));
    }
    for local in &body.fragment.locals {
        w.line(&format!("var {}: f32 = 0.0f;", var_ident(local)));
    }
    w.blank();
    stmts(w, &body.fragment.body, None);
    w.blank();
    store_outputs(w, body);
}

fn load_row_state(w: &mut Writer, body: &ElementwiseBody) {
    for var in &body.vars {
        w.line(&format!("s_{} = {};", var.name, meta(var.starts, "k_n")));
        if let (VarRole::Param, Some(shape0s)) = (var.role, var.shape0s) {
            w.line(&format!("f_{} = {} > 1;", var.name, meta(shape0s, "k_n")));
            w.line(&format!(
                "{} = {}[s_{}];",
                var_ident(&var.name),
                buffer_ident(var.binding),
                var.name
            ));
        }
    }
}

fn flattened_main(w: &mut Writer, body: &ElementwiseBody, n_elements: usize) {
    let n_rows = body.n_rows;
    let lengths = |row: &str| meta(body.lengths, row);

    w.line("let k_item = i32(gid.x);");
    w.open(&format!("if (k_item >= {}) {{", body.n_items));
    w.line("return;");
    w.close();

    // Seek the first element of this work-item's run.
    w.line(&format!("var k_m = k_item * {};", n_elements));
    w.line("var k_n = 0;");
    w.open("loop {");
    w.open(&format!("if (k_n >= {}) {{", n_rows));
    w.line("break;");
    w.close();
    w.line(&format!("let k_len = {};", lengths("k_n")));
    w.open("if (k_m < k_len) {");
    w.line("break;");
    w.close();
    w.line("k_m = k_m - k_len;");
    w.line("k_n = k_n + 1;");
    w.close();
    w.open(&format!("if (k_n >= {}) {{", n_rows));
    w.line("return;");
    w.close();
    w.line(&format!("var k_remaining = {} - k_m;", lengths("k_n")));

    for var in &body.vars {
        w.line(&format!("var s_{}: i32 = 0;", var.name));
        if var.role == VarRole::Param && var.shape0s.is_some() {
            w.line(&format!("var f_{}: bool = false;", var.name));
        }
        w.line(&format!("var {}: f32 = 0.0f;", var_ident(&var.name)));
    }
    for (cname, value) in &body.constants {
        w.line(&format!("let {}: f32 = {};", var_ident(cname), float_literal(*value)));
    }
    for local in &body.fragment.locals {
        w.line(&format!("var {}: f32 = 0.0f;", var_ident(local)));
    }
    load_row_state(w, body);
    w.blank();

    w.open(&format!(
        "for (var k_ii = 0; k_ii < {}; k_ii = k_ii + 1) {{",
        n_elements
    ));
    // Advance the row cursor: next element, or first element of the next
    // non-empty row.
    w.open("if (k_ii > 0) {");
    w.open("if (k_remaining > 1) {");
    w.line("k_m = k_m + 1;");
    w.line("k_remaining = k_remaining - 1;");
    w.depth -= 1;
    w.open("} else {");
    w.line("k_n = k_n + 1;");
    w.open("loop {");
    w.open(&format!("if (k_n >= {}) {{", n_rows));
    w.line("break;");
    w.close();
    w.open(&format!("if ({} > 0) {{", lengths("k_n")));
    w.line("break;");
    w.close();
    w.line("k_n = k_n + 1;");
    w.close();
    w.open(&format!("if (k_n >= {}) {{", n_rows));
    w.line("break;");
    w.close();
    w.line("k_m = 0;");
    w.line(&format!("k_remaining = {};", lengths("k_n")));
    load_row_state(w, body);
    w.close();
    w.close();

    for var in &body.vars {
        let buf = buffer_ident(var.binding);
        match (var.role, var.shape0s) {
            (VarRole::Param, Some(_)) => {
                w.open(&format!("if (f_{}) {{", var.name));
                w.line(&format!(
                    "{} = {}[s_{} + k_m];",
                    var_ident(&var.name),
                    buf,
                    var.name
                ));
                w.close();
            }
            _ => w.line(&format!(
                "{} = {}[s_{} + k_m];",
                var_ident(&var.name),
                buf,
                var.name
            )),
        }
    }
    for local in &body.fragment.locals {
        w.line(&format!("{} = 0.0f;", var_ident(local)));
    }
    stmts(w, &body.fragment.body, None);
    store_outputs(w, body);
    w.close();
}

/// Render the probe sampling kernel
///
/// One work-group per probe row. The barrier sits outside every
/// conditional so all work-items of the row reach it.
pub fn render_probe(name: &str, body: &ProbeBody, bindings: &[BufferDecl], local: [usize; 2]) -> String {
    let mut w = Writer::new();
    header(&mut w, name, &format!("probe sampler, {} rows", body.n_rows), bindings);
    let countdowns = buffer_ident(body.countdowns);
    let bufpositions = buffer_ident(body.bufpositions);
    let periods = buffer_ident(body.periods);

    w.line(&format!("@compute @workgroup_size({}, 1, 1)", local[0].max(1)));
    w.open("fn main(@builtin(local_invocation_id) lid: vec3<u32>, @builtin(workgroup_id) wid: vec3<u32>) {");
    w.line("let k_n = i32(wid.y);");
    w.line("let k_lid = i32(lid.x);");
    w.line(&format!("let k_countdown = {}[k_n];", countdowns));
    w.line(&format!("let k_bufpos = {}[k_n];", bufpositions));
    w.open("if (k_countdown <= 0) {");
    w.line(&format!("let k_dims = {};", meta(body.x_shape0s, "k_n")));
    w.line(&format!("let k_x = {};", meta(body.x_starts, "k_n")));
    w.line(&format!("let k_y = {} + k_bufpos * k_dims;", meta(body.y_starts, "k_n")));
    w.open(&format!(
        "for (var k_ii = k_lid; k_ii < k_dims; k_ii = k_ii + {}) {{",
        body.local_width
    ));
    w.line(&format!(
        "{}[k_y + k_ii] = {}[k_x + k_ii];",
        buffer_ident(body.y),
        buffer_ident(body.x)
    ));
    w.close();
    w.close();
    w.line("workgroupBarrier();");
    w.open("if (k_lid == 0) {");
    w.open("if (k_countdown <= 0) {");
    w.line(&format!("{}[k_n] = {}[k_n] - 1;", countdowns, periods));
    w.line(&format!("{}[k_n] = k_bufpos + 1;", bufpositions));
    w.depth -= 1;
    w.open("} else {");
    w.line(&format!("{}[k_n] = k_countdown - 1;", countdowns));
    w.close();
    w.close();
    w.close();
    w.finish()
}

/// Render a direct-function kernel (one work-item per row)
pub fn render_direct(name: &str, body: &DirectBody, bindings: &[BufferDecl], local: [usize; 2]) -> String {
    let mut w = Writer::new();
    header(&mut w, name, &format!("direct function, {} rows", body.n_rows), bindings);
    let ctx = VectorCtx {
        arg_name: &body.arg_name,
        x: buffer_ident(body.x),
        y: buffer_ident(body.y),
    };

    w.line(&format!("@compute @workgroup_size({}, 1, 1)", local[0].max(1)));
    w.open("fn main(@builtin(global_invocation_id) gid: vec3<u32>) {");
    w.line("let k_n = i32(gid.x);");
    w.open(&format!("if (k_n >= {}) {{", body.n_rows));
    w.line("return;");
    w.close();
    w.line(&format!("let s_x = {};", meta(body.x_starts, "k_n")));
    w.line(&format!("let s_y = {};", meta(body.y_starts, "k_n")));
    for local in &body.fragment.locals {
        w.line(&format!("var {}: f32 = 0.0f;", var_ident(local)));
    }
    stmts(&mut w, &body.fragment.body, Some(&ctx));
    w.close();
    w.finish()
}
