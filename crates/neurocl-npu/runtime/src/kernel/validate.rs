// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Static checks every device runs before accepting a kernel

use std::collections::BTreeSet;

use super::fragment::{Expr, Fragment, Stmt, DIRECT_OUTPUT_NAME};
use super::source::{KernelBody, KernelSource, VarRole};

/// True for `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validate a kernel's structure; the error string is the compile diagnostic
pub fn validate_source(source: &KernelSource) -> Result<(), String> {
    let n_bindings = source.bindings.len();
    let check_slot = |what: &str, slot: usize| {
        if slot >= n_bindings {
            Err(format!(
                "{} uses binding {} but only {} are declared",
                what, slot, n_bindings
            ))
        } else {
            Ok(())
        }
    };

    match &source.body {
        KernelBody::Elementwise(body) => {
            let mut declared = BTreeSet::new();
            for name in body
                .vars
                .iter()
                .map(|v| v.name.as_str())
                .chain(body.constants.iter().map(|(n, _)| n.as_str()))
                .chain(body.fragment.locals.iter().map(String::as_str))
            {
                if !is_identifier(name) {
                    return Err(format!("'{}' is not a valid identifier", name));
                }
                if !declared.insert(name) {
                    return Err(format!("'{}' is declared more than once", name));
                }
            }
            for var in &body.vars {
                check_slot(&var.name, var.binding)?;
            }
            for (name, value) in &body.constants {
                if !value.is_finite() {
                    return Err(format!("constant '{}' is not finite ({})", name, value));
                }
            }

            check_undeclared(&body.fragment, &declared)?;
            let read_only: BTreeSet<&str> = body
                .vars
                .iter()
                .filter(|v| v.role == VarRole::Param)
                .map(|v| v.name.as_str())
                .chain(body.constants.iter().map(|(n, _)| n.as_str()))
                .collect();
            if let Some(name) = body
                .fragment
                .assigned_names()
                .into_iter()
                .find(|n| read_only.contains(n))
            {
                return Err(format!("'{}' is read-only and cannot be assigned", name));
            }

            let mut vector_access = false;
            body.fragment.visit_exprs(&mut |e| {
                if matches!(e, Expr::Index(..)) {
                    vector_access = true;
                }
            });
            body.fragment.visit_stmts(&mut |s| {
                if matches!(s, Stmt::Store { .. }) {
                    vector_access = true;
                }
            });
            if vector_access {
                return Err("indexed access is not allowed in elementwise kernels".to_string());
            }
            check_arity(&body.fragment)
        }
        KernelBody::Probe(body) => {
            for (what, slot) in [
                ("countdowns", body.countdowns),
                ("bufpositions", body.bufpositions),
                ("periods", body.periods),
                ("x", body.x),
                ("y", body.y),
            ] {
                check_slot(what, slot)?;
            }
            if body.local_width == 0 {
                return Err("probe kernel needs at least one work-item per row".to_string());
            }
            Ok(())
        }
        KernelBody::Direct(body) => {
            check_slot("x", body.x)?;
            check_slot("y", body.y)?;
            let mut declared = BTreeSet::new();
            for name in &body.fragment.locals {
                if !is_identifier(name) {
                    return Err(format!("'{}' is not a valid identifier", name));
                }
                if name == &body.arg_name || name == DIRECT_OUTPUT_NAME {
                    return Err(format!("local '{}' shadows a vector argument", name));
                }
                if !declared.insert(name.as_str()) {
                    return Err(format!("'{}' is declared more than once", name));
                }
            }
            check_undeclared(&body.fragment, &declared)?;

            let mut bad_vector: Option<String> = None;
            body.fragment.visit_exprs(&mut |e| {
                if let Expr::Index(name, _) = e {
                    if name != &body.arg_name && bad_vector.is_none() {
                        bad_vector = Some(format!("unknown input vector '{}'", name));
                    }
                }
            });
            body.fragment.visit_stmts(&mut |s| {
                if let Stmt::Store { target, .. } = s {
                    if target != DIRECT_OUTPUT_NAME && bad_vector.is_none() {
                        bad_vector = Some(format!("unknown output vector '{}'", target));
                    }
                }
            });
            if let Some(reason) = bad_vector {
                return Err(reason);
            }
            check_arity(&body.fragment)
        }
    }
}

fn check_undeclared(fragment: &Fragment, declared: &BTreeSet<&str>) -> Result<(), String> {
    let referenced = fragment.referenced_names();
    let assigned = fragment.assigned_names();
    match referenced
        .iter()
        .chain(assigned.iter())
        .find(|n| !declared.contains(*n))
    {
        Some(name) => Err(format!("undeclared name '{}'", name)),
        None => Ok(()),
    }
}

fn check_arity(fragment: &Fragment) -> Result<(), String> {
    let mut bad = None;
    fragment.visit_exprs(&mut |e| {
        if let Expr::Call(builtin, args) = e {
            if args.len() != builtin.arity() && bad.is_none() {
                bad = Some(format!(
                    "{} takes {} argument(s), got {}",
                    builtin.name(),
                    builtin.arity(),
                    args.len()
                ));
            }
        }
    });
    bad.map_or(Ok(()), Err)
}
