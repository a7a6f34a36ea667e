// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Ragged-batch kernel planning
//!
//! Two allocation regimes:
//! - **Block** (`n_elements == 0`): a 2-D grid, dimension 0 sized to the
//!   longest row, dimension 1 to the row count. Cells past the end of their
//!   row idle.
//! - **Flattened** (`n_elements >= 1`): `ceil(total / n_elements)`
//!   work-items, each walking a contiguous run of the concatenated rows.

mod broadcast;
mod elementwise;
pub(crate) mod layout;

pub use broadcast::{check_constant, resolve, resolve_rows, Broadcast, ParamArg};
pub use elementwise::{ElementwisePlanner, DEFAULT_MAX_LOCAL_SIZE};
pub(crate) use elementwise::check_vector_batch;
