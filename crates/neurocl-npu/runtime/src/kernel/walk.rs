// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Flattened-regime row walk
//!
//! A flattened work-item owns a contiguous run of the concatenated rows and
//! walks it element by element, crossing row boundaries and skipping empty
//! rows. The walk is a pure state machine so host interpretation and tests
//! share it with the rendered device loop.

/// Position inside a ragged batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowCursor {
    /// Current row
    pub row: usize,
    /// Element offset within the row
    pub offset: usize,
    /// Elements left in the row, current one included
    pub remaining: usize,
}

/// One step of a walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkStep {
    pub cursor: RowCursor,
    /// True when this element starts a new row for the walker
    pub entered_row: bool,
}

impl RowCursor {
    /// Locate flat element `flat`; `None` past the last element
    pub fn seek(lengths: &[usize], flat: usize) -> Option<Self> {
        let mut m = flat;
        for (row, &len) in lengths.iter().enumerate() {
            if m < len {
                return Some(Self {
                    row,
                    offset: m,
                    remaining: len - m,
                });
            }
            m -= len;
        }
        None
    }

    /// Next element, skipping empty rows; `None` at the end of the batch
    pub fn advance(self, lengths: &[usize]) -> Option<WalkStep> {
        if self.remaining > 1 {
            return Some(WalkStep {
                cursor: Self {
                    row: self.row,
                    offset: self.offset + 1,
                    remaining: self.remaining - 1,
                },
                entered_row: false,
            });
        }
        let mut row = self.row + 1;
        while row < lengths.len() {
            if lengths[row] > 0 {
                return Some(WalkStep {
                    cursor: Self {
                        row,
                        offset: 0,
                        remaining: lengths[row],
                    },
                    entered_row: true,
                });
            }
            row += 1;
        }
        None
    }
}

/// Number of work-items covering `total` elements in runs of `n_elements`
pub fn flattened_work_items(total: usize, n_elements: usize) -> usize {
    if n_elements == 0 {
        0
    } else {
        total.div_ceil(n_elements)
    }
}

/// Elements visited by flattened work-item `gid`
pub fn chunk(lengths: &[usize], gid: usize, n_elements: usize) -> Chunk<'_> {
    Chunk {
        lengths,
        next: RowCursor::seek(lengths, gid * n_elements).map(|cursor| WalkStep {
            cursor,
            entered_row: true,
        }),
        left: n_elements,
    }
}

/// Iterator over the elements of one flattened work-item
#[derive(Debug, Clone)]
pub struct Chunk<'a> {
    lengths: &'a [usize],
    next: Option<WalkStep>,
    left: usize,
}

impl Iterator for Chunk<'_> {
    type Item = WalkStep;

    fn next(&mut self) -> Option<WalkStep> {
        if self.left == 0 {
            return None;
        }
        let step = self.next?;
        self.left -= 1;
        self.next = step.cursor.advance(self.lengths);
        Some(step)
    }
}
