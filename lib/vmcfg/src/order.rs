// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Order-preserving edits on document sequences.
//!
//! Drive order is boot order, so removing or moving a set of entries must
//! leave every other entry where it was relative to its neighbours.

use std::collections::BTreeSet;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    #[error("offset {offset} out of range for {len} entries")]
    OffsetOutOfRange { offset: usize, len: usize },

    #[error("destination {destination} out of range for {len} entries")]
    DestinationOutOfRange { destination: usize, len: usize },
}

fn check_offsets(offsets: &BTreeSet<usize>, len: usize) -> Result<(), OrderError> {
    match offsets.last() {
        Some(&offset) if offset >= len => {
            Err(OrderError::OffsetOutOfRange { offset, len })
        }
        _ => Ok(()),
    }
}

/// Removes the entries at `offsets` and returns them in their original
/// order. Nothing is removed if any offset is out of range.
pub fn remove_offsets<T>(
    items: &mut Vec<T>,
    offsets: &BTreeSet<usize>,
) -> Result<Vec<T>, OrderError> {
    check_offsets(offsets, items.len())?;

    let mut removed = Vec::with_capacity(offsets.len());
    let mut kept = Vec::with_capacity(items.len() - offsets.len());
    for (i, item) in std::mem::take(items).into_iter().enumerate() {
        if offsets.contains(&i) {
            removed.push(item);
        } else {
            kept.push(item);
        }
    }
    *items = kept;
    Ok(removed)
}

/// Moves the entries at `offsets` so that they sit, in their original
/// order, just before the entry that was at `destination`. A destination
/// equal to the length moves them to the end.
pub fn move_offsets<T>(
    items: &mut Vec<T>,
    offsets: &BTreeSet<usize>,
    destination: usize,
) -> Result<(), OrderError> {
    let len = items.len();
    if destination > len {
        return Err(OrderError::DestinationOutOfRange { destination, len });
    }
    check_offsets(offsets, len)?;

    let shift = offsets.range(..destination).count();
    let moved = remove_offsets(items, offsets)?;
    let at = destination - shift;
    items.splice(at..at, moved);
    Ok(())
}
