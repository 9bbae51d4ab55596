// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! The order entries are presented in.

use alloc::vec::Vec;
use log::debug;

use crate::boot::context::{BootContext, EntryRef};

/// Lays out the entries of a context for presentation, and numbers them.
///
/// Filesystems keep their scan order. Within a filesystem, operating systems come before tools. Every auxiliary
/// entry follows every other one, or is left out with `hide_auxiliary`, in which case it gets no `entry_index`.
pub fn enumerate_entries(context: &mut BootContext, hide_auxiliary: bool) -> Vec<EntryRef> {
    let mut order = Vec::with_capacity(context.boot_entry_count());
    let mut auxiliary = Vec::new();

    for (fs, filesystem) in context.filesystems.iter().enumerate() {
        let positions = (0..filesystem.entries.len()).map(|entry| EntryRef { fs, entry });
        let (tools, others): (Vec<EntryRef>, Vec<EntryRef>) =
            positions.partition(|&pos| filesystem.entries[pos.entry].is_tool());

        for pos in others.into_iter().chain(tools) {
            if filesystem.entries[pos.entry].auxiliary {
                auxiliary.push(pos);
            } else {
                order.push(pos);
            }
        }
    }
    if !hide_auxiliary {
        order.append(&mut auxiliary);
    }

    for filesystem in &mut context.filesystems {
        for entry in &mut filesystem.entries {
            entry.entry_index = None;
        }
    }
    for (index, &pos) in order.iter().enumerate() {
        if let Some(entry) = context.entry_mut(pos) {
            entry.entry_index = Some(index);
        }
    }

    debug!("Showing {} of {} entries", order.len(), context.boot_entry_count());
    order
}
