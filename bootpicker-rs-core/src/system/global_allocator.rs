// SPDX-FileCopyrightText: 2025 some100 <ootinnyoo@outlook.com>
// SPDX-License-Identifier: MIT

//! The UEFI pool allocator as the global allocator, behind the `global_allocator` feature.

#![cfg(feature = "global_allocator")]

/// The UEFI global allocator.
#[global_allocator]
static ALLOCATOR: uefi::allocator::Allocator = uefi::allocator::Allocator;
