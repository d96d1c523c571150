// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI command modules.

pub mod bench;
pub mod del;
pub mod destroy;
pub mod get;
pub mod inspect;
pub mod recover;
pub mod set;
pub mod validate;
pub mod worker;
