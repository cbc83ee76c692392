/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

pub mod build;
pub mod config;
pub mod export;
pub mod identity;
pub mod listen;
pub mod log;
pub mod mapping;
pub mod opts;
pub mod parse;
pub mod pipeline;
pub mod relay;
pub mod signal;
pub mod stat;
pub mod store;
pub mod types;
pub mod watch;
