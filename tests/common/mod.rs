//! Shared helpers for integration tests.
#![allow(dead_code)]

pub mod fake_git;
pub mod fixtures;
pub mod git_helpers;
