#![allow(clippy::uninlined_format_args)]

pub mod error;
