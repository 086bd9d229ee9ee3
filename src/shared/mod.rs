//! Shared utilities used across the source and collector modules

pub(crate) mod flags;

pub(crate) use flags::flag_set;
