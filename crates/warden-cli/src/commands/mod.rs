//! CLI commands.

pub(crate) mod audit;
pub(crate) mod check;
pub(crate) mod serve;
pub(crate) mod tools;
