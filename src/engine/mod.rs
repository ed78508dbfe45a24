//! Core engine — accounts, the execution gate, order execution and the
//! scan loop that ties them together.

pub mod accounts;
pub mod executor;
pub mod gate;
pub mod runner;
