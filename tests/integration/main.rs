//! End-to-end tests: the scanner runner and the control-plane API working
//! against the same runtime config and snapshot files.

mod harness;
mod mock_broker;
mod scenarios;
