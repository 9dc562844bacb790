//! HTTP surface for the staleness report, read markers and rate-limit decisions.

pub mod decision;
pub mod middleware;
pub mod routes;
pub mod state;
