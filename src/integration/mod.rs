//! Integration tests and shared test doubles

pub mod fakes;

mod pipeline_scenarios;
