pub mod engine;
pub mod steps;
pub mod store;
pub mod transitions;
