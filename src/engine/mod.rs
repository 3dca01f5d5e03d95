pub mod transitions;
pub mod workflow;
