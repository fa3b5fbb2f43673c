//! Property-based tests for context building and cost estimation

mod context_bounds;
