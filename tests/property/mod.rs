//! Property-based tests for completion and ordering guarantees

mod ordering;
