//! Property-based tests for deduplication and rule ordering.
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold for all possible inputs.
