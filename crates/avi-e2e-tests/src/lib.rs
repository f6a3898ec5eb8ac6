//! End-to-end tests for the Avi NLU workspace live in `tests/`.
