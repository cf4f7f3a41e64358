//! Unit tests for the public SQL parser surface

mod parser_robustness_tests;
