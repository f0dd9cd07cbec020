mod common;

mod postgres_tests;
mod startup_tests;
