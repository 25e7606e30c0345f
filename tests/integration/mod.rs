//! Integration tests against real git repositories in temporary directories

mod helpers;

mod test_cli;
mod test_offline;
mod test_retention;
mod test_review;
