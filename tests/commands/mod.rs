//! Command-level tests

mod test_chat;
mod test_seed;
mod test_status;
