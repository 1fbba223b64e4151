#![allow(dead_code, unused_imports)]

pub use dagrun_test_utils::{builders, fake_executor, init_tracing, with_timeout};
