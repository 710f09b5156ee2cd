pub mod e2e;
pub mod env;

#[allow(unused_imports)]
pub use e2e::{connect_live, should_run_e2e_tests};
#[allow(unused_imports)]
pub use env::{get_test_dsn, get_test_password, get_test_user};
