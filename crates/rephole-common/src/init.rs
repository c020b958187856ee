//! Process environment bootstrap

use std::sync::Once;

static INIT: Once = Once::new();

/// Load environment configuration once per process
///
/// Layered lookup: `.env.test` is read first when present, so test runs can
/// pin ports and credentials without editing the developer's `.env`; `.env`
/// fills in whatever is still unset. Variables already exported in the
/// process environment always win over both files. Repeated calls are
/// no-ops.
pub fn initialize_environment() {
    INIT.call_once(|| {
        dotenvy::from_filename(".env.test").ok();
        dotenvy::dotenv().ok();
    });
}
