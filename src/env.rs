//! Configuration read from environment variables, once per process.
//!
//! - `LC3VM_TRACE=1`: print every executed instruction to stderr.

use std::sync::OnceLock;

const TRACE_VAR: &str = "LC3VM_TRACE";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Env {
    trace_enabled: bool,
}

/// Must only be set within `init`
static ENV: OnceLock<Env> = OnceLock::new();

impl Env {
    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let is_set = |name: &str| lookup(name).is_some_and(|value| value == "1");
        Self {
            trace_enabled: is_set(TRACE_VAR),
        }
    }
}

pub fn init() {
    let value = Env::from_lookup(|name| std::env::var(name).ok());
    assert!(
        ENV.set(value).is_ok(),
        "tried to initialize environment state multiple times"
    );
}

pub fn is_trace_enabled() -> bool {
    with_env(|env| env.trace_enabled)
}

fn with_env<F, R>(callback: F) -> R
where
    F: Fn(&Env) -> R,
{
    let env = ENV.get().unwrap_or_else(|| {
        panic!("tried to access environment state before initialization");
    });
    callback(env)
}
