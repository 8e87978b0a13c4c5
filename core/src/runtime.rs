//! Rayon pool shared by the per-object phases of a registration
//!
//! Sampling, the correspondence update and the per-object solves each fan out
//! one task per object on the global pool, so its size bounds how many
//! objects are processed at once.

use crate::Error;
use rayon::ThreadPoolBuilder;
use std::env;
use std::sync::OnceLock;

/// Outcome of the first initialization attempt, replayed to later callers
static THREAD_POOL_INIT: OnceLock<Result<(), String>> = OnceLock::new();

const THREADS_ENV_VAR: &str = "MULTIWAY_CPU_THREADS";

/// Size the global pool before the first registration runs.
///
/// `num_threads` wins over `MULTIWAY_CPU_THREADS`; with neither, rayon picks
/// one thread per core. The pool can be built once per process, so every call
/// after the first returns the first outcome unchanged.
pub fn init_global_thread_pool(num_threads: Option<usize>) -> crate::Result<()> {
    let res = THREAD_POOL_INIT.get_or_init(|| {
        let configured_threads = match num_threads {
            Some(n) => Some(n),
            None => read_cpu_threads_from_env()?,
        };

        let mut builder = ThreadPoolBuilder::new();
        if let Some(n) = configured_threads {
            if n == 0 {
                return Err(format!("{THREADS_ENV_VAR} must be >= 1"));
            }
            builder = builder.num_threads(n);
        }

        builder.build_global().map_err(|e| e.to_string())
    });
    res.clone().map_err(Error::RuntimeError)
}

/// Number of worker threads the per-object phases run on
pub fn current_cpu_threads() -> usize {
    rayon::current_num_threads()
}

fn read_cpu_threads_from_env() -> Result<Option<usize>, String> {
    let raw = match env::var(THREADS_ENV_VAR) {
        Ok(v) => v,
        Err(env::VarError::NotPresent) => return Ok(None),
        Err(e) => return Err(format!("failed to read {THREADS_ENV_VAR}: {e}")),
    };
    parse_thread_count(&raw).map(Some)
}

fn parse_thread_count(raw: &str) -> Result<usize, String> {
    let parsed: usize = raw
        .trim()
        .parse()
        .map_err(|_| format!("{THREADS_ENV_VAR} must be a positive integer, got '{raw}'"))?;
    if parsed == 0 {
        return Err(format!("{THREADS_ENV_VAR} must be >= 1"));
    }
    Ok(parsed)
}
