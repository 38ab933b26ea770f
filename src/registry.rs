//! Process-wide registry mapping kernel names to constructors.
//!
//! The registry is populated with the built-in kernels on first access and
//! extended with [`register`] during process start. It is effectively frozen
//! once chunkers start being built; re-registering a taken name is a
//! programmer error and panics.

use std::collections::HashMap;
use std::io::Read;
use std::sync::RwLock;

use lazy_static::lazy_static;
use tracing::debug;

use crate::chunker::Chunker;
use crate::fastcdc::FastCdc;
use crate::kernel::Kernel;
use crate::ultracdc::UltraCdc;
use crate::{ChunkerError, ChunkerOptions};

type KernelFactory = Box<dyn Fn() -> Kernel + Send + Sync>;

lazy_static! {
    static ref KERNELS: RwLock<HashMap<String, KernelFactory>> = {
        let mut kernels: HashMap<String, KernelFactory> = HashMap::new();
        kernels.insert("fastcdc".to_string(), Box::new(|| Kernel::FastCdc(FastCdc)));
        kernels.insert(
            "ultracdc".to_string(),
            Box::new(|| Kernel::UltraCdc(UltraCdc)),
        );
        RwLock::new(kernels)
    };
}

/// Registers a kernel constructor under `name`.
///
/// # Panics
///
/// Panics if `name` is already taken. Shadowing an existing kernel would
/// change the bytes-to-cuts mapping behind every caller using that name.
pub fn register<F>(name: &str, factory: F)
where
    F: Fn() -> Kernel + Send + Sync + 'static,
{
    let mut kernels = KERNELS.write().unwrap();
    if kernels.contains_key(name) {
        // Release the lock first: panicking with it held would poison the
        // registry for every other thread.
        drop(kernels);
        panic!("chunking kernel `{name}` is already registered");
    }
    kernels.insert(name.to_string(), Box::new(factory));
    debug!(kernel = name, "registered chunking kernel");
}

/// Instantiates the kernel registered under `name`.
pub fn lookup(name: &str) -> Result<Kernel, ChunkerError> {
    let kernels = KERNELS.read().unwrap();
    match kernels.get(name) {
        Some(factory) => Ok(factory()),
        None => Err(ChunkerError::UnknownKernel(name.to_string())),
    }
}

/// Builds a streaming chunker over `source` driven by the kernel registered
/// under `name`.
///
/// When `opts` is `None` the kernel's defaults apply. Options are validated
/// here, exactly once; kernels assume validity from then on.
pub fn new_chunker<R: Read>(
    name: &str,
    source: R,
    opts: Option<ChunkerOptions>,
) -> Result<Chunker<R>, ChunkerError> {
    let kernel = lookup(name)?;
    let opts = opts.unwrap_or_else(|| kernel.default_options());
    kernel.validate(&opts)?;
    Ok(Chunker::new(kernel, opts, source))
}
