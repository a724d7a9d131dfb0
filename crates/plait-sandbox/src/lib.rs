//! # plait-sandbox
//!
//! The execution side of the gateway: host-side sandbox storage with
//! quotas, the bundler adapter, the sandbox executor with its host-callback
//! vtable, and the source-map resolver that translates sandbox stack
//! traces back to the user's source.

mod bundler;
mod error;
mod executor;
pub mod fs;
pub mod host;
pub mod sourcemap;

#[cfg(feature = "wasm")]
mod wasm;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use bundler::{
    entry_file, BundleOutput, Bundler, RspackBundler, RSPACK_CONFIG, RSPACK_CONFIG_FILE,
};
pub use error::SandboxError;
pub use executor::{ExecutionOutcome, Executor, SandboxEngine, ENTRY_FUNCTION};
pub use fs::{DirStats, DirectoryQuota, FileRequest, FileResponse, SandboxFs};
pub use host::{session_callbacks, HostCallbacks, ToolCallRequest, ToolCallResponse};

#[cfg(feature = "wasm")]
pub use wasm::WasmEngine;
