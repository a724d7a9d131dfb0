//! The extism-backed sandbox engine.
//!
//! Loads the sandbox WASM plugin with WASI enabled, registers the host
//! callbacks as extism host functions, and invokes the exported
//! `executeCode` entry with the bundled JavaScript. The plugin has no
//! ambient filesystem, network or environment access; the registered
//! callbacks are its only escape.

use extism::{host_fn, Manifest, PluginBuilder, UserData, Wasm, PTR};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::SandboxError;
use crate::executor::{SandboxEngine, ENTRY_FUNCTION};
use crate::host::{
    HostCallbacks, CALL_TOOL, WORKSPACE_DELETE_FILE, WORKSPACE_LIST_FILES, WORKSPACE_READ_FILE,
    WORKSPACE_WRITE_FILE,
};

/// Engine backed by an extism WASM plugin.
pub struct WasmEngine {
    wasm: Vec<u8>,
}

impl WasmEngine {
    pub fn new(wasm: Vec<u8>) -> Self {
        Self { wasm }
    }

    /// Load the plugin bytes from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SandboxError> {
        let path = path.as_ref();
        let wasm = std::fs::read(path).map_err(|e| {
            SandboxError::Engine(format!(
                "failed to read sandbox plugin {}: {e}",
                path.display()
            ))
        })?;
        Ok(Self::new(wasm))
    }
}

fn run_callback(
    user_data: &UserData<HostCallbacks>,
    name: &str,
    input: &str,
) -> Result<String, extism::Error> {
    let callbacks = user_data.get()?;
    let callbacks = callbacks
        .lock()
        .map_err(|_| extism::Error::msg("host callbacks poisoned"))?;
    let output = callbacks.dispatch(name, input.as_bytes());
    Ok(String::from_utf8_lossy(&output).into_owned())
}

host_fn!(call_tool(user_data: HostCallbacks; input: String) -> String {
    run_callback(&user_data, CALL_TOOL, &input)
});

host_fn!(workspace_read_file(user_data: HostCallbacks; input: String) -> String {
    run_callback(&user_data, WORKSPACE_READ_FILE, &input)
});

host_fn!(workspace_write_file(user_data: HostCallbacks; input: String) -> String {
    run_callback(&user_data, WORKSPACE_WRITE_FILE, &input)
});

host_fn!(workspace_list_files(user_data: HostCallbacks; input: String) -> String {
    run_callback(&user_data, WORKSPACE_LIST_FILES, &input)
});

host_fn!(workspace_delete_file(user_data: HostCallbacks; input: String) -> String {
    run_callback(&user_data, WORKSPACE_DELETE_FILE, &input)
});

impl SandboxEngine for WasmEngine {
    fn execute(
        &self,
        bundle_js: &str,
        callbacks: HostCallbacks,
        cancel: &CancellationToken,
    ) -> Result<String, SandboxError> {
        let manifest = Manifest::new([Wasm::data(self.wasm.clone())]);

        let mut plugin = PluginBuilder::new(manifest)
            .with_wasi(true)
            .with_function(
                CALL_TOOL,
                [PTR],
                [PTR],
                UserData::new(callbacks.clone()),
                call_tool,
            )
            .with_function(
                WORKSPACE_READ_FILE,
                [PTR],
                [PTR],
                UserData::new(callbacks.clone()),
                workspace_read_file,
            )
            .with_function(
                WORKSPACE_WRITE_FILE,
                [PTR],
                [PTR],
                UserData::new(callbacks.clone()),
                workspace_write_file,
            )
            .with_function(
                WORKSPACE_LIST_FILES,
                [PTR],
                [PTR],
                UserData::new(callbacks.clone()),
                workspace_list_files,
            )
            .with_function(
                WORKSPACE_DELETE_FILE,
                [PTR],
                [PTR],
                UserData::new(callbacks),
                workspace_delete_file,
            )
            .build()
            .map_err(|e| SandboxError::Engine(format!("failed to load sandbox plugin: {e}")))?;

        // Translate token cancellation into the plugin's cancel handle from
        // a watcher thread; the call below blocks this thread.
        let cancel_handle = plugin.cancel_handle();
        let done = Arc::new(AtomicBool::new(false));
        let watcher = {
            let done = done.clone();
            let cancel = cancel.clone();
            std::thread::spawn(move || {
                while !done.load(Ordering::Relaxed) {
                    if cancel.is_cancelled() {
                        let _ = cancel_handle.cancel();
                        break;
                    }
                    std::thread::sleep(std::time::Duration::from_millis(25));
                }
            })
        };

        let result = plugin.call::<&str, &str>(ENTRY_FUNCTION, bundle_js);
        done.store(true, Ordering::Relaxed);
        let _ = watcher.join();

        match result {
            Ok(output) => Ok(output.to_string()),
            Err(_) if cancel.is_cancelled() => Err(SandboxError::Cancelled),
            Err(e) => {
                debug!("sandbox plugin call failed: {e}");
                Err(SandboxError::Engine(format!("plugin execution failed: {e}")))
            }
        }
    }
}
