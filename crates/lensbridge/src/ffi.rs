//! C ABI for hosts that own the native window.
//!
//! A bridge is created from raw window handles and referred to by an opaque
//! `u64` handle (a pointer to a heap-allocated bridge, 0 on failure). Calls
//! return a [`BridgeStatus`] code; the message behind the last failure can be
//! read with `lensbridge_last_error`.
//!
//! `lensbridge_initialize`, `_frame`, `_resize` and `_teardown` belong on the
//! host's render thread. `lensbridge_update_params` may be called from any
//! thread and only touches the parameter channel.

use std::os::raw::c_char;
use std::sync::{Mutex, MutexGuard};

use crate::bridge::{ParamUpdater, RenderBridge};
use crate::error::{BridgeError, BridgeStatus};
use crate::platform::GpuPlatform;

struct HostBridge<P: GpuPlatform> {
    updater: ParamUpdater,
    bridge: Mutex<RenderBridge<P>>,
    last_error: Mutex<Option<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<P: GpuPlatform> HostBridge<P> {
    fn record(&self, result: Result<(), BridgeError>) -> i32 {
        let mut last_error = lock(&self.last_error);
        match result {
            Ok(()) => {
                *last_error = None;
                BridgeStatus::Ok as i32
            }
            Err(err) => {
                *last_error = Some(err.to_string());
                err.status() as i32
            }
        }
    }
}

fn into_handle<P: GpuPlatform>(bridge: RenderBridge<P>) -> u64 {
    let host = Box::new(HostBridge {
        updater: bridge.updater(),
        bridge: Mutex::new(bridge),
        last_error: Mutex::new(None),
    });
    Box::into_raw(host) as u64
}

/// # Safety
///
/// `handle` must be 0 or a live value returned by [`into_handle`] for the same `P`.
unsafe fn host_from_handle<'a, P: GpuPlatform>(handle: u64) -> Option<&'a HostBridge<P>> {
    (handle as *const HostBridge<P>).as_ref()
}

unsafe fn with_bridge<P: GpuPlatform>(
    handle: u64,
    op: impl FnOnce(&mut RenderBridge<P>) -> Result<(), BridgeError>,
) -> i32 {
    let Some(host) = host_from_handle::<P>(handle) else {
        return BridgeStatus::InvalidHandle as i32;
    };
    let result = {
        let mut bridge = lock(&host.bridge);
        op(&mut bridge)
    };
    host.record(result)
}

unsafe fn initialize<P: GpuPlatform>(handle: u64, k1: f32, k2: f32) -> i32 {
    with_bridge::<P>(handle, |bridge| bridge.initialize(k1, k2))
}

unsafe fn update_params<P: GpuPlatform>(handle: u64, k1: f32, k2: f32) -> i32 {
    let Some(host) = host_from_handle::<P>(handle) else {
        return BridgeStatus::InvalidHandle as i32;
    };
    host.record(host.updater.update_params(k1, k2).map(|_| ()))
}

unsafe fn frame<P: GpuPlatform>(handle: u64) -> i32 {
    with_bridge::<P>(handle, |bridge| bridge.frame().map(|_| ()))
}

unsafe fn resize<P: GpuPlatform>(handle: u64, width: u32, height: u32) -> i32 {
    with_bridge::<P>(handle, |bridge| bridge.resize(width, height))
}

unsafe fn teardown<P: GpuPlatform>(handle: u64) -> i32 {
    with_bridge::<P>(handle, |bridge| {
        bridge.teardown();
        Ok(())
    })
}

unsafe fn destroy<P: GpuPlatform>(handle: u64) {
    if handle == 0 {
        return;
    }
    drop(Box::from_raw(handle as *mut HostBridge<P>));
}

/// Copies the last error message into `buf` as a NUL-terminated string.
///
/// Returns the full message length in bytes (without the terminator), or 0
/// when the most recent call on the handle succeeded. The copy is truncated to `len - 1` bytes.
unsafe fn last_error<P: GpuPlatform>(handle: u64, buf: *mut c_char, len: usize) -> usize {
    let Some(host) = host_from_handle::<P>(handle) else {
        return 0;
    };
    let guard = lock(&host.last_error);
    let Some(message) = guard.as_deref() else {
        return 0;
    };
    let bytes = message.as_bytes();
    if !buf.is_null() && len > 0 {
        let copied = bytes.len().min(len - 1);
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), buf.cast::<u8>(), copied);
        *buf.add(copied) = 0;
    }
    bytes.len()
}

#[cfg(feature = "wgpu")]
pub use exports::*;

#[cfg(feature = "wgpu")]
mod exports {
    use std::ffi::c_void;
    use std::os::raw::c_char;

    use crate::bridge::{BridgeOptions, RenderBridge};
    use crate::gpu::{NativeWindow, WgpuPlatform, WindowKind};

    /// Creates a bridge for a native window. Returns 0 on failure.
    ///
    /// `kind` is a [`WindowKind`] discriminant.
    ///
    /// # Safety
    ///
    /// `display` and `window` must name live native objects of that kind and
    /// outlive the bridge.
    #[no_mangle]
    pub unsafe extern "C" fn lensbridge_create(
        kind: u32,
        display: *mut c_void,
        window: *mut c_void,
        width: u32,
        height: u32,
    ) -> u64 {
        let Some(kind) = WindowKind::from_u32(kind) else {
            tracing::error!(kind, "unknown window kind");
            return 0;
        };
        let Some(native) = NativeWindow::from_ffi(kind, display, window, width, height) else {
            tracing::error!(?kind, "null native window handle");
            return 0;
        };
        let bridge = RenderBridge::new(WgpuPlatform::new(native), BridgeOptions::default());
        let handle = super::into_handle(bridge);
        tracing::debug!(handle = format_args!("0x{handle:X}"), ?kind, "bridge created");
        handle
    }

    /// Acquires the context and builds the program with the initial coefficients.
    #[no_mangle]
    pub extern "C" fn lensbridge_initialize(handle: u64, k1: f32, k2: f32) -> i32 {
        unsafe { super::initialize::<WgpuPlatform>(handle, k1, k2) }
    }

    /// Publishes new coefficients. Safe to call from any thread.
    #[no_mangle]
    pub extern "C" fn lensbridge_update_params(handle: u64, k1: f32, k2: f32) -> i32 {
        unsafe { super::update_params::<WgpuPlatform>(handle, k1, k2) }
    }

    #[no_mangle]
    pub extern "C" fn lensbridge_frame(handle: u64) -> i32 {
        unsafe { super::frame::<WgpuPlatform>(handle) }
    }

    #[no_mangle]
    pub extern "C" fn lensbridge_resize(handle: u64, width: u32, height: u32) -> i32 {
        unsafe { super::resize::<WgpuPlatform>(handle, width, height) }
    }

    #[no_mangle]
    pub extern "C" fn lensbridge_teardown(handle: u64) -> i32 {
        unsafe { super::teardown::<WgpuPlatform>(handle) }
    }

    /// Tears the bridge down if needed and frees it. The handle is invalid afterwards.
    #[no_mangle]
    pub extern "C" fn lensbridge_destroy(handle: u64) {
        unsafe { super::destroy::<WgpuPlatform>(handle) }
    }

    /// # Safety
    ///
    /// `buf` must be null or point to at least `len` writable bytes.
    #[no_mangle]
    pub unsafe extern "C" fn lensbridge_last_error(
        handle: u64,
        buf: *mut c_char,
        len: usize,
    ) -> usize {
        super::last_error::<WgpuPlatform>(handle, buf, len)
    }
}
