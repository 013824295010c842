use std::ffi::c_void;
use std::num::NonZeroIsize;
use std::ptr::NonNull;
use std::sync::Arc;

use raw_window_handle::{
    AndroidDisplayHandle, AndroidNdkWindowHandle, RawDisplayHandle, RawWindowHandle,
    WaylandDisplayHandle, WaylandWindowHandle, Win32WindowHandle, WindowsDisplayHandle,
    XlibDisplayHandle, XlibWindowHandle,
};

/// Kind of native window a host hands across the C boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum WindowKind {
    /// `window` is an `ANativeWindow*`; `display` is ignored.
    Android = 0,
    /// `display` is a `wl_display*`, `window` a `wl_surface*`.
    Wayland = 1,
    /// `display` is an Xlib `Display*`, `window` the X window id.
    Xlib = 2,
    /// `window` is an `HWND`; `display` is ignored.
    Win32 = 3,
}

impl WindowKind {
    pub fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Android),
            1 => Some(Self::Wayland),
            2 => Some(Self::Xlib),
            3 => Some(Self::Win32),
            _ => None,
        }
    }
}

/// Raw display and window handles owned by the host, plus the surface size in pixels.
#[derive(Debug, Clone, Copy)]
pub struct NativeWindow {
    display: RawDisplayHandle,
    window: RawWindowHandle,
    width: u32,
    height: u32,
}

// SAFETY: the handles are plain identifiers. Whoever constructs a
// `NativeWindow` guarantees the underlying objects stay valid for as long as
// any surface created from them, on whichever thread that surface lives.
unsafe impl Send for NativeWindow {}
unsafe impl Sync for NativeWindow {}

impl NativeWindow {
    /// Wraps raw handles.
    ///
    /// # Safety
    ///
    /// The display and window must outlive every surface created from the
    /// returned value.
    pub unsafe fn from_raw(
        display: RawDisplayHandle,
        window: RawWindowHandle,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            display,
            window,
            width,
            height,
        }
    }

    /// Builds handles from the pointers a C host passes in.
    ///
    /// Returns `None` when a required pointer is null.
    ///
    /// # Safety
    ///
    /// The pointers must name live native objects of the given `kind` and
    /// stay valid for as long as any surface created from the result.
    pub unsafe fn from_ffi(
        kind: WindowKind,
        display: *mut c_void,
        window: *mut c_void,
        width: u32,
        height: u32,
    ) -> Option<Self> {
        let (display, window) = match kind {
            WindowKind::Android => (
                RawDisplayHandle::Android(AndroidDisplayHandle::new()),
                RawWindowHandle::AndroidNdk(AndroidNdkWindowHandle::new(NonNull::new(window)?)),
            ),
            WindowKind::Wayland => (
                RawDisplayHandle::Wayland(WaylandDisplayHandle::new(NonNull::new(display)?)),
                RawWindowHandle::Wayland(WaylandWindowHandle::new(NonNull::new(window)?)),
            ),
            WindowKind::Xlib => {
                let id = window as usize as std::os::raw::c_ulong;
                if id == 0 {
                    return None;
                }
                (
                    RawDisplayHandle::Xlib(XlibDisplayHandle::new(NonNull::new(display), 0)),
                    RawWindowHandle::Xlib(XlibWindowHandle::new(id)),
                )
            }
            WindowKind::Win32 => (
                RawDisplayHandle::Windows(WindowsDisplayHandle::new()),
                RawWindowHandle::Win32(Win32WindowHandle::new(NonZeroIsize::new(
                    window as isize,
                )?)),
            ),
        };
        Some(Self::from_raw(display, window, width, height))
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Where the platform creates its window surface.
#[derive(Debug, Clone)]
pub enum SurfaceTarget {
    /// A winit window kept alive by the platform itself.
    Window(Arc<winit::window::Window>),
    /// Handles owned by the host application.
    Native(NativeWindow),
}

impl SurfaceTarget {
    pub(crate) fn size(&self) -> (u32, u32) {
        match self {
            SurfaceTarget::Window(window) => {
                let size = window.inner_size();
                (size.width, size.height)
            }
            SurfaceTarget::Native(native) => native.size(),
        }
    }

    pub(crate) fn create_surface(
        &self,
        instance: &wgpu::Instance,
    ) -> Result<wgpu::Surface<'static>, wgpu::CreateSurfaceError> {
        match self {
            SurfaceTarget::Window(window) => instance.create_surface(Arc::clone(window)),
            // SAFETY: `NativeWindow` construction requires the handles to
            // outlive the surfaces made from them.
            SurfaceTarget::Native(native) => unsafe {
                instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                    raw_display_handle: native.display,
                    raw_window_handle: native.window,
                })
            },
        }
    }
}

impl From<Arc<winit::window::Window>> for SurfaceTarget {
    fn from(window: Arc<winit::window::Window>) -> Self {
        SurfaceTarget::Window(window)
    }
}

impl From<NativeWindow> for SurfaceTarget {
    fn from(native: NativeWindow) -> Self {
        SurfaceTarget::Native(native)
    }
}
