use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError};

use crate::types::{ApiVersion, ConfigAttributes, ConfigDescriptor};

/// Default bound on adapter acquisition.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        flags: wgpu::InstanceFlags::default(),
        memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        backend_options: wgpu::BackendOptions::default(),
    })
}

/// Runs `job` on a helper thread named after `label` and waits at most `timeout`.
///
/// On timeout the helper is abandoned; whatever it returns later is dropped.
pub(crate) fn with_timeout<T, F>(label: &str, timeout: Duration, job: F) -> Result<T, String>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = bounded(1);
    thread::Builder::new()
        .name(format!("lensbridge-{label}"))
        .spawn(move || {
            let _ = tx.send(job());
        })
        .map_err(|err| format!("failed to spawn {label} thread: {err}"))?;

    match rx.recv_timeout(timeout) {
        Ok(value) => Ok(value),
        Err(RecvTimeoutError::Timeout) => Err(format!(
            "{label} request timed out after {}ms",
            timeout.as_millis()
        )),
        Err(RecvTimeoutError::Disconnected) => {
            Err(format!("{label} thread exited without answering"))
        }
    }
}

/// Requests an adapter able to present to `surface`, giving up after `timeout`.
///
/// The helper thread owns the surface until it answers; the surface comes
/// back with the adapter.
pub(crate) fn request_adapter(
    instance: &wgpu::Instance,
    surface: wgpu::Surface<'static>,
    power_preference: wgpu::PowerPreference,
    timeout: Duration,
) -> Result<(wgpu::Surface<'static>, wgpu::Adapter), String> {
    let instance = instance.clone();
    let (surface, adapter) = with_timeout("adapter", timeout, move || {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }));
        (surface, adapter)
    })?;
    let adapter = adapter.map_err(|err| format!("no suitable GPU adapter: {err}"))?;
    Ok((surface, adapter))
}

/// API level the adapter's shader model corresponds to.
pub(crate) fn api_version_for(shader_model: wgpu::ShaderModel) -> ApiVersion {
    match shader_model {
        wgpu::ShaderModel::Sm2 => ApiVersion::new(2, 0),
        wgpu::ShaderModel::Sm4 => ApiVersion::new(3, 0),
        _ => ApiVersion::new(3, 2),
    }
}

/// Per-channel bit depths of the surface formats we know how to render into.
pub(crate) fn format_bits(format: wgpu::TextureFormat) -> Option<(u8, u8, u8, u8)> {
    use wgpu::TextureFormat as F;
    match format {
        F::Rgba8Unorm | F::Rgba8UnormSrgb | F::Bgra8Unorm | F::Bgra8UnormSrgb => Some((8, 8, 8, 8)),
        F::Rgb10a2Unorm => Some((10, 10, 10, 2)),
        F::Rgba16Float => Some((16, 16, 16, 16)),
        _ => None,
    }
}

/// Picks the cheapest surface format that satisfies `attributes`.
///
/// Candidates are ranked by total bit depth, then linear before sRGB, then
/// the order the surface reported them in.
pub(crate) fn select_format(
    formats: &[wgpu::TextureFormat],
    api: ApiVersion,
    attributes: &ConfigAttributes,
) -> Option<(wgpu::TextureFormat, ConfigDescriptor)> {
    formats
        .iter()
        .filter_map(|&format| {
            let (red_bits, green_bits, blue_bits, alpha_bits) = format_bits(format)?;
            let descriptor = ConfigDescriptor {
                red_bits,
                green_bits,
                blue_bits,
                alpha_bits,
                window_surface: true,
                api,
            };
            attributes
                .accepts(&descriptor)
                .then_some((format, descriptor))
        })
        .min_by_key(|(format, descriptor)| (descriptor.total_bits(), format.is_srgb()))
}

pub(crate) fn request_device(
    adapter: &wgpu::Adapter,
) -> Result<(wgpu::Device, wgpu::Queue), String> {
    pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("lensbridge device"),
        required_features: wgpu::Features::empty(),
        required_limits: adapter.limits(),
        memory_hints: wgpu::MemoryHints::Performance,
        trace: wgpu::Trace::default(),
    }))
    .map_err(|err| err.to_string())
}

pub(crate) fn surface_configuration(
    capabilities: &wgpu::SurfaceCapabilities,
    format: wgpu::TextureFormat,
    (width, height): (u32, u32),
    max_dimension: u32,
) -> wgpu::SurfaceConfiguration {
    let present_mode = capabilities
        .present_modes
        .iter()
        .copied()
        .find(|mode| *mode == wgpu::PresentMode::Fifo)
        .or_else(|| capabilities.present_modes.first().copied())
        .unwrap_or(wgpu::PresentMode::Fifo);
    let alpha_mode = capabilities
        .alpha_modes
        .first()
        .copied()
        .unwrap_or(wgpu::CompositeAlphaMode::Auto);

    wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: width.clamp(1, max_dimension.max(1)),
        height: height.clamp(1, max_dimension.max(1)),
        present_mode,
        alpha_mode,
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_acquisition_times_out() {
        let err = with_timeout("adapter", Duration::from_millis(20), || {
            thread::sleep(Duration::from_millis(500));
        })
        .unwrap_err();
        assert_eq!(err, "adapter request timed out after 20ms");
    }

    #[test]
    fn prompt_acquisition_returns_its_value() {
        let value = with_timeout("adapter", Duration::from_secs(5), || 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn helper_that_dies_is_reported() {
        let err = with_timeout("adapter", Duration::from_secs(5), || -> u32 {
            panic!("driver crashed")
        })
        .unwrap_err();
        assert_eq!(err, "adapter thread exited without answering");
    }

    #[test]
    fn smallest_matching_format_wins() {
        let formats = [
            wgpu::TextureFormat::Rgba16Float,
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Bgra8Unorm,
        ];
        let (format, descriptor) =
            select_format(&formats, ApiVersion::new(3, 2), &ConfigAttributes::default()).unwrap();
        assert_eq!(format, wgpu::TextureFormat::Bgra8Unorm);
        assert_eq!(descriptor.red_bits, 8);
    }

    #[test]
    fn deep_requests_fall_through_to_wide_formats() {
        let attributes = ConfigAttributes {
            red_bits: 10,
            green_bits: 10,
            blue_bits: 10,
            ..ConfigAttributes::default()
        };
        let formats = [
            wgpu::TextureFormat::Bgra8Unorm,
            wgpu::TextureFormat::Rgba16Float,
            wgpu::TextureFormat::Rgb10a2Unorm,
        ];
        let (format, _) = select_format(&formats, ApiVersion::new(3, 2), &attributes).unwrap();
        assert_eq!(format, wgpu::TextureFormat::Rgb10a2Unorm);
    }

    #[test]
    fn api_floor_rejects_weak_adapters() {
        let attributes = ConfigAttributes {
            min_api: ApiVersion::new(3, 0),
            ..ConfigAttributes::default()
        };
        let api = api_version_for(wgpu::ShaderModel::Sm2);
        assert!(select_format(&[wgpu::TextureFormat::Rgba8Unorm], api, &attributes).is_none());
    }

    #[test]
    fn configuration_clamps_size() {
        let mut capabilities = wgpu::SurfaceCapabilities::default();
        capabilities.formats = vec![wgpu::TextureFormat::Bgra8Unorm];
        capabilities.present_modes = vec![wgpu::PresentMode::Mailbox, wgpu::PresentMode::Fifo];
        capabilities.alpha_modes = vec![wgpu::CompositeAlphaMode::Opaque];
        let config = surface_configuration(
            &capabilities,
            wgpu::TextureFormat::Bgra8Unorm,
            (0, 9000),
            4096,
        );
        assert_eq!((config.width, config.height), (1, 4096));
        assert_eq!(config.present_mode, wgpu::PresentMode::Fifo);
    }
}
