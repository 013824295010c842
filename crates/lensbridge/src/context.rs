use crate::error::ContextError;
use crate::platform::GpuPlatform;
use crate::types::{ApiVersion, ConfigAttributes, ConfigDescriptor};

/// Display connection, chosen configuration, context and window surface.
///
/// Every handle is held in an `Option` so the chain can be torn down from any
/// point of a partial acquisition. `context` is only present while
/// `initialized` is true, and the display is always released last.
pub struct GraphicsContext<P: GpuPlatform> {
    display: Option<P::Display>,
    config: Option<P::Config>,
    context: Option<P::Context>,
    surface: Option<P::Surface>,
    descriptor: Option<ConfigDescriptor>,
    api: Option<ApiVersion>,
    initialized: bool,
}

impl<P: GpuPlatform> GraphicsContext<P> {
    fn empty() -> Self {
        Self {
            display: None,
            config: None,
            context: None,
            surface: None,
            descriptor: None,
            api: None,
            initialized: false,
        }
    }

    /// Acquires the full chain and binds it to the calling thread.
    ///
    /// On failure everything acquired so far is released before returning.
    pub fn acquire(platform: &mut P, attributes: &ConfigAttributes) -> Result<Self, ContextError> {
        let mut chain = Self::empty();
        match chain.build(platform, attributes) {
            Ok(()) => Ok(chain),
            Err(err) => {
                tracing::warn!(error = %err, "context acquisition failed; releasing partial chain");
                chain.release(platform);
                Err(err)
            }
        }
    }

    fn build(&mut self, platform: &mut P, attributes: &ConfigAttributes) -> Result<(), ContextError> {
        let display = self
            .display
            .insert(platform.get_display().ok_or(ContextError::DisplayUnavailable)?);

        let api = platform
            .initialize_display(display)
            .map_err(ContextError::InitializationFailed)?;
        self.api = Some(api);
        tracing::debug!(%api, "graphics layer initialized");

        let (config, descriptor) = platform
            .choose_config(display, attributes)
            .ok_or(ContextError::NoMatchingConfig {
                requested: *attributes,
            })?;
        let config = self.config.insert(config);
        self.descriptor = Some(descriptor);
        tracing::debug!(config = %descriptor, "selected display configuration");

        let context = self.context.insert(
            platform
                .create_context(display, config)
                .map_err(ContextError::ContextCreationFailed)?,
        );

        let surface = self.surface.insert(
            platform
                .create_surface(display, config, context)
                .map_err(ContextError::ContextCreationFailed)?,
        );

        platform
            .make_current(display, surface, context)
            .map_err(|err| ContextError::ContextCreationFailed(format!("make current: {err}")))?;

        self.initialized = true;
        Ok(())
    }

    /// Releases surface, context and display in reverse acquisition order.
    ///
    /// Calling this on an already released context does nothing.
    pub fn release(&mut self, platform: &mut P) {
        let Some(display) = self.display.take() else {
            return;
        };
        if self.initialized {
            platform.release_current(&display);
        }
        if let Some(surface) = self.surface.take() {
            platform.destroy_surface(&display, surface);
        }
        if let Some(context) = self.context.take() {
            platform.destroy_context(&display, context);
        }
        self.config = None;
        platform.terminate_display(display);
        self.initialized = false;
        tracing::debug!("graphics context released");
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn context(&self) -> Option<&P::Context> {
        self.context.as_ref()
    }

    pub fn config(&self) -> Option<&P::Config> {
        self.config.as_ref()
    }

    /// Context and configuration together, as needed to build programs.
    pub fn handles(&self) -> Option<(&P::Context, &P::Config)> {
        match (&self.context, &self.config) {
            (Some(context), Some(config)) if self.initialized => Some((context, config)),
            _ => None,
        }
    }

    pub fn descriptor(&self) -> Option<ConfigDescriptor> {
        self.descriptor
    }

    pub fn api_version(&self) -> Option<ApiVersion> {
        self.api
    }

    /// Borrows the context together with the surface it renders into.
    pub fn render_target(&mut self) -> Option<(&P::Context, &mut P::Surface)> {
        match (&self.context, &mut self.surface) {
            (Some(context), Some(surface)) if self.initialized => Some((context, surface)),
            _ => None,
        }
    }
}
