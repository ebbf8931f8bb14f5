// src/egl/context.rs

//! `PresentationContext`: EGL display, config, GLES context and the window
//! surface over the buffer provider's render surface.

use std::ffi::{c_void, CStr};
use std::fmt;
use std::sync::Arc;

use khronos_egl as egl;
use log::{debug, info, warn};

use super::config::{config_attribs, context_attribs, select_config, ClientVersion};
use super::extensions::{EglExtensions, ExtensionProcs, ProcAddress};
use super::{EglInstance, PLATFORM_GBM_KHR};
use crate::app::NativeHandles;
use crate::buffer::PixelFormat;
use crate::error::DisplayError;
use crate::scheduler::Presenter;

type GetPlatformDisplayExt =
    unsafe extern "system" fn(egl::Enum, *mut c_void, *const egl::Int) -> egl::EGLDisplay;

type GlGetString = unsafe extern "system" fn(u32) -> *const u8;

const GL_VENDOR: u32 = 0x1F00;
const GL_RENDERER: u32 = 0x1F01;
const GL_VERSION: u32 = 0x1F02;
const GL_EXTENSIONS: u32 = 0x1F03;
const GL_SHADING_LANGUAGE_VERSION: u32 = 0x8B8C;

/// Context creation knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextOptions {
    pub client_version: ClientVersion,
    /// MSAA samples; 0 leaves `EGL_SAMPLES` unconstrained.
    pub samples: u32,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            client_version: ClientVersion::Es3,
            samples: 0,
        }
    }
}

/// Resolves GL / EGL entry points by name for application code.
#[derive(Clone)]
pub struct GlLoader {
    instance: Arc<EglInstance>,
}

impl GlLoader {
    pub fn proc_address(&self, name: &str) -> Option<ProcAddress> {
        self.instance
            .get_proc_address(name)
            .map(|f| f as ProcAddress)
            .filter(|p| !p.is_null())
    }
}

impl fmt::Debug for GlLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlLoader").finish_non_exhaustive()
    }
}

pub struct PresentationContext {
    instance: Arc<EglInstance>,
    display: egl::Display,
    context: egl::Context,
    surface: egl::Surface,
    native_display: *mut c_void,
    native_window: *mut c_void,
    extensions: EglExtensions,
    procs: ExtensionProcs,
}

fn egl_error(what: &str, e: egl::Error) -> String {
    format!("{}: {}", what, e)
}

fn query(instance: &EglInstance, display: Option<egl::Display>, name: egl::Int) -> String {
    instance
        .query_string(display, name)
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl PresentationContext {
    /// Brings up EGL over a GBM device and surface and makes the new context
    /// current on the calling thread.
    ///
    /// `native_display` is the `gbm_device *`, `native_window` the
    /// `gbm_surface *`; both must outlive the context.
    pub fn new(
        native_display: *mut c_void,
        native_window: *mut c_void,
        format: PixelFormat,
        options: ContextOptions,
    ) -> Result<Self, DisplayError> {
        // SAFETY: loading libEGL runs no code beyond its initializers.
        let instance = unsafe { EglInstance::load_required() }.map_err(|e| {
            DisplayError::InitializationFailed(format!("cannot load libEGL: {}", e))
        })?;
        let instance = Arc::new(instance);

        let client_exts = query(&instance, None, egl::EXTENSIONS);
        let mut extensions = EglExtensions::from_client(&client_exts);

        let display = Self::platform_display(&instance, extensions, native_display)?;
        let (major, minor) = instance
            .initialize(display)
            .map_err(|e| DisplayError::InitializationFailed(egl_error("eglInitialize", e)))?;

        let display_exts = query(&instance, Some(display), egl::EXTENSIONS);
        extensions |= EglExtensions::from_display(&display_exts);

        info!("EGL: display {:p}, version {}.{}", display.as_ptr(), major, minor);
        info!("EGL: version \"{}\"", query(&instance, Some(display), egl::VERSION));
        info!("EGL: vendor \"{}\"", query(&instance, Some(display), egl::VENDOR));
        info!("EGL: client extensions \"{}\"", client_exts);
        info!("EGL: display extensions \"{}\"", display_exts);

        // From here on the display must be terminated on failure.
        let partial = Teardown {
            instance: &instance,
            display,
            context: None,
            surface: None,
        };

        instance
            .bind_api(egl::OPENGL_ES_API)
            .map_err(|e| DisplayError::InitializationFailed(egl_error("eglBindAPI", e)))?;

        let config = choose_config(&instance, display, options, format)?;

        let context = instance
            .create_context(display, config, None, &context_attribs(options.client_version))
            .map_err(|e| DisplayError::ContextCreationFailed(egl_error("eglCreateContext", e)))?;
        let partial = partial.with_context(context);

        // SAFETY: `native_window` is a live gbm_surface owned by the caller.
        let surface = unsafe {
            instance.create_window_surface(
                display,
                config,
                native_window as egl::NativeWindowType,
                None,
            )
        }
        .map_err(|e| DisplayError::SurfaceCreationFailed(egl_error("eglCreateWindowSurface", e)))?;
        let partial = partial.with_surface(surface);

        instance
            .make_current(display, Some(surface), Some(surface), Some(context))
            .map_err(|e| DisplayError::ContextCreationFailed(egl_error("eglMakeCurrent", e)))?;
        partial.disarm();

        let loader = GlLoader {
            instance: instance.clone(),
        };
        extensions |= log_gl_info(&loader);
        let procs = ExtensionProcs::resolve(extensions, |name| loader.proc_address(name));
        debug!("EGL: capabilities {:?}", extensions);

        Ok(Self {
            instance,
            display,
            context,
            surface,
            native_display,
            native_window,
            extensions,
            procs,
        })
    }

    fn platform_display(
        instance: &EglInstance,
        extensions: EglExtensions,
        native_display: *mut c_void,
    ) -> Result<egl::Display, DisplayError> {
        let platform_entry = if extensions.contains(EglExtensions::PLATFORM_BASE) {
            instance.get_proc_address("eglGetPlatformDisplayEXT")
        } else {
            None
        };
        let raw = match platform_entry {
            Some(f) => {
                debug!("EGL: using eglGetPlatformDisplayEXT(EGL_PLATFORM_GBM_KHR)");
                // SAFETY: the entry point has this signature per EGL_EXT_platform_base.
                let get_platform_display: GetPlatformDisplayExt = unsafe { std::mem::transmute(f) };
                unsafe { get_platform_display(PLATFORM_GBM_KHR, native_display, std::ptr::null()) }
            }
            None => {
                debug!("EGL: EGL_EXT_platform_base missing, using eglGetDisplay");
                // SAFETY: a gbm_device is a valid native display for Mesa's EGL.
                match unsafe { instance.get_display(native_display as egl::NativeDisplayType) } {
                    Some(display) => display.as_ptr(),
                    None => std::ptr::null_mut(),
                }
            }
        };
        if raw.is_null() {
            return Err(DisplayError::InitializationFailed(
                "no EGL display for the GBM device".to_string(),
            ));
        }
        // SAFETY: non-null handle just returned by EGL.
        Ok(unsafe { egl::Display::from_ptr(raw) })
    }

    pub fn extensions(&self) -> EglExtensions {
        self.extensions
    }

    pub fn procs(&self) -> &ExtensionProcs {
        &self.procs
    }

    pub fn loader(&self) -> GlLoader {
        GlLoader {
            instance: self.instance.clone(),
        }
    }
}

fn choose_config(
    instance: &EglInstance,
    display: egl::Display,
    options: ContextOptions,
    format: PixelFormat,
) -> Result<egl::Config, DisplayError> {
    let total = instance.get_config_count(display).unwrap_or(0);
    if total == 0 {
        warn!("EGL: no configs to choose from");
        return Err(DisplayError::NoMatchingConfig);
    }
    let mut configs = Vec::with_capacity(total);
    instance
        .choose_config(
            display,
            &config_attribs(options.client_version, options.samples),
            &mut configs,
        )
        .map_err(|e| {
            warn!("EGL: eglChooseConfig failed: {}", e);
            DisplayError::NoMatchingConfig
        })?;
    let candidates: Vec<_> = configs
        .iter()
        .map(|&config| {
            let visual = instance
                .get_config_attrib(display, config, egl::NATIVE_VISUAL_ID)
                .ok();
            (config, visual)
        })
        .collect();
    debug!("EGL: {} matching configs", candidates.len());
    select_config(&candidates, Some(format.native_visual_id())).ok_or(DisplayError::NoMatchingConfig)
}

fn gl_string(get_string: GlGetString, name: u32) -> String {
    // SAFETY: a context is current; glGetString returns a static string or null.
    let ptr = unsafe { get_string(name) };
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr.cast()) }
        .to_string_lossy()
        .into_owned()
}

/// Logs the GL identification strings and returns the GL-side capabilities.
fn log_gl_info(loader: &GlLoader) -> EglExtensions {
    let Some(address) = loader.proc_address("glGetString") else {
        warn!("EGL: glGetString unavailable, skipping GL information");
        return EglExtensions::empty();
    };
    // SAFETY: glGetString has this signature.
    let get_string: GlGetString = unsafe { std::mem::transmute(address) };
    let extensions = gl_string(get_string, GL_EXTENSIONS);
    info!("GL: version \"{}\"", gl_string(get_string, GL_VERSION));
    info!(
        "GL: shading language version \"{}\"",
        gl_string(get_string, GL_SHADING_LANGUAGE_VERSION)
    );
    info!("GL: vendor \"{}\"", gl_string(get_string, GL_VENDOR));
    info!("GL: renderer \"{}\"", gl_string(get_string, GL_RENDERER));
    debug!("GL: extensions \"{}\"", extensions);
    EglExtensions::from_gl(&extensions)
}

impl Presenter for PresentationContext {
    fn present(&mut self) -> Result<(), DisplayError> {
        self.instance
            .swap_buffers(self.display, self.surface)
            .map_err(|e| DisplayError::PresentFailed(egl_error("eglSwapBuffers", e)))
    }

    fn native_handles(&self) -> NativeHandles {
        NativeHandles {
            display: self.display.as_ptr(),
            surface: self.surface.as_ptr(),
            context: self.context.as_ptr(),
            native_display: self.native_display,
            native_window: self.native_window,
        }
    }
}

impl fmt::Debug for PresentationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresentationContext")
            .field("display", &self.display.as_ptr())
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

impl Drop for PresentationContext {
    fn drop(&mut self) {
        drop(Teardown {
            instance: &self.instance,
            display: self.display,
            context: Some(self.context),
            surface: Some(self.surface),
        });
    }
}

/// Releases whatever part of the EGL state exists.
struct Teardown<'a> {
    instance: &'a EglInstance,
    display: egl::Display,
    context: Option<egl::Context>,
    surface: Option<egl::Surface>,
}

impl Teardown<'_> {
    fn with_context(mut self, context: egl::Context) -> Self {
        self.context = Some(context);
        self
    }

    fn with_surface(mut self, surface: egl::Surface) -> Self {
        self.surface = Some(surface);
        self
    }

    fn disarm(self) {
        std::mem::forget(self);
    }

    fn run(&mut self) {
        if let Err(e) = self.instance.make_current(self.display, None, None, None) {
            debug!("EGL: releasing current context failed: {}", e);
        }
        if let Some(surface) = self.surface.take() {
            if let Err(e) = self.instance.destroy_surface(self.display, surface) {
                warn!("EGL: eglDestroySurface failed: {}", e);
            }
        }
        if let Some(context) = self.context.take() {
            if let Err(e) = self.instance.destroy_context(self.display, context) {
                warn!("EGL: eglDestroyContext failed: {}", e);
            }
        }
        if let Err(e) = self.instance.terminate(self.display) {
            warn!("EGL: eglTerminate failed: {}", e);
        }
    }
}

impl Drop for Teardown<'_> {
    fn drop(&mut self) {
        self.run();
    }
}
