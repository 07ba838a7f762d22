//! Vulkan instance creation and validation layer setup.
//!
//! The [`Instance`] owns the loaded Vulkan entry points, the `VkInstance`,
//! and (in debug builds) a debug utils messenger that routes validation
//! messages into tracing.

use std::ffi::{CStr, c_char, c_void};

use ash::{Entry, vk};
use tracing::{debug, error, info, warn};

use crate::error::{RhiError, RhiResult};

/// Name of the Khronos validation layer.
pub const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// RAII wrapper around a Vulkan instance.
///
/// Destroys the debug messenger (if any) and the instance on drop. Every
/// other Vulkan object must be destroyed before the `Instance` is dropped.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl Instance {
    /// Creates a Vulkan instance.
    ///
    /// `surface_extensions` are the platform surface extensions reported by
    /// the windowing layer. When `enable_validation` is true and the Khronos
    /// validation layer is installed, the layer is enabled together with a
    /// debug messenger; otherwise validation is silently skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the Vulkan library cannot be loaded or instance
    /// creation fails.
    pub fn new(enable_validation: bool, surface_extensions: &[*const c_char]) -> RhiResult<Self> {
        // SAFETY: Entry::load has no preconditions beyond a sane process
        // environment; failure is reported as LoadingError.
        let entry = unsafe { Entry::load()? };

        let validation_available = enable_validation && Self::validation_layer_available(&entry)?;
        if enable_validation && !validation_available {
            warn!("Validation requested but VK_LAYER_KHRONOS_validation is not installed");
        }

        let app_info = vk::ApplicationInfo::default()
            .application_name(c"spinquad")
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"spinquad")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        let mut extensions: Vec<*const c_char> = surface_extensions.to_vec();
        if validation_available {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let mut layers: Vec<*const c_char> = Vec::new();
        if validation_available {
            layers.push(VALIDATION_LAYER_NAME.as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layers)
            .enabled_extension_names(&extensions);

        // SAFETY: create_info references live layer/extension name arrays for
        // the duration of the call.
        let instance = unsafe { entry.create_instance(&create_info, None)? };
        info!(
            "Vulkan instance created (validation: {})",
            validation_available
        );

        let (debug_utils, debug_messenger) = if validation_available {
            let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
            let messenger_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
                .message_severity(
                    vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                        | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                )
                .message_type(
                    vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                )
                .pfn_user_callback(Some(debug_callback));

            // SAFETY: the messenger is destroyed in Drop before the instance.
            let messenger = unsafe { loader.create_debug_utils_messenger(&messenger_info, None)? };
            debug!("Debug messenger installed");
            (Some(loader), Some(messenger))
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
        })
    }

    fn validation_layer_available(entry: &Entry) -> RhiResult<bool> {
        // SAFETY: plain enumeration call with no handle arguments.
        let layers = unsafe { entry.enumerate_instance_layer_properties()? };
        let found = layers.iter().any(|layer| {
            // SAFETY: layer_name is a null-terminated array filled by the loader.
            let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
            name == VALIDATION_LAYER_NAME
        });
        Ok(found)
    }

    /// Returns the loaded Vulkan entry points.
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Returns the raw instance handle wrapper.
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        // SAFETY: the messenger belongs to this instance and is destroyed
        // exactly once, before the instance itself.
        unsafe {
            if let (Some(loader), Some(messenger)) = (&self.debug_utils, self.debug_messenger) {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        debug!("Vulkan instance destroyed");
    }
}

/// Routes validation layer messages into tracing.
extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    if callback_data.is_null() {
        return vk::FALSE;
    }
    // SAFETY: the loader passes a valid callback data struct whose message
    // pointer is a null-terminated string for the duration of the callback.
    let message = unsafe {
        let data = &*callback_data;
        if data.p_message.is_null() {
            return vk::FALSE;
        }
        CStr::from_ptr(data.p_message).to_string_lossy()
    };

    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            error!("[{:?}] {}", message_type, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            warn!("[{:?}] {}", message_type, message);
        }
        _ => {
            debug!("[{:?}] {}", message_type, message);
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_creation_without_validation() {
        // Skip when no Vulkan driver or loader is present (CI machines).
        match Instance::new(false, &[]) {
            Ok(instance) => {
                assert!(instance.debug_messenger.is_none());
            }
            Err(RhiError::LoadingError(_)) | Err(RhiError::VulkanError(_)) => {
                eprintln!("Vulkan unavailable, skipping");
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}
