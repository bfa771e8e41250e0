//! Validation-layer plumbing: the debug-utils callback and its severity
//! mapping onto the log facade.

use std::ffi::CStr;
use std::os::raw::c_void;

use log::*;
use vulkanalia::prelude::v1_0::*;

/// Maps a Vulkan debug-utils severity bit onto a log level. Verbose
/// validation chatter lands on `Trace`, which is compiled out of release
/// builds entirely.
pub(crate) fn level_for_severity(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        Level::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        Level::Warn
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        Level::Info
    } else {
        Level::Trace
    }
}

/// Routes validation-layer messages into the logger. Installed both on the
/// instance create-info chain (so instance creation itself is covered) and
/// as the standalone messenger.
pub(crate) extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    type_: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _: *mut c_void,
) -> vk::Bool32 {
    let data = unsafe { *data };
    let message = unsafe { CStr::from_ptr(data.message) }.to_string_lossy();

    log!(level_for_severity(severity), "({:?}) {}", type_, message);

    // Never abort the call that triggered the message.
    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_maps_onto_log_levels() {
        assert_eq!(
            level_for_severity(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR),
            Level::Error
        );
        assert_eq!(
            level_for_severity(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING),
            Level::Warn
        );
        assert_eq!(
            level_for_severity(vk::DebugUtilsMessageSeverityFlagsEXT::INFO),
            Level::Info
        );
        assert_eq!(
            level_for_severity(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE),
            Level::Trace
        );
    }
}
