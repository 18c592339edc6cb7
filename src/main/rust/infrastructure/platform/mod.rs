mod desktop_audio_routing;
mod static_permission_provider;

pub use desktop_audio_routing::DesktopAudioRouting;
pub use static_permission_provider::StaticPermissionProvider;
