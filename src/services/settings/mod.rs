mod service;

pub use service::{
    apply_env_overrides, SettingsService, CONFIG_FILE_NAME, ENV_API_TOKEN, ENV_API_URL,
    ENV_TIMEZONE,
};
