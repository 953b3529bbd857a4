use std::path::PathBuf;

const ROOT_DIR_NAME: &str = "weather_repository";

/// `<platform data dir>/weather_repository`, e.g. `~/.local/share/weather_repository`
/// on Linux.
pub fn default_root_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join(ROOT_DIR_NAME))
}
