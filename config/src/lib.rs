pub mod crypto;
pub mod paths;
pub mod settings;

pub use paths::PathManager;
pub use settings::Settings;

/// Load environment variables from .env files.
/// Loads ./.env (project directory), then ~/.env (home directory).
/// Values already present in the process environment are never overwritten, so
/// the project file wins over the home file.
pub fn load_env_file() {
    dotenv::dotenv().ok();

    if let Some(home) = dirs::home_dir() {
        dotenv::from_path(home.join(".env")).ok();
    }
}
