#[cfg(test)]
mod tests {
    use crate::config::{self, AppConfig};
    use std::env;
    use std::sync::Mutex;

    // config::load reads process-wide env vars; tests that set them take turns
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn write_temp_config(dir: &tempfile::TempDir, content: &str) -> String {
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, content).unwrap();
        // The config crate resolves the extension itself
        dir.path().join("custom").to_string_lossy().into_owned()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.url, "sqlite://data/bookclub.db");
        assert_eq!(config.uploads.dir, "uploads");
        assert_eq!(config.uploads.max_image_bytes, 5 * 1024 * 1024);
        assert_eq!(config.uploads.max_pdf_bytes, 10 * 1024 * 1024);
        assert_eq!(config.uploads.max_body_bytes, 16 * 1024 * 1024);
        assert_eq!(config.pagination.default_limit, 10);
        assert_eq!(config.pagination.max_limit, 100);
        assert!(config.cors.allows_any_origin());
        assert!(config::validate(&config).is_ok());
    }

    #[test]
    fn test_valid_config_does_not_error() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        assert!(config::load().is_ok());
    }

    #[test]
    fn test_invalid_server_port() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        env::set_var("BOOKCLUB__SERVER__PORT", "0");
        let result = config::load();
        env::remove_var("BOOKCLUB__SERVER__PORT");
        assert!(result.unwrap_err().to_string().contains("invalid server.port"));
    }

    #[test]
    fn test_config_from_env() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        env::set_var("BOOKCLUB__SERVER__HOST", "127.0.0.1");
        env::set_var("BOOKCLUB__SERVER__PORT", "4000");
        env::set_var("BOOKCLUB__UPLOADS__DIR", "/srv/bookclub/uploads");
        env::set_var("BOOKCLUB__CORS__ALLOWED_ORIGINS", "http://localhost:5173,https://books.example");

        let result = config::load();

        env::remove_var("BOOKCLUB__SERVER__HOST");
        env::remove_var("BOOKCLUB__SERVER__PORT");
        env::remove_var("BOOKCLUB__UPLOADS__DIR");
        env::remove_var("BOOKCLUB__CORS__ALLOWED_ORIGINS");

        let config = result.unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.uploads.dir, "/srv/bookclub/uploads");
        assert_eq!(config.cors.allowed_origins, vec!["http://localhost:5173", "https://books.example"]);
        assert!(!config.cors.allows_any_origin());
    }

    #[test]
    fn test_config_file_then_env_priority() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp_config(
            &dir,
            r#"
[server]
port = 7000

[pagination]
default_limit = 25
max_limit = 50
"#,
        );
        env::set_var("BOOKCLUB_CONFIG", &path);

        let from_file = config::load();
        env::set_var("BOOKCLUB__SERVER__PORT", "8888");
        let with_env = config::load();

        env::remove_var("BOOKCLUB_CONFIG");
        env::remove_var("BOOKCLUB__SERVER__PORT");

        let from_file = from_file.unwrap();
        assert_eq!(from_file.server.port, 7000);
        assert_eq!(from_file.pagination.default_limit, 25);
        assert_eq!(from_file.pagination.max_limit, 50);
        // Untouched sections keep the embedded defaults
        assert_eq!(from_file.uploads.dir, "uploads");

        assert_eq!(with_env.unwrap().server.port, 8888);
    }

    #[test]
    fn test_validate_rejects_inconsistent_limits() {
        let mut cfg = AppConfig::default();
        cfg.uploads.max_body_bytes = cfg.uploads.max_pdf_bytes - 1;
        let err = config::validate(&cfg).unwrap_err().to_string();
        assert!(err.contains("uploads.max_body_bytes"));

        let mut cfg = AppConfig::default();
        cfg.uploads.max_image_bytes = 0;
        assert!(config::validate(&cfg).is_err());

        let mut cfg = AppConfig::default();
        cfg.uploads.dir = "  ".to_string();
        assert!(config::validate(&cfg).is_err());

        let mut cfg = AppConfig::default();
        cfg.pagination.default_limit = 200;
        let err = config::validate(&cfg).unwrap_err().to_string();
        assert!(err.contains("pagination.default_limit must be in 1..=100"));

        let mut cfg = AppConfig::default();
        cfg.pagination.max_limit = 0;
        assert!(config::validate(&cfg).is_err());
    }

    #[test]
    fn test_ensure_sqlite_parent_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("subdir/test.db");
        let db_url = format!("sqlite://{}", db_path.display());

        assert!(!db_path.parent().unwrap().exists());
        config::ensure_sqlite_parent_dir(&db_url).unwrap();
        assert!(db_path.parent().unwrap().exists());
    }

    #[test]
    fn test_ensure_sqlite_parent_dir_non_sqlite() {
        assert!(config::ensure_sqlite_parent_dir("postgres://localhost/db").is_ok());
        assert!(config::ensure_sqlite_parent_dir("sqlite::memory:").is_ok());
    }
}
