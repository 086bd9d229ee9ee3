//! Configuration loading tests

use super::*;
use figment::Jail;
use std::io::Write;

#[test]
fn test_config_loads_defaults() {
    Jail::expect_with(|_jail| {
        let config = EngineConfig::load().expect("Should load default config");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.splitting.unsized_leaf_size, 1024);
        assert_eq!(config.splitting.tasks_per_worker, 4);
        assert_eq!(config.scheduler.thread_percentage, 100);
        Ok(())
    });
}

#[test]
fn test_repo_config_file_overrides_defaults() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "streamfork.toml",
            r#"
                [scheduler]
                parallelism = 3

                [splitting]
                leaf_threshold = 64
            "#,
        )?;

        let config = EngineConfig::load().expect("Should load repo config");
        assert_eq!(config.scheduler.parallelism, 3);
        assert_eq!(config.splitting.leaf_threshold, 64);
        // Untouched values keep their defaults
        assert_eq!(config.splitting.unsized_leaf_size, 1024);
        Ok(())
    });
}

#[test]
fn test_environment_has_highest_priority() {
    Jail::expect_with(|jail| {
        jail.create_file("streamfork.toml", "[scheduler]\nparallelism = 3\n")?;
        jail.set_env("STREAMFORK_SCHEDULER__PARALLELISM", "6");

        let config = EngineConfig::load().expect("Should load with env override");
        assert_eq!(config.scheduler.parallelism, 6);
        assert_eq!(config.resolved_parallelism(), 6);
        Ok(())
    });
}

#[test]
fn test_invalid_values_are_rejected() {
    Jail::expect_with(|jail| {
        jail.set_env("STREAMFORK_SCHEDULER__THREAD_PERCENTAGE", "0");
        assert!(EngineConfig::load().is_err());
        Ok(())
    });
}

#[test]
fn test_load_from_explicit_path() {
    // Jail serializes access to the process environment with the other tests
    Jail::expect_with(|_jail| {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[splitting]\nunsized_leaf_size = 256").unwrap();

        let config = EngineConfig::load_from(file.path()).expect("Should load explicit file");
        assert_eq!(config.splitting.unsized_leaf_size, 256);
        Ok(())
    });
}

#[test]
fn test_load_from_missing_path_fails() {
    let result = EngineConfig::load_from("definitely/not/here.toml");
    assert!(result.is_err());
}

#[test]
fn test_validate_rejects_zero_sizes() {
    let mut config = EngineConfig::default();
    config.splitting.unsized_leaf_size = 0;
    assert!(matches!(config.validate(), Err(StreamError::Config { .. })));

    let mut config = EngineConfig::default();
    config.splitting.tasks_per_worker = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_resolved_parallelism_is_positive() {
    let config = EngineConfig::default();
    assert!(config.resolved_parallelism() >= 1);
    assert_eq!(EngineConfig::with_parallelism(5).resolved_parallelism(), 5);
}
