//! The `utils` module provides shared definitions used across `rabbitpub`:
//! the error taxonomy for each layer and the tracing subscriber setup.

pub mod error;
pub mod logging;

#[cfg(test)]
mod tests {
    use super::logging;
    use serial_test::serial;

    #[test]
    fn level_names_are_normalized() {
        assert_eq!(logging::level("WARNING"), "warn");
        assert_eq!(logging::level("Debug"), "debug");
        assert_eq!(logging::level("verbose"), "info");
    }

    #[test]
    #[serial]
    fn rust_log_overrides_cli_level() {
        temp_env::with_var("RUST_LOG", Some("rabbitpub=trace"), || {
            assert_eq!(logging::filter("error").to_string(), "rabbitpub=trace");
        });
    }

    #[test]
    #[serial]
    fn cli_level_applies_without_rust_log() {
        temp_env::with_var_unset("RUST_LOG", || {
            assert_eq!(logging::filter("warning").to_string(), "warn");
            // Repeated init must not panic.
            logging::init("debug");
            logging::init("debug");
        });
    }
}
