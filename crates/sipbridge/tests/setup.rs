//! Configuration loading, initialization and native log forwarding

use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use sipbridge::logging::{self, NATIVE_TARGET};
use sipbridge::{BridgeConfig, BridgeError, DispatchPanicPolicy, EngineApi};
use sipbridge_sys::{SIPUA_LOG_DEBUG, SIPUA_LOG_WARNING};
use sipbridge_testkit as fake;
use tempfile::NamedTempFile;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Capture {
    type Writer = Capture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn test_config_file_round_trip() -> anyhow::Result<()> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, "forward_native_logs = true")?;
    writeln!(file, "dispatch_panic = \"abort\"")?;

    let config = BridgeConfig::from_file(file.path())?;
    assert!(config.forward_native_logs);
    assert_eq!(config.dispatch_panic, DispatchPanicPolicy::Abort);
    assert!(!config.log_filter.is_empty());
    Ok(())
}

#[test]
fn test_missing_and_malformed_config_files() -> anyhow::Result<()> {
    let err = BridgeConfig::from_file("/nonexistent/sipbridge.toml").unwrap_err();
    assert!(matches!(err, BridgeError::Io(_)));

    let mut file = NamedTempFile::new()?;
    writeln!(file, "dispatch_panic = \"sometimes\"")?;
    let err = BridgeConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, BridgeError::Toml(_)));
    Ok(())
}

#[test]
fn test_init_and_reinstall() {
    let config = BridgeConfig::default();
    sipbridge::init(fake::api(), &config).unwrap();
    assert!(sipbridge::is_installed());
    assert_eq!(sipbridge::dispatch_panic_policy(), DispatchPanicPolicy::Log);

    // Same table again is fine; a different one is refused.
    sipbridge::install(fake::api()).unwrap();
    let other: &'static EngineApi = Box::leak(Box::new(*fake::api()));
    assert!(matches!(sipbridge::install(other), Err(BridgeError::AlreadyInstalled)));

    let invalid = BridgeConfig {
        log_filter: "   ".to_string(),
        ..BridgeConfig::default()
    };
    assert!(matches!(sipbridge::init(fake::api(), &invalid), Err(BridgeError::Config(_))));
}

#[test]
fn test_native_logs_are_forwarded_to_tracing() {
    sipbridge::install(fake::api()).unwrap();
    let capture = Capture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();

    logging::forward_native_logs().unwrap();
    assert!(fake::log_handler_installed());
    tracing::subscriber::with_default(subscriber, || {
        fake::emit_log("sipua-sal", SIPUA_LOG_WARNING, "registration refused");
        fake::emit_log("sipua-sal", SIPUA_LOG_DEBUG, "too chatty");
    });

    let output = capture.contents();
    assert!(output.contains("registration refused"), "{output}");
    assert!(output.contains("WARN"), "{output}");
    assert!(output.contains(NATIVE_TARGET), "{output}");
    assert!(output.contains("sipua-sal"), "{output}");
    assert!(!output.contains("too chatty"), "{output}");

    logging::stop_forwarding_native_logs().unwrap();
    assert!(!fake::log_handler_installed());
}
