//! Integration tests for loading an engine configuration file

use skein_engine::vm::ConfigError;
use skein_engine::{EngineConfig, Permission, Program, Value, Vm, VmError};
use std::io::Write;
use std::time::Duration;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_config_and_build_instance() {
    let file = write_config(
        r#"
[permissions]
granted = ["concurrency"]

[limits]
max_steps = 2

[context]
locale = "pt-BR"
timezone = "America/Sao_Paulo"

[worker]
queue_size = 8
job_timeout_ms = 1500
"#,
    );
    let config = EngineConfig::load(file.path()).unwrap();

    let mut b = Program::builder();
    b.function("noop", |_, _| Ok(Value::Null));
    b.permit(config.permissions().unwrap());
    let mut vm = Vm::with_options(b.build(), config.vm_options());

    assert!(vm.has_permission(Permission::CONCURRENCY));
    assert!(!vm.has_permission(Permission::TRUSTED));
    assert_eq!(vm.context().locale(), "pt-BR");
    assert_eq!(vm.context().timezone(), "America/Sao_Paulo");
    assert_eq!(vm.worker_defaults().queue_size, 8);
    assert_eq!(vm.worker_defaults().job_timeout, Duration::from_millis(1500));

    vm.run("noop", &[]).unwrap();
    vm.run("noop", &[]).unwrap();
    assert_eq!(vm.run("noop", &[]), Err(VmError::StepLimit(2)));
    assert!(vm.clone_for_async().is_err());
}

#[test]
fn test_trusted_config_grants_everything() {
    let file = write_config("[permissions]\ntrusted = true\n");
    let config = EngineConfig::load(file.path()).unwrap();
    let vm = Vm::with_options(Program::builder().build(), config.vm_options());

    assert!(vm.has_permission(Permission::TRUSTED));
    assert!(vm.has_permission(Permission::CREATE_MUTEX));

    let child = vm.clone_for_async().unwrap();
    assert!(child.trusted());
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = EngineConfig::load(&dir.path().join("skein.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}
