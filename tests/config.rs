use dmxp_bus::config::{ConfigError, ENV_READERS_MAX, ENV_RINGBUF_SIZE_KB};
use dmxp_bus::{BusError, Transport, TransportConfig};
use std::collections::HashMap;

fn lookup<'a>(
    vars: &'a HashMap<&'static str, &'static str>,
) -> impl Fn(&'static str) -> Option<String> + 'a {
    move |var| vars.get(var).map(|v| v.to_string())
}

#[test]
fn defaults() {
    let config = TransportConfig::default();
    assert_eq!(config.name, "dmxp_bus");
    assert_eq!(config.ring_buffer_size_kb, 4096);
    assert_eq!(config.capacity(), 4 * 1024 * 1024);
    assert_eq!(config.max_readers, 8);
    assert_eq!(config.backpressure_sleep_ms, 5);
    assert_eq!(config.open_timeout_ms, 1000);
    assert!(config.validate().is_ok());
}

#[test]
fn partial_toml_keeps_defaults() {
    let config = TransportConfig::from_toml_str(
        r#"
        name = "market_data"
        ring_buffer_size_kb = 64
        "#,
    )
    .unwrap();
    assert_eq!(config.name, "market_data");
    assert_eq!(config.capacity(), 65536);
    assert_eq!(config.max_readers, 8);
}

#[test]
fn invalid_values_are_rejected() {
    let cases = [
        "ring_buffer_size_kb = 1000",
        "ring_buffer_size_kb = 0",
        "max_readers = 0",
        "name = \"\"",
        "name = \"a/b\"",
        // 4 GiB: padding lengths no longer fit a record header
        "ring_buffer_size_kb = 4194304",
    ];
    for text in cases {
        match TransportConfig::from_toml_str(text) {
            Err(ConfigError::Invalid(msg)) => println!("{}: {}", text, msg),
            other => panic!("{} was accepted: {:?}", text, other),
        }
    }

    let largest = TransportConfig::from_toml_str("ring_buffer_size_kb = 2097152").unwrap();
    assert_eq!(largest.capacity(), 1 << 31);

    assert!(matches!(
        TransportConfig::from_toml_str("max_readers = \"many\""),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn env_overrides_defaults() {
    let vars = HashMap::from([
        ("DMXP_BUS_NAME", "from_env"),
        (ENV_RINGBUF_SIZE_KB, "128"),
        (ENV_READERS_MAX, " 3 "),
        ("DMXP_BUS_BACKPRESSURE_SLEEP_MS", "0"),
    ]);
    let config = TransportConfig::default()
        .with_env_overrides(lookup(&vars))
        .unwrap();

    assert_eq!(config.name, "from_env");
    assert_eq!(config.ring_buffer_size_kb, 128);
    assert_eq!(config.max_readers, 3);
    assert_eq!(config.backpressure_sleep_ms, 0);
    assert_eq!(config.open_timeout_ms, 1000);
}

#[test]
fn bad_env_number() {
    let vars = HashMap::from([(ENV_READERS_MAX, "lots")]);
    match TransportConfig::default().with_env_overrides(lookup(&vars)) {
        Err(ConfigError::Env { var, value }) => {
            assert_eq!(var, ENV_READERS_MAX);
            assert_eq!(value, "lots");
        }
        other => panic!("unexpected result: {:?}", other),
    }

    // out of range for u16
    let vars = HashMap::from([(ENV_READERS_MAX, "70000")]);
    assert!(matches!(
        TransportConfig::default().with_env_overrides(lookup(&vars)),
        Err(ConfigError::Env { .. })
    ));
}

#[test]
#[serial_test::serial]
fn from_process_environment() {
    std::env::set_var(ENV_RINGBUF_SIZE_KB, "256");
    let result = TransportConfig::from_env();
    std::env::remove_var(ENV_RINGBUF_SIZE_KB);

    assert_eq!(result.unwrap().ring_buffer_size_kb, 256);
}

#[test]
fn load_from_file() {
    let path = std::env::temp_dir().join(format!("dmxp_bus_config_{}.toml", std::process::id()));
    std::fs::write(
        &path,
        "name = \"file_bus\"\nmax_readers = 2\nopen_timeout_ms = 10\n",
    )
    .unwrap();

    let config = TransportConfig::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.name, "file_bus");
    assert_eq!(config.max_readers, 2);
    assert_eq!(config.open_timeout_ms, 10);

    match TransportConfig::load(&path) {
        Err(ConfigError::Read { path: p, .. }) => assert!(p.contains("dmxp_bus_config_")),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn toml_round_trip() {
    let config = TransportConfig {
        name: "round_trip".into(),
        ring_buffer_size_kb: 512,
        max_readers: 16,
        backpressure_sleep_ms: 2,
        open_timeout_ms: 250,
    };
    let text = config.to_toml_string().unwrap();
    println!("{}", text);
    assert_eq!(TransportConfig::from_toml_str(&text).unwrap(), config);
}

#[test]
fn invalid_config_surfaces_as_bus_error() {
    let config = TransportConfig {
        max_readers: 0,
        ..TransportConfig::default()
    };
    let err = Transport::in_process(config).unwrap_err();
    assert!(matches!(err, BusError::Config(ConfigError::Invalid(_))));
    println!("{}", err);
}
