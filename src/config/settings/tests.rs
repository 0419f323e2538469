use super::*;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::with_base_dir("/tmp/ragchat");
    assert_eq!(config.ollama.protocol, "http");
    assert_eq!(config.ollama.host, "localhost");
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.ollama.embedding_model, "all-minilm:latest");
    assert_eq!(config.generator.context_window, 8192);
    assert_eq!(config.generator.max_new_tokens, 200);
    assert_eq!(config.retrieval.top_k, 3);
    assert_eq!(config.chunking.chunk_size, 500);
    assert_eq!(config.chunking.chunk_overlap, 100);
    assert!(config.validate().is_ok());
}

#[test]
fn config_validation() {
    let config = Config::with_base_dir("/tmp/ragchat");

    let mut invalid_config = config.clone();
    invalid_config.ollama.protocol = "ftp".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.embedding_model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.batch_size = 1001;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.retrieval.top_k = 0;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidTopK(0))
    ));

    let mut invalid_config = config.clone();
    invalid_config.chunking.chunk_overlap = 500;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::OverlapTooLarge(500, 500))
    ));

    let mut invalid_config = config.clone();
    invalid_config.generator.default_model = "missing".to_string();
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::UnknownDefaultModel(_))
    ));

    let mut invalid_config = config;
    invalid_config.generator.max_new_tokens = 10_000;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidMaxNewTokens(10_000))
    ));
}

#[test]
fn ollama_url_generation() {
    let config = Config::with_base_dir("/tmp/ragchat");
    let url = config
        .ollama_url()
        .expect("should generate ollama_url successfully");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}

#[test]
fn toml_serialization() {
    let config = Config::with_base_dir("");
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed_config);
}

#[test]
fn partial_toml_uses_defaults() {
    let parsed: Config = toml::from_str(
        r#"
        [retrieval]
        top_k = 5

        [generator.models]
        phi-2 = "phi:latest"
        "#,
    )
    .expect("partial config should parse");

    assert_eq!(parsed.retrieval.top_k, 5);
    assert_eq!(parsed.ollama, OllamaConfig::default());
    assert_eq!(parsed.generator.runtime_model("phi-2"), Some("phi:latest"));
    assert_eq!(parsed.generator.runtime_model("gemma-2-2b"), None);
}

#[test]
fn setter_validation() {
    let mut config = OllamaConfig::default();

    assert!(config.set_protocol("https".to_string()).is_ok());
    assert!(config.set_host("example.com".to_string()).is_ok());
    assert!(config.set_port(8080).is_ok());
    assert!(config.set_embedding_model("nomic-embed-text".to_string()).is_ok());
    assert!(config.set_batch_size(128).is_ok());

    assert!(config.set_protocol("ftp".to_string()).is_err());
    assert!(config.set_port(0).is_err());
    assert!(config.set_embedding_model(String::new()).is_err());
    assert!(config.set_batch_size(0).is_err());
    assert!(config.set_batch_size(1001).is_err());

    let mut generator = GeneratorConfig::default();
    assert!(generator.set_default_model("gemma-2-2b".to_string()).is_ok());
    assert!(generator.set_default_model("unknown".to_string()).is_err());
    assert!(
        generator
            .register_model("llama".to_string(), "llama3.2:1b".to_string())
            .is_ok()
    );
    assert!(generator.set_default_model("llama".to_string()).is_ok());
    assert!(
        generator
            .register_model(String::new(), "x".to_string())
            .is_err()
    );
}

#[test]
fn save_and_load_round_trip() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::with_base_dir(temp_dir.path());
    config.retrieval.top_k = 7;
    config.ollama.port = 11500;

    config.save().expect("config should save");
    assert!(config.config_file_path().exists());

    let loaded = Config::load(temp_dir.path()).expect("config should load");
    assert_eq!(loaded, config);
    assert_eq!(loaded.get_base_dir(), temp_dir.path());
}

#[test]
fn missing_file_loads_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let loaded = Config::load(temp_dir.path()).expect("defaults should load");

    assert_eq!(loaded, Config::with_base_dir(temp_dir.path()));
}

#[test]
fn invalid_file_is_rejected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[retrieval]\ntop_k = 0\n",
    )
    .expect("should write config");

    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
fn derived_paths() {
    let config = Config::with_base_dir("/data/ragchat");

    assert_eq!(config.index_dir(), PathBuf::from("/data/ragchat/index"));
    assert_eq!(config.cache_path(), PathBuf::from("/data/ragchat/responses.db"));
    assert_eq!(config.objects_dir(), PathBuf::from("/data/ragchat/objects"));
    assert_eq!(config.uploads_dir(), PathBuf::from("/data/ragchat/uploads"));
}

#[test]
fn config_dir_resolution() {
    let from_env = resolve_config_dir(
        Some(OsString::from("/custom/home")),
        Some(PathBuf::from("/data")),
    )
    .expect("override should resolve");
    assert_eq!(from_env, PathBuf::from("/custom/home"));

    let from_data = resolve_config_dir(Some(OsString::new()), Some(PathBuf::from("/data")))
        .expect("data dir should resolve");
    assert_eq!(from_data, PathBuf::from("/data/ragchat"));

    assert!(matches!(
        resolve_config_dir(None, None),
        Err(ConfigError::DirectoryError)
    ));
}
