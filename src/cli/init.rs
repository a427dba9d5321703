//! Init command implementation
//!
//! Writes a starter `prodpilot.toml` and `.env.example`.

use super::output::Output;
use std::fs;
use std::path::{Path, PathBuf};

/// Result of the init operation
pub enum InitResult {
    /// Initialization completed successfully
    Success,
    /// prodpilot.toml already exists
    AlreadyExists,
    /// An error occurred during initialization
    Error(String),
}

/// Configuration for the init command
pub struct InitConfig {
    /// Directory to initialize
    pub path: PathBuf,
    /// Overwrite existing files
    pub force: bool,
}

/// Run the init command
pub fn run(config: InitConfig, output: &Output) -> InitResult {
    output.banner();
    output.header("Initializing Prodpilot");

    let base_path = &config.path;
    if let Err(e) = fs::create_dir_all(base_path) {
        output.error(&format!("Failed to create {}: {}", base_path.display(), e));
        return InitResult::Error(e.to_string());
    }

    let config_path = base_path.join("prodpilot.toml");
    if config_path.exists() && !config.force {
        output.warning("prodpilot.toml already exists!");
        output.hint("Use --force to overwrite existing files");
        return InitResult::AlreadyExists;
    }

    if let Err(e) = write_file(&config_path, STARTER_CONFIG, config.force) {
        output.error(&format!("Failed to create prodpilot.toml: {}", e));
        return InitResult::Error(e.to_string());
    }
    output.created("config", "prodpilot.toml");

    let env_path = base_path.join(".env.example");
    if env_path.exists() && !config.force {
        output.skipped(".env.example", "already exists");
    } else if let Err(e) = write_file(&env_path, ENV_EXAMPLE, config.force) {
        output.warning(&format!("Failed to create .env.example: {}", e));
    } else {
        output.created("env", ".env.example");
    }

    output.success("Project initialized");
    output.hint("Start Ollama, then try:");
    output.command("prodpilot agents list");
    output.command("prodpilot ask \"what should we prioritize next quarter?\"");

    InitResult::Success
}

fn write_file(path: &Path, content: &str, force: bool) -> std::io::Result<()> {
    if path.exists() && !force {
        return Ok(()); // Skip existing files unless force is true
    }
    fs::write(path, content)
}

/// Configuration written by `prodpilot init`
pub const STARTER_CONFIG: &str = r#"# Prodpilot configuration

[logging]
level = "info"      # trace, debug, info, warn, error
format = "pretty"   # pretty or json

# Ollama - Local inference
[providers.ollama-local]
type = "ollama"
base_url = "http://localhost:11434"
default_model = "llama3.2"

# OpenAI (requires the `openai` feature and OPENAI_API_KEY)
# [providers.openai]
# type = "openai"
# api_key_env = "OPENAI_API_KEY"
# default_model = "gpt-4o-mini"

[models.small]
provider = "ollama-local"
model = "llama3.2:1b"

[models.default]
provider = "ollama-local"
model = "llama3.2"

[tiers]
fast = "small"
standard = "default"
high_quality = "default"

[coordination]
default_mode = "collaborative"   # sequential, parallel, collaborative, debate
default_agent = "general"
per_call_timeout_secs = 60
request_timeout_secs = 0         # 0 = derived from the mode's worst case
debate_rounds = 2
debate_max_participants = 3

[context]
top_k = 5
max_history_turns = 10
budget_tokens = 3000

# Override a built-in agent
# [agents.story]
# output_format = "json"
# consults = ["validation"]

# Replace the built-in routing table (first match wins)
# [[routing.rules]]
# name = "pricing"
# agent = "strategy"
# any = ["price", "pricing"]
"#;

const ENV_EXAMPLE: &str = r#"# Prodpilot Environment Variables
# Copy this file to .env and fill in the values.

# Optional: Logging filter (overrides [logging] level)
RUST_LOG=info,prodpilot=debug

# Optional: OpenAI API key (if using the OpenAI provider)
# OPENAI_API_KEY=sk-...
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::toml_config::PilotConfig;
    use tempfile::TempDir;

    #[test]
    fn test_starter_config_is_valid() {
        let config = PilotConfig::parse(STARTER_CONFIG).expect("starter config must validate");
        assert_eq!(config.tiers.bindings().len(), 3);
    }

    #[test]
    fn test_init_creates_files() {
        let temp_dir = TempDir::new().unwrap();
        let result = run(
            InitConfig {
                path: temp_dir.path().to_path_buf(),
                force: false,
            },
            &Output::no_color(),
        );

        assert!(matches!(result, InitResult::Success));
        assert!(temp_dir.path().join("prodpilot.toml").exists());
        assert!(temp_dir.path().join(".env.example").exists());
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("prodpilot.toml");
        fs::write(&path, "# mine").unwrap();

        let result = run(
            InitConfig {
                path: temp_dir.path().to_path_buf(),
                force: false,
            },
            &Output::no_color(),
        );
        assert!(matches!(result, InitResult::AlreadyExists));
        assert_eq!(fs::read_to_string(&path).unwrap(), "# mine");

        let result = run(
            InitConfig {
                path: temp_dir.path().to_path_buf(),
                force: true,
            },
            &Output::no_color(),
        );
        assert!(matches!(result, InitResult::Success));
        assert!(fs::read_to_string(&path).unwrap().contains("[coordination]"));
    }
}
