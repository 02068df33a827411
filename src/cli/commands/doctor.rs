//! Doctor command - verify credentials, store and configuration.

use crate::cli::Output;
use crate::config::{Settings, StoreProvider};
use crate::filter::FilterTranslator;
use crate::query::ConstructorConfig;
use console::style;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

fn print_section(title: &str, checks: &[CheckResult]) {
    println!("{}", style(title).bold());
    for check in checks {
        check.print();
    }
    println!();
}

/// Run all diagnostic checks.
pub fn run_doctor(settings: &Settings) -> anyhow::Result<()> {
    Output::header("Rosebud Doctor");
    println!();
    println!("Checking credentials and configuration...\n");

    let mut checks = Vec::new();

    let api = vec![check_openai_api_key()];
    print_section("API Configuration", &api);
    checks.extend(api);

    let store = check_store(settings);
    print_section("Document Store", &store);
    checks.extend(store);

    let config = vec![check_config_file(), check_settings(settings), check_query_schema(settings)];
    print_section("Configuration", &config);
    checks.extend(config);

    // Summary
    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before using Rosebud.",
            errors
        ));
        std::process::exit(1);
    } else if warnings > 0 {
        Output::warning(&format!("All checks passed with {} warning(s).", warnings));
    } else {
        Output::success("All checks passed! Rosebud is ready to use.");
    }

    Ok(())
}

/// Show only the start and end of a secret.
fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 12 {
        return "****".to_string();
    }
    let head: String = chars[..7].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Check if OpenAI API key is configured.
fn check_openai_api_key() -> CheckResult {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if key.starts_with("sk-") && key.len() > 20 => {
            CheckResult::ok("OPENAI_API_KEY", &format!("configured ({})", mask(&key)))
        }
        Ok(key) if key.is_empty() => CheckResult::error(
            "OPENAI_API_KEY",
            "empty",
            "Set with: export OPENAI_API_KEY='sk-...'",
        ),
        Ok(_) => CheckResult::warning(
            "OPENAI_API_KEY",
            "set but format looks unusual",
            "Expected format: sk-... (OpenAI API key)",
        ),
        Err(_) => CheckResult::error(
            "OPENAI_API_KEY",
            "not set",
            "Set with: export OPENAI_API_KEY='sk-...'",
        ),
    }
}

/// Check what the configured store needs.
fn check_store(settings: &Settings) -> Vec<CheckResult> {
    let mut results = vec![CheckResult::ok(
        "Provider",
        &settings.vector_store.provider.to_string(),
    )];

    match settings.vector_store.provider {
        StoreProvider::Pinecone => {
            results.push(match settings.pinecone_host() {
                Some(host) => CheckResult::ok("Index host", &host),
                None => CheckResult::error(
                    "Index host",
                    "not set",
                    "Set vector_store.pinecone_host or export PINECONE_INDEX_HOST",
                ),
            });
            results.push(match std::env::var("PINECONE_API_KEY") {
                Ok(key) if !key.is_empty() => {
                    CheckResult::ok("PINECONE_API_KEY", &format!("configured ({})", mask(&key)))
                }
                _ => CheckResult::error(
                    "PINECONE_API_KEY",
                    "not set",
                    "Set with: export PINECONE_API_KEY='...'",
                ),
            });
            results.push(CheckResult::ok("Namespace", &settings.vector_store.namespace));
        }
        StoreProvider::Sqlite => {
            let db_path = settings.sqlite_path();
            if db_path.exists() {
                let size = std::fs::metadata(&db_path)
                    .map(|m| format_size(m.len()))
                    .unwrap_or_else(|_| "unknown size".to_string());
                results.push(CheckResult::ok(
                    "Database",
                    &format!("{} ({})", db_path.display(), size),
                ));
            } else {
                results.push(CheckResult::warning(
                    "Database",
                    &format!("{} (not created yet)", db_path.display()),
                    "Load films with: rosebud index films.json",
                ));
            }
        }
        StoreProvider::Memory => {
            results.push(CheckResult::warning(
                "Memory store",
                "starts empty on every run",
                "Use the sqlite or pinecone provider for real catalogues",
            ));
        }
    }

    results
}

/// Check if config file exists.
fn check_config_file() -> CheckResult {
    let config_path = Settings::default_config_path();
    if config_path.exists() {
        CheckResult::ok("Config file", &format!("{}", config_path.display()))
    } else {
        CheckResult::warning(
            "Config file",
            "using defaults",
            "Create with: rosebud config init (or rosebud config edit)",
        )
    }
}

fn check_settings(settings: &Settings) -> CheckResult {
    match settings.validate() {
        Ok(()) => CheckResult::ok(
            "Settings",
            &format!(
                "top_k {}, years {}-{}, temperature {}",
                settings.retrieval.top_k,
                settings.retrieval.years[0],
                settings.retrieval.years[1],
                settings.generation.temperature
            ),
        ),
        Err(e) => CheckResult::error("Settings", &e.to_string(), "Fix with: rosebud config edit"),
    }
}

/// The few-shot examples must parse and cover every allowed operator.
fn check_query_schema(settings: &Settings) -> CheckResult {
    let [first, last] = settings.retrieval.years;
    match ConstructorConfig::movies(first, last).validate(&FilterTranslator::pinecone()) {
        Ok(()) => CheckResult::ok("Query schema", "examples cover every allowed operator"),
        Err(e) => CheckResult::error("Query schema", &e.to_string(), "Check the few-shot examples"),
    }
}

/// Format file size in human-readable format.
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_result_error() {
        let result = CheckResult::error("test", "failed", "fix it");
        assert_eq!(result.status, CheckStatus::Error);
        assert_eq!(result.hint, Some("fix it".to_string()));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
    }

    #[test]
    fn test_mask_hides_middle() {
        assert_eq!(mask("sk-abcdefghijklmnop1234"), "sk-abcd...1234");
        assert_eq!(mask("short"), "****");
    }

    #[test]
    fn test_default_settings_pass() {
        let settings = Settings::default();
        assert_eq!(check_settings(&settings).status, CheckStatus::Ok);
        assert_eq!(check_query_schema(&settings).status, CheckStatus::Ok);
    }

    #[test]
    fn test_memory_store_is_a_warning() {
        let mut settings = Settings::default();
        settings.vector_store.provider = StoreProvider::Memory;
        let results = check_store(&settings);
        assert_eq!(results[1].status, CheckStatus::Warning);
    }
}
