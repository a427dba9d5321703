//! Terminal rendering for the prodpilot CLI.
//!
//! Status lines, routing decisions, the agent table and the trace of a
//! coordination run. Colors are dropped with `--no-color`.

use crate::agents::{AgentDescriptor, RoutingDecision};
use crate::types::{AgentInteraction, CoordinationFailure, CoordinationResult};
use owo_colors::OwoColorize;

const COLUMN: usize = 14;

/// Output style configuration
pub struct Output {
    pub colored: bool,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    pub fn new() -> Self {
        Self { colored: true }
    }

    pub fn no_color() -> Self {
        Self { colored: false }
    }

    pub fn banner(&self) {
        let version = format!("v{}", env!("CARGO_PKG_VERSION"));
        if self.colored {
            println!("\n   {} {}\n", "prodpilot".bright_cyan().bold(), version.dimmed());
        } else {
            println!("\n   prodpilot {}\n", version);
        }
    }

    fn status(&self, tag: &str, symbol: &str, message: &str, paint: fn(&str) -> String) {
        if self.colored {
            println!("  {} {}", paint(symbol), paint(message));
        } else {
            println!("  [{}] {}", tag, message);
        }
    }

    pub fn success(&self, message: &str) {
        self.status("OK", "✓", message, |s| s.green().to_string());
    }

    pub fn warning(&self, message: &str) {
        self.status("WARN", "⚠", message, |s| s.yellow().to_string());
    }

    /// Errors go to stderr
    pub fn error(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "✗".red().bold(), message.red());
        } else {
            eprintln!("  [ERROR] {}", message);
        }
    }

    /// A file written by `init`
    pub fn created(&self, kind: &str, path: &str) {
        if self.colored {
            println!("  {} {} {}", "✓".green().bold(), kind.dimmed(), path.bright_white());
        } else {
            println!("  [CREATED] {} {}", kind, path);
        }
    }

    pub fn skipped(&self, path: &str, reason: &str) {
        if self.colored {
            println!("  {} {} {}", "○".yellow(), path.dimmed(), format!("({})", reason).yellow());
        } else {
            println!("  [SKIPPED] {} ({})", path, reason);
        }
    }

    pub fn hint(&self, message: &str) {
        if self.colored {
            println!("\n  {}", message.dimmed().italic());
        } else {
            println!("\n  [TIP] {}", message);
        }
    }

    pub fn command(&self, cmd: &str) {
        if self.colored {
            println!("     {}", format!("$ {}", cmd).bright_cyan());
        } else {
            println!("     $ {}", cmd);
        }
    }

    pub fn header(&self, title: &str) {
        if self.colored {
            println!("\n  {}", title.bright_white().bold().underline());
        } else {
            println!("\n  === {} ===", title);
        }
    }

    pub fn kv(&self, key: &str, value: &str) {
        if self.colored {
            println!("    {}: {}", key.dimmed(), value.bright_white());
        } else {
            println!("    {}: {}", key, value);
        }
    }

    /// Primary, supporting agents, mode and the rule that fired
    pub fn routing(&self, decision: &RoutingDecision) {
        self.header("Routing decision");
        self.kv("primary", &decision.primary);
        let supporting = if decision.supporting.is_empty() {
            "(none)".to_string()
        } else {
            decision.supporting.join(", ")
        };
        self.kv("supporting", &supporting);
        self.kv("mode", decision.mode.as_str());
        self.kv("rule", decision.matched_rule.as_deref().unwrap_or("(default)"));
        for warning in &decision.warnings {
            self.warning(warning);
        }
    }

    /// One row per registered agent, in registration order
    pub fn agent_table<'a>(&self, agents: impl IntoIterator<Item = &'a AgentDescriptor>) {
        self.header("Agents");
        let header = format!("{:<COLUMN$} {:<COLUMN$} Supporting", "Id", "Tier");
        if self.colored {
            println!("    {}", header.bright_white().bold());
        } else {
            println!("    {}", header);
        }
        for agent in agents {
            println!(
                "    {:<COLUMN$} {:<COLUMN$} {}",
                agent.id,
                agent.model_tier.as_str(),
                agent.default_supporting.join(",")
            );
        }
    }

    pub fn answer(&self, text: &str) {
        println!();
        for line in text.lines() {
            println!("  {}", line);
        }
        println!();
    }

    /// Mode, primary, duration and the interaction trace of a finished run
    pub fn run_summary(&self, result: &CoordinationResult) {
        let title = format!(
            "{} mode · primary {} · {} ms",
            result.mode, result.primary_agent_id, result.duration_ms
        );
        if self.colored {
            println!("\n  {}", title.cyan().bold());
        } else {
            println!("\n  --- {} ---", title);
        }
        self.trace(&result.interactions);
        if result.degraded {
            self.warning("Degraded result: some supporting agents did not contribute");
        }
        for warning in &result.warnings {
            self.warning(warning);
        }
    }

    /// The failure and whatever interactions completed before it
    pub fn run_failure(&self, failure: &CoordinationFailure) {
        self.error(&failure.to_string());
        self.trace(&failure.interactions);
    }

    fn trace(&self, interactions: &[AgentInteraction]) {
        for interaction in interactions {
            self.interaction(interaction);
        }
    }

    /// One interaction as a single line
    pub fn interaction(&self, interaction: &AgentInteraction) {
        println!("    {}", self.interaction_line(interaction));
    }

    fn interaction_line(&self, interaction: &AgentInteraction) -> String {
        let round = interaction
            .round
            .map(|r| format!(" r{}", r))
            .unwrap_or_default();
        let line = format!(
            "{} → {}{} ({} ms)",
            interaction.from_agent, interaction.to_agent, round, interaction.duration_ms
        );

        match (&interaction.error, self.colored) {
            (None, true) => format!("{} {}", "✓".green(), line),
            (None, false) => format!("[OK] {}", line),
            (Some(e), true) => format!("{} {} {}", "✗".red(), line, e.red()),
            (Some(e), false) => format!("[FAILED] {} {}", line, e),
        }
    }
}
