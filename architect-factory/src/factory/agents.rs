//! The seven agent roles.
//!
//! Each role pins a system prompt and a temperature, builds its user prompt
//! from the context it is handed, and calls the completion backend once.
//! Roles never call each other; the orchestrator sequences them.

use chrono::Utc;

use crate::error::{Error, Result};
use crate::events::Log;
use crate::fallback::{self, FallbackStore};
use crate::llm::Completion;
use crate::project::{CycleOutcome, CycleStatus, Idea, Persistence, ProjectRecord, ReviewResult};
use crate::shutdown::Shutdown;
use crate::store::RecordStore;

/// How much combined code QA gets to see, in characters.
pub const QA_INPUT_LIMIT: usize = 3000;

/// Agent identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Scout,
    Ui,
    Logic,
    Integrator,
    Growth,
    Qa,
    Closer,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Scout,
        Role::Ui,
        Role::Logic,
        Role::Integrator,
        Role::Growth,
        Role::Qa,
        Role::Closer,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Role::Scout => "scout",
            Role::Ui => "ui",
            Role::Logic => "logic",
            Role::Integrator => "integrator",
            Role::Growth => "growth",
            Role::Qa => "qa",
            Role::Closer => "closer",
        }
    }

    /// Sampling temperature: exploratory roles run hot, precision roles cold.
    /// The Closer never talks to the model.
    pub fn temperature(self) -> Option<f32> {
        match self {
            Role::Scout => Some(0.9),
            Role::Growth => Some(0.8),
            Role::Ui => Some(0.5),
            Role::Logic => Some(0.4),
            Role::Integrator => Some(0.3),
            Role::Qa => Some(0.2),
            Role::Closer => None,
        }
    }

    pub fn system_prompt(self) -> Option<&'static str> {
        match self {
            Role::Scout => Some(SCOUT_SYSTEM),
            Role::Ui => Some(UI_SYSTEM),
            Role::Logic => Some(LOGIC_SYSTEM),
            Role::Integrator => Some(INTEGRATOR_SYSTEM),
            Role::Growth => Some(GROWTH_SYSTEM),
            Role::Qa => Some(QA_SYSTEM),
            Role::Closer => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

const SCOUT_SYSTEM: &str = r#"You are a market intelligence analyst. Your job is to find profitable app ideas.
Analyze current trends in: AI tools, crypto, social media, productivity.
Respond with ONLY a JSON object, no prose and no code fences:
{"name": "App Name", "problem": "What problem it solves", "solution": "Technical solution", "stack": "React Native|Web", "monetization": "How to make money"}"#;

const SCOUT_USER: &str = "Find a NEW app idea that can be built in 24h and monetized immediately. Focus on viral potential.";

const UI_SYSTEM: &str = r#"You are a senior React Native UI developer.
Generate COMPLETE React Native code for the main screen.
Use: View, Text, TouchableOpacity, StyleSheet, ScrollView.
Style: cyberpunk / modern. No placeholders."#;

const LOGIC_SYSTEM: &str = r#"You are a backend engineer specializing in React Native.
Write the business logic and state management.
Use: useState, useEffect, AsyncStorage, real API calls.
Include error handling with try/catch."#;

const INTEGRATOR_SYSTEM: &str = r#"You are a DevOps engineer.
Generate configuration files: app.json (Expo) and eas.json (build config).
Output valid JSON only."#;

const GROWTH_SYSTEM: &str = r#"You are a growth hacker with expertise in viral loops.
Create: app copy (headlines, CTAs), share mechanisms, gamification.
Output: JSON with {onboarding, cta, shareText, viralLoop}"#;

const QA_SYSTEM: &str = r#"You are a QA engineer.
Review the code for: syntax errors, missing imports, security issues.
Output: "APPROVED" or a list of issues."#;

async fn ask(llm: &dyn Completion, role: Role, user: &str) -> Result<String> {
    let (Some(system), Some(temperature)) = (role.system_prompt(), role.temperature()) else {
        return Err(Error::Validation(format!("{role} does not use the model")));
    };
    llm.complete(system, user, temperature).await
}

/// One Scout attempt: ask for an idea and parse it strictly.
pub async fn scout(llm: &dyn Completion, log: &Log) -> Result<Idea> {
    log.agent("🔍 AGENT SCOUT: Scanning market trends...");
    let raw = ask(llm, Role::Scout, SCOUT_USER).await?;
    let idea = Idea::parse(&raw)?;
    log.success(format!("✅ SCOUT: Found \"{}\"", idea.name));
    Ok(idea)
}

/// Scout until it produces a valid idea.
///
/// Malformed output is logged and retried with no upper bound; only
/// cancellation or a backend failure ends the loop early.
pub async fn scout_until_valid(
    llm: &dyn Completion,
    log: &Log,
    shutdown: &Shutdown,
) -> Result<Idea> {
    let mut attempt: u64 = 0;
    loop {
        shutdown.check()?;
        attempt += 1;
        match shutdown.guard(scout(llm, log)).await {
            Ok(idea) => return Ok(idea),
            Err(Error::Parse { message, .. }) => {
                tracing::warn!(attempt, error = %message, "Scout returned malformed idea");
                log.warning("⚠️ SCOUT: Invalid JSON, retrying...");
            }
            Err(e) => return Err(e),
        }
    }
}

pub async fn ui(llm: &dyn Completion, log: &Log, idea: &Idea) -> Result<String> {
    log.agent("🎨 AGENT UI: Designing interface...");
    let prompt = format!(
        "Create the main screen for: {}\nDescription: {}\nOutput: Full React Native component code.",
        idea.name, idea.solution
    );
    let code = ask(llm, Role::Ui, &prompt).await?;
    log.success("✅ UI: Interface generated");
    Ok(code)
}

pub async fn logic(llm: &dyn Completion, log: &Log, idea: &Idea) -> Result<String> {
    log.agent("⚙️ AGENT LOGIC: Building core engine...");
    let prompt = format!(
        "Write the logic layer for: {}\nFeatures needed: {}\nOutput: Complete JavaScript functions and hooks.",
        idea.name, idea.solution
    );
    let code = ask(llm, Role::Logic, &prompt).await?;
    log.success("✅ LOGIC: Core engine ready");
    Ok(code)
}

pub async fn integrator(llm: &dyn Completion, log: &Log, idea: &Idea) -> Result<String> {
    log.agent("🔌 AGENT INTEGRATOR: Setting up configs...");
    let prompt = format!(
        "Create config files for: {}\nStack: {}\nPlatform: Android APK via EAS Build.",
        idea.name, idea.stack
    );
    let configs = ask(llm, Role::Integrator, &prompt).await?;
    log.success("✅ INTEGRATOR: Configs ready");
    Ok(configs)
}

/// Growth output is expected to be JSON but is kept as opaque text.
pub async fn growth(llm: &dyn Completion, log: &Log, idea: &Idea) -> Result<String> {
    log.agent("📈 AGENT GROWTH: Crafting viral mechanics...");
    let prompt = format!(
        "Design growth strategy for: {}\nGoal: Maximum viral spread and user retention.",
        idea.name
    );
    let plan = ask(llm, Role::Growth, &prompt).await?;
    log.success("✅ GROWTH: Viral mechanics defined");
    Ok(plan)
}

/// First `limit` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub async fn qa(llm: &dyn Completion, log: &Log, combined_code: &str) -> Result<ReviewResult> {
    log.agent("🔍 AGENT QA: Running quality checks...");
    let prompt = format!(
        "Review this code:\n{}",
        truncate_chars(combined_code, QA_INPUT_LIMIT)
    );
    let text = ask(llm, Role::Qa, &prompt).await?;
    let review = ReviewResult { text };
    if review.approved() {
        log.success("✅ QA: All checks passed");
    } else {
        log.success("✅ QA: Issues found");
    }
    Ok(review)
}

/// Persist the record: primary store once, then the local fallback once.
pub async fn closer(
    store: &dyn RecordStore,
    fallback: &dyn FallbackStore,
    log: &Log,
    record: ProjectRecord,
) -> Result<CycleOutcome> {
    log.agent("📦 AGENT CLOSER: Packaging project...");

    let persisted_to = match store.insert_project(&record).await {
        Ok(_) => {
            log.success("✅ CLOSER: Project saved to record store");
            Persistence::Primary
        }
        Err(e) => {
            tracing::warn!(error = %e, project = %record.name, "Primary insert failed");
            log.warning(format!(
                "⚠️ CLOSER: DB save failed ({e}), using local storage"
            ));
            let key = fallback::project_key();
            let written = record.to_json().and_then(|json| fallback.put(&key, &json));
            if let Err(e) = written {
                log.error(format!("❌ CLOSER: Local save failed: {e}"));
                return Err(e);
            }
            log.success(format!("✅ CLOSER: Project buffered locally as {key}"));
            Persistence::Fallback
        }
    };

    Ok(CycleOutcome {
        status: CycleStatus::Completed,
        timestamp: Utc::now(),
        project: record,
        persisted_to,
    })
}
