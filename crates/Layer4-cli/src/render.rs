//! Terminal rendering for tasks, agents and lifecycle events

use serde_json::Value;
use std::time::Duration;
use tasktrack_foundation::{Agent, Task};

/// One row of the task listing
pub fn task_line(task: &Task) -> String {
    format!(
        "{} {}  {:<22} {:<10} {}  {:>8}  {}",
        task.status.symbol(),
        task.id,
        truncate(&task.name, 22),
        task.status,
        task.created_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S"),
        task.duration().map(format_duration).unwrap_or_else(|| "-".into()),
        truncate(&task.command, 60),
    )
}

/// One row of the agent listing
pub fn agent_line(agent: &Agent) -> String {
    format!(
        "{:>4}  {:<24} {:<8} {}  {}",
        agent.id,
        truncate(&agent.name, 24),
        agent.status,
        agent
            .last_heartbeat
            .map(|at| {
                at.with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            })
            .unwrap_or_else(|| "never".into()),
        agent.description.as_deref().unwrap_or(""),
    )
}

fn format_duration(d: Duration) -> String {
    if d.as_secs() >= 60 {
        format!("{}m{:02}s", d.as_secs() / 60, d.as_secs() % 60)
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}

/// Human-readable form of a wire message; unknown shapes print as-is
pub fn event_line(message: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(message) else {
        return message.to_string();
    };

    let field = |key: &str| value.get(key).and_then(Value::as_str).unwrap_or("");
    let task_id = field("task_id");

    match field("event") {
        "task_started" => format!("▶ {} started: {}", task_id, field("command")),
        "task_completed" => {
            let detail = value
                .get("result")
                .or_else(|| value.get("error"))
                .and_then(Value::as_str)
                .unwrap_or("");
            format!("■ {} {}: {}", task_id, field("status"), detail)
        }
        _ => message.to_string(),
    }
}

/// Truncate a string for display
fn truncate(s: &str, max_chars: usize) -> String {
    let s = s.replace('\n', " ");
    if s.chars().count() <= max_chars {
        s
    } else {
        let cut: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
