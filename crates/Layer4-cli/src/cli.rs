//! Command handlers

use crate::render;
use crate::{AgentAction, Command, ConfigScope, LogAction};
use anyhow::Context;
use std::sync::Arc;
use tasktrack_foundation::{LogLevel, LogQuery, SqliteStore, TaskId, TaskStatus, TrackerConfig};
use tasktrack_task::{ChannelSink, ObserverId, ScheduleHandle, TaskManager};
use tokio::task::JoinHandle;
use tracing::debug;

/// Flags that shape how the manager is built
pub struct Options {
    pub memory: bool,
}

pub async fn dispatch(
    config: TrackerConfig,
    options: Options,
    command: Command,
) -> anyhow::Result<()> {
    if let Command::Config { save } = command {
        return show_config(&config, save);
    }

    let manager = build_manager(config, &options)?;

    match command {
        Command::Run {
            commands,
            agent,
            json,
        } => run(&manager, commands, agent, json).await,
        Command::Create {
            name,
            command,
            agent,
            start,
        } => create(&manager, name, command, agent, start).await,
        Command::Tasks { skip, limit } => {
            let tasks = manager.list(skip, limit).await?;
            if tasks.is_empty() {
                println!("No tasks.");
            }
            for task in &tasks {
                println!("{}", render::task_line(task));
            }
            Ok(())
        }
        Command::Task { id } => {
            let task = manager.get(parse_task_id(&id)?).await?;
            println!("{}", serde_json::to_string_pretty(&task)?);
            Ok(())
        }
        Command::Logs {
            level,
            source,
            task,
            skip,
            limit,
        } => {
            let mut query = LogQuery::new().with_page(skip, limit);
            if let Some(level) = level {
                query = query.with_level(level.parse::<LogLevel>()?);
            }
            if let Some(source) = source {
                query = query.with_source(source);
            }
            if let Some(task) = task {
                query = query.with_task(parse_task_id(&task)?);
            }

            for record in manager.logs(query).await? {
                println!("{:>6} {}", record.id, record.format_line());
            }
            Ok(())
        }
        Command::Log { action } => match action {
            LogAction::Show { id } => {
                let record = manager.log(id).await?;
                println!("{}", serde_json::to_string_pretty(&record)?);
                Ok(())
            }
            LogAction::Delete { id } => {
                manager.delete_log(id).await?;
                println!("Deleted log {}", id);
                Ok(())
            }
        },
        Command::Agent { action } => agent(&manager, action).await,
        Command::Config { .. } => Ok(()),
    }
}

fn show_config(config: &TrackerConfig, save: Option<ConfigScope>) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);

    match save {
        Some(ConfigScope::Global) => {
            config.save_global().context("saving global config")?;
            eprintln!("Saved global config");
        }
        Some(ConfigScope::Project) => {
            config.save_project().context("saving project config")?;
            eprintln!("Saved project config");
        }
        None => {}
    }
    Ok(())
}

async fn agent(manager: &TaskManager, action: AgentAction) -> anyhow::Result<()> {
    match action {
        AgentAction::List { skip, limit } => {
            let agents = manager.agents(skip, limit).await?;
            if agents.is_empty() {
                println!("No agents.");
            }
            for agent in &agents {
                println!("{}", render::agent_line(agent));
            }
        }
        AgentAction::Show { id } => {
            let agent = manager.agent(id).await?;
            println!("{}", serde_json::to_string_pretty(&agent)?);
        }
        AgentAction::Register { name, description } => {
            let agent = manager.register_agent(name, description).await?;
            println!("{}", render::agent_line(&agent));
        }
        AgentAction::Heartbeat { id } => {
            let agent = manager.heartbeat(id).await?;
            println!("{}", render::agent_line(&agent));
        }
        AgentAction::Delete { id } => {
            manager.remove_agent(id).await?;
            println!("Deleted agent {}", id);
        }
    }
    Ok(())
}

fn build_manager(config: TrackerConfig, options: &Options) -> anyhow::Result<TaskManager> {
    let builder = if options.memory {
        TaskManager::builder(config)
    } else {
        let data_dir = config.data_dir();
        debug!(data_dir = %data_dir.display(), "Opening task database");
        let store = SqliteStore::open(&data_dir)
            .with_context(|| format!("opening task database in {}", data_dir.display()))?;
        TaskManager::builder(config).store(Arc::new(store))
    };
    Ok(builder.build()?)
}

fn parse_task_id(id: &str) -> anyhow::Result<TaskId> {
    id.parse::<TaskId>()
        .with_context(|| format!("'{}' is not a task id", id))
}

/// Attach a stdout observer; it stops once the hub drops it
fn watch(manager: &TaskManager, json: bool) -> (ObserverId, JoinHandle<()>) {
    let (sink, mut rx) = ChannelSink::pair("stdout");
    let observer = manager.connect(Arc::new(sink));

    let printer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if json {
                println!("{}", message);
            } else {
                println!("{}", render::event_line(&message));
            }
        }
    });

    (observer, printer)
}

/// Wait for every handle, then detach the observer and drain its output
async fn finish(
    manager: &TaskManager,
    handles: Vec<ScheduleHandle>,
    watcher: (ObserverId, JoinHandle<()>),
) -> anyhow::Result<()> {
    let mut failed = 0;
    for handle in handles {
        match handle.wait().await {
            Some(task) if task.status == TaskStatus::Completed => {}
            _ => failed += 1,
        }
    }

    let (observer, printer) = watcher;
    manager.disconnect(observer);
    printer.await?;

    if failed > 0 {
        anyhow::bail!("{} task(s) did not complete", failed);
    }
    Ok(())
}

async fn run(
    manager: &TaskManager,
    commands: Vec<String>,
    agent: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let watcher = watch(manager, json);

    let mut handles = Vec::with_capacity(commands.len());
    for command in commands {
        let (_, handle) = manager.execute(command, agent.clone()).await?;
        handles.push(handle);
    }

    finish(manager, handles, watcher).await
}

async fn create(
    manager: &TaskManager,
    name: String,
    command: String,
    agent: Option<String>,
    start: bool,
) -> anyhow::Result<()> {
    if !start {
        let task = manager.create(name, command, agent).await?;
        println!("{}", render::task_line(&task));
        return Ok(());
    }

    let watcher = watch(manager, false);
    let (_, handle) = manager.submit(name, command, agent).await?;
    finish(manager, vec![handle], watcher).await
}
