use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use mentor_core::{ClientConfig, MentorClient, SessionContext};
use mentor_plan::{CorrectionOrchestrator, RunState, VersionDiff};
use mentor_session::SessionSupervisor;
use mentor_types::{ExplainRequest, PlanRequest, PlanVersion, StudyPlan, VerificationSummary};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "mentor")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a verified study plan.
    Plan {
        #[arg(long, default_value = "NEET")]
        exam: String,
        #[arg(long)]
        goal: String,
        #[arg(long, default_value_t = 7)]
        days: u32,
        #[arg(long)]
        syllabus_file: Option<PathBuf>,
        /// Follow the draft/verify/fix cycle as it streams.
        #[arg(long)]
        stream: bool,
        /// Fetch the whole correction history in one response.
        #[arg(long, conflicts_with = "stream")]
        history: bool,
        /// Write the final plan as JSON.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Run an autopilot tutoring session over a saved plan.
    Autopilot {
        #[arg(long, default_value = "NEET")]
        exam: String,
        /// Session length in minutes.
        #[arg(long, default_value_t = 30)]
        duration: u32,
        #[arg(long)]
        plan_file: PathBuf,
    },
    /// Explain a topic, streaming the text as it is written.
    Explain {
        #[arg(long)]
        topic: String,
        #[arg(long, default_value = "")]
        context: String,
        #[arg(long, default_value = "medium")]
        difficulty: String,
        /// Extra notes to ground the explanation.
        #[arg(long)]
        notes_file: Option<PathBuf>,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = ClientConfig::from_env()?;
    info!(api_base = %config.api_base, cache = config.cache_url.is_some(), "client configured");
    let client = MentorClient::from_config(config);
    let mut ctx = SessionContext::default();

    match cli.command {
        Command::Plan {
            exam,
            goal,
            days,
            syllabus_file,
            stream,
            history,
            out,
        } => {
            let mut request = PlanRequest::new(exam, goal, days);
            if let Some(path) = syllabus_file {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading syllabus {}", path.display()))?;
                request = request.with_syllabus(text);
            }

            let plan = if stream {
                streamed_plan(&client, &mut ctx, request).await?
            } else if history {
                plan_with_history(&client, &mut ctx, request).await?
            } else {
                let generated = client.generate_plan(&mut ctx, request).await?;
                if generated.from_cache {
                    println!("(served from cache)");
                }
                generated.plan
            };

            print_plan(&plan);
            if let Some(path) = out {
                std::fs::write(&path, serde_json::to_string_pretty(&plan)?)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("plan written to {}", path.display());
            }
        }
        Command::Autopilot {
            exam,
            duration,
            plan_file,
        } => {
            let text = std::fs::read_to_string(&plan_file)
                .with_context(|| format!("reading plan {}", plan_file.display()))?;
            let plan: serde_json::Value = serde_json::from_str(&text).context("plan file is not JSON")?;
            ctx.set_plan(exam, plan);

            let supervisor = client.start_autopilot(&ctx, duration).await?;
            drive_autopilot(&supervisor).await?;
        }
        Command::Explain {
            topic,
            context,
            difficulty,
            notes_file,
        } => {
            let mut request = ExplainRequest::new(topic, context).with_difficulty(difficulty);
            if let Some(path) = notes_file {
                let notes = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading notes {}", path.display()))?;
                request = request.with_attached_context(notes);
            }

            let mut text = client.stream_explanation(&request).await?;
            let mut stdout = tokio::io::stdout();
            while let Some(piece) = text.next().await {
                stdout.write_all(piece?.as_bytes()).await?;
                stdout.flush().await?;
            }
            stdout.write_all(b"\n").await?;
        }
    }

    Ok(())
}

async fn streamed_plan(
    client: &MentorClient,
    ctx: &mut SessionContext,
    request: PlanRequest,
) -> anyhow::Result<StudyPlan> {
    let mut orchestrator = CorrectionOrchestrator::new();
    let mut view = orchestrator.subscribe();
    let cancel = CancellationToken::new();

    let printer = tokio::spawn(async move {
        let mut label = String::new();
        let mut state = RunState::NoVersions;
        while view.changed().await.is_ok() {
            let current = view.borrow_and_update().clone();
            if !current.label.is_empty() && current.label != label {
                println!("… {}", current.label);
                label = current.label;
            }
            if current.state != state {
                let latest = current.versions.len();
                match current.state {
                    RunState::Verifying => println!("draft v{latest} received, verifying"),
                    RunState::Fixing => println!("v{latest} failed verification, revising"),
                    _ => {}
                }
                state = current.state;
            }
        }
    });

    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let result = client
        .stream_plan(ctx, request, &mut orchestrator, &cancel)
        .await;
    interrupt.abort();
    // Closing the channel ends the printer.
    drop(orchestrator);
    let _ = printer.await;

    let outcome = result?;
    print_versions(&outcome.versions);
    print_summary(&outcome.summary, outcome.self_correction_applied);
    Ok(outcome.final_plan)
}

async fn plan_with_history(
    client: &MentorClient,
    ctx: &mut SessionContext,
    request: PlanRequest,
) -> anyhow::Result<StudyPlan> {
    let run = client.generate_plan_with_history(ctx, request).await?;
    let outcome = run.outcome().context("response carried no final plan")?;
    print_versions(&outcome.versions);
    print_summary(&outcome.summary, outcome.self_correction_applied);
    Ok(outcome.final_plan)
}

async fn drive_autopilot(supervisor: &SessionSupervisor) -> anyhow::Result<()> {
    let mut view = supervisor.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut stopping = false;
    let mut printed = 0usize;
    let mut asked: Option<String> = None;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    println!(
        "autopilot session {} started, Ctrl-C to stop",
        supervisor.session_id().unwrap_or_default()
    );

    loop {
        {
            let current = view.borrow_and_update().clone();
            if let Some(snapshot) = &current.snapshot {
                for step in snapshot.steps.iter().skip(printed) {
                    if step.reasoning.is_empty() {
                        println!("[{}]", step.label());
                    } else {
                        println!("[{}] {}", step.label(), step.reasoning);
                    }
                }
                printed = snapshot.steps.len();

                if snapshot.awaiting_input && !current.answer_in_flight {
                    if let Some(question) = &snapshot.current_question {
                        if asked.as_deref() != Some(question.id.as_str()) {
                            println!("\n{}", question.text);
                            for (i, option) in question.options.iter().enumerate() {
                                println!("  {}. {}", i + 1, option);
                            }
                            asked = Some(question.id.clone());
                        }
                    }
                }

                if snapshot.status.is_terminal() {
                    println!(
                        "session {:?}: {} topics completed, average mastery {:.0}%",
                        snapshot.status, snapshot.topics_completed, current.average_mastery
                    );
                    return Ok(());
                }
            }
        }

        tokio::select! {
            _ = &mut ctrl_c, if !stopping => {
                stopping = true;
                println!("stopping…");
                supervisor.stop().await?;
            }
            changed = view.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
            }
            line = lines.next_line(), if stdin_open => {
                match line? {
                    Some(text) => match text.trim().parse::<usize>() {
                        Ok(choice) if choice >= 1 => match supervisor.submit_answer(choice - 1).await {
                            Ok(true) => println!("answer sent"),
                            Ok(false) => println!("no question is waiting for an answer"),
                            Err(err) => eprintln!("answer failed: {err}"),
                        },
                        _ => println!("enter the number of an option"),
                    },
                    None => stdin_open = false,
                }
            }
        }
    }
}

fn print_plan(plan: &StudyPlan) {
    println!("\n{} ({} days)", plan.exam_name, plan.total_days);
    if !plan.overview.is_empty() {
        println!("{}", plan.overview);
    }
    for day in &plan.schedule {
        let topics: Vec<&str> = day.topics.iter().map(|t| t.name.as_str()).collect();
        println!(
            "  Day {:>2}  {:<28} {:>4.1}h  {}",
            day.day,
            day.theme,
            day.estimated_hours,
            topics.join(", ")
        );
    }
    if !plan.critical_topics.is_empty() {
        println!("critical: {}", plan.critical_topics.join(", "));
    }
}

fn print_versions(versions: &[PlanVersion]) {
    for v in versions {
        let verdict = match &v.verification {
            Some(r) if r.is_valid => "valid".to_string(),
            Some(r) if !r.missing_topics.is_empty() => format!("missing {}", r.missing_topics.join(", ")),
            Some(_) => "invalid".to_string(),
            None => "unverified".to_string(),
        };
        let accepted = if v.accepted { "  (accepted)" } else { "" };
        println!("v{}: {verdict}{accepted}", v.version);
    }
    for pair in versions.windows(2) {
        let diff = VersionDiff::between(&pair[0], &pair[1]);
        println!(
            "v{} → v{}: +[{}] -[{}] {:+.1}h",
            diff.from,
            diff.to,
            diff.added.join(", "),
            diff.removed.join(", "),
            diff.hours_delta()
        );
    }
}

fn print_summary(summary: &VerificationSummary, corrected: bool) {
    println!(
        "coverage {}%, {} overloaded days, {} prerequisite issues, {} after {} iteration(s){}",
        summary.coverage_percent,
        summary.overloaded_days_count,
        summary.prerequisite_issues_count,
        if summary.is_valid { "valid" } else { "not valid" },
        summary.iterations_used,
        if corrected { ", self-corrected" } else { "" }
    );
}
