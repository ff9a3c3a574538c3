//! lotq CLI: operator interface to the job queue and vehicle history.

use clap::{Parser, Subcommand};
use lotq::app::App;
use lotq::config::Config;
use lotq::model::job::{Job, JobFilter, JobId, JobStatus, NewJob};
use lotq::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "lotq", about = "Background jobs and domain events for the dealer system")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the job queue worker
    Serve,
    /// Job operations
    Job {
        #[command(subcommand)]
        action: JobAction,
    },
    /// Show the field history of a vehicle
    History {
        /// Vehicle VIN
        vin: String,
    },
}

#[derive(Subcommand)]
enum JobAction {
    /// Enqueue a job
    Submit {
        /// Job type (determines handler routing)
        job_type: String,
        /// JSON payload
        #[arg(long)]
        payload: Option<String>,
        /// Retry budget override
        #[arg(long)]
        max_retries: Option<u32>,
    },
    /// List jobs
    List {
        /// Filter by status
        #[arg(long)]
        status: Option<String>,
        /// Filter by job type
        #[arg(long = "type")]
        job_type: Option<String>,
        /// Maximum jobs to show
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Show a job
    Show {
        /// Job ID (full UUID or prefix)
        id: String,
    },
    /// Enqueue a fresh copy of a failed job
    Requeue {
        /// Job ID (full UUID or prefix)
        id: String,
    },
    /// Process every eligible job once, then exit
    Drain,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve => cmd_serve().await,
        Command::Job { action } => {
            let mut config = Config::from_env()?;
            // Short-lived process: no detached passes.
            config.queue.kick_on_enqueue = false;
            let (app, _db) = App::connect(&config).await?;

            match action {
                JobAction::Submit {
                    job_type,
                    payload,
                    max_retries,
                } => cmd_job_submit(&app, job_type, payload, max_retries).await,
                JobAction::List {
                    status,
                    job_type,
                    limit,
                } => cmd_job_list(&app, status, job_type, limit).await,
                JobAction::Show { id } => cmd_job_show(&app, id).await,
                JobAction::Requeue { id } => cmd_job_requeue(&app, id).await,
                JobAction::Drain => {
                    let _guard = init_telemetry(TelemetryConfig {
                        endpoint: config.otel_endpoint.clone(),
                        service_name: "lotq".to_string(),
                        log_level: config.log_level.clone(),
                    })?;
                    let settled = app.queue.drain().await?;
                    println!("Settled {settled} job(s).");
                    Ok(())
                }
            }
        }
        Command::History { vin } => {
            let config = Config::from_env()?;
            let (app, _db) = App::connect(&config).await?;
            cmd_history(&app, &vin).await
        }
    }
}

async fn cmd_serve() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "lotq".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let (app, _db) = App::connect(&config).await?;
    app.queue.recover_interrupted().await?;

    let queue = app.queue.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        queue.shutdown();
    });

    app.queue.run().await?;
    Ok(())
}

async fn cmd_job_submit(
    app: &App,
    job_type: String,
    payload: Option<String>,
    max_retries: Option<u32>,
) -> anyhow::Result<()> {
    let payload: serde_json::Value = match payload {
        Some(json) => serde_json::from_str(&json)?,
        None => serde_json::json!({}),
    };

    let mut new = NewJob::new(&job_type, payload);
    if let Some(n) = max_retries {
        new = new.max_retries(n);
    }
    new.check_payload()?;

    let id = app.queue.enqueue_new(new).await?;
    println!("Enqueued: {id} ({job_type})");
    Ok(())
}

async fn cmd_job_list(
    app: &App,
    status: Option<String>,
    job_type: Option<String>,
    limit: i64,
) -> anyhow::Result<()> {
    let status: Option<JobStatus> = match status {
        Some(s) => Some(
            s.parse()
                .map_err(|_| anyhow::anyhow!("invalid status: {s}"))?,
        ),
        None => None,
    };

    let jobs = app
        .queue
        .list(&JobFilter {
            status,
            job_type,
            limit: Some(limit),
        })
        .await?;

    if jobs.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }

    println!(
        "{:<8}  {:<20}  {:<10}  {:<7}  CREATED",
        "ID", "TYPE", "STATUS", "RETRIES"
    );
    println!("{}", "-".repeat(72));

    for job in &jobs {
        let short_id = &job.id.to_string()[..8];
        println!(
            "{:<8}  {:<20}  {:<10}  {:<7}  {}",
            short_id,
            job.job_type,
            job.status,
            format!("{}/{}", job.retries, job.max_retries),
            job.created_at.format("%Y-%m-%d %H:%M")
        );
    }

    println!("\n{} job(s)", jobs.len());
    Ok(())
}

/// Resolve a full id or a unique prefix among recent jobs.
async fn resolve_id(app: &App, id_str: &str) -> anyhow::Result<JobId> {
    if id_str.len() >= 36 {
        return Ok(id_str.parse()?);
    }
    let jobs = app
        .queue
        .list(&JobFilter {
            limit: Some(500),
            ..JobFilter::default()
        })
        .await?;
    let matches: Vec<&Job> = jobs
        .iter()
        .filter(|job| job.id.to_string().starts_with(id_str))
        .collect();
    match matches.as_slice() {
        [] => anyhow::bail!("no job matching prefix '{id_str}'"),
        [job] => Ok(job.id),
        many => anyhow::bail!(
            "{} jobs match prefix '{id_str}', be more specific",
            many.len()
        ),
    }
}

async fn cmd_job_show(app: &App, id_str: String) -> anyhow::Result<()> {
    let id = resolve_id(app, &id_str).await?;
    let job = app.queue.get(id).await?;

    println!("ID:          {}", job.id);
    println!("Type:        {}", job.job_type);
    println!("Status:      {}", job.status);
    println!("Retries:     {}/{}", job.retries, job.max_retries);
    println!(
        "Payload:     {}",
        serde_json::to_string_pretty(&job.payload)?
    );
    println!("Run After:   {}", job.run_after);
    println!("Created:     {}", job.created_at);
    println!("Updated:     {}", job.updated_at);
    if let Some(done) = job.completed_at {
        println!("Completed:   {done}");
    }
    if let Some(ref err) = job.error {
        println!("Last Error:  {err}");
    }
    Ok(())
}

async fn cmd_job_requeue(app: &App, id_str: String) -> anyhow::Result<()> {
    let id = resolve_id(app, &id_str).await?;
    let new_id = app.queue.requeue(id).await?;
    println!("Requeued: {id} → {new_id}");
    Ok(())
}

async fn cmd_history(app: &App, vin: &str) -> anyhow::Result<()> {
    let entries = app.history.history_for(vin).await?;
    if entries.is_empty() {
        println!("No history for {vin}.");
        return Ok(());
    }

    println!(
        "{:<16}  {:<12}  {:<16}  {:<20}  NEW",
        "WHEN", "USER", "FIELD", "OLD"
    );
    println!("{}", "-".repeat(88));
    for entry in &entries {
        println!(
            "{:<16}  {:<12}  {:<16}  {:<20}  {}",
            entry.created_at.format("%Y-%m-%d %H:%M"),
            entry.user,
            entry.field,
            entry.old_value.as_deref().unwrap_or("-"),
            entry.new_value.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}
