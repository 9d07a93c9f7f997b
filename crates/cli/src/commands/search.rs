// Search commands: run, start, status, stop

use anyhow::{bail, Result};
use ngsiem_core::executor::ClientFactory;
use ngsiem_core::{
    PollSchedule, QueryValidator, RemoteCommand, SearchController, SearchError, SearchRequest,
};
use serde_json::json;

use crate::output::{print_events, print_field, OutputFormat};

pub struct SearchArgs {
    pub repository: String,
    pub query: String,
    pub start: String,
    pub live: bool,
    pub max_wait: u64,
    pub poll_interval: u64,
    pub limit: usize,
    pub validate: bool,
}

pub async fn search<F>(
    controller: &SearchController<F>,
    output: OutputFormat,
    quiet: bool,
    args: SearchArgs,
) -> Result<()>
where
    F: ClientFactory,
    F::Client: RemoteCommand,
{
    if args.validate {
        let report = QueryValidator::new().validate(&args.query, false);
        if !report.valid {
            for issue in report.errors() {
                eprintln!("error: {}", issue.message);
            }
            bail!("Query failed validation; pass --no-validate to send it anyway");
        }
    }

    let schedule = PollSchedule::from_secs(args.max_wait, args.poll_interval)?;
    let request = SearchRequest::new(args.repository.clone(), args.query)
        .with_start(args.start)
        .with_live(args.live);

    if output.is_text() && !quiet {
        eprintln!(
            "Searching {} (max wait {}s, polling every {}s)...",
            args.repository, args.max_wait, args.poll_interval
        );
    }

    match controller.search_and_wait(request, schedule).await {
        Ok(completed) => {
            if output.is_text() {
                print_field("Job ID", &completed.job_id);
                print_field("Status", completed.status.as_str());
                print_field("Events", &completed.event_count.to_string());
                print_field(
                    "Elapsed",
                    &format!("{:.1}s", completed.elapsed.as_secs_f64()),
                );
                print_field("Polls", &completed.poll_count.to_string());
                println!();
                print_events(&completed.events, args.limit)?;
            } else {
                output.print_value(&completed)?;
            }
            Ok(())
        }
        Err(err @ SearchError::Timeout { .. }) => {
            let job_id = err.job_id().unwrap_or_default().to_string();
            if output.is_text() {
                print_field("Job ID", &job_id);
                print_field("Status", "TIMEOUT");
                println!();
                println!("{}", err);
                println!(
                    "Check it later with `ngsiem status {}` or cancel it with `ngsiem stop {}`.",
                    job_id, job_id
                );
            } else {
                output.print_value(&json!({
                    "job_id": job_id,
                    "status": "TIMEOUT",
                    "message": err.to_string(),
                }))?;
            }
            Err(err.into())
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn start<F>(
    controller: &SearchController<F>,
    output: OutputFormat,
    repository: String,
    query: String,
    start: String,
    live: bool,
) -> Result<()>
where
    F: ClientFactory,
    F::Client: RemoteCommand,
{
    let request = SearchRequest::new(repository, query)
        .with_start(start)
        .with_live(live);
    let started = controller.start_search(request).await?;

    if output.is_text() {
        print_field("Job ID", &started.job_id);
        print_field("Repository", &started.repository);
        print_field("Time Range", &started.start);
        print_field("Live", &started.is_live.to_string());
        print_field("Status", started.status.as_str());
    } else {
        output.print_value(&started)?;
    }
    Ok(())
}

pub async fn status<F>(
    controller: &SearchController<F>,
    output: OutputFormat,
    repository: &str,
    job_id: &str,
    limit: usize,
) -> Result<()>
where
    F: ClientFactory,
    F::Client: RemoteCommand,
{
    let result = controller.poll_search(repository, job_id).await?;

    if output.is_text() {
        print_field("Job ID", &result.job_id);
        print_field("Status", result.status.as_str());
        print_field("Events", &result.event_count.to_string());
        println!();
        if result.done {
            print_events(&result.events, limit)?;
        } else {
            println!("Search still running. Check again in a few seconds.");
        }
    } else {
        output.print_value(&result)?;
    }
    Ok(())
}

pub async fn stop<F>(
    controller: &SearchController<F>,
    output: OutputFormat,
    repository: &str,
    job_id: &str,
) -> Result<()>
where
    F: ClientFactory,
    F::Client: RemoteCommand,
{
    let stopped = controller.stop_search(repository, job_id).await?;

    if output.is_text() {
        print_field("Job ID", &stopped.job_id);
        print_field("Status", stopped.status.as_str());
        print_field("Stopped At", &stopped.stopped_at.to_rfc3339());
    } else {
        output.print_value(&stopped)?;
    }
    Ok(())
}
