use super::app::App;
use anyhow::{Context, Result};
use serde_json::Value;
use waypoint_application::session::SaveStateRequest;
use waypoint_core::checkpoint::{RecoveryKind, StoredRecoveryPoint};
use waypoint_core::session::{Session, SessionRefs};
use waypoint_core::state::StateEnvelope;

pub struct SaveStateArgs {
    pub json: String,
    pub session: Option<String>,
    pub description: Option<String>,
    pub kind: Option<RecoveryKind>,
    pub tags: Vec<String>,
    pub refs: SessionRefs,
}

fn parse_json(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("Not valid JSON: {raw}"))
}

pub async fn start(app: &App, refs: SessionRefs) -> Result<()> {
    let outcome = app.lifecycle().await?.start(app.ctx(), refs, None).await?;
    println!("✅ Session started: {}", outcome.session.id);
    println!("📋 Recovery point: {}", outcome.recovery_point.id);
    Ok(())
}

pub async fn pause(app: &App, session_id: &str) -> Result<()> {
    let outcome = app
        .lifecycle()
        .await?
        .pause(app.ctx(), session_id, None)
        .await?;
    println!("⏸  Session paused: {}", outcome.session.id);
    Ok(())
}

pub async fn resume(app: &App, session_id: &str) -> Result<()> {
    let outcome = app
        .lifecycle()
        .await?
        .resume(app.ctx(), session_id, None)
        .await?;
    println!("▶  Session resumed: {}", outcome.session.id);
    Ok(())
}

pub async fn complete(app: &App, session_id: &str) -> Result<()> {
    let outcome = app
        .lifecycle()
        .await?
        .complete(app.ctx(), session_id, None)
        .await?;
    println!("✅ Session completed: {}", outcome.session.id);
    println!("   Total:  {} min", outcome.total_duration);
    println!("   Active: {} min", outcome.active_duration);
    Ok(())
}

pub async fn context(
    app: &App,
    session_id: &str,
    raw: &str,
    description: Option<String>,
) -> Result<()> {
    let context = parse_json(raw)?;
    let outcome = app
        .lifecycle()
        .await?
        .save_context(app.ctx(), session_id, context, description)
        .await?;
    println!("✓ Context saved for {}", outcome.session.id);
    Ok(())
}

pub async fn save_state(app: &App, args: SaveStateArgs) -> Result<()> {
    let state = StateEnvelope::context(parse_json(&args.json)?);
    let tags = (!args.tags.is_empty()).then_some(args.tags);
    let point = app
        .lifecycle()
        .await?
        .save_state(
            app.ctx(),
            SaveStateRequest {
                session_id: args.session,
                state,
                description: args.description,
                kind: args.kind,
                refs: args.refs,
                tags,
                metadata: None,
            },
        )
        .await?;
    println!("✓ Recovery point saved: {}", point.id);
    Ok(())
}

pub async fn status(app: &App, session_id: Option<&str>, json: bool) -> Result<()> {
    let service = app.lifecycle().await?;
    match session_id {
        Some(id) => {
            let session = service.get(app.ctx(), id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&session)?);
            } else {
                print_session(&session);
            }
        }
        None => {
            let sessions = service.list_sessions(app.ctx()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&sessions)?);
            } else if sessions.is_empty() {
                println!("No sessions yet.");
            } else {
                println!("📋 Sessions:");
                for session in &sessions {
                    println!(
                        "   {}  {:<9} started {}",
                        session.id,
                        session.status.to_string(),
                        session.started_at.to_rfc3339()
                    );
                }
            }
        }
    }
    Ok(())
}

pub async fn points(app: &App, session_id: &str) -> Result<()> {
    let points = app
        .lifecycle()
        .await?
        .list_recovery_points(app.ctx(), session_id)
        .await?;
    if points.is_empty() {
        println!("No recovery points for {session_id}.");
        return Ok(());
    }
    println!("📋 Recovery points for {session_id}:");
    for point in &points {
        print_point(point);
    }
    Ok(())
}

fn print_session(session: &Session) {
    println!("📋 Session {}", session.id);
    println!("   Status:      {}", session.status);
    println!("   Started:     {}", session.started_at.to_rfc3339());
    println!("   Last active: {}", session.last_active_at.to_rfc3339());
    println!("   Entries:     {}", session.time_entries.len());
    println!("   Work:        {} min", session.work_minutes());
    if let (Some(total), Some(active)) = (session.total_duration, session.active_duration) {
        println!("   Completed:   {total} min total, {active} min active");
    }
}

fn print_point(point: &StoredRecoveryPoint) {
    println!(
        "   {}  {:<6} {}  {}",
        point.id,
        point.kind.as_str(),
        point.created_at.to_rfc3339(),
        point.description.as_deref().unwrap_or("-")
    );
}
