use super::app::App;
use anyhow::Result;
use waypoint_core::checkpoint::SnapshotType;

pub fn checkpoint(app: &App, session_id: &str, description: &str, manual: bool) -> Result<()> {
    let snapshot_type = if manual {
        SnapshotType::Manual
    } else {
        SnapshotType::Auto
    };
    let mut manager = app.window(session_id)?;
    let id = manager.create_recovery_point(description, snapshot_type, None)?;
    println!("✓ Checkpoint created: {id}");
    println!("📋 {} recovery point(s) kept", manager.recovery_points().len());
    Ok(())
}

pub fn list(
    app: &App,
    session_id: &str,
    snapshot_type: Option<SnapshotType>,
    limit: usize,
) -> Result<()> {
    let manager = app.window(session_id)?;
    let points = manager.recent_recovery_points(snapshot_type, limit);
    if points.is_empty() {
        println!("No local recovery points for {session_id}.");
        return Ok(());
    }
    println!("📋 Local recovery points for {session_id}:");
    for point in &points {
        println!(
            "   {}  {:<6} {}  {}",
            point.id,
            point.snapshot_type.as_str(),
            point.timestamp.to_rfc3339(),
            point.description
        );
    }
    Ok(())
}

pub fn restore(app: &App, session_id: &str, recovery_point_id: &str) -> Result<()> {
    let mut manager = app.window(session_id)?;
    if !manager.restore_from_recovery_point(recovery_point_id) {
        anyhow::bail!("Could not restore from recovery point {recovery_point_id}");
    }
    println!("✅ Restored from {recovery_point_id}");
    Ok(())
}

pub fn clear(app: &App, session_id: &str, snapshot_type: Option<SnapshotType>) -> Result<()> {
    let mut manager = app.window(session_id)?;
    manager.clear_recovery_points(snapshot_type);
    println!(
        "✓ Cleared; {} recovery point(s) remain",
        manager.recovery_points().len()
    );
    Ok(())
}
