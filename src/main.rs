use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use nalgebra::{UnitQuaternion, Vector3};
use tracing::info;
use tracing_subscriber::EnvFilter;

use spatial_anchors::sim::{CallLog, CreationEvents, SimulatedEngine, SimulatedLocationProvider, SimulatedSession};
use spatial_anchors::{AnchorPayload, AnchorService, LocalizationState, SE3, Settings};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = match std::env::args().nth(1) {
        Some(path) => Settings::load(&path).with_context(|| format!("loading settings from {path}"))?,
        None => Settings::default(),
    };
    println!("Settings: {:?}", settings);

    let log = CallLog::new();
    let session = Arc::new(SimulatedSession::new());
    let location = Arc::new(SimulatedLocationProvider::new(log.clone()));
    let engine = Arc::new(SimulatedEngine::new(log.clone()));

    let service = AnchorService::with_config(
        session.clone(),
        location.clone(),
        engine.clone(),
        settings.anchors.clone(),
        settings.service.clone(),
    );
    let (_, updates) = service.localization_updates();

    // Nothing is created before the engine localizes
    let poses = [
        SE3::from_translation(Vector3::new(1.0, 0.0, 0.5)),
        SE3 {
            rotation: UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2),
            translation: Vector3::new(0.0, 2.0, 0.5),
        },
    ];
    let rejected = service.create_anchors(&poses)?;
    println!(
        "Before localization: {} of {} anchors created",
        rejected.iter().flatten().count(),
        poses.len()
    );

    engine.localize();
    let anchors: Vec<_> = service.create_anchors(&poses)?.into_iter().flatten().collect();
    println!("Created {} anchors", anchors.len());
    for anchor in &anchors {
        println!("  {} {:?}", anchor.id(), anchor.status());
    }

    // Legacy creation through the engine's creation event
    engine.configure(|b| b.creation_events = CreationEvents::Immediate);
    let extra = service.create_anchors_awaiting(&[SE3::from_translation(Vector3::new(-1.0, 0.0, 0.0))])?;
    engine.configure(|b| b.creation_events = CreationEvents::Never);
    println!("Awaited {} more anchors, tracking {}", extra.len(), service.len());

    session.pause();
    session.resume();

    // Restart; the engine localizes again shortly after starting
    let localizer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            engine.localize();
        })
    };
    service.restart()?;
    if localizer.join().is_err() {
        anyhow::bail!("localizer thread panicked");
    }
    println!("Restarted, state={:?}", service.localization_state());

    // Save payloads, tear down and restore
    let payloads: Vec<AnchorPayload> = service
        .anchors()
        .iter()
        .map(|a| SimulatedEngine::payload_for(a.id()))
        .collect();
    let destroyed = service.destroy_anchors(&service.anchors());
    println!("Destroyed {} anchors, tracking {}", destroyed, service.len());

    let restored = service.restore_anchors(&payloads)?;
    for (anchor, pose) in restored.iter().zip(poses.iter().cycle()) {
        engine.resolve(anchor.id(), *pose);
    }
    for anchor in &restored {
        println!(
            "  restored {} {:?} at {:?}",
            anchor.id(),
            anchor.status(),
            anchor.local_pose().map(|p| p.translation)
        );
    }

    let states: Vec<LocalizationState> = updates.try_iter().map(|u| u.state).collect();
    println!("Localization transitions: {:?}", states);

    service.dispose();
    info!("{} collaborator calls recorded", log.len());
    println!("Done! {} anchors left", service.len());

    Ok(())
}
