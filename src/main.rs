use std::sync::Arc;

use showlink::{
    common::{
        banner::{BannerInfo, Endpoints, print_banner},
        logger,
        types::AnyResult,
    },
    configs::Config,
    engine::{EngineEvent, EngineHandle, LiveEngine, ShowFile},
    gateway::{ConnectionStatus, MixerClient},
    lighting::LightingClient,
    log_println,
    tracker::MediaTrackers,
};
use tokio::{
    sync::{broadcast::error::RecvError, watch},
    task::JoinHandle,
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> AnyResult<()> {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return Err(e.into());
        }
    };
    logger::init(&config);

    let mixer_url = config.mixer.enabled.then(|| config.mixer.url());
    let lighting_addr = config.lighting.enabled.then(|| config.lighting.addr());
    print_banner(
        &BannerInfo::default(),
        &Endpoints {
            mixer: mixer_url.as_deref(),
            lighting: lighting_addr.as_deref(),
        },
    );

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    let mixer = config.mixer.enabled.then(|| {
        let mixer = MixerClient::new(config.mixer.clone());
        tasks.push(mixer.spawn());
        mixer
    });

    let trackers = mixer.as_ref().map(|mixer| {
        let trackers = MediaTrackers::new(Arc::new(mixer.clone()), config.tracker.poll_interval());
        tasks.push(trackers.attach(mixer.subscribe()));
        tasks.push(tokio::spawn(log_status("Mixer", mixer.status_changes())));
        trackers
    });

    let lighting = config.lighting.enabled.then(|| {
        let lighting = LightingClient::new(config.lighting.clone());
        tasks.push(lighting.spawn());
        tasks.push(tokio::spawn(log_status("Lighting console", lighting.status_changes())));
        lighting
    });

    let (engine, engine_task) = LiveEngine::spawn(&config.engine);
    tasks.push(tokio::spawn(log_engine_events(engine.clone())));

    if let Some(path) = &config.engine.cue_file {
        if let Err(e) = load_cue_file(&engine, trackers.as_ref(), lighting.as_ref(), path).await {
            error!("Failed to load cue file {}: {}", path, e);
        }
    }

    log_println!("showlink is running, press Ctrl-C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
    }
    info!("Shutting down");

    engine.shutdown();
    if let Some(mixer) = &mixer {
        mixer.shutdown();
    }
    if let Some(lighting) = &lighting {
        lighting.shutdown();
    }
    drop(trackers);

    let _ = engine_task.await;
    for task in tasks {
        task.abort();
    }
    Ok(())
}

async fn load_cue_file(
    engine: &EngineHandle,
    trackers: Option<&MediaTrackers>,
    lighting: Option<&LightingClient>,
    path: &str,
) -> AnyResult<()> {
    let text = tokio::fs::read_to_string(path).await?;
    let mut show = ShowFile::parse(&text)?;
    let media = std::mem::take(&mut show.media);

    match (trackers, lighting) {
        (Some(trackers), Some(lighting)) => {
            let lighting = lighting.clone();
            let armed = trackers.arm_cues(&media, move |cue| {
                if let Err(e) = lighting.fire_cue(cue) {
                    warn!("Media cue {} not fired: {}", cue, e);
                }
            });
            info!("Armed {} media cues across {} inputs", armed, media.len());
        }
        _ if !media.is_empty() => {
            warn!("Media cues need both the mixer and the lighting console, skipping them");
        }
        _ => {}
    }

    let scenes = engine.load_show(show).await?;
    info!("Loaded {} scenes from {}", scenes, path);
    Ok(())
}

async fn log_engine_events(engine: EngineHandle) {
    let mut events = engine.subscribe();
    loop {
        match events.recv().await {
            Ok(EngineEvent::Cursor { scene, cursor }) => {
                info!("Cursor {} in {}", cursor, scene.as_deref().unwrap_or("-"));
            }
            Ok(EngineEvent::Scene { scene }) => info!("Scene {}", scene),
            Ok(EngineEvent::Clock { .. }) => {}
            Err(RecvError::Lagged(n)) => {
                warn!("Engine event log lagged by {} events", n);
            }
            Err(_) => break,
        }
    }
}

async fn log_status(label: &'static str, mut status: watch::Receiver<ConnectionStatus>) {
    while status.changed().await.is_ok() {
        let current = *status.borrow_and_update();
        info!("{} {}", label, current);
    }
}
