use anyhow::Result;
use sonicfield::{
    AudioBuffer, AudioSource, GeoCoord, PlanarPoint, Position, SonicFieldEvent, SourceId,
    SpatialEngine, SpatialEngineDesc,
};
use std::f32::consts::TAU;
use std::time::Duration;

const CANVAS_WIDTH: f32 = 800.0;
const CANVAS_HEIGHT: f32 = 600.0;

fn sine(frequency: f32, seconds: f32, sample_rate: u32) -> Result<AudioBuffer> {
    let frames = (seconds * sample_rate as f32) as usize;
    let samples = (0..frames)
        .map(|i| 0.3 * (i as f32 * frequency * TAU / sample_rate as f32).sin())
        .collect();
    Ok(AudioBuffer::from_mono(samples, sample_rate)?)
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let desc = SpatialEngineDesc::default();
    let mut engine = SpatialEngine::new(desc)?;

    let tone = SourceId::new(1);
    let chime = SourceId::new(2);
    let sources = [
        AudioSource::planar(
            tone,
            Some(sine(440.0, 1.0, 44100)?),
            PlanarPoint::new(CANVAS_WIDTH, CANVAS_HEIGHT / 2.0, CANVAS_WIDTH, CANVAS_HEIGHT),
        )
        .with_looping(true)
        .with_volume(0.8),
        // Two hundred metres north of the listener
        AudioSource::geodetic(chime, Some(sine(660.0, 0.5, 48000)?), GeoCoord::new(51.5025, -0.1200))
            .with_looping(true)
            .with_volume(0.5),
    ];

    let report = engine.start(&sources, Some(GeoCoord::new(51.5007, -0.1200)))?;
    log::info!("Started {:?}, skipped {:?}", report.started, report.skipped);

    let steps = 240;
    for step in 0..steps {
        let angle = step as f32 / steps as f32 * 2.0 * TAU;
        let x = CANVAS_WIDTH / 2.0 * (1.0 + 0.9 * angle.cos());
        let y = CANVAS_HEIGHT / 2.0 * (1.0 + 0.9 * angle.sin());
        engine.update_position(tone, Position::planar(x, y, CANVAS_WIDTH, CANVAS_HEIGHT), None)?;

        for event in engine.poll_events() {
            match event {
                SonicFieldEvent::SourcePositionChanged { .. } => {}
                other => log::info!("{:?}", other),
            }
        }
        std::thread::sleep(Duration::from_millis(25));
    }

    log::info!("Fading out");
    for step in (0..=10).rev() {
        engine.update_volume(tone, 0.08 * step as f32)?;
        std::thread::sleep(Duration::from_millis(50));
    }

    engine.cleanup();
    Ok(())
}
