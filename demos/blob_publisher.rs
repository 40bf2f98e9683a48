// Fake camera: arrow keys move a virtual ball, published as blob observations
// Left/Right = move across the image, Up/Down = farther/closer, H = hide, Q = quit
use ballchaser_runtime::config::{IMAGE_WIDTH_PX, TOPIC_VISION_BLOB};
use ballchaser_runtime::messages::BlobObservation;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::Duration;
use tracing::info;

const STEP_PX: f32 = 10.0;
const MIN_HEIGHT_PX: f32 = 8.0;
const MAX_HEIGHT_PX: f32 = 200.0;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_VISION_BLOB).await?;

    info!("Controls: Left/Right=move, Up/Down=distance, H=hide/show, Q=quit");

    enable_raw_mode()?;
    let result = run_camera(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_camera(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut blob = BlobObservation {
        cx: IMAGE_WIDTH_PX / 2.0,
        cy: 120.0,
        height: 40.0,
    };
    let mut visible = true;

    loop {
        // Poll for key with 50ms timeout (camera frame rate)
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Left if pressed => blob.cx = (blob.cx - STEP_PX).max(0.0),
                    KeyCode::Right if pressed => blob.cx = (blob.cx + STEP_PX).min(IMAGE_WIDTH_PX),
                    // Farther away = smaller blob
                    KeyCode::Up if pressed => blob.height = (blob.height - 2.0).max(MIN_HEIGHT_PX),
                    KeyCode::Down if pressed => {
                        blob.height = (blob.height + 2.0).min(MAX_HEIGHT_PX)
                    }
                    KeyCode::Char('h') if pressed => {
                        visible = !visible;
                        info!("Ball {}", if visible { "visible" } else { "hidden" });
                    }
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,
                    _ => {}
                }
            }
        }

        // A hidden ball is simply not published; the runtime sees it go stale
        if visible {
            publisher.put(serde_json::to_string(&blob)?).await?;
        }
    }

    Ok(())
}
