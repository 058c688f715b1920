//! Scripted adapters and a temp-dir engine for tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use tempfile::TempDir;

use crate::{
    camera::{testing::png_frame, Camera, ImageSource},
    db::{Database, NewSpot, Spot},
    error::AdapterError,
    vision::{RawVerdict, VisionClassifier},
};

use super::{EngineConfig, SpotEngine};

pub(crate) struct ScriptedCamera {
    default_reply: Result<Vec<u8>, AdapterError>,
    per_ref: HashMap<String, Result<Vec<u8>, AdapterError>>,
    cameras: Vec<Camera>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedCamera {
    pub(crate) fn serving_frames() -> Self {
        Self {
            default_reply: Ok(png_frame(64, 48)),
            per_ref: HashMap::new(),
            cameras: Vec::new(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(error: AdapterError) -> Self {
        Self {
            default_reply: Err(error),
            ..Self::serving_frames()
        }
    }

    pub(crate) fn with_reply(
        mut self,
        source_ref: &str,
        reply: Result<Vec<u8>, AdapterError>,
    ) -> Self {
        self.per_ref.insert(source_ref.to_string(), reply);
        self
    }

    pub(crate) fn with_cameras(mut self, cameras: Vec<Camera>) -> Self {
        self.cameras = cameras;
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageSource for ScriptedCamera {
    async fn fetch(&self, source_ref: &str) -> Result<Vec<u8>, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.per_ref
            .get(source_ref)
            .unwrap_or(&self.default_reply)
            .clone()
    }

    async fn list_cameras(&self) -> Result<Vec<Camera>, AdapterError> {
        Ok(self.cameras.clone())
    }
}

pub(crate) struct ScriptedClassifier {
    reply: Result<String, AdapterError>,
    delay: Duration,
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedClassifier {
    pub(crate) fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(error: AdapterError) -> Self {
        Self {
            reply: Err(error),
            ..Self::replying("")
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most classify calls observed running at the same time.
    pub(crate) fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionClassifier for ScriptedClassifier {
    async fn classify(
        &self,
        _image: &[u8],
        _mime_type: &str,
        _prompt: &str,
    ) -> Result<RawVerdict, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.reply.clone().map(|text| RawVerdict { text })
    }
}

pub(crate) struct TestBed {
    _dir: TempDir,
    pub(crate) engine: SpotEngine,
    pub(crate) camera: Arc<ScriptedCamera>,
    pub(crate) classifier: Arc<ScriptedClassifier>,
}

impl TestBed {
    pub(crate) fn new(camera: ScriptedCamera, classifier: ScriptedClassifier) -> Self {
        Self::with_config(camera, classifier, EngineConfig::default())
    }

    pub(crate) fn with_config(
        camera: ScriptedCamera,
        classifier: ScriptedClassifier,
        config: EngineConfig,
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("spots.sqlite3")).unwrap();
        let camera = Arc::new(camera);
        let classifier = Arc::new(classifier);
        let engine = SpotEngine::new(db, camera.clone(), classifier.clone(), config);
        Self {
            _dir: dir,
            engine,
            camera,
            classifier,
        }
    }

    pub(crate) async fn spot(&self, name: &str, source_ref: &str) -> Spot {
        self.engine
            .create_spot(NewSpot {
                id: None,
                name: name.into(),
                description: String::new(),
                image_source_ref: source_ref.into(),
            })
            .await
            .unwrap()
    }
}
