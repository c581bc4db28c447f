/// Parameters accepted by `Manager::create_image_task`. Construct with the
/// required fields set and `..Default::default()` for the rest, mirroring the
/// source's keyword-argument call sites.
#[derive(Debug, Clone)]
pub struct CreateImageTaskParams {
    pub subtype: String,
    pub prompt: String,
    pub aspect_ratio: String,
    pub provider: String,
    pub resolution: Option<String>,
    pub reference_images: Option<String>,
    pub output_dir: Option<String>,
    pub priority: i64,
    pub max_retries: i64,
    pub timeout_seconds: i64,
    pub ttl_seconds: i64,
    pub depends_on: Option<String>,
    pub project_id: Option<String>,
    pub shot_id: Option<String>,
    pub shot_sequence: Option<i64>,
    pub slot: Option<i64>,
}

impl Default for CreateImageTaskParams {
    fn default() -> Self {
        Self {
            subtype: String::new(),
            prompt: String::new(),
            aspect_ratio: String::new(),
            provider: String::new(),
            resolution: None,
            reference_images: None,
            output_dir: None,
            priority: 100,
            max_retries: 3,
            timeout_seconds: 300,
            ttl_seconds: 3600,
            depends_on: None,
            project_id: None,
            shot_id: None,
            shot_sequence: None,
            slot: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateVideoTaskParams {
    pub subtype: String,
    pub prompt: String,
    pub aspect_ratio: String,
    pub provider: String,
    pub resolution: Option<String>,
    pub reference_images: Option<String>,
    pub duration: i64,
    pub output_dir: Option<String>,
    pub priority: i64,
    pub max_retries: i64,
    pub timeout_seconds: i64,
    pub ttl_seconds: i64,
    pub depends_on: Option<String>,
    pub project_id: Option<String>,
    pub shot_id: Option<String>,
    pub shot_sequence: Option<i64>,
}

impl Default for CreateVideoTaskParams {
    fn default() -> Self {
        Self {
            subtype: String::new(),
            prompt: String::new(),
            aspect_ratio: String::new(),
            provider: String::new(),
            resolution: None,
            reference_images: None,
            duration: genqueue_model::video::DEFAULT_DURATION_SECONDS,
            output_dir: None,
            priority: 100,
            max_retries: 3,
            timeout_seconds: 600,
            ttl_seconds: 7200,
            depends_on: None,
            project_id: None,
            shot_id: None,
            shot_sequence: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateAudioTaskParams {
    pub text: String,
    pub provider: String,
    pub voice_ref: Option<String>,
    pub emotion: Option<String>,
    pub emotion_intensity: Option<String>,
    pub speed: f64,
    pub output_dir: Option<String>,
    pub priority: i64,
    pub max_retries: i64,
    pub timeout_seconds: i64,
    pub ttl_seconds: i64,
    pub depends_on: Option<String>,
    pub project_id: Option<String>,
    pub shot_id: Option<String>,
    pub shot_sequence: Option<i64>,
    pub dialogue_index: Option<i64>,
}

impl Default for CreateAudioTaskParams {
    fn default() -> Self {
        Self {
            text: String::new(),
            provider: String::new(),
            voice_ref: None,
            emotion: None,
            emotion_intensity: None,
            speed: genqueue_model::audio::DEFAULT_SPEED,
            output_dir: None,
            priority: 100,
            max_retries: 3,
            timeout_seconds: 120,
            ttl_seconds: 3600,
            depends_on: None,
            project_id: None,
            shot_id: None,
            shot_sequence: None,
            dialogue_index: None,
        }
    }
}
