//! The virtual try-on modal as an explicit state machine.
//!
//! Network work never runs inside the machine. A submit hands out a
//! [`GenerationJob`]; whoever drives the modal runs it on whatever executor it
//! likes and feeds the resulting [`GenerationOutcome`] back in. Outcomes are
//! tagged with their attempt id, so an answer that arrives after the modal was
//! closed (or for an older attempt) is dropped instead of applied.

use std::path::Path;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    client::TryOnApi,
    data_uri::{preview, strip_prefix, DataUri},
    models::TryOnRequest,
};

pub const DOWNLOAD_FILE_NAME: &str = "my-try-on.png";
pub const GENERATION_FAILED: &str = "Failed to generate try-on image";
const RESULT_MIME: &str = "image/png";
const FALLBACK_PHOTO_MIME: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalState {
    Idle,
    PhotoReady,
    Generating,
    Result,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("Please upload your photo first")]
    PhotoRequired,
    #[error("A try-on is already being generated")]
    AlreadyGenerating,
    #[error("Failed to process product image. Please try again.")]
    ProductImage,
    #[error("{0}")]
    Generation(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPhoto(DataUri);

impl UserPhoto {
    pub fn from_bytes(bytes: &[u8], mime_hint: Option<&str>) -> Self {
        let mime = image::guess_format(bytes)
            .ok()
            .map(|f| f.to_mime_type())
            .or(mime_hint)
            .unwrap_or(FALLBACK_PHOTO_MIME);
        Self(DataUri::encode(mime, bytes))
    }

    /// Reads a local photo. Touches the filesystem only.
    pub async fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let hint = image::ImageFormat::from_path(path).ok().map(|f| f.to_mime_type());
        Ok(Self::from_bytes(&bytes, hint))
    }

    pub fn data_uri(&self) -> &DataUri { &self.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLink {
    pub href: String,
    pub file_name: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    image: DataUri,
    generated_at: DateTime<Utc>,
}

impl GenerationResult {
    pub fn from_payload(payload: impl Into<String>) -> Self {
        Self { image: DataUri::from_payload(RESULT_MIME, payload), generated_at: Utc::now() }
    }

    pub fn data_uri(&self) -> &DataUri { &self.image }

    pub fn generated_at(&self) -> DateTime<Utc> { self.generated_at }

    pub fn download(&self) -> DownloadLink {
        DownloadLink { href: self.image.to_string(), file_name: DOWNLOAD_FILE_NAME }
    }

    pub fn png_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        self.image.decode()
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let bytes = self
            .png_bytes()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        tokio::fs::write(path, bytes).await
    }
}

/// One submit's worth of work: convert the product image, then ask for a try-on.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    attempt: Uuid,
    product_image: String,
    user_photo: DataUri,
}

impl GenerationJob {
    pub fn attempt(&self) -> Uuid { self.attempt }

    pub async fn run<C>(self, api: &C) -> GenerationOutcome
    where
        C: TryOnApi + ?Sized,
    {
        let result = self.generate(api).await;
        GenerationOutcome { attempt: self.attempt, result }
    }

    async fn generate<C>(&self, api: &C) -> Result<GenerationResult, WorkflowError>
    where
        C: TryOnApi + ?Sized,
    {
        let product = api.proxy_image(&self.product_image).await.map_err(|e| {
            error!("❌ Error converting product image {}: {}", self.product_image, e);
            WorkflowError::ProductImage
        })?;

        let request = TryOnRequest {
            user_image: self.user_photo.payload().to_string(),
            clothing_image: strip_prefix(&product).to_string(),
        };
        debug!(
            "Try-on request: user_image={} clothing_image={}",
            preview(&request.user_image),
            preview(&request.clothing_image)
        );

        let response = api.try_on(&request).await.map_err(|e| {
            error!("❌ Try-on error: {}", e);
            WorkflowError::Generation(e.detail().unwrap_or(GENERATION_FAILED).to_string())
        })?;

        info!("✨ Try-on generated: {}", preview(&response.generated_image));
        Ok(GenerationResult::from_payload(response.generated_image))
    }
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    attempt: Uuid,
    result: Result<GenerationResult, WorkflowError>,
}

impl GenerationOutcome {
    pub fn attempt(&self) -> Uuid { self.attempt }

    pub fn result(&self) -> &Result<GenerationResult, WorkflowError> { &self.result }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Applied,
    /// The outcome belongs to an attempt that is no longer in flight.
    Stale,
}

#[derive(Debug)]
pub enum ModalEvent {
    PhotoSelected(UserPhoto),
    GenerateRequested,
    GenerationFinished(GenerationOutcome),
    TryAnother,
    Close,
}

/// State owned by one try-on modal.
#[derive(Debug)]
pub struct TryOnModal {
    product_image: String,
    user_photo: Option<UserPhoto>,
    result: Option<GenerationResult>,
    error: Option<WorkflowError>,
    in_flight: Option<Uuid>,
}

impl TryOnModal {
    pub fn new(product_image: impl Into<String>) -> Self {
        Self { product_image: product_image.into(), user_photo: None, result: None, error: None, in_flight: None }
    }

    pub fn state(&self) -> ModalState {
        if self.in_flight.is_some() {
            ModalState::Generating
        } else if self.result.is_some() {
            ModalState::Result
        } else if self.user_photo.is_some() {
            ModalState::PhotoReady
        } else {
            ModalState::Idle
        }
    }

    pub fn product_image(&self) -> &str { &self.product_image }

    pub fn user_photo(&self) -> Option<&UserPhoto> { self.user_photo.as_ref() }

    pub fn result(&self) -> Option<&GenerationResult> { self.result.as_ref() }

    pub fn error(&self) -> Option<&WorkflowError> { self.error.as_ref() }

    pub fn error_message(&self) -> Option<String> { self.error.as_ref().map(|e| e.to_string()) }

    /// Whether the "Generate Try-On" action is currently available.
    pub fn can_generate(&self) -> bool { self.user_photo.is_some() && self.in_flight.is_none() }

    /// Dispatches one event; returns the job to run when the event starts a generation.
    pub fn handle(&mut self, event: ModalEvent) -> Option<GenerationJob> {
        match event {
            ModalEvent::PhotoSelected(photo) => self.select_photo(photo),
            ModalEvent::GenerateRequested => return self.begin_generation().ok(),
            ModalEvent::GenerationFinished(outcome) => {
                self.finish_generation(outcome);
            }
            ModalEvent::TryAnother => self.try_another(),
            ModalEvent::Close => self.close(),
        }
        None
    }

    /// Replaces the photo and clears any error. A displayed result stays.
    pub fn select_photo(&mut self, photo: UserPhoto) {
        debug!("Photo selected ({})", photo.data_uri().mime());
        self.user_photo = Some(photo);
        self.error = None;
    }

    pub fn begin_generation(&mut self) -> Result<GenerationJob, WorkflowError> {
        if self.in_flight.is_some() {
            return Err(WorkflowError::AlreadyGenerating);
        }
        let Some(photo) = &self.user_photo else {
            self.error = Some(WorkflowError::PhotoRequired);
            return Err(WorkflowError::PhotoRequired);
        };

        let attempt = Uuid::new_v4();
        info!("🎯 Starting try-on attempt {} for {}", attempt, self.product_image);
        let job = GenerationJob {
            attempt,
            product_image: self.product_image.clone(),
            user_photo: photo.data_uri().clone(),
        };
        self.in_flight = Some(attempt);
        self.error = None;
        Ok(job)
    }

    pub fn finish_generation(&mut self, outcome: GenerationOutcome) -> Delivery {
        if self.in_flight != Some(outcome.attempt) {
            warn!("Discarding outcome of stale try-on attempt {}", outcome.attempt);
            return Delivery::Stale;
        }
        self.in_flight = None;
        match outcome.result {
            Ok(result) => self.result = Some(result),
            Err(err) => self.error = Some(err),
        }
        Delivery::Applied
    }

    /// Runs a full submit in place. The modal is borrowed for the whole call, so
    /// callers that need to close mid-flight use `begin_generation` instead.
    pub async fn generate<C>(&mut self, api: &C) -> ModalState
    where
        C: TryOnApi + ?Sized,
    {
        if let Ok(job) = self.begin_generation() {
            let outcome = job.run(api).await;
            self.finish_generation(outcome);
        }
        self.state()
    }

    pub fn try_another(&mut self) {
        self.result = None;
    }

    pub fn close(&mut self) {
        if let Some(attempt) = self.in_flight.take() {
            debug!("Closing with attempt {} still in flight", attempt);
        }
        self.user_photo = None;
        self.result = None;
        self.error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;
    use crate::models::TryOnResponse;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        ProxyImage(String),
        TryOn(TryOnRequest),
    }

    struct FakeApi {
        product: Result<String, ClientError>,
        generated: Result<TryOnResponse, ClientError>,
        calls: Mutex<Vec<Call>>,
    }

    impl FakeApi {
        fn ok(generated: &str) -> Self {
            Self {
                product: Ok("data:image/png;base64,AAAA".into()),
                generated: Ok(TryOnResponse { generated_image: generated.into() }),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Call> { self.calls.lock().clone() }
    }

    #[async_trait]
    impl TryOnApi for FakeApi {
        async fn proxy_image(&self, url: &str) -> Result<String, ClientError> {
            self.calls.lock().push(Call::ProxyImage(url.to_string()));
            self.product.clone()
        }

        async fn try_on(&self, request: &TryOnRequest) -> Result<TryOnResponse, ClientError> {
            self.calls.lock().push(Call::TryOn(request.clone()));
            self.generated.clone()
        }
    }

    fn photo() -> UserPhoto { UserPhoto::from_bytes(PNG_MAGIC, None) }

    #[test]
    fn photo_mime_is_sniffed_then_hinted() {
        assert_eq!(photo().data_uri().mime(), "image/png");
        assert_eq!(UserPhoto::from_bytes(b"\xff\xd8\xff\xe0\0\x10JFIF", None).data_uri().mime(), "image/jpeg");
        assert_eq!(UserPhoto::from_bytes(b"????", Some("image/webp")).data_uri().mime(), "image/webp");
        assert_eq!(UserPhoto::from_bytes(b"????", None).data_uri().mime(), FALLBACK_PHOTO_MIME);
    }

    #[tokio::test]
    async fn submit_without_photo_makes_no_calls() {
        let api = FakeApi::ok("BBBB");
        let mut modal = TryOnModal::new("https://cdn.example/shirt.png");

        assert_eq!(modal.generate(&api).await, ModalState::Idle);
        assert_eq!(modal.error(), Some(&WorkflowError::PhotoRequired));
        assert_eq!(modal.error_message().as_deref(), Some("Please upload your photo first"));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn successful_generation_sends_stripped_payloads() {
        let api = FakeApi::ok("BBBB");
        let mut modal = TryOnModal::new("https://cdn.example/shirt.png");
        modal.select_photo(photo());
        assert_eq!(modal.state(), ModalState::PhotoReady);

        assert_eq!(modal.generate(&api).await, ModalState::Result);
        let user_payload = photo().data_uri().payload().to_string();
        assert_eq!(
            api.calls(),
            vec![
                Call::ProxyImage("https://cdn.example/shirt.png".into()),
                Call::TryOn(TryOnRequest { user_image: user_payload, clothing_image: "AAAA".into() }),
            ]
        );
        let result = modal.result().unwrap();
        assert_eq!(result.data_uri().to_string(), "data:image/png;base64,BBBB");
        assert_eq!(
            result.download(),
            DownloadLink { href: "data:image/png;base64,BBBB".into(), file_name: DOWNLOAD_FILE_NAME }
        );
        assert_eq!(modal.error(), None);
    }

    #[tokio::test]
    async fn product_image_failure_uses_fixed_message_and_skips_try_on() {
        let api = FakeApi {
            product: Err(ClientError::Status { status: 500, detail: Some("Failed to process image".into()) }),
            ..FakeApi::ok("BBBB")
        };
        let mut modal = TryOnModal::new("https://cdn.example/shirt.png");
        modal.select_photo(photo());

        assert_eq!(modal.generate(&api).await, ModalState::PhotoReady);
        assert_eq!(
            modal.error_message().as_deref(),
            Some("Failed to process product image. Please try again.")
        );
        assert_eq!(api.calls().len(), 1);
        assert!(modal.user_photo().is_some());
    }

    #[tokio::test]
    async fn backend_detail_is_surfaced_and_photo_kept() {
        let api = FakeApi {
            generated: Err(ClientError::Status { status: 404, detail: Some("model unavailable".into()) }),
            ..FakeApi::ok("BBBB")
        };
        let mut modal = TryOnModal::new("https://cdn.example/shirt.png");
        modal.select_photo(photo());

        assert_eq!(modal.generate(&api).await, ModalState::PhotoReady);
        assert_eq!(modal.error_message().as_deref(), Some("model unavailable"));
        assert_eq!(modal.user_photo(), Some(&photo()));
    }

    #[tokio::test]
    async fn transport_failure_falls_back_to_generic_message() {
        let api = FakeApi {
            generated: Err(ClientError::Transport("connection refused".into())),
            ..FakeApi::ok("BBBB")
        };
        let mut modal = TryOnModal::new("https://cdn.example/shirt.png");
        modal.select_photo(photo());

        modal.generate(&api).await;
        assert_eq!(modal.error_message().as_deref(), Some(GENERATION_FAILED));
    }

    #[tokio::test]
    async fn non_ascii_generated_payload_is_stored_not_panicked_on() {
        let payload = format!("a{}", "é".repeat(60));
        let api = FakeApi::ok(&payload);
        let mut modal = TryOnModal::new("https://cdn.example/shirt.png");
        modal.select_photo(photo());

        assert_eq!(modal.generate(&api).await, ModalState::Result);
        assert_eq!(modal.result().unwrap().data_uri().payload(), payload);
        assert!(modal.result().unwrap().png_bytes().is_err());
    }

    #[tokio::test]
    async fn new_photo_clears_error_but_keeps_result() {
        let api = FakeApi::ok("BBBB");
        let mut modal = TryOnModal::new("https://cdn.example/shirt.png");
        modal.select_photo(photo());
        modal.generate(&api).await;

        // Provoke an error while a result is on screen.
        let failing = FakeApi { product: Err(ClientError::Transport("timeout".into())), ..FakeApi::ok("CCCC") };
        modal.generate(&failing).await;
        assert!(modal.error().is_some());
        assert_eq!(modal.result().unwrap().data_uri().payload(), "BBBB");

        modal.select_photo(UserPhoto::from_bytes(b"\xff\xd8\xff\xe0", None));
        assert_eq!(modal.error(), None);
        assert_eq!(modal.result().unwrap().data_uri().payload(), "BBBB");
        assert_eq!(modal.state(), ModalState::Result);

        modal.try_another();
        assert_eq!(modal.state(), ModalState::PhotoReady);
        assert!(modal.user_photo().is_some());
    }

    #[tokio::test]
    async fn resubmitting_while_generating_is_a_no_op() {
        let mut modal = TryOnModal::new("https://cdn.example/shirt.png");
        modal.select_photo(photo());

        let job = modal.begin_generation().unwrap();
        assert_eq!(modal.state(), ModalState::Generating);
        assert!(!modal.can_generate());
        assert_eq!(modal.begin_generation().unwrap_err(), WorkflowError::AlreadyGenerating);
        assert_eq!(modal.error(), None);

        let outcome = job.run(&FakeApi::ok("BBBB")).await;
        assert_eq!(modal.finish_generation(outcome), Delivery::Applied);
        assert_eq!(modal.state(), ModalState::Result);
    }

    #[tokio::test]
    async fn outcome_after_close_is_discarded() {
        let mut modal = TryOnModal::new("https://cdn.example/shirt.png");
        modal.select_photo(photo());
        let job = modal.begin_generation().unwrap();

        modal.close();
        let outcome = job.run(&FakeApi::ok("BBBB")).await;
        assert_eq!(modal.finish_generation(outcome), Delivery::Stale);
        assert_eq!(modal.state(), ModalState::Idle);
        assert!(modal.result().is_none());
    }

    #[tokio::test]
    async fn outcome_of_an_older_attempt_is_discarded() {
        let api = FakeApi::ok("BBBB");
        let mut modal = TryOnModal::new("https://cdn.example/shirt.png");
        modal.select_photo(photo());
        let old = modal.begin_generation().unwrap();
        modal.close();
        modal.select_photo(photo());
        let current = modal.begin_generation().unwrap();
        assert_ne!(old.attempt(), current.attempt());

        assert_eq!(modal.finish_generation(old.run(&api).await), Delivery::Stale);
        assert_eq!(modal.state(), ModalState::Generating);
        assert_eq!(modal.finish_generation(current.run(&api).await), Delivery::Applied);
    }

    #[tokio::test]
    async fn close_resets_everything() {
        let api = FakeApi::ok("BBBB");
        let mut modal = TryOnModal::new("https://cdn.example/shirt.png");
        modal.select_photo(photo());
        modal.generate(&api).await;
        assert_eq!(modal.state(), ModalState::Result);

        modal.close();
        assert_eq!(modal.state(), ModalState::Idle);
        assert!(modal.user_photo().is_none());
        assert!(modal.result().is_none());
        assert!(modal.error().is_none());
        assert_eq!(modal.product_image(), "https://cdn.example/shirt.png");
    }

    #[tokio::test]
    async fn event_dispatch_drives_the_same_machine() {
        let api = FakeApi::ok("BBBB");
        let mut modal = TryOnModal::new("https://cdn.example/shirt.png");

        assert!(modal.handle(ModalEvent::GenerateRequested).is_none());
        assert_eq!(modal.error(), Some(&WorkflowError::PhotoRequired));

        assert!(modal.handle(ModalEvent::PhotoSelected(photo())).is_none());
        let job = modal.handle(ModalEvent::GenerateRequested).unwrap();
        assert!(modal.handle(ModalEvent::GenerateRequested).is_none());

        let outcome = job.run(&api).await;
        modal.handle(ModalEvent::GenerationFinished(outcome));
        assert_eq!(modal.state(), ModalState::Result);

        modal.handle(ModalEvent::TryAnother);
        assert_eq!(modal.state(), ModalState::PhotoReady);
        modal.handle(ModalEvent::Close);
        assert_eq!(modal.state(), ModalState::Idle);
    }

    #[tokio::test]
    async fn result_saves_decoded_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DOWNLOAD_FILE_NAME);
        let result = GenerationResult::from_payload("iVBORw0KGgo=");

        result.save(&path).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), result.png_bytes().unwrap());
        assert!(GenerationResult::from_payload("@@@").save(dir.path().join("bad.png")).await.is_err());
    }

    #[tokio::test]
    async fn load_reads_photo_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        std::fs::write(&path, b"not really a jpeg").unwrap();

        let loaded = UserPhoto::load(&path).await.unwrap();
        assert_eq!(loaded.data_uri().mime(), "image/jpeg");
        assert_eq!(loaded.data_uri().decode().unwrap(), b"not really a jpeg");
    }
}
