//! Stage Pipeline Controller
//!
//! Sequences the three stages over one session: stage N requires stage N-1's
//! cached result, which is embedded verbatim into the next prompt. One stage
//! runs at a time per session (`&mut self` enforces it); re-running a stage
//! overwrites its slot but deliberately leaves downstream slots untouched so
//! earlier work is never destroyed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::gemini::{GeminiModel, GenerationService};
use crate::ingest::{self, Attachment, IngestFailure};
use crate::prompts;

/// One of the three ordered phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    CompetitorAnalysis,
    GapAnalysis,
    CreativeOutput,
}

impl Stage {
    pub fn number(&self) -> u8 {
        match self {
            Stage::CompetitorAnalysis => 1,
            Stage::GapAnalysis => 2,
            Stage::CreativeOutput => 3,
        }
    }

    /// Label used in export filenames: `Step{N}_<Label>.docx`
    pub fn export_label(&self) -> &'static str {
        match self {
            Stage::CompetitorAnalysis => "CompetitorAnalysis",
            Stage::GapAnalysis => "GapAnalysis",
            Stage::CreativeOutput => "CreativeOutput",
        }
    }
}

/// Controller state derived from the filled slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Empty,
    Stage1Done,
    Stage2Done,
    Stage3Done,
}

/// Per-session result cache: one slot per stage, overwritten on re-run,
/// cleared on reset, never persisted beyond the session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    stage1: Option<String>,
    stage2: Option<String>,
    stage3: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            stage1: None,
            stage2: None,
            stage3: None,
        }
    }

    pub fn result(&self, stage: Stage) -> Option<&str> {
        match stage {
            Stage::CompetitorAnalysis => self.stage1.as_deref(),
            Stage::GapAnalysis => self.stage2.as_deref(),
            Stage::CreativeOutput => self.stage3.as_deref(),
        }
    }

    fn set_result(&mut self, stage: Stage, text: String) {
        match stage {
            Stage::CompetitorAnalysis => self.stage1 = Some(text),
            Stage::GapAnalysis => self.stage2 = Some(text),
            Stage::CreativeOutput => self.stage3 = Some(text),
        }
    }

    fn clear_all(&mut self) {
        self.stage1 = None;
        self.stage2 = None;
        self.stage3 = None;
    }

    pub fn state(&self) -> PipelineState {
        if self.stage3.is_some() {
            PipelineState::Stage3Done
        } else if self.stage2.is_some() {
            PipelineState::Stage2Done
        } else if self.stage1.is_some() {
            PipelineState::Stage1Done
        } else {
            PipelineState::Empty
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Caller input for one stage run
#[derive(Debug, Default)]
pub struct StageInput {
    pub free_text: String,
    pub attachments: Vec<Attachment>,
}

impl StageInput {
    pub fn text(free_text: impl Into<String>) -> Self {
        Self {
            free_text: free_text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// Outcome of one completed stage run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    pub stage: Stage,
    pub text: String,
    /// Display names of attachments that made it into the request
    pub ingested: Vec<String>,
    /// Attachments that failed ingestion and were excluded
    pub failed: Vec<IngestFailure>,
}

/// The three-stage pipeline over a generation service
pub struct Pipeline<S: GenerationService> {
    service: S,
    session: Session,
    model: GeminiModel,
}

impl<S: GenerationService> Pipeline<S> {
    pub fn new(service: S, model: GeminiModel) -> Self {
        Self {
            service,
            session: Session::new(),
            model,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn model(&self) -> GeminiModel {
        self.model
    }

    pub fn set_model(&mut self, model: GeminiModel) {
        self.model = model;
    }

    /// Run stage 1 (competitor analysis). Allowed from any state; overwrites
    /// the stage-1 slot and leaves stage 2/3 slots as they are.
    pub async fn run_stage1(&mut self, input: StageInput) -> Result<StageReport> {
        let outcome = self.ingest_for_stage(Stage::CompetitorAnalysis, input.attachments).await?;
        self.check_not_starved(&input.free_text, &outcome)?;

        let instruction = prompts::compose_stage1(&input.free_text);
        self.generate_and_store(Stage::CompetitorAnalysis, instruction, outcome)
            .await
    }

    /// Run stage 2 (gap analysis). Requires a stage-1 result.
    pub async fn run_stage2(&mut self, input: StageInput) -> Result<StageReport> {
        let stage1 = self.require_result(Stage::GapAnalysis, Stage::CompetitorAnalysis)?;

        let outcome = self.ingest_for_stage(Stage::GapAnalysis, input.attachments).await?;
        self.check_not_starved(&input.free_text, &outcome)?;

        let instruction = prompts::compose_stage2(&stage1, &input.free_text);
        self.generate_and_store(Stage::GapAnalysis, instruction, outcome)
            .await
    }

    /// Run stage 3 (creative output). Requires a stage-2 result. The format
    /// instruction switches to reference-mimicking only when at least one
    /// attachment was successfully ingested.
    pub async fn run_stage3(&mut self, input: StageInput) -> Result<StageReport> {
        let stage2 = self.require_result(Stage::CreativeOutput, Stage::GapAnalysis)?;
        // Stage 1 is implied present: stage 2 cannot have run without it
        let stage1 = self.require_result(Stage::CreativeOutput, Stage::CompetitorAnalysis)?;

        let outcome = self.ingest_for_stage(Stage::CreativeOutput, input.attachments).await?;
        self.check_not_starved(&input.free_text, &outcome)?;

        let has_reference_format = !outcome.handles.is_empty();
        let instruction =
            prompts::compose_stage3(&stage1, &stage2, &input.free_text, has_reference_format);
        self.generate_and_store(Stage::CreativeOutput, instruction, outcome)
            .await
    }

    /// Clear all three slots and return to EMPTY
    pub fn reset(&mut self) {
        tracing::info!("[Pipeline] Session {} reset", self.session.id);
        self.session.clear_all();
    }

    fn require_result(&self, stage: Stage, prerequisite: Stage) -> Result<String> {
        self.session
            .result(prerequisite)
            .map(str::to_string)
            .ok_or(Error::Sequence {
                stage: stage.number(),
                missing: prerequisite.number(),
            })
    }

    async fn ingest_for_stage(
        &self,
        stage: Stage,
        attachments: Vec<Attachment>,
    ) -> Result<ingest::IngestOutcome> {
        if attachments.is_empty() {
            return Ok(ingest::IngestOutcome::default());
        }
        tracing::info!(
            "[Pipeline] Stage {}: ingesting {} attachments",
            stage.number(),
            attachments.len()
        );
        Ok(ingest::ingest_all(&self.service, attachments).await)
    }

    /// A stage with no free text whose attachments ALL failed has nothing to
    /// send; anything else proceeds with the surviving subset.
    fn check_not_starved(&self, free_text: &str, outcome: &ingest::IngestOutcome) -> Result<()> {
        if free_text.trim().is_empty() && outcome.all_failed() {
            let first = &outcome.failures[0];
            return Err(Error::ingestion(
                first.name.clone(),
                "all attachments failed and no text input was supplied",
            ));
        }
        Ok(())
    }

    async fn generate_and_store(
        &mut self,
        stage: Stage,
        instruction: String,
        outcome: ingest::IngestOutcome,
    ) -> Result<StageReport> {
        let text = self
            .service
            .generate(self.model, &instruction, &outcome.handles)
            .await?;

        self.session.set_result(stage, text.clone());
        tracing::info!(
            "[Pipeline] Stage {} complete ({} chars)",
            stage.number(),
            text.len()
        );

        Ok(StageReport {
            stage,
            text,
            ingested: outcome
                .handles
                .iter()
                .map(|h| h.display_name.clone())
                .collect(),
            failed: outcome.failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::{FileState, RemoteHandle};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Stub backend recording calls; response text echoes a marker plus the
    /// instruction so verbatim embedding can be asserted end to end.
    struct StubService {
        uploads: AtomicUsize,
        generations: AtomicUsize,
        responses: Mutex<Vec<String>>,
        fail_uploads: bool,
        fail_generation: bool,
    }

    impl StubService {
        fn new(responses: Vec<&str>) -> Self {
            Self {
                uploads: AtomicUsize::new(0),
                generations: AtomicUsize::new(0),
                responses: Mutex::new(responses.into_iter().map(String::from).collect()),
                fail_uploads: false,
                fail_generation: false,
            }
        }

        fn generations(&self) -> usize {
            self.generations.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerationService for StubService {
        async fn upload(
            &self,
            _bytes: &[u8],
            display_name: &str,
            mime_type: &str,
        ) -> crate::error::Result<RemoteHandle> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            if self.fail_uploads {
                return Err(Error::ingestion(display_name, "upload failed"));
            }
            Ok(RemoteHandle {
                name: format!("files/{}", display_name),
                uri: format!("https://example.invalid/{}", display_name),
                mime_type: mime_type.to_string(),
                display_name: display_name.to_string(),
                state: FileState::Ready,
            })
        }

        async fn generate(
            &self,
            _model: GeminiModel,
            instruction: &str,
            _handles: &[RemoteHandle],
        ) -> crate::error::Result<String> {
            self.generations.fetch_add(1, Ordering::SeqCst);
            if self.fail_generation {
                return Err(Error::generation(
                    crate::error::GenerationErrorKind::Quota,
                    "rate limited",
                ));
            }
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(format!("echo: {}", instruction))
            } else {
                Ok(responses.remove(0))
            }
        }
    }

    fn pipeline(responses: Vec<&str>) -> Pipeline<StubService> {
        Pipeline::new(StubService::new(responses), GeminiModel::Flash25)
    }

    #[tokio::test]
    async fn test_happy_path_through_all_stages() {
        let mut p = pipeline(vec!["analysis", "gaps", "briefs"]);
        assert_eq!(p.session().state(), PipelineState::Empty);

        p.run_stage1(StageInput::text("competitor copy")).await.unwrap();
        assert_eq!(p.session().state(), PipelineState::Stage1Done);

        p.run_stage2(StageInput::text("our copy")).await.unwrap();
        assert_eq!(p.session().state(), PipelineState::Stage2Done);

        p.run_stage3(StageInput::text("make it punchy")).await.unwrap();
        assert_eq!(p.session().state(), PipelineState::Stage3Done);

        assert_eq!(p.session().result(Stage::CompetitorAnalysis), Some("analysis"));
        assert_eq!(p.session().result(Stage::GapAnalysis), Some("gaps"));
        assert_eq!(p.session().result(Stage::CreativeOutput), Some("briefs"));
    }

    #[tokio::test]
    async fn test_stage2_rejected_without_stage1_and_no_remote_call() {
        let mut p = pipeline(vec![]);
        let err = p.run_stage2(StageInput::text("ours")).await.unwrap_err();
        assert!(matches!(err, Error::Sequence { stage: 2, missing: 1 }));
        assert_eq!(p.service.generations(), 0);
        assert_eq!(p.service.uploads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stage3_rejected_without_stage2() {
        let mut p = pipeline(vec!["analysis"]);
        p.run_stage1(StageInput::text("competitor")).await.unwrap();

        let err = p.run_stage3(StageInput::text("extra")).await.unwrap_err();
        assert!(matches!(err, Error::Sequence { stage: 3, missing: 2 }));
        assert_eq!(p.service.generations(), 1); // only the stage-1 call
    }

    #[tokio::test]
    async fn test_stage2_prompt_embeds_stage1_verbatim() {
        let mut p = pipeline(vec!["THE STAGE ONE REPORT"]);
        p.run_stage1(StageInput::text("competitor")).await.unwrap();

        // Echo stub returns the instruction, so the stored stage-2 result
        // must contain the stage-1 text as a contiguous substring.
        let report = p.run_stage2(StageInput::text("ours")).await.unwrap();
        assert!(report.text.contains("THE STAGE ONE REPORT"));
    }

    #[tokio::test]
    async fn test_stage3_prompt_embeds_both_results_verbatim() {
        let mut p = pipeline(vec!["REPORT ONE", "REPORT TWO"]);
        p.run_stage1(StageInput::text("competitor")).await.unwrap();
        p.run_stage2(StageInput::text("ours")).await.unwrap();

        let report = p.run_stage3(StageInput::text("extra")).await.unwrap();
        assert!(report.text.contains("REPORT ONE"));
        assert!(report.text.contains("REPORT TWO"));
    }

    #[tokio::test]
    async fn test_rerunning_stage1_leaves_downstream_slots_stale() {
        let mut p = pipeline(vec!["a1", "g1", "c1", "a2"]);
        p.run_stage1(StageInput::text("x")).await.unwrap();
        p.run_stage2(StageInput::text("y")).await.unwrap();
        p.run_stage3(StageInput::text("z")).await.unwrap();

        p.run_stage1(StageInput::text("x again")).await.unwrap();

        assert_eq!(p.session().result(Stage::CompetitorAnalysis), Some("a2"));
        // Downstream results are intentionally NOT invalidated
        assert_eq!(p.session().result(Stage::GapAnalysis), Some("g1"));
        assert_eq!(p.session().result(Stage::CreativeOutput), Some("c1"));
        assert_eq!(p.session().state(), PipelineState::Stage3Done);
    }

    #[tokio::test]
    async fn test_reset_clears_all_slots_from_any_state() {
        let mut p = pipeline(vec!["a", "g"]);
        p.run_stage1(StageInput::text("x")).await.unwrap();
        p.run_stage2(StageInput::text("y")).await.unwrap();

        p.reset();

        assert_eq!(p.session().state(), PipelineState::Empty);
        assert_eq!(p.session().result(Stage::CompetitorAnalysis), None);
        assert_eq!(p.session().result(Stage::GapAnalysis), None);
        assert_eq!(p.session().result(Stage::CreativeOutput), None);
    }

    #[tokio::test]
    async fn test_generation_failure_leaves_prior_slots_untouched() {
        let mut p = pipeline(vec!["analysis"]);
        p.run_stage1(StageInput::text("x")).await.unwrap();

        p.service.fail_generation = true;
        let err = p.run_stage2(StageInput::text("y")).await.unwrap_err();
        assert!(matches!(err, Error::Generation { .. }));

        assert_eq!(p.session().result(Stage::CompetitorAnalysis), Some("analysis"));
        assert_eq!(p.session().result(Stage::GapAnalysis), None);
        assert_eq!(p.session().state(), PipelineState::Stage1Done);
    }

    #[tokio::test]
    async fn test_failed_attachments_are_excluded_not_fatal() {
        let mut p = pipeline(vec!["analysis"]);
        p.service.fail_uploads = true;

        let input = StageInput::text("competitor copy")
            .with_attachment(Attachment::new("a.pdf", vec![1]))
            .with_attachment(Attachment::new("b.pdf", vec![2]));

        // Free text present, so generation proceeds with zero handles
        let report = p.run_stage1(input).await.unwrap();
        assert_eq!(report.ingested.len(), 0);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(p.service.generations(), 1);
    }

    #[tokio::test]
    async fn test_all_attachments_failed_and_no_text_aborts_stage() {
        let mut p = pipeline(vec![]);
        p.service.fail_uploads = true;

        let input = StageInput::default().with_attachment(Attachment::new("a.pdf", vec![1]));
        let err = p.run_stage1(input).await.unwrap_err();
        assert!(matches!(err, Error::Ingestion { .. }));
        assert_eq!(p.service.generations(), 0);
    }

    #[tokio::test]
    async fn test_stage3_reference_attachment_switches_format_instruction() {
        // Echo stub: stage-3 result text is the composed instruction
        let mut p = pipeline(vec!["one", "two"]);
        p.run_stage1(StageInput::text("x")).await.unwrap();
        p.run_stage2(StageInput::text("y")).await.unwrap();

        let input = StageInput::text("extra")
            .with_attachment(Attachment::new("reference.pdf", vec![1]));
        let report = p.run_stage3(input).await.unwrap();
        assert!(report.text.contains("Mimic its"));
        assert_eq!(report.ingested, vec!["reference.pdf".to_string()]);
    }

    #[tokio::test]
    async fn test_stage3_without_reference_uses_generic_format() {
        let mut p = pipeline(vec!["one", "two"]);
        p.run_stage1(StageInput::text("x")).await.unwrap();
        p.run_stage2(StageInput::text("y")).await.unwrap();

        let report = p.run_stage3(StageInput::text("extra")).await.unwrap();
        assert!(report.text.contains("numbered markdown section"));
    }

    #[test]
    fn test_sessions_do_not_share_state() {
        let a = Session::new();
        let b = Session::new();
        assert_ne!(a.id, b.id);
    }
}
