//! Infrastructure traits for external collaborators (§1: explicitly excluded
//! from the core, pinned here by interface contract only).
//!
//! Naming convention: `Base*` for trait names, matching the teacher's
//! `BaseAI`/`BaseEmbeddingService` convention.

use anyhow::Result;
use async_trait::async_trait;

/// Object storage: `putObject`/`getObjectBytes` per §6.4. The concrete
/// signing mechanics (presigned URLs, SigV4 headers) belong to the excluded
/// "object storage transport" collaborator; the core only calls this trait.
#[async_trait]
pub trait BaseObjectStorage: Send + Sync {
    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;
    async fn get_object_bytes(&self, key: &str) -> Result<Vec<u8>>;
}

/// The NLP collaborator of §6.3: parsing and similarity computation live
/// entirely outside the core. Request/response shapes are defined in
/// `kernel::nlp_client`.
#[async_trait]
pub trait BaseNlpClient: Send + Sync {
    async fn parse_resume(
        &self,
        req: crate::kernel::nlp_client::ParseResumeRequest,
    ) -> Result<crate::kernel::nlp_client::ParseResumeResponse>;

    async fn parse_job(
        &self,
        req: crate::kernel::nlp_client::ParseJobRequest,
    ) -> Result<crate::kernel::nlp_client::ParseJobResponse>;

    async fn compute_match(
        &self,
        req: crate::kernel::nlp_client::MatchRequest,
    ) -> Result<crate::kernel::nlp_client::MatchResponse>;
}
